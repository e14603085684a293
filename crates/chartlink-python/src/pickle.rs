//! Opaque object transfer.
//!
//! The codec is the escape hatch for values too complex for the wire value
//! shapes: the controller serializes an arbitrary object to bytes, the
//! worker reconstructs an equivalent native object. The seam is a trait so
//! the format can be swapped; the shipped implementation is stdlib pickle,
//! which round-trips everything the evaluation namespace holds.

use pyo3::prelude::*;
use pyo3::types::PyBytes;

/// Serialize/deserialize an arbitrary Python value to and from bytes.
pub trait ObjectCodec: Send + Sync + 'static {
    fn encode(&self, py: Python<'_>, value: &Bound<'_, PyAny>) -> PyResult<Vec<u8>>;
    fn decode<'py>(&self, py: Python<'py>, bytes: &[u8]) -> PyResult<Bound<'py, PyAny>>;
}

/// Stdlib pickle, highest protocol the interpreter offers.
pub struct PickleCodec;

impl ObjectCodec for PickleCodec {
    fn encode(&self, py: Python<'_>, value: &Bound<'_, PyAny>) -> PyResult<Vec<u8>> {
        let pickle = py.import("pickle")?;
        let dumped = pickle.call_method1("dumps", (value,))?;
        dumped.extract()
    }

    fn decode<'py>(&self, py: Python<'py>, bytes: &[u8]) -> PyResult<Bound<'py, PyAny>> {
        let pickle = py.import("pickle")?;
        pickle.call_method1("loads", (PyBytes::new(py, bytes),))
    }
}
