//! Explicit Python ⇄ wire value conversion.
//!
//! Nothing crosses the bridge as an implicitly-coerced container: every
//! value is walked here, element by element, and anything without a wire
//! shape is rejected with a message pointing at the pickle escape hatch.

use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyByteArray, PyBytes, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};

use chartlink_core::WireValue;

/// Convert a Python value into its wire representation.
///
/// Mapping keys are stringified; tuples flatten to lists. Fails on values
/// with no wire shape (arbitrary objects, exotic containers).
pub fn to_wire(value: &Bound<'_, PyAny>) -> PyResult<WireValue> {
    if value.is_none() {
        return Ok(WireValue::Null);
    }
    // bool first: Python bools are ints.
    if value.is_instance_of::<PyBool>() {
        return Ok(WireValue::Bool(value.extract()?));
    }
    if value.is_instance_of::<PyInt>() {
        return Ok(WireValue::Int(value.extract()?));
    }
    if value.is_instance_of::<PyFloat>() {
        return Ok(WireValue::Float(value.extract()?));
    }
    if let Ok(s) = value.downcast::<PyString>() {
        return Ok(WireValue::Str(s.to_string()));
    }
    if let Ok(bytes) = value.downcast::<PyBytes>() {
        return Ok(WireValue::Bytes(bytes.as_bytes().to_vec()));
    }
    if let Ok(bytes) = value.downcast::<PyByteArray>() {
        return Ok(WireValue::Bytes(bytes.to_vec()));
    }
    if let Ok(list) = value.downcast::<PyList>() {
        let mut items = Vec::with_capacity(list.len());
        for item in list.iter() {
            items.push(to_wire(&item)?);
        }
        return Ok(WireValue::List(items));
    }
    if let Ok(tuple) = value.downcast::<PyTuple>() {
        let mut items = Vec::with_capacity(tuple.len());
        for item in tuple.iter() {
            items.push(to_wire(&item)?);
        }
        return Ok(WireValue::List(items));
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let mut entries = Vec::with_capacity(dict.len());
        for (key, item) in dict.iter() {
            entries.push((key.str()?.to_string(), to_wire(&item)?));
        }
        return Ok(WireValue::Map(entries));
    }

    Err(PyTypeError::new_err(format!(
        "cannot marshal value of type '{}'; convert it to primitives or transfer it as a pickled object",
        value.get_type().name().map(|n| n.to_string()).unwrap_or_else(|_| "?".to_string())
    )))
}

/// Materialize a wire value as a Python object.
pub fn from_wire<'py>(py: Python<'py>, value: &WireValue) -> PyResult<Bound<'py, PyAny>> {
    let object = match value {
        WireValue::Null => py.None().into_bound(py),
        WireValue::Bool(b) => b.into_pyobject(py)?.to_owned().into_any(),
        WireValue::Int(i) => i.into_pyobject(py)?.into_any(),
        WireValue::Float(f) => f.into_pyobject(py)?.into_any(),
        WireValue::Str(s) => s.into_pyobject(py)?.into_any(),
        WireValue::Bytes(b) => PyBytes::new(py, b).into_any(),
        WireValue::List(items) => {
            let converted: Vec<Bound<'py, PyAny>> = items
                .iter()
                .map(|item| from_wire(py, item))
                .collect::<PyResult<_>>()?;
            PyList::new(py, converted)?.into_any()
        }
        WireValue::Map(entries) => {
            let dict = PyDict::new(py);
            for (key, item) in entries {
                dict.set_item(key, from_wire(py, item)?)?;
            }
            dict.into_any()
        }
    };
    Ok(object)
}
