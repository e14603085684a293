//! Plotting defaults snapshot.
//!
//! The controller asks for the current matplotlib rcParams to mirror them
//! in its own configuration UI. Every key and value is stringified and the
//! whole thing is converted into a flat map before crossing the bridge.

use std::collections::BTreeMap;

use pyo3::prelude::*;

pub fn snapshot() -> Result<BTreeMap<String, String>, String> {
    Python::attach(|py| collect(py).map_err(|err| err.to_string()))
}

fn collect(py: Python<'_>) -> PyResult<BTreeMap<String, String>> {
    let matplotlib = py.import("matplotlib")?;
    let rc_params = matplotlib.getattr("rcParams")?;

    let mut params = BTreeMap::new();
    for item in rc_params.call_method0("items")?.try_iter()? {
        let (key, value): (Bound<'_, PyAny>, Bound<'_, PyAny>) = item?.extract()?;
        params.insert(key.str()?.to_string(), value.str()?.to_string());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_stringifies_every_entry() {
        let available = Python::attach(|py| py.import("matplotlib").is_ok());
        if !available {
            // Collaborator library not present in this environment.
            return;
        }

        let params = snapshot().unwrap();
        assert!(!params.is_empty());
        assert!(params.contains_key("figure.figsize"));

        let again = snapshot().unwrap();
        assert_eq!(params, again);
    }
}
