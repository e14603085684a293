//! Vector-operation descriptors.
//!
//! The companion script library reports the data-transform operations it
//! offers as (module, name, signature, docstring, label, example) tuples.
//! One malformed entry must not sink the listing: it is logged and skipped,
//! everything else is still delivered.

use pyo3::prelude::*;

use chartlink_core::VectorOpDescriptor;

/// Module the script library exposes its operation report in.
pub const VECTOR_OPS_MODULE: &str = "chartlib.vectorops";

pub fn report_ops() -> Vec<VectorOpDescriptor> {
    Python::attach(|py| match enumerate(py) {
        Ok(ops) => ops,
        Err(err) => {
            tracing::warn!(error = %err, "Vector operation listing unavailable");
            Vec::new()
        }
    })
}

fn enumerate(py: Python<'_>) -> PyResult<Vec<VectorOpDescriptor>> {
    let module = py.import(VECTOR_OPS_MODULE)?;
    let reported = module.call_method0("report_ops")?;

    let mut ops = Vec::new();
    for entry in reported.try_iter()? {
        let entry = entry?;
        match entry.extract::<(String, String, String, String, String, String)>() {
            Ok((module, name, signature, docstring, label, example)) => {
                ops.push(VectorOpDescriptor {
                    module,
                    name,
                    signature,
                    docstring,
                    label,
                    example,
                });
            }
            Err(err) => {
                let label = entry
                    .get_item(4)
                    .map(|l| l.to_string())
                    .unwrap_or_else(|_| "<unknown>".to_string());
                tracing::warn!(label = %label, error = %err, "Skipping malformed vector operation");
            }
        }
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::types::PyDict;

    /// Install stub `chartlib` / `chartlib.vectorops` modules whose report
    /// contains one malformed entry.
    fn install_stub_library(py: Python<'_>) {
        let types = py.import("types").unwrap();
        let sys_modules = py.import("sys").unwrap().getattr("modules").unwrap();

        let parent = types.call_method1("ModuleType", ("chartlib",)).unwrap();
        let module = types
            .call_method1("ModuleType", (VECTOR_OPS_MODULE,))
            .unwrap();

        let ns = PyDict::new(py);
        py.run(
            c"def report_ops():
    return [
        ('filters', 'mean', 'mean(window)', 'Rolling mean.', 'Mean', 'mean(10)'),
        ('filters', 'broken', 'oops'),
        ('filters', 'sum', 'sum()', 'Running sum.', 'Sum', 'sum()'),
    ]
",
            Some(&ns),
            None,
        )
        .unwrap();
        module
            .setattr("report_ops", ns.get_item("report_ops").unwrap().unwrap())
            .unwrap();

        parent.setattr("vectorops", &module).unwrap();
        sys_modules.set_item("chartlib", parent).unwrap();
        sys_modules.set_item(VECTOR_OPS_MODULE, module).unwrap();
    }

    #[test]
    fn malformed_entry_is_skipped_rest_delivered() {
        Python::attach(install_stub_library);

        let ops = report_ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].name, "mean");
        assert_eq!(ops[0].label, "Mean");
        assert_eq!(ops[1].name, "sum");

        // Stable without state changes in between.
        let again = report_ops();
        assert_eq!(again, ops);
    }
}
