//! The persistent evaluation namespace.
//!
//! One globals dict lives for the whole session: every `execute` and
//! `evaluate` call runs against it, so later calls see everything earlier
//! calls defined. There is no sandboxing between submissions — scripts come
//! from the trusted controller.

use std::ffi::CString;

use pyo3::prelude::*;
use pyo3::types::PyDict;

use chartlink_core::{ExecOutcome, WireValue};

use crate::convert;

/// Seeded bindings: a flushing `print` so output reaches the controller's
/// console promptly, and `exit` for scripts that want to stop the worker.
const SEED: &std::ffi::CStr = c"import functools, sys
print = functools.partial(print, flush=True)
exit = sys.exit
del functools, sys
";

/// The shared namespace submitted code runs in.
pub struct EvaluationContext {
    globals: Py<PyDict>,
}

impl Clone for EvaluationContext {
    fn clone(&self) -> Self {
        Python::attach(|py| Self {
            globals: self.globals.clone_ref(py),
        })
    }
}

impl EvaluationContext {
    pub fn new() -> PyResult<Self> {
        Python::attach(|py| {
            let globals = PyDict::new(py);
            py.run(SEED, Some(&globals), None)?;
            Ok(Self {
                globals: globals.unbind(),
            })
        })
    }

    /// Run statements against the namespace. Never unwinds: failures come
    /// back as [`ExecOutcome`] variants for the session loop to act on.
    pub fn execute(&self, script: &str) -> ExecOutcome {
        Python::attach(|py| {
            let code = match CString::new(script) {
                Ok(code) => code,
                Err(_) => {
                    return ExecOutcome::Fault {
                        message: "script contains an embedded null byte".to_string(),
                        trace: String::new(),
                    };
                }
            };
            let globals = self.globals.bind(py);
            match py.run(&code, Some(globals), None) {
                Ok(()) => ExecOutcome::Completed,
                Err(err) => classify_script_error(py, &err),
            }
        })
    }

    /// Evaluate a single expression and marshal its value. Errors are
    /// returned to the caller, not treated as fatal.
    pub fn evaluate(&self, expression: &str) -> Result<WireValue, String> {
        Python::attach(|py| {
            let code = CString::new(expression)
                .map_err(|_| "expression contains an embedded null byte".to_string())?;
            let globals = self.globals.bind(py);
            let value = py
                .eval(&code, Some(globals), None)
                .map_err(|err| err.to_string())?;
            convert::to_wire(&value).map_err(|err| err.to_string())
        })
    }

    /// Bind `value` under `name`, overwriting any prior binding.
    pub fn define(&self, name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        self.globals.bind(value.py()).set_item(name, value)
    }
}

fn classify_script_error(py: Python<'_>, err: &PyErr) -> ExecOutcome {
    if is_chart_script_error(py, err) {
        ExecOutcome::DomainError {
            message: err.value(py).to_string(),
        }
    } else {
        ExecOutcome::Fault {
            message: err.value(py).to_string(),
            trace: format_trace(py, err),
        }
    }
}

/// The domain error class scripts raise to report a user-facing problem.
///
/// Matched against the class exported by the companion script library when
/// it is importable, with a class-name fallback so scripts that ship the
/// class themselves classify the same way.
fn is_chart_script_error(py: Python<'_>, err: &PyErr) -> bool {
    if let Ok(chart) = py.import("chartlib.chart")
        && let Ok(class) = chart.getattr("ChartScriptError")
        && err.is_instance(py, &class)
    {
        return true;
    }

    match err.get_type(py).name() {
        Ok(name) => name.to_string() == "ChartScriptError",
        Err(_) => false,
    }
}

fn format_trace(py: Python<'_>, err: &PyErr) -> String {
    let mut trace = String::new();
    if let Some(tb) = err.traceback(py)
        && let Ok(formatted) = tb.format()
    {
        trace.push_str(&formatted);
    }
    trace.push_str(&err.to_string());
    trace
}
