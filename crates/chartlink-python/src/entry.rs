//! The session-handler type behind the remote API surface.
//!
//! `ChartEntryPoint` is the one implementation of the core `EntryPoint`
//! trait: it owns the evaluation context and the object codec, and installs
//! provider proxies into the session's registry. All GIL work runs on
//! blocking tasks so the transport loops never stall on Python.

use std::collections::BTreeMap;
use std::sync::Arc;

use pyo3::prelude::*;

use chartlink_core::{
    EntryPoint, ExecOutcome, ObjectBlob, ProviderRegistry, ProviderSlot, RemoteProxy,
    VectorOpDescriptor, WireValue,
};

use crate::context::EvaluationContext;
use crate::pickle::{ObjectCodec, PickleCodec};
use crate::{rcparams, vectorops};

pub struct ChartEntryPoint {
    context: EvaluationContext,
    registry: Arc<ProviderRegistry>,
    codec: Arc<dyn ObjectCodec>,
}

impl ChartEntryPoint {
    pub fn new(registry: Arc<ProviderRegistry>) -> PyResult<Self> {
        Self::with_codec(registry, Arc::new(PickleCodec))
    }

    pub fn with_codec(
        registry: Arc<ProviderRegistry>,
        codec: Arc<dyn ObjectCodec>,
    ) -> PyResult<Self> {
        Ok(Self {
            context: EvaluationContext::new()?,
            registry,
            codec,
        })
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }
}

#[async_trait::async_trait]
impl EntryPoint for ChartEntryPoint {
    fn check(&self) -> bool {
        true
    }

    fn set_results_provider(&self, proxy: RemoteProxy) {
        self.registry.install(ProviderSlot::Results, proxy);
    }

    fn set_chart_provider(&self, proxy: RemoteProxy) {
        self.registry.install(ProviderSlot::Chart, proxy);
    }

    fn set_plot_widget_provider(&self, proxy: RemoteProxy) {
        self.registry.install(ProviderSlot::PlotWidget, proxy);
    }

    fn set_native_plotter(&self, proxy: RemoteProxy) {
        self.registry.install(ProviderSlot::NativePlotter, proxy);
    }

    async fn execute(&self, script: String) -> ExecOutcome {
        let context = self.context.clone();
        tokio::task::spawn_blocking(move || context.execute(&script))
            .await
            .unwrap_or_else(|e| ExecOutcome::Fault {
                message: format!("script task panicked: {e}"),
                trace: String::new(),
            })
    }

    async fn evaluate(&self, expression: String) -> Result<WireValue, String> {
        let context = self.context.clone();
        tokio::task::spawn_blocking(move || context.evaluate(&expression))
            .await
            .unwrap_or_else(|e| Err(format!("evaluation task panicked: {e}")))
    }

    async fn get_rc_params(&self) -> Result<BTreeMap<String, String>, String> {
        tokio::task::spawn_blocking(rcparams::snapshot)
            .await
            .unwrap_or_else(|e| Err(format!("rcParams task panicked: {e}")))
    }

    async fn get_vector_ops(&self) -> Vec<VectorOpDescriptor> {
        tokio::task::spawn_blocking(vectorops::report_ops)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Vector ops task panicked");
                Vec::new()
            })
    }

    async fn set_global_object_pickle(
        &self,
        name: String,
        blob: ObjectBlob,
    ) -> Result<(), String> {
        let context = self.context.clone();
        let codec = Arc::clone(&self.codec);
        tokio::task::spawn_blocking(move || {
            Python::attach(|py| {
                let value = codec
                    .decode(py, blob.as_bytes())
                    .map_err(|e| e.to_string())?;
                context.define(&name, &value).map_err(|e| e.to_string())
            })
        })
        .await
        .unwrap_or_else(|e| Err(format!("object install task panicked: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ChartEntryPoint {
        ChartEntryPoint::new(Arc::new(ProviderRegistry::new())).unwrap()
    }

    #[tokio::test]
    async fn execute_then_evaluate_shares_the_namespace() {
        let entry = entry();
        assert_eq!(
            entry.execute("answer = 6 * 7".to_string()).await,
            ExecOutcome::Completed
        );
        assert_eq!(
            entry.evaluate("answer".to_string()).await.unwrap(),
            WireValue::Int(42)
        );
    }

    #[tokio::test]
    async fn pickled_object_is_visible_to_scripts() {
        let entry = entry();
        let blob = Python::attach(|py| {
            let value = py
                .eval(c"{'rows': [1, 2, 3], 'name': 'load'}", None, None)
                .unwrap();
            ObjectBlob::new(PickleCodec.encode(py, &value).unwrap())
        });

        entry
            .set_global_object_pickle("data".to_string(), blob)
            .await
            .unwrap();
        assert_eq!(
            entry
                .evaluate("data['rows'][2]".to_string())
                .await
                .unwrap(),
            WireValue::Int(3)
        );

        // Overwrite wins.
        let blob = Python::attach(|py| {
            let value = py.eval(c"'replaced'", None, None).unwrap();
            ObjectBlob::new(PickleCodec.encode(py, &value).unwrap())
        });
        entry
            .set_global_object_pickle("data".to_string(), blob)
            .await
            .unwrap();
        assert_eq!(
            entry.evaluate("data".to_string()).await.unwrap(),
            WireValue::Str("replaced".into())
        );
    }

    #[tokio::test]
    async fn bad_blob_is_a_call_level_error() {
        let entry = entry();
        let err = entry
            .set_global_object_pickle("x".to_string(), ObjectBlob::new(b"junk".to_vec()))
            .await
            .unwrap_err();
        assert!(!err.is_empty());
    }

    #[tokio::test]
    async fn check_is_always_true() {
        assert!(entry().check());
    }
}
