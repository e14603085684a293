//! Registry of controller-side capability proxies.
//!
//! The slot set is closed: the controller installs at most one proxy per
//! slot per session. The registry stores and retrieves; it never validates
//! what the controller supplied.

use dashmap::DashMap;

use crate::callback::RemoteProxy;

/// The capabilities the controller can expose to running scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderSlot {
    Results,
    Chart,
    PlotWidget,
    NativePlotter,
}

impl std::fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Results => "results-provider",
            Self::Chart => "chart-provider",
            Self::PlotWidget => "plot-widget-provider",
            Self::NativePlotter => "native-plotter",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    slots: DashMap<ProviderSlot, RemoteProxy>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a proxy. Intended to happen at most once per slot per
    /// session; a repeat install wins and is logged.
    pub fn install(&self, slot: ProviderSlot, proxy: RemoteProxy) {
        if self.slots.insert(slot, proxy).is_some() {
            tracing::warn!(%slot, "Provider reinstalled, replacing existing handle");
        } else {
            tracing::debug!(%slot, "Provider installed");
        }
    }

    /// Returns a clone of the slot's proxy, or None while the capability is
    /// unavailable.
    pub fn get(&self, slot: ProviderSlot) -> Option<RemoteProxy> {
        self.slots.get(&slot).map(|entry| entry.value().clone())
    }

    /// Where user-facing script warnings go: the plot widget side when
    /// present, else the native plotter.
    pub fn warning_sink(&self) -> Option<RemoteProxy> {
        self.get(ProviderSlot::PlotWidget)
            .or_else(|| self.get(ProviderSlot::NativePlotter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::ProviderHandle;
    use crate::callback::CallbackClient;

    fn proxy(client: &CallbackClient, id: &str) -> RemoteProxy {
        RemoteProxy::new(ProviderHandle::new(id), client.clone())
    }

    #[tokio::test]
    async fn slots_start_unset() {
        let registry = ProviderRegistry::new();
        assert!(registry.get(ProviderSlot::Results).is_none());
        assert!(registry.warning_sink().is_none());
    }

    #[tokio::test]
    async fn install_then_get() {
        let (worker_side, _controller_side) = tokio::io::duplex(64);
        let client = CallbackClient::new(worker_side);
        let registry = ProviderRegistry::new();

        registry.install(ProviderSlot::Results, proxy(&client, "results-1"));
        let got = registry.get(ProviderSlot::Results).unwrap();
        assert_eq!(got.handle().as_str(), "results-1");
        assert!(registry.get(ProviderSlot::Chart).is_none());
    }

    #[tokio::test]
    async fn reinstall_replaces_handle() {
        let (worker_side, _controller_side) = tokio::io::duplex(64);
        let client = CallbackClient::new(worker_side);
        let registry = ProviderRegistry::new();

        registry.install(ProviderSlot::Chart, proxy(&client, "chart-1"));
        registry.install(ProviderSlot::Chart, proxy(&client, "chart-2"));
        assert_eq!(
            registry.get(ProviderSlot::Chart).unwrap().handle().as_str(),
            "chart-2"
        );
    }

    #[tokio::test]
    async fn warning_sink_prefers_plot_widget() {
        let (worker_side, _controller_side) = tokio::io::duplex(64);
        let client = CallbackClient::new(worker_side);
        let registry = ProviderRegistry::new();

        registry.install(ProviderSlot::NativePlotter, proxy(&client, "native-1"));
        assert_eq!(
            registry.warning_sink().unwrap().handle().as_str(),
            "native-1"
        );

        registry.install(ProviderSlot::PlotWidget, proxy(&client, "widget-1"));
        assert_eq!(
            registry.warning_sink().unwrap().handle().as_str(),
            "widget-1"
        );
    }
}
