//! chartlink: bridge core for the chart-script worker.
//!
//! A controller (the analysis IDE) drives the worker over a bidirectional
//! TCP bridge: it calls the operations of [`session::EntryPoint`] on the
//! worker's advertised port, and the worker calls controller-side provider
//! objects back through [`callback::RemoteProxy`] handles. This crate holds
//! everything transport-facing; the Python evaluation runtime lives in the
//! companion `chartlink-python` crate.

pub mod bridge;
pub mod callback;
pub mod channel;
pub mod lifecycle;
pub mod marshal;
pub mod providers;
pub mod session;

pub use bridge::protocol::{ProviderHandle, VectorOpDescriptor};
pub use callback::{CallbackClient, ProxyError, RemoteProxy};
pub use channel::{BootstrapConfig, Channel, ChannelError, DEFAULT_CONTROLLER_PORT};
pub use marshal::{ObjectBlob, WireValue};
pub use providers::{ProviderRegistry, ProviderSlot};
pub use session::{EntryPoint, ExecOutcome, Session, SessionExit};
