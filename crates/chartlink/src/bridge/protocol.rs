//! Wire protocol types for controller-worker communication.
//!
//! Two directions:
//! - **API channel** (controller connects to the worker's callback port):
//!   [`ApiRequest`] in, [`ApiResponse`] out. Strictly one request/response
//!   pair at a time per connection; the controller blocks on each call.
//! - **Callback channel** (the worker's client connection to the controller
//!   port): [`CallbackRequest`] out, [`CallbackResponse`] in, correlated by
//!   [`InvocationId`].

use serde::{Deserialize, Serialize};

use crate::marshal::{ObjectBlob, WireValue};

/// Correlation id for one worker-to-controller invocation.
///
/// UUID v4 so replies can never be attributed to the wrong call, even if the
/// controller answers out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(uuid::Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let uuid = uuid::Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Controller-assigned identity of a provider object living on the
/// controller side. The worker never owns the object; it only holds the
/// handle for back-invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderHandle(String);

impl ProviderHandle {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self(object_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One available data-transform operation, as reported by the script
/// library. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorOpDescriptor {
    pub module: String,
    pub name: String,
    pub signature: String,
    pub docstring: String,
    pub label: String,
    pub example: String,
}

/// Calls from controller to worker. The `method` tag is the remote call
/// surface contract; names here are frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ApiRequest {
    Check,

    SetResultsProvider { handle: ProviderHandle },

    SetChartProvider { handle: ProviderHandle },

    SetPlotWidgetProvider { handle: ProviderHandle },

    SetNativePlotter { handle: ProviderHandle },

    /// Run statements against the shared evaluation namespace. Succeeds
    /// with a void ack; on failure the worker sends nothing and exits.
    Execute { script: String },

    /// Evaluate one expression and return its marshalled value. Failures
    /// come back as a fault frame, not a process exit.
    Evaluate { expression: String },

    GetRcParams,

    GetVectorOps,

    /// Decode the blob and bind the result under `name`, overwriting any
    /// prior binding.
    SetGlobalObjectPickle { name: String, blob: ObjectBlob },
}

/// Replies from worker to controller on the API channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiResponse {
    /// Void ack for calls that return nothing.
    Done,

    Value {
        value: WireValue,
    },

    /// Plotting defaults, stringified key and value, explicitly converted
    /// to a flat mapping before crossing.
    RcParams {
        params: std::collections::BTreeMap<String, String>,
    },

    VectorOps {
        ops: Vec<VectorOpDescriptor>,
    },

    /// Call-level failure (evaluation faults, bad blobs). Fatal script
    /// failures never produce a frame at all.
    Fault {
        message: String,
    },
}

/// Calls from worker to controller on the callback channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackRequest {
    /// Pushed once after bootstrap: tells the controller where the worker
    /// listens for API calls.
    RegisterCallback {
        id: InvocationId,
        address: String,
        port: u16,
    },

    /// Invoke a method on a provider object the controller registered.
    Invoke {
        id: InvocationId,
        target: ProviderHandle,
        method: String,
        args: Vec<WireValue>,
    },
}

/// Replies from controller to worker on the callback channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackResponse {
    Return {
        id: InvocationId,
        #[serde(default)]
        value: WireValue,
    },

    Fault {
        id: InvocationId,
        message: String,
    },
}
