//! Worker-to-controller calls.
//!
//! The worker keeps exactly one client connection to the controller's port.
//! Everything the worker initiates — the one-time callback registration and
//! all provider invocations — is a correlated request/response pair on that
//! connection. A writer task serializes outgoing frames; a reader task
//! completes pending calls by invocation id.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::JsonCodec;
use crate::bridge::protocol::{CallbackRequest, CallbackResponse, InvocationId, ProviderHandle};
use crate::marshal::WireValue;

/// Failure of one worker-to-controller call.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The controller answered with a fault frame.
    #[error("remote fault: {0}")]
    Remote(String),

    /// The callback connection is gone; no reply will ever arrive.
    #[error("callback channel closed")]
    ChannelClosed,
}

type PendingCall = oneshot::Sender<Result<WireValue, String>>;

struct ClientInner {
    tx: Mutex<Option<mpsc::UnboundedSender<CallbackRequest>>>,
    pending: DashMap<InvocationId, PendingCall>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handle to the worker's client connection toward the controller.
///
/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct CallbackClient {
    inner: Arc<ClientInner>,
}

impl CallbackClient {
    /// Take ownership of the connected stream and start the reader/writer
    /// tasks. Must be called from within a tokio runtime.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut framed_writer = FramedWrite::new(write_half, JsonCodec::<CallbackRequest>::new());
        let mut framed_reader = FramedRead::new(read_half, JsonCodec::<CallbackResponse>::new());

        let (tx, mut rx) = mpsc::unbounded_channel::<CallbackRequest>();

        let writer = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let Err(e) = framed_writer.send(request).await {
                    tracing::error!(error = %e, "Failed to write callback frame");
                    break;
                }
            }
            tracing::trace!("Callback writer exiting");
        });

        let inner = Arc::new(ClientInner {
            tx: Mutex::new(Some(tx)),
            pending: DashMap::new(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(None),
        });

        let reader_inner = Arc::clone(&inner);
        let reader = tokio::spawn(async move {
            loop {
                match framed_reader.next().await {
                    Some(Ok(CallbackResponse::Return { id, value })) => {
                        complete(&reader_inner, id, Ok(value));
                    }
                    Some(Ok(CallbackResponse::Fault { id, message })) => {
                        complete(&reader_inner, id, Err(message));
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Callback channel read error");
                        break;
                    }
                    None => {
                        tracing::trace!("Controller closed the callback connection");
                        break;
                    }
                }
            }
            drain_pending(&reader_inner);
        });
        *inner.reader.lock().unwrap() = Some(reader);

        Self { inner }
    }

    /// Announce the worker's listening endpoint and wait for the ack.
    pub async fn register_callback(&self, address: &str, port: u16) -> Result<(), ProxyError> {
        let id = InvocationId::new();
        self.round_trip(
            id,
            CallbackRequest::RegisterCallback {
                id,
                address: address.to_string(),
                port,
            },
        )
        .await?;
        Ok(())
    }

    /// Invoke a method on a controller-side provider object.
    pub async fn invoke(
        &self,
        target: ProviderHandle,
        method: &str,
        args: Vec<WireValue>,
    ) -> Result<WireValue, ProxyError> {
        let id = InvocationId::new();
        self.round_trip(
            id,
            CallbackRequest::Invoke {
                id,
                target,
                method: method.to_string(),
                args,
            },
        )
        .await
    }

    async fn round_trip(
        &self,
        id: InvocationId,
        request: CallbackRequest,
    ) -> Result<WireValue, ProxyError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.inner.pending.insert(id, done_tx);

        let sent = {
            let guard = self.inner.tx.lock().unwrap();
            match guard.as_ref() {
                Some(tx) => tx.send(request).is_ok(),
                None => false,
            }
        };
        if !sent {
            self.inner.pending.remove(&id);
            return Err(ProxyError::ChannelClosed);
        }

        match done_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ProxyError::Remote(message)),
            Err(_) => Err(ProxyError::ChannelClosed),
        }
    }

    /// Teardown step one: stop sending and let the connection drain. The
    /// writer task ends once queued frames are flushed; the process keeps
    /// running.
    pub fn close(&self) {
        self.inner.tx.lock().unwrap().take();
    }

    /// Teardown final step: close the connection for good and reap the
    /// reader/writer tasks.
    pub async fn shutdown(&self) {
        self.close();
        let writer = self.inner.writer.lock().unwrap().take();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        let reader = self.inner.reader.lock().unwrap().take();
        if let Some(reader) = reader {
            reader.abort();
            let _ = reader.await;
        }
        drain_pending(&self.inner);
    }
}

fn complete(inner: &ClientInner, id: InvocationId, result: Result<WireValue, String>) {
    match inner.pending.remove(&id) {
        Some((_, waiter)) => {
            let _ = waiter.send(result);
        }
        None => tracing::warn!(%id, "Reply for unknown invocation"),
    }
}

// Dropping the waiters resolves every pending call as ChannelClosed.
fn drain_pending(inner: &ClientInner) {
    inner.pending.clear();
}

/// Non-owning reference to one controller-side provider object.
///
/// Holds the controller-assigned handle plus a clone of the callback
/// client; dropping a proxy never affects the remote object.
#[derive(Clone)]
pub struct RemoteProxy {
    handle: ProviderHandle,
    client: CallbackClient,
}

impl RemoteProxy {
    pub fn new(handle: ProviderHandle, client: CallbackClient) -> Self {
        Self { handle, client }
    }

    pub fn handle(&self) -> &ProviderHandle {
        &self.handle
    }

    pub async fn invoke(&self, method: &str, args: Vec<WireValue>) -> Result<WireValue, ProxyError> {
        self.client.invoke(self.handle.clone(), method, args).await
    }
}

impl std::fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Controller stub: answers every Invoke with a canned reply and acks
    /// registration.
    async fn run_fake_controller<S>(
        stream: S,
        reply: impl Fn(&str) -> Result<WireValue, String> + Send + 'static,
    ) where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, JsonCodec::<CallbackRequest>::new());
        let mut writer = FramedWrite::new(write_half, JsonCodec::<CallbackResponse>::new());

        while let Some(Ok(request)) = reader.next().await {
            let response = match request {
                CallbackRequest::RegisterCallback { id, .. } => CallbackResponse::Return {
                    id,
                    value: WireValue::Null,
                },
                CallbackRequest::Invoke { id, method, .. } => match reply(&method) {
                    Ok(value) => CallbackResponse::Return { id, value },
                    Err(message) => CallbackResponse::Fault { id, message },
                },
            };
            if writer.send(response).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn invoke_returns_controller_value() {
        let (worker_side, controller_side) = tokio::io::duplex(4096);
        tokio::spawn(run_fake_controller(controller_side, |method| {
            assert_eq!(method, "getResults");
            Ok(WireValue::List(vec![WireValue::Int(1), WireValue::Int(2)]))
        }));

        let client = CallbackClient::new(worker_side);
        let proxy = RemoteProxy::new(ProviderHandle::new("results-1"), client.clone());
        let value = proxy.invoke("getResults", vec![]).await.unwrap();
        assert_eq!(
            value,
            WireValue::List(vec![WireValue::Int(1), WireValue::Int(2)])
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn fault_reply_surfaces_as_remote_error() {
        let (worker_side, controller_side) = tokio::io::duplex(4096);
        tokio::spawn(run_fake_controller(controller_side, |_| {
            Err("no such widget".to_string())
        }));

        let client = CallbackClient::new(worker_side);
        let proxy = RemoteProxy::new(ProviderHandle::new("widget-1"), client.clone());
        let err = proxy.invoke("plot", vec![]).await.unwrap_err();
        match err {
            ProxyError::Remote(message) => assert_eq!(message, "no such widget"),
            other => panic!("wrong error: {other:?}"),
        }
        client.shutdown().await;
    }

    #[tokio::test]
    async fn register_callback_acks() {
        let (worker_side, controller_side) = tokio::io::duplex(4096);
        tokio::spawn(run_fake_controller(controller_side, |_| {
            Ok(WireValue::Null)
        }));

        let client = CallbackClient::new(worker_side);
        client.register_callback("127.0.0.1", 40000).await.unwrap();
        client.shutdown().await;
    }

    #[tokio::test]
    async fn invoke_after_close_fails_cleanly() {
        let (worker_side, _controller_side) = tokio::io::duplex(4096);
        let client = CallbackClient::new(worker_side);
        client.close();

        let proxy = RemoteProxy::new(ProviderHandle::new("late"), client.clone());
        let err = proxy.invoke("anything", vec![]).await.unwrap_err();
        assert!(matches!(err, ProxyError::ChannelClosed));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn controller_disconnect_fails_pending_calls() {
        let (worker_side, controller_side) = tokio::io::duplex(4096);
        let client = CallbackClient::new(worker_side);
        let proxy = RemoteProxy::new(ProviderHandle::new("gone"), client.clone());

        let call = tokio::spawn(async move { proxy.invoke("slow", vec![]).await });
        // Give the frame time to queue, then drop the controller end.
        tokio::task::yield_now().await;
        drop(controller_side);

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ProxyError::ChannelClosed));
        client.shutdown().await;
    }
}
