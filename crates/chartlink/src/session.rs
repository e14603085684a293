//! Remote API surface and session loop.
//!
//! The controller drives the worker through the eight operations of
//! [`EntryPoint`]; the transport decodes frames and dispatches by method
//! name. Namespace-touching work funnels through one queue consumed by a
//! single dispatcher task, so calls are processed strictly one at a time,
//! while the accept loop and liveness probes stay responsive during long
//! script runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::JsonCodec;
use crate::bridge::protocol::{ApiRequest, ApiResponse, VectorOpDescriptor};
use crate::callback::{CallbackClient, RemoteProxy};
use crate::channel::Channel;
use crate::marshal::{ObjectBlob, WireValue};
use crate::providers::ProviderRegistry;

/// Result of one `execute` call.
///
/// Failure is data, not unwinding: the session loop turns either failure
/// variant into the warning-sink call and a non-zero process exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed,

    /// The script deliberately signalled a user-facing problem.
    DomainError { message: String },

    /// Any other uncaught fault; `trace` is the full formatted diagnostic.
    Fault { message: String, trace: String },
}

/// The eight operations the controller can invoke, implemented by the
/// single session-handler type behind the transport.
#[async_trait::async_trait]
pub trait EntryPoint: Send + Sync + 'static {
    /// Liveness probe; must stay answerable while a script runs.
    fn check(&self) -> bool;

    fn set_results_provider(&self, proxy: RemoteProxy);
    fn set_chart_provider(&self, proxy: RemoteProxy);
    fn set_plot_widget_provider(&self, proxy: RemoteProxy);
    fn set_native_plotter(&self, proxy: RemoteProxy);

    /// Run statements against the shared namespace.
    async fn execute(&self, script: String) -> ExecOutcome;

    /// Evaluate one expression; errors are call-level, never fatal.
    async fn evaluate(&self, expression: String) -> Result<WireValue, String>;

    async fn get_rc_params(&self) -> Result<BTreeMap<String, String>, String>;

    /// Never fails as a whole; malformed entries are dropped individually.
    async fn get_vector_ops(&self) -> Vec<VectorOpDescriptor>;

    async fn set_global_object_pickle(&self, name: String, blob: ObjectBlob)
    -> Result<(), String>;
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Controller went away; teardown ran.
    Graceful,

    /// A script failed; the warning was delivered and the process must
    /// exit non-zero.
    ExecuteFailed,
}

impl SessionExit {
    pub fn code(self) -> i32 {
        match self {
            Self::Graceful => 0,
            Self::ExecuteFailed => 1,
        }
    }
}

enum ExecFailure {
    Domain { message: String },
    Uncaught { message: String, trace: String },
}

struct Job {
    request: ApiRequest,
    reply: oneshot::Sender<ApiResponse>,
}

/// One controller-worker session. Owns the channel halves and the provider
/// registry for its whole lifetime.
pub struct Session<E: EntryPoint> {
    client: CallbackClient,
    listener: TcpListener,
    registry: Arc<ProviderRegistry>,
    entry: Arc<E>,
}

impl<E: EntryPoint> Session<E> {
    pub fn new(channel: Channel, registry: Arc<ProviderRegistry>, entry: Arc<E>) -> Self {
        let (client, listener) = channel.into_parts();
        Self::from_parts(client, listener, registry, entry)
    }

    pub fn from_parts(
        client: CallbackClient,
        listener: TcpListener,
        registry: Arc<ProviderRegistry>,
        entry: Arc<E>,
    ) -> Self {
        Self {
            client,
            listener,
            registry,
            entry,
        }
    }

    /// Serve until the controller goes away or a script fails.
    ///
    /// `controller_eof` resolves when the controlling pipe closes; the
    /// production caller passes the stdin watcher, tests pass whatever
    /// suits them. On the graceful path the three-step teardown runs here;
    /// on the fatal path the caller exits the process immediately.
    pub async fn run<F>(self, controller_eof: F) -> SessionExit
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let Session {
            client,
            listener,
            registry,
            entry,
        } = self;

        let (job_tx, job_rx) = mpsc::channel::<Job>(1);
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<ExecFailure>(1);

        let dispatcher = tokio::spawn(dispatch_loop(
            job_rx,
            fatal_tx,
            Arc::clone(&entry),
            client.clone(),
        ));

        let mut connections = JoinSet::new();
        tokio::pin!(controller_eof);

        let exit = loop {
            tokio::select! {
                biased;

                _ = &mut controller_eof => {
                    tracing::info!("Controller pipe closed, shutting down");
                    break SessionExit::Graceful;
                }

                Some(failure) = fatal_rx.recv() => {
                    report_execute_failure(failure, &registry).await;
                    break SessionExit::ExecuteFailed;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "Controller connected to API endpoint");
                        connections.spawn(connection_task(
                            stream,
                            job_tx.clone(),
                            Arc::clone(&entry),
                        ));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "API accept failed");
                    }
                },
            }
        };

        if exit == SessionExit::Graceful {
            teardown(client, listener, dispatcher, connections).await;
        }
        exit
    }
}

/// Scoped three-step shutdown. None of the steps can short-circuit the
/// ones after it.
async fn teardown(
    client: CallbackClient,
    listener: TcpListener,
    dispatcher: JoinHandle<()>,
    mut connections: JoinSet<()>,
) {
    // Step 1: close the channel toward the controller, process stays up.
    tracing::debug!("Teardown: closing callback client");
    client.close();

    // Step 2: stop the worker's own listening loop.
    tracing::debug!("Teardown: stopping API listener");
    drop(listener);
    connections.shutdown().await;
    dispatcher.abort();
    let _ = dispatcher.await;

    // Step 3: full channel shutdown.
    tracing::debug!("Teardown: final channel shutdown");
    client.shutdown().await;

    tracing::info!("Session torn down");
}

async fn connection_task<E: EntryPoint>(
    stream: TcpStream,
    jobs: mpsc::Sender<Job>,
    entry: Arc<E>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, JsonCodec::<ApiRequest>::new());
    let mut writer = FramedWrite::new(write_half, JsonCodec::<ApiResponse>::new());

    while let Some(frame) = reader.next().await {
        let request = match frame {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "Malformed API frame, dropping connection");
                break;
            }
        };

        // Liveness probes bypass the work queue so they answer even while
        // a script is running.
        let response = if matches!(request, ApiRequest::Check) {
            ApiResponse::Value {
                value: WireValue::Bool(entry.check()),
            }
        } else {
            let (reply_tx, reply_rx) = oneshot::channel();
            let job = Job {
                request,
                reply: reply_tx,
            };
            if jobs.send(job).await.is_err() {
                tracing::debug!("Dispatcher gone, dropping connection");
                break;
            }
            match reply_rx.await {
                Ok(response) => response,
                Err(_) => {
                    // Fatal execute underway: no frame goes back, the
                    // controller learns of the failure from the exit code.
                    tracing::debug!("No reply for in-flight call, dropping connection");
                    break;
                }
            }
        };

        if let Err(e) = writer.send(response).await {
            tracing::error!(error = %e, "Failed to write API response");
            break;
        }
    }
    tracing::debug!("API connection closed");
}

/// The serialized work queue. One job at a time, in arrival order; a fatal
/// execute outcome stops the loop for good.
async fn dispatch_loop<E: EntryPoint>(
    mut jobs: mpsc::Receiver<Job>,
    fatal: mpsc::Sender<ExecFailure>,
    entry: Arc<E>,
    client: CallbackClient,
) {
    while let Some(Job { request, reply }) = jobs.recv().await {
        let response = match request {
            ApiRequest::Check => ApiResponse::Value {
                value: WireValue::Bool(entry.check()),
            },
            ApiRequest::SetResultsProvider { handle } => {
                entry.set_results_provider(RemoteProxy::new(handle, client.clone()));
                ApiResponse::Done
            }
            ApiRequest::SetChartProvider { handle } => {
                entry.set_chart_provider(RemoteProxy::new(handle, client.clone()));
                ApiResponse::Done
            }
            ApiRequest::SetPlotWidgetProvider { handle } => {
                entry.set_plot_widget_provider(RemoteProxy::new(handle, client.clone()));
                ApiResponse::Done
            }
            ApiRequest::SetNativePlotter { handle } => {
                entry.set_native_plotter(RemoteProxy::new(handle, client.clone()));
                ApiResponse::Done
            }
            ApiRequest::Execute { script } => match entry.execute(script).await {
                ExecOutcome::Completed => ApiResponse::Done,
                ExecOutcome::DomainError { message } => {
                    drop(reply);
                    let _ = fatal.send(ExecFailure::Domain { message }).await;
                    break;
                }
                ExecOutcome::Fault { message, trace } => {
                    drop(reply);
                    let _ = fatal.send(ExecFailure::Uncaught { message, trace }).await;
                    break;
                }
            },
            ApiRequest::Evaluate { expression } => match entry.evaluate(expression).await {
                Ok(value) => ApiResponse::Value { value },
                Err(message) => ApiResponse::Fault { message },
            },
            ApiRequest::GetRcParams => match entry.get_rc_params().await {
                Ok(params) => ApiResponse::RcParams { params },
                Err(message) => ApiResponse::Fault { message },
            },
            ApiRequest::GetVectorOps => ApiResponse::VectorOps {
                ops: entry.get_vector_ops().await,
            },
            ApiRequest::SetGlobalObjectPickle { name, blob } => {
                match entry.set_global_object_pickle(name, blob).await {
                    Ok(()) => ApiResponse::Done,
                    Err(message) => ApiResponse::Fault { message },
                }
            }
        };
        let _ = reply.send(response);
    }
    tracing::debug!("Dispatcher exiting");
}

/// Top-level conversion of a fatal execute outcome: trace to stderr for
/// uncaught faults only, then the warning-sink call. The exit code is the
/// caller's job.
async fn report_execute_failure(failure: ExecFailure, registry: &ProviderRegistry) {
    let (message, trace) = match failure {
        ExecFailure::Domain { message } => (message, None),
        ExecFailure::Uncaught { message, trace } => (message, Some(trace)),
    };

    if let Some(trace) = trace {
        eprintln!("{trace}");
    }

    match registry.warning_sink() {
        Some(sink) => {
            let args = vec![WireValue::Str(message.clone())];
            if let Err(e) = sink.invoke("setWarning", args).await {
                tracing::warn!(error = %e, message = %message, "Could not deliver script warning");
            }
        }
        None => {
            tracing::warn!(message = %message, "No warning sink installed, dropping script warning");
        }
    }
}
