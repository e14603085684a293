//! Channel bootstrap.
//!
//! The controller spawns the worker with its own listening port as the only
//! argument. Bootstrap then runs the port exchange: connect back to the
//! controller, bind an ephemeral listener of our own, and push a
//! registration message telling the controller where to direct API calls.
//! There is no degraded mode — any bootstrap failure is fatal.

use std::io;

use tokio::net::{TcpListener, TcpStream};

use crate::callback::{CallbackClient, ProxyError};

/// Port the controller listens on when none is passed on the command line.
pub const DEFAULT_CONTROLLER_PORT: u16 = 25333;

/// Both endpoints live on the loopback interface; the bridge is strictly
/// machine-local.
pub const BIND_HOST: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid controller port argument {0:?}")]
    BadPortArgument(String),

    #[error("cannot connect to controller on port {port}: {source}")]
    Connect { port: u16, source: io::Error },

    #[error("cannot bind callback listener: {0}")]
    Bind(#[source] io::Error),

    #[error("callback registration failed: {0}")]
    Register(#[source] ProxyError),
}

/// Bootstrap parameters, read from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub controller_port: u16,
}

impl BootstrapConfig {
    /// Parse `argv`: a single optional numeric argument naming the
    /// controller's port. Anything else is a startup error, not a guess.
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self, ChannelError> {
        let mut args = args.into_iter().skip(1);
        let controller_port = match args.next() {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ChannelError::BadPortArgument(raw))?,
            None => DEFAULT_CONTROLLER_PORT,
        };
        Ok(Self { controller_port })
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            controller_port: DEFAULT_CONTROLLER_PORT,
        }
    }
}

/// The process-wide bidirectional transport, created once at startup.
///
/// Owns the client connection toward the controller and the worker's own
/// API listener. The session takes both apart with [`Channel::into_parts`];
/// teardown is the session's three-step shutdown.
pub struct Channel {
    client: CallbackClient,
    listener: TcpListener,
    callback_port: u16,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("callback_port", &self.callback_port)
            .finish_non_exhaustive()
    }
}

impl Channel {
    pub async fn bootstrap(config: &BootstrapConfig) -> Result<Self, ChannelError> {
        let port = config.controller_port;
        tracing::debug!(port, "Connecting to controller");
        let stream = TcpStream::connect((BIND_HOST, port))
            .await
            .map_err(|source| ChannelError::Connect { port, source })?;
        let client = CallbackClient::new(stream);

        let listener = TcpListener::bind((BIND_HOST, 0))
            .await
            .map_err(ChannelError::Bind)?;
        let callback_port = listener.local_addr().map_err(ChannelError::Bind)?.port();
        tracing::debug!(callback_port, "Bound API listener");

        client
            .register_callback(BIND_HOST, callback_port)
            .await
            .map_err(ChannelError::Register)?;
        tracing::info!(
            controller_port = port,
            callback_port,
            "Channel established"
        );

        Ok(Self {
            client,
            listener,
            callback_port,
        })
    }

    pub fn client(&self) -> &CallbackClient {
        &self.client
    }

    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    pub fn into_parts(self) -> (CallbackClient, TcpListener) {
        (self.client, self.listener)
    }
}
