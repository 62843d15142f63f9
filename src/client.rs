// Copyright 2021, Collabora, Ltd.
// SPDX-License-Identifier: BSL-1.0

//! The client facade: connect, stream, command, disconnect.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    codec::Command,
    config::ClientConfig,
    data_types::ServerInfo,
    dispatcher::{DispatcherOptions, SessionState, SharedState, StreamDispatcher},
    error::{NegotiationError, Result, UsageError},
    listener::{MotionListener, NullListener},
    negotiation::{Session, VersionNegotiator},
    transport::{Transport, UdpTransport},
};

/// A connection to one NatNet server.
///
/// ```no_run
/// use natnet::{ClientConfig, MotionClient, MotionListener, RigidBody, TimeInfo};
/// use std::time::Duration;
///
/// struct Printer;
///
/// impl MotionListener for Printer {
///     fn on_rigid_bodies(&mut self, bodies: &[RigidBody], _: &TimeInfo) {
///         for body in bodies {
///             println!("{}: {:?}", body.id, body.position);
///         }
///     }
/// }
///
/// let mut client = MotionClient::new(Printer);
/// let server = client.connect(&ClientConfig::default(), Duration::from_secs(1))?;
/// println!("connected to {} {}", server.app_name, server.natnet_version);
/// client.request_data()?;
/// std::thread::sleep(Duration::from_secs(5));
/// client.disconnect();
/// # Ok::<(), natnet::NatNetError>(())
/// ```
pub struct MotionClient {
    listener: Option<Box<dyn MotionListener>>,
    state: SharedState,
    transport: Option<Arc<dyn Transport>>,
    session: Option<Session>,
    dispatcher: Option<StreamDispatcher>,
    options: DispatcherOptions,
    request_timeout: Duration,
}

impl MotionClient {
    pub fn new<L: MotionListener + 'static>(listener: L) -> MotionClient {
        let defaults = ClientConfig::default();
        MotionClient {
            listener: Some(Box::new(listener)),
            state: SharedState::default(),
            transport: None,
            session: None,
            dispatcher: None,
            options: DispatcherOptions {
                poll_interval: defaults.poll_interval,
                stop_timeout: defaults.stop_timeout,
            },
            request_timeout: defaults.request_timeout,
        }
    }

    /// Open UDP sockets as configured and negotiate with the server.
    ///
    /// Disconnects first if already connected.
    pub fn connect(
        &mut self,
        config: &ClientConfig,
        timeout: Duration,
    ) -> Result<ServerInfo, NegotiationError> {
        self.disconnect();
        self.options = DispatcherOptions {
            poll_interval: config.poll_interval,
            stop_timeout: config.stop_timeout,
        };
        self.request_timeout = config.request_timeout;
        let transport = UdpTransport::open(config)?;
        self.connect_with(Arc::new(transport), timeout)
    }

    /// Negotiate with a server over any transport.
    ///
    /// Disconnects first if already connected. On failure the transport is
    /// closed and the client is idle again.
    pub fn connect_with(
        &mut self,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<ServerInfo, NegotiationError> {
        self.disconnect();
        self.state.set(SessionState::Negotiating);
        match VersionNegotiator::negotiate(transport.as_ref(), timeout) {
            Ok(session) => {
                let server_info = session.server_info.clone();
                self.transport = Some(transport);
                self.session = Some(session);
                self.state.set(SessionState::Connected);
                info!(
                    app = %server_info.app_name,
                    version = %server_info.natnet_version,
                    "connected"
                );
                Ok(server_info)
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                transport.close();
                self.state.set(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Start streaming frames to the listener. Does nothing if already streaming.
    pub fn request_data(&mut self) -> Result<()> {
        match self.state.get() {
            SessionState::Streaming => return Ok(()),
            SessionState::Connected => {}
            _ => return Err(UsageError::NotConnected.into()),
        }
        let (transport, session) = match (&self.transport, &self.session) {
            (Some(transport), Some(session)) => (Arc::clone(transport), session.clone()),
            _ => return Err(UsageError::NotConnected.into()),
        };
        // Sent before the thread starts: on failure the session stays Connected.
        transport.send(&Command::RequestFrameOfData.to_bytes()?)?;
        let listener = self
            .listener
            .take()
            .unwrap_or_else(|| Box::new(NullListener));
        let dispatcher = StreamDispatcher::start(
            Arc::clone(&transport),
            session,
            listener,
            self.state.clone(),
            self.options,
        )?;
        self.dispatcher = Some(dispatcher);
        info!("streaming started");
        Ok(())
    }

    /// Ask for the model definitions, delivered to `on_model_definitions`.
    pub fn request_model_definitions(&mut self) -> Result<()> {
        self.send(Command::RequestModelDefinitions)
    }

    /// Send a free-form request, such as `"StartRecording"`.
    /// The reply goes to `on_response`.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        self.send(Command::Request(command.to_string()))
    }

    fn send(&self, command: Command) -> Result<()> {
        match (self.state.get(), &self.transport) {
            (SessionState::Connected, Some(transport))
            | (SessionState::Streaming, Some(transport)) => {
                debug!(?command, "sending command");
                transport.send(&command.to_bytes()?)?;
                Ok(())
            }
            _ => Err(UsageError::NotConnected.into()),
        }
    }

    /// Ask the server for its version again.
    ///
    /// While streaming, the answer also reaches `on_version`. This never
    /// changes the version used to decode the current session.
    pub fn get_version(&mut self) -> Result<ServerInfo, NegotiationError> {
        match self.state.get() {
            SessionState::Streaming => match &self.dispatcher {
                Some(dispatcher) => dispatcher.request_server_info(self.request_timeout),
                None => Err(NegotiationError::NotConnected),
            },
            SessionState::Connected => match &self.transport {
                Some(transport) => VersionNegotiator::query(transport.as_ref(), self.request_timeout),
                None => Err(NegotiationError::NotConnected),
            },
            _ => Err(NegotiationError::NotConnected),
        }
    }

    /// Stop streaming, tell the server goodbye, and release the transport.
    ///
    /// Calling it when not connected does nothing.
    pub fn disconnect(&mut self) {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => return,
        };
        if self.state.get() != SessionState::Idle {
            if let Ok(bytes) = Command::Disconnect.to_bytes() {
                if let Err(e) = transport.send(&bytes) {
                    debug!(error = %e, "could not send disconnect");
                }
            }
        }
        if let Some(mut dispatcher) = self.dispatcher.take() {
            if let Some(listener) = dispatcher.stop() {
                self.listener = Some(listener);
            }
        }
        transport.close();
        self.session = None;
        self.state.set(SessionState::Idle);
        info!("disconnected");
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// What the server said when this session was negotiated.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.session.as_ref().map(|s| &s.server_info)
    }
}

impl Drop for MotionClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
