//! The inbound pipeline: transport events to decoded messages to the bus.
//!
//! A single dispatcher task owns every publish. Frames from the transport
//! and local echoes from the command path are funneled through it one at
//! a time, so store mutations never interleave and each runs to completion
//! before the next message is looked at.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use urbanflow_core::{CanonicalStore, DerivedViews, EventBus, Subscription};
use urbanflow_transport::{
    ConnectionState, Connector, Transport, TransportConfig, TransportError, TransportEvent,
    WsConnector,
};
use urbanflow_types::{ConnectionNotice, Message, ServerError, decode_frame};

use crate::commands::CommandSender;
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Error code published when the reconnect cap is reached.
pub const CONNECTION_EXHAUSTED: &str = "connection_exhausted";

/// A wired-up dashboard client: transport, bus, store, and views.
///
/// Dropping the client disconnects it.
pub struct SyncClient<C: Connector> {
    transport: Transport<C>,
    bus: EventBus<Message>,
    store: CanonicalStore,
    views: DerivedViews,
    local: mpsc::UnboundedSender<Message>,
    store_subscriptions: Vec<Subscription<Message>>,
    dispatcher: JoinHandle<()>,
}

impl SyncClient<WsConnector> {
    /// Build a `WebSocket` client from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let connector = WsConnector::new(&config.stream.url)?;
        Ok(Self::new(config.stream.transport_config(), connector))
    }
}

impl<C: Connector> SyncClient<C> {
    /// Wire a fresh bus and store to a transport over `connector`.
    ///
    /// Must be called from within a Tokio runtime. Does not connect.
    pub fn new(config: TransportConfig, connector: C) -> Self {
        Self::with_parts(config, connector, EventBus::new(), CanonicalStore::new())
    }

    /// Like [`SyncClient::new`], with a caller-supplied bus and store.
    pub fn with_parts(
        config: TransportConfig,
        connector: C,
        bus: EventBus<Message>,
        store: CanonicalStore,
    ) -> Self {
        let (transport, events) = Transport::new(config, connector);
        let store_subscriptions = store.attach(&bus);
        let (local, local_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(bus.clone(), local_rx, events));
        Self {
            transport,
            views: DerivedViews::new(store.clone()),
            bus,
            store,
            local,
            store_subscriptions,
            dispatcher,
        }
    }

    /// Connect and wait until the connection is open.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.transport.connect().await
    }

    /// Begin connecting without waiting.
    pub fn start(&self) {
        self.transport.start();
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// The event bus; subscribe here for notifications and alerts.
    pub const fn bus(&self) -> &EventBus<Message> {
        &self.bus
    }

    /// The canonical mirror.
    pub const fn store(&self) -> &CanonicalStore {
        &self.store
    }

    /// Memoized projections of the mirror.
    pub const fn views(&self) -> &DerivedViews {
        &self.views
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    /// A handle for sending commands.
    pub fn commands(&self) -> CommandSender<C> {
        CommandSender::new(self.transport.clone(), self.local.clone())
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// A receiver that observes connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.transport.watch_state()
    }

    /// Publish a client-originated message through the inbound queue.
    pub fn publish_local(&self, message: Message) {
        if self.local.send(message).is_err() {
            debug!("client dispatcher stopped; local message dropped");
        }
    }

    /// Detach the store from the bus. Later messages reach other
    /// subscribers but no longer change the mirror.
    pub fn detach_store(&mut self) {
        for subscription in self.store_subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl<C: Connector> Drop for SyncClient<C> {
    fn drop(&mut self) {
        self.transport.disconnect();
        self.dispatcher.abort();
    }
}

impl<C: Connector> std::fmt::Debug for SyncClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("transport", &self.transport)
            .field("revision", &self.store.revision())
            .finish_non_exhaustive()
    }
}

/// Turn a transport event into the message it stands for.
fn translate(event: TransportEvent) -> Option<Message> {
    match event {
        TransportEvent::Opened => Some(Message::Connect(ConnectionNotice::with_message(
            "Connected to simulation backend",
        ))),
        TransportEvent::Frame(text) => match decode_frame(&text) {
            Ok(envelope) => Some(envelope.message),
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                None
            }
        },
        TransportEvent::Closed { reason, .. } => {
            Some(Message::Disconnect(ConnectionNotice::with_message(reason)))
        }
        TransportEvent::Exhausted { attempts } => Some(Message::Error(ServerError {
            message: format!(
                "Unable to reach the simulation backend after {attempts} reconnection attempts"
            ),
            error_code: Some(CONNECTION_EXHAUSTED.to_owned()),
        })),
    }
}

/// Publish inbound messages one at a time.
///
/// A local echo is published only after every transport event already
/// queued when it is picked up, so it lands after the frames that
/// arrived before it was issued.
async fn dispatch(
    bus: EventBus<Message>,
    mut local: mpsc::UnboundedReceiver<Message>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        tokio::select! {
            Some(message) = local.recv() => {
                while let Ok(event) = events.try_recv() {
                    publish_event(&bus, event);
                }
                publish(&bus, &message);
            }
            event = events.recv() => match event {
                Some(event) => publish_event(&bus, event),
                None => break,
            },
        }
    }
    debug!("transport event stream ended, dispatcher stopping");
}

fn publish_event(bus: &EventBus<Message>, event: TransportEvent) {
    if let Some(message) = translate(event) {
        publish(bus, &message);
    }
}

fn publish(bus: &EventBus<Message>, message: &Message) {
    let kind = message.kind();
    if kind.is_high_rate() {
        trace!(%kind, "dispatching");
    } else {
        debug!(%kind, "dispatching");
    }
    let delivery = bus.publish(message);
    if delivery.failed > 0 {
        warn!(%kind, failed = delivery.failed, "some handlers failed");
    }
}
