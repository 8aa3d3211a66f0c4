//! LinkWave Mobile Core Library
//!
//! The entry point a host mobile application embeds. Wraps the protocol
//! core behind a small, thread-safe surface: lifecycle, one request
//! call, connection-state subscriptions, and history stitching. UI,
//! media, and REST flows live in the host app and consume this crate's
//! outputs.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, instrument, warn};

use linkwave_core::{MessageRecord, MessageStore, RemoteId, Scope, Timestamp};
use linkwave_protocol::{
    codes, derive_sequence, ClientConfig, Connection, ConnectionObserver, ConnectionObservers,
    ConnectionState, Frame, MessageBlockAllocator, MessageQueueManager, PacketOutcome,
    PresenceProcessor, ProtocolError, SignGenerator, SubscriptionId, TransportFactory,
};

/// SDK-level error types surfaced to the host application.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not initialized")]
    NotInitialized,

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("Not connected")]
    NotConnected,

    #[error("Request failed {code}: {message}")]
    Request { code: u32, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for SDK operations
pub type ClientResult<T> = Result<T, ClientError>;

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Timeout(_) => ClientError::Timeout,
            ProtocolError::NotConnected(_) => ClientError::NotConnected,
            ProtocolError::Protocol { code, message } => ClientError::Request { code, message },
            other => ClientError::Internal(other.to_string()),
        }
    }
}

/// Client lifecycle state
enum ClientState {
    /// Not initialized
    Uninitialized,
    /// Initializing
    Initializing,
    /// Ready for operations
    Ready,
    /// Shutting down
    ShuttingDown,
}

struct ClientInner {
    state: ClientState,
    connection: Option<Arc<Connection>>,
    queue: Option<Arc<MessageQueueManager>>,
    close_subscription: Option<SubscriptionId>,
}

/// LinkWave SDK client.
///
/// Main entry point for the host application. Thread-safe; one
/// instance per logged-in session.
pub struct LinkWaveClient {
    config: ClientConfig,
    signs: Arc<SignGenerator>,
    observers: Arc<ConnectionObservers>,
    presence: Arc<PresenceProcessor>,
    store: Arc<dyn MessageStore>,
    transports: Arc<dyn TransportFactory>,
    allocator: MessageBlockAllocator,
    inner: RwLock<ClientInner>,
}

impl LinkWaveClient {
    /// Create a client over the host-provided store and transport
    /// factory. Rejects invalid configuration up front.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn MessageStore>,
        transports: Arc<dyn TransportFactory>,
    ) -> ClientResult<Self> {
        config
            .validate()
            .map_err(|e| ClientError::Internal(e.to_string()))?;

        let signs = Arc::new(SignGenerator::new());
        Ok(Self {
            config,
            signs: signs.clone(),
            observers: Arc::new(ConnectionObservers::new()),
            presence: Arc::new(PresenceProcessor::new()),
            store: store.clone(),
            transports,
            allocator: MessageBlockAllocator::new(store, signs),
            inner: RwLock::new(ClientInner {
                state: ClientState::Uninitialized,
                connection: None,
                queue: None,
                close_subscription: None,
            }),
        })
    }

    /// Initialize the client. Must be called once before anything else.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> ClientResult<()> {
        {
            let mut inner = self.inner.write();
            match inner.state {
                ClientState::Ready | ClientState::Initializing => {
                    return Err(ClientError::AlreadyInitialized)
                }
                _ => inner.state = ClientState::Initializing,
            }
        }

        info!(device = %self.config.device_name, "initializing LinkWave client");
        self.inner.write().state = ClientState::Ready;
        Ok(())
    }

    /// Check if the client is ready
    pub fn is_ready(&self) -> bool {
        matches!(self.inner.read().state, ClientState::Ready)
    }

    /// Establish a fresh connection. Any previous connection is closed
    /// and discarded; its socket handle is never reused.
    #[instrument(skip(self))]
    pub fn connect(&self) -> ClientResult<()> {
        self.ensure_ready()?;
        self.teardown_connection();

        let transport = self.transports.create();
        let connection = Arc::new(Connection::new(transport, self.observers.clone()));
        let queue = Arc::new(MessageQueueManager::new(
            self.config.clone(),
            self.signs.clone(),
            connection.clone(),
        ));
        queue.add_processor(self.presence.clone());

        // Stale packets referencing a closed connection are failed,
        // never silently orphaned.
        let close_subscription = self.observers.subscribe(Arc::new(CloseFailsPending {
            queue: Arc::downgrade(&queue),
        }));

        {
            let mut inner = self.inner.write();
            inner.connection = Some(connection.clone());
            inner.queue = Some(queue);
            inner.close_subscription = Some(close_subscription);
        }

        connection.connect()?;
        Ok(())
    }

    /// Current connection state, if a connection exists
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.inner.read().connection.as_ref().map(|c| c.state())
    }

    /// Submit a request and await its correlated response, bounded by
    /// the caller-side safety-net deadline.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn request(&self, payload: Vec<u8>) -> ClientResult<Vec<u8>> {
        self.ensure_ready()?;
        let queue = self
            .inner
            .read()
            .queue
            .clone()
            .ok_or(ClientError::NotConnected)?;

        let packet = queue.submit(payload)?;
        let outcome = packet.wait(self.config.network.caller_deadline()).await?;
        match outcome {
            PacketOutcome::Success(response) => Ok(response),
            PacketOutcome::Fail { code, message } if code == codes::ERR_TIMEOUT => {
                warn!(sign = %packet.sign(), "request timed out: {message}");
                Err(ClientError::Timeout)
            }
            PacketOutcome::Fail { code, message } => Err(ClientError::Request { code, message }),
        }
    }

    /// Feed one inbound decoded frame from the host's reader loop.
    pub fn dispatch_frame(&self, frame: Frame) {
        if let Some(queue) = self.inner.read().queue.clone() {
            queue.dispatch(frame);
        } else {
            warn!(sign = %frame.sign, "frame arrived with no active connection; dropping");
        }
    }

    /// Subscribe to connection state changes. Fire-and-forget from the
    /// core's perspective; never awaited.
    pub fn subscribe_connection_state(
        &self,
        observer: Arc<dyn ConnectionObserver>,
    ) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Remove a connection state subscription
    pub fn unsubscribe_connection_state(&self, id: SubscriptionId) {
        self.observers.unsubscribe(id)
    }

    /// Last known presence for a contact, from server pushes
    pub fn is_online(&self, user_id: &str) -> Option<bool> {
        self.presence.is_online(user_id)
    }

    /// Store one fetched history message and stitch it into the
    /// scope's contiguous blocks: pick its block from the neighbors,
    /// derive its local sequence, persist, then merge toward older
    /// history. Returns the record as stored.
    pub fn store_history_message(&self, scope: &Scope, remote_id: RemoteId) -> MessageRecord {
        let sign = self.signs.next_sign();
        let block_id = self.allocator.assign_block_id(scope, remote_id);
        let record = MessageRecord {
            remote_id,
            block_id,
            sequence: derive_sequence(sign, scope),
            stored_at: Timestamp::now(),
        };
        self.store.insert_record(scope, record.clone());
        self.allocator.expand_block_id(scope, remote_id);
        record
    }

    /// Close the current connection, if any. Pending requests fail
    /// with a connection-closed error.
    pub fn disconnect(&self) {
        self.teardown_connection();
    }

    /// Shut the client down. Idempotent; the instance is not reusable.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        self.inner.write().state = ClientState::ShuttingDown;
        self.teardown_connection();
        info!("LinkWave client shut down");
    }

    // Helper methods

    fn ensure_ready(&self) -> ClientResult<()> {
        if !self.is_ready() {
            return Err(ClientError::NotInitialized);
        }
        Ok(())
    }

    fn teardown_connection(&self) {
        let (connection, subscription) = {
            let mut inner = self.inner.write();
            inner.queue = None;
            (inner.connection.take(), inner.close_subscription.take())
        };
        if let Some(connection) = connection {
            connection.close();
        }
        if let Some(id) = subscription {
            self.observers.unsubscribe(id);
        }
    }
}

/// Fails every pending packet once its connection reaches `Closed`.
struct CloseFailsPending {
    queue: Weak<MessageQueueManager>,
}

impl ConnectionObserver for CloseFailsPending {
    fn on_state_changed(&self, _old: ConnectionState, new: ConnectionState) {
        if new == ConnectionState::Closed {
            if let Some(queue) = self.queue.upgrade() {
                queue.fail_all_pending(codes::ERR_CONN_CLOSED, "connection closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwave_core::MemoryStore;
    use linkwave_protocol::{LoopbackTransport, Transport};
    use std::time::Duration;

    struct SharedLoopback {
        current: parking_lot::Mutex<Arc<LoopbackTransport>>,
    }

    impl SharedLoopback {
        fn new() -> Self {
            Self {
                current: parking_lot::Mutex::new(Arc::new(LoopbackTransport::new())),
            }
        }

        fn current(&self) -> Arc<LoopbackTransport> {
            self.current.lock().clone()
        }
    }

    impl TransportFactory for SharedLoopback {
        fn create(&self) -> Arc<dyn Transport> {
            let fresh = Arc::new(LoopbackTransport::new());
            *self.current.lock() = fresh.clone();
            fresh
        }
    }

    fn client() -> (LinkWaveClient, Arc<SharedLoopback>) {
        let loopback = Arc::new(SharedLoopback::new());
        let client = LinkWaveClient::new(
            ClientConfig::default(),
            Arc::new(MemoryStore::new()),
            loopback.clone(),
        )
        .unwrap();
        (client, loopback)
    }

    #[test]
    fn test_initialize_once() {
        let (client, _) = client();
        assert!(!client.is_ready());

        client.initialize().unwrap();
        assert!(client.is_ready());

        assert!(matches!(
            client.initialize(),
            Err(ClientError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_request_requires_initialization() {
        let (client, _) = client();
        assert!(matches!(client.connect(), Err(ClientError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (client, loopback) = client();
        client.initialize().unwrap();
        client.connect().unwrap();
        assert_eq!(client.connection_state(), Some(ConnectionState::Connected));

        let client = Arc::new(client);
        let echo_client = client.clone();
        let transport = loopback.current();
        tokio::spawn(async move {
            loop {
                for bytes in transport.drain_written() {
                    let request = Frame::decode(&bytes).unwrap();
                    echo_client.dispatch_frame(Frame::response_ok(request.sign, request.payload));
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let response = client.request(b"hello".to_vec()).await.unwrap();
        assert_eq!(response, b"hello");
    }

    #[tokio::test]
    async fn test_disconnect_fails_in_flight_request() {
        let (client, _) = client();
        client.initialize().unwrap();
        client.connect().unwrap();

        let client = Arc::new(client);
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.request(b"stuck".to_vec()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.disconnect();

        let result = waiter.await.unwrap();
        assert!(matches!(
            result,
            Err(ClientError::Request {
                code: codes::ERR_CONN_CLOSED,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reconnect_builds_fresh_connection() {
        let (client, loopback) = client();
        client.initialize().unwrap();

        client.connect().unwrap();
        let first = loopback.current();
        client.connect().unwrap();
        let second = loopback.current();

        // New transport per attempt; the old one is closed for good.
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!first.is_open());
        assert!(second.is_open());
        assert_eq!(client.connection_state(), Some(ConnectionState::Connected));
    }

    #[test]
    fn test_history_pages_merge_into_one_block() {
        let (client, _) = client();
        client.initialize().unwrap();
        let scope = Scope::new("session-1", "conv-42");

        // Newest page arrives first, then an older page, the way
        // history is paged in.
        let newest: Vec<_> = (96..=100)
            .rev()
            .map(|id| client.store_history_message(&scope, RemoteId::from_raw(id)))
            .collect();
        let older: Vec<_> = (91..=95)
            .rev()
            .map(|id| client.store_history_message(&scope, RemoteId::from_raw(id)))
            .collect();

        let block = newest[0].block_id;
        for record in newest.iter().chain(older.iter()) {
            let stored = client
                .store
                .find_record_by_remote_id(&scope, record.remote_id)
                .unwrap();
            assert_eq!(stored.block_id, block);
        }
    }

    #[test]
    fn test_disjoint_history_ranges_get_distinct_blocks() {
        let (client, _) = client();
        client.initialize().unwrap();
        let scope = Scope::new("session-1", "conv-42");

        let recent = client.store_history_message(&scope, RemoteId::from_raw(500));
        let ancient = client.store_history_message(&scope, RemoteId::from_raw(10));
        assert_ne!(recent.block_id, ancient.block_id);

        // Filling the gap next to the ancient message joins its block.
        let neighbor = client.store_history_message(&scope, RemoteId::from_raw(11));
        assert_eq!(neighbor.block_id, ancient.block_id);
    }
}
