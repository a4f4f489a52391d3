//! Transaction Layer.
//!
//! A transaction pairs one request with the responses it provokes and
//! runs the RFC 3261 section 17 state machine over the exchange:
//! retransmitting on unreliable channels, replaying answers at peers
//! that retransmit, and timing the whole thing out when the other side
//! goes quiet. The network layer creates transactions through a
//! [`TransactionFactory`] and routes follow-up traffic to them through
//! the [`TransactionRegistry`].

pub(crate) mod client;
pub mod key;
pub(crate) mod server;
pub(crate) mod server_inv;

pub use client::ClientTransaction;
pub use key::TransactionKey;
pub use server::ServerTransaction;
pub use server_inv::ServerInvTransaction;

use std::collections::HashMap;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock as AsyncRwLock;
use tokio::time;

use crate::channel::Channel;
use crate::endpoint::EndPoint;
use crate::error::{Error, Result};
use crate::message::StatusCode;
use crate::network::{
    IncomingRequest, IncomingResponse, NetworkLayer, OutgoingRequest, OutgoingResponse,
};

/// Estimated round‑trip time (RTT) for message exchanges.
pub(crate) const T1: Duration = Duration::from_millis(500);

/// Maximum retransmission interval for non‑INVITE requests and INVITE responses.
pub(crate) const T2: Duration = Duration::from_secs(4);

/// Maximum duration that a message may remain in the network before being discarded.
pub(crate) const T4: Duration = Duration::from_secs(5);

/// The role a transaction plays in its exchange.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy)]
pub enum Role {
    /// User Agent Server.
    UAS,
    /// User Agent Client.
    UAC,
}

/// The state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Created but nothing sent or received yet.
    #[default]
    Initial,
    /// An INVITE went out, no response back yet.
    Calling,
    /// A non-INVITE request went out or came in.
    Trying,
    /// A provisional response was seen.
    Proceeding,
    /// A final response was seen, the exchange is winding down.
    Completed,
    /// The ACK for a non-2xx final arrived (INVITE server only).
    Confirmed,
    /// Finished. The registry entry is gone or about to be.
    Terminated,
}

struct TsxInner {
    role: Role,
    key: TransactionKey,
    channel: Channel,
    addr: SocketAddr,
    endpoint: EndPoint,
    network: NetworkLayer,
    state: Mutex<State>,
    status_code: RwLock<Option<StatusCode>>,
    retransmit_count: AtomicU32,
    last_msg: AsyncRwLock<Option<Bytes>>,
}

/// State shared by every transaction flavor.
///
/// The flavors deref to this, so the common accessors read the same on
/// all of them.
#[derive(Clone)]
pub struct Transaction(Arc<TsxInner>);

impl Transaction {
    /// The key this transaction is matched under.
    pub fn key(&self) -> &TransactionKey {
        &self.0.key
    }

    /// The current state.
    pub fn state(&self) -> State {
        *self.0.state.lock().expect("Lock failed")
    }

    /// The code of the last response sent or received, if any.
    pub fn last_status_code(&self) -> Option<StatusCode> {
        *self.0.status_code.read().expect("Lock failed")
    }

    /// How many times the last message went out again.
    pub fn retrans_count(&self) -> u32 {
        self.0.retransmit_count.load(Ordering::Relaxed)
    }

    /// Whether the channel retransmits on its own.
    pub fn is_reliable(&self) -> bool {
        self.0.channel.is_reliable()
    }

    pub(crate) fn is_invite(&self) -> bool {
        self.0.key.method().is_invite()
    }

    pub(crate) fn network(&self) -> &NetworkLayer {
        &self.0.network
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.0.addr
    }

    pub(crate) fn set_state(&self, state: State) {
        let old = {
            let mut guard = self.0.state.lock().expect("Lock failed");
            mem::replace(&mut *guard, state)
        };
        log::trace!("State Changed [{old:?} -> {state:?}] ({:p})", self.0);
    }

    fn set_last_status_code(&self, code: StatusCode) {
        *self.0.status_code.write().expect("Lock failed") = Some(code);
    }

    fn add_retrans_count(&self) -> u32 {
        self.0.retransmit_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn set_last_msg(&self, buf: Bytes) {
        *self.0.last_msg.write().await = Some(buf);
    }

    /// Sends the last transmitted message again.
    pub(crate) async fn retransmit(&self) -> Result<u32> {
        let retransmitted = {
            let last_msg = self.0.last_msg.read().await;
            if let Some(msg) = last_msg.as_ref() {
                self.0.channel.send(msg, &self.0.addr).await?;
                true
            } else {
                false
            }
        };

        if retransmitted {
            Ok(self.add_retrans_count())
        } else {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "No message to retransmit",
            )))
        }
    }

    /// Sends an already encoded message and keeps it for
    /// retransmission.
    pub(crate) async fn send_buf(&self, buf: Bytes) -> Result<()> {
        self.0.channel.send(&buf, &self.0.addr).await?;
        self.set_last_msg(buf).await;

        Ok(())
    }

    /// Sends a response and records it as the last message.
    pub(crate) async fn send_response(&self, response: &mut OutgoingResponse) -> Result<()> {
        let buf = response.encode()?;
        self.0.network.send_response(response).await?;
        self.set_last_status_code(response.code());
        self.set_last_msg(buf).await;

        Ok(())
    }

    /// Terminates the transaction after `time` has elapsed.
    pub(crate) fn schedule_termination(&self, time: Duration) {
        let tsx = self.clone();
        tokio::spawn(async move {
            time::sleep(time).await;
            tsx.on_terminated();
        });
    }

    /// Moves to `Terminated` and unregisters from the network layer.
    pub(crate) fn on_terminated(&self) {
        self.set_state(State::Terminated);
        self.0
            .network
            .on_transaction_terminated(self.0.role, &self.0.endpoint, &self.0.key);
    }
}

#[derive(Default)]
pub(crate) struct TransactionBuilder {
    role: Option<Role>,
    key: Option<TransactionKey>,
    channel: Option<Channel>,
    addr: Option<SocketAddr>,
    endpoint: Option<EndPoint>,
    network: Option<NetworkLayer>,
    state: Option<State>,
    last_msg: Option<Bytes>,
}

impl TransactionBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_role(&mut self, role: Role) -> &mut Self {
        self.role = Some(role);
        self
    }

    pub(crate) fn set_key(&mut self, key: TransactionKey) -> &mut Self {
        self.key = Some(key);
        self
    }

    pub(crate) fn set_channel(&mut self, channel: Channel) -> &mut Self {
        self.channel = Some(channel);
        self
    }

    pub(crate) fn set_addr(&mut self, addr: SocketAddr) -> &mut Self {
        self.addr = Some(addr);
        self
    }

    pub(crate) fn set_endpoint(&mut self, endpoint: EndPoint) -> &mut Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub(crate) fn set_network(&mut self, network: NetworkLayer) -> &mut Self {
        self.network = Some(network);
        self
    }

    pub(crate) fn set_state(&mut self, state: State) -> &mut Self {
        self.state = Some(state);
        self
    }

    pub(crate) fn set_last_msg(&mut self, msg: Bytes) -> &mut Self {
        self.last_msg = Some(msg);
        self
    }

    pub(crate) fn build(self) -> Transaction {
        let transaction = Transaction(Arc::new(TsxInner {
            role: self.role.expect("Role is required"),
            key: self.key.expect("Key is required"),
            channel: self.channel.expect("Channel is required"),
            addr: self.addr.expect("Address is required"),
            endpoint: self.endpoint.expect("Endpoint is required"),
            network: self.network.expect("Network is required"),
            state: Mutex::new(self.state.unwrap_or_default()),
            status_code: RwLock::new(None),
            retransmit_count: AtomicU32::new(0),
            last_msg: AsyncRwLock::new(self.last_msg),
        }));

        log::trace!(
            "Transaction Created [{:#?}] ({:p})",
            transaction.0.role,
            transaction.0
        );

        transaction
    }
}

/// A UAS transaction, in the flavor the request method calls for.
#[derive(Clone)]
pub enum ServerTsx {
    /// Everything but INVITE.
    NonInvite(ServerTransaction),
    /// INVITE, with its own response retransmission ladder.
    Invite(ServerInvTransaction),
}

impl ServerTsx {
    /// The key this transaction is matched under.
    pub fn key(&self) -> &TransactionKey {
        match self {
            Self::NonInvite(tsx) => tsx.key(),
            Self::Invite(tsx) => tsx.key(),
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        match self {
            Self::NonInvite(tsx) => tsx.state(),
            Self::Invite(tsx) => tsx.state(),
        }
    }

    /// Sends a response through the transaction.
    pub async fn respond(&self, response: &mut OutgoingResponse) -> Result<()> {
        match self {
            Self::NonInvite(tsx) => tsx.respond(response).await,
            Self::Invite(tsx) => tsx.respond(response).await,
        }
    }

    pub(crate) async fn receive_request(&self, request: &IncomingRequest) -> Result<()> {
        match self {
            Self::NonInvite(tsx) => tsx.receive_request(request).await,
            Self::Invite(tsx) => tsx.receive_request(request).await,
        }
    }

    fn shutdown(&self) {
        match self {
            Self::NonInvite(tsx) => tsx.shutdown(),
            Self::Invite(tsx) => tsx.shutdown(),
        }
    }
}

/// Creates the transactions the network layer attaches to traffic.
pub trait TransactionFactory: Send + Sync + 'static {
    /// Builds a UAC transaction for a request about to leave.
    fn create_client(
        &self,
        network: &NetworkLayer,
        request: &OutgoingRequest,
    ) -> Result<ClientTransaction>;

    /// Builds a UAS transaction for a request that just arrived.
    fn create_server(
        &self,
        network: &NetworkLayer,
        request: &IncomingRequest,
    ) -> Result<ServerTsx>;
}

/// The RFC 3261 state machines.
pub struct DefaultTransactionFactory;

impl TransactionFactory for DefaultTransactionFactory {
    fn create_client(
        &self,
        network: &NetworkLayer,
        request: &OutgoingRequest,
    ) -> Result<ClientTransaction> {
        ClientTransaction::create(network, request)
    }

    fn create_server(
        &self,
        network: &NetworkLayer,
        request: &IncomingRequest,
    ) -> Result<ServerTsx> {
        if request.msg.method().is_invite() {
            Ok(ServerTsx::Invite(ServerInvTransaction::create(
                network, request,
            )))
        } else {
            Ok(ServerTsx::NonInvite(ServerTransaction::create(
                network, request,
            )))
        }
    }
}

type Transactions<T> = Mutex<HashMap<TransactionKey, T>>;

/// Every live transaction, keyed for inbound matching.
#[derive(Default)]
pub struct TransactionRegistry {
    client_transactions: Transactions<ClientTransaction>,
    server_transactions: Transactions<ServerTsx>,
}

impl TransactionRegistry {
    fn find_client(&self, key: &TransactionKey) -> Option<ClientTransaction> {
        let transactions = self.client_transactions.lock().expect("Lock failed");
        transactions.get(key).cloned()
    }

    fn find_server(&self, key: &TransactionKey) -> Option<ServerTsx> {
        let transactions = self.server_transactions.lock().expect("Lock failed");
        transactions.get(key).cloned()
    }

    pub(crate) fn register_client(&self, tsx: ClientTransaction) {
        let key = tsx.key().clone();
        let mut transactions = self.client_transactions.lock().expect("Lock failed");
        transactions.insert(key, tsx);
    }

    pub(crate) fn register_server(&self, tsx: ServerTsx) {
        let key = tsx.key().clone();
        let mut transactions = self.server_transactions.lock().expect("Lock failed");
        transactions.insert(key, tsx);
    }

    pub(crate) fn remove_client(&self, key: &TransactionKey) -> Option<ClientTransaction> {
        let mut transactions = self.client_transactions.lock().expect("Lock failed");
        transactions.remove(key)
    }

    pub(crate) fn remove_server(&self, key: &TransactionKey) -> Option<ServerTsx> {
        let mut transactions = self.server_transactions.lock().expect("Lock failed");
        transactions.remove(key)
    }

    /// Hands an inbound request to the transaction it retransmits or
    /// acknowledges. `Ok(false)` means no transaction claimed it.
    ///
    /// The ACK for a non-2xx final carries the To tag the UAS put in
    /// its answer, while the INVITE that opened the transaction had
    /// none. The second probe with the tag stripped covers that.
    pub(crate) async fn handle_request(&self, request: &IncomingRequest) -> Result<bool> {
        let headers = &request.request_headers;
        let key = TransactionKey::server(&headers.call_id, &headers.cseq, &headers.to);

        let tsx = match self.find_server(&key) {
            Some(tsx) => Some(tsx),
            None => key.untagged().and_then(|key| self.find_server(&key)),
        };
        let Some(tsx) = tsx else {
            return Ok(false);
        };

        tsx.receive_request(request).await?;

        Ok(true)
    }

    /// Routes an inbound response through the client transaction its
    /// topmost Via branch names. `Ok(true)` means the transaction
    /// absorbed it and the delegate must not see it.
    pub(crate) async fn handle_response(&self, response: &IncomingResponse) -> Result<bool> {
        let headers = &response.request_headers;
        let Some(branch) = headers.via.branch() else {
            return Ok(false);
        };
        let key = TransactionKey::client(headers.cseq.method().clone(), branch);

        let Some(tsx) = self.find_client(&key) else {
            return Ok(false);
        };

        tsx.receive(response).await
    }

    /// Shuts down and drops the given transactions. Used when the
    /// channel under them closes.
    pub(crate) fn terminate_all(&self, keys: &[TransactionKey]) {
        for key in keys {
            if let Some(tsx) = self.remove_client(key) {
                tsx.shutdown();
            }
            if let Some(tsx) = self.remove_server(key) {
                tsx.shutdown();
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{self, RAW_ACK, RAW_INVITE, RAW_OPTIONS};
    use super::*;

    use crate::channel::mock::MockChannel;
    use crate::message::Method;

    #[tokio::test]
    async fn test_response_routed_by_branch() {
        let network = mock::network();
        let mock = MockChannel::new_udp();
        let request = mock::outgoing_request(RAW_OPTIONS, &mock);

        let tsx = ClientTransaction::create(&network, &request).unwrap();
        network.registry().register_client(tsx.clone());

        let raw = mock::raw_response(StatusCode::OK, Method::Options);
        let response = mock::incoming_response(&raw, &mock);
        let claimed = network.registry().handle_response(&response).await.unwrap();

        assert!(!claimed, "the first final response goes to the delegate");
        assert_eq!(tsx.state(), State::Completed);

        let retrans = mock::incoming_response(&raw, &mock);
        let claimed = network.registry().handle_response(&retrans).await.unwrap();

        assert!(claimed, "a retransmitted final is absorbed");
    }

    #[tokio::test]
    async fn test_response_without_transaction_is_not_claimed() {
        let network = mock::network();
        let mock = MockChannel::new_udp();

        let raw = mock::raw_response(StatusCode::OK, Method::Options);
        let response = mock::incoming_response(&raw, &mock);
        let claimed = network.registry().handle_response(&response).await.unwrap();

        assert!(!claimed);
    }

    #[tokio::test]
    async fn test_ack_matches_the_invite_transaction() {
        let network = mock::network();
        let mock = MockChannel::new_udp();
        let request = mock::incoming_request(RAW_INVITE, &mock);

        let tsx = DefaultTransactionFactory
            .create_server(&network, &request)
            .unwrap();
        network.registry().register_server(tsx.clone());

        let mut response = request.new_response(StatusCode::BUSY_HERE);
        tsx.respond(&mut response).await.unwrap();
        assert_eq!(tsx.state(), State::Completed);

        let ack = mock::incoming_request(RAW_ACK, &mock);
        let claimed = network.registry().handle_request(&ack).await.unwrap();

        assert!(claimed, "the tagged ACK must find the untagged INVITE key");
        assert_eq!(tsx.state(), State::Confirmed);
    }

    #[tokio::test]
    async fn test_request_retransmission_is_claimed() {
        let network = mock::network();
        let mock = MockChannel::new_udp();
        let request = mock::incoming_request(RAW_OPTIONS, &mock);

        let tsx = DefaultTransactionFactory
            .create_server(&network, &request)
            .unwrap();
        network.registry().register_server(tsx.clone());

        let mut response = request.new_response(StatusCode::OK);
        tsx.respond(&mut response).await.unwrap();

        let retrans = mock::incoming_request(RAW_OPTIONS, &mock);
        let claimed = network.registry().handle_request(&retrans).await.unwrap();

        assert!(claimed);
        assert_eq!(mock.sent().await.len(), 2, "the 200 OK must be replayed");
    }

    #[tokio::test]
    async fn test_terminate_all_shuts_transactions_down() {
        let network = mock::network();
        let mock = MockChannel::new_udp();
        let request = mock::outgoing_request(RAW_OPTIONS, &mock);

        let tsx = ClientTransaction::create(&network, &request).unwrap();
        network.registry().register_client(tsx.clone());

        let keys = vec![tsx.key().clone()];
        network.registry().terminate_all(&keys);

        assert_eq!(tsx.state(), State::Terminated);
        assert!(network.registry().find_client(&keys[0]).is_none());
    }
}
