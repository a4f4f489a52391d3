//! Network Layer.
//!
//! Owns the pool of [`Channel`]s, turns raw packets into parsed
//! messages, routes them through the transaction layer and hands
//! whatever is left to the [`NetworkDelegate`].
//!
//! All pool mutations happen on the event loop started by
//! [`NetworkLayer::run`], fed by the queue every channel writes into.

pub(crate) mod aliases;
pub(crate) mod context;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use itertools::Itertools;
use rand::distr::{Alphanumeric, SampleString};
use tokio::sync::oneshot;

use crate::auth::PasswordHandler;
use crate::cert::{CertErrorInfo, ClientIdentity, SslCertErrorHandler, SslCertErrorTransaction};
use crate::channel::{
    event_queue, Channel, ChannelEvent, ChannelFactory, ChannelRx, ChannelTx, ConnectOverride,
    Packet, KEEPALIVE_REQUEST, KEEPALIVE_RESPONSE,
};
use crate::endpoint::{EndPoint, Protocol};
use crate::error::{Error, Result};
use crate::headers::{
    CSeq, CallId, Contact, ContentLength, From as FromHdr, Header, HeaderParse, Headers, Rport,
    To, Via,
};
use crate::message::{
    Host, HostPort, Request, Response, Scheme, SipMsg, SipUri, StatusCode, StatusLine, ToBytes,
    Uri,
};
use crate::parser::{Parser, MAX_MESSAGE_SIZE};
use crate::transaction::key::BRANCH_RFC3261;
use crate::transaction::{
    DefaultTransactionFactory, Role, ServerTsx, TransactionFactory, TransactionKey,
    TransactionRegistry,
};

use self::aliases::AliasesMap;
use self::context::{ChannelContext, ContextState, QueuedSend};

/// How long an unused channel stays pooled before it is closed.
const DEFAULT_REUSE_LIFETIME: Duration = Duration::from_secs(60);

/// Creates `Via` branch parameters for outgoing requests.
pub trait BranchFactory: Send + Sync + 'static {
    /// Returns a new branch, unique per transaction, starting with the
    /// RFC 3261 magic cookie.
    fn create_branch(&self) -> String;
}

/// The default [`BranchFactory`]: the magic cookie followed by sixteen
/// random alphanumerics.
#[derive(Default)]
pub struct RandomBranch;

impl BranchFactory for RandomBranch {
    fn create_branch(&self) -> String {
        let suffix = Alphanumeric.sample_string(&mut rand::rng(), 16);

        format!("{BRANCH_RFC3261}{suffix}")
    }
}

/// Callbacks the network layer raises towards its user.
///
/// Requests and responses only reach the delegate after the
/// transaction layer declined them, so retransmissions never show up
/// here.
#[async_trait::async_trait]
#[allow(unused_variables)]
pub trait NetworkDelegate: Sync + Send + 'static {
    /// Called for an inbound request no transaction claimed.
    async fn on_incoming_request(&self, network: &NetworkLayer, request: &mut IncomingRequest) {}

    /// Called for an inbound response no transaction claimed.
    async fn on_incoming_response(&self, network: &NetworkLayer, response: &mut IncomingResponse) {
    }

    /// Called when a channel enters the pool.
    async fn on_channel_connected(&self, network: &NetworkLayer, endpoint: &EndPoint) {}

    /// Called when a pooled channel goes away, with the error that
    /// closed it if there was one.
    async fn on_channel_closed(
        &self,
        network: &NetworkLayer,
        endpoint: &EndPoint,
        error: Option<&Error>,
    ) {
    }

    /// Called when a transaction gave up waiting for the peer.
    async fn on_timed_out(&self, network: &NetworkLayer, key: &TransactionKey) {}

    /// Called when an outbound connect or certificate check failed.
    async fn on_transport_error(&self, network: &NetworkLayer, endpoint: &EndPoint, error: &Error) {
    }
}

/// Shared, detachable reference to the delegate.
#[derive(Clone, Default)]
pub(crate) struct DelegateHandle(Arc<RwLock<Option<Arc<dyn NetworkDelegate>>>>);

impl DelegateHandle {
    fn new(delegate: Option<Arc<dyn NetworkDelegate>>) -> Self {
        Self(Arc::new(RwLock::new(delegate)))
    }

    pub(crate) fn get(&self) -> Option<Arc<dyn NetworkDelegate>> {
        self.0.read().expect("Lock failed").clone()
    }

    fn detach(&self) {
        self.0.write().expect("Lock failed").take();
    }
}

/// The headers every dispatched message must carry.
///
/// Extracted once at ingress so transactions and user code never deal
/// with their absence again.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    /// The topmost `Via`, with `received` and `rport` stamped.
    pub via: Via,
    /// The `From` header.
    pub from: FromHdr,
    /// The `To` header.
    pub to: To,
    /// The `Call-ID` header.
    pub call_id: CallId,
    /// The `CSeq` header.
    pub cseq: CSeq,
}

impl TryFrom<&Headers> for RequestHeaders {
    type Error = Error;

    fn try_from(headers: &Headers) -> Result<Self> {
        fn required<T: Clone>(value: Option<&T>, name: &'static str) -> Result<T> {
            value.cloned().ok_or(Error::MissingRequiredHeader(name))
        }

        Ok(Self {
            via: required(headers.topmost_via(), Via::NAME)?,
            from: required(headers.from_hdr(), FromHdr::NAME)?,
            to: required(headers.to_hdr(), To::NAME)?,
            call_id: required(headers.call_id(), CallId::NAME)?,
            cseq: required(headers.cseq(), CSeq::NAME)?,
        })
    }
}

/// An inbound request, parsed and stamped, on its way to the user.
pub struct IncomingRequest {
    /// The parsed request. Shared with the server transaction.
    pub msg: Arc<Request>,
    /// The channel the request arrived on.
    pub channel: Channel,
    /// The raw packet.
    pub packet: Packet,
    /// The pool endpoint of the source, after alias resolution.
    pub endpoint: EndPoint,
    /// The mandatory headers.
    pub request_headers: RequestHeaders,
    /// The server transaction, present for everything but `ACK`.
    pub tsx: Option<ServerTsx>,
}

impl IncomingRequest {
    /// Builds a response to this request with the status line set to
    /// `code` and its default reason phrase.
    ///
    /// Copies `Via`, `Record-Route`, `Call-ID`, `From`, `To` and
    /// `CSeq` over, and adds a `To` tag on anything above 100 that
    /// does not have one yet (RFC 3261 8.2.6.2).
    pub fn new_response(&self, code: StatusCode) -> OutgoingResponse {
        let msg_headers = &self.msg.headers;
        let mut headers = Headers::with_capacity(7);

        let vias = msg_headers.filter(|h| matches!(h, Header::Via(_)));
        headers.extend(vias.cloned());

        let rr = msg_headers.filter(|h| matches!(h, Header::RecordRoute(_)));
        headers.extend(rr.cloned());

        headers.push(Header::CallId(self.request_headers.call_id.clone()));
        headers.push(Header::From(self.request_headers.from.clone()));

        let mut to = self.request_headers.to.clone();
        if to.tag().is_none() && code > StatusCode::TRYING {
            to.set_tag(self.request_headers.via.branch());
        }
        headers.push(Header::To(to));
        headers.push(Header::CSeq(self.request_headers.cseq.clone()));

        let mut response = Response::new(StatusLine::from_code(code));
        response.headers = headers;

        OutgoingResponse {
            msg: response,
            refers_to: self.msg.clone(),
            channel: self.channel.clone(),
            addr: self.outbound_addr(),
            buf: None,
        }
    }

    /// Where a response to this request goes.
    ///
    /// Reliable channels answer on the connection itself; for
    /// datagrams the `Via` decides, per RFC 3261 18.2.2 and RFC 3581.
    pub(crate) fn outbound_addr(&self) -> SocketAddr {
        if self.channel.is_reliable() {
            return self.packet.addr;
        }

        let via = &self.request_headers.via;
        if let Some(maddr) = via.maddr().as_ref() {
            let port = via
                .sent_by()
                .port
                .unwrap_or_else(|| via.transport().default_port());
            let endpoint = EndPoint::new(maddr.clone(), port, via.transport());

            return endpoint.addr().unwrap_or(self.packet.addr);
        }

        via.response_target().addr().unwrap_or(self.packet.addr)
    }
}

/// An inbound response on its way to the user.
pub struct IncomingResponse {
    /// The parsed response.
    pub msg: Response,
    /// The channel the response arrived on.
    pub channel: Channel,
    /// The raw packet.
    pub packet: Packet,
    /// The pool endpoint of the source, after alias resolution.
    pub endpoint: EndPoint,
    /// The mandatory headers.
    pub request_headers: RequestHeaders,
}

/// A request prepared for the wire, as handed to the transaction
/// factory.
pub struct OutgoingRequest {
    /// The request, `Via` and `Contact` already completed.
    pub msg: Request,
    /// The channel that will carry it.
    pub channel: Channel,
    /// The resolved destination address.
    pub addr: SocketAddr,
    /// The pool endpoint the request was routed to.
    pub endpoint: EndPoint,
    /// The encoded form.
    pub buf: Option<Bytes>,
}

/// A response built from an [`IncomingRequest`].
pub struct OutgoingResponse {
    /// The response message.
    pub msg: Response,
    /// The request this response answers.
    pub refers_to: Arc<Request>,
    /// The channel the request arrived on.
    pub channel: Channel,
    /// The resolved destination address.
    pub addr: SocketAddr,
    /// The encoded form, cached by [`OutgoingResponse::encode`].
    pub buf: Option<Bytes>,
}

impl OutgoingResponse {
    /// The status code of the response.
    pub fn code(&self) -> StatusCode {
        self.msg.code()
    }

    /// Encodes the response, fixing `Content-Length` up first. The
    /// result is cached, retransmissions reuse it.
    pub fn encode(&mut self) -> Result<Bytes> {
        if let Some(buf) = &self.buf {
            return Ok(buf.clone());
        }

        let len = self.msg.body.as_ref().map_or(0, |b| b.len()) as u32;
        let headers = &mut self.msg.headers;
        match headers.iter_mut().find_map(|h| h.as_content_length_mut()) {
            Some(cl) => *cl = ContentLength::new(len),
            None => headers.push(Header::ContentLength(ContentLength::new(len))),
        }

        let buf = self.msg.to_bytes()?;
        self.buf = Some(buf.clone());

        Ok(buf)
    }
}

struct NetworkInner {
    name: String,
    reuse_lifetime: Duration,
    max_message_size: usize,
    channels: Mutex<HashMap<EndPoint, ChannelContext>>,
    aliases: Mutex<AliasesMap>,
    factories: Mutex<HashMap<Protocol, Arc<dyn ChannelFactory>>>,
    registry: TransactionRegistry,
    transactions: Arc<dyn TransactionFactory>,
    branches: Arc<dyn BranchFactory>,
    delegate: DelegateHandle,
    cert_handler: Option<Arc<dyn SslCertErrorHandler>>,
    password_handler: Option<Arc<dyn PasswordHandler>>,
    events: ChannelTx,
    run_rx: Mutex<Option<ChannelRx>>,
}

/// The network layer.
///
/// Cheap to clone; all clones share the pool, the transaction registry
/// and the event queue.
#[derive(Clone)]
pub struct NetworkLayer(Arc<NetworkInner>);

impl NetworkLayer {
    /// Returns a builder with defaults.
    pub fn builder() -> NetworkLayerBuilder {
        NetworkLayerBuilder::new()
    }

    /// The configured name of this layer.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Sender half of the event queue, for wiring up listeners.
    pub fn events(&self) -> ChannelTx {
        self.0.events.clone()
    }

    /// The size limit applied to inbound messages.
    pub fn max_message_size(&self) -> usize {
        self.0.max_message_size
    }

    /// The handler queried for digest credentials, if any.
    pub fn password_handler(&self) -> Option<&Arc<dyn PasswordHandler>> {
        self.0.password_handler.as_ref()
    }

    /// Number of pooled destinations.
    pub fn channel_count(&self) -> usize {
        self.0.channels.lock().expect("Lock failed").len()
    }

    /// Drops the delegate. Events keep flowing, callbacks stop.
    pub fn detach_delegate(&self) {
        self.0.delegate.detach();
    }

    /// Registers an outbound factory after construction. Replaces a
    /// previous factory for the same protocol.
    pub fn register_channel_factory(&self, factory: impl ChannelFactory) {
        let protocol = factory.protocol();
        let mut factories = self.0.factories.lock().expect("Lock failed");
        if factories.insert(protocol, Arc::new(factory)).is_some() {
            log::warn!("Channel factory for '{}' replaced", protocol);
        }
    }

    /// Consumes and dispatches channel events until the queue closes.
    ///
    /// Everything that mutates the pool happens here, on one task.
    pub async fn run(&self) -> Result<()> {
        let rx = self.0.run_rx.lock().expect("Lock failed").take();
        let Some(mut rx) = rx else {
            return Err(Error::EventQueueClosed);
        };

        log::debug!("SIP network layer '{}' running", self.0.name);

        while let Some(event) = rx.recv().await {
            self.on_event(event).await;
        }

        Ok(())
    }

    async fn on_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Packet { channel, packet } => {
                if let Err(err) = self.on_packet(channel, packet).await {
                    log::warn!("Failed to handle packet: {}", err);
                }
            }
            ChannelEvent::Connected { endpoint, channel } => {
                self.on_connected(endpoint, channel).await;
            }
            ChannelEvent::ConnectFailed { endpoint, error } => {
                self.on_connect_failed(endpoint, error).await;
            }
            ChannelEvent::CertificateError { endpoint, info } => {
                self.on_certificate_error(endpoint, info).await;
            }
            ChannelEvent::Closed { endpoint, error } => {
                self.on_closed(endpoint, error).await;
            }
            ChannelEvent::IdleExpired {
                endpoint,
                generation,
            } => {
                self.on_idle_expired(endpoint, generation).await;
            }
        }
    }

    async fn on_packet(&self, channel: Channel, packet: Packet) -> Result<()> {
        let payload = &packet.payload;

        // Keep-Alive Request packet.
        if payload.as_ref() == KEEPALIVE_REQUEST {
            channel.send(KEEPALIVE_RESPONSE, &packet.addr).await?;
            return Ok(());
        } else if payload.as_ref() == KEEPALIVE_RESPONSE {
            // Keep-Alive Response packet, nothing to do.
            return Ok(());
        }

        if payload.len() > self.0.max_message_size {
            log::warn!(
                "Ignoring {} bytes packet from {} {} : {}",
                payload.len(),
                channel.protocol(),
                packet.addr,
                Error::MessageTooBig(payload.len()),
            );
            return Ok(());
        }

        let msg = match Parser::parse_sip_msg(payload.as_ref()) {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!(
                    "Ignoring {} bytes packet from {} {} : {}\n{}-- end of packet.",
                    payload.len(),
                    channel.protocol(),
                    packet.addr,
                    err,
                    String::from_utf8_lossy(payload)
                );
                return Ok(());
            }
        };

        match msg {
            SipMsg::Request(request) => self.process_request(channel, packet, request).await,
            SipMsg::Response(response) => self.process_response(channel, packet, response).await,
        }
    }

    async fn process_request(
        &self,
        channel: Channel,
        packet: Packet,
        mut request: Request,
    ) -> Result<()> {
        match request.headers.topmost_via_mut() {
            Some(via) => {
                if via.transport() != channel.protocol() {
                    log::warn!(
                        "Ignoring request from /{}: Via names {}, channel is {}",
                        packet.addr,
                        via.transport(),
                        channel.protocol()
                    );
                    return Ok(());
                }
                // RFC 3581 4.: the server MUST insert `received` with
                // the source address, even when it matches sent-by.
                via.set_received(packet.addr.ip());
                if matches!(via.rport(), Rport::Requested) {
                    via.set_rport(Rport::Assigned(packet.addr.port()));
                }
            }
            None => {
                log::warn!(
                    "Ignoring request from /{}: {}",
                    packet.addr,
                    Error::MissingRequiredHeader(Via::NAME)
                );
                return Ok(());
            }
        }

        let request_headers = match RequestHeaders::try_from(&request.headers) {
            Ok(headers) => headers,
            Err(err) => {
                log::warn!("Ignoring request from /{}: {}", packet.addr, err);
                return Ok(());
            }
        };

        log::debug!("<= Request {} from /{}", request.method(), packet.addr);

        let probe = EndPoint::from((packet.addr, channel.protocol()));
        let endpoint = {
            let aliases = self.0.aliases.lock().expect("Lock failed");
            aliases.resolve(&probe).clone()
        };

        let mut incoming = IncomingRequest {
            msg: Arc::new(request),
            channel,
            packet,
            endpoint,
            request_headers,
            tsx: None,
        };

        if self.0.registry.handle_request(&mut incoming).await? {
            return Ok(());
        }

        // ACK lives outside any new transaction; everything else gets
        // a UAS transaction before the user sees it.
        if !incoming.msg.method().is_ack() {
            let tsx = self.0.transactions.create_server(self, &incoming)?;
            let key = tsx.key().clone();
            self.0.registry.register_server(tsx.clone());
            self.bind_transaction(&incoming.endpoint, key);
            incoming.tsx = Some(tsx);
        }

        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_incoming_request(self, &mut incoming).await;
        }

        Ok(())
    }

    async fn process_response(
        &self,
        channel: Channel,
        packet: Packet,
        response: Response,
    ) -> Result<()> {
        let request_headers = match RequestHeaders::try_from(&response.headers) {
            Ok(headers) => headers,
            Err(err) => {
                log::warn!("Ignoring response from /{}: {}", packet.addr, err);
                return Ok(());
            }
        };

        log::debug!(
            "<= Response ({} {})",
            response.code(),
            response.reason()
        );

        let probe = EndPoint::from((packet.addr, channel.protocol()));
        let endpoint = {
            let aliases = self.0.aliases.lock().expect("Lock failed");
            aliases.resolve(&probe).clone()
        };

        let mut incoming = IncomingResponse {
            msg: response,
            channel,
            packet,
            endpoint,
            request_headers,
        };

        if self.0.registry.handle_response(&mut incoming).await? {
            return Ok(());
        }

        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_incoming_response(self, &mut incoming).await;
        }

        Ok(())
    }

    async fn on_connected(&self, endpoint: EndPoint, channel: Channel) {
        let queued = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            match channels.get_mut(&endpoint) {
                Some(ctx) => {
                    let queued = ctx.take_queued();
                    ctx.state = ContextState::Connected {
                        channel: channel.clone(),
                    };
                    ctx.generation += 1;
                    queued
                }
                None => {
                    channels.insert(endpoint.clone(), ChannelContext::connected(channel.clone()));
                    Vec::new()
                }
            }
        };

        log::debug!("Channel to {} connected", endpoint);

        for send in queued {
            let result = self.finalize_and_send(&channel, send.msg, &endpoint).await;
            let _ = send.notify.send(result);
        }

        self.maybe_arm_idle_timer(&endpoint);

        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_channel_connected(self, &endpoint).await;
        }
    }

    async fn on_connect_failed(&self, endpoint: EndPoint, error: Error) {
        log::warn!("Failed to connect to {}: {}", endpoint, error);

        let queued = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            channels
                .remove(&endpoint)
                .map(|mut ctx| ctx.take_queued())
                .unwrap_or_default()
        };

        for send in queued {
            let failure = Error::ConnectFailed {
                endpoint: endpoint.clone(),
                reason: error.to_string(),
            };
            let _ = send.notify.send(Err(failure));
        }

        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_transport_error(self, &endpoint, &error).await;
        }
    }

    async fn on_certificate_error(&self, endpoint: EndPoint, info: CertErrorInfo) {
        log::warn!(
            "Certificate verification for {} failed: {}",
            endpoint,
            info.reason
        );

        {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            let Some(ctx) = channels.get_mut(&endpoint) else {
                return;
            };
            let queued = ctx.take_queued();
            ctx.state = ContextState::CertPending {
                queued,
                info: info.clone(),
            };
        }

        let Some(handler) = self.0.cert_handler.clone() else {
            self.fail_certificate(&endpoint, info.fatal).await;
            return;
        };

        let mut verdict = SslCertErrorTransaction::new(endpoint.clone(), info);
        verdict.run(handler.as_ref()).await;

        if !verdict.is_accepted() {
            self.fail_certificate(&endpoint, verdict.info().fatal).await;
            return;
        }

        let retry = match verdict.take_client_cert() {
            Some(identity) => self.reconnect_with_certificate(&endpoint, identity),
            None => self.reconnect_ignoring_last_error(&endpoint),
        };
        if let Err(err) = retry {
            log::warn!("Certificate retry for {} failed: {}", endpoint, err);
            self.fail_certificate(&endpoint, false).await;
        }
    }

    /// Fails every send parked behind a certificate verdict and drops
    /// the context.
    async fn fail_certificate(&self, endpoint: &EndPoint, fatal: bool) {
        let queued = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            channels
                .remove(endpoint)
                .map(|mut ctx| ctx.take_queued())
                .unwrap_or_default()
        };

        for send in queued {
            let _ = send.notify.send(Err(Error::CertificateRejected { fatal }));
        }

        let error = Error::CertificateRejected { fatal };
        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_transport_error(self, endpoint, &error).await;
        }
    }

    async fn on_closed(&self, endpoint: EndPoint, error: Option<Error>) {
        let ctx = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            channels.remove(&endpoint)
        };
        let Some(mut ctx) = ctx else {
            return;
        };

        self.0
            .aliases
            .lock()
            .expect("Lock failed")
            .remove_target(&endpoint);

        match &error {
            Some(err) => log::warn!("Channel to {} closed: {}", endpoint, err),
            None => log::debug!("Channel to {} closed", endpoint),
        }

        for send in ctx.take_queued() {
            let _ = send.notify.send(Err(Error::ChannelClosed(endpoint.clone())));
        }

        // Transactions bound here cannot make progress anymore.
        let keys: Vec<TransactionKey> = ctx.transactions.drain().collect();
        self.0.registry.terminate_all(&keys);

        if let Some(delegate) = self.0.delegate.get() {
            delegate
                .on_channel_closed(self, &endpoint, error.as_ref())
                .await;
        }
    }

    async fn on_idle_expired(&self, endpoint: EndPoint, generation: u64) {
        let channel = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            match channels.get(&endpoint) {
                Some(ctx)
                    if ctx.generation == generation
                        && ctx.refs == 0
                        && ctx.transactions.is_empty() =>
                {
                    channels
                        .remove(&endpoint)
                        .and_then(|ctx| ctx.channel().cloned())
                }
                // The channel got used (or replaced) after this timer
                // was armed.
                _ => return,
            }
        };
        let Some(channel) = channel else { return };

        self.0
            .aliases
            .lock()
            .expect("Lock failed")
            .remove_target(&endpoint);

        log::debug!(
            "Channel to {} unused for {:?}, closing",
            endpoint,
            self.0.reuse_lifetime
        );
        channel.close().await;

        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_channel_closed(self, &endpoint, None).await;
        }
    }

    /// Sends a message, routed by its own headers.
    pub async fn send(&self, msg: SipMsg) -> Result<()> {
        match msg {
            SipMsg::Request(request) => self.send_request(request).await,
            SipMsg::Response(response) => {
                let target = response_target(&response)?;
                self.send_to(SipMsg::Response(response), target).await
            }
        }
    }

    /// Sends a request to the destination its topmost `Route`, or
    /// failing that its request URI, names (RFC 3261 8.1.2).
    pub async fn send_request(&self, request: Request) -> Result<()> {
        let target = request_target(&request);
        self.send_to(SipMsg::Request(request), target).await
    }

    /// Sends a response built with [`IncomingRequest::new_response`].
    pub async fn send_response(&self, response: &mut OutgoingResponse) -> Result<()> {
        let buf = response.encode()?;

        log::debug!(
            "=> Response {} {}",
            response.msg.code(),
            response.msg.reason()
        );

        response.channel.send(&buf, &response.addr).await?;

        Ok(())
    }

    /// Responds to a request, through its transaction when it has one.
    pub async fn respond(&self, request: &IncomingRequest, code: StatusCode) -> Result<()> {
        let mut response = request.new_response(code);
        match &request.tsx {
            Some(tsx) => tsx.respond(&mut response).await,
            None => self.send_response(&mut response).await,
        }
    }

    async fn send_to(&self, msg: SipMsg, target: EndPoint) -> Result<()> {
        let target = {
            let aliases = self.0.aliases.lock().expect("Lock failed");
            aliases.resolve(&target).clone()
        };

        enum Dispatch {
            Now { channel: Channel, msg: SipMsg },
            Wait(oneshot::Receiver<Result<()>>),
            Connect {
                factory: Arc<dyn ChannelFactory>,
                rx: oneshot::Receiver<Result<()>>,
            },
        }

        let dispatch = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            match channels.get_mut(&target) {
                Some(ctx) => {
                    ctx.generation += 1;
                    if let Some(channel) = ctx.channel() {
                        Dispatch::Now {
                            channel: channel.clone(),
                            msg,
                        }
                    } else {
                        // Still connecting (or waiting on a certificate
                        // verdict); park the send behind it.
                        let (tx, rx) = oneshot::channel();
                        let _ = ctx.queue(QueuedSend { msg, notify: tx });
                        Dispatch::Wait(rx)
                    }
                }
                None => {
                    let factory = self.factory_for(target.protocol())?;
                    let (tx, rx) = oneshot::channel();
                    channels.insert(
                        target.clone(),
                        ChannelContext::connecting(QueuedSend { msg, notify: tx }),
                    );
                    Dispatch::Connect { factory, rx }
                }
            }
        };

        match dispatch {
            Dispatch::Now { channel, msg } => {
                let result = self.finalize_and_send(&channel, msg, &target).await;
                self.maybe_arm_idle_timer(&target);
                result
            }
            Dispatch::Wait(rx) => rx.await.map_err(|_| Error::ChannelClosed(target))?,
            Dispatch::Connect { factory, rx } => {
                self.spawn_connect(factory, target.clone(), ConnectOverride::default());
                rx.await.map_err(|_| Error::ChannelClosed(target))?
            }
        }
    }

    /// Stamps, encodes and writes `msg`, creating a UAC transaction
    /// for everything but `ACK`.
    async fn finalize_and_send(
        &self,
        channel: &Channel,
        mut msg: SipMsg,
        endpoint: &EndPoint,
    ) -> Result<()> {
        if let SipMsg::Request(request) = &mut msg {
            self.prepare_request(channel, request)?;
        }
        msg.ensure_content_length();

        let buf = msg.to_bytes()?;
        let addr = endpoint.addr().unwrap_or_else(|| channel.remote_addr());

        match msg {
            SipMsg::Request(request) => {
                log::debug!("=> Request {} to /{}", request.method(), addr);

                let has_branch = request
                    .headers
                    .topmost_via()
                    .and_then(|via| via.branch())
                    .is_some();
                if !request.method().is_ack() && has_branch {
                    let outgoing = OutgoingRequest {
                        msg: request,
                        channel: channel.clone(),
                        addr,
                        endpoint: endpoint.clone(),
                        buf: Some(buf.clone()),
                    };
                    let tsx = self.0.transactions.create_client(self, &outgoing)?;
                    let key = tsx.key().clone();
                    self.0.registry.register_client(tsx);
                    self.bind_transaction(endpoint, key);
                }
            }
            SipMsg::Response(response) => {
                log::debug!("=> Response {} {}", response.code(), response.reason());
            }
        }

        match channel.send(&buf, &addr).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let kind = err.kind();
                let reason = err.to_string();
                let _ = self
                    .0
                    .events
                    .send(ChannelEvent::Closed {
                        endpoint: endpoint.clone(),
                        error: Some(Error::Io(err)),
                    })
                    .await;

                Err(Error::Io(std::io::Error::new(kind, reason)))
            }
        }
    }

    /// Completes a request the way sending it over `channel` requires:
    /// a topmost `Via` with a fresh branch and `rport` requested when
    /// the caller supplied none, and `Contact` hosts filled in where
    /// they were left unspecified.
    fn prepare_request(&self, channel: &Channel, request: &mut Request) -> Result<()> {
        if request.headers.topmost_via().is_none() {
            let sent_by: HostPort = channel.local_name().parse()?;
            let branch = self.0.branches.create_branch();
            let mut via = Via::new(channel.protocol(), sent_by, Some(branch.as_str()));
            via.set_rport(Rport::Requested);
            request.headers.insert(0, Header::Via(via));
        }

        for header in request.headers.iter_mut() {
            let Header::Contact(Contact::Uri { uri, .. }) = header else {
                continue;
            };
            let host_port = match uri {
                SipUri::Uri(uri) => &mut uri.host_port,
                SipUri::NameAddr(name_addr) => &mut name_addr.uri.host_port,
            };
            if host_is_unspecified(&host_port.host) {
                *host_port = channel.local_name().parse()?;
            }
        }

        Ok(())
    }

    fn spawn_connect(
        &self,
        factory: Arc<dyn ChannelFactory>,
        endpoint: EndPoint,
        overrides: ConnectOverride,
    ) {
        let events = self.0.events.clone();
        tokio::spawn(async move {
            let event = match factory.create(&endpoint, events.clone(), overrides).await {
                Ok(channel) => ChannelEvent::Connected { endpoint, channel },
                Err(Error::PeerCertificate(info)) => {
                    ChannelEvent::CertificateError { endpoint, info }
                }
                Err(error) => ChannelEvent::ConnectFailed { endpoint, error },
            };
            let _ = events.send(event).await;
        });
    }

    fn factory_for(&self, protocol: Protocol) -> Result<Arc<dyn ChannelFactory>> {
        self.0
            .factories
            .lock()
            .expect("Lock failed")
            .get(&protocol)
            .cloned()
            .ok_or(Error::NoChannelFactory(protocol))
    }

    /// Retries the connect that stopped on a certificate verdict,
    /// trusting the certificate it failed on.
    pub fn reconnect_ignoring_last_error(&self, endpoint: &EndPoint) -> Result<()> {
        self.reconnect(endpoint, None)
    }

    /// Retries the connect that stopped on a certificate verdict,
    /// presenting `identity` to the server.
    pub fn reconnect_with_certificate(
        &self,
        endpoint: &EndPoint,
        identity: ClientIdentity,
    ) -> Result<()> {
        self.reconnect(endpoint, Some(identity))
    }

    fn reconnect(&self, endpoint: &EndPoint, identity: Option<ClientIdentity>) -> Result<()> {
        let overrides = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            let ctx = channels
                .get_mut(endpoint)
                .ok_or_else(|| Error::NoActiveChannel(endpoint.clone()))?;

            let ContextState::CertPending { queued, info } = &mut ctx.state else {
                return Err(Error::NoActiveChannel(endpoint.clone()));
            };
            let overrides = ConnectOverride {
                trust_cert: info.cert.clone(),
                client_identity: identity,
            };
            let queued = std::mem::take(queued);
            ctx.state = ContextState::Connecting { queued };

            overrides
        };

        let factory = self.factory_for(endpoint.protocol())?;
        self.spawn_connect(factory, endpoint.clone(), overrides);

        Ok(())
    }

    /// Marks the channel to `endpoint` as in use, keeping it out of
    /// idle expiry until [`NetworkLayer::release_channel`].
    pub fn request_channel(&self, endpoint: &EndPoint) -> Result<()> {
        let target = {
            let aliases = self.0.aliases.lock().expect("Lock failed");
            aliases.resolve(endpoint).clone()
        };

        let mut channels = self.0.channels.lock().expect("Lock failed");
        let ctx = channels
            .get_mut(&target)
            .ok_or(Error::NoActiveChannel(target.clone()))?;
        ctx.refs += 1;
        ctx.generation += 1;

        Ok(())
    }

    /// Releases one [`NetworkLayer::request_channel`] hold. The last
    /// release arms the idle timer again.
    pub fn release_channel(&self, endpoint: &EndPoint) {
        let target = {
            let aliases = self.0.aliases.lock().expect("Lock failed");
            aliases.resolve(endpoint).clone()
        };

        let arm = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            let Some(ctx) = channels.get_mut(&target) else {
                return;
            };
            ctx.refs = ctx.refs.saturating_sub(1);
            ctx.generation += 1;
            ctx.refs == 0
        };

        if arm {
            self.maybe_arm_idle_timer(&target);
        }
    }

    /// Makes `alias` resolve to the pooled channel of `destination`.
    ///
    /// SIP routing often names a destination (a record route, a
    /// registered contact) that must reuse an existing connection
    /// instead of opening its own.
    pub fn add_alias(&self, destination: &EndPoint, alias: EndPoint) -> Result<()> {
        {
            let channels = self.0.channels.lock().expect("Lock failed");
            if !channels.contains_key(destination) {
                return Err(Error::NoActiveChannel(destination.clone()));
            }
        }

        self.0
            .aliases
            .lock()
            .expect("Lock failed")
            .insert(destination.clone(), alias)
    }

    fn maybe_arm_idle_timer(&self, endpoint: &EndPoint) {
        let generation = {
            let channels = self.0.channels.lock().expect("Lock failed");
            match channels.get(endpoint) {
                Some(ctx)
                    if ctx.refs == 0
                        && ctx.transactions.is_empty()
                        && ctx.channel().is_some() =>
                {
                    ctx.generation
                }
                _ => return,
            }
        };

        let events = self.0.events.clone();
        let endpoint = endpoint.clone();
        let lifetime = self.0.reuse_lifetime;
        tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            let _ = events
                .send(ChannelEvent::IdleExpired {
                    endpoint,
                    generation,
                })
                .await;
        });
    }

    pub(crate) fn registry(&self) -> &TransactionRegistry {
        &self.0.registry
    }

    pub(crate) fn bind_transaction(&self, endpoint: &EndPoint, key: TransactionKey) {
        let mut channels = self.0.channels.lock().expect("Lock failed");
        if let Some(ctx) = channels.get_mut(endpoint) {
            ctx.transactions.insert(key);
        }
    }

    /// Unregisters a finished transaction and lets its channel go idle
    /// if nothing else uses it.
    pub(crate) fn on_transaction_terminated(
        &self,
        role: Role,
        endpoint: &EndPoint,
        key: &TransactionKey,
    ) {
        match role {
            Role::UAC => {
                self.0.registry.remove_client(key);
            }
            Role::UAS => {
                self.0.registry.remove_server(key);
            }
        }

        let unused = {
            let mut channels = self.0.channels.lock().expect("Lock failed");
            match channels.get_mut(endpoint) {
                Some(ctx) => {
                    ctx.transactions.remove(key);
                    ctx.refs == 0 && ctx.transactions.is_empty()
                }
                None => false,
            }
        };

        if unused {
            self.maybe_arm_idle_timer(endpoint);
        }
    }

    pub(crate) async fn notify_timeout(&self, key: &TransactionKey) {
        if let Some(delegate) = self.0.delegate.get() {
            delegate.on_timed_out(self, key).await;
        }
    }
}

/// The endpoint a request goes to, from its topmost `Route` or,
/// absent one, its request URI.
fn request_target(request: &Request) -> EndPoint {
    let uri = match request.headers.topmost_route() {
        Some(route) => &route.addr.uri,
        None => &request.req_line.uri,
    };

    endpoint_for_uri(uri)
}

fn endpoint_for_uri(uri: &Uri) -> EndPoint {
    let protocol = uri.transport_param.unwrap_or(match uri.scheme {
        Scheme::Sips => Protocol::Tls,
        _ => Protocol::Udp,
    });
    let host = match &uri.maddr_param {
        Some(maddr) => maddr.clone(),
        None => uri.host_port.host.clone(),
    };
    let port = uri
        .host_port
        .port
        .unwrap_or_else(|| protocol.default_port());

    EndPoint::new(host, port, protocol)
}

/// The endpoint a bare response goes to, from its topmost `Via`
/// (RFC 3261 18.2.2, RFC 3581).
fn response_target(response: &Response) -> Result<EndPoint> {
    let via = response
        .headers
        .topmost_via()
        .ok_or(Error::MissingRequiredHeader(Via::NAME))?;

    if let Some(maddr) = via.maddr().as_ref() {
        let port = via
            .sent_by()
            .port
            .unwrap_or_else(|| via.transport().default_port());
        return Ok(EndPoint::new(maddr.clone(), port, via.transport()));
    }

    Ok(via.response_target())
}

fn host_is_unspecified(host: &Host) -> bool {
    match host {
        Host::IpAddr(ip) => ip.is_unspecified(),
        Host::DomainName(name) => name.is_empty(),
    }
}

/// Builds a [`NetworkLayer`].
pub struct NetworkLayerBuilder {
    name: String,
    reuse_lifetime: Duration,
    max_message_size: usize,
    factories: Vec<Arc<dyn ChannelFactory>>,
    delegate: Option<Arc<dyn NetworkDelegate>>,
    transactions: Option<Arc<dyn TransactionFactory>>,
    branches: Option<Arc<dyn BranchFactory>>,
    cert_handler: Option<Arc<dyn SslCertErrorHandler>>,
    password_handler: Option<Arc<dyn PasswordHandler>>,
    events: (ChannelTx, ChannelRx),
}

impl NetworkLayerBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("sipwire"),
            reuse_lifetime: DEFAULT_REUSE_LIFETIME,
            max_message_size: MAX_MESSAGE_SIZE,
            factories: Vec::new(),
            delegate: None,
            transactions: None,
            branches: None,
            cert_handler: None,
            password_handler: None,
            events: event_queue(),
        }
    }

    /// Sets the layer name used in logs.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.into();

        self
    }

    /// Sets how long unused channels stay pooled.
    pub fn with_reuse_lifetime(mut self, lifetime: Duration) -> Self {
        self.reuse_lifetime = lifetime;

        self
    }

    /// Sets the inbound message size limit.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;

        self
    }

    /// Sender half of the event queue, available before `build` so
    /// listeners can be bound first and their channels wired in.
    pub fn events(&self) -> ChannelTx {
        self.events.0.clone()
    }

    /// Adds an outbound channel factory.
    ///
    /// Can be called once per protocol; a second factory for the same
    /// protocol is ignored.
    pub fn add_factory(mut self, factory: impl ChannelFactory) -> Self {
        if self.factory_exists(factory.protocol()) {
            return self;
        }
        self.factories.push(Arc::new(factory));

        self
    }

    fn factory_exists(&self, protocol: Protocol) -> bool {
        let exists = self.factories.iter().any(|f| f.protocol() == protocol);
        if exists {
            log::warn!("Channel factory for '{}' already exists", protocol);
        }
        exists
    }

    /// Sets the delegate receiving network callbacks.
    pub fn with_delegate(mut self, delegate: impl NetworkDelegate) -> Self {
        self.delegate = Some(Arc::new(delegate));

        self
    }

    /// Replaces the transaction factory.
    pub fn with_transaction_factory(mut self, factory: impl TransactionFactory) -> Self {
        self.transactions = Some(Arc::new(factory));

        self
    }

    /// Replaces the branch factory.
    pub fn with_branch_factory(mut self, factory: impl BranchFactory) -> Self {
        self.branches = Some(Arc::new(factory));

        self
    }

    /// Sets the handler asked to rule on failed certificate checks.
    /// Without one every failed check is fatal.
    pub fn with_cert_handler(mut self, handler: impl SslCertErrorHandler) -> Self {
        self.cert_handler = Some(Arc::new(handler));

        self
    }

    /// Sets the handler queried for digest credentials.
    pub fn with_password_handler(mut self, handler: impl PasswordHandler) -> Self {
        self.password_handler = Some(Arc::new(handler));

        self
    }

    /// Finalizes the builder into a [`NetworkLayer`].
    pub fn build(self) -> NetworkLayer {
        log::trace!("Creating network layer...");
        log::debug!(
            "Channel factories registered {}",
            format_args!(
                "({})",
                self.factories.iter().map(|f| f.protocol()).join(", ")
            )
        );

        let factories = self
            .factories
            .into_iter()
            .map(|factory| (factory.protocol(), factory))
            .collect::<HashMap<_, _>>();
        let (events, run_rx) = self.events;

        NetworkLayer(Arc::new(NetworkInner {
            name: self.name,
            reuse_lifetime: self.reuse_lifetime,
            max_message_size: self.max_message_size,
            channels: Mutex::new(HashMap::new()),
            aliases: Mutex::new(AliasesMap::default()),
            factories: Mutex::new(factories),
            registry: TransactionRegistry::default(),
            transactions: self
                .transactions
                .unwrap_or_else(|| Arc::new(DefaultTransactionFactory)),
            branches: self.branches.unwrap_or_else(|| Arc::new(RandomBranch)),
            delegate: DelegateHandle::new(self.delegate),
            cert_handler: self.cert_handler,
            password_handler: self.password_handler,
            events,
            run_rx: Mutex::new(Some(run_rx)),
        }))
    }
}

impl Default for NetworkLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use rustls_pki_types::CertificateDer;
    use tokio::sync::mpsc;

    use crate::channel::mock::MockChannel;
    use crate::message::Method;

    const RAW_REGISTER: &str = "REGISTER sip:registrar.biloxi.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 10.0.0.1:5066;rport;branch=z9hG4bKnashds7\r\n\
         Max-Forwards: 70\r\n\
         From: Bob <sip:bob@biloxi.com>;tag=456248\r\n\
         To: Bob <sip:bob@biloxi.com>\r\n\
         Call-ID: 843817637684230@998sdasdh09\r\n\
         CSeq: 1826 REGISTER\r\n\
         Content-Length: 0\r\n\r\n";

    #[derive(Debug)]
    enum Seen {
        Request {
            method: Method,
            via: Via,
            has_tsx: bool,
        },
        Response(StatusCode),
        Connected(EndPoint),
        Closed(EndPoint),
        TimedOut(TransactionKey),
        TransportError(EndPoint),
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<Seen>,
    }

    #[async_trait::async_trait]
    impl NetworkDelegate for Recorder {
        async fn on_incoming_request(&self, _: &NetworkLayer, request: &mut IncomingRequest) {
            let _ = self.tx.send(Seen::Request {
                method: request.msg.method().clone(),
                via: request.request_headers.via.clone(),
                has_tsx: request.tsx.is_some(),
            });
        }

        async fn on_incoming_response(&self, _: &NetworkLayer, response: &mut IncomingResponse) {
            let _ = self.tx.send(Seen::Response(response.msg.code()));
        }

        async fn on_channel_connected(&self, _: &NetworkLayer, endpoint: &EndPoint) {
            let _ = self.tx.send(Seen::Connected(endpoint.clone()));
        }

        async fn on_channel_closed(
            &self,
            _: &NetworkLayer,
            endpoint: &EndPoint,
            _: Option<&Error>,
        ) {
            let _ = self.tx.send(Seen::Closed(endpoint.clone()));
        }

        async fn on_timed_out(&self, _: &NetworkLayer, key: &TransactionKey) {
            let _ = self.tx.send(Seen::TimedOut(key.clone()));
        }

        async fn on_transport_error(&self, _: &NetworkLayer, endpoint: &EndPoint, _: &Error) {
            let _ = self.tx.send(Seen::TransportError(endpoint.clone()));
        }
    }

    struct MockFactory {
        channel: Channel,
        protocol: Protocol,
        creates: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ChannelFactory for MockFactory {
        fn protocol(&self) -> Protocol {
            self.protocol
        }

        async fn create(
            &self,
            _target: &EndPoint,
            _events: ChannelTx,
            _overrides: ConnectOverride,
        ) -> Result<Channel> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(self.channel.clone())
        }
    }

    fn mock_layer(
        protocol: Protocol,
    ) -> (
        NetworkLayer,
        MockChannel,
        Arc<AtomicUsize>,
        mpsc::UnboundedReceiver<Seen>,
    ) {
        let mock = MockChannel::with_protocol(protocol);
        let creates = Arc::new(AtomicUsize::new(0));
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        let network = NetworkLayerBuilder::new()
            .add_factory(MockFactory {
                channel: Channel::new(mock.clone()),
                protocol,
                creates: creates.clone(),
            })
            .with_delegate(Recorder { tx: seen_tx })
            .build();

        let run = network.clone();
        tokio::spawn(async move { run.run().await });

        (network, mock, creates, seen_rx)
    }

    async fn inject(network: &NetworkLayer, mock: &MockChannel, payload: &str, src: &str) {
        let channel = Channel::new(mock.clone());
        let packet = Packet::new(Bytes::copy_from_slice(payload.as_bytes()), src.parse().unwrap());
        network
            .events()
            .send(ChannelEvent::Packet { channel, packet })
            .await
            .unwrap();
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn ack_request(uri: &str) -> Request {
        let mut request = Request::new(Method::Ack, uri.parse().unwrap());
        request
            .headers
            .push(Header::CallId(CallId::new("3848276298220188511@atlanta.com")));
        request.headers.push(Header::CSeq(CSeq::new(1, Method::Ack)));

        request
    }

    fn register_request() -> Request {
        let mut request = Request::new(Method::Register, "sip:registrar.biloxi.com".parse().unwrap());
        let from = FromHdr::new_with_tag(
            SipUri::Uri("sip:bob@biloxi.com".parse().unwrap()),
            "456248",
        );
        request.headers.push(Header::From(from));
        request.headers.push(Header::To(To::new(SipUri::Uri(
            "sip:bob@biloxi.com".parse().unwrap(),
        ))));
        request
            .headers
            .push(Header::CallId(CallId::new("843817637684230@998sdasdh09")));
        request
            .headers
            .push(Header::CSeq(CSeq::new(1826, Method::Register)));

        request
    }

    #[tokio::test]
    async fn test_sends_to_one_target_share_a_channel() {
        let (network, mock, creates, _seen) = mock_layer(Protocol::Udp);

        network
            .send_request(ack_request("sip:192.0.2.60:5060"))
            .await
            .unwrap();
        network
            .send_request(ack_request("sip:192.0.2.60:5060"))
            .await
            .unwrap();

        assert_eq!(creates.load(Ordering::SeqCst), 1);
        assert_eq!(mock.sent().await.len(), 2);
        assert_eq!(network.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_requests_get_via_and_content_length() {
        let (network, mock, _creates, _seen) = mock_layer(Protocol::Udp);

        network
            .send_request(ack_request("sip:192.0.2.60:5060"))
            .await
            .unwrap();

        let sent = mock.sent().await;
        assert_eq!(sent[0].1, "192.0.2.60:5060".parse().unwrap());

        let SipMsg::Request(request) = Parser::parse_sip_msg(sent[0].0.as_slice()).unwrap() else {
            panic!("expected a request");
        };
        let via = request.headers.topmost_via().unwrap();
        assert!(via.branch().unwrap().starts_with(BRANCH_RFC3261));
        assert_eq!(via.transport(), Protocol::Udp);
        assert_matches!(via.rport(), Rport::Requested);
        assert_eq!(via.sent_by().to_string(), "127.0.0.1:5060");
        assert!(request.headers.content_length().is_some());
    }

    #[tokio::test]
    async fn test_incoming_request_stamps_received_and_rport() {
        let (network, mock, _creates, mut seen) = mock_layer(Protocol::Udp);

        inject(&network, &mock, RAW_REGISTER, "192.0.2.55:4444").await;

        match seen.recv().await.unwrap() {
            Seen::Request {
                method,
                via,
                has_tsx,
            } => {
                assert_eq!(method, Method::Register);
                assert!(has_tsx);
                assert_eq!(via.received(), Some("192.0.2.55".parse().unwrap()));
                assert_eq!(via.rport(), Rport::Assigned(4444));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_via_transport_mismatch_is_dropped() {
        let (network, mock, _creates, mut seen) = mock_layer(Protocol::Udp);

        let raw = RAW_REGISTER.replace("SIP/2.0/UDP", "SIP/2.0/TCP");
        inject(&network, &mock, &raw, "192.0.2.55:4444").await;
        settle().await;

        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detached_delegate_sees_nothing() {
        let (network, mock, _creates, mut seen) = mock_layer(Protocol::Udp);

        network.detach_delegate();
        inject(&network, &mock, RAW_REGISTER, "192.0.2.55:4444").await;
        settle().await;

        assert!(seen.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_routes_to_client_transaction() {
        let (network, mock, _creates, mut seen) = mock_layer(Protocol::Udp);

        network.send_request(register_request()).await.unwrap();

        let sent = mock.sent().await;
        let SipMsg::Request(request) = Parser::parse_sip_msg(sent[0].0.as_slice()).unwrap() else {
            panic!("expected a request");
        };
        let branch = request
            .headers
            .topmost_via()
            .unwrap()
            .branch()
            .unwrap()
            .to_string();

        let ok = format!(
            "SIP/2.0 200 OK\r\n\
             Via: SIP/2.0/UDP 127.0.0.1:5060;branch={branch}\r\n\
             From: <sip:bob@biloxi.com>;tag=456248\r\n\
             To: <sip:bob@biloxi.com>;tag=37GkEhwl6\r\n\
             Call-ID: 843817637684230@998sdasdh09\r\n\
             CSeq: 1826 REGISTER\r\n\
             Content-Length: 0\r\n\r\n"
        );
        inject(&network, &mock, &ok, "192.0.2.88:5060").await;

        assert_matches!(
            seen.recv().await.unwrap(),
            Seen::Response(code) if code == StatusCode::OK
        );

        // The completed transaction absorbs the retransmitted final.
        inject(&network, &mock, &ok, "192.0.2.88:5060").await;
        let quiet = tokio::time::timeout(Duration::from_millis(100), seen.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_keepalive_ping_is_answered() {
        let (network, mock, _creates, _seen) = mock_layer(Protocol::Tcp);

        inject(&network, &mock, "\r\n\r\n", "192.0.2.2:5060").await;
        settle().await;

        let sent = mock.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, b"\r\n");
        assert_eq!(sent[0].1, "192.0.2.2:5060".parse().unwrap());

        // A pong is absorbed without an answer.
        inject(&network, &mock, "\r\n", "192.0.2.2:5060").await;
        settle().await;
        assert_eq!(mock.sent().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_channel_expires() {
        let (network, _mock, creates, mut seen) = mock_layer(Protocol::Tcp);
        let target: EndPoint = "192.0.2.34:321/TCP".parse().unwrap();

        network
            .send_request(ack_request("sip:192.0.2.34:321;transport=tcp"))
            .await
            .unwrap();
        assert_eq!(network.channel_count(), 1);

        assert_matches!(
            seen.recv().await.unwrap(),
            Seen::Connected(endpoint) if endpoint == target
        );
        assert_matches!(
            seen.recv().await.unwrap(),
            Seen::Closed(endpoint) if endpoint == target
        );
        assert_eq!(network.channel_count(), 0);
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_channel_blocks_expiry() {
        let (network, _mock, _creates, mut seen) = mock_layer(Protocol::Tcp);
        let target: EndPoint = "192.0.2.34:321/TCP".parse().unwrap();

        network
            .send_request(ack_request("sip:192.0.2.34:321;transport=tcp"))
            .await
            .unwrap();
        assert_matches!(seen.recv().await.unwrap(), Seen::Connected(_));

        network.request_channel(&target).unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(seen.try_recv().is_err());
        assert_eq!(network.channel_count(), 1);

        network.release_channel(&target);
        assert_matches!(seen.recv().await.unwrap(), Seen::Closed(_));
        assert_eq!(network.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_alias_reuses_the_target_channel() {
        let (network, mock, creates, _seen) = mock_layer(Protocol::Tcp);
        let target: EndPoint = "192.0.2.34:321/TCP".parse().unwrap();

        network
            .send_request(ack_request("sip:192.0.2.34:321;transport=tcp"))
            .await
            .unwrap();
        network
            .add_alias(&target, "conference.example.com:321/TCP".parse().unwrap())
            .unwrap();

        network
            .send_request(ack_request("sip:conference.example.com:321;transport=tcp"))
            .await
            .unwrap();

        assert_eq!(creates.load(Ordering::SeqCst), 1);
        assert_eq!(mock.sent().await.len(), 2);
        assert_eq!(network.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_alias_requires_a_live_target() {
        let (network, _mock, _creates, _seen) = mock_layer(Protocol::Tcp);
        let target: EndPoint = "192.0.2.34:321/TCP".parse().unwrap();

        let err = network
            .add_alias(&target, "sip.example.com:321/TCP".parse().unwrap())
            .unwrap_err();
        assert_matches!(err, Error::NoActiveChannel(_));
    }

    #[tokio::test]
    async fn test_send_without_a_factory_fails() {
        let network = NetworkLayerBuilder::new().build();
        let run = network.clone();
        tokio::spawn(async move { run.run().await });

        let err = network
            .send_request(ack_request("sip:192.0.2.60:5060"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::NoChannelFactory(Protocol::Udp));
    }

    #[tokio::test]
    async fn test_response_without_via_is_rejected() {
        let (network, _mock, _creates, _seen) = mock_layer(Protocol::Udp);

        let response = Response::new(StatusLine::from_code(StatusCode::OK));
        let err = network.send(SipMsg::Response(response)).await.unwrap_err();
        assert_matches!(err, Error::MissingRequiredHeader(name) if name == Via::NAME);
    }

    struct FailingFactory;

    #[async_trait::async_trait]
    impl ChannelFactory for FailingFactory {
        fn protocol(&self) -> Protocol {
            Protocol::Tcp
        }

        async fn create(
            &self,
            target: &EndPoint,
            _events: ChannelTx,
            _overrides: ConnectOverride,
        ) -> Result<Channel> {
            Err(Error::ConnectFailed {
                endpoint: target.clone(),
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_connect_failure_fails_queued_sends() {
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let network = NetworkLayerBuilder::new()
            .add_factory(FailingFactory)
            .with_delegate(Recorder { tx: seen_tx })
            .build();
        let run = network.clone();
        tokio::spawn(async move { run.run().await });

        let err = network
            .send_request(ack_request("sip:192.0.2.9:5060;transport=tcp"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ConnectFailed { .. });
        assert_matches!(seen.recv().await.unwrap(), Seen::TransportError(_));
        assert_eq!(network.channel_count(), 0);
    }

    struct CertFlowFactory {
        channel: Channel,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ChannelFactory for CertFlowFactory {
        fn protocol(&self) -> Protocol {
            Protocol::Tls
        }

        async fn create(
            &self,
            _target: &EndPoint,
            _events: ChannelTx,
            overrides: ConnectOverride,
        ) -> Result<Channel> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::PeerCertificate(CertErrorInfo {
                    cert: Some(CertificateDer::from(vec![0x30, 0x82])),
                    fatal: false,
                    client_cert_requested: false,
                    reason: "UnknownIssuer".into(),
                }));
            }
            assert!(overrides.trust_cert.is_some());
            Ok(self.channel.clone())
        }
    }

    struct Approve;

    #[async_trait::async_trait]
    impl SslCertErrorHandler for Approve {
        async fn get_user_approval(
            &self,
            _: &EndPoint,
            _: &CertificateDer<'static>,
            fatal: bool,
        ) -> bool {
            !fatal
        }

        async fn get_client_cert(&self, _: &EndPoint) -> Option<ClientIdentity> {
            None
        }
    }

    struct Refuse;

    #[async_trait::async_trait]
    impl SslCertErrorHandler for Refuse {
        async fn get_user_approval(
            &self,
            _: &EndPoint,
            _: &CertificateDer<'static>,
            _: bool,
        ) -> bool {
            false
        }

        async fn get_client_cert(&self, _: &EndPoint) -> Option<ClientIdentity> {
            None
        }
    }

    #[tokio::test]
    async fn test_certificate_approval_retries_the_connect() {
        let mock = MockChannel::with_protocol(Protocol::Tls);
        let attempts = Arc::new(AtomicUsize::new(0));
        let network = NetworkLayerBuilder::new()
            .add_factory(CertFlowFactory {
                channel: Channel::new(mock.clone()),
                attempts: attempts.clone(),
            })
            .with_cert_handler(Approve)
            .build();
        let run = network.clone();
        tokio::spawn(async move { run.run().await });

        network
            .send_request(ack_request("sips:192.0.2.70:5061"))
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(mock.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_certificate_refusal_fails_the_send() {
        let mock = MockChannel::with_protocol(Protocol::Tls);
        let attempts = Arc::new(AtomicUsize::new(0));
        let network = NetworkLayerBuilder::new()
            .add_factory(CertFlowFactory {
                channel: Channel::new(mock.clone()),
                attempts: attempts.clone(),
            })
            .with_cert_handler(Refuse)
            .build();
        let run = network.clone();
        tokio::spawn(async move { run.run().await });

        let err = network
            .send_request(ack_request("sips:192.0.2.70:5061"))
            .await
            .unwrap_err();

        assert_matches!(err, Error::CertificateRejected { fatal: false });
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(mock.sent().await.is_empty());
    }
}
