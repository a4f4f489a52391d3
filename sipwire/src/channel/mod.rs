//! SIP channels.
//!
//! A channel moves raw SIP payloads over one protocol. Channels never
//! parse messages; they frame them and push [`ChannelEvent`]s into the
//! network layer queue, which owns dispatch.

pub(crate) mod decoder;
pub mod tcp;
pub mod tls;
pub mod udp;
pub mod ws;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use rustls_pki_types::CertificateDer;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

use self::decoder::StreamDecoder;
use crate::cert::{CertErrorInfo, ClientIdentity};
use crate::endpoint::{EndPoint, Protocol};
use crate::error::{Error, Result};

/// A stream keep-alive ping, answered with [`KEEPALIVE_RESPONSE`].
pub(crate) const KEEPALIVE_REQUEST: &[u8] = b"\r\n\r\n";

/// A stream keep-alive pong.
pub(crate) const KEEPALIVE_RESPONSE: &[u8] = b"\r\n";

/// Sender half of the channel event queue.
pub type ChannelTx = mpsc::Sender<ChannelEvent>;

/// Receiver half of the channel event queue.
pub type ChannelRx = mpsc::Receiver<ChannelEvent>;

/// Creates the event queue shared by all channels of a network layer.
pub(crate) fn event_queue() -> (ChannelTx, ChannelRx) {
    mpsc::channel(1_000)
}

/// A raw payload received from the network.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The payload bytes, one framed SIP message or keep-alive.
    pub payload: Bytes,
    /// The address the payload came from.
    pub addr: SocketAddr,
    /// The time the payload was received.
    pub time: SystemTime,
}

impl Packet {
    pub(crate) fn new(payload: Bytes, addr: SocketAddr) -> Self {
        Self {
            payload,
            addr,
            time: SystemTime::now(),
        }
    }
}

/// An event pushed by channels and timers into the network layer queue.
///
/// All pool and dispatch mutations happen on the queue consumer, so the
/// events define the complete lifecycle a channel can go through.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A payload arrived on a channel.
    Packet { channel: Channel, packet: Packet },

    /// A channel finished connecting, or a listener accepted one.
    ///
    /// `endpoint` is the pool key: the dial target for outbound
    /// connects, the peer address for accepted ones. Factories that
    /// hand out a shared channel (UDP) make the two differ.
    Connected {
        endpoint: EndPoint,
        channel: Channel,
    },

    /// An outbound connect failed before a channel existed.
    ConnectFailed { endpoint: EndPoint, error: Error },

    /// A TLS connect stopped on a certificate verdict.
    CertificateError {
        endpoint: EndPoint,
        info: CertErrorInfo,
    },

    /// A channel went down, with the error that closed it if any.
    Closed {
        endpoint: EndPoint,
        error: Option<Error>,
    },

    /// An unused channel outlived the pool reuse lifetime.
    IdleExpired { endpoint: EndPoint, generation: u64 },
}

/// One protocol channel.
///
/// Implementations hold the socket and the writer half; reads run in a
/// task spawned at construction that feeds the event queue.
#[async_trait::async_trait]
pub trait SipChannel: Send + Sync + 'static {
    /// Writes `buf` to the peer. Datagram channels send to `addr`,
    /// connected channels ignore it.
    async fn send(&self, buf: &[u8], addr: &SocketAddr) -> io::Result<usize>;

    /// Shuts the channel down. Pending reads end and the reader task
    /// reports the closure.
    async fn close(&self) {}

    fn protocol(&self) -> Protocol;

    fn local_addr(&self) -> SocketAddr;

    /// The peer address for connected channels. Datagram channels
    /// return their local address, they have no single peer.
    fn remote_addr(&self) -> SocketAddr;

    /// The `host:port` this channel advertises in Via and Contact.
    fn local_name(&self) -> &str;

    fn is_reliable(&self) -> bool {
        self.protocol().is_reliable()
    }

    fn is_secure(&self) -> bool {
        self.protocol().is_secure()
    }
}

/// A shared handle to a [`SipChannel`].
#[derive(Clone)]
pub struct Channel(Arc<dyn SipChannel>);

impl Channel {
    pub fn new(channel: impl SipChannel) -> Self {
        Self(Arc::new(channel))
    }

    /// The endpoint this channel is pooled under.
    pub fn key(&self) -> EndPoint {
        EndPoint::from((self.remote_addr(), self.protocol()))
    }
}

impl Deref for Channel {
    type Target = dyn SipChannel;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("protocol", &self.protocol())
            .field("local_addr", &self.local_addr())
            .field("remote_addr", &self.remote_addr())
            .finish()
    }
}

/// Adjustments applied when a connect is retried after a certificate
/// verdict. Factories for plaintext protocols ignore them.
#[derive(Debug, Default)]
pub struct ConnectOverride {
    /// A peer certificate to trust for this connect only.
    pub trust_cert: Option<CertificateDer<'static>>,
    /// Client identity to present if the server asks for one.
    pub client_identity: Option<ClientIdentity>,
}

/// Opens outbound channels for one protocol.
#[async_trait::async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    /// The protocol this factory connects.
    fn protocol(&self) -> Protocol;

    /// Connects a channel to `target` and wires its reader into
    /// `events`.
    async fn create(
        &self,
        target: &EndPoint,
        events: ChannelTx,
        overrides: ConnectOverride,
    ) -> Result<Channel>;
}

pub(crate) fn target_addr(target: &EndPoint) -> Result<SocketAddr> {
    target.addr().ok_or_else(|| Error::ConnectFailed {
        endpoint: target.clone(),
        reason: "destination host is not an IP literal".into(),
    })
}

/// Pumps framed payloads off a stream channel into the event queue
/// until the stream ends or fails.
pub(crate) async fn stream_read<R>(
    mut read: FramedRead<R, StreamDecoder>,
    channel: Channel,
    events: ChannelTx,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(payload)) => {
                let packet = Packet::new(payload, channel.remote_addr());
                let event = ChannelEvent::Packet {
                    channel: channel.clone(),
                    packet,
                };
                events
                    .send(event)
                    .await
                    .map_err(|_| Error::EventQueueClosed)?;
            }
            Some(Err(err)) => {
                let event = ChannelEvent::Closed {
                    endpoint: channel.key(),
                    error: Some(err),
                };
                events
                    .send(event)
                    .await
                    .map_err(|_| Error::EventQueueClosed)?;
                return Ok(());
            }
            None => {
                let event = ChannelEvent::Closed {
                    endpoint: channel.key(),
                    error: None,
                };
                events
                    .send(event)
                    .await
                    .map_err(|_| Error::EventQueueClosed)?;
                return Ok(());
            }
        }
    }
}
