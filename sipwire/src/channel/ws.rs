use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::tcp::Direction;
use super::{Channel, ChannelEvent, ChannelFactory, ChannelTx, ConnectOverride, Packet, SipChannel};
use crate::endpoint::{EndPoint, Protocol};
use crate::error::{Error, Result};
use crate::message::HostPort;

type WsWrite<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>;

/// A SIP channel over one WebSocket connection (RFC 7118).
pub struct WsChannel<S> {
    write: WsWrite<S>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    protocol: Protocol,
    local_name: String,
}

impl<S> WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Splits the handshaked `stream` and starts the reader task.
    fn start(
        stream: WebSocketStream<S>,
        protocol: Protocol,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        direction: Direction,
        events: ChannelTx,
    ) -> Channel {
        let (write, read) = stream.split();

        let channel = Channel::new(WsChannel {
            write: Arc::new(Mutex::new(write)),
            local_addr,
            remote_addr,
            protocol,
            local_name: crate::get_local_name(&local_addr),
        });

        log::trace!(
            "{} channel ({:?}) {} <-> {}",
            protocol,
            direction,
            local_addr,
            remote_addr
        );

        tokio::spawn({
            let channel = channel.clone();
            async move {
                if let Err(err) = ws_read(read, channel, events).await {
                    log::warn!("An error occured; error = {:#}", err);
                }
            }
        });

        channel
    }
}

#[async_trait::async_trait]
impl<S> SipChannel for WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, buf: &[u8], _addr: &SocketAddr) -> io::Result<usize> {
        let msg = Message::Binary(buf.to_vec().into());
        self.write
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

        Ok(buf.len())
    }

    async fn close(&self) {
        let _ = self.write.lock().await.send(Message::Close(None)).await;
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn local_name(&self) -> &str {
        &self.local_name
    }
}

/// Pumps WebSocket frames into the event queue. SIP payloads arrive as
/// binary or text frames, everything else is protocol plumbing.
async fn ws_read<S>(
    mut read: SplitStream<WebSocketStream<S>>,
    channel: Channel,
    events: ChannelTx,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let payload = match read.next().await {
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Text(text))) => text.into(),
            Some(Ok(Message::Close(_))) | None => {
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
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                let event = ChannelEvent::Closed {
                    endpoint: channel.key(),
                    error: Some(Error::Io(io::Error::new(io::ErrorKind::Other, err))),
                };
                events
                    .send(event)
                    .await
                    .map_err(|_| Error::EventQueueClosed)?;
                return Ok(());
            }
        };

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
}

/// Accepts incoming WebSocket connections and turns them into
/// channels.
pub struct WsServer;

impl WsServer {
    /// Binds `addr` and spawns the accept loop. Returns the bound
    /// address.
    pub async fn bind(addr: SocketAddr, events: ChannelTx) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        tokio::spawn(Self::accept_loop(listener, events));

        log::debug!("SIP {} channel started, listening on {}", Protocol::Ws, addr);

        Ok(addr)
    }

    async fn accept_loop(listener: TcpListener, events: ChannelTx) {
        let mut incoming = TcpListenerStream::new(listener);

        while let Some(stream) = incoming.next().await {
            match stream {
                Ok(stream) => {
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(err) = Self::on_accept(stream, events).await {
                            log::warn!("Failed to accept WebSocket connection: {}", err);
                        }
                    });
                }
                Err(err) => {
                    log::error!("WebSocket accept error: {}", err);
                    continue;
                }
            }
        }
    }

    async fn on_accept(stream: TcpStream, events: ChannelTx) -> Result<()> {
        let local_addr = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        log::debug!("Got incoming WebSocket connection from {}", peer);

        let stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let channel = WsChannel::start(
            stream,
            Protocol::Ws,
            local_addr,
            peer,
            Direction::Incoming,
            events.clone(),
        );
        events
            .send(ChannelEvent::Connected {
                endpoint: channel.key(),
                channel,
            })
            .await
            .map_err(|_| Error::EventQueueClosed)?;

        Ok(())
    }
}

/// Opens outbound WebSocket channels, plain or over TLS.
pub struct WsFactory {
    protocol: Protocol,
}

impl WsFactory {
    pub fn new() -> Self {
        Self {
            protocol: Protocol::Ws,
        }
    }

    pub fn secure() -> Self {
        Self {
            protocol: Protocol::Wss,
        }
    }
}

impl Default for WsFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChannelFactory for WsFactory {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn create(
        &self,
        target: &EndPoint,
        events: ChannelTx,
        _overrides: ConnectOverride,
    ) -> Result<Channel> {
        let addr = super::target_addr(target)?;
        let scheme = if self.protocol == Protocol::Wss {
            "wss"
        } else {
            "ws"
        };
        let host_port = HostPort::new(target.host().clone(), Some(target.port()));
        let url = format!("{}://{}", scheme, host_port);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| Error::ConnectFailed {
                endpoint: target.clone(),
                reason: err.to_string(),
            })?;
        let local_addr = stream.local_addr()?;

        let (stream, _response) = tokio_tungstenite::client_async_tls(url, stream)
            .await
            .map_err(|err| Error::ConnectFailed {
                endpoint: target.clone(),
                reason: err.to_string(),
            })?;

        Ok(WsChannel::start(
            stream,
            self.protocol,
            local_addr,
            addr,
            Direction::Outgoing,
            events,
        ))
    }
}
