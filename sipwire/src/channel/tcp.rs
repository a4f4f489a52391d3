use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

use super::decoder::StreamDecoder;
use super::{
    stream_read, Channel, ChannelEvent, ChannelFactory, ChannelTx, ConnectOverride, SipChannel,
};
use crate::endpoint::{EndPoint, Protocol};
use crate::error::{Error, Result};

type TcpWrite = Arc<Mutex<WriteHalf<TcpStream>>>;

/// Which side opened a stream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A SIP channel over one TCP connection.
pub struct TcpChannel {
    write: TcpWrite,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    direction: Direction,
    local_name: String,
}

impl TcpChannel {
    /// Splits `stream` and starts the reader task.
    pub(crate) fn start(
        stream: TcpStream,
        direction: Direction,
        max_message_size: usize,
        events: ChannelTx,
    ) -> Result<Channel> {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (read, write) = tokio::io::split(stream);
        let read = FramedRead::new(read, StreamDecoder::new(max_message_size));

        let channel = Channel::new(TcpChannel {
            write: Arc::new(Mutex::new(write)),
            local_addr,
            remote_addr,
            direction,
            local_name: crate::get_local_name(&local_addr),
        });

        log::trace!(
            "TCP channel ({:?}) {} <-> {}",
            direction,
            local_addr,
            remote_addr
        );

        tokio::spawn({
            let channel = channel.clone();
            async move {
                if let Err(err) = stream_read(read, channel, events).await {
                    log::warn!("An error occured; error = {:#}", err);
                }
            }
        });

        Ok(channel)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[async_trait::async_trait]
impl SipChannel for TcpChannel {
    async fn send(&self, buf: &[u8], _addr: &SocketAddr) -> io::Result<usize> {
        let mut write = self.write.lock().await;
        write.write_all(buf).await?;
        write.flush().await?;

        Ok(buf.len())
    }

    async fn close(&self) {
        let _ = self.write.lock().await.shutdown().await;
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tcp
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

/// Accepts incoming TCP connections and turns them into channels.
pub struct TcpServer;

impl TcpServer {
    /// Binds `addr` and spawns the accept loop. Returns the bound
    /// address.
    pub async fn bind(
        addr: SocketAddr,
        max_message_size: usize,
        events: ChannelTx,
    ) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        tokio::spawn(Self::accept_loop(listener, max_message_size, events));

        log::debug!(
            "SIP {} channel started, listening on {}",
            Protocol::Tcp,
            addr
        );

        Ok(addr)
    }

    async fn accept_loop(listener: TcpListener, max_message_size: usize, events: ChannelTx) {
        let mut incoming = TcpListenerStream::new(listener);

        while let Some(stream) = incoming.next().await {
            match stream {
                Ok(stream) => {
                    if let Err(err) = Self::on_accept(stream, max_message_size, &events).await {
                        log::error!("Failed to accept TCP connection: {}", err);
                    }
                }
                Err(err) => {
                    log::error!("TCP accept error: {}", err);
                    continue;
                }
            }
        }
    }

    async fn on_accept(
        stream: TcpStream,
        max_message_size: usize,
        events: &ChannelTx,
    ) -> Result<()> {
        let peer = stream.peer_addr()?;
        log::debug!("Got incoming TCP connection from {}", peer);

        let channel =
            TcpChannel::start(stream, Direction::Incoming, max_message_size, events.clone())?;
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

/// Opens outbound TCP channels.
pub struct TcpFactory {
    max_message_size: usize,
}

impl TcpFactory {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

#[async_trait::async_trait]
impl ChannelFactory for TcpFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    async fn create(
        &self,
        target: &EndPoint,
        events: ChannelTx,
        _overrides: ConnectOverride,
    ) -> Result<Channel> {
        let addr = super::target_addr(target)?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| Error::ConnectFailed {
                endpoint: target.clone(),
                reason: err.to_string(),
            })?;

        TcpChannel::start(stream, Direction::Outgoing, self.max_message_size, events)
    }
}
