use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;

use super::{
    Channel, ChannelEvent, ChannelFactory, ChannelTx, ConnectOverride, Packet, SipChannel,
};
use crate::endpoint::{EndPoint, Protocol};
use crate::error::Result;

/// A SIP channel over one bound UDP socket.
#[derive(Clone)]
pub struct UdpChannel(Arc<Inner>);

struct Inner {
    sock: UdpSocket,
    addr: SocketAddr,
    local_name: String,
}

impl UdpChannel {
    /// Binds `addr` and starts the receive loop.
    pub async fn bind(addr: SocketAddr, events: ChannelTx) -> Result<Channel> {
        let sock = UdpSocket::bind(addr).await?;
        let addr = sock.local_addr()?;
        let local_name = crate::get_local_name(&addr);

        let udp = UdpChannel(Arc::new(Inner {
            sock,
            addr,
            local_name,
        }));
        let channel = Channel::new(udp.clone());

        tokio::spawn(udp.recv_loop(channel.clone(), events));

        log::debug!(
            "SIP {} channel started, listening on {}",
            Protocol::Udp,
            addr
        );

        Ok(channel)
    }

    async fn recv_loop(self, channel: Channel, events: ChannelTx) {
        loop {
            let mut buf = vec![0u8; 4000];

            match self.0.sock.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    buf.truncate(len);
                    let packet = Packet::new(Bytes::from(buf), addr);
                    let event = ChannelEvent::Packet {
                        channel: channel.clone(),
                        packet,
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    // Datagram errors are per packet, the socket stays up.
                    log::warn!("UDP recv error on {}: {}", self.0.addr, err);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SipChannel for UdpChannel {
    async fn send(&self, buf: &[u8], addr: &SocketAddr) -> io::Result<usize> {
        self.0.sock.send_to(buf, addr).await
    }

    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> SocketAddr {
        self.0.addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.0.addr
    }

    fn local_name(&self) -> &str {
        &self.0.local_name
    }
}

/// Hands out the bound datagram channel for every destination.
pub struct UdpFactory {
    channel: Channel,
}

impl UdpFactory {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait::async_trait]
impl ChannelFactory for UdpFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    async fn create(
        &self,
        _target: &EndPoint,
        _events: ChannelTx,
        _overrides: ConnectOverride,
    ) -> Result<Channel> {
        Ok(self.channel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_receive() {
        let (tx, mut rx) = super::super::event_queue();
        let channel = UdpChannel::bind("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(b"OPTIONS sip:ping SIP/2.0\r\n\r\n", channel.local_addr())
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ChannelEvent::Packet { packet, .. } => {
                assert_eq!(&packet.payload[..], b"OPTIONS sip:ping SIP/2.0\r\n\r\n");
                assert_eq!(packet.addr, sender.local_addr().unwrap());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_roundtrip() {
        let (tx, _rx) = super::super::event_queue();
        let channel = UdpChannel::bind("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sent = channel
            .send(b"\r\n\r\n", &peer.local_addr().unwrap())
            .await
            .unwrap();
        assert_eq!(sent, 4);

        let mut buf = [0u8; 16];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"\r\n\r\n");
        assert_eq!(from, channel.local_addr());
    }

    #[tokio::test]
    async fn test_factory_hands_out_the_bound_channel() {
        let (tx, _rx) = super::super::event_queue();
        let channel = UdpChannel::bind("127.0.0.1:0".parse().unwrap(), tx.clone())
            .await
            .unwrap();
        let factory = UdpFactory::new(channel.clone());

        assert_eq!(factory.protocol(), Protocol::Udp);

        let addr: SocketAddr = "192.0.2.1:5060".parse().unwrap();
        let target = EndPoint::from((addr, Protocol::Udp));
        let out = factory
            .create(&target, tx, ConnectOverride::default())
            .await
            .unwrap();
        assert_eq!(out.local_addr(), channel.local_addr());
    }
}
