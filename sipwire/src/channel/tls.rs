use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::{AlertDescription, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

use super::decoder::StreamDecoder;
use super::tcp::Direction;
use super::{
    stream_read, Channel, ChannelEvent, ChannelFactory, ChannelTx, ConnectOverride, SipChannel,
};
use crate::cert::CertErrorInfo;
use crate::endpoint::{EndPoint, Protocol};
use crate::error::{Error, Result};

type TlsWrite = Arc<Mutex<WriteHalf<TlsStream<TcpStream>>>>;

/// A SIP channel over one TLS connection.
pub struct TlsChannel {
    write: TlsWrite,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    direction: Direction,
    local_name: String,
}

impl TlsChannel {
    /// Splits the handshaked `stream` and starts the reader task.
    fn start(
        stream: TlsStream<TcpStream>,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        direction: Direction,
        max_message_size: usize,
        events: ChannelTx,
    ) -> Result<Channel> {
        let (read, write) = tokio::io::split(stream);
        let read = FramedRead::new(read, StreamDecoder::new(max_message_size));

        let channel = Channel::new(TlsChannel {
            write: Arc::new(Mutex::new(write)),
            local_addr,
            remote_addr,
            direction,
            local_name: crate::get_local_name(&local_addr),
        });

        log::trace!(
            "TLS channel ({:?}) {} <-> {}",
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
}

#[async_trait::async_trait]
impl SipChannel for TlsChannel {
    async fn send(&self, buf: &[u8], _addr: &SocketAddr) -> io::Result<usize> {
        let mut write = self.write.lock().await;
        write.write_all(buf).await?;
        write.flush().await?;

        Ok(buf.len())
    }

    async fn close(&self) {
        // shutdown sends close_notify before the FIN.
        let _ = self.write.lock().await.shutdown().await;
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tls
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

/// A webpki verifier that remembers why it rejected a peer.
///
/// The handshake only reports a generic failure, so the factory reads
/// the recorded end-entity certificate afterwards to build the
/// [`CertErrorInfo`] a verdict needs. A certificate the user already
/// approved bypasses the chain check by byte equality.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    trusted: Option<CertificateDer<'static>>,
    rejected: StdMutex<Option<(CertificateDer<'static>, String)>>,
}

impl RecordingVerifier {
    fn new(trusted: Option<CertificateDer<'static>>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        Ok(Self {
            inner,
            trusted,
            rejected: StdMutex::new(None),
        })
    }

    fn take_rejected(&self) -> Option<(CertificateDer<'static>, String)> {
        self.rejected.lock().expect("Lock failed").take()
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if let Some(trusted) = &self.trusted {
            if trusted.as_ref() == end_entity.as_ref() {
                return Ok(ServerCertVerified::assertion());
            }
        }

        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(verified) => Ok(verified),
            Err(err) => {
                let rejected = (end_entity.clone().into_owned(), err.to_string());
                *self.rejected.lock().expect("Lock failed") = Some(rejected);
                Err(err)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn certificate_required(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|err| {
            matches!(
                err,
                rustls::Error::AlertReceived(AlertDescription::CertificateRequired)
            )
        })
}

/// Opens outbound TLS channels.
pub struct TlsFactory {
    max_message_size: usize,
}

impl TlsFactory {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    fn classify(&self, verifier: &RecordingVerifier, target: &EndPoint, err: io::Error) -> Error {
        if let Some((cert, reason)) = verifier.take_rejected() {
            return Error::PeerCertificate(CertErrorInfo {
                cert: Some(cert),
                fatal: false,
                client_cert_requested: false,
                reason,
            });
        }
        if certificate_required(&err) {
            return Error::PeerCertificate(CertErrorInfo {
                cert: None,
                fatal: false,
                client_cert_requested: true,
                reason: err.to_string(),
            });
        }

        Error::ConnectFailed {
            endpoint: target.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ChannelFactory for TlsFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Tls
    }

    async fn create(
        &self,
        target: &EndPoint,
        events: ChannelTx,
        overrides: ConnectOverride,
    ) -> Result<Channel> {
        let addr = super::target_addr(target)?;
        let verifier = Arc::new(RecordingVerifier::new(overrides.trust_cert)?);

        let builder = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone());
        let config = match overrides.client_identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain, identity.key)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?,
            None => builder.with_no_client_auth(),
        };
        let connector = TlsConnector::from(Arc::new(config));

        let server_name = ServerName::try_from(target.host().as_str().into_owned())
            .map_err(|err| Error::ConnectFailed {
                endpoint: target.clone(),
                reason: err.to_string(),
            })?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| Error::ConnectFailed {
                endpoint: target.clone(),
                reason: err.to_string(),
            })?;
        let local_addr = stream.local_addr()?;

        match connector.connect(server_name, stream).await {
            Ok(stream) => TlsChannel::start(
                stream.into(),
                local_addr,
                addr,
                Direction::Outgoing,
                self.max_message_size,
                events,
            ),
            Err(err) => Err(self.classify(&verifier, target, err)),
        }
    }
}

/// Accepts incoming TLS connections and turns them into channels.
pub struct TlsServer;

impl TlsServer {
    /// Binds `addr` with the given server identity and spawns the
    /// accept loop. Returns the bound address.
    pub async fn bind(
        addr: SocketAddr,
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        max_message_size: usize,
        events: ChannelTx,
    ) -> Result<SocketAddr> {
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        tokio::spawn(Self::accept_loop(
            listener,
            acceptor,
            max_message_size,
            events,
        ));

        log::debug!(
            "SIP {} channel started, listening on {}",
            Protocol::Tls,
            addr
        );

        Ok(addr)
    }

    async fn accept_loop(
        listener: TcpListener,
        acceptor: TlsAcceptor,
        max_message_size: usize,
        events: ChannelTx,
    ) {
        let mut incoming = TcpListenerStream::new(listener);

        while let Some(stream) = incoming.next().await {
            match stream {
                Ok(stream) => {
                    // Handshakes run off the accept loop so one slow
                    // peer cannot stall the listener.
                    let acceptor = acceptor.clone();
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(err) =
                            Self::on_accept(stream, acceptor, max_message_size, events).await
                        {
                            log::warn!("Failed to accept TLS connection: {}", err);
                        }
                    });
                }
                Err(err) => {
                    log::error!("TLS accept error: {}", err);
                    continue;
                }
            }
        }
    }

    async fn on_accept(
        stream: TcpStream,
        acceptor: TlsAcceptor,
        max_message_size: usize,
        events: ChannelTx,
    ) -> Result<()> {
        let local_addr = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        log::debug!("Got incoming TLS connection from {}", peer);

        let stream = acceptor.accept(stream).await?;
        let channel = TlsChannel::start(
            stream.into(),
            local_addr,
            peer,
            Direction::Incoming,
            max_message_size,
            events.clone(),
        )?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn server_name() -> ServerName<'static> {
        ServerName::try_from("sip.example.com").unwrap()
    }

    #[test]
    fn test_trusted_certificate_bypasses_the_chain_check() {
        let pinned = CertificateDer::from(vec![0x30, 0x82, 0x0a, 0x0b]);
        let verifier = RecordingVerifier::new(Some(pinned.clone())).unwrap();

        let verdict = verifier.verify_server_cert(
            &pinned,
            &[],
            &server_name(),
            &[],
            UnixTime::now(),
        );

        assert!(verdict.is_ok());
        assert!(verifier.take_rejected().is_none());
    }

    #[test]
    fn test_rejected_certificate_is_recorded() {
        let verifier = RecordingVerifier::new(None).unwrap();
        let garbage = CertificateDer::from(vec![0x30, 0x82, 0x0a, 0x0b]);

        let verdict =
            verifier.verify_server_cert(&garbage, &[], &server_name(), &[], UnixTime::now());

        assert!(verdict.is_err());

        let (cert, reason) = verifier.take_rejected().unwrap();
        assert_eq!(cert.as_ref(), garbage.as_ref());
        assert!(!reason.is_empty());
        // The record is consumed by the read.
        assert!(verifier.take_rejected().is_none());
    }

    #[test]
    fn test_classify_certificate_required_alert() {
        let factory = TlsFactory::new(crate::parser::MAX_MESSAGE_SIZE);
        let verifier = RecordingVerifier::new(None).unwrap();
        let addr: SocketAddr = "192.0.2.9:5061".parse().unwrap();
        let target = EndPoint::from((addr, Protocol::Tls));

        let err = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::AlertReceived(AlertDescription::CertificateRequired),
        );

        let classified = factory.classify(&verifier, &target, err);
        assert_matches!(classified, Error::PeerCertificate(CertErrorInfo {
            cert: None,
            client_cert_requested: true,
            ..
        }));
    }

    #[test]
    fn test_classify_plain_io_error() {
        let factory = TlsFactory::new(crate::parser::MAX_MESSAGE_SIZE);
        let verifier = RecordingVerifier::new(None).unwrap();
        let addr: SocketAddr = "192.0.2.9:5061".parse().unwrap();
        let target = EndPoint::from((addr, Protocol::Tls));

        let err = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");

        let classified = factory.classify(&verifier, &target, err);
        assert_matches!(classified, Error::ConnectFailed { .. });
    }
}
