//! TLS certificate verdicts.
//!
//! A certificate failure on a connect does not kill the attempt
//! outright. The network layer parks the pending sends and runs a
//! [`SslCertErrorTransaction`] against the registered handler, whose
//! verdict decides between retrying with an override and failing the
//! sends.

use std::fmt;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::endpoint::EndPoint;

/// What went wrong during certificate verification.
#[derive(Debug, Clone)]
pub struct CertErrorInfo {
    /// The end-entity certificate the peer presented, when one was.
    pub cert: Option<CertificateDer<'static>>,
    /// Fatal failures cannot be overridden by approval.
    pub fatal: bool,
    /// The server asked for a client certificate we did not have.
    pub client_cert_requested: bool,
    /// Human readable failure reason.
    pub reason: String,
}

/// A client certificate chain with its private key.
pub struct ClientIdentity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl fmt::Debug for ClientIdentity {
    // Key material never lands in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("cert_chain", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

/// Decides certificate verdicts for the network layer.
#[async_trait::async_trait]
pub trait SslCertErrorHandler: Send + Sync + 'static {
    /// Asks whether the rejected `cert` should be trusted anyway.
    /// Fatal failures are reported too, approval cannot override them.
    async fn get_user_approval(
        &self,
        endpoint: &EndPoint,
        cert: &CertificateDer<'static>,
        fatal: bool,
    ) -> bool;

    /// Asks for a client identity after the server requested one.
    async fn get_client_cert(&self, endpoint: &EndPoint) -> Option<ClientIdentity>;
}

/// One certificate verdict round for one endpoint.
///
/// A server certificate failure asks for approval exactly once, a
/// client certificate request asks for an identity exactly once. The
/// two never mix in one round.
#[derive(Debug)]
pub struct SslCertErrorTransaction {
    endpoint: EndPoint,
    info: CertErrorInfo,
    accepted: bool,
    client_cert: Option<ClientIdentity>,
}

impl SslCertErrorTransaction {
    pub fn new(endpoint: EndPoint, info: CertErrorInfo) -> Self {
        Self {
            endpoint,
            info,
            accepted: false,
            client_cert: None,
        }
    }

    /// Runs the round against `handler`.
    pub async fn run(&mut self, handler: &dyn SslCertErrorHandler) {
        if let Some(cert) = &self.info.cert {
            let approved = handler
                .get_user_approval(&self.endpoint, cert, self.info.fatal)
                .await;
            self.accepted = approved && !self.info.fatal;
        } else if self.info.client_cert_requested {
            self.client_cert = handler.get_client_cert(&self.endpoint).await;
            self.accepted = self.client_cert.is_some();
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn endpoint(&self) -> &EndPoint {
        &self.endpoint
    }

    pub fn info(&self) -> &CertErrorInfo {
        &self.info
    }

    pub fn client_cert(&self) -> Option<&ClientIdentity> {
        self.client_cert.as_ref()
    }

    /// Takes the identity the handler supplied for the reconnect.
    pub fn take_client_cert(&mut self) -> Option<ClientIdentity> {
        self.client_cert.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use rustls_pki_types::PrivatePkcs8KeyDer;

    use crate::endpoint::Protocol;

    struct CountingHandler {
        approvals: AtomicUsize,
        identity_requests: AtomicUsize,
        approve: bool,
        supply_identity: bool,
    }

    impl CountingHandler {
        fn new(approve: bool, supply_identity: bool) -> Self {
            Self {
                approvals: AtomicUsize::new(0),
                identity_requests: AtomicUsize::new(0),
                approve,
                supply_identity,
            }
        }
    }

    #[async_trait::async_trait]
    impl SslCertErrorHandler for CountingHandler {
        async fn get_user_approval(
            &self,
            _endpoint: &EndPoint,
            _cert: &CertificateDer<'static>,
            _fatal: bool,
        ) -> bool {
            self.approvals.fetch_add(1, Ordering::SeqCst);
            self.approve
        }

        async fn get_client_cert(&self, _endpoint: &EndPoint) -> Option<ClientIdentity> {
            self.identity_requests.fetch_add(1, Ordering::SeqCst);

            self.supply_identity.then(|| ClientIdentity {
                cert_chain: vec![CertificateDer::from(vec![0x30, 0x82])],
                key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![0u8; 8])),
            })
        }
    }

    fn endpoint() -> EndPoint {
        EndPoint::from(("192.0.2.7:5061".parse().unwrap(), Protocol::Tls))
    }

    fn server_cert_info(fatal: bool) -> CertErrorInfo {
        CertErrorInfo {
            cert: Some(CertificateDer::from(vec![0x30, 0x82, 0x01])),
            fatal,
            client_cert_requested: false,
            reason: "certificate is not trusted".into(),
        }
    }

    #[tokio::test]
    async fn test_approval_is_asked_exactly_once() {
        let handler = CountingHandler::new(true, false);
        let mut tsx = SslCertErrorTransaction::new(endpoint(), server_cert_info(false));

        tsx.run(&handler).await;

        assert_eq!(handler.approvals.load(Ordering::SeqCst), 1);
        assert_eq!(handler.identity_requests.load(Ordering::SeqCst), 0);
        assert!(tsx.is_accepted());
    }

    #[tokio::test]
    async fn test_fatal_failure_cannot_be_approved() {
        let handler = CountingHandler::new(true, false);
        let mut tsx = SslCertErrorTransaction::new(endpoint(), server_cert_info(true));

        tsx.run(&handler).await;

        assert_eq!(handler.approvals.load(Ordering::SeqCst), 1);
        assert!(!tsx.is_accepted());
    }

    #[tokio::test]
    async fn test_client_cert_round_never_asks_approval() {
        let handler = CountingHandler::new(false, true);
        let info = CertErrorInfo {
            cert: None,
            fatal: false,
            client_cert_requested: true,
            reason: "peer requires a client certificate".into(),
        };
        let mut tsx = SslCertErrorTransaction::new(endpoint(), info);

        tsx.run(&handler).await;

        assert_eq!(handler.approvals.load(Ordering::SeqCst), 0);
        assert_eq!(handler.identity_requests.load(Ordering::SeqCst), 1);
        assert!(tsx.is_accepted());
        assert!(tsx.take_client_cert().is_some());
        assert!(tsx.client_cert().is_none());
    }

    #[tokio::test]
    async fn test_refused_identity_rejects() {
        let handler = CountingHandler::new(false, false);
        let info = CertErrorInfo {
            cert: None,
            fatal: false,
            client_cert_requested: true,
            reason: "peer requires a client certificate".into(),
        };
        let mut tsx = SslCertErrorTransaction::new(endpoint(), info);

        tsx.run(&handler).await;

        assert!(!tsx.is_accepted());
        assert!(tsx.client_cert().is_none());
    }
}
