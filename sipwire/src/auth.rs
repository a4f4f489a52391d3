//! Digest credentials for challenged requests.
//!
//! A 401 or 407 does not end a request, it opens a retry round. The
//! caller runs an [`AuthTransaction`] against the registered
//! [`PasswordHandler`] and resubmits the request carrying the
//! regenerated `Authorization` and `Proxy-Authorization` headers.

use rand::distr::{Alphanumeric, SampleString};

use crate::error::{Error, Result, SipParserError};
use crate::headers::{
    Authorization, Header, HeaderParse, Headers, ProxyAuthorization, WWWAuthenticate,
};
use crate::message::auth::{Challenge, Credential, DigestCredential, DIGEST_SCHEME};
use crate::message::{Method, Request, Response};
use crate::ArcStr;

/// Supplies the username and password for a protection realm.
#[async_trait::async_trait]
pub trait PasswordHandler: Send + Sync + 'static {
    /// Returns the `(username, password)` pair for `realm`.
    ///
    /// May suspend for as long as it takes, a UI round trip included.
    /// An error refuses the credentials and aborts the retry round.
    async fn get_credentials(&self, realm: &str) -> Result<(String, String)>;
}

/// One authentication scheme answering the challenges of one source.
///
/// The scheme keeps whatever state its rounds require across request
/// attempts. [`DigestScheme`] is the built-in implementation.
pub trait AuthScheme: Send + Sync + 'static {
    /// The scheme name as it appears in a challenge.
    fn name(&self) -> &str;

    /// Primes the scheme with fresh credentials and the challenge
    /// they answer.
    fn reset(&mut self, username: &str, password: &str, challenge: &Challenge) -> Result<()>;

    /// Generates the credential for one request attempt.
    fn generate_credential(&mut self, method: &Method, uri: &str) -> Result<Credential>;
}

/// Digest authentication, RFC 2617 MD5 with `qop=auth`.
#[derive(Default)]
pub struct DigestScheme {
    username: String,
    realm: String,
    ha1: String,
    nonce: String,
    cnonce: String,
    opaque: Option<ArcStr>,
    qop: Option<ArcStr>,
    nc: u32,
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

impl AuthScheme for DigestScheme {
    fn name(&self) -> &str {
        DIGEST_SCHEME
    }

    fn reset(&mut self, username: &str, password: &str, challenge: &Challenge) -> Result<()> {
        let Some(digest) = challenge.digest() else {
            return Err(Error::UnsupportedAuthScheme(challenge.scheme().into()));
        };

        if let Some(algorithm) = digest.algorithm.as_deref() {
            if !algorithm.eq_ignore_ascii_case("MD5") {
                return Err(Error::UnsupportedAuthScheme(
                    format!("{DIGEST_SCHEME}/{algorithm}").into(),
                ));
            }
        }

        let qop = match digest.qop.as_deref() {
            None => None,
            Some(offered) if offered.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) => {
                Some(ArcStr::from("auth"))
            }
            Some(offered) => {
                return Err(Error::UnsupportedAuthScheme(
                    format!("{DIGEST_SCHEME} qop={offered}").into(),
                ));
            }
        };

        let nonce = digest
            .nonce
            .as_deref()
            .ok_or_else(|| SipParserError::from("Digest challenge has no nonce"))?;

        // A new nonce restarts the request counter, a repeated one
        // (stale retry) keeps counting.
        if self.nonce != nonce {
            self.nonce = nonce.into();
            self.cnonce = Alphanumeric.sample_string(&mut rand::rng(), 16);
            self.nc = 0;
        }

        self.realm = digest.realm.as_deref().unwrap_or_default().into();
        self.ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        self.username = username.into();
        self.opaque = digest.opaque.clone();
        self.qop = qop;

        Ok(())
    }

    fn generate_credential(&mut self, method: &Method, uri: &str) -> Result<Credential> {
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let response = match &self.qop {
            Some(qop) => {
                self.nc += 1;
                md5_hex(&format!(
                    "{}:{}:{:08x}:{}:{}:{}",
                    self.ha1, self.nonce, self.nc, self.cnonce, qop, ha2
                ))
            }
            None => md5_hex(&format!("{}:{}:{}", self.ha1, self.nonce, ha2)),
        };

        Ok(Credential::Digest(DigestCredential {
            realm: Some(self.realm.as_str().into()),
            username: Some(self.username.as_str().into()),
            nonce: Some(self.nonce.as_str().into()),
            uri: Some(uri.into()),
            response: Some(response.into()),
            algorithm: Some("MD5".into()),
            cnonce: self.qop.as_ref().map(|_| self.cnonce.as_str().into()),
            opaque: self.opaque.clone(),
            qop: self.qop.clone(),
            nc: self.qop.as_ref().map(|_| format!("{:08x}", self.nc).into()),
        }))
    }
}

struct AnsweredChallenge {
    proxy: bool,
    scheme: Box<dyn AuthScheme>,
}

/// One credential round for one challenged request.
///
/// Collects the challenges of a 401/407, asks the [`PasswordHandler`]
/// for the matching credentials and rewrites the credential headers of
/// the request to retry. The transaction stays primed afterwards:
/// further attempts re-sign the request without asking again, with the
/// digest request counter moving forward.
#[derive(Default)]
pub struct AuthTransaction {
    answered: Vec<AnsweredChallenge>,
}

impl AuthTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a previous round already primed credentials.
    pub fn is_primed(&self) -> bool {
        !self.answered.is_empty()
    }

    /// Answers the challenges of `response` by rewriting the
    /// credential headers of `request`.
    ///
    /// Without a fresh challenge a primed transaction re-signs the
    /// request as is; an unprimed one has nothing to answer and fails
    /// with the missing header.
    pub async fn answer(
        &mut self,
        handler: &dyn PasswordHandler,
        response: &Response,
        request: &mut Request,
    ) -> Result<()> {
        let challenges: Vec<(bool, &Challenge)> = response
            .headers
            .iter()
            .filter_map(|header| match header {
                Header::WWWAuthenticate(www) => Some((false, www.challenge())),
                Header::ProxyAuthenticate(proxy) => Some((true, proxy.challenge())),
                _ => None,
            })
            .collect();

        if challenges.is_empty() && !self.is_primed() {
            return Err(Error::MissingRequiredHeader(WWWAuthenticate::NAME));
        }

        for (proxy, challenge) in challenges {
            self.answer_challenge(handler, proxy, challenge).await?;
        }

        self.apply(request)
    }

    /// Regenerates the credential headers on `request` from the primed
    /// schemes, replacing whatever credentials it carried. A no-op on
    /// an unprimed transaction.
    pub fn apply(&mut self, request: &mut Request) -> Result<()> {
        strip_credentials(&mut request.headers);

        let method = request.method().clone();
        let uri = request.req_line.uri.to_string();

        for answered in &mut self.answered {
            let credential = answered.scheme.generate_credential(&method, &uri)?;

            request.headers.push(if answered.proxy {
                Header::ProxyAuthorization(ProxyAuthorization::new(credential))
            } else {
                Header::Authorization(Authorization::new(credential))
            });
        }

        Ok(())
    }

    async fn answer_challenge(
        &mut self,
        handler: &dyn PasswordHandler,
        proxy: bool,
        challenge: &Challenge,
    ) -> Result<()> {
        let position = self.answered.iter().position(|answered| {
            answered.proxy == proxy
                && answered.scheme.name().eq_ignore_ascii_case(challenge.scheme())
        });

        let realm = challenge
            .digest()
            .and_then(|digest| digest.realm.as_deref())
            .unwrap_or_default();

        match position {
            Some(index) => {
                let (username, password) = handler.get_credentials(realm).await?;

                self.answered[index]
                    .scheme
                    .reset(&username, &password, challenge)
            }
            None => {
                // The scheme lookup comes before the credential round,
                // so an unanswerable challenge never costs a UI trip.
                let mut scheme = new_scheme(challenge)?;
                let (username, password) = handler.get_credentials(realm).await?;

                scheme.reset(&username, &password, challenge)?;
                self.answered.push(AnsweredChallenge { proxy, scheme });

                Ok(())
            }
        }
    }
}

fn new_scheme(challenge: &Challenge) -> Result<Box<dyn AuthScheme>> {
    if challenge.scheme().eq_ignore_ascii_case(DIGEST_SCHEME) {
        return Ok(Box::new(DigestScheme::default()));
    }

    Err(Error::UnsupportedAuthScheme(challenge.scheme().into()))
}

fn strip_credentials(headers: &mut Headers) {
    loop {
        let Some(index) = headers
            .iter()
            .position(|header| matches!(header, Header::Authorization(_) | Header::ProxyAuthorization(_)))
        else {
            break;
        };

        headers.remove(index);
    }
}
