use std::fmt;

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::message::auth::Challenge;
use crate::parser::Parser;

/// The `Proxy-Authenticate` SIP header.
///
/// Carries the authentication challenge of a `407 Proxy Authentication
/// Required` response.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProxyAuthenticate(Challenge);

impl ProxyAuthenticate {
    /// Creates a new `ProxyAuthenticate` instance.
    pub fn new(challenge: Challenge) -> Self {
        Self(challenge)
    }

    /// Returns the challenge.
    pub fn challenge(&self) -> &Challenge {
        &self.0
    }
}

impl HeaderParse for ProxyAuthenticate {
    const NAME: &'static str = "Proxy-Authenticate";

    /*
     * Proxy-Authenticate  =  "Proxy-Authenticate" HCOLON challenge
     * challenge           =  ("Digest" LWS digest-cln *(COMMA digest-cln))
     *                        / other-challenge
     * other-challenge     =  auth-scheme LWS auth-param
     *                        *(COMMA auth-param)
     * digest-cln          =  realm / domain / nonce
     *                         / opaque / stale / algorithm
     *                         / qop-options / auth-param
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let challenge = parser.parse_auth_challenge()?;

        Ok(ProxyAuthenticate(challenge))
    }
}

impl fmt::Display for ProxyAuthenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Self::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"Digest realm=\"atlanta.com\", \
        nonce=\"c60f3082ee1212b402a21831ae\", qop=\"auth\"\r\n";
        let mut parser = Parser::from_bytes(src);
        let proxy_auth = ProxyAuthenticate::parse(&mut parser).unwrap();

        assert_eq!(parser.remaining(), b"\r\n");
        let Challenge::Digest(digest) = proxy_auth.challenge() else {
            panic!("expected a digest challenge");
        };
        assert_eq!(digest.realm.as_deref(), Some("atlanta.com"));
        assert_eq!(digest.nonce.as_deref(), Some("c60f3082ee1212b402a21831ae"));
        assert_eq!(digest.qop.as_deref(), Some("auth"));
    }
}
