use std::fmt;

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::message::auth::Credential;
use crate::parser::Parser;

/// The `Proxy-Authorization` SIP header.
///
/// Allows the client to identify itself (or its user) to a proxy that
/// requires authentication.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProxyAuthorization(Credential);

impl ProxyAuthorization {
    /// Creates a new `ProxyAuthorization` instance.
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }

    /// Returns the credential.
    pub fn credential(&self) -> &Credential {
        &self.0
    }
}

impl HeaderParse for ProxyAuthorization {
    const NAME: &'static str = "Proxy-Authorization";

    /*
     * Proxy-Authorization  =  "Proxy-Authorization" HCOLON credentials
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let credential = parser.parse_auth_credential()?;

        Ok(ProxyAuthorization(credential))
    }
}

impl fmt::Display for ProxyAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Self::NAME, self.0)
    }
}
