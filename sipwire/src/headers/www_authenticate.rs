use std::fmt;

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::message::auth::Challenge;
use crate::parser::Parser;

/// The `WWW-Authenticate` SIP header.
///
/// Consists of at least one challenge the server issued to
/// indicate the authentication scheme and applicable parameters.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WWWAuthenticate(Challenge);

impl WWWAuthenticate {
    /// Creates a new `WWWAuthenticate` instance.
    pub fn new(challenge: Challenge) -> Self {
        Self(challenge)
    }

    /// Returns the challenge.
    pub fn challenge(&self) -> &Challenge {
        &self.0
    }
}

impl HeaderParse for WWWAuthenticate {
    const NAME: &'static str = "WWW-Authenticate";

    /*
     * WWW-Authenticate  =  "WWW-Authenticate" HCOLON challenge
     * extension-header  =  header-name HCOLON header-value
     * header-name       =  token
     * header-value      =  *(TEXT-UTF8char / UTF8-CONT / LWS)
     * message-body      =  *OCTET
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let challenge = parser.parse_auth_challenge()?;

        Ok(WWWAuthenticate(challenge))
    }
}

impl fmt::Display for WWWAuthenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Self::NAME, self.0)
    }
}
