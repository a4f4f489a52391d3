use std::fmt;

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::message::auth::Credential;
use crate::parser::Parser;

/// The `Authorization` SIP header.
///
/// Contains authentication credentials of a UA.
///
/// # Examples
///
/// ```
/// # use sipwire::headers::Authorization;
/// # use sipwire::message::auth::{Credential, DigestCredential};
/// let auth = Authorization::new(Credential::Digest(DigestCredential {
///     username: Some("Alice".into()),
///     realm: Some("atlanta.com".into()),
///     ..Default::default()
/// }));
///
/// assert_eq!(
///     "Authorization: Digest username=\"Alice\", realm=\"atlanta.com\"",
///     auth.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Authorization(Credential);

impl Authorization {
    /// Creates a new `Authorization` instance.
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }

    /// Returns the credential.
    pub fn credential(&self) -> &Credential {
        &self.0
    }
}

impl HeaderParse for Authorization {
    const NAME: &'static str = "Authorization";

    /*
     * Authorization     =  "Authorization" HCOLON credentials
     * credentials       =  ("Digest" LWS digest-response)
     *                      / other-response
     * digest-response   =  dig-resp *(COMMA dig-resp)
     * dig-resp          =  username / realm / nonce / digest-uri
     *                       / dresponse / algorithm / cnonce
     *                       / opaque / message-qop
     *                       / nonce-count / auth-param
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let credential = parser.parse_auth_credential()?;

        Ok(Authorization(credential))
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Self::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"Digest username=\"Alice\", realm=\"atlanta.com\", \
        nonce=\"84a4cc6f3082121f32b42a2187831a9e\", \
        response=\"7587245234b3434cc3412213e5f113a5432\"\r\n";
        let mut parser = Parser::from_bytes(src);
        let auth = Authorization::parse(&mut parser).unwrap();

        assert_eq!(parser.remaining(), b"\r\n");
        let Credential::Digest(digest) = auth.credential() else {
            panic!("expected a digest credential");
        };
        assert_eq!(digest.username.as_deref(), Some("Alice"));
        assert_eq!(digest.realm.as_deref(), Some("atlanta.com"));
        assert_eq!(digest.nonce.as_deref(), Some("84a4cc6f3082121f32b42a2187831a9e"));
        assert_eq!(
            digest.response.as_deref(),
            Some("7587245234b3434cc3412213e5f113a5432")
        );
    }
}
