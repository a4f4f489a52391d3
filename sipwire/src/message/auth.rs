//! SIP Auth types
//!
use std::fmt;

use itertools::Itertools;

use crate::message::Params;
use crate::ArcStr;

/// Scheme name used by the digest variants of [`Challenge`] and
/// [`Credential`].
pub const DIGEST_SCHEME: &str = "Digest";

/// A Digest Challenge.
///
/// Values are stored without their surrounding quotes; serialization
/// restores the quoting the grammar requires.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DigestChallenge {
    /// The realm of the digest authentication.
    pub realm: Option<ArcStr>,

    /// The domain of the digest authentication.
    pub domain: Option<ArcStr>,

    /// The nonce of the digest authentication.
    pub nonce: Option<ArcStr>,

    /// The opaque value of the digest authentication.
    pub opaque: Option<ArcStr>,

    /// Indicates whether the previous request was stale.
    pub stale: Option<ArcStr>,

    /// The algorithm used in the digest authentication.
    pub algorithm: Option<ArcStr>,

    /// The quality of protection (qop) value.
    pub qop: Option<ArcStr>,
}

/// This enum represents an authentication challenge mechanism
/// used in `Proxy-Authenticate` and `WWW-Authenticate` headers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Challenge {
    /// A `Digest` authentication scheme.
    Digest(DigestChallenge),
    /// Any other authentication scheme not specifically handled.
    Other {
        /// The name of the authentication scheme.
        scheme: ArcStr,

        /// The parameters associated with the scheme.
        param: Params,
    },
}

impl Challenge {
    /// Returns the scheme name of the challenge.
    pub fn scheme(&self) -> &str {
        match self {
            Challenge::Digest(_) => DIGEST_SCHEME,
            Challenge::Other { scheme, .. } => scheme,
        }
    }

    /// Returns the digest challenge, if this is the digest scheme.
    pub fn digest(&self) -> Option<&DigestChallenge> {
        match self {
            Challenge::Digest(digest) => Some(digest),
            Challenge::Other { .. } => None,
        }
    }
}

fn fmt_auth_params(f: &mut fmt::Formatter<'_>, param: &Params) -> fmt::Result {
    let formater = Itertools::format_with(param.iter(), ", ", |it, f| match &it.value {
        Some(value) => f(&format_args!("{}={}", it.name, value)),
        None => f(&format_args!("{}", it.name)),
    });
    write!(f, "{}", formater)
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::Digest(DigestChallenge {
                realm,
                domain,
                nonce,
                opaque,
                stale,
                algorithm,
                qop,
            }) => {
                write!(f, "Digest ")?;
                let mut sep = "";
                if let Some(realm) = realm {
                    write!(f, "realm=\"{realm}\"")?;
                    sep = ", ";
                }
                if let Some(domain) = domain {
                    write!(f, "{sep}domain=\"{domain}\"")?;
                    sep = ", ";
                }
                if let Some(nonce) = nonce {
                    write!(f, "{sep}nonce=\"{nonce}\"")?;
                    sep = ", ";
                }
                if let Some(opaque) = opaque {
                    write!(f, "{sep}opaque=\"{opaque}\"")?;
                    sep = ", ";
                }
                if let Some(stale) = stale {
                    write!(f, "{sep}stale={stale}")?;
                    sep = ", ";
                }
                if let Some(algorithm) = algorithm {
                    write!(f, "{sep}algorithm={algorithm}")?;
                    sep = ", ";
                }
                if let Some(qop) = qop {
                    write!(f, "{sep}qop=\"{qop}\"")?;
                }

                Ok(())
            }
            Challenge::Other { scheme, param } => {
                write!(f, "{scheme} ")?;
                fmt_auth_params(f, param)
            }
        }
    }
}

/// Represents credentials for a `Digest` authentication scheme,
/// typically found in the `Authorization` and `Proxy-Authorization` headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestCredential {
    /// The realm value that defines the protection space.
    pub realm: Option<ArcStr>,

    /// The username associated with the credential.
    pub username: Option<ArcStr>,

    /// The nonce value provided by the server.
    pub nonce: Option<ArcStr>,

    /// The URI of the requested resource.
    pub uri: Option<ArcStr>,

    /// The response hash calculated from the credential data.
    pub response: Option<ArcStr>,

    /// The algorithm used to hash the credentials (e.g., "MD5").
    pub algorithm: Option<ArcStr>,

    /// The client nonce value (cnonce) used to prevent replay attacks.
    pub cnonce: Option<ArcStr>,

    /// The opaque value provided by the server, to be returned unchanged.
    pub opaque: Option<ArcStr>,

    /// The quality of protection (qop) applied to the message.
    pub qop: Option<ArcStr>,

    /// The nonce count (nc), indicating the number of requests made with the same nonce.
    pub nc: Option<ArcStr>,
}

/// This type represent a credential containing the
/// authentication information in `Authorization` and
/// `Proxy-Authorization` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A `digest` authentication scheme.
    Digest(DigestCredential),
    /// Other scheme not specified.
    Other {
        /// The name of the authentication scheme.
        scheme: ArcStr,

        /// The parameters associated with the scheme.
        param: Params,
    },
}

impl Credential {
    /// Returns the scheme name of the credential.
    pub fn scheme(&self) -> &str {
        match self {
            Credential::Digest(_) => DIGEST_SCHEME,
            Credential::Other { scheme, .. } => scheme,
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Digest(DigestCredential {
                realm,
                username,
                nonce,
                uri,
                response,
                algorithm,
                cnonce,
                opaque,
                qop,
                nc,
            }) => {
                write!(f, "Digest ")?;
                let mut sep = "";
                if let Some(username) = username {
                    write!(f, "username=\"{username}\"")?;
                    sep = ", ";
                }
                if let Some(realm) = realm {
                    write!(f, "{sep}realm=\"{realm}\"")?;
                    sep = ", ";
                }
                if let Some(nonce) = nonce {
                    write!(f, "{sep}nonce=\"{nonce}\"")?;
                    sep = ", ";
                }
                if let Some(uri) = uri {
                    write!(f, "{sep}uri=\"{uri}\"")?;
                    sep = ", ";
                }
                if let Some(response) = response {
                    write!(f, "{sep}response=\"{response}\"")?;
                    sep = ", ";
                }
                if let Some(algorithm) = algorithm {
                    write!(f, "{sep}algorithm={algorithm}")?;
                    sep = ", ";
                }
                if let Some(cnonce) = cnonce {
                    write!(f, "{sep}cnonce=\"{cnonce}\"")?;
                    sep = ", ";
                }
                if let Some(qop) = qop {
                    write!(f, "{sep}qop={qop}")?;
                    sep = ", ";
                }
                if let Some(nc) = nc {
                    write!(f, "{sep}nc={nc}")?;
                    sep = ", ";
                }
                if let Some(opaque) = opaque {
                    write!(f, "{sep}opaque=\"{opaque}\"")?;
                }

                Ok(())
            }
            Credential::Other { scheme, param } => {
                write!(f, "{scheme} ")?;
                fmt_auth_params(f, param)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_display_quotes_canonically() {
        let challenge = Challenge::Digest(DigestChallenge {
            realm: Some("atlanta.example.com".into()),
            nonce: Some("ea9c8e88df84f1cec4341ae6cbe5a359".into()),
            algorithm: Some("MD5".into()),
            ..Default::default()
        });

        assert_eq!(
            challenge.to_string(),
            "Digest realm=\"atlanta.example.com\", \
             nonce=\"ea9c8e88df84f1cec4341ae6cbe5a359\", algorithm=MD5"
        );
    }

    #[test]
    fn test_credential_display_skips_absent_params() {
        let credential = Credential::Digest(DigestCredential {
            username: Some("bob".into()),
            realm: Some("biloxi.example.com".into()),
            ..Default::default()
        });

        assert_eq!(
            credential.to_string(),
            "Digest username=\"bob\", realm=\"biloxi.example.com\""
        );
    }
}
