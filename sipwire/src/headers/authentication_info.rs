use std::fmt;

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::macros::comma_separated;
use crate::parser::Parser;
use crate::ArcStr;

/// The `Authentication-Info` SIP header.
///
/// Provides additional authentication information, such as the
/// next nonce to be used in a subsequent request.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct AuthenticationInfo {
    /// The next nonce to be used for authentication.
    pub nextnonce: Option<ArcStr>,

    /// The quality of protection (qop) applied to the message.
    pub qop: Option<ArcStr>,

    /// The response authentication string.
    pub rspauth: Option<ArcStr>,

    /// The client nonce.
    pub cnonce: Option<ArcStr>,

    /// The nonce count.
    pub nc: Option<ArcStr>,
}

impl HeaderParse for AuthenticationInfo {
    const NAME: &'static str = "Authentication-Info";

    /*
     * Authentication-Info  =  "Authentication-Info" HCOLON ainfo
     *                         *(COMMA ainfo)
     * ainfo                =  nextnonce / message-qop
     *                         / response-auth / cnonce
     *                         / nonce-count
     * nextnonce            =  "nextnonce" EQUAL nonce-value
     * response-auth        =  "rspauth" EQUAL response-digest
     * response-digest      =  LDQUOT *LHEX RDQUOT
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let mut auth_info = AuthenticationInfo::default();

        comma_separated!(parser => {
            let (name, value) = parser.parse_auth_param()?;
            let value = value.map(ArcStr::from);
            match name {
                n if n.eq_ignore_ascii_case("nextnonce") => auth_info.nextnonce = value,
                n if n.eq_ignore_ascii_case("qop") => auth_info.qop = value,
                n if n.eq_ignore_ascii_case("rspauth") => auth_info.rspauth = value,
                n if n.eq_ignore_ascii_case("cnonce") => auth_info.cnonce = value,
                n if n.eq_ignore_ascii_case("nc") => auth_info.nc = value,
                _ => (),
            }
        });

        Ok(auth_info)
    }
}

impl fmt::Display for AuthenticationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", Self::NAME)?;
        let mut sep = "";
        if let Some(nextnonce) = &self.nextnonce {
            write!(f, "nextnonce=\"{nextnonce}\"")?;
            sep = ", ";
        }
        if let Some(qop) = &self.qop {
            write!(f, "{sep}qop={qop}")?;
            sep = ", ";
        }
        if let Some(rspauth) = &self.rspauth {
            write!(f, "{sep}rspauth=\"{rspauth}\"")?;
            sep = ", ";
        }
        if let Some(cnonce) = &self.cnonce {
            write!(f, "{sep}cnonce=\"{cnonce}\"")?;
            sep = ", ";
        }
        if let Some(nc) = &self.nc {
            write!(f, "{sep}nc={nc}")?;
        }

        Ok(())
    }
}
