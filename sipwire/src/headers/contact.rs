use std::fmt;
use std::str::{self};

use crate::{
    error::Result,
    headers::{EXPIRES_PARAM, Q_PARAM},
    macros::parse_header_param,
    message::{Params, SipUri},
    parser::Parser,
    ArcStr,
};

use crate::headers::HeaderParse;

/// The `Contact` SIP header.
///
/// Carries a URI at which the sender can be reached
/// directly, or `*` in a `REGISTER` that removes every
/// binding at once.
///
/// # Examples
/// ```
/// # use sipwire::headers::{Contact, HeaderParse};
/// let contact = Contact::from_bytes(b"<sips:bob@192.0.2.4>;expires=60").unwrap();
///
/// assert_eq!(
///     "Contact: <sips:bob@192.0.2.4>;expires=60",
///     contact.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Contact {
    /// The wildcard form, `Contact: *`.
    Star,
    /// A reachable address with its optional parameters.
    Uri {
        /// The contact address, either form.
        uri: SipUri,
        /// The `q` preference parameter, kept verbatim.
        q: Option<ArcStr>,
        /// The `expires` parameter in seconds.
        expires: Option<u32>,
        /// Remaining generic parameters.
        param: Option<Params>,
    },
}

impl Contact {
    /// Returns the contact address unless this is the wildcard form.
    pub fn uri(&self) -> Option<&SipUri> {
        match self {
            Contact::Star => None,
            Contact::Uri { uri, .. } => Some(uri),
        }
    }
}

impl HeaderParse for Contact {
    const NAME: &'static str = "Contact";
    const SHORT_NAME: Option<&'static str> = Some("m");
    /*
     * Contact        =  ("Contact" / "m" ) HCOLON
     *                   ( STAR / (contact-param *(COMMA contact-param)))
     * contact-param  =  (name-addr / addr-spec) *(SEMI contact-params)
     * contact-params =  c-p-q / c-p-expires / contact-extension
     * c-p-q          =  "q" EQUAL qvalue
     * c-p-expires    =  "expires" EQUAL delta-seconds
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        parser.space();
        if parser.peek_byte() == Some(b'*') {
            let _ = parser.next_byte();
            return Ok(Contact::Star);
        }

        let uri = parser.parse_sip_uri(false)?;
        let mut q = None;
        let mut expires: Option<ArcStr> = None;
        let param = parse_header_param!(parser, Q_PARAM = q, EXPIRES_PARAM = expires);
        let expires = expires.and_then(|e| e.parse().ok());

        Ok(Contact::Uri {
            uri,
            q,
            expires,
            param,
        })
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Contact::Star => write!(f, "{}: *", Contact::NAME),
            Contact::Uri {
                uri,
                q,
                expires,
                param,
            } => {
                write!(f, "{}: {}", Contact::NAME, uri)?;
                if let Some(q) = q {
                    write!(f, ";q={}", q)?;
                }
                if let Some(expires) = expires {
                    write!(f, ";expires={}", expires)?;
                }
                if let Some(param) = param {
                    write!(f, "{}", param)?;
                }
                Ok(())
            }
        }
    }
}
