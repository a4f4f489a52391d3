use crate::{
    error::Result,
    headers::TAG_PARAM,
    macros::parse_header_param,
    message::{Params, SipUri},
    parser::Parser,
    ArcStr,
};

use crate::headers::HeaderParse;

use core::fmt;
use std::str::{self};

/// The `From` SIP header.
///
/// Indicates the initiator of the request.
///
/// # Examples
/// ```
/// # use sipwire::headers::From;
/// # use sipwire::message::{HostPort, Host, UriUser, UriBuilder, SipUri, NameAddr};
/// let uri = SipUri::NameAddr(NameAddr {
///     display: None,
///     uri: UriBuilder::new()
///         .user(UriUser::new("alice", None))
///         .host(HostPort::from(Host::DomainName(
///             "client.atlanta.example.com".into(),
///         )))
///         .get(),
/// });
///
/// let f = From::new(uri);
///
/// assert_eq!(
///     "From: <sip:alice@client.atlanta.example.com>",
///     f.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct From {
    uri: SipUri,
    tag: Option<ArcStr>,
    params: Option<Params>,
}

impl From {
    /// Create a new `From` instance.
    pub fn new(uri: SipUri) -> Self {
        Self {
            uri,
            tag: None,
            params: None,
        }
    }

    /// Create a new `From` instance with a tag.
    pub fn new_with_tag(uri: SipUri, tag: &str) -> Self {
        Self {
            uri,
            tag: Some(tag.into()),
            params: None,
        }
    }

    /// Get the URI of the `From` header.
    pub fn uri(&self) -> &SipUri {
        &self.uri
    }

    /// Returns the tag parameter.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Sets the tag parameter.
    pub fn set_tag(&mut self, tag: &str) {
        self.tag = Some(tag.into());
    }
}

impl HeaderParse for From {
    const NAME: &'static str = "From";
    const SHORT_NAME: Option<&'static str> = Some("f");
    /*
     * From        =  ( "From" / "f" ) HCOLON from-spec
     * from-spec   =  ( name-addr / addr-spec )
     *                *( SEMI from-param )
     * from-param  =  tag-param / generic-param
     * tag-param   =  "tag" EQUAL token
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let uri = parser.parse_sip_uri(false)?;
        let mut tag = None;
        let params = parse_header_param!(parser, TAG_PARAM = tag);

        Ok(From { tag, uri, params })
    }
}

impl fmt::Display for From {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", From::NAME, self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        if let Some(params) = &self.params {
            write!(f, "{}", params)?;
        }

        Ok(())
    }
}
