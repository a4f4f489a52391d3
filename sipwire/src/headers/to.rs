use crate::{
    error::Result,
    headers::TAG_PARAM,
    macros::parse_header_param,
    message::{Params, SipUri},
    parser::Parser,
    ArcStr,
};

use crate::headers::HeaderParse;

use std::{
    fmt,
    str::{self},
};

/// The `To` SIP header.
///
/// Specifies the logical recipient of the request.
///
/// # Examples
/// ```
/// # use sipwire::headers::To;
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
/// let t = To::new(uri);
///
/// assert_eq!(
///     "To: <sip:alice@client.atlanta.example.com>",
///     t.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct To {
    uri: SipUri,
    tag: Option<ArcStr>,
    params: Option<Params>,
}

impl To {
    /// Create a new `To` instance.
    pub fn new(uri: SipUri) -> Self {
        Self {
            uri,
            tag: None,
            params: None,
        }
    }

    /// Get the URI of the `To` header.
    pub fn uri(&self) -> &SipUri {
        &self.uri
    }

    /// Returns the tag parameter.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Set the tag parameter.
    pub fn set_tag(&mut self, tag: Option<&str>) {
        self.tag = tag.map(|t| t.into());
    }
}

impl HeaderParse for To {
    const NAME: &'static str = "To";
    const SHORT_NAME: Option<&'static str> = Some("t");
    /*
     * To        =  ( "To" / "t" ) HCOLON ( name-addr
     *              / addr-spec ) *( SEMI to-param )
     * to-param  =  tag-param / generic-param
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let uri = parser.parse_sip_uri(false)?;
        let mut tag = None;
        let params = parse_header_param!(parser, TAG_PARAM = tag);

        Ok(To { tag, uri, params })
    }
}

impl fmt::Display for To {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", To::NAME, self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        if let Some(params) = &self.params {
            write!(f, "{}", params)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::message::{Host, HostPort, Scheme};

    use super::*;

    #[test]
    fn test_parse() {
        let src = b"Bob <sip:bob@biloxi.com>;tag=a6c85cf\r\n";
        let mut scanner = Parser::from_bytes(src);
        let to = To::parse(&mut scanner).unwrap();

        match to {
            To {
                uri: SipUri::NameAddr(addr),
                tag,
                ..
            } => {
                assert_eq!(addr.uri.scheme, Scheme::Sip);
                assert_eq!(addr.display, Some("Bob".into()));
                assert_eq!(addr.uri.user.unwrap().user, "bob");
                assert_eq!(
                    addr.uri.host_port,
                    HostPort {
                        host: Host::DomainName("biloxi.com".into()),
                        port: None,
                    }
                );
                assert_eq!(tag, Some("a6c85cf".into()));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_set_tag_round_trips() {
        let src = b"<sip:bob@biloxi.com>\r\n";
        let mut scanner = Parser::from_bytes(src);
        let mut to = To::parse(&mut scanner).unwrap();

        assert_eq!(to.tag(), None);
        to.set_tag(Some("314159"));
        assert_eq!(to.to_string(), "To: <sip:bob@biloxi.com>;tag=314159");
    }
}
