use std::fmt;

use crate::{
    error::Result,
    macros::parse_header_param,
    message::{NameAddr, Params},
    parser::Parser,
};

use crate::headers::HeaderParse;

/// The `Route` SIP header.
///
/// Specify the sequence of proxy servers and other
/// intermediaries that a SIP message should pass through on
/// its way to the final destination.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Route {
    /// The address of the route hop.
    pub addr: NameAddr,
    /// Optional parameters associated with the route hop.
    pub param: Option<Params>,
}

impl Route {
    /// Creates a `Route` from a `name-addr` without parameters.
    pub fn new(addr: NameAddr) -> Self {
        Self { addr, param: None }
    }
}

impl HeaderParse for Route {
    const NAME: &'static str = "Route";
    /*
     * Route        =  "Route" HCOLON route-param *(COMMA route-param)
     * route-param  =  name-addr *( SEMI rr-param )
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let addr = parser.parse_name_addr()?;
        let param = parse_header_param!(parser);
        Ok(Route { addr, param })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Route::NAME, self.addr)?;

        if let Some(param) = &self.param {
            write!(f, "{}", param)?;
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
        let src = b"<sip:bigbox3.site3.atlanta.com;lr>\r\n";
        let mut scanner = Parser::from_bytes(src);
        let r = Route::parse(&mut scanner).unwrap();

        assert_eq!(r.addr.display, None);
        assert_eq!(r.addr.uri.scheme, Scheme::Sip);
        assert_eq!(
            r.addr.uri.host_port,
            HostPort {
                host: Host::DomainName("bigbox3.site3.atlanta.com".into()),
                port: None
            }
        );
        assert!(r.addr.uri.lr_param);

        let src = b"<sip:server10.biloxi.com;lr>;foo=bar\r\n";
        let mut scanner = Parser::from_bytes(src);
        let r = Route::parse(&mut scanner).unwrap();

        assert_eq!(r.addr.display, None);
        assert_eq!(r.addr.uri.scheme, Scheme::Sip);
        assert_eq!(
            r.addr.uri.host_port,
            HostPort {
                host: Host::DomainName("server10.biloxi.com".into()),
                port: None
            }
        );
        assert_eq!(r.param.unwrap().get("foo").unwrap(), Some("bar"));
    }

    #[test]
    fn test_display_includes_name() {
        let src = b"<sip:bigbox3.site3.atlanta.com;lr>";
        let route = Route::from_bytes(src).unwrap();

        assert_eq!(route.to_string(), "Route: <sip:bigbox3.site3.atlanta.com;lr>");
    }
}
