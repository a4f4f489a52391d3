use std::{fmt, str};

use crate::error::Result;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Server` SIP header.
///
/// Names the software the server used to handle
/// the request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Server(ArcStr);

impl Server {
    /// Creates a new `Server` header with the given value.
    pub fn new(s: &str) -> Self {
        Self(s.into())
    }
}

impl HeaderParse for Server {
    const NAME: &'static str = "Server";
    /*
     * Server           =  "Server" HCOLON server-val *(LWS server-val)
     * server-val       =  product / comment
     * product          =  token [SLASH product-version]
     * product-version  =  token
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let server = parser.parse_header_value_as_str()?;

        Ok(Server(server.into()))
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Server::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"HomeServer v2\r\n";
        let mut scanner = Parser::from_bytes(src);
        let server = Server::parse(&mut scanner).unwrap();

        assert_eq!(scanner.remaining(), b"\r\n");
        assert_eq!(server.0, "HomeServer v2");
    }
}
