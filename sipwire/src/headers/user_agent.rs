use std::{fmt, str};

use crate::error::Result;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `User-Agent` SIP header.
///
/// Names the software the client used to generate
/// the request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UserAgent(ArcStr);

impl UserAgent {
    /// Creates a new `UserAgent` header with the given value.
    pub fn new(agent: &str) -> Self {
        Self(agent.into())
    }
}

impl HeaderParse for UserAgent {
    const NAME: &'static str = "User-Agent";
    /*
     * User-Agent  =  "User-Agent" HCOLON server-val *(LWS server-val)
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let agent = parser.parse_header_value_as_str()?;

        Ok(UserAgent(agent.into()))
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", UserAgent::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"Softphone Beta1.5\r\n";
        let mut scanner = Parser::from_bytes(src);
        let ua = UserAgent::parse(&mut scanner).unwrap();

        assert_eq!(scanner.remaining(), b"\r\n");
        assert_eq!(ua.0, "Softphone Beta1.5");
    }
}
