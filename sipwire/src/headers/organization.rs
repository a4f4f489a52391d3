use std::{fmt, str};

use crate::error::Result;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Organization` SIP header.
///
/// Conveys the name of the organization the entity issuing
/// the message belongs to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Organization(ArcStr);

impl HeaderParse for Organization {
    const NAME: &'static str = "Organization";
    /*
     * Organization  =  "Organization" HCOLON [TEXT-UTF8-TRIM]
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let org = parser.parse_header_value_as_str()?;

        Ok(Organization(org.into()))
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Organization::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"Boxes by Bob\r\n";
        let mut scanner = Parser::from_bytes(src);
        let org = Organization::parse(&mut scanner).unwrap();

        assert_eq!(scanner.remaining(), b"\r\n");
        assert_eq!(org.0, "Boxes by Bob");
    }
}
