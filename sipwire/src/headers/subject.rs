use std::{fmt, str};

use crate::error::Result;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Subject` SIP header.
///
/// Provides a summary or indicates the nature of the call.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subject(ArcStr);

impl HeaderParse for Subject {
    const NAME: &'static str = "Subject";
    const SHORT_NAME: Option<&'static str> = Some("s");
    /*
     * Subject  =  ( "Subject" / "s" ) HCOLON [TEXT-UTF8-TRIM]
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let subject = parser.parse_header_value_as_str()?;

        Ok(Subject(subject.into()))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Subject::NAME, self.0)
    }
}
