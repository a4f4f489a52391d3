use std::{fmt, str};

use itertools::Itertools;

use crate::error::Result;
use crate::macros::hdr_list;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Content-Encoding` SIP header.
///
/// Indicates what decoding mechanisms must be applied to
/// obtain the media-type referenced by the `Content-Type`.
///
/// Both the long (`Content-Encoding`) and short (`e`) header names are
/// supported.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ContentEncoding(Vec<ArcStr>);

impl ContentEncoding {
    /// Gets the coding at the specified index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|c| c.as_ref())
    }
}

impl HeaderParse for ContentEncoding {
    const NAME: &'static str = "Content-Encoding";
    const SHORT_NAME: Option<&'static str> = Some("e");
    /*
     * Content-Encoding  =  ( "Content-Encoding" / "e" ) HCOLON
     *                      content-coding *(COMMA content-coding)
     * content-coding    =  token
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let codings = hdr_list!(parser => parser.parse_token()?.into());

        Ok(ContentEncoding(codings))
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ContentEncoding::NAME, self.0.iter().format(", "))
    }
}
