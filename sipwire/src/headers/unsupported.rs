use std::{fmt, str};

use itertools::Itertools;

use crate::error::Result;
use crate::macros::hdr_list;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Unsupported` SIP header.
///
/// Lists the features not supported by the `UAS`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Unsupported(Vec<ArcStr>);

impl HeaderParse for Unsupported {
    const NAME: &'static str = "Unsupported";
    /*
     * Unsupported  =  "Unsupported" HCOLON option-tag *(COMMA option-tag)
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let tags = hdr_list!(parser => parser.parse_token()?.into());

        Ok(Unsupported(tags))
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Unsupported::NAME, self.0.iter().format(", "))
    }
}
