use std::{fmt, str};

use itertools::Itertools;

use crate::error::Result;
use crate::macros::hdr_list;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Require` SIP header.
///
/// Is used by `UACs` to tell `UASs` about options that the
/// `UAC` expects the `UAS` to support in order to process the
/// request.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Require(Vec<ArcStr>);

impl HeaderParse for Require {
    const NAME: &'static str = "Require";
    /*
     * Require  =  "Require" HCOLON option-tag *(COMMA option-tag)
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let tags = hdr_list!(parser => parser.parse_token()?.into());

        Ok(Require(tags))
    }
}

impl fmt::Display for Require {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Require::NAME, self.0.iter().format(", "))
    }
}
