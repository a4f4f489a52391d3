use std::{fmt, str};

use itertools::Itertools;

use crate::error::Result;
use crate::macros::hdr_list;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Supported` SIP header.
///
/// Enumerates all the extensions supported by the `UAC` or
/// `UAS`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Supported(Vec<ArcStr>);

impl Supported {
    /// Add a new tag to the list of supported tags.
    pub fn add_tag(&mut self, tag: &str) {
        self.0.push(tag.into());
    }

    /// Returns `true` if the given option tag is listed.
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl HeaderParse for Supported {
    const NAME: &'static str = "Supported";
    const SHORT_NAME: Option<&'static str> = Some("k");
    /*
     * Supported  =  ( "Supported" / "k" ) HCOLON
     *               [option-tag *(COMMA option-tag)]
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let tags = hdr_list!(parser => parser.parse_token()?.into());

        Ok(Supported(tags))
    }
}

impl fmt::Display for Supported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Supported::NAME, self.0.iter().format(", "))
    }
}
