use std::{fmt, str};

use itertools::Itertools;

use crate::error::Result;
use crate::macros::hdr_list;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Proxy-Require` SIP header.
///
/// Lists proxy-sensitive features that must be supported by
/// every proxy in the path.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ProxyRequire(Vec<ArcStr>);

impl HeaderParse for ProxyRequire {
    const NAME: &'static str = "Proxy-Require";
    /*
     * Proxy-Require  =  "Proxy-Require" HCOLON option-tag
     *                   *(COMMA option-tag)
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let tags = hdr_list!(parser => parser.parse_token()?.into());

        Ok(ProxyRequire(tags))
    }
}

impl fmt::Display for ProxyRequire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ProxyRequire::NAME, self.0.iter().format(", "))
    }
}
