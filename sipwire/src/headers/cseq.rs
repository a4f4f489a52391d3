use crate::parser::Parser;
use crate::{error::Result, message::Method};

use crate::headers::HeaderParse;

use core::fmt;
use std::str;

/// The `CSeq` SIP header.
///
/// Ensures order and tracking of SIP transactions within a
/// session.
///
/// # Examples
///
/// ```
/// # use sipwire::{headers::CSeq, message::Method};
/// let cseq = CSeq::new(1, Method::Options);
///
/// assert_eq!(
///     "CSeq: 1 OPTIONS",
///     cseq.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CSeq {
    /// The CSeq number.
    pub cseq: u32,
    /// The CSeq method.
    pub method: Method,
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", CSeq::NAME, self.cseq, self.method)
    }
}

impl CSeq {
    /// Creates a new `CSeq` instance.
    pub fn new(cseq: u32, method: Method) -> Self {
        Self { cseq, method }
    }

    /// Returns the cseq number.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Returns the SIP method associated with the cseq.
    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl HeaderParse for CSeq {
    const NAME: &'static str = "CSeq";
    /*
     * CSeq  =  "CSeq" HCOLON 1*DIGIT LWS Method
     */
    fn parse(parser: &mut Parser<'_>) -> Result<CSeq> {
        let cseq = parser.parse_u32()?;

        parser.space();
        let method = parser.parse_method()?;

        Ok(CSeq { cseq, method })
    }
}
