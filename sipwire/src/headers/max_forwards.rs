use crate::parser::Parser;

use crate::error::Result;

use crate::headers::HeaderParse;

use std::{fmt, str};

/// The `Max-Forwards` SIP header.
///
/// Limits the number of proxies or gateways that can forward
/// the request.
///
/// # Examples
/// ```
/// # use sipwire::headers::MaxForwards;
///
/// let max = MaxForwards::new(70);
///
/// assert_eq!(
///     "Max-Forwards: 70",
///     max.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct MaxForwards(u32);

impl MaxForwards {
    /// Creates a new `MaxForwards` header with the given number of forwards.
    pub const fn new(forwards: u32) -> Self {
        Self(forwards)
    }
    /// Returns the internal `MaxForwards` value.
    pub fn max_forwards(&self) -> u32 {
        self.0
    }
}

impl HeaderParse for MaxForwards {
    const NAME: &'static str = "Max-Forwards";
    /*
     * Max-Forwards  =  "Max-Forwards" HCOLON 1*DIGIT
     */
    fn parse(parser: &mut Parser<'_>) -> Result<MaxForwards> {
        let forwards = parser.parse_u32()?;

        Ok(MaxForwards(forwards))
    }
}

impl fmt::Display for MaxForwards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", MaxForwards::NAME, self.0)
    }
}
