use std::{fmt, str};

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::parser::Parser;

/// The `Min-Expires` SIP header.
///
/// Conveys the minimum refresh interval supported for
/// soft-state elements managed by the server.
///
/// # Examples
/// ```
/// # use sipwire::headers::MinExpires;
/// let min = MinExpires::new(60);
///
/// assert_eq!(
///     "Min-Expires: 60",
///     min.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct MinExpires(u32);

impl MinExpires {
    /// Creates a new `MinExpires` header with the given interval.
    pub const fn new(min: u32) -> Self {
        Self(min)
    }

    /// Returns the `Min-Expires` value as a `u32`.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl HeaderParse for MinExpires {
    const NAME: &'static str = "Min-Expires";
    /*
     * Min-Expires  =  "Min-Expires" HCOLON delta-seconds
     */
    fn parse(parser: &mut Parser<'_>) -> Result<MinExpires> {
        let min = parser.parse_u32()?;

        Ok(MinExpires(min))
    }
}

impl fmt::Display for MinExpires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", MinExpires::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"60\r\n";
        let mut scanner = Parser::from_bytes(src);
        let min = MinExpires::parse(&mut scanner).unwrap();
        assert_eq!(scanner.remaining(), b"\r\n");
        assert_eq!(min.as_u32(), 60);
    }
}
