use std::{fmt, str};

use crate::error::Result;
use crate::parser::Parser;
use crate::ArcStr;

use crate::headers::HeaderParse;

/// The `Priority` SIP header.
///
/// Indicates the urgency of the request as perceived by the
/// client.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Priority(ArcStr);

impl HeaderParse for Priority {
    const NAME: &'static str = "Priority";
    /*
     * Priority        =  "Priority" HCOLON priority-value
     * priority-value  =  "emergency" / "urgent" / "normal"
     *                    / "non-urgent" / other-priority
     * other-priority  =  token
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let priority = parser.parse_token()?;

        Ok(Priority(priority.into()))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Priority::NAME, self.0)
    }
}
