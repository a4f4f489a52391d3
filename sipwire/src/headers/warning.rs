use std::fmt;
use std::str;

use crate::error::Result;
use crate::headers::HeaderParse;
use crate::parser::Parser;
use crate::ArcStr;

/// The `Warning` SIP header.
///
/// Carry additional information about the status of a response.
///
/// # Examples
///
/// ```
/// # use sipwire::headers::Warning;
/// let warn = Warning::new(307, "isi.edu", "Session parameter 'foo' not understood");
///
/// assert_eq!(
///     "Warning: 307 isi.edu \"Session parameter 'foo' not understood\"",
///     warn.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Warning {
    code: u32,
    host: ArcStr,
    text: ArcStr,
}

impl Warning {
    /// Creates a new `Warning` header.
    pub fn new(code: u32, host: impl Into<ArcStr>, text: impl Into<ArcStr>) -> Self {
        Self {
            code,
            host: host.into(),
            text: text.into(),
        }
    }

    /// Returns the warning code.
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Returns the warning text, without the surrounding quotes.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl HeaderParse for Warning {
    const NAME: &'static str = "Warning";

    /*
     * Warning        =  "Warning" HCOLON warning-value *(COMMA warning-value)
     * warning-value  =  warn-code SP warn-agent SP warn-text
     * warn-code      =  3DIGIT
     * warn-agent     =  hostport / pseudonym
     *                   ;  the name or pseudonym of the server adding
     *                   ;  the Warning header, for use in debugging
     * warn-text      =  quoted-string
     * pseudonym      =  token
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let code = parser.parse_u32()?;
        parser.space();
        let host = str::from_utf8(parser.read_until(b' '))?;
        parser.space();
        parser.must_read(b'"')?;
        let text = str::from_utf8(parser.read_until(b'"'))?;
        parser.must_read(b'"')?;

        Ok(Warning {
            code,
            host: host.into(),
            text: text.into(),
        })
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {} \"{}\"", Self::NAME, self.code, self.host, self.text)
    }
}
