use std::fmt;

use itertools::Itertools;

use crate::headers::MediaType;
use crate::macros::hdr_list;
use crate::parser::Parser;
use crate::{error::Result, headers::HeaderParse};

/// The `Accept` SIP header.
///
/// Lists the media types acceptable in a response body.
///
/// # Examples
/// ```
/// # use sipwire::headers::{Accept, HeaderParse};
/// let accept = Accept::from_bytes(b"application/sdp, application/dialog-info+xml").unwrap();
///
/// assert_eq!(accept.len(), 2);
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Accept(Vec<MediaType>);

impl Accept {
    /// Gets the `MediaType` at the specified index.
    pub fn get(&self, index: usize) -> Option<&MediaType> {
        self.0.get(index)
    }

    /// Returns the number of media types in the header.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the header lists no media types.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl HeaderParse for Accept {
    const NAME: &'static str = "Accept";
    /*
     * Accept         =  "Accept" HCOLON [ accept-range *(COMMA accept-range) ]
     * accept-range   =  media-range *(SEMI accept-param)
     * media-range    =  ( "*" "/" "*" / ( m-type SLASH "*" ) / ( m-type SLASH m-subtype ) )
     *                   *( SEMI m-parameter )
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let mtypes = hdr_list!(parser => MediaType::parse(parser)?);

        Ok(Accept(mtypes))
    }
}

impl fmt::Display for Accept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Accept::NAME, self.0.iter().format(", "))
    }
}
