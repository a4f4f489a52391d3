use core::fmt;
use std::str;

use crate::macros::parse_header_param;
use crate::parser::Parser;
use crate::{error::Result, headers::HeaderParse};

use crate::message::Params;
use crate::ArcStr;

/// A mime type with its `type/subtype` pair.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MimeType {
    /// The top level type, e.g. `application`.
    pub mtype: ArcStr,
    /// The subtype, e.g. `sdp`.
    pub subtype: ArcStr,
}

/// A media type with optional parameters, as used in
/// `Content-Type` and `Accept` headers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MediaType {
    /// The mime type.
    pub mimetype: MimeType,
    /// Optional media parameters.
    pub param: Option<Params>,
}

impl MediaType {
    /// Creates a new `MediaType` without parameters.
    pub fn new(mtype: &str, subtype: &str) -> Self {
        Self {
            mimetype: MimeType {
                mtype: mtype.into(),
                subtype: subtype.into(),
            },
            param: None,
        }
    }

    pub(crate) fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        parser.space();
        let mtype = parser.parse_token()?.into();
        parser.must_read(b'/')?;
        let subtype = parser.parse_token()?.into();
        let param = parse_header_param!(parser);

        Ok(MediaType {
            mimetype: MimeType { mtype, subtype },
            param,
        })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mimetype.mtype, self.mimetype.subtype)?;
        if let Some(param) = &self.param {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

/// The `Content-Type` SIP header.
///
/// Indicates the media type of the `message-body` sent to
/// the recipient.
///
/// Both the long (`Content-Type`) and short (`c`) header names are supported.
///
/// # Examples
/// ```
/// # use sipwire::headers::{ContentType, MediaType};
///
/// let ctype = ContentType::new(MediaType::new("application", "sdp"));
///
/// assert_eq!(
///     "Content-Type: application/sdp",
///     ctype.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ContentType(MediaType);

impl ContentType {
    /// Creates a new `Content-Type` with sdp as `MediaType`
    pub fn new_sdp() -> Self {
        Self(MediaType::new("application", "sdp"))
    }

    /// Creates a new `ContentType`.
    pub fn new(m: MediaType) -> Self {
        Self(m)
    }

    /// Returns the internal `MediaType`.
    pub fn media_type(&self) -> &MediaType {
        &self.0
    }
}

impl HeaderParse for ContentType {
    const NAME: &'static str = "Content-Type";
    const SHORT_NAME: Option<&'static str> = Some("c");
    /*
     * Content-Type     =  ( "Content-Type" / "c" ) HCOLON media-type
     * media-type       =  m-type SLASH m-subtype *(SEMI m-parameter)
     * m-type           =  discrete-type / composite-type
     * discrete-type    =  "text" / "image" / "audio" / "video"
     *                     / "application" / extension-token
     * composite-type   =  "message" / "multipart" / extension-token
     * extension-token  =  ietf-token / x-token
     * ietf-token       =  token
     * x-token          =  "x-" token
     * m-subtype        =  extension-token / iana-token
     * iana-token       =  token
     * m-parameter      =  m-attribute EQUAL m-value
     * m-attribute      =  token
     * m-value          =  token / quoted-string
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let media_type = MediaType::parse(parser)?;

        Ok(ContentType(media_type))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ContentType::NAME, self.0)
    }
}
