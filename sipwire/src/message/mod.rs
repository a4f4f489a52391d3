#![deny(missing_docs)]
//! SIP Message types
//!
//! The module provide the [`SipMsg`] enum that can be an [`SipMsg::Request`] or
//! [`SipMsg::Response`] and represents a SIP message.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::headers::{ContentLength, Header, Headers};
use crate::parser::SIPV2;
use crate::ArcStr;

pub mod auth;

mod code;
mod method;
mod params;
mod uri;

pub use code::*;
pub use method::*;
pub use params::*;
pub use uri::*;

/// This trait is used to convert a type into a byte buffer.
pub trait ToBytes: Sized {
    /// Converts the type into a byte buffer.
    fn to_bytes(&self) -> Result<Bytes>;
}

/// An SIP message, either Request or Response.
///
/// This enum can contain either an [`Request`] or an [`Response`], see their
/// respective documentation for more details.
#[derive(Debug, Clone)]
pub enum SipMsg {
    /// An SIP Request.
    Request(Request),
    /// An SIP Response.
    Response(Response),
}

impl SipMsg {
    /// Returns [`true`] if this message is an [`Request`] message, and [`false`]
    /// otherwise.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sipwire::message::*;
    ///
    /// let uri = "sip:alice@example.com".parse().unwrap();
    /// let request = Request::new(Method::Options, uri);
    /// let msg: SipMsg = request.into();
    ///
    /// assert!(msg.is_request());
    /// ```
    pub const fn is_request(&self) -> bool {
        matches!(self, SipMsg::Request(_))
    }

    /// Returns [`true`] if this message is an [`Response`] message, and [`false`]
    /// otherwise.
    pub const fn is_response(&self) -> bool {
        matches!(self, SipMsg::Response(_))
    }

    /// Returns a reference to the [`Request`] if this is a [`SipMsg::Request`] variant.
    pub fn request(&self) -> Option<&Request> {
        if let SipMsg::Request(request) = self {
            Some(request)
        } else {
            None
        }
    }

    /// Returns a reference to the [`Response`] if this is a [`SipMsg::Response`] variant.
    pub fn response(&self) -> Option<&Response> {
        if let SipMsg::Response(response) = self {
            Some(response)
        } else {
            None
        }
    }

    /// Returns a mutable reference to the [`Response`] if this is a
    /// [`SipMsg::Response`] variant.
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        if let SipMsg::Response(response) = self {
            Some(response)
        } else {
            None
        }
    }

    /// Returns a reference to the headers of the message.
    pub fn headers(&self) -> &Headers {
        match self {
            SipMsg::Request(req) => &req.headers,
            SipMsg::Response(res) => &res.headers,
        }
    }

    /// Returns a mutable reference to the headers of the message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sipwire::headers::{Header, Headers, Expires};
    /// use sipwire::message::{SipMsg, Response, StatusCode, StatusLine};
    ///
    /// let status_line = StatusLine::new(StatusCode::OK, "OK");
    /// let headers = Headers::from([Header::Expires(Expires::new(10))]);
    /// let response = Response::new_with_headers(status_line, headers);
    /// let mut msg: SipMsg = response.into();
    ///
    /// msg.headers_mut().push(Header::Expires(Expires::new(20)));
    ///
    /// assert_eq!(msg.headers().len(), 2);
    /// ```
    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            SipMsg::Request(req) => &mut req.headers,
            SipMsg::Response(res) => &mut res.headers,
        }
    }

    /// Returns a reference to the message body.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            SipMsg::Request(request) => request.body.as_deref(),
            SipMsg::Response(response) => response.body.as_deref(),
        }
    }

    /// Sets the body of the message. It can be `None` to remove the body.
    pub fn set_body(&mut self, body: Option<Bytes>) {
        match self {
            SipMsg::Request(req) => {
                req.body = body;
            }
            SipMsg::Response(res) => {
                res.body = body;
            }
        }
    }

    /// Sets the headers of the message, replacing any existing headers.
    pub fn set_headers(&mut self, headers: Headers) {
        match self {
            SipMsg::Request(req) => {
                req.headers = headers;
            }
            SipMsg::Response(res) => {
                res.headers = headers;
            }
        }
    }

    /// Rewrites the `Content-Length` header to match the actual body
    /// length, inserting one if the message has none.
    ///
    /// Parsed messages keep the framing they arrived with; this is for
    /// locally built messages about to go on the wire.
    pub fn ensure_content_length(&mut self) {
        let len = self.body().map(<[u8]>::len).unwrap_or(0) as u32;
        let headers = self.headers_mut();
        match headers.iter_mut().find_map(|h| h.as_content_length_mut()) {
            Some(cl) => *cl = ContentLength::new(len),
            None => headers.push(Header::ContentLength(ContentLength::new(len))),
        }
    }
}

fn write_msg(
    buf_writer: &mut bytes::buf::Writer<BytesMut>,
    headers: &Headers,
    body: Option<&[u8]>,
) -> Result<()> {
    for header in headers.iter() {
        write!(buf_writer, "{header}\r\n")?;
    }
    write!(buf_writer, "\r\n")?;
    if let Some(body) = body {
        buf_writer.write_all(body)?;
    }
    Ok(())
}

impl ToBytes for SipMsg {
    fn to_bytes(&self) -> Result<Bytes> {
        match self {
            SipMsg::Request(request) => request.to_bytes(),
            SipMsg::Response(response) => response.to_bytes(),
        }
    }
}

impl From<Request> for SipMsg {
    fn from(value: Request) -> Self {
        SipMsg::Request(value)
    }
}

impl From<Response> for SipMsg {
    fn from(value: Response) -> Self {
        SipMsg::Response(value)
    }
}

/// A parsed SIP Request.
///
/// SIP request represents a request from a client to a server.
#[derive(Debug, Clone)]
pub struct Request {
    /// The Request-Line of the SIP message.
    pub req_line: RequestLine,
    /// All headers present in the SIP message.
    pub headers: Headers,
    /// The body of the SIP message, if present.
    pub body: Option<Bytes>,
}

impl Request {
    /// Creates a new SIP `Request`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sipwire::message::{Request, Method};
    ///
    /// let uri = "sip:localhost".parse().unwrap();
    /// let request = Request::new(Method::Options, uri);
    /// ```
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            req_line: RequestLine { method, uri },
            headers: Default::default(),
            body: None,
        }
    }

    /// Creates a new `Request` with the given headers.
    #[inline]
    pub const fn new_with_headers(method: Method, uri: Uri, headers: Headers) -> Self {
        Self {
            req_line: RequestLine { method, uri },
            headers,
            body: None,
        }
    }

    /// Returns the SIP method of the request.
    pub fn method(&self) -> &Method {
        &self.req_line.method
    }
}

impl ToBytes for Request {
    fn to_bytes(&self) -> Result<Bytes> {
        let estimated_message_size = if self.body.is_none() { 800 } else { 1500 };
        let buf = BytesMut::with_capacity(estimated_message_size);
        let mut buf_writer = buf.writer();

        write!(buf_writer, "{}", &self.req_line)?;
        write_msg(&mut buf_writer, &self.headers, self.body.as_deref())?;

        Ok(buf_writer.into_inner().freeze())
    }
}

impl std::fmt::Display for RequestLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {SIPV2}\r\n", self.method, self.uri)
    }
}

/// Represents a SIP Request-Line.
///
/// The Request-Line contains the method and the Request-URI,
/// which indicate the target of the SIP request.
#[derive(Debug, Clone)]
pub struct RequestLine {
    /// The SIP method associated with the request (e.g., INVITE, BYE).
    pub method: Method,
    /// The Request-URI indicating the target of the request.
    pub uri: Uri,
}

/// A parsed SIP Response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The Status-Line of the SIP message.
    pub status_line: StatusLine,
    /// All headers present in the SIP message.
    pub headers: Headers,
    /// The body of the SIP message, if present.
    pub body: Option<Bytes>,
}

impl Response {
    /// Creates a new SIP `Response` from a `Status-Line`,
    /// with empty headers and no body.
    pub fn new(status_line: StatusLine) -> Self {
        Self {
            status_line,
            headers: Default::default(),
            body: None,
        }
    }

    /// Returns the message response code.
    pub fn code(&self) -> StatusCode {
        self.status_line.code
    }

    /// Returns the reason.
    pub fn reason(&self) -> &str {
        &self.status_line.reason
    }

    /// Creates a new `Response` with the given `Status-Line` and headers,
    pub const fn new_with_headers(status_line: StatusLine, headers: Headers) -> Self {
        Self {
            status_line,
            headers,
            body: None,
        }
    }

    /// Set the headers of the response, replacing any existing headers.
    pub fn set_headers(&mut self, headers: Headers) {
        self.headers = headers;
    }

    /// Appends headers from another collection to the current headers.
    pub fn append_headers(&mut self, other: &mut Headers) {
        self.headers.append(other);
    }
}

impl ToBytes for Response {
    fn to_bytes(&self) -> Result<Bytes> {
        let estimated_message_size = if self.body.is_none() { 800 } else { 1500 };
        let buf = BytesMut::with_capacity(estimated_message_size);
        let mut buf_writer = buf.writer();

        write!(buf_writer, "{}", &self.status_line)?;
        write_msg(&mut buf_writer, &self.headers, self.body.as_deref())?;

        Ok(buf_writer.into_inner().freeze())
    }
}

/// Represents a SIP Status-Line.
///
/// The Status-Line appears in SIP responses and includes a
/// status code and a reason phrase explaining the result
/// of the request.
#[derive(Debug, Clone)]
pub struct StatusLine {
    /// The SIP status code associated with the response (e.g., 200, 404).
    pub code: StatusCode,
    /// The reason phrase explaining the status code (e.g., "OK", "Not Found").
    pub reason: ArcStr,
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SIPV2} {} {}\r\n", self.code.as_u16(), self.reason)
    }
}

impl StatusLine {
    /// Creates a new `StatusLine` instance from the given [`StatusCode`] and reason.
    ///
    /// # Examples
    /// ```
    /// # use sipwire::message::{StatusCode, StatusLine};
    /// let status_line = StatusLine::new(StatusCode::OK, "OK");
    /// ```
    pub fn new(code: StatusCode, reason: &str) -> Self {
        StatusLine {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a `StatusLine` with the default reason phrase for `code`.
    pub fn from_code(code: StatusCode) -> Self {
        StatusLine {
            code,
            reason: code.default_reason().into(),
        }
    }
}
