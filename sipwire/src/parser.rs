//! SIP Parser
//!
//! The module provides [`Parser`] struct for parsing SIP messages, including
//! requests and responses, as well as various components such as URIs and
//! headers.
//!
//! Header names are resolved through a sorted lookup table shared by the
//! full and compact forms, and header values are unfolded before parsing
//! so multi-line headers behave exactly like their single-line form.

use std::borrow::Cow;
use std::str::{self};

use bytes::Bytes;
use util::Scanner;

use crate::endpoint::Protocol;
use crate::error::{Error, Result, SipParserError};
use crate::headers::*;
use crate::macros::{comma_separated, lookup_table, parse_param, try_parse_hdr};
use crate::message::auth::{
    Challenge, Credential, DigestChallenge, DigestCredential, DIGEST_SCHEME,
};
use crate::message::*;
use crate::ArcStr;

// ---------------------------------------------------------------------
// Parser constants
// ---------------------------------------------------------------------
/// The user param used in SIP URIs.
const USER_PARAM: &str = "user";
/// The method param used in SIP URIs.
const METHOD_PARAM: &str = "method";
/// The transport param used in SIP URIs.
const TRANSPORT_PARAM: &str = "transport";
/// The ttl param used in SIP URIs.
const TTL_PARAM: &str = "ttl";
/// The lr param used in SIP URIs.
const LR_PARAM: &str = "lr";
/// The maddr param used in SIP URIs.
const MADDR_PARAM: &str = "maddr";

/// Digest parameter names used in authentication headers.
const REALM: &str = "realm";
const USERNAME: &str = "username";
const NONCE: &str = "nonce";
const URI: &str = "uri";
const RESPONSE: &str = "response";
const ALGORITHM: &str = "algorithm";
const CNONCE: &str = "cnonce";
const OPAQUE: &str = "opaque";
const QOP: &str = "qop";
const NC: &str = "nc";
const DOMAIN: &str = "domain";
const STALE: &str = "stale";

/// Alphanumeric is valid in all sip message components.
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Unreserved characters in user, password, uri and header
/// parameters in SIP uris.
const UNRESERVED: &[u8] = b"-_.!~*'()%";
/// Escaped character in SIP URIs.
const ESCAPED: &[u8] = b"%";
/// Unreserverd charaters in user part of SIP URIs.
const USER_UNRESERVED: &[u8] = b"&=+$,;?/";
/// Token in SIP Messages
const TOKEN: &[u8] = b"-.!%*_`'~+";
/// Password valid characters in SIP URIs.
const PASS: &[u8] = b"&=+$,";
/// Valid characters in SIP URIs host part.
const HOST: &[u8] = b"_-.";
/// The "sip" schema used in SIP URIs.
const SIP: &[u8] = b"sip";
/// The "sips" schema used in SIP URIs.
const SIPS: &[u8] = b"sips";
/// The SIP version used in the parser.
pub(crate) const SIPV2: &str = "SIP/2.0";

const B_SIPV2: &[u8] = SIPV2.as_bytes();

/// The maximum size of a SIP message accepted by the parser, 64 KiB.
///
/// Messages above this limit, and messages whose `Content-Length`
/// declares more than this limit, are rejected with
/// [`Error::MessageTooBig`].
pub const MAX_MESSAGE_SIZE: usize = 65_536;

// ---------------------------------------------------------------------
// Lookup Tables
// ---------------------------------------------------------------------
// For reading user in uri.
lookup_table!(USER_TAB => ALPHANUMERIC, UNRESERVED, USER_UNRESERVED, ESCAPED);
// For reading password in uri.
lookup_table!(PASS_TAB => ALPHANUMERIC, UNRESERVED, ESCAPED, PASS);
// For reading host in uri.
lookup_table!(HOST_TAB => ALPHANUMERIC, HOST);
// For reading parameter in uri.
lookup_table!(PARAM_TAB => b"[]/:&+$", ALPHANUMERIC, UNRESERVED, ESCAPED);
// For reading header parameter in uri.
lookup_table!(HDR_TAB => b"[]/?:+$", ALPHANUMERIC, UNRESERVED, ESCAPED);
// For reading token.
lookup_table!(TOKEN_TAB => ALPHANUMERIC, TOKEN);
// For reading via parameter.
lookup_table!(VIA_PARAM_TAB => b"[:]", ALPHANUMERIC, TOKEN);

type ParamRef<'a> = (&'a str, Option<&'a str>);

/// The header types the parser knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Accept,
    Allow,
    AuthenticationInfo,
    Authorization,
    CallId,
    Contact,
    ContentEncoding,
    ContentLength,
    ContentType,
    CSeq,
    Expires,
    From,
    MaxForwards,
    MinExpires,
    Organization,
    Priority,
    ProxyAuthenticate,
    ProxyAuthorization,
    ProxyRequire,
    RecordRoute,
    Require,
    Route,
    Server,
    Subject,
    Supported,
    To,
    Unsupported,
    UserAgent,
    Via,
    Warning,
    WWWAuthenticate,
}

/// Known header names, sorted for binary search.
///
/// Every full name appears together with its RFC 3261 compact form,
/// all lowercase; lookups fold the case of the incoming name.
const HEADER_TABLE: &[(&str, HeaderKind)] = &[
    ("accept", HeaderKind::Accept),
    ("allow", HeaderKind::Allow),
    ("authentication-info", HeaderKind::AuthenticationInfo),
    ("authorization", HeaderKind::Authorization),
    ("c", HeaderKind::ContentType),
    ("call-id", HeaderKind::CallId),
    ("contact", HeaderKind::Contact),
    ("content-encoding", HeaderKind::ContentEncoding),
    ("content-length", HeaderKind::ContentLength),
    ("content-type", HeaderKind::ContentType),
    ("cseq", HeaderKind::CSeq),
    ("e", HeaderKind::ContentEncoding),
    ("expires", HeaderKind::Expires),
    ("f", HeaderKind::From),
    ("from", HeaderKind::From),
    ("i", HeaderKind::CallId),
    ("k", HeaderKind::Supported),
    ("l", HeaderKind::ContentLength),
    ("m", HeaderKind::Contact),
    ("max-forwards", HeaderKind::MaxForwards),
    ("min-expires", HeaderKind::MinExpires),
    ("organization", HeaderKind::Organization),
    ("priority", HeaderKind::Priority),
    ("proxy-authenticate", HeaderKind::ProxyAuthenticate),
    ("proxy-authorization", HeaderKind::ProxyAuthorization),
    ("proxy-require", HeaderKind::ProxyRequire),
    ("record-route", HeaderKind::RecordRoute),
    ("require", HeaderKind::Require),
    ("route", HeaderKind::Route),
    ("s", HeaderKind::Subject),
    ("server", HeaderKind::Server),
    ("subject", HeaderKind::Subject),
    ("supported", HeaderKind::Supported),
    ("t", HeaderKind::To),
    ("to", HeaderKind::To),
    ("unsupported", HeaderKind::Unsupported),
    ("user-agent", HeaderKind::UserAgent),
    ("v", HeaderKind::Via),
    ("via", HeaderKind::Via),
    ("warning", HeaderKind::Warning),
    ("www-authenticate", HeaderKind::WWWAuthenticate),
];

fn lookup_header_kind(name: &str) -> Option<HeaderKind> {
    HEADER_TABLE
        .binary_search_by(|(entry, _)| {
            entry
                .bytes()
                .cmp(name.bytes().map(|b| b.to_ascii_lowercase()))
        })
        .ok()
        .map(|idx| HEADER_TABLE[idx].1)
}

/// A SIP message parser.
///
/// This struct provides methods for parsing various components of SIP messages,
/// such as header fields, URIs, and start lines.
pub struct Parser<'buf> {
    /// The scanner used to read the input buffer.
    scanner: Scanner<'buf>,
}

impl<'buf> Parser<'buf> {
    /// Creates a new `Parser` from the given byte slice.
    #[inline]
    pub fn new<B>(buf: &'buf B) -> Self
    where
        B: AsRef<[u8]> + ?Sized,
    {
        Self {
            scanner: Scanner::new(buf.as_ref()),
        }
    }

    /// Creates a new `Parser` directly over a byte slice.
    #[inline]
    pub fn from_bytes(buf: &'buf [u8]) -> Self {
        Self {
            scanner: Scanner::new(buf),
        }
    }

    /// Parses the `buf` into a [`SipMsg`].
    ///
    /// This is equivalent to `Parser::new(buf).parse()`.
    #[inline]
    pub fn parse_sip_msg<B>(buf: &'buf B) -> Result<SipMsg>
    where
        B: AsRef<[u8]> + ?Sized,
    {
        Self::new(buf.as_ref()).parse()
    }

    /// Parses the internal buffer into a [`SipMsg`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sipwire::parser::Parser;
    ///
    /// let buf = b"SIP/2.0 200 OK\r\nContent-Length: 0\r\n\r\n";
    /// let msg = Parser::new(buf).parse().unwrap();
    /// let response = msg.response().unwrap();
    ///
    /// assert_eq!(response.code().as_u16(), 200);
    /// assert_eq!(response.reason(), "OK");
    /// ```
    pub fn parse(&mut self) -> Result<SipMsg> {
        let input_len = self.remaining().len();
        if input_len > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooBig(input_len));
        }

        let mut sip_message = self.parse_start_line()?;

        // Parse headers loop.
        let headers = sip_message.headers_mut();
        'headers: loop {
            // A blank line, or the end of the input, ends the header
            // section.
            if matches!(self.peek_byte(), Some(b'\r') | Some(b'\n') | None) {
                break 'headers;
            }

            // Get name.
            let header_name = self.parse_token()?;

            self.space();
            self.must_read(b':')?;
            self.space();

            let value = self.read_folded_value()?;

            match lookup_header_kind(header_name) {
                Some(kind) => {
                    let mut value_parser = Parser::from_bytes(value.as_ref());
                    parse_known_header(&mut value_parser, kind, headers)?;
                }
                None => {
                    // Found a header that is not defined in RFC 3261.
                    let value = str::from_utf8(value.as_ref())?;
                    headers.push(Header::Other(OtherHeader {
                        name: header_name.into(),
                        value: value.into(),
                    }));
                }
            }
        }

        let declared_length = headers.content_length().map(|cl| cl.clen() as usize);

        // The blank line separating the headers from the body.
        if self.peek_byte().is_some() {
            self.read_line_ending()?;
        }

        let body = self.remaining();
        match declared_length {
            Some(declared) => {
                if declared > MAX_MESSAGE_SIZE || declared > body.len() {
                    return Err(Error::MessageTooBig(declared));
                }
                if declared > 0 {
                    sip_message.set_body(Some(Bytes::copy_from_slice(&body[..declared])));
                }
            }
            None => {
                if !body.is_empty() {
                    sip_message.set_body(Some(Bytes::copy_from_slice(body)));
                }
            }
        }

        Ok(sip_message)
    }

    fn parse_start_line(&mut self) -> Result<SipMsg> {
        // Might be enough for most messages.
        let probable_number_of_headers = 10;

        let starts_with_version = self
            .scanner
            .peek_bytes(4)
            .is_some_and(|bytes| bytes.eq_ignore_ascii_case(b"SIP/"));

        if starts_with_version {
            // Is an status line, e.g, "SIP/2.0 200 OK".
            let status_line = self.parse_status_line()?;
            let headers = Headers::with_capacity(probable_number_of_headers);

            Ok(SipMsg::Response(Response {
                status_line,
                headers,
                body: None,
            }))
        } else {
            // Is an request line, e.g, "OPTIONS sip:localhost SIP/2.0".
            let req_line = self.parse_request_line()?;
            let headers = Headers::with_capacity(probable_number_of_headers);

            Ok(SipMsg::Request(Request {
                req_line,
                headers,
                body: None,
            }))
        }
    }

    fn parse_status_line(&mut self) -> Result<StatusLine> {
        self.parse_version()?;
        let code = self.parse_status_code()?;
        let reason = self.read_until_new_line()?.into();
        self.read_line_ending()?;

        Ok(StatusLine { code, reason })
    }

    fn parse_request_line(&mut self) -> Result<RequestLine> {
        let method = self.parse_method()?;
        let uri = self.parse_uri(true)?;
        self.parse_version()?;
        self.read_line_ending()?;

        Ok(RequestLine { method, uri })
    }

    /// Reads a `SIP/major.minor` version tag, accepting any version.
    ///
    /// RFC 3261 only defines 2.0; other versions are logged and then
    /// handled as 2.0, which is also what reserializing produces.
    fn parse_version(&mut self) -> Result<()> {
        let lead = self.scanner.peek_bytes(4);
        if !lead.is_some_and(|bytes| bytes.eq_ignore_ascii_case(b"SIP/")) {
            return self.parse_error("Expected SIP version".into());
        }
        self.scanner.advance_by(4);

        let major = self.parse_u32()?;
        self.must_read(b'.')?;
        let minor = self.parse_u32()?;

        if (major, minor) != (2, 0) {
            log::warn!("SIP version {major}.{minor} parsed as 2.0");
        }

        Ok(())
    }

    /// Reads the literal `SIP/2.0` protocol tag, as it appears in
    /// `Via` sent-protocol.
    #[inline]
    pub(crate) fn parse_sip_v2(&mut self) -> Result<()> {
        self.must_read_bytes(B_SIPV2)
    }

    fn parse_status_code(&mut self) -> Result<StatusCode> {
        self.space();
        let digits = self.parse_u32()?;
        self.space();

        let Some(code) = u16::try_from(digits).ok().and_then(StatusCode::new) else {
            return self.parse_error(format!("Invalid status code: {digits}"));
        };

        Ok(code)
    }

    #[inline]
    pub(crate) fn parse_method(&mut self) -> Result<Method> {
        Ok(Method::from(self.parse_token()?))
    }

    /// Reads one header value, unfolding continuation lines.
    ///
    /// A line ending followed by a space or tab continues the value of
    /// the previous line; the pieces are joined with a single space.
    fn read_folded_value(&mut self) -> Result<Cow<'buf, [u8]>> {
        let first = trim_ws(self.read_while(is_not_newline));
        self.read_line_ending()?;

        if !matches!(self.peek_byte(), Some(b' ' | b'\t')) {
            return Ok(Cow::Borrowed(first));
        }

        let mut unfolded = first.to_vec();
        while matches!(self.peek_byte(), Some(b' ' | b'\t')) {
            self.space();
            let continuation = trim_ws(self.read_while(is_not_newline));
            self.read_line_ending()?;

            if !continuation.is_empty() {
                unfolded.push(b' ');
                unfolded.extend_from_slice(continuation);
            }
        }

        Ok(Cow::Owned(unfolded))
    }

    /// Consumes one line ending, either CRLF or a bare LF.
    ///
    /// A CR not followed by LF is an error.
    fn read_line_ending(&mut self) -> Result<()> {
        match self.scanner.next_byte() {
            Some(b'\n') => Ok(()),
            Some(b'\r') => {
                if self.advance_if_eq(b'\n').is_some() {
                    Ok(())
                } else {
                    self.parse_error("CR not followed by LF".into())
                }
            }
            _ => self.parse_error("Expected line ending".into()),
        }
    }

    fn parse_scheme(&mut self) -> Result<Scheme> {
        let token = self.scanner.peek_while(is_token);

        let scheme = if token.eq_ignore_ascii_case(SIP) {
            Scheme::Sip
        } else if token.eq_ignore_ascii_case(SIPS) {
            Scheme::Sips
        } else {
            return self.parse_error(format!(
                "Unsupported URI scheme: {}",
                String::from_utf8_lossy(token)
            ));
        };

        // Eat the scheme.
        self.scanner.advance_by(token.len());
        // Eat the ":" character.
        self.must_read(b':')?;

        Ok(scheme)
    }

    fn exists_user_part_in_uri(&self) -> bool {
        self.remaining()
            .iter()
            .take_while(|&&b| !is_space(b) && !is_newline(b) && b != b'>')
            .any(|&b| b == b'@')
    }

    fn parse_user_info(&mut self) -> Result<Option<UriUser>> {
        if !self.exists_user_part_in_uri() {
            return Ok(None);
        }

        // We have user part in uri.
        let user = self.read_user_str().into();
        let pass = if self.advance_if_eq(b':').is_some() {
            Some(self.read_pass_as_str().into())
        } else {
            None
        };

        // Take '@'.
        self.must_read(b'@')?;

        Ok(Some(UriUser { user, pass }))
    }

    pub(crate) fn parse_host_port(&mut self) -> Result<HostPort> {
        let host = match self.peek_byte() {
            Some(b'[') => {
                // Is a Ipv6 host.
                self.next_byte()?;
                // The '[' and ']' characters are removed from the host.
                let host = self.read_while_as_str(|b| b != b']')?;
                self.next_byte()?;

                let Ok(ipv6_addr) = host.parse() else {
                    return self.parse_error(format!("Invalid IPv6 host: {host}"));
                };
                Host::IpAddr(ipv6_addr)
            }
            _ => {
                // Is a domain name or Ipv4 host.
                let host = self.read_host_str();
                if host.is_empty() {
                    return self.parse_error("Missing host".into());
                }
                match host.parse() {
                    Ok(ip_addr) => Host::IpAddr(ip_addr),
                    Err(_) => Host::DomainName(host.into()),
                }
            }
        };

        let port = self.parse_port()?;

        Ok(HostPort { host, port })
    }

    fn parse_port(&mut self) -> Result<Option<u16>> {
        if self.advance_if_eq(b':').is_none() {
            return Ok(None);
        }
        let port = self.scanner.read_u16()?;

        Ok(Some(port))
    }

    /// Parses either a bare `addr-spec` or a `name-addr` form.
    ///
    /// `parse_params` only applies to the bare form: parameters that
    /// follow an unbracketed uri belong to the surrounding header, so
    /// callers like `From` pass `false` and read them afterwards.
    /// Inside angle brackets the parameters always belong to the uri.
    pub(crate) fn parse_sip_uri(&mut self, parse_params: bool) -> Result<SipUri> {
        self.space();

        let token = self.scanner.peek_while(is_token);
        let is_bare_uri = (token.eq_ignore_ascii_case(SIP) || token.eq_ignore_ascii_case(SIPS))
            && self.remaining().get(token.len()) == Some(&b':');

        if is_bare_uri {
            let uri = self.parse_uri(parse_params)?;
            Ok(SipUri::Uri(uri))
        } else {
            let addr = self.parse_name_addr()?;
            Ok(SipUri::NameAddr(addr))
        }
    }

    pub(crate) fn parse_uri(&mut self, parse_params: bool) -> Result<Uri> {
        self.space();
        // "sip:" [ userinfo ] hostport uri-parameters [ headers ]
        let scheme = self.parse_scheme()?;
        let user = self.parse_user_info()?;
        let host_port = self.parse_host_port()?;

        if !parse_params {
            return Ok(Uri::without_params(scheme, user, host_port));
        }

        // Parse SIP uri parameters.
        let mut user_param: Option<ArcStr> = None;
        let mut method_param: Option<ArcStr> = None;
        let mut transport_param: Option<ArcStr> = None;
        let mut ttl_param: Option<ArcStr> = None;
        let mut lr_param: Option<ArcStr> = None;
        let mut maddr_param: Option<ArcStr> = None;

        let params = parse_param!(
            self,
            Parser::parse_uri_param,
            USER_PARAM = user_param,
            METHOD_PARAM = method_param,
            TRANSPORT_PARAM = transport_param,
            TTL_PARAM = ttl_param,
            LR_PARAM = lr_param,
            MADDR_PARAM = maddr_param
        );

        let method_param = method_param.as_deref().map(Method::from);
        let transport_param = transport_param.as_deref().map(Protocol::from);
        let ttl_param = ttl_param.and_then(|ttl| ttl.parse().ok());
        let lr_param = lr_param.is_some();
        let maddr_param = maddr_param.and_then(|maddr| maddr.parse::<Host>().ok());

        let hdr_params = if self.advance_if_eq(b'?').is_some() {
            // The uri has header parameters.
            Some(self.parse_headers_in_sip_uri()?)
        } else {
            None
        };
        self.space();

        Ok(Uri {
            scheme,
            user,
            host_port,
            user_param,
            method_param,
            transport_param,
            ttl_param,
            lr_param,
            maddr_param,
            params,
            hdr_params,
        })
    }

    pub(crate) fn parse_name_addr(&mut self) -> Result<NameAddr> {
        self.space();
        let display = self.parse_display_name()?;
        self.space();

        self.must_read(b'<')?;
        let uri = self.parse_uri(true)?;
        self.must_read(b'>')?;

        Ok(NameAddr {
            display: display.map(|d| d.into()),
            uri,
        })
    }

    fn parse_headers_in_sip_uri(&mut self) -> Result<Params> {
        let mut params = Params::new();

        loop {
            let param = self.parse_hdr_in_uri()?;
            params.push(param);

            if self.advance_if_eq(b'&').is_none() {
                break;
            }
        }

        Ok(params)
    }

    fn parse_display_name(&mut self) -> Result<Option<&'buf str>> {
        match self.peek_byte() {
            Some(b'"') => {
                let Some(name) = self.scanner.read_between(b'"') else {
                    return self.parse_error("Unterminated quoted display name".into());
                };
                Ok(Some(str::from_utf8(name)?))
            }
            Some(b'<') => Ok(None), // no display name
            None => self.parse_error("Unexpected end of name-addr".into()),
            _ => {
                // Display names are not limited to a single token; read
                // up to the '<' that opens the addr-spec.
                let name = self.read_while_as_str(|b| b != b'<' && !is_newline(b))?;
                Ok(Some(name.trim_end_matches([' ', '\t'])))
            }
        }
    }

    #[inline]
    pub(crate) fn parse_token(&mut self) -> Result<&'buf str> {
        if self.advance_if_eq(b'"').is_some() {
            let value = self.read_while(|b| b != b'"');
            self.next_byte()?;

            Ok(str::from_utf8(value)?)
        } else {
            // is_token ensures that is valid UTF-8
            Ok(self.read_token_str())
        }
    }

    /// Reads the rest of the header value as one string, without the
    /// trailing whitespace.
    pub(crate) fn parse_header_value_as_str(&mut self) -> Result<&'buf str> {
        let value = self.read_while_as_str(is_not_newline)?;

        Ok(value.trim_end_matches([' ', '\t']))
    }

    #[inline]
    pub(crate) fn next_byte(&mut self) -> Result<u8> {
        let Some(byte) = self.scanner.next_byte() else {
            return self.parse_error("Unexpected end of input".into());
        };
        Ok(byte)
    }

    /// Shortcut for yielding a parse error wrapped in a result type.
    pub(crate) fn parse_error<T>(&self, message: String) -> Result<T> {
        let position = self.scanner.position();
        Err(SipParserError {
            message: format!(
                "{message} at line:{} column:{}",
                position.line(),
                position.col()
            ),
        }
        .into())
    }

    /// Read until a new line (`\r` or `\n`) is found.
    pub(crate) fn read_until_new_line(&mut self) -> Result<&'buf str> {
        let bytes = self.read_while(is_not_newline);

        Ok(str::from_utf8(bytes)?)
    }

    fn read_while_as_str(&mut self, func: impl Fn(u8) -> bool) -> Result<&'buf str> {
        let bytes = self.read_while(func);

        Ok(str::from_utf8(bytes)?)
    }

    /// Read space characters.
    #[inline]
    pub(crate) fn space(&mut self) {
        self.read_while(is_space);
    }

    #[inline]
    fn read_while(&mut self, func: impl Fn(u8) -> bool) -> &'buf [u8] {
        self.scanner.read_while(func)
    }

    #[inline]
    fn advance_if_eq(&mut self, byte: u8) -> Option<u8> {
        self.scanner.advance_if_eq(byte)
    }

    #[inline]
    fn must_read_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.scanner.must_read_bytes(bytes)?)
    }

    #[inline]
    pub(crate) fn read_until(&mut self, byte: u8) -> &'buf [u8] {
        self.scanner.read_until(byte)
    }

    #[inline]
    pub(crate) fn peek_byte(&self) -> Option<u8> {
        self.scanner.peek_byte().copied()
    }

    /// Get the remaining bytes in the scanner.
    #[inline]
    pub(crate) fn remaining(&self) -> &'buf [u8] {
        self.scanner.remaining()
    }

    #[inline]
    pub(crate) fn parse_u32(&mut self) -> Result<u32> {
        Ok(self.scanner.read_u32()?)
    }

    #[inline]
    pub(crate) fn must_read(&mut self, byte: u8) -> Result<()> {
        Ok(self.scanner.must_read(byte)?)
    }

    #[inline]
    fn read_user_str(&mut self) -> &'buf str {
        unsafe { self.read_while_as_str_unchecked(is_user) }
    }

    #[inline]
    fn read_pass_as_str(&mut self) -> &'buf str {
        unsafe { self.read_while_as_str_unchecked(is_pass) }
    }

    #[inline]
    fn read_host_str(&mut self) -> &'buf str {
        unsafe { self.read_while_as_str_unchecked(is_host) }
    }

    #[inline]
    fn read_token_str(&mut self) -> &'buf str {
        unsafe { self.read_while_as_str_unchecked(is_token) }
    }

    #[inline]
    pub(crate) unsafe fn read_while_as_str_unchecked(
        &mut self,
        func: impl Fn(u8) -> bool,
    ) -> &'buf str {
        unsafe { self.scanner.read_while_as_str_unchecked(func) }
    }

    pub(crate) unsafe fn parse_param_unchecked(
        &mut self,
        func: impl Fn(u8) -> bool,
    ) -> Result<(&'buf str, Option<&'buf str>)> {
        self.space();

        let name = unsafe { self.scanner.read_while_as_str_unchecked(&func) };

        if self.peek_byte() != Some(b'=') {
            return Ok((name, None));
        }
        self.next_byte()?;

        let value = if self.peek_byte() == Some(b'"') {
            // Quoted values keep escapes but lose the quotes; Display
            // impls put them back.
            let Some(value) = self.scanner.read_between(b'"') else {
                return self.parse_error("Unterminated quoted parameter value".into());
            };

            str::from_utf8(value)?
        } else {
            unsafe { self.scanner.read_while_as_str_unchecked(func) }
        };

        Ok((name, Some(value)))
    }

    // Parse parameter (";" pname ["=" pvalue]).
    pub(crate) fn parse_param_ref(&mut self) -> Result<ParamRef<'buf>> {
        // SAFETY: `is_token` only accepts ASCII bytes, which are
        // always valid UTF-8.
        unsafe { self.parse_param_unchecked(is_token) }
    }

    pub(crate) fn parse_via_param(&mut self) -> Result<ParamRef<'buf>> {
        // SAFETY: `is_via_param` only accepts ASCII bytes, which are
        // always valid UTF-8.
        unsafe { self.parse_param_unchecked(is_via_param) }
    }

    pub(crate) fn parse_auth_param(&mut self) -> Result<ParamRef<'buf>> {
        // SAFETY: `is_token` only accepts ASCII bytes, which are
        // always valid UTF-8.
        unsafe { self.parse_param_unchecked(is_token) }
    }

    fn parse_uri_param(&mut self) -> Result<ParamRef<'buf>> {
        // SAFETY: `is_param` only accepts ASCII bytes, which are
        // always valid UTF-8.
        unsafe { self.parse_param_unchecked(is_param) }
    }

    #[inline]
    fn parse_hdr_in_uri(&mut self) -> Result<Param> {
        // SAFETY: `is_hdr_uri` only accepts ASCII bytes, which are
        // always valid UTF-8.
        Ok(unsafe { self.parse_param_unchecked(is_hdr_uri)?.into() })
    }

    pub(crate) fn parse_auth_credential(&mut self) -> Result<Credential> {
        let scheme = self.parse_token()?;

        if scheme.eq_ignore_ascii_case(DIGEST_SCHEME) {
            return self.parse_digest_credential();
        }

        self.parse_other_credential(scheme)
    }

    pub(crate) fn parse_auth_challenge(&mut self) -> Result<Challenge> {
        let scheme = self.parse_token()?;

        if scheme.eq_ignore_ascii_case(DIGEST_SCHEME) {
            return self.parse_digest_challenge();
        }

        let mut params = Params::new();

        comma_separated!(self => {
            let param = self.parse_auth_param()?;
            params.push(param.into());
        });

        Ok(Challenge::Other {
            scheme: scheme.into(),
            param: params,
        })
    }

    fn parse_digest_challenge(&mut self) -> Result<Challenge> {
        let mut digest = DigestChallenge::default();

        comma_separated!(self => {
            let (name, value) = self.parse_auth_param()?;
            let value = value.map(ArcStr::from);

            match name {
                n if n.eq_ignore_ascii_case(REALM) => digest.realm = value,
                n if n.eq_ignore_ascii_case(NONCE) => digest.nonce = value,
                n if n.eq_ignore_ascii_case(DOMAIN) => digest.domain = value,
                n if n.eq_ignore_ascii_case(ALGORITHM) => digest.algorithm = value,
                n if n.eq_ignore_ascii_case(OPAQUE) => digest.opaque = value,
                n if n.eq_ignore_ascii_case(QOP) => digest.qop = value,
                n if n.eq_ignore_ascii_case(STALE) => digest.stale = value,
                _ => {
                    // Unknown digest parameters are dropped.
                }
            }
        });

        Ok(Challenge::Digest(digest))
    }

    fn parse_digest_credential(&mut self) -> Result<Credential> {
        let mut digest = DigestCredential::default();

        comma_separated!(self => {
            let (name, value) = self.parse_auth_param()?;
            let value = value.map(ArcStr::from);

            match name {
                n if n.eq_ignore_ascii_case(REALM) => digest.realm = value,
                n if n.eq_ignore_ascii_case(USERNAME) => digest.username = value,
                n if n.eq_ignore_ascii_case(NONCE) => digest.nonce = value,
                n if n.eq_ignore_ascii_case(URI) => digest.uri = value,
                n if n.eq_ignore_ascii_case(RESPONSE) => digest.response = value,
                n if n.eq_ignore_ascii_case(ALGORITHM) => digest.algorithm = value,
                n if n.eq_ignore_ascii_case(CNONCE) => digest.cnonce = value,
                n if n.eq_ignore_ascii_case(OPAQUE) => digest.opaque = value,
                n if n.eq_ignore_ascii_case(QOP) => digest.qop = value,
                n if n.eq_ignore_ascii_case(NC) => digest.nc = value,
                _ => {
                    // Unknown digest parameters are dropped.
                }
            }
        });

        Ok(Credential::Digest(digest))
    }

    fn parse_other_credential(&mut self, scheme: &str) -> Result<Credential> {
        let mut param = Params::new();

        comma_separated!(self => {
            let mut p: Param = self.parse_auth_param()?.into();

            if p.value.is_none() {
                p.value = Some("".into());
            }

            param.push(p);
        });

        Ok(Credential::Other {
            scheme: scheme.into(),
            param,
        })
    }
}

fn parse_known_header(
    parser: &mut Parser<'_>,
    kind: HeaderKind,
    headers: &mut Headers,
) -> Result<()> {
    match kind {
        HeaderKind::Accept => {
            let header = try_parse_hdr!(Accept, parser);
            headers.push(Header::Accept(header));
        }
        HeaderKind::Allow => {
            let header = try_parse_hdr!(Allow, parser);
            headers.push(Header::Allow(header));
        }
        HeaderKind::AuthenticationInfo => {
            let header = try_parse_hdr!(AuthenticationInfo, parser);
            headers.push(Header::AuthenticationInfo(header));
        }
        HeaderKind::Authorization => {
            let header = try_parse_hdr!(Authorization, parser);
            headers.push(Header::Authorization(header));
        }
        HeaderKind::CallId => {
            let header = try_parse_hdr!(CallId, parser);
            headers.push(Header::CallId(header));
        }
        HeaderKind::Contact => comma_separated!(parser => {
            let header = try_parse_hdr!(Contact, parser);
            headers.push(Header::Contact(header));
        }),
        HeaderKind::ContentEncoding => {
            let header = try_parse_hdr!(ContentEncoding, parser);
            headers.push(Header::ContentEncoding(header));
        }
        HeaderKind::ContentLength => {
            let header = try_parse_hdr!(ContentLength, parser);
            headers.push(Header::ContentLength(header));
        }
        HeaderKind::ContentType => {
            let header = try_parse_hdr!(ContentType, parser);
            headers.push(Header::ContentType(header));
        }
        HeaderKind::CSeq => {
            let header = try_parse_hdr!(CSeq, parser);
            headers.push(Header::CSeq(header));
        }
        HeaderKind::Expires => {
            let header = try_parse_hdr!(Expires, parser);
            headers.push(Header::Expires(header));
        }
        HeaderKind::From => {
            let header = try_parse_hdr!(From, parser);
            headers.push(Header::From(header));
        }
        HeaderKind::MaxForwards => {
            let header = try_parse_hdr!(MaxForwards, parser);
            headers.push(Header::MaxForwards(header));
        }
        HeaderKind::MinExpires => {
            let header = try_parse_hdr!(MinExpires, parser);
            headers.push(Header::MinExpires(header));
        }
        HeaderKind::Organization => {
            let header = try_parse_hdr!(Organization, parser);
            headers.push(Header::Organization(header));
        }
        HeaderKind::Priority => {
            let header = try_parse_hdr!(Priority, parser);
            headers.push(Header::Priority(header));
        }
        HeaderKind::ProxyAuthenticate => {
            let header = try_parse_hdr!(ProxyAuthenticate, parser);
            headers.push(Header::ProxyAuthenticate(header));
        }
        HeaderKind::ProxyAuthorization => {
            let header = try_parse_hdr!(ProxyAuthorization, parser);
            headers.push(Header::ProxyAuthorization(header));
        }
        HeaderKind::ProxyRequire => {
            let header = try_parse_hdr!(ProxyRequire, parser);
            headers.push(Header::ProxyRequire(header));
        }
        HeaderKind::RecordRoute => comma_separated!(parser => {
            let header = try_parse_hdr!(RecordRoute, parser);
            headers.push(Header::RecordRoute(header));
        }),
        HeaderKind::Require => {
            let header = try_parse_hdr!(Require, parser);
            headers.push(Header::Require(header));
        }
        HeaderKind::Route => comma_separated!(parser => {
            let header = try_parse_hdr!(Route, parser);
            headers.push(Header::Route(header));
        }),
        HeaderKind::Server => {
            let header = try_parse_hdr!(Server, parser);
            headers.push(Header::Server(header));
        }
        HeaderKind::Subject => {
            let header = try_parse_hdr!(Subject, parser);
            headers.push(Header::Subject(header));
        }
        HeaderKind::Supported => {
            let header = try_parse_hdr!(Supported, parser);
            headers.push(Header::Supported(header));
        }
        HeaderKind::To => {
            let header = try_parse_hdr!(To, parser);
            headers.push(Header::To(header));
        }
        HeaderKind::Unsupported => {
            let header = try_parse_hdr!(Unsupported, parser);
            headers.push(Header::Unsupported(header));
        }
        HeaderKind::UserAgent => {
            let header = try_parse_hdr!(UserAgent, parser);
            headers.push(Header::UserAgent(header));
        }
        HeaderKind::Via => comma_separated!(parser => {
            let header = try_parse_hdr!(Via, parser);
            headers.push(Header::Via(header));
        }),
        HeaderKind::Warning => comma_separated!(parser => {
            let header = try_parse_hdr!(Warning, parser);
            headers.push(Header::Warning(header));
        }),
        HeaderKind::WWWAuthenticate => {
            let header = try_parse_hdr!(WWWAuthenticate, parser);
            headers.push(Header::WWWAuthenticate(header));
        }
    };

    Ok(())
}

fn trim_ws(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

#[inline(always)]
fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t')
}

#[inline(always)]
fn is_newline(c: u8) -> bool {
    matches!(c, b'\r' | b'\n')
}

#[inline(always)]
fn is_not_newline(c: u8) -> bool {
    !is_newline(c)
}

#[inline(always)]
pub(crate) fn is_via_param(b: u8) -> bool {
    VIA_PARAM_TAB[b as usize]
}

#[inline(always)]
pub(crate) fn is_host(b: u8) -> bool {
    HOST_TAB[b as usize]
}

#[inline(always)]
pub(crate) fn is_token(b: u8) -> bool {
    TOKEN_TAB[b as usize]
}

#[inline(always)]
fn is_user(b: u8) -> bool {
    USER_TAB[b as usize]
}

#[inline(always)]
fn is_pass(b: u8) -> bool {
    PASS_TAB[b as usize]
}

#[inline(always)]
fn is_param(b: u8) -> bool {
    PARAM_TAB[b as usize]
}

#[inline(always)]
fn is_hdr_uri(b: u8) -> bool {
    HDR_TAB[b as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Protocol;
    use crate::{filter_map_header, find_map_header};

    macro_rules! uri_test_ok {
        (name: $name:ident, input: $input:literal, expected: $expected:expr) => {
            #[test]
            fn $name() -> Result<()> {
                let uri = Parser::new($input).parse_uri(true)?;
                let expected = $expected;

                assert_eq!(expected.scheme, uri.scheme);
                assert_eq!(expected.user, uri.user);
                assert_eq!(expected.host_port, uri.host_port);
                assert_eq!(expected.transport_param, uri.transport_param);
                assert_eq!(expected.lr_param, uri.lr_param);
                assert_eq!(expected.maddr_param, uri.maddr_param);

                if let Some(params) = &uri.params {
                    let expected = expected.params.as_ref().expect("missing parameters");
                    for param in expected.iter() {
                        assert_eq!(params.get(&param.name), Some(param.value.as_deref()));
                    }
                }

                Ok(())
            }
        };
    }

    uri_test_ok! {
        name: uri_test_host_only,
        input: "sip:biloxi.com",
        expected: UriBuilder::new()
            .host("biloxi.com".parse().unwrap())
            .get()
    }

    uri_test_ok! {
        name: uri_test_sips_with_port,
        input: "sips:biloxi.com:5061",
        expected: UriBuilder::new()
            .scheme(Scheme::Sips)
            .host("biloxi.com:5061".parse().unwrap())
            .get()
    }

    uri_test_ok! {
        name: uri_test_user,
        input: "sip:bob@biloxi.com:5060",
        expected: UriBuilder::new()
            .user(UriUser::new("bob", None))
            .host("biloxi.com:5060".parse().unwrap())
            .get()
    }

    uri_test_ok! {
        name: uri_test_user_pass_ipv6,
        input: "sip:bob:secret@[::1]:5060",
        expected: UriBuilder::new()
            .user(UriUser::new("bob", Some("secret")))
            .host("[::1]:5060".parse().unwrap())
            .get()
    }

    uri_test_ok! {
        name: uri_test_transport,
        input: "sip:alice@atlanta.com;transport=tcp",
        expected: UriBuilder::new()
            .user(UriUser::new("alice", None))
            .host("atlanta.com".parse().unwrap())
            .transport_param(Protocol::Tcp)
            .get()
    }

    uri_test_ok! {
        name: uri_test_lr,
        input: "sip:proxy.biloxi.com;lr",
        expected: UriBuilder::new()
            .host("proxy.biloxi.com".parse().unwrap())
            .lr_param(true)
            .get()
    }

    uri_test_ok! {
        name: uri_test_maddr,
        input: "sip:biloxi.com;maddr=239.255.255.1",
        expected: UriBuilder::new()
            .host("biloxi.com".parse().unwrap())
            .maddr_param("239.255.255.1".parse().unwrap())
            .get()
    }

    uri_test_ok! {
        name: uri_test_other_param,
        input: "sip:bob@biloxi.com;foo=bar",
        expected: UriBuilder::new()
            .user(UriUser::new("bob", None))
            .host("biloxi.com".parse().unwrap())
            .param("foo", Some("bar"))
            .get()
    }

    #[test]
    fn test_uri_header_params() {
        let uri = Parser::new("sip:alice@atlanta.com?subject=project%20x&priority=urgent")
            .parse_uri(true)
            .unwrap();

        let hdr_params = uri.hdr_params.as_ref().unwrap();
        assert_eq!(hdr_params.get_named("subject"), Some("project%20x"));
        assert_eq!(hdr_params.get_named("priority"), Some("urgent"));
    }

    #[test]
    fn test_uri_rejects_unknown_scheme() {
        assert!(Parser::new("http://example.com").parse_uri(true).is_err());
    }

    #[test]
    fn test_sip_uri_with_display_name_starting_with_sip() {
        let sip_uri = Parser::new("sips Desk <sip:front@biloxi.com>")
            .parse_sip_uri(false)
            .unwrap();

        assert_eq!(sip_uri.display(), Some("sips Desk"));
        assert_eq!(sip_uri.uri().to_string(), "sip:front@biloxi.com");
    }

    #[test]
    fn test_header_table_is_sorted() {
        for pair in HEADER_TABLE.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{} >= {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn test_lookup_folds_case_and_compact_forms() {
        assert_eq!(
            lookup_header_kind("CONTENT-LENGTH"),
            Some(HeaderKind::ContentLength)
        );
        assert_eq!(lookup_header_kind("l"), Some(HeaderKind::ContentLength));
        assert_eq!(lookup_header_kind("Via"), Some(HeaderKind::Via));
        assert_eq!(lookup_header_kind("v"), Some(HeaderKind::Via));
        assert_eq!(lookup_header_kind("X-Custom"), None);
    }

    #[test]
    fn test_parse_request() {
        let buf = concat! {
            "INVITE sip:bob@example.com SIP/2.0\r\n",
            "Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n",
            "Max-Forwards: 70\r\n",
            "To: Bob <sip:bob@example.com>\r\n",
            "From: Alice <sip:alice@example.com>;tag=1928301774\r\n",
            "Call-ID: a84b4c76e66710\r\n",
            "CSeq: 314159 INVITE\r\n",
            "Contact: <sip:alice@pc33.atlanta.com>\r\n",
            "Content-Type: application/sdp\r\n",
            "Content-Length: 131\r\n",
            "\r\n",
            "v=0\r\n",
            "o=bob 2808844564 2808844564 IN IP4 biloxi.com\r\n",
            "s=-\r\n",
            "c=IN IP4 biloxi.com\r\n",
            "t=0 0\r\n",
            "m=audio 7078 RTP/AVP 0\r\n",
            "a=rtpmap:0 PCMU/8000\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        assert_eq!(req.req_line.method, Method::Invite);
        assert_eq!(req.req_line.uri.to_string(), "sip:bob@example.com");

        let via = find_map_header!(req.headers, Via).unwrap();
        assert_eq!(via.transport(), Protocol::Udp);
        assert_eq!(via.sent_by().to_string(), "pc33.atlanta.com");
        assert_eq!(via.branch(), Some("z9hG4bK776asdhds"));

        let max_forwards = find_map_header!(req.headers, MaxForwards).unwrap();
        assert_eq!(max_forwards.max_forwards(), 70);

        let to = find_map_header!(req.headers, To).unwrap();
        assert_eq!(to.uri().uri().to_string(), "sip:bob@example.com");
        assert_eq!(to.uri().display(), Some("Bob"));

        let from = find_map_header!(req.headers, From).unwrap();
        assert_eq!(from.uri().display(), Some("Alice"));
        assert_eq!(from.uri().uri().to_string(), "sip:alice@example.com");
        assert_eq!(from.tag(), Some("1928301774"));

        let call_id = find_map_header!(req.headers, CallId).unwrap();
        assert_eq!(call_id.id(), "a84b4c76e66710");

        let cseq = find_map_header!(req.headers, CSeq).unwrap();
        assert_eq!(cseq.cseq, 314159);
        assert_eq!(cseq.method, Method::Invite);

        let content_type = find_map_header!(req.headers, ContentType).unwrap();
        assert_eq!(content_type.media_type().to_string(), "application/sdp");

        let content_length = find_map_header!(req.headers, ContentLength).unwrap();
        assert_eq!(content_length.clen(), 131);

        assert_eq!(
            req.body.as_deref().unwrap(),
            concat!(
                "v=0\r\n",
                "o=bob 2808844564 2808844564 IN IP4 biloxi.com\r\n",
                "s=-\r\n",
                "c=IN IP4 biloxi.com\r\n",
                "t=0 0\r\n",
                "m=audio 7078 RTP/AVP 0\r\n",
                "a=rtpmap:0 PCMU/8000\r\n"
            )
            .as_bytes()
        );
    }

    #[test]
    fn test_parse_request_without_body() {
        let buf = concat! {
            "REGISTER sip:registrar.biloxi.com SIP/2.0\r\n",
            "Via: SIP/2.0/UDP bobspc.biloxi.com:5060;branch=z9hG4bKnashds7\r\n",
            "Max-Forwards: 70\r\n",
            "To: Bob <sip:bob@biloxi.com>\r\n",
            "From: Bob <sip:bob@biloxi.com>;tag=456248\r\n",
            "Call-ID: 843817637684230@998sdasdh09\r\n",
            "CSeq: 1826 REGISTER\r\n",
            "Contact: <sip:bob@192.0.2.4>\r\n",
            "Expires: 7200\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        assert_eq!(req.req_line.method, Method::Register);
        assert_eq!(req.req_line.uri.to_string(), "sip:registrar.biloxi.com");

        let via = find_map_header!(req.headers, Via).unwrap();
        assert_eq!(via.branch(), Some("z9hG4bKnashds7"));
        assert_eq!(via.sent_by().to_string(), "bobspc.biloxi.com:5060");

        let expires = find_map_header!(req.headers, Expires).unwrap();
        assert_eq!(expires, &Expires::new(7200));

        let cseq = find_map_header!(req.headers, CSeq).unwrap();
        assert_eq!(cseq.cseq, 1826);
        assert_eq!(cseq.method, Method::Register);

        let content_length = find_map_header!(req.headers, ContentLength).unwrap();
        assert_eq!(content_length.clen(), 0);

        assert!(req.body.is_none());
    }

    #[test]
    fn test_parse_response() {
        let buf = concat! {
            "SIP/2.0 200 OK\r\n",
            "Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n",
            "From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n",
            "To: Bob <sip:bob@example.com>;tag=a6c85cf\r\n",
            "Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n",
            "CSeq: 314159 INVITE\r\n",
            "Contact: <sip:bob@biloxi.com>\r\n",
            "Content-Type: application/sdp\r\n",
            "Content-Length: 131\r\n",
            "\r\n",
            "v=0\r\n",
            "o=bob 2808844564 2808844564 IN IP4 biloxi.com\r\n",
            "s=-\r\n",
            "c=IN IP4 biloxi.com\r\n",
            "t=0 0\r\n",
            "m=audio 7078 RTP/AVP 0\r\n",
            "a=rtpmap:0 PCMU/8000\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let resp = msg.response().unwrap();

        assert_eq!(resp.code().as_u16(), 200);
        assert_eq!(resp.reason(), "OK");

        let to = find_map_header!(resp.headers, To).unwrap();
        assert_eq!(to.tag(), Some("a6c85cf"));

        let content_length = find_map_header!(resp.headers, ContentLength).unwrap();
        assert_eq!(content_length.clen(), 131);

        assert_eq!(resp.body.as_deref().map(<[u8]>::len), Some(131));
    }

    #[test]
    fn test_parse_response_without_body() {
        let buf = concat! {
            "SIP/2.0 180 Ringing\r\n",
            "Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds;received=192.0.2.1\r\n",
            "To: Bob <sip:bob@example.com>;tag=a6c85cf\r\n",
            "From: Alice <sip:alice@example.com>;tag=1928301774\r\n",
            "Call-ID: a84b4c76e66710\r\n",
            "CSeq: 314159 INVITE\r\n",
            "Content-Length: 0\r\n\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let resp = msg.response().unwrap();

        assert_eq!(resp.code(), StatusCode::RINGING);
        assert_eq!(resp.reason(), "Ringing");

        let via = find_map_header!(resp.headers, Via).unwrap();
        assert_eq!(via.received(), Some("192.0.2.1".parse().unwrap()));

        assert!(resp.body.is_none());
    }

    #[test]
    fn test_parse_request_with_multiple_via_headers() {
        let buf = concat! {
            "REGISTER sip:registrar.example.com SIP/2.0\r\n",
            "Via: SIP/2.0/UDP host1.example.com;branch=z9hG4bK111\r\n",
            "Via: SIP/2.0/UDP host2.example.com;branch=z9hG4bK222\r\n",
            "Via: SIP/2.0/UDP host3.example.com;branch=z9hG4bK333\r\n",
            "Max-Forwards: 70\r\n",
            "To: <sip:alice@example.com>\r\n",
            "From: <sip:alice@example.com>;tag=1928301774\r\n",
            "Call-ID: manyvias@atlanta.com\r\n",
            "CSeq: 42 REGISTER\r\n",
            "Content-Length: 0\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        let vias: Vec<_> = filter_map_header!(req.headers, Via).collect();
        assert_eq!(vias.len(), 3);
        assert_eq!(vias[0].sent_by().to_string(), "host1.example.com");
        assert_eq!(vias[0].branch(), Some("z9hG4bK111"));
        assert_eq!(vias[1].branch(), Some("z9hG4bK222"));
        assert_eq!(vias[2].branch(), Some("z9hG4bK333"));

        assert!(req.body.is_none());
    }

    #[test]
    fn test_comma_separated_vias_are_split() {
        let buf = concat! {
            "SIP/2.0 200 OK\r\n",
            "Via: SIP/2.0/UDP server10.biloxi.com;branch=z9hG4bKnashds8, ",
            "SIP/2.0/UDP bigbox3.site3.atlanta.com;branch=z9hG4bK77ef4c2312983.1\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();

        let vias: Vec<_> = filter_map_header!(msg.headers(), Via).collect();
        assert_eq!(vias.len(), 2);
        assert_eq!(vias[0].branch(), Some("z9hG4bKnashds8"));
        assert_eq!(vias[1].branch(), Some("z9hG4bK77ef4c2312983.1"));
    }

    #[test]
    fn test_compact_header_names() {
        let buf = concat! {
            "MESSAGE sip:bob@biloxi.com SIP/2.0\r\n",
            "v: SIP/2.0/TCP client.atlanta.com:5060;branch=z9hG4bK74b42\r\n",
            "f: sip:alice@atlanta.com;tag=9fxced76sl\r\n",
            "t: sip:bob@biloxi.com\r\n",
            "i: asd88asd77a@1.2.3.4\r\n",
            "m: <sip:alice@client.atlanta.com>\r\n",
            "s: Lunch\r\n",
            "k: 100rel\r\n",
            "c: text/plain\r\n",
            "e: gzip\r\n",
            "l: 18\r\n",
            "\r\n",
            "Watson, come here."
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        let via = find_map_header!(req.headers, Via).unwrap();
        assert_eq!(via.transport(), Protocol::Tcp);

        let from = find_map_header!(req.headers, From).unwrap();
        assert_eq!(from.tag(), Some("9fxced76sl"));
        assert_eq!(from.uri().uri().to_string(), "sip:alice@atlanta.com");

        assert!(find_map_header!(req.headers, To).is_some());

        let call_id = find_map_header!(req.headers, CallId).unwrap();
        assert_eq!(call_id.id(), "asd88asd77a@1.2.3.4");

        assert!(find_map_header!(req.headers, Contact).is_some());

        let subject = find_map_header!(req.headers, Subject).unwrap();
        assert_eq!(subject.to_string(), "Subject: Lunch");

        let supported = find_map_header!(req.headers, Supported).unwrap();
        assert!(supported.contains("100rel"));

        let content_type = find_map_header!(req.headers, ContentType).unwrap();
        assert_eq!(content_type.media_type().to_string(), "text/plain");

        assert!(find_map_header!(req.headers, ContentEncoding).is_some());

        let content_length = find_map_header!(req.headers, ContentLength).unwrap();
        assert_eq!(content_length.clen(), 18);

        assert_eq!(req.body.as_deref(), Some(&b"Watson, come here."[..]));
    }

    #[test]
    fn test_folded_header_value() {
        let buf = concat! {
            "OPTIONS sip:bob@example.com SIP/2.0\r\n",
            "Via: SIP/2.0/UDP folded.example.com;branch=z9hG4bKfolded\r\n",
            "Subject: I know you're there,\r\n",
            " pick up the phone\r\n",
            "Call-ID: folded@atlanta.com\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        let subject = find_map_header!(req.headers, Subject).unwrap();
        assert_eq!(
            subject.to_string(),
            "Subject: I know you're there, pick up the phone"
        );

        let call_id = find_map_header!(req.headers, CallId).unwrap();
        assert_eq!(call_id.id(), "folded@atlanta.com");
    }

    #[test]
    fn test_folded_params_across_lines() {
        let buf = concat! {
            "OPTIONS sip:bob@example.com SIP/2.0\r\n",
            "Contact: <sip:alice@atlanta.com>;\r\n",
            " param1=value1;\r\n",
            " param2=value2\r\n",
            "Content-Length: 0\r\n\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        let contact = find_map_header!(req.headers, Contact).unwrap();
        let Contact::Uri { uri, param, .. } = contact else {
            panic!("expected a contact address");
        };
        assert_eq!(uri.uri().to_string(), "sip:alice@atlanta.com");

        let param = param.as_ref().unwrap();
        assert_eq!(param.get_named("param1"), Some("value1"));
        assert_eq!(param.get_named("param2"), Some("value2"));
    }

    #[test]
    fn test_unknown_header_is_kept() {
        let buf = concat! {
            "OPTIONS sip:bob@example.com SIP/2.0\r\n",
            "X-Custom-Tracking: abc-123; scope=full\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let req = msg.request().unwrap();

        let other = req.headers.iter().find_map(|h| h.as_other()).unwrap();
        assert_eq!(other.name, "X-Custom-Tracking");
        assert_eq!(other.value, "abc-123; scope=full");
        assert_eq!(other.to_string(), "X-Custom-Tracking: abc-123; scope=full");
    }

    #[test]
    fn test_accepts_bare_lf_line_endings() {
        let buf = concat! {
            "OPTIONS sip:bob@example.com SIP/2.0\n",
            "Call-ID: barelf@atlanta.com\n",
            "Content-Length: 0\n",
            "\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        assert_eq!(msg.headers().call_id().unwrap().id(), "barelf@atlanta.com");
    }

    #[test]
    fn test_rejects_lone_cr_line_ending() {
        let buf = "OPTIONS sip:bob@example.com SIP/2.0\rCall-ID: lonecr@atlanta.com\r\n";

        assert!(Parser::parse_sip_msg(buf).is_err());
    }

    #[test]
    fn test_unusual_version_is_clamped() {
        let buf = concat! {
            "OPTIONS sip:bob@example.com SIP/1.0\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };
        let msg = Parser::parse_sip_msg(buf).unwrap();
        assert!(msg.is_request());

        let buf = concat! {
            "sip/2.0 200 OK\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };
        let msg = Parser::parse_sip_msg(buf).unwrap();
        assert_eq!(msg.response().unwrap().code().as_u16(), 200);
    }

    #[test]
    fn test_invalid_status_code_is_rejected() {
        assert!(Parser::parse_sip_msg("SIP/2.0 999 Huh\r\n\r\n").is_err());
    }

    #[test]
    fn test_rejects_oversized_input() {
        let mut buf = Vec::from(&b"OPTIONS sip:bob@example.com SIP/2.0\r\n"[..]);
        buf.resize(MAX_MESSAGE_SIZE + 1, b' ');

        assert!(matches!(
            Parser::new(&buf[..]).parse(),
            Err(Error::MessageTooBig(_))
        ));
    }

    #[test]
    fn test_content_length_over_limit_is_rejected() {
        let buf = concat! {
            "INVITE sip:bob@example.com SIP/2.0\r\n",
            "Call-ID: toobig@atlanta.com\r\n",
            "Content-Length: 100000\r\n",
            "\r\n"
        };

        assert!(matches!(
            Parser::parse_sip_msg(buf),
            Err(Error::MessageTooBig(100000))
        ));
    }

    #[test]
    fn test_content_length_beyond_available_is_rejected() {
        let buf = concat! {
            "INVITE sip:bob@example.com SIP/2.0\r\n",
            "Call-ID: short@atlanta.com\r\n",
            "Content-Length: 50\r\n",
            "\r\n",
            "too short"
        };

        assert!(matches!(
            Parser::parse_sip_msg(buf),
            Err(Error::MessageTooBig(50))
        ));
    }

    #[test]
    fn test_body_truncated_to_content_length() {
        let buf = concat! {
            "MESSAGE sip:bob@example.com SIP/2.0\r\n",
            "Content-Length: 5\r\n",
            "\r\n",
            "hello extra bytes from the same datagram"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        assert_eq!(msg.body(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_reserialize_is_fixed_point() {
        let buf = concat! {
            "REGISTER sip:registrar.biloxi.com SIP/2.0\r\n",
            "Via: SIP/2.0/UDP bobspc.biloxi.com:5060;rport;branch=z9hG4bKnashds7\r\n",
            "Max-Forwards: 70\r\n",
            "To: Bob <sip:bob@biloxi.com>\r\n",
            "From: Bob <sip:bob@biloxi.com>;tag=456248\r\n",
            "Call-ID: 843817637684230@998sdasdh09\r\n",
            "CSeq: 1826 REGISTER\r\n",
            "Contact: <sip:bob@192.0.2.4>\r\n",
            "Expires: 7200\r\n",
            "Content-Length: 0\r\n",
            "\r\n"
        };

        let msg = Parser::parse_sip_msg(buf).unwrap();
        let printed = msg.to_bytes().unwrap();

        let reparsed = Parser::parse_sip_msg(&printed[..]).unwrap();
        let reprinted = reparsed.to_bytes().unwrap();

        assert_eq!(printed, reprinted);
    }
}
