#![deny(missing_docs)]
//! SIP Headers types
//!
//! The module provide the [`Headers`] struct that contains
//! an list of [`Header`] and a can be used to manipulating
//! SIP headers.

mod accept;
mod allow;
mod authentication_info;
mod authorization;
mod call_id;
mod contact;
mod content_encoding;
mod content_length;
mod content_type;
mod cseq;
mod expires;
mod from;
mod header;
mod max_forwards;
mod min_expires;
mod organization;
mod priority;
mod proxy_authenticate;
mod proxy_authorization;
mod proxy_require;
mod record_route;
mod require;
mod route;
mod server;
mod subject;
mod supported;
mod to;
mod unsupported;
mod user_agent;
mod via;
mod warning;
mod www_authenticate;

pub use accept::Accept;
pub use allow::Allow;
pub use authentication_info::AuthenticationInfo;
pub use authorization::Authorization;
pub use call_id::CallId;
pub use contact::Contact;
pub use content_encoding::ContentEncoding;
pub use content_length::ContentLength;
pub use content_type::{ContentType, MediaType, MimeType};
pub use cseq::CSeq;
pub use expires::Expires;
pub use from::From;
pub use header::*;
pub use max_forwards::MaxForwards;
pub use min_expires::MinExpires;
pub use organization::Organization;
pub use priority::Priority;
pub use proxy_authenticate::ProxyAuthenticate;
pub use proxy_authorization::ProxyAuthorization;
pub use proxy_require::ProxyRequire;
pub use record_route::RecordRoute;
pub use require::Require;
pub use route::Route;
pub use server::Server;
pub use subject::Subject;
pub use supported::Supported;
pub use to::To;
pub use unsupported::Unsupported;
pub use user_agent::UserAgent;
pub use via::{Rport, Via};
pub use warning::Warning;
pub use www_authenticate::WWWAuthenticate;

use core::fmt;
use std::{
    iter::{Filter, FilterMap},
    ops::{Index, Range, RangeFrom},
    str::{self},
};

use crate::error::Result;
use crate::parser::Parser;

/// The tag parameter that is used normaly in [`From`] and [`To`] headers.
const TAG_PARAM: &str = "tag";

/// The q parameter that is used normaly in [`Contact`] headers.
const Q_PARAM: &str = "q";

/// The expires parameter that is used normaly in [`Contact`] headers.
const EXPIRES_PARAM: &str = "expires";

/// Trait to parse SIP headers.
///
/// This trait defines how a specific SIP header type can be parsed from a byte
/// slice, as typically received in SIP messages.
pub trait HeaderParse: Sized {
    /// The full name of the SIP header (e.g., `"Contact"`).
    const NAME: &'static str;
    /// The abbreviated name of the SIP header, if any (e.g., `"f"` for
    /// `"From"`).
    const SHORT_NAME: Option<&'static str> = None;

    /// Checks if the given name matches this header's name.
    fn matches_name(name: &[u8]) -> bool {
        name.eq_ignore_ascii_case(Self::NAME.as_bytes())
            || Self::SHORT_NAME.is_some_and(|short| name.eq_ignore_ascii_case(short.as_bytes()))
    }

    /// Parses this header's value from the given `Parser`.
    fn parse(parser: &mut Parser<'_>) -> Result<Self>;

    /// Parses this header from a raw byte slice.
    ///
    /// This is a convenience method that creates a [`Parser`] and delegates to
    /// [`parse`](HeaderParse::parse).
    fn from_bytes(src: &[u8]) -> Result<Self> {
        Self::parse(&mut Parser::from_bytes(src))
    }
}

/// A collection of SIP Headers.
///
/// A wrapper over Vec<[`Header`]> that contains the header
/// list.
///
/// # Examples
///
/// ```
/// # use sipwire::headers::Headers;
/// # use sipwire::headers::Header;
/// # use sipwire::headers::ContentLength;
/// let mut headers = Headers::new();
/// headers.push(Header::ContentLength(ContentLength::new(10)));
///
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct Headers(Vec<Header>);

impl Headers {
    /// Create a new empty collection of headers.
    #[inline]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Constructs a new, empty collection of `Headers` with at least the
    /// specified capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Applies function to the headers and return the first
    /// no-none result.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sipwire::headers::Headers;
    /// # use sipwire::headers::Header;
    /// # use sipwire::headers::Expires;
    /// let mut headers = Headers::new();
    /// headers.push(Header::Expires(Expires::new(10)));
    ///
    /// let expires = headers.find_map(|h| if let Header::Expires(expires) = h {
    ///        Some(expires)
    ///    } else {
    ///        None
    ///    });
    ///
    /// assert!(expires.is_some());
    #[inline]
    pub fn find_map<'b, T, F>(&'b self, f: F) -> Option<&'b T>
    where
        F: Fn(&'b Header) -> Option<&'b T>,
    {
        self.0.iter().find_map(f)
    }

    /// Extends the headers collection with the contents of an
    /// another.
    #[inline]
    pub fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Header>,
    {
        self.0.extend(iter);
    }

    /// Returns an iterator over headers.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    /// Returns an mutable iterator over headers.
    #[inline]
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Header> {
        self.0.iter_mut()
    }

    /// Creates an iterator that both filters and maps an
    /// header.
    #[inline]
    pub fn filter_map<'a, T: 'a, F>(&'a self, f: F) -> FilterMap<impl Iterator<Item = &'a Header>, F>
    where
        F: FnMut(&'a Header) -> Option<&'a T>,
    {
        self.0.iter().filter_map(f)
    }

    /// Creates an iterator which uses a closure to
    /// determine if an header should be yielded.
    #[inline]
    pub fn filter<F>(&self, f: F) -> Filter<impl Iterator<Item = &Header>, F>
    where
        F: FnMut(&&Header) -> bool,
    {
        self.0.iter().filter(f)
    }

    /// Searches for an header that satisfies a predicate.
    #[inline]
    pub fn find<F>(&self, f: F) -> Option<&Header>
    where
        F: FnMut(&&Header) -> bool,
    {
        self.0.iter().find(f)
    }

    /// Moves all the elements of `other` into `self`,
    /// leaving `other` empty.
    #[inline]
    pub fn append(&mut self, other: &mut Self) {
        self.0.append(&mut other.0);
    }

    /// Push an new header.
    #[inline]
    pub fn push(&mut self, hdr: Header) {
        self.0.push(hdr);
    }

    /// Inserts a header at `index`, shifting everything after it.
    #[inline]
    pub fn insert(&mut self, index: usize, hdr: Header) {
        self.0.insert(index, hdr);
    }

    /// Returns the number of headers in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get an reference to an header at the index
    /// specified.
    pub fn get(&self, index: usize) -> Option<&Header> {
        self.0.get(index)
    }

    /// Removes and returns the header at `index`.
    pub fn remove(&mut self, index: usize) -> Header {
        self.0.remove(index)
    }

    /// Removes the last element and returns it, or None if it is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<Header> {
        self.0.pop()
    }

    /// Returns `true` if the header collection contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    /// Returns the total number of elements the header list can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.0.capacity()
    }
}

impl Headers {
    /// Returns the topmost `Via` header, if any.
    pub fn topmost_via(&self) -> Option<&Via> {
        crate::find_map_header!(self, Via)
    }

    /// Returns a mutable reference to the topmost `Via` header.
    pub fn topmost_via_mut(&mut self) -> Option<&mut Via> {
        crate::find_map_mut_header!(self, Via)
    }

    /// Returns the topmost `Route` header, if any.
    pub fn topmost_route(&self) -> Option<&Route> {
        crate::find_map_header!(self, Route)
    }

    /// Returns the `Call-ID` header, if any.
    pub fn call_id(&self) -> Option<&CallId> {
        crate::find_map_header!(self, CallId)
    }

    /// Returns the `CSeq` header, if any.
    pub fn cseq(&self) -> Option<&CSeq> {
        crate::find_map_header!(self, CSeq)
    }

    /// Returns the `From` header, if any.
    pub fn from_hdr(&self) -> Option<&From> {
        crate::find_map_header!(self, From)
    }

    /// Returns the `To` header, if any.
    pub fn to_hdr(&self) -> Option<&To> {
        crate::find_map_header!(self, To)
    }

    /// Returns a mutable reference to the `To` header.
    pub fn to_hdr_mut(&mut self) -> Option<&mut To> {
        crate::find_map_mut_header!(self, To)
    }

    /// Returns the `Content-Length` header, if any.
    pub fn content_length(&self) -> Option<&ContentLength> {
        crate::find_map_header!(self, ContentLength)
    }
}

impl Index<usize> for Headers {
    type Output = Header;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<Header, const N: usize> std::convert::From<[Header; N]> for Headers
where
    Headers: FromIterator<Header>,
{
    fn from(array: [Header; N]) -> Self {
        array.into_iter().collect()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        let headers: Vec<Header> = iter.into_iter().collect();
        Headers(headers)
    }
}

impl Index<Range<usize>> for Headers {
    type Output = [Header];

    fn index(&self, range: Range<usize>) -> &Self::Output {
        &self.0[range]
    }
}

impl Index<RangeFrom<usize>> for Headers {
    type Output = [Header];

    fn index(&self, range: RangeFrom<usize>) -> &Self::Output {
        &self.0[range]
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hdr in self.iter() {
            write!(f, "{hdr}\r\n")?;
        }
        Ok(())
    }
}

impl Default for Headers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::convert::From<Vec<Header>> for Headers {
    fn from(headers: Vec<Header>) -> Self {
        Self(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieves_header_by_index_correctly() {
        let mut headers = Headers::new();

        let clen = ContentLength::new(10);
        let cid = CallId::new("bs9ki9iqbee8k5kal8mpqb");

        headers.push(Header::CallId(cid.clone()));
        headers.push(Header::ContentLength(clen));

        assert_eq!(headers.get(0), Some(&Header::CallId(cid)));
        assert_eq!(headers.get(1), Some(&Header::ContentLength(clen)));

        assert!(headers.get(2).is_none());
    }

    #[test]
    fn test_finds_header_matching_predicate() {
        let clen = ContentLength::new(10);
        let headers = Headers::from([Header::ContentLength(clen)]);
        let header = headers.iter().find(|h| matches!(h, Header::ContentLength(_)));

        assert_eq!(header.unwrap().to_string(), "Content-Length: 10");
    }

    #[test]
    fn test_creates_empty_headers_collection_with_new() {
        let headers = Headers::new();
        assert_eq!(headers.len(), 0);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_pushes_and_pops_header_correctly() {
        let expires = Expires::new(3600);
        let mut headers = Headers::new();

        headers.push(Header::Expires(expires));
        assert_eq!(headers.len(), 1);

        let popped = headers.pop();
        assert_eq!(popped, Some(Header::Expires(expires)));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_typed_getters_find_first_match() {
        let mut headers = Headers::new();
        headers.push(Header::CallId(CallId::new("a84b4c76e66710")));
        headers.push(Header::ContentLength(ContentLength::new(0)));

        assert_eq!(headers.call_id().map(|c| c.as_str()), Some("a84b4c76e66710"));
        assert!(headers.topmost_via().is_none());
    }
}
