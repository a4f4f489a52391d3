use std::fmt;

use enum_as_inner::EnumAsInner;

use crate::headers::{
    Accept, Allow, AuthenticationInfo, Authorization, CSeq, CallId, Contact, ContentEncoding,
    ContentLength, ContentType, Expires, From, MaxForwards, MinExpires, Organization, Priority,
    ProxyAuthenticate, ProxyAuthorization, ProxyRequire, RecordRoute, Require, Route, Server,
    Subject, Supported, To, Unsupported, UserAgent, Via, WWWAuthenticate, Warning,
};
use crate::ArcStr;

/// A header that the message parser does not know how to interpret.
///
/// The name and value are kept as received so the header survives
/// reserialization byte for byte.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OtherHeader {
    /// The header name as it appeared on the wire.
    pub name: ArcStr,
    /// The raw, unparsed header value.
    pub value: ArcStr,
}

impl fmt::Display for OtherHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Represents an SIP header.
#[derive(Debug, PartialEq, Eq, Clone, EnumAsInner)]
pub enum Header {
    /// `Accept` header.
    Accept(Accept),
    /// `Allow` header.
    Allow(Allow),
    /// `Authentication-Info` header.
    AuthenticationInfo(AuthenticationInfo),
    /// `Authorization` header.
    Authorization(Authorization),
    /// `Call-ID` header.
    CallId(CallId),
    /// `Contact` header.
    Contact(Contact),
    /// `Content-Encoding` header.
    ContentEncoding(ContentEncoding),
    /// `Content-Length` header.
    ContentLength(ContentLength),
    /// `Content-Type` header.
    ContentType(ContentType),
    /// `CSeq` header.
    CSeq(CSeq),
    /// `Expires` header.
    Expires(Expires),
    /// `From` header.
    From(From),
    /// `Max-Forwards` header.
    MaxForwards(MaxForwards),
    /// `Min-Expires` header.
    MinExpires(MinExpires),
    /// `Organization` header.
    Organization(Organization),
    /// `Priority` header.
    Priority(Priority),
    /// `Proxy-Authenticate` header.
    ProxyAuthenticate(ProxyAuthenticate),
    /// `Proxy-Authorization` header.
    ProxyAuthorization(ProxyAuthorization),
    /// `Proxy-Require` header.
    ProxyRequire(ProxyRequire),
    /// `Record-Route` header.
    RecordRoute(RecordRoute),
    /// `Require` header.
    Require(Require),
    /// `Route` header.
    Route(Route),
    /// `Server` header.
    Server(Server),
    /// `Subject` header.
    Subject(Subject),
    /// `Supported` header.
    Supported(Supported),
    /// `To` header.
    To(To),
    /// `Unsupported` header.
    Unsupported(Unsupported),
    /// `User-Agent` header.
    UserAgent(UserAgent),
    /// `Via` header.
    Via(Via),
    /// `Warning` header.
    Warning(Warning),
    /// `WWW-Authenticate` header.
    WWWAuthenticate(WWWAuthenticate),
    /// A header not otherwise interpreted, kept as raw name and value.
    Other(OtherHeader),
}

macro_rules! impl_header_display {
    ($($variant:ident),* $(,)?) => {
        impl fmt::Display for Header {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(
                        Header::$variant(inner) => write!(f, "{inner}"),
                    )*
                }
            }
        }
    };
}

impl_header_display!(
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
    Other,
);
