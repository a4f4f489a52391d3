use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use itertools::Itertools;

use crate::error::Error;
use crate::message::{Method, Param, Params};
use crate::parser::Parser;
use crate::ArcStr;

use crate::endpoint::Protocol;

/// Either form of a SIP uri found in headers.
///
/// Headers such as `From`, `To`, `Contact` and `Route` carry either a
/// bare `addr-spec` or a `name-addr` with optional display name and
/// mandatory angle brackets.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SipUri {
    /// A bare `addr-spec` uri.
    Uri(Uri),
    /// A `name-addr` with optional display name.
    NameAddr(NameAddr),
}

impl SipUri {
    /// Returns the inner [`Uri`] of either form.
    pub fn uri(&self) -> &Uri {
        match self {
            SipUri::Uri(uri) => uri,
            SipUri::NameAddr(name_addr) => &name_addr.uri,
        }
    }

    /// Returns the display name, if this is a `name-addr` with one.
    pub fn display(&self) -> Option<&str> {
        match self {
            SipUri::Uri(_) => None,
            SipUri::NameAddr(name_addr) => name_addr.display.as_deref(),
        }
    }
}

impl std::fmt::Display for SipUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SipUri::Uri(uri) => write!(f, "{uri}"),
            SipUri::NameAddr(name_addr) => write!(f, "{name_addr}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
/// Represents the scheme that appears in a SIP URI.
pub enum Scheme {
    #[default]
    /// An Sip uri scheme.
    Sip,
    /// An Sips uri scheme.
    Sips,
}

#[derive(Debug, PartialEq, Eq, Default, Clone)]
/// An SIP uri.
pub struct Uri {
    /// The uri scheme.
    pub scheme: Scheme,

    /// Optional user part of uri.
    pub user: Option<UriUser>,

    /// The uri host.
    pub host_port: HostPort,

    /// Optional user param.
    pub user_param: Option<ArcStr>,

    /// Optional method param.
    pub method_param: Option<Method>,

    /// Optional transport param.
    pub transport_param: Option<Protocol>,

    /// Optional ttl param.
    pub ttl_param: Option<u8>,

    /// The lr param.
    pub lr_param: bool,

    /// Optional maddr param.
    pub maddr_param: Option<Host>,

    /// Other parameters.
    pub params: Option<Params>,

    /// Optional header parameters.
    pub hdr_params: Option<Params>,
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scheme {
            Scheme::Sip => write!(f, "sip")?,
            Scheme::Sips => write!(f, "sips")?,
        }
        write!(f, ":")?;

        if let Some(user) = &self.user {
            write!(f, "{}", user.user)?;
            if let Some(pass) = &user.pass {
                write!(f, ":{}", pass)?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}", self.host_port)?;

        if let Some(user) = &self.user_param {
            write!(f, ";user={}", user)?;
        }
        if let Some(method) = &self.method_param {
            write!(f, ";method={}", method)?;
        }
        if let Some(maddr) = &self.maddr_param {
            write!(f, ";maddr={}", maddr)?;
        }
        if let Some(transport) = &self.transport_param {
            write!(f, ";transport={}", transport.as_lower_str())?;
        }
        if let Some(ttl) = self.ttl_param {
            write!(f, ";ttl={}", ttl)?;
        }
        if self.lr_param {
            write!(f, ";lr")?;
        }
        if let Some(params) = &self.params {
            write!(f, "{}", params)?;
        }
        if let Some(hdr_params) = &self.hdr_params {
            let formater = Itertools::format_with(hdr_params.iter(), "&", |it, f| {
                f(&format_args!("{}={}", it.name, it.value.as_deref().unwrap_or("")))
            });
            write!(f, "?{}", formater)?;
        }

        Ok(())
    }
}

impl Uri {
    /// Creates an `Uri` instance without parameters.
    pub fn without_params(scheme: Scheme, user: Option<UriUser>, host_port: HostPort) -> Self {
        Uri {
            scheme,
            user,
            host_port,
            ..Default::default()
        }
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Parser::new(s).parse_uri(true)
    }
}

#[derive(Default)]
/// Builder for creating a new SIP URI.
pub struct UriBuilder {
    uri: Uri,
}

impl UriBuilder {
    /// Returns a builder to create an `UriBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the uri scheme.
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.uri.scheme = scheme;
        self
    }

    /// Sets the user part of the uri.
    pub fn user(mut self, user: UriUser) -> Self {
        self.uri.user = Some(user);
        self
    }

    /// Sets the host of the uri.
    pub fn host(mut self, host_port: HostPort) -> Self {
        self.uri.host_port = host_port;
        self
    }

    /// Sets the transport parameter of the uri.
    pub fn transport_param(mut self, param: Protocol) -> Self {
        self.uri.transport_param = Some(param);
        self
    }

    /// Sets the lr parameter of the uri.
    pub fn lr_param(mut self, param: bool) -> Self {
        self.uri.lr_param = param;
        self
    }

    /// Sets the maddr parameter of the uri.
    pub fn maddr_param(mut self, param: Host) -> Self {
        self.uri.maddr_param = Some(param);
        self
    }

    /// Set generic parameter of the uri.
    pub fn param(mut self, name: &str, value: Option<&str>) -> Self {
        let params = self.uri.params.get_or_insert_with(Params::new);
        params.push(Param::new(name, value));
        self
    }

    /// Finalize the builder into a `Uri`.
    pub fn get(self) -> Uri {
        self.uri
    }
}

/// Represents an SIP `name-addr`.
///
/// Typically appear in `From`, `To`, and `Contact` header.
/// Contains an sip uri and a optional display part.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NameAddr {
    /// The optional display part.
    pub display: Option<ArcStr>,
    /// The uri of the `name-addr`.
    pub uri: Uri,
}

impl std::fmt::Display for NameAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(display) = &self.display {
            if display.bytes().all(crate::parser::is_token) {
                write!(f, "{} ", display)?;
            } else {
                write!(f, "\"{}\" ", display)?;
            }
        }
        write!(f, "<{}>", self.uri)?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// Represents the user information component of a URI.
pub struct UriUser {
    /// The username part of the URI.
    pub user: ArcStr,

    /// The optional password associated with the user.
    pub pass: Option<ArcStr>,
}

impl UriUser {
    /// Creates a new `UriUser`.
    pub fn new(user: &str, pass: Option<&str>) -> Self {
        Self {
            user: user.into(),
            pass: pass.map(|p| p.into()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
/// Represents the host part of a URI, which can be either a domain name or an IP address.
pub enum Host {
    /// A domain name, such as `example.com`.
    DomainName(ArcStr),

    /// An IP address, either IPv4 or IPv6.
    IpAddr(IpAddr),
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Host::DomainName(domain) => write!(f, "{domain}"),
            Host::IpAddr(ip_addr) => write!(f, "{ip_addr}"),
        }
    }
}

impl Host {
    /// Returns `true` if the host is an IP address (IPv4 or IPv6).
    pub fn is_ip_addr(&self) -> bool {
        match self {
            Host::DomainName(_) => false,
            Host::IpAddr(_) => true,
        }
    }

    /// Returns the string representation of the host as a `Cow<str>`.
    ///
    /// If the host is a domain name, this returns a borrowed string.
    /// If the host is an IP address, this returns an owned string created via formatting.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Host::DomainName(host) => Cow::Borrowed(host),
            Host::IpAddr(host) => Cow::Owned(host.to_string()),
        }
    }

    /// Compares two hosts, folding ascii case for domain names.
    pub fn eq_ignore_case(&self, other: &Host) -> bool {
        match (self, other) {
            (Host::DomainName(a), Host::DomainName(b)) => a.eq_ignore_ascii_case(b),
            (Host::IpAddr(a), Host::IpAddr(b)) => a == b,
            _ => false,
        }
    }
}

impl FromStr for Host {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim_start_matches('[').trim_end_matches(']');
        if s.is_empty() {
            return Err(crate::error::SipParserError::from("Empty host").into());
        }
        match s.parse::<IpAddr>() {
            Ok(ip_addr) => Ok(Host::IpAddr(ip_addr)),
            Err(_) => Ok(Host::DomainName(s.into())),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
/// Represents a combination of a host (domain or IP address) and an optional port.
pub struct HostPort {
    /// The host part, which may be a domain name or an IP address.
    pub host: Host,

    /// The optional port number.
    pub port: Option<u16>,
}

impl FromStr for HostPort {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Parser::new(s).parse_host_port()
    }
}

impl HostPort {
    /// Creates a new `HostPort` from a host and optional port.
    pub fn new(host: Host, port: Option<u16>) -> Self {
        Self { host, port }
    }

    /// Returns the IP address if the host is an IP address, otherwise `None`.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match self.host {
            Host::DomainName(_) => None,
            Host::IpAddr(ip_addr) => Some(ip_addr),
        }
    }

    /// Returns `true` if the host is an IP address.
    pub fn is_ip_addr(&self) -> bool {
        self.ip_addr().is_some()
    }

    /// Returns `true` if the host is a domain name.
    pub fn is_domain(&self) -> bool {
        matches!(self.host, Host::DomainName(_))
    }

    /// Returns the string representation of the host.
    pub fn host_as_str(&self) -> Cow<'_, str> {
        self.host.as_str()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 hosts are bracketed so the port separator stays
        // unambiguous.
        match &self.host {
            Host::IpAddr(IpAddr::V6(v6)) => write!(f, "[{}]", v6)?,
            host => write!(f, "{}", host)?,
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl From<Host> for HostPort {
    fn from(host: Host) -> Self {
        Self { host, port: None }
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self {
            host: Host::IpAddr(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: Some(5060),
        }
    }
}
