//! Transport endpoints.
//!
//! An [`EndPoint`] names one side of a SIP transport flow as
//! `host:port/PROTO`, e.g. `192.0.2.34:5060/UDP`. It is the key the
//! network layer pools channel contexts under.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, SipParserError};
use crate::message::Host;

const P_UDP: &str = "UDP";
const P_TCP: &str = "TCP";
const P_TLS: &str = "TLS";
const P_SCTP: &str = "SCTP";
const P_WS: &str = "WS";
const P_WSS: &str = "WSS";
const P_UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// A SIP transport protocol.
pub enum Protocol {
    #[default]
    /// `UDP` transport.
    Udp,
    /// `TCP` transport.
    Tcp,
    /// `TLS` over TCP transport.
    Tls,
    /// `WebSocket` transport.
    Ws,
    /// `WebSocket` over TLS transport.
    Wss,
    /// `SCTP` transport.
    Sctp,
    /// Transport named by a token this stack does not know.
    Unknown,
}

impl Protocol {
    /// Returns the default port number associated with the transport protocol.
    ///
    /// - `UDP`, `TCP`, and `SCTP` use port `5060` by default.
    /// - `TLS` uses port `5061`.
    /// - `WS` uses port `80` and `WSS` port `443`.
    /// - `Unknown` returns `0` to indicate no default.
    #[inline]
    pub const fn default_port(&self) -> u16 {
        match self {
            Protocol::Udp | Protocol::Tcp | Protocol::Sctp => 5060,
            Protocol::Tls => 5061,
            Protocol::Ws => 80,
            Protocol::Wss => 443,
            Protocol::Unknown => 0,
        }
    }

    /// Returns `true` for connection oriented transports with ordered
    /// delivery.
    #[inline]
    pub const fn is_reliable(&self) -> bool {
        !matches!(self, Protocol::Udp | Protocol::Unknown)
    }

    /// Returns `true` for transports that run over TLS.
    #[inline]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Protocol::Tls | Protocol::Wss)
    }

    /// Returns `true` for transports that frame messages themselves,
    /// so received payloads are whole messages rather than a byte
    /// stream.
    #[inline]
    pub const fn is_message_oriented(&self) -> bool {
        matches!(self, Protocol::Udp | Protocol::Ws | Protocol::Wss | Protocol::Sctp)
    }

    /// Returns the transport string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => P_UDP,
            Protocol::Tcp => P_TCP,
            Protocol::Tls => P_TLS,
            Protocol::Ws => P_WS,
            Protocol::Wss => P_WSS,
            Protocol::Sctp => P_SCTP,
            Protocol::Unknown => P_UNKNOWN,
        }
    }

    /// Returns the lowercase transport string, the form used in uri
    /// `transport` parameters.
    pub fn as_lower_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
            Protocol::Tls => "tls",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
            Protocol::Sctp => "sctp",
            Protocol::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Protocol {
    fn from(s: &str) -> Self {
        s.as_bytes().into()
    }
}

impl From<&[u8]> for Protocol {
    fn from(b: &[u8]) -> Self {
        if b.eq_ignore_ascii_case(b"UDP") {
            Protocol::Udp
        } else if b.eq_ignore_ascii_case(b"TCP") {
            Protocol::Tcp
        } else if b.eq_ignore_ascii_case(b"TLS") {
            Protocol::Tls
        } else if b.eq_ignore_ascii_case(b"WS") {
            Protocol::Ws
        } else if b.eq_ignore_ascii_case(b"WSS") {
            Protocol::Wss
        } else if b.eq_ignore_ascii_case(b"SCTP") {
            Protocol::Sctp
        } else {
            Protocol::Unknown
        }
    }
}

/// A remote or local transport address in `host:port/PROTO` form.
///
/// The host compares case-insensitively, so `ATLANTA.com:5060/UDP` and
/// `atlanta.com:5060/UDP` name the same endpoint and hash alike. IPv6
/// hosts are written bracketed, `[2001:db8::1]:5070/TLS`.
#[derive(Debug, Clone, Eq)]
pub struct EndPoint {
    host: Host,
    port: u16,
    protocol: Protocol,
}

impl EndPoint {
    /// Creates an endpoint from its parts.
    pub fn new(host: Host, port: u16, protocol: Protocol) -> Self {
        Self {
            host,
            port,
            protocol,
        }
    }

    /// The endpoint host.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// The endpoint port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The endpoint transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the socket address when the host is an IP literal.
    pub fn addr(&self) -> Option<SocketAddr> {
        match self.host {
            Host::IpAddr(ip) => Some(SocketAddr::new(ip, self.port)),
            Host::DomainName(_) => None,
        }
    }

    /// Rebuilds the endpoint with another protocol, keeping host and
    /// port.
    pub fn with_protocol(&self, protocol: Protocol) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            protocol,
        }
    }
}

impl From<(SocketAddr, Protocol)> for EndPoint {
    fn from((addr, protocol): (SocketAddr, Protocol)) -> Self {
        Self {
            host: Host::IpAddr(addr.ip()),
            port: addr.port(),
            protocol,
        }
    }
}

impl PartialEq for EndPoint {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port
            && self.protocol == other.protocol
            && self.host.eq_ignore_case(&other.host)
    }
}

impl Hash for EndPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.host {
            Host::DomainName(name) => {
                for b in name.bytes() {
                    state.write_u8(b.to_ascii_lowercase());
                }
            }
            Host::IpAddr(ip) => ip.hash(state),
        }
        self.port.hash(state);
        self.protocol.hash(state);
    }
}

impl fmt::Display for EndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::IpAddr(IpAddr::V6(v6)) => write!(f, "[{}]", v6)?,
            host => write!(f, "{}", host)?,
        }
        write!(f, ":{}/{}", self.port, self.protocol)
    }
}

impl FromStr for EndPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |msg: &str| -> Error { SipParserError::from(format!("{msg}: {s:?}")).into() };

        let (addr, proto) = s
            .rsplit_once('/')
            .ok_or_else(|| err("Endpoint without protocol"))?;
        if proto.is_empty() {
            return Err(err("Endpoint without protocol"));
        }
        let protocol = Protocol::from(proto);

        let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
            let (inside, after) = rest
                .split_once(']')
                .ok_or_else(|| err("Unterminated bracketed host"))?;
            let v6: std::net::Ipv6Addr =
                inside.parse().map_err(|_| err("Invalid IPv6 host"))?;
            let port = match after {
                "" => None,
                _ => Some(parse_port(after.strip_prefix(':').ok_or_else(|| {
                    err("Garbage after bracketed host")
                })?)
                .ok_or_else(|| err("Invalid port"))?),
            };
            (Host::IpAddr(IpAddr::V6(v6)), port)
        } else if let Ok(v6) = addr.parse::<std::net::Ipv6Addr>() {
            // Bare v6 literal, every colon belongs to the address.
            (Host::IpAddr(IpAddr::V6(v6)), None)
        } else {
            match addr.rsplit_once(':') {
                Some((host, port)) => (
                    host.parse()?,
                    Some(parse_port(port).ok_or_else(|| err("Invalid port"))?),
                ),
                None => (addr.parse()?, None),
            }
        };

        Ok(EndPoint {
            host,
            port: port.unwrap_or_else(|| protocol.default_port()),
            protocol,
        })
    }
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
