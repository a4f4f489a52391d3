use crate::endpoint::{EndPoint, Protocol};
use crate::headers::HeaderParse;
use crate::macros::parse_param;
use crate::message::Host;
use crate::parser::{Parser, SIPV2};
use crate::{
    error::Result,
    error::SipParserError,
    message::{HostPort, Params},
    ArcStr,
};
use core::fmt;
use std::net::IpAddr;
use std::str::{self};

const MADDR_PARAM: &str = "maddr";
const BRANCH_PARAM: &str = "branch";
const TTL_PARAM: &str = "ttl";
const RPORT_PARAM: &str = "rport";
const RECEIVED_PARAM: &str = "received";

/// The `rport` parameter of a `Via` header.
///
/// A request stamps the bare flag to ask the receiving side to echo
/// the source port back; the receiver answers with the port filled
/// in.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Rport {
    /// No `rport` parameter.
    #[default]
    Unset,
    /// The flag form, `;rport`, asking the peer to report the source
    /// port.
    Requested,
    /// The answered form, `;rport=port`.
    Assigned(u16),
}

impl Rport {
    /// Returns the assigned port, if any.
    pub fn port(&self) -> Option<u16> {
        match self {
            Rport::Assigned(port) => Some(*port),
            _ => None,
        }
    }

    /// Returns `true` unless the parameter is absent.
    pub fn is_present(&self) -> bool {
        !matches!(self, Rport::Unset)
    }
}

/// The `Via` SIP header.
///
/// Indicates the path taken by the request so far and the
/// path that should be followed in routing responses.
///
/// # Examples
/// ```
/// # use sipwire::headers::Via;
///
/// let input = "Via: SIP/2.0/UDP server10.biloxi.com;branch=z9hG4bKnashds8";
///
/// let via = Via::new_udp(
///     "server10.biloxi.com".parse().unwrap(),
///     Some("z9hG4bKnashds8"),
/// );
///
/// assert_eq!(input, via.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Via {
    transport: Protocol,
    sent_by: HostPort,
    ttl: Option<ArcStr>,
    maddr: Option<Host>,
    received: Option<IpAddr>,
    branch: Option<ArcStr>,
    rport: Rport,
    comment: Option<ArcStr>,
    params: Option<Params>,
}

impl Via {
    /// Creates a new `Via` header for the given transport and sent-by
    /// address.
    pub fn new(transport: Protocol, sent_by: HostPort, branch: Option<&str>) -> Self {
        Self {
            transport,
            sent_by,
            branch: branch.map(|b| b.into()),
            ..Default::default()
        }
    }

    /// Creates a new `Via` header with UDP transport and optional branch.
    pub fn new_udp(sent_by: HostPort, branch: Option<&str>) -> Self {
        Self::new(Protocol::Udp, sent_by, branch)
    }

    /// Set the `received` parameter.
    pub fn set_received(&mut self, received: IpAddr) {
        self.received = Some(received);
    }

    /// Returns the `received` parameter.
    pub fn received(&self) -> Option<IpAddr> {
        self.received
    }

    /// Returns the `transport`.
    pub fn transport(&self) -> Protocol {
        self.transport
    }

    /// Returns the `rport` parameter.
    pub fn rport(&self) -> Rport {
        self.rport
    }

    /// Set the `rport` parameter.
    pub fn set_rport(&mut self, rport: Rport) {
        self.rport = rport;
    }

    /// Set the sent_by field.
    pub fn set_sent_by(&mut self, sent_by: HostPort) {
        self.sent_by = sent_by;
    }

    /// Returns the branch parameter.
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Returns the sent_by field.
    pub fn sent_by(&self) -> &HostPort {
        &self.sent_by
    }

    /// Returns the `maddr` parameter.
    pub fn maddr(&self) -> &Option<Host> {
        &self.maddr
    }

    /// The endpoint a response to this hop should be sent to.
    ///
    /// Prefers `received` and `rport` over the sent-by address, the
    /// symmetric-response rules of RFC 3581.
    pub fn response_target(&self) -> EndPoint {
        let host = match self.received {
            Some(ip) => Host::IpAddr(ip),
            None => self.sent_by.host.clone(),
        };
        let port = self
            .rport
            .port()
            .or(self.sent_by.port)
            .unwrap_or_else(|| self.transport.default_port());

        EndPoint::new(host, port, self.transport)
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}/{} {}", Via::NAME, SIPV2, self.transport, self.sent_by)?;

        match self.rport {
            Rport::Unset => {}
            Rport::Requested => write!(f, ";rport")?,
            Rport::Assigned(port) => write!(f, ";rport={}", port)?,
        }
        if let Some(received) = &self.received {
            write!(f, ";received={received}")?;
        }
        if let Some(ttl) = &self.ttl {
            write!(f, ";ttl={ttl}")?;
        }
        if let Some(maddr) = &self.maddr {
            write!(f, ";maddr={maddr}")?;
        }
        if let Some(branch) = &self.branch {
            write!(f, ";branch={branch}")?;
        }
        if let Some(params) = &self.params {
            write!(f, "{params}")?;
        }
        if let Some(comment) = &self.comment {
            write!(f, " ({comment})")?;
        }

        Ok(())
    }
}

impl HeaderParse for Via {
    const NAME: &'static str = "Via";
    const SHORT_NAME: Option<&'static str> = Some("v");
    /*
     * Via               =  ( "Via" / "v" ) HCOLON via-parm *(COMMA via-parm)
     * via-parm          =  sent-protocol LWS sent-by *( SEMI via-params )
     * via-params        =  via-ttl / via-maddr
     *                      / via-received / via-branch
     *                      / via-extension
     * via-ttl           =  "ttl" EQUAL ttl
     * via-maddr         =  "maddr" EQUAL host
     * via-received      =  "received" EQUAL (IPv4address / IPv6address)
     * via-branch        =  "branch" EQUAL token
     * via-extension     =  generic-param
     * sent-protocol     =  protocol-name SLASH protocol-version
     *                      SLASH transport
     * protocol-name     =  "SIP" / token
     * protocol-version  =  token
     * transport         =  "UDP" / "TCP" / "TLS" / "SCTP"
     *                      / other-transport
     * sent-by           =  host [ COLON port ]
     * ttl               =  1*3DIGIT ; 0 to 255
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        parser.parse_sip_v2()?;
        parser.must_read(b'/')?;

        let transport = Protocol::from(parser.parse_token()?);
        parser.space();

        let sent_by = parser.parse_host_port()?;
        let mut branch = None;
        let mut ttl = None;
        let mut maddr: Option<ArcStr> = None;
        let mut received: Option<ArcStr> = None;
        let mut rport_p: Option<ArcStr> = None;
        let params = parse_param!(
            parser,
            Parser::parse_via_param,
            BRANCH_PARAM = branch,
            TTL_PARAM = ttl,
            MADDR_PARAM = maddr,
            RECEIVED_PARAM = received,
            RPORT_PARAM = rport_p
        );
        let received = received.and_then(|r| r.parse().ok());
        let maddr = maddr.map(|a| match a.parse() {
            Ok(addr) => Host::IpAddr(addr),
            Err(_) => Host::DomainName(a),
        });

        let rport = match rport_p.as_deref() {
            None => Rport::Unset,
            Some("") => Rport::Requested,
            Some(port) => match port.parse() {
                Ok(port) => Rport::Assigned(port),
                Err(_) => {
                    return Err(SipParserError::from("Via param rport is invalid!").into());
                }
            },
        };

        let comment = if parser.peek_byte() == Some(b'(') {
            let _ = parser.next_byte();
            let comment = parser.read_until(b')');
            let _ = parser.next_byte();
            Some(str::from_utf8(comment)?.into())
        } else {
            None
        };

        Ok(Via {
            transport,
            sent_by,
            params,
            comment,
            ttl,
            maddr,
            received,
            branch,
            rport,
        })
    }
}
