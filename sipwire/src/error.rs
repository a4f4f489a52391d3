use std::fmt;
use std::str::Utf8Error;

use thiserror::Error;

use crate::cert::CertErrorInfo;
use crate::endpoint::{EndPoint, Protocol};
use crate::ArcStr;

pub type Result<T> = std::result::Result<T, Error>;

/// Error on parsing
#[derive(Debug, PartialEq, Eq, Error)]
pub struct SipParserError {
    /// Message in error
    pub message: String,
}

impl fmt::Display for SipParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[allow(missing_docs)]
impl SipParserError {
    pub fn new<T>(s: T) -> Self
    where
        T: AsRef<str>,
    {
        Self {
            message: s.as_ref().to_string(),
        }
    }
}

impl std::convert::From<&str> for SipParserError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::convert::From<String> for SipParserError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::convert::From<Utf8Error> for SipParserError {
    fn from(value: Utf8Error) -> Self {
        SipParserError {
            message: format!("{:#?}", value),
        }
    }
}

impl std::convert::From<util::scanner::Error> for SipParserError {
    fn from(err: util::scanner::Error) -> Self {
        SipParserError {
            message: format!(
                "Failed to parse at line:{} column:{} kind:{:?}",
                err.line, err.col, err.kind,
            ),
        }
    }
}

impl std::convert::From<util::scanner::Error> for Error {
    fn from(err: util::scanner::Error) -> Self {
        Self::ParseError(err.into())
    }
}

impl std::convert::From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::ParseError(value.into())
    }
}

impl From<std::fmt::Error> for Error {
    fn from(value: std::fmt::Error) -> Self {
        Self::FmtError(value)
    }
}

/// The error type of this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ParseError(#[from] SipParserError),

    #[error("Message of {0} bytes exceeds the maximum message size")]
    MessageTooBig(usize),

    #[error("Missing required '{0}' header")]
    MissingRequiredHeader(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Event channel closed")]
    EventQueueClosed,

    #[error("Channel to '{0}' is closed")]
    ChannelClosed(EndPoint),

    #[error("No channel factory registered for '{0}'")]
    NoChannelFactory(Protocol),

    #[error("No active channel for '{0}'")]
    NoActiveChannel(EndPoint),

    #[error("Alias '{alias}' does not share the protocol of '{target}'")]
    AliasProtocolMismatch {
        target: EndPoint,
        alias: EndPoint,
    },

    #[error("Connect to '{endpoint}' failed: {reason}")]
    ConnectFailed {
        endpoint: EndPoint,
        reason: String,
    },

    #[error("Peer certificate verification failed: {}", .0.reason)]
    PeerCertificate(CertErrorInfo),

    #[error("Peer certificate rejected (fatal: {fatal})")]
    CertificateRejected {
        fatal: bool,
    },

    #[error("Unsupported authentication scheme '{0}'")]
    UnsupportedAuthScheme(ArcStr),

    #[error("Credentials refused: {0}")]
    CredentialsRejected(String),

    #[error("Fmt Error")]
    FmtError(std::fmt::Error),
}
