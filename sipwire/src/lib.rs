//! # sipwire
//!
//! A rust library that implements the SIP transport and transaction
//! layers of RFC 3261.

pub mod auth;
pub mod cert;
pub mod channel;
pub mod endpoint;
pub mod headers;
pub mod message;
pub mod network;
pub mod parser;
pub mod transaction;

mod error;
pub(crate) mod macros;

pub use endpoint::{EndPoint, Protocol};
pub use error::{Error, Result, SipParserError};
pub use network::{NetworkDelegate, NetworkLayer};
pub use util::ArcStr;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

use std::net::SocketAddr;

/// The name a channel advertises for itself in `Via` and `Contact`.
pub(crate) fn get_local_name(addr: &SocketAddr) -> String {
    if !addr.ip().is_unspecified() {
        return addr.to_string();
    }

    // Bound to a wildcard; advertise an address peers can route to.
    let ip = local_ip_address::local_ip().unwrap_or(addr.ip());

    SocketAddr::new(ip, addr.port()).to_string()
}
