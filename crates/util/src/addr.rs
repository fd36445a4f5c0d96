//! IPv4 parsing and ordering helpers.

use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing addresses.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddrError {
    /// The string is not a dotted-quad IPv4 address.
    #[error("invalid IPv4 address: {0}")]
    InvalidIpv4(String),
}

/// Removes an appliance route-domain suffix (`%N`) and any mask (`/N`).
///
/// ```
/// use halyard_util::strip_address_decorations;
///
/// assert_eq!(strip_address_decorations("10.0.2.5%1/32"), "10.0.2.5");
/// assert_eq!(strip_address_decorations("10.0.2.5"), "10.0.2.5");
/// ```
#[must_use]
pub fn strip_address_decorations(address: &str) -> &str {
    let end = address.find(['%', '/']).unwrap_or(address.len());
    address[..end].trim()
}

/// Parses an IPv4 address, ignoring route-domain and mask decorations.
///
/// # Errors
///
/// Returns `AddrError::InvalidIpv4` when the address does not parse.
pub fn parse_ipv4(address: &str) -> Result<Ipv4Addr, AddrError> {
    Ipv4Addr::from_str(strip_address_decorations(address))
        .map_err(|_| AddrError::InvalidIpv4(address.to_string()))
}

/// Converts an IPv4 address to its 32-bit integer form for numeric ordering.
///
/// # Errors
///
/// Returns `AddrError::InvalidIpv4` when the address does not parse.
pub fn ip_to_u32(address: &str) -> Result<u32, AddrError> {
    parse_ipv4(address).map(u32::from)
}
