//! Small shared helpers: bounded retries and IPv4 address handling.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod addr;
pub mod retry;

pub use addr::{AddrError, ip_to_u32, parse_ipv4, strip_address_decorations};
pub use retry::{RetryPolicy, retry, retry_when};
