//! Helper crate to talk to Google Cloud from inside a VM: the instance
//! metadata server, OAuth access tokens, and an HTTP client that attaches
//! bearer tokens to every request.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod error;
mod server;
mod token;

pub use client::GoogleClient;
pub use error::{Error, Result};
pub use server::{MetadataClient, region_from_zone, zone_from_path};
pub use token::{AccessToken, MetadataTokenSource, StaticTokenSource, TokenSource};
