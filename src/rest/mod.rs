//! REST API client for open order snapshots

pub mod client;
pub mod signing;

pub use client::{ExchangeRequestError, OrderSource, RestClient, DEFAULT_BASE_URL};
pub use signing::{Credentials, RequestSigner, SignedRequest};
