//! Google Sheets v4 REST client.
//!
//! Just enough of the API for a scrape run: reading whole columns of the
//! source worksheet and writing batches of row ranges to the destination.
//! Authentication is either a static bearer token or a service-account key
//! exchanged for short-lived access tokens ([`auth`]).

pub mod a1;
pub mod auth;
mod client;

pub use auth::{ServiceAccountAuth, ServiceAccountKey, TokenSource};
pub use client::{SheetsClient, DEFAULT_BASE_URL};
