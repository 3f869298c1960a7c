//! REST side of the PBFT trade client
//!
//! Provides:
//! - Session context holding the identity, optionally persisted with sled
//! - HTTP client with a single identity-injection point
//! - Snapshot fetcher for balance, trade history and consensus state
//! - Account and trading actions (login, register, deposit, trade)

pub mod client;
pub mod error;
pub mod fetcher;
pub mod methods;
pub mod persistence;
pub mod session;

pub use client::{ApiClient, ApiConfig};
pub use error::ApiError;
pub use fetcher::SnapshotFetcher;
pub use methods::{Ack, OrderSide};
pub use persistence::IdentityStore;
pub use session::Session;
