//! Client for a share-based, yield-donating vault on an EVM chain.
//!
//! Mint a test stablecoin, deposit it for vault shares, simulate yield and
//! harvest profit above the watermark to the donation router. The library
//! keeps a polled view of the vault in sync with the chain and sequences
//! the writes; `yds-flow` is the command-line front end.

pub mod accounting;
pub mod config;
pub mod donation;
pub mod error;
pub mod ledger;
pub mod liveness;
pub mod model;
pub mod network;
pub mod orchestrator;
pub mod reader;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use error::{Result, VaultError};
pub use store::{ActiveView, VaultStore};
