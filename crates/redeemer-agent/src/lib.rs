//! Control API for the redeemer session broker: a small HTTP surface
//! that starts/stops the automation session, reports its status, and
//! submits workflow requests.

pub mod server;
pub mod store;

pub use server::{router, serve, AppState};
pub use store::{AccountRecord, AccountStore, InMemoryAccountStore, IssuanceOutcome};
