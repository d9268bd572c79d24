//! # Storage Module
//!
//! Handles all data persistence for the finedu sync core.
//!
//! Two independent copies of every entity exist:
//!
//! - **Local**: a key-value namespace on disk ([`local::LocalConnection`]),
//!   one JSON document per key, holding cached entities, preferences, the
//!   signed-in identity pointer and the pending sync queue.
//! - **Remote**: a hosted Postgres behind Supabase, reached through the
//!   [`traits::RemoteStore`] and [`traits::RemoteAuth`] abstractions and
//!   implemented over HTTP by [`remote::SupabaseClient`].
//!
//! Row translation between those two formats and the canonical domain types
//! in `shared` lives in [`mappers`]; nothing outside this module sees either
//! storage format. Reconciling the two copies is the job of the repository
//! facades in the domain layer.

pub mod local;
pub mod mappers;
pub mod remote;
pub mod traits;

#[cfg(test)]
pub mod test_utils;

pub use local::LocalConnection;
pub use remote::{DisabledRemote, SupabaseClient};
pub use traits::{AuthUser, Filter, Query, RemoteAuth, RemoteError, RemoteStore};
