//! # finedu backend
//!
//! Offline-first sync core for the finedu family allowance app.
//!
//! The crate is organised in layers, UI agnostic:
//! ```text
//! UI layer (external)
//!     ↓
//! AppContext (explicitly constructed, passed down)
//!     ↓
//! Domain: repository facades, fallback executor, sync queue, allowance scheduler
//!     ↓
//! Storage: local key-value store, remote (Supabase) adapter, row mappers
//! ```
//!
//! Every repository facade prefers the remote store and degrades to the local
//! cache when the remote store is unreachable, not configured, or disabled by
//! configuration. Balance and allowance writes that miss the remote store are
//! queued and replayed by the [`domain::SyncQueueProcessor`].

pub mod config;
pub mod context;
pub mod domain;
pub mod storage;

pub use config::{AppConfig, BackendMode, ConfigError};
pub use context::{AppContext, BootstrapHandles};
