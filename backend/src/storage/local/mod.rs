//! # Local Storage Module
//!
//! File-backed key-value store standing in for the browser's local storage.
//!
//! ## Layout
//!
//! ```text
//! <data dir>/
//! ├── finedu_kids.json                 ← cached kids, all parents
//! ├── finedu_tx_<kidId>.json           ← per-kid ledger
//! ├── finedu_rewards_catalog.json
//! ├── finedu_rewards_redeemed_<kidId>.json
//! ├── finedu_prefs_<ownerId>.json
//! ├── finedu_queue.json                ← pending remote mutations
//! ├── finedu_users.json / finedu_session.json
//! └── finedu_active_uid.json / finedu_active_role.json
//! ```
//!
//! Every document is rewritten whole through a temp file and a rename.

pub mod connection;
pub mod keys;
pub mod kid_repository;
pub mod prefs_repository;
pub mod queue_repository;
pub mod reward_repository;
pub mod transaction_repository;
pub mod user_repository;

pub use connection::LocalConnection;
pub use kid_repository::LocalKidRepository;
pub use prefs_repository::LocalPrefsRepository;
pub use queue_repository::LocalQueueRepository;
pub use reward_repository::{default_catalog, LocalRewardRepository};
pub use transaction_repository::LocalTransactionRepository;
pub use user_repository::LocalUserRepository;
