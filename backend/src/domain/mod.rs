//! # Domain Module
//!
//! Business rules of the sync core, independent of how data is stored.
//!
//! - [`fallback`] decides for every operation whether the remote or the local
//!   store serves it.
//! - The `*_repository` facades are the only entry points the UI layer uses;
//!   each owns a change feed ([`events`]).
//! - [`sync_queue`] replays writes that missed the remote store.
//! - [`allowance_scheduler`] credits the weekly allowance on app open.

pub mod allowance_scheduler;
pub mod auth_repository;
pub mod clock;
pub mod connectivity;
pub mod events;
pub mod fallback;
pub mod invitation_service;
pub mod kids_repository;
pub mod merge;
pub mod prefs_repository;
pub mod rewards_repository;
pub mod sync_queue;
pub mod transactions_repository;
pub mod validation;

pub use allowance_scheduler::{is_due, AllowanceScheduler, ALLOWANCE_INTERVAL_SECS};
pub use auth_repository::AuthRepository;
pub use clock::{Clock, FixedClock, SystemClock};
pub use connectivity::{ConnectivityMonitor, NetworkStatus};
pub use events::{ChangeFeed, KidEvent, PrefsEvent, RewardEvent, SessionEvent, TxEvent};
pub use fallback::{FallbackExecutor, FallbackResult, Source};
pub use invitation_service::InvitationService;
pub use kids_repository::KidsRepository;
pub use merge::{merge_by_id, Identified};
pub use prefs_repository::PrefsRepository;
pub use rewards_repository::RewardsRepository;
pub use sync_queue::{SyncQueueProcessor, SyncReport};
pub use transactions_repository::TransactionsRepository;
pub use validation::ValidationError;
