//! # Application Context
//!
//! Everything the UI layer needs, built once from [`AppConfig`] and passed
//! down explicitly. There is no global state: two contexts over two data
//! directories are fully independent.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use shared::Role;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::domain::{
    AllowanceScheduler, AuthRepository, Clock, ConnectivityMonitor, FallbackExecutor, InvitationService,
    KidsRepository, PrefsRepository, RewardsRepository, SyncQueueProcessor, SystemClock, TransactionsRepository,
};
use crate::storage::local::{
    LocalConnection, LocalKidRepository, LocalPrefsRepository, LocalQueueRepository, LocalRewardRepository,
    LocalTransactionRepository, LocalUserRepository,
};
use crate::storage::remote::{
    DisabledRemote, RemoteAuthRepository, RemoteKidRepository, RemotePrefsRepository, RemoteRewardRepository,
    RemoteTransactionRepository, SupabaseClient,
};
use crate::storage::traits::{RemoteAuth, RemoteStore};

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub connectivity: ConnectivityMonitor,
    pub executor: FallbackExecutor,
    pub kids: KidsRepository,
    pub transactions: TransactionsRepository,
    pub rewards: RewardsRepository,
    pub prefs: PrefsRepository,
    pub auth: AuthRepository,
    pub invitations: InvitationService,
    pub sync: SyncQueueProcessor,
    pub allowance: AllowanceScheduler,
}

/// Background tasks started by [`AppContext::bootstrap`].
pub struct BootstrapHandles {
    /// Drains the queue on every offline to online transition.
    pub reconnect: JoinHandle<()>,
    /// Startup drain plus, for a parent, the auto-allowance run. Resolves to
    /// the number of allowances credited.
    pub startup: JoinHandle<u32>,
}

impl AppContext {
    /// Build the context against the real local directory and, when
    /// credentials are configured, the hosted backend.
    pub fn new(config: AppConfig) -> Result<Self> {
        let connection = LocalConnection::new(&config.data_dir)
            .with_context(|| format!("Failed to open data directory {}", config.data_dir.display()))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let connectivity = ConnectivityMonitor::new(true);

        let context = match SupabaseClient::from_config(&config)? {
            Some(client) => {
                let client = Arc::new(client);
                Self::with_parts(config, connection, client.clone(), client, clock, connectivity)
            }
            None => {
                let disabled = Arc::new(DisabledRemote);
                Self::with_parts(config, connection, disabled.clone(), disabled, clock, connectivity)
            }
        };
        info!(
            "Context ready (mode: {}, remote configured: {})",
            context.config.backend_mode.as_str(),
            context.executor.remote_configured()
        );
        Ok(context)
    }

    /// Wire every component from explicit parts.
    pub fn with_parts(
        config: AppConfig,
        connection: LocalConnection,
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn RemoteAuth>,
        clock: Arc<dyn Clock>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let executor = FallbackExecutor::new(
            config.backend_mode,
            config.has_remote_credentials(),
            Arc::new(connectivity.clone()),
        );

        let local_kids = LocalKidRepository::new(connection.clone());
        let remote_kids = RemoteKidRepository::new(store.clone());
        let queue = LocalQueueRepository::new(connection.clone());

        let transactions = TransactionsRepository::new(
            executor.clone(),
            RemoteTransactionRepository::new(store.clone()),
            LocalTransactionRepository::new(connection.clone()),
            clock.clone(),
        );
        let kids = KidsRepository::new(
            executor.clone(),
            remote_kids.clone(),
            local_kids.clone(),
            queue.clone(),
            transactions.clone(),
            clock.clone(),
        );
        let rewards = RewardsRepository::new(
            executor.clone(),
            RemoteRewardRepository::new(store.clone()),
            LocalRewardRepository::new(connection.clone()),
            kids.clone(),
            clock.clone(),
        );
        let prefs = PrefsRepository::new(
            executor.clone(),
            RemotePrefsRepository::new(store.clone()),
            LocalPrefsRepository::new(connection.clone()),
            clock.clone(),
        );
        let auth = AuthRepository::new(
            executor.clone(),
            RemoteAuthRepository::new(auth, store.clone()),
            LocalUserRepository::new(connection),
            clock.clone(),
        );
        let invitations = InvitationService::new(executor.clone(), store, clock.clone(), config.app_origin.clone());
        let sync = SyncQueueProcessor::new(executor.clone(), queue, remote_kids, local_kids);
        let allowance = AllowanceScheduler::new(kids.clone(), clock);

        Self {
            config,
            connectivity,
            executor,
            kids,
            transactions,
            rewards,
            prefs,
            auth,
            invitations,
            sync,
            allowance,
        }
    }

    /// Start the background work of an app launch. Nothing here blocks the
    /// caller and nothing here fails: the queue is drained, and when a parent
    /// is signed in the weekly allowance runs and the queue is drained again.
    pub fn bootstrap(&self) -> BootstrapHandles {
        let reconnect = self.sync.spawn_reconnect_listener(&self.connectivity);

        let parent_id = match self.auth.active_user() {
            Ok(Some((user_id, Role::Parent))) => Some(user_id),
            Ok(_) => None,
            Err(e) => {
                warn!("Could not read the active user: {:#}", e);
                None
            }
        };

        let sync = self.sync.clone();
        let allowance = self.allowance.clone();
        let startup = tokio::spawn(async move {
            sync.process_queue().await;
            let Some(parent_id) = parent_id else {
                return 0;
            };
            let credited = allowance.auto_credit_on_app_open(&parent_id).await;
            sync.process_queue().await;
            credited
        });

        BootstrapHandles { reconnect, startup }
    }
}
