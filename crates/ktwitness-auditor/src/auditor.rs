//! The audit loop
//!
//! Fetches and processes batches of updates from the key transparency
//! service and periodically sends back signed tree heads. If an update is
//! inconsistent with the auditor's view of either tree, the auditor stops
//! countersigning until an operator intervenes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use ktwitness_core::{
    sign_tree_head, AuditorState, AuditorStateAndSignature, AuditorTreeHead, AuditorUpdate,
    CondensedLogTree, CondensedPrefixTree,
};

use crate::client::KeyTransparencyClient;
use crate::clock::Clock;
use crate::config::AuditorKeys;
use crate::error::Result;
use crate::storage::StateRepository;

/// Counters describing the loop's work so far.
#[derive(Debug, Clone, Default)]
pub struct AuditorStats {
    pub updates_processed: u64,
    pub tree_heads_sent: u64,
    pub state_loads: u64,
    pub state_stores: u64,
    pub ticks_skipped: u64,
}

/// Tree state owned exclusively by the locked region of a tick.
struct TreeState {
    prefix_tree: CondensedPrefixTree,
    log_tree: CondensedLogTree,
    total_updates_processed: u64,
    updates_since_last_head: u64,
    last_head_sent_at_ms: i64,
}

/// The third-party auditor service.
pub struct Auditor<C, R, K> {
    client: C,
    repository: R,
    clock: K,
    keys: AuditorKeys,
    batch_size: u64,
    signature_interval_ms: i64,
    signature_page_size: u64,
    trees: Mutex<TreeState>,
    ready: AtomicBool,
    halted: AtomicBool,
    stats: Mutex<AuditorStats>,
}

impl<C, R, K> Auditor<C, R, K>
where
    C: KeyTransparencyClient,
    R: StateRepository,
    K: Clock,
{
    pub fn new(
        client: C,
        repository: R,
        clock: K,
        keys: AuditorKeys,
        batch_size: u64,
        signature_interval: Duration,
        signature_page_size: u64,
    ) -> Self {
        let now_ms = clock.now_ms();
        Self {
            client,
            repository,
            clock,
            keys,
            batch_size,
            signature_interval_ms: signature_interval.as_millis() as i64,
            signature_page_size,
            trees: Mutex::new(TreeState {
                prefix_tree: CondensedPrefixTree::new(),
                log_tree: CondensedLogTree::new(),
                total_updates_processed: 0,
                updates_since_last_head: 0,
                last_head_sent_at_ms: now_ms,
            }),
            ready: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            stats: Mutex::new(AuditorStats::default()),
        }
    }

    /// Restore persisted state, if any.
    ///
    /// Holds the tree lock for the duration so a concurrently scheduled
    /// first tick skips itself instead of observing uninitialized trees.
    pub async fn load_stored_state(&self) -> Result<()> {
        let mut state = self.trees.lock().await;

        self.stats.lock().await.state_loads += 1;
        if let Some(blob) = self.repository.get().await? {
            let stored = AuditorStateAndSignature::decode(&blob)?;
            let auditor_state = stored.verify_and_decode(&self.keys.public_key)?;

            state.log_tree = CondensedLogTree::from_nodes(
                auditor_state.log_tree_nodes,
                auditor_state.total_updates_processed,
            );
            state.prefix_tree =
                CondensedPrefixTree::with_root(auditor_state.current_prefix_tree_root_hash);
            state.total_updates_processed = auditor_state.total_updates_processed;

            info!(
                total_updates_processed = state.total_updates_processed,
                "restored persisted auditor state"
            );
        } else {
            info!("no persisted auditor state; starting from an empty log");
        }

        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run the audit loop until a fatal error halts it.
    pub async fn run(&self, tick_interval: Duration) -> Result<()> {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "halting: no further tree heads will be signed");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "audit tick failed; retrying next tick"),
            }
        }
    }

    /// One pass over the available updates.
    ///
    /// Fetches pages starting at the current log position, applies each
    /// update to both trees in order, and signs a tree head whenever a
    /// threshold is crossed. Skips itself if the tree lock is held, which
    /// is expected only while startup overlaps the first scheduled fire.
    pub async fn tick(&self) -> Result<()> {
        let Ok(mut state) = self.trees.try_lock() else {
            warn!("tree state locked; skipping tick");
            self.stats.lock().await.ticks_skipped += 1;
            return Ok(());
        };
        let state = &mut *state;

        let mut processed_in_tick = 0u64;
        loop {
            let page = self
                .client
                .audit(state.total_updates_processed, self.batch_size)
                .await?;
            let page_len = page.updates.len();

            for update in page.updates {
                self.apply_update(state, &update).await?;
                processed_in_tick += 1;
            }

            if !page.more {
                break;
            }
            debug!(fetched = page_len, "fetching next update page");
        }

        debug!(processed = processed_in_tick, "processed update batch");

        // Even with no new updates, a tree head is still due once the
        // signature interval has elapsed.
        self.maybe_sign_and_persist(state).await
    }

    /// Apply a single update to both trees, then sign if a threshold has
    /// been crossed.
    async fn apply_update(&self, state: &mut TreeState, update: &AuditorUpdate) -> Result<()> {
        if let Err(e) = state
            .prefix_tree
            .apply_update(update, state.total_updates_processed)
        {
            self.halted.store(true, Ordering::SeqCst);
            error!(
                update = state.total_updates_processed,
                error = %e,
                "encountered invalid proof"
            );
            return Err(e.into());
        }

        let prefix_root = state
            .prefix_tree
            .root_hash()
            .expect("prefix tree has a root after an applied update");
        state
            .log_tree
            .append_leaf(&update.commitment, &prefix_root, state.total_updates_processed);

        state.total_updates_processed += 1;
        state.updates_since_last_head += 1;
        self.stats.lock().await.updates_processed += 1;

        self.maybe_sign_and_persist(state).await
    }

    /// Sign and transmit a tree head if a threshold has been crossed, then
    /// persist state.
    ///
    /// Persistence happens only after the service has accepted the head, so
    /// the stored state never outruns what the service has witnessed. The
    /// threshold markers are updated last: a failed transmission or a failed
    /// write leaves them untouched and the next crossing retries.
    async fn maybe_sign_and_persist(&self, state: &mut TreeState) -> Result<()> {
        let now_ms = self.clock.now_ms();
        if now_ms < state.last_head_sent_at_ms + self.signature_interval_ms
            && state.updates_since_last_head < self.signature_page_size
        {
            return Ok(());
        }

        let Some(log_tree_root_hash) = state.log_tree.root_hash() else {
            debug!("no log entries yet; nothing to attest");
            return Ok(());
        };
        let prefix_tree_root_hash = state
            .prefix_tree
            .root_hash()
            .expect("prefix tree has a root whenever the log tree is non-empty");

        let timestamp_ms = now_ms;
        let signature = sign_tree_head(
            &self.keys.kt_signing_public_key,
            &self.keys.kt_vrf_public_key,
            &self.keys.public_key,
            state.total_updates_processed,
            timestamp_ms,
            &log_tree_root_hash,
            &self.keys.private_key,
        );

        self.client
            .set_auditor_head(AuditorTreeHead {
                tree_size: state.total_updates_processed,
                timestamp_ms,
                signature,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "failed to send signed tree head");
                e
            })?;
        info!(
            tree_size = state.total_updates_processed,
            timestamp_ms, "sent signed tree head"
        );
        self.stats.lock().await.tree_heads_sent += 1;

        let auditor_state = AuditorState {
            total_updates_processed: state.total_updates_processed,
            current_prefix_tree_root_hash: prefix_tree_root_hash,
            log_tree_nodes: state.log_tree.nodes(),
        };
        let sealed = AuditorStateAndSignature::seal(&auditor_state, &self.keys.private_key)?;
        self.repository.put(&sealed.encode()?).await?;
        self.stats.lock().await.state_stores += 1;

        state.last_head_sent_at_ms = timestamp_ms;
        state.updates_since_last_head = 0;
        Ok(())
    }

    /// False once an invalid proof has halted attestation.
    pub fn is_healthy(&self) -> bool {
        !self.halted.load(Ordering::SeqCst)
    }

    /// True once startup has populated the trees.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> AuditorStats {
        self.stats.lock().await.clone()
    }
}
