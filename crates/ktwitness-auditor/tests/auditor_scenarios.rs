//! End-to-end audit loop scenarios against in-memory doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use ktwitness_auditor::{
    AuditPage, Auditor, AuditorKeys, Error, InMemoryStateRepository, KeyTransparencyClient,
    ManualClock, StateRepository,
};
use ktwitness_core::{
    tree_head_payload, AuditorProof, AuditorState, AuditorStateAndSignature, AuditorTreeHead,
    AuditorUpdate, CondensedLogTree, CondensedPrefixTree, Error as CoreError, SigningKey,
};

const INDEX: [u8; 32] = [0xAB; 32];
const SEED: [u8; 16] = [0xCD; 16];

const FIVE_MINUTES_MS: i64 = 300_000;

/// A client double that serves a fixed update log and records tree heads.
struct ScriptedClient {
    updates: Vec<AuditorUpdate>,
    heads: Mutex<Vec<AuditorTreeHead>>,
    audit_calls: AtomicUsize,
    fail_set_head: AtomicBool,
}

impl ScriptedClient {
    fn new(updates: Vec<AuditorUpdate>) -> Arc<Self> {
        Arc::new(Self {
            updates,
            heads: Mutex::new(Vec::new()),
            audit_calls: AtomicUsize::new(0),
            fail_set_head: AtomicBool::new(false),
        })
    }

    async fn heads(&self) -> Vec<AuditorTreeHead> {
        self.heads.lock().await.clone()
    }
}

#[async_trait]
impl KeyTransparencyClient for ScriptedClient {
    async fn audit(&self, start: u64, limit: u64) -> Result<AuditPage, Error> {
        self.audit_calls.fetch_add(1, Ordering::SeqCst);
        let start = start as usize;
        let end = (start + limit as usize).min(self.updates.len());
        let updates = self
            .updates
            .get(start..end)
            .map(<[AuditorUpdate]>::to_vec)
            .unwrap_or_default();
        Ok(AuditPage {
            updates,
            more: end < self.updates.len(),
        })
    }

    async fn set_auditor_head(&self, tree_head: AuditorTreeHead) -> Result<(), Error> {
        if self.fail_set_head.load(Ordering::SeqCst) {
            return Err(Error::transport("injected set_auditor_head failure"));
        }
        self.heads.lock().await.push(tree_head);
        Ok(())
    }
}

fn test_keys() -> AuditorKeys {
    let private_key = SigningKey::from_bytes([1u8; 32]);
    AuditorKeys {
        public_key: private_key.verifying_key(),
        private_key,
        kt_signing_public_key: SigningKey::from_bytes([2u8; 32]).verifying_key(),
        kt_vrf_public_key: SigningKey::from_bytes([3u8; 32]).verifying_key(),
    }
}

/// A valid update sequence: one `NewTree`, then repeated `SameKey` updates
/// to the same key. Reusing the seed keeps every proof verifiable without
/// any copath material.
fn update_chain(len: usize) -> Vec<AuditorUpdate> {
    (0..len)
        .map(|i| AuditorUpdate {
            real: true,
            commitment_index: INDEX,
            stand_in_seed: SEED,
            commitment: [i as u8; 32],
            proof: if i == 0 {
                AuditorProof::NewTree
            } else {
                AuditorProof::SameKey {
                    counter: i as u32 - 1,
                    first_log_position: 0,
                    copath: Vec::new(),
                }
            },
        })
        .collect()
}

/// Replay `updates` through the core trees to get the expected roots.
fn expected_roots(updates: &[AuditorUpdate]) -> ([u8; 32], [u8; 32]) {
    let mut prefix_tree = CondensedPrefixTree::new();
    let mut log_tree = CondensedLogTree::new();
    for (i, update) in updates.iter().enumerate() {
        prefix_tree.apply_update(update, i as u64).unwrap();
        log_tree.append_leaf(
            &update.commitment,
            &prefix_tree.root_hash().unwrap(),
            i as u64,
        );
    }
    (
        prefix_tree.root_hash().unwrap(),
        log_tree.root_hash().unwrap(),
    )
}

fn new_auditor(
    client: Arc<ScriptedClient>,
    repository: Arc<InMemoryStateRepository>,
    clock: ManualClock,
    batch_size: u64,
    signature_interval: Duration,
    signature_page_size: u64,
) -> Auditor<Arc<ScriptedClient>, Arc<InMemoryStateRepository>, ManualClock> {
    Auditor::new(
        client,
        repository,
        clock,
        test_keys(),
        batch_size,
        signature_interval,
        signature_page_size,
    )
}

#[tokio::test]
async fn signing_thresholds_count_heads() {
    for (update_count, expected_heads) in [(1usize, 0usize), (3, 1), (10, 3)] {
        let client = ScriptedClient::new(update_chain(update_count));
        let repository = Arc::new(InMemoryStateRepository::new());
        let clock = ManualClock::new(0);
        let auditor = new_auditor(
            Arc::clone(&client),
            repository,
            clock.clone(),
            100,
            Duration::from_millis(FIVE_MINUTES_MS as u64),
            3,
        );

        auditor.load_stored_state().await.unwrap();
        auditor.tick().await.unwrap();
        assert_eq!(
            client.heads().await.len(),
            expected_heads,
            "{update_count} updates should produce {expected_heads} heads"
        );

        // Advancing past the signature interval with no new updates still
        // produces exactly one more head.
        clock.advance(FIVE_MINUTES_MS);
        auditor.tick().await.unwrap();
        assert_eq!(client.heads().await.len(), expected_heads + 1);
    }
}

#[tokio::test]
async fn tree_head_signature_verifies_over_replayed_root() {
    let updates = update_chain(3);
    let client = ScriptedClient::new(updates.clone());
    let repository = Arc::new(InMemoryStateRepository::new());
    let clock = ManualClock::new(1_700_000_000_000);
    let auditor = new_auditor(
        Arc::clone(&client),
        repository,
        clock,
        100,
        Duration::from_secs(3600),
        3,
    );

    auditor.load_stored_state().await.unwrap();
    auditor.tick().await.unwrap();

    let heads = client.heads().await;
    assert_eq!(heads.len(), 1);
    let head = &heads[0];
    assert_eq!(head.tree_size, 3);
    assert_eq!(head.timestamp_ms, 1_700_000_000_000);

    let keys = test_keys();
    let (_, log_root) = expected_roots(&updates);
    let payload = tree_head_payload(
        &keys.kt_signing_public_key,
        &keys.kt_vrf_public_key,
        &keys.public_key,
        head.tree_size,
        head.timestamp_ms,
        &log_root,
    );
    keys.public_key
        .verify(&payload, &head.signature)
        .expect("tree head signature should verify over the replayed log root");
}

#[tokio::test]
async fn pages_are_fetched_transparently() {
    let client = ScriptedClient::new(update_chain(10));
    let repository = Arc::new(InMemoryStateRepository::new());
    let auditor = new_auditor(
        Arc::clone(&client),
        repository,
        ManualClock::new(0),
        4,
        Duration::from_secs(3600),
        1_000_000,
    );

    auditor.load_stored_state().await.unwrap();
    auditor.tick().await.unwrap();

    // Pages of 4, 4, and 2; the final page clears the `more` flag.
    assert_eq!(client.audit_calls.load(Ordering::SeqCst), 3);
    assert_eq!(auditor.stats().await.updates_processed, 10);
}

#[tokio::test]
async fn state_is_persisted_only_after_accepted_head() {
    let client = ScriptedClient::new(update_chain(3));
    let repository = Arc::new(InMemoryStateRepository::new());
    let auditor = new_auditor(
        Arc::clone(&client),
        Arc::clone(&repository),
        ManualClock::new(0),
        100,
        Duration::from_secs(3600),
        3,
    );
    auditor.load_stored_state().await.unwrap();

    // Transmission fails: no head recorded, nothing persisted, and the
    // error is retriable.
    client.fail_set_head.store(true, Ordering::SeqCst);
    let err = auditor.tick().await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(client.heads().await.is_empty());
    assert_eq!(repository.get().await.unwrap(), None);

    // The threshold is still crossed, so the next tick retries and the
    // state lands in the repository.
    client.fail_set_head.store(false, Ordering::SeqCst);
    auditor.tick().await.unwrap();

    let heads = client.heads().await;
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].tree_size, 3);

    let blob = repository.get().await.unwrap().expect("state persisted");
    let stored = AuditorStateAndSignature::decode(&blob).unwrap();
    let state = stored.verify_and_decode(&test_keys().public_key).unwrap();

    let updates = update_chain(3);
    let (prefix_root, _) = expected_roots(&updates);
    assert_eq!(state.total_updates_processed, 3);
    assert_eq!(state.current_prefix_tree_root_hash, prefix_root);

    let restored = CondensedLogTree::from_nodes(state.log_tree_nodes, 3);
    assert_eq!(restored.root_hash(), Some(expected_roots(&updates).1));
}

#[tokio::test]
async fn restart_resumes_from_persisted_state() {
    let updates = update_chain(3);
    let repository = Arc::new(InMemoryStateRepository::new());
    let clock = ManualClock::new(0);

    // First life: a head (and snapshot) lands after the second update; the
    // third is applied in memory only.
    let client = ScriptedClient::new(updates.clone());
    let auditor = new_auditor(
        Arc::clone(&client),
        Arc::clone(&repository),
        clock.clone(),
        100,
        Duration::from_secs(3600),
        2,
    );
    auditor.load_stored_state().await.unwrap();
    auditor.tick().await.unwrap();
    assert_eq!(client.heads().await.last().unwrap().tree_size, 2);

    // Second life: resumes from the snapshot at index 2 and re-applies the
    // third update.
    let client = ScriptedClient::new(updates.clone());
    let auditor = new_auditor(
        Arc::clone(&client),
        Arc::clone(&repository),
        clock.clone(),
        100,
        Duration::from_secs(3600),
        1_000_000,
    );
    assert!(!auditor.is_ready());
    auditor.load_stored_state().await.unwrap();
    assert!(auditor.is_ready());

    auditor.tick().await.unwrap();
    assert_eq!(auditor.stats().await.updates_processed, 1);

    clock.advance(3_600_000);
    auditor.tick().await.unwrap();

    let heads = client.heads().await;
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].tree_size, 3);
}

#[tokio::test]
async fn invalid_proof_halts_the_auditor() {
    let mut updates = update_chain(3);
    updates[2].proof = AuditorProof::SameKey {
        counter: 7,
        first_log_position: 0,
        copath: Vec::new(),
    };

    let client = ScriptedClient::new(updates);
    let repository = Arc::new(InMemoryStateRepository::new());
    let auditor = new_auditor(
        Arc::clone(&client),
        Arc::clone(&repository),
        ManualClock::new(0),
        100,
        Duration::from_secs(3600),
        1_000_000,
    );
    auditor.load_stored_state().await.unwrap();
    assert!(auditor.is_healthy());

    let err = auditor.tick().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::Core(CoreError::InvalidProof(_))));
    assert!(!auditor.is_healthy());
    assert!(client.heads().await.is_empty());
    assert_eq!(repository.get().await.unwrap(), None);

    // A retry re-encounters the same update and halts again.
    let err = auditor.tick().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(client.heads().await.is_empty());
}

#[tokio::test]
async fn tampered_persisted_state_aborts_startup() {
    let updates = update_chain(1);
    let (prefix_root, _) = expected_roots(&updates);
    let keys = test_keys();

    let state = AuditorState {
        total_updates_processed: 1,
        current_prefix_tree_root_hash: prefix_root,
        log_tree_nodes: vec![ktwitness_core::LogTreeNode {
            id: 0,
            hash: [0x77; 32],
        }],
    };
    let mut sealed = AuditorStateAndSignature::seal(&state, &keys.private_key).unwrap();
    sealed.serialized_auditor_state[0] ^= 0x01;

    let repository = Arc::new(InMemoryStateRepository::new());
    repository.put(&sealed.encode().unwrap()).await.unwrap();

    let client = ScriptedClient::new(updates);
    let auditor = new_auditor(
        client,
        Arc::clone(&repository),
        ManualClock::new(0),
        100,
        Duration::from_secs(3600),
        1_000_000,
    );

    let err = auditor.load_stored_state().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(CoreError::InvalidAuditorSignature)
    ));
    assert!(!auditor.is_ready());
}
