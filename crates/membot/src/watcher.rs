//! Pool watcher: turns program log notifications into candidate mints.
//!
//! Candidates are extracted from the log text with a base58 regex and
//! enqueued before any HTTP call. Only when the logs surface nothing new is
//! the transaction fetched, on a spawned task, to look for the mint there.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use membot_chain::{LogNotification, LogsSubscriber, LogsSubscriberConfig, RpcClient, TransactionAccounts};
use membot_common::{Candidate, Commitment, TOKEN_PROGRAMS, is_well_known, unix_now};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::executor::short_error;

/// Base58 run long enough to be a public key.
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[1-9A-HJ-NP-Za-km-z]{32,44}").expect("address regex is valid"));

/// Substrings that mark a creation/initialization log batch.
const CREATION_MARKERS: [&str; 9] = [
    "Initialize", "initialize", "Create", "create", "Deploy", "deploy", "bonding", "Bonding", "DB",
];

/// Signature used for the forced startup mint.
pub const MANUAL_SIGNATURE: &str = "manual";

/// Default bound on remembered mints.
const SEEN_CAPACITY: usize = 50_000;

/// True for a creation event of the launchpad program.
///
/// Some RPCs omit the program id; in that case the markers alone decide,
/// but only when the launchpad is the single watched program.
pub fn is_creation_event(program_id: Option<&str>, logs: &[String], pumpfun: &str, watched: &[String]) -> bool {
    let has_marker = logs
        .iter()
        .any(|line| CREATION_MARKERS.iter().any(|m| line.contains(m)));

    match program_id {
        Some(program) => program == pumpfun && has_marker,
        None => watched.len() == 1 && watched[0] == pumpfun && has_marker,
    }
}

/// Addresses never treated as candidates.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    extra: HashSet<String>,
}

impl SkipList {
    /// Well-known addresses plus the given program ids.
    pub fn new<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extra: programs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        is_well_known(address) || self.extra.contains(address)
    }
}

/// All base58 addresses in `logs`, in order, minus skipped ones.
pub fn extract_candidates(logs: &[String], skip: &SkipList) -> Vec<String> {
    logs.iter()
        .flat_map(|line| ADDRESS_RE.find_iter(line))
        .map(|m| m.as_str())
        .filter(|addr| !skip.contains(addr))
        .map(str::to_string)
        .collect()
}

/// Mint recovered from a fetched transaction.
///
/// The first account of the first token-program instruction, else the first
/// key that is not a token program.
pub fn mint_from_transaction(tx: &TransactionAccounts) -> Option<String> {
    let keys = &tx.account_keys;
    let is_token_program = |key: &str| TOKEN_PROGRAMS.contains(&key);

    for ix in &tx.instructions {
        let Some(program) = keys.get(ix.program_id_index) else {
            continue;
        };
        if is_token_program(program.as_str())
            && let Some(mint) = ix.accounts.first().and_then(|&i| keys.get(i))
        {
            return Some(mint.clone());
        }
    }

    keys.iter().find(|k| !is_token_program(k.as_str())).cloned()
}

/// Insertion-ordered set with a size bound; the oldest entries are evicted.
#[derive(Debug)]
pub struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Insert `key`; false if it was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.members.contains(key) {
            return false;
        }
        if self.order.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.members.remove(&oldest);
        }
        self.order.push_back(key.to_string());
        self.members.insert(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(SEEN_CAPACITY)
    }
}

/// Configuration for the pool watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub ws_url: String,
    pub pumpfun_program_id: String,
    pub watch_program_ids: Vec<String>,
    pub force_token_mint: Option<String>,
    pub ping_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl WatcherConfig {
    pub fn from_network(network: &crate::config::NetworkConfig) -> Self {
        Self {
            ws_url: network.ws_url.clone(),
            pumpfun_program_id: network.pumpfun_program_id.clone(),
            watch_program_ids: network.watch_program_ids.clone(),
            force_token_mint: network.force_token_mint.clone(),
            ping_interval: network.ws_ping_interval,
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// Streams candidate mints into the coordinator's queue.
pub struct PoolWatcher {
    config: WatcherConfig,
    rpc: Arc<RpcClient>,
    skip: Arc<SkipList>,
    seen: Arc<Mutex<SeenSet>>,
    out: mpsc::Sender<Candidate>,
}

impl PoolWatcher {
    pub fn new(config: WatcherConfig, rpc: Arc<RpcClient>, out: mpsc::Sender<Candidate>) -> Self {
        let skip = SkipList::new(config.watch_program_ids.iter().cloned());
        Self {
            config,
            rpc,
            skip: Arc::new(skip),
            seen: Arc::new(Mutex::new(SeenSet::default())),
            out,
        }
    }

    /// Run until shutdown or until the candidate receiver is dropped.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if let Some(mint) = self.config.force_token_mint.clone() {
            info!("Forced token injection: {mint}");
            self.seen.lock().insert(&mint);
            let candidate = Candidate::new(MANUAL_SIGNATURE, mint, unix_now(), 0);
            if self.out.send(candidate).await.is_err() {
                return;
            }
        }

        if self.config.watch_program_ids.is_empty() {
            warn!("No program IDs configured; nothing to watch");
            return;
        }

        let (log_tx, mut log_rx) = mpsc::channel::<LogNotification>(1024);
        let subscriber = LogsSubscriber::new(
            LogsSubscriberConfig {
                ws_url: self.config.ws_url.clone(),
                programs: self.config.watch_program_ids.clone(),
                commitment: Commitment::Processed,
                ping_interval: self.config.ping_interval,
                ..Default::default()
            },
            log_tx,
        );
        let sub_shutdown = shutdown.resubscribe();
        let sub_handle = tokio::spawn(async move {
            if let Err(e) = subscriber.run(sub_shutdown).await {
                warn!("Log subscriber stopped: {e}");
            }
        });

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                note = log_rx.recv() => {
                    let Some(note) = note else { break };
                    if !self.handle_notification(note).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    debug!("Watcher heartbeat: connected and listening");
                }
                _ = shutdown.recv() => break,
            }
        }

        sub_handle.abort();
        info!("Pool watcher stopped");
    }

    /// Returns false once the candidate channel is closed.
    async fn handle_notification(&self, note: LogNotification) -> bool {
        if note.signature.is_empty() || note.logs.is_empty() {
            return true;
        }
        if !is_creation_event(
            note.program_id.as_deref(),
            &note.logs,
            &self.config.pumpfun_program_id,
            &self.config.watch_program_ids,
        ) {
            return true;
        }

        let received = std::time::Instant::now();
        debug!(
            "WS msg: slot={} sig={} logs={}",
            note.slot,
            short_sig(&note.signature),
            note.logs.len()
        );

        let mut enqueued = 0usize;
        for mint in extract_candidates(&note.logs, &self.skip) {
            if !self.seen.lock().insert(&mint) {
                continue;
            }
            let candidate = Candidate::new(note.signature.clone(), mint.clone(), unix_now(), note.slot);
            if self.out.send(candidate).await.is_err() {
                return false;
            }
            enqueued += 1;
            if enqueued == 1 {
                info!(
                    "Queued mint fast: {mint} | slot={} | ws->enqueue {:.1} ms",
                    note.slot,
                    received.elapsed().as_secs_f64() * 1000.0
                );
            } else {
                debug!("Queued extra candidate: {mint} | slot={}", note.slot);
            }
        }

        if enqueued == 0 {
            debug!("Scheduling tx fallback for sig {}", short_sig(&note.signature));
            let rpc = Arc::clone(&self.rpc);
            let skip = Arc::clone(&self.skip);
            let seen = Arc::clone(&self.seen);
            let out = self.out.clone();
            tokio::spawn(tx_fallback(rpc, skip, seen, out, note.signature, note.slot));
        }
        true
    }
}

async fn tx_fallback(
    rpc: Arc<RpcClient>,
    skip: Arc<SkipList>,
    seen: Arc<Mutex<SeenSet>>,
    out: mpsc::Sender<Candidate>,
    signature: String,
    slot: u64,
) {
    let tx = match rpc.get_transaction_accounts(&signature).await {
        Ok(Some(tx)) => tx,
        Ok(None) => return,
        Err(e) => {
            debug!("Tx fallback error ({}): {}", short_sig(&signature), short_error(&e.to_string()));
            return;
        }
    };

    let Some(mint) = mint_from_transaction(&tx) else {
        return;
    };
    if skip.contains(&mint) || !seen.lock().insert(&mint) {
        return;
    }
    if out.send(Candidate::new(signature, mint.clone(), unix_now(), slot)).await.is_ok() {
        info!("Queued via tx fallback: {mint} | slot={slot}");
    }
}

fn short_sig(signature: &str) -> &str {
    signature.get(..8).unwrap_or(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use membot_chain::rpc::InstructionIndices;
    use membot_common::{PUMPFUN_PROGRAM_ID, SOL_MINT, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn logs(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    fn pump() -> Vec<String> {
        vec![PUMPFUN_PROGRAM_ID.to_string()]
    }

    #[test]
    fn test_creation_event_with_program() {
        let l = logs(&["Program log: Instruction: Create"]);
        assert!(is_creation_event(Some(PUMPFUN_PROGRAM_ID), &l, PUMPFUN_PROGRAM_ID, &pump()));
        assert!(!is_creation_event(Some("Other"), &l, PUMPFUN_PROGRAM_ID, &pump()));

        let swap = logs(&["Program log: Instruction: Buy"]);
        assert!(!is_creation_event(Some(PUMPFUN_PROGRAM_ID), &swap, PUMPFUN_PROGRAM_ID, &pump()));
    }

    #[test]
    fn test_creation_event_without_program() {
        let l = logs(&["Program log: initialize bonding curve"]);
        assert!(is_creation_event(None, &l, PUMPFUN_PROGRAM_ID, &pump()));

        let two = vec![PUMPFUN_PROGRAM_ID.to_string(), "Other".to_string()];
        assert!(!is_creation_event(None, &l, PUMPFUN_PROGRAM_ID, &two));
    }

    #[test]
    fn test_extract_candidates_skips_known() {
        let skip = SkipList::new(pump());
        let l = logs(&[
            &format!("Program {PUMPFUN_PROGRAM_ID} invoke [1]"),
            &format!("Program log: mint={MINT} quote={SOL_MINT}"),
            &format!("Program {TOKEN_PROGRAM_ID} success"),
            "Program log: short=abc123",
        ]);
        assert_eq!(extract_candidates(&l, &skip), vec![MINT.to_string()]);
    }

    #[test]
    fn test_mint_from_token_instruction() {
        let tx = TransactionAccounts {
            account_keys: vec![
                "Payer1111111111111111111111111111111111111".to_string(),
                MINT.to_string(),
                TOKEN_PROGRAM_ID.to_string(),
            ],
            instructions: vec![
                InstructionIndices {
                    program_id_index: 9,
                    accounts: vec![0],
                },
                InstructionIndices {
                    program_id_index: 2,
                    accounts: vec![1, 0],
                },
            ],
        };
        assert_eq!(mint_from_transaction(&tx), Some(MINT.to_string()));
    }

    #[test]
    fn test_mint_fallback_first_non_token_key() {
        let tx = TransactionAccounts {
            account_keys: vec![TOKEN_PROGRAM_ID.to_string(), SYSTEM_PROGRAM_ID.to_string()],
            instructions: vec![],
        };
        assert_eq!(mint_from_transaction(&tx), Some(SYSTEM_PROGRAM_ID.to_string()));
        assert_eq!(mint_from_transaction(&TransactionAccounts::default()), None);
    }

    #[test]
    fn test_seen_set_dedupes_and_evicts() {
        let mut seen = SeenSet::new(2);
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(seen.insert("c"));
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains("a"));
        assert!(seen.contains("c"));
        assert!(seen.insert("a"));
    }

    #[test]
    fn test_short_sig() {
        assert_eq!(short_sig("5abcdefghijk"), "5abcdefg");
        assert_eq!(short_sig("abc"), "abc");
    }
}
