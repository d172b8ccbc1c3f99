use core::fmt;
use std::{
    collections::{hash_map::DefaultHasher, HashMap, HashSet},
    hash::{Hash, Hasher},
    sync::{Condvar, Mutex, MutexGuard},
    time::Instant,
};

use crossbeam::utils::CachePadded;
use itertools::Itertools;
use log::{debug, error};

use super::{Transaction, TransactionID, WaitForGraph};
use crate::{
    config::LockConfig,
    error::DbError,
    storage::page_id::PageId,
    types::DbResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    XLock,
    SLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

/// One lock held by one transaction on one page.
#[derive(Debug, Clone)]
pub struct LockRecord {
    tx: Transaction,
    lock: Lock,
    page_id: PageId,
}

impl LockRecord {
    fn new(tx: &Transaction, lock: Lock, page_id: &PageId) -> Self {
        Self {
            tx: tx.clone(),
            lock,
            page_id: *page_id,
        }
    }

    pub fn get_tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn get_lock(&self) -> Lock {
        self.lock
    }

    pub fn get_page_id(&self) -> PageId {
        self.page_id
    }

    fn belongs_to(&self, tx: &Transaction) -> bool {
        &self.tx == tx
    }

    fn is_exclusive(&self) -> bool {
        self.lock == Lock::XLock
    }
}

type LockTable = HashMap<PageId, Vec<LockRecord>>;

// A fixed partition of the page id space. The mutex is the per-page critical
// section for every page hashed here, the condvar wakes waiters on release.
struct Shard {
    table: Mutex<LockTable>,
    released: Condvar,
}

impl Shard {
    fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap()
    }
}

/// Page level shared/exclusive locks for the two-phase locking protocol.
///
/// A blocked request waits on the condvar of its shard and re-evaluates the
/// granting rules on every wake up. Before waiting, the request records which
/// transactions it waits for in the wait-for graph; if that closes a cycle
/// the request fails and its transaction has to be aborted by the caller.
///
/// Waiters on the same page are not served in FIFO order, whoever observes
/// the released lock first wins.
pub struct LockManager {
    shards: Vec<CachePadded<Shard>>,
    wait_for_graph: Mutex<WaitForGraph>,
    config: LockConfig,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        let shards = (0..config.shards.max(1))
            .map(|_| CachePadded::new(Shard::new()))
            .collect();

        Self {
            shards,
            wait_for_graph: Mutex::new(WaitForGraph::new()),
            config,
        }
    }

    fn shard_index(&self, page_id: &PageId) -> usize {
        let mut hasher = DefaultHasher::new();
        page_id.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    fn shard(&self, page_id: &PageId) -> &Shard {
        &self.shards[self.shard_index(page_id)]
    }

    fn graph(&self) -> MutexGuard<'_, WaitForGraph> {
        self.wait_for_graph.lock().unwrap()
    }

    // Lock every shard in index order, used by the operations that span the
    // whole lock table.
    fn lock_all_shards(&self) -> Vec<MutexGuard<'_, LockTable>> {
        self.shards.iter().map(|s| s.lock_table()).collect()
    }

    /// Request a lock on the given page. This api is blocking.
    ///
    /// Returns an error of kind `Deadlock` if waiting would close a cycle in
    /// the wait-for graph, or if the request is still blocked after
    /// `max_retries` wait intervals.
    pub fn acquire(&self, tx: &Transaction, page_id: &PageId, perm: Permission) -> DbResult {
        let lock = perm.to_lock();
        let tid = tx.get_id();
        let shard = self.shard(page_id);

        self.graph().mark_waiting(tid);
        let mut table = shard.lock_table();
        self.graph().unmark_waiting(tid);

        let mut retries = 0;
        let deadline = Instant::now() + self.config.wait_interval * self.config.max_retries as u32;
        loop {
            let records = table.entry(*page_id).or_insert_with(Vec::new);
            let blockers = Self::try_grant(records, tx, lock, page_id);
            if blockers.is_empty() {
                self.graph().remove_waiter(tid);
                debug!("{} granted {:?} on {}", tx, lock, page_id);
                return Ok(());
            }

            {
                let mut graph = self.graph();
                graph.set_edges(tid, blockers.clone());
                if let Some(chain) = graph.find_deadlock(tid) {
                    graph.remove_waiter(tid);
                    let err = DbError::deadlock(&format!(
                        "deadlock detected, request: <tx: {}, lock: {:?}, page_id: {}>, blocked by: {:?}, chain: {:?}",
                        tx, lock, page_id, blockers, chain,
                    ));
                    err.show_backtrace();
                    return Err(err);
                }
            }

            if retries >= self.config.max_retries || Instant::now() >= deadline {
                self.graph().remove_waiter(tid);
                let err = DbError::deadlock(&format!(
                    "acquire lock timeout after {} retries, request: <tx: {}, lock: {:?}, page_id: {}>, blocked by: {:?}",
                    retries, tx, lock, page_id, blockers,
                ));
                error!("{}", err);
                return Err(err);
            }

            debug!(
                "{} waits for {:?} on {}, blocked by {:?}",
                tx, lock, page_id, blockers
            );
            let (guard, wait) = shard
                .released
                .wait_timeout(table, self.config.wait_interval)
                .unwrap();
            // a release of another page in the shard wakes us up as well,
            // only a full wait counts as a retry
            if wait.timed_out() {
                retries += 1;
            }
            table = guard;
        }
    }

    // Apply the granting rules to the records of a single page.
    //
    // Returns the transactions blocking the request, an empty set means the
    // lock is granted (and recorded).
    fn try_grant(
        records: &mut Vec<LockRecord>,
        tx: &Transaction,
        lock: Lock,
        page_id: &PageId,
    ) -> HashSet<TransactionID> {
        if records.is_empty() {
            records.push(LockRecord::new(tx, lock, page_id));
            return HashSet::new();
        }

        match lock {
            Lock::SLock => {
                // only an X-Lock of another transaction blocks a reader
                let blockers: HashSet<TransactionID> = records
                    .iter()
                    .filter(|r| r.is_exclusive() && !r.belongs_to(tx))
                    .map(|r| r.tx.get_id())
                    .collect();

                if blockers.is_empty() && !records.iter().any(|r| r.belongs_to(tx)) {
                    records.push(LockRecord::new(tx, lock, page_id));
                }
                blockers
            }
            Lock::XLock => {
                // every record has to be ours, then all of them are upgraded
                let blockers: HashSet<TransactionID> = records
                    .iter()
                    .filter(|r| !r.belongs_to(tx))
                    .map(|r| r.tx.get_id())
                    .collect();

                if blockers.is_empty() {
                    for r in records.iter_mut() {
                        r.lock = Lock::XLock;
                    }
                }
                blockers
            }
        }
    }

    fn remove_records(table: &mut LockTable, tx: &Transaction, page_id: &PageId) -> bool {
        let mut removed = false;
        if let Some(records) = table.get_mut(page_id) {
            let before = records.len();
            records.retain(|r| !r.belongs_to(tx));
            removed = records.len() != before;

            if records.is_empty() {
                table.remove(page_id);
            }
        }
        removed
    }

    /// Remove all lock records of the transaction on the page. This api is
    /// idempotent.
    ///
    /// Return whether any record was removed.
    pub fn release(&self, tx: &Transaction, page_id: &PageId) -> bool {
        let shard = self.shard(page_id);
        let released = Self::remove_records(&mut shard.lock_table(), tx, page_id);

        if released {
            debug!("{} released {}", tx, page_id);
            shard.released.notify_all();
        }
        released
    }

    pub fn holds_lock(&self, tx: &Transaction, page_id: &PageId) -> bool {
        self.lock_mode(tx, page_id).is_some()
    }

    /// The strongest lock the transaction holds on the page.
    pub fn lock_mode(&self, tx: &Transaction, page_id: &PageId) -> Option<Lock> {
        let table = self.shard(page_id).lock_table();
        let records = table.get(page_id)?;

        let mut mode = None;
        for r in records.iter().filter(|r| r.belongs_to(tx)) {
            if r.is_exclusive() {
                return Some(Lock::XLock);
            }
            mode = Some(Lock::SLock);
        }
        mode
    }

    /// Whether some transaction holds an X-Lock on the page.
    pub fn is_exclusively_locked(&self, page_id: &PageId) -> bool {
        match self.shard(page_id).lock_table().get(page_id) {
            Some(records) => records.iter().any(|r| r.is_exclusive()),
            None => false,
        }
    }

    /// Snapshot of the lock records on the page.
    pub fn records(&self, page_id: &PageId) -> Vec<LockRecord> {
        self.shard(page_id)
            .lock_table()
            .get(page_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove every lock record of the transaction, return the pages that
    /// were locked by it.
    pub fn complete_transaction(&self, tx: &Transaction) -> Vec<PageId> {
        let mut pages = Vec::new();
        let mut touched_shards = Vec::new();

        {
            let mut tables = self.lock_all_shards();
            for (i, table) in tables.iter_mut().enumerate() {
                let held: Vec<PageId> = table
                    .iter()
                    .filter(|(_, records)| records.iter().any(|r| r.belongs_to(tx)))
                    .map(|(page_id, _)| *page_id)
                    .collect();

                if held.is_empty() {
                    continue;
                }

                for page_id in held {
                    Self::remove_records(table, tx, &page_id);
                    pages.push(page_id);
                }
                touched_shards.push(i);
            }
        }

        self.graph().remove_transaction(tx.get_id());

        for i in touched_shards {
            self.shards[i].released.notify_all();
        }

        pages.sort();
        debug!("{} completed, released pages: {:?}", tx, pages);
        pages
    }

    /// Pages currently locked by the transaction.
    pub fn related_pages(&self, tx: &Transaction) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .lock_all_shards()
            .iter()
            .flat_map(|table| {
                table
                    .iter()
                    .filter(|(_, records)| records.iter().any(|r| r.belongs_to(tx)))
                    .map(|(page_id, _)| *page_id)
                    .collect::<Vec<PageId>>()
            })
            .collect();

        pages.sort();
        pages
    }

    /// Transactions the given transaction is currently blocked on.
    pub fn waiting_on(&self, tx: &Transaction) -> Vec<TransactionID> {
        let graph = self.graph();
        match graph.get_waiting_transactions(tx.get_id()) {
            Some(targets) => targets.iter().copied().sorted().collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depiction = "\n".to_string();

        depiction.push_str("lock_table: {");
        for table in self.lock_all_shards() {
            for (page_id, records) in table.iter() {
                depiction.push_str(&format!(
                    "\n\t{} -> [{}]",
                    page_id.get_short_repr(),
                    records
                        .iter()
                        .map(|r| format!("{}: {:?}", r.tx, r.lock))
                        .join(", "),
                ));
            }
        }
        depiction.push_str("\n}\n");

        return write!(f, "{}", depiction);
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return write!(f, "{}", self);
    }
}
