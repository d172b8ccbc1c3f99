use std::collections::{HashMap, HashSet};

use super::TransactionID;

pub(crate) struct WaitForGraph {
    // key: transaction id, value: the transactions that the key transaction is waiting for
    graph: HashMap<TransactionID, HashSet<TransactionID>>,

    // Transactions that have issued a lock request but haven't evaluated it
    // yet. Their outgoing edges are not in the graph, so reaching one of them
    // counts as a cycle.
    waiting: HashSet<TransactionID>,
}

impl WaitForGraph {
    pub(crate) fn new() -> Self {
        Self {
            graph: HashMap::new(),
            waiting: HashSet::new(),
        }
    }

    pub(crate) fn add_edge(&mut self, from: TransactionID, to: TransactionID) {
        self.graph
            .entry(from)
            .or_insert_with(HashSet::new)
            .insert(to);
    }

    /// Replace the outgoing edges of `from`.
    pub(crate) fn set_edges(&mut self, from: TransactionID, to: HashSet<TransactionID>) {
        self.graph.remove(&from);
        for t in to {
            self.add_edge(from, t);
        }
    }

    pub(crate) fn get_waiting_transactions(
        &self,
        tid: TransactionID,
    ) -> Option<&HashSet<TransactionID>> {
        self.graph.get(&tid)
    }

    /// The transaction doesn't wait on anyone anymore.
    pub(crate) fn remove_waiter(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
    }

    /// Forget the transaction completely, including the edges pointing to it.
    pub(crate) fn remove_transaction(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
        self.waiting.remove(&tid);
        for targets in self.graph.values_mut() {
            targets.remove(&tid);
        }
        self.graph.retain(|_, targets| !targets.is_empty());
    }

    pub(crate) fn mark_waiting(&mut self, tid: TransactionID) {
        self.waiting.insert(tid);
    }

    pub(crate) fn unmark_waiting(&mut self, tid: TransactionID) {
        self.waiting.remove(&tid);
    }

    /// Depth-first search from `requester` over the dependency edges.
    ///
    /// Returns the chain of transactions leading back to `requester`, or to
    /// a transaction that is about to block. Each transaction is expanded at
    /// most once.
    pub(crate) fn find_deadlock(&self, requester: TransactionID) -> Option<Vec<TransactionID>> {
        let mut visited: HashSet<TransactionID> = HashSet::new();
        let mut parent: HashMap<TransactionID, TransactionID> = HashMap::new();
        let mut stack = vec![requester];
        visited.insert(requester);

        while let Some(tid) = stack.pop() {
            let targets = match self.graph.get(&tid) {
                Some(targets) => targets,
                None => continue,
            };

            for &t in targets {
                if t == requester || self.waiting.contains(&t) {
                    let mut chain = vec![t, tid];
                    let mut cursor = tid;
                    while let Some(&p) = parent.get(&cursor) {
                        chain.push(p);
                        cursor = p;
                    }
                    chain.reverse();
                    return Some(chain);
                }

                if visited.insert(t) {
                    parent.insert(t, tid);
                    stack.push(t);
                }
            }
        }

        None
    }
}
