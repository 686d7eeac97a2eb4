use std::collections::HashMap;

use tokio::sync::oneshot;

use super::protocol::CorrelationId;

/// Pending continuations keyed by correlation id.
///
/// Each entry is resolved at most once: resolving removes it, so a second
/// result for the same id finds nothing and is reported as unmatched.
pub struct CorrelationTable<T> {
    pending: HashMap<CorrelationId, oneshot::Sender<T>>,
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CorrelationTable<T> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Allocate a fresh id and register a continuation for it.
    pub fn register(&mut self) -> (CorrelationId, oneshot::Receiver<T>) {
        let mut id = CorrelationId::generate();
        while self.pending.contains_key(&id) {
            id = CorrelationId::generate();
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        (id, rx)
    }

    /// Deliver a value to the continuation registered under `id`.
    ///
    /// Returns false when no entry matches. A matched entry whose receiver was
    /// already dropped still counts as delivered.
    pub fn resolve(&mut self, id: &CorrelationId, value: T) -> bool {
        match self.pending.remove(id) {
            Some(sender) => {
                if sender.send(value).is_err() {
                    tracing::debug!("Continuation {} was abandoned before its result arrived", id);
                }
                true
            }
            None => false,
        }
    }

    /// Drop a registration without resolving it.
    pub fn cancel(&mut self, id: &CorrelationId) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
