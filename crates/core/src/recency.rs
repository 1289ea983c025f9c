use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};

pub const RECENT_INSTRUMENTS_KEY: &str = "recent_instruments";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyEntry {
    pub ticker: String,
    pub name: String,
}

/// Most-recently-used instruments, newest first, unique by ticker and never
/// longer than `capacity`.
#[derive(Debug, Clone)]
pub struct RecencyCache {
    capacity: usize,
    entries: Vec<RecencyEntry>,
}

impl RecencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
        }
    }

    /// Restores the persisted list. Stored data is normalized to the list
    /// invariants; an unreadable value loads as empty.
    pub fn load(store: &dyn KeyValueStore, capacity: usize) -> Self {
        let mut cache = Self::new(capacity);
        let stored = match store.load(RECENT_INSTRUMENTS_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<Vec<RecencyEntry>>(&text) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(error = %err, "stored recent instruments are corrupt; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load recent instruments");
                Vec::new()
            }
        };

        for entry in stored {
            if cache.entries.len() >= cache.capacity {
                break;
            }
            if !cache.contains(&entry.ticker) {
                cache.entries.push(entry);
            }
        }
        cache
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[RecencyEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&RecencyEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.entries.iter().any(|e| e.ticker == ticker)
    }

    /// Moves (or inserts) the instrument to the front, evicting from the tail.
    pub fn touch(&mut self, ticker: &str, name: &str) {
        self.entries.retain(|e| e.ticker != ticker);
        self.entries.insert(
            0,
            RecencyEntry {
                ticker: ticker.to_string(),
                name: name.to_string(),
            },
        );
        self.entries.truncate(self.capacity);
    }

    pub fn persist(&self, store: &dyn KeyValueStore) -> anyhow::Result<()> {
        let text = serde_json::to_string(&self.entries)?;
        store.save(RECENT_INSTRUMENTS_KEY, &text)
    }

    /// `touch` followed by `persist`. A failed write is logged, not returned:
    /// the in-memory list stays authoritative for this run.
    pub fn record(&mut self, store: &dyn KeyValueStore, ticker: &str, name: &str) {
        self.touch(ticker, name);
        if let Err(err) = self.persist(store) {
            tracing::warn!(%ticker, error = %err, "failed to persist recent instruments");
        }
    }
}
