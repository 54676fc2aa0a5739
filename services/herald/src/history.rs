//! Bounded history of recent dispatch outcomes

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notifier::DeliveryOutcome;

/// Which lifecycle hook produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    Success,
    Failure,
}

/// One notifier's outcome for one dispatched event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub method: String,
    pub service: String,
    pub hook: Hook,
    pub outcome: DeliveryOutcome,
    pub at: DateTime<Utc>,
}

/// Ring buffer of the most recent dispatch records
#[derive(Debug)]
pub struct DispatchHistory {
    records: Mutex<VecDeque<DispatchRecord>>,
    max_size: usize,
}

impl DispatchHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn push(&self, record: DispatchRecord) {
        if self.max_size == 0 {
            return;
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() >= self.max_size {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Records oldest first
    pub fn snapshot(&self) -> Vec<DispatchRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
