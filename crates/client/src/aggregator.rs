//! Latest known state per producer, and which producer the viewer follows.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::normalize::EventUnit;

/// Everything known about one producer since the session started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProducerRecord {
    pub producer_id: String,
    /// Last non-empty name seen.
    pub display_name: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Most recent full message per event type.
    pub latest_by_type: BTreeMap<String, serde_json::Value>,
}

impl ProducerRecord {
    fn new(producer_id: String, seen_at: DateTime<Utc>) -> Self {
        Self {
            producer_id,
            display_name: None,
            last_seen: seen_at,
            latest_by_type: BTreeMap::new(),
        }
    }

    pub fn latest(&self, event_type: &str) -> Option<&serde_json::Value> {
        self.latest_by_type.get(event_type)
    }

    /// Name to show for this producer: the display name, or the id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.producer_id)
    }
}

/// Producer records in first-seen order, plus the sticky selection.
#[derive(Debug, Clone, Default)]
pub struct ProducerTable {
    records: Vec<ProducerRecord>,
    index: HashMap<String, usize>,
    selected: Option<String>,
}

impl ProducerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one unit into the table. Never fails; shape validation happens
    /// in the normalizer.
    pub fn apply(&mut self, unit: &EventUnit, received_at: DateTime<Utc>) -> &ProducerRecord {
        let slot = match self.index.get(&unit.producer_id) {
            Some(&slot) => slot,
            None => {
                self.records
                    .push(ProducerRecord::new(unit.producer_id.clone(), received_at));
                let slot = self.records.len() - 1;
                self.index.insert(unit.producer_id.clone(), slot);
                slot
            }
        };

        let record = &mut self.records[slot];
        // Wall-clock stamps can step backwards.
        record.last_seen = record.last_seen.max(received_at);
        if let Some(name) = unit.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            record.display_name = Some(name.to_string());
        }
        record
            .latest_by_type
            .insert(unit.event_type.clone(), unit.raw.clone());
        record
    }

    pub fn get(&self, producer_id: &str) -> Option<&ProducerRecord> {
        self.index.get(producer_id).map(|&slot| &self.records[slot])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-seen order.
    pub fn records(&self) -> &[ProducerRecord] {
        &self.records
    }

    /// Pin the view to a producer. The pin survives newer activity from
    /// other producers until cleared.
    pub fn select(&mut self, producer_id: impl Into<String>) {
        self.selected = Some(producer_id.into());
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The pinned producer if it exists, else the most recently seen one.
    /// Ties go to the producer seen first.
    pub fn effective_producer_id(&self) -> Option<&str> {
        if let Some(selected) = self.selected.as_deref() {
            if self.index.contains_key(selected) {
                return Some(selected);
            }
        }

        let mut best: Option<&ProducerRecord> = None;
        for record in &self.records {
            match best {
                Some(current) if record.last_seen <= current.last_seen => {}
                _ => best = Some(record),
            }
        }
        best.map(|r| r.producer_id.as_str())
    }

    pub fn effective_producer(&self) -> Option<&ProducerRecord> {
        self.effective_producer_id().and_then(|id| self.get(id))
    }
}
