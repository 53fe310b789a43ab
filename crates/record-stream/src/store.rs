//! Row storage behind the record table.
//!
//! All retained rows are kept in arrival order. The visible subset (rows
//! matching the filter) is kept in an ordered map keyed by the sort column
//! value plus the arrival sequence number, so a new row costs one predicate
//! evaluation and one O(log n) insert. Changing the filter or the sort column
//! rebuilds the visible map from the retained rows; nothing is discarded.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kafka_types::ConsumedRecord;

/// Column the visible rows are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    /// Order in which rows were received
    #[default]
    Arrival,
    Time,
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Case-insensitive substring match over key or value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    needle: Option<String>,
}

impl RecordFilter {
    /// An empty search text matches every row.
    pub fn new(text: &str) -> Self {
        Self {
            needle: (!text.is_empty()).then(|| text.to_lowercase()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_none()
    }

    pub fn matches(&self, record: &ConsumedRecord) -> bool {
        let Some(needle) = &self.needle else {
            return true;
        };
        record
            .key
            .as_deref()
            .is_some_and(|k| k.to_lowercase().contains(needle.as_str()))
            || record.value.to_lowercase().contains(needle.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Arrival,
    Time(DateTime<Utc>),
    Key(Option<String>),
    Value(String),
}

type ViewKey = (SortValue, u64);

/// What happened to the store when a row was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Arrival sequence number of the new row
    pub seq: u64,
    /// The new row passes the filter
    pub visible: bool,
    /// Oldest rows dropped to stay within the cap
    pub evicted: usize,
}

#[derive(Debug)]
pub struct RowStore {
    rows: VecDeque<(u64, Arc<ConsumedRecord>)>,
    visible: BTreeMap<ViewKey, Arc<ConsumedRecord>>,
    filter: RecordFilter,
    column: SortColumn,
    order: SortOrder,
    next_seq: u64,
    max_rows: usize,
}

impl RowStore {
    pub fn new(max_rows: usize) -> Self {
        Self {
            rows: VecDeque::new(),
            visible: BTreeMap::new(),
            filter: RecordFilter::default(),
            column: SortColumn::default(),
            order: SortOrder::default(),
            next_seq: 0,
            max_rows: max_rows.max(1),
        }
    }

    pub fn push(&mut self, record: Arc<ConsumedRecord>) -> PushOutcome {
        let mut evicted = 0;
        while self.rows.len() >= self.max_rows {
            let Some((seq, old)) = self.rows.pop_front() else {
                break;
            };
            let key = self.view_key(seq, &old);
            self.visible.remove(&key);
            evicted += 1;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let visible = self.filter.matches(&record);
        if visible {
            let key = self.view_key(seq, &record);
            self.visible.insert(key, Arc::clone(&record));
        }
        self.rows.push_back((seq, record));

        PushOutcome {
            seq,
            visible,
            evicted,
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.visible.clear();
    }

    pub fn set_filter(&mut self, filter: RecordFilter) {
        if filter != self.filter {
            self.filter = filter;
            self.rebuild();
        }
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    pub fn set_sort(&mut self, column: SortColumn, order: SortOrder) {
        self.order = order;
        if column != self.column {
            self.column = column;
            self.rebuild();
        }
    }

    pub fn sort(&self) -> (SortColumn, SortOrder) {
        (self.column, self.order)
    }

    /// Visible rows in display order.
    pub fn visible(&self) -> Vec<Arc<ConsumedRecord>> {
        match self.order {
            SortOrder::Ascending => self.visible.values().cloned().collect(),
            SortOrder::Descending => self.visible.values().rev().cloned().collect(),
        }
    }

    /// Visible rows that arrived after `seq` (all when `None`), in arrival
    /// order with their sequence numbers.
    pub fn visible_after(&self, seq: Option<u64>) -> Vec<(u64, Arc<ConsumedRecord>)> {
        let start = match seq {
            Some(seq) => self.rows.partition_point(|(s, _)| *s <= seq),
            None => 0,
        };
        self.rows
            .range(start..)
            .filter(|(_, r)| self.filter.matches(r))
            .map(|(s, r)| (*s, Arc::clone(r)))
            .collect()
    }

    /// Every retained row in arrival order, ignoring the filter.
    pub fn rows(&self) -> impl Iterator<Item = &Arc<ConsumedRecord>> {
        self.rows.iter().map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn view_key(&self, seq: u64, record: &ConsumedRecord) -> ViewKey {
        let value = match self.column {
            SortColumn::Arrival => SortValue::Arrival,
            SortColumn::Time => SortValue::Time(record.timestamp),
            SortColumn::Key => SortValue::Key(record.key.clone()),
            SortColumn::Value => SortValue::Value(record.value.clone()),
        };
        (value, seq)
    }

    fn rebuild(&mut self) {
        let visible = self
            .rows
            .iter()
            .filter(|(_, r)| self.filter.matches(r))
            .map(|(seq, r)| (self.view_key(*seq, r), Arc::clone(r)))
            .collect();
        self.visible = visible;
    }
}
