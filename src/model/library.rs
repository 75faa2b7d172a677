//! Project data library records
//!
//! The library holds one durable record per (project, item code) pair with
//! the latest accepted value, the full provenance history of every value
//! ever merged, and the variance across those values.

use super::ItemValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One merged value with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub value: ItemValue,
    pub value_normalized: f64,
    pub source_document_id: String,
    pub source_document_name: String,
    pub source_extraction_id: String,
    pub original_name: String,
    pub added_at: DateTime<Utc>,
    pub added_by: Option<String>,
    /// Exactly one entry per record carries this flag
    pub is_current_value: bool,
    pub was_reverted: bool,
}

/// A value contributed to the library by one confirmed item
#[derive(Debug, Clone)]
pub struct ValueContribution {
    pub value: ItemValue,
    pub value_normalized: f64,
    pub data_type: Option<String>,
    pub category: Option<String>,
    pub original_name: String,
    pub source_document_id: String,
    pub source_document_name: String,
    pub source_extraction_id: String,
    pub added_by: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Durable library record keyed by (project_id, item_code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDataItem {
    pub id: String,
    pub project_id: String,
    pub item_code: String,
    pub category: Option<String>,
    pub current_value: ItemValue,
    pub current_value_normalized: f64,
    pub current_data_type: Option<String>,
    pub current_source_document_id: String,
    pub current_source_document_name: String,
    pub last_updated_at: DateTime<Utc>,
    pub last_updated_by: Option<String>,
    /// True once any second contribution lands, whatever its source
    pub has_multiple_sources: bool,
    /// Percentage spread across all recorded normalized values; absent until
    /// at least two values exist with a non-zero minimum
    pub value_variance: Option<f64>,
    /// Append-only; entries are flipped off `is_current_value`, never removed
    pub value_history: Vec<HistoryEntry>,
    pub is_deleted: bool,
}

impl ProjectDataItem {
    /// Create a record from its first contribution
    pub fn first(project_id: &str, item_code: &str, c: ValueContribution) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            item_code: item_code.to_string(),
            category: c.category.clone(),
            current_value: c.value.clone(),
            current_value_normalized: c.value_normalized,
            current_data_type: c.data_type.clone(),
            current_source_document_id: c.source_document_id.clone(),
            current_source_document_name: c.source_document_name.clone(),
            last_updated_at: c.added_at,
            last_updated_by: c.added_by.clone(),
            has_multiple_sources: false,
            value_variance: None,
            value_history: vec![history_entry(c, true)],
            is_deleted: false,
        }
    }

    /// Fold a new contribution into an existing record
    ///
    /// Prior history entries lose the current flag, the new entry is
    /// appended, and variance is recomputed over every normalized value ever
    /// recorded. Source identity is not deduplicated: any update through
    /// this path marks the record as multi-source, and a soft-deleted record
    /// is revived.
    pub fn record_value(&mut self, c: ValueContribution) {
        for entry in &mut self.value_history {
            entry.is_current_value = false;
        }

        let mut normalized: Vec<f64> =
            self.value_history.iter().map(|e| e.value_normalized).collect();
        normalized.push(c.value_normalized);
        self.value_variance = variance(&normalized);

        self.current_value = c.value.clone();
        self.current_value_normalized = c.value_normalized;
        self.current_data_type = c.data_type.clone();
        if c.category.is_some() {
            self.category = c.category.clone();
        }
        self.current_source_document_id = c.source_document_id.clone();
        self.current_source_document_name = c.source_document_name.clone();
        self.last_updated_at = c.added_at;
        self.last_updated_by = c.added_by.clone();
        self.has_multiple_sources = true;
        self.is_deleted = false;

        self.value_history.push(history_entry(c, true));
    }

    /// History entries this extraction contributed, ignoring reverted ones
    pub fn entries_from(&self, extraction_id: &str) -> usize {
        self.value_history
            .iter()
            .filter(|e| e.source_extraction_id == extraction_id && !e.was_reverted)
            .count()
    }
}

fn history_entry(c: ValueContribution, current: bool) -> HistoryEntry {
    HistoryEntry {
        value: c.value,
        value_normalized: c.value_normalized,
        source_document_id: c.source_document_id,
        source_document_name: c.source_document_name,
        source_extraction_id: c.source_extraction_id,
        original_name: c.original_name,
        added_at: c.added_at,
        added_by: c.added_by,
        is_current_value: current,
        was_reverted: false,
    }
}

/// Percentage spread `(max - min) / |min| * 100`
///
/// Defined only when at least two values exist and the minimum is non-zero;
/// never divides by zero.
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if min == 0.0 {
        return None;
    }

    Some((max - min) / min.abs() * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(value: f64, doc: &str, extraction: &str) -> ValueContribution {
        ValueContribution {
            value: ItemValue::Number(value),
            value_normalized: value,
            data_type: Some("currency".to_string()),
            category: Some("revenue".to_string()),
            original_name: "Gross Revenue".to_string(),
            source_document_id: doc.to_string(),
            source_document_name: format!("{}.pdf", doc),
            source_extraction_id: extraction.to_string(),
            added_by: None,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_variance_needs_two_values() {
        assert_eq!(variance(&[100.0]), None);
        assert_eq!(variance(&[]), None);
    }

    #[test]
    fn test_variance_spread() {
        assert_eq!(variance(&[100.0, 150.0]), Some(50.0));
        assert_eq!(variance(&[150.0, 100.0]), Some(50.0));
        assert_eq!(variance(&[100.0, 200.0]), Some(100.0));
    }

    #[test]
    fn test_variance_zero_min_undefined() {
        assert_eq!(variance(&[0.0, 100.0]), None);
    }

    #[test]
    fn test_first_contribution() {
        let item = ProjectDataItem::first("proj-1", "REV01", contribution(100.0, "doc-1", "ext-1"));

        assert_eq!(item.value_history.len(), 1);
        assert!(item.value_history[0].is_current_value);
        assert!(!item.has_multiple_sources);
        assert_eq!(item.value_variance, None);
        assert_eq!(item.current_value_normalized, 100.0);
    }

    #[test]
    fn test_record_value_moves_current_flag() {
        let mut item =
            ProjectDataItem::first("proj-1", "REV01", contribution(100.0, "doc-1", "ext-1"));
        item.record_value(contribution(200.0, "doc-2", "ext-2"));

        assert_eq!(item.value_history.len(), 2);
        let current: Vec<_> =
            item.value_history.iter().filter(|e| e.is_current_value).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].source_extraction_id, "ext-2");

        assert!(item.has_multiple_sources);
        assert_eq!(item.value_variance, Some(100.0));
        assert_eq!(item.current_value_normalized, 200.0);
        assert_eq!(item.current_source_document_id, "doc-2");
    }

    #[test]
    fn test_record_value_revives_soft_deleted() {
        let mut item =
            ProjectDataItem::first("proj-1", "REV01", contribution(100.0, "doc-1", "ext-1"));
        item.is_deleted = true;
        item.record_value(contribution(150.0, "doc-1", "ext-2"));

        assert!(!item.is_deleted);
        assert_eq!(item.value_variance, Some(50.0));
    }

    #[test]
    fn test_same_source_still_marks_multiple() {
        let mut item =
            ProjectDataItem::first("proj-1", "REV01", contribution(100.0, "doc-1", "ext-1"));
        item.record_value(contribution(100.0, "doc-1", "ext-1"));

        assert!(item.has_multiple_sources);
        // Equal values have zero spread but a defined variance
        assert_eq!(item.value_variance, Some(0.0));
    }

    #[test]
    fn test_entries_from_skips_reverted() {
        let mut item =
            ProjectDataItem::first("proj-1", "REV01", contribution(100.0, "doc-1", "ext-1"));
        item.record_value(contribution(150.0, "doc-2", "ext-2"));
        item.value_history[0].was_reverted = true;

        assert_eq!(item.entries_from("ext-1"), 0);
        assert_eq!(item.entries_from("ext-2"), 1);
    }
}
