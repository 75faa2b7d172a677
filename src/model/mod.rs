//! Domain model for codified extractions
//!
//! This module defines:
//! - The five-state mapping lifecycle of a codified line item
//! - Typed item values with explicit numeric normalization
//! - The per-document extraction record and its derived mapping stats
//! - The single pure reducer that recomputes derived state after mutation

pub mod library;

pub use library::{HistoryEntry, ProjectDataItem, ValueContribution};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confirmation lifecycle of a codified item
///
/// `Matched` and `Confirmed` are accepted for downstream use, `Unmatched` is
/// rejected, `Suggested` and `PendingReview` are awaiting a human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Matched,
    Suggested,
    PendingReview,
    Confirmed,
    Unmatched,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Matched => "matched",
            MappingStatus::Suggested => "suggested",
            MappingStatus::PendingReview => "pending_review",
            MappingStatus::Confirmed => "confirmed",
            MappingStatus::Unmatched => "unmatched",
        }
    }

    /// Parse a status string, rejecting anything outside the five known states
    pub fn parse(s: &str) -> Result<Self, crate::error::PipelineError> {
        match s {
            "matched" => Ok(MappingStatus::Matched),
            "suggested" => Ok(MappingStatus::Suggested),
            "pending_review" => Ok(MappingStatus::PendingReview),
            "confirmed" => Ok(MappingStatus::Confirmed),
            "unmatched" => Ok(MappingStatus::Unmatched),
            other => Err(crate::error::PipelineError::InvalidInput(format!(
                "unknown mapping status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An extracted item value with its type made explicit
///
/// Upstream extraction produces numbers, free text, or arbitrary JSON; the
/// variant is fixed at ingestion so a value that cannot be read as a number
/// is visible as such rather than silently collapsing to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Number(f64),
    Text(String),
    Raw(serde_json::Value),
}

impl ItemValue {
    /// Canonical numeric form used for variance math
    ///
    /// Text values are stripped of everything except digits, dots, and minus
    /// signs before parsing, so currency symbols and thousands separators are
    /// discarded ("£1,250.50" reads as 1250.5). Values with no numeric
    /// content yield `None`.
    pub fn normalized(&self) -> Option<f64> {
        match self {
            ItemValue::Number(n) => Some(*n),
            ItemValue::Text(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                cleaned.parse::<f64>().ok()
            }
            ItemValue::Raw(_) => None,
        }
    }
}

impl std::fmt::Display for ItemValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemValue::Number(n) => write!(f, "{}", n),
            ItemValue::Text(s) => write!(f, "{}", s),
            ItemValue::Raw(v) => write!(f, "{}", v),
        }
    }
}

/// One extracted line item with its proposed canonical code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodifiedItem {
    /// Locally unique within the owning extraction
    #[serde(default)]
    pub id: String,
    pub original_name: String,
    pub value: ItemValue,
    /// Numeric form resolved once at ingestion; `None` means the value had
    /// no readable numeric content
    #[serde(default)]
    pub value_normalized: Option<f64>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Confirmed canonical code
    #[serde(default)]
    pub item_code: Option<String>,
    /// AI-proposed canonical code, accepted on confirm
    #[serde(default)]
    pub suggested_code: Option<String>,
    #[serde(default)]
    pub suggested_code_id: Option<String>,
    pub mapping_status: MappingStatus,
    /// Confidence in [0, 1]; forced to 1.0 on confirm and 0.0 on skip
    #[serde(default)]
    pub confidence: f64,
    /// Subtotal rows are excluded from downstream category totals
    #[serde(default)]
    pub is_subtotal: Option<bool>,
    #[serde(default)]
    pub subtotal_reason: Option<String>,
}

impl CodifiedItem {
    /// Code this item would merge under: the confirmed code when present,
    /// otherwise the suggestion. Empty strings count as absent.
    pub fn effective_code(&self) -> Option<&str> {
        non_empty(self.item_code.as_deref()).or_else(|| non_empty(self.suggested_code.as_deref()))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Per-status counts derived from an extraction's item array
///
/// Always a pure function of the items; never edited independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub matched: usize,
    pub suggested: usize,
    pub pending_review: usize,
    pub confirmed: usize,
    pub unmatched: usize,
}

impl MappingStats {
    pub fn total(&self) -> usize {
        self.matched + self.suggested + self.pending_review + self.confirmed + self.unmatched
    }
}

/// Derived state recomputed after every item mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub stats: MappingStats,
    pub is_fully_confirmed: bool,
}

/// The one reducer every mutation path goes through
///
/// An extraction is fully confirmed once no item is awaiting a human
/// decision, i.e. nothing is `suggested` or `pending_review`.
pub fn recompute_derived(items: &[CodifiedItem]) -> Derived {
    let mut stats = MappingStats::default();
    for item in items {
        match item.mapping_status {
            MappingStatus::Matched => stats.matched += 1,
            MappingStatus::Suggested => stats.suggested += 1,
            MappingStatus::PendingReview => stats.pending_review += 1,
            MappingStatus::Confirmed => stats.confirmed += 1,
            MappingStatus::Unmatched => stats.unmatched += 1,
        }
    }

    Derived {
        is_fully_confirmed: stats.pending_review == 0 && stats.suggested == 0,
        stats,
    }
}

/// One codified extraction per source document
///
/// A newer extraction for the same document supersedes older ones; lookups
/// by document return the most recently codified record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodifiedExtraction {
    pub id: String,
    pub document_id: String,
    pub project_id: Option<String>,
    pub items: Vec<CodifiedItem>,
    pub mapping_stats: MappingStats,
    pub fast_pass_completed: bool,
    pub smart_pass_completed: bool,
    pub is_fully_confirmed: bool,
    pub merged_to_project_library: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub codified_at: DateTime<Utc>,
    pub smart_pass_at: Option<DateTime<Utc>>,
    /// Set only when `is_fully_confirmed` first transitions to true
    pub confirmed_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_reason: Option<String>,
}

/// A registered source document
///
/// The extraction pipeline does not own file content; it only needs the
/// document's name for provenance and its project for merge resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub file_name: String,
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, status: MappingStatus) -> CodifiedItem {
        CodifiedItem {
            id: id.to_string(),
            original_name: format!("Item {}", id),
            value: ItemValue::Number(1.0),
            value_normalized: Some(1.0),
            data_type: None,
            category: None,
            item_code: None,
            suggested_code: None,
            suggested_code_id: None,
            mapping_status: status,
            confidence: 0.5,
            is_subtotal: None,
            subtotal_reason: None,
        }
    }

    #[test]
    fn test_stats_count_every_status() {
        let items = vec![
            item("a", MappingStatus::Matched),
            item("b", MappingStatus::Matched),
            item("c", MappingStatus::Suggested),
            item("d", MappingStatus::PendingReview),
            item("e", MappingStatus::Confirmed),
            item("f", MappingStatus::Unmatched),
        ];

        let derived = recompute_derived(&items);
        assert_eq!(derived.stats.matched, 2);
        assert_eq!(derived.stats.suggested, 1);
        assert_eq!(derived.stats.pending_review, 1);
        assert_eq!(derived.stats.confirmed, 1);
        assert_eq!(derived.stats.unmatched, 1);
        assert_eq!(derived.stats.total(), 6);
        assert!(!derived.is_fully_confirmed);
    }

    #[test]
    fn test_fully_confirmed_requires_no_open_items() {
        let items = vec![
            item("a", MappingStatus::Matched),
            item("b", MappingStatus::Confirmed),
            item("c", MappingStatus::Unmatched),
        ];
        assert!(recompute_derived(&items).is_fully_confirmed);

        let items = vec![item("a", MappingStatus::Confirmed), item("b", MappingStatus::Suggested)];
        assert!(!recompute_derived(&items).is_fully_confirmed);
    }

    #[test]
    fn test_empty_extraction_is_fully_confirmed() {
        let derived = recompute_derived(&[]);
        assert_eq!(derived.stats.total(), 0);
        assert!(derived.is_fully_confirmed);
    }

    #[test]
    fn test_normalize_currency_text() {
        assert_eq!(ItemValue::Text("£1,250.50".to_string()).normalized(), Some(1250.5));
        assert_eq!(ItemValue::Text("$ 99".to_string()).normalized(), Some(99.0));
        assert_eq!(ItemValue::Text("-42.5%".to_string()).normalized(), Some(-42.5));
    }

    #[test]
    fn test_normalize_non_numeric_text_is_none() {
        assert_eq!(ItemValue::Text("N/A".to_string()).normalized(), None);
        assert_eq!(ItemValue::Text("".to_string()).normalized(), None);
        assert_eq!(ItemValue::Raw(serde_json::json!({"a": 1})).normalized(), None);
    }

    #[test]
    fn test_normalize_number_passes_through() {
        assert_eq!(ItemValue::Number(200.0).normalized(), Some(200.0));
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!(MappingStatus::parse("pending_review").is_ok());
        assert!(MappingStatus::parse("in_progress").is_err());
        assert!(MappingStatus::parse("").is_err());
    }

    #[test]
    fn test_status_json_rejects_unknown() {
        let ok: Result<MappingStatus, _> = serde_json::from_str("\"suggested\"");
        assert!(ok.is_ok());
        let bad: Result<MappingStatus, _> = serde_json::from_str("\"approved\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_effective_code_prefers_confirmed() {
        let mut it = item("a", MappingStatus::Confirmed);
        it.item_code = Some("REV01".to_string());
        it.suggested_code = Some("REV99".to_string());
        assert_eq!(it.effective_code(), Some("REV01"));

        it.item_code = Some(String::new());
        assert_eq!(it.effective_code(), Some("REV99"));

        it.suggested_code = None;
        assert_eq!(it.effective_code(), None);
    }
}
