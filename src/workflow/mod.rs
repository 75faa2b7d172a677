//! Confirmation workflow for codified extractions
//!
//! Every mutation here goes through the same finalize step: recompute the
//! derived mapping stats and fully-confirmed flag, stamp `confirmed_at` on
//! the transition, persist, and enqueue a merge task when the extraction has
//! become mergeable. Each response carries the recalculated stats and flag
//! so callers need no second read.

use crate::error::{PipelineError, Result};
use crate::model::{
    recompute_derived, CodifiedExtraction, CodifiedItem, MappingStats, MappingStatus,
};
use crate::storage::Database;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Result of a single-item mutation
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfirmOutcome {
    pub stats: MappingStats,
    pub is_fully_confirmed: bool,
    pub merge_scheduled: bool,
}

/// Result of confirming every suggested item at once
///
/// `confirmed_items` lists exactly the items that transitioned
/// suggested -> confirmed in this call, for collaborators that persist
/// reusable code aliases from accepted suggestions.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfirmAllOutcome {
    pub stats: MappingStats,
    pub is_fully_confirmed: bool,
    pub confirmed_items: Vec<CodifiedItem>,
    pub merge_scheduled: bool,
}

/// Create a codified extraction for a registered document
///
/// Item ids are filled in when absent and numeric normalization is resolved
/// here, once. An extraction that arrives fully confirmed with a resolvable
/// project gets a merge task immediately.
pub fn create(
    db: &Database,
    document_id: &str,
    project_id: Option<&str>,
    mut items: Vec<CodifiedItem>,
) -> Result<CodifiedExtraction> {
    if db.get_document(document_id)?.is_none() {
        return Err(PipelineError::not_found("document", document_id));
    }

    normalize_items(&mut items);
    let derived = recompute_derived(&items);
    let now = Utc::now();

    let extraction = CodifiedExtraction {
        id: uuid::Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        project_id: project_id.map(|s| s.to_string()),
        items,
        mapping_stats: derived.stats,
        fast_pass_completed: true,
        smart_pass_completed: false,
        is_fully_confirmed: derived.is_fully_confirmed,
        merged_to_project_library: false,
        merged_at: None,
        codified_at: now,
        smart_pass_at: None,
        confirmed_at: derived.is_fully_confirmed.then_some(now),
        is_deleted: false,
        deleted_at: None,
        deleted_reason: None,
    };

    db.insert_extraction(&extraction)?;
    info!(
        extraction = %extraction.id,
        document = %document_id,
        items = extraction.mapping_stats.total(),
        "created codified extraction"
    );

    maybe_schedule_merge(db, &extraction);
    Ok(extraction)
}

/// Replace the item array after the smart extraction pass
pub fn update_after_smart_pass(
    db: &Database,
    extraction_id: &str,
    mut items: Vec<CodifiedItem>,
) -> Result<CodifiedExtraction> {
    let mut extraction = load(db, extraction_id)?;
    let was_fully_confirmed = extraction.is_fully_confirmed;

    normalize_items(&mut items);
    extraction.items = items;
    extraction.smart_pass_completed = true;
    extraction.smart_pass_at = Some(Utc::now());

    finalize(db, &mut extraction, was_fully_confirmed)?;
    Ok(extraction)
}

/// Most recent non-deleted extraction for a document
pub fn get_by_document(db: &Database, document_id: &str) -> Result<Option<CodifiedExtraction>> {
    db.latest_extraction_for_document(document_id)
}

/// Confirm one item with an explicit canonical code
pub fn confirm_item(
    db: &Database,
    extraction_id: &str,
    item_id: &str,
    item_code: &str,
    canonical_code_id: Option<&str>,
) -> Result<ConfirmOutcome> {
    let mut extraction = load(db, extraction_id)?;
    let was_fully_confirmed = extraction.is_fully_confirmed;

    let item = find_item(&mut extraction.items, item_id)?;
    item.mapping_status = MappingStatus::Confirmed;
    item.item_code = Some(item_code.to_string());
    if let Some(code_id) = canonical_code_id {
        item.suggested_code_id = Some(code_id.to_string());
    }
    item.confidence = 1.0;

    let merge_scheduled = finalize(db, &mut extraction, was_fully_confirmed)?;
    Ok(ConfirmOutcome {
        stats: extraction.mapping_stats,
        is_fully_confirmed: extraction.is_fully_confirmed,
        merge_scheduled,
    })
}

/// Confirm every suggested item that carries a suggestion
///
/// Items in any other status, and suggested items without a suggested code,
/// are left untouched.
pub fn confirm_all_suggested(db: &Database, extraction_id: &str) -> Result<ConfirmAllOutcome> {
    let mut extraction = load(db, extraction_id)?;
    let was_fully_confirmed = extraction.is_fully_confirmed;

    let mut confirmed_items = Vec::new();
    for item in &mut extraction.items {
        if item.mapping_status != MappingStatus::Suggested {
            continue;
        }
        let code = match item.suggested_code.as_deref().filter(|c| !c.is_empty()) {
            Some(code) => code.to_string(),
            None => continue,
        };

        item.mapping_status = MappingStatus::Confirmed;
        item.item_code = Some(code);
        item.confidence = 1.0;
        confirmed_items.push(item.clone());
    }

    let merge_scheduled = finalize(db, &mut extraction, was_fully_confirmed)?;
    Ok(ConfirmAllOutcome {
        stats: extraction.mapping_stats,
        is_fully_confirmed: extraction.is_fully_confirmed,
        confirmed_items,
        merge_scheduled,
    })
}

/// Mark one item as unmatched
pub fn skip_item(db: &Database, extraction_id: &str, item_id: &str) -> Result<ConfirmOutcome> {
    let mut extraction = load(db, extraction_id)?;
    let was_fully_confirmed = extraction.is_fully_confirmed;

    let item = find_item(&mut extraction.items, item_id)?;
    item.mapping_status = MappingStatus::Unmatched;
    item.confidence = 0.0;

    let merge_scheduled = finalize(db, &mut extraction, was_fully_confirmed)?;
    Ok(ConfirmOutcome {
        stats: extraction.mapping_stats,
        is_fully_confirmed: extraction.is_fully_confirmed,
        merge_scheduled,
    })
}

/// Append a manually entered item; no status constraint is enforced
pub fn add_item(
    db: &Database,
    extraction_id: &str,
    mut item: CodifiedItem,
) -> Result<ConfirmOutcome> {
    let mut extraction = load(db, extraction_id)?;
    let was_fully_confirmed = extraction.is_fully_confirmed;

    if item.id.is_empty() {
        item.id = uuid::Uuid::new_v4().to_string();
    }
    item.value_normalized = item.value.normalized();
    extraction.items.push(item);

    let merge_scheduled = finalize(db, &mut extraction, was_fully_confirmed)?;
    Ok(ConfirmOutcome {
        stats: extraction.mapping_stats,
        is_fully_confirmed: extraction.is_fully_confirmed,
        merge_scheduled,
    })
}

/// Soft-delete an extraction
///
/// The record drops out of active queries; anything it already merged into
/// the project library stays as-is.
pub fn soft_delete(db: &Database, extraction_id: &str, reason: Option<&str>) -> Result<()> {
    let mut extraction = load(db, extraction_id)?;

    extraction.is_deleted = true;
    extraction.deleted_at = Some(Utc::now());
    extraction.deleted_reason = reason.map(|s| s.to_string());

    db.update_extraction(&extraction)?;
    info!(extraction = %extraction_id, "soft-deleted extraction");
    Ok(())
}

/// Project an extraction would merge into: its own link, else its document's
pub fn resolve_project(db: &Database, extraction: &CodifiedExtraction) -> Result<Option<String>> {
    if let Some(project) = &extraction.project_id {
        return Ok(Some(project.clone()));
    }
    Ok(db.get_document(&extraction.document_id)?.and_then(|d| d.project_id))
}

fn load(db: &Database, extraction_id: &str) -> Result<CodifiedExtraction> {
    db.get_extraction(extraction_id)?
        .ok_or_else(|| PipelineError::not_found("extraction", extraction_id))
}

fn find_item<'a>(items: &'a mut [CodifiedItem], item_id: &str) -> Result<&'a mut CodifiedItem> {
    items
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| PipelineError::not_found("item", item_id))
}

fn normalize_items(items: &mut [CodifiedItem]) {
    for item in items {
        if item.id.is_empty() {
            item.id = uuid::Uuid::new_v4().to_string();
        }
        item.value_normalized = item.value.normalized();
    }
}

/// Recompute derived state, stamp the confirmed transition, persist, and
/// schedule a merge when the extraction has become mergeable
fn finalize(
    db: &Database,
    extraction: &mut CodifiedExtraction,
    was_fully_confirmed: bool,
) -> Result<bool> {
    let derived = recompute_derived(&extraction.items);
    extraction.mapping_stats = derived.stats;
    extraction.is_fully_confirmed = derived.is_fully_confirmed;

    if derived.is_fully_confirmed && !was_fully_confirmed && extraction.confirmed_at.is_none() {
        extraction.confirmed_at = Some(Utc::now());
    }

    db.update_extraction(extraction)?;
    Ok(maybe_schedule_merge(db, extraction))
}

/// Enqueue a merge task for a fully confirmed, unmerged extraction
///
/// Scheduling failure is logged and never propagated; the backfill jobs pick
/// up anything missed.
fn maybe_schedule_merge(db: &Database, extraction: &CodifiedExtraction) -> bool {
    if !extraction.is_fully_confirmed || extraction.merged_to_project_library {
        return false;
    }

    let project = match resolve_project(db, extraction) {
        Ok(Some(project)) => project,
        Ok(None) => {
            debug!(extraction = %extraction.id, "fully confirmed but no resolvable project");
            return false;
        }
        Err(e) => {
            warn!(extraction = %extraction.id, error = %e, "project resolution failed");
            return false;
        }
    };

    match db.enqueue_merge(&extraction.id, Some(&project)) {
        Ok(inserted) => {
            if inserted {
                info!(extraction = %extraction.id, project = %project, "merge task enqueued");
            }
            inserted
        }
        Err(e) => {
            warn!(extraction = %extraction.id, error = %e, "failed to enqueue merge task");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemValue, SourceDocument};

    fn setup(project_id: Option<&str>) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_document(&SourceDocument {
            id: "doc-1".to_string(),
            file_name: "budget.pdf".to_string(),
            project_id: project_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        })
        .unwrap();
        db
    }

    fn item(id: &str, status: MappingStatus, suggested: Option<&str>) -> CodifiedItem {
        CodifiedItem {
            id: id.to_string(),
            original_name: format!("Item {}", id),
            value: ItemValue::Number(100.0),
            value_normalized: None,
            data_type: None,
            category: None,
            item_code: None,
            suggested_code: suggested.map(|s| s.to_string()),
            suggested_code_id: None,
            mapping_status: status,
            confidence: 0.7,
            is_subtotal: None,
            subtotal_reason: None,
        }
    }

    #[test]
    fn test_create_computes_derived_state() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            None,
            vec![
                item("a", MappingStatus::Suggested, Some("REV01")),
                item("b", MappingStatus::PendingReview, None),
            ],
        )
        .unwrap();

        assert_eq!(extraction.mapping_stats.suggested, 1);
        assert_eq!(extraction.mapping_stats.pending_review, 1);
        assert!(!extraction.is_fully_confirmed);
        assert!(extraction.confirmed_at.is_none());
        assert!(extraction.fast_pass_completed);
        // Normalization resolved at ingestion
        assert_eq!(extraction.items[0].value_normalized, Some(100.0));
    }

    #[test]
    fn test_create_unknown_document_fails() {
        let db = setup(None);
        let err = create(&db, "ghost", None, vec![]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_fully_confirmed_schedules_merge() {
        let db = setup(None);
        let mut confirmed = item("a", MappingStatus::Confirmed, None);
        confirmed.item_code = Some("REV01".to_string());

        let extraction = create(&db, "doc-1", Some("proj-1"), vec![confirmed]).unwrap();
        assert!(extraction.is_fully_confirmed);
        assert!(extraction.confirmed_at.is_some());

        let pending = db.pending_merge_tasks(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].extraction_id, extraction.id);
        assert_eq!(pending[0].project_id.as_deref(), Some("proj-1"));
    }

    #[test]
    fn test_no_merge_without_resolvable_project() {
        let db = setup(None);
        let extraction =
            create(&db, "doc-1", None, vec![item("a", MappingStatus::Matched, None)]).unwrap();

        assert!(extraction.is_fully_confirmed);
        assert!(db.pending_merge_tasks(None).unwrap().is_empty());
    }

    #[test]
    fn test_project_resolves_through_document() {
        let db = setup(Some("proj-from-doc"));
        create(&db, "doc-1", None, vec![item("a", MappingStatus::Matched, None)]).unwrap();

        let pending = db.pending_merge_tasks(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].project_id.as_deref(), Some("proj-from-doc"));
    }

    #[test]
    fn test_confirm_item_sets_code_and_confidence() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            Some("proj-1"),
            vec![item("a", MappingStatus::PendingReview, None)],
        )
        .unwrap();

        let outcome = confirm_item(&db, &extraction.id, "a", "OPX02", Some("code-7")).unwrap();
        assert!(outcome.is_fully_confirmed);
        assert_eq!(outcome.stats.confirmed, 1);
        assert_eq!(outcome.stats.pending_review, 0);
        assert!(outcome.merge_scheduled);

        let reloaded = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert_eq!(reloaded.items[0].item_code.as_deref(), Some("OPX02"));
        assert_eq!(reloaded.items[0].suggested_code_id.as_deref(), Some("code-7"));
        assert_eq!(reloaded.items[0].confidence, 1.0);
        assert!(reloaded.confirmed_at.is_some());
    }

    #[test]
    fn test_confirm_unknown_item_is_not_found() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            None,
            vec![item("a", MappingStatus::PendingReview, None)],
        )
        .unwrap();

        let err = confirm_item(&db, &extraction.id, "ghost", "REV01", None).unwrap_err();
        assert!(err.is_not_found());

        // Nothing changed
        let reloaded = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert_eq!(reloaded.mapping_stats.pending_review, 1);
    }

    #[test]
    fn test_confirm_on_missing_extraction_is_not_found() {
        let db = setup(None);
        let err = confirm_item(&db, "ghost", "a", "REV01", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_confirm_all_suggested_scope() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            Some("proj-1"),
            vec![
                item("a", MappingStatus::Suggested, Some("REV01")),
                item("b", MappingStatus::PendingReview, None),
                item("c", MappingStatus::Suggested, None),
                item("d", MappingStatus::Matched, None),
            ],
        )
        .unwrap();

        let outcome = confirm_all_suggested(&db, &extraction.id).unwrap();

        // Only the suggested item with a suggestion moved
        assert_eq!(outcome.confirmed_items.len(), 1);
        assert_eq!(outcome.confirmed_items[0].id, "a");
        assert_eq!(outcome.confirmed_items[0].item_code.as_deref(), Some("REV01"));
        assert_eq!(outcome.confirmed_items[0].confidence, 1.0);

        // b is still pending, so the extraction stays open
        assert!(!outcome.is_fully_confirmed);
        assert_eq!(outcome.stats.pending_review, 1);
        assert_eq!(outcome.stats.confirmed, 1);
        assert_eq!(outcome.stats.suggested, 1);
        assert_eq!(outcome.stats.matched, 1);

        let reloaded = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert_eq!(reloaded.items[1].mapping_status, MappingStatus::PendingReview);
        assert_eq!(reloaded.items[2].mapping_status, MappingStatus::Suggested);
        assert_eq!(reloaded.items[3].mapping_status, MappingStatus::Matched);
    }

    #[test]
    fn test_skip_item_zeroes_confidence() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            None,
            vec![item("a", MappingStatus::Suggested, Some("REV01"))],
        )
        .unwrap();

        let outcome = skip_item(&db, &extraction.id, "a").unwrap();
        assert!(outcome.is_fully_confirmed);
        assert_eq!(outcome.stats.unmatched, 1);

        let reloaded = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert_eq!(reloaded.items[0].mapping_status, MappingStatus::Unmatched);
        assert_eq!(reloaded.items[0].confidence, 0.0);
    }

    #[test]
    fn test_add_item_appends_and_recomputes() {
        let db = setup(None);
        let extraction =
            create(&db, "doc-1", None, vec![item("a", MappingStatus::Matched, None)]).unwrap();

        let mut new_item = item("", MappingStatus::PendingReview, None);
        new_item.value = ItemValue::Text("£1,250.50".to_string());
        let outcome = add_item(&db, &extraction.id, new_item).unwrap();

        assert_eq!(outcome.stats.total(), 2);
        assert!(!outcome.is_fully_confirmed);

        let reloaded = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert!(!reloaded.items[1].id.is_empty());
        assert_eq!(reloaded.items[1].value_normalized, Some(1250.5));
    }

    #[test]
    fn test_smart_pass_replaces_items() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            Some("proj-1"),
            vec![item("a", MappingStatus::PendingReview, None)],
        )
        .unwrap();

        let mut replacement = item("a2", MappingStatus::Matched, None);
        replacement.item_code = Some("REV01".to_string());
        let updated = update_after_smart_pass(&db, &extraction.id, vec![replacement]).unwrap();

        assert!(updated.smart_pass_completed);
        assert!(updated.smart_pass_at.is_some());
        assert!(updated.is_fully_confirmed);
        assert!(updated.confirmed_at.is_some());
        assert_eq!(updated.mapping_stats.matched, 1);
        assert_eq!(db.pending_merge_tasks(None).unwrap().len(), 1);
    }

    #[test]
    fn test_soft_delete_hides_from_document_lookup() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            None,
            vec![item("a", MappingStatus::PendingReview, None)],
        )
        .unwrap();

        soft_delete(&db, &extraction.id, Some("superseded upload")).unwrap();

        assert!(get_by_document(&db, "doc-1").unwrap().is_none());
        let raw = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert!(raw.is_deleted);
        assert_eq!(raw.deleted_reason.as_deref(), Some("superseded upload"));
        assert!(raw.deleted_at.is_some());
    }

    #[test]
    fn test_confirmed_at_stamped_only_on_transition() {
        let db = setup(None);
        let extraction = create(
            &db,
            "doc-1",
            Some("proj-1"),
            vec![
                item("a", MappingStatus::PendingReview, None),
                item("b", MappingStatus::PendingReview, None),
            ],
        )
        .unwrap();

        confirm_item(&db, &extraction.id, "a", "REV01", None).unwrap();
        let partial = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert!(partial.confirmed_at.is_none());

        confirm_item(&db, &extraction.id, "b", "REV02", None).unwrap();
        let done = db.get_extraction(&extraction.id).unwrap().unwrap();
        let first_stamp = done.confirmed_at.unwrap();

        // A later mutation must not move the stamp
        add_item(&db, &extraction.id, item("c", MappingStatus::Confirmed, None)).unwrap();
        let after = db.get_extraction(&extraction.id).unwrap().unwrap();
        assert_eq!(after.confirmed_at.unwrap(), first_stamp);
    }
}
