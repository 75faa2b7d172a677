//! Project library merge engine
//!
//! Folds the accepted items of a fully confirmed extraction into the
//! per-project data library. The fold is planned in memory and applied in a
//! single transaction together with the extraction's merge stamp, so a
//! failure never leaves a partially merged library. Re-merging an already
//! merged extraction is a no-op with a distinguishable outcome.

use crate::error::{PipelineError, Result};
use crate::model::{CodifiedExtraction, MappingStatus, ProjectDataItem, ValueContribution};
use crate::storage::Database;
use crate::workflow::resolve_project;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of one merge call
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MergeOutcome {
    /// Items folded into the library (created + updated)
    pub merged: usize,
    pub updated: usize,
    pub created: usize,
    pub already_merged: bool,
}

impl MergeOutcome {
    fn already_merged() -> Self {
        Self { already_merged: true, ..Default::default() }
    }
}

/// What deleting an extraction would do to its project's library
///
/// Purely informational; nothing here mutates state.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteImpact {
    pub can_delete: bool,
    /// Library records this extraction contributed to
    pub merged_items: usize,
    /// Item codes with no other live source: deleting would remove them
    pub would_remove: Vec<String>,
    /// Item codes other sources still back: deleting would revert them
    pub would_revert: Vec<String>,
}

/// The merge engine
///
/// Carries the acting user recorded as `last_updated_by`/`added_by` on
/// library records.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    actor: Option<String>,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(actor: Option<String>) -> Self {
        Self { actor }
    }

    /// Merge an extraction's accepted items into the project library
    ///
    /// Project resolution order: explicit argument, the extraction's own
    /// link, the source document's link; none of those is a precondition
    /// failure. Items merge when their status is `confirmed` or `matched`
    /// and they carry a code (confirmed code, else the suggestion); items
    /// without one are skipped, not erred.
    pub fn merge(
        &self,
        db: &Database,
        extraction_id: &str,
        project_id: Option<&str>,
    ) -> Result<MergeOutcome> {
        let mut extraction = db
            .get_extraction(extraction_id)?
            .ok_or_else(|| PipelineError::not_found("extraction", extraction_id))?;

        if extraction.merged_to_project_library {
            debug!(extraction = %extraction_id, "already merged, skipping");
            return Ok(MergeOutcome::already_merged());
        }

        let project = match project_id {
            Some(p) => p.to_string(),
            None => resolve_project(db, &extraction)?.ok_or_else(|| {
                PipelineError::Precondition(format!(
                    "extraction {} has no resolvable project",
                    extraction_id
                ))
            })?,
        };

        let document = db
            .get_document(&extraction.document_id)?
            .ok_or_else(|| PipelineError::not_found("document", &extraction.document_id))?;

        let now = Utc::now();
        let mut staged: BTreeMap<String, ProjectDataItem> = BTreeMap::new();
        let mut created = 0;
        let mut updated = 0;

        for item in mergeable_items(&extraction) {
            let code = match item.effective_code() {
                Some(code) => code.to_string(),
                None => continue,
            };

            let contribution = ValueContribution {
                value: item.value.clone(),
                // Canonical numeric form; unreadable values count as zero
                value_normalized: item.value_normalized.unwrap_or(0.0),
                data_type: item.data_type.clone(),
                category: item.category.clone(),
                original_name: item.original_name.clone(),
                source_document_id: document.id.clone(),
                source_document_name: document.file_name.clone(),
                source_extraction_id: extraction.id.clone(),
                added_by: self.actor.clone(),
                added_at: now,
            };

            // Later items with the same code fold into the staged record so
            // the composite key stays unique within one merge
            match staged.remove(&code) {
                Some(mut record) => {
                    record.record_value(contribution);
                    updated += 1;
                    staged.insert(code, record);
                }
                None => match db.get_project_item(&project, &code)? {
                    Some(mut record) => {
                        record.record_value(contribution);
                        updated += 1;
                        staged.insert(code, record);
                    }
                    None => {
                        let record = ProjectDataItem::first(&project, &code, contribution);
                        created += 1;
                        staged.insert(code, record);
                    }
                },
            }
        }

        extraction.project_id = Some(project.clone());
        extraction.merged_to_project_library = true;
        extraction.merged_at = Some(now);

        let records: Vec<ProjectDataItem> = staged.into_values().collect();
        db.apply_merge(&extraction, &records)?;

        info!(
            extraction = %extraction_id,
            project = %project,
            created,
            updated,
            "merged extraction into project library"
        );

        Ok(MergeOutcome { merged: created + updated, created, updated, already_merged: false })
    }

    /// Classify what deleting an extraction would do to its project library
    pub fn delete_impact(&self, db: &Database, extraction_id: &str) -> Result<DeleteImpact> {
        let extraction = db
            .get_extraction(extraction_id)?
            .ok_or_else(|| PipelineError::not_found("extraction", extraction_id))?;

        let project = match resolve_project(db, &extraction)? {
            Some(project) => project,
            // Nothing can have been merged without a project
            None => {
                return Ok(DeleteImpact {
                    can_delete: true,
                    merged_items: 0,
                    would_remove: Vec::new(),
                    would_revert: Vec::new(),
                })
            }
        };

        let mut merged_items = 0;
        let mut would_remove = Vec::new();
        let mut would_revert = Vec::new();

        for record in db.list_project_items(&project)? {
            if record.entries_from(extraction_id) == 0 {
                continue;
            }
            merged_items += 1;

            let other_sources = record
                .value_history
                .iter()
                .any(|e| e.source_extraction_id != extraction_id && !e.was_reverted);

            if other_sources {
                would_revert.push(record.item_code);
            } else {
                would_remove.push(record.item_code);
            }
        }

        Ok(DeleteImpact { can_delete: true, merged_items, would_remove, would_revert })
    }
}

fn mergeable_items(
    extraction: &CodifiedExtraction,
) -> impl Iterator<Item = &crate::model::CodifiedItem> {
    extraction.items.iter().filter(|item| {
        matches!(
            item.mapping_status,
            MappingStatus::Confirmed | MappingStatus::Matched
        )
    })
}
