//! SQLite storage layer for Codify
//!
//! This module handles persistent storage of:
//! - Registered source documents
//! - Codified extractions and their derived mapping stats
//! - Project data library records with value history
//! - The merge outbox (scheduled merge tasks with visible status)

mod schema;

pub use schema::SCHEMA;

use crate::error::{PipelineError, Result};
use crate::jobs::{MergeTask, TaskStatus};
use crate::model::{CodifiedExtraction, CodifiedItem, MappingStats, ProjectDataItem, SourceDocument};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Documents ====================

    /// Register or update a source document
    pub fn upsert_document(&self, doc: &SourceDocument) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO documents (id, file_name, project_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                file_name = excluded.file_name,
                project_id = excluded.project_id
            "#,
            params![
                doc.id,
                doc.file_name,
                doc.project_id,
                doc.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> Result<Option<SourceDocument>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, file_name, project_id, created_at FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, file_name, project_id, created_at)) => Ok(Some(SourceDocument {
                id,
                file_name,
                project_id,
                created_at: parse_ts(&created_at, "created_at")?,
            })),
            None => Ok(None),
        }
    }

    /// List all registered documents
    pub fn list_documents(&self) -> Result<Vec<SourceDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, project_id, created_at FROM documents ORDER BY created_at",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, file_name, project_id, created_at) = row?;
            docs.push(SourceDocument {
                id,
                file_name,
                project_id,
                created_at: parse_ts(&created_at, "created_at")?,
            });
        }

        Ok(docs)
    }

    // ==================== Extractions ====================

    /// Insert a codified extraction
    pub fn insert_extraction(&self, extraction: &CodifiedExtraction) -> Result<()> {
        let items_json = serde_json::to_string(&extraction.items)?;

        self.conn.execute(
            r#"
            INSERT INTO extractions (
                id, document_id, project_id, items,
                matched, suggested, pending_review, confirmed, unmatched,
                fast_pass_completed, smart_pass_completed, is_fully_confirmed,
                merged_to_project_library, merged_at,
                codified_at, smart_pass_at, confirmed_at,
                is_deleted, deleted_at, deleted_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                extraction.id,
                extraction.document_id,
                extraction.project_id,
                items_json,
                extraction.mapping_stats.matched as i64,
                extraction.mapping_stats.suggested as i64,
                extraction.mapping_stats.pending_review as i64,
                extraction.mapping_stats.confirmed as i64,
                extraction.mapping_stats.unmatched as i64,
                extraction.fast_pass_completed,
                extraction.smart_pass_completed,
                extraction.is_fully_confirmed,
                extraction.merged_to_project_library,
                extraction.merged_at.map(|t| t.to_rfc3339()),
                extraction.codified_at.to_rfc3339(),
                extraction.smart_pass_at.map(|t| t.to_rfc3339()),
                extraction.confirmed_at.map(|t| t.to_rfc3339()),
                extraction.is_deleted,
                extraction.deleted_at.map(|t| t.to_rfc3339()),
                extraction.deleted_reason,
            ],
        )?;

        Ok(())
    }

    /// Rewrite the mutable columns of an extraction
    pub fn update_extraction(&self, extraction: &CodifiedExtraction) -> Result<()> {
        let items_json = serde_json::to_string(&extraction.items)?;

        let updated = self.conn.execute(
            r#"
            UPDATE extractions SET
                project_id = ?2,
                items = ?3,
                matched = ?4, suggested = ?5, pending_review = ?6,
                confirmed = ?7, unmatched = ?8,
                fast_pass_completed = ?9, smart_pass_completed = ?10,
                is_fully_confirmed = ?11,
                merged_to_project_library = ?12, merged_at = ?13,
                smart_pass_at = ?14, confirmed_at = ?15,
                is_deleted = ?16, deleted_at = ?17, deleted_reason = ?18
            WHERE id = ?1
            "#,
            params![
                extraction.id,
                extraction.project_id,
                items_json,
                extraction.mapping_stats.matched as i64,
                extraction.mapping_stats.suggested as i64,
                extraction.mapping_stats.pending_review as i64,
                extraction.mapping_stats.confirmed as i64,
                extraction.mapping_stats.unmatched as i64,
                extraction.fast_pass_completed,
                extraction.smart_pass_completed,
                extraction.is_fully_confirmed,
                extraction.merged_to_project_library,
                extraction.merged_at.map(|t| t.to_rfc3339()),
                extraction.smart_pass_at.map(|t| t.to_rfc3339()),
                extraction.confirmed_at.map(|t| t.to_rfc3339()),
                extraction.is_deleted,
                extraction.deleted_at.map(|t| t.to_rfc3339()),
                extraction.deleted_reason,
            ],
        )?;

        if updated == 0 {
            return Err(PipelineError::not_found("extraction", &extraction.id));
        }

        Ok(())
    }

    /// Get an extraction by ID
    pub fn get_extraction(&self, id: &str) -> Result<Option<CodifiedExtraction>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_EXTRACTION),
                params![id],
                extraction_row,
            )
            .optional()?;

        result.map(ExtractionRow::into_extraction).transpose()
    }

    /// Most recent non-deleted extraction for a document
    ///
    /// Tie-break: highest `codified_at` (RFC 3339 strings sort correctly).
    pub fn latest_extraction_for_document(
        &self,
        document_id: &str,
    ) -> Result<Option<CodifiedExtraction>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE document_id = ?1 AND is_deleted = 0 \
                     ORDER BY codified_at DESC LIMIT 1",
                    SELECT_EXTRACTION
                ),
                params![document_id],
                extraction_row,
            )
            .optional()?;

        result.map(ExtractionRow::into_extraction).transpose()
    }

    /// All non-deleted extractions, optionally scoped to one project
    pub fn list_extractions(&self, project_id: Option<&str>) -> Result<Vec<CodifiedExtraction>> {
        let (sql, args): (String, Vec<&dyn rusqlite::ToSql>) = match project_id {
            Some(ref p) => (
                format!(
                    "{} WHERE is_deleted = 0 AND project_id = ?1 ORDER BY codified_at",
                    SELECT_EXTRACTION
                ),
                vec![p as &dyn rusqlite::ToSql],
            ),
            None => (
                format!("{} WHERE is_deleted = 0 ORDER BY codified_at", SELECT_EXTRACTION),
                vec![],
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), extraction_row)?;

        let mut extractions = Vec::new();
        for row in rows {
            extractions.push(row?.into_extraction()?);
        }

        Ok(extractions)
    }

    // ==================== Project Data Library ====================

    /// Insert or update a library record
    pub fn upsert_project_item(&self, item: &ProjectDataItem) -> Result<()> {
        let history_json = serde_json::to_string(&item.value_history)?;
        let value_json = serde_json::to_string(&item.current_value)?;

        self.conn.execute(
            r#"
            INSERT INTO project_items (
                id, project_id, item_code, category,
                current_value, current_value_normalized, current_data_type,
                current_source_document_id, current_source_document_name,
                last_updated_at, last_updated_by,
                has_multiple_sources, value_variance, value_history, is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(project_id, item_code) DO UPDATE SET
                category = excluded.category,
                current_value = excluded.current_value,
                current_value_normalized = excluded.current_value_normalized,
                current_data_type = excluded.current_data_type,
                current_source_document_id = excluded.current_source_document_id,
                current_source_document_name = excluded.current_source_document_name,
                last_updated_at = excluded.last_updated_at,
                last_updated_by = excluded.last_updated_by,
                has_multiple_sources = excluded.has_multiple_sources,
                value_variance = excluded.value_variance,
                value_history = excluded.value_history,
                is_deleted = excluded.is_deleted
            "#,
            params![
                item.id,
                item.project_id,
                item.item_code,
                item.category,
                value_json,
                item.current_value_normalized,
                item.current_data_type,
                item.current_source_document_id,
                item.current_source_document_name,
                item.last_updated_at.to_rfc3339(),
                item.last_updated_by,
                item.has_multiple_sources,
                item.value_variance,
                history_json,
                item.is_deleted,
            ],
        )?;

        Ok(())
    }

    /// Look up a library record by its composite key
    pub fn get_project_item(
        &self,
        project_id: &str,
        item_code: &str,
    ) -> Result<Option<ProjectDataItem>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE project_id = ?1 AND item_code = ?2",
                    SELECT_PROJECT_ITEM
                ),
                params![project_id, item_code],
                project_item_row,
            )
            .optional()?;

        result.map(ProjectItemRow::into_item).transpose()
    }

    /// All library records for a project
    pub fn list_project_items(&self, project_id: &str) -> Result<Vec<ProjectDataItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE project_id = ?1 ORDER BY item_code",
            SELECT_PROJECT_ITEM
        ))?;

        let rows = stmt.query_map(params![project_id], project_item_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_item()?);
        }

        Ok(items)
    }

    /// Apply a merge atomically
    ///
    /// Upserts every folded library record and rewrites the extraction's
    /// merge flags in a single transaction, so a failure leaves neither a
    /// partially merged library nor a wrongly stamped extraction.
    pub fn apply_merge(
        &self,
        extraction: &CodifiedExtraction,
        items: &[ProjectDataItem],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        for item in items {
            self.upsert_project_item(item)?;
        }
        self.update_extraction(extraction)?;

        tx.commit()?;
        Ok(())
    }

    // ==================== Merge Outbox ====================

    /// Enqueue a merge task unless one is already pending for the extraction
    ///
    /// Returns true if a task was inserted.
    pub fn enqueue_merge(&self, extraction_id: &str, project_id: Option<&str>) -> Result<bool> {
        let pending: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM merge_tasks WHERE extraction_id = ?1 AND status = 'pending')",
            params![extraction_id],
            |row| row.get(0),
        )?;

        if pending {
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO merge_tasks (extraction_id, project_id, status, created_at) \
             VALUES (?1, ?2, 'pending', ?3)",
            params![extraction_id, project_id, Utc::now().to_rfc3339()],
        )?;

        Ok(true)
    }

    /// Pending merge tasks in creation order
    pub fn pending_merge_tasks(&self, limit: Option<usize>) -> Result<Vec<MergeTask>> {
        // SQLite treats a negative LIMIT as unlimited
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(
            "SELECT id, extraction_id, project_id, status, attempts, error, created_at, finished_at \
             FROM merge_tasks WHERE status = 'pending' ORDER BY id LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], merge_task_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }

        Ok(tasks)
    }

    /// Record a task outcome and bump its attempt counter
    pub fn finish_merge_task(
        &self,
        task_id: i64,
        outcome: std::result::Result<(), &str>,
    ) -> Result<()> {
        let (status, error) = match outcome {
            Ok(()) => (TaskStatus::Done, None),
            Err(e) => (TaskStatus::Failed, Some(e)),
        };

        self.conn.execute(
            "UPDATE merge_tasks SET status = ?2, error = ?3, attempts = attempts + 1, \
             finished_at = ?4 WHERE id = ?1",
            params![task_id, status.as_str(), error, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// All tasks recorded for one extraction, oldest first
    pub fn merge_tasks_for_extraction(&self, extraction_id: &str) -> Result<Vec<MergeTask>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, extraction_id, project_id, status, attempts, error, created_at, finished_at \
             FROM merge_tasks WHERE extraction_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![extraction_id], merge_task_row)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }

        Ok(tasks)
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let documents: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let extractions: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM extractions WHERE is_deleted = 0",
            [],
            |row| row.get(0),
        )?;

        let fully_confirmed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM extractions WHERE is_deleted = 0 AND is_fully_confirmed = 1",
            [],
            |row| row.get(0),
        )?;

        let merged: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM extractions WHERE is_deleted = 0 AND merged_to_project_library = 1",
            [],
            |row| row.get(0),
        )?;

        let project_items: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM project_items WHERE is_deleted = 0",
            [],
            |row| row.get(0),
        )?;

        let pending_tasks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM merge_tasks WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        let failed_tasks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM merge_tasks WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )?;

        Ok(DatabaseStats {
            documents: documents as usize,
            extractions: extractions as usize,
            fully_confirmed: fully_confirmed as usize,
            merged: merged as usize,
            project_items: project_items as usize,
            pending_tasks: pending_tasks as usize,
            failed_tasks: failed_tasks as usize,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub documents: usize,
    pub extractions: usize,
    pub fully_confirmed: usize,
    pub merged: usize,
    pub project_items: usize,
    pub pending_tasks: usize,
    pub failed_tasks: usize,
}

// Internal row types for database mapping

const SELECT_EXTRACTION: &str = r#"
    SELECT id, document_id, project_id, items,
           matched, suggested, pending_review, confirmed, unmatched,
           fast_pass_completed, smart_pass_completed, is_fully_confirmed,
           merged_to_project_library, merged_at,
           codified_at, smart_pass_at, confirmed_at,
           is_deleted, deleted_at, deleted_reason
    FROM extractions
"#;

struct ExtractionRow {
    id: String,
    document_id: String,
    project_id: Option<String>,
    items: String,
    matched: i64,
    suggested: i64,
    pending_review: i64,
    confirmed: i64,
    unmatched: i64,
    fast_pass_completed: bool,
    smart_pass_completed: bool,
    is_fully_confirmed: bool,
    merged_to_project_library: bool,
    merged_at: Option<String>,
    codified_at: String,
    smart_pass_at: Option<String>,
    confirmed_at: Option<String>,
    is_deleted: bool,
    deleted_at: Option<String>,
    deleted_reason: Option<String>,
}

fn extraction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractionRow> {
    Ok(ExtractionRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        project_id: row.get(2)?,
        items: row.get(3)?,
        matched: row.get(4)?,
        suggested: row.get(5)?,
        pending_review: row.get(6)?,
        confirmed: row.get(7)?,
        unmatched: row.get(8)?,
        fast_pass_completed: row.get(9)?,
        smart_pass_completed: row.get(10)?,
        is_fully_confirmed: row.get(11)?,
        merged_to_project_library: row.get(12)?,
        merged_at: row.get(13)?,
        codified_at: row.get(14)?,
        smart_pass_at: row.get(15)?,
        confirmed_at: row.get(16)?,
        is_deleted: row.get(17)?,
        deleted_at: row.get(18)?,
        deleted_reason: row.get(19)?,
    })
}

impl ExtractionRow {
    fn into_extraction(self) -> Result<CodifiedExtraction> {
        // Unknown mapping statuses inside the JSON fail here rather than
        // being silently defaulted
        let items: Vec<CodifiedItem> = serde_json::from_str(&self.items)?;

        Ok(CodifiedExtraction {
            id: self.id,
            document_id: self.document_id,
            project_id: self.project_id,
            items,
            mapping_stats: MappingStats {
                matched: self.matched as usize,
                suggested: self.suggested as usize,
                pending_review: self.pending_review as usize,
                confirmed: self.confirmed as usize,
                unmatched: self.unmatched as usize,
            },
            fast_pass_completed: self.fast_pass_completed,
            smart_pass_completed: self.smart_pass_completed,
            is_fully_confirmed: self.is_fully_confirmed,
            merged_to_project_library: self.merged_to_project_library,
            merged_at: parse_opt_ts(self.merged_at, "merged_at")?,
            codified_at: parse_ts(&self.codified_at, "codified_at")?,
            smart_pass_at: parse_opt_ts(self.smart_pass_at, "smart_pass_at")?,
            confirmed_at: parse_opt_ts(self.confirmed_at, "confirmed_at")?,
            is_deleted: self.is_deleted,
            deleted_at: parse_opt_ts(self.deleted_at, "deleted_at")?,
            deleted_reason: self.deleted_reason,
        })
    }
}

const SELECT_PROJECT_ITEM: &str = r#"
    SELECT id, project_id, item_code, category,
           current_value, current_value_normalized, current_data_type,
           current_source_document_id, current_source_document_name,
           last_updated_at, last_updated_by,
           has_multiple_sources, value_variance, value_history, is_deleted
    FROM project_items
"#;

struct ProjectItemRow {
    id: String,
    project_id: String,
    item_code: String,
    category: Option<String>,
    current_value: String,
    current_value_normalized: f64,
    current_data_type: Option<String>,
    current_source_document_id: String,
    current_source_document_name: String,
    last_updated_at: String,
    last_updated_by: Option<String>,
    has_multiple_sources: bool,
    value_variance: Option<f64>,
    value_history: String,
    is_deleted: bool,
}

fn project_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectItemRow> {
    Ok(ProjectItemRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        item_code: row.get(2)?,
        category: row.get(3)?,
        current_value: row.get(4)?,
        current_value_normalized: row.get(5)?,
        current_data_type: row.get(6)?,
        current_source_document_id: row.get(7)?,
        current_source_document_name: row.get(8)?,
        last_updated_at: row.get(9)?,
        last_updated_by: row.get(10)?,
        has_multiple_sources: row.get(11)?,
        value_variance: row.get(12)?,
        value_history: row.get(13)?,
        is_deleted: row.get(14)?,
    })
}

impl ProjectItemRow {
    fn into_item(self) -> Result<ProjectDataItem> {
        Ok(ProjectDataItem {
            id: self.id,
            project_id: self.project_id,
            item_code: self.item_code,
            category: self.category,
            current_value: serde_json::from_str(&self.current_value)?,
            current_value_normalized: self.current_value_normalized,
            current_data_type: self.current_data_type,
            current_source_document_id: self.current_source_document_id,
            current_source_document_name: self.current_source_document_name,
            last_updated_at: parse_ts(&self.last_updated_at, "last_updated_at")?,
            last_updated_by: self.last_updated_by,
            has_multiple_sources: self.has_multiple_sources,
            value_variance: self.value_variance,
            value_history: serde_json::from_str(&self.value_history)?,
            is_deleted: self.is_deleted,
        })
    }
}

struct MergeTaskRow {
    id: i64,
    extraction_id: String,
    project_id: Option<String>,
    status: String,
    attempts: i64,
    error: Option<String>,
    created_at: String,
    finished_at: Option<String>,
}

fn merge_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MergeTaskRow> {
    Ok(MergeTaskRow {
        id: row.get(0)?,
        extraction_id: row.get(1)?,
        project_id: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        finished_at: row.get(7)?,
    })
}

impl MergeTaskRow {
    fn into_task(self) -> Result<MergeTask> {
        Ok(MergeTask {
            id: self.id,
            extraction_id: self.extraction_id,
            project_id: self.project_id,
            status: TaskStatus::parse(&self.status)?,
            attempts: self.attempts as u32,
            error: self.error,
            created_at: parse_ts(&self.created_at, "created_at")?,
            finished_at: parse_opt_ts(self.finished_at, "finished_at")?,
        })
    }
}

fn parse_ts(s: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            PipelineError::InvalidInput(format!("bad {} timestamp {:?}: {}", field, s, e))
        })
}

fn parse_opt_ts(s: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s, field)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemValue, MappingStatus};

    fn sample_extraction(id: &str, document_id: &str) -> CodifiedExtraction {
        let items = vec![CodifiedItem {
            id: "a".to_string(),
            original_name: "Gross Revenue".to_string(),
            value: ItemValue::Text("£1,250.50".to_string()),
            value_normalized: Some(1250.5),
            data_type: Some("currency".to_string()),
            category: Some("revenue".to_string()),
            item_code: None,
            suggested_code: Some("REV01".to_string()),
            suggested_code_id: None,
            mapping_status: MappingStatus::Suggested,
            confidence: 0.82,
            is_subtotal: None,
            subtotal_reason: None,
        }];
        let derived = crate::model::recompute_derived(&items);

        CodifiedExtraction {
            id: id.to_string(),
            document_id: document_id.to_string(),
            project_id: Some("proj-1".to_string()),
            items,
            mapping_stats: derived.stats,
            fast_pass_completed: true,
            smart_pass_completed: false,
            is_fully_confirmed: derived.is_fully_confirmed,
            merged_to_project_library: false,
            merged_at: None,
            codified_at: Utc::now(),
            smart_pass_at: None,
            confirmed_at: None,
            is_deleted: false,
            deleted_at: None,
            deleted_reason: None,
        }
    }

    #[test]
    fn test_database_creation() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.extractions, 0);
        assert_eq!(stats.project_items, 0);
    }

    #[test]
    fn test_extraction_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let extraction = sample_extraction("ext-1", "doc-1");
        db.insert_extraction(&extraction).unwrap();

        let loaded = db.get_extraction("ext-1").unwrap().unwrap();
        assert_eq!(loaded.document_id, "doc-1");
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].mapping_status, MappingStatus::Suggested);
        assert_eq!(loaded.items[0].value_normalized, Some(1250.5));
        assert_eq!(loaded.mapping_stats.suggested, 1);
        assert!(!loaded.is_fully_confirmed);
    }

    #[test]
    fn test_latest_extraction_skips_deleted() {
        let db = Database::open_in_memory().unwrap();

        let mut older = sample_extraction("ext-1", "doc-1");
        older.codified_at = Utc::now() - chrono::Duration::hours(1);
        db.insert_extraction(&older).unwrap();

        let mut newer = sample_extraction("ext-2", "doc-1");
        newer.is_deleted = true;
        db.insert_extraction(&newer).unwrap();

        let latest = db.latest_extraction_for_document("doc-1").unwrap().unwrap();
        assert_eq!(latest.id, "ext-1");
    }

    #[test]
    fn test_latest_extraction_prefers_newest() {
        let db = Database::open_in_memory().unwrap();

        let mut older = sample_extraction("ext-1", "doc-1");
        older.codified_at = Utc::now() - chrono::Duration::hours(2);
        db.insert_extraction(&older).unwrap();

        let newer = sample_extraction("ext-2", "doc-1");
        db.insert_extraction(&newer).unwrap();

        let latest = db.latest_extraction_for_document("doc-1").unwrap().unwrap();
        assert_eq!(latest.id, "ext-2");
    }

    #[test]
    fn test_update_missing_extraction_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let extraction = sample_extraction("ghost", "doc-1");

        let err = db.update_extraction(&extraction).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_project_item_keyed_lookup() {
        let db = Database::open_in_memory().unwrap();

        let item = ProjectDataItem::first(
            "proj-1",
            "REV01",
            crate::model::library::ValueContribution {
                value: ItemValue::Number(100.0),
                value_normalized: 100.0,
                data_type: None,
                category: None,
                original_name: "Revenue".to_string(),
                source_document_id: "doc-1".to_string(),
                source_document_name: "doc-1.pdf".to_string(),
                source_extraction_id: "ext-1".to_string(),
                added_by: None,
                added_at: Utc::now(),
            },
        );
        db.upsert_project_item(&item).unwrap();

        assert!(db.get_project_item("proj-1", "REV01").unwrap().is_some());
        assert!(db.get_project_item("proj-1", "REV02").unwrap().is_none());
        assert!(db.get_project_item("proj-2", "REV01").unwrap().is_none());

        // Upserting the same key again must not create a duplicate
        db.upsert_project_item(&item).unwrap();
        assert_eq!(db.list_project_items("proj-1").unwrap().len(), 1);
    }

    #[test]
    fn test_outbox_dedupes_pending() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.enqueue_merge("ext-1", Some("proj-1")).unwrap());
        assert!(!db.enqueue_merge("ext-1", Some("proj-1")).unwrap());

        let pending = db.pending_merge_tasks(None).unwrap();
        assert_eq!(pending.len(), 1);

        db.finish_merge_task(pending[0].id, Ok(())).unwrap();
        assert!(db.pending_merge_tasks(None).unwrap().is_empty());

        // A new task may be enqueued once the prior one completed
        assert!(db.enqueue_merge("ext-1", Some("proj-1")).unwrap());
    }

    #[test]
    fn test_failed_task_records_error() {
        let db = Database::open_in_memory().unwrap();
        db.enqueue_merge("ext-1", None).unwrap();

        let pending = db.pending_merge_tasks(None).unwrap();
        db.finish_merge_task(pending[0].id, Err("no resolvable project")).unwrap();

        let tasks = db.merge_tasks_for_extraction("ext-1").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert_eq!(tasks[0].attempts, 1);
        assert_eq!(tasks[0].error.as_deref(), Some("no resolvable project"));
    }
}
