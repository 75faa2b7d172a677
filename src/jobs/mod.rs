//! Merge outbox worker and administrative backfill jobs
//!
//! Confirmation mutations enqueue merge tasks instead of calling the merge
//! engine inline; the worker drains them and records done/failed per task,
//! so a failed merge is visible in the outbox rather than only as a missing
//! merge stamp. The two backfill jobs are idempotent sweeps that repair
//! extractions the normal flow missed. Both report per-item action logs
//! instead of aborting the batch on the first failure.

use crate::error::{PipelineError, Result};
use crate::merge::{MergeEngine, MergeOutcome};
use crate::storage::Database;
use crate::workflow::resolve_project;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Lifecycle of a scheduled merge task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the merge outbox
#[derive(Debug, Clone, Serialize)]
pub struct MergeTask {
    pub id: i64,
    pub extraction_id: String,
    pub project_id: Option<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of one drained task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: i64,
    pub extraction_id: String,
    pub status: TaskStatus,
    pub outcome: Option<MergeOutcome>,
    pub error: Option<String>,
}

/// Summary of one worker pass
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<TaskReport>,
}

/// Drain pending merge tasks, oldest first
///
/// Each task runs the merge engine and is marked done or failed with its
/// error text; a failing task never aborts the pass.
pub fn run_pending(
    db: &Database,
    engine: &MergeEngine,
    limit: Option<usize>,
) -> Result<WorkerReport> {
    let tasks = db.pending_merge_tasks(limit)?;
    let mut results = Vec::with_capacity(tasks.len());
    let mut succeeded = 0;
    let mut failed = 0;

    for task in &tasks {
        match engine.merge(db, &task.extraction_id, task.project_id.as_deref()) {
            Ok(outcome) => {
                db.finish_merge_task(task.id, Ok(()))?;
                succeeded += 1;
                results.push(TaskReport {
                    task_id: task.id,
                    extraction_id: task.extraction_id.clone(),
                    status: TaskStatus::Done,
                    outcome: Some(outcome),
                    error: None,
                });
            }
            Err(e) => {
                let message = e.to_string();
                warn!(task = task.id, extraction = %task.extraction_id, error = %message, "merge task failed");
                db.finish_merge_task(task.id, Err(&message))?;
                failed += 1;
                results.push(TaskReport {
                    task_id: task.id,
                    extraction_id: task.extraction_id.clone(),
                    status: TaskStatus::Failed,
                    outcome: None,
                    error: Some(message),
                });
            }
        }
    }

    if !results.is_empty() {
        info!(processed = results.len(), succeeded, failed, "drained merge outbox");
    }

    Ok(WorkerReport { processed: results.len(), succeeded, failed, results })
}

/// One line of a backfill action log
#[derive(Debug, Clone, Serialize)]
pub struct BackfillAction {
    pub extraction_id: String,
    pub action: String,
}

/// Report of a merge-unmerged sweep
#[derive(Debug, Clone, Serialize)]
pub struct MergeUnmergedReport {
    pub total_extractions: usize,
    pub unmerged_found: usize,
    pub merged_count: usize,
    pub results: Vec<BackfillAction>,
}

/// Schedule merges for fully confirmed extractions that never merged
///
/// Optionally scoped to one project. Safe to re-run: the outbox deduplicates
/// pending tasks and already-merged extractions are filtered out.
pub fn merge_unmerged(db: &Database, project_id: Option<&str>) -> Result<MergeUnmergedReport> {
    let extractions = db.list_extractions(project_id)?;
    let total_extractions = extractions.len();

    let mut unmerged_found = 0;
    let mut merged_count = 0;
    let mut results = Vec::new();

    for extraction in &extractions {
        if !extraction.is_fully_confirmed || extraction.merged_to_project_library {
            continue;
        }
        unmerged_found += 1;

        let action = match resolve_project(db, extraction)? {
            Some(project) => {
                if db.enqueue_merge(&extraction.id, Some(&project))? {
                    merged_count += 1;
                    format!("merge scheduled for project {}", project)
                } else {
                    "merge already pending".to_string()
                }
            }
            None => "skipped: no resolvable project".to_string(),
        };

        results.push(BackfillAction { extraction_id: extraction.id.clone(), action });
    }

    info!(total_extractions, unmerged_found, merged_count, "merge-unmerged sweep finished");
    Ok(MergeUnmergedReport { total_extractions, unmerged_found, merged_count, results })
}

/// Report of a project-id backfill
#[derive(Debug, Clone, Serialize)]
pub struct BackfillProjectIdsReport {
    pub total_extractions: usize,
    pub project_ids_updated: usize,
    pub merges_scheduled: usize,
    pub results: Vec<BackfillAction>,
}

/// Copy missing project links from source documents
///
/// Extractions that gain (or already had) a project and are confirmed but
/// unmerged also get a merge scheduled.
pub fn backfill_project_ids(db: &Database) -> Result<BackfillProjectIdsReport> {
    let extractions = db.list_extractions(None)?;
    let total_extractions = extractions.len();

    let mut project_ids_updated = 0;
    let mut merges_scheduled = 0;
    let mut results = Vec::new();

    for mut extraction in extractions {
        let mut actions = Vec::new();

        if extraction.project_id.is_none() {
            let document_project = db
                .get_document(&extraction.document_id)?
                .and_then(|d| d.project_id);

            match document_project {
                Some(project) => {
                    extraction.project_id = Some(project.clone());
                    db.update_extraction(&extraction)?;
                    project_ids_updated += 1;
                    actions.push(format!("project id backfilled from document: {}", project));
                }
                None => {
                    actions.push("no project on extraction or document".to_string());
                }
            }
        }

        if extraction.project_id.is_some()
            && extraction.is_fully_confirmed
            && !extraction.merged_to_project_library
            && db.enqueue_merge(&extraction.id, extraction.project_id.as_deref())?
        {
            merges_scheduled += 1;
            actions.push("merge scheduled".to_string());
        }

        if !actions.is_empty() {
            results.push(BackfillAction {
                extraction_id: extraction.id.clone(),
                action: actions.join("; "),
            });
        }
    }

    info!(total_extractions, project_ids_updated, merges_scheduled, "project-id backfill finished");
    Ok(BackfillProjectIdsReport {
        total_extractions,
        project_ids_updated,
        merges_scheduled,
        results,
    })
}
