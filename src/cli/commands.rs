//! Command implementations

use crate::cli::{
    AddItemArgs, ConfirmArgs, DeleteArgs, ImpactArgs, IngestArgs, LibraryArgs, MergeArgs,
    OutputFormat, ShowArgs, SkipArgs, SmartPassArgs, WorkerArgs,
};
use crate::jobs;
use crate::merge::MergeEngine;
use crate::model::{CodifiedExtraction, CodifiedItem, ItemValue, MappingStatus, SourceDocument};
use crate::storage::Database;
use crate::workflow;
use crate::workspace::Workspace;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

/// Initialize Codify in a workspace
pub fn init(path: &Path, force: bool) -> Result<()> {
    let workspace = Workspace::open(path)?;

    let codify_dir = workspace.codify_dir();
    if codify_dir.exists() && !force {
        anyhow::bail!("Codify already initialized. Use --force to re-initialize.");
    }

    workspace.init_codify_dir()?;
    let db_path = workspace.db_path();
    let _db = Database::open(&db_path)?;
    workspace.config().save(workspace.root())?;

    println!("✓ Initialized Codify in {:?}", workspace.root());
    println!("  Database: {:?}", db_path);
    println!("  Config: {:?}", workspace.codify_dir().join("config.toml"));

    Ok(())
}

/// Show database statistics
pub fn status(path: &Path, format: OutputFormat) -> Result<()> {
    let (_, db) = open_db(path)?;
    let stats = db.get_stats()?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "documents": stats.documents,
                "extractions": stats.extractions,
                "fully_confirmed": stats.fully_confirmed,
                "merged": stats.merged,
                "project_items": stats.project_items,
                "pending_tasks": stats.pending_tasks,
                "failed_tasks": stats.failed_tasks,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Codify Status");
            println!("=============\n");
            println!("Documents:          {}", stats.documents);
            println!("Extractions:        {}", stats.extractions);
            println!("  Fully confirmed:  {}", stats.fully_confirmed);
            println!("  Merged:           {}", stats.merged);
            println!("Library records:    {}", stats.project_items);
            println!("Pending merges:     {}", stats.pending_tasks);
            if stats.failed_tasks > 0 {
                println!("⚠ Failed merges:    {}", stats.failed_tasks);
            }
        }
    }

    Ok(())
}

/// Register a source document
pub fn document_add(
    path: &Path,
    id: Option<&str>,
    name: &str,
    project: Option<&str>,
) -> Result<()> {
    let (_, db) = open_db(path)?;

    let doc = SourceDocument {
        id: id.map(|s| s.to_string()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        file_name: name.to_string(),
        project_id: project.map(|s| s.to_string()),
        created_at: Utc::now(),
    };
    db.upsert_document(&doc)?;

    println!("✓ Registered document {} ({})", doc.id, doc.file_name);
    if let Some(project) = &doc.project_id {
        println!("  Project: {}", project);
    }
    Ok(())
}

/// List registered documents
pub fn document_list(path: &Path, format: OutputFormat) -> Result<()> {
    let (_, db) = open_db(path)?;
    let docs = db.list_documents()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&docs)?),
        OutputFormat::Text => {
            if docs.is_empty() {
                println!("No documents registered.");
                return Ok(());
            }
            for doc in docs {
                println!(
                    "{}  {}  project={}",
                    doc.id,
                    doc.file_name,
                    doc.project_id.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

/// Ingest a codified extraction from a JSON item file
pub fn ingest(path: &Path, args: &IngestArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;
    let items = read_items(&args.items)?;

    let extraction = workflow::create(&db, &args.document, args.project.as_deref(), items)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&extraction)?),
        OutputFormat::Text => {
            println!("✓ Created extraction {}", extraction.id);
            print_extraction_summary(&extraction);
        }
    }

    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Replace an extraction's items after the smart pass
pub fn smart_pass(path: &Path, args: &SmartPassArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;
    let items = read_items(&args.items)?;

    let extraction = workflow::update_after_smart_pass(&db, &args.extraction_id, items)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&extraction)?),
        OutputFormat::Text => {
            println!("✓ Smart pass applied to {}", extraction.id);
            print_extraction_summary(&extraction);
        }
    }

    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Show the latest extraction for a document
pub fn show(path: &Path, args: &ShowArgs, format: OutputFormat) -> Result<()> {
    let (_, db) = open_db(path)?;

    let extraction = workflow::get_by_document(&db, &args.document_id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&extraction)?),
        OutputFormat::Text => match extraction {
            None => println!("No extraction found for document {}", args.document_id),
            Some(extraction) => {
                println!("Extraction {}", extraction.id);
                print_extraction_summary(&extraction);
                println!();
                for item in &extraction.items {
                    let code = item
                        .item_code
                        .as_deref()
                        .or(item.suggested_code.as_deref())
                        .unwrap_or("-");
                    println!(
                        "  [{}] {:14} {:30} code={} value={} confidence={:.2}",
                        item.id,
                        item.mapping_status.to_string(),
                        item.original_name,
                        code,
                        item.value,
                        item.confidence
                    );
                }
            }
        },
    }
    Ok(())
}

/// Confirm one item with a canonical code
pub fn confirm(path: &Path, args: &ConfirmArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let outcome = workflow::confirm_item(
        &db,
        &args.extraction_id,
        &args.item_id,
        &args.code,
        args.code_id.as_deref(),
    )?;

    print_outcome("Confirmed", &args.item_id, &outcome, format)?;
    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Confirm every suggested item with a suggestion
pub fn confirm_all(path: &Path, extraction_id: &str, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let outcome = workflow::confirm_all_suggested(&db, extraction_id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => {
            println!("✓ Confirmed {} suggested item(s)", outcome.confirmed_items.len());
            for item in &outcome.confirmed_items {
                println!(
                    "  {} -> {}",
                    item.original_name,
                    item.item_code.as_deref().unwrap_or("-")
                );
            }
            print_stats_line(&outcome.stats, outcome.is_fully_confirmed);
        }
    }

    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Mark one item as unmatched
pub fn skip(path: &Path, args: &SkipArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let outcome = workflow::skip_item(&db, &args.extraction_id, &args.item_id)?;

    print_outcome("Skipped", &args.item_id, &outcome, format)?;
    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Append a manually entered item
pub fn add_item(path: &Path, args: &AddItemArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let value = match args.value.parse::<f64>() {
        Ok(n) => ItemValue::Number(n),
        Err(_) => ItemValue::Text(args.value.clone()),
    };

    let item = CodifiedItem {
        id: String::new(),
        original_name: args.name.clone(),
        value,
        value_normalized: None,
        data_type: None,
        category: args.category.clone(),
        item_code: args.code.clone(),
        suggested_code: None,
        suggested_code_id: None,
        mapping_status: MappingStatus::parse(&args.status)?,
        confidence: 0.0,
        is_subtotal: None,
        subtotal_reason: None,
    };

    let outcome = workflow::add_item(&db, &args.extraction_id, item)?;

    print_outcome("Added", &args.name, &outcome, format)?;
    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Merge a confirmed extraction into the project library
pub fn merge(path: &Path, args: &MergeArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let engine = MergeEngine::with_actor(workspace.config().actor.clone());
    let outcome = engine.merge(&db, &args.extraction_id, args.project.as_deref())?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => {
            if outcome.already_merged {
                println!("Extraction {} was already merged.", args.extraction_id);
            } else {
                println!(
                    "✓ Merged {} item(s): {} created, {} updated",
                    outcome.merged, outcome.created, outcome.updated
                );
            }
        }
    }
    Ok(())
}

/// Show what deleting an extraction would do to the library
pub fn impact(path: &Path, args: &ImpactArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let engine = MergeEngine::with_actor(workspace.config().actor.clone());
    let impact = engine.delete_impact(&db, &args.extraction_id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&impact)?),
        OutputFormat::Text => {
            println!("Delete impact for {}", args.extraction_id);
            println!("  Library records contributed to: {}", impact.merged_items);
            if !impact.would_remove.is_empty() {
                println!("  ⚠ Would be removed (no other source):");
                for code in &impact.would_remove {
                    println!("    - {}", code);
                }
            }
            if !impact.would_revert.is_empty() {
                println!("  Would revert to another source:");
                for code in &impact.would_revert {
                    println!("    - {}", code);
                }
            }
        }
    }
    Ok(())
}

/// Soft-delete an extraction
pub fn delete(path: &Path, args: &DeleteArgs) -> Result<()> {
    let (_, db) = open_db(path)?;

    workflow::soft_delete(&db, &args.extraction_id, args.reason.as_deref())?;
    println!("✓ Deleted extraction {}", args.extraction_id);
    println!("  Merged library values are kept; run 'codify impact' before deleting to review them.");
    Ok(())
}

/// Show a project's data library
pub fn library(path: &Path, args: &LibraryArgs, format: OutputFormat) -> Result<()> {
    let (_, db) = open_db(path)?;
    let records = db.list_project_items(&args.project_id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No library records for project {}", args.project_id);
                return Ok(());
            }

            println!("Project {} — {} record(s)\n", args.project_id, records.len());
            for record in &records {
                let variance = record
                    .value_variance
                    .map(|v| format!("{:.1}%", v))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:12} {} (normalized {}) variance={} sources={}",
                    record.item_code,
                    record.current_value,
                    record.current_value_normalized,
                    variance,
                    if record.has_multiple_sources { "multiple" } else { "single" }
                );
                println!(
                    "             from {} at {}",
                    record.current_source_document_name,
                    record.last_updated_at.to_rfc3339()
                );
                if args.history {
                    for entry in &record.value_history {
                        let marker = if entry.is_current_value { "*" } else { " " };
                        println!(
                            "           {} {} from {} ({})",
                            marker,
                            entry.value,
                            entry.source_document_name,
                            entry.added_at.to_rfc3339()
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// Schedule merges for confirmed extractions that never merged
pub fn backfill_unmerged(path: &Path, project: Option<&str>, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let report = jobs::merge_unmerged(&db, project)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "Scanned {} extraction(s): {} unmerged, {} merge(s) scheduled",
                report.total_extractions, report.unmerged_found, report.merged_count
            );
            for entry in &report.results {
                println!("  {}: {}", entry.extraction_id, entry.action);
            }
        }
    }

    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Copy missing project links from source documents
pub fn backfill_project_ids(path: &Path, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let report = jobs::backfill_project_ids(&db)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "Scanned {} extraction(s): {} project id(s) backfilled, {} merge(s) scheduled",
                report.total_extractions, report.project_ids_updated, report.merges_scheduled
            );
            for entry in &report.results {
                println!("  {}: {}", entry.extraction_id, entry.action);
            }
        }
    }

    drain_outbox(&workspace, &db, format)?;
    Ok(())
}

/// Drain the merge outbox
pub fn worker(path: &Path, args: &WorkerArgs, format: OutputFormat) -> Result<()> {
    let (workspace, db) = open_db(path)?;

    let engine = MergeEngine::with_actor(workspace.config().actor.clone());
    let report = jobs::run_pending(&db, &engine, args.limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if report.processed == 0 {
                println!("No pending merge tasks.");
            } else {
                println!(
                    "Processed {} task(s): {} succeeded, {} failed",
                    report.processed, report.succeeded, report.failed
                );
                for result in &report.results {
                    match &result.error {
                        None => println!("  ✓ {} merged", result.extraction_id),
                        Some(error) => println!("  ⚠ {}: {}", result.extraction_id, error),
                    }
                }
            }
        }
    }
    Ok(())
}

// ==================== Helpers ====================

fn open_db(path: &Path) -> Result<(Workspace, Database)> {
    let workspace = Workspace::open(path)?;

    if !workspace.codify_dir().exists() {
        anyhow::bail!("Codify not initialized. Run 'codify init' first.");
    }

    let db = Database::open(workspace.db_path())?;
    Ok((workspace, db))
}

fn read_items(path: &Path) -> Result<Vec<CodifiedItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items file: {:?}", path))?;
    let items: Vec<CodifiedItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse items file: {:?}", path))?;
    Ok(items)
}

/// Run the outbox after a mutation when auto-merge is on
fn drain_outbox(workspace: &Workspace, db: &Database, format: OutputFormat) -> Result<()> {
    if !workspace.config().auto_merge {
        return Ok(());
    }

    let engine = MergeEngine::with_actor(workspace.config().actor.clone());
    let report = jobs::run_pending(db, &engine, None)?;

    if report.processed > 0 && format == OutputFormat::Text {
        println!(
            "→ Merge outbox: {} task(s), {} succeeded, {} failed",
            report.processed, report.succeeded, report.failed
        );
    }
    Ok(())
}

fn print_extraction_summary(extraction: &CodifiedExtraction) {
    print_stats_line(&extraction.mapping_stats, extraction.is_fully_confirmed);
    if extraction.merged_to_project_library {
        println!("  Merged to project library");
    }
    if let Some(project) = &extraction.project_id {
        println!("  Project: {}", project);
    }
}

fn print_stats_line(stats: &crate::model::MappingStats, fully_confirmed: bool) {
    println!(
        "  {} item(s): {} matched, {} suggested, {} pending, {} confirmed, {} unmatched{}",
        stats.total(),
        stats.matched,
        stats.suggested,
        stats.pending_review,
        stats.confirmed,
        stats.unmatched,
        if fully_confirmed { " — fully confirmed" } else { "" }
    );
}

fn print_outcome(
    verb: &str,
    subject: &str,
    outcome: &workflow::ConfirmOutcome,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => {
            println!("✓ {} {}", verb, subject);
            print_stats_line(&outcome.stats, outcome.is_fully_confirmed);
        }
    }
    Ok(())
}
