//! CLI interface using clap
//!
//! Provides the command-line interface for Codify

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Codify - extraction confirmation and project library tool
#[derive(Parser, Debug)]
#[command(name = "codify")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the workspace (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Codify in a workspace
    Init(InitArgs),

    /// Show database statistics
    Status,

    /// Manage registered source documents
    Document(DocumentArgs),

    /// Ingest a codified extraction for a document
    Ingest(IngestArgs),

    /// Replace an extraction's items after the smart pass
    SmartPass(SmartPassArgs),

    /// Show the latest extraction for a document
    Show(ShowArgs),

    /// Confirm one item with a canonical code
    Confirm(ConfirmArgs),

    /// Confirm every suggested item that carries a suggestion
    ConfirmAll(ConfirmAllArgs),

    /// Mark one item as unmatched
    Skip(SkipArgs),

    /// Append a manually entered item
    AddItem(AddItemArgs),

    /// Merge a confirmed extraction into the project library
    Merge(MergeArgs),

    /// Show what deleting an extraction would do to the library
    Impact(ImpactArgs),

    /// Soft-delete an extraction
    Delete(DeleteArgs),

    /// Show a project's data library
    Library(LibraryArgs),

    /// Administrative repair sweeps
    Backfill(BackfillArgs),

    /// Drain the merge outbox
    Worker(WorkerArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force re-initialization
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for document subcommands
#[derive(Parser, Debug)]
pub struct DocumentArgs {
    #[command(subcommand)]
    pub command: DocumentCommands,
}

#[derive(Subcommand, Debug)]
pub enum DocumentCommands {
    /// Register a source document
    Add {
        /// Document ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display file name
        #[arg(short, long)]
        name: String,

        /// Owning project
        #[arg(long)]
        project: Option<String>,
    },

    /// List registered documents
    List,
}

/// Arguments for ingest command
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Source document ID
    #[arg(short, long)]
    pub document: String,

    /// Owning project (falls back to the document's project)
    #[arg(long)]
    pub project: Option<String>,

    /// JSON file with the codified item array
    #[arg(short, long)]
    pub items: PathBuf,
}

/// Arguments for smart-pass command
#[derive(Parser, Debug)]
pub struct SmartPassArgs {
    /// Extraction ID
    pub extraction_id: String,

    /// JSON file with the replacement item array
    #[arg(short, long)]
    pub items: PathBuf,
}

/// Arguments for show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Document ID to look up
    pub document_id: String,
}

/// Arguments for confirm command
#[derive(Parser, Debug)]
pub struct ConfirmArgs {
    /// Extraction ID
    pub extraction_id: String,

    /// Item ID within the extraction
    pub item_id: String,

    /// Canonical code to confirm
    pub code: String,

    /// Canonical code directory entry ID
    #[arg(long)]
    pub code_id: Option<String>,
}

/// Arguments for confirm-all command
#[derive(Parser, Debug)]
pub struct ConfirmAllArgs {
    /// Extraction ID
    pub extraction_id: String,
}

/// Arguments for skip command
#[derive(Parser, Debug)]
pub struct SkipArgs {
    /// Extraction ID
    pub extraction_id: String,

    /// Item ID within the extraction
    pub item_id: String,
}

/// Arguments for add-item command
#[derive(Parser, Debug)]
pub struct AddItemArgs {
    /// Extraction ID
    pub extraction_id: String,

    /// Original line name
    #[arg(short, long)]
    pub name: String,

    /// Item value (parsed as a number when possible)
    #[arg(short, long)]
    pub value: String,

    /// Confirmed canonical code
    #[arg(long)]
    pub code: Option<String>,

    /// Mapping status (defaults to pending_review)
    #[arg(short, long, default_value = "pending_review")]
    pub status: String,

    /// Category label
    #[arg(long)]
    pub category: Option<String>,
}

/// Arguments for merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Extraction ID
    pub extraction_id: String,

    /// Project to merge into (overrides stored links)
    #[arg(long)]
    pub project: Option<String>,
}

/// Arguments for impact command
#[derive(Parser, Debug)]
pub struct ImpactArgs {
    /// Extraction ID
    pub extraction_id: String,
}

/// Arguments for delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Extraction ID
    pub extraction_id: String,

    /// Reason recorded on the record
    #[arg(short, long)]
    pub reason: Option<String>,
}

/// Arguments for library command
#[derive(Parser, Debug)]
pub struct LibraryArgs {
    /// Project ID
    pub project_id: String,

    /// Include the full value history per record
    #[arg(long)]
    pub history: bool,
}

/// Arguments for backfill subcommands
#[derive(Parser, Debug)]
pub struct BackfillArgs {
    #[command(subcommand)]
    pub command: BackfillCommands,
}

#[derive(Subcommand, Debug)]
pub enum BackfillCommands {
    /// Schedule merges for confirmed extractions that never merged
    Unmerged {
        /// Limit the sweep to one project
        #[arg(long)]
        project: Option<String>,
    },

    /// Copy missing project links from source documents
    ProjectIds,
}

/// Arguments for worker command
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Maximum number of tasks to drain
    #[arg(short, long)]
    pub limit: Option<usize>,
}
