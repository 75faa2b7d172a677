//! Codify - extraction confirmation and project library tool
//!
//! A local-first back-office tool that routes AI-codified document
//! extractions through a human confirmation workflow and merges confirmed
//! line items into a per-project data library.

use anyhow::Result;
use codify::cli::{self, BackfillCommands, Cli, Commands, DocumentCommands};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Get workspace path
    let path = Path::new(&cli.path);

    // Execute command
    match cli.command {
        Commands::Init(args) => {
            cli::init(path, args.force)?;
        }

        Commands::Status => {
            cli::status(path, cli.format)?;
        }

        Commands::Document(args) => match args.command {
            DocumentCommands::Add { id, name, project } => {
                cli::document_add(path, id.as_deref(), &name, project.as_deref())?;
            }
            DocumentCommands::List => {
                cli::document_list(path, cli.format)?;
            }
        },

        Commands::Ingest(args) => {
            cli::ingest(path, &args, cli.format)?;
        }

        Commands::SmartPass(args) => {
            cli::smart_pass(path, &args, cli.format)?;
        }

        Commands::Show(args) => {
            cli::show(path, &args, cli.format)?;
        }

        Commands::Confirm(args) => {
            cli::confirm(path, &args, cli.format)?;
        }

        Commands::ConfirmAll(args) => {
            cli::confirm_all(path, &args.extraction_id, cli.format)?;
        }

        Commands::Skip(args) => {
            cli::skip(path, &args, cli.format)?;
        }

        Commands::AddItem(args) => {
            cli::add_item(path, &args, cli.format)?;
        }

        Commands::Merge(args) => {
            cli::merge(path, &args, cli.format)?;
        }

        Commands::Impact(args) => {
            cli::impact(path, &args, cli.format)?;
        }

        Commands::Delete(args) => {
            cli::delete(path, &args)?;
        }

        Commands::Library(args) => {
            cli::library(path, &args, cli.format)?;
        }

        Commands::Backfill(args) => match args.command {
            BackfillCommands::Unmerged { project } => {
                cli::backfill_unmerged(path, project.as_deref(), cli.format)?;
            }
            BackfillCommands::ProjectIds => {
                cli::backfill_project_ids(path, cli.format)?;
            }
        },

        Commands::Worker(args) => {
            cli::worker(path, &args, cli.format)?;
        }
    }

    Ok(())
}
