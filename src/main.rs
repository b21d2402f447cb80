//! Binary entry point for stampsync.
//!
//! CLI surface over the sync orchestrator: upload, sync, classification
//! ingest and maintenance commands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr/print_stdout in the binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use stampsync::catalog::HttpCatalog;
use stampsync::config::StampsyncConfig;
use stampsync::observability::{self, InitOptions};
use stampsync::services::ClassificationIngest;
use stampsync::{
    CatalogClient, LocalStore, ReconciliationEngine, Scope, SyncMode, SyncOrchestrator, SyncReport,
};

/// Stampsync - allocation and reconciliation engine for crowd-classified
/// stamp catalogs.
#[derive(Parser)]
#[command(name = "stampsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Push local state to the remote catalog.
    #[command(subcommand)]
    Upload(UploadCommands),

    /// Repair drift between the local store and the remote catalog.
    #[command(subcommand)]
    Sync(SyncCommands),

    /// Maintenance commands.
    #[command(subcommand)]
    Admin(AdminCommands),
}

/// Push-only operations.
#[derive(Subcommand)]
enum UploadCommands {
    /// Upload never-uploaded items, binding duplicates instead of
    /// re-creating them.
    Subjects {
        /// Remote group to link freshly uploaded items into.
        #[arg(long)]
        group_id: Option<i64>,
    },

    /// Validate and push selection weights for the priority-group ladder.
    SubjectWeights,
}

/// Bidirectional repair operations.
#[derive(Subcommand)]
enum SyncCommands {
    /// Full item sync at the chosen scope.
    Subjects {
        /// Listing scope for the remote snapshot.
        #[arg(value_enum, default_value_t = ScopeKind::Project)]
        scope: ScopeKind,

        /// Remote id for group or workflow scope.
        #[arg(long)]
        source_id: Option<i64>,
    },

    /// Reconcile group state only: abandon vanished groups, adopt
    /// convention-named remote groups.
    SubjectSets,

    /// Pull reducer output and fold it into the local store.
    Classifications {
        /// Workflow to pull from, overriding the configured one.
        #[arg(long)]
        workflow_id: Option<i64>,
    },
}

/// Maintenance operations.
#[derive(Subcommand)]
enum AdminCommands {
    /// Register a produced stamp in the local store, fingerprinting its
    /// content descriptor.
    Add {
        /// Content descriptor identifying the stamp's logical content.
        descriptor: String,

        /// URL of the stamp media served to the platform.
        location: String,

        /// Initial confidence score in [0, 1].
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Record a new confidence score for a stamp.
    Score {
        /// Local item identifier.
        item_id: String,

        /// Confidence score in [0, 1].
        confidence: f64,
    },

    /// Mark local groups whose remote counterpart vanished as abandoned and
    /// unassign their members.
    Cleanup,
}

/// Scope selector for sync commands.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeKind {
    /// Everything in the configured project.
    Project,
    /// A single remote group.
    Group,
    /// Everything linked to a workflow.
    Workflow,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init(InitOptions {
        verbose: cli.verbose,
        json: false,
    });

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        StampsyncConfig::load(cli.config.as_deref()).context("loading configuration")?;
    config.validate().context("validating configuration")?;

    match cli.command {
        Commands::Upload(UploadCommands::Subjects { group_id }) => {
            if let Some(group_id) = group_id {
                config.default_group_id = Some(group_id);
            }
            with_engine(&config, |orchestrator, config| {
                orchestrator.run(SyncMode::Upload, Scope::Project(config.project_id))
            })
        },
        Commands::Upload(UploadCommands::SubjectWeights) => {
            with_engine(&config, |orchestrator, _| orchestrator.push_weights())
        },
        Commands::Sync(SyncCommands::Subjects { scope, source_id }) => {
            let scope = resolve_scope(&config, scope, source_id)?;
            with_engine(&config, |orchestrator, _| {
                orchestrator.run(SyncMode::Sync, scope)
            })
        },
        Commands::Sync(SyncCommands::SubjectSets) | Commands::Admin(AdminCommands::Cleanup) => {
            let (store, catalog) = open(&config)?;
            let reconciler = ReconciliationEngine::new(&store, &catalog, &config);
            let mut report = SyncReport::default();
            reconciler.reconcile_groups(&mut report)?;
            finish(&report)
        },
        Commands::Admin(AdminCommands::Add {
            descriptor,
            location,
            confidence,
        }) => {
            let store = LocalStore::open(&config.database_path).context("opening local store")?;
            let mut item = stampsync::Item::from_content(&descriptor, location);
            if let Some(confidence) = confidence {
                anyhow::ensure!(
                    (0.0..=1.0).contains(&confidence),
                    "confidence {confidence} outside [0, 1]"
                );
                item = item.with_confidence(confidence);
            }
            if let Some(existing) = store.item_by_fingerprint(&item.fingerprint)? {
                anyhow::bail!(
                    "a stamp with this content already exists: {} (fingerprint {})",
                    existing.id,
                    existing.fingerprint
                );
            }
            store.insert_item(&item)?;
            println!("{} {}", item.id, item.fingerprint);
            Ok(())
        },
        Commands::Admin(AdminCommands::Score {
            item_id,
            confidence,
        }) => {
            let store = LocalStore::open(&config.database_path).context("opening local store")?;
            let id = stampsync::models::ItemId::new(item_id);
            anyhow::ensure!(
                store.item(&id)?.is_some(),
                "no stamp with id {id} in the local store"
            );
            store.set_confidence(&id, confidence)?;
            Ok(())
        },
        Commands::Sync(SyncCommands::Classifications { workflow_id }) => {
            if let Some(workflow_id) = workflow_id {
                config.workflow_id = workflow_id;
            }
            let (store, catalog) = open(&config)?;
            let ingest = ClassificationIngest::new(&store, &catalog, &config);
            let report = ingest.run()?;
            println!(
                "pulled {}, linked {}, duplicates {}, unknown {}, retired {}",
                report.pulled, report.linked, report.duplicates, report.unknown, report.retired
            );
            for failure in &report.failures {
                println!("  {}: {}", failure.entity, failure.error);
            }
            anyhow::ensure!(
                report.failures.is_empty(),
                "{} classifications failed to ingest",
                report.failures.len()
            );
            Ok(())
        },
    }
}

fn open(config: &StampsyncConfig) -> anyhow::Result<(LocalStore, HttpCatalog)> {
    let store = LocalStore::open(&config.database_path).context("opening local store")?;
    let catalog = HttpCatalog::new(&config.api).context("building catalog client")?;
    Ok((store, catalog))
}

fn with_engine(
    config: &StampsyncConfig,
    f: impl FnOnce(&SyncOrchestrator<'_>, &StampsyncConfig) -> stampsync::Result<SyncReport>,
) -> anyhow::Result<()> {
    let (store, catalog) = open(config)?;
    let catalog: &dyn CatalogClient = &catalog;
    let orchestrator = SyncOrchestrator::new(&store, catalog, config);
    let report = f(&orchestrator, config)?;
    finish(&report)
}

fn finish(report: &SyncReport) -> anyhow::Result<()> {
    println!("{}", report.summary());
    Ok(())
}

fn resolve_scope(
    config: &StampsyncConfig,
    kind: ScopeKind,
    source_id: Option<i64>,
) -> anyhow::Result<Scope> {
    Ok(match kind {
        ScopeKind::Project => Scope::Project(source_id.unwrap_or(config.project_id)),
        ScopeKind::Group => {
            let id = source_id.context("--source-id is required for group scope")?;
            Scope::Group(id)
        },
        ScopeKind::Workflow => Scope::Workflow(source_id.unwrap_or(config.workflow_id)),
    })
}
