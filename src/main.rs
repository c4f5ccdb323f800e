use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use entitykit::tags::table_schemas;
use entitykit::{
    BackendSnapshot, Client, EntityTypeSet, Envelope, InMemoryBackend, ListParams, NewTag,
    TagService,
};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Parser)]
#[command(name = "entitykit")]
#[command(about = "Inspect and edit tags in an entitykit JSON snapshot")]
struct Cli {
    /// Snapshot file; created on first write if missing
    #[arg(long, default_value = "entitykit.json")]
    snapshot: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand)]
enum TagAction {
    List {
        #[arg(long)]
        search: Option<String>,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Assign {
        #[arg(long)]
        tag: String,
        #[arg(long)]
        target: String,
        #[arg(long = "type")]
        target_type: String,
    },
    Unassign {
        #[arg(long)]
        assignment: String,
    },
    Retag {
        #[arg(long)]
        target: String,
        #[arg(long = "type")]
        target_type: String,
        /// Comma-separated tag ids; empty clears all tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    ForEntity {
        #[arg(long)]
        target: String,
        #[arg(long = "type")]
        target_type: String,
    },
    ForType {
        #[arg(long = "type")]
        target_type: String,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let backend = Arc::new(load_backend(&cli.snapshot)?);
    let service = TagService::new(Client::production(backend.clone()), EntityTypeSet::all());

    let changed = match cli.command {
        Command::Tags { action } => run_tag_action(&service, action).await?,
        Command::Index {
            action: IndexAction::Reconcile,
        } => {
            let report = service.reconcile_entity_type_index().await;
            let changed = report
                .data()
                .is_some_and(|report| !report.is_consistent());
            print_envelope(&report)?;
            changed
        }
    };

    if changed {
        let snapshot = backend
            .snapshot()
            .await
            .map_err(|err| anyhow!("Failed to snapshot backend: {err}"))?;
        save_snapshot(&snapshot, &cli.snapshot)?;
    }
    Ok(())
}

/// Runs one tag command. Returns whether the snapshot must be saved.
async fn run_tag_action(service: &TagService, action: TagAction) -> Result<bool> {
    match action {
        TagAction::List { search } => {
            let tags = match search {
                Some(term) => service.search_tags(&term).await,
                None => service.list_tags(&ListParams::new()).await,
            };
            print_envelope(&tags)?;
            Ok(false)
        }
        TagAction::Create { name, description } => {
            let mut tag = NewTag::named(name);
            tag.description = description;
            let created = service.create_tag(&tag).await;
            print_envelope(&created)?;
            Ok(created.is_success())
        }
        TagAction::Assign {
            tag,
            target,
            target_type,
        } => {
            let assignment = service.assign_tag(&tag, &target, &target_type).await;
            print_envelope(&assignment)?;
            Ok(assignment.is_success())
        }
        TagAction::Unassign { assignment } => {
            let removed = service.remove_tag_assignment(&assignment).await;
            print_envelope(&removed)?;
            Ok(removed.data().copied().unwrap_or(false))
        }
        TagAction::Retag {
            target,
            target_type,
            tags,
        } => {
            let tag_ids: Vec<&str> = tags
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect();
            let assignments = service
                .set_entity_tags(&target, &target_type, tag_ids)
                .await;
            print_envelope(&assignments)?;
            Ok(assignments.is_success())
        }
        TagAction::ForEntity {
            target,
            target_type,
        } => {
            print_envelope(&service.get_entity_tags(&target, &target_type).await)?;
            Ok(false)
        }
        TagAction::ForType { target_type } => {
            print_envelope(&service.get_tags_for_entity_type(&target_type).await)?;
            Ok(false)
        }
    }
}

fn print_envelope<T: Serialize>(envelope: &Envelope<T>) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(envelope).context("Failed to render result as JSON")?;
    println!("{rendered}");
    Ok(())
}

fn load_backend(path: &Path) -> Result<InMemoryBackend> {
    if !path.exists() {
        return Ok(InMemoryBackend::with_tables(table_schemas()));
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot '{}'", path.display()))?;
    let snapshot: BackendSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse snapshot '{}'", path.display()))?;
    Ok(InMemoryBackend::from_snapshot(snapshot))
}

fn save_snapshot(snapshot: &BackendSnapshot, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create parent directory '{}'", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir).context("Failed to create temporary snapshot")?;
    serde_json::to_writer_pretty(&mut file, snapshot).context("Failed to encode snapshot")?;
    file.flush().context("Failed to flush snapshot")?;
    file.as_file()
        .sync_all()
        .context("Failed to sync snapshot")?;
    file.persist(path)
        .with_context(|| format!("Failed to replace snapshot '{}'", path.display()))?;
    Ok(())
}
