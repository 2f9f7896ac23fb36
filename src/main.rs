//! shelf - background copy, move, delete and trash from the command line.
//!
//! Usage:
//!   shelf copy SOURCE... DEST      Copy entries into DEST
//!   shelf move SOURCE... DEST      Move entries into DEST
//!   shelf delete PATH...           Delete permanently
//!   shelf trash PATH...            Move to the trash
//!   shelf trash-list               List trashed entries
//!   shelf restore CONTENT...       Restore trashed entries
//!   shelf purge CONTENT...         Remove trashed entries for good
//!   shelf ls [DIR]                 List a directory (or trash:///)
//!   shelf props PATH               Show properties and total size
//!
//! Set `SHELF_LOG` (e.g. `SHELF_LOG=debug`) to see engine logs.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use shelf_core::{selection_from_paths, EngineConfig, EventReceiver, TaskEvent};
use shelf_ops::{OperationController, RemovalUpdate, TransferUpdate};
use shelf_scan::{BatchUpdate, EntryKind, Properties, PropertiesUpdate, SizeTally};
use shelf_trash::{ProcMounts, Trash};

#[derive(Parser)]
#[command(
    name = "shelf",
    version,
    about = "Background copy, move, delete and trash for file managers",
    long_about = "shelf runs file operations the way a file manager does: in the \
                  background, with progress, and stoppable with Ctrl-C.\n\n\
                  Trashing follows the freedesktop.org trash layout, using a \
                  per-volume trash on removable drives."
)]
struct Cli {
    /// Include hidden entries in listings
    #[arg(short = 'a', long, global = true)]
    hidden: bool,

    /// Override the home trash location
    #[arg(long, global = true, value_name = "DIR")]
    home_trash: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy entries into a directory
    Copy {
        #[arg(required = true, num_args = 1..)]
        sources: Vec<PathBuf>,

        /// Destination directory
        dest: PathBuf,

        /// Replace existing entries without asking
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Move entries into a directory
    Move {
        #[arg(required = true, num_args = 1..)]
        sources: Vec<PathBuf>,

        /// Destination directory
        dest: PathBuf,

        /// Replace existing entries without asking
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Delete entries permanently
    Delete {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Move entries to the trash
    Trash {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List trashed entries
    TrashList {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Restore trashed entries (content paths as shown by trash-list)
    Restore {
        #[arg(required = true)]
        contents: Vec<PathBuf>,
    },

    /// Remove trashed entries for good
    Purge {
        #[arg(required = true)]
        contents: Vec<PathBuf>,
    },

    /// List a directory, or trash:/// for the trash
    Ls {
        #[arg(default_value = ".")]
        location: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show an entry's properties, counting the size of directories
    Props {
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SHELF_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::detect();
    config.show_hidden = cli.hidden;
    config.home_trash = cli.home_trash;

    let trash = Trash::from_config(&config, Box::new(ProcMounts::new()))
        .context("Could not locate the home trash")?;
    let mut controller = OperationController::new(config, Arc::new(trash));

    match cli.command {
        Command::Copy {
            sources,
            dest,
            force,
        } => {
            let selection = selection_from_paths(sources);
            confirm_overwrites(&controller, &selection, &dest, force)?;
            let rx = controller.copy(&selection, &dest)?;
            drive(&mut controller, rx, report_transfer).await?;
        }
        Command::Move {
            sources,
            dest,
            force,
        } => {
            let selection = selection_from_paths(sources);
            confirm_overwrites(&controller, &selection, &dest, force)?;
            let rx = controller.move_to(&selection, &dest)?;
            drive(&mut controller, rx, report_transfer).await?;
        }
        Command::Delete { paths } => {
            let rx = controller.delete(selection_from_paths(paths));
            drive(&mut controller, rx, report_removal).await?;
        }
        Command::Trash { paths } => {
            let rx = controller.send_to_trash(selection_from_paths(paths));
            drive(&mut controller, rx, report_removal).await?;
        }
        Command::Restore { contents } => {
            let rx = controller.restore(selection_from_paths(contents));
            drive(&mut controller, rx, report_removal).await?;
        }
        Command::Purge { contents } => {
            let rx = controller.purge(selection_from_paths(contents));
            drive(&mut controller, rx, report_removal).await?;
        }
        Command::TrashList { json } => {
            run_trash_list(&controller, json)?;
        }
        Command::Ls { location, json } => {
            let rx = controller.load(&location);
            let mut entries = Vec::new();
            drive(&mut controller, rx, |event: &TaskEvent<BatchUpdate>| {
                if let TaskEvent::Updated(batch) = event {
                    entries.extend(batch.entries.iter().cloned());
                }
            })
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    let suffix = if entry.is_dir { "/" } else { "" };
                    println!("{}{suffix}", entry.name);
                }
            }
        }
        Command::Props { path, json } => {
            let rx = controller.inspect(&path)?;
            let mut properties = None;
            let mut tally = None;
            drive(&mut controller, rx, |event: &TaskEvent<PropertiesUpdate>| match event {
                TaskEvent::Updated(PropertiesUpdate::Metadata(found)) => {
                    properties = Some(found.clone());
                }
                TaskEvent::Updated(PropertiesUpdate::Size(counted)) => tally = Some(*counted),
                _ => {}
            })
            .await?;

            let Some(properties) = properties else {
                bail!("{}: no properties reported", path.display());
            };
            if json {
                let report = serde_json::json!({ "properties": properties, "size": tally });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_properties(&properties, tally.as_ref());
            }
        }
    }

    Ok(())
}

/// Tick the controller and forward events until the operation ends.
///
/// Ctrl-C stops the operation; the loop then waits for its `Stopped` event.
async fn drive<U, F>(
    controller: &mut OperationController,
    mut rx: EventReceiver<U>,
    mut on_event: F,
) -> Result<()>
where
    F: FnMut(&TaskEvent<U>),
{
    let mut interrupted = false;
    loop {
        controller.tick();
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("\nStopping...");
                controller.stop();
                continue;
            }
        };

        let Some(event) = event else {
            bail!("Operation ended without reporting a result");
        };
        on_event(&event);
        match event {
            TaskEvent::Finished { .. } => return Ok(()),
            TaskEvent::Stopped => bail!("Stopped"),
            TaskEvent::Failed { path, message } => bail!("{}: {message}", path.display()),
            _ => {}
        }
    }
}

fn confirm_overwrites(
    controller: &OperationController,
    selection: &shelf_core::Selection<()>,
    dest: &Path,
    force: bool,
) -> Result<()> {
    let conflicts = controller.overwrite_conflicts(selection, dest);
    if conflicts.is_empty() {
        return Ok(());
    }
    let blocking = conflicts.iter().any(|c| !c.kind.is_overwrite());
    for conflict in &conflicts {
        eprintln!("{}: {}", conflict.destination.display(), conflict.kind);
    }
    if blocking || !force {
        bail!("{} conflict(s); pass --force to replace existing entries", conflicts.len());
    }
    Ok(())
}

fn report_transfer(event: &TaskEvent<TransferUpdate>) {
    match event {
        TaskEvent::Updated(TransferUpdate::Progress(progress)) => {
            eprint!(
                "\r[{:>3.0}%] {} {}/{}",
                progress.fraction() * 100.0,
                truncate(&progress.path.display().to_string(), 48),
                format_size(progress.bytes_copied),
                format_size(progress.bytes_total),
            );
            let _ = std::io::stderr().flush();
        }
        TaskEvent::Updated(TransferUpdate::Placed {
            path, overwritten, ..
        }) => {
            let verb = if *overwritten { "replaced" } else { "created" };
            eprintln!("\r{verb} {}", path.display());
        }
        TaskEvent::Finished { total } => eprintln!("Done: {total} item(s)"),
        _ => {}
    }
}

fn report_removal(event: &TaskEvent<RemovalUpdate<()>>) {
    match event {
        TaskEvent::Updated(update) if update.row.is_some() => {
            eprintln!(
                "[{:>3.0}%] {}",
                update.fraction() * 100.0,
                update.path.display()
            );
        }
        TaskEvent::Finished { total } => eprintln!("Done: {total} entries"),
        _ => {}
    }
}

fn run_trash_list(controller: &OperationController, json: bool) -> Result<()> {
    let entries = controller
        .trash()
        .entries()
        .context("Could not read the trash")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Trash is empty");
        return Ok(());
    }
    for entry in entries {
        let date = entry
            .deletion_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".repeat(16));
        let original = entry
            .original
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| entry.display_name());
        println!("{date}  {original}");
        println!("                  {}", entry.path.display());
    }
    Ok(())
}

fn print_properties(properties: &Properties, tally: Option<&SizeTally>) {
    let time = |value: Option<DateTime<Local>>| {
        value
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };

    println!("Name:      {}", properties.name);
    println!("Location:  {}", properties.location.display());
    println!("Type:      {}", properties.kind);
    match tally {
        Some(tally) if properties.kind == EntryKind::Directory => println!(
            "Size:      {} ({} files, {} folders)",
            tally.human_size(),
            tally.files,
            tally.directories
        ),
        Some(tally) => println!("Size:      {}", tally.human_size()),
        None => println!("Size:      unknown"),
    }
    println!("Created:   {}", time(properties.created));
    println!("Modified:  {}", time(properties.modified));
    println!("Accessed:  {}", time(properties.accessed));
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Keep the tail of a long path.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count - (max_len - 1)).collect();
        format!("…{tail}")
    }
}
