///
/// This module implements the CLI interface for submitter: command parsing,
/// argument validation and the async entrypoint shared by `main` and the
/// integration tests.
///
/// All engine logic (target trees, packaging, protocols) lives in the
/// [`submitter-core`] crate. This module only wires it to the terminal.
///
/// ## Commands
/// - `list`: print the submission targets, `--json` for the outline as JSON
/// - `files`: show which project files an assignment would include and which
///   required files are missing
/// - `package`: write the archive an assignment would receive to a local file
/// - `submit`: package and send the project to the assignment's destination
///
/// [`submitter-core`]: ../../submitter-core/
use crate::console::{render_outline, ConsoleListener};
use crate::load_config::{load_config, CliConfig};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use submitter_core::contract::{ArchiveSource, PackRequest};
use submitter_core::import::{HttpFetcher, LoadOutcome};
use submitter_core::manifest::SubmissionManifest;
use submitter_core::project::DirectoryProject;
use submitter_core::registry::Registries;
use submitter_core::{SubmissionOutcome, Submitter, TargetId};
use tokio_util::sync::CancellationToken;

/// CLI for submitter: send a project to the destination named in submission
/// definitions.
#[derive(Parser)]
#[clap(
    name = "submitter",
    version,
    about = "Package a project and submit it to an assignment defined in submission definitions"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the submission targets in the definitions
    List {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Print the outline as JSON
        #[clap(long)]
        json: bool,
    },
    /// Show which project files would be submitted to an assignment
    Files {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Assignment path, e.g. "CS 1114/Project 1"
        #[clap(long)]
        assignment: String,
    },
    /// Write the archive for an assignment to a local file without sending it
    Package {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Assignment path, e.g. "CS 1114/Project 1"
        #[clap(long)]
        assignment: String,
        /// Where to write the archive
        #[clap(long)]
        output: PathBuf,
    },
    /// Submit the project to an assignment
    Submit {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Assignment path, e.g. "CS 1114/Project 1"
        #[clap(long)]
        assignment: String,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::List { config, json } => {
            let config = load_config(config)?;
            let mut submitter = open_submitter(&config).await?;
            let cancel = CancellationToken::new();
            if let LoadOutcome::Complete { fetched } = submitter.tree_mut().load_all(&cancel).await? {
                tracing::info!(command = "list", fetched, "Import groups loaded");
            }
            let outline = submitter.tree().outline()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outline)?);
            } else {
                print!("{}", render_outline(&outline));
            }
            Ok(())
        }
        Commands::Files { config, assignment } => {
            let config = load_config(config)?;
            let mut submitter = open_submitter(&config).await?;
            let target = find_assignment(&mut submitter, &assignment).await?;
            let manifest = manifest_for(&config, target);

            for file in manifest.project.files()? {
                let marker = if submitter.tree().is_file_excluded(target, &file.path)? {
                    '-'
                } else {
                    '+'
                };
                println!("{marker} {}", file.path);
            }
            let missing = submitter.verify_required_files(&manifest)?;
            for pattern in &missing {
                println!("! missing required file: {pattern}");
            }
            tracing::info!(command = "files", missing = missing.len(), "Classification complete");
            Ok(())
        }
        Commands::Package {
            config,
            assignment,
            output,
        } => {
            let config = load_config(config)?;
            let mut submitter = open_submitter(&config).await?;
            let target = find_assignment(&mut submitter, &assignment).await?;
            let manifest = manifest_for(&config, target);

            let tree = submitter.tree();
            let packager_id = tree.packager(target)?;
            let packager = submitter.registries().packagers.get(&packager_id)?;
            let resolver = manifest.resolver(tree)?;
            let archive = ArchiveSource {
                packager: packager.as_ref(),
                request: PackRequest {
                    tree,
                    target,
                    project: manifest.project.as_ref(),
                    resolver: &resolver,
                },
            };
            let bytes = archive.to_bytes()?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write archive to {:?}", output))?;

            let digest = {
                let mut hasher = Sha256::new();
                hasher.update(&bytes);
                format!("{:x}", hasher.finalize())
            };
            tracing::info!(command = "package", packager = %packager_id, bytes = bytes.len(), "Archive written");
            println!("Wrote {} ({} bytes, sha256 {digest})", output.display(), bytes.len());
            Ok(())
        }
        Commands::Submit { config, assignment } => {
            let config = load_config(config)?;
            let mut submitter = open_submitter(&config).await?;
            let target = find_assignment(&mut submitter, &assignment).await?;
            let manifest = manifest_for(&config, target);
            submitter.add_listener(Arc::new(ConsoleListener));

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("Received Ctrl+C, canceling submission");
                        on_interrupt.cancel();
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
                }
            });

            match submitter.submit(&manifest, &cancel).await {
                Ok(SubmissionOutcome::Completed { .. }) => {
                    tracing::info!(command = "submit", "Submission complete");
                    Ok(())
                }
                Ok(SubmissionOutcome::Canceled) => {
                    eprintln!("{}", SubmissionOutcome::CANCELED_NOTICE);
                    Err(anyhow!("Submission canceled"))
                }
                Err(e) => {
                    // Listeners only hear about failures after the attempt has started.
                    if matches!(
                        e,
                        submitter_core::SubmissionError::NotActionable(_)
                            | submitter_core::SubmissionError::RequiredFilesMissing(_)
                    ) {
                        eprintln!("[ERROR] {}", e.user_message());
                    }
                    tracing::error!(command = "submit", error = %e, "Submission failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}

async fn open_submitter(config: &CliConfig) -> Result<Submitter> {
    let registries = Registries::with_defaults(&config.transport)?;
    let fetcher = HttpFetcher::new(&config.transport)?;
    let mut submitter = Submitter::new(Arc::new(registries), Arc::new(fetcher));
    submitter
        .open_definitions(&config.definitions)
        .await
        .with_context(|| format!("Failed to open submission definitions {}", config.definitions))?;
    Ok(submitter)
}

async fn find_assignment(submitter: &mut Submitter, path: &str) -> Result<TargetId> {
    submitter
        .tree_mut()
        .find_assignment(path)
        .await?
        .ok_or_else(|| anyhow!("No assignment named '{path}' in the submission definitions"))
}

fn manifest_for(config: &CliConfig, target: TargetId) -> SubmissionManifest {
    SubmissionManifest::new(
        target,
        Arc::new(DirectoryProject::new(&config.project)),
        config.username.clone(),
        config.password.clone(),
    )
}
