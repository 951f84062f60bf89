//! vanilla-vault - integrity checks, backups and restores for Mass Effect trilogy installs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vanilla_vault::backup::BackupOrchestrator;
use vanilla_vault::catalog::BackupStatus;
use vanilla_vault::config::{RestoreStrategy, Settings};
use vanilla_vault::games::{is_marked_backup, looks_like_installation, Game, Language, BACKUP_MARKER_FILE};
use vanilla_vault::host::{FileProgress, Host, PathPrompt, Prompt};
use vanilla_vault::installation::Installation;
use vanilla_vault::manifest::{format, Candidate};
use vanilla_vault::operation::OperationError;
use vanilla_vault::restore::{ArchiveRestoreQueue, RestoreOrchestrator, RestoreTarget};
use vanilla_vault::{hash, paths, Vault};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "vanilla-vault")]
#[command(version)]
#[command(about = "Vanilla integrity checks, backups and restores for the Mass Effect trilogy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn parse_game(value: &str) -> std::result::Result<Game, String> {
    Game::from_code(value).ok_or_else(|| format!("unknown game '{}' (expected ME1, ME2 or ME3)", value))
}

fn parse_language(value: &str) -> std::result::Result<Language, String> {
    Language::from_code(value).ok_or_else(|| format!("unknown language code '{}'", value))
}

#[derive(Subcommand)]
enum Commands {
    /// Remember where a game is installed
    Track {
        #[arg(value_parser = parse_game)]
        game: Game,
        path: PathBuf,
    },

    /// Show tracked installations and their backups
    Status,

    /// Check an installation against the vanilla manifest
    Verify {
        #[arg(value_parser = parse_game)]
        game: Game,

        /// Directory to check instead of the tracked installation
        #[arg(long)]
        path: Option<PathBuf>,

        /// Walk the allow-listed loader and TOC files instead of skipping them
        #[arg(long)]
        strict: bool,

        /// Compare MD5 hashes, not just sizes
        #[arg(long)]
        deep: bool,
    },

    /// Copy the tracked installation into a new vanilla backup
    Backup {
        #[arg(value_parser = parse_game)]
        game: Game,

        /// Backup folder (asked for when omitted)
        #[arg(long)]
        to: Option<PathBuf>,

        /// Extra languages to keep, as file-name codes (DEU, FRA, ...). English is always kept
        #[arg(long = "language", value_parser = parse_language)]
        languages: Vec<Language>,

        /// Answer yes to every question
        #[arg(short, long)]
        yes: bool,
    },

    /// Register an existing vanilla copy as the backup
    Link {
        #[arg(value_parser = parse_game)]
        game: Game,
        path: PathBuf,

        #[arg(short, long)]
        yes: bool,
    },

    /// Forget the registered backup (its files are kept)
    Unlink {
        #[arg(value_parser = parse_game)]
        game: Game,
    },

    /// Restore from the registered backup
    Restore {
        #[arg(value_parser = parse_game)]
        game: Game,

        /// Restore into this empty folder instead of the tracked installation
        #[arg(long)]
        to: Option<PathBuf>,

        /// Delete everything first, then copy the whole backup
        #[arg(long)]
        legacy: bool,

        #[arg(short, long)]
        yes: bool,
    },

    /// Restore sealed DLC archives from the backup
    RestoreArchive {
        #[arg(value_parser = parse_game)]
        game: Game,

        /// DLC folder names, e.g. DLC_CON_END
        #[arg(required = true)]
        dlc: Vec<String>,
    },

    /// Compile a manifest from a known-good installation
    BuildManifest {
        #[arg(value_parser = parse_game)]
        game: Game,

        /// Installation to read
        root: PathBuf,

        /// Output file (defaults to <manifest dir>/<asset>.bin)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Console prompts and a byte progress bar.
struct ConsoleHost {
    assume_yes: bool,
    bar: ProgressBar,
}

impl ConsoleHost {
    fn new(assume_yes: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { assume_yes, bar }
    }

    fn ask(&self, question: &str) -> Option<String> {
        self.bar.suspend(|| {
            print!("{} ", question);
            std::io::stdout().flush().ok()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).ok()?;
            Some(line.trim().to_string())
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Host for ConsoleHost {
    fn confirm(&self, prompt: &Prompt) -> bool {
        let question = match prompt {
            Prompt::MissingOfficialContent { packages } => format!(
                "These official DLC packages are not installed and will not be in the backup:\n  {}\nContinue? [y/N]",
                packages.join("\n  ")
            ),
            Prompt::LinkExistingInstallation { path } => format!(
                "{} will be registered as the vanilla backup. It must never be used to play or mod the game. Continue? [y/N]",
                path.display()
            ),
            Prompt::OverwriteInstallation { path } => format!(
                "Everything in {} that differs from the backup will be replaced or deleted. Continue? [y/N]",
                path.display()
            ),
        };
        if self.assume_yes {
            println!("{} y", question);
            return true;
        }
        matches!(self.ask(&question).as_deref(), Some("y" | "Y" | "yes"))
    }

    fn choose_path(&self, prompt: &PathPrompt) -> Option<PathBuf> {
        let question = match prompt {
            PathPrompt::BackupDestination => "Backup folder:",
        };
        self.ask(question)
            .filter(|answer| !answer.is_empty())
            .map(PathBuf::from)
    }

    fn status(&self, message: &str) {
        self.bar.suspend(|| println!("{}", message));
    }

    fn file_progress(&self, progress: &FileProgress) {
        if self.bar.is_hidden() {
            self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            self.bar.enable_steady_tick(Duration::from_millis(100));
        }
        self.bar.set_message(format!(
            "{}/{} {}",
            progress.done,
            progress.total,
            paths::file_name(&progress.current)
        ));
    }

    fn byte_progress(&self, done: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(done);
    }
}

fn init_logging(verbose: bool, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::from_default_env().add_directive(if verbose {
        "vanilla_vault=debug".parse()?
    } else {
        "vanilla_vault=warn".parse()?
    });
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (guard, file_layer) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, "vanilla-vault.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(guard), Some(layer))
        }
        Err(e) => {
            eprintln!("Logging to file disabled ({}): {}", log_dir.display(), e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn describe(e: OperationError) -> anyhow::Error {
    anyhow::anyhow!("{}\n{}", e.title(), e)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load();
    let _log_guard = init_logging(cli.verbose, &settings.log_dir())?;

    match cli.command {
        Commands::Track { game, path } => {
            if !looks_like_installation(game, &path) {
                bail!("{} does not look like a {} installation", path.display(), game);
            }
            if is_marked_backup(&path) {
                bail!("{} is a vanilla backup, not a live installation", path.display());
            }
            settings.installations.insert(game, path.clone());
            settings.save()?;
            println!("Tracking {} at {}", game, path.display());
        }

        Commands::Status => {
            let vault = Vault::open(settings)?;
            for game in Game::ALL {
                println!("=== {} ===", game);
                match vault.installation(game) {
                    Some(install) => {
                        println!("Installation:    {}", install.root.display());
                        if !install.exists() {
                            println!("                 (missing)");
                        }
                        println!("Texture modded:  {}", if install.texture_modded { "Yes" } else { "No" });
                        if install.regional_variant {
                            println!("Build:           Polish");
                        }
                        let unofficial = install.unofficial_dlc();
                        if !unofficial.is_empty() {
                            println!("Third-party DLC: {}", unofficial.join(", "));
                        }
                    }
                    None => println!("Installation:    not tracked"),
                }
                match vault.catalog.status(game) {
                    BackupStatus::Usable(path) => println!("Backup:          {}", path.display()),
                    BackupStatus::Unusable { path, reason } => {
                        println!("Backup:          {} (unusable: {})", path.display(), reason)
                    }
                    BackupStatus::NotConfigured => println!("Backup:          none"),
                }
                println!();
            }
        }

        Commands::Verify {
            game,
            path,
            strict,
            deep,
        } => {
            let vault = Vault::open(settings)?;
            let install = match path {
                Some(path) => Installation::load(game, path),
                None => vault
                    .installation(game)
                    .with_context(|| format!("No installation of {} is tracked", game))?,
            };
            let validator = vault.validator_for(&install)?;

            let mut findings = Vec::new();
            let vanilla = validator.validate_tree(
                &install.root,
                |finding| findings.push(finding.clone()),
                strict,
                deep,
            )?;
            for finding in &findings {
                println!("{:?}  {}", finding.verdict, finding.relative_path);
            }
            if !vanilla {
                bail!("{} at {} is not vanilla ({} files)", game, install.root.display(), findings.len());
            }
            println!("{} at {} is vanilla", game, install.root.display());
        }

        Commands::Backup {
            game,
            to,
            languages,
            yes,
        } => {
            let languages = if languages.is_empty() {
                settings.backup_languages.clone()
            } else {
                languages
            };
            let vault = Vault::open(settings)?;
            let host = ConsoleHost::new(yes);
            let result = BackupOrchestrator::new(&vault, &host).create(game, to, &languages);
            host.finish();
            let summary = result.map_err(describe)?;
            println!(
                "Backed up {} files ({:.2} GB) to {}",
                summary.files,
                summary.bytes as f64 / 1_073_741_824.0,
                summary.destination.display()
            );
        }

        Commands::Link { game, path, yes } => {
            let vault = Vault::open(settings)?;
            let host = ConsoleHost::new(yes);
            BackupOrchestrator::new(&vault, &host)
                .link(game, &path)
                .map_err(describe)?;
            println!("{} is now the backup of {}", path.display(), game);
        }

        Commands::Unlink { game } => {
            let vault = Vault::open(settings)?;
            let host = ConsoleHost::new(false);
            BackupOrchestrator::new(&vault, &host)
                .unlink(game)
                .map_err(describe)?;
            println!("Backup of {} unlinked", game);
        }

        Commands::Restore {
            game,
            to,
            legacy,
            yes,
        } => {
            let vault = Vault::open(settings)?;
            let host = ConsoleHost::new(yes);
            let target = match to {
                Some(path) => RestoreTarget::Custom(path),
                None => RestoreTarget::Installation,
            };
            let strategy = legacy.then_some(RestoreStrategy::Legacy);
            let result = RestoreOrchestrator::new(&vault, &host).restore(game, target, strategy);
            host.finish();
            let summary = result.map_err(describe)?;

            println!("Restored {} to {}", game, summary.destination.display());
            println!(
                "Files: {} copied, {} unchanged, {} deleted",
                summary.copied, summary.preserved, summary.deleted
            );
            if !summary.untagged.is_empty() {
                println!("Texture tags removed: {}", summary.untagged.len());
            }
        }

        Commands::RestoreArchive { game, dlc } => {
            let vault = Vault::open(settings)?;
            let _ticket = vault.begin(game)?;
            let backup = vault
                .catalog
                .get(game)
                .with_context(|| format!("{} has no usable backup", game))?;
            let install = vault
                .installation(game)
                .with_context(|| format!("No installation of {} is tracked", game))?;

            let queue = ArchiveRestoreQueue::start(game, backup, install.root.clone())
                .context("Failed to start archive restore worker")?;
            let pending: Vec<_> = dlc.iter().map(|name| (name, queue.submit(name))).collect();

            let mut failed = 0;
            for (name, reply) in pending {
                match reply.recv() {
                    Ok(Ok(outcome)) => println!(
                        "{}: restored {} archives, removed {} loose files",
                        outcome.dlc, outcome.archives, outcome.loose_removed
                    ),
                    Ok(Err(e)) => {
                        failed += 1;
                        eprintln!("{}: {}", name, e);
                    }
                    Err(_) => {
                        failed += 1;
                        eprintln!("{}: worker stopped before answering", name);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} DLC archives were not restored", failed, dlc.len());
            }
        }

        Commands::BuildManifest { game, root, output } => {
            if !looks_like_installation(game, &root) {
                bail!("{} does not look like a {} installation", root.display(), game);
            }
            let install = Installation::load(game, &root);
            let output = output.unwrap_or_else(|| {
                settings
                    .manifest_dir()
                    .join(format!("{}.bin", game.manifest_asset(install.regional_variant)))
            });

            let files: Vec<(String, PathBuf)> = WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let key = paths::relative_key(&root, e.path())?;
                    let skip = key.starts_with(game.user_config_prefix()) || key == BACKUP_MARKER_FILE;
                    (!skip).then(|| (key, e.into_path()))
                })
                .collect();

            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] Hashing [{bar:40.cyan/blue}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );

            let records: Vec<(String, Candidate)> = files
                .par_iter()
                .map(|(key, path)| {
                    let size = std::fs::metadata(path)
                        .with_context(|| format!("Failed to stat {}", path.display()))?
                        .len();
                    let md5 = hash::compute_md5(path)?;
                    pb.inc(1);
                    Ok((key.clone(), Candidate { size, md5 }))
                })
                .collect::<Result<_>>()?;
            pb.finish_and_clear();

            let bytes = format::encode(records.iter().map(|(key, c)| (key.as_str(), c)))?;
            if let Some(dir) = output.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Wrote {} entries for {} to {}",
                records.len(),
                game,
                output.display()
            );
        }
    }

    Ok(())
}
