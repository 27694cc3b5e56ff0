use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use savesmith::{
    backup::BackupVault,
    config::{self, AppConfig},
    identity::serial_from_artifact_name,
    installer::{InstallOutcome, InstallProgress, InstallRequest},
    library::{ArtifactType, GameEntry, Library, Title},
    logging::{self, Verbosity},
    remote::{RemoteRecord, UreqDownloader},
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use time::OffsetDateTime;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "savesmith", version, about = "Back up, pack and install RPCS3 saves and savestates")]
struct Cli {
    /// Config file (defaults to the per-user data dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emulator root; overrides the remembered one
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List titles that have saves or savestates
    Scan,
    /// List installed games
    Games,
    /// Pack a save folder or savestate into a zip in the scratch area
    Pack {
        path: PathBuf,
        /// Also print the catalog record for the upload
        #[arg(long)]
        record: bool,
        #[arg(long = "type", default_value = "save")]
        artifact_type: ArtifactType,
    },
    /// Install a save or savestate archive
    Install {
        #[arg(long = "type")]
        artifact_type: ArtifactType,
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        file: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Show the backup lineage of one artifact
    Backups { name: String },
    /// Show resolved paths
    Paths,
    /// Change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Remember an emulator root
    SetRoot { path: PathBuf },
    /// Print the current config
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = config::base_data_dir()?;
    let _guard = logging::init_logging(
        &data_dir.join("logs"),
        Verbosity::from_count(cli.quiet, cli.verbose),
    );

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let mut config = AppConfig::load_or_create_at(&config_path)?;
    let format = cli.format;

    match cli.command {
        Command::Scan => {
            let root = require_root(&config, cli.root.as_deref())?;
            let library = savesmith::scan_library(&config, &root)?;
            print_library(&library, format)
        }
        Command::Games => {
            let root = require_root(&config, cli.root.as_deref())?;
            let games = config.scanner().list_games(&root)?;
            print_games(&games, format)
        }
        Command::Pack {
            path,
            record,
            artifact_type,
        } => pack(&config, &path, record, artifact_type, format),
        Command::Install {
            artifact_type,
            file,
            url,
        } => {
            let root = require_root(&config, cli.root.as_deref())?;
            let installer = config.installer().with_progress(Arc::new(|progress: InstallProgress| {
                tracing::debug!(
                    "[{}/{}] {}",
                    progress.step_index,
                    progress.step_count,
                    progress.step.label()
                );
            }));
            let outcome = match (file, url) {
                (Some(file), _) => {
                    let bytes = fs::read(&file)
                        .with_context(|| format!("read archive {}", file.display()))?;
                    installer.install(&InstallRequest {
                        root: &root,
                        artifact_type,
                        archive_bytes: &bytes,
                    })
                }
                (None, Some(url)) => installer.install_from_url(
                    &UreqDownloader::new(),
                    &root,
                    artifact_type,
                    &url,
                ),
                (None, None) => bail!("install requires --file or --url"),
            };
            print_outcome(&outcome, format)?;
            if !outcome.ok {
                bail!(
                    "install failed ({})",
                    outcome.error_kind.map(|kind| kind.as_str()).unwrap_or("unknown")
                );
            }
            Ok(())
        }
        Command::Backups { name } => {
            let root = require_root(&config, cli.root.as_deref())?;
            let vault = BackupVault::new(config.layout.backups_root(&root));
            let records = vault.lineage(&name)?;
            match format {
                OutputFormat::Json => print_json(&records),
                OutputFormat::Text => {
                    if records.is_empty() {
                        println!("No backups for {name}");
                    }
                    for record in records {
                        println!("{}  {}", record.created_at, record.backup_path.display());
                    }
                    Ok(())
                }
            }
        }
        Command::Paths => print_paths(&config, &config_path, &data_dir, cli.root.as_deref(), format),
        Command::Config { action } => match action {
            ConfigAction::SetRoot { path } => {
                if !config.emulator.looks_like_root(&path) {
                    tracing::warn!(root = %path.display(), "path does not look like an emulator root");
                }
                config.emulator_root = Some(path);
                config.save_to(&config_path)?;
                println!("Saved {}", config_path.display());
                Ok(())
            }
            ConfigAction::Show => print_json(&config),
        },
    }
}

fn require_root(config: &AppConfig, explicit: Option<&Path>) -> Result<PathBuf> {
    config.resolve_root(explicit).with_context(|| {
        format!(
            "no {} folder set (pass --root or run `savesmith config set-root <dir>`)",
            config.emulator.display_name()
        )
    })
}

fn pack(
    config: &AppConfig,
    path: &Path,
    record: bool,
    artifact_type: ArtifactType,
    format: OutputFormat,
) -> Result<()> {
    let blob = savesmith::pack_artifact(config, path)?;
    if !record {
        return match format {
            OutputFormat::Json => print_json(&blob),
            OutputFormat::Text => {
                println!("{} ({} bytes)", blob.temp_path.display(), blob.byte_size);
                Ok(())
            }
        };
    }

    let serial = serial_from_artifact_name(&config.serial_pattern, &blob.source_name)?;
    let title = Title::new(&serial);
    let record = RemoteRecord::for_blob(
        config.emulator.as_str(),
        &title,
        artifact_type,
        &blob,
        OffsetDateTime::now_utc(),
    );

    #[derive(Serialize)]
    struct PackOutput<'a> {
        archive: &'a savesmith::packer::ArchiveBlob,
        record: &'a RemoteRecord,
    }
    match format {
        OutputFormat::Json => print_json(&PackOutput {
            archive: &blob,
            record: &record,
        }),
        OutputFormat::Text => {
            println!("{} ({} bytes)", blob.temp_path.display(), blob.byte_size);
            println!("object path: {}", record.object_path);
            Ok(())
        }
    }
}

fn print_library(library: &Library, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(library);
    }

    let mut titles: Vec<&Title> = library.titles.iter().collect();
    titles.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
    for title in titles {
        let installed = if title.is_installed() { "" } else { "  (not installed)" };
        println!("{}  {}{installed}", title.serial, title.display_name);
        for artifact in title.saves.iter().chain(title.savestates.iter()) {
            println!("    {:<9}  {}", artifact.artifact_type, artifact.label);
        }
    }
    println!(
        "Found {} games with saves/savestates.",
        library.titles.len()
    );
    Ok(())
}

fn print_games(games: &[GameEntry], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&games);
    }
    let mut games: Vec<&GameEntry> = games.iter().collect();
    games.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
    for game in &games {
        let status = if game.launch_target.is_some() {
            "Installed"
        } else {
            "No EBOOT found"
        };
        println!("{}  {}  [{status}]", game.serial, game.display_name);
    }
    println!("Found {} games.", games.len());
    Ok(())
}

fn print_outcome(outcome: &InstallOutcome, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(outcome);
    }
    match (&outcome.installed_path, &outcome.error) {
        (Some(path), _) if outcome.ok => println!("Installed to {}", path.display()),
        (_, Some(error)) => println!("Install failed: {error}"),
        _ => {}
    }
    if let Some(record) = &outcome.backup_record {
        println!("Previous data backed up to {}", record.backup_path.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    config: PathBuf,
    data_dir: PathBuf,
    scratch_dir: PathBuf,
    root: Option<PathBuf>,
    savedata: Option<PathBuf>,
    savestates: Option<PathBuf>,
    games: Option<PathBuf>,
    backups: Option<PathBuf>,
}

fn print_paths(
    config: &AppConfig,
    config_path: &Path,
    data_dir: &Path,
    explicit_root: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let root = config.resolve_root(explicit_root);
    let layout = &config.layout;
    let output = PathsOutput {
        config: config_path.to_path_buf(),
        data_dir: data_dir.to_path_buf(),
        scratch_dir: config.scratch_dir(),
        savedata: root
            .as_deref()
            .map(|root| layout.category_dir(root, ArtifactType::Save)),
        savestates: root
            .as_deref()
            .map(|root| layout.category_dir(root, ArtifactType::Savestate)),
        games: root.as_deref().map(|root| layout.games_root(root)),
        backups: root.as_deref().map(|root| layout.backups_root(root)),
        root,
    };

    if format == OutputFormat::Json {
        return print_json(&output);
    }
    let show = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    };
    println!("Config:      {}", output.config.display());
    println!("Data dir:    {}", output.data_dir.display());
    println!("Scratch dir: {}", output.scratch_dir.display());
    println!("Root:        {}", show(&output.root));
    println!("Save data:   {}", show(&output.savedata));
    println!("Savestates:  {}", show(&output.savestates));
    println!("Games:       {}", show(&output.games));
    println!("Backups:     {}", show(&output.backups));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{raw}");
    Ok(())
}
