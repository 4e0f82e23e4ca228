//! romshelf command line
//!
//! Every command rescans the configured sources first, so listings always
//! reflect what is on disk.
//!
//! ```text
//! romshelf scan
//! romshelf list --search zelda --sort file-size --desc
//! romshelf launch file_0123456789abcdef
//! romshelf add-rom ~/Downloads/Metroid.nes --platform nes
//! romshelf set-default snes retroarch --core bsnes_libretro
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use romshelf_core::{ChannelSink, Config, Event, EventSink, LibraryStore, MemoryStore};
use romshelf_library::sources::EmulatedSource;
use romshelf_library::{GameFilter, GameSort, LibraryService, SortField};
use romshelf_shared::{LaunchStatus, MetadataState};
use tokio::sync::mpsc::UnboundedReceiver;

/// How long `scan` waits for queued metadata fetches.
const METADATA_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Parser)]
#[command(name = "romshelf", version, about = "Local game library and launcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan sources and wait for metadata
    Scan,
    /// List the library
    List {
        /// Case-insensitive name search
        #[arg(long)]
        search: Option<String>,
        /// Keep games with this genre (repeatable)
        #[arg(long = "genre")]
        genres: Vec<String>,
        /// Only games from this source
        #[arg(long)]
        source: Option<String>,
        #[arg(long, value_enum, default_value_t = SortField::Name)]
        sort: SortField,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        installed: bool,
    },
    /// Show the emulator catalog and platform mappings
    Emulators {
        /// Only this platform
        platform: Option<String>,
    },
    /// Show which emulator an instance would launch with
    Resolve { instance_id: String },
    /// Set the default emulator for a platform and save it to the config
    SetDefault {
        platform: String,
        emulator_id: String,
        #[arg(long)]
        core: Option<String>,
    },
    /// Launch an instance and wait for it to exit
    Launch { instance_id: String },
    /// Add a ROM from outside the ROM directory
    AddRom {
        path: PathBuf,
        #[arg(long)]
        platform: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = romshelf_core::config::load().context("Failed to load config")?;

    let (sink, mut events) = ChannelSink::new();
    let sink: Arc<dyn EventSink> = Arc::new(sink);
    let service = LibraryService::new(&config, Arc::new(MemoryStore::new()), sink)?;
    service.start().await?;

    let result = run(cli.command, &config, &service, &mut events).await;
    service.shutdown().await;
    result
}

async fn run(
    command: Command,
    config: &Config,
    service: &LibraryService,
    events: &mut UnboundedReceiver<Event>,
) -> Result<()> {
    let summary = service.refresh().await?;

    match command {
        Command::Scan => {
            println!(
                "{} scanned, {} new, {} updated",
                summary.scanned, summary.added, summary.updated
            );
            wait_for_metadata(events, summary.queued).await;
        }
        Command::List {
            search,
            genres,
            source,
            sort,
            desc,
            installed,
        } => {
            let filter = GameFilter {
                search,
                genres,
                installed_only: installed,
                source,
            };
            let sort = GameSort {
                field: sort,
                descending: desc,
            };
            for entry in service.list(&filter, sort)? {
                let available = match entry.instance.emulator_available {
                    Some(false) => " (no emulator)",
                    _ => "",
                };
                println!(
                    "{:<24} {:<10} {}{}",
                    entry.instance.id, entry.instance.platform, entry.game.name, available
                );
            }
        }
        Command::Emulators { platform } => match platform {
            Some(platform) => {
                for (mapping, emulator, core) in service.emulators_for_platform(&platform)? {
                    let marker = if mapping.is_default { "*" } else { " " };
                    let core = core.map(|c| format!(" / {}", c.name)).unwrap_or_default();
                    let available = if emulator.available { "" } else { " (unavailable)" };
                    println!("{} {}{}{}", marker, emulator.name, core, available);
                }
            }
            None => {
                for emulator in service.emulators()? {
                    let state = if emulator.available { "available" } else { "missing" };
                    println!("{:<12} {:<16} {}", emulator.id, emulator.name, state);
                }
            }
        },
        Command::Resolve { instance_id } => {
            let instance = service
                .store()
                .get_instance(&instance_id)?
                .with_context(|| format!("Instance not found: {}", instance_id))?;
            let pair = service
                .engine()
                .resolve(&instance.platform, Some(&instance.id))?;
            match &pair.core {
                Some(core) => println!("{} with core {}", pair.emulator.name, core.name),
                None => println!("{}", pair.emulator.name),
            }
        }
        Command::SetDefault {
            platform,
            emulator_id,
            core,
        } => {
            service.set_platform_default(&platform, &emulator_id, core.as_deref())?;
            let path = romshelf_core::config::config_path()
                .context("No config directory available to save the default")?;
            let mut config = config.clone();
            config
                .emulators
                .set_default(&platform, &emulator_id, core.as_deref());
            config
                .save_to(&path)
                .with_context(|| format!("Failed to save {}", path.display()))?;
            println!("Saved default for {} to {}", platform, path.display());
        }
        Command::Launch { instance_id } => {
            service.launch(&instance_id).await?;
            wait_for_exit(events, &instance_id).await;
        }
        Command::AddRom { path, platform } => {
            let source = EmulatedSource::new(
                config.sources.emulated.roms_dir.clone(),
                Arc::clone(service.engine()),
                config.launch.settle(),
            );
            let instance = source.add_rom(&path, &platform)?;
            let id = instance.id.clone();
            let summary = service.import(instance).await?;
            println!("Added {}", id);
            wait_for_metadata(events, summary.queued).await;
        }
    }
    Ok(())
}

/// Print metadata progress until `pending` fetches have finished.
async fn wait_for_metadata(events: &mut UnboundedReceiver<Event>, mut pending: usize) {
    let wait = async {
        while pending > 0 {
            let Some(event) = events.recv().await else {
                return;
            };
            let Event::Metadata(update) = event else {
                continue;
            };
            match update.status.state {
                MetadataState::Completed => println!("{}: metadata updated", update.instance_id),
                MetadataState::Error => println!(
                    "{}: {}",
                    update.instance_id,
                    update.status.error.as_deref().unwrap_or("metadata fetch failed")
                ),
                MetadataState::Cancelled => println!("{}: cancelled", update.instance_id),
                MetadataState::Idle | MetadataState::Fetching => continue,
            }
            pending -= 1;
        }
    };
    if tokio::time::timeout(METADATA_WAIT, wait).await.is_err() {
        tracing::warn!("Gave up waiting for metadata fetches");
    }
}

async fn wait_for_exit(events: &mut UnboundedReceiver<Event>, instance_id: &str) {
    while let Some(event) = events.recv().await {
        let Event::Launch(update) = event else {
            continue;
        };
        if update.instance_id != instance_id {
            continue;
        }
        match update.status {
            LaunchStatus::Launching => println!("Launching..."),
            LaunchStatus::Running => println!("Running"),
            LaunchStatus::Stopped => {
                println!("Stopped");
                return;
            }
            LaunchStatus::Failed => {
                eprintln!(
                    "Launch failed: {}",
                    update.error.as_deref().unwrap_or("unknown error")
                );
                return;
            }
        }
    }
}
