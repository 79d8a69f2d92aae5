use clap::{Parser, Subcommand};
use slot_library::catalog::{Catalog, CatalogError, MemoryCatalog, SledCatalog, SlotGame};
use slot_library::classify::Category;
use slot_library::config::{self, LibraryConfig};
use slot_library::output;
use slot_library::reconcile::{Reconciler, SyncSettings};
use slot_library::walk::Traversal;
use slot_library::watch::{LibraryWatcher, WatchSettings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "slot-library")]
#[command(about = "Keep a catalog of slot game art in sync with its folders")]
#[command(long_about = "\
Keep a catalog of slot game art in sync with its folders

The filesystem is the source of truth. Every folder under the library root
is a slot game; the first folder below it picks the asset category.

Library structure:

  storage/
  ├── catalog/                      # Catalog database (written by scan/watch)
  └── library/                      # Library root
      ├── Dragon Quest!/            # Slot game (slug: dragon-quest)
      │   ├── bg/                   # BG      (also: background)
      │   │   └── sky.png
      │   ├── text/                 # TEXT
      │   │   └── logo.webp
      │   └── elements/             # ELEMENTS (also: element)
      │       └── coin.jpg
      └── Foo/
          └── unknowncat/           # Unrecognized: filed as ELEMENTS
              └── pic.webp

Images are .png, .jpg, .jpeg and .webp files. Everything else is skipped.

Run 'slot-library gen-config' to generate a documented library.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./library.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory; the library root is its library/ subfolder
    #[arg(long, env = "STORAGE_DIR", global = true)]
    storage_dir: Option<PathBuf>,

    /// Catalog database directory
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Discovery below slot folders: recursive or flat
    #[arg(long, global = true)]
    traversal: Option<Traversal>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full pass and exit
    Scan,
    /// Run one full pass, then rescan on every change until Ctrl-C
    Watch,
    /// Dry run: show what the catalog would contain without writing it
    Check,
    /// List cataloged slot games
    Slots {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List a slot game's assets
    Assets {
        /// Slot slug
        #[arg(long)]
        slot: String,
        /// Only this category: BG, TEXT or ELEMENTS
        #[arg(long)]
        kind: Option<Category>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the file a storage key points at
    Resolve {
        /// Storage key, e.g. "storage/library/Dragon Quest!/bg/sky.png"
        key: String,
    },
    /// Print a stock library.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = load_config(&cli)?;

    match cli.command {
        Command::Scan => {
            init_thread_pool(&config.metadata);
            let catalog = SledCatalog::open(&config.catalog_path())?;
            let mut reconciler = Reconciler::new(SyncSettings::from_config(&config), catalog);
            let report = reconciler.run_pass()?;
            reconciler.into_catalog()?;
            output::print_scan_report(&report, &config.library_root());
        }
        Command::Watch => {
            init_thread_pool(&config.metadata);
            let catalog = SledCatalog::open(&config.catalog_path())?;
            let reconciler = Reconciler::new(SyncSettings::from_config(&config), catalog);
            let root = config.library_root();
            let watcher = LibraryWatcher::new(WatchSettings::from_config(&config), reconciler)
                .on_report(move |report| output::print_scan_report(report, &root));
            let stop = watcher.shutdown_handle();
            ctrlc::set_handler(move || stop.shutdown())?;
            watcher.run()?;
        }
        Command::Check => {
            init_thread_pool(&config.metadata);
            println!("==> Checking {}", config.library_root().display());
            let mut reconciler =
                Reconciler::new(SyncSettings::from_config(&config), MemoryCatalog::new());
            let report = reconciler.run_pass()?;
            output::print_scan_report(&report, &config.library_root());
            let catalog = reconciler.into_catalog()?;
            for slot in catalog.list_slot_games()? {
                println!();
                output::print_asset_list(&slot, &catalog.list_assets(&slot.id, None)?);
            }
        }
        Command::Slots { json } => {
            let catalog = SledCatalog::open(&config.catalog_path())?;
            let slots = catalog.list_slot_games()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&slots)?);
            } else {
                output::print_slot_list(&with_asset_counts(&catalog, slots)?);
            }
        }
        Command::Assets { slot, kind, json } => {
            let catalog = SledCatalog::open(&config.catalog_path())?;
            let found = catalog.slot_game_by_slug(&slot)?;
            let assets = match &found {
                Some(s) => catalog.list_assets(&s.id, kind)?,
                None => Vec::new(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&assets)?);
            } else if let Some(s) = &found {
                output::print_asset_list(s, &assets);
            } else {
                println!("No slot game with slug '{}'", slot);
            }
        }
        Command::Resolve { key } => {
            let layout = SyncSettings::from_config(&config).layout;
            println!("{}", layout.resolve(&key)?.display());
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// File config (explicit, or `./library.toml` when present) with CLI overrides on top.
fn load_config(cli: &Cli) -> Result<LibraryConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(Path::new("."))?,
    };
    if let Some(dir) = &cli.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = Some(catalog.clone());
    }
    if let Some(traversal) = cli.traversal {
        config.traversal = traversal;
    }
    config.validate()?;
    Ok(config)
}

fn with_asset_counts(
    catalog: &impl Catalog,
    slots: Vec<SlotGame>,
) -> Result<Vec<(SlotGame, usize)>, CatalogError> {
    slots
        .into_iter()
        .map(|slot| {
            let count = catalog.list_assets(&slot.id, None)?.len();
            Ok::<_, CatalogError>((slot, count))
        })
        .collect()
}

/// Logs go to stderr so listings on stdout stay pipeable.
fn init_logging(verbose: bool) {
    let default = if verbose { "slot_library=debug" } else { "slot_library=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Initialize the rayon thread pool based on metadata config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(metadata: &config::MetadataConfig) {
    let threads = config::effective_threads(metadata);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
