use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use holdfast_core::backup_set::BackupSet;
use holdfast_core::commands;
use holdfast_core::config::{self, BackupSetConfig, Config};
use holdfast_core::snapshot::catalog;

#[derive(Parser)]
#[command(name = "holdfast", version, about = "Incremental, deduplicated directory backups",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $HOLDFAST_CONFIG            (environment variable)
  3. ./holdfast.yaml             (project)
  4. Platform user config dir + /holdfast/config.yaml (e.g. ~/.config)
  5. /etc/holdfast/config.yaml   (system)

Environment variables:
  HOLDFAST_CONFIG   Path to configuration file (overrides default search)")]
struct Cli {
    /// Path to configuration file (overrides HOLDFAST_CONFIG and default search)
    #[arg(short, long)]
    config: Option<String>,

    /// Select a backup set by name (operates on all sets if omitted)
    #[arg(short = 's', long = "set", global = true)]
    set: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a snapshot of each selected backup set
    Backup,

    /// List snapshots at the destination
    List,

    /// Browse a snapshot via a local read-only WebDAV server
    Serve {
        /// Snapshot to serve: a timestamp directory name, or "latest"
        #[arg(long, default_value = "latest")]
        snapshot: String,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,

        /// Number of blobs held in the in-memory read cache
        #[arg(long, default_value = "4")]
        cache_size: usize,
    },

    /// Generate a minimal configuration file
    Config {
        /// Destination path for the config file
        #[arg(short, long, default_value = "holdfast.yaml")]
        dest: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // The `config` subcommand needs no config file.
    if let Commands::Config { dest } = &cli.command {
        if let Err(e) = run_config_generate(dest) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let source = match config::resolve_config_path(cli.config.as_deref()) {
        Some(path) => path,
        None => {
            eprintln!("Error: no configuration file found.");
            eprintln!("Searched:");
            for path in config::default_config_search_paths() {
                eprintln!("  {}", path.display());
            }
            eprintln!();
            eprintln!("Run `holdfast config` to generate a starter config file.");
            std::process::exit(1);
        }
    };

    tracing::info!("using config: {}", source.display());

    let config = match Config::load(&source) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let selected = match select_sets(&config, cli.set.as_deref()) {
        Ok(sets) => sets,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Configured backup sets:");
            for set in &config.backup_sets {
                eprintln!("  {:16} {}", set.name, set.source.path);
            }
            std::process::exit(1);
        }
    };

    let multi = selected.len() > 1;
    let mut had_error = false;

    for conf in &selected {
        if multi {
            eprintln!("--- Backup set: {} ---", conf.name);
        }

        let result = match &cli.command {
            Commands::Backup => run_backup(conf),
            Commands::List => run_list(conf),
            Commands::Serve {
                snapshot,
                listen,
                cache_size,
            } => run_serve(conf, snapshot, listen, *cache_size),
            Commands::Config { .. } => unreachable!(),
        };

        if let Err(e) = result {
            eprintln!("Error: {e}");
            had_error = true;
            if !multi {
                std::process::exit(1);
            }
        }
    }

    if had_error {
        std::process::exit(1);
    }
}

fn select_sets<'a>(
    config: &'a Config,
    name: Option<&str>,
) -> Result<Vec<&'a BackupSetConfig>, String> {
    match name {
        Some(name) => config
            .find_set(name)
            .map(|set| vec![set])
            .ok_or_else(|| format!("no backup set named '{name}'")),
        None => {
            if config.backup_sets.is_empty() {
                Err("no backup sets configured".into())
            } else {
                Ok(config.backup_sets.iter().collect())
            }
        }
    }
}

fn run_config_generate(dest: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = std::path::Path::new(dest);

    if path.exists() {
        return Err(format!("file already exists: {dest}").into());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(path, config::minimal_config_template())?;
    println!("Config written to: {dest}");
    println!("Edit it to set your source directory and destination.");
    Ok(())
}

fn run_backup(conf: &BackupSetConfig) -> Result<(), Box<dyn std::error::Error>> {
    let set = BackupSet::from_config(conf.clone())?;
    let outcome = commands::backup::run(&set)?;

    println!("Snapshot created for '{}'", set.name());
    println!(
        "  Files: {}, Size: {}, Blobs: {} referenced, {} uploaded",
        outcome.files,
        format_bytes(outcome.total_size),
        outcome.referenced_blobs,
        outcome.uploaded_blobs,
    );
    Ok(())
}

fn run_list(conf: &BackupSetConfig) -> Result<(), Box<dyn std::error::Error>> {
    let set = BackupSet::from_config(conf.clone())?;
    let mut snapshots = set.list_snapshots()?;

    if snapshots.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }
    snapshots.sort_by_key(|s| s.created_at);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Snapshot", "Date", "Files", "Size"]);
    for snapshot in &snapshots {
        table.add_row(vec![
            snapshot.rel_path(),
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            snapshot.files.len().to_string(),
            format_bytes(snapshot.total_size),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn run_serve(
    conf: &BackupSetConfig,
    snapshot: &str,
    listen: &str,
    cache_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let set = BackupSet::from_config(conf.clone())?;
    let dest = set.open_destination()?;
    let snapshot = catalog::resolve(dest.as_ref(), snapshot)?;

    eprintln!(
        "Serving snapshot {} of '{}'",
        snapshot.rel_path(),
        set.name()
    );
    commands::serve::run(&set, snapshot, listen, cache_size)?;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
