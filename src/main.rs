//! Media Vault - CLI
//!
//! Command-line interface for vault operations.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use media_vault::{FileRecord, ListView, MediaVault, Rendered, VaultConfig};

#[derive(Parser)]
#[command(name = "media-vault")]
#[command(version = media_vault::VERSION)]
#[command(about = "Media Vault - encrypted private gallery for photos and videos")]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overrides config and environment
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// More logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault layout and master key
    Init,

    /// Import files
    Import {
        /// Files to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List files in import order
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Render a file
    View {
        /// Record ID
        id: i64,
    },

    /// Write decrypted content to a file
    Export {
        /// Record ID
        id: i64,

        /// Output path
        output: PathBuf,
    },

    /// Delete a file
    Delete {
        /// Record ID
        id: i64,
    },

    /// Show vault statistics
    Stats,

    /// Print the file list every time it changes
    Watch {
        /// Stop after this many seconds (default: run until killed)
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(cli: &Cli) -> Result<VaultConfig> {
    let mut config =
        VaultConfig::load_with_env(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn open_vault(cli: &Cli) -> Result<MediaVault> {
    let config = load_config(cli)?;
    let dir = config.data_dir.clone();
    MediaVault::open(config).with_context(|| format!("opening vault at {}", dir.display()))
}

fn print_table(files: &[FileRecord]) {
    if files.is_empty() {
        println!("📭 No files in vault");
        return;
    }

    println!("{:>6}  {:<6}  {}", "ID", "TYPE", "NAME");
    println!("{:-<60}", "");
    for file in files {
        println!("{:>6}  {:<6}  {}", file.id, file.extension, file.name);
    }
}

/// Prints each pushed list to stdout
struct StdoutView;

impl ListView for StdoutView {
    fn show(&mut self, items: &[FileRecord]) {
        println!("🔄 {} file(s)", items.len());
        print_table(items);
        println!();
    }
}

fn run(cli: Cli) -> Result<()> {
    let vault = open_vault(&cli)?;

    match cli.command {
        Commands::Init => {
            println!("🔐 Vault ready at: {}", vault.config().data_dir.display());
            println!("   Key fingerprint: {}", vault.key_fingerprint());
            println!("📁 Structure:");
            println!("   {}/  - Encrypted blobs", vault.config().blob_dir);
            println!("   {}  - File index", vault.config().database);
            println!("   {}  - Master key", vault.config().key_file);
            println!("   {}/  - Playback cache", vault.config().cache_dir);
        }

        Commands::Import { ref paths } => {
            let pending: Vec<_> = paths
                .iter()
                .map(|p| (p, vault.import_in_background(p)))
                .collect();

            let mut failed = 0;
            for (path, job) in pending {
                match job.wait().and_then(|r| r) {
                    Ok(record) => println!("✅ {} imported with ID: {}", path.display(), record.id),
                    Err(e) => {
                        failed += 1;
                        eprintln!("❌ {}: {}", path.display(), e);
                    }
                }
            }

            if failed > 0 {
                bail!("{} of {} imports failed", failed, paths.len());
            }
        }

        Commands::List { json } => {
            let files = vault.files().context("listing files")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                print_table(&files);
            }
        }

        Commands::View { id } => match vault.view(id).with_context(|| format!("record {}", id))? {
            Rendered::Image { width, height, format, .. } => {
                println!("🖼️ Image {}x{} ({:?})", width, height, format);
            }
            Rendered::Video { path, len } => {
                println!("🎬 Video decrypted to {} ({} bytes)", path.display(), len);
                println!("   Press Enter when done playing...");
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
            }
            Rendered::Empty(reason) => {
                println!("Nothing to display ({:?})", reason);
            }
        },

        Commands::Export { id, ref output } => {
            let file = File::create(output)
                .with_context(|| format!("creating {}", output.display()))?;
            let mut out = BufWriter::new(file);
            let written = vault
                .export(id, &mut out)
                .with_context(|| format!("exporting record {}", id))?;
            println!("✅ Exported {} bytes to: {}", written, output.display());
        }

        Commands::Delete { id } => {
            if vault.delete(id)? {
                println!("🗑️ Deleted record {}", id);
            } else {
                bail!("no record with ID {}", id);
            }
        }

        Commands::Stats => {
            let stats = vault.stats()?;
            println!("📊 Media Vault Statistics");
            println!("{:-<40}", "");
            println!("Files:            {}", stats.files);
            println!("Blobs:            {}", stats.blobs);
            println!("Encrypted size:   {} KB", stats.blob_bytes / 1024);
            println!("Key fingerprint:  {}", vault.key_fingerprint());
        }

        Commands::Watch { seconds } => {
            let handle = vault.presenter()?.bind(StdoutView)?;
            match seconds {
                Some(s) => thread::sleep(Duration::from_secs(s)),
                None => loop {
                    thread::park();
                },
            }
            // Dropping the vault ends the subscription
            drop(vault);
            if handle.join().is_err() {
                bail!("list view thread panicked");
            }
        }
    }

    Ok(())
}
