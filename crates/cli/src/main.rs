//! `aita` — pack asset manifests into a bundle and inspect bundles.

mod commands;

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aita")]
#[command(about = "Pack and inspect asset bundles", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge one or more manifests into a bundle file
    Pack {
        /// Bundle file to create or replace
        #[arg(short, long)]
        output: PathBuf,
        /// Manifest files, merged in the order given
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
        /// Skip fsync before the final rename
        #[arg(long)]
        no_sync: bool,
    },

    /// List the assets in a bundle
    List {
        bundle: PathBuf,
        /// Load every file into memory instead of streaming
        #[arg(long)]
        preload: bool,
    },

    /// Write the files of one asset to stdout
    Cat {
        bundle: PathBuf,
        /// Asset identifier
        id: String,
        /// Load every file into memory instead of streaming
        #[arg(long)]
        preload: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Pack {
            output,
            manifests,
            no_sync,
        } => commands::pack(&output, &manifests, !no_sync),
        Commands::List { bundle, preload } => {
            commands::list(&bundle, preload, &mut io::stdout().lock())
        }
        Commands::Cat {
            bundle,
            id,
            preload,
        } => commands::cat(&bundle, &id, preload, &mut io::stdout().lock()),
    }
}
