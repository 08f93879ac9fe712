use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "viewerctl")]
#[command(about = "Inspect the viewer catalog and exercise the viewer registry", long_about = None)]
pub struct Cli {
    /// Catalog file to use instead of the configured one
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Extra feature flags, comma-separated
    #[arg(long, global = true)]
    pub features: Option<String>,

    /// Write logs to the daily log file instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered viewers
    List {
        /// Include catalog entries that were not registered, with the reason
        #[arg(long)]
        all: bool,
    },
    /// Show which viewers can open a set of files, best first
    Resolve {
        #[arg(required = true)]
        files: Vec<String>,

        /// Treat the files as a preview file set
        #[arg(long)]
        preview: bool,
    },
    /// Pick a viewer for the files, load it and mount it
    Show {
        #[arg(required = true)]
        files: Vec<String>,

        #[arg(long)]
        preview: bool,

        /// Viewer to use instead of the best match
        #[arg(long)]
        viewer: Option<String>,

        /// Do not fetch runtime resources over the network
        #[arg(long)]
        offline: bool,

        #[arg(long, default_value = "asset")]
        asset_id: String,

        #[arg(long, default_value = "default")]
        database_id: String,
    },
    /// Validate a catalog document
    Check {
        /// Catalog file; defaults to the configured or built-in catalog
        path: Option<PathBuf>,
    },
}
