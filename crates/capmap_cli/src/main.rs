//! capmap CLI - Command-line host for a shared capability map.

use anyhow::Result;
use capmap_core::CapabilityId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "capmap")]
#[command(about = "Collaborative capability tree with advisory locks", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the .capmap data directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new capability map
    Init,
    /// Create a capability
    Add {
        /// Capability name
        name: String,
        /// Parent capability (root level if omitted)
        #[arg(short, long)]
        parent: Option<CapabilityId>,
        /// Position among the siblings (appends if omitted)
        #[arg(short, long)]
        index: Option<usize>,
        /// Markdown description
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Change name or description of a capability
    Edit {
        /// Capability id
        id: CapabilityId,
        /// New name
        #[arg(short, long)]
        name: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a capability and its subtree
    Rm {
        /// Capability id
        id: CapabilityId,
    },
    /// Move a capability under a new parent
    Mv {
        /// Capability id
        id: CapabilityId,
        /// New parent (root level if omitted)
        #[arg(short, long)]
        parent: Option<CapabilityId>,
        /// Position among the new siblings
        #[arg(short, long, default_value = "0")]
        index: usize,
    },
    /// Print the tree, or the subtree under one capability
    Tree {
        /// Subtree root
        id: Option<CapabilityId>,
    },
    /// Export the tree as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the tree with a JSON export
    Import {
        /// JSON file to import
        file: PathBuf,
    },
    /// Verify tree consistency
    Check,
    /// Interactive multi-session shell
    Shell,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = cli.dir.as_path();

    match cli.command {
        Commands::Init => commands::init::run(dir),
        Commands::Add {
            name,
            parent,
            index,
            description,
        } => commands::add::run(dir, &name, parent, index, &description),
        Commands::Edit {
            id,
            name,
            description,
        } => commands::edit::run(dir, id, name, description),
        Commands::Rm { id } => commands::remove::run(dir, id),
        Commands::Mv { id, parent, index } => commands::mv::run(dir, id, parent, index),
        Commands::Tree { id } => commands::tree::run(dir, id),
        Commands::Export { output } => commands::export::run(dir, output.as_deref()),
        Commands::Import { file } => commands::import::run(dir, &file),
        Commands::Check => commands::check::run(dir),
        Commands::Shell => commands::shell::run(dir),
    }
}
