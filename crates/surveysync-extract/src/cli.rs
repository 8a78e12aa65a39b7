use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SurveySync - incremental survey extraction
#[derive(Parser, Debug)]
#[command(name = "surveysync")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract new survey data into the object store and advance bookmarks
    Extract {
        /// Only extract these survey ids (repeatable)
        #[arg(short, long = "survey")]
        surveys: Vec<String>,

        /// Records per page requested from the API
        #[arg(long, env = "ALCHEMER_PAGE_SIZE")]
        page_size: Option<u32>,

        /// Checkpoint file
        #[arg(long, env = "SYNC_STATE_FILE")]
        state_file: Option<PathBuf>,

        /// Write exports under this directory instead of the configured store
        #[arg(long)]
        local_dir: Option<PathBuf>,
    },

    /// Reconcile question options with a contacts extract
    SyncOptions {
        /// Survey and question ids to reconcile
        #[arg(short, long, default_value = "options.toml")]
        config: PathBuf,

        /// Contacts extract (JSON list)
        #[arg(long, env = "CONTACTS_EXTRACT_FILEPATH")]
        contacts: PathBuf,

        /// Print the planned changes without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the current bookmarks
    Bookmarks {
        /// Checkpoint file
        #[arg(long, env = "SYNC_STATE_FILE")]
        state_file: Option<PathBuf>,
    },
}
