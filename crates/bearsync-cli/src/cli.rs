use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "bearsync")]
#[command(about = "Keep a local cache of Bear notes in step with iCloud")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Optional path to the local note cache
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync the local cache with iCloud
    Sync {
        /// Rebuild the cache from scratch instead of applying changes
        #[arg(long)]
        full: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter notes by tag name
        #[arg(long)]
        tag: Option<String>,
        /// Include archived notes
        #[arg(long)]
        archived: bool,
        /// Include trashed notes
        #[arg(long)]
        trashed: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search notes
    Search {
        /// Search query
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a note
    Show {
        /// Record name, unique identifier, or record name prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content (read from stdin when omitted)
        content: Vec<String>,
        /// Tag to add to the note; may be repeated
        #[arg(short, long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// Append text to an existing note
    Append {
        /// Record name, unique identifier, or record name prefix
        id: String,
        /// Text to append (read from stdin when omitted)
        content: Vec<String>,
    },
    /// Move a note to the trash
    Trash {
        /// Record name, unique identifier, or record name prefix
        id: String,
        /// Take the note out of the trash instead
        #[arg(long)]
        restore: bool,
    },
    /// Archive a note
    Archive {
        /// Record name, unique identifier, or record name prefix
        id: String,
        /// Unarchive the note instead
        #[arg(long)]
        restore: bool,
    },
    /// Manage CloudKit credentials
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store the web auth token and API token handed out by sign-in
    Set {
        /// CloudKit web auth token (`ckWebAuthToken`)
        #[arg(long, value_name = "TOKEN")]
        web_auth_token: String,
        /// CloudKit API token (`ckAPIToken`)
        #[arg(long, value_name = "TOKEN")]
        api_token: String,
    },
    /// Show where credentials come from
    Status,
    /// Remove stored credentials
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
