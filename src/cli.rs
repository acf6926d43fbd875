//! Command-line interface definition for Botdesk
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for authentication, project selection, chat and
//! knowledge-base management.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Botdesk - command-line client for the chatbot platform
///
/// Sign in, pick a project API key, and chat with the project's bot or
/// manage its documents and conversations.
#[derive(Parser, Debug, Clone)]
#[command(name = "botdesk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the API base URL (including any version prefix)
    #[arg(long)]
    pub api_base: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Botdesk
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(long, env = "BOTDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account
    Signup {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(long, env = "BOTDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user and active project
    Whoami,

    /// Manage projects and their API keys
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Chat with the active project's bot
    Chat {
        /// Continue an existing conversation
        #[arg(short = 'C', long)]
        conversation: Option<String>,

        /// Send a single message and exit instead of starting the REPL
        #[arg(short, long)]
        message: Option<String>,

        /// Wait for the complete reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Browse conversation history
    Conversations {
        #[command(subcommand)]
        command: ConversationCommand,
    },

    /// Manage knowledge-base documents
    Documents {
        #[command(subcommand)]
        command: DocumentCommand,
    },

    /// Account notifications
    Notifications {
        #[command(subcommand)]
        command: NotificationCommand,
    },
}

/// Project subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    /// List projects
    List {
        /// Output as JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Select the active project and its API key
    Use {
        /// Project identifier
        project_id: String,

        /// Project API key
        #[arg(short = 'k', long, env = "BOTDESK_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Create a project
    Create {
        /// Project name
        name: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a project
    Delete {
        /// Project identifier
        project_id: String,
    },

    /// List API keys of a project (default: active project)
    Keys {
        /// Project identifier
        #[arg(short, long)]
        project: Option<String>,

        /// Output as JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Issue a new API key (default: active project)
    CreateKey {
        /// Project identifier
        #[arg(short, long)]
        project: Option<String>,

        /// Label for the key
        #[arg(short, long)]
        name: Option<String>,

        /// Make the new key the active key
        #[arg(long = "use")]
        use_key: bool,
    },

    /// Revoke an API key (default: active project)
    RevokeKey {
        /// Key identifier
        key_id: String,

        /// Project identifier
        #[arg(short, long)]
        project: Option<String>,
    },
}

/// Conversation subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConversationCommand {
    /// List recent conversations
    List {
        /// Maximum number of conversations
        #[arg(short, long)]
        limit: Option<u32>,

        /// Output as JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Print the messages of a conversation
    Show {
        /// Conversation identifier
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation identifier
        id: String,
    },
}

/// Document subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DocumentCommand {
    /// List uploaded documents
    List {
        /// Output as JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Upload a file
    Upload {
        /// File to upload
        path: PathBuf,

        /// Title shown in listings
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Delete a document
    Delete {
        /// Document identifier
        id: String,
    },

    /// Run a retrieval query
    Search {
        /// Query text
        query: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<u32>,
    },
}

/// Notification subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum NotificationCommand {
    /// List notifications
    List {
        /// Only unread notifications
        #[arg(short, long)]
        unread: bool,

        /// Output as JSON instead of a table
        #[arg(short, long)]
        json: bool,
    },

    /// Mark notifications as read
    Read {
        /// Notification identifier
        #[arg(required_unless_present = "all")]
        id: Option<String>,

        /// Mark every notification as read
        #[arg(short, long, conflicts_with = "id")]
        all: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            api_base: None,
            command: Commands::Whoami,
        }
    }
}
