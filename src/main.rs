//! Botdesk - command-line client for the chatbot platform
//!
#![doc = "Botdesk - command-line client for the chatbot platform"]
#![doc = "Main entry point for the botdesk binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use botdesk::cli::{Cli, Commands};
use botdesk::commands::{self, SignalReporter};
use botdesk::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let client = commands::connect(&config)?;
    let mut signals = SignalReporter::new(client.session());

    // Execute command
    let result = match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Starting login");
            commands::auth::handle_login(&client, email, password).await
        }
        Commands::Signup {
            email,
            name,
            password,
        } => commands::auth::handle_signup(&client, email, name, password).await,
        Commands::Logout => commands::auth::handle_logout(&client).await,
        Commands::Whoami => commands::auth::handle_whoami(&client).await,
        Commands::Project { command } => {
            commands::project::handle_project(&client, command).await
        }
        Commands::Chat {
            conversation,
            message,
            no_stream,
        } => {
            tracing::info!("Starting chat mode");
            if let Some(id) = &conversation {
                tracing::debug!("Resuming conversation: {}", id);
            }
            commands::chat::run_chat(&config, &client, conversation, message, no_stream).await
        }
        Commands::Conversations { command } => {
            commands::conversations::handle_conversations(&client, command).await
        }
        Commands::Documents { command } => {
            commands::documents::handle_documents(&client, command).await
        }
        Commands::Notifications { command } => {
            commands::notifications::handle_notifications(&client, command).await
        }
    };

    // Credential invalidations raised by the command are explained last.
    signals.report();
    result
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "botdesk=debug" } else { "botdesk=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
