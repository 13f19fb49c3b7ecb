use clap::{Parser, Subcommand};
use std::path::PathBuf;
use user_rag::Result;
use user_rag::commands::{
    add_user, ask, delete_user, list_users, reindex, serve_mcp, show_status, show_user,
    update_user,
};
use user_rag::config::{Config, get_config_dir, init_config, show_config};
use user_rag::database::UserUpdate;

#[derive(Parser)]
#[command(name = "user-rag")]
#[command(about = "Question answering over user records, with an MCP server")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the record database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file, or show the current one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Add a user record
    Add {
        name: String,
        email: String,
        /// Role of the user, e.g. "admin" (default: "user")
        #[arg(long)]
        role: Option<String>,
        /// Short free-text biography
        #[arg(long)]
        bio: Option<String>,
    },
    /// List user records
    List {
        /// Maximum number of users to show
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Show one user record
    Show {
        /// User ID
        id: String,
    },
    /// Update fields of a user record
    Update {
        /// User ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
    /// Delete a user record
    Delete {
        /// User ID
        id: String,
    },
    /// Ask a question about the user records
    Ask {
        question: String,
        /// Build the similarity index before answering
        #[arg(long)]
        wait_for_index: bool,
    },
    /// Rebuild the similarity index from the record store
    Reindex,
    /// Start MCP server on stdio
    Serve,
    /// Show connectivity of the record store and both backends
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to command output and the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| user_rag::RagError::Config(e.to_string()))?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load(&data_dir)?)?;
        } else {
            init_config(&data_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&data_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Add {
            name,
            email,
            role,
            bio,
        } => {
            add_user(&config, name, email, role, bio).await?;
        }
        Commands::List { limit } => {
            list_users(&config, limit).await?;
        }
        Commands::Show { id } => {
            show_user(&config, &id).await?;
        }
        Commands::Update {
            id,
            name,
            email,
            role,
            bio,
        } => {
            let update = UserUpdate {
                name,
                email,
                role,
                bio,
            };
            update_user(&config, &id, update).await?;
        }
        Commands::Delete { id } => {
            delete_user(&config, &id).await?;
        }
        Commands::Ask {
            question,
            wait_for_index,
        } => {
            ask(&config, &question, wait_for_index).await?;
        }
        Commands::Reindex => {
            reindex(&config).await?;
        }
        Commands::Serve => {
            serve_mcp(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}
