use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tracing::{info, warn};

use crate::answer::AnswerComposer;
use crate::completion::{ChatClient, CompletionBackend, DecodingParams};
use crate::config::Config;
use crate::config::report::api_key_status;
use crate::database::lancedb::LanceBackend;
use crate::database::sqlite::{Database, NewUser, User, UserUpdate};
use crate::embeddings::OllamaClient;
use crate::mcp::{McpServer, register_tools};
use crate::retrieval::{IndexManager, QueryRouter, RebuildOutcome, RecordStore, SimilarityBackend};

/// Every component of the question-answering path, wired together
pub struct Pipeline {
    pub database: Arc<Database>,
    pub manager: Arc<IndexManager>,
    pub router: Arc<QueryRouter>,
    pub composer: Arc<AnswerComposer>,
}

impl Pipeline {
    /// Wire the production backends: SQLite, Ollama + LanceDB, and the chat API
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let database = open_database(config).await?;

        let embedder = OllamaClient::new(config).context("Failed to create Ollama client")?;
        let backend = Arc::new(LanceBackend::new(Arc::new(embedder)));
        let completion =
            ChatClient::new(&config.completion).context("Failed to create chat client")?;

        Ok(Self::assemble(config, database, backend, Arc::new(completion)))
    }

    /// Wire the pipeline around explicit backends
    #[inline]
    pub fn assemble(
        config: &Config,
        database: Arc<Database>,
        backend: Arc<dyn SimilarityBackend>,
        completion: Arc<dyn CompletionBackend>,
    ) -> Self {
        let manager = Arc::new(IndexManager::new(
            Arc::clone(&database) as Arc<dyn RecordStore>,
            backend,
            config.retrieval.store_timeout(),
        ));
        let router = Arc::new(QueryRouter::new(
            Arc::clone(&manager),
            config.retrieval.top_k,
        ));
        let composer = Arc::new(AnswerComposer::new(
            Arc::clone(&router),
            completion,
            DecodingParams::from(&config.completion),
            config.completion.timeout(),
        ));

        Self {
            database,
            manager,
            router,
            composer,
        }
    }
}

async fn open_database(config: &Config) -> Result<Arc<Database>> {
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")?
        .with_record_cap(config.retrieval.max_records);
    Ok(Arc::new(database))
}

fn print_user(user: &User) {
    println!("{} {}", style("👤").bold(), style(&user.name).bold());
    println!("   ID: {}", style(&user.id).dim());
    println!("   Email: {}", user.email);
    println!("   Role: {}", style(&user.role).cyan());
    println!("   Bio: {}", user.bio_or_placeholder());
    println!(
        "   Created: {}  Updated: {}",
        user.created_date.format("%Y-%m-%d %H:%M:%S"),
        user.updated_date.format("%Y-%m-%d %H:%M:%S")
    );
}

#[inline]
pub async fn add_user(
    config: &Config,
    name: String,
    email: String,
    role: Option<String>,
    bio: Option<String>,
) -> Result<User> {
    let database = open_database(config).await?;

    let mut new_user = NewUser::new(name, email);
    if let Some(role) = role {
        new_user = new_user.with_role(role);
    }
    if let Some(bio) = bio {
        new_user = new_user.with_bio(bio);
    }

    let user = database.create_user(new_user).await?;
    info!("Created user {}", user.id);

    println!("{}", style("✅ User created").green());
    print_user(&user);
    Ok(user)
}

#[inline]
pub async fn list_users(config: &Config, limit: u32) -> Result<Vec<User>> {
    let database = open_database(config).await?;
    let users = database.list_users(limit).await?;

    if users.is_empty() {
        println!("No users found.");
        println!("Use 'user-rag add <name> <email>' to create one.");
        return Ok(users);
    }

    println!("{}", style(format!("📋 Users ({})", users.len())).bold());
    println!();
    for user in &users {
        println!(
            "  {}  {:<24} {:<32} {}",
            style(&user.id).dim(),
            user.name,
            user.email,
            style(&user.role).cyan()
        );
    }

    let total = database.count_users().await?;
    if total > users.len() as i64 {
        println!();
        println!(
            "Showing {} of {} users. Use --limit to see more.",
            users.len(),
            total
        );
    }

    Ok(users)
}

#[inline]
pub async fn show_user(config: &Config, id: &str) -> Result<User> {
    let database = open_database(config).await?;
    let user = database.get_user(id).await?;
    print_user(&user);
    Ok(user)
}

#[inline]
pub async fn update_user(config: &Config, id: &str, update: UserUpdate) -> Result<User> {
    let database = open_database(config).await?;
    let user = database.update_user(id, update).await?;

    println!("{}", style("✅ User updated").green());
    print_user(&user);
    Ok(user)
}

#[inline]
pub async fn delete_user(config: &Config, id: &str) -> Result<()> {
    let database = open_database(config).await?;
    database.delete_user(id).await?;
    println!("{} {}", style("🗑️  Deleted user").green(), id);
    Ok(())
}

/// Answer a question. With `wait_for_index` the similarity index is built
/// first; otherwise the answer comes from the linear-scan fallback.
#[inline]
pub async fn ask(config: &Config, question: &str, wait_for_index: bool) -> Result<String> {
    let pipeline = Pipeline::open(config).await?;
    // The process exits after answering, so a background build would be discarded
    pipeline.router.set_background_rebuild(false);

    if wait_for_index {
        report_rebuild(&pipeline.manager.rebuild().await);
    }

    let answer = pipeline.composer.answer(question).await;
    println!("{}", answer);
    Ok(answer)
}

#[inline]
pub async fn reindex(config: &Config) -> Result<RebuildOutcome> {
    let pipeline = Pipeline::open(config).await?;
    println!("🔄 Rebuilding similarity index...");
    let outcome = pipeline.manager.rebuild().await;
    report_rebuild(&outcome);
    Ok(outcome)
}

fn report_rebuild(outcome: &RebuildOutcome) {
    match outcome {
        RebuildOutcome::Ready { documents } => {
            eprintln!(
                "{}",
                style(format!("✅ Index built with {} documents", documents)).green()
            );
        }
        RebuildOutcome::Empty => {
            eprintln!("{}", style("⚠️  No records to index").yellow());
        }
        RebuildOutcome::AlreadyRunning => {
            eprintln!("{}", style("⚠️  A rebuild is already running").yellow());
        }
        RebuildOutcome::Failed { error } => {
            eprintln!(
                "{}",
                style(format!("❌ Index rebuild failed: {}", error)).red()
            );
        }
    }
}

/// Connectivity report for the store and both remote backends
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("📊 user-rag status").bold().cyan());
    println!();

    println!("{}", style("Record store (SQLite):").bold().yellow());
    println!("   Path: {}", config.database_path().display());
    match open_database(config).await {
        Ok(database) => match database.count_users().await {
            Ok(count) => println!("   ✅ Connected, {} users", count),
            Err(e) => println!("   ❌ Query failed: {}", e),
        },
        Err(e) => println!("   ❌ Unavailable: {:#}", e),
    }

    println!();
    println!("{}", style("Embeddings (Ollama):").bold().yellow());
    match OllamaClient::new(config) {
        Ok(client) => {
            println!("   Model: {}", client.model());
            let health = tokio::task::spawn_blocking(move || client.health_check())
                .await
                .context("Ollama health check task failed")?;
            match health {
                Ok(()) => println!("   ✅ Healthy"),
                Err(e) => {
                    warn!("Ollama health check failed: {:#}", e);
                    println!("   ❌ Unhealthy: {:#}", e);
                }
            }
        }
        Err(e) => println!("   ❌ Invalid configuration: {:#}", e),
    }

    println!();
    println!("{}", style("Completion:").bold().yellow());
    println!("   Model: {}", config.completion.model);
    let key_env = &config.completion.api_key_env;
    match api_key_status(key_env) {
        "set" => println!("   ✅ {} is set", key_env),
        _ => println!("   ❌ {} is missing", key_env),
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'user-rag add <name> <email>' to create users");
    println!("   • Use 'user-rag ask \"<question>\"' to query them");
    println!("   • Use 'user-rag serve' to start the MCP server for AI assistants");

    Ok(())
}

/// Serve the record tools over MCP on stdio until EOF or Ctrl+C
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;

    let server = Arc::new(McpServer::new(
        "user-rag".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    register_tools(&server, &pipeline.composer).await;

    // Warm the index so the first question can use similarity search
    drop(pipeline.manager.spawn_rebuild());

    // stdout carries the protocol; everything human-readable goes to stderr
    eprintln!("🌐 MCP server ready on stdio with tools: ask_records, search_records, rebuild_index");
    eprintln!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = server.serve_stdio() => {
            result.context("MCP server failed")?;
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    eprintln!("✅ Shutdown complete");
    Ok(())
}
