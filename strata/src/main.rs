use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use strata::intelligence::KnowledgeItem;
use strata::{Config, LearningTask, MemorySubsystem};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Tiered conversational memory: session context, session recall and learned facts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Short-term session context
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Medium-term, session-scoped memories
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Learn a fact into long-term memory
    Remember {
        content: String,
        #[arg(long, default_value_t = 0.8)]
        importance: f32,
        #[arg(long = "from-session")]
        sessions: Vec<String>,
        #[arg(long)]
        tenant: Option<Uuid>,
        /// Insert even when a near-duplicate exists
        #[arg(long)]
        no_dedup: bool,
        /// Run through the background learning queue, with a contradiction check
        #[arg(long)]
        queued: bool,
    },
    /// Search long-term memory
    Recall {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        #[arg(long)]
        min_importance: Option<f32>,
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    /// Check a statement against long-term memory for contradictions
    Check {
        content: String,
        #[arg(long)]
        tenant: Option<Uuid>,
        #[arg(long)]
        max_similar: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
    },
}

#[derive(Subcommand)]
enum ContextAction {
    Get {
        session: String,
    },
    Set {
        session: String,
        /// JSON object
        data: String,
        #[arg(long)]
        tenant: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    Add {
        session: String,
        content: String,
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    Recall {
        session: String,
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    Clear {
        session: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env();
    let memory = MemorySubsystem::from_config(&config).await?;

    let output = match args.command {
        Command::Context { action } => match action {
            ContextAction::Get { session } => {
                serde_json::to_value(memory.get_short_term_memory(&session).await)?
            }
            ContextAction::Set {
                session,
                data,
                tenant,
            } => {
                let data: serde_json::Value = serde_json::from_str(&data)?;
                serde_json::to_value(
                    memory
                        .update_short_term_memory(&session, data, tenant)
                        .await?,
                )?
            }
        },
        Command::Session { action } => match action {
            SessionAction::Add {
                session,
                content,
                tenant,
            } => {
                if let Some(tenant) = tenant {
                    memory.register_session(&session, &tenant).await?;
                }
                let id = memory.add_medium_term_memory(&session, &content).await?;
                serde_json::json!({ "id": id })
            }
            SessionAction::Recall {
                session,
                query,
                limit,
            } => serde_json::to_value(
                memory
                    .retrieve_medium_term_memory(&session, &query, limit)
                    .await,
            )?,
            SessionAction::Clear { session } => {
                let removed = memory.clear_session(&session).await?;
                serde_json::json!({ "removed": removed })
            }
        },
        Command::Remember {
            content,
            importance,
            sessions,
            tenant,
            no_dedup,
            queued,
        } => {
            if queued {
                learn_queued(&memory, &config, content, sessions, importance, tenant).await?
            } else {
                serde_json::to_value(
                    memory
                        .add_long_term_memory(
                            &content,
                            &sessions,
                            importance,
                            tenant,
                            !no_dedup,
                            None,
                        )
                        .await?,
                )?
            }
        }
        Command::Recall {
            query,
            limit,
            min_importance,
            tenant,
        } => serde_json::to_value(
            memory
                .retrieve_long_term_memory(&query, limit, min_importance, tenant)
                .await,
        )?,
        Command::Check {
            content,
            tenant,
            max_similar,
            threshold,
        } => serde_json::to_value(
            memory
                .check_contradictions(&KnowledgeItem::new(content, tenant), max_similar, threshold)
                .await,
        )?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    memory.sync().await?;
    Ok(())
}

async fn learn_queued(
    memory: &MemorySubsystem,
    config: &Config,
    content: String,
    learned_from_sessions: Vec<String>,
    importance_score: f32,
    tenant_id: Option<Uuid>,
) -> anyhow::Result<serde_json::Value> {
    let queue = memory.start_learning(&config.learning, CancellationToken::new());

    let task_id = queue.submit(LearningTask {
        content,
        learned_from_sessions,
        importance_score,
        tenant_id,
    })?;

    queue
        .shutdown_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(serde_json::json!({
        "task_id": task_id,
        "status": queue.status(&task_id),
    }))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "strata=info".into());

    // Logs go to stderr so stdout stays valid JSON.
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
