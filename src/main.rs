use anyhow::Result;
use chatlake::config::Config;
use chatlake::{cluster, db, drift, embedding, ingest, ledger, metrics, models, segment, similarity, topics};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "chatlake")]
#[command(about = "Derives segments, clusters, topics, similarity and drift from conversation archives", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "./chatlake.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Import a ChatGPT export file
    Import {
        /// Path to the export JSON file
        path: PathBuf,
    },

    /// Segment conversations that have no segments yet
    Segment,

    /// Compute (or refresh) embeddings for every segment
    Embed,

    /// Cluster segments and write project suggestions
    Cluster,

    /// Compute conversation-to-conversation similarity edges
    Similarity,

    /// Fit topics over every conversation
    Topics,

    /// Compute drift metrics for every project
    Drift,

    /// List recent inference runs
    Runs {
        #[arg(long)]
        run_type: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// List pending project suggestions
    Suggestions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).with_target(false).compact().build();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::load()?;
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    match cli.command {
        Commands::Init => {
            info!("Initializing database at {:?}", cli.database);
            let pool = db::create_pool(&cli.database).await?;
            db::run_migrations(&pool).await?;
            info!("Database initialized successfully");
        }

        Commands::Import { path } => {
            let pool = db::create_pool(&cli.database).await?;
            let stats = ingest::pipeline::import_file(&pool, &path, &cancel).await?;
            metrics::track_ingest(stats.conversations_new, stats.conversations_remapped, stats.messages, stats.parsing_failures);
            println!(
                "Imported {} new conversations ({} remapped, {} parsing failures)",
                stats.conversations_new, stats.conversations_remapped, stats.parsing_failures
            );
        }

        Commands::Segment => {
            let pool = db::create_pool(&cli.database).await?;
            let summary = segment::execute(&pool, &config.segment, &cancel).await?;
            println!("Segmented {} conversations into {} segments", summary.items_processed, summary.items_written);
        }

        Commands::Embed => {
            let pool = db::create_pool(&cli.database).await?;
            let segments: Vec<(i64, String)> = sqlx::query_as("SELECT id, content_text FROM conversation_segments")
                .fetch_all(&pool)
                .await?;
            for (id, text) in &segments {
                if cancel.is_cancelled() {
                    break;
                }
                embedding::get_or_compute(&pool, *id, embedding::DEFAULT_MODEL, text).await?;
            }
            println!("Embedded {} segments", segments.len());
        }

        Commands::Cluster => {
            let pool = db::create_pool(&cli.database).await?;
            let summary = cluster::execute(&pool, &config.clustering, &config.kmeans, &cancel).await?;
            println!("Clustering run {} wrote {} project suggestions", summary.run_id, summary.items_written);
        }

        Commands::Similarity => {
            let pool = db::create_pool(&cli.database).await?;
            let summary = similarity::execute(&pool, &config.similarity, &cancel).await?;
            println!("Similarity run {} wrote {} edges", summary.run_id, summary.items_written);
        }

        Commands::Topics => {
            let pool = db::create_pool(&cli.database).await?;
            let summary = topics::execute(&pool, &config.topics, &cancel).await?;
            println!("Topics run {} wrote {} conversation-topic scores", summary.run_id, summary.items_written);
        }

        Commands::Drift => {
            let pool = db::create_pool(&cli.database).await?;
            let summary = drift::execute(&pool, &config.drift, &cancel).await?;
            println!("Drift run {} wrote {} metrics", summary.run_id, summary.items_written);
        }

        Commands::Runs { run_type, limit } => {
            let pool = db::create_pool(&cli.database).await?;
            let parsed_type = run_type.as_deref().and_then(models::RunType::from_str);
            let runs = ledger::list_recent(&pool, parsed_type, limit).await?;
            for run in runs {
                println!("{:>6}  {:<12} {:<10} {}", run.id, run.run_type, run.status, run.started_at);
            }
        }

        Commands::Suggestions => {
            let pool = db::create_pool(&cli.database).await?;
            let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
                "SELECT id, suggested_name, status, confidence FROM project_suggestions ORDER BY id DESC",
            )
            .fetch_all(&pool)
            .await?;
            for (id, name, status, confidence) in rows {
                println!("{:>6}  {:<30} {:<10} {}", id, name, status, confidence);
            }
        }
    }

    Ok(())
}
