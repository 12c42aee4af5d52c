use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tallydb::app::{bootstrap, init_tracing, shutdown_signal};
use tallydb::{QuizConfig, ResolverConfig, ServerConfig, StoreConfig};

#[derive(Parser)]
#[command(name = "tallydb")]
#[command(about = "Hit counter and quiz tally server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "TALLYDB_BIND", default_value = "127.0.0.1:8080")]
        bind: String,
        /// Counter snapshot file, loaded at startup when present
        #[arg(long, env = "TALLYDB_SNAPSHOT", default_value = "counters.json")]
        snapshot: PathBuf,
        /// Directory holding one <quiz>.json per quiz
        #[arg(long, env = "TALLYDB_QUIZ_DIR", default_value = "quizzes")]
        quiz_dir: PathBuf,
        /// Origin joined with a new key to look up its page title
        #[arg(long, env = "TALLYDB_TITLE_ORIGIN", default_value = "https://sheep.horse")]
        title_origin: String,
        /// Realm whose unseen keys get a fetched page title
        #[arg(long, env = "TALLYDB_AUTO_REALM", default_value = "hit")]
        auto_realm: String,
        /// Additional plain realms created at startup
        #[arg(long = "realm", env = "TALLYDB_REALMS", value_delimiter = ',')]
        realms: Vec<String>,
        #[arg(long, env = "TALLYDB_SWEEP_SECS", default_value_t = 10)]
        sweep_secs: u64,
        #[arg(long, env = "TALLYDB_FETCH_TIMEOUT_SECS", default_value_t = 5)]
        fetch_timeout_secs: u64,
        /// Bytes of a page read while looking for its title
        #[arg(long, env = "TALLYDB_MAX_TITLE_BYTES", default_value_t = 8 * 1024)]
        max_title_bytes: usize,
        /// Window reported by /recent
        #[arg(long, env = "TALLYDB_RECENT_MINUTES", default_value_t = 60)]
        recent_minutes: u64,
    },
    /// Print a counter snapshot's realms and key counts, then exit
    Inspect {
        #[arg(long, env = "TALLYDB_SNAPSHOT", default_value = "counters.json")]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            snapshot,
            quiz_dir,
            title_origin,
            auto_realm,
            realms,
            sweep_secs,
            fetch_timeout_secs,
            max_title_bytes,
            recent_minutes,
        } => {
            init_tracing();
            let sweep = Duration::from_secs(sweep_secs);
            let mut store = StoreConfig::new(snapshot)
                .title_origin(&title_origin)
                .auto_realm(Some(&auto_realm))
                .sweep_interval(sweep);
            for realm in &realms {
                store = store.realm(realm);
            }
            let config = ServerConfig::new(&bind, store, QuizConfig::new(quiz_dir).sweep_interval(sweep))
                .resolver(
                    ResolverConfig::default()
                        .timeout(Duration::from_secs(fetch_timeout_secs))
                        .max_body_bytes(max_title_bytes),
                )
                .recent_window(Duration::from_secs(recent_minutes * 60));
            serve(config).await
        }
        Command::Inspect { snapshot } => inspect(snapshot).await,
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let app = bootstrap(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum serve error")?;

    app.shutdown().await
}

async fn inspect(path: PathBuf) -> Result<()> {
    let snapshot = tallydb::SnapshotFile::new(&path)
        .load()
        .await
        .with_context(|| format!("could not read '{}'", path.display()))?;
    for (realm, records) in &snapshot {
        let hits: u64 = records.values().map(|record| record.count).sum();
        println!("{realm}: {} keys, {hits} hits", records.len());
    }
    Ok(())
}
