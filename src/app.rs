use crate::config::ServerConfig;
use crate::counter::CounterStore;
use crate::quiz::QuizManager;
use crate::resolver::HttpTitleResolver;
use crate::rolling::RollingLog;
use crate::web::{AppState, router};
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Running stores plus the router that serves them.
pub struct App {
    pub router: Router,
    pub counters: Arc<CounterStore>,
    pub quizzes: Arc<QuizManager>,
}

/// Loads the counter snapshot, builds the quiz manager and starts both sweepers.
///
/// A snapshot that exists but cannot be read or parsed aborts startup.
pub async fn bootstrap(config: &ServerConfig) -> Result<App> {
    let resolver = HttpTitleResolver::new(&config.resolver).context("failed to build title resolver")?;
    let counters = CounterStore::open(config.store.clone(), Arc::new(resolver))
        .await
        .with_context(|| {
            format!(
                "could not load counter snapshot '{}'",
                config.store.snapshot_path().display()
            )
        })?;
    let counters = Arc::new(counters);
    counters.start_sweeper().await;

    let quizzes = Arc::new(QuizManager::with_directory(&config.quiz));
    quizzes.start_sweeper().await;

    let window = chrono::Duration::from_std(config.recent_window)
        .context("recent window is out of range")?;
    let state = AppState::new(counters.clone(), quizzes.clone(), RollingLog::new(window));

    info!(
        snapshot = %config.store.snapshot_path().display(),
        quiz_dir = %config.quiz.directory.display(),
        "stores ready"
    );
    Ok(App {
        router: router(state),
        counters,
        quizzes,
    })
}

impl App {
    /// Stops both sweepers and writes everything still dirty.
    pub async fn shutdown(self) -> Result<()> {
        let quiz_report = self.quizzes.shutdown().await.context("quiz manager shutdown")?;
        let wrote = self.counters.shutdown().await.context("final counter flush")?;
        info!(
            counters_written = wrote,
            quizzes_saved = quiz_report.saved.len(),
            quizzes_failed = quiz_report.failed.len(),
            "shutdown complete"
        );
        Ok(())
    }
}

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tallydb=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
