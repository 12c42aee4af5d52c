use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reference flush cadence for both sweepers.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Realm whose missing keys are resolved to a page title instead of ignored.
pub const DEFAULT_AUTO_REALM: &str = "hit";

/// Counter store configuration
///
/// Realms listed here exist from construction onward; the auto-populating
/// realm is always created. Any other realm stays unknown.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default snapshot file used by `persist_if_dirty(None)`
    pub snapshot_path: PathBuf,

    /// Realms created up front
    pub realms: BTreeSet<String>,

    /// Realm that resolves titles for unseen keys
    pub auto_realm: Option<String>,

    /// Prefix joined with a key to build the URL handed to the resolver
    pub title_origin: String,

    /// Sweeper tick
    pub sweep_interval: Duration,
}

impl StoreConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            realms: BTreeSet::new(),
            auto_realm: Some(DEFAULT_AUTO_REALM.to_string()),
            title_origin: "https://sheep.horse".to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Add a plain (non auto-populating) realm
    pub fn realm(mut self, realm: &str) -> Self {
        self.realms.insert(realm.to_string());
        self
    }

    /// Set the auto-populating realm, `None` disables title resolution
    pub fn auto_realm(mut self, realm: Option<&str>) -> Self {
        self.auto_realm = realm.map(str::to_string);
        self
    }

    /// Set the origin prepended to keys before title resolution
    pub fn title_origin(mut self, origin: &str) -> Self {
        self.title_origin = origin.trim_end_matches('/').to_string();
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Every realm the store creates on construction and after a load.
    pub fn initial_realms(&self) -> BTreeSet<String> {
        let mut realms = self.realms.clone();
        if let Some(auto) = &self.auto_realm {
            realms.insert(auto.clone());
        }
        realms
    }

    pub fn is_auto_realm(&self, realm: &str) -> bool {
        self.auto_realm.as_deref() == Some(realm)
    }

    /// URL handed to the resolver for a key in the auto realm.
    pub fn title_url(&self, key: &str) -> String {
        format!("{}{}", self.title_origin, key)
    }
}

/// Quiz manager configuration
#[derive(Debug, Clone)]
pub struct QuizConfig {
    /// Directory holding one `<id>.json` per quiz
    pub directory: PathBuf,

    pub sweep_interval: Duration,
}

impl QuizConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// HTTP title resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Whole-request timeout; a fetch is never unbounded
    pub timeout: Duration,

    /// Bytes of the response body read before giving up on finding a title
    pub max_body_bytes: usize,

    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_body_bytes: 8 * 1024,
            user_agent: format!("tallydb/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub store: StoreConfig,
    pub quiz: QuizConfig,
    pub resolver: ResolverConfig,
    /// Window served by `/recent`
    pub recent_window: Duration,
}

impl ServerConfig {
    pub fn new(bind: &str, store: StoreConfig, quiz: QuizConfig) -> Self {
        Self {
            bind: bind.to_string(),
            store,
            quiz,
            resolver: ResolverConfig::default(),
            recent_window: Duration::from_secs(60 * 60),
        }
    }

    pub fn resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn recent_window(mut self, window: Duration) -> Self {
        self.recent_window = window;
        self
    }
}
