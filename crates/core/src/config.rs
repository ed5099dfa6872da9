//! Configuration management for DashLens.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.dashlens/config.yaml` or `DASHLENS_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric: contexts and index artifacts live
//! under `.dashlens/` unless a section points elsewhere.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".dashlens";

const RANKING_PROVIDERS: [&str; 2] = ["ollama", "openai"];
const EMBEDDING_PROVIDERS: [&str; 3] = ["mock", "ollama", "openai"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .dashlens/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Explicit API key, used for any provider that needs one
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Text or JSON log lines
    #[serde(default)]
    pub log_format: LogFormat,

    pub context: ContextSettings,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub ranking: ProviderSettings,
    pub refresh: RefreshSettings,
}

/// Context cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextSettings {
    /// Days after which a context is considered expired
    pub ttl_days: u32,

    /// Directory holding context records; relative paths resolve against the workspace
    pub dir: Option<PathBuf>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            dir: None,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexSettings {
    /// Base name of the persisted index artifacts
    pub name: String,

    /// Directory holding index artifacts; relative paths resolve against the workspace
    pub dir: Option<PathBuf>,

    /// Hours after which the index is rebuilt even if no context changed
    pub update_interval_hours: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "dashboard_index".to_string(),
            dir: None,
            update_interval_hours: 24,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name: "mock", "ollama" or "openai"
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
            api_key_env: None,
            timeout_secs: 30,
        }
    }
}

/// Language-model provider settings used for relevance ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Provider name: "ollama" or "openai"
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Total ranking calls per selection, including the first
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
            timeout_secs: 60,
            max_tokens: 1500,
            temperature: 0.3,
            max_attempts: 2,
            retry_backoff_ms: 1000,
        }
    }
}

/// Refresh pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshSettings {
    /// Dashboards summarized concurrently
    pub concurrency: usize,

    /// Upper bound on capture plus summarization for one dashboard
    pub dashboard_timeout_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            dashboard_timeout_secs: 180,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    context: Option<ContextSettings>,
    index: Option<IndexSettings>,
    embedding: Option<EmbeddingSettings>,
    ranking: Option<ProviderSettings>,
    refresh: Option<RefreshSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<LogFormat>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_format: LogFormat::default(),
            context: ContextSettings::default(),
            index: IndexSettings::default(),
            embedding: EmbeddingSettings::default(),
            ranking: ProviderSettings::default(),
            refresh: RefreshSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `DASHLENS_WORKSPACE`: Override workspace path
    /// - `DASHLENS_CONFIG`: Path to config file
    /// - `DASHLENS_TTL_DAYS`: Context time-to-live in days
    /// - `DASHLENS_RANKING_PROVIDER` / `DASHLENS_RANKING_MODEL`: Ranking model
    /// - `DASHLENS_EMBEDDING_PROVIDER`: Embedding provider
    /// - `DASHLENS_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `DASHLENS_LOG_FORMAT`: `text` or `json`
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use dashlens_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Contexts: {:?}", config.context_dir());
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_for(None, None)
    }

    /// Like [`AppConfig::load`], but an explicit workspace or config file
    /// (e.g. from CLI flags) wins over the environment, so the right YAML
    /// file is read.
    pub fn load_for(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace =
            workspace.or_else(|| std::env::var("DASHLENS_WORKSPACE").ok().map(PathBuf::from));
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        let config_file =
            config_file.or_else(|| std::env::var("DASHLENS_CONFIG").ok().map(PathBuf::from));
        if config_file.is_some() {
            config.config_file = config_file;
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.state_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(ttl) = std::env::var("DASHLENS_TTL_DAYS") {
            self.context.ttl_days = ttl.trim().parse().map_err(|_| {
                AppError::Config(format!("DASHLENS_TTL_DAYS is not a number: {}", ttl))
            })?;
        }

        if let Ok(provider) = std::env::var("DASHLENS_RANKING_PROVIDER") {
            self.ranking.provider = provider;
        }

        if let Ok(model) = std::env::var("DASHLENS_RANKING_MODEL") {
            self.ranking.model = model;
        }

        if let Ok(provider) = std::env::var("DASHLENS_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(key) = std::env::var("DASHLENS_API_KEY") {
            self.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        if let Ok(format) = std::env::var("DASHLENS_LOG_FORMAT") {
            self.log_format = format.parse().map_err(AppError::Config)?;
        }

        Ok(())
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file = Self::parse_yaml(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.merge(config_file))
    }

    fn parse_yaml(contents: &str) -> AppResult<ConfigFile> {
        if contents.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    fn merge(&self, config_file: ConfigFile) -> Self {
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = format;
            }
        }

        if let Some(context) = config_file.context {
            result.context = context;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(ranking) = config_file.ranking {
            result.ranking = ranking;
        }
        if let Some(refresh) = config_file.refresh {
            result.refresh = refresh;
        }

        result
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the environment and config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        ttl_days: Option<u32>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.ranking.provider = provider;
        }

        if let Some(model) = model {
            self.ranking.model = model;
        }

        if let Some(ttl_days) = ttl_days {
            self.context.ttl_days = ttl_days;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .dashlens directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .dashlens directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Directory holding context records.
    pub fn context_dir(&self) -> PathBuf {
        self.resolve_dir(self.context.dir.as_deref(), "contexts")
    }

    /// Directory holding vector index artifacts.
    pub fn index_dir(&self) -> PathBuf {
        self.resolve_dir(self.index.dir.as_deref(), "index")
    }

    fn resolve_dir(&self, configured: Option<&Path>, default_name: &str) -> PathBuf {
        match configured {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.workspace.join(dir),
            None => self.state_dir().join(default_name),
        }
    }

    /// Resolve an API key: the explicit key first, then the named environment variable.
    pub fn resolve_api_key(&self, api_key_env: Option<&str>) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        api_key_env.and_then(|var| std::env::var(var).ok())
    }

    /// Validate provider names and numeric bounds.
    pub fn validate(&self) -> AppResult<()> {
        if !RANKING_PROVIDERS.contains(&self.ranking.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown ranking provider: {}. Supported: {}",
                self.ranking.provider,
                RANKING_PROVIDERS.join(", ")
            )));
        }

        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.ranking.provider == "openai"
            && self
                .resolve_api_key(self.ranking.api_key_env.as_deref())
                .is_none()
        {
            return Err(AppError::Config(format!(
                "API key not found for ranking provider 'openai' (set DASHLENS_API_KEY or {})",
                self.ranking.api_key_env.as_deref().unwrap_or("ranking.apiKeyEnv")
            )));
        }

        let positive = [
            ("context.ttlDays", u64::from(self.context.ttl_days)),
            ("index.updateIntervalHours", self.index.update_interval_hours),
            ("embedding.dimensions", self.embedding.dimensions as u64),
            ("embedding.timeoutSecs", self.embedding.timeout_secs),
            ("ranking.timeoutSecs", self.ranking.timeout_secs),
            ("ranking.maxAttempts", u64::from(self.ranking.max_attempts)),
            ("refresh.concurrency", self.refresh.concurrency as u64),
            (
                "refresh.dashboardTimeoutSecs",
                self.refresh.dashboard_timeout_secs,
            ),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("{} must be greater than 0", name)));
        }

        if self.index.name.trim().is_empty() {
            return Err(AppError::Config("index.name must not be empty".to_string()));
        }

        Ok(())
    }
}
