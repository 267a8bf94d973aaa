pub mod analysis;
pub mod benchmark;
pub mod capture;
pub mod display;
pub mod imaging;
pub mod pipeline;
pub mod storage;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use pipeline::{Pipeline, PipelineError, PipelineEvent, PipelineState, StatsSnapshot};

/// Default vision model used for analysis requests
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";

/// Instruction sent alongside every frame
pub const ANALYSIS_PROMPT: &str = "Analyze this screenshot. Report observations:

SCREEN ELEMENTS: Identify windows, applications, UI components, text fields, buttons, menus, cursors, highlighting.
ACTIONS: Document any visible interactions - mouse position, selections, active elements.
CONTENT: Capture all visible TEXT strictly from the screen.

Be precise. Use technical terminology. Report only what is visible.";

/// Free vision-capable models compared by default
pub const BENCHMARK_MODELS: &[&str] = &[
    "meta-llama/llama-4-maverick:free",
    "mistralai/mistral-small-3.1-24b-instruct:free",
    "meta-llama/llama-4-scout:free",
    "moonshotai/kimi-vl-a3b-thinking:free",
    "google/gemma-3-27b-it:free",
    "qwen/qwen2.5-vl-72b-instruct:free",
    "mistralai/mistral-small-3.2-24b-instruct:free",
    DEFAULT_MODEL,
    "qwen/qwen2.5-vl-32b-instruct:free",
    "x-ai/grok-4-fast:free",
    "google/gemma-3-4b-it:free",
    "google/gemma-3-12b-it:free",
];

/// Prefix for environment overrides, e.g. `SCREENWATCH_CAPTURE__CADENCE_MS=2000`
pub const ENV_PREFIX: &str = "SCREENWATCH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("environment variable {0} is not set")]
    MissingCredential(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub benchmark: BenchmarkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Target interval between capture attempts
    pub cadence_ms: u64,
    /// Bounding box frames are scaled to fit before persisting and analysis
    pub target_width: u32,
    pub target_height: u32,
    /// Still image to replay instead of grabbing the screen
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub model: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How often the producer re-checks its schedule and the stop signal
    pub producer_poll_ms: u64,
    pub consumer_poll_ms: u64,
    pub aggregator_poll_ms: u64,
    /// Per-worker join window before a worker is aborted
    pub shutdown_timeout_ms: u64,
    pub recent_events: usize,
}

/// Model comparison run by the `benchmark` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Model ids, tried in order against the same frame
    pub models: Vec<String>,
    /// Gap between consecutive requests, keeps free-tier rate limits happy
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                cadence_ms: 5_000,
                target_width: 1536,
                target_height: 864,
                image_path: None,
            },
            analysis: AnalysisConfig {
                model: DEFAULT_MODEL.into(),
                endpoint: "https://openrouter.ai/api/v1/chat/completions".into(),
                api_key_env: "OPENROUTER_API_KEY".into(),
                timeout_secs: 60,
                max_tokens: 1000,
                prompt: ANALYSIS_PROMPT.into(),
            },
            pipeline: PipelineConfig {
                producer_poll_ms: 100,
                consumer_poll_ms: 1_000,
                aggregator_poll_ms: 500,
                shutdown_timeout_ms: 2_000,
                recent_events: 10,
            },
            storage: StorageConfig {
                output_dir: PathBuf::from("screenshots"),
            },
            benchmark: BenchmarkConfig {
                models: BENCHMARK_MODELS.iter().map(|id| id.to_string()).collect(),
                pause_ms: 1_000,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `SCREENWATCH_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.cadence_ms == 0 {
            return Err(ConfigError::Invalid("capture.cadence_ms must be > 0".into()));
        }
        if self.capture.target_width == 0 || self.capture.target_height == 0 {
            return Err(ConfigError::Invalid(
                "capture target box must be non-empty".into(),
            ));
        }
        if self.pipeline.producer_poll_ms == 0
            || self.pipeline.consumer_poll_ms == 0
            || self.pipeline.aggregator_poll_ms == 0
        {
            return Err(ConfigError::Invalid("poll intervals must be > 0".into()));
        }
        Ok(())
    }
}

impl BenchmarkConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl CaptureConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the process environment
    pub fn api_key(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential(self.api_key_env.clone())),
        }
    }
}

impl PipelineConfig {
    pub fn producer_poll(&self) -> Duration {
        Duration::from_millis(self.producer_poll_ms)
    }

    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_ms)
    }

    pub fn aggregator_poll(&self) -> Duration {
        Duration::from_millis(self.aggregator_poll_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = Config::default();
        assert_eq!(config.capture.cadence(), Duration::from_secs(5));
        assert_eq!(config.analysis.model, DEFAULT_MODEL);
        assert_eq!(config.analysis.timeout(), Duration::from_secs(60));
        assert_eq!(config.pipeline.shutdown_timeout(), Duration::from_secs(2));
        assert_eq!(config.pipeline.recent_events, 10);
        assert_eq!(config.storage.output_dir, PathBuf::from("screenshots"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_merges_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenwatch.toml");
        std::fs::write(
            &path,
            "[capture]\ncadence_ms = 2000\n\n[analysis]\nmodel = \"qwen/qwen2.5-vl-72b-instruct:free\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.capture.cadence_ms, 2000);
        assert_eq!(config.capture.target_width, 1536);
        assert_eq!(config.analysis.model, "qwen/qwen2.5-vl-72b-instruct:free");
        assert_eq!(config.analysis.max_tokens, 1000);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenwatch.toml");
        std::fs::write(&path, "[pipeline]\nshutdown_timeout_ms = 4000\n").unwrap();

        // Keys no other test loads, the environment is shared process-wide
        std::env::set_var("SCREENWATCH_PIPELINE__SHUTDOWN_TIMEOUT_MS", "3000");
        std::env::set_var("SCREENWATCH_STORAGE__OUTPUT_DIR", "/tmp/screenwatch-frames");
        let loaded = Config::load(Some(&path));
        std::env::remove_var("SCREENWATCH_PIPELINE__SHUTDOWN_TIMEOUT_MS");
        std::env::remove_var("SCREENWATCH_STORAGE__OUTPUT_DIR");

        let config = loaded.unwrap();
        assert_eq!(config.pipeline.shutdown_timeout(), Duration::from_secs(3));
        assert_eq!(
            config.storage.output_dir,
            PathBuf::from("/tmp/screenwatch-frames")
        );
    }

    #[test]
    fn test_zero_cadence_is_rejected() {
        let mut config = Config::default();
        config.capture.cadence_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_credential() {
        let mut config = Config::default();
        config.analysis.api_key_env = "SCREENWATCH_TEST_KEY_THAT_IS_NEVER_SET".into();
        match config.analysis.api_key() {
            Err(ConfigError::MissingCredential(name)) => {
                assert_eq!(name, "SCREENWATCH_TEST_KEY_THAT_IS_NEVER_SET")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
