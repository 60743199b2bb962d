//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, learning, retrieval, routing, timeouts};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Hybrid retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Inference collaborator configuration
    #[serde(default)]
    pub inference: InferenceSettings,

    /// Calibration and routing configuration
    #[serde(default)]
    pub routing: RoutingSettings,

    /// Feedback learning configuration
    #[serde(default)]
    pub learning: LearningSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Embedding service endpoint
    #[serde(default = "default_embeddings_endpoint")]
    pub embeddings_endpoint: String,
    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_k_semantic")]
    pub k_semantic: usize,
    #[serde(default = "default_k_lexical")]
    pub k_lexical: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Minimum cosine similarity for dense candidates
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f32,
    /// RRF dampening constant
    #[serde(default = "default_rrf_c")]
    pub rrf_c: f32,
    /// On-disk lexical index path (in-RAM when unset)
    #[serde(default)]
    pub lexical_index_path: Option<String>,
    /// Embedding call timeout (seconds)
    #[serde(default = "default_embedding_timeout")]
    pub embedding_timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            embeddings_endpoint: default_embeddings_endpoint(),
            embedding_model: default_embedding_model(),
            k_semantic: default_k_semantic(),
            k_lexical: default_k_lexical(),
            final_limit: default_final_limit(),
            similarity_floor: default_similarity_floor(),
            rrf_c: default_rrf_c(),
            lexical_index_path: None,
            embedding_timeout_secs: default_embedding_timeout(),
        }
    }
}

/// Inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_inference_model")]
    pub model: String,
    /// API key, usually injected via TAXLENS__INFERENCE__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
    /// Inference calls are not idempotent; keep this at most 2
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            model: default_inference_model(),
            api_key: None,
            timeout_secs: default_inference_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Calibration and routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    #[serde(default = "default_auto_approve_confidence")]
    pub auto_approve_confidence: u32,
    #[serde(default = "default_audit_sample_rate")]
    pub audit_sample_rate: f64,
    #[serde(default = "default_critical_amount")]
    pub critical_amount_cents: i64,
    #[serde(default = "default_critical_confidence")]
    pub critical_confidence: u32,
    #[serde(default = "default_high_amount")]
    pub high_amount_cents: i64,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: u32,
    #[serde(default = "default_small_dollar")]
    pub small_dollar_cents: i64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            auto_approve_confidence: default_auto_approve_confidence(),
            audit_sample_rate: default_audit_sample_rate(),
            critical_amount_cents: default_critical_amount(),
            critical_confidence: default_critical_confidence(),
            high_amount_cents: default_high_amount(),
            high_confidence: default_high_confidence(),
            small_dollar_cents: default_small_dollar(),
        }
    }
}

/// Feedback learning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSettings {
    /// Propagate new patterns to similar unreviewed transactions
    /// (analyst-opt-in; this is the global enable)
    #[serde(default)]
    pub propagation_enabled: bool,
    #[serde(default = "default_propagation_threshold")]
    pub propagation_threshold: f64,
    #[serde(default = "default_retirement_min_applications")]
    pub retirement_min_applications: u64,
    #[serde(default = "default_retirement_accuracy")]
    pub retirement_accuracy: f64,
    #[serde(default = "default_auto_validate_min_applications")]
    pub auto_validate_min_applications: u64,
    #[serde(default = "default_auto_validate_accuracy")]
    pub auto_validate_accuracy: f64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            propagation_enabled: false,
            propagation_threshold: default_propagation_threshold(),
            retirement_min_applications: default_retirement_min_applications(),
            retirement_accuracy: default_retirement_accuracy(),
            auto_validate_min_applications: default_auto_validate_min_applications(),
            auto_validate_accuracy: default_auto_validate_accuracy(),
        }
    }
}

/// Observability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Log level filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON logs (production) vs pretty text (development)
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_embeddings_endpoint() -> String {
    endpoints::EMBEDDINGS_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_k_semantic() -> usize {
    retrieval::K_SEMANTIC
}
fn default_k_lexical() -> usize {
    retrieval::K_LEXICAL
}
fn default_final_limit() -> usize {
    retrieval::FINAL_LIMIT
}
fn default_similarity_floor() -> f32 {
    retrieval::SIMILARITY_FLOOR
}
fn default_rrf_c() -> f32 {
    retrieval::RRF_C
}
fn default_embedding_timeout() -> u64 {
    timeouts::EMBEDDING_SECS
}
fn default_inference_endpoint() -> String {
    endpoints::INFERENCE_DEFAULT.to_string()
}
fn default_inference_model() -> String {
    "tax-determination-v2".to_string()
}
fn default_inference_timeout() -> u64 {
    timeouts::INFERENCE_SECS
}
fn default_max_retries() -> u32 {
    timeouts::MAX_RETRIES
}
fn default_auto_approve_confidence() -> u32 {
    routing::AUTO_APPROVE_CONFIDENCE
}
fn default_audit_sample_rate() -> f64 {
    routing::AUDIT_SAMPLE_RATE
}
fn default_critical_amount() -> i64 {
    routing::CRITICAL_AMOUNT_CENTS
}
fn default_critical_confidence() -> u32 {
    routing::CRITICAL_CONFIDENCE
}
fn default_high_amount() -> i64 {
    routing::HIGH_AMOUNT_CENTS
}
fn default_high_confidence() -> u32 {
    routing::HIGH_CONFIDENCE
}
fn default_small_dollar() -> i64 {
    routing::SMALL_DOLLAR_CENTS
}
fn default_propagation_threshold() -> f64 {
    learning::PROPAGATION_THRESHOLD
}
fn default_retirement_min_applications() -> u64 {
    learning::RETIREMENT_MIN_APPLICATIONS
}
fn default_retirement_accuracy() -> f64 {
    learning::RETIREMENT_ACCURACY
}
fn default_auto_validate_min_applications() -> u64 {
    learning::AUTO_VALIDATE_MIN_APPLICATIONS
}
fn default_auto_validate_accuracy() -> f64 {
    learning::AUTO_VALIDATE_ACCURACY
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    ///
    /// Development mode logs warnings for soft violations; staging and
    /// production reject them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_retrieval()?;
        self.validate_routing()?;
        self.validate_learning()?;
        self.validate_inference()?;
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.retrieval.similarity_floor) {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.similarity_floor".to_string(),
                message: format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.retrieval.similarity_floor
                ),
            });
        }
        if self.retrieval.rrf_c <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_c".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.retrieval.final_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.final_limit".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn validate_routing(&self) -> Result<(), ConfigError> {
        if self.routing.auto_approve_confidence > 100 {
            return Err(ConfigError::InvalidValue {
                field: "routing.auto_approve_confidence".to_string(),
                message: "confidence is a 0-100 scale".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.routing.audit_sample_rate) {
            return Err(ConfigError::InvalidValue {
                field: "routing.audit_sample_rate".to_string(),
                message: "must be a fraction in [0, 1]".to_string(),
            });
        }
        if self.routing.critical_amount_cents < self.routing.high_amount_cents {
            return Err(ConfigError::InvalidValue {
                field: "routing.critical_amount_cents".to_string(),
                message: "critical threshold must be at or above the high threshold".to_string(),
            });
        }
        Ok(())
    }

    fn validate_learning(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.learning.retirement_accuracy) {
            return Err(ConfigError::InvalidValue {
                field: "learning.retirement_accuracy".to_string(),
                message: "must be a fraction in [0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.learning.auto_validate_accuracy) {
            return Err(ConfigError::InvalidValue {
                field: "learning.auto_validate_accuracy".to_string(),
                message: "must be a fraction in [0, 1]".to_string(),
            });
        }
        Ok(())
    }

    fn validate_inference(&self) -> Result<(), ConfigError> {
        // Inference calls are not idempotent; the retry bound is a hard cap
        if self.inference.max_retries > 2 {
            return Err(ConfigError::InvalidValue {
                field: "inference.max_retries".to_string(),
                message: "inference calls must not be retried more than twice".to_string(),
            });
        }
        if self.environment.is_strict() && self.inference.api_key.is_none() {
            return Err(ConfigError::MissingField("inference.api_key".to_string()));
        }
        Ok(())
    }
}

/// Load settings from defaults, an optional file, and the environment
///
/// Precedence (lowest to highest): built-in defaults, `config/default.*`,
/// `config/{env}.*`, `TAXLENS__` environment variables.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("TAXLENS")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
