//! Centralized constants
//!
//! Single source of truth for tunables used across the workspace. Settings
//! defaults and component configs all read from here so a threshold is
//! never duplicated in two files.

/// Retrieval tunables
pub mod retrieval {
    /// Candidates taken from the dense (embedding) search
    pub const K_SEMANTIC: usize = 20;

    /// Candidates taken from the lexical (BM25) search
    pub const K_LEXICAL: usize = 20;

    /// Final result cap after fusion
    pub const FINAL_LIMIT: usize = 10;

    /// Minimum cosine similarity for a dense candidate
    pub const SIMILARITY_FLOOR: f32 = 0.5;

    /// Reciprocal-rank-fusion dampening constant
    pub const RRF_C: f32 = 60.0;

    /// Tantivy writer heap
    pub const LEXICAL_WRITER_HEAP_BYTES: usize = 50_000_000;
}

/// Calibration and routing thresholds
pub mod routing {
    /// Confidence at or above which a transaction auto-approves
    pub const AUTO_APPROVE_CONFIDENCE: u32 = 90;

    /// Fraction of auto-approvals pulled into the QA audit sample
    pub const AUDIT_SAMPLE_RATE: f64 = 0.10;

    /// Tax amount above which low confidence means the critical queue (cents)
    pub const CRITICAL_AMOUNT_CENTS: i64 = 1_000_000; // $10,000

    /// Confidence below which a critical-amount transaction is critical
    pub const CRITICAL_CONFIDENCE: u32 = 50;

    /// Tax amount above which mid confidence means the high-priority queue (cents)
    pub const HIGH_AMOUNT_CENTS: i64 = 500_000; // $5,000

    /// Confidence below which a high-amount transaction is high priority
    pub const HIGH_CONFIDENCE: u32 = 70;

    /// Transactions under this amount sink within the standard queue (cents)
    pub const SMALL_DOLLAR_CENTS: i64 = 100_000; // $1,000
}

/// Feedback learning tunables
pub mod learning {
    /// Applications below this AI confidence earn the largest adjustment
    pub const LOW_CONFIDENCE_BAND: u32 = 50;

    /// Upper bound of the middle confidence band
    pub const MID_CONFIDENCE_BAND: u32 = 70;

    /// Adjustment per band: AI confidence < 50
    pub const ADJUSTMENT_LOW_BAND: i32 = 30;

    /// Adjustment per band: 50..=70
    pub const ADJUSTMENT_MID_BAND: i32 = 20;

    /// Adjustment per band: > 70
    pub const ADJUSTMENT_HIGH_BAND: i32 = 10;

    /// Applications needed before accuracy-based retirement can trigger
    pub const RETIREMENT_MIN_APPLICATIONS: u64 = 10;

    /// Accuracy below which a pattern with enough applications retires
    pub const RETIREMENT_ACCURACY: f64 = 0.3;

    /// Applications needed for automatic validation
    pub const AUTO_VALIDATE_MIN_APPLICATIONS: u64 = 5;

    /// Accuracy needed for automatic validation
    pub const AUTO_VALIDATE_ACCURACY: f64 = 0.8;

    /// Weighted-similarity threshold for propagation candidates
    pub const PROPAGATION_THRESHOLD: f64 = 0.7;

    /// Similarity weights per matching criterion
    pub const WEIGHT_VENDOR: f64 = 1.0;
    pub const WEIGHT_CATEGORY: f64 = 0.8;
    pub const WEIGHT_KEYWORDS: f64 = 0.7;
    pub const WEIGHT_TAX_TYPE: f64 = 0.6;
    pub const WEIGHT_AMOUNT_BUCKET: f64 = 0.5;

    /// Minimum token overlap for the refund-basis fallback match
    pub const BASIS_MIN_OVERLAP: usize = 2;

    /// Keywords kept per transaction description
    pub const MAX_KEYWORDS: usize = 8;
}

/// Timeouts and retry policy
pub mod timeouts {
    /// Embedding call timeout (seconds)
    pub const EMBEDDING_SECS: u64 = 30;

    /// Inference call timeout (seconds)
    pub const INFERENCE_SECS: u64 = 60;

    /// Bounded local retries for transient I/O failures
    pub const MAX_RETRIES: u32 = 2;

    /// Initial retry backoff (milliseconds, doubles per attempt)
    pub const INITIAL_BACKOFF_MS: u64 = 100;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Embedding service endpoint
    pub const EMBEDDINGS_DEFAULT: &str = "http://localhost:11434";

    /// Inference service endpoint
    pub const INFERENCE_DEFAULT: &str = "http://localhost:8088";
}

/// Anomaly detector thresholds
pub mod anomalies {
    /// Tax/invoice ratio bounds considered plausible
    pub const MIN_TAX_RATIO: f64 = 0.005;
    pub const MAX_TAX_RATIO: f64 = 0.15;

    /// Round-amount granularity (cents): exact multiples of $100 flag
    pub const ROUND_AMOUNT_CENTS: i64 = 10_000;
}
