//! Per-transaction analysis pipeline
//!
//! Orchestrates one transaction end to end:
//! 1. Rule-based anomaly detection
//! 2. Hybrid context retrieval and pattern matching (concurrently)
//! 3. Base determination from the inference collaborator
//! 4. Confidence calibration (anomaly penalties, pattern adjustments,
//!    forced-override resolution)
//! 5. Routing to auto-approval or a review queue
//! 6. Persistence, queue push, and exactly one output row
//!
//! Failures degrade, never crash: a transaction whose collaborators are
//! down still produces a needs-review result in the critical queue.

pub mod anomaly;
pub mod calibrate;
pub mod memory;
pub mod pipeline;
pub mod routing;

pub use anomaly::AnomalyDetector;
pub use calibrate::{calibrate, Calibration};
pub use memory::{InMemoryAnalysisStore, InMemoryOutputSink, InMemoryReviewQueues};
pub use pipeline::{Analyzer, ContextRetriever};
pub use routing::{route, AuditSampler, FixedAuditSampler, RandomAuditSampler, RoutingConfig};
