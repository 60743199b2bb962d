//! Routing
//!
//! Maps a calibrated result onto exactly one destination. The decision is
//! total over (confidence, tax amount): the arms below cover every
//! combination, and degraded or conflicted results short-circuit to the
//! critical queue regardless of amount.

use taxlens_config::constants::routing as defaults;
use taxlens_core::{ReviewQueue, RoutingDecision};

/// Routing thresholds
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub auto_approve_confidence: u32,
    pub critical_amount_cents: i64,
    pub critical_confidence: u32,
    pub high_amount_cents: i64,
    pub high_confidence: u32,
    pub small_dollar_cents: i64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            auto_approve_confidence: defaults::AUTO_APPROVE_CONFIDENCE,
            critical_amount_cents: defaults::CRITICAL_AMOUNT_CENTS,
            critical_confidence: defaults::CRITICAL_CONFIDENCE,
            high_amount_cents: defaults::HIGH_AMOUNT_CENTS,
            high_confidence: defaults::HIGH_CONFIDENCE,
            small_dollar_cents: defaults::SMALL_DOLLAR_CENTS,
        }
    }
}

impl From<&taxlens_config::RoutingSettings> for RoutingConfig {
    fn from(settings: &taxlens_config::RoutingSettings) -> Self {
        Self {
            auto_approve_confidence: settings.auto_approve_confidence,
            critical_amount_cents: settings.critical_amount_cents,
            critical_confidence: settings.critical_confidence,
            high_amount_cents: settings.high_amount_cents,
            high_confidence: settings.high_confidence,
            small_dollar_cents: settings.small_dollar_cents,
        }
    }
}

/// Decides which auto-approvals land in the QA audit sample
///
/// A trait so tests can pin the outcome; production uses the random
/// sampler at the configured rate.
pub trait AuditSampler: Send + Sync {
    fn sample(&self) -> bool;
}

/// Random sampler at a fixed rate
pub struct RandomAuditSampler {
    rate: f64,
}

impl RandomAuditSampler {
    pub fn new(rate: f64) -> Self {
        Self { rate: rate.clamp(0.0, 1.0) }
    }
}

impl Default for RandomAuditSampler {
    fn default() -> Self {
        Self::new(defaults::AUDIT_SAMPLE_RATE)
    }
}

impl AuditSampler for RandomAuditSampler {
    fn sample(&self) -> bool {
        rand::random::<f64>() < self.rate
    }
}

/// Deterministic sampler for tests
pub struct FixedAuditSampler(pub bool);

impl AuditSampler for FixedAuditSampler {
    fn sample(&self) -> bool {
        self.0
    }
}

/// Route a calibrated result
///
/// `force_critical` is set for degraded results (collaborator failure,
/// conflicting overrides); it bypasses auto-approval entirely.
pub fn route(
    config: &RoutingConfig,
    final_confidence: u32,
    tax_amount_cents: i64,
    force_critical: bool,
    sampler: &dyn AuditSampler,
) -> RoutingDecision {
    if force_critical {
        return RoutingDecision::Review {
            queue: ReviewQueue::Critical,
            deprioritized: false,
        };
    }

    if final_confidence >= config.auto_approve_confidence {
        return RoutingDecision::AutoApprove {
            audit_sample: sampler.sample(),
        };
    }

    if tax_amount_cents > config.critical_amount_cents
        && final_confidence < config.critical_confidence
    {
        return RoutingDecision::Review {
            queue: ReviewQueue::Critical,
            deprioritized: false,
        };
    }

    if tax_amount_cents > config.high_amount_cents && final_confidence < config.high_confidence {
        return RoutingDecision::Review {
            queue: ReviewQueue::High,
            deprioritized: false,
        };
    }

    RoutingDecision::Review {
        queue: ReviewQueue::Standard,
        deprioritized: tax_amount_cents < config.small_dollar_cents,
    }
}
