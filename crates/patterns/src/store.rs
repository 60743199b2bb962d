//! Pattern store
//!
//! Learned patterns live in an append-only event log plus a derived active
//! set, so accuracy auditing and rollback never mutate history. Counter
//! updates are row-level (per-pattern entry locks); creation is serialized
//! per (vendor key, tax type) and a concurrent duplicate resolves by
//! reinforcing the existing pattern rather than creating a near-identical
//! twin.
//!
//! The in-memory implementation is the reference store and the test
//! fixture; a database-backed store implements the same trait with its
//! uniqueness constraints and row-level increments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taxlens_config::constants::learning;
use taxlens_core::TaxType;

use crate::types::{LearnedPattern, RefundBasisPattern, VendorPattern};
use crate::PatternError;

/// Append-only audit record for the learned-pattern log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PatternEvent {
    Created {
        pattern: LearnedPattern,
        at: DateTime<Utc>,
    },
    /// A concurrent or repeat correction matched an existing pattern
    Reinforced {
        pattern_id: Uuid,
        source_review_ids: Vec<Uuid>,
        at: DateTime<Utc>,
    },
    Validated {
        pattern_id: Uuid,
        /// False when validated by accumulated accuracy
        manual: bool,
        at: DateTime<Utc>,
    },
    Deactivated {
        pattern_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
}

/// Result of recording a confirmation against a pattern
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationOutcome {
    pub times_applied: u64,
    pub times_confirmed: u64,
    /// None until the pattern has been applied at least once
    pub accuracy: Option<f64>,
    /// True when this confirmation crossed the retirement threshold
    pub deactivated: bool,
    /// True when this confirmation crossed the auto-validation threshold
    pub auto_validated: bool,
}

/// Storage for all three pattern kinds
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn upsert_vendor_pattern(&self, pattern: VendorPattern) -> Result<(), PatternError>;
    async fn get_vendor_pattern(
        &self,
        vendor: &str,
        tax_type: TaxType,
    ) -> Result<Option<VendorPattern>, PatternError>;
    /// Incrementally fold one reviewed outcome into the vendor aggregate
    async fn reinforce_vendor_pattern(
        &self,
        vendor: &str,
        tax_type: TaxType,
        approved: bool,
        refund_basis: Option<&str>,
        category: Option<&str>,
        keywords: &[String],
    ) -> Result<(), PatternError>;

    async fn upsert_basis_pattern(&self, pattern: RefundBasisPattern) -> Result<(), PatternError>;
    async fn list_basis_patterns(
        &self,
        tax_type: TaxType,
    ) -> Result<Vec<RefundBasisPattern>, PatternError>;

    /// Create a learned pattern, or reinforce an equivalent existing one.
    /// Returns the id of the pattern that now carries the correction.
    async fn create_learned_pattern(&self, pattern: LearnedPattern) -> Result<Uuid, PatternError>;
    async fn get_learned_pattern(&self, id: Uuid) -> Result<Option<LearnedPattern>, PatternError>;
    /// Active, validated patterns for one tax type
    async fn list_applicable(&self, tax_type: TaxType) -> Result<Vec<LearnedPattern>, PatternError>;
    /// All learned patterns for one tax type, including retired ones
    async fn list_learned(&self, tax_type: TaxType) -> Result<Vec<LearnedPattern>, PatternError>;

    /// Commit application counters; called only after a calibration result
    /// exists for the transaction
    async fn record_applications(&self, ids: &[Uuid]) -> Result<(), PatternError>;
    /// Fold one review outcome into a pattern's applied/confirmed counters
    async fn record_confirmation(
        &self,
        id: Uuid,
        correct: bool,
    ) -> Result<ConfirmationOutcome, PatternError>;

    async fn validate_pattern(&self, id: Uuid) -> Result<(), PatternError>;
    async fn deactivate_pattern(&self, id: Uuid, reason: &str) -> Result<(), PatternError>;

    /// Snapshot of the append-only event log
    async fn events(&self) -> Result<Vec<PatternEvent>, PatternError>;
}

/// In-memory pattern store
#[derive(Default)]
pub struct InMemoryPatternStore {
    vendors: DashMap<(String, TaxType), VendorPattern>,
    bases: DashMap<(String, TaxType), RefundBasisPattern>,
    learned: DashMap<Uuid, LearnedPattern>,
    log: Mutex<Vec<PatternEvent>>,
    /// Serializes learned-pattern creation per (vendor key, tax type)
    creation_locks: DashMap<(String, TaxType), ()>,
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_event(&self, event: PatternEvent) {
        self.log.lock().push(event);
    }

    /// Key under which creation of this pattern is serialized
    fn creation_key(pattern: &LearnedPattern) -> (String, TaxType) {
        let vendor = pattern
            .trigger
            .vendor
            .clone()
            .or_else(|| pattern.trigger.category.clone())
            .unwrap_or_else(|| pattern.trigger.keywords.join("+"));
        (vendor, pattern.trigger.tax_type)
    }

    /// Two patterns are equivalent when their type, trigger, and forced
    /// determination coincide. Same trigger with a different forced
    /// determination is a distinct pattern; the calibrator surfaces the
    /// disagreement as a conflict.
    fn equivalent(a: &LearnedPattern, b: &LearnedPattern) -> bool {
        a.pattern_type == b.pattern_type
            && a.forced_determination == b.forced_determination
            && a.trigger.tax_type == b.trigger.tax_type
            && a.trigger.vendor == b.trigger.vendor
            && a.trigger.category == b.trigger.category
            && a.trigger.anomaly_code == b.trigger.anomaly_code
            && {
                let mut ka = a.trigger.keywords.clone();
                let mut kb = b.trigger.keywords.clone();
                ka.sort();
                kb.sort();
                ka == kb
            }
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn upsert_vendor_pattern(&self, pattern: VendorPattern) -> Result<(), PatternError> {
        if pattern.sample_count == 0 {
            return Err(PatternError::Invalid("sample_count must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&pattern.success_rate) {
            return Err(PatternError::Invalid("success_rate must be in [0, 1]".into()));
        }
        self.vendors
            .insert((pattern.vendor.clone(), pattern.tax_type), pattern);
        Ok(())
    }

    async fn get_vendor_pattern(
        &self,
        vendor: &str,
        tax_type: TaxType,
    ) -> Result<Option<VendorPattern>, PatternError> {
        Ok(self
            .vendors
            .get(&(vendor.to_string(), tax_type))
            .map(|entry| entry.clone()))
    }

    async fn reinforce_vendor_pattern(
        &self,
        vendor: &str,
        tax_type: TaxType,
        approved: bool,
        refund_basis: Option<&str>,
        category: Option<&str>,
        keywords: &[String],
    ) -> Result<(), PatternError> {
        let key = (vendor.to_string(), tax_type);
        let mut entry = self.vendors.entry(key).or_insert_with(|| VendorPattern {
            vendor: vendor.to_string(),
            tax_type,
            sample_count: 0,
            success_rate: 0.0,
            typical_refund_basis: None,
            common_categories: Default::default(),
            common_keywords: Default::default(),
            product_type: None,
            updated_at: Utc::now(),
        });

        // Running-mean update keeps the rate exact without storing samples
        let successes = entry.success_rate * entry.sample_count as f64;
        entry.sample_count += 1;
        entry.success_rate =
            (successes + if approved { 1.0 } else { 0.0 }) / entry.sample_count as f64;

        if let Some(basis) = refund_basis {
            entry.typical_refund_basis = Some(basis.to_string());
        }
        if let Some(category) = category {
            entry.common_categories.insert(category.to_lowercase());
        }
        for keyword in keywords {
            entry.common_keywords.insert(keyword.clone());
        }
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_basis_pattern(&self, pattern: RefundBasisPattern) -> Result<(), PatternError> {
        if pattern.usage_count == 0 {
            return Err(PatternError::Invalid("usage_count must be at least 1".into()));
        }
        self.bases
            .insert((pattern.basis.clone(), pattern.tax_type), pattern);
        Ok(())
    }

    async fn list_basis_patterns(
        &self,
        tax_type: TaxType,
    ) -> Result<Vec<RefundBasisPattern>, PatternError> {
        Ok(self
            .bases
            .iter()
            .filter(|entry| entry.tax_type == tax_type)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn create_learned_pattern(&self, pattern: LearnedPattern) -> Result<Uuid, PatternError> {
        if !(-100..=100).contains(&pattern.confidence_adjustment) {
            return Err(PatternError::Invalid(
                "confidence_adjustment must be in [-100, 100]".into(),
            ));
        }

        let key = Self::creation_key(&pattern);
        // Entry guard serializes same-key creation; concurrent corrections
        // for the same vendor cannot both pass the duplicate check
        let _guard = self.creation_locks.entry(key).or_insert(());

        // The iterator's shard read guard must drop before get_mut asks for
        // a write lock on the same shard
        let existing = self
            .learned
            .iter()
            .find(|entry| entry.active && Self::equivalent(&pattern, entry.value()))
            .map(|entry| entry.id);

        if let Some(existing) = existing {
            // Conflict resolved by reinforcement, not duplication
            let mut entry = self
                .learned
                .get_mut(&existing)
                .ok_or_else(|| PatternError::Conflict("pattern vanished during reinforce".into()))?;
            entry.learned_from_count += 1;
            entry
                .source_review_ids
                .extend(pattern.source_review_ids.iter().copied());
            drop(entry);

            tracing::debug!(pattern_id = %existing, "equivalent pattern reinforced");
            self.append_event(PatternEvent::Reinforced {
                pattern_id: existing,
                source_review_ids: pattern.source_review_ids,
                at: Utc::now(),
            });
            return Ok(existing);
        }

        let id = pattern.id;
        self.append_event(PatternEvent::Created {
            pattern: pattern.clone(),
            at: Utc::now(),
        });
        self.learned.insert(id, pattern);
        tracing::info!(pattern_id = %id, "learned pattern created (unvalidated)");
        Ok(id)
    }

    async fn get_learned_pattern(&self, id: Uuid) -> Result<Option<LearnedPattern>, PatternError> {
        Ok(self.learned.get(&id).map(|entry| entry.clone()))
    }

    async fn list_applicable(&self, tax_type: TaxType) -> Result<Vec<LearnedPattern>, PatternError> {
        Ok(self
            .learned
            .iter()
            .filter(|entry| entry.applicable() && entry.trigger.tax_type == tax_type)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn list_learned(&self, tax_type: TaxType) -> Result<Vec<LearnedPattern>, PatternError> {
        Ok(self
            .learned
            .iter()
            .filter(|entry| entry.trigger.tax_type == tax_type)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn record_applications(&self, ids: &[Uuid]) -> Result<(), PatternError> {
        for id in ids {
            // Per-pattern entry lock keeps the increment row-level
            if let Some(mut entry) = self.learned.get_mut(id) {
                entry.times_applied += 1;
            } else {
                return Err(PatternError::NotFound(format!("learned pattern {id}")));
            }
        }
        Ok(())
    }

    async fn record_confirmation(
        &self,
        id: Uuid,
        correct: bool,
    ) -> Result<ConfirmationOutcome, PatternError> {
        let mut entry = self
            .learned
            .get_mut(&id)
            .ok_or_else(|| PatternError::NotFound(format!("learned pattern {id}")))?;

        if correct {
            entry.times_confirmed += 1;
        }

        let accuracy = entry.accuracy();
        let mut deactivated = false;
        let mut auto_validated = false;

        if let Some(acc) = accuracy {
            // Retirement check first: a pattern can cross both thresholds on
            // the same confirmation, and retirement wins
            if entry.active
                && entry.times_applied >= learning::RETIREMENT_MIN_APPLICATIONS
                && acc < learning::RETIREMENT_ACCURACY
            {
                entry.active = false;
                deactivated = true;
            } else if !entry.validated
                && entry.times_applied >= learning::AUTO_VALIDATE_MIN_APPLICATIONS
                && acc >= learning::AUTO_VALIDATE_ACCURACY
            {
                entry.validated = true;
                auto_validated = true;
            }
        }

        let outcome = ConfirmationOutcome {
            times_applied: entry.times_applied,
            times_confirmed: entry.times_confirmed,
            accuracy,
            deactivated,
            auto_validated,
        };
        drop(entry);

        if deactivated {
            tracing::warn!(pattern_id = %id, accuracy = ?accuracy, "pattern auto-deactivated");
            self.append_event(PatternEvent::Deactivated {
                pattern_id: id,
                reason: format!("accuracy {:.2} below retirement threshold", accuracy.unwrap_or(0.0)),
                at: Utc::now(),
            });
        }
        if auto_validated {
            tracing::info!(pattern_id = %id, "pattern auto-validated by accumulated accuracy");
            self.append_event(PatternEvent::Validated {
                pattern_id: id,
                manual: false,
                at: Utc::now(),
            });
        }

        Ok(outcome)
    }

    async fn validate_pattern(&self, id: Uuid) -> Result<(), PatternError> {
        let mut entry = self
            .learned
            .get_mut(&id)
            .ok_or_else(|| PatternError::NotFound(format!("learned pattern {id}")))?;
        entry.validated = true;
        drop(entry);

        self.append_event(PatternEvent::Validated {
            pattern_id: id,
            manual: true,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn deactivate_pattern(&self, id: Uuid, reason: &str) -> Result<(), PatternError> {
        let mut entry = self
            .learned
            .get_mut(&id)
            .ok_or_else(|| PatternError::NotFound(format!("learned pattern {id}")))?;
        entry.active = false;
        drop(entry);

        self.append_event(PatternEvent::Deactivated {
            pattern_id: id,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn events(&self) -> Result<Vec<PatternEvent>, PatternError> {
        Ok(self.log.lock().clone())
    }
}
