//! Rule-based anomaly detection
//!
//! Red flags computed from the transaction row alone, before any model is
//! consulted. Each anomaly carries a stable code so learned patterns can
//! trigger on it, and a severity whose penalty the calibrator subtracts.

use dashmap::DashMap;

use taxlens_config::constants::anomalies;
use taxlens_core::{Anomaly, AnomalySeverity, Transaction};

/// Stable anomaly codes
pub mod codes {
    pub const NEGATIVE_OR_ZERO_TAX: &str = "negative-or-zero-tax";
    pub const DUPLICATE_INVOICE: &str = "duplicate-invoice";
    pub const TAX_RATE_OUT_OF_RANGE: &str = "tax-rate-out-of-range";
    pub const MISSING_VENDOR: &str = "missing-vendor";
    pub const ROUND_AMOUNT: &str = "round-amount";
}

/// Fingerprint used for duplicate-invoice detection
type InvoiceKey = (String, i64, Option<chrono::NaiveDate>);

/// Stateful detector over one analysis run
///
/// Duplicate detection is scoped to the detector instance: the first
/// occurrence of an invoice fingerprint registers it, every later
/// occurrence flags. Create one detector per batch.
#[derive(Default)]
pub struct AnomalyDetector {
    seen_invoices: DashMap<InvoiceKey, String>,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect anomalies on one transaction
    pub fn detect(&self, transaction: &Transaction) -> Vec<Anomaly> {
        let mut found = Vec::new();

        if transaction.tax_amount_cents <= 0 {
            found.push(Anomaly::new(
                codes::NEGATIVE_OR_ZERO_TAX,
                AnomalySeverity::Critical,
                format!(
                    "tax amount is {} cents; refund analysis needs a positive tax paid",
                    transaction.tax_amount_cents
                ),
            ));
        }

        if let Some(first_id) = self.check_duplicate(transaction) {
            found.push(Anomaly::new(
                codes::DUPLICATE_INVOICE,
                AnomalySeverity::Critical,
                format!(
                    "same vendor, total, and date as transaction '{first_id}'; \
                     possible double entry"
                ),
            ));
        }

        if transaction.invoice_total_cents > 0 && transaction.tax_amount_cents > 0 {
            let ratio =
                transaction.tax_amount_cents as f64 / transaction.invoice_total_cents as f64;
            if !(anomalies::MIN_TAX_RATIO..=anomalies::MAX_TAX_RATIO).contains(&ratio) {
                found.push(Anomaly::new(
                    codes::TAX_RATE_OUT_OF_RANGE,
                    AnomalySeverity::High,
                    format!(
                        "effective tax rate {:.2}% outside the plausible {:.1}%-{:.1}% band",
                        ratio * 100.0,
                        anomalies::MIN_TAX_RATIO * 100.0,
                        anomalies::MAX_TAX_RATIO * 100.0
                    ),
                ));
            }
        }

        if transaction.normalized_vendor().is_empty() {
            found.push(Anomaly::new(
                codes::MISSING_VENDOR,
                AnomalySeverity::High,
                "vendor name is blank; pattern lookup and exemption checks are impossible",
            ));
        }

        if transaction.tax_amount_cents > 0
            && transaction.tax_amount_cents % anomalies::ROUND_AMOUNT_CENTS == 0
        {
            found.push(Anomaly::new(
                codes::ROUND_AMOUNT,
                AnomalySeverity::Medium,
                format!(
                    "tax of exactly ${} suggests an estimate rather than a computed amount",
                    transaction.tax_amount_cents / 100
                ),
            ));
        }

        if !found.is_empty() {
            tracing::debug!(
                transaction_id = %transaction.id,
                count = found.len(),
                "anomalies detected"
            );
        }

        found
    }

    /// Register the invoice fingerprint; Some(first id) when already seen
    fn check_duplicate(&self, transaction: &Transaction) -> Option<String> {
        let vendor = transaction.normalized_vendor();
        if vendor.is_empty() {
            // Blank vendors would all collide with each other
            return None;
        }
        let key = (
            vendor,
            transaction.invoice_total_cents,
            transaction.invoice_date,
        );
        match self.seen_invoices.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Some(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(transaction.id.clone());
                None
            }
        }
    }
}
