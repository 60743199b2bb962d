//! Transaction and tax-type domain types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Tax type of a transaction
///
/// Sales tax is vendor-collected and remitted; use tax is self-assessed by
/// the purchaser. Mutually exclusive per transaction, and a hard partition
/// key for every pattern lookup: statistics learned under one tax type are
/// never applied to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxType {
    Sales,
    Use,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::Sales => "sales",
            TaxType::Use => "use",
        }
    }
}

impl std::fmt::Display for TaxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One historical purchase transaction under analysis
///
/// Monetary fields are integer cents to keep routing-threshold comparisons
/// exact. The spreadsheet importer is responsible for populating these rows;
/// this crate never parses spreadsheet formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied row identifier (stable across re-runs)
    pub id: String,
    /// Vendor name as it appeared on the invoice
    pub vendor_name: String,
    /// Line-item / invoice description
    pub description: String,
    /// Sales vs. use tax
    pub tax_type: TaxType,
    /// Tax paid, in cents
    pub tax_amount_cents: i64,
    /// Invoice total, in cents
    pub invoice_total_cents: i64,
    /// Tax category, when the importer could map one
    pub category: Option<String>,
    /// Invoice date
    pub invoice_date: Option<NaiveDate>,
}

impl Transaction {
    /// Vendor name normalized for pattern lookup
    pub fn normalized_vendor(&self) -> String {
        normalize_vendor(&self.vendor_name)
    }

    /// Text used to build the retrieval query and keyword set
    pub fn query_text(&self) -> String {
        let mut text = format!("{} {}", self.vendor_name, self.description);
        if let Some(ref category) = self.category {
            text.push(' ');
            text.push_str(category);
        }
        text
    }
}

/// Normalize a vendor name for exact-match pattern lookup
///
/// Case-fold, trim, and collapse internal whitespace runs. Fuzzy vendor
/// resolution is an external collaborator's job; this is only the
/// canonical key form.
pub fn normalize_vendor(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
