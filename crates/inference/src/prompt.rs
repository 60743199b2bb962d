//! Transaction text assembly
//!
//! Flattens a transaction into the text block sent to the inference
//! service. The exact prompt wording around this block belongs to the
//! service; only the field contract is fixed here.

use taxlens_core::Transaction;

/// Build the transaction text block for a determination request
pub fn build_transaction_text(transaction: &Transaction) -> String {
    let mut text = format!(
        "Vendor: {}\nDescription: {}\nTax type: {}\nTax paid: ${:.2}\nInvoice total: ${:.2}",
        transaction.vendor_name,
        transaction.description,
        transaction.tax_type,
        cents_to_dollars(transaction.tax_amount_cents),
        cents_to_dollars(transaction.invoice_total_cents),
    );

    if let Some(ref category) = transaction.category {
        text.push_str(&format!("\nCategory: {category}"));
    }
    if let Some(date) = transaction.invoice_date {
        text.push_str(&format!("\nInvoice date: {date}"));
    }

    text
}

fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}
