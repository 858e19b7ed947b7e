use crate::domain::{DocumentLine, Invoice};
use crate::error::RevenueError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

pub const UNCATEGORIZED: &str = "uncategorized";

/// Where an invoice stands against its charter period on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognitionStatus {
    /// No charter dates on the invoice.
    Unscheduled,
    Deferred,
    InProgress {
        recognized: Decimal,
        deferred: Decimal,
    },
    Recognized,
}

impl RecognitionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RecognitionStatus::Unscheduled => "unscheduled",
            RecognitionStatus::Deferred => "deferred",
            RecognitionStatus::InProgress { .. } => "in_progress",
            RecognitionStatus::Recognized => "recognized",
        }
    }

    /// (recognized, deferred) split of `amount`.
    pub fn split(&self, amount: Decimal) -> (Decimal, Decimal) {
        match self {
            RecognitionStatus::Unscheduled | RecognitionStatus::Deferred => {
                (Decimal::ZERO, amount)
            }
            RecognitionStatus::InProgress {
                recognized,
                deferred,
            } => (*recognized, *deferred),
            RecognitionStatus::Recognized => (amount, Decimal::ZERO),
        }
    }
}

/// Straight-line recognition over the charter days, counting `as_of` as
/// elapsed. A half-specified or inverted charter period counts as unscheduled.
pub fn recognition_status(
    invoice: &Invoice,
    as_of: NaiveDate,
) -> Result<RecognitionStatus, RevenueError> {
    let (Some(from), Some(to)) = (invoice.charter_from, invoice.charter_to) else {
        return Ok(RecognitionStatus::Unscheduled);
    };
    if from > to {
        return Ok(RecognitionStatus::Unscheduled);
    }
    if as_of < from {
        return Ok(RecognitionStatus::Deferred);
    }
    if as_of >= to {
        return Ok(RecognitionStatus::Recognized);
    }

    let total_days = (to - from).num_days() + 1;
    let elapsed = (as_of - from).num_days() + 1;
    let overflow = || RevenueError::AmountOverflow {
        source_id: invoice.id,
        amount: invoice.amount,
    };
    let recognized = invoice
        .amount
        .checked_mul(Decimal::from(elapsed))
        .and_then(|v| v.checked_div(Decimal::from(total_days)))
        .ok_or_else(overflow)?
        .round_dp(2);
    let deferred = invoice.amount.checked_sub(recognized).ok_or_else(overflow)?;
    Ok(RecognitionStatus::InProgress {
        recognized,
        deferred,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub income: Decimal,
    pub expense: Decimal,
}

impl CategoryTotals {
    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }
}

/// Sums lines per (category, currency).
pub fn categorize<'a>(
    lines: impl IntoIterator<Item = &'a DocumentLine>,
) -> Result<BTreeMap<(String, String), CategoryTotals>, RevenueError> {
    let mut out: BTreeMap<(String, String), CategoryTotals> = BTreeMap::new();
    for line in lines {
        let f = line.fields();
        let category = f
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        let entry = out
            .entry((category, f.currency.to_ascii_uppercase()))
            .or_default();
        let slot = match line {
            DocumentLine::Income(_) => &mut entry.income,
            DocumentLine::Expense(_) => &mut entry.expense,
        };
        *slot = slot
            .checked_add(f.amount)
            .ok_or(RevenueError::AmountOverflow {
                source_id: f.source_id,
                amount: f.amount,
            })?;
    }
    Ok(out)
}
