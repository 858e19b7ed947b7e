//! Statement-line reconciliation: suggestion scoring against ledger records
//! and the match bookkeeping on a single [`BankFeedLine`].

use crate::config::MatchTuning;
use crate::domain::{
    BankFeedLine, BankMatch, IgnoreMark, LedgerRecord, MatchMethod, SystemRecordType,
};
use crate::error::ReconcileError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    AmountExact,
    AmountNear,
    DateExact,
    DateNear,
    CounterpartySimilar,
    ReferenceMatch,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::AmountExact => "amount_exact",
            MatchReason::AmountNear => "amount_near",
            MatchReason::DateExact => "date_exact",
            MatchReason::DateNear => "date_near",
            MatchReason::CounterpartySimilar => "counterparty_similar",
            MatchReason::ReferenceMatch => "reference_match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// A ranked candidate for one statement line. Computed per lookup, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedMatch {
    pub record_type: SystemRecordType,
    pub record_id: Uuid,
    /// 0..=100
    pub match_score: u8,
    pub match_reasons: Vec<MatchReason>,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub counterparty: Option<String>,
    pub description: String,
}

impl SuggestedMatch {
    pub fn confidence(&self, tuning: &MatchTuning) -> Confidence {
        if self.match_score >= tuning.high_confidence {
            Confidence::High
        } else if self.match_score >= tuning.medium_confidence {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Input for a manual match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub record_type: SystemRecordType,
    pub record_id: Uuid,
    pub amount: Decimal,
}

/// A blank record pre-filled from a statement line, handed to whichever form
/// creates receipts, expenses or transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftRecord {
    pub source_line: Uuid,
    pub kind: SystemRecordType,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
}

impl BankFeedLine {
    pub fn remaining(&self) -> Decimal {
        (self.amount.abs() - self.matched_amount).max(Decimal::ZERO)
    }

    pub fn is_fully_matched(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.is_some()
    }

    /// Matched share of the line, 0..=100, rounded down so 100 means fully
    /// matched.
    pub fn percent_matched(&self) -> u32 {
        let total = self.amount.abs();
        if total.is_zero() {
            return 100;
        }
        let pct = (self.matched_amount.min(total) / total) * Decimal::from(100u32);
        pct.trunc().to_u32().unwrap_or(0).min(100)
    }

    /// Accepts a suggestion for its amount, capped at what is still unmatched.
    pub fn accept_suggestion(
        &mut self,
        suggestion: &SuggestedMatch,
        matched_by: &str,
        at: DateTime<Utc>,
    ) -> Result<BankMatch, ReconcileError> {
        self.ensure_open()?;
        self.ensure_not_matched(suggestion.record_id)?;
        if suggestion.amount <= Decimal::ZERO {
            return Err(ReconcileError::NonPositiveAmount(suggestion.amount));
        }
        let amount = suggestion.amount.min(self.remaining());
        Ok(self.push_match(
            suggestion.record_type,
            suggestion.record_id,
            amount,
            matched_by,
            at,
            MatchMethod::SuggestedAccepted,
        ))
    }

    /// Manual match for an arbitrary record and amount. Amounts above the
    /// remaining unmatched amount are rejected.
    pub fn create_match(
        &mut self,
        new: NewMatch,
        matched_by: &str,
        at: DateTime<Utc>,
    ) -> Result<BankMatch, ReconcileError> {
        if new.amount <= Decimal::ZERO {
            return Err(ReconcileError::NonPositiveAmount(new.amount));
        }
        self.ensure_open()?;
        self.ensure_not_matched(new.record_id)?;
        let remaining = self.remaining();
        if new.amount > remaining {
            return Err(ReconcileError::OverMatch {
                requested: new.amount,
                remaining,
            });
        }
        Ok(self.push_match(
            new.record_type,
            new.record_id,
            new.amount,
            matched_by,
            at,
            MatchMethod::Manual,
        ))
    }

    /// Detaches a match. The ledger record it pointed at is untouched.
    pub fn remove_match(&mut self, match_id: Uuid) -> Result<BankMatch, ReconcileError> {
        let Some(pos) = self.matches.iter().position(|m| m.id == match_id) else {
            return Err(ReconcileError::MatchNotFound {
                line_id: self.id,
                match_id,
            });
        };
        let removed = self.matches.remove(pos);
        self.recompute_matched();
        info!(line = %self.id, record = %removed.record_id, amount = %removed.matched_amount, "removed match");
        Ok(removed)
    }

    pub fn ignore(
        &mut self,
        by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        if !self.matches.is_empty() {
            return Err(ReconcileError::HasMatches(self.id));
        }
        self.ignored = Some(IgnoreMark {
            at,
            by: by.to_string(),
            reason: reason.to_string(),
        });
        info!(line = %self.id, reason, "ignored statement line");
        Ok(())
    }

    /// Pre-fills a new record from this line. Without an explicit kind the
    /// sign decides: inflows become receipts, outflows expenses.
    pub fn draft_record(&self, kind: Option<SystemRecordType>) -> DraftRecord {
        let kind = kind.unwrap_or(if self.is_inflow() {
            SystemRecordType::Receipt
        } else {
            SystemRecordType::Expense
        });
        DraftRecord {
            source_line: self.id,
            kind,
            amount: self.remaining(),
            currency: self.currency.clone(),
            date: self.value_date.unwrap_or(self.transaction_date),
            description: self.description.clone(),
            reference: self.reference.clone(),
        }
    }

    fn ensure_open(&self) -> Result<(), ReconcileError> {
        if self.is_ignored() {
            return Err(ReconcileError::LineIgnored(self.id));
        }
        if self.is_fully_matched() {
            return Err(ReconcileError::FullyMatched(self.id));
        }
        Ok(())
    }

    fn ensure_not_matched(&self, record_id: Uuid) -> Result<(), ReconcileError> {
        if self.matches.iter().any(|m| m.record_id == record_id) {
            return Err(ReconcileError::AlreadyMatched(record_id));
        }
        Ok(())
    }

    fn push_match(
        &mut self,
        record_type: SystemRecordType,
        record_id: Uuid,
        amount: Decimal,
        matched_by: &str,
        at: DateTime<Utc>,
        method: MatchMethod,
    ) -> BankMatch {
        let m = BankMatch {
            id: Uuid::new_v4(),
            line_id: self.id,
            record_type,
            record_id,
            matched_amount: amount,
            matched_by: matched_by.to_string(),
            matched_at: at,
            method,
        };
        self.matches.push(m.clone());
        self.recompute_matched();
        info!(
            line = %self.id,
            record = %record_id,
            kind = record_type.as_str(),
            amount = %amount,
            method = method.as_str(),
            remaining = %self.remaining(),
            "created match"
        );
        m
    }

    fn recompute_matched(&mut self) {
        self.matched_amount = self.matches.iter().map(|m| m.matched_amount).sum();
    }
}

/// Scores one candidate against a line. `None` when the record cannot be a
/// match at all (other currency, opposite direction, already on this line)
/// or scores below `tuning.min_score`.
pub fn score_candidate(
    line: &BankFeedLine,
    record: &LedgerRecord,
    tuning: &MatchTuning,
) -> Option<SuggestedMatch> {
    if !record.currency.eq_ignore_ascii_case(&line.currency) {
        return None;
    }
    if let Some(inflow) = record.kind.is_inflow() {
        if inflow != line.is_inflow() {
            return None;
        }
    }
    if line.matches.iter().any(|m| m.record_id == record.id) {
        return None;
    }

    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    let target = match line.remaining() {
        r if r.is_zero() => line.amount.abs(),
        r => r,
    };
    let diff = (record.amount - target).abs();
    let tolerance = target * tuning.amount_tolerance_pct / Decimal::from(100u32);
    if diff.is_zero() {
        score += tuning.weight_amount_exact;
        reasons.push(MatchReason::AmountExact);
    } else if diff <= tolerance {
        score += tuning.weight_amount_near;
        reasons.push(MatchReason::AmountNear);
    }

    let days = date_distance(line, record.date);
    if days == 0 {
        score += tuning.weight_date_exact;
        reasons.push(MatchReason::DateExact);
    } else if days <= tuning.date_window_days {
        score += tuning.weight_date_near;
        reasons.push(MatchReason::DateNear);
    }

    if let Some(cp) = record.counterparty.as_deref() {
        let points = counterparty_points(cp, &line.description, tuning.weight_counterparty);
        if points > 0 {
            score += points;
            reasons.push(MatchReason::CounterpartySimilar);
        }
    }

    if references_overlap(line, record) {
        score += tuning.weight_reference;
        reasons.push(MatchReason::ReferenceMatch);
    }

    let score = score.min(100) as u8;
    if score == 0 || score < tuning.min_score {
        return None;
    }

    Some(SuggestedMatch {
        record_type: record.kind,
        record_id: record.id,
        match_score: score,
        match_reasons: reasons,
        amount: record.amount,
        date: record.date,
        counterparty: record.counterparty.clone(),
        description: record.description.clone(),
    })
}

/// Ranked suggestions for a line, best first. Ignored or fully matched lines
/// get none.
pub fn suggest_matches(
    line: &BankFeedLine,
    candidates: &[LedgerRecord],
    tuning: &MatchTuning,
) -> Vec<SuggestedMatch> {
    if line.is_ignored() || line.is_fully_matched() {
        return Vec::new();
    }

    let mut out: Vec<SuggestedMatch> = candidates
        .iter()
        .filter_map(|r| score_candidate(line, r, tuning))
        .collect();

    let target = line.remaining();
    out.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then_with(|| date_distance(line, a.date).cmp(&date_distance(line, b.date)))
            .then_with(|| cmp_amount_gap(a.amount, b.amount, target))
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
    out
}

/// Text progress bar for the matched share of a line, e.g. `[====------] 40%`.
pub fn progress_bar(line: &BankFeedLine) -> String {
    let pct = line.percent_matched() as usize;
    let bar_len = 10usize;
    let filled = (pct * bar_len) / 100;
    let empty = bar_len.saturating_sub(filled);
    format!("[{}{}] {}%", "=".repeat(filled), "-".repeat(empty), pct)
}

fn cmp_amount_gap(a: Decimal, b: Decimal, target: Decimal) -> Ordering {
    (a - target).abs().cmp(&(b - target).abs())
}

fn date_distance(line: &BankFeedLine, date: NaiveDate) -> i64 {
    let by_tx = (date - line.transaction_date).num_days().abs();
    match line.value_date {
        Some(v) => by_tx.min((date - v).num_days().abs()),
        None => by_tx,
    }
}

fn tokens(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3 && !t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
        .collect()
}

/// Share of the counterparty's words found in the bank description, scaled
/// to `weight`.
fn counterparty_points(counterparty: &str, description: &str, weight: u32) -> u32 {
    let wanted = tokens(counterparty);
    if wanted.is_empty() {
        return 0;
    }
    let have = tokens(description);
    let hits = wanted.iter().filter(|t| have.contains(*t)).count() as u32;
    weight * hits / wanted.len() as u32
}

fn references_overlap(line: &BankFeedLine, record: &LedgerRecord) -> bool {
    let normalize = |s: &str| s.trim().to_lowercase();
    let line_text = format!(
        "{} {}",
        line.description.to_lowercase(),
        line.reference.as_deref().map(normalize).unwrap_or_default()
    );
    if let Some(r) = record.reference.as_deref().map(normalize) {
        if r.chars().count() >= 3 && line_text.contains(&r) {
            return true;
        }
    }
    if let Some(r) = line.reference.as_deref().map(normalize) {
        if r.chars().count() >= 3 {
            let record_text = format!(
                "{} {}",
                record.description.to_lowercase(),
                record.reference.as_deref().map(normalize).unwrap_or_default()
            );
            return record_text.contains(&r);
        }
    }
    false
}
