use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid month {year}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("statement line {0} is ignored")]
    LineIgnored(Uuid),

    #[error("statement line {0} is already fully matched")]
    FullyMatched(Uuid),

    #[error("match of {requested} exceeds the remaining unmatched amount {remaining}")]
    OverMatch {
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("match amount must be > 0 (got {0})")]
    NonPositiveAmount(Decimal),

    #[error("no match {match_id} on statement line {line_id}")]
    MatchNotFound { line_id: Uuid, match_id: Uuid },

    #[error("record {0} is already matched on this statement line")]
    AlreadyMatched(Uuid),

    #[error("statement line {0} has matches; remove them before ignoring it")]
    HasMatches(Uuid),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RevenueError {
    #[error("amount {amount} on {source_id} is too large to report on")]
    AmountOverflow { source_id: Uuid, amount: Decimal },
}
