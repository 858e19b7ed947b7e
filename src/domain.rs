use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Resource id used on the CLI and in filters for bookings with no owning boat.
pub const EXTERNAL_RESOURCE: &str = "external";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Option,
    Reserved,
    Booked,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Option => "option",
            BookingStatus::Reserved => "reserved",
            BookingStatus::Booked => "booked",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "option" => Ok(BookingStatus::Option),
            "reserved" => Ok(BookingStatus::Reserved),
            "booked" => Ok(BookingStatus::Booked),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(format!(
                "unknown booking status '{other}' (expected option, reserved, booked, cancelled)"
            )),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A charter booking or transfer occupying a date range on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub date_from: NaiveDate,
    /// Inclusive.
    pub date_to: NaiveDate,
    /// Owning boat/project. `None` means an external booking.
    pub resource: Option<String>,
    pub status: BookingStatus,
    #[serde(default)]
    pub label: String,
}

impl Booking {
    pub fn has_valid_range(&self) -> bool {
        self.date_from <= self.date_to
    }

    /// Length in days, counting both ends.
    pub fn duration_days(&self) -> i64 {
        (self.date_to - self.date_from).num_days() + 1
    }

    pub fn resource_key(&self) -> &str {
        self.resource.as_deref().unwrap_or(EXTERNAL_RESOURCE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResourceFilter {
    #[default]
    All,
    External,
    Resource(String),
}

impl ResourceFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => ResourceFilter::All,
            Some(r) if r.eq_ignore_ascii_case(EXTERNAL_RESOURCE) => ResourceFilter::External,
            Some(r) => ResourceFilter::Resource(r.to_string()),
        }
    }

    pub fn accepts(&self, booking: &Booking) -> bool {
        match self {
            ResourceFilter::All => true,
            ResourceFilter::External => booking.resource.is_none(),
            ResourceFilter::Resource(id) => booking.resource.as_deref() == Some(id.as_str()),
        }
    }
}

/// Ledger record kinds a statement line can be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRecordType {
    Receipt,
    Expense,
    Transfer,
    OwnerContribution,
}

impl SystemRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemRecordType::Receipt => "receipt",
            SystemRecordType::Expense => "expense",
            SystemRecordType::Transfer => "transfer",
            SystemRecordType::OwnerContribution => "owner_contribution",
        }
    }

    /// Money direction this kind normally shows on a bank statement.
    /// `None` for transfers, which can go either way.
    pub fn is_inflow(&self) -> Option<bool> {
        match self {
            SystemRecordType::Receipt | SystemRecordType::OwnerContribution => Some(true),
            SystemRecordType::Expense => Some(false),
            SystemRecordType::Transfer => None,
        }
    }
}

impl FromStr for SystemRecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "receipt" => Ok(SystemRecordType::Receipt),
            "expense" => Ok(SystemRecordType::Expense),
            "transfer" => Ok(SystemRecordType::Transfer),
            "owner_contribution" | "contribution" => Ok(SystemRecordType::OwnerContribution),
            other => Err(format!(
                "unknown record kind '{other}' (expected receipt, expense, transfer, owner_contribution)"
            )),
        }
    }
}

impl fmt::Display for SystemRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Manual,
    SuggestedAccepted,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Manual => "manual",
            MatchMethod::SuggestedAccepted => "suggested_accepted",
        }
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(MatchMethod::Manual),
            "suggested_accepted" => Ok(MatchMethod::SuggestedAccepted),
            other => Err(format!("unknown match method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMeta {
    pub source: String,
    pub imported_by: String,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreMark {
    pub at: DateTime<Utc>,
    pub by: String,
    pub reason: String,
}

/// One imported bank transaction. The import fields never change; matches,
/// the ignore mark and notes are layered on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankFeedLine {
    pub id: Uuid,
    /// Signed: negative is an outflow.
    pub amount: Decimal,
    pub currency: String,
    pub transaction_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub description: String,
    pub reference: Option<String>,
    /// Running balance as reported by the bank.
    pub balance: Option<Decimal>,
    pub import: ImportMeta,

    pub matched_amount: Decimal,
    #[serde(default)]
    pub matches: Vec<BankMatch>,
    pub ignored: Option<IgnoreMark>,
    pub notes: Option<String>,
}

impl BankFeedLine {
    pub fn is_inflow(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankMatch {
    pub id: Uuid,
    pub line_id: Uuid,
    pub record_type: SystemRecordType,
    pub record_id: Uuid,
    pub matched_amount: Decimal,
    pub matched_by: String,
    pub matched_at: DateTime<Utc>,
    pub method: MatchMethod,
}

/// A receipt, expense, transfer or owner contribution already in the books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: Uuid,
    pub kind: SystemRecordType,
    /// Unsigned; direction comes from `kind`.
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub counterparty: Option<String>,
    #[serde(default)]
    pub description: String,
    pub reference: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub issued: NaiveDate,
    pub charter_from: Option<NaiveDate>,
    pub charter_to: Option<NaiveDate>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFields {
    pub source_id: Uuid,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub category: Option<String>,
}

/// Income and expense documents flattened into one shape for categorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentLine {
    Income(LineFields),
    Expense(LineFields),
}

impl DocumentLine {
    pub fn fields(&self) -> &LineFields {
        match self {
            DocumentLine::Income(f) | DocumentLine::Expense(f) => f,
        }
    }

    pub fn from_invoice(inv: &Invoice) -> Self {
        DocumentLine::Income(LineFields {
            source_id: inv.id,
            date: inv.issued,
            amount: inv.amount,
            currency: inv.currency.clone(),
            category: inv.category.clone(),
        })
    }

    /// Receipts are cash-side duplicates of invoices and transfers move money
    /// between own accounts, so only expenses and owner contributions count.
    pub fn from_record(rec: &LedgerRecord) -> Option<Self> {
        let fields = LineFields {
            source_id: rec.id,
            date: rec.date,
            amount: rec.amount,
            currency: rec.currency.clone(),
            category: rec.category.clone(),
        };
        match rec.kind {
            SystemRecordType::Expense => Some(DocumentLine::Expense(fields)),
            SystemRecordType::OwnerContribution => Some(DocumentLine::Income(fields)),
            SystemRecordType::Receipt | SystemRecordType::Transfer => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(resource: Option<&str>) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            date_from: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2025, 5, 7).unwrap(),
            resource: resource.map(str::to_string),
            status: BookingStatus::Booked,
            label: String::new(),
        }
    }

    #[test]
    fn resource_filter_buckets_unowned_bookings_as_external() {
        let ext = booking(None);
        let owned = booking(Some("lagoon-42"));

        let f = ResourceFilter::parse(Some("EXTERNAL"));
        assert_eq!(f, ResourceFilter::External);
        assert!(f.accepts(&ext));
        assert!(!f.accepts(&owned));

        let f = ResourceFilter::parse(Some("lagoon-42"));
        assert!(f.accepts(&owned));
        assert!(!f.accepts(&ext));

        assert!(ResourceFilter::parse(None).accepts(&ext));
    }

    #[test]
    fn duration_counts_both_ends() {
        assert_eq!(booking(None).duration_days(), 7);
    }

    #[test]
    fn record_kinds_parse_with_dashes() {
        assert_eq!(
            "owner-contribution".parse::<SystemRecordType>().unwrap(),
            SystemRecordType::OwnerContribution
        );
        assert!("refund".parse::<SystemRecordType>().is_err());
    }
}
