use crate::config::{AppPaths, CalendarSettings, SettingsStore, tenant_slug};
use crate::domain::{
    BankFeedLine, BankMatch, Booking, BookingStatus, IgnoreMark, ImportMeta, Invoice,
    LedgerRecord, MatchMethod, SystemRecordType,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

const SETTINGS_KEY_CALENDAR: &str = "calendar";

#[derive(Debug, Clone, Copy)]
pub enum IdKind {
    Booking,
    BankLine,
    BankMatch,
    Record,
    Invoice,
}

impl IdKind {
    fn table(&self) -> &'static str {
        match self {
            IdKind::Booking => "bookings",
            IdKind::BankLine => "bank_lines",
            IdKind::BankMatch => "bank_matches",
            IdKind::Record => "records",
            IdKind::Invoice => "invoices",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            IdKind::Booking => "booking",
            IdKind::BankLine => "statement line",
            IdKind::BankMatch => "match",
            IdKind::Record => "record",
            IdKind::Invoice => "invoice",
        }
    }
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths, tenant: &str) -> Result<(Self, PathBuf)> {
        let slug = tenant_slug(tenant);
        let tenant_dir = paths.data_dir.join("tenants").join(slug);
        fs::create_dir_all(&tenant_dir)
            .with_context(|| format!("Failed to create tenant dir {}", tenant_dir.display()))?;

        let db_path = tenant_dir.join("charterdesk.sqlite3");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;

        let db = Self { conn };
        db.migrate()?;
        debug!(path = %db_path.display(), "opened tenant database");
        Ok((db, db_path))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                date_from TEXT NOT NULL,
                date_to TEXT NOT NULL,
                resource TEXT,
                status TEXT NOT NULL,
                label TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_bookings_range ON bookings(date_from, date_to);

            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                date TEXT NOT NULL,
                counterparty TEXT,
                description TEXT NOT NULL DEFAULT '',
                reference TEXT,
                category TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_records_date ON records(date);

            CREATE TABLE IF NOT EXISTS bank_lines (
                id TEXT PRIMARY KEY,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                transaction_date TEXT NOT NULL,
                value_date TEXT,
                description TEXT NOT NULL,
                reference TEXT,
                balance TEXT,
                source TEXT NOT NULL,
                imported_by TEXT NOT NULL,
                imported_at TEXT NOT NULL,
                matched_amount TEXT NOT NULL DEFAULT '0',
                ignored_at TEXT,
                ignored_by TEXT,
                ignored_reason TEXT,
                notes TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_bank_lines_date ON bank_lines(transaction_date);

            CREATE TABLE IF NOT EXISTS bank_matches (
                id TEXT PRIMARY KEY,
                line_id TEXT NOT NULL REFERENCES bank_lines(id),
                record_type TEXT NOT NULL,
                record_id TEXT NOT NULL,
                matched_amount TEXT NOT NULL,
                matched_by TEXT NOT NULL,
                matched_at TEXT NOT NULL,
                method TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bank_matches_line ON bank_matches(line_id);
            CREATE INDEX IF NOT EXISTS idx_bank_matches_record ON bank_matches(record_id);

            CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                number TEXT,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                issued TEXT NOT NULL,
                charter_from TEXT,
                charter_to TEXT,
                category TEXT
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Resolves a full id or a unique id prefix.
    pub fn resolve_id(&self, kind: IdKind, raw: &str) -> Result<Uuid> {
        let prefix = raw.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(anyhow!("Empty {} id", kind.noun()));
        }
        if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(anyhow!(
                "Invalid {} id '{raw}': expected hex digits and '-'",
                kind.noun()
            ));
        }
        let sql = format!(
            "SELECT id FROM {} WHERE id LIKE ?1 || '%' ORDER BY id LIMIT 2",
            kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match ids.as_slice() {
            [] => Err(anyhow!("No {} matching '{raw}'", kind.noun())),
            [one] => parse_uuid(one, kind.noun()),
            _ => Err(anyhow!(
                "Ambiguous {} id '{raw}'; use more characters",
                kind.noun()
            )),
        }
    }

    pub fn insert_booking(&self, b: &Booking) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO bookings (id, date_from, date_to, resource, status, label)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                b.id.to_string(),
                b.date_from,
                b.date_to,
                b.resource,
                b.status.as_str(),
                b.label,
            ],
        )?;
        Ok(())
    }

    pub fn delete_booking(&self, id: Uuid) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM bookings WHERE id = ?1", params![id.to_string()])?)
    }

    /// Bookings overlapping `[from, to]`, in insertion order.
    pub fn list_bookings_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, date_from, date_to, resource, status, label
            FROM bookings
            WHERE date_from <= ?2 AND date_to >= ?1
            ORDER BY rowid ASC
            "#,
        )?;
        let rows = stmt.query_map(params![from, to], booking_row)?;
        rows.map(|r| r?.into_booking()).collect()
    }

    pub fn list_bookings(&self) -> Result<Vec<Booking>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, date_from, date_to, resource, status, label
            FROM bookings
            ORDER BY date_from ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map([], booking_row)?;
        rows.map(|r| r?.into_booking()).collect()
    }

    pub fn insert_record(&self, r: &LedgerRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO records (id, kind, amount, currency, date, counterparty, description, reference, category)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                r.id.to_string(),
                r.kind.as_str(),
                r.amount.to_string(),
                r.currency,
                r.date,
                r.counterparty,
                r.description,
                r.reference,
                r.category,
            ],
        )?;
        Ok(())
    }

    pub fn list_records(&self, kind: Option<SystemRecordType>) -> Result<Vec<LedgerRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, kind, amount, currency, date, counterparty, description, reference, category
            FROM records
            WHERE ?1 IS NULL OR kind = ?1
            ORDER BY date ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map(params![kind.map(|k| k.as_str())], record_row)?;
        rows.map(|r| r?.into_record()).collect()
    }

    pub fn get_record(&self, id: Uuid) -> Result<Option<LedgerRecord>> {
        let raw = self
            .conn
            .query_row(
                r#"
                SELECT id, kind, amount, currency, date, counterparty, description, reference, category
                FROM records WHERE id = ?1
                "#,
                params![id.to_string()],
                record_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    pub fn insert_bank_line(&self, line: &BankFeedLine) -> Result<()> {
        self.insert_bank_lines(std::slice::from_ref(line))
    }

    /// Inserts a whole import in one transaction; any failure leaves none of
    /// the lines behind.
    pub fn insert_bank_lines(&self, lines: &[BankFeedLine]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for line in lines {
            tx.execute(
                r#"
                INSERT INTO bank_lines (
                    id, amount, currency, transaction_date, value_date, description, reference, balance,
                    source, imported_by, imported_at, matched_amount
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    line.id.to_string(),
                    line.amount.to_string(),
                    line.currency,
                    line.transaction_date,
                    line.value_date,
                    line.description,
                    line.reference,
                    line.balance.map(|b| b.to_string()),
                    line.import.source,
                    line.import.imported_by,
                    line.import.imported_at.to_rfc3339(),
                    line.matched_amount.to_string(),
                ],
            )
            .with_context(|| format!("Failed to insert statement line {}", line.id))?;
        }
        tx.commit()?;
        debug!(count = lines.len(), "inserted statement lines");
        Ok(())
    }

    /// Persists the mutable part of a line: matched amount, ignore mark,
    /// notes and the full match list.
    pub fn save_line_state(&self, line: &BankFeedLine) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            r#"
            UPDATE bank_lines
            SET matched_amount = ?2, ignored_at = ?3, ignored_by = ?4, ignored_reason = ?5, notes = ?6
            WHERE id = ?1
            "#,
            params![
                line.id.to_string(),
                line.matched_amount.to_string(),
                line.ignored.as_ref().map(|i| i.at.to_rfc3339()),
                line.ignored.as_ref().map(|i| i.by.clone()),
                line.ignored.as_ref().map(|i| i.reason.clone()),
                line.notes,
            ],
        )?;
        if changed == 0 {
            return Err(anyhow!("No such statement line: {}", line.id));
        }

        tx.execute(
            "DELETE FROM bank_matches WHERE line_id = ?1",
            params![line.id.to_string()],
        )?;
        for m in &line.matches {
            tx.execute(
                r#"
                INSERT INTO bank_matches (id, line_id, record_type, record_id, matched_amount, matched_by, matched_at, method)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    m.id.to_string(),
                    m.line_id.to_string(),
                    m.record_type.as_str(),
                    m.record_id.to_string(),
                    m.matched_amount.to_string(),
                    m.matched_by,
                    m.matched_at.to_rfc3339(),
                    m.method.as_str(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_bank_line(&self, id: Uuid) -> Result<Option<BankFeedLine>> {
        let raw = self
            .conn
            .query_row(
                &format!("{LINE_SELECT} WHERE id = ?1"),
                params![id.to_string()],
                line_row,
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut line = raw.into_line()?;
        line.matches = self.list_matches_for_line(line.id)?;
        Ok(Some(line))
    }

    pub fn list_bank_lines(&self) -> Result<Vec<BankFeedLine>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LINE_SELECT} ORDER BY transaction_date ASC, rowid ASC"))?;
        let rows = stmt.query_map([], line_row)?;
        let mut lines = rows
            .map(|r| r?.into_line())
            .collect::<Result<Vec<_>>>()?;

        let mut by_line: HashMap<Uuid, Vec<BankMatch>> = HashMap::new();
        for m in self.list_all_matches()? {
            by_line.entry(m.line_id).or_default().push(m);
        }
        for line in &mut lines {
            line.matches = by_line.remove(&line.id).unwrap_or_default();
        }
        Ok(lines)
    }

    /// Lines other than `except_line` that already hold a match to `record_id`.
    pub fn lines_matching_record(&self, record_id: Uuid, except_line: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT line_id FROM bank_matches WHERE record_id = ?1 AND line_id != ?2",
        )?;
        let rows = stmt.query_map(
            params![record_id.to_string(), except_line.to_string()],
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(parse_uuid(&row?, "line")?);
        }
        Ok(out)
    }

    fn list_matches_for_line(&self, line_id: Uuid) -> Result<Vec<BankMatch>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MATCH_SELECT} WHERE line_id = ?1 ORDER BY matched_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![line_id.to_string()], match_row)?;
        rows.map(|r| r?.into_match()).collect()
    }

    fn list_all_matches(&self) -> Result<Vec<BankMatch>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MATCH_SELECT} ORDER BY matched_at ASC, rowid ASC"))?;
        let rows = stmt.query_map([], match_row)?;
        rows.map(|r| r?.into_match()).collect()
    }

    pub fn insert_invoice(&self, inv: &Invoice) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO invoices (id, number, amount, currency, issued, charter_from, charter_to, category)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                inv.id.to_string(),
                inv.number,
                inv.amount.to_string(),
                inv.currency,
                inv.issued,
                inv.charter_from,
                inv.charter_to,
                inv.category,
            ],
        )?;
        Ok(())
    }

    pub fn list_invoices(&self) -> Result<Vec<Invoice>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, number, amount, currency, issued, charter_from, charter_to, category
            FROM invoices
            ORDER BY issued ASC, rowid ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let number: Option<String> = row.get(1)?;
            let amount: String = row.get(2)?;
            let currency: String = row.get(3)?;
            let issued: NaiveDate = row.get(4)?;
            let charter_from: Option<NaiveDate> = row.get(5)?;
            let charter_to: Option<NaiveDate> = row.get(6)?;
            let category: Option<String> = row.get(7)?;
            Ok((
                id,
                number,
                amount,
                currency,
                issued,
                charter_from,
                charter_to,
                category,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, number, amount, currency, issued, charter_from, charter_to, category) = row?;
            out.push(Invoice {
                id: parse_uuid(&id, "invoice")?,
                number,
                amount: parse_decimal(&amount, "invoices.amount")?,
                currency,
                issued,
                charter_from,
                charter_to,
                category,
            });
        }
        Ok(out)
    }
}

impl SettingsStore for Db {
    fn load_settings(&self) -> Result<CalendarSettings> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                params![SETTINGS_KEY_CALENDAR],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Ok(CalendarSettings::default()),
            Some(json) => serde_json::from_str(&json).context("Invalid calendar settings JSON"),
        }
    }

    fn save_settings(&self, settings: &CalendarSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn.execute(
            r#"
            INSERT INTO settings (key, value_json) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json
            "#,
            params![SETTINGS_KEY_CALENDAR, json],
        )?;
        Ok(())
    }
}

const LINE_SELECT: &str = r#"
    SELECT id, amount, currency, transaction_date, value_date, description, reference, balance,
           source, imported_by, imported_at, matched_amount, ignored_at, ignored_by, ignored_reason, notes
    FROM bank_lines
"#;

const MATCH_SELECT: &str = r#"
    SELECT id, line_id, record_type, record_id, matched_amount, matched_by, matched_at, method
    FROM bank_matches
"#;

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid {what} UUID in DB: {raw}"))
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .with_context(|| format!("Invalid decimal in {what}: {raw}"))
}

fn parse_ts(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid {what} in DB: {raw}"))?
        .with_timezone(&Utc))
}

struct RawBooking {
    id: String,
    date_from: NaiveDate,
    date_to: NaiveDate,
    resource: Option<String>,
    status: String,
    label: String,
}

fn booking_row(row: &Row<'_>) -> rusqlite::Result<RawBooking> {
    Ok(RawBooking {
        id: row.get(0)?,
        date_from: row.get(1)?,
        date_to: row.get(2)?,
        resource: row.get(3)?,
        status: row.get(4)?,
        label: row.get(5)?,
    })
}

impl RawBooking {
    fn into_booking(self) -> Result<Booking> {
        Ok(Booking {
            id: parse_uuid(&self.id, "booking")?,
            date_from: self.date_from,
            date_to: self.date_to,
            resource: self.resource,
            status: self
                .status
                .parse::<BookingStatus>()
                .map_err(|e| anyhow!("Invalid booking status in DB: {e}"))?,
            label: self.label,
        })
    }
}

struct RawRecord {
    id: String,
    kind: String,
    amount: String,
    currency: String,
    date: NaiveDate,
    counterparty: Option<String>,
    description: String,
    reference: Option<String>,
    category: Option<String>,
}

fn record_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        amount: row.get(2)?,
        currency: row.get(3)?,
        date: row.get(4)?,
        counterparty: row.get(5)?,
        description: row.get(6)?,
        reference: row.get(7)?,
        category: row.get(8)?,
    })
}

impl RawRecord {
    fn into_record(self) -> Result<LedgerRecord> {
        Ok(LedgerRecord {
            id: parse_uuid(&self.id, "record")?,
            kind: self
                .kind
                .parse::<SystemRecordType>()
                .map_err(|e| anyhow!("Invalid record kind in DB: {e}"))?,
            amount: parse_decimal(&self.amount, "records.amount")?,
            currency: self.currency,
            date: self.date,
            counterparty: self.counterparty,
            description: self.description,
            reference: self.reference,
            category: self.category,
        })
    }
}

struct RawLine {
    id: String,
    amount: String,
    currency: String,
    transaction_date: NaiveDate,
    value_date: Option<NaiveDate>,
    description: String,
    reference: Option<String>,
    balance: Option<String>,
    source: String,
    imported_by: String,
    imported_at: String,
    matched_amount: String,
    ignored_at: Option<String>,
    ignored_by: Option<String>,
    ignored_reason: Option<String>,
    notes: Option<String>,
}

fn line_row(row: &Row<'_>) -> rusqlite::Result<RawLine> {
    Ok(RawLine {
        id: row.get(0)?,
        amount: row.get(1)?,
        currency: row.get(2)?,
        transaction_date: row.get(3)?,
        value_date: row.get(4)?,
        description: row.get(5)?,
        reference: row.get(6)?,
        balance: row.get(7)?,
        source: row.get(8)?,
        imported_by: row.get(9)?,
        imported_at: row.get(10)?,
        matched_amount: row.get(11)?,
        ignored_at: row.get(12)?,
        ignored_by: row.get(13)?,
        ignored_reason: row.get(14)?,
        notes: row.get(15)?,
    })
}

impl RawLine {
    fn into_line(self) -> Result<BankFeedLine> {
        let ignored = match self.ignored_at {
            None => None,
            Some(at) => Some(IgnoreMark {
                at: parse_ts(&at, "bank_lines.ignored_at")?,
                by: self.ignored_by.unwrap_or_default(),
                reason: self.ignored_reason.unwrap_or_default(),
            }),
        };
        Ok(BankFeedLine {
            id: parse_uuid(&self.id, "statement line")?,
            amount: parse_decimal(&self.amount, "bank_lines.amount")?,
            currency: self.currency,
            transaction_date: self.transaction_date,
            value_date: self.value_date,
            description: self.description,
            reference: self.reference,
            balance: self
                .balance
                .as_deref()
                .map(|b| parse_decimal(b, "bank_lines.balance"))
                .transpose()?,
            import: ImportMeta {
                source: self.source,
                imported_by: self.imported_by,
                imported_at: parse_ts(&self.imported_at, "bank_lines.imported_at")?,
            },
            matched_amount: parse_decimal(&self.matched_amount, "bank_lines.matched_amount")?,
            matches: Vec::new(),
            ignored,
            notes: self.notes,
        })
    }
}

struct RawMatch {
    id: String,
    line_id: String,
    record_type: String,
    record_id: String,
    matched_amount: String,
    matched_by: String,
    matched_at: String,
    method: String,
}

fn match_row(row: &Row<'_>) -> rusqlite::Result<RawMatch> {
    Ok(RawMatch {
        id: row.get(0)?,
        line_id: row.get(1)?,
        record_type: row.get(2)?,
        record_id: row.get(3)?,
        matched_amount: row.get(4)?,
        matched_by: row.get(5)?,
        matched_at: row.get(6)?,
        method: row.get(7)?,
    })
}

impl RawMatch {
    fn into_match(self) -> Result<BankMatch> {
        Ok(BankMatch {
            id: parse_uuid(&self.id, "match")?,
            line_id: parse_uuid(&self.line_id, "statement line")?,
            record_type: self
                .record_type
                .parse::<SystemRecordType>()
                .map_err(|e| anyhow!("Invalid record type in DB: {e}"))?,
            record_id: parse_uuid(&self.record_id, "record")?,
            matched_amount: parse_decimal(&self.matched_amount, "bank_matches.matched_amount")?,
            matched_by: self.matched_by,
            matched_at: parse_ts(&self.matched_at, "bank_matches.matched_at")?,
            method: self
                .method
                .parse::<MatchMethod>()
                .map_err(|e| anyhow!("Invalid match method in DB: {e}"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::NewMatch;

    fn line() -> BankFeedLine {
        BankFeedLine {
            id: Uuid::new_v4(),
            amount: Decimal::from(-1000),
            currency: "EUR".into(),
            transaction_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            value_date: None,
            description: "MARINA".into(),
            reference: Some("R-1".into()),
            balance: Some(Decimal::from(5000)),
            import: ImportMeta {
                source: "test".into(),
                imported_by: "ana".into(),
                imported_at: Utc::now(),
            },
            matched_amount: Decimal::ZERO,
            matches: Vec::new(),
            ignored: None,
            notes: None,
        }
    }

    #[test]
    fn line_state_survives_a_reload() {
        let db = Db::open_in_memory().unwrap();
        let mut l = line();
        db.insert_bank_line(&l).unwrap();

        let record_id = Uuid::new_v4();
        let m = l
            .create_match(
                NewMatch {
                    record_type: SystemRecordType::Expense,
                    record_id,
                    amount: Decimal::from(400),
                },
                "ana",
                Utc::now(),
            )
            .unwrap();
        db.save_line_state(&l).unwrap();

        let loaded = db.get_bank_line(l.id).unwrap().unwrap();
        assert_eq!(loaded.matched_amount, Decimal::from(400));
        assert_eq!(loaded.matches.len(), 1);
        assert_eq!(loaded.matches[0].id, m.id);
        assert_eq!(loaded.remaining(), Decimal::from(600));

        assert_eq!(db.lines_matching_record(record_id, Uuid::new_v4()).unwrap(), vec![l.id]);
        assert!(db.lines_matching_record(record_id, l.id).unwrap().is_empty());

        let listed = db.list_bank_lines().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].matches.len(), 1);
    }

    #[test]
    fn ids_resolve_by_unique_prefix() {
        let db = Db::open_in_memory().unwrap();
        let l = line();
        db.insert_bank_line(&l).unwrap();
        let full = l.id.to_string();
        assert_eq!(db.resolve_id(IdKind::BankLine, &full[..8]).unwrap(), l.id);
        assert!(db.resolve_id(IdKind::Booking, &full[..8]).is_err());
    }

    #[test]
    fn settings_default_until_saved() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.load_settings().unwrap(), CalendarSettings::default());

        let mut s = CalendarSettings::default();
        s.resource_colors.insert("lagoon-42".into(), "teal".into());
        s.banner_image = Some("banner.jpg".into());
        db.save_settings(&s).unwrap();
        assert_eq!(db.load_settings().unwrap(), s);
    }

    #[test]
    fn id_prefixes_are_literal_hex() {
        let db = Db::open_in_memory().unwrap();
        let l = line();
        db.insert_bank_line(&l).unwrap();
        for raw in ["%", "_", "%%", "a%", "x"] {
            assert!(db.resolve_id(IdKind::BankLine, raw).is_err(), "{raw} resolved");
        }
        let full = l.id.to_string().to_ascii_uppercase();
        assert_eq!(db.resolve_id(IdKind::BankLine, &full).unwrap(), l.id);
    }

    #[test]
    fn failed_import_leaves_no_lines_behind() {
        let db = Db::open_in_memory().unwrap();
        let first = line();
        let second = line();
        let duplicate = first.clone();
        assert!(
            db.insert_bank_lines(&[first, second, duplicate])
                .is_err()
        );
        assert!(db.list_bank_lines().unwrap().is_empty());
    }
}
