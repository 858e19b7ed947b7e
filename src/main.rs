mod cli;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::io::IsTerminal;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use charterdesk::calendar::{layout_month, month_bounds, render_text};
use charterdesk::config::{
    AppConfig, AppPaths, SettingsStore, app_paths, load_or_init_config, now_utc, tenant_slug,
    write_config,
};
use charterdesk::db::{Db, IdKind};
use charterdesk::domain::{
    BankFeedLine, Booking, DocumentLine, ImportMeta, Invoice, LedgerRecord, ResourceFilter,
};
use charterdesk::reconcile::{NewMatch, progress_bar, score_candidate, suggest_matches};
use charterdesk::revenue::{categorize, recognition_status};

use crate::cli::{
    BankCmd, BookingCmd, CalendarArgs, Cli, Command, InvoiceCmd, OutputFormat, RecordCmd,
    SettingsCmd, TenantCmd,
};

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("CHARTERDESK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;

    match cli.command {
        Command::Tenant(args) => handle_tenant(args.cmd, &paths, &mut cfg, &cfg_path),
        cmd => {
            let (db, _db_path) = Db::open(&paths, &cfg.current_tenant)?;
            match cmd {
                Command::Booking(args) => handle_booking(&db, args.cmd),
                Command::Calendar(args) => handle_calendar(&db, args),
                Command::Settings(args) => handle_settings(&db, args.cmd),
                Command::Record(args) => handle_record(&db, args.cmd),
                Command::Bank(args) => handle_bank(&db, &cfg, args.cmd),
                Command::Invoice(args) => handle_invoice(&db, args.cmd),
                Command::Revenue(args) => {
                    let as_of = match args.as_of.as_deref() {
                        Some(raw) => parse_date(raw, "--as-of")?,
                        None => now_utc().date_naive(),
                    };
                    print_revenue(&db, as_of)
                }
                Command::Gl(args) => {
                    let month = args.month.as_deref().map(parse_month).transpose()?;
                    print_gl(&db, month)
                }
                Command::Tenant(_) => unreachable!(),
            }
        }
    }
}

fn handle_tenant(
    cmd: TenantCmd,
    paths: &AppPaths,
    cfg: &mut AppConfig,
    cfg_path: &std::path::Path,
) -> Result<()> {
    match cmd {
        TenantCmd::Check => {
            println!("{}", cfg.current_tenant);
            Ok(())
        }
        TenantCmd::Add { name } => {
            let (_db, db_path) = Db::open(paths, &name)?;
            println!("Created tenant '{}' at {}", name, db_path.display());
            Ok(())
        }
        TenantCmd::Checkout { name } => {
            Db::open(paths, &name)?;
            cfg.current_tenant = name.clone();
            write_config(cfg_path, cfg)?;
            println!("Switched to tenant '{name}'.");
            Ok(())
        }
        TenantCmd::List => {
            let dir = paths.data_dir.join("tenants");
            let mut names = Vec::new();
            if dir.exists() {
                for entry in fs::read_dir(&dir)
                    .with_context(|| format!("Failed to read {}", dir.display()))?
                {
                    let entry = entry?;
                    if entry.file_type()?.is_dir() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
            }
            names.sort();
            let current = tenant_slug(&cfg.current_tenant);
            for name in names {
                let marker = if name == current { "*" } else { " " };
                println!("{marker} {name}");
            }
            Ok(())
        }
    }
}

fn handle_booking(db: &Db, cmd: BookingCmd) -> Result<()> {
    match cmd {
        BookingCmd::Add {
            from,
            to,
            resource,
            status,
            label,
        } => {
            let date_from = parse_date(&from, "--from")?;
            let date_to = parse_date(&to, "--to")?;
            if date_from > date_to {
                return Err(anyhow!(
                    "Booking ends before it starts ({date_from} > {date_to})"
                ));
            }
            let resource = resource
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("external"));

            let booking = Booking {
                id: Uuid::new_v4(),
                date_from,
                date_to,
                resource,
                status,
                label,
            };
            db.insert_booking(&booking)?;
            println!("Added booking {}", booking.id);
            Ok(())
        }
        BookingCmd::List { month } => {
            let bookings = match month.as_deref() {
                Some(raw) => {
                    let (y, m) = parse_month(raw)?;
                    let (first, last) = month_bounds(y, m)?;
                    db.list_bookings_between(first, last)?
                }
                None => db.list_bookings()?,
            };
            if bookings.is_empty() {
                println!("(no bookings)");
                return Ok(());
            }
            println!("id\tfrom\tto\tresource\tstatus\tlabel");
            for b in bookings {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    b.id,
                    b.date_from,
                    b.date_to,
                    b.resource_key(),
                    b.status,
                    b.label
                );
            }
            Ok(())
        }
        BookingCmd::Rm { id } => {
            let id = db.resolve_id(IdKind::Booking, &id)?;
            db.delete_booking(id)?;
            println!("Removed booking {id}");
            Ok(())
        }
    }
}

fn handle_calendar(db: &Db, args: CalendarArgs) -> Result<()> {
    let (year, month) = match args.month.as_deref() {
        Some(raw) => parse_month(raw)?,
        None => {
            let today = now_utc().date_naive();
            (today.year(), today.month())
        }
    };
    let (first, last) = month_bounds(year, month)?;
    let bookings = db.list_bookings_between(first, last)?;
    let filter = ResourceFilter::parse(args.resource.as_deref());
    let layout = layout_month(year, month, &bookings, &filter)?;

    match args.format {
        OutputFormat::Text => {
            let settings = db.load_settings()?;
            print!("{}", render_text(&layout, &settings));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&layout)?);
        }
    }
    Ok(())
}

fn handle_settings(db: &Db, cmd: SettingsCmd) -> Result<()> {
    let mut settings = db.load_settings()?;
    match cmd {
        SettingsCmd::Show => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        SettingsCmd::Color { resource, color } => {
            println!("Set color for '{resource}' to {color}.");
            settings.resource_colors.insert(resource, color);
        }
        SettingsCmd::ExternalColor { color } => {
            println!("Set color for external bookings to {color}.");
            settings.external_color = color;
        }
        SettingsCmd::Banner { path, clear } => {
            if clear {
                settings.banner_image = None;
                println!("Cleared calendar banner.");
            } else {
                let Some(path) = path else {
                    return Err(anyhow!("settings banner expects a path or --clear"));
                };
                println!("Set calendar banner to {path}.");
                settings.banner_image = Some(path);
            }
        }
    }
    db.save_settings(&settings)
}

fn handle_record(db: &Db, cmd: RecordCmd) -> Result<()> {
    match cmd {
        RecordCmd::Add {
            kind,
            amount,
            currency,
            date,
            counterparty,
            description,
            reference,
            category,
        } => {
            let amount = parse_amount(&amount, "Record amount")?;
            let record = LedgerRecord {
                id: Uuid::new_v4(),
                kind,
                amount,
                currency: currency.to_ascii_uppercase(),
                date: parse_date(&date, "--date")?,
                counterparty,
                description,
                reference,
                category,
            };
            db.insert_record(&record)?;
            println!("Added {} {}", record.kind, record.id);
            Ok(())
        }
        RecordCmd::List { kind } => {
            let records = db.list_records(kind)?;
            if records.is_empty() {
                println!("(no records)");
                return Ok(());
            }
            println!("id\tkind\tdate\tamount\tcurrency\tcounterparty\tcategory\tdescription");
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    r.id,
                    r.kind,
                    r.date,
                    r.amount,
                    r.currency,
                    r.counterparty.as_deref().unwrap_or(""),
                    r.category.as_deref().unwrap_or(""),
                    r.description
                );
            }
            Ok(())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImportedLine {
    amount: Decimal,
    currency: String,
    transaction_date: NaiveDate,
    #[serde(default)]
    value_date: Option<NaiveDate>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    balance: Option<Decimal>,
}

fn handle_bank(db: &Db, cfg: &AppConfig, cmd: BankCmd) -> Result<()> {
    let tuning = &cfg.match_tuning;
    match cmd {
        BankCmd::Import { file, source } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let source = source.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "import".to_string())
            });
            let imported_at = now_utc();

            let mut parsed = Vec::new();
            for (idx, text) in raw.lines().enumerate() {
                if text.trim().is_empty() {
                    continue;
                }
                let row: ImportedLine = serde_json::from_str(text)
                    .with_context(|| format!("{}:{}: invalid statement line", file.display(), idx + 1))?;
                if row.amount.abs() > MAX_AMOUNT {
                    return Err(anyhow!(
                        "{}:{}: amount {} exceeds {MAX_AMOUNT}",
                        file.display(),
                        idx + 1,
                        row.amount
                    ));
                }
                parsed.push(BankFeedLine {
                    id: Uuid::new_v4(),
                    amount: row.amount,
                    currency: row.currency.to_ascii_uppercase(),
                    transaction_date: row.transaction_date,
                    value_date: row.value_date,
                    description: row.description,
                    reference: row.reference,
                    balance: row.balance,
                    import: ImportMeta {
                        source: source.clone(),
                        imported_by: cfg.operator.clone(),
                        imported_at,
                    },
                    matched_amount: Decimal::ZERO,
                    matches: Vec::new(),
                    ignored: None,
                    notes: None,
                });
            }
            db.insert_bank_lines(&parsed)?;
            println!("Imported {} lines from {}", parsed.len(), source);
            Ok(())
        }
        BankCmd::Lines { open } => {
            let lines: Vec<_> = db
                .list_bank_lines()?
                .into_iter()
                .filter(|l| !open || (!l.is_ignored() && !l.is_fully_matched()))
                .collect();
            if lines.is_empty() {
                println!("(no statement lines)");
                return Ok(());
            }
            println!("id\tdate\tamount\tcurrency\tmatched\tremaining\tstatus\tdescription");
            for l in lines {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    l.id,
                    l.transaction_date,
                    l.amount,
                    l.currency,
                    l.matched_amount,
                    l.remaining(),
                    line_status(&l),
                    l.description
                );
            }
            Ok(())
        }
        BankCmd::Show { line } => {
            let line = load_line(db, &line)?;
            println!("line\t{}", line.id);
            println!("date\t{}", line.transaction_date);
            if let Some(v) = line.value_date {
                println!("value_date\t{v}");
            }
            println!("amount\t{}\t{}", line.amount, line.currency);
            println!("description\t{}", line.description);
            if let Some(r) = line.reference.as_deref() {
                println!("reference\t{r}");
            }
            if let Some(b) = line.balance {
                println!("balance\t{b}");
            }
            println!(
                "imported\t{}\t{}\t{}",
                line.import.source,
                line.import.imported_by,
                line.import.imported_at.to_rfc3339()
            );
            if let Some(ign) = &line.ignored {
                println!("ignored\t{}\t{}\t{}", ign.at.to_rfc3339(), ign.by, ign.reason);
            }
            println!("status\t{}", line_status(&line));
            println!("{}", progress_bar(&line));
            println!("remaining\t{}\t{}", line.currency, line.remaining());
            if !line.matches.is_empty() {
                println!("match\tkind\trecord\tamount\tmethod\tby");
                for m in &line.matches {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        m.id,
                        m.record_type,
                        m.record_id,
                        m.matched_amount,
                        m.method.as_str(),
                        m.matched_by
                    );
                }
            }
            Ok(())
        }
        BankCmd::Suggest {
            line,
            limit,
            format,
        } => {
            let line = load_line(db, &line)?;
            let records = db.list_records(None)?;
            let mut suggestions = suggest_matches(&line, &records, tuning);
            suggestions.truncate(limit);

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&suggestions)?);
                }
                OutputFormat::Text => {
                    if suggestions.is_empty() {
                        println!("(no suggestions)");
                        return Ok(());
                    }
                    println!("score\tconfidence\tkind\trecord\tamount\tdate\tcounterparty\treasons");
                    for s in &suggestions {
                        let reasons: Vec<&str> =
                            s.match_reasons.iter().map(|r| r.as_str()).collect();
                        println!(
                            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                            s.match_score,
                            s.confidence(tuning).as_str(),
                            s.record_type,
                            s.record_id,
                            s.amount,
                            s.date,
                            s.counterparty.as_deref().unwrap_or(""),
                            reasons.join(",")
                        );
                    }
                }
            }
            Ok(())
        }
        BankCmd::Accept { line, record } => {
            let mut line = load_line(db, &line)?;
            let record = load_record(db, &record)?;
            let Some(suggestion) = score_candidate(&line, &record, tuning) else {
                return Err(anyhow!(
                    "{} {} is not a suggested match for line {}; use `bank match` to match it manually",
                    record.kind,
                    record.id,
                    line.id
                ));
            };
            warn_if_matched_elsewhere(db, record.id, line.id)?;
            let m = line.accept_suggestion(&suggestion, &cfg.operator, now_utc())?;
            db.save_line_state(&line)?;
            println!(
                "Matched {} {} to {} {} (score {}). Remaining {} {}.",
                m.matched_amount,
                line.currency,
                m.record_type,
                m.record_id,
                suggestion.match_score,
                line.remaining(),
                line.currency
            );
            Ok(())
        }
        BankCmd::Match {
            line,
            record,
            amount,
        } => {
            let mut line = load_line(db, &line)?;
            let record = load_record(db, &record)?;
            if !record.currency.eq_ignore_ascii_case(&line.currency) {
                return Err(anyhow!(
                    "Currency mismatch: line is {}, record is {}",
                    line.currency,
                    record.currency
                ));
            }
            let amount = parse_decimal(&amount, "amount")?;
            warn_if_matched_elsewhere(db, record.id, line.id)?;
            let m = line.create_match(
                NewMatch {
                    record_type: record.kind,
                    record_id: record.id,
                    amount,
                },
                &cfg.operator,
                now_utc(),
            )?;
            db.save_line_state(&line)?;
            println!(
                "Matched {} {} to {} {} (match {}). Remaining {} {}.",
                m.matched_amount,
                line.currency,
                m.record_type,
                m.record_id,
                m.id,
                line.remaining(),
                line.currency
            );
            Ok(())
        }
        BankCmd::Unmatch { line, match_id } => {
            let mut line = load_line(db, &line)?;
            let match_id = db.resolve_id(IdKind::BankMatch, &match_id)?;
            let removed = line.remove_match(match_id)?;
            db.save_line_state(&line)?;
            println!(
                "Removed match {} ({} {}). Remaining {} {}.",
                removed.id,
                removed.matched_amount,
                line.currency,
                line.remaining(),
                line.currency
            );
            Ok(())
        }
        BankCmd::Ignore { line, reason } => {
            let mut line = load_line(db, &line)?;
            line.ignore(&cfg.operator, &reason, now_utc())?;
            db.save_line_state(&line)?;
            println!("Ignored line {}.", line.id);
            Ok(())
        }
        BankCmd::New { line, kind } => {
            let line = load_line(db, &line)?;
            if line.is_ignored() {
                return Err(anyhow!("Line {} is ignored", line.id));
            }
            let draft = line.draft_record(kind);
            println!("{}", serde_json::to_string_pretty(&draft)?);
            Ok(())
        }
    }
}

fn line_status(line: &BankFeedLine) -> &'static str {
    if line.is_ignored() {
        "ignored"
    } else if line.is_fully_matched() {
        "matched"
    } else if line.matches.is_empty() {
        "open"
    } else {
        "partial"
    }
}

fn load_line(db: &Db, raw: &str) -> Result<BankFeedLine> {
    let id = db.resolve_id(IdKind::BankLine, raw)?;
    db.get_bank_line(id)?
        .ok_or_else(|| anyhow!("No such statement line: {id}"))
}

fn load_record(db: &Db, raw: &str) -> Result<LedgerRecord> {
    let id = db.resolve_id(IdKind::Record, raw)?;
    db.get_record(id)?
        .ok_or_else(|| anyhow!("No such record: {id}"))
}

fn warn_if_matched_elsewhere(db: &Db, record_id: Uuid, line_id: Uuid) -> Result<()> {
    let others = db.lines_matching_record(record_id, line_id)?;
    if !others.is_empty() {
        warn!(record = %record_id, lines = ?others, "record is already matched on other statement lines");
    }
    Ok(())
}

fn handle_invoice(db: &Db, cmd: InvoiceCmd) -> Result<()> {
    match cmd {
        InvoiceCmd::Add {
            amount,
            currency,
            issued,
            charter_from,
            charter_to,
            category,
            number,
        } => {
            let amount = parse_amount(&amount, "Invoice amount")?;
            let charter_from = charter_from
                .as_deref()
                .map(|d| parse_date(d, "--charter-from"))
                .transpose()?;
            let charter_to = charter_to
                .as_deref()
                .map(|d| parse_date(d, "--charter-to"))
                .transpose()?;
            if let (Some(f), Some(t)) = (charter_from, charter_to) {
                if f > t {
                    return Err(anyhow!("Charter ends before it starts ({f} > {t})"));
                }
            }
            let invoice = Invoice {
                id: Uuid::new_v4(),
                number,
                amount,
                currency: currency.to_ascii_uppercase(),
                issued: parse_date(&issued, "--issued")?,
                charter_from,
                charter_to,
                category,
            };
            db.insert_invoice(&invoice)?;
            println!("Added invoice {}", invoice.id);
            Ok(())
        }
        InvoiceCmd::List => {
            let invoices = db.list_invoices()?;
            if invoices.is_empty() {
                println!("(no invoices)");
                return Ok(());
            }
            println!("id\tnumber\tissued\tamount\tcurrency\tcharter\tcategory");
            for inv in invoices {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    inv.id,
                    inv.number.as_deref().unwrap_or(""),
                    inv.issued,
                    inv.amount,
                    inv.currency,
                    charter_display(&inv),
                    inv.category.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}

fn charter_display(inv: &Invoice) -> String {
    match (inv.charter_from, inv.charter_to) {
        (Some(f), Some(t)) => format!("{f}..{t}"),
        _ => "-".to_string(),
    }
}

fn print_revenue(db: &Db, as_of: NaiveDate) -> Result<()> {
    let invoices = db.list_invoices()?;
    if invoices.is_empty() {
        println!("(no invoices)");
        return Ok(());
    }
    println!("invoice\tnumber\tcharter\tstatus\tcurrency\tamount\trecognized\tdeferred");
    for inv in invoices {
        let status = recognition_status(&inv, as_of)?;
        let (recognized, deferred) = status.split(inv.amount);
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            inv.id,
            inv.number.as_deref().unwrap_or(""),
            charter_display(&inv),
            status.label(),
            inv.currency,
            inv.amount,
            recognized,
            deferred
        );
    }
    Ok(())
}

fn print_gl(db: &Db, month: Option<(i32, u32)>) -> Result<()> {
    let range = month.map(|(y, m)| month_bounds(y, m)).transpose()?;
    let in_range = |d: NaiveDate| match range {
        Some((first, last)) => d >= first && d <= last,
        None => true,
    };

    let mut lines: Vec<DocumentLine> = db
        .list_invoices()?
        .iter()
        .map(DocumentLine::from_invoice)
        .collect();
    lines.extend(db.list_records(None)?.iter().filter_map(DocumentLine::from_record));
    lines.retain(|l| in_range(l.fields().date));

    let totals = categorize(&lines)?;
    if totals.is_empty() {
        println!("(no entries)");
        return Ok(());
    }
    println!("category\tcurrency\tincome\texpense\tnet");
    for ((category, currency), t) in totals {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            category,
            currency,
            t.income,
            t.expense,
            t.net()
        );
    }
    Ok(())
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid {field}: {raw}"))
}

/// 100 000 000 000, the largest amount accepted by hand or from an import.
const MAX_AMOUNT: Decimal = Decimal::from_parts(1_215_752_192, 23, 0, false, 0);

fn parse_amount(raw: &str, field: &str) -> Result<Decimal> {
    let amount = parse_decimal(raw, field)?;
    if amount <= Decimal::ZERO {
        return Err(anyhow!("{field} must be > 0"));
    }
    if amount > MAX_AMOUNT {
        return Err(anyhow!("{field} must not exceed {MAX_AMOUNT}"));
    }
    Ok(amount)
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid {field} (expected YYYY-MM-DD): {raw}"))
}

fn parse_month(raw: &str) -> Result<(i32, u32)> {
    let invalid = || anyhow!("Invalid month (expected YYYY-MM): {raw}");
    let (y, m) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let year = y.parse::<i32>().map_err(|_| invalid())?;
    let month = m.parse::<u32>().map_err(|_| invalid())?;
    month_bounds(year, month)?;
    Ok((year, month))
}
