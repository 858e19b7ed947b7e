use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn charterdesk_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("charterdesk"))
}

fn run_ok_out(home: &tempfile::TempDir, args: &[&str]) -> String {
    let mut cmd = charterdesk_cmd();
    cmd.env("CHARTERDESK_HOME", home.path());
    cmd.args(args);
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).expect("utf8 stdout")
}

fn run_fail_err(home: &tempfile::TempDir, args: &[&str]) -> String {
    let mut cmd = charterdesk_cmd();
    cmd.env("CHARTERDESK_HOME", home.path());
    cmd.args(args);
    let out = cmd.assert().failure().get_output().stderr.clone();
    String::from_utf8(out).expect("utf8 stderr")
}

fn last_token(out: &str) -> String {
    out.trim().rsplit(' ').next().expect("token").to_string()
}

/// Rows of a TSV listing, header dropped.
fn rows(out: &str) -> Vec<Vec<String>> {
    out.lines()
        .skip(1)
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

struct Fixture {
    home: tempfile::TempDir,
    marina_line: String,
    deposit_line: String,
    marina_expense: String,
    fuel_expense: String,
    deposit_receipt: String,
}

fn fixture() -> Fixture {
    let home = tempfile::tempdir().expect("tempdir");

    let statement = home.path().join("june.jsonl");
    std::fs::write(
        &statement,
        concat!(
            r#"{"amount":"-1000.00","currency":"EUR","transaction_date":"2025-06-10","description":"SEPA DEBIT MARINA PORTO MONTENEGRO INV-2041","balance":"4000.00"}"#,
            "\n",
            "\n",
            r#"{"amount":"2500","currency":"eur","transaction_date":"2025-06-11","value_date":"2025-06-12","description":"CHARTER DEPOSIT SMITH","reference":"BK-77"}"#,
            "\n",
        ),
    )
    .expect("write statement");

    let out = run_ok_out(
        &home,
        &["bank", "import", statement.to_str().expect("path"), "--source", "erste"],
    );
    assert!(out.contains("Imported 2 lines from erste"));

    let marina_expense = last_token(&run_ok_out(
        &home,
        &[
            "record",
            "add",
            "expense",
            "1000",
            "EUR",
            "--date",
            "2025-06-10",
            "--counterparty",
            "Marina Porto Montenegro",
            "--reference",
            "INV-2041",
            "--category",
            "berths",
        ],
    ));
    let fuel_expense = last_token(&run_ok_out(
        &home,
        &[
            "record",
            "add",
            "expense",
            "400",
            "EUR",
            "--date",
            "2025-06-09",
            "--counterparty",
            "Fuel Station",
        ],
    ));
    let deposit_receipt = last_token(&run_ok_out(
        &home,
        &[
            "record",
            "add",
            "receipt",
            "2500",
            "EUR",
            "--date",
            "2025-06-11",
            "--reference",
            "BK-77",
        ],
    ));

    let lines = rows(&run_ok_out(&home, &["bank", "lines"]));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0][6], "open");

    Fixture {
        marina_line: lines[0][0].clone(),
        deposit_line: lines[1][0].clone(),
        home,
        marina_expense,
        fuel_expense,
        deposit_receipt,
    }
}

#[test]
fn suggestions_rank_the_obvious_record_first() {
    let f = fixture();
    let out = run_ok_out(&f.home, &["bank", "suggest", &f.marina_line]);
    let found = rows(&out);
    assert_eq!(found.len(), 2);
    assert_eq!(found[0][0], "100");
    assert_eq!(found[0][1], "high");
    assert_eq!(found[0][3], f.marina_expense);
    assert_eq!(
        found[0][7],
        "amount_exact,date_exact,counterparty_similar,reference_match"
    );
    assert_eq!(found[1][3], f.fuel_expense);
    assert_eq!(found[1][1], "low");

    // Receipts never show up for an outflow.
    assert!(!out.contains(&f.deposit_receipt));

    let json = run_ok_out(
        &f.home,
        &["bank", "suggest", &f.deposit_line, "--format", "json"],
    );
    let v: serde_json::Value = serde_json::from_str(&json).expect("json");
    assert_eq!(v[0]["record_id"], f.deposit_receipt.as_str());
    assert_eq!(v[0]["record_type"], "receipt");
}

#[test]
fn accept_then_unmatch_reopens_the_line() {
    let f = fixture();

    let out = run_ok_out(&f.home, &["bank", "accept", &f.marina_line, &f.marina_expense]);
    assert!(out.contains("(score 100)"));

    let show = run_ok_out(&f.home, &["bank", "show", &f.marina_line]);
    assert!(show.contains("status\tmatched"));
    assert!(show.contains("[==========] 100%"));
    assert!(show.contains("suggested_accepted"));
    let match_id = show
        .lines()
        .skip_while(|l| !l.starts_with("match\t"))
        .nth(1)
        .and_then(|l| l.split('\t').next())
        .expect("match row")
        .to_string();

    let open = run_ok_out(&f.home, &["bank", "lines", "--open"]);
    assert!(!open.contains(&f.marina_line));
    assert!(run_ok_out(&f.home, &["bank", "suggest", &f.marina_line]).contains("(no suggestions)"));

    run_ok_out(&f.home, &["bank", "unmatch", &f.marina_line, &match_id]);
    let show = run_ok_out(&f.home, &["bank", "show", &f.marina_line]);
    assert!(show.contains("status\topen"));
    assert!(show.contains("[----------] 0%"));

    // The expense itself is untouched.
    let records = run_ok_out(&f.home, &["record", "list", "--kind", "expense"]);
    assert!(records.contains(&f.marina_expense));
}

#[test]
fn manual_split_matches_respect_the_line_amount() {
    let f = fixture();

    let err = run_fail_err(
        &f.home,
        &["bank", "match", &f.marina_line, &f.fuel_expense, "1500"],
    );
    assert!(err.contains("exceeds the remaining unmatched amount"));

    run_ok_out(&f.home, &["bank", "match", &f.marina_line, &f.fuel_expense, "400"]);
    let show = run_ok_out(&f.home, &["bank", "show", &f.marina_line]);
    assert!(show.contains("status\tpartial"));
    assert!(show.contains("[====------] 40%"));

    let err = run_fail_err(
        &f.home,
        &["bank", "match", &f.marina_line, &f.fuel_expense, "100"],
    );
    assert!(err.contains("already matched on this statement line"));

    // The remaining 600 is now what the exact-amount check looks at.
    let out = run_ok_out(&f.home, &["bank", "accept", &f.marina_line, &f.marina_expense]);
    assert!(out.contains("Matched 600"));
    let lines = rows(&run_ok_out(&f.home, &["bank", "lines"]));
    assert_eq!(lines[0][6], "matched");
}

#[test]
fn ignored_lines_leave_the_open_queue() {
    let f = fixture();
    run_ok_out(
        &f.home,
        &["bank", "ignore", &f.deposit_line, "--reason", "duplicate feed"],
    );

    let lines = rows(&run_ok_out(&f.home, &["bank", "lines"]));
    assert_eq!(lines[1][6], "ignored");
    let open = run_ok_out(&f.home, &["bank", "lines", "--open"]);
    assert!(!open.contains(&f.deposit_line));

    let err = run_fail_err(
        &f.home,
        &["bank", "accept", &f.deposit_line, &f.deposit_receipt],
    );
    assert!(err.contains("is ignored"));
}

#[test]
fn new_record_draft_is_prefilled_from_the_line() {
    let f = fixture();
    let out = run_ok_out(&f.home, &["bank", "new", &f.deposit_line]);
    let v: serde_json::Value = serde_json::from_str(&out).expect("json");
    assert_eq!(v["kind"], "receipt");
    assert_eq!(v["currency"], "EUR");
    assert_eq!(v["date"], "2025-06-12");
    assert_eq!(v["reference"], "BK-77");
    assert_eq!(v["source_line"], f.deposit_line.as_str());

    let out = run_ok_out(&f.home, &["bank", "new", &f.marina_line, "transfer"]);
    let v: serde_json::Value = serde_json::from_str(&out).expect("json");
    assert_eq!(v["kind"], "transfer");
}

#[test]
fn unknown_line_id_is_reported() {
    let f = fixture();
    let mut cmd = charterdesk_cmd();
    cmd.env("CHARTERDESK_HOME", f.home.path());
    cmd.args(["bank", "show", "zzzz"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No statement line matching 'zzzz'"));
}

#[test]
fn records_in_another_currency_cannot_be_matched() {
    let f = fixture();
    let usd = last_token(&run_ok_out(
        &f.home,
        &["record", "add", "expense", "50", "usd", "--date", "2025-06-10"],
    ));
    let err = run_fail_err(&f.home, &["bank", "match", &f.marina_line, &usd, "50"]);
    assert!(err.contains("Currency mismatch: line is EUR, record is USD"));
}

#[test]
fn record_matched_on_two_lines_is_flagged_but_allowed() {
    let f = fixture();
    run_ok_out(&f.home, &["bank", "match", &f.marina_line, &f.fuel_expense, "100"]);

    let mut cmd = charterdesk_cmd();
    cmd.env("CHARTERDESK_HOME", f.home.path());
    cmd.env("CHARTERDESK_LOG", "warn");
    cmd.args(["bank", "match", &f.deposit_line, &f.fuel_expense, "100"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Matched 100 EUR to expense"))
        .stderr(predicate::str::contains(
            "record is already matched on other statement lines",
        ))
        .stderr(predicate::str::contains(f.marina_line.as_str()));

    let mut quiet = charterdesk_cmd();
    quiet.env("CHARTERDESK_HOME", f.home.path());
    quiet.env("CHARTERDESK_LOG", "error");
    quiet.args(["bank", "show", &f.deposit_line]);
    quiet
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}
