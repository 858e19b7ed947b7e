use charterdesk::domain::{BookingStatus, SystemRecordType};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "charterdesk")]
#[command(about = "Back-office toolkit for yacht charter operations", long_about = None)]
pub struct Cli {
    /// Override Charterdesk home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "CHARTERDESK_HOME")]
    pub home: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Tenant(TenantArgs),
    Booking(BookingArgs),
    Calendar(CalendarArgs),
    Settings(SettingsArgs),
    Record(RecordArgs),
    Bank(BankArgs),
    Invoice(InvoiceArgs),
    Revenue(RevenueArgs),
    Gl(GlArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum TenantCmd {
    Check,
    Add { name: String },
    Checkout { name: String },
    List,
}

#[derive(Debug, Args)]
pub struct TenantArgs {
    #[command(subcommand)]
    pub cmd: TenantCmd,
}

#[derive(Debug, Subcommand)]
pub enum BookingCmd {
    Add {
        /// First day (YYYY-MM-DD).
        #[arg(long)]
        from: String,
        /// Last day, inclusive (YYYY-MM-DD).
        #[arg(long)]
        to: String,
        /// Boat/project id. Omit for an external booking.
        #[arg(long)]
        resource: Option<String>,
        #[arg(long, default_value = "booked")]
        status: BookingStatus,
        #[arg(long, default_value = "")]
        label: String,
    },
    List {
        #[arg(long)]
        month: Option<String>,
    },
    Rm {
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct BookingArgs {
    #[command(subcommand)]
    pub cmd: BookingCmd,
}

#[derive(Debug, Args)]
pub struct CalendarArgs {
    /// YYYY-MM; defaults to the current month.
    #[arg(long)]
    pub month: Option<String>,

    /// Only show one boat, or `external`.
    #[arg(long)]
    pub resource: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCmd {
    Show,
    Color {
        resource: String,
        color: String,
    },
    ExternalColor {
        color: String,
    },
    Banner {
        path: Option<String>,
        #[arg(long, conflicts_with = "path")]
        clear: bool,
    },
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub cmd: SettingsCmd,
}

#[derive(Debug, Subcommand)]
pub enum RecordCmd {
    Add {
        kind: SystemRecordType,
        amount: String,
        currency: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        counterparty: Option<String>,
        #[arg(long, short = 'm', default_value = "")]
        description: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    List {
        #[arg(long)]
        kind: Option<SystemRecordType>,
    },
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    pub cmd: RecordCmd,
}

#[derive(Debug, Subcommand)]
pub enum BankCmd {
    /// Import statement lines from a JSON Lines file.
    Import {
        file: std::path::PathBuf,
        #[arg(long)]
        source: Option<String>,
    },
    Lines {
        /// Only lines that still need work.
        #[arg(long)]
        open: bool,
    },
    Show {
        line: String,
    },
    Suggest {
        line: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Accept the suggestion for a record.
    Accept {
        line: String,
        record: String,
    },
    /// Manually match part of a line to a record.
    Match {
        line: String,
        record: String,
        amount: String,
    },
    Unmatch {
        line: String,
        #[arg(value_name = "MATCH")]
        match_id: String,
    },
    Ignore {
        line: String,
        #[arg(long)]
        reason: String,
    },
    /// Print a new record pre-filled from the line.
    New {
        line: String,
        kind: Option<SystemRecordType>,
    },
}

#[derive(Debug, Args)]
pub struct BankArgs {
    #[command(subcommand)]
    pub cmd: BankCmd,
}

#[derive(Debug, Subcommand)]
pub enum InvoiceCmd {
    Add {
        amount: String,
        currency: String,
        #[arg(long)]
        issued: String,
        #[arg(long, requires = "charter_to")]
        charter_from: Option<String>,
        #[arg(long, requires = "charter_from")]
        charter_to: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        number: Option<String>,
    },
    List,
}

#[derive(Debug, Args)]
pub struct InvoiceArgs {
    #[command(subcommand)]
    pub cmd: InvoiceCmd,
}

#[derive(Debug, Args)]
pub struct RevenueArgs {
    /// YYYY-MM-DD; defaults to today.
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Debug, Args)]
pub struct GlArgs {
    #[arg(long)]
    pub month: Option<String>,
}
