use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "quitus", version, about = "Payment reconciliation and bank receipt retrieval")]
struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(short, long, global = true, default_value = "quitus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the payment table to the fund registry and write ok/pending tables
    Reconcile {
        /// User payment table (csv, txt, xlsx, xls, ods)
        #[arg(long)]
        user: PathBuf,
        /// Fund registry table
        #[arg(long)]
        reference: PathBuf,
        /// Output directory
        #[arg(long)]
        out: PathBuf,
        /// Payment date for every row, overriding the config
        #[arg(long)]
        date: Option<String>,
        /// Also write spreadsheet copies
        #[arg(long)]
        xlsx: bool,
    },
    /// Retrieve receipts for a list of payment ids
    Fetch {
        /// File with one payment id per line
        #[arg(long)]
        payments: PathBuf,
        /// Directory for downloaded receipts
        #[arg(long)]
        out: PathBuf,
    },
    /// Pair downloaded receipts with workflow cards
    Match {
        /// Card export with id, title and amount columns
        #[arg(long)]
        records: PathBuf,
        /// Directory holding the receipts
        #[arg(long)]
        receipts: PathBuf,
        /// JSON-lines manifest to write
        #[arg(long)]
        manifest: PathBuf,
    },
    /// List receipts the bank has for a date range
    Receipts {
        /// Start date (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        from: String,
        /// End date (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Reconcile {
            user,
            reference,
            out,
            date,
            xlsx,
        } => commands::reconcile(&config, &user, &reference, &out, date, xlsx),
        Commands::Fetch { payments, out } => commands::fetch(&config, &payments, &out).await,
        Commands::Match {
            records,
            receipts,
            manifest,
        } => commands::match_receipts(&config, &records, &receipts, &manifest),
        Commands::Receipts { from, to } => commands::list_receipts(&config, &from, &to).await,
    }
}
