use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::application::{DepositRequest, EntryFilter, LedgerService};
use crate::config::Settings;
use crate::domain::{
    Amount, FundCategory, FundEntry, FundStatus, Settlement, format_amount, parse_amount,
};

/// Titipan - Client Trust-Fund Ledger
#[derive(Parser)]
#[command(name = "titipan")]
#[command(about = "Track deposits held on behalf of borrowers until they are settled or returned")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides configuration)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Configuration file (defaults to ./titipan.toml if present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Name recorded as the actor of changes (overrides configuration)
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Contract management commands
    #[command(subcommand)]
    Contract(ContractCommands),

    /// Record a deposit held for a contract
    Deposit {
        /// Contract number
        contract: String,

        /// Category: notary, insurance, installment
        #[arg(short, long)]
        category: String,

        /// Amount deposited (e.g., "1500000" or "1,500,000.00")
        amount: String,

        /// Free-text note
        #[arg(short, long)]
        note: Option<String>,

        /// Deposit date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Settle a fund entry (pay it out to the third party)
    Settle {
        /// Fund entry ID
        id: String,

        /// Amount paid; only insurance entries use it
        #[arg(short, long)]
        amount: Option<String>,

        /// Insurance policy number
        #[arg(long)]
        policy: Option<String>,

        /// Insurance proof-of-payment number
        #[arg(long)]
        proof: Option<String>,

        /// Notary deed number
        #[arg(long)]
        deed: Option<String>,

        /// Settlement date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Attach a deed number to a notary entry
    #[command(name = "attach-ref")]
    AttachRef {
        /// Fund entry ID
        id: String,

        /// Deed number
        deed: String,
    },

    /// Return an unsettled deposit to the customer
    Return {
        /// Fund entry ID
        id: String,

        /// Why the funds are returned
        #[arg(short, long)]
        reason: String,
    },

    /// Show the outstanding balance of a contract
    Balance {
        /// Contract number
        contract: String,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show every entry of a contract, newest deposit first
    History {
        /// Contract number
        contract: String,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// List fund entries with filters
    List {
        /// Filter by contract number
        #[arg(long)]
        contract: Option<String>,

        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,

        /// Filter by status: unpaid, partially_settled, fully_settled, returned
        #[arg(short, long)]
        status: Option<String>,

        /// Search contract, debtor, note, creator and reference numbers
        #[arg(long)]
        search: Option<String>,

        /// Page number (starting at 1)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Entries per page (defaults to configuration)
        #[arg(long)]
        per_page: Option<u32>,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show the change history of one entry
    Events {
        /// Fund entry ID
        id: String,
    },

    /// Administratively remove an entry (kept in the audit trail)
    Delete {
        /// Fund entry ID
        id: String,

        /// Why the entry is removed
        #[arg(short, long)]
        reason: String,
    },

    /// Verify ledger integrity
    Check,

    /// Export all live entries (csv) or contracts and entries (json)
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: json, csv
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
}

#[derive(Subcommand)]
pub enum ContractCommands {
    /// Register a loan contract
    Register {
        /// Contract number (must be unique)
        number: String,

        /// Borrower name
        #[arg(long)]
        debtor: String,
    },

    /// List all contracts
    List,

    /// Show contract details with balance breakdown
    Show {
        /// Contract number
        number: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut settings =
            Settings::load(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(database) = self.database {
            settings.database = database;
        }
        if let Some(actor) = self.actor {
            settings.actor = actor;
        }
        init_tracing(&settings, self.verbose);

        if let Commands::Init = self.command {
            LedgerService::init(&settings.database, settings.busy_timeout()).await?;
            println!("Database initialized: {}", settings.database);
            return Ok(());
        }

        let service = LedgerService::connect(&settings.database, settings.busy_timeout())
            .await
            .with_context(|| format!("Failed to open {}. Run `titipan init` first", settings.database))?;
        let actor = settings.actor.as_str();

        match self.command {
            Commands::Init => {}

            Commands::Contract(contract_cmd) => {
                run_contract_command(&service, contract_cmd).await?;
            }

            Commands::Deposit {
                contract,
                category,
                amount,
                note,
                date,
            } => {
                let category = parse_category(&category)?;
                let amount = parse_money(&amount)?;

                let mut request = DepositRequest::new(contract, category, amount);
                if let Some(note) = note {
                    request = request.with_note(note);
                }
                if let Some(date_str) = date {
                    request = request.on(parse_date(&date_str)?);
                }

                let entry = service.create_entry(request, actor).await?;
                println!(
                    "Recorded {} deposit: {} ({})",
                    entry.category,
                    format_amount(entry.amount),
                    entry.id
                );
            }

            Commands::Settle {
                id,
                amount,
                policy,
                proof,
                deed,
                date,
            } => {
                let entry_id = parse_entry_id(&id)?;
                let amount = amount.as_deref().map(parse_money).transpose()?.unwrap_or(0);

                let mut settlement = Settlement::new(amount);
                if let Some(policy) = policy {
                    settlement = settlement.with_policy_number(policy);
                }
                if let Some(proof) = proof {
                    settlement = settlement.with_proof_of_payment(proof);
                }
                if let Some(deed) = deed {
                    settlement = settlement.with_deed_number(deed);
                }
                if let Some(date_str) = date {
                    settlement = settlement.on(parse_date(&date_str)?);
                }

                let entry = service.settle_entry(entry_id, &settlement, actor).await?;
                println!(
                    "Settled: {} of {} paid, status {}",
                    format_amount(entry.paid_amount),
                    format_amount(entry.amount),
                    entry.status_label()
                );
            }

            Commands::AttachRef { id, deed } => {
                let entry_id = parse_entry_id(&id)?;
                let entry = service.attach_reference(entry_id, &deed, actor).await?;
                println!(
                    "Attached deed {} to {}",
                    entry.references.deed_number().unwrap_or(""),
                    entry.id
                );
            }

            Commands::Return { id, reason } => {
                let entry_id = parse_entry_id(&id)?;
                let entry = service.return_entry(entry_id, &reason, actor).await?;
                println!(
                    "Returned {} to the customer ({})",
                    format_amount(entry.remaining()),
                    entry.id
                );
            }

            Commands::Balance { contract, format } => {
                run_balance_command(&service, &contract, format).await?;
            }

            Commands::History { contract, format } => {
                let history = service.get_history(&contract).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&history)?);
                    }
                    OutputFormat::Csv => {
                        let numbers = service.get_contract_numbers().await?;
                        crate::io::write_entries_csv(&history.entries, &numbers, std::io::stdout())?;
                    }
                    OutputFormat::Table => {
                        println!(
                            "Contract {} ({})",
                            history.contract.number, history.contract.debtor_name
                        );
                        print_entries(&history.entries);
                    }
                }
            }

            Commands::List {
                contract,
                category,
                status,
                search,
                page,
                per_page,
                format,
            } => {
                let filter = EntryFilter {
                    contract,
                    category: category.as_deref().map(parse_category).transpose()?,
                    status: status.as_deref().map(parse_status).transpose()?,
                    search,
                    page,
                    per_page: per_page.unwrap_or(settings.page_size),
                };
                run_list_command(&service, &filter, format).await?;
            }

            Commands::Events { id } => {
                let entry_id = parse_entry_id(&id)?;
                run_events_command(&service, entry_id).await?;
            }

            Commands::Delete { id, reason } => {
                let entry_id = parse_entry_id(&id)?;
                let entry = service.delete_entry(entry_id, &reason, actor).await?;
                println!("Deleted entry {} ({})", entry.id, format_amount(entry.amount));
            }

            Commands::Check => {
                run_check_command(&service).await?;
            }

            Commands::Export { output, format } => {
                run_export_command(&service, output.as_deref(), format).await?;
            }
        }

        Ok(())
    }
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("titipan=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter))
    };

    // A second init (e.g. in tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_contract_command(service: &LedgerService, cmd: ContractCommands) -> Result<()> {
    match cmd {
        ContractCommands::Register { number, debtor } => {
            let contract = service.register_contract(&number, &debtor).await?;
            println!("Registered contract: {} ({})", contract.number, contract.debtor_name);
        }

        ContractCommands::List => {
            let contracts = service.list_contracts().await?;
            if contracts.is_empty() {
                println!("No contracts found.");
            } else {
                println!("{:<20} {:<30} {:<12}", "NUMBER", "DEBTOR", "REGISTERED");
                println!("{}", "-".repeat(64));
                for contract in contracts {
                    println!(
                        "{:<20} {:<30} {:<12}",
                        truncate(&contract.number, 20),
                        truncate(&contract.debtor_name, 30),
                        contract.registered_at.format("%Y-%m-%d")
                    );
                }
            }
        }

        ContractCommands::Show { number } => {
            let summary = service.get_balance_summary(&number).await?;
            let contract = &summary.contract;

            println!("Contract: {}", contract.number);
            println!("  ID:          {}", contract.id);
            println!("  Debtor:      {}", contract.debtor_name);
            println!(
                "  Registered:  {}",
                contract.registered_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            print_category_balances(&summary.categories);
            println!("  Outstanding: {}", format_amount(summary.outstanding));
        }
    }
    Ok(())
}

async fn run_balance_command(
    service: &LedgerService,
    contract: &str,
    format: OutputFormat,
) -> Result<()> {
    let summary = service.get_balance_summary(contract).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(["category", "deposited", "paid", "outstanding", "open_entries"])?;
            for balance in &summary.categories {
                writer.write_record([
                    balance.category.to_string(),
                    format_amount(balance.deposited),
                    format_amount(balance.paid),
                    format_amount(balance.outstanding),
                    balance.open_entries.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            println!("{}: {}", summary.contract.number, format_amount(summary.outstanding));
            if summary.outstanding > 0 {
                print_category_balances(&summary.categories);
            }
        }
    }
    Ok(())
}

async fn run_list_command(
    service: &LedgerService,
    filter: &EntryFilter,
    format: OutputFormat,
) -> Result<()> {
    let page = service.list_entries(filter).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
        OutputFormat::Csv => {
            let numbers = service.get_contract_numbers().await?;
            crate::io::write_entries_csv(&page.items, &numbers, std::io::stdout())?;
        }
        OutputFormat::Table => {
            if page.items.is_empty() {
                println!("No fund entries found.");
                return Ok(());
            }

            let numbers = service.get_contract_numbers().await?;
            println!(
                "{:<36} {:<15} {:<12} {:>16} {:>16} {:<18}",
                "ID", "CONTRACT", "CATEGORY", "AMOUNT", "PAID", "STATUS"
            );
            println!("{}", "-".repeat(118));
            for entry in &page.items {
                let number = numbers
                    .get(&entry.contract_id)
                    .map(|s| s.as_str())
                    .unwrap_or("?");
                println!(
                    "{:<36} {:<15} {:<12} {:>16} {:>16} {:<18}",
                    entry.id,
                    truncate(number, 15),
                    entry.category,
                    format_amount(entry.amount),
                    format_amount(entry.paid_amount),
                    entry.status_label()
                );
            }
            println!();
            println!(
                "Page {} of {} ({} entries)",
                page.page,
                page.total_pages().max(1),
                page.total
            );
        }
    }
    Ok(())
}

async fn run_events_command(service: &LedgerService, entry_id: Uuid) -> Result<()> {
    let events = service.get_entry_events(entry_id).await?;

    println!("{:<20} {:<20} {:>16} {:<15} DETAILS", "DATE", "EVENT", "AMOUNT", "ACTOR");
    println!("{}", "-".repeat(90));
    for event in events {
        let mut details: Vec<String> = Vec::new();
        if let Some(policy) = &event.references.policy_number {
            details.push(format!("policy {}", policy));
        }
        if let Some(proof) = &event.references.proof_of_payment {
            details.push(format!("proof {}", proof));
        }
        if let Some(deed) = &event.references.deed_number {
            details.push(format!("deed {}", deed));
        }
        if let Some(reason) = &event.reason {
            details.push(reason.clone());
        }

        println!(
            "{:<20} {:<20} {:>16} {:<15} {}",
            event.occurred_at.format("%Y-%m-%d %H:%M:%S"),
            event.kind,
            event.amount.map(format_amount).unwrap_or_default(),
            truncate(&event.actor, 15),
            details.join(", ")
        );
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Contracts: {}", report.contract_count);
    println!("Entries:   {}", report.entry_count);
    println!();

    println!("Outstanding by category:");
    for (category, outstanding) in &report.outstanding_by_category {
        println!(
            "  {:<14} {:>16}",
            format!("{}:", category),
            format_amount(*outstanding)
        );
    }
    println!("  {}", "-".repeat(31));
    println!("  {:<14} {:>16}", "Total:", format_amount(report.total_outstanding));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    output: Option<&str>,
    format: ExportFormat,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match format {
        ExportFormat::Json => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {} contracts and {} entries",
                    snapshot.contracts.len(),
                    snapshot.entries.len()
                );
            }
        }
        ExportFormat::Csv => {
            let count = exporter.export_entries_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} entries", count);
            }
        }
    }
    Ok(())
}

fn print_entries(entries: &[FundEntry]) {
    if entries.is_empty() {
        println!("No fund entries found.");
        return;
    }

    println!(
        "{:<12} {:<12} {:>16} {:>16} {:<18} {:<36}",
        "DEPOSITED", "CATEGORY", "AMOUNT", "PAID", "STATUS", "ID"
    );
    println!("{}", "-".repeat(114));
    for entry in entries {
        println!(
            "{:<12} {:<12} {:>16} {:>16} {:<18} {:<36}",
            entry.deposited_at.format("%Y-%m-%d"),
            entry.category,
            format_amount(entry.amount),
            format_amount(entry.paid_amount),
            entry.status_label(),
            entry.id
        );
        let references = entry.references.numbers();
        if !references.is_empty() {
            println!("{:<12} refs: {}", "", references.join(", "));
        }
    }
}

fn print_category_balances(categories: &[crate::domain::CategoryBalance]) {
    println!(
        "  {:<12} {:>16} {:>16} {:>16} {:>6}",
        "CATEGORY", "DEPOSITED", "PAID", "OUTSTANDING", "OPEN"
    );
    for balance in categories {
        println!(
            "  {:<12} {:>16} {:>16} {:>16} {:>6}",
            balance.category,
            format_amount(balance.deposited),
            format_amount(balance.paid),
            format_amount(balance.outstanding),
            balance.open_entries
        );
    }
}

fn parse_category(s: &str) -> Result<FundCategory> {
    s.parse().map_err(|e| {
        anyhow::anyhow!(
            "Invalid category '{}'. Valid categories: notary, insurance, installment. Error: {}",
            s,
            e
        )
    })
}

fn parse_status(s: &str) -> Result<FundStatus> {
    s.parse()
        .map_err(|e| anyhow::anyhow!("Invalid status '{}': {}", s, e))
}

fn parse_money(s: &str) -> Result<Amount> {
    parse_amount(s).with_context(|| format!("Invalid amount '{}'. Use '1500000' or '1,500,000.00'", s))
}

fn parse_entry_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).context("Invalid fund entry ID format (expected UUID)")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    // Parse YYYY-MM-DD format
    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}
