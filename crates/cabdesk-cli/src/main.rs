// ============================================================================
// cabdesk - operator tool for the taxi booking CRM integration
// ============================================================================
// Usage:
//   cabdesk stats                             Show ledger statistics
//   cabdesk list-failed --kind bookings       List saved failed submissions
//   cabdesk retry --kind inquiries            Replay saved failed submissions
//   cabdesk clear --kind bookings             Drop saved failed submissions
//   cabdesk export --format json              Export both ledgers as JSON
//   cabdesk check-crm                         Authenticate and check CRM access
//   cabdesk sync [--watch]                    Pull the fleet (once or forever)
//   cabdesk booking-status 42                 Show a sales order's state
//   cabdesk set-availability 7 --maintenance  Flip a vehicle's fleet state
//   cabdesk create-trip 42 --driver Ram --phone 98.. --vehicle-number RJ14..
//   cabdesk quote --price 15 --method half-payment
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cabdesk_core::{
    BookingDesk, BookingQuote, CrmConfig, CrmService, DriverAssignment, FailedOperationRecord,
    FleetSync, LedgerDb, LedgerKind, PaymentMethod, RetrySummary, SyncConfig, CRM_DATETIME_FORMAT,
};

/// Cabdesk operator tool
#[derive(Parser)]
#[command(name = "cabdesk", version, about = "Inspect and replay the taxi booking CRM integration")]
struct Cli {
    /// Path to the ledger file (default: ~/.cabdesk/ledger.redb)
    #[arg(long, global = true)]
    ledger_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show failed-submission counts
    Stats,

    /// List saved failed submissions
    ListFailed {
        /// bookings or inquiries
        #[arg(long, default_value = "bookings")]
        kind: String,
    },

    /// Replay saved failed submissions against the CRM
    Retry {
        /// bookings or inquiries
        #[arg(long, default_value = "bookings")]
        kind: String,
    },

    /// Drop saved failed submissions
    Clear {
        /// bookings or inquiries
        #[arg(long, default_value = "bookings")]
        kind: String,
    },

    /// Export both ledgers
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Authenticate and list a few customers
    CheckCrm,

    /// Pull the fleet from the CRM
    Sync {
        /// Keep syncing on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Show the state of a sales order
    BookingStatus {
        order_id: i64,
    },

    /// Mark a fleet vehicle available (default) or under maintenance
    SetAvailability {
        vehicle_id: i64,

        #[arg(long)]
        maintenance: bool,
    },

    /// Create a trip task for a booking and assign its driver
    CreateTrip {
        order_id: i64,

        /// Driver name
        #[arg(long)]
        driver: String,

        /// Driver phone
        #[arg(long)]
        phone: String,

        /// Vehicle registration number
        #[arg(long)]
        vehicle_number: String,

        /// CRM user responsible for the task
        #[arg(long)]
        user_id: Option<i64>,
    },

    /// Price a booking
    Quote {
        /// Listing price per unit
        #[arg(long)]
        price: u32,

        /// Pickup date (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS")
        #[arg(long)]
        pickup: Option<String>,

        /// Return date (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS")
        #[arg(long = "return")]
        return_date: Option<String>,

        /// cash-on-visit, half-payment or advance-booking
        #[arg(long, default_value = "cash-on-visit")]
        method: String,
    },
}

fn parse_kind(s: &str) -> Result<LedgerKind> {
    LedgerKind::from_str(s).with_context(|| {
        format!("Unknown ledger '{}'. Valid values: bookings, inquiries", s)
    })
}

fn parse_date(s: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, CRM_DATETIME_FORMAT) {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .with_context(|| format!("Invalid date '{}'", s))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn init_logging() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env: {}", e);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cabdesk_core=debug".parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn open_ledger(path: Option<&str>) -> Result<LedgerDb> {
    LedgerDb::open(path)
}

fn crm_service() -> Result<CrmService> {
    let config = CrmConfig::from_env().context("CRM configuration")?;
    Ok(CrmService::new(config))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let ledger_path = cli.ledger_path.as_deref();

    match cli.command {
        Commands::Stats => {
            let db = open_ledger(ledger_path)?;
            cmd_stats(&db)
        }
        Commands::ListFailed { kind } => {
            let db = open_ledger(ledger_path)?;
            cmd_list_failed(&db, parse_kind(&kind)?)
        }
        Commands::Retry { kind } => {
            let db = Arc::new(open_ledger(ledger_path)?);
            let desk = BookingDesk::new(crm_service()?, db);
            cmd_retry(&desk, parse_kind(&kind)?).await
        }
        Commands::Clear { kind } => {
            let db = open_ledger(ledger_path)?;
            cmd_clear(&db, parse_kind(&kind)?)
        }
        Commands::Export { format } => {
            let db = open_ledger(ledger_path)?;
            cmd_export(&db, &format)
        }
        Commands::CheckCrm => cmd_check_crm(&crm_service()?).await,
        Commands::Sync { watch } => cmd_sync(crm_service()?, watch).await,
        Commands::BookingStatus { order_id } => cmd_booking_status(&crm_service()?, order_id).await,
        Commands::SetAvailability {
            vehicle_id,
            maintenance,
        } => cmd_set_availability(&crm_service()?, vehicle_id, !maintenance).await,
        Commands::CreateTrip {
            order_id,
            driver,
            phone,
            vehicle_number,
            user_id,
        } => {
            let assignment = DriverAssignment {
                name: driver,
                phone,
                vehicle_number,
                user_id,
            };
            cmd_create_trip(&crm_service()?, order_id, &assignment).await
        }
        Commands::Quote {
            price,
            pickup,
            return_date,
            method,
        } => cmd_quote(price, pickup.as_deref(), return_date.as_deref(), &method),
    }
}

fn cmd_stats(db: &LedgerDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Cabdesk Ledger Stats ===");
    println!("Ledger: {}", db.path().display());
    println!();
    println!("Failed bookings:  {}", stats.failed_bookings);
    println!("Failed inquiries: {}", stats.failed_inquiries);
    println!("Inquiry shown:    {}", stats.inquiry_shown);

    Ok(())
}

fn print_records(records: &[FailedOperationRecord]) {
    println!("{:<4}  {:<24}  {:<28}  {}", "#", "SAVED AT", "CUSTOMER", "ERROR");
    println!("{}", "-".repeat(100));

    for (i, record) in records.iter().enumerate() {
        let customer = record
            .payload
            .get("email")
            .or_else(|| record.payload.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let error = record.error.chars().take(40).collect::<String>();
        println!(
            "{:<4}  {:<24}  {:<28}  {}",
            i + 1,
            format_timestamp(&record.timestamp),
            customer,
            error
        );
    }
}

fn cmd_list_failed(db: &LedgerDb, kind: LedgerKind) -> Result<()> {
    let records: Vec<FailedOperationRecord> = db
        .list_failed(kind)?
        .into_iter()
        .map(|(_, record)| record)
        .collect();

    if records.is_empty() {
        println!("No failed {} saved.", kind.as_str());
        return Ok(());
    }

    print_records(&records);
    println!("\nTotal: {} failed {}", records.len(), kind.as_str());
    Ok(())
}

async fn cmd_retry(desk: &BookingDesk, kind: LedgerKind) -> Result<()> {
    let summary: RetrySummary = match kind {
        LedgerKind::Bookings => desk.retry_failed_bookings().await?,
        LedgerKind::Inquiries => desk.retry_failed_inquiries().await?,
    };

    if summary.attempted == 0 {
        println!("No failed {} to retry", kind.as_str());
        return Ok(());
    }

    println!(
        "Retried {} {}: {} succeeded, {} failed",
        summary.attempted,
        kind.as_str(),
        summary.succeeded,
        summary.failed()
    );
    for failure in &summary.failures {
        println!("  - {}", failure.error);
    }
    if summary.failed() > 0 {
        println!("Failed entries were saved again with their new errors.");
    }
    Ok(())
}

fn cmd_clear(db: &LedgerDb, kind: LedgerKind) -> Result<()> {
    let removed = db.clear_failed(kind)?;
    println!("Cleared {} saved failed {}", removed, kind.as_str());
    Ok(())
}

fn cmd_export(db: &LedgerDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let records = |kind| -> Result<Vec<FailedOperationRecord>> {
        Ok(db.list_failed(kind)?.into_iter().map(|(_, r)| r).collect())
    };
    let stats = db.stats()?;

    let export = serde_json::json!({
        "exportedAt": Utc::now().to_rfc3339(),
        "failedBookings": records(LedgerKind::Bookings)?,
        "failedInquiries": records(LedgerKind::Inquiries)?,
        "inquiryShown": stats.inquiry_shown,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

async fn cmd_check_crm(crm: &CrmService) -> Result<()> {
    let session = crm.rpc().session().ensure_authenticated().await?;
    println!(
        "Authenticated as user {} at {}",
        session.user_id,
        format_timestamp(&session.authenticated_at)
    );

    let partners = crm.check_access().await?;
    println!("Customer access OK ({} shown):", partners.len());
    for partner in &partners {
        println!(
            "  {:<6}  {:<28}  {}",
            partner.remote_id.map(|id| id.to_string()).unwrap_or_default(),
            partner.name,
            partner.email.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn cmd_sync(crm: CrmService, watch: bool) -> Result<()> {
    let sync = FleetSync::new(crm, SyncConfig::from_env()?);

    if !watch {
        let snapshot = sync.sync_once().await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let handle = sync.start_auto_sync(|result| match result {
        Ok(snapshot) => println!(
            "[{}] synced {} vehicles",
            format_timestamp(&snapshot.synced_at),
            snapshot.count
        ),
        Err(e) => println!("[{}] sync failed: {}", format_timestamp(&Utc::now()), e),
    });

    tokio::signal::ctrl_c().await?;
    handle.abort();
    println!("Stopped fleet sync");
    Ok(())
}

async fn cmd_booking_status(crm: &CrmService, order_id: i64) -> Result<()> {
    match crm.booking_status(order_id).await {
        Some(status) => {
            println!("Order:    {}", order_id);
            println!("State:    {}", status.state);
            println!("Total:    {:.2}", status.amount_total);
            println!(
                "Customer: {}",
                status.partner.map(|p| p.name).unwrap_or_else(|| "-".into())
            );
        }
        None => println!("Order {} not found or not readable", order_id),
    }
    Ok(())
}

async fn cmd_set_availability(crm: &CrmService, vehicle_id: i64, available: bool) -> Result<()> {
    crm.set_vehicle_availability(vehicle_id, available).await?;
    println!(
        "Vehicle {} marked {}",
        vehicle_id,
        if available { "available" } else { "under maintenance" }
    );
    Ok(())
}

async fn cmd_create_trip(crm: &CrmService, order_id: i64, driver: &DriverAssignment) -> Result<()> {
    let task_id = crm.create_trip(order_id, driver).await?;
    println!(
        "Trip task {} created for booking {} (driver {}, {})",
        task_id, order_id, driver.name, driver.vehicle_number
    );
    Ok(())
}

fn cmd_quote(price: u32, pickup: Option<&str>, return_date: Option<&str>, method: &str) -> Result<()> {
    let method = PaymentMethod::from_str(method).with_context(|| {
        format!(
            "Unknown payment method '{}'. Valid values: cash-on-visit, half-payment, advance-booking",
            method
        )
    })?;
    let pickup = pickup.map(parse_date).transpose()?;
    let return_date = return_date.map(parse_date).transpose()?;

    let quote = BookingQuote::compute(price, pickup, return_date, method);
    println!("Days:        {}", quote.days);
    println!("Total:       ₹{}", quote.total_price);
    println!("Advance due: ₹{}", quote.advance_due);
    println!("Balance:     ₹{}", quote.balance());
    Ok(())
}
