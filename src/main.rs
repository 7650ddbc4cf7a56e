use anyhow::{Context, bail};
use api_client::{HttpDecisionService, HttpMarketData};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use configuration::{init_tracing, load_config};
use core_types::{AnalysisRun, Order, PnLRecord, PortfolioSnapshot};
use database::{LedgerRepository, connect, run_migrations};
use engine::{CycleReport, SessionScheduler, SystemClock, TradingDesk};
use events::{DeskEvent, LogLevel};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The main entry point for the paper trading desk.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Collaborator URLs and the database path may come from a .env file.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.logging)?;

    let pool = connect(&config.database.url, config.database.max_connections).await?;
    run_migrations(&pool).await?;
    let ledger = LedgerRepository::new(pool);

    let market_timeout = Duration::from_secs(config.schedule.collaborator_timeout_secs);
    let decision_timeout = Duration::from_secs(config.schedule.decision_timeout_secs);
    let market = Arc::new(HttpMarketData::new(
        &config.collaborators.market_data_url,
        market_timeout,
    )?);
    let decisions = Arc::new(HttpDecisionService::new(
        &config.collaborators.decision_url,
        decision_timeout,
    )?);

    let desk = Arc::new(
        TradingDesk::open(&config, ledger, market, decisions, Arc::new(SystemClock)).await?,
    );
    let tz = desk.clock().tz();

    match cli.command {
        Commands::Run => run(desk).await?,
        Commands::Analyze { json } => {
            let outcome = desk.manual_analysis().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
                println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
            } else {
                print_report(&outcome.report, tz);
                print_snapshot(&outcome.snapshot, tz);
            }
        }
        Commands::Status { json } => {
            let snapshot = desk.snapshot().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot, tz);
            }
        }
        Commands::Orders { limit, page } => print_orders(&desk.orders(limit, page).await?, tz),
        Commands::Pnl { days } => print_pnl(&desk.pnl_history(days).await?, tz),
        Commands::Runs { limit } => print_runs(&desk.analysis_runs(limit).await?, tz),
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes every position, order and P&L record; pass --yes to confirm");
            }
            let fresh = desk.reset().await?;
            println!(
                "Portfolio '{}' reset (id {}), cash {}",
                fresh.name,
                fresh.id,
                money(fresh.cash)
            );
        }
    }
    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Paper trading desk for exchange-listed equities.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session scheduler until Ctrl-C.
    Run,
    /// Run one coordination cycle now and print the resulting portfolio.
    Analyze {
        #[arg(long)]
        json: bool,
    },
    /// Show cash, positions and P&L.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Order history, newest first.
    Orders {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Zero-based page number.
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Close-of-session P&L records.
    Pnl {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Recent coordination cycles.
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Delete the portfolio and start over with the configured capital.
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

// ==============================================================================
// Run Command
// ==============================================================================

async fn run(desk: Arc<TradingDesk>) -> anyhow::Result<()> {
    let mut events = desk.subscribe();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let scheduler = Arc::new(SessionScheduler::new(desk));
    scheduler.start().await;
    tracing::info!("Desk running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    scheduler.stop().await;
    forwarder.abort();
    Ok(())
}

fn log_event(event: &DeskEvent) {
    match event.to_json() {
        Ok(json) => tracing::trace!(event = %json, "Desk event"),
        Err(e) => tracing::warn!(error = %e, "Desk event could not be serialized"),
    }
    match event {
        DeskEvent::OrderRecorded(order) => tracing::info!(
            id = order.id,
            symbol = %order.symbol,
            side = %order.side,
            status = %order.status,
            "Order recorded"
        ),
        DeskEvent::AnalysisCompleted(summary) => tracing::info!(
            run = %summary.run_id,
            trigger = %summary.trigger,
            filled = summary.filled,
            failed = summary.failed,
            "Analysis completed"
        ),
        DeskEvent::PortfolioState(snapshot) => tracing::debug!(
            total_value = %snapshot.total_value,
            positions = snapshot.positions.len(),
            "Portfolio updated"
        ),
        DeskEvent::Log(message) => match message.level {
            LogLevel::Info => tracing::info!("{}", message.message),
            LogLevel::Warn => tracing::warn!("{}", message.message),
            LogLevel::Error => tracing::error!("{}", message.message),
        },
    }
}

// ==============================================================================
// Table Rendering
// ==============================================================================

fn money(value: Decimal) -> String {
    value.round_dp(2).to_string()
}

fn pct(ratio: f64) -> String {
    format!("{:+.2}%", ratio * 100.0)
}

fn local(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);
    table
}

fn print_report(report: &CycleReport, tz: Tz) {
    println!(
        "Cycle {} ({}) at {}: {} decisions, {} filled, {} failed, {} skipped in {} ms",
        report.run_id,
        report.trigger,
        local(report.started_at, tz),
        report.decision_count,
        report.filled,
        report.failed,
        report.skipped,
        report.latency_ms
    );
    println!("Sentiment: {}  {}", report.sentiment.as_str(), report.summary);
    if !report.risk_note.is_empty() {
        println!("Risk: {}", report.risk_note);
    }
    if let Some(error) = &report.decision_error {
        println!("Decision service error: {error}");
    }
    if let Some(error) = &report.execution_error {
        println!("Execution stopped: {error}");
    }
    if !report.orders.is_empty() {
        print_orders(&report.orders, tz);
    }
}

fn print_snapshot(snapshot: &PortfolioSnapshot, tz: Tz) {
    let mut summary = table(vec![
        "Portfolio", "Cash", "Market value", "Total value", "Total P&L", "Daily P&L", "As of",
    ]);
    summary.add_row(vec![
        snapshot.name.clone(),
        money(snapshot.cash),
        money(snapshot.market_value),
        money(snapshot.total_value),
        format!("{} ({})", money(snapshot.total_pnl), pct(snapshot.total_pnl_ratio)),
        money(snapshot.daily_pnl),
        local(snapshot.as_of, tz),
    ]);
    println!("{summary}");

    if snapshot.positions.is_empty() {
        println!("No open positions.");
        return;
    }
    let mut positions = table(vec![
        "Symbol", "Name", "Qty", "Avg cost", "Price", "Value", "Unrealized", "Sellable",
    ]);
    for p in &snapshot.positions {
        positions.add_row(vec![
            p.symbol.clone(),
            p.name.clone(),
            p.quantity.to_string(),
            money(p.avg_cost),
            money(p.current_price),
            money(p.market_value),
            format!("{} ({})", money(p.unrealized_pnl), pct(p.unrealized_pnl_ratio)),
            if p.sellable { "yes" } else { "T+1" }.to_string(),
        ]);
    }
    println!("{positions}");
}

fn print_orders(orders: &[Order], tz: Tz) {
    let mut t = table(vec![
        "ID", "Time", "Symbol", "Side", "Qty", "Price", "Fee", "Realized", "Status", "Reason",
    ]);
    for o in orders {
        t.add_row(vec![
            o.id.to_string(),
            local(o.created_at, tz),
            o.symbol.clone(),
            o.side.to_string(),
            o.quantity.to_string(),
            money(o.price),
            money(o.fee),
            o.realized_pnl.map(money).unwrap_or_default(),
            o.status.to_string(),
            o.reason.clone(),
        ]);
    }
    println!("{t}");
}

fn print_pnl(records: &[PnLRecord], tz: Tz) {
    let mut t = table(vec!["Time", "Total value", "Cash", "Market value", "Daily", "Total"]);
    for r in records {
        t.add_row(vec![
            local(r.timestamp, tz),
            money(r.total_value),
            money(r.cash),
            money(r.market_value),
            money(r.daily_pnl),
            format!("{} ({})", money(r.total_pnl), pct(r.total_pnl_ratio)),
        ]);
    }
    println!("{t}");
}

fn print_runs(runs: &[AnalysisRun], tz: Tz) {
    let mut t = table(vec![
        "Time", "Trigger", "Sentiment", "Decisions", "Filled", "Failed", "Skipped", "ms", "Summary",
    ]);
    for r in runs {
        t.add_row(vec![
            local(r.created_at, tz),
            r.trigger.to_string(),
            r.sentiment.as_str().to_string(),
            r.decision_count.to_string(),
            r.filled.to_string(),
            r.failed.to_string(),
            r.skipped.to_string(),
            r.latency_ms.to_string(),
            r.summary.clone(),
        ]);
    }
    println!("{t}");
}
