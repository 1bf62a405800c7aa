//! pricefx CLI
//!
//! Formats, converts and parses prices with the configured rate source and
//! reports the state of the rate cache.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricefx_common::{normalize_amount_str, DurationExt};
use pricefx_fx::{
    CurrencyService, FileStateStore, FormatOptions, FxConfig, HttpRateSource, RateSource,
    RefreshOutcome, StateStore, StaticRateSource,
};

/// pricefx CLI
#[derive(Parser, Debug)]
#[command(name = "pricefx")]
#[command(about = "Exchange rates and localized prices")]
struct Args {
    /// Display currency for this invocation
    #[arg(short, long, global = true)]
    display: Option<String>,

    /// Skip refreshing rates before answering
    #[arg(long, global = true)]
    no_refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Format a home-currency amount in the display currency
    Price {
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Abbreviate with K/M/B
        #[arg(long)]
        compact: bool,

        /// Override the number of decimals
        #[arg(long)]
        decimals: Option<u32>,
    },
    /// Convert an amount into the display currency
    Convert {
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Source currency (defaults to the home currency)
        #[arg(short, long)]
        from: Option<String>,
    },
    /// Parse a price written in the display currency's format
    Parse {
        #[arg(allow_hyphen_values = true)]
        text: String,
    },
    /// Show rate cache freshness and statistics
    Status,
    /// List offered display currencies
    Currencies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Load configuration
    let config = FxConfig::from_env()?;
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let source: Arc<dyn RateSource> = match &config.rates_url {
        Some(url) => Arc::new(HttpRateSource::new(
            url.clone(),
            config.cache.fetch_timeout.as_std(),
        )?),
        None => Arc::new(StaticRateSource),
    };
    let state: Option<Arc<dyn StateStore>> = config
        .state_dir
        .as_ref()
        .map(|dir| Arc::new(FileStateStore::new(dir)) as Arc<dyn StateStore>);

    info!(
        source = %source.name(),
        persisted = state.is_some(),
        "Starting pricefx"
    );

    let service = CurrencyService::init(config, source, state)?;

    if let Some(code) = &args.display {
        service.select_display_currency(code)?;
    }

    if !args.no_refresh {
        if let Some(RefreshOutcome::Failed(e)) = service.refresh_if_needed().await {
            warn!(error = %e, "Using cached or fallback rates");
        }
    }

    match args.command {
        Command::Price {
            amount,
            compact,
            decimals,
        } => {
            let amount = normalize_amount_str(&amount);
            let formatted = if compact {
                service.compact_price(amount)
            } else {
                service.format_price_with(amount, FormatOptions { decimals })
            };
            println!("{formatted}");
        }
        Command::Convert { amount, from } => {
            let converted = service.convert(normalize_amount_str(&amount), from.as_deref());
            println!("{converted}");
        }
        Command::Parse { text } => {
            println!("{}", service.parse_price(&text));
        }
        Command::Status => {
            let status = service.rate_status();
            let stats = service.stats();
            let report = serde_json::json!({
                "display": service.display_currency().code.as_str(),
                "freshness": format!("{:?}", status.freshness),
                "isStale": status.is_stale,
                "isFallback": status.is_fallback,
                "fetchedAtUtc": status.fetched_at,
                "lastError": status.last_error,
                "fetchAttempts": stats.cache.fetch_attempts,
                "fetchFailures": stats.cache.fetch_failures,
                "degradedConversions": stats.degraded_conversions,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Currencies => {
            let display = service.display_currency();
            for settings in service.available_currencies() {
                let marker = if settings.code == display.code { "*" } else { " " };
                println!(
                    "{marker} {} {} {}",
                    settings.code, settings.symbol, settings.locale
                );
            }
        }
    }

    service.shutdown();
    Ok(())
}
