//! Push Lap tracker — runs one affiliate attribution pass for a described
//! page view and prints the resulting affiliate info.
//!
//! Useful for checking a program's setup (URL modifier, cookie duration,
//! click registration) without a browser.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use pushlap_core::config::TrackerConfig;
use pushlap_core::event_bus::EventSink;
use pushlap_core::types::TrackerEvent;
use pushlap_web_sdk::storage::{
    system_clock, CookieStorage, LocalStorage, MemoryCookieJar, MemoryKeyValueStore,
};
use pushlap_web_sdk::{AffiliateStorage, DebugLog, PageEnvironment, PushLapTracker, SaleRequest, ScriptTag};
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageChoice {
    /// Probe cookies first, fall back to local storage
    Auto,
    Cookies,
    Local,
}

#[derive(Parser, Debug)]
#[command(name = "pushlap-tracker")]
#[command(about = "Run affiliate attribution for a page view")]
#[command(version)]
struct Cli {
    /// Landing page URL, including the affiliate query parameter
    #[arg(long)]
    url: Url,

    /// Affiliate program id
    #[arg(long, env = "PUSHLAP__PROGRAM_ID")]
    program_id: String,

    /// API base URL (overrides config)
    #[arg(long, env = "PUSHLAP__API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(long)]
    referrer: Option<String>,

    #[arg(long)]
    user_agent: Option<String>,

    #[arg(long, value_enum, default_value_t = StorageChoice::Auto)]
    storage: StorageChoice,

    /// Capture this email for the attributed affiliate after attribution
    #[arg(long)]
    email: Option<String>,

    /// Record a sale of this amount (requires --email)
    #[arg(long, requires = "email")]
    sale_amount: Option<f64>,
}

/// Logs each tracker event as it is dispatched.
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: TrackerEvent) {
        info!(event = event.name(), detail = ?event.detail, "tracker event");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pushlap=info,pushlap_web_sdk=info,pushlap_tracker=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = TrackerConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        TrackerConfig::default()
    });

    // Apply CLI overrides
    if let Some(url) = cli.api_base_url {
        config.api_base_url = url;
    }

    let mut page = PageEnvironment::new(cli.url).with_script(
        ScriptTag::with_src(&config.tracker_script_prefix)
            .attr(pushlap_web_sdk::page::AFFILIATE_SCRIPT_ATTR, "")
            .attr(pushlap_web_sdk::page::PROGRAM_ID_ATTR, &cli.program_id),
    );
    if let Some(referrer) = cli.referrer {
        page = page.with_referrer(referrer);
    }
    if let Some(user_agent) = cli.user_agent {
        page = page.with_user_agent(user_agent);
    }

    info!(
        host = page.hostname(),
        program_id = %cli.program_id,
        api_base_url = %config.api_base_url,
        "Configuration loaded"
    );

    let clock = system_clock();
    let jar = Arc::new(MemoryCookieJar::new(page.hostname(), clock.clone()));
    let kv = Arc::new(MemoryKeyValueStore::new());
    let log = DebugLog::default();
    let tracker = match cli.storage {
        StorageChoice::Auto => PushLapTracker::new(config, page, jar, kv, clock),
        StorageChoice::Cookies => {
            let storage: Arc<dyn AffiliateStorage> = Arc::new(CookieStorage::new(
                jar,
                page.hostname(),
                clock,
                log.clone(),
            ));
            PushLapTracker::with_storage(config, page, storage).with_debug_log(log)
        }
        StorageChoice::Local => {
            let storage: Arc<dyn AffiliateStorage> =
                Arc::new(LocalStorage::new(kv, clock, log.clone()));
            PushLapTracker::with_storage(config, page, storage).with_debug_log(log)
        }
    }
    .with_event_sink(Arc::new(LogSink));

    let outcome = tracker.start().await;
    info!(outcome = ?outcome, "Attribution complete");

    let client = tracker.client();
    if let Some(email) = cli.email.as_deref() {
        match cli.sale_amount {
            Some(amount) => {
                let sale = SaleRequest {
                    amount: Some(amount),
                    email: Some(email.to_string()),
                    ..Default::default()
                };
                let response = client.create_sale(&sale).await;
                info!(response = ?response, "Sale capture finished");
            }
            None => {
                let response = client.create_email(email, "").await?;
                info!(response = ?response, "Email capture finished");
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&client.affiliate_info())?);
    Ok(())
}
