//! Affiliate-attribution SDK — resolves the affiliate ref for a page view,
//! registers clicks with the affiliate API, persists the identifiers across
//! visits, and reports emails and sales against them.
//!
//! # Modules
//!
//! - [`page`] — The host's description of the page (URL, referrer, navigator, scripts)
//! - [`storage`] — Cookie / key-value storage shim with expiry
//! - [`collector`] — Browser data snapshot and traffic-source classification
//! - [`api`] — HTTP client for the affiliate API
//! - [`attribution`] — The load-time attribution flow
//! - [`client`] — Public email / sale / info operations
//! - [`tracker`] — Facade wiring the pieces together

pub mod api;
pub mod attribution;
pub mod client;
pub mod collector;
pub mod context;
pub mod logging;
pub mod page;
pub mod storage;
pub mod tracker;

#[doc(hidden)]
pub use tracing as __tracing;

pub use api::AffiliateApiClient;
pub use attribution::{AttributionFlow, AttributionOutcome};
pub use client::{PushLapClient, SaleRequest};
pub use collector::{collect_browser_data, BrowserData};
pub use context::AffiliateContext;
pub use logging::DebugLog;
pub use page::{PageEnvironment, ScriptTag};
pub use storage::AffiliateStorage;
pub use tracker::PushLapTracker;
