//! Attribution flow — the one-shot sequence run when the tracker loads.
//!
//! Steps, in order: resolve the program id from the page, fetch the program
//! config, read the stored referral, seed the [`AffiliateContext`], then
//! either register a click, reuse the stored attribution, or report that no
//! affiliate is present. A failed click registration clears everything.

use std::sync::Arc;

use tracing::info;

use pushlap_core::event_bus::{noop_sink, EventSink};
use pushlap_core::types::{AffiliateProgram, ReferralState, TrackerEvent};
use pushlap_core::{TrackerError, TrackerResult};

use crate::api::{AddClickRequest, AffiliateApiClient};
use crate::collector::collect_browser_data;
use crate::context::AffiliateContext;
use crate::debug_log;
use crate::logging::DebugLog;
use crate::page::PageEnvironment;
use crate::storage::{AffiliateStorage, ReferralKeys};

/// Which branch the flow took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionOutcome {
    /// The page carries no program id; nothing was fetched.
    NoProgramId,
    /// The program lookup failed or returned no program.
    ProgramUnavailable,
    /// A click was registered. `click_id` is `None` when the API answered
    /// without one.
    ClickRegistered {
        affiliate_ref: String,
        click_id: Option<String>,
    },
    /// Click registration failed; the referral state was cleared.
    ClickFailed { affiliate_ref: String },
    /// The stored attribution was reused without a network call.
    ExistingAffiliate {
        affiliate_ref: String,
        click_id: Option<String>,
    },
    NoAffiliate,
}

/// What to do with the resolved referral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralDecision {
    RegisterClick(String),
    ReuseExisting,
    NoAffiliate,
}

/// Decide between registering a click and reusing stored state. A URL ref
/// registers a click unless it matches the stored ref and a click id is
/// already stored.
pub fn decide(url_ref: Option<&str>, stored: &ReferralState) -> ReferralDecision {
    match url_ref {
        Some(r) if stored.affiliate_ref.as_deref() != Some(r) || stored.click_id.is_none() => {
            ReferralDecision::RegisterClick(r.to_string())
        }
        _ if stored.affiliate_ref.is_some() => ReferralDecision::ReuseExisting,
        _ => ReferralDecision::NoAffiliate,
    }
}

pub struct AttributionFlow {
    api: AffiliateApiClient,
    page: Arc<PageEnvironment>,
    storage: Arc<dyn AffiliateStorage>,
    context: AffiliateContext,
    event_sink: Arc<dyn EventSink>,
    log: DebugLog,
}

impl AttributionFlow {
    pub fn new(
        api: AffiliateApiClient,
        page: Arc<PageEnvironment>,
        storage: Arc<dyn AffiliateStorage>,
        context: AffiliateContext,
    ) -> Self {
        Self {
            api,
            page,
            storage,
            context,
            event_sink: noop_sink(),
            log: DebugLog::default(),
        }
    }

    /// Attach an event sink for `affiliate_id_ready` / `affiliate_referral_ready`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Share a debug-log switch; the program config turns it on or off.
    pub fn with_debug_log(mut self, log: DebugLog) -> Self {
        self.log = log;
        self
    }

    /// Run the whole flow. Never fails; errors degrade to no attribution.
    pub async fn run(&self) -> AttributionOutcome {
        let Some(program_id) = self.resolve_program_id() else {
            return AttributionOutcome::NoProgramId;
        };

        let program = match self.load_program(&program_id).await {
            Ok(Some(program)) => program,
            Ok(None) => return AttributionOutcome::ProgramUnavailable,
            Err(e) => {
                debug_log!(self.log, error = %e, "error processing affiliate program");
                return AttributionOutcome::ProgramUnavailable;
            }
        };

        let config = self.api.config();
        let url_modifier = program.url_modifier_or(&config.default_url_modifier);
        let days = program.cookie_duration_or(config.default_cookie_duration_days);
        let keys = ReferralKeys::for_program(&program_id);

        let url_ref = self.page.query_param(url_modifier);
        debug_log!(self.log, url_modifier, url_ref = ?url_ref, "affiliate param from URL");

        let stored = self.read_stored(&keys);
        self.resolve_referral(url_ref.as_deref(), &stored);

        match decide(url_ref.as_deref(), &stored) {
            ReferralDecision::RegisterClick(affiliate_ref) => {
                debug_log!(self.log, affiliate_ref = %affiliate_ref, "creating new click");
                match self.register_click(&program_id, &keys, days).await {
                    Ok(click_id) => {
                        self.persist_ref(&keys, &affiliate_ref, days);
                        AttributionOutcome::ClickRegistered {
                            affiliate_ref,
                            click_id,
                        }
                    }
                    Err(e) => {
                        self.clear_referral(&keys);
                        debug_log!(self.log, error = %e, "error handling click");
                        AttributionOutcome::ClickFailed { affiliate_ref }
                    }
                }
            }
            ReferralDecision::ReuseExisting => {
                debug_log!(self.log, "using existing affiliate data");
                let referral = self.context.referral();
                self.emit(TrackerEvent::affiliate_id_ready(
                    referral.affiliate_ref.clone(),
                    referral.click_id.clone(),
                ));
                self.emit_ready_delayed().await;
                AttributionOutcome::ExistingAffiliate {
                    affiliate_ref: referral.affiliate_ref.unwrap_or_default(),
                    click_id: referral.click_id,
                }
            }
            ReferralDecision::NoAffiliate => {
                debug_log!(self.log, "no affiliate tracking active");
                self.emit_ready_delayed().await;
                AttributionOutcome::NoAffiliate
            }
        }
    }

    pub fn resolve_program_id(&self) -> Option<String> {
        let program_id = self
            .page
            .program_id(&self.api.config().tracker_script_prefix);
        debug_log!(self.log, program_id = ?program_id, "affiliate program id");
        program_id
    }

    /// Fetch the program and apply its debug-log flag.
    pub async fn load_program(&self, program_id: &str) -> TrackerResult<Option<AffiliateProgram>> {
        let program = self.api.fetch_program(program_id).await?;
        if let Some(program) = &program {
            self.log.set_enabled(program.debug_logs_enabled());
        }
        Ok(program)
    }

    fn read_stored(&self, keys: &ReferralKeys) -> ReferralState {
        let non_empty = |v: Option<String>| v.filter(|v| !v.is_empty());
        let stored = ReferralState {
            affiliate_ref: non_empty(self.storage.get(&keys.ref_key)),
            click_id: non_empty(self.storage.get(&keys.click_id_key)),
        };
        debug_log!(
            self.log,
            existing_ref = ?stored.affiliate_ref,
            existing_click_id = ?stored.click_id,
            "stored affiliate state"
        );
        stored
    }

    /// Seed the context: the URL ref wins over the stored one, and a stored
    /// click id is only reused when it belongs to the same ref.
    pub fn resolve_referral(&self, url_ref: Option<&str>, stored: &ReferralState) {
        self.context.clear();

        let Some(current) = url_ref.or(stored.affiliate_ref.as_deref()) else {
            return;
        };
        self.context.set_provisional(current);

        match (&stored.affiliate_ref, &stored.click_id) {
            (Some(stored_ref), Some(click_id)) if stored_ref == current => {
                self.context.set_click_id(click_id);
                self.context.publish_pickaxe(click_id);
                debug_log!(self.log, affiliate_ref = current, click_id = %click_id, "using existing affiliate data");
            }
            _ => {
                debug_log!(self.log, affiliate_ref = current, "affiliate ref set, click id pending");
            }
        }
    }

    /// Register a click for the context's ref and store the confirmed click
    /// id. Returns the click id, if the API issued one.
    pub async fn register_click(
        &self,
        program_id: &str,
        keys: &ReferralKeys,
        days: i64,
    ) -> TrackerResult<Option<String>> {
        let Some(referral_code) = self.context.affiliate_ref() else {
            return Ok(None);
        };

        let browser = collect_browser_data(&self.page);
        let response = self
            .api
            .add_click(&AddClickRequest {
                program_id,
                referral_code: &referral_code,
                browser: &browser,
            })
            .await?;

        let click_id = response.click.map(|c| c.id_string());
        if let Some(click_id) = &click_id {
            if click_id.is_empty() {
                return Err(TrackerError::Validation("empty click id".into()));
            }
            let previous = self.context.click_id();
            self.context.set_click_id(click_id);
            self.storage.set(&keys.click_id_key, click_id, days);
            self.context.publish_pickaxe(click_id);

            info!(program_id, click_id = %click_id, "affiliate click registered");
            debug_log!(self.log, previous = ?previous, current = %click_id, "updated affiliate id from ref to click id");

            self.emit(TrackerEvent::affiliate_id_ready(
                Some(referral_code.clone()),
                Some(click_id.clone()),
            ));
        }

        self.emit(TrackerEvent::affiliate_referral_ready());
        Ok(click_id)
    }

    pub fn persist_ref(&self, keys: &ReferralKeys, affiliate_ref: &str, days: i64) {
        self.storage.set(&keys.ref_key, affiliate_ref, days);
    }

    fn clear_referral(&self, keys: &ReferralKeys) {
        self.storage.delete(&keys.ref_key);
        self.storage.delete(&keys.click_id_key);
        self.context.clear();
    }

    fn emit(&self, event: TrackerEvent) {
        self.event_sink.emit(event);
    }

    async fn emit_ready_delayed(&self) {
        tokio::time::sleep(self.api.config().ready_event_delay()).await;
        self.emit(TrackerEvent::affiliate_referral_ready());
    }
}
