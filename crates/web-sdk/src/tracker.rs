//! Tracker facade — selects storage, then hands out the attribution flow and
//! the public client, all sharing one context and one debug-log switch.

use std::sync::Arc;

use tracing::info;

use pushlap_core::event_bus::{noop_sink, EventSink};
use pushlap_core::TrackerConfig;

use crate::api::AffiliateApiClient;
use crate::attribution::{AttributionFlow, AttributionOutcome};
use crate::client::PushLapClient;
use crate::context::AffiliateContext;
use crate::logging::DebugLog;
use crate::page::PageEnvironment;
use crate::storage::{
    select_storage, AffiliateStorage, Clock, CookieBackend, CookieStorage, KeyValueBackend,
    LocalStorage,
};

pub struct PushLapTracker {
    api: AffiliateApiClient,
    page: Arc<PageEnvironment>,
    storage: Arc<dyn AffiliateStorage>,
    context: AffiliateContext,
    event_sink: Arc<dyn EventSink>,
    log: DebugLog,
}

impl PushLapTracker {
    /// Build a tracker for `page`, probing the host's cookie and key/value
    /// backends to pick the storage.
    pub fn new(
        config: TrackerConfig,
        page: PageEnvironment,
        cookies: Arc<dyn CookieBackend>,
        local: Arc<dyn KeyValueBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let log = DebugLog::default();
        let storage = select_storage(
            CookieStorage::new(cookies, page.hostname(), clock.clone(), log.clone()),
            LocalStorage::new(local, clock, log.clone()),
        );
        Self::with_storage(config, page, storage).with_debug_log(log)
    }

    /// Build a tracker over an already chosen storage.
    pub fn with_storage(
        config: TrackerConfig,
        page: PageEnvironment,
        storage: Arc<dyn AffiliateStorage>,
    ) -> Self {
        Self {
            api: AffiliateApiClient::new(config),
            page: Arc::new(page),
            storage,
            context: AffiliateContext::new(),
            event_sink: noop_sink(),
            log: DebugLog::default(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Share `log` with the flow and client. Storage built outside
    /// [`PushLapTracker::new`] should be given the same switch.
    pub fn with_debug_log(mut self, log: DebugLog) -> Self {
        self.log = log;
        self
    }

    pub fn context(&self) -> &AffiliateContext {
        &self.context
    }

    pub fn storage(&self) -> &Arc<dyn AffiliateStorage> {
        &self.storage
    }

    pub fn attribution(&self) -> AttributionFlow {
        AttributionFlow::new(
            self.api.clone(),
            self.page.clone(),
            self.storage.clone(),
            self.context.clone(),
        )
        .with_event_sink(self.event_sink.clone())
        .with_debug_log(self.log.clone())
    }

    pub fn client(&self) -> PushLapClient {
        PushLapClient::new(
            self.api.clone(),
            self.page.clone(),
            self.context.clone(),
            self.storage.kind(),
            self.log.clone(),
        )
    }

    /// Run attribution once for this page load.
    pub async fn start(&self) -> AttributionOutcome {
        let outcome = self.attribution().run().await;
        info!(
            host = self.page.hostname(),
            storage = %self.storage.kind(),
            outcome = ?outcome,
            "affiliate attribution finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ADD_CLICK_PATH, CAPTURE_SALE_PATH, PROGRAM_PATH};
    use crate::client::SaleRequest;
    use crate::page::ScriptTag;
    use crate::storage::{system_clock, MemoryCookieJar, MemoryKeyValueStore};
    use pushlap_core::event_bus::capture_sink;
    use pushlap_core::types::StorageKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page() -> PageEnvironment {
        PageEnvironment::new("https://www.example.com/?ref=alice".parse().unwrap()).with_script(
            ScriptTag::with_src("https://pushlapgrowth.com/affiliate-tracker.js?programId=prog-1"),
        )
    }

    #[tokio::test]
    async fn test_attribution_then_sale_uses_click_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROGRAM_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "program": {"cookieDuration": 7}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ADD_CLICK_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"click": {"id": 88}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CAPTURE_SALE_PATH))
            .and(body_partial_json(serde_json::json!({
                "affiliateId": "alice",
                "clickId": "88",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let clock = system_clock();
        let sink = capture_sink();
        let tracker = PushLapTracker::new(
            TrackerConfig::default().with_api_base_url(server.uri()),
            page(),
            Arc::new(MemoryCookieJar::new("www.example.com", clock.clone())),
            Arc::new(MemoryKeyValueStore::new()),
            clock,
        )
        .with_event_sink(sink.clone() as Arc<dyn EventSink>);

        assert!(matches!(
            tracker.start().await,
            AttributionOutcome::ClickRegistered { .. }
        ));
        assert_eq!(sink.count(), 2);

        let client = tracker.client();
        assert_eq!(client.affiliate_info().click_id, Some("88".into()));
        let sale = SaleRequest {
            amount: Some(20.0),
            email: Some("jo@example.com".into()),
            ..Default::default()
        };
        assert!(client.create_sale(&sale).await.is_some());
    }

    #[tokio::test]
    async fn test_blocked_cookies_fall_back_to_local_storage() {
        let server = MockServer::start().await;
        let clock = system_clock();
        let kv = Arc::new(MemoryKeyValueStore::new());
        let tracker = PushLapTracker::new(
            TrackerConfig::default().with_api_base_url(server.uri()),
            page(),
            Arc::new(MemoryCookieJar::disabled("www.example.com", clock.clone())),
            kv.clone(),
            clock,
        );
        assert_eq!(tracker.storage().kind(), StorageKind::LocalStorage);
        assert_eq!(tracker.client().affiliate_info().storage_type, StorageKind::LocalStorage);

        tracker.storage().set("prog-1_affiliate_ref", "alice", 1);
        assert!(kv.raw("prog-1_affiliate_ref").is_some());
    }
}
