//! Public API — the operations the host page calls once attribution has
//! run: email capture, sale capture, and the current affiliate info.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pushlap_core::types::{AffiliateInfo, StorageKind};
use pushlap_core::{TrackerError, TrackerResult};

use crate::api::{AffiliateApiClient, CaptureEmailRequest, CaptureSaleRequest};
use crate::context::AffiliateContext;
use crate::debug_log;
use crate::logging::DebugLog;
use crate::page::PageEnvironment;

/// Arguments of [`PushLapClient::create_sale`]. `amount` and `email` are
/// required; the rest default to empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct PushLapClient {
    api: AffiliateApiClient,
    page: Arc<PageEnvironment>,
    context: AffiliateContext,
    storage_kind: StorageKind,
    log: DebugLog,
}

impl PushLapClient {
    pub fn new(
        api: AffiliateApiClient,
        page: Arc<PageEnvironment>,
        context: AffiliateContext,
        storage_kind: StorageKind,
        log: DebugLog,
    ) -> Self {
        Self {
            api,
            page,
            context,
            storage_kind,
            log,
        }
    }

    fn program_id(&self) -> Option<String> {
        self.page
            .program_id(&self.api.config().tracker_script_prefix)
    }

    /// Record an email lead for the current affiliate. An empty `email` is
    /// rejected; without an affiliate this is a no-op returning `Ok(None)`.
    /// An empty `name` defaults to the email.
    pub async fn create_email(
        &self,
        email: &str,
        name: &str,
    ) -> TrackerResult<Option<serde_json::Value>> {
        if email.is_empty() {
            return Err(TrackerError::Validation("Email is required".into()));
        }
        let Some(affiliate_ref) = self.context.affiliate_ref() else {
            return Ok(None);
        };

        let program_id = self.program_id();
        debug_log!(self.log, program_id = ?program_id, "program id for email capture");

        let click_id = self.context.click_id();
        let request = CaptureEmailRequest {
            email,
            name: if name.is_empty() { email } else { name },
            affiliate_id: &affiliate_ref,
            click_id: click_id.as_deref(),
            program_id: program_id.as_deref(),
        };
        match self.api.capture_email(&request).await {
            Ok(body) => Ok(Some(body)),
            Err(e) => {
                debug_log!(self.log, error = %e, "error creating email capture");
                Ok(None)
            }
        }
    }

    /// Record a sale for the current affiliate. Returns `None` without a
    /// request when there is no affiliate or `amount`/`email` is missing.
    pub async fn create_sale(&self, sale: &SaleRequest) -> Option<serde_json::Value> {
        let affiliate_ref = self.context.affiliate_ref()?;

        let (Some(amount), Some(email)) = (sale.amount, sale.email.as_deref().filter(|e| !e.is_empty()))
        else {
            debug_log!(self.log, "email and amount are required parameters");
            return None;
        };

        let program_id = self.program_id();
        debug_log!(self.log, program_id = ?program_id, "program id for sale");

        let click_id = self.context.click_id();
        let url = self.page.location.to_string();
        let request = CaptureSaleRequest {
            user_id: &sale.user_id,
            amount,
            name: &sale.name,
            email,
            affiliate_id: &affiliate_ref,
            click_id: click_id.as_deref(),
            program_id: program_id.as_deref(),
            url: &url,
        };
        match self.api.capture_sale(&request).await {
            Ok(body) => Some(body),
            Err(e) => {
                debug_log!(self.log, error = %e, "error recording sale");
                None
            }
        }
    }

    pub fn affiliate_info(&self) -> AffiliateInfo {
        AffiliateInfo {
            affiliate_ref: self.context.affiliate_ref(),
            click_id: self.context.click_id(),
            storage_type: self.storage_kind,
        }
    }
}
