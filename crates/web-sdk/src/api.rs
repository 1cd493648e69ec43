//! HTTP client for the affiliate API: program lookup, click registration,
//! and email/sale capture.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pushlap_core::types::{AffiliateProgram, AffiliateProgramResponse};
use pushlap_core::{TrackerConfig, TrackerError, TrackerResult};

use crate::collector::BrowserData;

pub const PROGRAM_PATH: &str = "/api/affiliates/affiliate-program";
pub const ADD_CLICK_PATH: &str = "/api/affiliates/add-click";
pub const CAPTURE_EMAIL_PATH: &str = "/api/affiliates/capture-email";
pub const CAPTURE_SALE_PATH: &str = "/api/affiliates/capture-sale";

/// Body of `POST /api/affiliates/add-click`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddClickRequest<'a> {
    pub program_id: &'a str,
    pub referral_code: &'a str,
    #[serde(flatten)]
    pub browser: &'a BrowserData,
}

/// Response of `POST /api/affiliates/add-click`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddClickResponse {
    #[serde(default)]
    pub click: Option<ClickRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickRecord {
    /// Numeric or string id, depending on the backend.
    pub id: serde_json::Value,
}

impl ClickRecord {
    /// The id as a string; JSON strings are taken verbatim, anything else is
    /// rendered as JSON.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Body of `POST /api/affiliates/capture-email`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEmailRequest<'a> {
    pub email: &'a str,
    pub name: &'a str,
    /// The affiliate ref.
    pub affiliate_id: &'a str,
    pub click_id: Option<&'a str>,
    pub program_id: Option<&'a str>,
}

/// Body of `POST /api/affiliates/capture-sale`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSaleRequest<'a> {
    pub user_id: &'a str,
    pub amount: f64,
    pub name: &'a str,
    pub email: &'a str,
    /// The affiliate ref.
    pub affiliate_id: &'a str,
    pub click_id: Option<&'a str>,
    pub program_id: Option<&'a str>,
    pub url: &'a str,
}

#[derive(Clone)]
pub struct AffiliateApiClient {
    http: Client,
    config: TrackerConfig,
}

impl AffiliateApiClient {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: TrackerConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Fetch the program config. `Ok(None)` when the response has no program.
    pub async fn fetch_program(&self, program_id: &str) -> TrackerResult<Option<AffiliateProgram>> {
        let url = self.config.endpoint(PROGRAM_PATH);
        debug!(%url, program_id, "fetching affiliate program");
        let response = self
            .http
            .get(&url)
            .query(&[("programId", program_id)])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(TrackerError::network)?;
        let body = response.text().await.map_err(TrackerError::network)?;
        let parsed: AffiliateProgramResponse = serde_json::from_str(&body)?;
        Ok(parsed.program)
    }

    /// Register a click. The body is parsed whatever the status: an error
    /// status with a JSON body is a response without a `click`. Only
    /// transport failures and unparseable bodies are errors.
    pub async fn add_click(&self, request: &AddClickRequest<'_>) -> TrackerResult<AddClickResponse> {
        let url = self.config.endpoint(ADD_CLICK_PATH);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(TrackerError::network)?;

        let status = response.status();
        if !status.is_success() {
            debug!(%url, status = status.as_u16(), "add-click answered with error status");
        }
        let text = response.text().await.map_err(TrackerError::network)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn capture_email(
        &self,
        request: &CaptureEmailRequest<'_>,
    ) -> TrackerResult<serde_json::Value> {
        self.post(CAPTURE_EMAIL_PATH, request).await
    }

    pub async fn capture_sale(
        &self,
        request: &CaptureSaleRequest<'_>,
    ) -> TrackerResult<serde_json::Value> {
        self.post(CAPTURE_SALE_PATH, request).await
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> TrackerResult<serde_json::Value> {
        let url = self.config.endpoint(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(TrackerError::network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Api {
                status: status.as_u16(),
                endpoint: path.to_string(),
            });
        }

        let text = response.text().await.map_err(TrackerError::network)?;
        Ok(serde_json::from_str(&text)?)
    }
}
