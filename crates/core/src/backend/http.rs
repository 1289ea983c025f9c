use crate::backend::{
    AnalysisBackend, AnalysisBody, BackendReply, CompanyInfoBody, Endpoint, ExportRequest,
};
use crate::config::Settings;
use crate::domain::instrument::ChartData;
use crate::error::TransportError;
use crate::session::payload::AnalysisPayload;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            settings.backend_url(),
            settings.api_key.as_deref(),
            Duration::from_secs(settings.http_timeout_secs),
        )
    }

    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(api_key).context("KABU_API_KEY is not a valid header value")?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build backend http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn post_json<B, T>(
        &self,
        endpoint: Endpoint,
        body: &B,
    ) -> Result<BackendReply<T>, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(endpoint);
        let t0 = std::time::Instant::now();
        let res = self.http.post(&url).json(body).send().await?;

        let status = res.status();
        let text = res.text().await?;
        tracing::debug!(
            endpoint = endpoint.path(),
            %status,
            elapsed_ms = t0.elapsed().as_millis(),
            "backend response"
        );

        if !status.is_success() {
            // Failures come back as `{"error": ...}` with a 4xx/5xx status.
            if let Ok(BackendReply::Failure { error }) =
                serde_json::from_str::<BackendReply<T>>(&text)
            {
                return Ok(BackendReply::Failure { error });
            }
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str::<BackendReply<T>>(&text)?)
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for HttpBackend {
    async fn fetch_chart_data(
        &self,
        ticker: &str,
    ) -> Result<BackendReply<ChartData>, TransportError> {
        self.post_json(Endpoint::GetData, &json!({ "ticker": ticker }))
            .await
    }

    async fn fetch_company_info(
        &self,
        ticker: &str,
        name: &str,
    ) -> Result<BackendReply<CompanyInfoBody>, TransportError> {
        self.post_json(
            Endpoint::CompanyInfo,
            &json!({ "ticker": ticker, "name": name }),
        )
        .await
    }

    async fn analyze(
        &self,
        endpoint: Endpoint,
        payload: &AnalysisPayload,
    ) -> Result<BackendReply<AnalysisBody>, TransportError> {
        self.post_json(endpoint, payload).await
    }

    async fn export_document(&self, request: &ExportRequest) -> Result<Vec<u8>, TransportError> {
        let res = self
            .http
            .post(self.url(Endpoint::ExportPdf))
            .json(request)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            // Prefer the backend's own message when it sent one.
            let body = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(res.bytes().await?.to_vec())
    }
}
