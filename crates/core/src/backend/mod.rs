use crate::domain::instrument::ChartData;
use crate::error::TransportError;
use crate::session::payload::AnalysisPayload;
use serde::{Deserialize, Serialize};

#[cfg(test)]
pub(crate) mod fake;
pub mod http;

pub use http::HttpBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetData,
    CompanyInfo,
    Technical,
    Full,
    Volume,
    Market,
    Total,
    Reresearch,
    ExportPdf,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::GetData => "/get_data",
            Endpoint::CompanyInfo => "/get_company_info",
            Endpoint::Technical => "/analyze",
            Endpoint::Full => "/analyze_full",
            Endpoint::Volume => "/analyze_volume",
            Endpoint::Market => "/analyze_market",
            Endpoint::Total => "/analyze_total",
            Endpoint::Reresearch => "/reresearch",
            Endpoint::ExportPdf => "/export_pdf",
        }
    }
}

/// A JSON body that is either `{"error": ...}` or the expected success shape.
/// An `error` key wins even if success fields are also present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BackendReply<T> {
    Failure { error: String },
    Success(T),
}

impl<T> BackendReply<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            BackendReply::Failure { error } => Err(error),
            BackendReply::Success(body) => Ok(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBody {
    pub analysis: String,
    #[serde(default)]
    pub date_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfoBody {
    pub info: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub title: String,
    pub content: String,
    pub ticker: String,
}

#[async_trait::async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn fetch_chart_data(
        &self,
        ticker: &str,
    ) -> Result<BackendReply<ChartData>, TransportError>;

    async fn fetch_company_info(
        &self,
        ticker: &str,
        name: &str,
    ) -> Result<BackendReply<CompanyInfoBody>, TransportError>;

    async fn analyze(
        &self,
        endpoint: Endpoint,
        payload: &AnalysisPayload,
    ) -> Result<BackendReply<AnalysisBody>, TransportError>;

    /// Returns the rendered document bytes.
    async fn export_document(&self, request: &ExportRequest) -> Result<Vec<u8>, TransportError>;
}
