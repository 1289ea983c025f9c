use crate::backend::{
    AnalysisBackend, AnalysisBody, BackendReply, CompanyInfoBody, Endpoint, ExportRequest,
};
use crate::domain::instrument::ChartData;
use crate::error::TransportError;
use crate::session::payload::AnalysisPayload;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type AnalysisReply = Result<BackendReply<AnalysisBody>, TransportError>;

/// Backend whose analysis replies are released by the test through oneshot
/// senders, one queue per endpoint.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    series: Mutex<HashMap<String, ChartData>>,
    company_info: Mutex<HashMap<String, String>>,
    replies: Mutex<HashMap<Endpoint, VecDeque<oneshot::Receiver<AnalysisReply>>>>,
    calls: Mutex<Vec<(Endpoint, serde_json::Value)>>,
    exports: Mutex<Vec<ExportRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn analysis(text: &str, date_range: Option<&str>) -> BackendReply<AnalysisBody> {
        BackendReply::Success(AnalysisBody {
            analysis: text.to_string(),
            date_range: date_range.map(str::to_string),
        })
    }

    pub fn with_series(&self, ticker: &str, data: ChartData) {
        self.series
            .lock()
            .unwrap()
            .insert(ticker.to_string(), data);
    }

    pub fn with_company_info(&self, ticker: &str, info: &str) {
        self.company_info
            .lock()
            .unwrap()
            .insert(ticker.to_string(), info.to_string());
    }

    /// Queues a pending reply for `endpoint`; the call waits until the
    /// returned sender fires.
    pub fn script(&self, endpoint: Endpoint) -> oneshot::Sender<AnalysisReply> {
        let (tx, rx) = oneshot::channel();
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(rx);
        tx
    }

    /// Queues a reply that is ready immediately.
    pub fn reply(&self, endpoint: Endpoint, reply: AnalysisReply) {
        let tx = self.script(endpoint);
        let _ = tx.send(reply);
    }

    pub fn calls(&self) -> Vec<(Endpoint, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn exports(&self) -> Vec<ExportRequest> {
        self.exports.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn fetch_chart_data(
        &self,
        ticker: &str,
    ) -> Result<BackendReply<ChartData>, TransportError> {
        let found = self.series.lock().unwrap().get(ticker).cloned();
        Ok(match found {
            Some(data) => BackendReply::Success(data),
            None => BackendReply::Failure {
                error: format!("no data found for {ticker}"),
            },
        })
    }

    async fn fetch_company_info(
        &self,
        ticker: &str,
        _name: &str,
    ) -> Result<BackendReply<CompanyInfoBody>, TransportError> {
        let found = self.company_info.lock().unwrap().get(ticker).cloned();
        match found {
            Some(info) => Ok(BackendReply::Success(CompanyInfoBody { info })),
            None => Err(TransportError::Status {
                status: 404,
                body: String::new(),
            }),
        }
    }

    async fn analyze(
        &self,
        endpoint: Endpoint,
        payload: &AnalysisPayload,
    ) -> Result<BackendReply<AnalysisBody>, TransportError> {
        let body = serde_json::to_value(payload)?;
        self.calls.lock().unwrap().push((endpoint, body));

        let rx = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        match rx {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(TransportError::Status {
                    status: 599,
                    body: "reply dropped".to_string(),
                })
            }),
            None => Ok(BackendReply::Failure {
                error: format!("unscripted call to {}", endpoint.path()),
            }),
        }
    }

    async fn export_document(&self, request: &ExportRequest) -> Result<Vec<u8>, TransportError> {
        self.exports.lock().unwrap().push(request.clone());
        Ok(format!("%PDF {}", request.title).into_bytes())
    }
}
