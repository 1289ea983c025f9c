use crate::backend::{AnalysisBackend, BackendReply, CompanyInfoBody, ExportRequest, HttpBackend};
use crate::config::Settings;
use crate::domain::catalog::{IndustryFilter, InstrumentCatalog};
use crate::domain::instrument::{Instrument, LoadedSeries, OhlcReadout};
use crate::error::{AnalysisError, TransportError, ValidationError};
use crate::history::{
    export_title, synthesize_title, ReportHistoryItem, ReportHistoryStore, ReportId, TitleSubject,
};
use crate::mode::{AnalysisMode, GuardContext, ModeState, ModeTransition, Visibility};
use crate::recency::RecencyCache;
use crate::render::{compose_report, MarkdownRenderer, MarkupRenderer};
use crate::session::payload::{build_payload, AnalysisInputs};
use crate::session::{
    route, ActiveSlot, CompletedSession, PendingSession, SessionId, SessionTicket,
};
use crate::store::{FileStore, KeyValueStore};
use crate::time::jp_market;
use crate::viewport::{ViewportRange, ViewportSync, INITIAL_WINDOW_BARS};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSource {
    Session(SessionId),
    History(ReportId),
}

/// What the analysis panel currently shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnalysisDisplay {
    #[default]
    Hidden,
    Loading {
        mode: AnalysisMode,
        message: &'static str,
    },
    Report {
        title: String,
        html: String,
        raw: String,
        export_title: String,
        source: ReportSource,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompanyInfo {
    Loaded {
        ticker: String,
        text: String,
        html: String,
    },
    Failed { ticker: String, message: String },
}

/// A report that made it onto the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownReport {
    pub id: ReportId,
    pub title: String,
    pub export_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub title: String,
    pub bytes: Vec<u8>,
}

/// Owns all session state of one analysis screen.
pub struct AnalysisOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    renderer: Arc<dyn MarkupRenderer>,
    store: Arc<dyn KeyValueStore>,
    catalog: InstrumentCatalog,
    industry_filter: IndustryFilter,
    series: Option<LoadedSeries>,
    company_info: Option<CompanyInfo>,
    mode: ModeState,
    inputs: AnalysisInputs,
    recency: RecencyCache,
    history: ReportHistoryStore,
    viewports: Option<Arc<ViewportSync>>,
    slot: ActiveSlot,
    display: AnalysisDisplay,
    market_date: fn() -> NaiveDate,
}

impl AnalysisOrchestrator {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<dyn KeyValueStore>,
        catalog: InstrumentCatalog,
        recent_capacity: usize,
        history_capacity: usize,
    ) -> Self {
        let recency = RecencyCache::load(store.as_ref(), recent_capacity);
        Self {
            backend,
            renderer: Arc::new(MarkdownRenderer),
            store,
            catalog,
            industry_filter: IndustryFilter::All,
            series: None,
            company_info: None,
            mode: ModeState::default(),
            inputs: AnalysisInputs::default(),
            recency,
            history: ReportHistoryStore::new(history_capacity),
            viewports: None,
            slot: ActiveSlot::new(),
            display: AnalysisDisplay::Hidden,
            market_date: jp_market::today,
        }
    }

    /// HTTP backend and on-disk recency store as configured by `settings`.
    pub fn from_settings(settings: &Settings, catalog: InstrumentCatalog) -> anyhow::Result<Self> {
        let backend = HttpBackend::from_settings(settings)?;
        let store = FileStore::open(settings.resolve_data_dir()?)?;
        tracing::info!(
            backend = backend.base_url(),
            data_dir = %store.dir().display(),
            instruments = catalog.instruments().len(),
            "orchestrator configured"
        );
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(store),
            catalog,
            settings.recent_capacity,
            settings.history_capacity,
        ))
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MarkupRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_viewports(mut self, viewports: Arc<ViewportSync>) -> Self {
        self.viewports = Some(viewports);
        self
    }

    pub fn with_market_date(mut self, market_date: fn() -> NaiveDate) -> Self {
        self.market_date = market_date;
        self
    }

    pub fn backend(&self) -> Arc<dyn AnalysisBackend> {
        Arc::clone(&self.backend)
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    pub fn industry_filter(&self) -> &IndustryFilter {
        &self.industry_filter
    }

    pub fn set_industry_filter(&mut self, filter: IndustryFilter) {
        self.industry_filter = filter;
    }

    pub fn visible_instruments(&self) -> Vec<&Instrument> {
        self.catalog.filtered(&self.industry_filter).collect()
    }

    pub fn series(&self) -> Option<&LoadedSeries> {
        self.series.as_ref()
    }

    pub fn company_info(&self) -> Option<&CompanyInfo> {
        self.company_info.as_ref()
    }

    pub fn recency(&self) -> &RecencyCache {
        &self.recency
    }

    pub fn history(&self) -> &ReportHistoryStore {
        &self.history
    }

    pub fn display(&self) -> &AnalysisDisplay {
        &self.display
    }

    pub fn inputs(&self) -> &AnalysisInputs {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut AnalysisInputs {
        &mut self.inputs
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode.active()
    }

    pub fn visibility(&self) -> Visibility {
        self.mode.visibility()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.slot.occupant()
    }

    pub fn ohlc_readout(&self, time: NaiveDate) -> Option<OhlcReadout> {
        self.series.as_ref()?.ohlc_readout(time)
    }

    /// Loads `ticker` into the charts. Catalog instruments are recorded as
    /// recently used and get their company profile fetched alongside the
    /// series. On failure the previous series stays loaded.
    pub async fn select_instrument(&mut self, ticker: &str) -> Result<ViewportRange, AnalysisError> {
        let ticker = ticker.trim().to_string();
        if ticker.is_empty() {
            return Err(ValidationError::NoInstrument.into());
        }

        let name = self.catalog.find(&ticker).map(|i| i.name.clone());
        if let Some(name) = &name {
            self.recency.record(self.store.as_ref(), &ticker, name);
        }

        let backend = Arc::clone(&self.backend);
        let company = async {
            match &name {
                Some(name) => Some(backend.fetch_company_info(&ticker, name).await),
                None => None,
            }
        };
        let (data, company) = tokio::join!(backend.fetch_chart_data(&ticker), company);

        self.company_info = company.map(|reply| self.company_info_from(&ticker, reply));

        let data = match data {
            Ok(reply) => reply.into_result().map_err(AnalysisError::Domain)?,
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "chart data request failed");
                return Err(err.into());
            }
        };

        let window = match &self.viewports {
            Some(sync) => sync.load(&data),
            None => ViewportRange::trailing_window(data.candles.len(), INITIAL_WINDOW_BARS),
        };
        tracing::info!(%ticker, bars = data.candles.len(), "instrument loaded");
        self.series = Some(LoadedSeries { ticker, data });
        Ok(window)
    }

    fn company_info_from(
        &self,
        ticker: &str,
        reply: Result<BackendReply<CompanyInfoBody>, TransportError>,
    ) -> CompanyInfo {
        let ticker = ticker.to_string();
        match reply {
            Ok(BackendReply::Success(body)) => CompanyInfo::Loaded {
                ticker,
                html: self.renderer.render(&body.info),
                text: body.info,
            },
            Ok(BackendReply::Failure { error }) => CompanyInfo::Failed {
                ticker,
                message: format!("Error: {error}"),
            },
            Err(err) => {
                tracing::debug!(%ticker, error = %err, "company info request failed");
                CompanyInfo::Failed {
                    ticker,
                    message: "Failed to load company information.".to_string(),
                }
            }
        }
    }

    /// Selects the `index`-th recently used instrument, showing all
    /// industries again.
    pub async fn select_recent(&mut self, index: usize) -> Result<ViewportRange, AnalysisError> {
        let ticker = self
            .recency
            .get(index)
            .map(|entry| entry.ticker.clone())
            .ok_or(ValidationError::UnknownRecentEntry(index))?;
        self.industry_filter = IndustryFilter::All;
        self.select_instrument(&ticker).await
    }

    /// Switches the active mode. A finished report or failure on display is
    /// cleared; an in-flight session keeps running.
    pub fn select_mode(&mut self, mode: AnalysisMode) -> ModeTransition {
        let transition = self.mode.select(mode);
        if !matches!(self.display, AnalysisDisplay::Loading { .. }) {
            self.display = AnalysisDisplay::Hidden;
        }
        tracing::debug!(from = %transition.previous, to = %transition.current, "mode selected");
        transition
    }

    fn guard_context(&self) -> GuardContext<'_> {
        GuardContext {
            instrument_loaded: self.series.is_some(),
            topics: &self.inputs.topics,
            free_keyword: &self.inputs.free_keyword,
            selected_reports: self.history.selected_count(),
            question: &self.inputs.question,
        }
    }

    /// Validates the active mode's inputs and installs a new session,
    /// cancelling any session still in flight.
    pub fn begin_analysis(&mut self) -> Result<PendingSession, AnalysisError> {
        let mode = self.mode.active();
        self.mode.check(&self.guard_context())?;

        let selected = if mode.uses_history() {
            self.history.selected_results()
        } else {
            Vec::new()
        };
        let payload = build_payload(mode, self.series.as_ref(), &self.inputs, selected)?;

        let (title, instrument_name) = match (&self.series, mode.is_per_instrument()) {
            (Some(series), true) => (
                synthesize_title(
                    mode,
                    TitleSubject::Instrument {
                        ticker: &series.ticker,
                    },
                ),
                self.catalog.find(&series.ticker).map(|i| i.name.clone()),
            ),
            _ if mode == AnalysisMode::Market => (
                synthesize_title(
                    mode,
                    TitleSubject::Market {
                        topics: &self.inputs.topics,
                        free_keyword: &self.inputs.free_keyword,
                    },
                ),
                None,
            ),
            _ => (synthesize_title(mode, TitleSubject::None), None),
        };

        let route = route(mode);
        let pending = PendingSession::new(
            SessionTicket {
                id: SessionId::new(),
                mode,
                route,
                title,
                instrument_name,
            },
            payload,
        );

        self.slot.install(&pending);
        self.display = AnalysisDisplay::Loading {
            mode,
            message: route.loading_message,
        };
        tracing::info!(session = %pending.id(), %mode, endpoint = route.endpoint.path(), "analysis started");
        Ok(pending)
    }

    /// Applies a finished session if it still holds the active slot.
    /// Superseded sessions come back as `Cancelled` and change nothing.
    pub fn complete(&mut self, done: CompletedSession) -> Result<ShownReport, AnalysisError> {
        let CompletedSession { ticket, outcome } = done;
        if !self.slot.release(ticket.id) {
            tracing::debug!(session = %ticket.id, mode = %ticket.mode, "discarding stale completion");
            return Err(AnalysisError::Cancelled(ticket.id));
        }

        let body = match outcome {
            Ok(body) => body,
            Err(err) => {
                self.display = match err.user_message() {
                    Some(message) => AnalysisDisplay::Failed { message },
                    None => AnalysisDisplay::Hidden,
                };
                if err.is_cancelled() {
                    tracing::info!(session = %ticket.id, "analysis cancelled");
                } else {
                    tracing::warn!(session = %ticket.id, mode = %ticket.mode, error = %err, "analysis failed");
                }
                return Err(err);
            }
        };

        let raw = compose_report(
            ticket.route.title_line,
            body.date_range.as_deref(),
            &body.analysis,
        );
        let html = self.renderer.render(&raw);
        let item = ReportHistoryItem::new(
            ticket.mode,
            ticket.title.clone(),
            raw.clone(),
            html.clone(),
            body.date_range,
            Utc::now(),
        );
        let export_title = export_title(
            ticket.mode,
            &item.title_parts(),
            ticket.instrument_name.as_deref(),
            (self.market_date)(),
        );
        let id = self.history.push(item);

        self.display = AnalysisDisplay::Report {
            title: ticket.title.clone(),
            html,
            raw,
            export_title: export_title.clone(),
            source: ReportSource::Session(ticket.id),
        };
        tracing::info!(session = %ticket.id, report = %id, mode = %ticket.mode, "analysis completed");

        Ok(ShownReport {
            id,
            title: ticket.title,
            export_title,
        })
    }

    /// `begin_analysis`, `execute` and `complete` in one go.
    pub async fn run_analysis(&mut self) -> Result<ShownReport, AnalysisError> {
        let pending = self.begin_analysis()?;
        let backend = Arc::clone(&self.backend);
        let done = pending.execute(backend.as_ref()).await;
        self.complete(done)
    }

    /// Signals the in-flight session, if any. Its completion then clears
    /// the panel.
    pub fn cancel_active(&self) -> Option<SessionId> {
        let id = self.slot.cancel()?;
        tracing::info!(session = %id, "cancellation requested");
        Some(id)
    }

    pub fn toggle_history_selected(&mut self, index: usize) -> Result<bool, AnalysisError> {
        self.history
            .toggle_selected(index)
            .ok_or_else(|| ValidationError::UnknownHistoryEntry(index).into())
    }

    pub fn set_history_selected(&mut self, index: usize, selected: bool) -> Result<bool, AnalysisError> {
        self.history
            .set_selected(index, selected)
            .ok_or_else(|| ValidationError::UnknownHistoryEntry(index).into())
    }

    /// Re-displays a stored report. No request is made.
    pub fn open_history_item(&mut self, index: usize) -> Result<ShownReport, AnalysisError> {
        let date = (self.market_date)();
        let item = self
            .history
            .open(index)
            .ok_or(ValidationError::UnknownHistoryEntry(index))?;

        let parts = item.title_parts();
        let instrument_name = if item.mode().is_per_instrument() {
            parts
                .subject
                .as_deref()
                .and_then(|ticker| self.catalog.find(ticker))
                .map(|i| i.name.as_str())
        } else {
            None
        };
        let export_title = export_title(item.mode(), &parts, instrument_name, date);

        let shown = ShownReport {
            id: item.id(),
            title: item.title().to_string(),
            export_title: export_title.clone(),
        };
        self.display = AnalysisDisplay::Report {
            title: item.title().to_string(),
            html: item.html_content().to_string(),
            raw: item.raw_content().to_string(),
            export_title,
            source: ReportSource::History(item.id()),
        };
        Ok(shown)
    }

    /// Sends the displayed report to the document endpoint.
    pub async fn export_document(&self) -> Result<ExportedDocument, AnalysisError> {
        let AnalysisDisplay::Report {
            raw, export_title, ..
        } = &self.display
        else {
            return Err(ValidationError::NothingToExport.into());
        };

        let request = ExportRequest {
            title: export_title.clone(),
            content: raw.clone(),
            ticker: self
                .series
                .as_ref()
                .map(|s| s.ticker.clone())
                .unwrap_or_default(),
        };
        let bytes = self.backend.export_document(&request).await?;
        tracing::info!(title = %request.title, bytes = bytes.len(), "document exported");
        Ok(ExportedDocument {
            title: request.title,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use crate::backend::Endpoint;
    use crate::domain::instrument::fixtures;
    use crate::history::SelectedResult;
    use crate::store::MemoryStore;
    use crate::viewport::{ChartViewport, HeadlessViewport};
    use serde_json::json;

    fn fixed_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn catalog() -> InstrumentCatalog {
        InstrumentCatalog::new(vec![
            Instrument {
                ticker: "7203".to_string(),
                name: "Toyota Motor".to_string(),
                industry: "Manufacturing (Finished Goods)".to_string(),
            },
            Instrument {
                ticker: "6758".to_string(),
                name: "Sony Group".to_string(),
                industry: "Manufacturing (Finished Goods)".to_string(),
            },
            Instrument {
                ticker: "8306".to_string(),
                name: "Mitsubishi UFJ".to_string(),
                industry: "Finance & ICT".to_string(),
            },
        ])
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(backend, Arc::new(MemoryStore::new()), catalog(), 10, 50)
            .with_market_date(fixed_date)
    }

    async fn with_instrument(backend: Arc<ScriptedBackend>) -> AnalysisOrchestrator {
        backend.with_series("7203", fixtures::series(300));
        let mut orch = orchestrator(backend);
        orch.select_instrument("7203").await.unwrap();
        orch
    }

    #[tokio::test]
    async fn selecting_instrument_seeds_every_viewport() {
        let backend = ScriptedBackend::new();
        backend.with_series("7203", fixtures::series(300));
        backend.with_company_info("7203", "**Toyota** builds cars.");

        let price = Arc::new(HeadlessViewport::new());
        let kairi = Arc::new(HeadlessViewport::new());
        let sync = ViewportSync::attach(vec![
            price.clone() as Arc<dyn ChartViewport>,
            kairi.clone() as Arc<dyn ChartViewport>,
        ]);
        let mut orch = orchestrator(backend).with_viewports(sync);

        let window = orch.select_instrument("7203").await.unwrap();
        let expected = ViewportRange::logical(180.0, 300.0);
        assert_eq!(window, expected);
        assert_eq!(price.visible_range(), Some(expected));
        assert_eq!(kairi.visible_range(), Some(expected));
        assert_eq!(price.applied_count(), 1);
        assert_eq!(kairi.applied_count(), 1);

        assert_eq!(orch.recency().get(0).unwrap().ticker, "7203");
        match orch.company_info() {
            Some(CompanyInfo::Loaded { ticker, html, .. }) => {
                assert_eq!(ticker, "7203");
                assert!(html.contains("<strong>Toyota</strong>"));
            }
            other => panic!("unexpected company info: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_data_fetch_keeps_previous_series() {
        let backend = ScriptedBackend::new();
        let mut orch = with_instrument(backend).await;

        let err = orch.select_instrument("6758").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Domain(_)));
        assert_eq!(orch.series().unwrap().ticker, "7203");
        // 6758 is in the catalog, so it still counts as recently used.
        assert_eq!(orch.recency().get(0).unwrap().ticker, "6758");
        assert!(matches!(
            orch.company_info(),
            Some(CompanyInfo::Failed { ticker, .. }) if ticker == "6758"
        ));
    }

    #[tokio::test]
    async fn unknown_ticker_is_not_recorded() {
        let backend = ScriptedBackend::new();
        backend.with_series("9999", fixtures::series(10));
        let mut orch = orchestrator(backend);
        let window = orch.select_instrument("9999").await.unwrap();
        assert_eq!(window, ViewportRange::logical(0.0, 10.0));
        assert!(orch.recency().is_empty());
        assert!(orch.company_info().is_none());
    }

    #[tokio::test]
    async fn selecting_recent_resets_industry_filter() {
        let backend = ScriptedBackend::new();
        backend.with_series("8306", fixtures::series(5));
        let mut orch = with_instrument(backend).await;
        orch.select_instrument("8306").await.unwrap();

        orch.set_industry_filter(IndustryFilter::Only("Finance & ICT".to_string()));
        assert_eq!(orch.visible_instruments().len(), 1);

        orch.select_recent(1).await.unwrap();
        assert_eq!(orch.industry_filter(), &IndustryFilter::All);
        assert_eq!(orch.series().unwrap().ticker, "7203");
        assert_eq!(orch.visible_instruments().len(), 3);

        let err = orch.select_recent(7).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Validation(ValidationError::UnknownRecentEntry(7))
        ));
    }

    #[tokio::test]
    async fn later_session_supersedes_earlier_one() {
        let backend = ScriptedBackend::new();
        let full_tx = backend.script(Endpoint::Full);
        let tech_tx = backend.script(Endpoint::Technical);
        let mut orch = with_instrument(backend.clone()).await;

        let full = orch.begin_analysis().unwrap();
        let full_task = {
            let backend = orch.backend();
            tokio::spawn(async move { full.execute(backend.as_ref()).await })
        };

        orch.select_mode(AnalysisMode::Technical);
        let tech = orch.begin_analysis().unwrap();
        let tech_task = {
            let backend = orch.backend();
            tokio::spawn(async move { tech.execute(backend.as_ref()).await })
        };

        let _ = tech_tx.send(Ok(ScriptedBackend::analysis("tech body", None)));
        let _ = full_tx.send(Ok(ScriptedBackend::analysis("full body", None)));

        let tech_done = tech_task.await.unwrap();
        let full_done = full_task.await.unwrap();

        let shown = orch.complete(tech_done).unwrap();
        assert_eq!(shown.title, "📈 Technical Analysis: 7203");
        assert_eq!(shown.export_title, "7203_Toyota Motor_Technical Analysis_20261015");

        let err = orch.complete(full_done).unwrap_err();
        assert!(err.is_cancelled());

        assert_eq!(orch.history().len(), 1);
        assert_eq!(orch.history().get(0).unwrap().mode(), AnalysisMode::Technical);
        match orch.display() {
            AnalysisDisplay::Report { raw, .. } => {
                assert_eq!(raw, "## Technical Analysis Report\n\ntech body");
            }
            other => panic!("unexpected display: {other:?}"),
        }
        assert!(orch.active_session().is_none());
    }

    #[tokio::test]
    async fn stale_success_is_discarded() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Full, Ok(ScriptedBackend::analysis("first", None)));
        let mut orch = with_instrument(backend.clone()).await;

        let first = orch.begin_analysis().unwrap();
        let first_done = first.execute(backend.as_ref()).await;
        assert!(first_done.outcome.is_ok());

        let second = orch.begin_analysis().unwrap();
        let err = orch.complete(first_done).unwrap_err();
        assert!(err.is_cancelled());
        assert!(orch.history().is_empty());
        assert!(matches!(orch.display(), AnalysisDisplay::Loading { .. }));
        assert_eq!(orch.active_session(), Some(second.id()));
    }

    #[tokio::test]
    async fn stale_failure_is_discarded() {
        let backend = ScriptedBackend::new();
        backend.reply(
            Endpoint::Full,
            Ok(BackendReply::Failure {
                error: "news quota exceeded".to_string(),
            }),
        );
        let mut orch = with_instrument(backend.clone()).await;

        let first = orch.begin_analysis().unwrap();
        let first_done = first.execute(backend.as_ref()).await;
        assert!(matches!(first_done.outcome, Err(AnalysisError::Domain(_))));

        let second = orch.begin_analysis().unwrap();
        let err = orch.complete(first_done).unwrap_err();
        assert!(err.is_cancelled());
        assert!(orch.history().is_empty());
        assert!(matches!(orch.display(), AnalysisDisplay::Loading { .. }));
        assert_eq!(orch.active_session(), Some(second.id()));
    }

    #[tokio::test]
    async fn history_modes_without_selection_make_no_request() {
        let backend = ScriptedBackend::new();
        let mut orch = orchestrator(backend.clone());

        for mode in [
            AnalysisMode::Total,
            AnalysisMode::ReresearchAuto,
            AnalysisMode::ReresearchManual,
        ] {
            orch.select_mode(mode);
            let err = orch.run_analysis().await.unwrap_err();
            assert!(matches!(
                err,
                AnalysisError::Validation(ValidationError::NoReportsSelected)
            ));
        }
        assert!(backend.calls().is_empty());
        assert!(orch.active_session().is_none());
        assert_eq!(orch.display(), &AnalysisDisplay::Hidden);
    }

    #[tokio::test]
    async fn total_analysis_sends_checked_reports() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Full, Ok(ScriptedBackend::analysis("full body", None)));
        backend.reply(
            Endpoint::Market,
            Ok(ScriptedBackend::analysis("market body", Some("2026-10-01 ~ 2026-10-14"))),
        );
        backend.reply(Endpoint::Total, Ok(ScriptedBackend::analysis("combined", None)));
        let mut orch = with_instrument(backend.clone()).await;

        orch.run_analysis().await.unwrap();
        orch.select_mode(AnalysisMode::Market);
        orch.inputs_mut().toggle_topic("BOJ");
        let market = orch.run_analysis().await.unwrap();
        assert_eq!(market.title, "🌍 Market Analysis: BOJ");
        assert_eq!(market.export_title, "Market Analysis_BOJ_20261015");

        // Only the older full report is checked.
        assert!(orch.toggle_history_selected(1).unwrap());
        orch.select_mode(AnalysisMode::Total);
        let total = orch.run_analysis().await.unwrap();
        assert_eq!(total.export_title, "Total Analysis_20261015");

        let (endpoint, body) = backend.calls().pop().unwrap();
        assert_eq!(endpoint, Endpoint::Total);
        assert_eq!(
            body,
            json!({
                "selected_results": [{
                    "title": "🔍 Full Analysis: 7203",
                    "content": "## Full Analysis Report\n\nfull body",
                }]
            })
        );

        let market_item = orch.history().get(1).unwrap();
        assert_eq!(
            market_item.raw_content(),
            "## Market Analysis Report\n\n> **News period:** 2026-10-01 ~ 2026-10-14\n\nmarket body"
        );
        assert_eq!(market_item.date_range(), Some("2026-10-01 ~ 2026-10-14"));
    }

    #[tokio::test]
    async fn reresearch_manual_needs_a_question() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Full, Ok(ScriptedBackend::analysis("full body", None)));
        backend.reply(Endpoint::Reresearch, Ok(ScriptedBackend::analysis("again", None)));
        let mut orch = with_instrument(backend.clone()).await;
        orch.run_analysis().await.unwrap();
        orch.set_history_selected(0, true).unwrap();

        orch.select_mode(AnalysisMode::ReresearchManual);
        let err = orch.run_analysis().await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Validation(ValidationError::EmptyQuestion)
        ));

        orch.inputs_mut().question = "Did guidance change?".to_string();
        let shown = orch.run_analysis().await.unwrap();
        assert_eq!(shown.title, "🔁 Re-research Report: Manual");

        let (endpoint, body) = backend.calls().pop().unwrap();
        assert_eq!(endpoint, Endpoint::Reresearch);
        assert_eq!(body["mode"], "manual");
        assert_eq!(body["question"], "Did guidance change?");
    }

    #[tokio::test]
    async fn domain_error_is_shown_but_not_stored() {
        let backend = ScriptedBackend::new();
        backend.reply(
            Endpoint::Full,
            Ok(BackendReply::Failure {
                error: "news quota exceeded".to_string(),
            }),
        );
        let mut orch = with_instrument(backend).await;

        let err = orch.run_analysis().await.unwrap_err();
        assert!(matches!(err, AnalysisError::Domain(_)));
        assert!(orch.history().is_empty());
        assert_eq!(
            orch.display(),
            &AnalysisDisplay::Failed {
                message: "Error: news quota exceeded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn transport_error_shows_generic_message() {
        let backend = ScriptedBackend::new();
        backend.reply(
            Endpoint::Full,
            Err(TransportError::Status {
                status: 500,
                body: "Traceback".to_string(),
            }),
        );
        let mut orch = with_instrument(backend).await;

        let err = orch.run_analysis().await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transport(_)));
        assert!(orch.history().is_empty());
        match orch.display() {
            AnalysisDisplay::Failed { message } => assert!(!message.contains("Traceback")),
            other => panic!("unexpected display: {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_error_with_failure_status_is_shown_verbatim() {
        use axum::{http::StatusCode, routing::post, Json, Router};
        use std::time::Duration;

        let app = Router::new().route(
            "/analyze_market",
            post(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "no news found for BOJ" })),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let backend =
            HttpBackend::new(&format!("http://{addr}"), None, Duration::from_secs(5)).unwrap();
        let mut orch = AnalysisOrchestrator::new(
            Arc::new(backend),
            Arc::new(MemoryStore::new()),
            catalog(),
            10,
            50,
        )
        .with_market_date(fixed_date);
        orch.select_mode(AnalysisMode::Market);
        orch.inputs_mut().toggle_topic("BOJ");

        let err = orch.run_analysis().await.unwrap_err();
        assert!(matches!(err, AnalysisError::Domain(ref m) if m == "no news found for BOJ"));
        assert!(orch.history().is_empty());
        assert_eq!(
            orch.display(),
            &AnalysisDisplay::Failed {
                message: "Error: no news found for BOJ".to_string()
            }
        );
    }

    #[tokio::test]
    async fn user_cancel_clears_the_panel() {
        let backend = ScriptedBackend::new();
        let _tx = backend.script(Endpoint::Full);
        let mut orch = with_instrument(backend.clone()).await;

        let pending = orch.begin_analysis().unwrap();
        assert_eq!(orch.cancel_active(), Some(pending.id()));
        let done = pending.execute(backend.as_ref()).await;

        let err = orch.complete(done).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(orch.display(), &AnalysisDisplay::Hidden);
        assert!(orch.history().is_empty());
        assert!(orch.active_session().is_none());
        assert_eq!(orch.cancel_active(), None);
    }

    #[tokio::test]
    async fn mode_switch_clears_result_but_not_loading() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Full, Ok(ScriptedBackend::analysis("body", None)));
        let mut orch = with_instrument(backend.clone()).await;
        orch.run_analysis().await.unwrap();

        orch.select_mode(AnalysisMode::Technical);
        assert_eq!(orch.display(), &AnalysisDisplay::Hidden);

        let _tx = backend.script(Endpoint::Technical);
        let _pending = orch.begin_analysis().unwrap();
        orch.select_mode(AnalysisMode::Market);
        assert!(matches!(orch.display(), AnalysisDisplay::Loading { .. }));
        assert!(orch.active_session().is_some());
    }

    #[tokio::test]
    async fn opening_history_redisplays_without_request() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Volume, Ok(ScriptedBackend::analysis("spikes", None)));
        let mut orch = with_instrument(backend.clone()).await;
        orch.select_mode(AnalysisMode::Volume);
        orch.run_analysis().await.unwrap();
        orch.select_mode(AnalysisMode::Market);
        let calls = backend.calls().len();

        let shown = orch.open_history_item(0).unwrap();
        assert_eq!(shown.export_title, "7203_Toyota Motor_Volume Analysis_20261015");
        assert_eq!(backend.calls().len(), calls);
        assert_eq!(orch.history().active().unwrap().id(), shown.id);
        match orch.display() {
            AnalysisDisplay::Report { html, source, .. } => {
                assert!(html.contains("<h2>Volume Analysis Report</h2>"));
                assert_eq!(source, &ReportSource::History(shown.id));
            }
            other => panic!("unexpected display: {other:?}"),
        }

        assert!(matches!(
            orch.open_history_item(3),
            Err(AnalysisError::Validation(ValidationError::UnknownHistoryEntry(3)))
        ));
    }

    #[tokio::test]
    async fn export_requires_a_displayed_report() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Full, Ok(ScriptedBackend::analysis("body", None)));
        let mut orch = with_instrument(backend.clone()).await;

        let err = orch.export_document().await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Validation(ValidationError::NothingToExport)
        ));
        assert!(backend.exports().is_empty());

        orch.run_analysis().await.unwrap();
        let doc = orch.export_document().await.unwrap();
        assert_eq!(doc.title, "7203_Toyota Motor_Full Analysis_20261015");
        assert!(doc.bytes.starts_with(b"%PDF"));

        let sent = backend.exports();
        assert_eq!(
            sent,
            vec![ExportRequest {
                title: "7203_Toyota Motor_Full Analysis_20261015".to_string(),
                content: "## Full Analysis Report\n\nbody".to_string(),
                ticker: "7203".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn toggling_selection_keeps_report_content() {
        let backend = ScriptedBackend::new();
        backend.reply(Endpoint::Full, Ok(ScriptedBackend::analysis("body", None)));
        let mut orch = with_instrument(backend).await;
        orch.run_analysis().await.unwrap();

        let before = orch.history().get(0).unwrap().clone();
        orch.toggle_history_selected(0).unwrap();
        let after = orch.history().get(0).unwrap();
        assert!(after.is_selected());
        assert_eq!(after.raw_content(), before.raw_content());
        assert_eq!(after.html_content(), before.html_content());
        assert_eq!(
            orch.history().selected_results(),
            vec![SelectedResult {
                title: before.title().to_string(),
                content: before.raw_content().to_string(),
            }]
        );
    }
}
