use crate::mode::AnalysisMode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Leading markers that decorate history titles per mode.
const DECORATIONS: &[&str] = &["🔍 ", "📈 ", "📊 ", "🌍 ", "💎 ", "🔁 "];
const DECORATION_WORDS: &[&str] = &[" Report", " Result"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(Uuid);

impl ReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Inputs that name a report.
#[derive(Debug, Clone, Copy)]
pub enum TitleSubject<'a> {
    Instrument { ticker: &'a str },
    Market { topics: &'a [String], free_keyword: &'a str },
    None,
}

pub fn synthesize_title(mode: AnalysisMode, subject: TitleSubject<'_>) -> String {
    match (mode, subject) {
        (AnalysisMode::Full, TitleSubject::Instrument { ticker }) => {
            format!("🔍 Full Analysis: {ticker}")
        }
        (AnalysisMode::Technical, TitleSubject::Instrument { ticker }) => {
            format!("📈 Technical Analysis: {ticker}")
        }
        (AnalysisMode::Volume, TitleSubject::Instrument { ticker }) => {
            format!("📊 Volume Analysis: {ticker}")
        }
        (
            AnalysisMode::Market,
            TitleSubject::Market {
                topics,
                free_keyword,
            },
        ) => {
            let subject = if !topics.is_empty() {
                topics.join(", ")
            } else if !free_keyword.trim().is_empty() {
                free_keyword.trim().to_string()
            } else {
                "Free keyword".to_string()
            };
            format!("🌍 Market Analysis: {subject}")
        }
        (AnalysisMode::Total, _) => "💎 Total Analysis Report".to_string(),
        (AnalysisMode::ReresearchAuto, _) => "🔁 Re-research Report: Auto".to_string(),
        (AnalysisMode::ReresearchManual, _) => "🔁 Re-research Report: Manual".to_string(),
        // A per-instrument or market title without its subject.
        (mode, _) => format!("{} Analysis", mode.tab_id()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleParts {
    pub label: String,
    pub subject: Option<String>,
}

/// Splits a stored title into its mode label and subject with the
/// decoration tokens removed.
pub fn strip_decorations(title: &str) -> TitleParts {
    let mut rest = title.trim();
    for marker in DECORATIONS {
        if let Some(stripped) = rest.strip_prefix(marker) {
            rest = stripped;
            break;
        }
    }

    let (label, subject) = match rest.split_once(": ") {
        Some((label, subject)) => (label, Some(subject.trim().to_string())),
        None => (rest, None),
    };

    let mut label = label.to_string();
    for word in DECORATION_WORDS {
        label = label.replace(word, "");
    }

    TitleParts {
        label: label.trim().to_string(),
        subject: subject.filter(|s| !s.is_empty()),
    }
}

/// File-name friendly title for a document export:
/// `ticker_name_label_yyyymmdd` for instrument reports,
/// `label_subject_yyyymmdd` otherwise. Empty parts are skipped.
pub fn export_title(
    mode: AnalysisMode,
    parts: &TitleParts,
    instrument_name: Option<&str>,
    date: NaiveDate,
) -> String {
    let date = date.format("%Y%m%d").to_string();
    let subject = parts.subject.as_deref().unwrap_or("");
    let pieces: Vec<&str> = if mode.is_per_instrument() {
        vec![
            subject,
            instrument_name.unwrap_or(""),
            parts.label.as_str(),
            date.as_str(),
        ]
    } else {
        vec![parts.label.as_str(), subject, date.as_str()]
    };
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedResult {
    pub title: String,
    pub content: String,
}

/// A completed analysis. Only `selected` changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportHistoryItem {
    id: ReportId,
    mode: AnalysisMode,
    title: String,
    raw_content: String,
    html_content: String,
    date_range: Option<String>,
    selected: bool,
    timestamp: DateTime<Utc>,
}

impl ReportHistoryItem {
    pub fn new(
        mode: AnalysisMode,
        title: String,
        raw_content: String,
        html_content: String,
        date_range: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReportId::new(),
            mode,
            title,
            raw_content,
            html_content,
            date_range,
            selected: false,
            timestamp,
        }
    }

    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn html_content(&self) -> &str {
        &self.html_content
    }

    pub fn date_range(&self) -> Option<&str> {
        self.date_range.as_deref()
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn title_parts(&self) -> TitleParts {
        strip_decorations(&self.title)
    }
}

/// Completed reports, newest first.
#[derive(Debug, Clone)]
pub struct ReportHistoryStore {
    capacity: usize,
    items: Vec<ReportHistoryItem>,
    active: Option<ReportId>,
}

impl ReportHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Vec::new(),
            active: None,
        }
    }

    pub fn items(&self) -> &[ReportHistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReportHistoryItem> {
        self.items.get(index)
    }

    pub fn find(&self, id: ReportId) -> Option<&ReportHistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn push(&mut self, item: ReportHistoryItem) -> ReportId {
        let id = item.id;
        self.items.insert(0, item);
        if self.items.len() > self.capacity {
            let evicted = self.items.split_off(self.capacity);
            if let Some(active) = self.active {
                if evicted.iter().any(|item| item.id == active) {
                    self.active = None;
                }
            }
            tracing::debug!(evicted = evicted.len(), "report history over capacity");
        }
        id
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) -> Option<bool> {
        let item = self.items.get_mut(index)?;
        item.selected = selected;
        Some(item.selected)
    }

    pub fn toggle_selected(&mut self, index: usize) -> Option<bool> {
        let item = self.items.get_mut(index)?;
        item.selected = !item.selected;
        Some(item.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|item| item.selected).count()
    }

    /// Title/content pairs of the currently checked entries, in display order.
    pub fn selected_results(&self) -> Vec<SelectedResult> {
        self.items
            .iter()
            .filter(|item| item.selected)
            .map(|item| SelectedResult {
                title: item.title.clone(),
                content: item.raw_content.clone(),
            })
            .collect()
    }

    /// Marks the entry at `index` as the one on display.
    pub fn open(&mut self, index: usize) -> Option<&ReportHistoryItem> {
        let item = self.items.get(index)?;
        self.active = Some(item.id);
        Some(item)
    }

    pub fn active(&self) -> Option<&ReportHistoryItem> {
        self.active.and_then(|id| self.find(id))
    }
}
