use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    #[default]
    Full,
    Technical,
    Volume,
    Market,
    Total,
    ReresearchAuto,
    ReresearchManual,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 7] = [
        AnalysisMode::Full,
        AnalysisMode::Technical,
        AnalysisMode::Volume,
        AnalysisMode::Market,
        AnalysisMode::Total,
        AnalysisMode::ReresearchAuto,
        AnalysisMode::ReresearchManual,
    ];

    /// Tab identifier as shown in the mode selector.
    pub fn tab_id(self) -> &'static str {
        match self {
            AnalysisMode::Full => "full",
            AnalysisMode::Technical => "tech",
            AnalysisMode::Volume => "volume",
            AnalysisMode::Market => "market",
            AnalysisMode::Total => "total",
            AnalysisMode::ReresearchAuto => "reresearch-auto",
            AnalysisMode::ReresearchManual => "reresearch-manual",
        }
    }

    pub fn is_per_instrument(self) -> bool {
        matches!(
            self,
            AnalysisMode::Full | AnalysisMode::Technical | AnalysisMode::Volume
        )
    }

    pub fn is_reresearch(self) -> bool {
        matches!(
            self,
            AnalysisMode::ReresearchAuto | AnalysisMode::ReresearchManual
        )
    }

    /// Modes whose input is the selected report history.
    pub fn uses_history(self) -> bool {
        self == AnalysisMode::Total || self.is_reresearch()
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tab_id())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let mode = match s.as_str() {
            "full" => AnalysisMode::Full,
            "tech" | "technical" => AnalysisMode::Technical,
            "volume" => AnalysisMode::Volume,
            "market" => AnalysisMode::Market,
            "total" => AnalysisMode::Total,
            "reresearch-auto" | "auto" => AnalysisMode::ReresearchAuto,
            "reresearch-manual" | "manual" => AnalysisMode::ReresearchManual,
            other => return Err(format!("unknown analysis mode: {other}")),
        };
        Ok(mode)
    }
}

/// Input form shown under the mode tabs. Per-instrument modes use the chart
/// itself and show none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputForm {
    MarketTopics,
    HistorySelection,
    Reresearch { question: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub form: Option<InputForm>,
    pub guide: &'static str,
}

pub fn visibility(mode: AnalysisMode) -> Visibility {
    let form = match mode {
        AnalysisMode::Full | AnalysisMode::Technical | AnalysisMode::Volume => None,
        AnalysisMode::Market => Some(InputForm::MarketTopics),
        AnalysisMode::Total => Some(InputForm::HistorySelection),
        AnalysisMode::ReresearchAuto => Some(InputForm::Reresearch { question: false }),
        AnalysisMode::ReresearchManual => Some(InputForm::Reresearch { question: true }),
    };
    let guide = match mode {
        AnalysisMode::Full => "full-analysis-guide",
        AnalysisMode::Technical => "tech-analysis-guide",
        AnalysisMode::Volume => "volume-analysis-guide",
        AnalysisMode::Market => "market-analysis-guide",
        AnalysisMode::Total => "total-analysis-guide",
        AnalysisMode::ReresearchAuto => "reresearch-auto-analysis-guide",
        AnalysisMode::ReresearchManual => "reresearch-manual-analysis-guide",
    };
    Visibility { form, guide }
}

/// What the guard of the active mode looks at.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub instrument_loaded: bool,
    pub topics: &'a [String],
    pub free_keyword: &'a str,
    pub selected_reports: usize,
    pub question: &'a str,
}

pub fn check_guard(mode: AnalysisMode, ctx: &GuardContext<'_>) -> Result<(), ValidationError> {
    match mode {
        AnalysisMode::Full | AnalysisMode::Technical | AnalysisMode::Volume => {
            if !ctx.instrument_loaded {
                return Err(ValidationError::NoInstrument);
            }
        }
        AnalysisMode::Market => {
            if ctx.topics.is_empty() && ctx.free_keyword.trim().is_empty() {
                return Err(ValidationError::NoMarketTopic);
            }
        }
        AnalysisMode::Total | AnalysisMode::ReresearchAuto => {
            if ctx.selected_reports == 0 {
                return Err(ValidationError::NoReportsSelected);
            }
        }
        AnalysisMode::ReresearchManual => {
            if ctx.selected_reports == 0 {
                return Err(ValidationError::NoReportsSelected);
            }
            if ctx.question.trim().is_empty() {
                return Err(ValidationError::EmptyQuestion);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub previous: AnalysisMode,
    pub current: AnalysisMode,
}

#[derive(Debug, Clone, Default)]
pub struct ModeState {
    active: AnalysisMode,
}

impl ModeState {
    pub fn new(active: AnalysisMode) -> Self {
        Self { active }
    }

    pub fn active(&self) -> AnalysisMode {
        self.active
    }

    pub fn select(&mut self, mode: AnalysisMode) -> ModeTransition {
        let previous = std::mem::replace(&mut self.active, mode);
        ModeTransition {
            previous,
            current: mode,
        }
    }

    pub fn visibility(&self) -> Visibility {
        visibility(self.active)
    }

    pub fn check(&self, ctx: &GuardContext<'_>) -> Result<(), ValidationError> {
        check_guard(self.active, ctx)
    }
}
