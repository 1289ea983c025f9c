use crate::domain::instrument::{ChartSeriesPoint, IndicatorPoint, LoadedSeries};
use crate::error::ValidationError;
use crate::history::SelectedResult;
use crate::mode::AnalysisMode;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InstrumentToggles {
    pub beginner_mode: bool,
    pub deep_analysis: bool,
    pub lite_model: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MarketToggles {
    pub beginner_mode: bool,
    pub deep_analysis: bool,
    pub technical_mode: bool,
    pub short_term: bool,
    pub mid_term: bool,
    pub sector_view: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeDate {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentPayload {
    pub ticker: String,
    pub candles: Vec<ChartSeriesPoint>,
    pub kairi25: Vec<IndicatorPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_ranking: Option<Vec<VolumeDate>>,
    #[serde(flatten)]
    pub toggles: InstrumentToggles,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPayload {
    pub topics: Vec<String>,
    pub free_keyword: String,
    #[serde(flatten)]
    pub toggles: MarketToggles,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalPayload {
    pub selected_results: Vec<SelectedResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReresearchKind {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReresearchPayload {
    pub selected_results: Vec<SelectedResult>,
    pub mode: ReresearchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(flatten)]
    pub toggles: InstrumentToggles,
}

/// Request body for one analysis endpoint. Serialized without a tag; the
/// endpoint decides the shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    Instrument(InstrumentPayload),
    Market(MarketPayload),
    Total(TotalPayload),
    Reresearch(ReresearchPayload),
}

/// Form state the payload builders read from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisInputs {
    pub instrument: InstrumentToggles,
    pub topics: Vec<String>,
    pub free_keyword: String,
    pub market: MarketToggles,
    pub question: String,
    pub reresearch: InstrumentToggles,
}

impl AnalysisInputs {
    /// Adds the topic if absent, removes it otherwise. Returns whether it is
    /// now selected.
    pub fn toggle_topic(&mut self, topic: &str) -> bool {
        let topic = topic.trim();
        if let Some(pos) = self.topics.iter().position(|t| t == topic) {
            self.topics.remove(pos);
            false
        } else {
            self.topics.push(topic.to_string());
            true
        }
    }
}

pub fn build_payload(
    mode: AnalysisMode,
    series: Option<&LoadedSeries>,
    inputs: &AnalysisInputs,
    selected: Vec<SelectedResult>,
) -> Result<AnalysisPayload, ValidationError> {
    let payload = match mode {
        AnalysisMode::Full | AnalysisMode::Technical | AnalysisMode::Volume => {
            let series = series.ok_or(ValidationError::NoInstrument)?;
            let volume_ranking = (mode == AnalysisMode::Volume).then(|| {
                series
                    .data
                    .stats
                    .volume_ranking
                    .iter()
                    .map(|rank| VolumeDate { date: rank.date })
                    .collect()
            });
            AnalysisPayload::Instrument(InstrumentPayload {
                ticker: series.ticker.clone(),
                candles: series.data.candles.clone(),
                kairi25: series.data.kairi25.clone(),
                volume_ranking,
                toggles: inputs.instrument,
            })
        }
        AnalysisMode::Market => AnalysisPayload::Market(MarketPayload {
            topics: inputs.topics.clone(),
            free_keyword: inputs.free_keyword.trim().to_string(),
            toggles: inputs.market,
        }),
        AnalysisMode::Total => {
            if selected.is_empty() {
                return Err(ValidationError::NoReportsSelected);
            }
            AnalysisPayload::Total(TotalPayload {
                selected_results: selected,
            })
        }
        AnalysisMode::ReresearchAuto | AnalysisMode::ReresearchManual => {
            if selected.is_empty() {
                return Err(ValidationError::NoReportsSelected);
            }
            let (kind, question) = if mode == AnalysisMode::ReresearchManual {
                let question = inputs.question.trim();
                if question.is_empty() {
                    return Err(ValidationError::EmptyQuestion);
                }
                (ReresearchKind::Manual, Some(question.to_string()))
            } else {
                (ReresearchKind::Auto, None)
            };
            AnalysisPayload::Reresearch(ReresearchPayload {
                selected_results: selected,
                mode: kind,
                question,
                toggles: inputs.reresearch,
            })
        }
    };
    Ok(payload)
}
