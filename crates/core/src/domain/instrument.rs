use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub industry: String,
}

/// One traded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeriesPoint {
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub time: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRank {
    pub date: NaiveDate,
    pub volume: u64,
}

/// Summary figures returned with a series. Fundamentals arrive preformatted
/// (`"N/A"` when the backend has none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartStats {
    pub max_price: f64,
    pub max_date: NaiveDate,
    pub min_price: f64,
    pub min_date: NaiveDate,
    #[serde(default)]
    pub volume_ranking: Vec<VolumeRank>,
    pub market_cap: String,
    pub per: String,
    pub pbr: String,
    pub roe: String,
    pub roa: String,
    pub dividend_yield: String,
    pub payout_ratio: String,
    pub ex_div_date: String,
}

/// Body of a successful `/get_data` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub candles: Vec<ChartSeriesPoint>,
    #[serde(default)]
    pub sma5: Vec<IndicatorPoint>,
    #[serde(default)]
    pub sma25: Vec<IndicatorPoint>,
    #[serde(default)]
    pub sma75: Vec<IndicatorPoint>,
    #[serde(default)]
    pub kairi25: Vec<IndicatorPoint>,
    pub stats: ChartStats,
}

/// Series currently loaded into the charts, keyed by the ticker it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSeries {
    pub ticker: String,
    pub data: ChartData,
}

impl LoadedSeries {
    pub fn len(&self) -> usize {
        self.data.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.candles.is_empty()
    }

    /// Crosshair readout for the bar at `time`.
    pub fn ohlc_readout(&self, time: NaiveDate) -> Option<OhlcReadout> {
        let candles = &self.data.candles;
        let idx = candles.iter().position(|c| c.time == time)?;
        let bar = &candles[idx];
        let base = if idx > 0 {
            candles[idx - 1].close
        } else {
            bar.open
        };
        let change_pct = if base == 0.0 {
            0.0
        } else {
            (bar.close - base) / base * 100.0
        };
        Some(OhlcReadout {
            time: bar.time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            change_pct,
            sma5: value_at(&self.data.sma5, time),
            sma25: value_at(&self.data.sma25, time),
            sma75: value_at(&self.data.sma75, time),
            kairi25: value_at(&self.data.kairi25, time),
        })
    }
}

fn value_at(points: &[IndicatorPoint], time: NaiveDate) -> Option<f64> {
    points.iter().find(|p| p.time == time).map(|p| p.value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcReadout {
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change_pct: f64,
    /// Indicator values on the same bar. Averages start late in the series.
    pub sma5: Option<f64>,
    pub sma25: Option<f64>,
    pub sma75: Option<f64>,
    pub kairi25: Option<f64>,
}

impl OhlcReadout {
    pub fn is_up(&self) -> bool {
        self.change_pct >= 0.0
    }
}
