use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Calendar date in Tokyo at `now_utc`. Export titles are stamped with it.
pub fn market_date(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    let jst = chrono::FixedOffset::east_opt(JST_OFFSET_SECS).context("invalid JST offset")?;
    Ok(now_utc.with_timezone(&jst).date_naive())
}

pub fn today() -> NaiveDate {
    let now = Utc::now();
    market_date(now).unwrap_or_else(|_| now.date_naive())
}
