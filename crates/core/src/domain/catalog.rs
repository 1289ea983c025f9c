use crate::domain::instrument::Instrument;
use anyhow::Context;
use std::path::Path;

// Display order for industries; anything else sorts after these.
const INDUSTRY_ORDER: &[&str] = &[
    "Market Index",
    "Manufacturing (Finished Goods)",
    "Manufacturing (Materials)",
    "Commerce & Services",
    "Finance & ICT",
    "Chemicals & Pharmaceuticals",
    "Real Estate & Construction",
    "Transport & Logistics",
    "Food",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndustryFilter {
    #[default]
    All,
    Only(String),
}

impl IndustryFilter {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            IndustryFilter::All
        } else {
            IndustryFilter::Only(s.to_string())
        }
    }

    fn matches(&self, instrument: &Instrument) -> bool {
        match self {
            IndustryFilter::All => true,
            IndustryFilter::Only(industry) => instrument.industry == *industry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentCatalog {
    instruments: Vec<Instrument>,
    industries: Vec<String>,
}

impl InstrumentCatalog {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        let mut industries: Vec<String> = Vec::new();
        for instrument in &instruments {
            if !industries.contains(&instrument.industry) {
                industries.push(instrument.industry.clone());
            }
        }
        // Stable sort keeps first-seen order among unknown industries.
        industries.sort_by_key(|industry| {
            INDUSTRY_ORDER
                .iter()
                .position(|known| known == industry)
                .unwrap_or(INDUSTRY_ORDER.len())
        });

        Self {
            instruments,
            industries,
        }
    }

    /// Catalog used when no instrument list is configured.
    pub fn builtin() -> Self {
        Self::new(vec![Instrument {
            ticker: "^N225".to_string(),
            name: "Nikkei 225".to_string(),
            industry: "Market Index".to_string(),
        }])
    }

    /// Loads a JSON array of `{ticker, name, industry}`.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let instruments = serde_json::from_str::<Vec<Instrument>>(&text)
            .with_context(|| format!("catalog {} is not a valid instrument list", path.display()))?;
        anyhow::ensure!(!instruments.is_empty(), "catalog {} is empty", path.display());
        for instrument in &instruments {
            anyhow::ensure!(
                !instrument.ticker.trim().is_empty(),
                "catalog entry with empty ticker"
            );
        }
        Ok(Self::new(instruments))
    }

    pub fn industries(&self) -> &[String] {
        &self.industries
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn find(&self, ticker: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.ticker == ticker)
    }

    pub fn filtered<'a>(
        &'a self,
        filter: &'a IndustryFilter,
    ) -> impl Iterator<Item = &'a Instrument> + 'a {
        self.instruments.iter().filter(move |i| filter.matches(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn instrument(ticker: &str, industry: &str) -> Instrument {
        Instrument {
            ticker: ticker.to_string(),
            name: format!("Name {ticker}"),
            industry: industry.to_string(),
        }
    }

    #[test]
    fn industries_follow_preferred_order() {
        let catalog = InstrumentCatalog::new(vec![
            instrument("8306", "Finance & ICT"),
            instrument("9999", "Space"),
            instrument("7203", "Manufacturing (Finished Goods)"),
            instrument("^N225", "Market Index"),
        ]);
        assert_eq!(
            catalog.industries(),
            &[
                "Market Index".to_string(),
                "Manufacturing (Finished Goods)".to_string(),
                "Finance & ICT".to_string(),
                "Space".to_string(),
            ]
        );
    }

    #[test]
    fn filter_narrows_by_industry() {
        let catalog = InstrumentCatalog::new(vec![
            instrument("8306", "Finance & ICT"),
            instrument("7203", "Manufacturing (Finished Goods)"),
        ]);
        let filter = IndustryFilter::parse("Finance & ICT");
        let tickers: Vec<_> = catalog.filtered(&filter).map(|i| i.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["8306"]);

        let all = IndustryFilter::parse("all");
        assert_eq!(catalog.filtered(&all).count(), 2);
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"ticker": "7203", "name": "Toyota Motor", "industry": "Manufacturing (Finished Goods)"}}]"#
        )
        .unwrap();

        let catalog = InstrumentCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.find("7203").unwrap().name, "Toyota Motor");
        assert!(catalog.find("6758").is_none());
    }

    #[test]
    fn rejects_empty_catalog_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(InstrumentCatalog::from_json_file(file.path()).is_err());
    }
}
