//! CSV file market data adapter.
//!
//! One file per asset, `<base>/<ASSET>.csv`, with at least a `date` and a
//! `close` column. An empty close cell is an explicit missing observation.

use crate::domain::error::PortoptError;
use crate::domain::price_history::PricePoint;
use crate::domain::request::parse_date;
use crate::ports::market_data_port::MarketDataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", asset))
    }

    /// Asset identifiers with a price file under the base path, sorted.
    pub fn list_assets(&self) -> Result<Vec<String>, PortoptError> {
        let mut assets = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    assets.push(stem.to_string_lossy().to_string());
                }
            }
        }
        assets.sort();
        Ok(assets)
    }
}

fn unavailable(asset: &str, reason: String) -> PortoptError {
    PortoptError::DataUnavailable {
        asset: asset.to_string(),
        reason,
    }
}

impl MarketDataPort for CsvPriceAdapter {
    fn fetch_series(
        &self,
        asset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError> {
        let path = self.csv_path(asset);
        let content = fs::read_to_string(&path)
            .map_err(|e| unavailable(asset, format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| unavailable(asset, format!("CSV header error: {}", e)))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| unavailable(asset, format!("missing {} column", name)))
        };
        let date_col = column("date")?;
        let close_col = column("close")?;

        let mut points = Vec::new();
        for result in rdr.records() {
            let record =
                result.map_err(|e| unavailable(asset, format!("CSV parse error: {}", e)))?;

            let date_str = record.get(date_col).unwrap_or_default();
            let date = parse_date(date_str)
                .ok_or_else(|| unavailable(asset, format!("invalid date: {:?}", date_str)))?;

            if date < start_date || date > end_date {
                continue;
            }

            let close = match record.get(close_col).unwrap_or_default() {
                "" => None,
                raw => Some(raw.parse::<f64>().map_err(|e| {
                    unavailable(asset, format!("invalid close value {:?} on {}: {}", raw, date, e))
                })?),
            };

            points.push(PricePoint { date, close });
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}
