//! Market data access port.

use crate::domain::error::PortoptError;
use crate::domain::price_history::{PriceHistory, PricePoint};
use crate::domain::universe::AssetUniverse;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Daily closing prices for one asset within `[start_date, end_date]`.
    /// A point with `close: None` is an explicit missing observation.
    fn fetch_series(
        &self,
        asset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError>;

    /// Fetch every asset and merge the series onto one timeline.
    fn fetch(
        &self,
        universe: &AssetUniverse,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceHistory, PortoptError> {
        let mut series = Vec::with_capacity(universe.len());
        for asset in universe.iter() {
            let points = self
                .fetch_series(asset, start_date, end_date)
                .map_err(|e| match e {
                    PortoptError::Io(io) => PortoptError::DataUnavailable {
                        asset: asset.to_string(),
                        reason: io.to_string(),
                    },
                    other => other,
                })?;
            if points.is_empty() {
                return Err(PortoptError::DataUnavailable {
                    asset: asset.to_string(),
                    reason: format!("no observations between {} and {}", start_date, end_date),
                });
            }
            tracing::debug!(asset, points = points.len(), "fetched price series");
            series.push(points);
        }
        PriceHistory::from_series(universe, &series)
    }
}
