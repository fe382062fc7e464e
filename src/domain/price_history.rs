//! Price history grid and gap handling.
//!
//! A [`PriceHistory`] is the unified, date-ordered view of one closing price
//! per asset per date. Missing observations stay visible as `None` until a
//! [`GapPolicy`] is applied, and every resolved gap lands in a [`GapReport`].

use crate::domain::error::PortoptError;
use crate::domain::return_model::MIN_RETURN_PERIODS;
use crate::domain::universe::AssetUniverse;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Minimum number of real (non-gap) price observations per asset.
pub const MIN_OBSERVATIONS: usize = 2;

/// A single observation as delivered by a market-data provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    /// `None` marks a missing observation reported by the provider.
    pub close: Option<f64>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close: Some(close),
        }
    }

    pub fn missing(date: NaiveDate) -> Self {
        Self { date, close: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    /// Carry the last observed price forward; drop leading dates that precede
    /// some asset's first observation.
    ForwardFill,
    /// Abort on the first missing observation.
    Fail,
}

impl GapPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "forward_fill" | "ffill" | "fill" => Some(GapPolicy::ForwardFill),
            "fail" | "error" => Some(GapPolicy::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapResolution {
    ForwardFilled,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapRecord {
    pub asset: String,
    pub date: NaiveDate,
    pub resolution: GapResolution,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    pub records: Vec<GapRecord>,
    pub dropped_dates: Vec<NaiveDate>,
}

impl GapReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filled_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.resolution == GapResolution::ForwardFilled)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    /// One row per date, one column per asset in universe order.
    rows: Vec<Vec<Option<f64>>>,
}

impl PriceHistory {
    /// Build a history from a ready-made grid.
    pub fn new(
        universe: &AssetUniverse,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, PortoptError> {
        if dates.len() != rows.len() {
            return Err(PortoptError::InvalidInput {
                reason: format!("{} dates but {} price rows", dates.len(), rows.len()),
            });
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PortoptError::InvalidInput {
                reason: format!("dates not strictly increasing at {}", w[1]),
            });
        }

        let assets = universe.assets().to_vec();
        for (date, row) in dates.iter().zip(&rows) {
            if row.len() != assets.len() {
                return Err(PortoptError::InvalidInput {
                    reason: format!(
                        "row for {} has {} prices, expected {}",
                        date,
                        row.len(),
                        assets.len()
                    ),
                });
            }
            for (asset, price) in assets.iter().zip(row) {
                if let Some(p) = *price {
                    if !p.is_finite() || p <= 0.0 {
                        return Err(PortoptError::InvalidPrice {
                            asset: asset.clone(),
                            date: *date,
                            price: p,
                        });
                    }
                }
            }
        }

        Ok(Self {
            assets,
            dates,
            rows,
        })
    }

    /// Merge per-asset series onto a unified timeline. A date present for any
    /// asset becomes a row; assets without an observation on it get a gap.
    pub fn from_series(
        universe: &AssetUniverse,
        series: &[Vec<PricePoint>],
    ) -> Result<Self, PortoptError> {
        if series.len() != universe.len() {
            return Err(PortoptError::InvalidInput {
                reason: format!(
                    "{} price series for {} assets",
                    series.len(),
                    universe.len()
                ),
            });
        }

        let timeline: BTreeSet<NaiveDate> = series
            .iter()
            .flat_map(|s| s.iter().map(|p| p.date))
            .collect();
        let dates: Vec<NaiveDate> = timeline.into_iter().collect();
        let date_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut rows = vec![vec![None; universe.len()]; dates.len()];
        for (col, (asset, points)) in universe.iter().zip(series).enumerate() {
            let mut seen = BTreeSet::new();
            for point in points {
                if !seen.insert(point.date) {
                    return Err(PortoptError::InvalidInput {
                        reason: format!("duplicate observation for {} on {}", asset, point.date),
                    });
                }
                rows[date_index[&point.date]][col] = point.close;
            }
        }

        Self::new(universe, dates, rows)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn observation_count(&self, col: usize) -> usize {
        self.rows.iter().filter(|row| row[col].is_some()).count()
    }

    /// Every missing observation, ordered by date then asset.
    pub fn gaps(&self) -> Vec<(String, NaiveDate)> {
        let mut gaps = Vec::new();
        for (date, row) in self.dates.iter().zip(&self.rows) {
            for (asset, price) in self.assets.iter().zip(row) {
                if price.is_none() {
                    gaps.push((asset.clone(), *date));
                }
            }
        }
        gaps
    }

    pub fn has_gaps(&self) -> bool {
        self.rows.iter().any(|row| row.iter().any(Option::is_none))
    }

    /// Complete price matrix; `None` if any gap remains.
    pub fn complete_rows(&self) -> Option<Vec<Vec<f64>>> {
        self.rows
            .iter()
            .map(|row| row.iter().copied().collect::<Option<Vec<f64>>>())
            .collect()
    }

    /// Reject assets with too little data, then resolve gaps per `policy`.
    pub fn apply_gap_policy(&self, policy: GapPolicy) -> Result<(Self, GapReport), PortoptError> {
        for (col, asset) in self.assets.iter().enumerate() {
            let observations = self.observation_count(col);
            if observations < MIN_OBSERVATIONS {
                return Err(PortoptError::InsufficientHistory {
                    asset: asset.clone(),
                    observations,
                    minimum: MIN_OBSERVATIONS,
                });
            }
        }

        match policy {
            GapPolicy::Fail => match self.gaps().into_iter().next() {
                Some((asset, date)) => Err(PortoptError::DataGap { asset, date }),
                None => Ok((self.clone(), GapReport::default())),
            },
            GapPolicy::ForwardFill => self.forward_fill(),
        }
    }

    fn forward_fill(&self) -> Result<(Self, GapReport), PortoptError> {
        let mut report = GapReport::default();

        // First row at which every asset has been observed at least once,
        // and the asset listed last.
        let mut first_seen = vec![false; self.assets.len()];
        let mut start = self.rows.len();
        let mut last_listed = 0;
        for (i, row) in self.rows.iter().enumerate() {
            for (col, price) in row.iter().enumerate() {
                if price.is_some() && !first_seen[col] {
                    first_seen[col] = true;
                    last_listed = col;
                }
            }
            if first_seen.iter().all(|&s| s) {
                start = i;
                break;
            }
        }

        let aligned = self.rows.len() - start;
        if start > 0 && aligned < MIN_RETURN_PERIODS + 1 {
            return Err(PortoptError::InsufficientHistory {
                asset: self.assets[last_listed].clone(),
                observations: aligned,
                minimum: MIN_RETURN_PERIODS + 1,
            });
        }

        for (date, row) in self.dates[..start].iter().zip(&self.rows[..start]) {
            report.dropped_dates.push(*date);
            for (asset, price) in self.assets.iter().zip(row) {
                if price.is_none() {
                    report.records.push(GapRecord {
                        asset: asset.clone(),
                        date: *date,
                        resolution: GapResolution::Dropped,
                    });
                }
            }
        }

        let mut last: Vec<Option<f64>> = vec![None; self.assets.len()];
        for row in &self.rows[..start] {
            for (col, price) in row.iter().enumerate() {
                if price.is_some() {
                    last[col] = *price;
                }
            }
        }

        let mut rows = Vec::with_capacity(self.rows.len() - start);
        for (date, row) in self.dates[start..].iter().zip(&self.rows[start..]) {
            let mut filled = Vec::with_capacity(row.len());
            for (col, price) in row.iter().enumerate() {
                match price {
                    Some(p) => {
                        last[col] = Some(*p);
                        filled.push(Some(*p));
                    }
                    None => {
                        report.records.push(GapRecord {
                            asset: self.assets[col].clone(),
                            date: *date,
                            resolution: GapResolution::ForwardFilled,
                        });
                        filled.push(last[col]);
                    }
                }
            }
            rows.push(filled);
        }

        if !report.is_empty() {
            tracing::warn!(
                filled = report.filled_count(),
                dropped_dates = report.dropped_dates.len(),
                "resolved price gaps by forward fill"
            );
        }

        let history = Self {
            assets: self.assets.clone(),
            dates: self.dates[start..].to_vec(),
            rows,
        };
        Ok((history, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::universe::parse_assets;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn universe() -> AssetUniverse {
        parse_assets("AAA,BBB").unwrap()
    }

    #[test]
    fn from_series_builds_unified_timeline() {
        let series = vec![
            vec![PricePoint::new(date(2), 10.0), PricePoint::new(date(4), 11.0)],
            vec![PricePoint::new(date(1), 20.0), PricePoint::new(date(2), 21.0)],
        ];
        let history = PriceHistory::from_series(&universe(), &series).unwrap();

        assert_eq!(history.dates(), &[date(1), date(2), date(4)]);
        assert_eq!(history.rows()[0], vec![None, Some(20.0)]);
        assert_eq!(history.rows()[1], vec![Some(10.0), Some(21.0)]);
        assert_eq!(history.rows()[2], vec![Some(11.0), None]);
        assert_eq!(
            history.gaps(),
            vec![("AAA".to_string(), date(1)), ("BBB".to_string(), date(4))]
        );
    }

    #[test]
    fn from_series_keeps_explicit_missing_points() {
        let series = vec![
            vec![PricePoint::new(date(1), 10.0), PricePoint::missing(date(2))],
            vec![PricePoint::new(date(1), 20.0), PricePoint::new(date(2), 21.0)],
        ];
        let history = PriceHistory::from_series(&universe(), &series).unwrap();
        assert!(history.has_gaps());
        assert_eq!(history.observation_count(0), 1);
    }

    #[test]
    fn from_series_rejects_duplicate_dates() {
        let series = vec![
            vec![PricePoint::new(date(1), 10.0), PricePoint::new(date(1), 10.5)],
            vec![PricePoint::new(date(1), 20.0)],
        ];
        let err = PriceHistory::from_series(&universe(), &series).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidInput { .. }));
    }

    #[test]
    fn new_rejects_non_increasing_dates() {
        let rows = vec![vec![Some(1.0), Some(2.0)], vec![Some(1.0), Some(2.0)]];
        let err = PriceHistory::new(&universe(), vec![date(2), date(1)], rows).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidInput { .. }));
    }

    #[test]
    fn new_rejects_non_positive_price() {
        let rows = vec![vec![Some(1.0), Some(0.0)]];
        let err = PriceHistory::new(&universe(), vec![date(1)], rows).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidPrice { asset, .. } if asset == "BBB"));
    }

    #[test]
    fn fail_policy_reports_first_gap() {
        let rows = vec![
            vec![Some(1.0), Some(2.0)],
            vec![Some(1.1), None],
            vec![Some(1.2), Some(2.2)],
        ];
        let history = PriceHistory::new(&universe(), vec![date(1), date(2), date(3)], rows).unwrap();
        let err = history.apply_gap_policy(GapPolicy::Fail).unwrap_err();
        assert!(
            matches!(err, PortoptError::DataGap { asset, date: d } if asset == "BBB" && d == date(2))
        );
    }

    #[test]
    fn fail_policy_passes_complete_history() {
        let rows = vec![vec![Some(1.0), Some(2.0)], vec![Some(1.1), Some(2.1)]];
        let history = PriceHistory::new(&universe(), vec![date(1), date(2)], rows).unwrap();
        let (resolved, report) = history.apply_gap_policy(GapPolicy::Fail).unwrap();
        assert_eq!(resolved, history);
        assert!(report.is_empty());
    }

    #[test]
    fn forward_fill_fills_interior_and_drops_leading() {
        let rows = vec![
            vec![Some(1.0), None],
            vec![Some(1.1), Some(2.0)],
            vec![None, Some(2.1)],
            vec![Some(1.3), Some(2.2)],
        ];
        let dates = vec![date(1), date(2), date(3), date(4)];
        let history = PriceHistory::new(&universe(), dates, rows).unwrap();

        let (filled, report) = history.apply_gap_policy(GapPolicy::ForwardFill).unwrap();

        assert_eq!(filled.dates(), &[date(2), date(3), date(4)]);
        assert_eq!(filled.rows()[1], vec![Some(1.1), Some(2.1)]);
        assert!(!filled.has_gaps());
        assert_eq!(report.dropped_dates, vec![date(1)]);
        assert_eq!(report.filled_count(), 1);
        assert_eq!(
            report.records,
            vec![
                GapRecord {
                    asset: "BBB".into(),
                    date: date(1),
                    resolution: GapResolution::Dropped,
                },
                GapRecord {
                    asset: "AAA".into(),
                    date: date(3),
                    resolution: GapResolution::ForwardFilled,
                },
            ]
        );
    }

    #[test]
    fn insufficient_history_is_rejected_before_filling() {
        let rows = vec![
            vec![Some(1.0), Some(2.0)],
            vec![Some(1.1), None],
            vec![Some(1.2), None],
        ];
        let history = PriceHistory::new(&universe(), vec![date(1), date(2), date(3)], rows).unwrap();
        let err = history.apply_gap_policy(GapPolicy::ForwardFill).unwrap_err();
        assert!(matches!(
            err,
            PortoptError::InsufficientHistory { asset, observations: 1, minimum: 2 } if asset == "BBB"
        ));
    }

    #[test]
    fn late_listing_that_leaves_too_few_rows_names_the_late_asset() {
        let rows = vec![
            vec![Some(1.0), None],
            vec![Some(1.1), None],
            vec![Some(1.2), Some(2.0)],
            vec![Some(1.3), Some(2.1)],
        ];
        let dates = vec![date(1), date(2), date(3), date(4)];
        let history = PriceHistory::new(&universe(), dates, rows).unwrap();

        let err = history.apply_gap_policy(GapPolicy::ForwardFill).unwrap_err();
        assert!(matches!(
            err,
            PortoptError::InsufficientHistory { asset, observations: 2, minimum: 3 } if asset == "BBB"
        ));
    }

    #[test]
    fn complete_rows_requires_no_gaps() {
        let rows = vec![vec![Some(1.0), None]];
        let history = PriceHistory::new(&universe(), vec![date(1)], rows).unwrap();
        assert!(history.complete_rows().is_none());
    }

    #[test]
    fn gap_policy_parse() {
        assert_eq!(GapPolicy::parse("forward_fill"), Some(GapPolicy::ForwardFill));
        assert_eq!(GapPolicy::parse(" FAIL "), Some(GapPolicy::Fail));
        assert_eq!(GapPolicy::parse("interpolate"), None);
    }
}
