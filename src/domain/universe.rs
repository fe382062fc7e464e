//! Asset universe.
//!
//! An ordered list of unique asset identifiers. The order fixes the index of
//! every asset in return vectors, covariance matrices and weight vectors.

use crate::domain::error::PortoptError;
use std::collections::HashSet;

pub const MIN_ASSETS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUniverse {
    assets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),

    #[error("at least 2 assets are required, got {0}")]
    TooFewAssets(usize),
}

impl From<UniverseError> for PortoptError {
    fn from(err: UniverseError) -> Self {
        PortoptError::InvalidUniverse {
            reason: err.to_string(),
        }
    }
}

impl AssetUniverse {
    /// Build a universe from already-split identifiers, normalizing each one.
    pub fn new<I, S>(assets: I) -> Result<Self, UniverseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        let mut seen = HashSet::new();

        for asset in assets {
            let trimmed = asset.as_ref().trim();
            if trimmed.is_empty() {
                return Err(UniverseError::EmptyToken);
            }
            let id = trimmed.to_uppercase();
            if !seen.insert(id.clone()) {
                return Err(UniverseError::DuplicateAsset(id));
            }
            normalized.push(id);
        }

        if normalized.len() < MIN_ASSETS {
            return Err(UniverseError::TooFewAssets(normalized.len()));
        }

        Ok(Self { assets: normalized })
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(String::as_str)
    }
}

/// Parse a comma-separated asset list such as `"AAPL, msft,GOOGL"`.
pub fn parse_assets(input: &str) -> Result<AssetUniverse, UniverseError> {
    AssetUniverse::new(input.split(','))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assets_basic() {
        let universe = parse_assets("AAPL,MSFT,GOOGL").unwrap();
        assert_eq!(universe.assets(), &["AAPL", "MSFT", "GOOGL"]);
        assert_eq!(universe.len(), 3);
    }

    #[test]
    fn parse_assets_trims_and_uppercases() {
        let universe = parse_assets("  aapl , Msft ").unwrap();
        assert_eq!(universe.assets(), &["AAPL", "MSFT"]);
    }

    #[test]
    fn parse_assets_preserves_order() {
        let universe = parse_assets("ZZZ,AAA,MMM").unwrap();
        assert_eq!(universe.index_of("ZZZ"), Some(0));
        assert_eq!(universe.index_of("MMM"), Some(2));
        assert_eq!(universe.index_of("QQQ"), None);
    }

    #[test]
    fn parse_assets_empty_token() {
        assert_eq!(parse_assets("AAPL,,MSFT"), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_assets_duplicate_after_normalizing() {
        assert_eq!(
            parse_assets("AAPL,MSFT,aapl"),
            Err(UniverseError::DuplicateAsset("AAPL".into()))
        );
    }

    #[test]
    fn single_asset_is_rejected() {
        assert_eq!(parse_assets("AAPL"), Err(UniverseError::TooFewAssets(1)));
    }

    #[test]
    fn universe_error_maps_to_invalid_universe() {
        let err: PortoptError = UniverseError::TooFewAssets(1).into();
        assert!(matches!(err, PortoptError::InvalidUniverse { .. }));
    }
}
