// Per-brand confidence thresholds
//
// The key set of the map is the set of brands the pipeline considers.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BRANDS, DEFAULT_BRAND_THRESHOLD};
use crate::error::{LogoTrackError, Result};

/// Brand -> minimum confidence required for a candidate to be accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdMap(BTreeMap<String, f64>);

impl ThresholdMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The stock brand set, each at the default threshold.
    pub fn default_brands() -> Self {
        DEFAULT_BRANDS
            .iter()
            .map(|b| (b.to_string(), DEFAULT_BRAND_THRESHOLD as f64))
            .collect()
    }

    /// Same threshold for every listed brand.
    pub fn uniform<I, S>(brands: I, threshold: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        brands.into_iter().map(|b| (b.into(), threshold)).collect()
    }

    pub fn with(mut self, brand: impl Into<String>, threshold: f64) -> Self {
        self.insert(brand, threshold);
        self
    }

    pub fn insert(&mut self, brand: impl Into<String>, threshold: f64) {
        self.0.insert(brand.into(), threshold);
    }

    pub fn get(&self, brand: &str) -> Option<f64> {
        self.0.get(brand).copied()
    }

    pub fn contains(&self, brand: &str) -> bool {
        self.0.contains_key(brand)
    }

    pub fn brands(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowest configured threshold. Used as the detector's floor so it never
    /// drops a candidate the gate would keep.
    pub fn min_confidence(&self) -> Option<f64> {
        self.0.values().copied().reduce(f64::min)
    }

    /// Reject empty maps, blank brand names and thresholds outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(LogoTrackError::InvalidThresholds(
                "at least one brand threshold is required".to_string(),
            ));
        }

        for (brand, threshold) in &self.0 {
            if brand.trim().is_empty() {
                return Err(LogoTrackError::InvalidThresholds("brand name is empty".to_string()));
            }
            if !threshold.is_finite() || !(0.0..=1.0).contains(threshold) {
                return Err(LogoTrackError::InvalidThresholds(format!(
                    "threshold for '{}' must be within [0, 1], got {}",
                    brand, threshold
                )));
            }
        }

        Ok(())
    }

    /// Parse a `brand=value` assignment as given on the command line.
    pub fn parse_assignment(input: &str) -> Result<(String, f64)> {
        let (brand, value) = input.split_once('=').ok_or_else(|| {
            LogoTrackError::InvalidThresholds(format!("expected brand=value, got '{}'", input))
        })?;

        let brand = brand.trim();
        let value: f64 = value.trim().parse().map_err(|_| {
            LogoTrackError::InvalidThresholds(format!("invalid threshold value in '{}'", input))
        })?;

        if brand.is_empty() {
            return Err(LogoTrackError::InvalidThresholds(format!("missing brand in '{}'", input)));
        }

        Ok((brand.to_string(), value))
    }
}

impl FromIterator<(String, f64)> for ThresholdMap {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
