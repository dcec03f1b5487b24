// Filter criteria, price buckets and date ranges
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::{Bound, RangeBounds};
use thiserror::Error;

use crate::models::normalize_room_type;

// Refused criteria changes. The engine state is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Unknown price bucket: {0}")]
    UnknownPriceBucket(String),

    #[error("Rating {0} is outside the 1-5 scale")]
    RatingOutOfScale(u8),

    #[error("Room type label is empty")]
    EmptyRoomType,

    #[error("Country not found: {0}")]
    CountryNotFound(String),

    #[error("Invalid value for query parameter {param}: {value}")]
    InvalidQueryValue { param: String, value: String },
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub fn rating_scale() -> impl Iterator<Item = u8> {
    MIN_RATING..=MAX_RATING
}

/// A named nightly price range.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBucket {
    pub label: String,
    pub lower: Bound<f64>,
    pub upper: Bound<f64>,
}

impl PriceBucket {
    pub fn under(label: impl Into<String>, max: f64) -> Self {
        Self {
            label: label.into(),
            lower: Bound::Unbounded,
            upper: Bound::Excluded(max),
        }
    }

    pub fn over(label: impl Into<String>, min: f64) -> Self {
        Self {
            label: label.into(),
            lower: Bound::Excluded(min),
            upper: Bound::Unbounded,
        }
    }

    pub fn between(label: impl Into<String>, lower: Bound<f64>, max: f64) -> Self {
        Self {
            label: label.into(),
            lower,
            upper: Bound::Included(max),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        (self.lower, self.upper).contains(&price)
    }
}

/// The closed set of price buckets offered by the catalog, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBucketTable {
    buckets: Vec<PriceBucket>,
}

impl Default for PriceBucketTable {
    fn default() -> Self {
        Self::with_currency("DT")
    }
}

impl PriceBucketTable {
    pub fn new(buckets: Vec<PriceBucket>) -> Self {
        Self { buckets }
    }

    /// Standard catalog buckets. A range bucket excludes its lower bound when the
    /// previous bucket already ends there, so a boundary price lands in exactly one bucket.
    pub fn with_currency(currency: &str) -> Self {
        const RANGES: [(f64, f64); 8] = [
            (100.0, 200.0),
            (200.0, 300.0),
            (300.0, 400.0),
            (400.0, 500.0),
            (500.0, 600.0),
            (600.0, 700.0),
            (700.0, 800.0),
            (800.0, 900.0),
        ];

        let mut buckets = vec![PriceBucket::under(format!("Under 80 {}", currency), 80.0)];
        let mut previous_upper: Option<f64> = None;
        for (min, max) in RANGES {
            let lower = if previous_upper == Some(min) {
                Bound::Excluded(min)
            } else {
                Bound::Included(min)
            };
            buckets.push(PriceBucket::between(
                format!("{} to {} {}", min, max, currency),
                lower,
                max,
            ));
            previous_upper = Some(max);
        }
        buckets.push(PriceBucket::over(format!("Over 1000 {}", currency), 1000.0));

        Self { buckets }
    }

    pub fn get(&self, label: &str) -> Option<&PriceBucket> {
        self.buckets.iter().find(|bucket| bucket.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|bucket| bucket.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket_for_price(&self, price: f64) -> Option<&PriceBucket> {
        self.buckets.iter().find(|bucket| bucket.contains(price))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unset(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => {
                Err(FilterError::InvalidRange { start, end })
            }
            _ => Ok(()),
        }
    }

    /// Whether a listing's inclusive availability window satisfies this range.
    /// A missing window never satisfies an active range.
    pub fn admits(&self, window: Option<(NaiveDate, NaiveDate)>) -> bool {
        if self.is_unset() {
            return true;
        }
        let Some((from, until)) = window else {
            return false;
        };

        match (self.start, self.end) {
            (Some(start), None) => start >= from && start <= until,
            (None, Some(end)) => end >= from && end <= until,
            (Some(start), Some(end)) => start <= until && end >= from,
            (None, None) => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub search: String,
    pub country: Option<String>,
    pub price_buckets: BTreeSet<String>,
    pub ratings: BTreeSet<u8>,
    // Stored in normalized display form
    pub room_types: BTreeSet<String>,
    pub date_range: DateRange,
}

impl FilterCriteria {
    pub fn is_unconstrained(&self) -> bool {
        self.search.is_empty()
            && self.country.is_none()
            && self.price_buckets.is_empty()
            && self.ratings.is_empty()
            && self.room_types.is_empty()
            && self.date_range.is_unset()
    }

    pub fn clear(&mut self, preserve_country: bool) {
        let country = self.country.take();
        *self = Self::default();
        if preserve_country {
            self.country = country;
        }
    }

    pub(crate) fn room_type_keys(&self) -> Vec<String> {
        self.room_types
            .iter()
            .map(|label| crate::models::room_type_key(label))
            .collect()
    }
}

/// Catalog page query parameters (`?search=..&pays=..&start=..&end=..&price=..`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    #[serde(rename = "pays")]
    pub country: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub price: Option<String>,
}

impl CatalogQuery {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let value = value.into();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "search" => query.search = Some(value),
                "pays" => query.country = Some(value),
                "start" => query.start = Some(value),
                "end" => query.end = Some(value),
                "price" => query.price = Some(value),
                _ => {}
            }
        }
        query
    }

    pub fn date_range(&self) -> Result<DateRange, FilterError> {
        Ok(DateRange::new(
            parse_query_date("start", self.start.as_deref())?,
            parse_query_date("end", self.end.as_deref())?,
        ))
    }

    pub fn price(&self) -> Result<Option<f64>, FilterError> {
        self.price
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|price| price.is_finite())
                    .ok_or_else(|| FilterError::InvalidQueryValue {
                        param: "price".to_string(),
                        value: raw.to_string(),
                    })
            })
            .transpose()
    }
}

fn parse_query_date(param: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, FilterError> {
    raw.map(|value| {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
            FilterError::InvalidQueryValue {
                param: param.to_string(),
                value: value.to_string(),
            }
        })
    })
    .transpose()
}

pub(crate) fn canonical_room_type(label: &str) -> Result<String, FilterError> {
    let normalized = normalize_room_type(label);
    if normalized.is_empty() {
        return Err(FilterError::EmptyRoomType);
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_default_bucket_labels() {
        let table = PriceBucketTable::default();
        let labels: Vec<&str> = table.labels().collect();
        assert_eq!(labels.len(), 10);
        assert_eq!(labels[0], "Under 80 DT");
        assert_eq!(labels[1], "100 to 200 DT");
        assert_eq!(labels[8], "800 to 900 DT");
        assert_eq!(labels[9], "Over 1000 DT");
    }

    #[test_case("Under 80 DT", 79.99, true; "under below limit")]
    #[test_case("Under 80 DT", 80.0, false; "under at limit")]
    #[test_case("100 to 200 DT", 100.0, true; "first range includes its lower bound")]
    #[test_case("100 to 200 DT", 200.0, true; "range includes upper bound")]
    #[test_case("200 to 300 DT", 200.0, false; "shared lower bound excluded")]
    #[test_case("200 to 300 DT", 200.01, true; "just above shared bound")]
    #[test_case("Over 1000 DT", 1000.0, false; "over at limit")]
    #[test_case("Over 1000 DT", 1000.5, true; "over above limit")]
    fn test_bucket_boundaries(label: &str, price: f64, expected: bool) {
        let table = PriceBucketTable::default();
        let bucket = table.get(label).unwrap();
        assert_eq!(bucket.contains(price), expected);
    }

    #[test]
    fn test_bucket_for_price() {
        let table = PriceBucketTable::default();
        assert_eq!(
            table.bucket_for_price(200.0).map(|b| b.label.as_str()),
            Some("100 to 200 DT")
        );
        assert_eq!(
            table.bucket_for_price(50.0).map(|b| b.label.as_str()),
            Some("Under 80 DT")
        );
        // Gaps between buckets select nothing
        assert!(table.bucket_for_price(90.0).is_none());
        assert!(table.bucket_for_price(950.0).is_none());
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let range = DateRange::new(Some(date("2025-02-01")), Some(date("2025-01-01")));
        assert_eq!(
            range.validate(),
            Err(FilterError::InvalidRange {
                start: date("2025-02-01"),
                end: date("2025-01-01"),
            })
        );
        assert!(DateRange::new(Some(date("2025-02-01")), None).validate().is_ok());
        assert!(DateRange::new(Some(date("2025-01-01")), Some(date("2025-01-01")))
            .validate()
            .is_ok());
    }

    #[test_case(Some("2025-01-15"), None, true; "start inside window")]
    #[test_case(Some("2025-01-25"), None, false; "start after window")]
    #[test_case(None, Some("2025-01-10"), true; "end on window start")]
    #[test_case(None, Some("2025-01-05"), false; "end before window")]
    #[test_case(Some("2025-01-18"), Some("2025-01-25"), true; "overlapping range")]
    #[test_case(Some("2025-01-21"), Some("2025-01-25"), false; "disjoint range")]
    #[test_case(Some("2025-01-01"), Some("2025-01-31"), true; "enclosing range")]
    fn test_date_range_admits(start: Option<&str>, end: Option<&str>, expected: bool) {
        let range = DateRange::new(start.map(date), end.map(date));
        let window = Some((date("2025-01-10"), date("2025-01-20")));
        assert_eq!(range.admits(window), expected);
    }

    #[test]
    fn test_missing_window_fails_active_range() {
        let range = DateRange::new(Some(date("2025-01-15")), None);
        assert!(!range.admits(None));
        assert!(DateRange::default().admits(None));
    }

    #[test]
    fn test_clear_preserves_country_on_request() {
        let mut criteria = FilterCriteria {
            search: "spa".to_string(),
            country: Some("FR".to_string()),
            ..Default::default()
        };
        criteria.ratings.insert(4);
        criteria.clear(true);
        assert_eq!(criteria.country.as_deref(), Some("FR"));
        assert!(criteria.search.is_empty());
        assert!(criteria.ratings.is_empty());

        criteria.clear(false);
        assert!(criteria.is_unconstrained());
    }

    #[test]
    fn test_query_from_pairs() {
        let query = CatalogQuery::from_pairs(vec![
            ("search", "marina"),
            ("pays", "TN"),
            ("start", "2025-03-01"),
            ("end", ""),
            ("utm_source", "mail"),
            ("price", "150"),
        ]);
        assert_eq!(query.search.as_deref(), Some("marina"));
        assert_eq!(query.country.as_deref(), Some("TN"));
        assert_eq!(query.end, None);
        assert_eq!(query.price().unwrap(), Some(150.0));
        assert_eq!(
            query.date_range().unwrap(),
            DateRange::new(Some(date("2025-03-01")), None)
        );
    }

    #[test]
    fn test_query_rejects_malformed_values() {
        let query = CatalogQuery::from_pairs(vec![("start", "03/01/2025"), ("price", "cheap")]);
        assert!(matches!(
            query.date_range(),
            Err(FilterError::InvalidQueryValue { ref param, .. }) if param == "start"
        ));
        assert!(matches!(
            query.price(),
            Err(FilterError::InvalidQueryValue { ref param, .. }) if param == "price"
        ));
    }
}
