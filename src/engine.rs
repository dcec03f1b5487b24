// Catalog filter engine: holds the loaded catalog and the active criteria,
// and keeps the filtered view in step with every criteria change.
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::criteria::{
    canonical_room_type, rating_scale, CatalogQuery, DateRange, FilterCriteria, FilterError,
    PriceBucket, PriceBucketTable, MAX_RATING, MIN_RATING,
};
use crate::models::{normalize_room_type, CountryRecord, IndexedListing, ListingRecord};

/// Criteria prepared once per filter pass.
struct Predicate<'c> {
    criteria: &'c FilterCriteria,
    search: String,
    room_type_keys: Vec<String>,
    buckets: Vec<&'c PriceBucket>,
}

impl<'c> Predicate<'c> {
    fn new(criteria: &'c FilterCriteria, buckets: &'c PriceBucketTable) -> Self {
        Self {
            criteria,
            search: criteria.search.to_lowercase(),
            room_type_keys: criteria.room_type_keys(),
            buckets: criteria
                .price_buckets
                .iter()
                .filter_map(|label| buckets.get(label))
                .collect(),
        }
    }

    fn matches(&self, listing: &IndexedListing) -> bool {
        let criteria = self.criteria;
        let record = &listing.record;

        let name_match =
            self.search.is_empty() || record.name.to_lowercase().contains(&self.search);

        let country_match = criteria
            .country
            .as_ref()
            .map_or(true, |country| &record.country_id == country);

        let price_match = criteria.price_buckets.is_empty()
            || listing.starting_price.amount().map_or(false, |price| {
                self.buckets.iter().any(|bucket| bucket.contains(price))
            });

        let rating_match = criteria.ratings.is_empty() || criteria.ratings.contains(&record.rating);

        let room_type_match = self.room_type_keys.is_empty()
            || record.rooms.iter().any(|room| {
                room.room_type_key()
                    .map_or(false, |key| self.room_type_keys.contains(&key))
            });

        let date_match = criteria.date_range.admits(record.availability_window());

        name_match && country_match && price_match && rating_match && room_type_match && date_match
    }
}

/// Applies `criteria` to `listings`, keeping load order.
pub fn filter_listings<'a>(
    listings: &'a [IndexedListing],
    criteria: &FilterCriteria,
    buckets: &PriceBucketTable,
) -> Vec<&'a IndexedListing> {
    let predicate = Predicate::new(criteria, buckets);
    listings
        .iter()
        .filter(|listing| predicate.matches(listing))
        .collect()
}

#[derive(Debug, Default)]
pub struct CatalogFilterEngine {
    listings: Vec<IndexedListing>,
    countries: Vec<CountryRecord>,
    criteria: FilterCriteria,
    buckets: PriceBucketTable,
    // Indexes into `listings`
    filtered: Vec<usize>,
    loaded: bool,
}

impl CatalogFilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buckets(buckets: PriceBucketTable) -> Self {
        Self {
            buckets,
            ..Default::default()
        }
    }

    /// Replaces the loaded catalog. Criteria are kept.
    pub fn load(&mut self, listings: Vec<ListingRecord>, countries: Vec<CountryRecord>) {
        self.listings = listings.into_iter().map(IndexedListing::from).collect();
        self.countries = countries;
        self.loaded = true;
        info!(
            "Loaded {} listings and {} countries",
            self.listings.len(),
            self.countries.len()
        );
        self.recompute();
    }

    /// Loads only the listings of the country named `country_name`.
    pub fn load_scoped_to_country(
        &mut self,
        listings: Vec<ListingRecord>,
        countries: Vec<CountryRecord>,
        country_name: &str,
    ) -> Result<(), FilterError> {
        let country_id = countries
            .iter()
            .find(|country| country.name == country_name)
            .map(|country| country.id.clone())
            .ok_or_else(|| {
                warn!("Country {} not found, keeping previous catalog", country_name);
                FilterError::CountryNotFound(country_name.to_string())
            })?;

        let scoped = listings
            .into_iter()
            .filter(|listing| listing.country_id == country_id)
            .collect();
        self.load(scoped, countries);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn listings(&self) -> impl Iterator<Item = &IndexedListing> {
        self.listings.iter()
    }

    pub fn countries(&self) -> &[CountryRecord] {
        &self.countries
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn buckets(&self) -> &PriceBucketTable {
        &self.buckets
    }

    /// Current filtered view, in load order.
    pub fn filtered(&self) -> Vec<&IndexedListing> {
        self.filtered
            .iter()
            .filter_map(|&index| self.listings.get(index))
            .collect()
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    fn recompute(&mut self) {
        let predicate = Predicate::new(&self.criteria, &self.buckets);
        self.filtered = self
            .listings
            .iter()
            .enumerate()
            .filter(|(_, listing)| predicate.matches(listing))
            .map(|(index, _)| index)
            .collect();
        debug!(
            "Recomputed filtered view: {} of {} listings",
            self.filtered.len(),
            self.listings.len()
        );
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.criteria.search = text.into();
        self.recompute();
    }

    /// Sets the country constraint; an empty id clears it.
    pub fn set_country(&mut self, country_id: impl Into<String>) {
        let country_id = country_id.into();
        self.criteria.country = if country_id.is_empty() {
            None
        } else {
            Some(country_id)
        };
        self.recompute();
    }

    pub fn validate_date_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(), FilterError> {
        DateRange::new(start, end).validate()
    }

    /// Replaces the date range. An invalid range is refused and nothing changes.
    pub fn set_date_range(
        &mut self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(), FilterError> {
        let range = DateRange::new(start, end);
        if let Err(err) = range.validate() {
            warn!("Refusing date range: {}", err);
            return Err(err);
        }
        self.criteria.date_range = range;
        self.recompute();
        Ok(())
    }

    /// Flips membership of a price bucket. Returns whether it is now selected.
    pub fn toggle_price_bucket(&mut self, label: &str) -> Result<bool, FilterError> {
        if self.buckets.get(label).is_none() {
            warn!("Refusing unknown price bucket {}", label);
            return Err(FilterError::UnknownPriceBucket(label.to_string()));
        }
        let selected = toggle(&mut self.criteria.price_buckets, label.to_string());
        self.recompute();
        Ok(selected)
    }

    pub fn select_all_price_buckets(&mut self) {
        self.criteria.price_buckets = self.buckets.labels().map(str::to_string).collect();
        self.recompute();
    }

    pub fn clear_price_buckets(&mut self) {
        self.criteria.price_buckets.clear();
        self.recompute();
    }

    pub fn all_price_buckets_selected(&self) -> bool {
        !self.buckets.is_empty()
            && self
                .buckets
                .labels()
                .all(|label| self.criteria.price_buckets.contains(label))
    }

    pub fn toggle_rating(&mut self, rating: u8) -> Result<bool, FilterError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            warn!("Refusing rating {}", rating);
            return Err(FilterError::RatingOutOfScale(rating));
        }
        let selected = toggle(&mut self.criteria.ratings, rating);
        self.recompute();
        Ok(selected)
    }

    pub fn select_all_ratings(&mut self) {
        self.criteria.ratings = rating_scale().collect();
        self.recompute();
    }

    pub fn clear_ratings(&mut self) {
        self.criteria.ratings.clear();
        self.recompute();
    }

    pub fn all_ratings_selected(&self) -> bool {
        rating_scale().all(|rating| self.criteria.ratings.contains(&rating))
    }

    /// Flips membership of a room type; labels are compared trimmed and case-insensitively.
    pub fn toggle_room_type(&mut self, label: &str) -> Result<bool, FilterError> {
        let label = canonical_room_type(label)?;
        let selected = toggle(&mut self.criteria.room_types, label);
        self.recompute();
        Ok(selected)
    }

    pub fn select_all_room_types(&mut self) {
        self.criteria.room_types = self.room_type_vocabulary().into_iter().collect();
        self.recompute();
    }

    pub fn clear_room_types(&mut self) {
        self.criteria.room_types.clear();
        self.recompute();
    }

    pub fn all_room_types_selected(&self) -> bool {
        let vocabulary = self.room_type_vocabulary();
        !vocabulary.is_empty()
            && vocabulary
                .iter()
                .all(|label| self.criteria.room_types.contains(label))
    }

    /// Distinct room types across loaded listings in display form, first-seen order.
    pub fn room_type_vocabulary(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.listings
            .iter()
            .flat_map(|listing| listing.record.rooms.iter())
            .filter_map(|room| room.room_type.as_deref())
            .map(normalize_room_type)
            .filter(|label| !label.is_empty() && seen.insert(label.clone()))
            .collect()
    }

    /// Clears every constraint, keeping the country when `preserve_country` is set.
    pub fn reset(&mut self, preserve_country: bool) {
        self.criteria.clear(preserve_country);
        self.recompute();
    }

    /// Display name of the selected country, if one is selected and known.
    pub fn selected_country_name(&self) -> Option<&str> {
        let selected = self.criteria.country.as_ref()?;
        self.countries
            .iter()
            .find(|country| &country.id == selected)
            .map(|country| country.name.as_str())
    }

    /// Seeds criteria from catalog page query parameters.
    ///
    /// An invalid date or date range refuses the whole query and leaves criteria untouched.
    /// An unreadable price only selects no bucket.
    pub fn apply_query(&mut self, query: &CatalogQuery) -> Result<(), FilterError> {
        let date_range = query.date_range()?;
        date_range.validate()?;
        let price = query.price().unwrap_or_else(|err| {
            warn!("Ignoring query price: {}", err);
            None
        });

        let mut criteria = self.criteria.clone();
        criteria.clear(query.country.is_some());
        if let Some(search) = &query.search {
            criteria.search = search.clone();
        }
        if let Some(country) = &query.country {
            criteria.country = Some(country.clone());
        }
        criteria.date_range = date_range;
        if let Some(price) = price {
            match self.buckets.bucket_for_price(price) {
                Some(bucket) => {
                    criteria.price_buckets.insert(bucket.label.clone());
                }
                None => debug!("No price bucket for {}", price),
            }
        }

        self.criteria = criteria;
        self.recompute();
        Ok(())
    }
}

fn toggle<T: Ord>(set: &mut BTreeSet<T>, value: T) -> bool {
    if set.remove(&value) {
        false
    } else {
        set.insert(value);
        true
    }
}
