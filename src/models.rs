// Domain records held by the catalog filter engine
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: String,
    pub listing_id: String,
    pub room_type: Option<String>,
    pub nightly_price: Option<f64>,
}

impl RoomRecord {
    /// Nightly price if it is usable for pricing; negative or non-finite values count as unset.
    pub fn defined_price(&self) -> Option<f64> {
        self.nightly_price
            .filter(|price| price.is_finite() && *price >= 0.0)
    }

    /// Room type trimmed and lowercased, used for case-insensitive matching.
    pub fn room_type_key(&self) -> Option<String> {
        self.room_type
            .as_deref()
            .map(room_type_key)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub name: String,
    pub country_id: String,
    // 1-5, 0 when the listing is unrated
    pub rating: u8,
    pub available_from: Option<NaiveDate>,
    pub available_until: Option<NaiveDate>,
    pub rooms: Vec<RoomRecord>,
}

impl ListingRecord {
    /// Cheapest nightly price among rooms that have one.
    pub fn starting_price(&self) -> StartingPrice {
        self.rooms
            .iter()
            .filter_map(RoomRecord::defined_price)
            .fold(StartingPrice::Unavailable, |acc, price| match acc {
                StartingPrice::From(current) if current <= price => acc,
                _ => StartingPrice::From(price),
            })
    }

    /// Inclusive availability window, present only when both bounds are known.
    pub fn availability_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.available_from?, self.available_until?))
    }
}

/// Lowest nightly price of a listing. `Unavailable` is distinct from a price of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StartingPrice {
    From(f64),
    Unavailable,
}

impl StartingPrice {
    pub fn amount(&self) -> Option<f64> {
        match self {
            StartingPrice::From(amount) => Some(*amount),
            StartingPrice::Unavailable => None,
        }
    }
}

impl fmt::Display for StartingPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartingPrice::From(amount) => write!(f, "from {:.2}", amount),
            StartingPrice::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A listing as held by the engine, with its derived starting price.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedListing {
    pub record: ListingRecord,
    pub starting_price: StartingPrice,
}

impl From<ListingRecord> for IndexedListing {
    fn from(record: ListingRecord) -> Self {
        let starting_price = record.starting_price();
        Self {
            record,
            starting_price,
        }
    }
}

pub fn room_type_key(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Display form of a room type: trimmed, first letter uppercased, remainder lowercased.
///
/// The first letter keeps its lowercase form when uppercasing would not map back to it
/// (`ß` becomes `SS`), so `room_type_key` of the display form always equals the key of the input.
pub fn normalize_room_type(label: &str) -> String {
    let lowered = room_type_key(label);
    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => {
            let mut upper = first.to_uppercase();
            let capital = match (upper.next(), upper.next()) {
                (Some(capital), None) if capital.to_lowercase().eq(std::iter::once(first)) => {
                    capital
                }
                _ => first,
            };
            std::iter::once(capital).chain(chars).collect()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn room(id: &str, room_type: Option<&str>, price: Option<f64>) -> RoomRecord {
        RoomRecord {
            id: id.to_string(),
            listing_id: "h1".to_string(),
            room_type: room_type.map(str::to_string),
            nightly_price: price,
        }
    }

    fn listing(rooms: Vec<RoomRecord>) -> ListingRecord {
        ListingRecord {
            id: "h1".to_string(),
            name: "Dar El Bey".to_string(),
            country_id: "TN".to_string(),
            rating: 4,
            available_from: None,
            available_until: None,
            rooms,
        }
    }

    #[test]
    fn test_starting_price_is_minimum_defined_price() {
        let record = listing(vec![
            room("r1", Some("Double"), Some(180.0)),
            room("r2", Some("Single"), None),
            room("r3", Some("Suite"), Some(95.5)),
        ]);
        assert_eq!(record.starting_price(), StartingPrice::From(95.5));
    }

    #[test]
    fn test_starting_price_unavailable_without_priced_rooms() {
        let record = listing(vec![room("r1", Some("Double"), None)]);
        assert_eq!(record.starting_price(), StartingPrice::Unavailable);
        assert_eq!(listing(vec![]).starting_price(), StartingPrice::Unavailable);
    }

    #[test]
    fn test_zero_price_is_not_unavailable() {
        let record = listing(vec![room("r1", None, Some(0.0))]);
        assert_eq!(record.starting_price(), StartingPrice::From(0.0));
    }

    #[test]
    fn test_malformed_prices_are_ignored() {
        let record = listing(vec![
            room("r1", None, Some(-10.0)),
            room("r2", None, Some(f64::NAN)),
            room("r3", None, Some(120.0)),
        ]);
        assert_eq!(record.starting_price(), StartingPrice::From(120.0));
    }

    #[test_case("deluxe ", "Deluxe"; "trailing space")]
    #[test_case("DELUXE", "Deluxe"; "upper case")]
    #[test_case("  double room", "Double room"; "multi word")]
    #[test_case("   ", ""; "blank")]
    #[test_case("élégante", "Élégante"; "non ascii first letter")]
    #[test_case("ßuite", "ßuite"; "first letter without single char capital")]
    fn test_normalize_room_type(input: &str, expected: &str) {
        assert_eq!(normalize_room_type(input), expected);
    }

    #[test_case("ßuite"; "sharp s")]
    #[test_case("ǆungla"; "digraph")]
    #[test_case(" İnci "; "dotted capital i")]
    #[test_case("Family SUITE"; "plain ascii")]
    fn test_display_form_keeps_matching_key(input: &str) {
        let display = normalize_room_type(input);
        assert_eq!(room_type_key(&display), room_type_key(input));
        assert_eq!(normalize_room_type(&display), display);
    }

    #[test]
    fn test_blank_room_type_has_no_key() {
        assert_eq!(room("r1", Some("  "), None).room_type_key(), None);
        assert_eq!(
            room("r1", Some(" Suite "), None).room_type_key(),
            Some("suite".to_string())
        );
    }
}
