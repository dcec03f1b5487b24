// Payload shapes of the catalog REST backend, and their conversion into domain records
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::models::{normalize_room_type, CountryRecord, ListingRecord, RoomRecord};

#[derive(Debug, Deserialize, Serialize)]
pub struct HotelsPayload {
    #[serde(deserialize_with = "skip_malformed")]
    pub hotels: Vec<BackendHotel>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CountriesPayload {
    #[serde(deserialize_with = "skip_malformed")]
    pub payes: Vec<BackendCountry>,
}

// The rooms endpoint answers either with an envelope or a bare array
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RoomsPayload {
    Wrapped {
        #[serde(deserialize_with = "skip_malformed")]
        chambres: Vec<BackendRoom>,
    },
    Bare(#[serde(deserialize_with = "skip_malformed")] Vec<BackendRoom>),
}

impl RoomsPayload {
    pub fn into_rooms(self) -> Vec<BackendRoom> {
        match self {
            RoomsPayload::Wrapped { chambres } => chambres,
            RoomsPayload::Bare(rooms) => rooms,
        }
    }
}

/// Decodes each array entry on its own, dropping entries that do not fit `T`.
fn skip_malformed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping malformed backend record at index {}: {}", index, e);
                None
            }
        })
        .collect())
}

/// Numbers, or strings holding a number. Anything else reads as missing.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(raw)) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendHotel {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "nomHotel", default)]
    pub name: String,
    #[serde(default)]
    pub paye_id: String,
    #[serde(rename = "classement", default, deserialize_with = "lenient_number")]
    pub rating: Option<f64>,
    #[serde(rename = "datedabut", default)]
    pub start_date: Option<String>,
    #[serde(rename = "datefin", default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendRoom {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub hotel_id: String,
    #[serde(rename = "typeChambre", default)]
    pub room_type: Option<String>,
    #[serde(rename = "prixchambre", default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendCountry {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "nompaye", default)]
    pub name: String,
}

impl From<BackendCountry> for CountryRecord {
    fn from(item: BackendCountry) -> Self {
        CountryRecord {
            id: item.id,
            name: item.name,
        }
    }
}

impl From<BackendRoom> for RoomRecord {
    fn from(item: BackendRoom) -> Self {
        RoomRecord {
            id: item.id,
            listing_id: item.hotel_id,
            room_type: item
                .room_type
                .as_deref()
                .map(normalize_room_type)
                .filter(|label| !label.is_empty()),
            nightly_price: item.price,
        }
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS` timestamps.
pub fn parse_backend_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

fn backend_date(hotel_id: &str, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.filter(|value| !value.trim().is_empty())?;
    let parsed = parse_backend_date(raw);
    if parsed.is_none() {
        warn!("Hotel {} has unreadable {} {:?}, treating as missing", hotel_id, field, raw);
    }
    parsed
}

/// Joins rooms onto their hotels by `hotel_id`, keeping both input orders.
pub fn assemble_listings(hotels: Vec<BackendHotel>, rooms: Vec<BackendRoom>) -> Vec<ListingRecord> {
    let mut rooms_by_hotel: HashMap<String, Vec<RoomRecord>> = HashMap::new();
    for room in rooms {
        rooms_by_hotel
            .entry(room.hotel_id.clone())
            .or_default()
            .push(room.into());
    }

    hotels
        .into_iter()
        .map(|hotel| {
            let rating = match hotel.rating {
                Some(rating) if rating.fract() == 0.0 && (0.0..=5.0).contains(&rating) => {
                    rating as u8
                }
                Some(rating) => {
                    warn!("Hotel {} has rating {} outside 0-5, treating as unrated", hotel.id, rating);
                    0
                }
                None => 0,
            };
            let available_from = backend_date(&hotel.id, "datedabut", hotel.start_date.as_deref());
            let available_until = backend_date(&hotel.id, "datefin", hotel.end_date.as_deref());
            let rooms = rooms_by_hotel.remove(&hotel.id).unwrap_or_default();

            ListingRecord {
                id: hotel.id,
                name: hotel.name,
                country_id: hotel.paye_id,
                rating,
                available_from,
                available_until,
                rooms,
            }
        })
        .collect()
}
