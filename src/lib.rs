// Hotel catalog filter engine and the client that feeds it

pub mod backend;
pub mod client;
pub mod config;
pub mod criteria;
pub mod engine;
pub mod models;
pub mod response_cache;
pub mod room_selection;

// Re-export key types for convenience
pub use client::{
    load_catalog, load_scoped_catalog, CatalogSource, ClientStats, FetchError, HttpCatalogClient,
    LoadError,
};
pub use config::{CacheConfig, ClientConfig, ClientError, EvictionPolicy, RetryConfig};
pub use criteria::{
    CatalogQuery, DateRange, FilterCriteria, FilterError, PriceBucket, PriceBucketTable,
};
pub use engine::{filter_listings, CatalogFilterEngine};
pub use models::{CountryRecord, IndexedListing, ListingRecord, RoomRecord, StartingPrice};
pub use response_cache::{CacheStatsReport, ResponseCache};
pub use room_selection::{RoomSelection, SelectionError};
