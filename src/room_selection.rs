// Room selection on a listing's detail page
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

use crate::models::{ListingRecord, RoomRecord};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Room index {index} out of range for listing with {rooms} rooms")]
    RoomIndexOutOfRange { index: usize, rooms: usize },
}

/// Rooms picked by the guest, with the summed nightly price of the selection.
#[derive(Debug, Clone)]
pub struct RoomSelection<'a> {
    listing: &'a ListingRecord,
    selected: BTreeSet<usize>,
    total: f64,
}

impl<'a> RoomSelection<'a> {
    pub fn new(listing: &'a ListingRecord) -> Self {
        Self {
            listing,
            selected: BTreeSet::new(),
            total: 0.0,
        }
    }

    pub fn listing(&self) -> &ListingRecord {
        self.listing
    }

    /// Room shown first on the detail page.
    pub fn featured_room(&self) -> Option<&'a RoomRecord> {
        self.listing.rooms.first()
    }

    /// Flips selection of the room at `index`. Returns whether it is now selected.
    pub fn toggle(&mut self, index: usize) -> Result<bool, SelectionError> {
        let rooms = self.listing.rooms.len();
        if index >= rooms {
            return Err(SelectionError::RoomIndexOutOfRange { index, rooms });
        }

        let selected = if self.selected.remove(&index) {
            false
        } else {
            self.selected.insert(index);
            true
        };
        self.total = self.compute_total();
        debug!(
            "Room selection for {} now {:?}, total {}",
            self.listing.id, self.selected, self.total
        );
        Ok(selected)
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn selected_rooms(&self) -> impl Iterator<Item = &'a RoomRecord> + '_ {
        self.selected
            .iter()
            .filter_map(move |&index| self.listing.rooms.get(index))
    }

    /// Nightly total of the selected rooms; rooms without a price add nothing.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.total = 0.0;
    }

    fn compute_total(&self) -> f64 {
        self.selected_rooms()
            .filter_map(RoomRecord::defined_price)
            .sum()
    }
}
