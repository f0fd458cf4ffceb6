use chrono::{DateTime, NaiveDate, Utc};
use rihla_shared::{ItemId, ProviderId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::booking::BookingTarget;

/// Bookable item categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Hotel,
    Package,
    Flight,
    Transport,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Hotel => "hotel",
            ItemKind::Package => "package",
            ItemKind::Flight => "flight",
            ItemKind::Transport => "transport",
        }
    }

    /// Hotels and packages consume capacity per calendar day.
    pub fn is_date_ranged(&self) -> bool {
        matches!(self, ItemKind::Hotel | ItemKind::Package)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hotel" => Ok(ItemKind::Hotel),
            "package" => Ok(ItemKind::Package),
            "flight" => Ok(ItemKind::Flight),
            "transport" => Ok(ItemKind::Transport),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

/// How an item's capacity is consumed by bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityModel {
    /// `units` interchangeable rooms/slots available on every calendar day.
    DateRanged { units: u32 },
    /// `seats` on a single departure instance.
    AbsoluteSeats { seats: u32 },
}

impl CapacityModel {
    pub fn capacity(&self) -> u32 {
        match *self {
            CapacityModel::DateRanged { units } => units,
            CapacityModel::AbsoluteSeats { seats } => seats,
        }
    }
}

/// Attributes shared by every listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: ItemId,
    pub provider_id: ProviderId,
    pub name: String,
    /// Price per night (date-ranged) or per seat, in minor currency units.
    pub unit_price: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Optional room upgrade, charged as a flat surcharge per night.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomTier {
    pub code: String,
    pub surcharge: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryItem {
    Hotel {
        #[serde(flatten)]
        listing: Listing,
        rooms: u32,
        city: String,
        #[serde(default)]
        room_tiers: Vec<RoomTier>,
    },
    Package {
        #[serde(flatten)]
        listing: Listing,
        slots: u32,
        #[serde(default)]
        starts_on: Option<NaiveDate>,
    },
    Flight {
        #[serde(flatten)]
        listing: Listing,
        seats: u32,
        origin: String,
        destination: String,
        departure: DateTime<Utc>,
    },
    Transport {
        #[serde(flatten)]
        listing: Listing,
        seats: u32,
        route: String,
        departure: DateTime<Utc>,
    },
}

impl InventoryItem {
    pub fn listing(&self) -> &Listing {
        match self {
            InventoryItem::Hotel { listing, .. }
            | InventoryItem::Package { listing, .. }
            | InventoryItem::Flight { listing, .. }
            | InventoryItem::Transport { listing, .. } => listing,
        }
    }

    pub fn listing_mut(&mut self) -> &mut Listing {
        match self {
            InventoryItem::Hotel { listing, .. }
            | InventoryItem::Package { listing, .. }
            | InventoryItem::Flight { listing, .. }
            | InventoryItem::Transport { listing, .. } => listing,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            InventoryItem::Hotel { .. } => ItemKind::Hotel,
            InventoryItem::Package { .. } => ItemKind::Package,
            InventoryItem::Flight { .. } => ItemKind::Flight,
            InventoryItem::Transport { .. } => ItemKind::Transport,
        }
    }

    pub fn id(&self) -> ItemId {
        self.listing().id
    }

    pub fn provider_id(&self) -> ProviderId {
        self.listing().provider_id
    }

    pub fn capacity_model(&self) -> CapacityModel {
        match *self {
            InventoryItem::Hotel { rooms, .. } => CapacityModel::DateRanged { units: rooms },
            InventoryItem::Package { slots, .. } => CapacityModel::DateRanged { units: slots },
            InventoryItem::Flight { seats, .. } | InventoryItem::Transport { seats, .. } => {
                CapacityModel::AbsoluteSeats { seats }
            }
        }
    }

    pub fn target(&self) -> BookingTarget {
        BookingTarget::new(self.kind(), self.id())
    }

    /// Room tiers offered by the item; only hotels carry any.
    pub fn room_tiers(&self) -> &[RoomTier] {
        match self {
            InventoryItem::Hotel { room_tiers, .. } => room_tiers,
            _ => &[],
        }
    }
}
