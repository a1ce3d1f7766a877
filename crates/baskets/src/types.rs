//! Value types shared by the basket aggregate and the read side.

use core::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use lastbasket_core::{DomainError, DomainResult};

/// Basket lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketStatus {
    Draft,
    Active,
    Paused,
    SoldOut,
    Expired,
    Cancelled,
}

impl BasketStatus {
    /// Terminal statuses admit no further dealer-driven transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BasketStatus::Cancelled | BasketStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BasketStatus::Draft => "draft",
            BasketStatus::Active => "active",
            BasketStatus::Paused => "paused",
            BasketStatus::SoldOut => "sold_out",
            BasketStatus::Expired => "expired",
            BasketStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for BasketStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BasketStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(BasketStatus::Draft),
            "active" => Ok(BasketStatus::Active),
            "paused" => Ok(BasketStatus::Paused),
            "sold_out" => Ok(BasketStatus::SoldOut),
            "expired" => Ok(BasketStatus::Expired),
            "cancelled" => Ok(BasketStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown basket status: {other}"))),
        }
    }
}

/// Closed set of basket categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Meals,
    Bakery,
    Groceries,
    Produce,
    Dairy,
    Desserts,
    Beverages,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Meals => "meals",
            Category::Bakery => "bakery",
            Category::Groceries => "groceries",
            Category::Produce => "produce",
            Category::Dairy => "dairy",
            Category::Desserts => "desserts",
            Category::Beverages => "beverages",
            Category::Other => "other",
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meals" => Ok(Category::Meals),
            "bakery" => Ok(Category::Bakery),
            "groceries" => Ok(Category::Groceries),
            "produce" => Ok(Category::Produce),
            "dairy" => Ok(Category::Dairy),
            "desserts" => Ok(Category::Desserts),
            "beverages" => Ok(Category::Beverages),
            "other" => Ok(Category::Other),
            other => Err(DomainError::validation(format!("unknown category: {other}"))),
        }
    }
}

/// WGS84 coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> DomainResult<Self> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(DomainError::validation(format!(
                "latitude out of range: {}",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(DomainError::validation(format!(
                "longitude out of range: {}",
                self.lng
            )));
        }
        Ok(())
    }
}

/// When and where a basket is collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupWindow {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub address: String,
    pub coordinates: Option<GeoPoint>,
}
