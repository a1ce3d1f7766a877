//! Nearby and text-search queries.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lastbasket_baskets::{Category, GeoPoint};
use lastbasket_core::{DomainError, DomainResult};

use crate::geo::{haversine_km, round2};
use crate::read_model::BasketReadModel;

pub const DEFAULT_RADIUS_M: u32 = 10_000;
pub const MAX_RADIUS_M: u32 = 50_000;
pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Distance,
    Price,
    Rating,
    Newest,
}

impl FromStr for SortBy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distance" => Ok(SortBy::Distance),
            "price" => Ok(SortBy::Price),
            "rating" => Ok(SortBy::Rating),
            "newest" => Ok(SortBy::Newest),
            other => Err(DomainError::validation(format!("unknown sort key: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryFilters {
    pub category: Option<Category>,
    pub min_price_cents: Option<u64>,
    pub max_price_cents: Option<u64>,
}

impl DiscoveryFilters {
    fn matches(&self, basket: &BasketReadModel) -> bool {
        if let Some(category) = self.category {
            if basket.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_price_cents {
            if basket.price_cents < min {
                return false;
            }
        }
        if let Some(max) = self.max_price_cents {
            if basket.price_cents > max {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub origin: GeoPoint,
    pub radius_m: u32,
    pub filters: DiscoveryFilters,
    pub limit: usize,
    pub sort_by: SortBy,
}

impl NearbyQuery {
    pub fn new(origin: GeoPoint) -> DomainResult<Self> {
        origin.validate()?;
        Ok(Self {
            origin,
            radius_m: DEFAULT_RADIUS_M,
            filters: DiscoveryFilters::default(),
            limit: DEFAULT_LIMIT,
            sort_by: SortBy::Distance,
        })
    }

    pub fn with_radius_m(mut self, radius_m: u32) -> DomainResult<Self> {
        if !(1..=MAX_RADIUS_M).contains(&radius_m) {
            return Err(DomainError::validation(format!(
                "radius must be between 1 and {MAX_RADIUS_M} meters"
            )));
        }
        self.radius_m = radius_m;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> DomainResult<Self> {
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        self.limit = limit;
        Ok(self)
    }

    pub fn with_filters(mut self, filters: DiscoveryFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    fn radius_km(&self) -> f64 {
        f64::from(self.radius_m) / 1000.0
    }
}

/// A basket annotated with its distance from the query origin.
///
/// `distance_km` is `None` for text searches without an origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketWithDistance {
    #[serde(flatten)]
    pub basket: BasketReadModel,
    pub distance_km: Option<f64>,
}

/// Eligible baskets within the radius, filtered, sorted, truncated to limit.
pub fn find_nearby(
    rows: &[BasketReadModel],
    query: &NearbyQuery,
    now: DateTime<Utc>,
) -> Vec<BasketWithDistance> {
    let radius_km = query.radius_km();

    let mut hits: Vec<BasketWithDistance> = rows
        .iter()
        .filter(|basket| basket.is_eligible(now) && query.filters.matches(basket))
        .filter_map(|basket| {
            let point = basket.coordinates()?;
            let distance = round2(haversine_km(query.origin, point));
            (distance <= radius_km).then(|| BasketWithDistance {
                basket: basket.clone(),
                distance_km: Some(distance),
            })
        })
        .collect();

    sort_hits(&mut hits, query.sort_by);
    hits.truncate(query.limit);
    hits
}

/// Case-insensitive substring search over name, description, tags and
/// category. With an origin the results are distance-filtered and
/// distance-sorted; without one, newest first.
pub fn search(
    rows: &[BasketReadModel],
    query_text: &str,
    origin: Option<GeoPoint>,
    radius_m: Option<u32>,
    now: DateTime<Utc>,
) -> DomainResult<Vec<BasketWithDistance>> {
    if let Some(point) = origin {
        point.validate()?;
    }
    let radius_m = radius_m.unwrap_or(DEFAULT_RADIUS_M);
    if !(1..=MAX_RADIUS_M).contains(&radius_m) {
        return Err(DomainError::validation(format!(
            "radius must be between 1 and {MAX_RADIUS_M} meters"
        )));
    }
    let radius_km = f64::from(radius_m) / 1000.0;
    let needle = query_text.trim().to_lowercase();

    let mut hits: Vec<BasketWithDistance> = rows
        .iter()
        .filter(|basket| basket.is_eligible(now) && matches_text(basket, &needle))
        .filter_map(|basket| match origin {
            Some(from) => {
                let point = basket.coordinates()?;
                let distance = round2(haversine_km(from, point));
                (distance <= radius_km).then(|| BasketWithDistance {
                    basket: basket.clone(),
                    distance_km: Some(distance),
                })
            }
            None => Some(BasketWithDistance {
                basket: basket.clone(),
                distance_km: None,
            }),
        })
        .collect();

    if origin.is_some() {
        sort_hits(&mut hits, SortBy::Distance);
    } else {
        sort_hits(&mut hits, SortBy::Newest);
    }
    Ok(hits)
}

fn matches_text(basket: &BasketReadModel, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    basket.name.to_lowercase().contains(needle)
        || basket.description.to_lowercase().contains(needle)
        || basket.category.as_str().contains(needle)
        || basket
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

fn sort_hits(hits: &mut [BasketWithDistance], sort_by: SortBy) {
    match sort_by {
        SortBy::Distance => hits.sort_by(|a, b| {
            let da = a.distance_km.unwrap_or(f64::MAX);
            let db = b.distance_km.unwrap_or(f64::MAX);
            da.total_cmp(&db)
        }),
        SortBy::Price => hits.sort_by_key(|hit| hit.basket.price_cents),
        SortBy::Rating => hits.sort_by(|a, b| {
            let ra = a.basket.rating_average.unwrap_or(0.0);
            let rb = b.basket.rating_average.unwrap_or(0.0);
            rb.total_cmp(&ra)
        }),
        SortBy::Newest => hits.sort_by(|a, b| b.basket.created_at.cmp(&a.basket.created_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lastbasket_baskets::{BasketId, BasketStatus, PickupWindow};
    use lastbasket_core::UserId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn row(name: &str, point: Option<GeoPoint>, price_cents: u64) -> BasketReadModel {
        BasketReadModel {
            basket_id: BasketId::new(),
            dealer_id: UserId::new(),
            name: name.into(),
            description: String::new(),
            category: Category::Meals,
            price_cents,
            original_price_cents: price_cents * 3,
            pickup: Some(PickupWindow {
                date: t0().date_naive(),
                time: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                address: "somewhere".into(),
                coordinates: point,
            }),
            images: vec![],
            tags: vec!["surplus".into()],
            total_quantity: 5,
            remaining_quantity: 5,
            is_available: true,
            status: BasketStatus::Active,
            rating_average: None,
            rating_count: 0,
            views: 0,
            created_at: t0(),
            expires_at: t0() + Duration::days(7),
        }
    }

    // Points around central Casablanca; distances from the origin below.
    fn origin() -> GeoPoint {
        GeoPoint { lat: 33.589, lng: -7.62 }
    }

    fn casablanca_rows() -> Vec<BasketReadModel> {
        vec![
            row("couscous friday", Some(GeoPoint { lat: 33.595, lng: -7.618 }), 800),
            row("bakery surprise", Some(GeoPoint { lat: 33.573, lng: -7.59 }), 400),
            row("far away tajine", Some(GeoPoint { lat: 33.9716, lng: -6.8498 }), 600), // Rabat
            row("no location", None, 300),
        ]
    }

    #[test]
    fn nearby_returns_only_in_radius_sorted_ascending() {
        let rows = casablanca_rows();
        let query = NearbyQuery::new(origin())
            .unwrap()
            .with_radius_m(3_000)
            .unwrap();

        let hits = find_nearby(&rows, &query, t0());

        assert_eq!(hits.len(), 2);
        let distances: Vec<f64> = hits.iter().map(|h| h.distance_km.unwrap()).collect();
        assert!(distances.iter().all(|d| *d <= 3.0), "{distances:?}");
        assert!(distances.windows(2).all(|w| w[0] <= w[1]), "{distances:?}");
    }

    #[test]
    fn nearby_excludes_ineligible_rows() {
        let mut rows = casablanca_rows();
        rows[0].remaining_quantity = 0;
        rows[1].status = BasketStatus::Paused;

        // The remaining candidates are out of radius or have no coordinates.
        let query = NearbyQuery::new(origin()).unwrap();
        assert!(find_nearby(&rows, &query, t0()).is_empty());
    }

    #[test]
    fn nearby_excludes_expired_rows() {
        let rows = casablanca_rows();
        let after_expiry = t0() + Duration::days(8);

        let query = NearbyQuery::new(origin()).unwrap();
        assert!(find_nearby(&rows, &query, after_expiry).is_empty());
    }

    #[test]
    fn nearby_applies_price_and_category_filters() {
        let mut rows = casablanca_rows();
        rows[1].category = Category::Bakery;

        let query = NearbyQuery::new(origin())
            .unwrap()
            .with_filters(DiscoveryFilters {
                category: Some(Category::Bakery),
                min_price_cents: None,
                max_price_cents: Some(500),
            });

        let hits = find_nearby(&rows, &query, t0());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].basket.name, "bakery surprise");
    }

    #[test]
    fn nearby_sorts_by_price_and_rating() {
        let mut rows = casablanca_rows();
        rows[0].rating_average = Some(3.5);
        rows[1].rating_average = Some(4.8);

        let by_price = find_nearby(
            &rows,
            &NearbyQuery::new(origin()).unwrap().with_sort(SortBy::Price),
            t0(),
        );
        assert_eq!(by_price[0].basket.price_cents, 400);

        let by_rating = find_nearby(
            &rows,
            &NearbyQuery::new(origin()).unwrap().with_sort(SortBy::Rating),
            t0(),
        );
        assert_eq!(by_rating[0].basket.rating_average, Some(4.8));
    }

    #[test]
    fn nearby_truncates_to_limit() {
        let rows = casablanca_rows();
        let query = NearbyQuery::new(origin())
            .unwrap()
            .with_limit(1)
            .unwrap();

        assert_eq!(find_nearby(&rows, &query, t0()).len(), 1);
    }

    #[test]
    fn query_validation_rejects_out_of_range_parameters() {
        assert!(NearbyQuery::new(GeoPoint { lat: 91.0, lng: 0.0 }).is_err());
        assert!(NearbyQuery::new(GeoPoint { lat: 0.0, lng: 181.0 }).is_err());

        let query = NearbyQuery::new(origin()).unwrap();
        assert!(query.clone().with_radius_m(0).is_err());
        assert!(query.clone().with_radius_m(50_001).is_err());
        assert!(query.clone().with_limit(0).is_err());
        assert!(query.with_limit(101).is_err());
    }

    #[test]
    fn search_matches_name_tags_and_category_case_insensitively() {
        let rows = casablanca_rows();

        let hits = search(&rows, "COUSCOUS", None, None, t0()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance_km, None);

        // All rows carry the "surplus" tag, but only eligible ones match.
        let hits = search(&rows, "surplus", None, None, t0()).unwrap();
        assert_eq!(hits.len(), 3); // "no location" has no coordinates

        let hits = search(&rows, "meals", None, None, t0()).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn search_with_origin_filters_and_sorts_by_distance() {
        let rows = casablanca_rows();

        let hits = search(&rows, "surplus", Some(origin()), Some(5_000), t0()).unwrap();
        assert_eq!(hits.len(), 2);
        let distances: Vec<f64> = hits.iter().map(|h| h.distance_km.unwrap()).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn search_without_origin_returns_newest_first() {
        let mut rows = casablanca_rows();
        rows[1].created_at = t0() + Duration::hours(1);

        let hits = search(&rows, "", None, None, t0() + Duration::hours(2)).unwrap();
        assert_eq!(hits[0].basket.name, "bakery surprise");
    }
}
