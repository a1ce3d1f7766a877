//! Basket aggregate: dealer-owned, perishable inventory with a fixed unit count.
//!
//! All quantity math lives here. `handle` never mutates; it validates against
//! current state and returns events. Two concurrent reservations on the same
//! basket produce conflicting appends, and the dispatcher retries the loser
//! against rehydrated state, so `remaining_quantity` can never go negative.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use lastbasket_core::{
    ActorRole, Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, UserId,
};
use lastbasket_events::Event;

use crate::DEFAULT_EXPIRY_DAYS;
use crate::types::{BasketStatus, Category, GeoPoint, PickupWindow};

pub type BasketId = AggregateId;

// ---------- Commands ----------

#[derive(Debug, Clone, PartialEq)]
pub struct CreateBasket {
    pub basket_id: BasketId,
    pub dealer_id: UserId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price_cents: u64,
    pub original_price_cents: u64,
    pub total_quantity: u32,
    pub pickup: Option<PickupWindow>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetBasketStatus {
    pub actor_id: UserId,
    pub actor_role: ActorRole,
    pub status: BasketStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReserveUnits {
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseUnits {
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncrementViews {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateBasket {
    pub value: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpireBasket {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteBasket {
    pub actor_id: UserId,
    pub actor_role: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BasketCommand {
    Create(CreateBasket),
    SetStatus(SetBasketStatus),
    Reserve(ReserveUnits),
    Release(ReleaseUnits),
    IncrementViews(IncrementViews),
    Rate(RateBasket),
    Expire(ExpireBasket),
    Delete(DeleteBasket),
}

// ---------- Events ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketCreated {
    pub basket_id: BasketId,
    pub dealer_id: UserId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price_cents: u64,
    pub original_price_cents: u64,
    pub total_quantity: u32,
    pub pickup: Option<PickupWindow>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketStatusChanged {
    pub from: BasketStatus,
    pub to: BasketStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitsReserved {
    pub quantity: u32,
    pub remaining_after: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitsReleased {
    pub quantity: u32,
    pub remaining_after: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewsIncremented {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketRated {
    pub value: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketExpired {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketDeleted {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BasketEvent {
    Created(BasketCreated),
    StatusChanged(BasketStatusChanged),
    UnitsReserved(UnitsReserved),
    UnitsReleased(UnitsReleased),
    ViewsIncremented(ViewsIncremented),
    Rated(BasketRated),
    Expired(BasketExpired),
    Deleted(BasketDeleted),
}

impl Event for BasketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BasketEvent::Created(_) => "basket.created",
            BasketEvent::StatusChanged(_) => "basket.status_changed",
            BasketEvent::UnitsReserved(_) => "basket.units_reserved",
            BasketEvent::UnitsReleased(_) => "basket.units_released",
            BasketEvent::ViewsIncremented(_) => "basket.views_incremented",
            BasketEvent::Rated(_) => "basket.rated",
            BasketEvent::Expired(_) => "basket.expired",
            BasketEvent::Deleted(_) => "basket.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BasketEvent::Created(e) => e.occurred_at,
            BasketEvent::StatusChanged(e) => e.occurred_at,
            BasketEvent::UnitsReserved(e) => e.occurred_at,
            BasketEvent::UnitsReleased(e) => e.occurred_at,
            BasketEvent::ViewsIncremented(e) => e.occurred_at,
            BasketEvent::Rated(e) => e.occurred_at,
            BasketEvent::Expired(e) => e.occurred_at,
            BasketEvent::Deleted(e) => e.occurred_at,
        }
    }
}

/// Returned to callers after a successful reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub basket_id: BasketId,
    pub quantity: u32,
    pub remaining_after: u32,
}

// ---------- Aggregate ----------

#[derive(Debug, Clone, PartialEq)]
pub struct Basket {
    id: BasketId,
    dealer_id: Option<UserId>,
    name: String,
    description: String,
    category: Category,
    price_cents: u64,
    original_price_cents: u64,
    pickup: Option<PickupWindow>,
    images: Vec<String>,
    tags: Vec<String>,
    total_quantity: u32,
    remaining_quantity: u32,
    is_available: bool,
    status: BasketStatus,
    rating_sum: u64,
    rating_count: u32,
    views: u64,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Basket {
    /// Empty shell for rehydration from an event stream.
    pub fn empty(id: BasketId) -> Self {
        Self {
            id,
            dealer_id: None,
            name: String::new(),
            description: String::new(),
            category: Category::Other,
            price_cents: 0,
            original_price_cents: 0,
            pickup: None,
            images: Vec::new(),
            tags: Vec::new(),
            total_quantity: 0,
            remaining_quantity: 0,
            is_available: false,
            status: BasketStatus::Draft,
            rating_sum: 0,
            rating_count: 0,
            views: 0,
            created_at: None,
            expires_at: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn dealer_id(&self) -> Option<&UserId> {
        self.dealer_id.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn price_cents(&self) -> u64 {
        self.price_cents
    }

    pub fn original_price_cents(&self) -> u64 {
        self.original_price_cents
    }

    pub fn pickup(&self) -> Option<&PickupWindow> {
        self.pickup.as_ref()
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        self.pickup.as_ref().and_then(|p| p.coordinates)
    }

    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }

    pub fn remaining_quantity(&self) -> u32 {
        self.remaining_quantity
    }

    pub fn is_available(&self) -> bool {
        self.is_available
    }

    pub fn status(&self) -> BasketStatus {
        self.status
    }

    pub fn views(&self) -> u64 {
        self.views
    }

    /// Arithmetic mean of received ratings, `None` until the first one lands.
    pub fn rating(&self) -> Option<f64> {
        if self.rating_count == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.rating_count as f64)
        }
    }

    pub fn rating_count(&self) -> u32 {
        self.rating_count
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    fn ensure_created(&self) -> DomainResult<()> {
        if self.created && !self.deleted {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    fn ensure_owner(&self, actor_id: &UserId, actor_role: ActorRole) -> DomainResult<()> {
        if actor_role == ActorRole::System {
            return Ok(());
        }
        if actor_role != ActorRole::Dealer {
            return Err(DomainError::unauthorized());
        }
        match &self.dealer_id {
            Some(owner) if owner == actor_id => Ok(()),
            _ => Err(DomainError::unauthorized()),
        }
    }

    fn handle_create(&self, cmd: &CreateBasket) -> DomainResult<Vec<BasketEvent>> {
        if self.created {
            return Err(DomainError::conflict("basket already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("basket name must not be empty"));
        }
        if cmd.total_quantity == 0 {
            return Err(DomainError::validation("total quantity must be positive"));
        }
        if cmd.price_cents > cmd.original_price_cents {
            return Err(DomainError::validation(
                "discounted price must not exceed original price",
            ));
        }
        if let Some(point) = cmd.pickup.as_ref().and_then(|p| p.coordinates.as_ref()) {
            point.validate()?;
        }
        let expires_at = cmd
            .expires_at
            .unwrap_or_else(|| cmd.occurred_at + Duration::days(DEFAULT_EXPIRY_DAYS));
        if expires_at <= cmd.occurred_at {
            return Err(DomainError::validation("expiry must be in the future"));
        }

        Ok(vec![BasketEvent::Created(BasketCreated {
            basket_id: cmd.basket_id,
            dealer_id: cmd.dealer_id,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            category: cmd.category,
            price_cents: cmd.price_cents,
            original_price_cents: cmd.original_price_cents,
            total_quantity: cmd.total_quantity,
            pickup: cmd.pickup.clone(),
            images: cmd.images.clone(),
            tags: cmd.tags.clone(),
            expires_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_status(&self, cmd: &SetBasketStatus) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        self.ensure_owner(&cmd.actor_id, cmd.actor_role)?;

        let from = self.status;
        let to = cmd.status;
        if from == to {
            return Ok(Vec::new());
        }

        let allowed = match (from, to) {
            (BasketStatus::Draft, BasketStatus::Active) => true,
            (BasketStatus::Active, BasketStatus::Paused) => true,
            (BasketStatus::Paused, BasketStatus::Active) => true,
            (_, BasketStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(DomainError::illegal_transition(from, to));
        }

        Ok(vec![BasketEvent::StatusChanged(BasketStatusChanged {
            from,
            to,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveUnits) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        // Sold out is an inventory shortfall, not an availability state:
        // the loser of a reservation race sees the same error kind whether
        // it lost before or after the flip to zero.
        if self.status == BasketStatus::SoldOut {
            return Err(DomainError::insufficient_inventory(
                cmd.quantity,
                self.remaining_quantity,
            ));
        }
        if self.status != BasketStatus::Active || !self.is_available {
            return Err(DomainError::unavailable(format!(
                "basket is {}",
                self.status
            )));
        }
        if let Some(expires_at) = self.expires_at {
            if cmd.occurred_at >= expires_at {
                return Err(DomainError::unavailable("basket has expired"));
            }
        }
        if cmd.quantity > self.remaining_quantity {
            return Err(DomainError::insufficient_inventory(
                cmd.quantity,
                self.remaining_quantity,
            ));
        }

        Ok(vec![BasketEvent::UnitsReserved(UnitsReserved {
            quantity: cmd.quantity,
            remaining_after: self.remaining_quantity - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseUnits) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        // Release is clamped, never over-credits past total. Idempotent-friendly:
        // releasing against a fully-stocked basket is a no-op.
        let reserved = self.total_quantity - self.remaining_quantity;
        let effective = cmd.quantity.min(reserved);
        if effective == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![BasketEvent::UnitsReleased(UnitsReleased {
            quantity: effective,
            remaining_after: self.remaining_quantity + effective,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_increment_views(&self, cmd: &IncrementViews) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        Ok(vec![BasketEvent::ViewsIncremented(ViewsIncremented {
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rate(&self, cmd: &RateBasket) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        if !(1..=5).contains(&cmd.value) {
            return Err(DomainError::validation("rating must be between 1 and 5"));
        }
        Ok(vec![BasketEvent::Rated(BasketRated {
            value: cmd.value,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireBasket) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        if self.status.is_terminal() {
            return Ok(Vec::new());
        }
        match self.expires_at {
            Some(expires_at) if cmd.occurred_at >= expires_at => {
                Ok(vec![BasketEvent::Expired(BasketExpired {
                    occurred_at: cmd.occurred_at,
                })])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn handle_delete(&self, cmd: &DeleteBasket) -> DomainResult<Vec<BasketEvent>> {
        self.ensure_created()?;
        self.ensure_owner(&cmd.actor_id, cmd.actor_role)?;
        Ok(vec![BasketEvent::Deleted(BasketDeleted {
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl AggregateRoot for Basket {
    type Id = BasketId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Basket {
    type Command = BasketCommand;
    type Event = BasketEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BasketEvent::Created(e) => {
                self.id = e.basket_id;
                self.dealer_id = Some(e.dealer_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category = e.category;
                self.price_cents = e.price_cents;
                self.original_price_cents = e.original_price_cents;
                self.pickup = e.pickup.clone();
                self.images = e.images.clone();
                self.tags = e.tags.clone();
                self.total_quantity = e.total_quantity;
                self.remaining_quantity = e.total_quantity;
                self.is_available = false;
                self.status = BasketStatus::Draft;
                self.created_at = Some(e.occurred_at);
                self.expires_at = Some(e.expires_at);
                self.created = true;
            }
            BasketEvent::StatusChanged(e) => {
                self.status = e.to;
                self.is_available = e.to == BasketStatus::Active && self.remaining_quantity > 0;
            }
            BasketEvent::UnitsReserved(e) => {
                self.remaining_quantity = e.remaining_after;
                if e.remaining_after == 0 {
                    self.is_available = false;
                    self.status = BasketStatus::SoldOut;
                }
            }
            BasketEvent::UnitsReleased(e) => {
                self.remaining_quantity = e.remaining_after.min(self.total_quantity);
                if self.status == BasketStatus::SoldOut && self.remaining_quantity > 0 {
                    self.status = BasketStatus::Active;
                    self.is_available = true;
                }
            }
            BasketEvent::ViewsIncremented(_) => {
                self.views += 1;
            }
            BasketEvent::Rated(e) => {
                self.rating_sum += u64::from(e.value);
                self.rating_count += 1;
            }
            BasketEvent::Expired(_) => {
                self.status = BasketStatus::Expired;
                self.is_available = false;
            }
            BasketEvent::Deleted(_) => {
                self.deleted = true;
                self.is_available = false;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BasketCommand::Create(cmd) => self.handle_create(cmd),
            BasketCommand::SetStatus(cmd) => self.handle_set_status(cmd),
            BasketCommand::Reserve(cmd) => self.handle_reserve(cmd),
            BasketCommand::Release(cmd) => self.handle_release(cmd),
            BasketCommand::IncrementViews(cmd) => self.handle_increment_views(cmd),
            BasketCommand::Rate(cmd) => self.handle_rate(cmd),
            BasketCommand::Expire(cmd) => self.handle_expire(cmd),
            BasketCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_basket_id() -> BasketId {
        BasketId::new()
    }

    fn test_dealer_id() -> UserId {
        UserId::new()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn create_cmd(id: BasketId, dealer: UserId, total: u32) -> CreateBasket {
        CreateBasket {
            basket_id: id,
            dealer_id: dealer,
            name: "Surprise bakery bag".into(),
            description: "Assorted pastries from today's batch".into(),
            category: Category::Bakery,
            price_cents: 499,
            original_price_cents: 1500,
            total_quantity: total,
            pickup: Some(PickupWindow {
                date: t0().date_naive(),
                time: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                address: "12 Mill Lane".into(),
                coordinates: Some(GeoPoint { lat: 52.52, lng: 13.405 }),
            }),
            images: vec![],
            tags: vec!["pastry".into()],
            expires_at: None,
            occurred_at: t0(),
        }
    }

    fn draft_basket(total: u32) -> (Basket, UserId) {
        let id = test_basket_id();
        let dealer = test_dealer_id();
        let mut basket = Basket::empty(id);
        let events = basket
            .handle(&BasketCommand::Create(create_cmd(id, dealer, total)))
            .unwrap();
        for event in &events {
            basket.apply(event);
        }
        (basket, dealer)
    }

    fn created_basket(total: u32) -> (Basket, UserId) {
        let (mut basket, dealer) = draft_basket(total);
        let events = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Active,
                occurred_at: t0(),
            }))
            .unwrap();
        for event in &events {
            basket.apply(event);
        }
        (basket, dealer)
    }

    fn reserve(basket: &mut Basket, qty: u32) -> DomainResult<Vec<BasketEvent>> {
        let events = basket.handle(&BasketCommand::Reserve(ReserveUnits {
            quantity: qty,
            occurred_at: t0(),
        }))?;
        for event in &events {
            basket.apply(event);
        }
        Ok(events)
    }

    fn release(basket: &mut Basket, qty: u32) -> Vec<BasketEvent> {
        let events = basket
            .handle(&BasketCommand::Release(ReleaseUnits {
                quantity: qty,
                occurred_at: t0(),
            }))
            .unwrap();
        for event in &events {
            basket.apply(event);
        }
        events
    }

    #[test]
    fn create_initializes_draft_with_full_stock() {
        let (basket, dealer) = draft_basket(5);

        assert_eq!(basket.status(), BasketStatus::Draft);
        assert!(!basket.is_available());
        assert_eq!(basket.remaining_quantity(), 5);
        assert_eq!(basket.total_quantity(), 5);
        assert_eq!(basket.dealer_id(), Some(&dealer));
        assert_eq!(basket.version(), 1);
        assert_eq!(
            basket.expires_at(),
            Some(t0() + Duration::days(DEFAULT_EXPIRY_DAYS))
        );
    }

    #[test]
    fn activation_makes_the_basket_reservable() {
        let (basket, _) = created_basket(5);
        assert_eq!(basket.status(), BasketStatus::Active);
        assert!(basket.is_available());
        assert_eq!(basket.version(), 2);
    }

    #[test]
    fn create_rejects_zero_quantity_and_bad_prices() {
        let id = test_basket_id();
        let dealer = test_dealer_id();
        let basket = Basket::empty(id);

        let mut cmd = create_cmd(id, dealer, 0);
        assert!(matches!(
            basket.handle(&BasketCommand::Create(cmd.clone())),
            Err(DomainError::Validation(_))
        ));

        cmd.total_quantity = 3;
        cmd.price_cents = 2000; // above original
        assert!(matches!(
            basket.handle(&BasketCommand::Create(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn create_rejects_out_of_range_coordinates() {
        let id = test_basket_id();
        let dealer = test_dealer_id();
        let basket = Basket::empty(id);

        let mut cmd = create_cmd(id, dealer, 3);
        cmd.pickup.as_mut().unwrap().coordinates = Some(GeoPoint { lat: 91.0, lng: 0.0 });
        assert!(matches!(
            basket.handle(&BasketCommand::Create(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (basket, _) = created_basket(5);
        let before = basket.clone();

        basket
            .handle(&BasketCommand::Reserve(ReserveUnits {
                quantity: 2,
                occurred_at: t0(),
            }))
            .unwrap();

        assert_eq!(basket, before);
    }

    #[test]
    fn reserve_decrements_and_sells_out_at_zero() {
        // total 5: three singles, an over-ask, then the last two.
        let (mut basket, _) = created_basket(5);

        for _ in 0..3 {
            reserve(&mut basket, 1).unwrap();
        }
        assert_eq!(basket.remaining_quantity(), 2);
        assert_eq!(basket.status(), BasketStatus::Active);

        let err = reserve(&mut basket, 3).unwrap_err();
        assert_eq!(
            err,
            DomainError::insufficient_inventory(3, 2),
        );
        assert_eq!(basket.remaining_quantity(), 2);

        reserve(&mut basket, 2).unwrap();
        assert_eq!(basket.remaining_quantity(), 0);
        assert_eq!(basket.status(), BasketStatus::SoldOut);
        assert!(!basket.is_available());
    }

    #[test]
    fn reserve_on_sold_out_reports_insufficient_inventory() {
        let (mut basket, _) = created_basket(1);
        reserve(&mut basket, 1).unwrap();
        assert_eq!(basket.status(), BasketStatus::SoldOut);

        let err = reserve(&mut basket, 1).unwrap_err();
        assert_eq!(err, DomainError::insufficient_inventory(1, 0));
    }

    #[test]
    fn reserve_rejects_zero_quantity() {
        let (mut basket, _) = created_basket(5);
        assert!(matches!(
            reserve(&mut basket, 0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn reserve_rejects_inactive_basket() {
        let (mut basket, dealer) = created_basket(5);
        let events = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Paused,
                occurred_at: t0(),
            }))
            .unwrap();
        for event in &events {
            basket.apply(event);
        }

        assert!(matches!(
            reserve(&mut basket, 1),
            Err(DomainError::BasketUnavailable(_))
        ));
    }

    #[test]
    fn reserve_rejects_past_expiry() {
        let (basket, _) = created_basket(5);
        let late = t0() + Duration::days(DEFAULT_EXPIRY_DAYS);

        let err = basket
            .handle(&BasketCommand::Reserve(ReserveUnits {
                quantity: 1,
                occurred_at: late,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::BasketUnavailable(_)));
    }

    #[test]
    fn release_restores_stock_and_reactivates() {
        let (mut basket, _) = created_basket(3);
        reserve(&mut basket, 3).unwrap();
        assert_eq!(basket.status(), BasketStatus::SoldOut);

        release(&mut basket, 2);
        assert_eq!(basket.remaining_quantity(), 2);
        assert_eq!(basket.status(), BasketStatus::Active);
        assert!(basket.is_available());
    }

    #[test]
    fn release_is_clamped_to_reserved_units() {
        let (mut basket, _) = created_basket(3);
        reserve(&mut basket, 1).unwrap();

        let events = release(&mut basket, 10);
        assert_eq!(events.len(), 1);
        assert_eq!(basket.remaining_quantity(), 3);

        // Nothing reserved anymore: further release emits no events.
        let events = release(&mut basket, 1);
        assert!(events.is_empty());
        assert_eq!(basket.remaining_quantity(), 3);
    }

    #[test]
    fn set_status_enforces_transition_table_and_ownership() {
        let (mut basket, dealer) = created_basket(3);
        let stranger = test_dealer_id();

        // Not the owner.
        let err = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: stranger,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Paused,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::unauthorized());

        // Clients never manage basket status.
        let err = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Client,
                status: BasketStatus::Paused,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::unauthorized());

        // active -> expired is not a dealer move.
        let err = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Expired,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));

        // active -> cancelled is terminal.
        let events = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Cancelled,
                occurred_at: t0(),
            }))
            .unwrap();
        for event in &events {
            basket.apply(event);
        }
        assert_eq!(basket.status(), BasketStatus::Cancelled);

        let err = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Active,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn set_status_same_status_is_a_no_op() {
        let (basket, dealer) = created_basket(3);
        let events = basket
            .handle(&BasketCommand::SetStatus(SetBasketStatus {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                status: BasketStatus::Active,
                occurred_at: t0(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn expire_is_idempotent_and_time_gated() {
        let (mut basket, _) = created_basket(3);

        // Before expiry: no-op.
        let events = basket
            .handle(&BasketCommand::Expire(ExpireBasket { occurred_at: t0() }))
            .unwrap();
        assert!(events.is_empty());

        let late = t0() + Duration::days(DEFAULT_EXPIRY_DAYS + 1);
        let events = basket
            .handle(&BasketCommand::Expire(ExpireBasket { occurred_at: late }))
            .unwrap();
        assert_eq!(events.len(), 1);
        for event in &events {
            basket.apply(event);
        }
        assert_eq!(basket.status(), BasketStatus::Expired);

        // Already terminal: no-op again.
        let events = basket
            .handle(&BasketCommand::Expire(ExpireBasket { occurred_at: late }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn rating_accumulates_an_average() {
        let (mut basket, _) = created_basket(3);
        assert_eq!(basket.rating(), None);

        for value in [5u8, 4, 3] {
            let events = basket
                .handle(&BasketCommand::Rate(RateBasket {
                    value,
                    occurred_at: t0(),
                }))
                .unwrap();
            for event in &events {
                basket.apply(event);
            }
        }

        assert_eq!(basket.rating_count(), 3);
        assert_eq!(basket.rating(), Some(4.0));

        let err = basket
            .handle(&BasketCommand::Rate(RateBasket {
                value: 6,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn views_increment() {
        let (mut basket, _) = created_basket(3);
        for _ in 0..4 {
            let events = basket
                .handle(&BasketCommand::IncrementViews(IncrementViews {
                    occurred_at: t0(),
                }))
                .unwrap();
            for event in &events {
                basket.apply(event);
            }
        }
        assert_eq!(basket.views(), 4);
    }

    #[test]
    fn delete_tombstones_and_blocks_further_commands() {
        let (mut basket, dealer) = created_basket(3);

        let err = basket
            .handle(&BasketCommand::Delete(DeleteBasket {
                actor_id: test_dealer_id(),
                actor_role: ActorRole::Dealer,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::unauthorized());

        let events = basket
            .handle(&BasketCommand::Delete(DeleteBasket {
                actor_id: dealer,
                actor_role: ActorRole::Dealer,
                occurred_at: t0(),
            }))
            .unwrap();
        for event in &events {
            basket.apply(event);
        }
        assert!(basket.is_deleted());

        assert_eq!(reserve(&mut basket, 1).unwrap_err(), DomainError::not_found());
    }

    #[test]
    fn commands_against_missing_basket_are_not_found() {
        let basket = Basket::empty(test_basket_id());
        let err = basket
            .handle(&BasketCommand::Reserve(ReserveUnits {
                quantity: 1,
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::not_found());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Reserve(u32),
            Release(u32),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1u32..=8).prop_map(Op::Reserve),
                (1u32..=8).prop_map(Op::Release),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(1000))]

            #[test]
            fn stock_counters_stay_consistent(
                total in 1u32..=20,
                ops in proptest::collection::vec(op_strategy(), 0..40),
            ) {
                let (mut basket, _) = created_basket(total);

                for op in ops {
                    match op {
                        Op::Reserve(qty) => {
                            let _ = reserve(&mut basket, qty);
                        }
                        Op::Release(qty) => {
                            release(&mut basket, qty);
                        }
                    }

                    prop_assert!(basket.remaining_quantity() <= basket.total_quantity());
                    prop_assert_eq!(
                        basket.status() == BasketStatus::SoldOut,
                        basket.remaining_quantity() == 0
                    );
                    prop_assert_eq!(
                        basket.is_available(),
                        basket.status() == BasketStatus::Active
                    );
                }
            }
        }
    }
}
