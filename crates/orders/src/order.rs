//! Order aggregate and the status transition table.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use lastbasket_core::{
    ActorRole, Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, UserId,
};
use lastbasket_events::Event;

pub type OrderId = AggregateId;

/// Tax rate denominator: basis points, 1/100th of a percent.
const BPS_DENOMINATOR: u64 = 10_000;

// ---------- Value types ----------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    ReadyForPickup,
    PickedUp,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready_for_pickup" => Ok(OrderStatus::ReadyForPickup),
            "picked_up" => Ok(OrderStatus::PickedUp),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown order status: {other}"))),
        }
    }
}

/// Who may drive a given transition edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoleRule {
    DealerOnly,
    ClientOrDealer,
    SystemOnly,
}

impl RoleRule {
    pub fn allows(self, role: ActorRole) -> bool {
        match self {
            RoleRule::DealerOnly => matches!(role, ActorRole::Dealer | ActorRole::System),
            RoleRule::ClientOrDealer => true,
            RoleRule::SystemOnly => role == ActorRole::System,
        }
    }
}

/// The single source of truth for order status transitions.
///
/// Returns `None` when `to` is not reachable from `from`.
pub fn transition_rule(from: OrderStatus, to: OrderStatus) -> Option<RoleRule> {
    use OrderStatus::*;
    match (from, to) {
        (Pending, Confirmed)
        | (Confirmed, Preparing)
        | (Preparing, ReadyForPickup)
        | (ReadyForPickup, PickedUp)
        | (PickedUp, Completed) => Some(RoleRule::DealerOnly),
        (Pending | Confirmed | Preparing | ReadyForPickup, Cancelled) => {
            Some(RoleRule::ClientOrDealer)
        }
        (Pending | Confirmed | Preparing | ReadyForPickup, Refunded) => Some(RoleRule::SystemOnly),
        _ => None,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobilePayment,
    BankTransfer,
}

impl core::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "mobile_payment" => Ok(PaymentMethod::MobilePayment),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(DomainError::validation(format!("unknown payment method: {other}"))),
        }
    }
}

/// Payment details. Status and transaction id are opaque values supplied by
/// the external payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub basket_id: AggregateId,
    pub name: String,
    pub unit_price_cents: u64,
    pub quantity: u32,
}

/// Basket prices frozen at order creation, so savings displayed on the order
/// never drift when the dealer later edits the live basket.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub basket_price_cents: u64,
    pub basket_original_price_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal_cents: u64,
    pub tax_cents: u64,
    pub service_fee_cents: u64,
    pub total_cents: u64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub value: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationInfo {
    pub reason: String,
    pub cancelled_by: ActorRole,
    pub refund_amount_cents: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    pub author_role: ActorRole,
    pub body: String,
    pub at: DateTime<Utc>,
}

// ---------- Commands ----------

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub client_id: UserId,
    pub dealer_id: UserId,
    pub basket_id: AggregateId,
    pub items: Vec<OrderItem>,
    pub payment: PaymentInfo,
    pub price_snapshot: PriceSnapshot,
    pub tax_rate_bps: u32,
    pub service_fee_cents: u64,
    pub currency: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionStatus {
    pub actor_id: UserId,
    pub actor_role: ActorRole,
    pub target: OrderStatus,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub refund_amount_cents: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateOrder {
    pub actor_id: UserId,
    pub actor_role: ActorRole,
    pub value: u8,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub actor_id: UserId,
    pub actor_role: ActorRole,
    pub body: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderCommand {
    Create(CreateOrder),
    Transition(TransitionStatus),
    Rate(RateOrder),
    LogMessage(LogMessage),
}

// ---------- Events ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub client_id: UserId,
    pub dealer_id: UserId,
    pub basket_id: AggregateId,
    pub items: Vec<OrderItem>,
    pub payment: PaymentInfo,
    pub price_snapshot: PriceSnapshot,
    pub pricing: Pricing,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: ActorRole,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub cancellation: CancellationInfo,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRated {
    pub rater_role: ActorRole,
    pub value: u8,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLogged {
    pub author_role: ActorRole,
    pub body: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created(OrderCreated),
    StatusChanged(OrderStatusChanged),
    Cancelled(OrderCancelled),
    Rated(OrderRated),
    MessageLogged(MessageLogged),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "order.created",
            OrderEvent::StatusChanged(_) => "order.status_changed",
            OrderEvent::Cancelled(_) => "order.cancelled",
            OrderEvent::Rated(_) => "order.rated",
            OrderEvent::MessageLogged(_) => "order.message_logged",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Created(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::Cancelled(e) => e.occurred_at,
            OrderEvent::Rated(e) => e.occurred_at,
            OrderEvent::MessageLogged(e) => e.occurred_at,
        }
    }
}

// ---------- Aggregate ----------

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    client_id: Option<UserId>,
    dealer_id: Option<UserId>,
    basket_id: Option<AggregateId>,
    items: Vec<OrderItem>,
    payment: Option<PaymentInfo>,
    price_snapshot: Option<PriceSnapshot>,
    pricing: Option<Pricing>,
    status: OrderStatus,
    scheduled_date: Option<NaiveDate>,
    scheduled_time: Option<NaiveTime>,
    actual_pickup_time: Option<DateTime<Utc>>,
    messages: Vec<OrderMessage>,
    client_rating: Option<Rating>,
    dealer_rating: Option<Rating>,
    cancellation: Option<CancellationInfo>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Empty shell for rehydration from an event stream.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            client_id: None,
            dealer_id: None,
            basket_id: None,
            items: Vec::new(),
            payment: None,
            price_snapshot: None,
            pricing: None,
            status: OrderStatus::Pending,
            scheduled_date: None,
            scheduled_time: None,
            actual_pickup_time: None,
            messages: Vec::new(),
            client_rating: None,
            dealer_rating: None,
            cancellation: None,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn client_id(&self) -> Option<&UserId> {
        self.client_id.as_ref()
    }

    pub fn dealer_id(&self) -> Option<&UserId> {
        self.dealer_id.as_ref()
    }

    pub fn basket_id(&self) -> Option<&AggregateId> {
        self.basket_id.as_ref()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn payment(&self) -> Option<&PaymentInfo> {
        self.payment.as_ref()
    }

    pub fn price_snapshot(&self) -> Option<&PriceSnapshot> {
        self.price_snapshot.as_ref()
    }

    pub fn pricing(&self) -> Option<&Pricing> {
        self.pricing.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduled_date
    }

    pub fn scheduled_time(&self) -> Option<NaiveTime> {
        self.scheduled_time
    }

    pub fn actual_pickup_time(&self) -> Option<DateTime<Utc>> {
        self.actual_pickup_time
    }

    pub fn messages(&self) -> &[OrderMessage] {
        &self.messages
    }

    pub fn client_rating(&self) -> Option<&Rating> {
        self.client_rating.as_ref()
    }

    pub fn dealer_rating(&self) -> Option<&Rating> {
        self.dealer_rating.as_ref()
    }

    pub fn cancellation(&self) -> Option<&CancellationInfo> {
        self.cancellation.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Units reserved on the basket for this order.
    pub fn reserved_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Past its scheduled pickup slot without being collected.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if !matches!(
            self.status,
            OrderStatus::Preparing | OrderStatus::ReadyForPickup
        ) {
            return false;
        }
        match (self.scheduled_date, self.scheduled_time) {
            (Some(date), Some(time)) => now > date.and_time(time).and_utc(),
            _ => false,
        }
    }

    fn ensure_created(&self) -> DomainResult<()> {
        if self.created {
            Ok(())
        } else {
            Err(DomainError::not_found())
        }
    }

    /// Non-system actors must be a party to the order.
    fn ensure_party(&self, actor_id: &UserId, actor_role: ActorRole) -> DomainResult<()> {
        match actor_role {
            ActorRole::System => Ok(()),
            ActorRole::Dealer => match &self.dealer_id {
                Some(dealer) if dealer == actor_id => Ok(()),
                _ => Err(DomainError::unauthorized()),
            },
            ActorRole::Client => match &self.client_id {
                Some(client) if client == actor_id => Ok(()),
                _ => Err(DomainError::unauthorized()),
            },
        }
    }

    fn handle_create(&self, cmd: &CreateOrder) -> DomainResult<Vec<OrderEvent>> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number must not be empty"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        if cmd.items.iter().any(|item| item.quantity == 0) {
            return Err(DomainError::validation("item quantities must be positive"));
        }
        if cmd.items.iter().any(|item| item.basket_id != cmd.basket_id) {
            return Err(DomainError::validation(
                "all items must reference the order's basket",
            ));
        }
        if cmd.currency.trim().is_empty() {
            return Err(DomainError::validation("currency must not be empty"));
        }

        // All money math is checked; a u64-cent overflow is a bad request,
        // not a wrapped total.
        let overflow = || DomainError::validation("order pricing overflows");
        let subtotal = cmd.items.iter().try_fold(0u64, |acc, item| {
            item.unit_price_cents
                .checked_mul(u64::from(item.quantity))
                .and_then(|line| acc.checked_add(line))
                .ok_or_else(overflow)
        })?;
        let tax = subtotal
            .checked_mul(u64::from(cmd.tax_rate_bps))
            .map(|scaled| scaled / BPS_DENOMINATOR)
            .ok_or_else(overflow)?;
        let total = subtotal
            .checked_add(tax)
            .and_then(|with_tax| with_tax.checked_add(cmd.service_fee_cents))
            .ok_or_else(overflow)?;
        let pricing = Pricing {
            subtotal_cents: subtotal,
            tax_cents: tax,
            service_fee_cents: cmd.service_fee_cents,
            total_cents: total,
            currency: cmd.currency.clone(),
        };

        Ok(vec![OrderEvent::Created(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            client_id: cmd.client_id,
            dealer_id: cmd.dealer_id,
            basket_id: cmd.basket_id,
            items: cmd.items.clone(),
            payment: cmd.payment.clone(),
            price_snapshot: cmd.price_snapshot,
            pricing,
            scheduled_date: cmd.scheduled_date,
            scheduled_time: cmd.scheduled_time,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionStatus) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_created()?;

        let from = self.status;
        let to = cmd.target;
        let rule = transition_rule(from, to)
            .ok_or_else(|| DomainError::illegal_transition(from, to))?;
        if !rule.allows(cmd.actor_role) {
            return Err(DomainError::unauthorized());
        }
        self.ensure_party(&cmd.actor_id, cmd.actor_role)?;

        let event = match to {
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                OrderEvent::Cancelled(OrderCancelled {
                    from,
                    to,
                    cancellation: CancellationInfo {
                        reason: cmd
                            .reason
                            .clone()
                            .unwrap_or_else(|| format!("{to} by {}", cmd.actor_role)),
                        cancelled_by: cmd.actor_role,
                        refund_amount_cents: cmd.refund_amount_cents,
                    },
                    notes: cmd.notes.clone(),
                    occurred_at: cmd.occurred_at,
                })
            }
            _ => OrderEvent::StatusChanged(OrderStatusChanged {
                from,
                to,
                changed_by: cmd.actor_role,
                notes: cmd.notes.clone(),
                occurred_at: cmd.occurred_at,
            }),
        };

        Ok(vec![event])
    }

    fn handle_rate(&self, cmd: &RateOrder) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_created()?;
        if self.status != OrderStatus::Completed {
            return Err(DomainError::validation(
                "orders can only be rated once completed",
            ));
        }
        if !(1..=5).contains(&cmd.value) {
            return Err(DomainError::validation("rating must be between 1 and 5"));
        }
        if cmd.actor_role == ActorRole::System {
            return Err(DomainError::unauthorized());
        }
        self.ensure_party(&cmd.actor_id, cmd.actor_role)?;

        Ok(vec![OrderEvent::Rated(OrderRated {
            rater_role: cmd.actor_role,
            value: cmd.value,
            comment: cmd.comment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_log_message(&self, cmd: &LogMessage) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_created()?;
        if self.status.is_terminal() {
            return Err(DomainError::conflict("order is closed"));
        }
        if cmd.body.trim().is_empty() {
            return Err(DomainError::validation("message body must not be empty"));
        }
        self.ensure_party(&cmd.actor_id, cmd.actor_role)?;

        Ok(vec![OrderEvent::MessageLogged(MessageLogged {
            author_role: cmd.actor_role,
            body: cmd.body.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Created(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.client_id = Some(e.client_id);
                self.dealer_id = Some(e.dealer_id);
                self.basket_id = Some(e.basket_id);
                self.items = e.items.clone();
                self.payment = Some(e.payment.clone());
                self.price_snapshot = Some(e.price_snapshot);
                self.pricing = Some(e.pricing.clone());
                self.status = OrderStatus::Pending;
                self.scheduled_date = Some(e.scheduled_date);
                self.scheduled_time = Some(e.scheduled_time);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                if e.to == OrderStatus::PickedUp {
                    self.actual_pickup_time = Some(e.occurred_at);
                }
                if let Some(notes) = &e.notes {
                    self.messages.push(OrderMessage {
                        author_role: e.changed_by,
                        body: notes.clone(),
                        at: e.occurred_at,
                    });
                }
            }
            OrderEvent::Cancelled(e) => {
                self.status = e.to;
                self.cancellation = Some(e.cancellation.clone());
                if let Some(notes) = &e.notes {
                    self.messages.push(OrderMessage {
                        author_role: e.cancellation.cancelled_by,
                        body: notes.clone(),
                        at: e.occurred_at,
                    });
                }
            }
            OrderEvent::Rated(e) => {
                let rating = Rating {
                    value: e.value,
                    comment: e.comment.clone(),
                };
                match e.rater_role {
                    ActorRole::Client => self.client_rating = Some(rating),
                    ActorRole::Dealer => self.dealer_rating = Some(rating),
                    ActorRole::System => {}
                }
            }
            OrderEvent::MessageLogged(e) => {
                self.messages.push(OrderMessage {
                    author_role: e.author_role,
                    body: e.body.clone(),
                    at: e.occurred_at,
                });
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Create(cmd) => self.handle_create(cmd),
            OrderCommand::Transition(cmd) => self.handle_transition(cmd),
            OrderCommand::Rate(cmd) => self.handle_rate(cmd),
            OrderCommand::LogMessage(cmd) => self.handle_log_message(cmd),
        }
    }
}
