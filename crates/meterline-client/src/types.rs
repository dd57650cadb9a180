//! Request and response models for the blocking call surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A usage event to track.
///
/// Only `customer_id` and `event_name` are required; the client fills in a
/// creation timestamp and a random idempotency id when they are omitted.
#[derive(Debug, Clone)]
pub struct TrackEvent {
    /// The customer the event is attributed to.
    pub customer_id: String,
    /// Name of the metered event.
    pub event_name: String,
    /// Free-form event properties.
    pub properties: Option<Value>,
    /// When the event occurred (default: now).
    pub time_created: Option<DateTime<Utc>>,
    /// Deduplication id (default: random UUID).
    pub idempotency_id: Option<String>,
}

impl TrackEvent {
    /// Create an event with the required fields.
    #[must_use]
    pub fn new(customer_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            event_name: event_name.into(),
            properties: None,
            time_created: None,
            idempotency_id: None,
        }
    }

    /// Attach event properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set an explicit creation time.
    #[must_use]
    pub fn with_time_created(mut self, time: DateTime<Utc>) -> Self {
        self.time_created = Some(time);
        self
    }

    /// Set an explicit idempotency id.
    #[must_use]
    pub fn with_idempotency_id(mut self, id: impl Into<String>) -> Self {
        self.idempotency_id = Some(id.into());
        self
    }
}

/// Payment provider link for a customer.
///
/// Provider name and provider-side id always travel together; modelling them
/// as one struct makes a mismatched pair unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProvider {
    /// Provider name (e.g. `"stripe"`).
    pub provider: String,
    /// Customer id on the provider's side.
    pub provider_id: String,
}

/// Input for creating a customer.
#[derive(Debug, Clone)]
pub struct CustomerInput {
    /// Caller-chosen customer id.
    pub customer_id: String,
    /// Contact email.
    pub email: String,
    /// Display name.
    pub customer_name: Option<String>,
    /// Free-form customer properties.
    pub properties: Option<Value>,
    /// Optional payment provider link.
    pub payment_provider: Option<PaymentProvider>,
}

impl CustomerInput {
    /// Create input with the required fields.
    #[must_use]
    pub fn new(customer_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            email: email.into(),
            customer_name: None,
            properties: None,
            payment_provider: None,
        }
    }
}

/// A customer record returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Customer id.
    pub customer_id: String,
    /// Display name.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form customer properties.
    #[serde(default)]
    pub properties: Option<Value>,
    /// Payment provider name, if linked.
    #[serde(default)]
    pub payment_provider: Option<String>,
}

/// A property filter narrowing a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Property to filter on.
    pub property_name: String,
    /// Required property value.
    pub value: String,
}

/// Input for starting a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionInput {
    /// The subscribing customer.
    pub customer_id: String,
    /// The plan to subscribe to.
    pub plan_id: String,
    /// Subscription start, ISO-8601.
    pub start_date: String,
    /// Subscription end, ISO-8601.
    pub end_date: Option<String>,
    /// Renew automatically at period end.
    pub auto_renew: Option<bool>,
    /// Mark as a brand-new subscription.
    pub is_new: Option<bool>,
    /// Property filters scoping the subscription.
    pub subscription_filters: Option<Vec<SubscriptionFilter>>,
}

impl SubscriptionInput {
    /// Create input with the required fields.
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        plan_id: impl Into<String>,
        start_date: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            plan_id: plan_id.into(),
            start_date: start_date.into(),
            end_date: None,
            auto_renew: None,
            is_new: None,
            subscription_filters: None,
        }
    }
}

/// How remaining usage is billed when a subscription is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageBillingBehavior {
    /// Bill the full usage accrued so far.
    BillFull,
    /// Bill nothing for accrued usage.
    BillNone,
}

/// When cancellation charges are invoiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoicingBehavior {
    /// Fold the charges into the next scheduled invoice.
    AddToNextInvoice,
    /// Issue an invoice immediately.
    InvoiceNow,
}

/// How the flat fee is settled on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatFeeBehavior {
    /// Refund the prorated remainder.
    Refund,
    /// Prorate the fee to the cancellation date.
    Prorate,
    /// Charge the full fee regardless.
    ChargeFull,
}

/// How invoicing carries over when a subscription switches plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTransferBehavior {
    /// Move accrued charges onto the new subscription.
    TransferToNewSubscription,
    /// Invoice the old and new subscriptions separately.
    KeepSeparate,
}

/// Request for cancelling subscriptions.
///
/// `customer_id`, `plan_id`, and `subscription_filters` select which
/// subscriptions are affected; the behavior fields control settlement.
#[derive(Debug, Clone, Default)]
pub struct CancelSubscription {
    /// Limit to one customer.
    pub customer_id: Option<String>,
    /// Limit to one plan.
    pub plan_id: Option<String>,
    /// Limit by property filters.
    pub subscription_filters: Option<Vec<SubscriptionFilter>>,
    /// Flat fee settlement.
    pub flat_fee_behavior: Option<FlatFeeBehavior>,
    /// Usage settlement.
    pub usage_behavior: Option<UsageBillingBehavior>,
    /// Invoice timing.
    pub invoicing_behavior: Option<InvoicingBehavior>,
}

/// Request for updating subscriptions.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscription {
    /// Limit to one customer.
    pub customer_id: Option<String>,
    /// Limit to one plan.
    pub plan_id: Option<String>,
    /// Limit by property filters.
    pub subscription_filters: Option<Vec<SubscriptionFilter>>,
    /// Switch the subscription to this plan.
    pub replace_plan_id: Option<String>,
    /// Invoicing carry-over when switching plans.
    pub invoicing_behavior: Option<PlanTransferBehavior>,
    /// Invoice timing for accrued usage.
    pub usage_behavior: Option<InvoicingBehavior>,
    /// Disable auto-renewal.
    pub turn_off_auto_renew: Option<bool>,
    /// Move the end date.
    pub end_date: Option<String>,
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Currently running.
    Active,
    /// Past its end date.
    Ended,
    /// Start date in the future.
    NotStarted,
}

impl SubscriptionStatus {
    /// Wire value for query parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::NotStarted => "not_started",
        }
    }
}

/// A subscription record returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// The subscribing customer.
    pub customer_id: String,
    /// The subscribed plan.
    pub plan_id: String,
    /// Subscription start, ISO-8601.
    pub start_date: String,
    /// Subscription end, ISO-8601.
    #[serde(default)]
    pub end_date: Option<String>,
    /// Whether the subscription auto-renews.
    #[serde(default)]
    pub auto_renew: Option<bool>,
    /// Lifecycle state.
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    /// Property filters scoping the subscription.
    #[serde(default)]
    pub subscription_filters: Option<Vec<SubscriptionFilter>>,
}

/// A billing plan returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id.
    pub plan_id: String,
    /// Display name.
    #[serde(default)]
    pub plan_name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Billing period (e.g. `"monthly"`).
    #[serde(default)]
    pub plan_duration: Option<String>,
}

/// A customer's remaining allowance for one metered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAccess {
    /// The customer checked.
    pub customer_id: String,
    /// The metered event.
    pub event_name: String,
    /// Whether usage is still within the plan limits.
    pub access: bool,
    /// Usage accrued in the current period.
    #[serde(default)]
    pub metric_usage: Option<f64>,
    /// Plan limit for the period, if bounded.
    #[serde(default)]
    pub metric_total_limit: Option<f64>,
}

/// A customer's entitlement to one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureAccess {
    /// The customer checked.
    pub customer_id: String,
    /// The feature checked.
    pub feature_name: String,
    /// Whether the customer's plan grants the feature.
    pub access: bool,
}
