//! The table of supported API operations.

use reqwest::Method;

/// A logical API operation, mapped at compile time to its endpoint path and
/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Track a usage event (the only batched operation).
    TrackEvent,
    /// List all customers.
    ListCustomers,
    /// Fetch one customer by id.
    GetCustomer,
    /// Create a customer.
    CreateCustomer,
    /// Start a subscription.
    CreateSubscription,
    /// Cancel a subscription.
    CancelSubscription,
    /// Update a running subscription.
    UpdateSubscription,
    /// List subscriptions.
    ListSubscriptions,
    /// Check a customer's remaining metric allowance.
    GetCustomerMetricAccess,
    /// Check a customer's feature entitlement.
    GetCustomerFeatureAccess,
    /// List all plans.
    ListPlans,
    /// Fetch one plan by id.
    GetPlan,
}

impl Operation {
    /// The stable operation name used as the message `$type` discriminator.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TrackEvent => "track_event",
            Self::ListCustomers => "list_customers",
            Self::GetCustomer => "get_customer",
            Self::CreateCustomer => "create_customer",
            Self::CreateSubscription => "create_subscription",
            Self::CancelSubscription => "cancel_subscription",
            Self::UpdateSubscription => "update_subscription",
            Self::ListSubscriptions => "list_subscriptions",
            Self::GetCustomerMetricAccess => "get_customer_metric_access",
            Self::GetCustomerFeatureAccess => "get_customer_feature_access",
            Self::ListPlans => "list_plans",
            Self::GetPlan => "get_plan",
        }
    }

    /// Endpoint path relative to the host, with a trailing slash.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::TrackEvent => "/api/track/",
            Self::ListCustomers | Self::GetCustomer | Self::CreateCustomer => "/api/customers/",
            Self::CreateSubscription => "/api/subscriptions/add/",
            Self::CancelSubscription => "/api/subscriptions/cancel/",
            Self::UpdateSubscription => "/api/subscriptions/update/",
            Self::ListSubscriptions => "/api/subscriptions/",
            Self::GetCustomerMetricAccess => "/api/customer_metric_access/",
            Self::GetCustomerFeatureAccess => "/api/customer_feature_access/",
            Self::ListPlans | Self::GetPlan => "/api/plans/",
        }
    }

    /// HTTP method for this operation.
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::TrackEvent
            | Self::CreateCustomer
            | Self::CreateSubscription
            | Self::CancelSubscription
            | Self::UpdateSubscription => Method::POST,
            Self::ListCustomers
            | Self::GetCustomer
            | Self::ListSubscriptions
            | Self::GetCustomerMetricAccess
            | Self::GetCustomerFeatureAccess
            | Self::ListPlans
            | Self::GetPlan => Method::GET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_event_mapping() {
        assert_eq!(Operation::TrackEvent.name(), "track_event");
        assert_eq!(Operation::TrackEvent.path(), "/api/track/");
        assert_eq!(Operation::TrackEvent.method(), Method::POST);
    }

    #[test]
    fn reads_use_get() {
        for op in [
            Operation::ListCustomers,
            Operation::GetCustomer,
            Operation::ListSubscriptions,
            Operation::ListPlans,
            Operation::GetPlan,
            Operation::GetCustomerMetricAccess,
            Operation::GetCustomerFeatureAccess,
        ] {
            assert_eq!(op.method(), Method::GET, "{}", op.name());
        }
    }

    #[test]
    fn paths_end_with_slash() {
        for op in [
            Operation::TrackEvent,
            Operation::CreateCustomer,
            Operation::CreateSubscription,
            Operation::CancelSubscription,
            Operation::UpdateSubscription,
            Operation::ListSubscriptions,
            Operation::GetCustomerMetricAccess,
            Operation::GetCustomerFeatureAccess,
            Operation::ListPlans,
        ] {
            assert!(op.path().ends_with('/'), "{}", op.path());
        }
    }
}
