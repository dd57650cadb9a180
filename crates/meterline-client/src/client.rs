//! The meterline client orchestrator.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use meterline_core::{Message, MessageQueue, RetryPolicy, KEY_LIBRARY, KEY_LIBRARY_VERSION};

use crate::config::ClientConfig;
use crate::consumer::Consumer;
use crate::delivery::Delivery;
use crate::error::ClientError;
use crate::operation::Operation;
use crate::types::{
    CancelSubscription, Customer, CustomerInput, FeatureAccess, MetricAccess, Plan,
    SubscriptionFilter, SubscriptionInput, SubscriptionRecord, SubscriptionStatus, TrackEvent,
    UpdateSubscription,
};

/// Library name injected into every message.
const LIBRARY: &str = "meterline-rust";

/// Client for the meterline usage-metering API.
///
/// Tracked events are queued and delivered in batches by background
/// consumers; all other operations perform a blocking request and return the
/// parsed response. Construct one client and share it by reference; there is
/// no process-wide default instance.
///
/// Call [`shutdown`](Self::shutdown) before the application exits: dropping
/// the client without flushing may lose buffered events. Only
/// [`flush`](Self::flush)/[`shutdown`](Self::shutdown) guarantee delivery of
/// everything enqueued before the call.
pub struct MeterClient {
    config: ClientConfig,
    queue: Arc<MessageQueue>,
    consumers: Vec<Arc<Consumer>>,
    delivery: Arc<Delivery>,
    retry: RetryPolicy,
}

impl MeterClient {
    /// Create a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] for an empty API key, or
    /// [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_config(ClientConfig::new(api_key))
    }

    /// Create a client with custom configuration.
    ///
    /// Unless `sync_mode` is set, this constructs `workers` consumers bound
    /// to the track endpoint and, when sending is enabled, starts them.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] when the configuration is
    /// invalid, or [`ClientError::Http`] if the HTTP client cannot be built.
    pub fn with_config(mut config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        config.host = config.host.trim_end_matches('/').to_string();

        let delivery = Arc::new(Delivery::new(
            config.api_key.clone(),
            config.timeout,
            config.gzip,
            config.debug,
        )?);
        let queue = Arc::new(MessageQueue::new(config.max_queue_size));
        let retry = RetryPolicy::with_max_attempts(config.max_retries);

        let mut consumers = Vec::new();
        if !config.sync_mode {
            let endpoint = format!("{}{}", config.host, Operation::TrackEvent.path());
            for _ in 0..config.workers {
                let consumer = Arc::new(Consumer::new(
                    Arc::clone(&queue),
                    Arc::clone(&delivery),
                    endpoint.clone(),
                    config.flush_at,
                    config.flush_interval,
                    retry.clone(),
                    config.on_error.clone(),
                ));
                // With sending disabled the consumer stays constructed but
                // never starts.
                if config.send {
                    consumer.start();
                }
                consumers.push(consumer);
            }
        }

        Ok(Self {
            config,
            queue,
            consumers,
            delivery,
            retry,
        })
    }

    /// Track a usage event.
    ///
    /// In the default async mode the event is enqueued and the returned
    /// boolean reports whether the queue accepted it; delivery happens in
    /// the background and failures are only observable through the error
    /// callback. In `sync_mode` the event is delivered immediately as a
    /// single-message batch under the retry policy and this call returns
    /// its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidInput`] for an empty customer id or
    /// event name; in `sync_mode`, also any delivery error.
    pub async fn track_event(&self, event: TrackEvent) -> Result<bool, ClientError> {
        require_non_empty("customer_id", &event.customer_id)?;
        require_non_empty("event_name", &event.event_name)?;

        let time_created = event.time_created.unwrap_or_else(Utc::now).to_rfc3339();
        let idempotency_id = event
            .idempotency_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let message = Message::new(Operation::TrackEvent.name())
            .with("customer_id", Value::String(event.customer_id))
            .with("event_name", Value::String(event.event_name))
            .with("properties", event.properties.unwrap_or_else(|| json!({})))
            .with("time_created", Value::String(time_created))
            .with("idempotency_id", Value::String(idempotency_id));

        self.enqueue(message).await
    }

    /// Enqueue a prepared message, injecting library identity metadata.
    async fn enqueue(&self, mut message: Message) -> Result<bool, ClientError> {
        message.insert(KEY_LIBRARY, Value::String(LIBRARY.to_string()));
        message.insert(
            KEY_LIBRARY_VERSION,
            Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );

        if self.config.debug {
            tracing::debug!(fields = %serde_json::to_string(&message).unwrap_or_default(), "queueing");
        }

        // With sending disabled, report the message as trivially accepted.
        if !self.config.send {
            return Ok(true);
        }

        if self.config.sync_mode {
            let endpoint = format!("{}{}", self.config.host, Operation::TrackEvent.path());
            self.delivery
                .send_batch(&endpoint, std::slice::from_ref(&message), &self.retry)
                .await?;
            return Ok(true);
        }

        let operation = message.operation().unwrap_or("unknown").to_string();
        if self.queue.try_push(message) {
            tracing::debug!(operation = %operation, "enqueued");
            Ok(true)
        } else {
            tracing::warn!("queue is full, dropping message");
            Ok(false)
        }
    }

    /// List all customers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_customers(&self) -> Result<Vec<Customer>, ClientError> {
        let value = self
            .blocking(Operation::ListCustomers, None, None, &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch one customer by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_customer(&self, customer_id: &str) -> Result<Customer, ClientError> {
        require_non_empty("customer_id", customer_id)?;
        let value = self
            .blocking(Operation::GetCustomer, Some(customer_id), None, &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create a customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, the request fails, or the
    /// server returns an error.
    pub async fn create_customer(&self, input: CustomerInput) -> Result<Customer, ClientError> {
        require_non_empty("customer_id", &input.customer_id)?;
        require_non_empty("email", &input.email)?;

        let mut body = Message::new(Operation::CreateCustomer.name())
            .with("customer_id", Value::String(input.customer_id))
            .with("email", Value::String(input.email))
            .with("properties", input.properties.unwrap_or_else(|| json!({})));
        if let Some(name) = input.customer_name {
            body.insert("customer_name", Value::String(name));
        }
        if let Some(payment) = input.payment_provider {
            body.insert("payment_provider", Value::String(payment.provider));
            body.insert("payment_provider_id", Value::String(payment.provider_id));
        }

        let value = self
            .blocking(Operation::CreateCustomer, None, Some(body), &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, the request fails, or the
    /// server returns an error.
    pub async fn create_subscription(
        &self,
        input: SubscriptionInput,
    ) -> Result<SubscriptionRecord, ClientError> {
        require_non_empty("customer_id", &input.customer_id)?;
        require_non_empty("plan_id", &input.plan_id)?;
        require_non_empty("start_date", &input.start_date)?;
        validate_filters(input.subscription_filters.as_deref())?;

        let mut body = Message::new(Operation::CreateSubscription.name())
            .with("customer_id", Value::String(input.customer_id))
            .with("plan_id", Value::String(input.plan_id))
            .with("start_date", Value::String(input.start_date));
        if let Some(end_date) = input.end_date {
            body.insert("end_date", Value::String(end_date));
        }
        if let Some(auto_renew) = input.auto_renew {
            body.insert("auto_renew", Value::Bool(auto_renew));
        }
        if let Some(is_new) = input.is_new {
            body.insert("is_new", Value::Bool(is_new));
        }
        if let Some(filters) = input.subscription_filters {
            body.insert("subscription_filters", serde_json::to_value(filters)?);
        }

        let value = self
            .blocking(Operation::CreateSubscription, None, Some(body), &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Cancel the subscriptions selected by the request.
    ///
    /// Returns the affected subscription records.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, the request fails, or the
    /// server returns an error.
    pub async fn cancel_subscription(
        &self,
        request: CancelSubscription,
    ) -> Result<Vec<SubscriptionRecord>, ClientError> {
        validate_filters(request.subscription_filters.as_deref())?;

        let mut query = Vec::new();
        if let Some(plan_id) = request.plan_id {
            query.push(("plan_id", plan_id));
        }
        if let Some(customer_id) = request.customer_id {
            query.push(("customer_id", customer_id));
        }
        if let Some(filters) = request.subscription_filters {
            query.push(("subscription_filters", serde_json::to_string(&filters)?));
        }

        let mut body = Message::new(Operation::CancelSubscription.name());
        if let Some(behavior) = request.flat_fee_behavior {
            body.insert("flat_fee_behavior", serde_json::to_value(behavior)?);
        }
        if let Some(behavior) = request.usage_behavior {
            body.insert("usage_behavior", serde_json::to_value(behavior)?);
        }
        if let Some(behavior) = request.invoicing_behavior {
            body.insert("invoicing_behavior", serde_json::to_value(behavior)?);
        }

        let value = self
            .blocking(Operation::CancelSubscription, None, Some(body), &query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Update the subscriptions selected by the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, the request fails, or the
    /// server returns an error.
    pub async fn update_subscription(
        &self,
        request: UpdateSubscription,
    ) -> Result<Vec<SubscriptionRecord>, ClientError> {
        validate_filters(request.subscription_filters.as_deref())?;

        let mut query = Vec::new();
        if let Some(plan_id) = request.plan_id {
            query.push(("plan_id", plan_id));
        }
        if let Some(customer_id) = request.customer_id {
            query.push(("customer_id", customer_id));
        }
        if let Some(filters) = request.subscription_filters {
            query.push(("subscription_filters", serde_json::to_string(&filters)?));
        }

        let mut body = Message::new(Operation::UpdateSubscription.name());
        if let Some(plan_id) = request.replace_plan_id {
            body.insert("replace_plan_id", Value::String(plan_id));
        }
        if let Some(behavior) = request.invoicing_behavior {
            body.insert("invoicing_behavior", serde_json::to_value(behavior)?);
        }
        if let Some(behavior) = request.usage_behavior {
            body.insert("usage_behavior", serde_json::to_value(behavior)?);
        }
        if let Some(turn_off) = request.turn_off_auto_renew {
            body.insert("turn_off_auto_renew", Value::Bool(turn_off));
        }
        if let Some(end_date) = request.end_date {
            body.insert("end_date", Value::String(end_date));
        }

        let value = self
            .blocking(Operation::UpdateSubscription, None, Some(body), &query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// List subscriptions, optionally filtered by lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_subscriptions(
        &self,
        status: &[SubscriptionStatus],
    ) -> Result<Vec<SubscriptionRecord>, ClientError> {
        let query: Vec<(&str, String)> = status
            .iter()
            .map(|s| ("status", s.as_str().to_string()))
            .collect();
        let value = self
            .blocking(Operation::ListSubscriptions, None, None, &query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// List all plans.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_plans(&self) -> Result<Vec<Plan>, ClientError> {
        let value = self.blocking(Operation::ListPlans, None, None, &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch one plan by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_plan(&self, plan_id: &str) -> Result<Plan, ClientError> {
        require_non_empty("plan_id", plan_id)?;
        let value = self
            .blocking(Operation::GetPlan, Some(plan_id), None, &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Check a customer's remaining allowance for a metered event.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_customer_metric_access(
        &self,
        customer_id: &str,
        event_name: &str,
    ) -> Result<Vec<MetricAccess>, ClientError> {
        require_non_empty("customer_id", customer_id)?;
        require_non_empty("event_name", event_name)?;
        let query = [
            ("customer_id", customer_id.to_string()),
            ("event_name", event_name.to_string()),
        ];
        let value = self
            .blocking(Operation::GetCustomerMetricAccess, None, None, &query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Check a customer's entitlement to a feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_customer_feature_access(
        &self,
        customer_id: &str,
        feature_name: &str,
    ) -> Result<Vec<FeatureAccess>, ClientError> {
        require_non_empty("customer_id", customer_id)?;
        require_non_empty("feature_name", feature_name)?;
        let query = [
            ("customer_id", customer_id.to_string()),
            ("feature_name", feature_name.to_string()),
        ];
        let value = self
            .blocking(Operation::GetCustomerFeatureAccess, None, None, &query)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Perform a blocking request for one operation.
    ///
    /// `suffix` is appended to the operation path with a trailing slash
    /// (e.g. `/api/customers/<id>/`). The body, when present, carries the
    /// operation discriminator and library metadata like queued messages do.
    async fn blocking(
        &self,
        operation: Operation,
        suffix: Option<&str>,
        body: Option<Message>,
        query: &[(&str, String)],
    ) -> Result<Value, ClientError> {
        if !self.config.send {
            return Err(ClientError::SendDisabled);
        }

        let mut url = format!("{}{}", self.config.host, operation.path());
        if let Some(suffix) = suffix {
            url.push_str(suffix);
            url.push('/');
        }

        let body = body.map(|mut message| {
            message.insert(KEY_LIBRARY, Value::String(LIBRARY.to_string()));
            message.insert(
                KEY_LIBRARY_VERSION,
                Value::String(env!("CARGO_PKG_VERSION").to_string()),
            );
            serde_json::to_value(message)
        });
        let body = body.transpose()?;

        self.delivery
            .request(operation.method(), &url, body.as_ref(), query)
            .await
    }

    /// Block until every message enqueued before this call has been
    /// processed (delivered or dropped).
    ///
    /// Returns immediately when nothing is pending, even if no consumer is
    /// running.
    pub async fn flush(&self) {
        let size = self.queue.len();
        self.queue.join().await;
        tracing::debug!(size, "flushed the queue");
    }

    /// Stop all consumers after they drain the queue, and wait for them.
    ///
    /// Safe to call if the consumers never started (e.g. `send = false`).
    pub async fn join(&self) {
        for consumer in &self.consumers {
            consumer.pause();
        }
        futures::future::join_all(self.consumers.iter().map(|c| c.join())).await;
    }

    /// Flush all pending messages, then stop the consumers. Idempotent.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.join().await;
    }

    /// Number of accepted messages not yet processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Require that a string field is non-empty.
fn require_non_empty(name: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::InvalidInput(format!(
            "{name} must be a non-empty string"
        )));
    }
    Ok(())
}

/// Require that every filter names a property and a value.
fn validate_filters(filters: Option<&[SubscriptionFilter]>) -> Result<(), ClientError> {
    for filter in filters.unwrap_or_default() {
        require_non_empty("property_name", &filter.property_name)?;
        require_non_empty("value", &filter.value)?;
    }
    Ok(())
}
