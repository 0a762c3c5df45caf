//! Per-event reconciliation handlers.
//!
//! Each handler moves the local record to the absolute state the event
//! reports, so redelivered and reordered events converge. Handlers return
//! the listing visibility changes implied by what they committed; they never
//! touch listings themselves.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::plan_allocator::PlanCatalog;
use crate::domain::billing::{
    metadata, CheckoutSessionObject, InvoiceObject, StripeEvent, StripeEventType,
    SubscriptionObject, WebhookError, WebhookEventHandler,
};
use crate::domain::foundation::{DomainError, ErrorCode, SpaceId, Timestamp, UserId};
use crate::domain::listing::VisibilityChange;
use crate::domain::subscription::{
    CheckoutMode, Plan, Subscription, SubscriptionStatus, BILLING_CYCLE_DAYS,
};
use crate::ports::{
    Modified, SaveResult, SeatReservations, SubscriptionMutation, SubscriptionRepository,
    UserAccounts,
};

/// A state the record cannot take (e.g. reopening a cancelled one) is
/// acknowledged, not retried.
fn reconcile_error(err: DomainError) -> WebhookError {
    match err.code {
        ErrorCode::InvalidStateTransition => WebhookError::Ignored(err.message),
        _ => WebhookError::from(err),
    }
}

fn effects_of(modified: &Modified) -> Vec<VisibilityChange> {
    modified.subscription.visibility_change().into_iter().collect()
}

async fn modify_external(
    subscriptions: &dyn SubscriptionRepository,
    event: &StripeEvent,
    external_id: &str,
    mutation: SubscriptionMutation<'_>,
) -> Result<Option<Modified>, WebhookError> {
    let modified = subscriptions
        .modify_by_external_id(external_id, mutation)
        .await
        .map_err(reconcile_error)?;

    match &modified {
        None => tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            external_subscription_id = external_id,
            "Event for unknown subscription, nothing to reconcile"
        ),
        Some(m) if m.changed => tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            subscription_id = %m.subscription.id,
            status = %m.subscription.status,
            "Subscription reconciled"
        ),
        Some(m) => tracing::debug!(
            event_id = %event.id,
            subscription_id = %m.subscription.id,
            "Subscription already in reported state"
        ),
    }
    Ok(modified)
}

// ════════════════════════════════════════════════════════════════════════════
// checkout.session.completed
// ════════════════════════════════════════════════════════════════════════════

pub struct CheckoutCompletedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserAccounts>,
    seats: Arc<dyn SeatReservations>,
    catalog: PlanCatalog,
}

impl CheckoutCompletedHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserAccounts>,
        seats: Arc<dyn SeatReservations>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            subscriptions,
            users,
            seats,
            catalog,
        }
    }

    fn required<'a>(
        session: &'a CheckoutSessionObject,
        key: &'static str,
    ) -> Result<&'a str, WebhookError> {
        session.metadata_value(key).ok_or_else(|| {
            tracing::error!(
                session_id = %session.id,
                missing = key,
                "Checkout completed without required metadata; no subscription created"
            );
            WebhookError::MissingMetadata(key)
        })
    }

    fn build_subscription(
        &self,
        session: &CheckoutSessionObject,
        user_id: UserId,
        space_id: SpaceId,
    ) -> Result<Subscription, WebhookError> {
        let mode = session
            .mode
            .as_deref()
            .and_then(CheckoutMode::from_provider_str)
            .unwrap_or(if session.subscription.is_some() {
                CheckoutMode::Recurring
            } else {
                CheckoutMode::OneTime
            });

        let plan = session
            .metadata_value(metadata::PLAN_TYPE)
            .and_then(|p| Plan::new(p).ok())
            .unwrap_or_else(|| match mode {
                CheckoutMode::OneTime => Plan::activation(),
                CheckoutMode::Recurring => Plan::normal(),
            });

        let price_cents = session
            .amount_total
            .filter(|amount| *amount > 0)
            .or_else(|| self.catalog.offer(&plan).map(|o| o.price_cents))
            .ok_or_else(|| {
                WebhookError::ParseError(format!(
                    "Checkout {} has no charged amount and plan {} has no list price",
                    session.id, plan
                ))
            })?;

        let invalid = |e: DomainError| WebhookError::ParseError(e.message);
        let mut subscription = Subscription::new_active(user_id, Some(space_id), plan, price_cents)
            .map_err(invalid)?
            .with_checkout_session(session.id.clone());

        if let Some(customer) = &session.customer {
            subscription = subscription.with_customer(customer.clone());
        }
        if let Some(coupon) = session.metadata_value(metadata::COUPON_CODE) {
            subscription = subscription.with_coupon(coupon);
        }
        if mode == CheckoutMode::Recurring {
            if let Some(external) = &session.subscription {
                subscription = subscription.with_external_subscription(external.clone());
            }
            subscription
                .update_billing_date(Timestamp::now().add_days(BILLING_CYCLE_DAYS))
                .map_err(invalid)?;
        }
        Ok(subscription)
    }

    /// Promotes the host's unpaid trial on this listing to the paid
    /// subscription, in place. Returns `None` when there is no such trial or
    /// another checkout took it first.
    async fn convert_open_trial(
        &self,
        paid: &Subscription,
        space_id: &SpaceId,
    ) -> Result<Option<Subscription>, WebhookError> {
        let trial = self
            .subscriptions
            .find_by_space(space_id)
            .await?
            .into_iter()
            .find(|s| s.user_id == paid.user_id && s.is_unpaid_trial());
        let Some(trial) = trial else {
            return Ok(None);
        };

        let mutation = |s: &mut Subscription| -> Result<bool, DomainError> {
            if s.checkout_session_id == paid.checkout_session_id || !s.is_unpaid_trial() {
                return Ok(false);
            }
            s.convert_trial(paid)?;
            Ok(true)
        };
        let modified = self
            .subscriptions
            .modify_by_id(&trial.id, &mutation)
            .await
            .map_err(reconcile_error)?;

        Ok(modified
            .map(|m| m.subscription)
            .filter(|s| s.checkout_session_id == paid.checkout_session_id))
    }

    async fn consume_seat(&self, subscription: &Subscription, space_id: &SpaceId) {
        if !subscription.plan.is_founder() {
            return;
        }
        // The seat is now counted as an active subscription.
        if let Err(e) = self
            .seats
            .consume(&subscription.plan, &subscription.user_id, space_id)
            .await
        {
            tracing::warn!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to consume founder seat reservation"
            );
        }
    }
}

#[async_trait]
impl WebhookEventHandler for CheckoutCompletedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::CheckoutSessionCompleted]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError> {
        let session: CheckoutSessionObject = event.object()?;

        let user_id = Self::required(&session, metadata::USER_ID)?;
        let space_id = Self::required(&session, metadata::SPACE_ID)?;
        let user_id = UserId::new(user_id)
            .map_err(|e| WebhookError::ParseError(format!("Invalid user_id metadata: {}", e)))?;
        let space_id = SpaceId::from_str(space_id)
            .map_err(|e| WebhookError::ParseError(format!("Invalid space_id metadata: {}", e)))?;

        if let Some(existing) = self
            .subscriptions
            .find_by_checkout_session(&session.id)
            .await?
        {
            tracing::debug!(
                session_id = %session.id,
                subscription_id = %existing.id,
                "Checkout session already reconciled"
            );
            return Ok(existing.visibility_change().into_iter().collect());
        }

        if let Some(customer) = &session.customer {
            if let Err(e) = self.users.attach_customer_id(&user_id, customer).await {
                tracing::warn!(
                    user_id = %user_id,
                    customer_id = %customer,
                    error = %e,
                    "Failed to attach provider customer to user"
                );
            }
        }

        let subscription = self.build_subscription(&session, user_id, space_id)?;

        if let Some(converted) = self.convert_open_trial(&subscription, &space_id).await? {
            tracing::info!(
                session_id = %session.id,
                subscription_id = %converted.id,
                user_id = %converted.user_id,
                space_id = %space_id,
                plan = %converted.plan,
                price_cents = converted.price_cents,
                "Trial converted to paid subscription"
            );
            self.consume_seat(&converted, &space_id).await;
            return Ok(converted.visibility_change().into_iter().collect());
        }

        match self.subscriptions.save(&subscription).await? {
            SaveResult::Inserted => tracing::info!(
                session_id = %session.id,
                subscription_id = %subscription.id,
                user_id = %subscription.user_id,
                space_id = %space_id,
                plan = %subscription.plan,
                price_cents = subscription.price_cents,
                "Subscription created from checkout"
            ),
            SaveResult::AlreadyExists => {
                tracing::debug!(
                    session_id = %session.id,
                    "Concurrent delivery already created the subscription"
                );
                return Ok(vec![VisibilityChange::activate(space_id)]);
            }
        }

        self.consume_seat(&subscription, &space_id).await;
        Ok(vec![VisibilityChange::activate(space_id)])
    }
}

// ════════════════════════════════════════════════════════════════════════════
// invoice.paid / invoice.payment_failed
// ════════════════════════════════════════════════════════════════════════════

fn invoice_subscription(invoice: &InvoiceObject) -> Result<&str, WebhookError> {
    invoice.subscription.as_deref().ok_or_else(|| {
        WebhookError::Ignored(format!("Invoice {} has no subscription", invoice.id))
    })
}

pub struct InvoicePaidHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl InvoicePaidHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaidHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoicePaid]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError> {
        let invoice: InvoiceObject = event.object()?;
        let external_id = invoice_subscription(&invoice)?;
        let period_end = invoice
            .service_period_end()
            .and_then(Timestamp::from_unix_secs);

        let mutation = move |s: &mut Subscription| -> Result<bool, DomainError> {
            let mut changed = s.force_status(SubscriptionStatus::Active)?;
            if let Some(end) = period_end {
                // Stale invoices must not move the renewal date backwards.
                if end.is_after(&Timestamp::now()) && s.next_billing_date != Some(end) {
                    s.update_billing_date(end)?;
                    changed = true;
                }
            }
            Ok(changed)
        };

        match modify_external(self.subscriptions.as_ref(), event, external_id, &mutation).await? {
            Some(modified) => Ok(effects_of(&modified)),
            None => Err(WebhookError::Ignored(format!(
                "No subscription for {}",
                external_id
            ))),
        }
    }
}

pub struct InvoicePaymentFailedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl InvoicePaymentFailedHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaymentFailedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::InvoicePaymentFailed]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError> {
        let invoice: InvoiceObject = event.object()?;
        let external_id = invoice_subscription(&invoice)?;

        let mutation = |s: &mut Subscription| s.force_status(SubscriptionStatus::Suspended);

        match modify_external(self.subscriptions.as_ref(), event, external_id, &mutation).await? {
            Some(modified) => Ok(effects_of(&modified)),
            None => Err(WebhookError::Ignored(format!(
                "No subscription for {}",
                external_id
            ))),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// customer.subscription.deleted / customer.subscription.updated
// ════════════════════════════════════════════════════════════════════════════

pub struct SubscriptionDeletedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionDeletedHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionDeletedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::CustomerSubscriptionDeleted]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError> {
        let object: SubscriptionObject = event.object()?;

        let mutation = |s: &mut Subscription| s.force_status(SubscriptionStatus::Cancelled);

        match modify_external(self.subscriptions.as_ref(), event, &object.id, &mutation).await? {
            Some(modified) => Ok(effects_of(&modified)),
            None => Err(WebhookError::Ignored(format!(
                "No subscription for {}",
                object.id
            ))),
        }
    }
}

/// Mirrors the provider's `cancel_at_period_end` flag.
pub struct SubscriptionUpdatedHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionUpdatedHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionUpdatedHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![StripeEventType::CustomerSubscriptionUpdated]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<Vec<VisibilityChange>, WebhookError> {
        let object: SubscriptionObject = event.object()?;
        let flag = object.cancel_at_period_end;

        let mutation = move |s: &mut Subscription| -> Result<bool, DomainError> {
            if s.cancel_at_period_end == flag {
                return Ok(false);
            }
            s.set_cancellation(flag)?;
            Ok(true)
        };

        match modify_external(self.subscriptions.as_ref(), event, &object.id, &mutation).await? {
            Some(_) => Ok(Vec::new()),
            None => Err(WebhookError::Ignored(format!(
                "No subscription for {}",
                object.id
            ))),
        }
    }
}
