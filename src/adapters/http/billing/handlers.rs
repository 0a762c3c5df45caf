//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ChangePlanCommand, ChangePlanHandler,
    CheckoutUrls, CreateTrialCommand, CreateTrialHandler, GetBillingMetricsHandler,
    GetBillingMetricsQuery, GetSubscriptionHandler, GetSubscriptionQuery,
    GetSubscriptionsHandler, GetSubscriptionsQuery, HandleBillingWebhookCommand,
    HandleBillingWebhookHandler, ReconciliationPorts, StartCheckoutCommand, StartCheckoutHandler,
};
use crate::application::{ListingVisibilityCoordinator, PlanAllocator, PlanCatalog, TrialExpiry};
use crate::domain::billing::{StripeWebhookVerifier, WebhookError};
use crate::domain::foundation::{SpaceId, SubscriptionId, UserId};
use crate::domain::subscription::SubscriptionError;
use crate::ports::{
    ListingDirectory, PaymentProvider, SeatReservations, SubscriptionRepository, UserAccounts,
    WebhookEventRepository,
};

use super::dto::{
    BillingMetricsResponse, CancelSubscriptionResponse, ChangePlanRequest, CheckoutResponse,
    CreateTrialRequest, ErrorResponse, MetricsParams, StartCheckoutRequest,
    SubscriptionListResponse, SubscriptionResponse, WebhookAckResponse,
};

/// Header carrying the provider's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Port implementations the billing API runs on.
#[derive(Clone)]
pub struct BillingPorts {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub listings: Arc<dyn ListingDirectory>,
    pub users: Arc<dyn UserAccounts>,
    pub seats: Arc<dyn SeatReservations>,
    pub ledger: Arc<dyn WebhookEventRepository>,
    pub payment_provider: Arc<dyn PaymentProvider>,
}

/// Settings the billing handlers are built with.
#[derive(Clone)]
pub struct BillingSettings {
    pub catalog: PlanCatalog,
    pub urls: CheckoutUrls,
    pub trial_days: i64,
    pub webhook_deadline: Duration,
}

/// Shared application state containing all handlers.
///
/// Cloned for each request; every handler sits behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub start_checkout: Arc<StartCheckoutHandler>,
    pub create_trial: Arc<CreateTrialHandler>,
    pub change_plan: Arc<ChangePlanHandler>,
    pub cancel_subscription: Arc<CancelSubscriptionHandler>,
    pub get_subscriptions: Arc<GetSubscriptionsHandler>,
    pub get_subscription: Arc<GetSubscriptionHandler>,
    pub billing_metrics: Arc<GetBillingMetricsHandler>,
    pub webhook: Arc<HandleBillingWebhookHandler>,
}

impl BillingAppState {
    /// Wires every handler over one set of ports.
    pub fn new(
        ports: BillingPorts,
        verifier: StripeWebhookVerifier,
        settings: BillingSettings,
    ) -> Self {
        let listing_sync = Arc::new(ListingVisibilityCoordinator::new(ports.listings.clone()));
        let allocator = Arc::new(PlanAllocator::new(
            ports.seats.clone(),
            settings.catalog.clone(),
        ));
        let trials = Arc::new(TrialExpiry::new(
            ports.subscriptions.clone(),
            listing_sync.clone(),
        ));

        let reconciliation = ReconciliationPorts {
            subscriptions: ports.subscriptions.clone(),
            users: ports.users.clone(),
            seats: ports.seats.clone(),
            ledger: ports.ledger.clone(),
        };

        Self {
            start_checkout: Arc::new(StartCheckoutHandler::new(
                ports.subscriptions.clone(),
                ports.listings.clone(),
                ports.payment_provider.clone(),
                allocator,
                listing_sync.clone(),
                settings.urls,
            )),
            create_trial: Arc::new(CreateTrialHandler::new(
                ports.subscriptions.clone(),
                ports.listings.clone(),
                listing_sync.clone(),
                settings.catalog.normal.clone(),
                settings.trial_days,
            )),
            change_plan: Arc::new(ChangePlanHandler::new(ports.subscriptions.clone())),
            cancel_subscription: Arc::new(CancelSubscriptionHandler::new(
                ports.subscriptions.clone(),
                ports.payment_provider.clone(),
                listing_sync.clone(),
            )),
            get_subscriptions: Arc::new(GetSubscriptionsHandler::new(
                ports.subscriptions.clone(),
                trials.clone(),
            )),
            get_subscription: Arc::new(GetSubscriptionHandler::new(
                ports.subscriptions.clone(),
                trials,
            )),
            billing_metrics: Arc::new(GetBillingMetricsHandler::new(ports.subscriptions)),
            webhook: Arc::new(HandleBillingWebhookHandler::new(
                verifier,
                reconciliation,
                settings.catalog,
                listing_sync,
                settings.webhook_deadline,
            )),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity, set by the gateway in front of this service.
///
/// `X-User-Id` names the caller; `X-User-Role: admin` grants admin access.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub is_admin: bool,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| UserId::new(s).ok())
                .ok_or(AuthenticationRequired)?;

            let is_admin = parts
                .headers
                .get("X-User-Role")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|role| role.eq_ignore_ascii_case("admin"));

            Ok(AuthenticatedUser { user_id, is_admin })
        })
    }
}

fn parse_space_id(raw: &str) -> Result<SpaceId, SubscriptionError> {
    SpaceId::from_str(raw).map_err(|_| SubscriptionError::validation("space_id", "Not a valid id"))
}

fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, SubscriptionError> {
    SubscriptionId::from_str(raw)
        .map_err(|_| SubscriptionError::validation("subscription_id", "Not a valid id"))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/subscriptions - The caller's subscriptions
pub async fn list_subscriptions(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscriptions = state
        .get_subscriptions
        .handle(GetSubscriptionsQuery {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(SubscriptionListResponse {
        subscriptions: subscriptions.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/billing/subscriptions/:id - One subscription
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription = state
        .get_subscription
        .handle(GetSubscriptionQuery {
            subscription_id: parse_subscription_id(&subscription_id)?,
            requested_by: user.user_id,
            is_admin: user.is_admin,
        })
        .await?;

    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// GET /api/billing/metrics - MRR and churn (admin only)
pub async fn get_billing_metrics(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Query(params): Query<MetricsParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let metrics = state
        .billing_metrics
        .handle(GetBillingMetricsQuery {
            is_admin: user.is_admin,
            window_days: params.window_days,
        })
        .await?;

    Ok(Json(BillingMetricsResponse::from(metrics)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/checkout - Start a checkout for a listing
pub async fn start_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<StartCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = StartCheckoutCommand {
        user_id: user.user_id,
        space_id: parse_space_id(&request.space_id)?,
        interval: request.interval,
        coupon_code: request.coupon_code,
    };

    let result = state.start_checkout.handle(cmd).await?;
    let response = CheckoutResponse::from(result);
    let status = match &response {
        CheckoutResponse::Redirect { .. } => StatusCode::CREATED,
        CheckoutResponse::AlreadyActive { .. } => StatusCode::OK,
    };

    Ok((status, Json(response)))
}

/// POST /api/billing/trial - Start a free trial
pub async fn create_trial(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateTrialRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateTrialCommand {
        user_id: user.user_id,
        space_id: parse_space_id(&request.space_id)?,
    };

    let result = state.create_trial.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(result.subscription)),
    ))
}

/// POST /api/billing/subscriptions/:id/plan - Change plan and price
pub async fn change_plan(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(subscription_id): Path<String>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ChangePlanCommand {
        subscription_id: parse_subscription_id(&subscription_id)?,
        requested_by: user.user_id,
        is_admin: user.is_admin,
        plan: request.plan,
        price_cents: request.price_cents,
    };

    let result = state.change_plan.handle(cmd).await?;

    Ok(Json(SubscriptionResponse::from(result.subscription)))
}

/// POST /api/billing/subscriptions/:id/cancel - Cancel a subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CancelSubscriptionCommand {
        subscription_id: parse_subscription_id(&subscription_id)?,
        requested_by: user.user_id,
        is_admin: user.is_admin,
    };

    let result = state.cancel_subscription.handle(cmd).await?;

    Ok(Json(CancelSubscriptionResponse::new(
        result.subscription,
        result.effect,
    )))
}

/// POST /api/webhooks/stripe - Handle Stripe webhook events
///
/// Responds 2xx for anything that must not be redelivered, including events
/// that were ignored or already processed.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match state.webhook.handle(cmd).await {
        Ok(result) => (StatusCode::OK, Json(WebhookAckResponse::from(&result))).into_response(),
        Err(err) => webhook_error_response(&err),
    }
}

fn webhook_error_response(err: &WebhookError) -> Response {
    let error_code = match err {
        WebhookError::MissingSignature
        | WebhookError::InvalidSignature
        | WebhookError::TimestampOutOfRange
        | WebhookError::InvalidTimestamp => "INVALID_WEBHOOK_SIGNATURE",
        WebhookError::ParseError(_) | WebhookError::MissingMetadata(_) => "INVALID_WEBHOOK_PAYLOAD",
        WebhookError::Ignored(_) => "IGNORED",
        WebhookError::Database(_) => "INTERNAL_ERROR",
        WebhookError::Timeout(_) => "TIMEOUT",
    };
    let body = ErrorResponse::new(error_code, err.to_string());
    (err.status_code(), Json(body)).into_response()
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts subscription errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(SubscriptionError);

impl From<SubscriptionError> for BillingApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SubscriptionError::NotFound(_) | SubscriptionError::ListingNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            SubscriptionError::AlreadyExists(_) | SubscriptionError::InvalidState { .. } => {
                StatusCode::CONFLICT
            }
            SubscriptionError::Forbidden { .. } => StatusCode::FORBIDDEN,
            SubscriptionError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            SubscriptionError::PaymentFailed { .. } => StatusCode::BAD_GATEWAY,
            SubscriptionError::Infrastructure(msg) => {
                tracing::error!(error = %msg, "Billing request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let error_code = self.0.code().to_string();
        let body = match &self.0 {
            SubscriptionError::ValidationFailed { field, .. } => ErrorResponse::with_details(
                error_code,
                self.0.message(),
                serde_json::json!({ "field": field }),
            ),
            SubscriptionError::Infrastructure(_) => {
                ErrorResponse::new(error_code, "Internal error")
            }
            _ => ErrorResponse::new(error_code, self.0.message()),
        };
        (status, Json(body)).into_response()
    }
}
