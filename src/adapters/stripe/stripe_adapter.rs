//! Stripe payment provider adapter.
//!
//! Talks to the Stripe REST API with form-encoded requests and basic auth
//! using the secret key. Webhook verification is not done here; see
//! `domain::billing::StripeWebhookVerifier`.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::subscription::CheckoutMode;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
};

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (stripe-mock, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    url: Option<String>,
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<reqwest::Response, PaymentError> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let mut request = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = map_stripe_error(status, &body);
        tracing::warn!(
            path,
            status = status.as_u16(),
            code = %error.code,
            "Stripe API request failed"
        );
        Err(error)
    }
}

/// Form parameters for `POST /v1/checkout/sessions`.
fn checkout_form(request: &CreateCheckoutRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), request.mode.as_provider_str().to_string()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), request.user_id.to_string()),
    ];

    for (key, value) in request.metadata() {
        params.push((format!("metadata[{}]", key), value.clone()));
        // Copy onto the provider subscription so its own events carry it too.
        if request.mode == CheckoutMode::Recurring {
            params.push((format!("subscription_data[metadata][{}]", key), value));
        }
    }

    if let Some(customer) = &request.customer_id {
        params.push(("customer".to_string(), customer.clone()));
    }
    if let Some(coupon) = &request.coupon_code {
        params.push(("discounts[0][coupon]".to_string(), coupon.clone()));
    }

    params
}

fn map_stripe_error(status: StatusCode, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<StripeErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| format!("Stripe API error ({})", status));

    let code = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentErrorCode::AuthenticationError,
        StatusCode::NOT_FOUND => PaymentErrorCode::NotFound,
        StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        s if s.is_client_error() => PaymentErrorCode::InvalidRequest,
        s if s.is_server_error() => PaymentErrorCode::ProviderError,
        _ => PaymentErrorCode::Unknown,
    };

    let error = PaymentError::new(code, message);
    match parsed.and_then(|e| e.error.code) {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let params = checkout_form(&request);
        let response = self
            .post_form(
                "/v1/checkout/sessions",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;

        let session: StripeCheckoutSessionResponse = response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })?;

        let url = session.url.ok_or_else(|| {
            PaymentError::provider(format!("Checkout session {} has no URL", session.id))
        })?;

        tracing::info!(
            session_id = %session.id,
            user_id = %request.user_id,
            space_id = %request.space_id,
            plan = %request.plan,
            "Stripe checkout session created"
        );

        Ok(CheckoutSession {
            id: session.id,
            url,
            expires_at: session.expires_at,
        })
    }

    async fn cancel_at_period_end(
        &self,
        external_subscription_id: &str,
    ) -> Result<(), PaymentError> {
        let path = format!("/v1/subscriptions/{}", external_subscription_id);
        let params = [("cancel_at_period_end".to_string(), "true".to_string())];
        self.post_form(&path, &params, None).await?;

        tracing::info!(
            external_subscription_id,
            "Stripe subscription set to cancel at period end"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{SpaceId, UserId};
    use crate::domain::subscription::Plan;

    fn request(mode: CheckoutMode) -> CreateCheckoutRequest {
        CreateCheckoutRequest {
            user_id: UserId::new("host-1").unwrap(),
            space_id: SpaceId::new(),
            plan: Plan::founder(),
            mode,
            price_id: "price_founder".to_string(),
            success_url: "https://app.test/ok".to_string(),
            cancel_url: "https://app.test/cancel".to_string(),
            customer_id: Some("cus_1".to_string()),
            coupon_code: Some("LAUNCH".to_string()),
            idempotency_key: None,
        }
    }

    fn value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn config_trims_trailing_slash() {
        let config = StripeConfig::new(SecretString::new("sk_test_x".to_string()))
            .with_base_url("http://localhost:12111/");
        assert_eq!(config.api_base_url, "http://localhost:12111");
    }

    #[test]
    fn recurring_checkout_form_carries_metadata_twice() {
        let req = request(CheckoutMode::Recurring);
        let params = checkout_form(&req);

        assert_eq!(value(&params, "mode"), Some("subscription"));
        assert_eq!(value(&params, "line_items[0][price]"), Some("price_founder"));
        assert_eq!(value(&params, "metadata[user_id]"), Some("host-1"));
        assert_eq!(
            value(&params, "metadata[space_id]"),
            Some(req.space_id.to_string().as_str())
        );
        assert_eq!(value(&params, "metadata[plan_type]"), Some("founder"));
        assert_eq!(
            value(&params, "subscription_data[metadata][plan_type]"),
            Some("founder")
        );
        assert_eq!(value(&params, "customer"), Some("cus_1"));
        assert_eq!(value(&params, "discounts[0][coupon]"), Some("LAUNCH"));
    }

    #[test]
    fn one_time_checkout_form_has_no_subscription_data() {
        let params = checkout_form(&request(CheckoutMode::OneTime));

        assert_eq!(value(&params, "mode"), Some("payment"));
        assert!(params
            .iter()
            .all(|(k, _)| !k.starts_with("subscription_data")));
    }

    #[test]
    fn stripe_error_body_is_mapped() {
        let body = r#"{"error":{"type":"invalid_request_error","code":"resource_missing","message":"No such price"}}"#;

        let err = map_stripe_error(StatusCode::BAD_REQUEST, body);

        assert_eq!(err.code, PaymentErrorCode::InvalidRequest);
        assert_eq!(err.message, "No such price");
        assert_eq!(err.provider_code.as_deref(), Some("resource_missing"));
        assert!(!err.retryable);
    }

    #[test]
    fn status_codes_map_to_error_codes() {
        assert_eq!(
            map_stripe_error(StatusCode::UNAUTHORIZED, "").code,
            PaymentErrorCode::AuthenticationError
        );
        assert_eq!(
            map_stripe_error(StatusCode::NOT_FOUND, "").code,
            PaymentErrorCode::NotFound
        );
        assert_eq!(
            map_stripe_error(StatusCode::TOO_MANY_REQUESTS, "").code,
            PaymentErrorCode::RateLimitExceeded
        );
        let server = map_stripe_error(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(server.code, PaymentErrorCode::ProviderError);
        assert!(server.retryable);
    }
}
