//! Mock payment provider for tests and local runs.
//!
//! Supports:
//! - Deterministic checkout session ids (`cs_mock_1`, `cs_mock_2`, ...)
//! - Error injection, one-shot or per method
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentProvider};

/// Mock payment provider.
///
/// Clones share state, so a test can keep a handle while the application
/// owns another.
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// mock.set_method_error("create_checkout_session", PaymentError::network("down"));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    session_counter: u64,

    /// Error to return on the next call to any method.
    next_error: Option<PaymentError>,

    /// Errors returned by every call to the named method.
    method_errors: HashMap<String, PaymentError>,

    checkout_requests: Vec<CreateCheckoutRequest>,
    cancelled_subscriptions: Vec<String>,
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Checkout requests that succeeded, in order.
    pub fn checkout_requests(&self) -> Vec<CreateCheckoutRequest> {
        self.state().checkout_requests.clone()
    }

    /// Provider subscriptions set to cancel at period end.
    pub fn cancelled_subscriptions(&self) -> Vec<String> {
        self.state().cancelled_subscriptions.clone()
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        let mut state = self.state();

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.record_call(
            "create_checkout_session",
            vec![
                request.user_id.to_string(),
                request.space_id.to_string(),
                request.plan.to_string(),
                request.mode.as_provider_str().to_string(),
            ],
        );
        self.check_error("create_checkout_session")?;

        let mut state = self.state();
        state.session_counter += 1;
        let id = format!("cs_mock_{}", state.session_counter);
        state.checkout_requests.push(request);

        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/c/pay/{}", id),
            id,
            expires_at: Some(chrono::Utc::now().timestamp() + 24 * 60 * 60),
        })
    }

    async fn cancel_at_period_end(
        &self,
        external_subscription_id: &str,
    ) -> Result<(), PaymentError> {
        self.record_call(
            "cancel_at_period_end",
            vec![external_subscription_id.to_string()],
        );
        self.check_error("cancel_at_period_end")?;

        self.state()
            .cancelled_subscriptions
            .push(external_subscription_id.to_string());
        Ok(())
    }
}
