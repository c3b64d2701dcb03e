//! Stripe checkout session creation

use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::info;

use crate::config::Config;

/// Fixed price of one interest signal, in cents
pub const SIGNAL_PRICE_CENTS: u32 = 500;
pub const SIGNAL_CURRENCY: &str = "usd";

/// Stripe service for payment operations
#[derive(Clone)]
pub struct StripeService {
    client: Client,
    checkout_sessions_url: Url,
    stripe_secret_key: String,
    public_base_url: String,
}

impl StripeService {
    pub fn new(config: &Config) -> Self {
        let mut checkout_sessions_url = config.stripe_api_url.clone();
        if let Ok(mut path) = checkout_sessions_url.path_segments_mut() {
            path.pop_if_empty().extend(["v1", "checkout", "sessions"]);
        }

        Self {
            client: Client::new(),
            checkout_sessions_url,
            stripe_secret_key: config.stripe_secret_key.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }

    /// Form fields for a single fixed-price signal on a project
    fn checkout_form(&self, project_id: &str, project_name: &str) -> Vec<(&'static str, String)> {
        let success_url = format!(
            "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.public_base_url
        );
        let cancel_url = format!("{}/cancel", self.public_base_url);

        vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("line_items[0][price_data][currency]", SIGNAL_CURRENCY.to_string()),
            ("line_items[0][price_data][unit_amount]", SIGNAL_PRICE_CENTS.to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Interest Signal: {}", project_name),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            // The webhook reads this back to know which project to credit
            ("metadata[projectId]", project_id.to_string()),
        ]
    }

    /// Create a hosted checkout session for signalling interest in a project
    pub async fn create_checkout_session(
        &self,
        project_id: &str,
        project_name: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .post(self.checkout_sessions_url.clone())
            .basic_auth(&self.stripe_secret_key, None::<&str>)
            .form(&self.checkout_form(project_id, project_name))
            .send()
            .await
            .map_err(StripeError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let session: CheckoutSession = response.json().await.map_err(StripeError::Request)?;
        if session.id.is_empty() {
            return Err(StripeError::MissingSessionId);
        }

        info!(project_id = %project_id, session_id = %session.id, "Checkout session created");
        Ok(session)
    }
}

/// Stripe checkout session response
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Pull `error.message` out of a Stripe error body, falling back to the raw body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.to_string())
}

/// Stripe-related errors
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    #[error("No session id returned")]
    MissingSessionId,
}
