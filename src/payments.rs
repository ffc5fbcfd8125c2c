use axum::{Json, Router, extract::State, response::Response, routing::post};
use axum::response::IntoResponse;
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::{error::AppError, state::AppState};

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Payment bridge configuration. Held in `AppState` as an `Option`; the
/// route is only mounted when a secret key is configured.
#[derive(Clone)]
pub struct PaymentConfig {
    pub secret_key: String,
    /// Fixed settlement currency, e.g. "usd".
    pub currency: String,
    /// Stripe API base URL, overridable for tests.
    pub api_base: String,
}

impl PaymentConfig {
    pub fn new(secret_key: String, currency: String) -> Self {
        Self {
            secret_key,
            currency,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }
}

pub fn router() -> Router<AppState> {
    // POST only; axum answers other methods with 405.
    Router::new().route("/api/create-payment-intent", post(create_payment_intent))
}

/// Validate a `{amount, metadata?}` request, create a payment intent with
/// the provider and hand the opaque client secret back to the caller.
async fn create_payment_intent(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let config = state
        .payments
        .as_ref()
        .ok_or_else(|| AppError::Internal("Payment bridge not configured".to_string()))?;

    let amount = parse_amount(&body).ok_or_else(|| {
        AppError::BadRequest("Invalid or missing amount provided.".to_string())
    })?;

    let mut form: Vec<(String, String)> = vec![
        ("amount".to_string(), to_minor_units(amount).to_string()),
        ("currency".to_string(), config.currency.clone()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
    ];
    for (key, value) in metadata_entries(&body) {
        form.push((format!("metadata[{key}]"), value));
    }
    // Added after the caller's metadata so it can never be overridden.
    form.push((
        "metadata[function_call]".to_string(),
        "create-payment-intent".to_string(),
    ));

    let response = reqwest::Client::new()
        .post(format!("{}/v1/payment_intents", config.api_base))
        .bearer_auth(&config.secret_key)
        .form(&form)
        .send()
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;

    if !status.is_success() {
        let message = payload
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("Failed to create Payment Intent on the server.")
            .to_string();
        return Err(AppError::Provider(message));
    }

    let client_secret = payload
        .get("client_secret")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::Provider("Provider response missing client secret".to_string())
        })?;

    Ok(Json(json!({ "clientSecret": client_secret })).into_response())
}

/// Extract the amount if it is a JSON number greater than zero.
fn parse_amount(body: &Value) -> Option<f64> {
    body.get("amount")
        .filter(|v| v.is_number())
        .and_then(Value::as_f64)
        .filter(|a| *a > 0.0)
}

/// Convert a major-unit amount to minor currency units, rounded.
fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Flatten the optional `metadata` object into string key/value pairs.
/// Non-string scalars are stringified; nested values are skipped, as is the
/// reserved `function_call` key.
fn metadata_entries(body: &Value) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let Some(map) = body.get("metadata").and_then(Value::as_object) else {
        return entries;
    };
    for (key, value) in map {
        if key == "function_call" {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        entries.insert(key.clone(), rendered);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_must_be_a_positive_number() {
        assert_eq!(parse_amount(&json!({ "amount": 25.0 })), Some(25.0));
        assert_eq!(parse_amount(&json!({ "amount": 1 })), Some(1.0));
        assert_eq!(parse_amount(&json!({ "amount": 0 })), None);
        assert_eq!(parse_amount(&json!({ "amount": -5 })), None);
        assert_eq!(parse_amount(&json!({ "amount": "25" })), None);
        assert_eq!(parse_amount(&json!({})), None);
    }

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(10.0), 1000);
        assert_eq!(to_minor_units(10.556), 1056);
        assert_eq!(to_minor_units(10.554), 1055);
        assert_eq!(to_minor_units(0.01), 1);
        assert_eq!(to_minor_units(19.999), 2000);
    }

    #[test]
    fn metadata_keeps_scalars_and_skips_nested() {
        let body = json!({
            "metadata": {
                "client": "web",
                "attempt": 2,
                "retry": false,
                "nested": { "x": 1 }
            }
        });
        let entries = metadata_entries(&body);
        assert_eq!(entries.get("client").map(String::as_str), Some("web"));
        assert_eq!(entries.get("attempt").map(String::as_str), Some("2"));
        assert_eq!(entries.get("retry").map(String::as_str), Some("false"));
        assert!(!entries.contains_key("nested"));
    }

    #[test]
    fn reserved_function_call_key_is_dropped_from_caller_metadata() {
        let body = json!({
            "metadata": { "function_call": "spoofed", "client": "web" }
        });
        let entries = metadata_entries(&body);
        assert!(!entries.contains_key("function_call"));
        assert_eq!(entries.get("client").map(String::as_str), Some("web"));
    }

    #[test]
    fn missing_metadata_is_empty() {
        assert!(metadata_entries(&json!({ "amount": 1 })).is_empty());
    }
}
