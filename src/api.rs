//! Backend API client.
//!
//! Provides authenticated HTTP communication with the PureDrop backend:
//! login/registration, order creation and listing, status updates, user
//! activation and the geocoding proxy. The backend signals success through a
//! free-text `message` field; it is mapped to [`BackendOutcome`] here and
//! nowhere else.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::composer::OrderRequest;
use crate::config::{AppConfig, Endpoints};
use crate::data_helpers::normalize_phone;
use crate::error::{AppError, AppResult};
use crate::geo::{Coordinate, Geocoder, SearchHit};
use crate::orders::{json_number, Order, OrderStatus};

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - ensure exactly one trailing slash, so endpoint paths can be appended
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    url.push('/');
    url
}

/// Build the reqwest client shared by the backend and routing calls.
pub fn http_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("puredrop/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly error.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> AppError {
    if err.is_timeout() {
        return AppError::Timeout(url.to_string());
    }
    if err.is_connect() {
        return AppError::Network(format!("Cannot reach server at {url}"));
    }
    if err.is_builder() {
        return AppError::Network(format!("Invalid server URL: {url}"));
    }
    AppError::Network(format!("Network error communicating with {url}: {err}"))
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        400 => "Request was rejected by the server".to_string(),
        401 => "Session is invalid or expired, please log in again".to_string(),
        403 => "You are not allowed to do this".to_string(),
        404 => "Server endpoint not found".to_string(),
        s if s >= 500 => format!("Server error (HTTP {s})"),
        s => format!("Unexpected response from server (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Outcome mapping
// ---------------------------------------------------------------------------

/// Structured form of the backend's `message` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOutcome {
    LoginSuccessful,
    RegistrationSuccessful,
    OrderPlaced,
    StatusUpdated,
    Other(String),
}

impl BackendOutcome {
    pub fn from_message(message: &str) -> Self {
        match message.trim().to_ascii_lowercase().as_str() {
            "login successful" => BackendOutcome::LoginSuccessful,
            "registration successful" => BackendOutcome::RegistrationSuccessful,
            "order placed" => BackendOutcome::OrderPlaced,
            "status updated successfully" => BackendOutcome::StatusUpdated,
            _ => BackendOutcome::Other(message.trim().to_string()),
        }
    }
}

fn body_message(json: &Value) -> Option<String> {
    json.get("message")
        .or_else(|| json.get("error"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decide success for a finished request.
///
/// Non-2xx is always a rejection. A 2xx carrying a `message` that is not
/// the expected outcome is a rejection too (the backend answers failed
/// logins with 200 and an explanatory message). A 2xx without a message is
/// accepted.
pub(crate) fn interpret_response(
    status: StatusCode,
    body_text: &str,
    expected: Option<BackendOutcome>,
) -> AppResult<Value> {
    let json = if body_text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<Value>(body_text) {
            Ok(v) => v,
            // Plain-text bodies are wrapped so the message checks below apply.
            Err(_) => serde_json::json!({ "message": body_text.trim() }),
        }
    };
    let message = body_message(&json);

    if !status.is_success() {
        return Err(AppError::Rejected {
            status: status.as_u16(),
            message: message.unwrap_or_else(|| status_error(status)),
        });
    }

    if let (Some(expected), Some(message)) = (expected, message) {
        if BackendOutcome::from_message(&message) != expected {
            return Err(AppError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
    }

    Ok(json)
}

/// Listing endpoints return a bare array; tolerate `{ "data": [...] }` too.
fn extract_list(json: Value) -> AppResult<Vec<Value>> {
    match json {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut obj) => match obj.remove("data").or_else(|| obj.remove("orders")) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(AppError::Decode("expected a list of orders".into())),
        },
        other => Err(AppError::Decode(format!("expected a list, got {other}"))),
    }
}

fn decode_orders(json: Value) -> AppResult<Vec<Order>> {
    let mut orders = Vec::new();
    for item in extract_list(json)? {
        match serde_json::from_value::<Order>(item.clone()) {
            Ok(order) => orders.push(order),
            Err(e) => warn!(error = %e, order = %item, "Skipping undecodable order"),
        }
    }
    Ok(orders)
}

// ---------------------------------------------------------------------------
// Request/response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default, alias = "userType")]
    pub role: String,
    #[serde(default, alias = "name")]
    pub user_name: String,
    #[serde(default, alias = "mobileNumber")]
    pub mobile: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub active_status: Option<Value>,
}

impl LoginResponse {
    pub fn active_status_text(&self) -> String {
        match &self.active_status {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(true)) => "Active".into(),
            Some(Value::Bool(false)) => "Block".into(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    mobile: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    name: &'a str,
    mobile: &'a str,
    password: &'a str,
    confirm_password: &'a str,
    address: &'a str,
}

/// Account state toggled from user management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActiveStatus {
    Active,
    Block,
}

impl std::fmt::Display for ActiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ActiveStatus::Active => "Active",
            ActiveStatus::Block => "Block",
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BackendClient {
    http: Client,
    base: String,
    endpoints: Endpoints,
}

impl BackendClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            http: http_client(config.request_timeout())?,
            base: normalize_base_url(&config.api_base_url),
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        req: RequestBuilder,
        url: &str,
        expected: Option<BackendOutcome>,
    ) -> AppResult<Value> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, url, "Backend request");
        let resp = req
            .header("X-Request-Id", request_id.to_string())
            .send()
            .await
            .map_err(|e| friendly_error(url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.map_err(|e| friendly_error(url, &e))?;
        debug!(%request_id, status = status.as_u16(), "Backend response");
        interpret_response(status, &body_text, expected)
    }

    pub async fn login(&self, mobile: &str, password: &str) -> AppResult<LoginResponse> {
        let url = self.url(&self.endpoints.login);
        let req = self.http.post(&url).json(&LoginBody { mobile, password });
        let json = self
            .send(req, &url, Some(BackendOutcome::LoginSuccessful))
            .await?;
        let parsed: LoginResponse =
            serde_json::from_value(json).map_err(|e| AppError::Decode(format!("login: {e}")))?;
        if parsed.token.trim().is_empty() {
            return Err(AppError::Decode("login response carried no token".into()));
        }
        info!(role = %parsed.role, "Login accepted by backend");
        Ok(parsed)
    }

    pub async fn register(
        &self,
        name: &str,
        mobile: &str,
        password: &str,
        confirm_password: &str,
        address: &str,
    ) -> AppResult<()> {
        let url = self.url(&self.endpoints.register);
        let req = self.http.post(&url).json(&RegisterBody {
            name,
            mobile,
            password,
            confirm_password,
            address,
        });
        self.send(req, &url, Some(BackendOutcome::RegistrationSuccessful))
            .await?;
        Ok(())
    }

    pub async fn create_order(&self, token: &str, order: &OrderRequest) -> AppResult<()> {
        let url = self.url(&self.endpoints.create_order);
        let req = self.http.post(&url).bearer_auth(token).json(order);
        self.send(req, &url, Some(BackendOutcome::OrderPlaced))
            .await?;
        Ok(())
    }

    pub async fn all_orders(&self, token: &str) -> AppResult<Vec<Order>> {
        let url = self.url(&self.endpoints.all_orders);
        let req = self.http.get(&url).bearer_auth(token);
        decode_orders(self.send(req, &url, None).await?)
    }

    /// Send the numeric status code (1 = Completed, 2 = Cancelled).
    pub async fn update_order_status(
        &self,
        token: &str,
        order_id: i64,
        status: OrderStatus,
    ) -> AppResult<()> {
        let url = self.url(&format!("{}{order_id}", self.endpoints.update_status));
        let req = self.http.put(&url).bearer_auth(token).json(&status.code());
        self.send(req, &url, Some(BackendOutcome::StatusUpdated))
            .await?;
        Ok(())
    }

    pub async fn orders_by_mobile(&self, token: &str, mobile: &str) -> AppResult<Vec<Order>> {
        let mobile = normalize_phone(mobile);
        let url = self.url(&format!("{}={mobile}", self.endpoints.orders_by_mobile));
        let req = self.http.get(&url).bearer_auth(token);
        decode_orders(self.send(req, &url, None).await?)
    }

    /// Returns the backend's confirmation message.
    pub async fn set_user_active(
        &self,
        token: &str,
        mobile: &str,
        status: ActiveStatus,
    ) -> AppResult<String> {
        let url = self.url(&format!("{}{mobile}", self.endpoints.user_active_status));
        let req = self.http.put(&url).bearer_auth(token).json(&status);
        let json = self.send(req, &url, None).await?;
        Ok(body_message(&json).unwrap_or_else(|| format!("User status set to {status}")))
    }

    /// Delivery coordinate stored for an order.
    pub async fn order_location(&self, order_id: i64) -> AppResult<Coordinate> {
        let url = self.url(&format!("{}{order_id}", self.endpoints.order_location));
        let req = self.http.get(&url);
        let json = self.send(req, &url, None).await?;
        let lat = json.get("lat").and_then(json_number);
        let lng = json
            .get("lng")
            .or_else(|| json.get("lon"))
            .and_then(json_number);
        match (lat, lng) {
            (Some(lat), Some(lng)) => Ok(Coordinate::new(lat, lng)?),
            _ => Err(AppError::Decode("Invalid location data".into())),
        }
    }
}

impl Geocoder for BackendClient {
    async fn reverse(&self, point: Coordinate, timeout: Duration) -> AppResult<String> {
        let url = self.url(&self.endpoints.reverse_geocode);
        let req = self
            .http
            .get(&url)
            .query(&[("lat", point.lat), ("lon", point.lng)])
            .header("Accept", "application/json")
            .timeout(timeout);
        let json = self.send(req, &url, None).await?;
        Ok(json
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn search(&self, query: &str) -> AppResult<Vec<SearchHit>> {
        let url = self.url(&self.endpoints.search_address);
        let req = self.http.get(&url).query(&[("query", query)]);
        let json = self.send(req, &url, None).await?;
        let mut hits = Vec::new();
        for item in extract_list(json).unwrap_or_default() {
            match serde_json::from_value::<SearchHit>(item) {
                Ok(hit) => hits.push(hit),
                Err(e) => debug!(error = %e, "Ignoring malformed search hit"),
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_base_url() {
        assert_eq!(normalize_base_url("api.puredrop.in/api"), "https://api.puredrop.in/api/");
        assert_eq!(normalize_base_url("localhost:5000/api//"), "http://localhost:5000/api/");
        assert_eq!(normalize_base_url(" https://x.in "), "https://x.in/");
    }

    #[test]
    fn url_joins_endpoint_paths() {
        let client = BackendClient::new(&AppConfig {
            api_base_url: "https://api.puredrop.in/api".into(),
            ..AppConfig::default()
        })
        .expect("client builds");
        assert_eq!(client.url("/User/login"), "https://api.puredrop.in/api/User/login");
        assert_eq!(client.url("Order/all"), "https://api.puredrop.in/api/Order/all");
    }

    #[test]
    fn outcome_mapping_is_case_insensitive() {
        assert_eq!(
            BackendOutcome::from_message("Login successful"),
            BackendOutcome::LoginSuccessful
        );
        assert_eq!(
            BackendOutcome::from_message(" order placed "),
            BackendOutcome::OrderPlaced
        );
        assert_eq!(
            BackendOutcome::from_message("Invalid credentials"),
            BackendOutcome::Other("Invalid credentials".into())
        );
    }

    #[test]
    fn success_with_expected_message_is_accepted() {
        let json = interpret_response(
            StatusCode::OK,
            r#"{"message":"Status updated successfully"}"#,
            Some(BackendOutcome::StatusUpdated),
        )
        .expect("expected outcome accepted");
        assert_eq!(json["message"], "Status updated successfully");
    }

    #[test]
    fn ok_status_with_unexpected_message_is_rejected() {
        let err = interpret_response(
            StatusCode::OK,
            r#"{"message":"Invalid credentials"}"#,
            Some(BackendOutcome::LoginSuccessful),
        )
        .expect_err("failed login must not pass");
        match err {
            AppError::Rejected { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "Invalid credentials");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn error_status_uses_body_message_or_fallback() {
        let err = interpret_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"Mobile already registered"}"#,
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Mobile already registered");

        let err = interpret_response(StatusCode::UNAUTHORIZED, "", None).unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(
            err.to_string(),
            "Session is invalid or expired, please log in again"
        );
    }

    #[test]
    fn plain_text_body_is_treated_as_message() {
        let err = interpret_response(
            StatusCode::OK,
            "Order failed",
            Some(BackendOutcome::OrderPlaced),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Order failed");
        assert_eq!(
            interpret_response(StatusCode::NO_CONTENT, "", Some(BackendOutcome::OrderPlaced))
                .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn decode_orders_skips_bad_items_and_accepts_wrapped_lists() {
        let orders = decode_orders(serde_json::json!({
            "data": [
                { "id": 1, "status": "Pending" },
                { "id": "oops" },
                { "id": 2, "status": 1 }
            ]
        }))
        .expect("wrapped list decodes");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].status, OrderStatus::Completed);
        assert!(decode_orders(serde_json::json!("nope")).is_err());
    }

    #[test]
    fn login_response_normalises_active_status() {
        let parsed: LoginResponse = serde_json::from_value(serde_json::json!({
            "message": "Login successful",
            "token": "abc",
            "role": "Admin",
            "userName": "Suribabu",
            "mobile": "9951062449",
            "address": "Peruru",
            "activeStatus": true
        }))
        .unwrap();
        assert_eq!(parsed.active_status_text(), "Active");
        assert_eq!(parsed.user_name, "Suribabu");
    }
}
