//! Order model as exchanged with the backend.
//!
//! The backend speaks camelCase JSON and is not consistent about a few
//! fields: `status` is a string on the admin listing but a numeric code on
//! the per-mobile history, and coordinates/amounts may arrive as strings.
//! Decoding normalises all of that here so the rest of the crate only sees
//! typed values.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Lifecycle of an order. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Numeric code used by the status update endpoint and the history API.
    pub fn code(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Completed => 1,
            OrderStatus::Cancelled => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OrderStatus::Pending),
            1 => Some(OrderStatus::Completed),
            2 => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Parse a user- or backend-supplied label, case-insensitively.
    /// Accepts the numeric codes as well ("0", "1", "2").
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return Self::from_code(code);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "completed" | "complete" => Some(OrderStatus::Completed),
            "cancelled" | "canceled" | "cancel" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let parsed = match &raw {
            serde_json::Value::Number(n) => n.as_i64().and_then(OrderStatus::from_code),
            serde_json::Value::String(s) => OrderStatus::parse(s),
            _ => None,
        };
        parsed.ok_or_else(|| serde::de::Error::custom(format!("unknown order status: {raw}")))
    }
}

/// Same-day delivery or a scheduled future date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    Daily,
    Advance,
}

impl BookingType {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingType::Daily => "daily",
            BookingType::Advance => "advance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(BookingType::Daily),
            "advance" => Some(BookingType::Advance),
            _ => None,
        }
    }
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BookingType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        // Older orders carry no booking type or free-form text; treat as daily.
        Ok(raw
            .as_deref()
            .and_then(BookingType::parse)
            .unwrap_or(BookingType::Daily))
    }
}

fn default_booking_type() -> BookingType {
    BookingType::Daily
}

/// An order as returned by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "orderId", alias = "order_id")]
    pub id: i64,
    #[serde(default, alias = "customerName")]
    pub name: String,
    #[serde(default, alias = "mobile", alias = "mobile_number")]
    pub mobile_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, alias = "normal_qty")]
    pub normal_qty: u32,
    #[serde(default, alias = "cool_qty")]
    pub cool_qty: u32,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: f64,
    #[serde(default = "default_booking_type")]
    pub booking_type: BookingType,
    #[serde(default)]
    pub booking_date: Option<String>,
    pub status: OrderStatus,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
}

impl Order {
    /// Creation timestamp in local time, if the backend sent a parseable one.
    pub fn created_local(&self) -> Option<DateTime<Local>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    pub fn created_date(&self) -> Option<NaiveDate> {
        self.created_local().map(|dt| dt.date_naive())
    }

    pub fn total_qty(&self) -> u64 {
        u64::from(self.normal_qty) + u64::from(self.cool_qty)
    }
}

/// Parse the timestamp shapes the backend emits: RFC 3339, naive
/// `YYYY-MM-DDTHH:MM:SS[.f]` (local time) or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| json_number(&v)))
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    lenient_f64(deserializer).map(|v| v.unwrap_or(0.0))
}

/// Read a JSON number or a numeric string.
pub(crate) fn json_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

#[cfg(test)]
pub(crate) fn sample_order(id: i64, status: OrderStatus, created_at: &str) -> Order {
    Order {
        id,
        name: format!("Customer {id}"),
        mobile_number: format!("98765{:05}", id),
        address: "Main Road, Peruru".into(),
        latitude: Some(16.53),
        longitude: Some(81.97),
        normal_qty: 2,
        cool_qty: 1,
        total_amount: 80.0,
        booking_type: BookingType::Daily,
        booking_date: None,
        status,
        created_at: Some(created_at.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn decodes_admin_listing_shape() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": 12,
            "name": "Ravi",
            "mobileNumber": "9876543210",
            "address": "Peruru",
            "latitude": 16.53,
            "longitude": "81.97",
            "normalQty": 2,
            "coolQty": 1,
            "totalAmount": 80.0,
            "bookingType": "Advance",
            "bookingDate": "2026-10-15",
            "status": "Pending",
            "createdAt": "2026-10-14T09:30:00"
        }))
        .expect("listing order should decode");
        assert_eq!(order.id, 12);
        assert_eq!(order.longitude, Some(81.97));
        assert_eq!(order.booking_type, BookingType::Advance);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_qty(), 3);

        let mut bulk = order.clone();
        bulk.normal_qty = u32::MAX;
        bulk.cool_qty = u32::MAX;
        assert_eq!(bulk.total_qty(), 2 * u64::from(u32::MAX));
    }

    #[test]
    fn decodes_numeric_status_from_history_endpoint() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": 3,
            "status": 2,
            "totalAmount": "40"
        }))
        .expect("history order should decode");
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.total_amount, 40.0);
        assert_eq!(order.booking_type, BookingType::Daily);
        assert_eq!(order.latitude, None);
    }

    #[test]
    fn rejects_unknown_status() {
        let err = serde_json::from_value::<Order>(serde_json::json!({
            "id": 3,
            "status": "lost"
        }))
        .expect_err("unknown status should fail");
        assert!(err.to_string().contains("unknown order status"));
    }

    #[test]
    fn status_parse_is_case_insensitive_and_accepts_codes() {
        assert_eq!(OrderStatus::parse("completed"), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::parse(" CANCELLED "), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse("0"), Some(OrderStatus::Pending));
        assert_eq!(OrderStatus::parse("7"), None);
        assert!(OrderStatus::Completed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn parses_backend_timestamp_shapes() {
        let naive = parse_timestamp("2026-03-01T08:15:00.123").expect("naive timestamp");
        assert_eq!(naive.day(), 1);
        assert!(parse_timestamp("2026-03-01T08:15:00Z").is_some());
        let date_only = parse_timestamp("2026-03-01").expect("date only");
        assert_eq!(date_only.month(), 3);
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
