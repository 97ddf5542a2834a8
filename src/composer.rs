//! Order composer and confirmation.
//!
//! An [`OrderDraft`] collects what the customer typed and picked. Validation
//! turns it into an [`OrderRequest`] (priced, geofenced, dated), which is
//! summarised for confirmation and then submitted.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::info;

use crate::api::BackendClient;
use crate::config::Pricing;
use crate::data_helpers::{non_blank, parse_date, require_mobile};
use crate::error::{AppResult, ValidationError};
use crate::geo::{Coordinate, DeliveryCenter, ResolvedLocation};
use crate::orders::BookingType;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub booking_type: BookingType,
    pub name: String,
    pub mobile: String,
    pub normal_qty: u32,
    pub cool_qty: u32,
    pub address: String,
    pub location: Option<Coordinate>,
    /// `YYYY-MM-DD`, advance bookings only.
    pub delivery_date: Option<String>,
}

impl OrderDraft {
    pub fn new(booking_type: BookingType, name: &str, mobile: &str) -> Self {
        Self {
            booking_type,
            name: name.to_string(),
            mobile: mobile.to_string(),
            normal_qty: 0,
            cool_qty: 0,
            address: String::new(),
            location: None,
            delivery_date: None,
        }
    }

    /// Typing an address on an advance booking detaches it from the map pin.
    pub fn set_typed_address(&mut self, address: &str) {
        self.address = address.to_string();
        if self.booking_type == BookingType::Advance {
            self.location = None;
        }
    }

    /// A map selection replaces the address with the resolved one.
    pub fn apply_location(&mut self, resolved: &ResolvedLocation) {
        self.location = Some(resolved.coordinate());
        self.address = resolved.address.clone();
    }

    pub fn total_qty(&self) -> u64 {
        u64::from(self.normal_qty) + u64::from(self.cool_qty)
    }
}

/// Body of the create-order call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub name: String,
    pub mobile_number: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub normal_qty: u32,
    pub cool_qty: u32,
    pub total_amount: u64,
    pub booking_type: BookingType,
    pub booking_date: String,
}

pub struct OrderComposer {
    pricing: Pricing,
    center: DeliveryCenter,
}

impl OrderComposer {
    pub fn new(pricing: Pricing, center: DeliveryCenter) -> Self {
        Self { pricing, center }
    }

    pub fn price(&self, draft: &OrderDraft) -> u64 {
        self.pricing.total(draft.normal_qty, draft.cool_qty)
    }

    /// Validate `draft` against `today` and build the request.
    pub fn validate(&self, draft: &OrderDraft, today: NaiveDate) -> AppResult<OrderRequest> {
        let name = non_blank(&draft.name).ok_or(ValidationError::MissingName)?;
        let mobile = require_mobile(&draft.mobile)?;

        let booking_date = match draft.booking_type {
            BookingType::Daily => today,
            BookingType::Advance => {
                let raw = draft
                    .delivery_date
                    .as_deref()
                    .and_then(non_blank)
                    .ok_or(ValidationError::MissingDeliveryDate)?;
                let date = parse_date(&raw).ok_or(ValidationError::InvalidDeliveryDate(raw))?;
                let earliest = today.succ_opt().unwrap_or(today);
                if date < earliest {
                    return Err(ValidationError::DeliveryDateTooEarly { earliest }.into());
                }
                date
            }
        };

        if draft.total_qty() == 0 {
            return Err(ValidationError::NoQuantity.into());
        }
        let address = non_blank(&draft.address).ok_or(ValidationError::MissingAddress)?;

        match (draft.booking_type, draft.location) {
            (BookingType::Daily, None) => return Err(ValidationError::MissingLocation.into()),
            (_, Some(point)) => {
                self.center.check(point)?;
            }
            (BookingType::Advance, None) => {}
        }

        Ok(OrderRequest {
            name,
            mobile_number: mobile,
            address,
            latitude: draft.location.map(|c| c.lat),
            longitude: draft.location.map(|c| c.lng),
            normal_qty: draft.normal_qty,
            cool_qty: draft.cool_qty,
            total_amount: self.price(draft),
            booking_type: draft.booking_type,
            booking_date: booking_date.format("%Y-%m-%d").to_string(),
        })
    }
}

/// What the customer sees before confirming.
pub struct Confirmation<'a>(pub &'a OrderRequest);

impl fmt::Display for Confirmation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let req = self.0;
        match req.booking_type {
            BookingType::Daily => writeln!(f, "Booking:        Daily delivery")?,
            BookingType::Advance => {
                writeln!(f, "Booking:        Advance")?;
                writeln!(f, "Delivery date:  {}", req.booking_date)?;
            }
        }
        writeln!(f, "Name:           {}", req.name)?;
        writeln!(f, "Mobile:         {}", req.mobile_number)?;
        writeln!(f, "Address:        {}", req.address)?;
        if req.normal_qty > 0 {
            writeln!(f, "Normal water:   {}", req.normal_qty)?;
        }
        if req.cool_qty > 0 {
            writeln!(f, "Cool water:     {}", req.cool_qty)?;
        }
        write!(f, "Total:          ₹{}", req.total_amount)
    }
}

pub trait OrderSink: Send + Sync {
    fn create_order(
        &self,
        token: &str,
        order: &OrderRequest,
    ) -> impl Future<Output = AppResult<()>> + Send;
}

impl OrderSink for BackendClient {
    async fn create_order(&self, token: &str, order: &OrderRequest) -> AppResult<()> {
        BackendClient::create_order(self, token, order).await
    }
}

/// Submit a confirmed order and return the success notice.
pub async fn submit<S: OrderSink>(
    sink: &S,
    token: &str,
    order: &OrderRequest,
) -> AppResult<&'static str> {
    sink.create_order(token, order).await?;
    info!(
        booking_type = %order.booking_type,
        total = order.total_amount,
        "Order submitted"
    );
    Ok(match order.booking_type {
        BookingType::Daily => "Order placed successfully",
        BookingType::Advance => "Advance order scheduled successfully",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::geo::tests::{center, north_of_plant, PLANT};
    use std::sync::Mutex;

    fn composer() -> OrderComposer {
        OrderComposer::new(Pricing::default(), center(5.0))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn daily_draft() -> OrderDraft {
        let mut d = OrderDraft::new(BookingType::Daily, "Ravi", "9876543210");
        d.normal_qty = 2;
        d.cool_qty = 1;
        d.address = "Main Road, Peruru".into();
        d.location = Some(PLANT);
        d
    }

    fn validation_err(result: AppResult<OrderRequest>) -> ValidationError {
        match result {
            Err(AppError::Validation(v)) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn two_normal_one_cool_costs_eighty() {
        let req = composer().validate(&daily_draft(), today()).unwrap();
        assert_eq!(req.total_amount, 80);
        assert_eq!(req.booking_date, "2026-10-14");
        assert_eq!(req.latitude, Some(PLANT.lat));
    }

    #[test]
    fn huge_quantities_do_not_wrap_to_zero() {
        let mut d = daily_draft();
        d.normal_qty = u32::MAX;
        d.cool_qty = 1;
        assert_eq!(d.total_qty(), u64::from(u32::MAX) + 1);
        let req = composer().validate(&d, today()).unwrap();
        assert_eq!(req.total_amount, u64::from(u32::MAX) * 20 + 40);
    }

    #[test]
    fn location_ten_km_away_is_rejected() {
        let mut d = daily_draft();
        d.location = Some(north_of_plant(10.0));
        let err = composer().validate(&d, today()).unwrap_err();
        assert!(matches!(err, AppError::OutOfRange { .. }));
        assert!(err.to_string().contains("10.00 km away"));
    }

    #[test]
    fn validation_runs_in_field_order() {
        let mut d = daily_draft();
        d.name = " ".into();
        d.mobile = "123".into();
        d.normal_qty = 0;
        d.cool_qty = 0;
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::MissingName
        );
        d.name = "Ravi".into();
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::InvalidMobile
        );
        d.mobile = "9876543210".into();
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::NoQuantity
        );
        d.cool_qty = 1;
        d.address = String::new();
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::MissingAddress
        );
        d.address = "Peruru".into();
        d.location = None;
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::MissingLocation
        );
    }

    #[test]
    fn advance_needs_a_date_from_tomorrow() {
        let mut d = daily_draft();
        d.booking_type = BookingType::Advance;
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::MissingDeliveryDate
        );
        d.delivery_date = Some("2026-10-14".into());
        assert_eq!(
            validation_err(composer().validate(&d, today())),
            ValidationError::DeliveryDateTooEarly {
                earliest: NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
            }
        );
        d.delivery_date = Some("15-10-2026".into());
        assert!(matches!(
            validation_err(composer().validate(&d, today())),
            ValidationError::InvalidDeliveryDate(_)
        ));
        d.delivery_date = Some("2026-10-15".into());
        let req = composer().validate(&d, today()).unwrap();
        assert_eq!(req.booking_date, "2026-10-15");
    }

    #[test]
    fn advance_accepts_typed_address_without_pin() {
        let mut d = daily_draft();
        d.booking_type = BookingType::Advance;
        d.delivery_date = Some("2026-10-20".into());
        d.set_typed_address("Door 4, Temple Street");
        assert_eq!(d.location, None);
        let req = composer().validate(&d, today()).unwrap();
        assert_eq!(req.latitude, None);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["bookingType"], "advance");
        assert_eq!(body["mobileNumber"], "9876543210");
        assert_eq!(body["totalAmount"], 80);
    }

    #[test]
    fn map_selection_overwrites_address() {
        let mut d = daily_draft();
        d.apply_location(&ResolvedLocation {
            lat: 16.54,
            lng: 81.97,
            address: "Plant Road".into(),
            distance_km: 1.0,
        });
        assert_eq!(d.address, "Plant Road");
        assert_eq!(d.location, Some(Coordinate { lat: 16.54, lng: 81.97 }));
        // Daily bookings keep the pin when the address is edited.
        d.set_typed_address("Plant Road, gate 2");
        assert!(d.location.is_some());
    }

    #[test]
    fn confirmation_lists_only_chosen_products() {
        let mut d = daily_draft();
        d.cool_qty = 0;
        let req = composer().validate(&d, today()).unwrap();
        let text = Confirmation(&req).to_string();
        assert!(text.contains("Normal water:   2"));
        assert!(!text.contains("Cool water"));
        assert!(text.ends_with("₹40"));
    }

    struct RecordingSink {
        sent: Mutex<Vec<(String, OrderRequest)>>,
    }

    impl OrderSink for RecordingSink {
        async fn create_order(&self, token: &str, order: &OrderRequest) -> AppResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((token.to_string(), order.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn submit_reports_success_by_booking_type() {
        let sink = RecordingSink {
            sent: Mutex::new(Vec::new()),
        };
        let req = composer().validate(&daily_draft(), today()).unwrap();
        assert_eq!(
            submit(&sink, "tok", &req).await.unwrap(),
            "Order placed successfully"
        );
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].0, "tok");
        assert_eq!(sent[0].1.total_amount, 80);
    }
}
