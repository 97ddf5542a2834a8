//! Error taxonomy shared by every module.
//!
//! Backend failures, local validation and geofence rejections all end up as
//! an [`AppError`]. Commands print the `Display` text as the user-facing
//! notification; nothing in the crate matches on message strings.

use thiserror::Error;

use crate::orders::OrderStatus;

pub type AppResult<T> = Result<T, AppError>;

/// Form-level validation failures for login, registration and orders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Name is required")]
    MissingName,
    #[error("Enter valid 10 digit mobile number")]
    InvalidMobile,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Address is required")]
    MissingRegistrationAddress,
    #[error("Please select delivery date")]
    MissingDeliveryDate,
    #[error("Delivery date must be on or after {earliest}")]
    DeliveryDateTooEarly { earliest: chrono::NaiveDate },
    #[error("Invalid delivery date: {0}")]
    InvalidDeliveryDate(String),
    #[error("Please choose quantity")]
    NoQuantity,
    #[error("Please provide delivery address")]
    MissingAddress,
    #[error("Please select a delivery location on the map")]
    MissingLocation,
    #[error("Invalid coordinate: lat {lat}, lng {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("Enter mobile number")]
    MissingLookupMobile,
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Delivery not available. Selected location is {distance_km:.2} km away (max {radius_km} km).")]
    OutOfRange { distance_km: f64, radius_km: f64 },

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("This action requires the {required} role")]
    Forbidden { required: String },

    /// The backend answered, but refused the request.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("{0}")]
    Network(String),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Invalid response from backend: {0}")]
    Decode(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Order #{id} is already {from} and cannot be changed")]
    InvalidTransition { id: i64, from: OrderStatus },

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl AppError {
    /// True for failures caused by the backend rejecting our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            AppError::Rejected {
                status: 401 | 403,
                ..
            } | AppError::NotSignedIn
                | AppError::SessionExpired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_includes_distance_and_radius() {
        let err = AppError::OutOfRange {
            distance_km: 10.04321,
            radius_km: 5.0,
        };
        assert_eq!(
            err.to_string(),
            "Delivery not available. Selected location is 10.04 km away (max 5 km)."
        );
    }

    #[test]
    fn validation_errors_surface_their_own_text() {
        let err: AppError = ValidationError::NoQuantity.into();
        assert_eq!(err.to_string(), "Please choose quantity");
    }

    #[test]
    fn coordinate_errors_compare_by_value() {
        let err = ValidationError::InvalidCoordinate { lat: 91.0, lng: 0.5 };
        assert_eq!(err.clone(), err);
        assert_ne!(err, ValidationError::InvalidCoordinate { lat: 91.0, lng: 0.6 });
        assert_eq!(err.to_string(), "Invalid coordinate: lat 91, lng 0.5");
    }

    #[test]
    fn auth_failures_are_detected_by_status() {
        let unauthorized = AppError::Rejected {
            status: 401,
            message: "Unauthorized".into(),
        };
        let server = AppError::Rejected {
            status: 500,
            message: "boom".into(),
        };
        assert!(unauthorized.is_auth_failure());
        assert!(!server.is_auth_failure());
        assert!(AppError::SessionExpired.is_auth_failure());
    }
}
