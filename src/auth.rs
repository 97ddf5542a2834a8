//! Login, registration and logout.
//!
//! Form validation runs locally before any request. A successful login is
//! stored as the persisted [`Session`]; the password never outlives the
//! call that uses it.

use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::info;
use zeroize::Zeroizing;

use crate::api::{BackendClient, LoginResponse};
use crate::data_helpers::{non_blank, require_mobile};
use crate::db::DbState;
use crate::error::{AppError, AppResult, ValidationError};
use crate::session::{self, landing_route, Route, Session};

const MIN_PASSWORD_LEN: usize = 6;

/// Account endpoints used by this module.
pub trait AccountApi: Send + Sync {
    fn login(
        &self,
        mobile: &str,
        password: &str,
    ) -> impl Future<Output = AppResult<LoginResponse>> + Send;

    fn register(&self, form: &Registration) -> impl Future<Output = AppResult<()>> + Send;
}

impl AccountApi for BackendClient {
    async fn login(&self, mobile: &str, password: &str) -> AppResult<LoginResponse> {
        BackendClient::login(self, mobile, password).await
    }

    async fn register(&self, form: &Registration) -> AppResult<()> {
        BackendClient::register(
            self,
            form.name.trim(),
            form.mobile.trim(),
            &form.password,
            &form.confirm_password,
            form.address.trim(),
        )
        .await
    }
}

pub struct Registration {
    pub name: String,
    pub mobile: String,
    pub password: Zeroizing<String>,
    pub confirm_password: Zeroizing<String>,
    pub address: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub session: Session,
    pub landing: Route,
    /// True when an existing session was reused and no request was made.
    pub resumed: bool,
}

pub fn validate_login(mobile: &str, password: &str) -> Result<String, ValidationError> {
    let mobile = require_mobile(mobile)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(mobile)
}

pub fn validate_registration(form: &Registration) -> Result<(), ValidationError> {
    if non_blank(&form.name).is_none() {
        return Err(ValidationError::MissingName);
    }
    require_mobile(&form.mobile)?;
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if *form.password != *form.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    if non_blank(&form.address).is_none() {
        return Err(ValidationError::MissingRegistrationAddress);
    }
    Ok(())
}

/// Sign in, or resume the stored session when one is still valid.
pub async fn login<A: AccountApi>(
    db: &DbState,
    api: &A,
    ttl_hours: i64,
    mobile: &str,
    password: Zeroizing<String>,
    now: DateTime<Utc>,
) -> AppResult<LoginOutcome> {
    match session::current(db, now) {
        Ok(existing) => {
            info!(role = %existing.role, "Already signed in, reusing session");
            return Ok(LoginOutcome {
                landing: landing_route(existing.role),
                session: existing,
                resumed: true,
            });
        }
        Err(AppError::NotSignedIn | AppError::SessionExpired) => {}
        Err(other) => return Err(other),
    }

    let mobile = validate_login(mobile, &password)?;
    let response = api.login(&mobile, &password).await?;
    drop(password);

    let session = session::from_login(&response, now, ttl_hours)?;
    db.with_conn(|conn| session::save(conn, &session))?;
    info!(role = %session.role, "Login successful");

    Ok(LoginOutcome {
        landing: landing_route(session.role),
        session,
        resumed: false,
    })
}

pub async fn register<A: AccountApi>(api: &A, form: Registration) -> AppResult<()> {
    validate_registration(&form)?;
    api.register(&form).await?;
    info!(mobile = %form.mobile.trim(), "Registration accepted");
    Ok(())
}

/// Clear the stored session. Returns false when nobody was signed in.
pub fn logout(db: &DbState) -> AppResult<bool> {
    db.with_conn(|conn| {
        let had_session = session::load(conn).is_some();
        session::clear(conn)?;
        Ok(had_session)
    })
}
