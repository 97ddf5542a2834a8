//! Signed-in session and route guard.
//!
//! The session is persisted in `local_settings` (category `session`) so
//! consecutive CLI invocations share it. It is typed and carries an expiry.
//! The guard mirrors the navigation rules: no session means back to login,
//! a session of the wrong role also goes back to login.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::api::LoginResponse;
use crate::db::{self, DbState};
use crate::error::{AppError, AppResult};

const CATEGORY: &str = "session";
const KEY_TOKEN: &str = "token";
const KEY_ROLE: &str = "role";
const KEY_USER_NAME: &str = "user_name";
const KEY_MOBILE: &str = "mobile";
const KEY_ADDRESS: &str = "address";
const KEY_ACTIVE_STATUS: &str = "active_status";
const KEY_ISSUED_AT: &str = "issued_at";
const KEY_EXPIRES_AT: &str = "expires_at";
const KEY_AUDIT_ID: &str = "audit_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" | "customer" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct Session {
    /// Bearer token. Wiped from memory when the session is dropped.
    pub token: Zeroizing<String>,
    pub role: Role,
    pub user_name: String,
    pub mobile: String,
    pub address: String,
    pub active_status: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("user_name", &self.user_name)
            .field("mobile", &self.mobile)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn bearer(&self) -> &str {
        self.token.as_str()
    }

    /// Summary safe to print (no token).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role,
            "userName": self.user_name,
            "mobile": self.mobile,
            "address": self.address,
            "activeStatus": self.active_status,
            "issuedAt": self.issued_at.to_rfc3339(),
            "expiresAt": self.expires_at.to_rfc3339(),
            "landing": landing_route(self.role).path(),
        })
    }
}

/// Build a session from an accepted login. Unknown roles are refused.
pub fn from_login(login: &LoginResponse, now: DateTime<Utc>, ttl_hours: i64) -> AppResult<Session> {
    let role = Role::parse(&login.role).ok_or_else(|| {
        AppError::Decode(format!("login response carried unknown role {:?}", login.role))
    })?;
    let expires_at = Duration::try_hours(ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            AppError::Config(format!("session lifetime of {ttl_hours}h is out of range"))
        })?;
    Ok(Session {
        token: Zeroizing::new(login.token.clone()),
        role,
        user_name: login.user_name.clone(),
        mobile: login.mobile.clone(),
        address: login.address.clone().unwrap_or_default(),
        active_status: login.active_status_text(),
        issued_at: now,
        expires_at,
    })
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Store `session`, replacing any previous one. All keys and the audit row
/// are written in one transaction.
pub fn save(conn: &Connection, session: &Session) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;
    db::set_setting(&tx, CATEGORY, KEY_TOKEN, session.bearer())?;
    db::set_setting(&tx, CATEGORY, KEY_ROLE, session.role.as_str())?;
    db::set_setting(&tx, CATEGORY, KEY_USER_NAME, &session.user_name)?;
    db::set_setting(&tx, CATEGORY, KEY_MOBILE, &session.mobile)?;
    db::set_setting(&tx, CATEGORY, KEY_ADDRESS, &session.address)?;
    db::set_setting(&tx, CATEGORY, KEY_ACTIVE_STATUS, &session.active_status)?;
    db::set_setting(&tx, CATEGORY, KEY_ISSUED_AT, &session.issued_at.to_rfc3339())?;
    db::set_setting(&tx, CATEGORY, KEY_EXPIRES_AT, &session.expires_at.to_rfc3339())?;

    let audit_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO session_audit (id, mobile, role, login_time) VALUES (?1, ?2, ?3, ?4)",
        params![
            audit_id,
            session.mobile,
            session.role.as_str(),
            session.issued_at.to_rfc3339()
        ],
    )?;
    db::set_setting(&tx, CATEGORY, KEY_AUDIT_ID, &audit_id)?;

    tx.commit()?;

    info!(role = %session.role, mobile = %session.mobile, "Session stored");
    Ok(())
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Load the stored session. Incomplete or unreadable entries count as no
/// session.
pub fn load(conn: &Connection) -> Option<Session> {
    let get = |key: &str| db::get_setting(conn, CATEGORY, key);

    let token = get(KEY_TOKEN).filter(|t| !t.trim().is_empty())?;
    let role = match get(KEY_ROLE).as_deref().and_then(Role::parse) {
        Some(role) => role,
        None => {
            warn!("Stored session has an unknown role, ignoring it");
            return None;
        }
    };
    let issued_at = parse_time(get(KEY_ISSUED_AT))?;
    let expires_at = parse_time(get(KEY_EXPIRES_AT))?;

    Some(Session {
        token: Zeroizing::new(token),
        role,
        user_name: get(KEY_USER_NAME).unwrap_or_default(),
        mobile: get(KEY_MOBILE).unwrap_or_default(),
        address: get(KEY_ADDRESS).unwrap_or_default(),
        active_status: get(KEY_ACTIVE_STATUS).unwrap_or_default(),
        issued_at,
        expires_at,
    })
}

/// Remove the stored session and close its audit row.
pub fn clear(conn: &Connection) -> AppResult<()> {
    if let Some(audit_id) = db::get_setting(conn, CATEGORY, KEY_AUDIT_ID) {
        conn.execute(
            "UPDATE session_audit SET logout_time = ?1 WHERE id = ?2 AND logout_time IS NULL",
            params![Utc::now().to_rfc3339(), audit_id],
        )?;
    }
    db::delete_all_settings(conn, CATEGORY)?;
    info!("Session cleared");
    Ok(())
}

/// The live session, or why there is none. Expired sessions are cleared.
pub fn current(db: &DbState, now: DateTime<Utc>) -> AppResult<Session> {
    db.with_conn(|conn| match load(conn) {
        None => Err(AppError::NotSignedIn),
        Some(session) if session.is_expired(now) => {
            warn!(expired_at = %session.expires_at, "Session expired");
            clear(conn)?;
            Err(AppError::SessionExpired)
        }
        Some(session) => Ok(session),
    })
}

// ---------------------------------------------------------------------------
// Route guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Home,
    OrderHistory,
    Track,
    AdminDashboard,
    AdminOrders,
    AdminPerformance,
    AdminUserManagement,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Home => "/home",
            Route::OrderHistory => "/userorderhistory",
            Route::Track => "/track",
            Route::AdminDashboard => "/admin/dashboard",
            Route::AdminOrders => "/admin/orders",
            Route::AdminPerformance => "/admin/performance",
            Route::AdminUserManagement => "/admin/user-management",
        }
    }

    /// Roles allowed on this route; empty for public routes.
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Route::Login | Route::Register => &[],
            Route::Home | Route::OrderHistory => &[Role::User],
            Route::Track
            | Route::AdminDashboard
            | Route::AdminOrders
            | Route::AdminPerformance
            | Route::AdminUserManagement => &[Role::Admin],
        }
    }
}

pub fn landing_route(role: Role) -> Route {
    match role {
        Role::Admin => Route::AdminDashboard,
        Role::User => Route::Home,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Route),
}

pub fn guard(route: Route, session: Option<&Session>, now: DateTime<Utc>) -> GuardDecision {
    let allowed = route.allowed_roles();
    if allowed.is_empty() {
        return GuardDecision::Allow;
    }
    match session {
        Some(s) if !s.is_expired(now) && allowed.contains(&s.role) => GuardDecision::Allow,
        _ => GuardDecision::Redirect(Route::Login),
    }
}

/// Resolve the session for `route`, or fail with the reason it is refused.
pub fn require(db: &DbState, route: Route, now: DateTime<Utc>) -> AppResult<Session> {
    let session = current(db, now)?;
    match guard(route, Some(&session), now) {
        GuardDecision::Allow => Ok(session),
        GuardDecision::Redirect(_) => Err(AppError::Forbidden {
            required: route
                .allowed_roles()
                .first()
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_session(role: Role, now: DateTime<Utc>) -> Session {
        Session {
            token: Zeroizing::new("tok-123".into()),
            role,
            user_name: "Suribabu".into(),
            mobile: "9951062449".into(),
            address: "Peruru".into(),
            active_status: "Active".into(),
            issued_at: now,
            expires_at: now + Duration::hours(24),
        }
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("driver"), None);
    }

    #[test]
    fn save_load_clear_roundtrip_closes_audit_row() {
        let db = DbState::in_memory().unwrap();
        let now = Utc::now();
        db.with_conn(|conn| {
            save(conn, &test_session(Role::Admin, now))?;
            let loaded = load(conn).expect("session loads");
            assert_eq!(loaded.bearer(), "tok-123");
            assert_eq!(loaded.role, Role::Admin);
            assert_eq!(loaded.user_name, "Suribabu");

            clear(conn)?;
            assert!(load(conn).is_none());
            let open_rows: i64 = conn.query_row(
                "SELECT COUNT(*) FROM session_audit WHERE logout_time IS NULL",
                [],
                |r| r.get(0),
            )?;
            assert_eq!(open_rows, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn failed_save_keeps_the_previous_session() {
        let db = DbState::in_memory().unwrap();
        let now = Utc::now();
        db.with_conn(|conn| {
            save(conn, &test_session(Role::User, now))?;
            conn.execute_batch("DROP TABLE session_audit")?;

            let mut replacement = test_session(Role::Admin, now);
            replacement.token = Zeroizing::new("tok-456".into());
            assert!(save(conn, &replacement).is_err());

            let loaded = load(conn).expect("previous session survives");
            assert_eq!(loaded.bearer(), "tok-123");
            assert_eq!(loaded.role, Role::User);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn current_reports_missing_and_expired_sessions() {
        let db = DbState::in_memory().unwrap();
        let now = Utc::now();
        assert!(matches!(current(&db, now), Err(AppError::NotSignedIn)));

        db.with_conn(|conn| save(conn, &test_session(Role::User, now)))
            .unwrap();
        assert!(current(&db, now).is_ok());

        let later = now + Duration::hours(25);
        assert!(matches!(current(&db, later), Err(AppError::SessionExpired)));
        // Expired session was cleared.
        assert!(matches!(current(&db, now), Err(AppError::NotSignedIn)));
    }

    #[test]
    fn guard_redirects_by_presence_and_role() {
        let now = Utc::now();
        let admin = test_session(Role::Admin, now);
        let user = test_session(Role::User, now);

        assert_eq!(guard(Route::Login, None, now), GuardDecision::Allow);
        assert_eq!(
            guard(Route::Home, None, now),
            GuardDecision::Redirect(Route::Login)
        );
        assert_eq!(guard(Route::Home, Some(&user), now), GuardDecision::Allow);
        assert_eq!(
            guard(Route::AdminOrders, Some(&user), now),
            GuardDecision::Redirect(Route::Login)
        );
        assert_eq!(guard(Route::Track, Some(&admin), now), GuardDecision::Allow);
        assert_eq!(
            guard(Route::Home, Some(&admin), now),
            GuardDecision::Redirect(Route::Login)
        );
        let expired_check = now + Duration::hours(48);
        assert_eq!(
            guard(Route::AdminDashboard, Some(&admin), expired_check),
            GuardDecision::Redirect(Route::Login)
        );
    }

    #[test]
    fn require_names_missing_role() {
        let db = DbState::in_memory().unwrap();
        let now = Utc::now();
        db.with_conn(|conn| save(conn, &test_session(Role::User, now)))
            .unwrap();
        let err = require(&db, Route::AdminDashboard, now).unwrap_err();
        assert_eq!(err.to_string(), "This action requires the admin role");
        assert!(require(&db, Route::OrderHistory, now).is_ok());
    }

    #[test]
    fn from_login_maps_role_and_expiry() {
        let login: LoginResponse = serde_json::from_value(serde_json::json!({
            "token": "abc",
            "userType": "ADMIN",
            "userName": "Suribabu",
            "mobile": "9951062449",
            "activeStatus": "Active"
        }))
        .unwrap();
        let now = Utc::now();
        let session = from_login(&login, now, 168).unwrap();
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.expires_at - session.issued_at, Duration::hours(168));
        assert_eq!(session.address, "");

        let odd: LoginResponse =
            serde_json::from_value(serde_json::json!({ "token": "abc", "role": "driver" }))
                .unwrap();
        assert!(matches!(from_login(&odd, now, 1), Err(AppError::Decode(_))));
        assert!(matches!(
            from_login(&login, now, i64::MAX),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn debug_output_redacts_token() {
        let s = test_session(Role::User, Utc::now());
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("tok-123"));
        assert!(dbg.contains("<redacted>"));
        assert_eq!(landing_route(Role::Admin).path(), "/admin/dashboard");
    }
}
