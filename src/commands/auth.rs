use chrono::Utc;
use zeroize::Zeroizing;

use super::{prompt, Output};
use crate::auth::{self, Registration};
use crate::error::AppResult;
use crate::session;
use crate::AppState;

async fn password_or_prompt(given: Option<String>, label: &str) -> AppResult<Zeroizing<String>> {
    match given {
        Some(p) => Ok(Zeroizing::new(p)),
        None => Ok(Zeroizing::new(prompt(label).await?)),
    }
}

pub async fn login(
    state: &AppState,
    out: &Output,
    mobile: &str,
    password: Option<String>,
) -> AppResult<()> {
    let now = Utc::now();
    // A live session wins before asking for anything.
    if let Ok(existing) = session::current(&state.db, now) {
        let landing = session::landing_route(existing.role);
        return out.show(&existing.to_json(), || {
            format!(
                "Already signed in as {} ({}). Continue at {}",
                existing.user_name,
                existing.role,
                landing.path()
            )
        });
    }

    let password = password_or_prompt(password, "Password: ").await?;
    let outcome = auth::login(
        &state.db,
        state.backend.as_ref(),
        state.config.session_ttl_hours,
        mobile,
        password,
        now,
    )
    .await?;

    out.show(&outcome.session.to_json(), || {
        format!(
            "Login successful. Welcome {} ({}). Continue at {}",
            outcome.session.user_name,
            outcome.session.role,
            outcome.landing.path()
        )
    })
}

pub async fn register(
    state: &AppState,
    out: &Output,
    name: String,
    mobile: String,
    address: String,
    password: Option<String>,
    confirm_password: Option<String>,
) -> AppResult<()> {
    let password = password_or_prompt(password, "Password: ").await?;
    let confirm_password = match confirm_password {
        Some(c) => Zeroizing::new(c),
        None => password.clone(),
    };
    auth::register(
        state.backend.as_ref(),
        Registration {
            name,
            mobile,
            password,
            confirm_password,
            address,
        },
    )
    .await?;
    out.notice("Registration successful. Please log in.");
    Ok(())
}

pub fn logout(state: &AppState, out: &Output) -> AppResult<()> {
    if auth::logout(&state.db)? {
        out.notice("Logged out");
    } else {
        out.notice("Not signed in");
    }
    Ok(())
}

pub fn whoami(state: &AppState, out: &Output) -> AppResult<()> {
    let current = session::current(&state.db, Utc::now())?;
    out.show(&current.to_json(), || {
        format!(
            "{} ({})\nMobile:  {}\nAddress: {}\nStatus:  {}\nExpires: {}",
            current.user_name,
            current.role,
            current.mobile,
            current.address,
            current.active_status,
            current.expires_at.format("%Y-%m-%d %H:%M UTC")
        )
    })
}
