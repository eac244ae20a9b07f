//! Authenticated access to the service.
//!
//! A [`Session`] can only be obtained through [`login`], so every stage that
//! takes one is guaranteed to run after a successful handshake. The session is
//! a shared borrow of the transport; nothing mutates it once login returns,
//! which is what lets the device lookups run concurrently through it.

use std::ops::Deref;

use tracing::{debug, error, info};

use super::error::{Result, UpgradeError};
use super::remote::{BackboxApi, expect_ok};

pub struct Session<'a> {
    api: &'a dyn BackboxApi,
}

impl<'a> Deref for Session<'a> {
    type Target = dyn BackboxApi + 'a;

    fn deref(&self) -> &Self::Target {
        self.api
    }
}

/// Run the login handshake once. There is no retry.
pub async fn login<'a>(
    api: &'a dyn BackboxApi,
    username: &str,
    password: &str,
) -> Result<Session<'a>> {
    debug!(user = %username, "Initiating login sequence");

    match expect_ok(api.login(username, password).await) {
        Ok(_) => {
            info!("Authenticated to BackBox");
            Ok(Session { api })
        }
        Err(failure) => {
            error!(
                operation = "login",
                status = ?failure.status(),
                error = %failure,
                "Login failed"
            );
            Err(UpgradeError::Auth(failure))
        }
    }
}
