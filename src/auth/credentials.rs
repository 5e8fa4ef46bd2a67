//! OAuth2 credential triple and expiry arithmetic
//!
//! The [`Credentials`] struct is the unit of exchange between the
//! authorization flow, the refresh scheduler, and the credential store.
//! `expires_at` is an absolute epoch-second timestamp and is the single
//! authoritative source for refresh timing; it is never recomputed from
//! wall-clock deltas after a load.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Seconds before actual expiry at which a proactive refresh fires.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// An access/refresh token pair with an absolute expiry timestamp.
///
/// Credentials are only ever replaced whole; no field is updated in place.
///
/// # Examples
///
/// ```
/// use tidal_session::auth::credentials::Credentials;
///
/// let creds = Credentials::new("at", "rt", 2_000_000_000);
/// assert_eq!(creds.access_token, "at");
/// assert_eq!(creds.expires_at, 2_000_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived bearer token presented to the resource API.
    pub access_token: String,

    /// Long-lived token used to obtain a new access token without user
    /// interaction.
    pub refresh_token: String,

    /// Absolute expiry of the access token, in epoch seconds.
    pub expires_at: i64,
}

impl Credentials {
    /// Creates a credential triple.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Returns `true` when the access token is expired or inside the
    /// refresh buffer window relative to `now` (epoch seconds).
    ///
    /// # Examples
    ///
    /// ```
    /// use tidal_session::auth::credentials::{Credentials, REFRESH_BUFFER_SECS};
    ///
    /// let now = 1_000_000;
    /// let fresh = Credentials::new("at", "rt", now + REFRESH_BUFFER_SECS + 1);
    /// assert!(!fresh.is_expired_at(now));
    ///
    /// let stale = Credentials::new("at", "rt", now - 10);
    /// assert!(stale.is_expired_at(now));
    /// ```
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at - REFRESH_BUFFER_SECS
    }

    /// Returns `true` when the access token is expired or inside the
    /// refresh buffer window relative to the current wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Delay until the proactive refresh should fire, relative to `now`.
    ///
    /// Computed as `max(0, expires_at - now - buffer)`; a token already
    /// inside the buffer window yields a zero delay.
    pub fn refresh_delay_at(&self, now: i64) -> Duration {
        let secs = (self.expires_at - now - REFRESH_BUFFER_SECS).max(0);
        Duration::from_secs(secs as u64)
    }

    /// Delay until the proactive refresh should fire, relative to the
    /// current wall clock.
    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay_at(Utc::now().timestamp())
    }
}
