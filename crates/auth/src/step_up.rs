//! Step-up (second-factor) flows: enrollment, verification, status, logout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::clock::Clock;
use crate::directory::{DirectoryError, PrincipalDirectory};
use crate::second_factor::{SecondFactorSessions, SecondFactorState, SessionStoreError, seconds_until};
use crate::totp::{ProvisioningDescriptor, TotpError, TotpManager};
use crate::{Caller, Principal};

#[derive(Debug, Error)]
pub enum StepUpError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("no enrollable profile for this principal")]
    ProfileNotFound,

    /// Deliberately silent about whether a secret exists.
    #[error("invalid code")]
    InvalidCode,

    #[error(transparent)]
    Totp(#[from] TotpError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Sessions(#[from] SessionStoreError),
}

impl StepUpError {
    pub fn http_status(&self) -> u16 {
        match self {
            StepUpError::Unauthenticated => 401,
            StepUpError::ProfileNotFound => 404,
            StepUpError::InvalidCode => 400,
            StepUpError::Totp(_) | StepUpError::Directory(_) | StepUpError::Sessions(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verified {
    pub expires_in_seconds: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecondFactorStatus {
    pub authenticated: bool,
    pub is_verified: bool,
    /// Verified earlier in this session, but the window has elapsed.
    pub expired: bool,
    pub remaining_seconds: i64,
}

impl SecondFactorStatus {
    fn anonymous() -> Self {
        Self {
            authenticated: false,
            is_verified: false,
            expired: false,
            remaining_seconds: 0,
        }
    }
}

pub struct StepUpService {
    directory: Arc<dyn PrincipalDirectory>,
    totp: TotpManager,
    sessions: Arc<SecondFactorSessions>,
    clock: Arc<dyn Clock>,
}

impl StepUpService {
    pub fn new(
        directory: Arc<dyn PrincipalDirectory>,
        totp: TotpManager,
        sessions: Arc<SecondFactorSessions>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            totp,
            sessions,
            clock,
        }
    }

    /// Issue a fresh TOTP secret for the caller and return the enrollment
    /// descriptor. Replaces any previously enrolled secret.
    #[instrument(skip_all)]
    pub fn issue_totp(&self, caller: Option<&Caller>) -> Result<ProvisioningDescriptor, StepUpError> {
        let caller = caller.ok_or(StepUpError::Unauthenticated)?;
        let mut principal = self.enrollable(caller)?;

        let descriptor = self.totp.issue_secret(&mut principal)?;
        self.directory
            .store_totp_secret(principal.id, descriptor.secret.clone())?;

        tracing::info!(principal_id = %principal.id, "issued TOTP secret");
        Ok(descriptor)
    }

    /// Check `code` against the caller's stored secret and open the
    /// second-factor window for this session on success.
    #[instrument(skip_all)]
    pub fn verify_totp(&self, caller: Option<&Caller>, code: &str) -> Result<Verified, StepUpError> {
        let caller = caller.ok_or(StepUpError::Unauthenticated)?;
        let now = self.clock.now();

        // The secret may have been rotated since the caller was resolved.
        let secret = self
            .directory
            .find(caller.principal_id())?
            .and_then(|p| p.totp_secret);

        if !self.totp.verify(secret.as_ref(), code, now) {
            tracing::info!(principal_id = %caller.principal_id(), "TOTP verification failed");
            return Err(StepUpError::InvalidCode);
        }

        let record = self.sessions.mark_verified(caller.session_id, now)?;
        tracing::info!(
            principal_id = %caller.principal_id(),
            session_id = %caller.session_id,
            expires_at = %record.expires_at,
            "second factor verified"
        );

        Ok(Verified {
            expires_in_seconds: seconds_until(record.expires_at, now),
            expires_at: record.expires_at,
        })
    }

    pub fn status(&self, caller: Option<&Caller>) -> SecondFactorStatus {
        let Some(caller) = caller else {
            return SecondFactorStatus::anonymous();
        };

        let now = self.clock.now();
        match self.sessions.state(caller.session_id, now) {
            SecondFactorState::Verified { expires_at } => SecondFactorStatus {
                authenticated: true,
                is_verified: true,
                expired: false,
                remaining_seconds: seconds_until(expires_at, now),
            },
            SecondFactorState::Expired { .. } => SecondFactorStatus {
                authenticated: true,
                is_verified: false,
                expired: true,
                remaining_seconds: 0,
            },
            SecondFactorState::Unverified => SecondFactorStatus {
                authenticated: true,
                is_verified: false,
                expired: false,
                remaining_seconds: 0,
            },
        }
    }

    /// Drop the caller's second-factor window. Anonymous logout is a no-op.
    pub fn logout(&self, caller: Option<&Caller>) -> Result<(), StepUpError> {
        if let Some(caller) = caller {
            self.sessions.clear(caller.session_id)?;
            tracing::info!(principal_id = %caller.principal_id(), session_id = %caller.session_id, "logged out");
        }
        Ok(())
    }

    fn enrollable(&self, caller: &Caller) -> Result<Principal, StepUpError> {
        let principal = self
            .directory
            .find(caller.principal_id())?
            .ok_or(StepUpError::ProfileNotFound)?;

        if principal.role.is_none() && !principal.is_superuser {
            return Err(StepUpError::ProfileNotFound);
        }
        Ok(principal)
    }
}

impl core::fmt::Debug for StepUpService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StepUpService")
            .field("totp", &self.totp)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}
