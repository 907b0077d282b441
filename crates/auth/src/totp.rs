//! TOTP secret manager: issues per-principal secrets and derives/verifies
//! time-based one-time codes (RFC 6238, SHA-1, 6 digits, 30 s step).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::Principal;

/// Base32-encoded shared secret (at least 128 bits of entropy).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TotpSecret(String);

impl TotpSecret {
    pub fn from_base32(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn generate() -> Self {
        Self(Secret::generate_secret().to_encoded().to_string())
    }
}

impl core::fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TotpSecret(<redacted>)")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TotpError {
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("cannot build provisioning descriptor: {0}")]
    Provisioning(String),
}

/// Configuration for TOTP generation.
#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Issuer label shown in authenticator apps.
    pub issuer: String,
    pub digits: usize,
    /// Time step in seconds.
    pub step: u64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: crate::config::DEFAULT_TOTP_ISSUER.to_string(),
            digits: 6,
            step: 30,
        }
    }
}

impl TotpConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }
}

/// Everything an authenticator app needs to enroll.
#[derive(Debug, Clone)]
pub struct ProvisioningDescriptor {
    pub account_name: String,
    pub issuer: String,
    pub secret: TotpSecret,
    /// `otpauth://totp/...` enrollment URI.
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct TotpManager {
    config: TotpConfig,
}

impl TotpManager {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    /// Generate a fresh secret, store it on the principal and return the
    /// enrollment descriptor.
    ///
    /// Overwrites any previous secret, so authenticators enrolled with the old
    /// one stop producing valid codes.
    pub fn issue_secret(&self, principal: &mut Principal) -> Result<ProvisioningDescriptor, TotpError> {
        let mut secret = TotpSecret::generate();
        while principal.totp_secret.as_ref() == Some(&secret) {
            secret = TotpSecret::generate();
        }

        let totp = self.build_totp(&secret, &principal.username)?;
        let descriptor = ProvisioningDescriptor {
            account_name: principal.username.clone(),
            issuer: self.config.issuer.clone(),
            uri: totp.get_url(),
            secret: secret.clone(),
        };

        principal.totp_secret = Some(secret);
        Ok(descriptor)
    }

    /// The code for the time step containing `at`.
    ///
    /// Only used to check submissions; never hand this to a caller.
    pub fn current_code(&self, secret: &TotpSecret, at: DateTime<Utc>) -> Result<String, TotpError> {
        let totp = self.build_totp(secret, "")?;
        Ok(totp.generate(unix_seconds(at)))
    }

    /// True iff `submitted` equals the code of the current time step exactly.
    ///
    /// Separators and whitespace are not stripped. No skew window: the
    /// previous and next steps are rejected. An absent or
    /// malformed secret never verifies.
    pub fn verify(&self, secret: Option<&TotpSecret>, submitted: &str, at: DateTime<Utc>) -> bool {
        let Some(secret) = secret else {
            return false;
        };

        let totp = match self.build_totp(secret, "") {
            Ok(totp) => totp,
            Err(e) => {
                tracing::warn!(error = %e, "stored TOTP secret is unusable");
                return false;
            }
        };

        if submitted.len() != self.config.digits || !submitted.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        totp.check(submitted, unix_seconds(at))
    }

    fn build_totp(&self, secret: &TotpSecret, account_name: &str) -> Result<TOTP, TotpError> {
        let bytes = Secret::Encoded(secret.expose().to_string())
            .to_bytes()
            .map_err(|e| TotpError::InvalidSecret(format!("{e:?}")))?;

        TOTP::new(
            Algorithm::SHA1,
            self.config.digits,
            0,
            self.config.step,
            bytes,
            Some(self.config.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| TotpError::Provisioning(format!("{e:?}")))
    }
}

fn unix_seconds(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use astrocat_core::PrincipalId;

    use super::*;

    // RFC 6238 SHA-1 seed "12345678901234567890".
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn manager() -> TotpManager {
        TotpManager::new(TotpConfig::new("SpaceCatalog"))
    }

    #[test]
    fn matches_rfc_6238_vectors() {
        let secret = TotpSecret::from_base32(RFC_SECRET);
        assert_eq!(manager().current_code(&secret, at(59)).unwrap(), "287082");
        assert_eq!(manager().current_code(&secret, at(1_111_111_109)).unwrap(), "081804");
        assert_eq!(manager().current_code(&secret, at(1_111_111_111)).unwrap(), "050471");
    }

    #[test]
    fn code_is_tied_to_a_single_step() {
        let m = manager();
        let secret = TotpSecret::from_base32(RFC_SECRET);
        let t = at(1_111_111_109);
        let code = m.current_code(&secret, t).unwrap();

        assert!(m.verify(Some(&secret), &code, t));
        assert!(!m.verify(Some(&secret), &code, t + chrono::Duration::seconds(30)));
        assert!(!m.verify(Some(&secret), &code, t - chrono::Duration::seconds(30)));
    }

    #[test]
    fn absent_secret_never_verifies() {
        let m = manager();
        assert!(!m.verify(None, "287082", at(59)));
    }

    #[test]
    fn malformed_submissions_are_rejected() {
        let m = manager();
        let secret = TotpSecret::from_base32(RFC_SECRET);
        assert!(!m.verify(Some(&secret), "", at(59)));
        assert!(!m.verify(Some(&secret), "28708", at(59)));
        assert!(!m.verify(Some(&secret), "2870820", at(59)));
        assert!(!m.verify(Some(&secret), "abcdef", at(59)));
        assert!(!m.verify(Some(&secret), "287 082", at(59)));
        assert!(!m.verify(Some(&secret), "287-082", at(59)));
        assert!(!m.verify(Some(&secret), " 287082", at(59)));
        assert!(m.verify(Some(&secret), "287082", at(59)));
    }

    #[test]
    fn issue_rotates_secret_and_builds_uri() {
        let m = manager();
        let mut principal = Principal::new(PrincipalId::new(), "vera");

        let first = m.issue_secret(&mut principal).unwrap();
        assert_eq!(principal.totp_secret.as_ref(), Some(&first.secret));
        assert!(first.uri.starts_with("otpauth://totp/"));
        assert!(first.uri.contains("SpaceCatalog"));
        assert!(first.uri.contains("vera"));

        let second = m.issue_secret(&mut principal).unwrap();
        assert_ne!(first.secret, second.secret);
        assert_eq!(principal.totp_secret.as_ref(), Some(&second.secret));

        // Codes from the old secret no longer verify against the stored one.
        let now = at(1_700_000_000);
        let old_code = m.current_code(&first.secret, now).unwrap();
        let new_code = m.current_code(&second.secret, now).unwrap();
        if old_code != new_code {
            assert!(!m.verify(principal.totp_secret.as_ref(), &old_code, now));
        }
    }

    #[test]
    fn debug_output_hides_secret() {
        let secret = TotpSecret::from_base32(RFC_SECRET);
        assert!(!format!("{secret:?}").contains(RFC_SECRET));
    }
}
