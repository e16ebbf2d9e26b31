//! TOTP second factor, checked at superuser login.

use anyhow::anyhow;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

use crate::errors::Result;

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
const SKEW_STEPS: u8 = 1;

#[derive(Debug, Clone)]
pub struct TwoFactor {
    issuer: String,
}

impl TwoFactor {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self { issuer: issuer.into() }
    }

    /// A fresh base32 secret to store for an account.
    pub fn generate_secret() -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    /// The `otpauth://` URI authenticator apps import.
    pub fn provisioning_uri(&self, secret: &str, account: &str) -> Result<String> {
        Ok(self.build(secret, account)?.get_url())
    }

    /// Check `code` against `secret` at the current time, allowing one step of clock drift.
    pub fn verify(&self, secret: &str, code: &str, account: &str) -> Result<bool> {
        let totp = self.build(secret, account)?;
        let code = normalize(code);
        match totp.check_current(&code) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                warn!("TOTP check failed, system clock before epoch: {}", e);
                Ok(false)
            }
        }
    }

    /// Check `code` against `secret` at Unix time `time`.
    pub fn verify_at(&self, secret: &str, code: &str, account: &str, time: u64) -> Result<bool> {
        let totp = self.build(secret, account)?;
        Ok(totp.check(&normalize(code), time))
    }

    fn build(&self, secret: &str, account: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("invalid TOTP secret: {e}"))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW_STEPS,
            STEP_SECONDS,
            bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| anyhow!("failed to create TOTP: {e}"))?;
        Ok(totp)
    }
}

fn normalize(code: &str) -> String {
    code.replace([' ', '-'], "")
}
