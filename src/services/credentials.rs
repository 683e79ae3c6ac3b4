// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Personnel PIN digests.
//!
//! PINs are never stored; only `hex(HMAC-SHA256(PIN_SECRET, pin))` is.

use crate::error::AppError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks PIN digests with the server key.
#[derive(Clone)]
pub struct PinHasher {
    key: Vec<u8>,
}

impl PinHasher {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Digest a PIN for storage.
    pub fn digest(&self, pin: &str) -> Result<String, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(pin.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check `pin` against a stored digest in constant time.
    pub fn verify(&self, pin: &str, stored_digest: &str) -> Result<bool, AppError> {
        let expected = self.digest(pin)?;
        Ok(expected.as_bytes().ct_eq(stored_digest.as_bytes()).into())
    }
}
