// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the locker hardware API.
//!
//! The hardware service listens next to the totem and exposes
//! `POST /openbox` with a JSON body `{ "box": <number> }`.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Errors from the locker hardware.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Locker device unreachable: {0}")]
    Unreachable(String),

    #[error("Locker device rejected box {number}: HTTP {status}")]
    Rejected { number: u32, status: u16 },
}

impl From<DeviceError> for crate::error::AppError {
    fn from(err: DeviceError) -> Self {
        crate::error::AppError::Device(err.to_string())
    }
}

#[derive(Serialize)]
struct OpenBoxRequest {
    #[serde(rename = "box")]
    number: u32,
}

#[derive(Clone)]
enum Backend {
    Http {
        client: reqwest::Client,
        base_url: String,
    },
    /// Offline mode: records opened boxes, optionally failing every call.
    Mock {
        opened: Arc<Mutex<Vec<u32>>>,
        fail: bool,
    },
}

/// Opens physical lockers.
#[derive(Clone)]
pub struct LockerDevice {
    backend: Backend,
}

impl LockerDevice {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Unreachable(e.to_string()))?;

        Ok(Self {
            backend: Backend::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        })
    }

    /// Offline device that always succeeds.
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Mock {
                opened: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            },
        }
    }

    /// Offline device that is always unreachable.
    pub fn new_failing_mock() -> Self {
        Self {
            backend: Backend::Mock {
                opened: Arc::new(Mutex::new(Vec::new())),
                fail: true,
            },
        }
    }

    /// Boxes opened so far (mock mode only).
    pub fn opened_boxes(&self) -> Vec<u32> {
        match &self.backend {
            Backend::Mock { opened, .. } => opened.lock().map(|v| v.clone()).unwrap_or_default(),
            Backend::Http { .. } => Vec::new(),
        }
    }

    /// Open locker box `number`.
    pub async fn open_box(&self, number: u32) -> Result<(), DeviceError> {
        match &self.backend {
            Backend::Http { client, base_url } => {
                let url = format!("{}/openbox", base_url);
                tracing::debug!(url = %url, number, "Opening locker box");

                let response = client
                    .post(&url)
                    .json(&OpenBoxRequest { number })
                    .send()
                    .await
                    .map_err(|e| DeviceError::Unreachable(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(DeviceError::Rejected {
                        number,
                        status: status.as_u16(),
                    });
                }
                Ok(())
            }
            Backend::Mock { opened, fail } => {
                if *fail {
                    return Err(DeviceError::Unreachable("mock device offline".to_string()));
                }
                if let Ok(mut opened) = opened.lock() {
                    opened.push(number);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_boxes() {
        let device = LockerDevice::new_mock();
        device.open_box(3).await.unwrap();
        device.open_box(7).await.unwrap();
        assert_eq!(device.opened_boxes(), vec![3, 7]);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let device = LockerDevice::new_failing_mock();
        let err = device.open_box(1).await.unwrap_err();
        assert!(matches!(err, DeviceError::Unreachable(_)));
        assert!(device.opened_boxes().is_empty());
    }

    #[test]
    fn test_open_box_body() {
        let body = serde_json::to_value(OpenBoxRequest { number: 12 }).unwrap();
        assert_eq!(body, serde_json::json!({ "box": 12 }));
    }
}
