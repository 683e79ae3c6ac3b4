//! System settings (`/configuracion`).

use crate::error::Result;
use crate::models::Settings;
use crate::routes::validated;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/configuracion", get(get_settings).put(update_settings))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.store.read(|data| data.settings.clone()).await)
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    pub require_zero_energy_validation: Option<bool>,
    #[validate(range(min = 1, max = 50))]
    pub max_lockers_per_activity: Option<u32>,
    #[validate(range(min = 0.0, max = 50.0))]
    pub zero_energy_max_voltage: Option<f64>,
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsRequest>,
) -> Result<Json<Settings>> {
    let body = validated(body)?;
    let settings = state
        .store
        .update(|data| {
            let settings = &mut data.settings;
            if let Some(v) = body.require_zero_energy_validation {
                settings.require_zero_energy_validation = v;
            }
            if let Some(v) = body.max_lockers_per_activity {
                settings.max_lockers_per_activity = v;
            }
            if let Some(v) = body.zero_energy_max_voltage {
                settings.zero_energy_max_voltage = v;
            }
            let updated = settings.clone();
            data.log(
                "settings.update",
                None,
                format!(
                    "Configuracion: validacion energia cero={}, max casilleros={}, voltaje max={:.2}",
                    updated.require_zero_energy_validation,
                    updated.max_lockers_per_activity,
                    updated.zero_energy_max_voltage
                ),
            );
            Ok(updated)
        })
        .await?;

    tracing::info!(settings = ?settings, "Settings updated");
    Ok(Json(settings))
}
