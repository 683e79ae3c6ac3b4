//! Personnel routes (`/users`).

use crate::error::{AppError, Result};
use crate::models::{Person, Role};
use crate::routes::validated;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_people).post(create_person))
        .route(
            "/users/{id}",
            get(get_person).put(update_person).delete(delete_person),
        )
        .route("/users/{id}/verify", post(verify_pin))
}

/// Person as returned by the API (the PIN digest stays server-side).
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonResponse {
    pub id: String,
    pub name: String,
    pub username: String,
    pub role: Role,
    pub active: bool,
}

impl From<&Person> for PersonResponse {
    fn from(p: &Person) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            username: p.username.clone(),
            role: p.role,
            active: p.active,
        }
    }
}

#[derive(Deserialize)]
struct PeopleQuery {
    role: Option<Role>,
}

async fn list_people(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PeopleQuery>,
) -> Json<Vec<PersonResponse>> {
    let mut people: Vec<PersonResponse> = state
        .store
        .read(|data| {
            data.people
                .values()
                .filter(|p| params.role.map_or(true, |r| p.role == r))
                .map(PersonResponse::from)
                .collect()
        })
        .await;
    people.sort_by(|a, b| a.name.cmp(&b.name));
    Json(people)
}

#[derive(Deserialize, Validate)]
pub struct CreatePersonRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    pub role: Role,
    #[validate(length(min = 4, max = 12))]
    pub pin: String,
}

async fn create_person(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePersonRequest>,
) -> Result<(StatusCode, Json<PersonResponse>)> {
    let body = validated(body)?;
    let person = Person {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        username: body.username,
        role: body.role,
        pin_digest: state.pins.digest(&body.pin)?,
        active: true,
    };

    state
        .store
        .update(|data| {
            if data.people.values().any(|p| p.username == person.username) {
                return Err(AppError::Conflict(format!(
                    "Username '{}' is taken",
                    person.username
                )));
            }
            data.log(
                "user.create",
                None,
                format!("Usuario '{}' ({}) creado", person.username, person.role),
            );
            data.people.insert(person.id.clone(), person.clone());
            Ok(())
        })
        .await?;

    tracing::info!(user_id = %person.id, role = %person.role, "User created");
    Ok((StatusCode::CREATED, Json(PersonResponse::from(&person))))
}

async fn get_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PersonResponse>> {
    let person = state
        .store
        .read(|data| data.person(&id).map(PersonResponse::from))
        .await?;
    Ok(Json(person))
}

#[derive(Deserialize, Validate)]
pub struct UpdatePersonRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
    #[validate(length(min = 4, max = 12))]
    pub pin: Option<String>,
}

async fn update_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePersonRequest>,
) -> Result<Json<PersonResponse>> {
    let body = validated(body)?;
    let pin_digest = body
        .pin
        .as_deref()
        .map(|pin| state.pins.digest(pin))
        .transpose()?;

    let person = state
        .store
        .update(|data| {
            let in_open_activity = data
                .activities
                .values()
                .any(|a| !a.is_finalized() && a.involves(&id));
            if body.role.is_some() && in_open_activity {
                return Err(AppError::Conflict(
                    "Role cannot change while the user is part of an open activity".to_string(),
                ));
            }
            // A deactivated user could never unlock their place in the chain.
            if body.active == Some(false) && in_open_activity {
                return Err(AppError::Conflict(
                    "User cannot be deactivated while part of an open activity".to_string(),
                ));
            }
            let person = data
                .people
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
            if let Some(name) = body.name {
                person.name = name;
            }
            if let Some(role) = body.role {
                person.role = role;
            }
            if let Some(active) = body.active {
                person.active = active;
            }
            if let Some(digest) = pin_digest {
                person.pin_digest = digest;
            }
            let response = PersonResponse::from(&*person);
            data.log("user.update", None, format!("Usuario '{}' actualizado", response.username));
            Ok(response)
        })
        .await?;
    Ok(Json(person))
}

async fn delete_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .store
        .update(|data| {
            data.person(&id)?;
            if data
                .activities
                .values()
                .any(|a| !a.is_finalized() && a.involves(&id))
            {
                return Err(AppError::Conflict(
                    "User is part of an open activity".to_string(),
                ));
            }
            if let Some(person) = data.people.remove(&id) {
                data.log("user.delete", None, format!("Usuario '{}' eliminado", person.username));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Validate)]
pub struct VerifyPinRequest {
    #[validate(length(min = 4, max = 12))]
    pub pin: String,
}

#[derive(Serialize)]
pub struct VerifyPinResponse {
    pub valid: bool,
}

/// Check a user's PIN without changing anything.
async fn verify_pin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<VerifyPinRequest>,
) -> Result<Json<VerifyPinResponse>> {
    let body = validated(body)?;
    let (digest, active) = state
        .store
        .read(|data| data.person(&id).map(|p| (p.pin_digest.clone(), p.active)))
        .await?;

    if !active || !state.pins.verify(&body.pin, &digest)? {
        return Err(AppError::Unauthorized);
    }
    Ok(Json(VerifyPinResponse { valid: true }))
}
