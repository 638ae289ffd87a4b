use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    error::ApiError,
    events::{
        dto::{CreateEventRequest, EventResponse, EventsListResponse, Pagination},
        repo_types::Event,
    },
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:id",
            get(get_event).put(replace_event).delete(delete_event),
        )
}

#[instrument(skip(state))]
pub async fn list_events(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<EventsListResponse>, ApiError> {
    let events = Event::list_by_user(&state.db, user_id, p.limit, p.offset).await?;
    Ok(Json(EventsListResponse {
        events: events.into_iter().map(EventResponse::from).collect(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateEventRequest>,
) -> Result<(StatusCode, HeaderMap, Json<EventResponse>), ApiError> {
    let event = Event::create(&state.db, user_id, payload.validate()?).await?;
    info!(user_id = %user_id, event_id = %event.id, "event created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/events/{}", event.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(event.into())))
}

#[instrument(skip(state))]
pub async fn get_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = Event::find(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("Event not found"))?;
    Ok(Json(event.into()))
}

#[instrument(skip(state, payload))]
pub async fn replace_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<Json<EventResponse>, ApiError> {
    let event = Event::replace(&state.db, user_id, id, payload.validate()?)
        .await?
        .ok_or(ApiError::NotFound("Event not found"))?;
    info!(user_id = %user_id, event_id = %event.id, "event replaced");
    Ok(Json(event.into()))
}

#[instrument(skip(state))]
pub async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !Event::delete(&state.db, user_id, id).await? {
        return Err(ApiError::NotFound("Event not found"));
    }
    info!(user_id = %user_id, event_id = %id, "event deleted");
    Ok(StatusCode::NO_CONTENT)
}
