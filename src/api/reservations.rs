use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{
    auth::{get_authenticated_member, AuthError},
    session::AppState,
};
use crate::error::ReservationError;

#[derive(Debug)]
pub enum ReservationsApiError {
    AuthError(AuthError),
    Reservation(ReservationError),
}

impl From<AuthError> for ReservationsApiError {
    fn from(e: AuthError) -> Self {
        ReservationsApiError::AuthError(e)
    }
}

impl From<ReservationError> for ReservationsApiError {
    fn from(e: ReservationError) -> Self {
        ReservationsApiError::Reservation(e)
    }
}

impl IntoResponse for ReservationsApiError {
    fn into_response(self) -> Response {
        match self {
            ReservationsApiError::AuthError(e) => e.into_response(),
            ReservationsApiError::Reservation(e) => e.into_response(),
        }
    }
}

/// Class IDs the signed-in member has reserved
async fn my_reservations(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Uuid>>, ReservationsApiError> {
    let member = get_authenticated_member(&session).await?;

    let class_ids = state.coordinator.list_reservations(member.member_id).await?;

    Ok(Json(class_ids))
}

async fn reserve_class(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
    session: Session,
) -> Result<Json<Value>, ReservationsApiError> {
    let member = get_authenticated_member(&session).await?;

    if let Err(e) = state.coordinator.reserve(member.member_id, class_id).await {
        tracing::warn!(
            member_id = %member.member_id,
            class_id = %class_id,
            reason = e.code(),
            "Reservation rejected"
        );
        return Err(e.into());
    }

    Ok(Json(json!({ "success": true })))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(class_id): Path<Uuid>,
    session: Session,
) -> Result<Json<Value>, ReservationsApiError> {
    let member = get_authenticated_member(&session).await?;

    if let Err(e) = state.coordinator.cancel(member.member_id, class_id).await {
        tracing::warn!(
            member_id = %member.member_id,
            class_id = %class_id,
            reason = e.code(),
            "Cancellation rejected"
        );
        return Err(e.into());
    }

    Ok(Json(json!({ "success": true })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reservations", get(my_reservations))
        .route(
            "/classes/:class_id/reservation",
            post(reserve_class).delete(cancel_reservation),
        )
}
