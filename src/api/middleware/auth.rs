use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

use super::session::SESSION_KEY_MEMBER_ID;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    NotAuthenticated,
    SessionError,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::SessionError => "session_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            ),
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.")
            }
        };

        // Same body shape as reservation rejections
        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// The member the current session belongs to
#[derive(Debug, Clone)]
pub struct AuthenticatedMember {
    pub member_id: Uuid,
}

/// Extracts the authenticated member ID from the session
pub async fn get_authenticated_member(session: &Session) -> Result<AuthenticatedMember, AuthError> {
    let member_id: Uuid = session
        .get(SESSION_KEY_MEMBER_ID)
        .await
        .map_err(|_| AuthError::SessionError)?
        .ok_or(AuthError::NotAuthenticated)?;

    Ok(AuthenticatedMember { member_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_not_authenticated_is_json() {
        let response = AuthError::NotAuthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"], "not_authenticated");
        assert_eq!(body["message"], "Authentication required. Please log in.");
    }

    #[tokio::test]
    async fn test_session_error_is_json() {
        let response = AuthError::SessionError.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "session_error");
    }
}
