use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::{directory, error::AppError, state::AppState, workflow::ActingContext};

pub const ACTING_USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy)]
pub struct ActingUser(pub ActingContext);

impl ActingUser {
    pub fn context(&self) -> &ActingContext {
        &self.0
    }
}

fn user_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(ACTING_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

#[async_trait]
impl FromRequestParts<AppState> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from_headers(&parts.headers).ok_or_else(AppError::unauthorized)?;

        let mut conn = state.db()?;
        let user = directory::find_user(&mut conn, user_id)?
            .filter(|user| user.active)
            .ok_or_else(AppError::unauthorized)?;

        Ok(ActingUser(ActingContext {
            user_id: user.id,
            office_id: user.office_id,
        }))
    }
}
