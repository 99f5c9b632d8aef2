use axum::extract::{Json, Path, State};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::directory::{self, OfficeNode};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::state::AppState;

#[derive(Serialize)]
pub struct OfficeUserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub office_id: Option<Uuid>,
}

impl From<User> for OfficeUserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            office_id: user.office_id,
        }
    }
}

pub async fn list_offices(State(state): State<AppState>) -> AppResult<Json<Vec<OfficeNode>>> {
    let mut conn = state.db()?;
    let offices = directory::list_offices(&mut conn)?;
    let tree = directory::build_tree(offices).map_err(|err| {
        error!(error = %err, "office tree is malformed");
        AppError::internal(err)
    })?;
    Ok(Json(tree))
}

pub async fn list_office_users(
    State(state): State<AppState>,
    Path(office_id): Path<Uuid>,
) -> AppResult<Json<Vec<OfficeUserResponse>>> {
    let mut conn = state.db()?;
    if directory::find_office(&mut conn, office_id)?.is_none() {
        return Err(AppError::not_found());
    }
    let users = directory::active_users(&mut conn, office_id)?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}
