// handlers/protected/users/crud.rs - user CRUD handlers

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{resources, Json, Path, Query, Validator};
use crate::auth::password::hash_password;
use crate::database::models::User;
use crate::database::IndexQuery;
use crate::error::{ApiError, ErrorAction};
use crate::handlers::protected::utils::list_params;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::user_service::{NewUser, UniqueColumn, UserChanges, USER_LISTING};
use crate::services::UserService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl UserRequest {
    /// Field rules; `except` skips the user being updated in uniqueness checks
    async fn validate(&self, users: &UserService, creating: bool, except: Option<i64>) -> Result<(), ApiError> {
        let mut v = Validator::new();
        let (name, email, password) = if creating {
            (
                v.required("name", self.name.as_deref()),
                v.required("email", self.email.as_deref()),
                v.required("password", self.password.as_deref()),
            )
        } else {
            (self.name.as_deref(), self.email.as_deref(), self.password.as_deref())
        };
        v.max_len("name", name, 255);
        v.email("email", email);
        v.max_len("email", email, 255);
        v.max_len("username", self.username.as_deref(), 255);
        v.max_len("phone", self.phone.as_deref(), 255);
        v.min_len("password", password, 8);

        if let Some(email) = email {
            v.unique("email", users.is_taken(UniqueColumn::Email, email, except).await?);
        }
        if let Some(username) = self.username.as_deref() {
            v.unique("username", users.is_taken(UniqueColumn::Username, username, except).await?);
        }
        if let Some(phone) = self.phone.as_deref() {
            v.unique("phone", users.is_taken(UniqueColumn::Phone, phone, except).await?);
        }
        v.finish()
    }
}

/// GET /api/v1/users - Paginated user listing
///
/// Query: `page`, `per_page`, `search`, `with_trashed`, `order_by`,
/// `order_direction`, `start_date`, `end_date`.
///
/// Expected Output (Success):
/// ```json
/// {
///   "success": true,
///   "message": "Users retrieved successfully",
///   "data": [ { "id": "86Rf07xd4z", "name": "John Doe", ... } ],
///   "meta": { "current_page": 1, "last_page": 1, "per_page": 15, "total": 1 }
/// }
/// ```
pub async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> ApiResult<Vec<Value>> {
    let params = list_params(&query, &USER_LISTING)?;
    let page = USER_LISTING
        .fetch::<User>(&state.pool, &params, &[])
        .await
        .map_err(ApiError::from)
        .during("fetching users")?
        .map(|u| resources::user(&u, &state.sqids));
    Ok(ApiResponse::paginated("Users retrieved successfully", page.items, page.meta))
}

/// POST /api/v1/users - Create a user
///
/// Expected Input:
/// ```json
/// { "name": "Jane", "email": "jane@example.com", "username": "jane", "phone": "+15550100", "password": "password" }
/// ```
pub async fn store(State(state): State<AppState>, Json(payload): Json<UserRequest>) -> ApiResult<Value> {
    let users = UserService::new(state.pool.clone());
    payload.validate(&users, true, None).await.during("creating the user")?;

    async {
        let user = users
            .create(NewUser {
                name: payload.name.clone().unwrap_or_default(),
                email: payload.email.clone().unwrap_or_default(),
                username: payload.username.clone(),
                phone: payload.phone.clone(),
                password_hash: hash_password(payload.password.as_deref().unwrap_or_default())?,
                ..Default::default()
            })
            .await?;
        Ok::<_, ApiError>(ApiResponse::created(
            "User created successfully",
            resources::user(&user, &state.sqids),
        ))
    }
    .await
    .during("creating the user")
}

/// GET /api/v1/users/:sqid - Show one live user
pub async fn show(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    let user = UserService::new(state.pool.clone())
        .find(id)
        .await
        .map_err(ApiError::from)
        .during("fetching the user")?;
    Ok(ApiResponse::success(
        "User retrieved successfully",
        resources::user(&user, &state.sqids),
    ))
}

/// PUT /api/v1/users/:sqid - Update a user; every field is optional
pub async fn update(
    State(state): State<AppState>,
    Path(sqid): Path<String>,
    Json(payload): Json<UserRequest>,
) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    let users = UserService::new(state.pool.clone());
    users.find(id).await.map_err(ApiError::from).during("updating the user")?;
    payload.validate(&users, false, Some(id)).await.during("updating the user")?;

    async {
        let password_hash = payload.password.as_deref().map(hash_password).transpose()?;
        let user = users
            .update(
                id,
                UserChanges {
                    name: payload.name,
                    email: payload.email,
                    username: payload.username,
                    phone: payload.phone,
                    password_hash,
                },
            )
            .await?;
        Ok::<_, ApiError>(ApiResponse::success(
            "User updated successfully",
            resources::user(&user, &state.sqids),
        ))
    }
    .await
    .during("updating the user")
}

/// DELETE /api/v1/users/:sqid - Soft delete
pub async fn destroy(State(state): State<AppState>, Path(sqid): Path<String>) -> ApiResult<Value> {
    let id = state.decode_id(&sqid, "User")?;
    UserService::new(state.pool.clone())
        .repository()
        .soft_delete(id)
        .await
        .map_err(ApiError::from)
        .during("deleting the user")?;
    Ok(ApiResponse::message("User deleted successfully"))
}
