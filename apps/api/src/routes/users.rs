//! User HTTP route handlers
//!
//! Per-user state that travels with the session rather than a device:
//! - `GET  /me` - profile of the authenticated user
//! - `GET  /me/player-settings` / `PUT /me/player-settings`
//! - `GET  /me/recent-songs` / `POST /me/recent-songs`

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;
use crate::models::user::{PlayerSettings, RecentSong, User};
use crate::repositories::UserRepository;

/// Shared state for user route handlers
#[derive(Clone)]
pub struct UsersState {
    pub users: UserRepository,
}

impl UsersState {
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }
}

/// Create the user router
pub fn users_router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(me))
        .route(
            "/player-settings",
            get(get_player_settings).put(update_player_settings),
        )
        .route("/recent-songs", get(recent_songs).post(push_recent_song))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct UserProfile {
    id: String,
    display_name: String,
    avatar_url: Option<String>,
    active_device_id: Option<String>,
    player_settings: PlayerSettings,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            active_device_id: user.active_device_id,
            player_settings: user.player_settings.0,
        }
    }
}

async fn me(State(state): State<UsersState>, user: CurrentUser) -> ApiResult<Json<UserProfile>> {
    let profile = state
        .users
        .find_by_id(user.id())
        .await?
        .ok_or_else(|| ApiError::not_found("user", user.id()))?;

    Ok(Json(UserProfile::from(profile)))
}

async fn get_player_settings(
    State(state): State<UsersState>,
    user: CurrentUser,
) -> ApiResult<Json<PlayerSettings>> {
    let settings = state
        .users
        .player_settings(user.id())
        .await?
        .ok_or_else(|| ApiError::not_found("user", user.id()))?;

    Ok(Json(settings))
}

async fn update_player_settings(
    State(state): State<UsersState>,
    user: CurrentUser,
    Json(settings): Json<PlayerSettings>,
) -> ApiResult<Json<PlayerSettings>> {
    settings.validate().map_err(ApiError::ValidationError)?;

    let updated = state
        .users
        .update_player_settings(user.id(), &settings)
        .await?;
    if !updated {
        return Err(ApiError::not_found("user", user.id()));
    }

    Ok(Json(settings))
}

#[derive(Debug, Serialize)]
struct RecentSongsResponse {
    songs: Vec<RecentSong>,
}

async fn recent_songs(
    State(state): State<UsersState>,
    user: CurrentUser,
) -> ApiResult<Json<RecentSongsResponse>> {
    if !state.users.exists(user.id()).await? {
        return Err(ApiError::not_found("user", user.id()));
    }

    let songs = state.users.recent_songs(user.id()).await?;
    Ok(Json(RecentSongsResponse { songs }))
}

#[derive(Debug, Deserialize)]
struct PushRecentSongRequest {
    song_id: String,
}

#[derive(Debug, Serialize)]
struct PushRecentSongResponse {
    success: bool,
}

async fn push_recent_song(
    State(state): State<UsersState>,
    user: CurrentUser,
    Json(body): Json<PushRecentSongRequest>,
) -> ApiResult<Json<PushRecentSongResponse>> {
    if body.song_id.is_empty() {
        return Err(ApiError::ValidationError("song_id cannot be empty".into()));
    }
    if !state.users.exists(user.id()).await? {
        return Err(ApiError::not_found("user", user.id()));
    }

    state.users.push_recent_song(user.id(), &body.song_id).await?;
    Ok(Json(PushRecentSongResponse { success: true }))
}
