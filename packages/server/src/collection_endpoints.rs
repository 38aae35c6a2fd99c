//! Collection Graph Endpoints
//!
//! One request, one service operation. The caller is identified by the
//! `x-user-id` header, which an authenticating proxy in front of this server
//! is expected to set.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Health check endpoint
//! - `POST /api/collections/root` - Create (or fetch) the caller's root
//! - `GET /api/collections` - List the caller's collections
//! - `POST /api/collections` - Create a collection
//! - `GET /api/collections/:id` - Collection with its direct members
//! - `PATCH /api/collections/:id` - Rename
//! - `DELETE /api/collections/:id` - Remove (cascading)
//! - `POST /api/collections/:id/connect` - Connect to a target collection
//! - `PUT /api/collections/:id/nodes/:node_id` - Add a member
//! - `DELETE /api/collections/:id/nodes/:node_id` - Remove a member
//! - `POST /api/collections/:id/nodes/:node_id/move` - Move a member

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    response::Json,
    routing::{get, post, put},
    Router,
};
use kbase_core::models::{EdgeProjection, NodeProjection, User};
use kbase_core::services::{CollectionAttrs, CollectionDetail};
use serde::{Deserialize, Serialize};

use crate::{AppState, HttpError};

pub const USER_HEADER: &str = "x-user-id";

/// Caller identity resolved upstream
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| HttpError::unauthenticated(format!("Missing {} header", USER_HEADER)))?;
        let id = value
            .to_str()
            .map_err(|_| HttpError::unauthenticated(format!("Malformed {} header", USER_HEADER)))?
            .trim();
        if id.is_empty() {
            return Err(HttpError::unauthenticated(format!(
                "Empty {} header",
                USER_HEADER
            )));
        }
        Ok(AuthenticatedUser(User::new(id)))
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollectionInput {
    /// Omitted ids are generated; such requests are not safe to retry
    pub id: Option<String>,
    pub parent_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInput {
    pub target_id: String,
    pub edge_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeInput {
    pub edge_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNodeInput {
    pub target_collection_id: String,
    pub edge_id: Option<String>,
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn create_root_collection(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<NodeProjection>, HttpError> {
    let root = state.service.create_root_collection(&user).await?;
    Ok(Json(root))
}

async fn list_collections(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<NodeProjection>>, HttpError> {
    Ok(Json(state.service.list_collections(&user).await?))
}

async fn create_collection(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CreateCollectionInput>,
) -> Result<Json<NodeProjection>, HttpError> {
    let id = input.id.unwrap_or_else(|| state.ids.generate());
    let created = state
        .service
        .create(&user, &id, &input.parent_id, CollectionAttrs::named(input.name))
        .await?;
    Ok(Json(created))
}

async fn get_collection(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<CollectionDetail>, HttpError> {
    Ok(Json(state.service.get_collection(&user, &id).await?))
}

async fn rename_collection(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    Json(input): Json<RenameInput>,
) -> Result<Json<NodeProjection>, HttpError> {
    Ok(Json(state.service.rename(&user, &id, &input.name).await?))
}

async fn remove_collection(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<bool>, HttpError> {
    Ok(Json(state.service.remove(&user, &id).await?))
}

async fn connect(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    Json(input): Json<ConnectInput>,
) -> Result<Json<EdgeProjection>, HttpError> {
    let edge_id = input.edge_id.unwrap_or_else(|| state.ids.generate());
    let edge = state
        .service
        .connect(&user, &id, &input.target_id, &edge_id)
        .await?;
    Ok(Json(edge))
}

async fn add_node(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, node_id)): Path<(String, String)>,
    input: Option<Json<AddNodeInput>>,
) -> Result<Json<EdgeProjection>, HttpError> {
    let edge_id = input
        .and_then(|Json(input)| input.edge_id)
        .unwrap_or_else(|| state.ids.generate());
    let edge = state
        .service
        .add_node(&user, &id, &node_id, &edge_id)
        .await?;
    Ok(Json(edge))
}

async fn remove_node(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, node_id)): Path<(String, String)>,
) -> Result<Json<bool>, HttpError> {
    Ok(Json(state.service.remove_node(&user, &id, &node_id).await?))
}

async fn move_node(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, node_id)): Path<(String, String)>,
    Json(input): Json<MoveNodeInput>,
) -> Result<Json<EdgeProjection>, HttpError> {
    let edge_id = input.edge_id.unwrap_or_else(|| state.ids.generate());
    let edge = state
        .service
        .move_node(&user, &id, &node_id, &input.target_collection_id, &edge_id)
        .await?;
    Ok(Json(edge))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/collections/root", post(create_root_collection))
        .route(
            "/api/collections",
            get(list_collections).post(create_collection),
        )
        .route(
            "/api/collections/:id",
            get(get_collection)
                .patch(rename_collection)
                .delete(remove_collection),
        )
        .route("/api/collections/:id/connect", post(connect))
        .route(
            "/api/collections/:id/nodes/:node_id",
            put(add_node).delete(remove_node),
        )
        .route("/api/collections/:id/nodes/:node_id/move", post(move_node))
        .with_state(state)
}
