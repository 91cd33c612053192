use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    models::{
        auth::AuthenticatedUser,
        cloud::{CloudDocument, CloudMeta, UploadReceipt},
        document::Document,
    },
    services::cloud_store::{CloudError, CloudStore},
    AppState,
};

type ApiError = (StatusCode, Json<Value>);

/// A token only grants access to its own user's document.
fn require_owner(user: &AuthenticatedUser, user_id: &str) -> Result<(), ApiError> {
    if user.user_id == user_id {
        Ok(())
    } else {
        Err(error_response(CloudError::Forbidden))
    }
}

fn error_response(e: CloudError) -> ApiError {
    let status = match &e {
        CloudError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CloudError::Forbidden => StatusCode::FORBIDDEN,
        CloudError::NotFound => StatusCode::NOT_FOUND,
        CloudError::Busy => StatusCode::CONFLICT,
        CloudError::Network(_) | CloudError::Backend(_) => {
            tracing::error!("Document storage failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() })))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<CloudDocument>, ApiError> {
    require_owner(&user, &user_id)?;
    state
        .store
        .download(&user_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn put_document(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    user: AuthenticatedUser,
    Json(doc): Json<Document>,
) -> Result<Json<UploadReceipt>, ApiError> {
    require_owner(&user, &user_id)?;
    let receipt = state
        .store
        .upload(&user_id, &doc)
        .await
        .map_err(error_response)?;
    tracing::info!(
        user_id = %user_id,
        students = doc.students.len(),
        "Stored document at {}",
        receipt.last_updated
    );
    Ok(Json(receipt))
}

pub async fn get_meta(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<CloudMeta>, ApiError> {
    require_owner(&user, &user_id)?;
    let last_updated = state
        .store
        .last_updated(&user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(CloudMeta { last_updated }))
}
