//! Echoes the claims the JWT middleware propagated for this request.

use axum::Extension;
use axum::Json;
use serde_json::Value;
use tollgate_core::{Claims, RequestStore};

/// Returns every JSON value in the request store as an object.
///
/// Entries of other types (the request logger) are left out. Without a store
/// the object is empty.
pub async fn claims_handler(store: Option<Extension<RequestStore>>) -> Json<Claims> {
    let Some(Extension(store)) = store else {
        return Json(Claims::new());
    };

    let claims = store
        .keys()
        .filter_map(|key| {
            store
                .get::<Value>(key)
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect();
    Json(claims)
}
