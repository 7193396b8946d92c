//! Model catalog handler

use crate::handlers::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Catalog entry shown to clients
#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    /// Display name
    pub name: String,
}

/// Enabled models keyed by model key
///
/// GET /
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, CatalogEntry>> {
    let catalog = state
        .dispatcher
        .available_models()
        .into_iter()
        .map(|model| {
            (
                model.key.clone(),
                CatalogEntry {
                    name: model.display_name.clone(),
                },
            )
        })
        .collect();

    Json(catalog)
}
