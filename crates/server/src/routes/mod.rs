use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};

use crate::AppState;
use shared::{
    BackendId, EntityLocationUpdate, FeatureUpsert, MapFeature, MapLayer, MapLayerPatch, ViewState,
};

/// Health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_layers(State(state): State<AppState>) -> Result<Json<Vec<MapLayer>>, StatusCode> {
    let store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(store.layers.clone()))
}

pub async fn get_layer(
    State(state): State<AppState>,
    Path(id): Path<BackendId>,
) -> Result<Json<MapLayer>, StatusCode> {
    let store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    store
        .layers
        .iter()
        .find(|l| l.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn update_layer(
    State(state): State<AppState>,
    Path(id): Path<BackendId>,
    Json(patch): Json<MapLayerPatch>,
) -> Result<Json<MapLayer>, StatusCode> {
    let mut store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let layer = store
        .layers
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if let Some(enabled) = patch.enabled {
        layer.enabled = enabled;
    }
    if let Some(opacity) = patch.opacity {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
        layer.opacity = opacity;
    }
    if let Some(z_index) = patch.z_index {
        layer.z_index = z_index;
    }
    Ok(Json(layer.clone()))
}

pub async fn list_features(
    State(state): State<AppState>,
) -> Result<Json<Vec<MapFeature>>, StatusCode> {
    let store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(store.features.clone()))
}

pub async fn get_feature(
    State(state): State<AppState>,
    Path(id): Path<BackendId>,
) -> Result<Json<MapFeature>, StatusCode> {
    let store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    store
        .features
        .iter()
        .find(|f| f.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn create_feature(
    State(state): State<AppState>,
    Json(body): Json<FeatureUpsert>,
) -> Result<(StatusCode, Json<MapFeature>), StatusCode> {
    let mut store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let id = store.alloc_id();
    let feature = MapFeature {
        id,
        geometry: body.geometry,
        properties: body.properties,
    };
    store.features.push(feature.clone());
    tracing::info!(id, "markup feature created");
    Ok((StatusCode::CREATED, Json(feature)))
}

pub async fn update_feature(
    State(state): State<AppState>,
    Path(id): Path<BackendId>,
    Json(body): Json<FeatureUpsert>,
) -> Result<Json<MapFeature>, StatusCode> {
    let mut store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let feature = store
        .features
        .iter_mut()
        .find(|f| f.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    feature.geometry = body.geometry;
    feature.properties = body.properties;
    Ok(Json(feature.clone()))
}

pub async fn delete_feature(
    State(state): State<AppState>,
    Path(id): Path<BackendId>,
) -> Result<StatusCode, StatusCode> {
    let mut store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let before = store.features.len();
    store.features.retain(|f| f.id != id);
    if store.features.len() == before {
        return Err(StatusCode::NOT_FOUND);
    }
    tracing::info!(id, "markup feature deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_entities(
    State(state): State<AppState>,
) -> Result<Json<Vec<shared::EntityPoint>>, StatusCode> {
    let store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    // apply manual location overrides on the way out
    let entities = store
        .entities
        .iter()
        .map(|e| {
            let mut e = e.clone();
            if let Some((lng, lat)) = store.locations.get(&e.id) {
                e.lng = *lng;
                e.lat = *lat;
            }
            e
        })
        .collect();
    Ok(Json(entities))
}

pub async fn upsert_location(
    State(state): State<AppState>,
    Json(update): Json<EntityLocationUpdate>,
) -> Result<StatusCode, StatusCode> {
    let id = update
        .node_id
        .or(update.sensor_id)
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    let mut store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !store.entities.iter().any(|e| e.id == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    tracing::info!(%id, update.lng, update.lat, "entity relocated");
    store.locations.insert(id, (update.lng, update.lat));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_view(State(state): State<AppState>) -> Result<Json<ViewState>, StatusCode> {
    let store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(store.view.clone()))
}

pub async fn save_view(
    State(state): State<AppState>,
    Json(view): Json<ViewState>,
) -> Result<StatusCode, StatusCode> {
    let mut store = state.store.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    store.view = view;
    Ok(StatusCode::NO_CONTENT)
}
