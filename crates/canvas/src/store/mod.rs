//! Collaborator seam to the backend stores.
//!
//! Commands travel to a single async worker over an unbounded channel and
//! are serviced strictly in order, which (together with the bridge's
//! latest-wins coalescing) guarantees writes for one feature are never
//! reordered. Results come back over a std mpsc channel polled once per
//! frame on the UI thread; the canvas never blocks on a pending call.

pub mod http;

use shared::{
    BackendId, EntityLocationUpdate, EntityPoint, FeatureProperties, Geometry, MapFeature,
    MapLayer, MapLayerPatch, ViewState,
};

/// Outbound backend mutation or fetch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    LoadLayers,
    LoadFeatures,
    LoadEntities,
    LoadView,
    UpdateLayer {
        id: BackendId,
        patch: MapLayerPatch,
    },
    CreateFeature {
        /// Plugin-local id of the just-drawn feature, echoed back so the
        /// durable id can be attached to it
        local_id: String,
        geometry: Geometry,
        properties: FeatureProperties,
    },
    UpdateFeature {
        id: BackendId,
        geometry: Geometry,
        properties: FeatureProperties,
    },
    DeleteFeature {
        id: BackendId,
    },
    UpsertLocation(EntityLocationUpdate),
    SaveView(ViewState),
}

/// Inbound result, polled on the UI thread
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Layers(Vec<MapLayer>),
    Features(Vec<MapFeature>),
    Entities(Vec<EntityPoint>),
    View(ViewState),
    FeatureCreated { local_id: String, id: BackendId },
    FeatureCreateFailed { local_id: String, error: String },
    FeatureWriteFailed { id: BackendId, error: String },
    WriteFailed { what: &'static str, error: String },
    LoadFailed { what: &'static str, error: String },
}

pub type CommandSender = tokio::sync::mpsc::UnboundedSender<StoreCommand>;
pub type CommandReceiver = tokio::sync::mpsc::UnboundedReceiver<StoreCommand>;
pub type EventSender = std::sync::mpsc::Sender<StoreEvent>;
pub type EventReceiver = std::sync::mpsc::Receiver<StoreEvent>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    std::sync::mpsc::channel()
}
