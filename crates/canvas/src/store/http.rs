//! HTTP implementation of the store seam.
//!
//! One worker task owns the command receiver and services commands in
//! order against the dashboard's REST API, pushing results onto the
//! event channel the UI thread drains each frame.

use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{FeatureUpsert, MapFeature, ViewState};
use thiserror::Error;

use crate::store::{CommandReceiver, EventSender, StoreCommand, StoreEvent};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

pub struct HttpStore {
    client: reqwest::Client,
    base: String,
    events: EventSender,
}

impl HttpStore {
    pub fn new(base: impl Into<String>, events: EventSender) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            events,
        }
    }

    /// Service commands until the sender side hangs up
    pub async fn run(self, mut commands: CommandReceiver) {
        while let Some(cmd) = commands.recv().await {
            if self.service(cmd).await.is_err() {
                // UI thread is gone, nothing left to report to
                break;
            }
        }
        tracing::debug!("store worker shutting down");
    }

    async fn service(&self, cmd: StoreCommand) -> Result<(), ()> {
        let event = match cmd {
            StoreCommand::LoadLayers => match self.get_json("/api/map/layers").await {
                Ok(layers) => StoreEvent::Layers(layers),
                Err(e) => load_failed("layers", e),
            },
            StoreCommand::LoadFeatures => match self.get_json("/api/map/features").await {
                Ok(features) => StoreEvent::Features(features),
                Err(e) => load_failed("features", e),
            },
            StoreCommand::LoadEntities => match self.get_json("/api/map/entities").await {
                Ok(entities) => StoreEvent::Entities(entities),
                Err(e) => load_failed("entities", e),
            },
            StoreCommand::LoadView => match self.get_json::<ViewState>("/api/map/view").await {
                Ok(view) => StoreEvent::View(view),
                Err(e) => load_failed("view", e),
            },
            StoreCommand::UpdateLayer { id, patch } => {
                match self.put_json(&format!("/api/map/layers/{id}"), &patch).await {
                    Ok(()) => return Ok(()),
                    Err(e) => write_failed("layer-update", e),
                }
            }
            StoreCommand::CreateFeature { local_id, geometry, properties } => {
                let body = FeatureUpsert { geometry, properties };
                match self.post_json::<_, MapFeature>("/api/map/features", &body).await {
                    Ok(created) => StoreEvent::FeatureCreated { local_id, id: created.id },
                    Err(e) => StoreEvent::FeatureCreateFailed {
                        local_id,
                        error: e.to_string(),
                    },
                }
            }
            StoreCommand::UpdateFeature { id, geometry, properties } => {
                let body = FeatureUpsert { geometry, properties };
                match self.put_json(&format!("/api/map/features/{id}"), &body).await {
                    Ok(()) => return Ok(()),
                    Err(e) => StoreEvent::FeatureWriteFailed { id, error: e.to_string() },
                }
            }
            StoreCommand::DeleteFeature { id } => {
                match self.delete(&format!("/api/map/features/{id}")).await {
                    Ok(()) => return Ok(()),
                    Err(e) => StoreEvent::FeatureWriteFailed { id, error: e.to_string() },
                }
            }
            StoreCommand::UpsertLocation(update) => {
                match self.post_no_content("/api/map/locations", &update).await {
                    Ok(()) => return Ok(()),
                    Err(e) => write_failed("relocate", e),
                }
            }
            StoreCommand::SaveView(view) => {
                match self.put_json("/api/map/view", &view).await {
                    Ok(()) => return Ok(()),
                    Err(e) => write_failed("view-save", e),
                }
            }
        };
        self.events.send(event).map_err(|_| ())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.client.get(self.url(path)).send().await?;
        Ok(checked(resp).await?.json().await?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        Ok(checked(resp).await?.json().await?)
    }

    async fn post_no_content<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        checked(resp).await?;
        Ok(())
    }

    async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let resp = self.client.put(self.url(path)).json(body).send().await?;
        checked(resp).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let resp = self.client.delete(self.url(path)).send().await?;
        checked(resp).await?;
        Ok(())
    }
}

async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

fn load_failed(what: &'static str, error: ApiError) -> StoreEvent {
    tracing::warn!(what, %error, "store load failed");
    StoreEvent::LoadFailed {
        what,
        error: error.to_string(),
    }
}

fn write_failed(what: &'static str, error: ApiError) -> StoreEvent {
    tracing::warn!(what, %error, "store write failed");
    StoreEvent::WriteFailed {
        what,
        error: error.to_string(),
    }
}
