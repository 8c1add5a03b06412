/*-
 * ========================LICENSE_START=================================
 * Steward
 * %%
 * Copyright (C) 2024 - 2026 The Steward Authors
 * %%
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
 * THE SOFTWARE.
 * =========================LICENSE_END==================================
 */

//! The target-state provider: a compose-shaped JSON document describing the
//! apps this device should run. Ingest validates the composition and rejects
//! targets the planner could never converge on.

use crate::models::{
    App, AppError, AppId, Network, NetworkConfig, NetworkError, Service, ServiceConfig, Volume,
    VolumeConfig,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[async_trait]
pub trait TargetStateProvider: Send + Sync {
    async fn target_apps(&self) -> Result<Vec<App>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetStateDocument {
    #[serde(default)]
    apps: Vec<TargetAppDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetAppDocument {
    app_id: AppId,
    #[serde(default)]
    app_uuid: Option<String>,
    #[serde(default)]
    services: Vec<TargetServiceDocument>,
    #[serde(default)]
    networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    volumes: BTreeMap<String, VolumeConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetServiceDocument {
    service_name: String,
    service_id: u32,
    image_id: u32,
    release_id: u32,
    #[serde(flatten)]
    config: ServiceConfig,
}

impl TargetAppDocument {
    fn into_app(self) -> Result<App, TargetStateError> {
        let app_id = self.app_id;
        let app_uuid = self.app_uuid;

        let services = self
            .services
            .into_iter()
            .map(|service| {
                Service::from_compose_object(
                    app_id,
                    app_uuid.clone(),
                    service.service_name,
                    service.service_id,
                    service.image_id,
                    service.release_id,
                    service.config,
                )
            })
            .collect();

        let networks = self
            .networks
            .into_iter()
            .map(|(name, config)| {
                Network::from_compose_object(app_id, app_uuid.clone(), name.clone(), config)
                    .map(|network| (name, network))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let volumes = self
            .volumes
            .into_iter()
            .map(|(name, config)| {
                let volume = Volume::from_compose_object(app_id, app_uuid.clone(), name.clone(), config);
                (name, volume)
            })
            .collect();

        Ok(App::target(app_id, app_uuid, services, networks, volumes)?)
    }
}

/// Parses and validates a serialized target-state document.
pub fn parse_target_state(raw: &[u8]) -> Result<Vec<App>, TargetStateError> {
    let document: TargetStateDocument = serde_json::from_slice(raw)?;
    document
        .apps
        .into_iter()
        .map(|app| app.into_app())
        .collect()
}

/// File-backed provider: the persisted target written by the control-plane
/// collaborator is re-read on every reconciliation.
pub struct TargetStateFile {
    path: PathBuf,
}

impl TargetStateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl TargetStateProvider for TargetStateFile {
    async fn target_apps(&self) -> Result<Vec<App>> {
        let raw = tokio::fs::read(&self.path).await?;
        Ok(parse_target_state(&raw)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetStateError {
    #[error("Cannot parse target state: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

#[cfg(test)]
pub struct StaticTargetState(pub Vec<App>);

#[cfg(test)]
#[async_trait]
impl TargetStateProvider for StaticTargetState {
    async fn target_apps(&self) -> Result<Vec<App>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_NETWORK;

    #[test]
    fn should_parse_target_state_document() {
        let raw = serde_json::json!({
            "apps": [{
                "appId": 1013,
                "appUuid": "deadbeef",
                "services": [{
                    "serviceName": "api",
                    "serviceId": 1,
                    "imageId": 7,
                    "releaseId": 21,
                    "image": "registry2.example.org/acme/api:21",
                    "environment": { "LOG_LEVEL": "info" },
                    "volumes": ["data:/var/lib/data"],
                    "dependsOn": []
                }],
                "networks": { "default": {} },
                "volumes": { "data": {} }
            }]
        });

        let apps = parse_target_state(raw.to_string().as_bytes()).unwrap();

        assert_eq!(apps.len(), 1);
        let app = &apps[0];
        assert!(app.is_target());
        assert_eq!(app.app_id(), AppId::from(1013));
        assert_eq!(app.services().len(), 1);
        assert_eq!(app.services()[0].config.image, "registry2.example.org/acme/api:21");
        assert_eq!(app.services()[0].release_id, 21);
        assert!(app.services()[0].config.running);
        assert!(app.networks().contains_key(DEFAULT_NETWORK));
        assert!(app.volumes().contains_key("data"));
    }

    #[test]
    fn should_reject_cyclic_dependencies_at_ingest() {
        let raw = serde_json::json!({
            "apps": [{
                "appId": 1013,
                "services": [
                    {
                        "serviceName": "api",
                        "serviceId": 1,
                        "imageId": 1,
                        "releaseId": 1,
                        "image": "acme/api",
                        "dependsOn": ["worker"]
                    },
                    {
                        "serviceName": "worker",
                        "serviceId": 2,
                        "imageId": 2,
                        "releaseId": 1,
                        "image": "acme/worker",
                        "dependsOn": ["api"]
                    }
                ]
            }]
        });

        let err = parse_target_state(raw.to_string().as_bytes()).unwrap_err();

        assert!(matches!(
            err,
            TargetStateError::App(AppError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn should_reject_invalid_ipam_configuration() {
        let raw = serde_json::json!({
            "apps": [{
                "appId": 1013,
                "networks": {
                    "backend": {
                        "ipam": { "configs": [{ "subnet": "172.20.0.0/16" }] }
                    }
                }
            }]
        });

        let err = parse_target_state(raw.to_string().as_bytes()).unwrap_err();

        assert!(matches!(
            err,
            TargetStateError::Network(NetworkError::InvalidNetworkConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn should_read_target_state_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "apps": [ {{ "appId": 1, "services": [] }} ] }}"#
        )
        .unwrap();

        let provider = TargetStateFile::new(file.path().to_path_buf());
        let apps = provider.target_apps().await.unwrap();

        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].app_id(), AppId::from(1));
    }
}
