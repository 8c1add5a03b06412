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

//! The Docker-compatible engine adapter: it reads the observed world into
//! domain values and executes planner steps through [bollard]. Only objects
//! carrying the supervised label are adopted.

use crate::infrastructure::{Infrastructure, ObservedState, StepOutcome};
use crate::models::{
    labels, App, AppId, Image, ImageStatus, IpamPool, Network, NetworkAttachment, NetworkConfig,
    RestartPolicy, Service, ServiceConfig, ServiceStatus, Volume, VolumeConfig,
    SUPERVISOR_NETWORK,
};
use crate::planner::Step;
use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use bollard::models::{
    ContainerCreateBody, ContainerSummary, ContainerSummaryStateEnum, EndpointSettings, HostConfig,
    Ipam, IpamConfig as EngineIpamConfig, NetworkCreateRequest, NetworkingConfig,
    RestartPolicyNameEnum, VolumeCreateOptions,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    ListImagesOptions, ListNetworksOptions, ListVolumesOptions, RemoveContainerOptions,
    RemoveImageOptions, RemoveVolumeOptions, RenameContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures::StreamExt;
use multimap::MultiMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Environment variables the engine injects into every container; they are
/// not part of the declared configuration and must not register as a config
/// change.
const INJECTED_ENV: [&str; 4] = ["PATH", "HOSTNAME", "HOME", "TERM"];

#[derive(Clone)]
pub struct DockerInfrastructure {
    docker: Docker,
    /// Image ids with a pull in flight.
    downloads: Arc<Mutex<BTreeSet<u32>>>,
    /// Containers that received the hand-over signal. The engine has no
    /// state for this, so the adapter tracks it for the lifetime of the
    /// process.
    handed_over: Arc<Mutex<HashSet<String>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DockerInfrastructureError {
    #[error("The container {container_id} does not provide a label for the service name.")]
    MissingServiceNameLabel { container_id: String },
    #[error("The container {container_id} does not provide a label for the app id.")]
    MissingAppIdLabel { container_id: String },
    #[error("The container {container_id} has no id.")]
    MissingContainerId { container_id: String },
}

impl DockerInfrastructure {
    pub fn connect(socket: &Path) -> Result<Self> {
        let socket = socket
            .to_str()
            .with_context(|| format!("engine socket path {socket:?} is not valid UTF-8"))?;
        let docker = Docker::connect_with_unix(socket, 120, bollard::API_DEFAULT_VERSION)
            .with_context(|| format!("cannot connect to container engine at {socket}"))?;

        Ok(Self {
            docker,
            downloads: Arc::new(Mutex::new(BTreeSet::new())),
            handed_over: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    async fn supervised_containers(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .filter(|container| {
                container
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(labels::SUPERVISED))
                    .map(|value| value == "true")
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn service_from_container(&self, summary: ContainerSummary) -> Result<Service> {
        let container_id = summary
            .id
            .clone()
            .ok_or(DockerInfrastructureError::MissingContainerId {
                container_id: String::from("<unknown>"),
            })?;
        let container_labels: BTreeMap<String, String> = summary
            .labels
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let app_id = container_labels
            .get(labels::APP_ID)
            .ok_or_else(|| DockerInfrastructureError::MissingAppIdLabel {
                container_id: container_id.clone(),
            })?
            .parse::<AppId>()?;
        let service_name = container_labels
            .get(labels::SERVICE_NAME)
            .ok_or_else(|| DockerInfrastructureError::MissingServiceNameLabel {
                container_id: container_id.clone(),
            })?
            .clone();

        let engine_name = summary
            .names
            .as_ref()
            .and_then(|names| names.first())
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default();
        let name_parts = parse_container_name(&engine_name);

        let numeric_label = |key: &str| {
            container_labels
                .get(key)
                .and_then(|value| value.parse::<u32>().ok())
        };
        let (image_id, release_id) = match name_parts {
            Some((_, image_id, release_id)) => (image_id, release_id),
            None => (
                numeric_label(labels::IMAGE_ID).unwrap_or_default(),
                numeric_label(labels::RELEASE_ID).unwrap_or_default(),
            ),
        };

        let details = self
            .docker
            .inspect_container(&container_id, None::<InspectContainerOptions>)
            .await?;
        let container_config = details.config.unwrap_or_default();
        let host_config = details.host_config.unwrap_or_default();

        let status = if self.handed_over.lock().unwrap().contains(&container_id) {
            ServiceStatus::Handover
        } else {
            summary
                .state
                .map(service_status)
                .unwrap_or(ServiceStatus::Installed)
        };

        let environment = container_config
            .env
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .filter(|(key, _)| !INJECTED_ENV.contains(key))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        let volumes = host_config
            .binds
            .unwrap_or_default()
            .iter()
            .map(|bind| unscope_bind(app_id, bind))
            .collect();

        let networks = details
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(engine_name, endpoint)| {
                let (network_app_id, name) = crate::models::parse_scoped_name(&engine_name)?;
                if network_app_id != app_id {
                    return None;
                }
                let aliases = endpoint
                    .aliases
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|alias| !container_id.starts_with(alias.as_str()))
                    .filter(|alias| alias != &service_name)
                    .collect();
                Some((name, NetworkAttachment { aliases }))
            })
            .collect();

        let depends_on = container_labels
            .get(labels::DEPENDS_ON)
            .map(|value| {
                value
                    .split(',')
                    .filter(|entry| !entry.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let restart = host_config
            .restart_policy
            .and_then(|policy| policy.name)
            .map(restart_policy)
            .unwrap_or_default();

        Ok(Service {
            app_id,
            app_uuid: container_labels.get(labels::APP_UUID).cloned(),
            service_id: numeric_label(labels::SERVICE_ID).unwrap_or_default(),
            service_name: service_name.clone(),
            release_id,
            image_id,
            container_id: Some(container_id),
            status,
            created_at: summary
                .created
                .and_then(|seconds| chrono::DateTime::from_timestamp(seconds, 0)),
            config: ServiceConfig {
                image: container_config.image.or(summary.image).unwrap_or_default(),
                running: status == ServiceStatus::Running,
                privileged: host_config.privileged.unwrap_or(false),
                environment,
                labels: container_labels,
                volumes,
                networks,
                depends_on,
                command: container_config.cmd,
                restart,
            },
        })
    }

    /// Looks up the engine container of a service release, whatever state it
    /// is in.
    async fn find_container(&self, service: &Service) -> Result<Option<String>> {
        for summary in self.supervised_containers().await? {
            let container_labels = summary.labels.unwrap_or_default();
            let matches = container_labels.get(labels::APP_ID).map(String::as_str)
                == Some(service.app_id.to_string().as_str())
                && container_labels.get(labels::SERVICE_NAME).map(String::as_str)
                    == Some(service.service_name.as_str())
                && container_labels.get(labels::RELEASE_ID).map(String::as_str)
                    == Some(service.release_id.to_string().as_str());
            if matches {
                return Ok(summary.id);
            }
        }
        Ok(None)
    }

    async fn fetch_image(&self, image: &Image) -> Result<StepOutcome> {
        self.downloads.lock().unwrap().insert(image.image_id);

        let result = async {
            let mut pull = self.docker.create_image(
                Some(CreateImageOptions {
                    from_image: Some(image.name.clone()),
                    ..Default::default()
                }),
                None,
                None,
            );

            while let Some(info) = pull.next().await {
                let info = info?;
                if let Some(progress) = info.progress {
                    log::trace!("Pulling {}: {}", image.name, progress);
                }
            }
            anyhow::Ok(())
        }
        .await;

        self.downloads.lock().unwrap().remove(&image.image_id);
        result.with_context(|| format!("cannot pull image {}", image.name))?;

        log::debug!("Pulled image {}.", image.name);
        Ok(StepOutcome::none())
    }

    async fn start_service(&self, target: &Service) -> Result<StepOutcome> {
        // A container of this release may already exist in a stopped state;
        // it is simply started again.
        if let Some(existing) = self.find_container(target).await? {
            self.docker
                .start_container(&existing, None::<StartContainerOptions>)
                .await?;
            log::info!(
                "Started existing container {existing} for {}.",
                target.service_name
            );
            return Ok(StepOutcome::started(existing));
        }

        let name = container_name(target);
        let body = create_body(target);

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(name.clone()),
                    ..Default::default()
                }),
                body,
            )
            .await
            .with_context(|| format!("cannot create container {name}"))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
            .with_context(|| format!("cannot start container {name}"))?;

        log::info!(
            "Started container {name} for {} of app {}.",
            target.service_name,
            target.app_id
        );
        Ok(StepOutcome::started(created.id))
    }

    async fn destroy_container(&self, service: &Service) -> Result<StepOutcome> {
        let Some(container_id) = service.container_id.as_deref() else {
            return Ok(StepOutcome::none());
        };

        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .with_context(|| format!("cannot remove container {container_id}"))?;

        self.handed_over.lock().unwrap().remove(container_id);
        Ok(StepOutcome::released(vec![container_id.to_string()]))
    }

    /// Signals the old release and waits out the configured overlap. If the
    /// old container is still running afterwards it is left for the
    /// follow-up kill; the new container is kept either way.
    async fn handover(&self, current: &Service, target: &Service) -> Result<StepOutcome> {
        let Some(container_id) = current.container_id.as_deref() else {
            return Ok(StepOutcome::none());
        };

        self.handed_over
            .lock()
            .unwrap()
            .insert(container_id.to_string());

        let mut exited = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions>);
        match tokio::time::timeout(target.handover_timeout(), exited.next()).await {
            Ok(_) => log::debug!("Container {container_id} handed over."),
            Err(_) => log::warn!(
                "Container {container_id} did not stop within the hand-over timeout; it will be killed."
            ),
        }

        Ok(StepOutcome::none())
    }
}

#[async_trait]
impl Infrastructure for DockerInfrastructure {
    async fn observed_state(&self) -> Result<ObservedState> {
        let mut services: MultiMap<AppId, Service> = MultiMap::new();
        for summary in self.supervised_containers().await? {
            match self.service_from_container(summary).await {
                Ok(service) => services.insert(service.app_id, service),
                Err(err) => log::warn!("Ignoring container: {err}"),
            }
        }

        let mut networks: MultiMap<AppId, Network> = MultiMap::new();
        let mut has_supervisor_network = false;
        for network in self
            .docker
            .list_networks(None::<ListNetworksOptions>)
            .await?
        {
            let Some(engine_name) = network.name.clone() else {
                continue;
            };
            if engine_name == SUPERVISOR_NETWORK {
                has_supervisor_network = true;
                continue;
            }
            let network_labels: BTreeMap<String, String> = network
                .labels
                .clone()
                .unwrap_or_default()
                .into_iter()
                .collect();
            if network_labels.get(labels::SUPERVISED).map(String::as_str) != Some("true") {
                continue;
            }
            let Some((app_id, name)) = crate::models::parse_scoped_name(&engine_name) else {
                log::warn!("Ignoring supervised network with unparsable name {engine_name:?}.");
                continue;
            };

            networks.insert(
                app_id,
                Network {
                    app_id,
                    app_uuid: network_labels.get(labels::APP_UUID).cloned(),
                    name,
                    config: NetworkConfig {
                        driver: network.driver.unwrap_or_else(|| String::from("bridge")),
                        ipam: network
                            .ipam
                            .map(|ipam| crate::models::IpamConfig {
                                driver: ipam.driver,
                                configs: ipam
                                    .config
                                    .unwrap_or_default()
                                    .into_iter()
                                    .map(|pool| IpamPool {
                                        subnet: pool.subnet,
                                        gateway: pool.gateway,
                                        ip_range: pool.ip_range,
                                        aux_addresses: pool
                                            .auxiliary_addresses
                                            .unwrap_or_default()
                                            .into_iter()
                                            .collect(),
                                    })
                                    .collect(),
                                options: ipam.options.unwrap_or_default().into_iter().collect(),
                            })
                            .unwrap_or_default(),
                        enable_ipv6: network.enable_ipv6.unwrap_or(false),
                        internal: network.internal.unwrap_or(false),
                        labels: network_labels,
                        options: network.options.unwrap_or_default().into_iter().collect(),
                    },
                },
            );
        }

        let mut volumes: MultiMap<AppId, Volume> = MultiMap::new();
        for volume in self
            .docker
            .list_volumes(None::<ListVolumesOptions>)
            .await?
            .volumes
            .unwrap_or_default()
        {
            let volume_labels: BTreeMap<String, String> =
                volume.labels.clone().into_iter().collect();
            if volume_labels.get(labels::SUPERVISED).map(String::as_str) != Some("true") {
                continue;
            }
            let Some((app_id, name)) = crate::models::parse_scoped_name(&volume.name) else {
                log::warn!(
                    "Ignoring supervised volume with unparsable name {:?}.",
                    volume.name
                );
                continue;
            };

            volumes.insert(
                app_id,
                Volume {
                    app_id,
                    app_uuid: volume_labels.get(labels::APP_UUID).cloned(),
                    name,
                    config: VolumeConfig {
                        driver: volume.driver,
                        driver_opts: volume.options.into_iter().collect(),
                        labels: volume_labels,
                    },
                },
            );
        }

        let mut app_ids: BTreeSet<AppId> = BTreeSet::new();
        app_ids.extend(services.keys());
        app_ids.extend(networks.keys());
        app_ids.extend(volumes.keys());

        let apps = app_ids
            .into_iter()
            .map(|app_id| {
                let app_services = services.remove(&app_id).unwrap_or_default();
                let app_uuid = app_services
                    .iter()
                    .find_map(|service| service.app_uuid.clone());
                App::current(
                    app_id,
                    app_uuid,
                    app_services,
                    networks
                        .remove(&app_id)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|network| (network.name.clone(), network))
                        .collect(),
                    volumes
                        .remove(&app_id)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|volume| (volume.name.clone(), volume))
                        .collect(),
                )
            })
            .collect();

        let mut images = Vec::new();
        for image in self
            .docker
            .list_images(None::<ListImagesOptions>)
            .await?
        {
            let mut names = image.repo_tags.clone();
            if names.is_empty() {
                names.push(image.id.clone());
            }
            for name in names {
                images.push(Image {
                    image_id: 0,
                    app_id: AppId::HOST,
                    service_id: 0,
                    service_name: String::new(),
                    release_id: 0,
                    name,
                    docker_image_id: Some(image.id.clone()),
                    status: ImageStatus::Downloaded,
                    download_progress: None,
                });
            }
        }

        Ok(ObservedState {
            apps,
            images,
            downloading: self.downloads.lock().unwrap().clone(),
            has_supervisor_network,
        })
    }

    async fn execute(&self, step: &Step) -> Result<StepOutcome> {
        match step {
            Step::Fetch { image } => self.fetch_image(image).await,
            Step::RemoveImage { image } => {
                self.docker
                    .remove_image(&image.name, None::<RemoveImageOptions>, None)
                    .await
                    .with_context(|| format!("cannot remove image {}", image.name))?;
                Ok(StepOutcome::none())
            }
            Step::CreateNetwork { target } => {
                self.docker
                    .create_network(NetworkCreateRequest {
                        name: target.engine_name(),
                        driver: Some(target.config.driver.clone()),
                        internal: Some(target.config.internal),
                        enable_ipv6: Some(target.config.enable_ipv6),
                        ipam: Some(Ipam {
                            driver: target.config.ipam.driver.clone(),
                            config: Some(
                                target
                                    .config
                                    .ipam
                                    .configs
                                    .iter()
                                    .map(|pool| EngineIpamConfig {
                                        subnet: pool.subnet.clone(),
                                        gateway: pool.gateway.clone(),
                                        ip_range: pool.ip_range.clone(),
                                        auxiliary_addresses: Some(
                                            pool.aux_addresses.clone().into_iter().collect(),
                                        ),
                                    })
                                    .collect(),
                            ),
                            options: Some(
                                target.config.ipam.options.clone().into_iter().collect(),
                            ),
                        }),
                        options: Some(target.config.options.clone().into_iter().collect()),
                        labels: Some(target.engine_labels().into_iter().collect()),
                        ..Default::default()
                    })
                    .await
                    .with_context(|| {
                        format!("cannot create network {}", target.engine_name())
                    })?;
                Ok(StepOutcome::none())
            }
            Step::RemoveNetwork { current } => {
                self.docker
                    .remove_network(&current.engine_name())
                    .await
                    .with_context(|| {
                        format!("cannot remove network {}", current.engine_name())
                    })?;
                Ok(StepOutcome::none())
            }
            Step::CreateVolume { target } => {
                self.docker
                    .create_volume(VolumeCreateOptions {
                        name: Some(target.engine_name()),
                        driver: Some(target.config.driver.clone()),
                        driver_opts: Some(
                            target.config.driver_opts.clone().into_iter().collect(),
                        ),
                        labels: Some(target.engine_labels().into_iter().collect()),
                        ..Default::default()
                    })
                    .await
                    .with_context(|| format!("cannot create volume {}", target.engine_name()))?;
                Ok(StepOutcome::none())
            }
            Step::RemoveVolume { current } => {
                self.docker
                    .remove_volume(&current.engine_name(), None::<RemoveVolumeOptions>)
                    .await
                    .with_context(|| format!("cannot remove volume {}", current.engine_name()))?;
                Ok(StepOutcome::none())
            }
            Step::Start { target } => self.start_service(target).await,
            Step::Stop { current } => {
                let Some(container_id) = current.container_id.as_deref() else {
                    return Ok(StepOutcome::none());
                };
                self.docker
                    .stop_container(
                        container_id,
                        Some(StopContainerOptions {
                            t: Some(10),
                            ..Default::default()
                        }),
                    )
                    .await
                    .with_context(|| format!("cannot stop container {container_id}"))?;
                Ok(StepOutcome::released(vec![container_id.to_string()]))
            }
            Step::Kill { current } | Step::Remove { current } => {
                self.destroy_container(current).await
            }
            Step::UpdateMetadata { current, target } => {
                let Some(container_id) = current.container_id.as_deref() else {
                    return Ok(StepOutcome::none());
                };
                self.docker
                    .rename_container(
                        container_id,
                        RenameContainerOptions {
                            name: container_name(target),
                        },
                    )
                    .await
                    .with_context(|| format!("cannot rename container {container_id}"))?;
                Ok(StepOutcome::none())
            }
            Step::Handover { current, target } => self.handover(current, target).await,
            Step::Restart { current } => {
                let Some(container_id) = current.container_id.as_deref() else {
                    return Ok(StepOutcome::none());
                };
                self.docker
                    .restart_container(container_id, None::<RestartContainerOptions>)
                    .await
                    .with_context(|| format!("cannot restart container {container_id}"))?;
                Ok(StepOutcome::started(container_id.to_string()))
            }
            Step::Noop => Ok(StepOutcome::none()),
        }
    }
}

fn service_status(state: ContainerSummaryStateEnum) -> ServiceStatus {
    match state {
        ContainerSummaryStateEnum::EMPTY | ContainerSummaryStateEnum::CREATED => {
            ServiceStatus::Installed
        }
        ContainerSummaryStateEnum::RUNNING
        | ContainerSummaryStateEnum::RESTARTING
        | ContainerSummaryStateEnum::PAUSED => ServiceStatus::Running,
        ContainerSummaryStateEnum::REMOVING => ServiceStatus::Stopping,
        ContainerSummaryStateEnum::EXITED => ServiceStatus::Stopped,
        ContainerSummaryStateEnum::DEAD => ServiceStatus::Dead,
    }
}

fn restart_policy(name: RestartPolicyNameEnum) -> RestartPolicy {
    match name {
        RestartPolicyNameEnum::EMPTY | RestartPolicyNameEnum::NO => RestartPolicy::No,
        RestartPolicyNameEnum::ALWAYS => RestartPolicy::Always,
        RestartPolicyNameEnum::ON_FAILURE => RestartPolicy::OnFailure,
        RestartPolicyNameEnum::UNLESS_STOPPED => RestartPolicy::UnlessStopped,
    }
}

fn engine_restart_policy(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

/// `<serviceName>_<imageId>_<releaseId>_<uuid>`
fn container_name(service: &Service) -> String {
    format!(
        "{}_{}_{}_{}",
        service.service_name,
        service.image_id,
        service.release_id,
        Uuid::new_v4().simple()
    )
}

/// Splits a container name back into (service name, image id, release id).
/// Service names may contain underscores, so the name is parsed from the
/// right.
fn parse_container_name(name: &str) -> Option<(String, u32, u32)> {
    let mut parts = name.rsplitn(4, '_');
    let _uuid = parts.next()?;
    let release_id = parts.next()?.parse::<u32>().ok()?;
    let image_id = parts.next()?.parse::<u32>().ok()?;
    let service_name = parts.next()?;
    if service_name.is_empty() {
        return None;
    }
    Some((service_name.to_string(), image_id, release_id))
}

/// Named volumes are bound with their app-scoped engine name; the scope is
/// stripped again when reading state back.
fn scope_bind(app_id: AppId, bind: &str) -> String {
    match bind.split_once(':') {
        Some((source, rest))
            if !source.is_empty() && !source.starts_with('/') && !source.starts_with('.') =>
        {
            format!("{app_id}_{source}:{rest}")
        }
        _ => bind.to_string(),
    }
}

fn unscope_bind(app_id: AppId, bind: &str) -> String {
    match bind.split_once(':') {
        Some((source, rest)) => match crate::models::parse_scoped_name(source) {
            Some((bind_app_id, name)) if bind_app_id == app_id => format!("{name}:{rest}"),
            _ => bind.to_string(),
        },
        None => bind.to_string(),
    }
}

fn create_body(target: &Service) -> ContainerCreateBody {
    let mut container_labels: HashMap<String, String> =
        target.config.labels.clone().into_iter().collect();
    container_labels.insert(String::from(labels::SUPERVISED), String::from("true"));
    container_labels.insert(String::from(labels::APP_ID), target.app_id.to_string());
    container_labels.insert(
        String::from(labels::SERVICE_NAME),
        target.service_name.clone(),
    );
    container_labels.insert(
        String::from(labels::SERVICE_ID),
        target.service_id.to_string(),
    );
    container_labels.insert(
        String::from(labels::RELEASE_ID),
        target.release_id.to_string(),
    );
    container_labels.insert(String::from(labels::IMAGE_ID), target.image_id.to_string());
    if let Some(app_uuid) = &target.app_uuid {
        container_labels.insert(String::from(labels::APP_UUID), app_uuid.clone());
    }
    if !target.config.depends_on.is_empty() {
        container_labels.insert(
            String::from(labels::DEPENDS_ON),
            target.config.depends_on.join(","),
        );
    }

    let env = target
        .config
        .environment
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();

    let binds = target
        .config
        .volumes
        .iter()
        .map(|bind| scope_bind(target.app_id, bind))
        .collect::<Vec<_>>();

    let endpoints = target
        .referenced_networks()
        .into_iter()
        .map(|name| {
            (
                format!("{}_{}", target.app_id, name),
                EndpointSettings {
                    aliases: Some(vec![target.service_name.clone()]),
                    ..Default::default()
                },
            )
        })
        .collect::<HashMap<_, _>>();

    ContainerCreateBody {
        image: Some(target.config.image.clone()),
        env: Some(env),
        cmd: target.config.command.clone(),
        labels: Some(container_labels),
        host_config: Some(HostConfig {
            binds: Some(binds),
            privileged: Some(target.config.privileged),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(engine_restart_policy(target.config.restart)),
                maximum_retry_count: None,
            }),
            ..Default::default()
        }),
        networking_config: Some(NetworkingConfig {
            endpoints_config: Some(endpoints),
        }),
        ..Default::default()
    }
}
