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

//! An in-memory engine for tests: it applies every step to a world model the
//! way a well-behaved engine would, so convergence can be exercised without
//! a container runtime.

use crate::infrastructure::{Infrastructure, ObservedState, StepOutcome};
use crate::models::{
    App, AppId, Image, ImageStatus, Network, Service, ServiceStatus, Volume, SUPERVISOR_NETWORK,
};
use crate::planner::Step;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Default)]
struct World {
    services: Vec<Service>,
    networks: BTreeMap<(AppId, String), Network>,
    volumes: BTreeMap<(AppId, String), Volume>,
    images: Vec<Image>,
    downloading: BTreeSet<u32>,
    has_supervisor_network: bool,
    /// When set, fetches stay in flight until `complete_downloads` is
    /// called.
    manual_downloads: bool,
    containers_started: u32,
}

#[derive(Clone)]
pub struct DummyInfrastructure {
    world: Arc<Mutex<World>>,
}

impl DummyInfrastructure {
    pub fn new() -> Self {
        Self {
            world: Arc::new(Mutex::new(World::default())),
        }
    }

    /// Downloads do not finish on their own; tests drive them explicitly.
    pub fn with_manual_downloads() -> Self {
        let infrastructure = Self::new();
        infrastructure.world.lock().unwrap().manual_downloads = true;
        infrastructure
    }

    pub fn seed_service(&self, service: Service) {
        let mut world = self.world.lock().unwrap();
        let image = downloaded_image_for(&service);
        world.images.push(image);
        world.services.push(service);
    }

    pub fn seed_network(&self, network: Network) {
        self.world
            .lock()
            .unwrap()
            .networks
            .insert((network.app_id, network.name.clone()), network);
    }

    pub fn complete_downloads(&self) {
        let mut world = self.world.lock().unwrap();
        let pending = std::mem::take(&mut world.downloading);
        for image_id in pending {
            for image in world.images.iter_mut() {
                if image.image_id == image_id {
                    image.status = ImageStatus::Downloaded;
                    image.docker_image_id = Some(format!("sha256:{image_id:064}"));
                    image.download_progress = None;
                }
            }
        }
    }

    pub fn service_names(&self) -> Vec<String> {
        self.world
            .lock()
            .unwrap()
            .services
            .iter()
            .map(|service| service.service_name.clone())
            .collect()
    }

    pub fn image_names(&self) -> Vec<String> {
        self.world
            .lock()
            .unwrap()
            .images
            .iter()
            .map(|image| image.name.clone())
            .collect()
    }
}

fn downloaded_image_for(service: &Service) -> Image {
    let mut image = Image::for_service(service).expect("fixture service without image");
    image.status = ImageStatus::Downloaded;
    image.docker_image_id = Some(format!("sha256:{:064}", service.image_id));
    image
}

#[async_trait]
impl Infrastructure for DummyInfrastructure {
    async fn observed_state(&self) -> Result<ObservedState> {
        let world = self.world.lock().unwrap();

        let mut app_ids: BTreeSet<AppId> = BTreeSet::new();
        app_ids.extend(world.services.iter().map(|service| service.app_id));
        app_ids.extend(world.networks.keys().map(|(app_id, _)| *app_id));
        app_ids.extend(world.volumes.keys().map(|(app_id, _)| *app_id));

        let apps = app_ids
            .into_iter()
            .map(|app_id| {
                App::current(
                    app_id,
                    None,
                    world
                        .services
                        .iter()
                        .filter(|service| service.app_id == app_id)
                        .cloned()
                        .collect(),
                    world
                        .networks
                        .iter()
                        .filter(|((id, _), _)| *id == app_id)
                        .map(|((_, name), network)| (name.clone(), network.clone()))
                        .collect(),
                    world
                        .volumes
                        .iter()
                        .filter(|((id, _), _)| *id == app_id)
                        .map(|((_, name), volume)| (name.clone(), volume.clone()))
                        .collect(),
                )
            })
            .collect();

        Ok(ObservedState {
            apps,
            images: world.images.clone(),
            downloading: world.downloading.clone(),
            has_supervisor_network: world.has_supervisor_network,
        })
    }

    async fn execute(&self, step: &Step) -> Result<StepOutcome> {
        let mut world = self.world.lock().unwrap();

        match step {
            Step::Fetch { image } => {
                let mut fetched = image.clone();
                if world.manual_downloads {
                    fetched.status = ImageStatus::Downloading;
                    world.downloading.insert(fetched.image_id);
                } else {
                    fetched.status = ImageStatus::Downloaded;
                    fetched.docker_image_id = Some(format!("sha256:{:064}", fetched.image_id));
                }
                world.images.push(fetched);
                Ok(StepOutcome::none())
            }
            Step::RemoveImage { image } => {
                world.images.retain(|candidate| candidate.name != image.name);
                Ok(StepOutcome::none())
            }
            Step::CreateNetwork { target } => {
                if target.name == SUPERVISOR_NETWORK {
                    world.has_supervisor_network = true;
                } else {
                    world
                        .networks
                        .insert((target.app_id, target.name.clone()), target.clone());
                }
                Ok(StepOutcome::none())
            }
            Step::RemoveNetwork { current } => {
                world.networks.remove(&(current.app_id, current.name.clone()));
                Ok(StepOutcome::none())
            }
            Step::CreateVolume { target } => {
                world
                    .volumes
                    .insert((target.app_id, target.name.clone()), target.clone());
                Ok(StepOutcome::none())
            }
            Step::RemoveVolume { current } => {
                world.volumes.remove(&(current.app_id, current.name.clone()));
                Ok(StepOutcome::none())
            }
            Step::Start { target } => {
                world.containers_started += 1;
                let container_id = format!(
                    "{}-{}-{}",
                    target.service_name, target.release_id, world.containers_started
                );

                // A start of an existing stopped container only flips state.
                if let Some(existing) = world.services.iter_mut().find(|service| {
                    service.service_name == target.service_name
                        && service.app_id == target.app_id
                        && service.release_id == target.release_id
                }) {
                    existing.status = ServiceStatus::Running;
                    existing.config.running = true;
                    let container_id = existing.container_id.clone().unwrap();
                    return Ok(StepOutcome::started(container_id));
                }

                let mut started = target.clone();
                started.container_id = Some(container_id.clone());
                started.status = ServiceStatus::Running;
                world.services.push(started);
                Ok(StepOutcome::started(container_id))
            }
            Step::Stop { current } => {
                if let Some(service) = world
                    .services
                    .iter_mut()
                    .find(|service| service.container_id == current.container_id)
                {
                    service.status = ServiceStatus::Stopped;
                    service.config.running = false;
                }
                Ok(StepOutcome::released(
                    current.container_id.iter().cloned().collect(),
                ))
            }
            Step::Kill { current } | Step::Remove { current } => {
                world
                    .services
                    .retain(|service| service.container_id != current.container_id);
                Ok(StepOutcome::released(
                    current.container_id.iter().cloned().collect(),
                ))
            }
            Step::UpdateMetadata { current, target } => {
                if let Some(service) = world
                    .services
                    .iter_mut()
                    .find(|service| service.container_id == current.container_id)
                {
                    service.release_id = target.release_id;
                    service.image_id = target.image_id;
                    service.service_id = target.service_id;
                }
                Ok(StepOutcome::none())
            }
            Step::Handover { current, .. } => {
                if let Some(service) = world
                    .services
                    .iter_mut()
                    .find(|service| service.container_id == current.container_id)
                {
                    service.status = ServiceStatus::Handover;
                }
                Ok(StepOutcome::none())
            }
            Step::Restart { current } => Ok(StepOutcome::started(
                current.container_id.clone().unwrap_or_default(),
            )),
            Step::Noop => Ok(StepOutcome::none()),
        }
    }
}
