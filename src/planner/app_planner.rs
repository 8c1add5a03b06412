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

//! The per-app diff. Every step it emits is safe in isolation; ordering
//! between dependent steps is achieved by withholding the dependent step
//! until the prior one's effect shows up in current state on a later
//! invocation.

use crate::models::{
    App, Image, ImageStatus, Network, Service, ServiceStatus, UpdateStrategy, DEFAULT_NETWORK,
};
use crate::planner::inventory::ImageInventory;
use crate::planner::{Context, Step};
use std::collections::BTreeMap;

pub fn next_steps_for_app(current: &App, target: &App, context: &Context) -> Vec<Step> {
    let mut steps = volume_steps(current, target);
    steps.extend(network_steps(current, target));
    steps.extend(service_steps(current, target, context));
    steps
}

/// The one teardown action that is legal for a current-state service: a
/// stopping container is left to the engine, a dead one is purged, anything
/// else is killed.
pub fn teardown_step(service: &Service) -> Step {
    match service.status {
        ServiceStatus::Stopping => Step::Noop,
        ServiceStatus::Dead => Step::Remove {
            current: service.clone(),
        },
        _ => Step::Kill {
            current: service.clone(),
        },
    }
}

fn volume_steps(current: &App, target: &App) -> Vec<Step> {
    let mut steps = Vec::new();

    for (name, declared) in target.volumes() {
        match current.volumes().get(name) {
            None => steps.push(Step::CreateVolume {
                target: declared.clone(),
            }),
            Some(observed) if !observed.is_equal_config(declared) => {
                // Recreation: dependents go first, the volume itself only
                // once nothing references it. The create follows on a later
                // round when the volume is gone from current state.
                let dependents = current
                    .services()
                    .iter()
                    .filter(|service| service.references_volume(name))
                    .collect::<Vec<_>>();

                if dependents.is_empty() {
                    steps.push(Step::RemoveVolume {
                        current: observed.clone(),
                    });
                } else {
                    steps.extend(dependents.into_iter().map(teardown_step));
                }
            }
            Some(_) => {}
        }
    }

    // Volumes only present in current state are kept; their removal is a
    // cross-app concern once the whole app is gone.
    steps
}

fn network_steps(current: &App, target: &App) -> Vec<Step> {
    let mut declared_networks: BTreeMap<String, Network> = target.networks().clone();
    if !target.services().is_empty() {
        declared_networks
            .entry(String::from(DEFAULT_NETWORK))
            .or_insert_with(|| {
                Network::default_for_app(target.app_id(), target.app_uuid().cloned())
            });
    }

    let mut steps = Vec::new();
    for (name, declared) in &declared_networks {
        match current.networks().get(name) {
            None => steps.push(Step::CreateNetwork {
                target: declared.clone(),
            }),
            Some(observed) if !observed.is_equal_config(declared) => {
                let dependents = current
                    .services()
                    .iter()
                    .filter(|service| service.references_network(name))
                    .collect::<Vec<_>>();

                if dependents.is_empty() {
                    steps.push(Step::RemoveNetwork {
                        current: observed.clone(),
                    });
                } else {
                    steps.extend(dependents.into_iter().map(teardown_step));
                }
            }
            Some(_) => {}
        }
    }
    steps
}

fn service_steps(current: &App, target: &App, context: &Context) -> Vec<Step> {
    let inventory = ImageInventory::new(context);
    let mut steps = Vec::new();

    for name in target.service_names() {
        let declared = target.services_named(name).next().unwrap();
        let observed = current.services_named(name).collect::<Vec<_>>();

        if observed.is_empty() {
            steps.extend(install_steps(declared, &observed, current, target, context, &inventory));
        } else {
            steps.extend(update_steps(
                &observed, declared, current, target, context, &inventory,
            ));
        }
    }

    for name in current.service_names() {
        if target.services_named(name).next().is_none() {
            steps.extend(current.services_named(name).map(teardown_step));
        }
    }

    steps
}

/// Steps to bring up a target service that has no running counterpart. The
/// preconditions are checked in order; an unmet one yields a wait, never an
/// error.
fn install_steps(
    declared: &Service,
    observed: &[&Service],
    current: &App,
    target: &App,
    context: &Context,
    inventory: &ImageInventory,
) -> Vec<Step> {
    if !inventory.is_available(declared) {
        if inventory.is_downloading(declared) {
            return vec![Step::Noop];
        }
        return match Image::for_service(declared) {
            Ok(image) => vec![Step::Fetch { image }],
            Err(err) => {
                log::warn!("Cannot fetch image for {}: {}", declared.service_name, err);
                Vec::new()
            }
        };
    }

    // A start may already be in flight from a previous round even though the
    // container has not surfaced in current state yet.
    if let Some(container_id) = context.container_id(declared.app_id, &declared.service_name) {
        let belongs_to_observed = observed
            .iter()
            .any(|service| service.container_id.as_deref() == Some(container_id.as_str()));
        if !belongs_to_observed && context.container_started.contains(container_id) {
            return vec![Step::Noop];
        }
    }

    if !resources_ready(declared, current, target) {
        return vec![Step::Noop];
    }

    for dependency in declared.depends_on() {
        if !dependency_started(dependency, current, context) {
            return vec![Step::Noop];
        }
    }

    vec![Step::Start {
        target: declared.clone(),
    }]
}

/// Every network and volume the service mounts must exist in current state
/// and must not be pending recreation.
fn resources_ready(service: &Service, current: &App, target: &App) -> bool {
    let networks_ready = service.referenced_networks().iter().all(|name| {
        match current.networks().get(*name) {
            None => false,
            Some(observed) => target
                .networks()
                .get(*name)
                .map_or(true, |declared| observed.is_equal_config(declared)),
        }
    });

    let volumes_ready = service.referenced_volumes().iter().all(|name| {
        match current.volumes().get(*name) {
            None => false,
            Some(observed) => target
                .volumes()
                .get(*name)
                .map_or(true, |declared| observed.is_equal_config(declared)),
        }
    });

    networks_ready && volumes_ready
}

fn dependency_started(name: &str, current: &App, context: &Context) -> bool {
    current.services_named(name).any(|dependency| {
        dependency.is_running()
            && dependency
                .container_id
                .as_deref()
                .map_or(false, |id| context.container_started.contains(id))
    })
}

fn update_steps(
    observed: &[&Service],
    declared: &Service,
    current: &App,
    target: &App,
    context: &Context,
    inventory: &ImageInventory,
) -> Vec<Step> {
    // Dead containers are purged first; everything else is reconsidered on
    // the next round.
    let purges = observed
        .iter()
        .filter(|service| service.status == ServiceStatus::Dead)
        .map(|service| Step::Remove {
            current: (*service).clone(),
        })
        .collect::<Vec<_>>();
    if !purges.is_empty() {
        return purges;
    }

    let exact = observed
        .iter()
        .copied()
        .find(|service| service.release_id == declared.release_id);
    let stale = observed
        .iter()
        .filter(|service| service.release_id != declared.release_id)
        .copied()
        .collect::<Vec<_>>();

    match exact {
        Some(service) if service
            .config
            .is_equal_except_for_running_and_release(&declared.config) =>
        {
            let mut steps = run_state_steps(service, declared, context);
            steps.extend(stale_release_steps(&stale, declared));
            steps
        }
        Some(service) => strategy_steps(
            &[service],
            declared,
            current,
            target,
            context,
            inventory,
        ),
        None => {
            let newest = observed
                .iter()
                .copied()
                .max_by_key(|service| service.release_id)
                .unwrap();

            if newest
                .config
                .is_equal_except_for_running_and_release(&declared.config)
            {
                vec![Step::UpdateMetadata {
                    current: newest.clone(),
                    target: declared.clone(),
                }]
            } else {
                strategy_steps(&stale, declared, current, target, context, inventory)
            }
        }
    }
}

/// The configs agree; only the running flag may differ.
fn run_state_steps(observed: &Service, declared: &Service, context: &Context) -> Vec<Step> {
    if declared.config.running && !observed.is_running() {
        if observed.status == ServiceStatus::Stopping {
            return vec![Step::Noop];
        }
        if let Some(container_id) = observed.container_id.as_deref() {
            if context.container_started.contains(container_id) {
                return vec![Step::Noop];
            }
        }
        vec![Step::Start {
            target: declared.clone(),
        }]
    } else if !declared.config.running && observed.is_running() {
        vec![Step::Stop {
            current: observed.clone(),
        }]
    } else {
        Vec::new()
    }
}

/// The new release is already up; wind down any predecessors that are still
/// around, completing a hand-over if one is in flight.
fn stale_release_steps(stale: &[&Service], declared: &Service) -> Vec<Step> {
    stale
        .iter()
        .map(|old| {
            if declared.update_strategy() == UpdateStrategy::Handover
                && old.status == ServiceStatus::Running
            {
                Step::Handover {
                    current: (*old).clone(),
                    target: declared.clone(),
                }
            } else {
                teardown_step(old)
            }
        })
        .collect()
}

/// A material config change: the update strategy dictates the order of kill,
/// fetch, and start across the coming rounds.
fn strategy_steps(
    observed: &[&Service],
    declared: &Service,
    current: &App,
    target: &App,
    context: &Context,
    inventory: &ImageInventory,
) -> Vec<Step> {
    match declared.update_strategy() {
        UpdateStrategy::DownloadThenKill => {
            if !inventory.is_available(declared) {
                if inventory.is_downloading(declared) {
                    return vec![Step::Noop];
                }
                return match Image::for_service(declared) {
                    Ok(image) => vec![Step::Fetch { image }],
                    Err(err) => {
                        log::warn!(
                            "Cannot fetch image for {}: {}",
                            declared.service_name,
                            err
                        );
                        Vec::new()
                    }
                };
            }
            observed.iter().copied().map(teardown_step).collect()
        }
        UpdateStrategy::KillThenDownload => {
            observed.iter().copied().map(teardown_step).collect()
        }
        UpdateStrategy::DeleteThenDownload => {
            let mut steps = observed
                .iter()
                .copied()
                .map(teardown_step)
                .collect::<Vec<_>>();
            for old in observed {
                if let Some(image) = context
                    .available_images
                    .iter()
                    .find(|image| {
                        image.status == ImageStatus::Downloaded && image.matches_service(old)
                    })
                {
                    steps.push(Step::RemoveImage {
                        image: image.clone(),
                    });
                }
            }
            steps
        }
        UpdateStrategy::Handover => {
            if !inventory.is_available(declared) {
                if inventory.is_downloading(declared) {
                    return vec![Step::Noop];
                }
                return match Image::for_service(declared) {
                    Ok(image) => vec![Step::Fetch { image }],
                    Err(err) => {
                        log::warn!(
                            "Cannot fetch image for {}: {}",
                            declared.service_name,
                            err
                        );
                        Vec::new()
                    }
                };
            }
            // Bring the new release up next to the old one; the hand-over
            // signal follows once both are visible in current state.
            install_steps(declared, observed, current, target, context, inventory)
        }
    }
}
