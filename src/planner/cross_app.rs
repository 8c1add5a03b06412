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

//! Concerns that span apps: winding down apps that left the target state,
//! the host-scope supervising bridge, and the trailing cleanup of images no
//! service references anymore.

use crate::models::{App, ImageStatus, Network};
use crate::planner::app_planner::teardown_step;
use crate::planner::{Context, Step};

pub fn cross_app_steps(current: &[App], target: &[App], context: &Context) -> Vec<Step> {
    let mut steps = Vec::new();

    if !context.has_supervisor_network {
        steps.push(Step::CreateNetwork {
            target: Network::supervisor_bridge(),
        });
    }

    // In local mode the device is driven by a local workflow; apps and
    // images unknown to the target are left alone.
    if context.local_mode {
        return steps;
    }

    for observed in current {
        let gone = target.iter().all(|declared| declared.app_id() != observed.app_id());
        if gone {
            steps.extend(removal_steps(observed));
        }
    }

    steps.extend(image_cleanup_steps(current, target, context));

    steps
}

/// Winds down an app that is no longer part of the target state: services
/// first, networks and volumes only once no service is left to reference
/// them.
fn removal_steps(app: &App) -> Vec<Step> {
    if !app.services().is_empty() {
        return app.services().iter().map(teardown_step).collect();
    }

    let mut steps = app
        .networks()
        .values()
        .map(|network| Step::RemoveNetwork {
            current: network.clone(),
        })
        .collect::<Vec<_>>();
    steps.extend(app.volumes().values().map(|volume| Step::RemoveVolume {
        current: volume.clone(),
    }));
    steps
}

/// Downloaded images that no service in any app, current or target, still
/// references are removed.
fn image_cleanup_steps(current: &[App], target: &[App], context: &Context) -> Vec<Step> {
    context
        .available_images
        .iter()
        .filter(|image| image.status == ImageStatus::Downloaded)
        .filter(|image| {
            !target
                .iter()
                .chain(current.iter())
                .flat_map(|app| app.services())
                .any(|service| image.matches_service(service))
        })
        .map(|image| Step::RemoveImage {
            image: image.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppId, Image, ImageStatus, ServiceStatus, DEFAULT_NETWORK};
    use std::collections::BTreeMap;

    fn context() -> Context {
        let mut context = Context::default();
        context.has_supervisor_network = true;
        context
    }

    #[test]
    fn should_create_supervisor_bridge_when_missing() {
        let steps = cross_app_steps(&[], &[], &Context::default());

        assert_eq!(steps.len(), 1);
        match &steps[0] {
            Step::CreateNetwork { target } => assert_eq!(target.engine_name(), "supervisor0"),
            step => panic!("expected createNetwork, got {step:?}"),
        }
    }

    #[test]
    fn should_kill_services_of_removed_app_before_resources() {
        let service = crate::svc!(42, "api").observed("c1", ServiceStatus::Running);
        let mut networks = BTreeMap::new();
        networks.insert(
            String::from(DEFAULT_NETWORK),
            Network::default_for_app(AppId::from(42), None),
        );
        let observed = App::current(AppId::from(42), None, vec![service], networks, BTreeMap::new());

        let steps = cross_app_steps(&[observed], &[], &context());

        assert!(steps
            .iter()
            .any(|step| matches!(step, Step::Kill { current } if current.service_name == "api")));
        assert!(!steps
            .iter()
            .any(|step| matches!(step, Step::RemoveNetwork { .. })));
    }

    #[test]
    fn should_remove_resources_of_removed_app_once_services_are_gone() {
        let mut networks = BTreeMap::new();
        networks.insert(
            String::from(DEFAULT_NETWORK),
            Network::default_for_app(AppId::from(42), None),
        );
        let observed =
            App::current(AppId::from(42), None, Vec::new(), networks, BTreeMap::new());

        let steps = cross_app_steps(&[observed], &[], &context());

        assert!(steps
            .iter()
            .any(|step| matches!(step, Step::RemoveNetwork { current } if current.name == DEFAULT_NETWORK)));
    }

    #[test]
    fn should_not_remove_apps_in_local_mode() {
        let service = crate::svc!(42, "api").observed("c1", ServiceStatus::Running);
        let observed = App::current(
            AppId::from(42),
            None,
            vec![service],
            BTreeMap::new(),
            BTreeMap::new(),
        );
        let mut local = context();
        local.local_mode = true;

        assert!(cross_app_steps(&[observed], &[], &local).is_empty());
    }

    #[test]
    fn should_remove_unreferenced_downloaded_images() {
        let mut context = context();
        let mut image = Image::for_service(&crate::svc!(42, "api", image = "acme/api:1")).unwrap();
        image.status = ImageStatus::Downloaded;
        context.available_images.push(image);

        let steps = cross_app_steps(&[], &[], &context);

        assert!(steps
            .iter()
            .any(|step| matches!(step, Step::RemoveImage { image } if image.name == "acme/api:1")));
    }

    #[test]
    fn should_keep_images_referenced_by_any_app() {
        let service = crate::svc!(42, "api", image = "acme/api:1");
        let target = App::target(
            AppId::from(42),
            None,
            vec![service.clone()],
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .unwrap();

        let mut context = context();
        let mut image = Image::for_service(&service).unwrap();
        image.status = ImageStatus::Downloaded;
        context.available_images.push(image);

        assert!(cross_app_steps(&[], &[target], &context).is_empty());
    }

    #[test]
    fn should_not_remove_images_in_local_mode() {
        let mut context = context();
        context.local_mode = true;
        let mut image = Image::for_service(&crate::svc!(42, "api", image = "acme/api:1")).unwrap();
        image.status = ImageStatus::Downloaded;
        context.available_images.push(image);

        assert!(cross_app_steps(&[], &[], &context).is_empty());
    }
}
