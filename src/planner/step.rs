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

use crate::models::{AppId, Image, Network, Service, Volume};
use serde::Serialize;

/// The closed set of mutations the planner may ask the executor to perform.
/// A step is a pure value; every variant carries exactly the payload its
/// execution needs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Step {
    Fetch { image: Image },
    RemoveImage { image: Image },
    CreateNetwork { target: Network },
    RemoveNetwork { current: Network },
    CreateVolume { target: Volume },
    RemoveVolume { current: Volume },
    Start { target: Service },
    Stop { current: Service },
    Kill { current: Service },
    Remove { current: Service },
    UpdateMetadata { current: Service, target: Service },
    Handover { current: Service, target: Service },
    Restart { current: Service },
    Noop,
}

impl Step {
    pub fn is_noop(&self) -> bool {
        matches!(self, Step::Noop)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Step::Fetch { .. } => "fetch",
            Step::RemoveImage { .. } => "removeImage",
            Step::CreateNetwork { .. } => "createNetwork",
            Step::RemoveNetwork { .. } => "removeNetwork",
            Step::CreateVolume { .. } => "createVolume",
            Step::RemoveVolume { .. } => "removeVolume",
            Step::Start { .. } => "start",
            Step::Stop { .. } => "stop",
            Step::Kill { .. } => "kill",
            Step::Remove { .. } => "remove",
            Step::UpdateMetadata { .. } => "updateMetadata",
            Step::Handover { .. } => "handover",
            Step::Restart { .. } => "restart",
            Step::Noop => "noop",
        }
    }

    /// The resource a step mutates. The executor serializes steps with equal
    /// keys and may run the rest in parallel.
    pub fn resource(&self) -> StepResource {
        match self {
            Step::Fetch { image } | Step::RemoveImage { image } => {
                StepResource::Image(image.name.clone())
            }
            Step::CreateNetwork { target: network } | Step::RemoveNetwork { current: network } => {
                StepResource::Network(network.app_id, network.name.clone())
            }
            Step::CreateVolume { target: volume } | Step::RemoveVolume { current: volume } => {
                StepResource::Volume(volume.app_id, volume.name.clone())
            }
            Step::Start { target: service }
            | Step::Stop { current: service }
            | Step::Kill { current: service }
            | Step::Remove { current: service }
            | Step::Restart { current: service }
            | Step::UpdateMetadata { current: service, .. }
            | Step::Handover { current: service, .. } => {
                StepResource::Service(service.app_id, service.service_name.clone())
            }
            Step::Noop => StepResource::None,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum StepResource {
    Image(String),
    Network(AppId, String),
    Volume(AppId, String),
    Service(AppId, String),
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppId, Network};
    use assert_json_diff::assert_json_include;

    #[test]
    fn should_serialize_steps_with_action_tag() {
        let step = Step::CreateNetwork {
            target: Network::default_for_app(AppId::from(1013), None),
        };

        assert_json_include!(
            actual: serde_json::to_value(&step).unwrap(),
            expected: serde_json::json!({
                "action": "createNetwork",
                "target": {
                    "appId": 1013,
                    "name": "default",
                }
            })
        );
    }

    #[test]
    fn should_serialize_noop_without_payload() {
        assert_eq!(
            serde_json::to_value(Step::Noop).unwrap(),
            serde_json::json!({ "action": "noop" })
        );
    }

    #[test]
    fn should_key_service_steps_by_service_name() {
        let start = Step::Start {
            target: crate::svc!(1013, "api"),
        };
        let kill = Step::Kill {
            current: crate::svc!(1013, "api"),
        };

        assert_eq!(start.resource(), kill.resource());
        assert_ne!(
            start.resource(),
            Step::Start {
                target: crate::svc!(1013, "worker")
            }
            .resource()
        );
    }
}
