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

use crate::models::{App, Image};
use crate::planner::Step;
use anyhow::Result;
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::collections::BTreeSet;

/// A snapshot of the engine's world, shaped the way the planner consumes it.
#[derive(Clone, Debug, Default)]
pub struct ObservedState {
    pub apps: Vec<App>,
    pub images: Vec<Image>,
    /// Image ids whose fetch is in flight.
    pub downloading: BTreeSet<u32>,
    pub has_supervisor_network: bool,
}

/// Feedback one step execution hands back to the outer loop, which owns the
/// process-wide container-started memo.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepOutcome {
    /// A container this step asked the engine to start.
    pub started_container: Option<String>,
    /// Containers this step stopped, killed, or removed; their memo entries
    /// are dropped.
    pub released_containers: Vec<String>,
}

impl StepOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn started(container_id: String) -> Self {
        Self {
            started_container: Some(container_id),
            released_containers: Vec::new(),
        }
    }

    pub fn released(container_ids: Vec<String>) -> Self {
        Self {
            started_container: None,
            released_containers: container_ids,
        }
    }
}

/// The contract between the planner and whoever runs its steps. The planner
/// stays pure; implementations talk to the container engine.
///
/// Implementations must ensure that:
/// - `observed_state` only reports objects owned by this agent (the
///   `io.balena.supervised` label contract),
/// - executing the same step twice is safe once its effect is observable,
/// - steps touching disjoint services, networks, and volumes may run in
///   parallel, steps touching the same resource must be serialized.
#[async_trait]
pub trait Infrastructure: DynClone + Send + Sync {
    async fn observed_state(&self) -> Result<ObservedState>;

    async fn execute(&self, step: &Step) -> Result<StepOutcome>;
}

dyn_clone::clone_trait_object!(Infrastructure);
