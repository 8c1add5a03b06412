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

//! The state reconciliation planner: a pure function from (current state,
//! target state, runtime context) to the next batch of composition steps.
//! It performs no I/O, acquires no locks, and is deterministic for identical
//! inputs; re-running it on unchanged state yields `[]` or `[noop]`.

use crate::models::{App, AppId, Image};
use std::collections::{BTreeMap, BTreeSet};

mod app_planner;
mod cross_app;
mod inventory;
mod step;

pub use inventory::ImageInventory;
pub use step::{Step, StepResource};

/// The runtime view passed into every planner invocation. It is assembled by
/// the outer loop from the image inventory provider and the executor's
/// feedback channel; the planner only reads it.
#[derive(Clone, Debug, Default)]
pub struct Context {
    /// Local workflows drive the device; cloud-driven removals are disabled.
    pub local_mode: bool,
    /// Images currently on disk.
    pub available_images: Vec<Image>,
    /// Image ids whose fetch is in flight.
    pub downloading: BTreeSet<u32>,
    /// Known container ids per app and service name, including containers
    /// that have not surfaced as services in current state yet.
    pub container_ids: BTreeMap<AppId, BTreeMap<String, String>>,
    /// Container ids that have been asked to start (or were observed
    /// running) and have not stopped since. Owned by the outer loop.
    pub container_started: BTreeSet<String>,
    pub has_supervisor_network: bool,
}

impl Context {
    pub fn container_id(&self, app_id: AppId, service_name: &str) -> Option<&String> {
        self.container_ids.get(&app_id)?.get(service_name)
    }
}

/// Computes the next batch of steps that drives current state toward target
/// state. Independent steps within the batch are order-free; dependent steps
/// are withheld until a later invocation observes their preconditions. An
/// empty batch means the fixpoint is reached; a lone `noop` means progress
/// is blocked but legal (e.g. a download is still in flight).
pub fn next_steps(current_apps: &[App], target_apps: &[App], context: &Context) -> Vec<Step> {
    let mut steps = Vec::new();

    for target in target_apps {
        let fallback;
        let observed = match current_apps
            .iter()
            .find(|current| current.app_id() == target.app_id())
        {
            Some(current) => current,
            None => {
                fallback = App::none_observed(target);
                &fallback
            }
        };
        steps.extend(app_planner::next_steps_for_app(observed, target, context));
    }

    steps.extend(cross_app::cross_app_steps(current_apps, target_apps, context));

    collapse(steps, context)
}

/// Deduplicates the batch and folds waiting markers: real steps win, any
/// number of noops collapse into one, and an empty batch stays empty unless
/// something is still downloading.
fn collapse(steps: Vec<Step>, context: &Context) -> Vec<Step> {
    let blocked = steps.iter().any(Step::is_noop);

    let mut batch: Vec<Step> = Vec::new();
    for step in steps {
        if !step.is_noop() && !batch.contains(&step) {
            batch.push(step);
        }
    }

    if batch.is_empty() && (blocked || !context.downloading.is_empty()) {
        return vec![Step::Noop];
    }

    batch
}
