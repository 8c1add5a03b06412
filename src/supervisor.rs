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

//! The outer reconcile loop: observe, plan, execute, repeat. The planner
//! stays pure; this loop owns the process-wide container-started memo and
//! feeds it back into every planner invocation.

use crate::infrastructure::{Infrastructure, ObservedState};
use crate::planner::{self, Context, Step, StepResource};
use crate::target::TargetStateProvider;
use anyhow::{bail, Result};
use exponential_backoff::Backoff;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ReconcileSettings {
    pub interval: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub backoff_attempts: u32,
    /// Upper bound on planner rounds within one cycle, guarding against an
    /// executor that reports success without observable effect.
    pub max_rounds: u32,
    pub local_mode: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            backoff_attempts: 5,
            max_rounds: 50,
            local_mode: false,
        }
    }
}

/// How one cycle ended: either current state equals target state, or
/// progress is legally blocked on in-flight work.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Convergence {
    Converged,
    Blocked,
}

enum RoundOutcome {
    Converged,
    Blocked,
    Progressed,
}

pub struct Supervisor {
    infrastructure: Box<dyn Infrastructure>,
    targets: Box<dyn TargetStateProvider>,
    settings: ReconcileSettings,
    /// Container ids that were asked to start (or observed running) and have
    /// not stopped since. Read by the planner through the context.
    container_started: BTreeSet<String>,
}

impl Supervisor {
    pub fn new(
        infrastructure: Box<dyn Infrastructure>,
        targets: Box<dyn TargetStateProvider>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            infrastructure,
            targets,
            settings,
            container_started: BTreeSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    async fn run_cycle(&mut self) {
        let backoff = Backoff::new(
            self.settings.backoff_attempts,
            self.settings.backoff_min,
            self.settings.backoff_max,
        );
        for duration in &backoff {
            match self.converge().await {
                Ok(Convergence::Converged) => {
                    log::debug!("In sync with target state.");
                    return;
                }
                Ok(Convergence::Blocked) => {
                    log::debug!("Waiting for in-flight work.");
                    return;
                }
                Err(err) => match duration {
                    Some(duration) => {
                        log::warn!("Reconciliation failed, retrying: {err:#}");
                        tokio::time::sleep(duration).await;
                    }
                    None => {
                        log::error!(
                            "Reconciliation keeps failing, deferring to the next cycle: {err:#}"
                        );
                    }
                },
            }
        }
    }

    /// Drives planner rounds until the fixpoint is reached or progress is
    /// blocked.
    pub async fn converge(&mut self) -> Result<Convergence> {
        for _ in 0..self.settings.max_rounds {
            match self.round().await? {
                RoundOutcome::Converged => return Ok(Convergence::Converged),
                RoundOutcome::Blocked => return Ok(Convergence::Blocked),
                RoundOutcome::Progressed => {}
            }
        }

        log::warn!(
            "No fixpoint after {} rounds, deferring to the next cycle.",
            self.settings.max_rounds
        );
        Ok(Convergence::Blocked)
    }

    async fn round(&mut self) -> Result<RoundOutcome> {
        let observed = self.infrastructure.observed_state().await?;
        self.note_running_containers(&observed);

        let target = self.targets.target_apps().await?;
        let context = self.context_for(&observed);

        let steps = planner::next_steps(&observed.apps, &target, &context);
        if steps.is_empty() {
            return Ok(RoundOutcome::Converged);
        }
        if steps.iter().all(Step::is_noop) {
            return Ok(RoundOutcome::Blocked);
        }

        self.execute_batch(steps).await?;
        Ok(RoundOutcome::Progressed)
    }

    /// A container the engine reports as running counts as started; the
    /// planner uses this to gate `depends_on` siblings.
    fn note_running_containers(&mut self, observed: &ObservedState) {
        for service in observed.apps.iter().flat_map(|app| app.services()) {
            if service.is_running() {
                if let Some(container_id) = &service.container_id {
                    self.container_started.insert(container_id.clone());
                }
            }
        }
    }

    fn context_for(&self, observed: &ObservedState) -> Context {
        let mut container_ids: BTreeMap<_, BTreeMap<String, String>> = BTreeMap::new();
        for app in &observed.apps {
            let entry = container_ids.entry(app.app_id()).or_default();
            for service in app.services() {
                if let Some(container_id) = &service.container_id {
                    entry.insert(service.service_name.clone(), container_id.clone());
                }
            }
        }

        Context {
            local_mode: self.settings.local_mode,
            available_images: observed.images.clone(),
            downloading: observed.downloading.clone(),
            container_ids,
            container_started: self.container_started.clone(),
            has_supervisor_network: observed.has_supervisor_network,
        }
    }

    /// Executes one batch: steps touching the same resource run in order,
    /// disjoint resources run in parallel. Image removals trail the rest of
    /// the batch so that containers release their images first. Individual
    /// failures are logged and retried on a later round; the batch only
    /// fails as a whole when nothing succeeded.
    async fn execute_batch(&mut self, steps: Vec<Step>) -> Result<()> {
        let (cleanup, rest): (Vec<Step>, Vec<Step>) = steps
            .into_iter()
            .partition(|step| matches!(step, Step::RemoveImage { .. }));

        let mut executed = 0usize;
        let mut failed = 0usize;

        for wave in [rest, cleanup] {
            if wave.is_empty() {
                continue;
            }

            let mut groups: Vec<(StepResource, Vec<Step>)> = Vec::new();
            for step in wave {
                let resource = step.resource();
                match groups.iter_mut().find(|(key, _)| *key == resource) {
                    Some((_, group)) => group.push(step),
                    None => groups.push((resource, vec![step])),
                }
            }

            let results = join_all(groups.into_iter().map(|(_, group)| {
                let infrastructure = self.infrastructure.clone();
                async move {
                    let mut outcomes = Vec::new();
                    for step in group {
                        let result = infrastructure.execute(&step).await;
                        match &result {
                            Ok(_) => log::info!(
                                "Executed step {}",
                                serde_json::to_string(&step).unwrap_or_else(|_| step
                                    .action()
                                    .to_string())
                            ),
                            Err(err) => log::error!(
                                "Step {} failed, retrying on a later round: {err:#}",
                                step.action()
                            ),
                        }
                        let failed = result.is_err();
                        outcomes.push(result);
                        if failed {
                            // later steps of this group likely depend on
                            // this one's effect
                            break;
                        }
                    }
                    outcomes
                }
            }))
            .await;

            for result in results.into_iter().flatten() {
                match result {
                    Ok(outcome) => {
                        executed += 1;
                        if let Some(container_id) = outcome.started_container {
                            self.container_started.insert(container_id);
                        }
                        for container_id in outcome.released_containers {
                            self.container_started.remove(&container_id);
                        }
                    }
                    Err(_) => failed += 1,
                }
            }
        }

        if executed == 0 && failed > 0 {
            bail!("every step of the batch failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::DummyInfrastructure;
    use crate::models::{labels, AppId, ServiceStatus};
    use crate::target::StaticTargetState;

    fn supervisor(
        infrastructure: DummyInfrastructure,
        target: Vec<crate::models::App>,
    ) -> Supervisor {
        Supervisor::new(
            Box::new(infrastructure),
            Box::new(StaticTargetState(target)),
            ReconcileSettings::default(),
        )
    }

    fn target_app(app_id: u32, services: Vec<crate::models::Service>) -> crate::models::App {
        crate::models::App::target(
            AppId::from(app_id),
            None,
            services,
            std::collections::BTreeMap::new(),
            std::collections::BTreeMap::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn should_converge_fresh_install_with_dependencies() {
        let main = crate::svc!(1, "main", depends_on = ["dep"]);
        let dep = crate::svc!(1, "dep");
        let infrastructure = DummyInfrastructure::new();
        let mut supervisor = supervisor(infrastructure.clone(), vec![target_app(1, vec![main, dep])]);

        let convergence = supervisor.converge().await.unwrap();

        assert_eq!(convergence, Convergence::Converged);
        let mut names = infrastructure.service_names();
        names.sort();
        assert_eq!(names, vec!["dep", "main"]);

        // A second cycle finds nothing to do.
        assert_eq!(supervisor.converge().await.unwrap(), Convergence::Converged);
    }

    #[tokio::test]
    async fn should_block_while_downloads_are_in_flight() {
        let api = crate::svc!(1, "api");
        let infrastructure = DummyInfrastructure::with_manual_downloads();
        let mut supervisor = supervisor(infrastructure.clone(), vec![target_app(1, vec![api])]);

        assert_eq!(supervisor.converge().await.unwrap(), Convergence::Blocked);
        assert!(infrastructure.service_names().is_empty());

        infrastructure.complete_downloads();

        assert_eq!(supervisor.converge().await.unwrap(), Convergence::Converged);
        assert_eq!(infrastructure.service_names(), vec!["api"]);
    }

    #[tokio::test]
    async fn should_replace_release_and_clean_up_old_image() {
        let old = crate::svc!(1, "main", image = "main-image")
            .observed("c1", ServiceStatus::Running);
        let new = crate::svc!(1, "main", image = "main-image-2").with_release(2, 2);

        let infrastructure = DummyInfrastructure::new();
        infrastructure.seed_service(old);
        infrastructure.seed_network(crate::models::Network::default_for_app(AppId::from(1), None));

        let mut supervisor = supervisor(infrastructure.clone(), vec![target_app(1, vec![new])]);

        assert_eq!(supervisor.converge().await.unwrap(), Convergence::Converged);
        assert_eq!(infrastructure.service_names(), vec!["main"]);
        assert!(!infrastructure
            .image_names()
            .contains(&String::from("main-image")));
        assert!(infrastructure
            .image_names()
            .contains(&String::from("main-image-2")));
    }

    #[tokio::test]
    async fn should_tear_down_apps_removed_from_target() {
        let orphan = crate::svc!(7, "legacy").observed("c9", ServiceStatus::Running);
        let infrastructure = DummyInfrastructure::new();
        infrastructure.seed_service(orphan);

        let mut supervisor = supervisor(infrastructure.clone(), Vec::new());

        assert_eq!(supervisor.converge().await.unwrap(), Convergence::Converged);
        assert!(infrastructure.service_names().is_empty());
    }

    #[tokio::test]
    async fn should_complete_handover_update() {
        let old = crate::svc!(1, "main", image = "main-image")
            .with_label(labels::UPDATE_STRATEGY, "hand-over")
            .observed("c1", ServiceStatus::Running);
        let new = crate::svc!(1, "main", image = "main-image-2")
            .with_release(2, 2)
            .with_label(labels::UPDATE_STRATEGY, "hand-over");

        let infrastructure = DummyInfrastructure::new();
        infrastructure.seed_service(old);
        infrastructure.seed_network(crate::models::Network::default_for_app(AppId::from(1), None));

        let mut supervisor = supervisor(infrastructure.clone(), vec![target_app(1, vec![new])]);

        assert_eq!(supervisor.converge().await.unwrap(), Convergence::Converged);

        // Only the new release is left.
        assert_eq!(infrastructure.service_names(), vec!["main"]);
    }
}
