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

use crate::config::{CliArgs, Config};
use crate::infrastructure::DockerInfrastructure;
use crate::supervisor::Supervisor;
use crate::target::TargetStateFile;
use clap::Parser;
use log::error;
use std::process;

mod config;
mod infrastructure;
mod models;
mod planner;
mod supervisor;
mod target;

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = CliArgs::parse();
    let config = match Config::from_figment(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Cannot load config: {e}");
            process::exit(0x0100);
        }
    };

    let infrastructure = match DockerInfrastructure::connect(config.engine_socket()) {
        Ok(infrastructure) => infrastructure,
        Err(e) => {
            error!("Cannot connect to the container engine: {e:#}");
            process::exit(0x0200);
        }
    };

    let targets = TargetStateFile::new(config.target_state_file().clone());

    let mut supervisor = Supervisor::new(
        Box::new(infrastructure),
        Box::new(targets),
        config.reconcile_settings(),
    );

    if let Err(e) = supervisor.run().await {
        error!("Reconcile loop terminated: {e:#}");
        process::exit(0x0300);
    }
}
