//! Tools for running experiments with multiple simulation runs.

use std::fmt::Display;
use std::any::Any;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use dyn_clone::{clone_trait_object, DynClone};
use indexmap::map::IndexMap;
use log::{error, info};
use serde::Serialize;
use threadpool::ThreadPool;

use crate::core::config::SimulationConfig;
use crate::core::error::CloudError;
use crate::simulation::CloudSimulation;

/// Trait for implementing custom callbacks for simulation runs within an experiment.
pub trait SimulationCallbacks: DynClone + Send {
    /// Runs before starting a simulation run, typically adds brokers and submits the workload.
    fn on_simulation_start(&mut self, _sim: &mut CloudSimulation) -> Result<(), CloudError> {
        Ok(())
    }

    /// Runs upon the completion of a simulation run, returns results of this run.
    fn on_simulation_finish(&mut self, _sim: &mut CloudSimulation) -> IndexMap<String, String> {
        IndexMap::new()
    }
}

clone_trait_object!(SimulationCallbacks);

/// Outcome of a single simulation run.
#[derive(Serialize, Clone, Debug)]
pub struct RunResult {
    pub id: usize,
    pub name: String,
    pub config: SimulationConfig,
    pub results: IndexMap<String, String>,
    /// Set if the run was aborted.
    pub error: Option<String>,
}

/// Set of independent simulation runs executed in parallel.
pub struct Experiment {
    runs: Vec<(String, SimulationConfig)>,
    callbacks: Box<dyn SimulationCallbacks>,
}

impl Experiment {
    pub fn new(callbacks: Box<dyn SimulationCallbacks>) -> Self {
        Self {
            runs: Vec::new(),
            callbacks,
        }
    }

    pub fn add_run(&mut self, name: &str, config: SimulationConfig) {
        self.runs.push((name.to_string(), config));
    }

    /// Adds a run per parameter value, each run uses the base config modified by `apply`.
    ///
    /// Runs are named as `param=value`.
    pub fn add_sweep<T, F>(&mut self, base: &SimulationConfig, param: &str, values: &[T], apply: F)
    where
        T: Display,
        F: Fn(&mut SimulationConfig, &T),
    {
        for value in values {
            let mut config = base.clone();
            apply(&mut config, value);
            self.add_run(&format!("{}={}", param, value), config);
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Runs the experiment using the specified number of threads.
    ///
    /// Each run owns its simulation, results are returned in the order of runs.
    /// A run which fails or panics is reported with an error and empty results.
    pub fn run(&self, num_threads: usize) -> Vec<RunResult> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(num_threads.max(1));

        for (run_id, (name, config)) in self.runs.iter().enumerate() {
            let name = name.clone();
            let config = config.clone();
            let mut callbacks = self.callbacks.clone();
            let results = results.clone();

            pool.execute(move || {
                info!("RUN {} ({}) started", run_id, name);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_simulation(config.clone(), &mut callbacks)));
                let (run_results, error) = match outcome {
                    Ok(Ok(run_results)) => (run_results, None),
                    Ok(Err(e)) => {
                        error!("RUN {} ({}) failed: {}", run_id, name, e);
                        (IndexMap::new(), Some(e.to_string()))
                    }
                    Err(payload) => {
                        let message = format!("run panicked: {}", panic_message(&*payload));
                        error!("RUN {} ({}) {}", run_id, name, message);
                        (IndexMap::new(), Some(message))
                    }
                };
                let result = RunResult {
                    id: run_id,
                    name,
                    config,
                    results: run_results,
                    error,
                };
                if let Ok(mut results) = results.lock() {
                    results.push(result);
                }
            });
        }

        pool.join();
        let mut results = match results.lock() {
            Ok(mut results) => std::mem::take(&mut *results),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        results.sort_by_key(|r| r.id);
        results
    }

    /// Saves results of the experiment as JSON.
    pub fn save_results(results: &[RunResult], path: &str) -> Result<(), CloudError> {
        let mut file = File::create(path).map_err(|source| CloudError::Io {
            path: path.to_string(),
            source,
        })?;
        serde_json::to_writer_pretty(&mut file, results)?;
        Ok(())
    }
}

fn run_simulation(
    config: SimulationConfig,
    callbacks: &mut Box<dyn SimulationCallbacks>,
) -> Result<IndexMap<String, String>, CloudError> {
    let mut cloud_sim = CloudSimulation::from_config(config)?;
    callbacks.on_simulation_start(&mut cloud_sim)?;
    cloud_sim.run()?;
    Ok(callbacks.on_simulation_finish(&mut cloud_sim))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown cause"
    }
}
