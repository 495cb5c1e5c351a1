//! Process lifecycle coordinator
//!
//! Owns the shutdown token, the collaborators and the API service handle,
//! and walks the process through
//! `INITIALIZING → RUNNING → SHUTTING_DOWN → TERMINATED`:
//!
//! 1. load weights (missing file = cold start)
//! 2. bind and start the API service (bind failure is fatal, nothing saved)
//! 3. run the foreground loop for the selected mode
//! 4. request shutdown, persist weights + metrics once, join the service

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use efca_api::{AppState, ServiceExit, ServiceHandle};
use efca_core::{Mode, Phase, RunStatus, SharedProgress, ShutdownToken, seeded_rng};
use efca_platform::{Agent, Environment, MetaAgent, MetaRlToyEnv, MlopsMonitor, Monitor};

use crate::config::Config;
use crate::episode::{self, TrainSettings};

/// Environment, agent and monitor driven by the coordinator.
pub struct Components {
    pub env: Box<dyn Environment>,
    pub agent: Box<dyn Agent>,
    pub monitor: Box<dyn Monitor>,
}

impl Components {
    /// Build the bundled toy environment, linear agent and JSON monitor.
    pub fn from_config(config: &Config) -> Self {
        let seed = config.system.seed;
        let device = config.system.device.resolve();
        log::info!("Using device: {device} (seed {seed})");

        let env = MetaRlToyEnv::new(config.environment.clone(), seeded_rng(seed));
        let agent = MetaAgent::new(
            config.agent.clone(),
            env.obs_dim(),
            env.action_dim(),
            config.weights_path(),
            seeded_rng(seed.wrapping_add(1)),
        );
        let monitor = MlopsMonitor::new(config.metrics_dir());

        Self {
            env: Box::new(env),
            agent: Box::new(agent),
            monitor: Box::new(monitor),
        }
    }
}

/// What happened when loading weights at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsLoad {
    Loaded,
    /// No weights file: start from scratch.
    ColdStart,
    /// File present but unusable; also starts from scratch.
    Failed,
}

pub struct Coordinator {
    config: Config,
    shutdown: ShutdownToken,
    status: Arc<RunStatus>,
    components: Components,
    service: Option<ServiceHandle>,
    progress: SharedProgress,
    persisted: bool,
}

impl Coordinator {
    pub fn new(
        config: Config,
        mode: Mode,
        components: Components,
        shutdown: ShutdownToken,
        progress: SharedProgress,
    ) -> Self {
        let status = Arc::new(RunStatus::new(mode, config.monitoring.history));
        Self {
            config,
            shutdown,
            status,
            components,
            service: None,
            progress,
            persisted: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.status.mode()
    }

    pub fn status(&self) -> Arc<RunStatus> {
        Arc::clone(&self.status)
    }

    /// Token to hand to signal handlers and other threads.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    pub fn service_addr(&self) -> Option<SocketAddr> {
        self.service.as_ref().map(ServiceHandle::addr)
    }

    /// Load agent weights, treating a missing file as a cold start.
    pub fn load_weights(&mut self) -> WeightsLoad {
        match self.components.agent.load_weights() {
            Ok(()) => {
                log::info!("Successfully loaded agent weights");
                WeightsLoad::Loaded
            }
            Err(e) if e.is_not_found() => {
                log::warn!("No saved weights found. Starting from scratch.");
                WeightsLoad::ColdStart
            }
            Err(e) => {
                log::warn!("Could not load weights: {e}");
                WeightsLoad::Failed
            }
        }
    }

    /// Bind the API and serve it on a background thread.
    pub fn start_background_service(&mut self) -> Result<SocketAddr> {
        let app = efca_api::router(AppState {
            status: Arc::clone(&self.status),
            shutdown: self.shutdown.clone(),
        });
        let handle = efca_api::start_background_service(
            &self.config.api.host,
            self.config.api.port,
            app,
            self.shutdown.clone(),
        )?;
        let addr = handle.addr();
        self.service = Some(handle);
        Ok(addr)
    }

    /// Idempotent. Only atomic stores, so it is also what signal handlers do.
    pub fn request_shutdown(&self) {
        if self.shutdown.request() {
            log::info!("Shutdown requested");
        }
        if let Some(service) = &self.service {
            service.request_stop();
        }
    }

    /// Run the loop for the configured mode on the calling thread.
    pub fn run_foreground(&mut self) -> Result<()> {
        match self.mode() {
            Mode::Serve => self.serve(),
            Mode::Train => self.train(),
            Mode::Evaluate => {
                let Components { env, agent, .. } = &mut self.components;
                episode::run_eval_loop(
                    env.as_mut(),
                    agent.as_mut(),
                    &self.shutdown,
                    &self.status,
                    self.config.operational.log_interval,
                );
                Ok(())
            }
        }
    }

    fn serve(&self) -> Result<()> {
        log::info!("Serving API until shutdown is requested");
        let poll = self.config.operational.poll_interval;
        while !self.shutdown.is_requested() {
            if let Some(service) = &self.service {
                if !service.is_running() {
                    anyhow::bail!("API server exited unexpectedly");
                }
            }
            std::thread::sleep(poll);
        }
        Ok(())
    }

    fn train(&mut self) -> Result<()> {
        let op = &self.config.operational;
        let settings = TrainSettings {
            save_interval: op.save_interval,
            save_weights_interval: op.save_weights_interval,
            log_interval: op.log_interval,
            max_episodes: op.max_episodes,
        };
        let pb = self.progress.loop_line("train");
        let Components {
            env,
            agent,
            monitor,
        } = &mut self.components;
        let result = episode::run_training_loop(
            env.as_mut(),
            agent.as_mut(),
            monitor.as_mut(),
            &settings,
            &self.shutdown,
            &self.status,
            &pb,
        );
        pb.finish_and_clear();
        result
            .map(|_| ())
            .context("training loop aborted")
    }

    /// Persist weights and metrics. Runs at most once; failures are logged.
    ///
    /// Returns `true` if this call performed the saves and both succeeded.
    pub fn shutdown_and_persist(&mut self) -> bool {
        if self.persisted {
            return false;
        }
        self.persisted = true;

        log::info!("Saving final state and shutting down...");
        let mut ok = true;
        if let Err(e) = self.components.agent.save_weights() {
            log::warn!("During shutdown, saving weights failed: {e}");
            ok = false;
        }
        if let Err(e) = self.components.monitor.save_metrics() {
            log::warn!("During shutdown, saving metrics failed: {e}");
            ok = false;
        }
        ok
    }

    fn stop_service(&mut self) {
        let Some(service) = self.service.take() else {
            return;
        };
        service.request_stop();
        let timeout = self.config.api.shutdown_timeout;
        match service.join(timeout) {
            ServiceExit::Stopped => log::debug!("API server stopped"),
            ServiceExit::Failed(e) => log::warn!("API server ended with error: {e:#}"),
            ServiceExit::TimedOut => log::warn!(
                "API server did not stop within {}ms, abandoning it",
                timeout.as_millis()
            ),
        }
    }

    /// Full lifecycle. Consumes the coordinator.
    ///
    /// A bind failure is returned before anything runs or is saved. Once
    /// running, every exit path persists state and joins the service; an
    /// unrecoverable foreground error is returned after that teardown.
    pub fn run(mut self) -> Result<()> {
        self.load_weights();

        if let Err(e) = self.start_background_service() {
            self.status.advance(Phase::Terminated);
            return Err(e);
        }

        self.status.advance(Phase::Running);
        log::info!("Running in {} mode", self.mode());
        let result = self.run_foreground();
        if let Err(e) = &result {
            log::error!("Foreground loop failed: {e:#}");
        }

        self.request_shutdown();
        self.status.advance(Phase::ShuttingDown);
        self.shutdown_and_persist();
        self.stop_service();
        self.status.advance(Phase::Terminated);
        log::info!("Shutdown complete.");
        result
    }
}
