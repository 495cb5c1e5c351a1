//! Lifecycle tests for the coordinator
//!
//! Scripted environment/agent/monitor stubs record every reset and save into
//! a shared event log so the order of persistence can be asserted.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use efca_core::{EpisodeError, Mode, Phase, ProgressContext, RunStatus, ShutdownToken};
use efca_platform::{
    Agent, CheckpointError, Environment, Experience, METRICS_FILE, Monitor, Observation, Transition,
    read_metrics,
};
use efca_runtime::{Components, Config, Coordinator, RawConfig, WeightsLoad};
use tempfile::TempDir;

type Events = Arc<Mutex<Vec<&'static str>>>;

fn events_of(events: &Events) -> Vec<&'static str> {
    events.lock().unwrap().clone()
}

#[derive(Default)]
struct ScriptedEnv {
    events: Events,
    len: u64,
    t: u64,
    episode: u64,
    step_delay: Option<Duration>,
    request_shutdown_on_reset: Option<(u64, ShutdownToken)>,
    step_error_on: Option<u64>,
    interrupt_on: Option<u64>,
    wide_obs_on: Option<u64>,
}

impl Environment for ScriptedEnv {
    fn obs_dim(&self) -> usize {
        1
    }

    fn action_dim(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Observation, EpisodeError> {
        self.episode += 1;
        self.t = 0;
        self.events.lock().unwrap().push("reset");
        if let Some((n, token)) = &self.request_shutdown_on_reset {
            if *n == self.episode {
                token.request();
            }
        }
        if self.step_error_on == Some(self.episode) {
            return Err(EpisodeError::step("simulator hiccup"));
        }
        if self.interrupt_on == Some(self.episode) {
            return Err(EpisodeError::Interrupted);
        }
        if self.wide_obs_on == Some(self.episode) {
            return Ok(vec![0.0, 0.0]);
        }
        Ok(vec![0.0])
    }

    fn step(&mut self, _action: usize) -> Result<Transition, EpisodeError> {
        if let Some(d) = self.step_delay {
            std::thread::sleep(d);
        }
        self.t += 1;
        Ok(Transition {
            observation: vec![self.t as f64],
            reward: 0.5,
            done: self.t >= self.len,
        })
    }
}

struct ScriptedAgent {
    events: Events,
    weights: PathBuf,
}

impl Agent for ScriptedAgent {
    fn act(&mut self, _obs: &[f64], _deterministic: bool) -> Result<usize, EpisodeError> {
        Ok(1)
    }

    fn learn(&mut self, _exp: &Experience<'_>) -> Result<(), EpisodeError> {
        self.events.lock().unwrap().push("learn");
        Ok(())
    }

    fn save_weights(&self) -> Result<(), CheckpointError> {
        self.events.lock().unwrap().push("save_weights");
        Ok(())
    }

    fn load_weights(&mut self) -> Result<(), CheckpointError> {
        self.events.lock().unwrap().push("load_weights");
        Err(CheckpointError::NotFound(self.weights.clone()))
    }
}

struct ScriptedMonitor {
    events: Events,
}

impl Monitor for ScriptedMonitor {
    fn log_metric(&mut self, _name: &str, _value: f64, _step: u64) {}

    fn save_metrics(&mut self) -> Result<(), CheckpointError> {
        self.events.lock().unwrap().push("save_metrics");
        Ok(())
    }
}

fn config_toml(dir: &Path, port: u16, operational_extra: &str) -> String {
    format!(
        r#"
[operational]
log_level = "DEBUG"
checkpoint_dir = "{dir}"
poll_interval_ms = 20
{operational_extra}

[system]
seed = 7
device = "cpu"

[api]
host = "127.0.0.1"
port = {port}
shutdown_timeout_ms = 2000

[environment]
max_steps = 10

[monitoring]
"#,
        dir = dir.display()
    )
}

fn config(dir: &Path, port: u16, operational_extra: &str) -> Config {
    RawConfig::from_toml_str(&config_toml(dir, port, operational_extra))
        .unwrap()
        .validate()
        .unwrap()
}

/// Stub components sharing `events`. `tweak` adjusts the environment script.
fn scripted(events: &Events, tweak: impl FnOnce(&mut ScriptedEnv)) -> Components {
    let mut env = ScriptedEnv {
        events: Arc::clone(events),
        len: 3,
        ..Default::default()
    };
    tweak(&mut env);
    Components {
        env: Box::new(env),
        agent: Box::new(ScriptedAgent {
            events: Arc::clone(events),
            weights: PathBuf::from("missing.json"),
        }),
        monitor: Box::new(ScriptedMonitor {
            events: Arc::clone(events),
        }),
    }
}

fn coordinator(config: Config, mode: Mode, components: Components, token: ShutdownToken) -> Coordinator {
    Coordinator::new(
        config,
        mode,
        components,
        token,
        Arc::new(ProgressContext::with_tty(false)),
    )
}

fn resets(events: &[&str]) -> usize {
    events.iter().filter(|e| **e == "reset").count()
}

fn free_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < timeout, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn train_checkpoints_on_interval_and_once_at_exit() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "save_interval = 2\nmax_episodes = 5");
    let coord = coordinator(cfg, Mode::Train, scripted(&events, |_| {}), ShutdownToken::new());
    let status = coord.status();

    coord.run().unwrap();

    let saves: Vec<_> = events_of(&events)
        .into_iter()
        .filter(|e| *e != "learn")
        .collect();
    assert_eq!(
        saves,
        vec![
            "load_weights",
            "reset",
            "reset",
            "save_weights",
            "save_metrics",
            "reset",
            "reset",
            "save_weights",
            "save_metrics",
            "reset",
            "save_weights",
            "save_metrics",
        ]
    );
    assert_eq!(status.episodes(), 5);
    assert_eq!(status.phase(), Phase::Terminated);
}

#[test]
fn separate_weights_interval() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(
        dir.path(),
        0,
        "save_interval = 4\nsave_weights_interval = 3\nmax_episodes = 4",
    );
    let coord = coordinator(cfg, Mode::Train, scripted(&events, |_| {}), ShutdownToken::new());
    coord.run().unwrap();

    let saves: Vec<_> = events_of(&events)
        .into_iter()
        .filter(|e| e.starts_with("save"))
        .collect();
    // episode 3 → weights, episode 4 → metrics, then the final pair
    assert_eq!(
        saves,
        vec!["save_weights", "save_metrics", "save_weights", "save_metrics"]
    );
}

#[test]
fn shutdown_during_reset_finishes_that_episode_only() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let token = ShutdownToken::new();
    let cfg = config(dir.path(), 0, "save_interval = 10");
    let trip = token.clone();
    let components = scripted(&events, move |env| {
        env.request_shutdown_on_reset = Some((3, trip));
    });
    let coord = coordinator(cfg, Mode::Train, components, token);
    let status = coord.status();

    coord.run().unwrap();

    let log = events_of(&events);
    assert_eq!(resets(&log), 3);
    assert_eq!(status.episodes(), 3);
    // Episode 3 ran no steps: last learn comes before the third reset
    let third_reset = log.iter().rposition(|e| *e == "reset").unwrap();
    assert!(!log[third_reset..].contains(&"learn"));
    assert_eq!(&log[log.len() - 2..], &["save_weights", "save_metrics"]);
}

#[test]
fn external_shutdown_stops_open_ended_training() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let token = ShutdownToken::new();
    let cfg = config(dir.path(), 0, "");
    let components = scripted(&events, |env| {
        env.step_delay = Some(Duration::from_millis(2));
    });
    let coord = coordinator(cfg, Mode::Train, components, token.clone());
    let status = coord.status();

    let runner = std::thread::spawn(move || coord.run());
    wait_for("two episodes", Duration::from_secs(10), || status.episodes() >= 2);
    token.request();
    runner.join().unwrap().unwrap();

    let log = events_of(&events);
    let saves = log.iter().filter(|e| e.starts_with("save")).count();
    assert!(saves >= 2);
    assert_eq!(&log[log.len() - 2..], &["save_weights", "save_metrics"]);
    assert_eq!(status.phase(), Phase::Terminated);
}

#[test]
fn recoverable_episode_error_moves_on() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "max_episodes = 3");
    let components = scripted(&events, |env| env.step_error_on = Some(2));
    let coord = coordinator(cfg, Mode::Train, components, ShutdownToken::new());
    let status = coord.status();

    coord.run().unwrap();

    assert_eq!(resets(&events_of(&events)), 3);
    assert_eq!(status.episodes(), 3);
    // Only episodes 1 and 3 produced summaries
    let recorded: Vec<u64> = status.recent().iter().map(|s| s.episode).collect();
    assert_eq!(recorded, vec![1, 3]);
}

#[test]
fn interrupted_episode_ends_training_cleanly() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "save_interval = 1\nmax_episodes = 5");
    let components = scripted(&events, |env| env.interrupt_on = Some(2));
    let coord = coordinator(cfg, Mode::Train, components, ShutdownToken::new());
    let status = coord.status();

    coord.run().unwrap();

    let log: Vec<_> = events_of(&events)
        .into_iter()
        .filter(|e| *e != "learn")
        .collect();
    // episode 1 checkpoints, episode 2 is interrupted with no interval save
    assert_eq!(
        log,
        vec![
            "load_weights",
            "reset",
            "save_weights",
            "save_metrics",
            "reset",
            "save_weights",
            "save_metrics",
        ]
    );
    assert_eq!(resets(&log), 2);
    assert_eq!(status.recent().len(), 1);
    assert_eq!(status.phase(), Phase::Terminated);
}

#[test]
fn shape_error_aborts_but_still_persists() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "max_episodes = 5");
    let components = scripted(&events, |env| env.wide_obs_on = Some(2));
    let coord = coordinator(cfg, Mode::Train, components, ShutdownToken::new());
    let status = coord.status();

    let err = coord.run().unwrap_err();
    assert!(format!("{err:#}").contains("observation"), "{err:#}");

    let log = events_of(&events);
    assert_eq!(resets(&log), 2);
    assert_eq!(&log[log.len() - 2..], &["save_weights", "save_metrics"]);
    assert_eq!(status.phase(), Phase::Terminated);
}

#[test]
fn eval_runs_one_episode_without_learning() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "save_interval = 1");
    let coord = coordinator(cfg, Mode::Evaluate, scripted(&events, |_| {}), ShutdownToken::new());
    let status = coord.status();

    coord.run().unwrap();

    assert_eq!(
        events_of(&events),
        vec!["load_weights", "reset", "save_weights", "save_metrics"]
    );
    assert_eq!(status.episodes(), 1);
}

#[test]
fn eval_with_shutdown_already_requested_runs_no_steps() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let token = ShutdownToken::new();
    token.request();
    let cfg = config(dir.path(), 0, "");
    let coord = coordinator(cfg, Mode::Evaluate, scripted(&events, |_| {}), token);
    let status = coord.status();

    coord.run().unwrap();

    assert_eq!(resets(&events_of(&events)), 1);
    assert_eq!(status.recent()[0].steps, 0);
}

#[test]
fn missing_weights_is_cold_start() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "");
    let mut coord = coordinator(cfg, Mode::Train, scripted(&events, |_| {}), ShutdownToken::new());
    assert_eq!(coord.load_weights(), WeightsLoad::ColdStart);
}

#[test]
fn persistence_happens_once() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let cfg = config(dir.path(), 0, "");
    let mut coord = coordinator(cfg, Mode::Train, scripted(&events, |_| {}), ShutdownToken::new());

    assert!(coord.shutdown_and_persist());
    assert!(!coord.shutdown_and_persist());
    assert_eq!(events_of(&events), vec!["save_weights", "save_metrics"]);
}

#[test]
fn bind_failure_is_fatal_and_saves_nothing() {
    let dir = TempDir::new().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let events = Events::default();
    let cfg = config(dir.path(), port, "max_episodes = 1");
    let coord = coordinator(cfg, Mode::Train, scripted(&events, |_| {}), ShutdownToken::new());
    let status = coord.status();

    let err = coord.run().unwrap_err();
    assert!(format!("{err:#}").contains("failed to bind"), "{err:#}");
    assert_eq!(events_of(&events), vec!["load_weights"]);
    assert_eq!(status.phase(), Phase::Terminated);
}

#[test]
fn missing_section_fails_before_anything_is_written() {
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");
    let toml = config_toml(&ckpt, 0, "").replace("[monitoring]", "");
    let path = dir.path().join("efca.toml");
    std::fs::write(&path, toml).unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("monitoring"), "{err:#}");
    assert!(!ckpt.exists());
}

#[test]
fn serve_mode_stops_on_api_shutdown() {
    let dir = TempDir::new().unwrap();
    let events = Events::default();
    let port = free_port();
    let cfg = config(dir.path(), port, "");
    let coord = coordinator(cfg, Mode::Serve, scripted(&events, |_| {}), ShutdownToken::new());
    let status: Arc<RunStatus> = coord.status();

    let runner = std::thread::spawn(move || coord.run());
    wait_for("RUNNING", Duration::from_secs(10), || status.phase() == Phase::Running);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let body: serde_json::Value = rt.block_on(async {
        let client = reqwest::Client::new();
        let st = client
            .get(format!("http://127.0.0.1:{port}/status"))
            .send()
            .await
            .unwrap();
        let body = st.json().await.unwrap();
        let resp = client
            .post(format!("http://127.0.0.1:{port}/shutdown"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 202);
        body
    });
    assert_eq!(body["phase"], "RUNNING");
    assert_eq!(body["mode"], "server");

    runner.join().unwrap().unwrap();
    assert_eq!(
        events_of(&events),
        vec!["load_weights", "save_weights", "save_metrics"]
    );
    assert_eq!(status.phase(), Phase::Terminated);
}

#[test]
fn real_components_round_trip_weights() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), 0, "save_interval = 1\nmax_episodes = 2");
    let weights = cfg.weights_path();
    let metrics = cfg.metrics_dir().join(METRICS_FILE);

    let components = Components::from_config(&cfg);
    coordinator(cfg, Mode::Train, components, ShutdownToken::new())
        .run()
        .unwrap();
    assert!(weights.exists());
    assert!(metrics.exists());

    // episode_reward + episode_length per episode, each written once
    let points = read_metrics(&metrics).unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points[3].name, "episode_length");
    assert_eq!(points[3].step, 2);

    let cfg = config(dir.path(), 0, "");
    let components = Components::from_config(&cfg);
    let mut again = coordinator(cfg, Mode::Evaluate, components, ShutdownToken::new());
    assert_eq!(again.load_weights(), WeightsLoad::Loaded);
}
