//! # STRATA Headless Driver
//!
//! Runs the simulation loop without a host, walks through every registered
//! dimension once and prints the developer metrics as JSON.
//!
//! ```bash
//! strata_headless                 # built-in defaults
//! strata_headless strata.toml     # settings from a file
//! strata_headless strata.toml 600 # frames per dimension
//! ```

use std::process::ExitCode;

use strata::{Engine, EngineConfig, TransitionState};

const FRAME_DT: f32 = 1.0 / 60.0;
const DEFAULT_FRAMES: u64 = 120;
/// Frames to wait on a threaded transition before giving up.
const TRANSITION_TIMEOUT: u64 = 600;

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%path, error = %err, "config not loaded");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    let frames = args.next().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_FRAMES);

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "engine not built");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = engine.start() {
        tracing::error!(error = %err, "engine not started");
        return ExitCode::FAILURE;
    }

    let dimensions = engine.registry().len();
    for _ in 0..dimensions {
        run_frames(&mut engine, frames);
        if let Err(err) = engine.advance_dimension(Some(1)) {
            tracing::warn!(error = %err, "transition not started");
            break;
        }
        let mut waited = 0;
        while engine.transition().is_running() && waited < TRANSITION_TIMEOUT {
            engine.tick(FRAME_DT);
            waited += 1;
        }
        if engine.transition().state() != TransitionState::Ready {
            tracing::error!(state = ?engine.transition().state(), "transition did not finish");
            return ExitCode::FAILURE;
        }
    }
    run_frames(&mut engine, frames);

    match serde_json::to_string_pretty(&engine.developer_metrics()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "metrics not encoded");
            ExitCode::FAILURE
        }
    }
}

fn run_frames(engine: &mut Engine, frames: u64) {
    for _ in 0..frames {
        let report = engine.tick(FRAME_DT);
        if report.frame % 60 == 0 {
            let view = engine.world_view();
            tracing::info!(
                frame = report.frame,
                dimension = %view.dimension,
                mobs = view.mob_count,
                dangling = view.dangling_entities,
                "frame"
            );
        }
    }
}
