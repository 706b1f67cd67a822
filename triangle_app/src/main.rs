//! Triangle demo
//!
//! Bootstraps the Vulkan pipeline against a GLFW window and draws a single
//! triangle until the window is closed.
//!
//! Usage: `triangle [config.toml|config.ron]`

use gpu_bootstrap::prelude::*;
use std::process::ExitCode;

fn load_config() -> Result<ApplicationConfig, ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ApplicationConfig::load_from_file(&path)?,
        None => ApplicationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.engine.log_level);

    log::info!("Starting {}", config.window.title);
    let mut engine = match Engine::new(&config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Bootstrap failed at stage {}: {}", e.stage, e);
            eprintln!("Failed to initialize renderer ({} stage): {}", e.stage, e);
            return ExitCode::FAILURE;
        }
    };

    match engine.run() {
        Ok(frames) => {
            log::info!("Exiting after {} frames", frames);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Render loop failed: {}", e);
            eprintln!("Render loop failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
