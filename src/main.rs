mod cli;
mod config;
mod dispatcher;
mod error;
mod event_log;
mod stats;
mod status;
mod throttle;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use config::DamperConfig;
use dispatcher::{Dispatcher, ScriptedSource, SimulatedSource, TaskOutcome, TaskSource};
use event_log::EventLog;
use status::{RunProgress, StatusReport};
use throttle::ThrottleController;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DamperConfig::load_from(Path::new(path))?,
        None => DamperConfig::load()?,
    };

    match cli.command {
        Command::Run {
            ticks,
            fail_rate,
            seed,
        } => {
            let mut source = SimulatedSource::new(fail_rate, seed);
            drive(config, &mut source, ticks, cli.verbose).await
        }
        Command::Demo => {
            // Janela e pacing reduzidos para a demonstração caber em segundos.
            let demo_config = DamperConfig {
                window_sec: 8,
                retention_sec: 60,
                base_sleep_sec: 0.5,
                max_sleep_sec: 5.0,
                ..config
            };
            let mut source = ScriptedSource::new(vec![
                vec![TaskOutcome::Success; 10],
                vec![TaskOutcome::Success; 10],
                vec![TaskOutcome::Failure("plugin timeout".to_string()); 5],
            ]);
            drive(demo_config, &mut source, 14, cli.verbose).await
        }
    }
}

/// Monta o controlador e o dispatcher, executa os ciclos e imprime o status.
async fn drive(
    config: DamperConfig,
    source: &mut impl TaskSource,
    ticks: u32,
    verbose: bool,
) -> Result<()> {
    let log = Arc::new(EventLog::new(
        config.retention(),
        config.retention_max_events,
    ));
    let controller = Arc::new(ThrottleController::new(config, Arc::clone(&log))?);
    let dispatcher = Dispatcher::new(Arc::clone(&controller));

    let progress = RunProgress::start();
    dispatcher
        .run(source, ticks, |tick, eval| {
            progress.observe(tick, eval, verbose);
        })
        .await;

    let report = StatusReport::collect(&controller, &log, 20);
    progress.finish(&report);
    Ok(())
}
