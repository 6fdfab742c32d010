mod args;

use anyhow::{anyhow, Context, Result};
use args::{Args, Command};
use clap::Parser;
use wiring::config::AppConfig;
use wiring::demo::{self, CounterModule};
use wiring::logging::init_logging;
use wiring::App;

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    if let Some(level) = &args.log_level {
        config.logging.level = level
            .parse::<tracing::Level>()
            .with_context(|| format!("invalid --log-level '{}'", level))?;
    }
    init_logging(&config.logging_config())?;

    match args.command.unwrap_or_default() {
        Command::Config => {
            println!("{:#?}", config);
        }
        Command::Demo {
            script,
            quiet,
            stats,
        } => {
            let actions = demo::parse_script(&script).map_err(|e| anyhow!(e))?;
            let app = App::builder()
                .with_config(config)
                .with_module(CounterModule)
                .build()
                .context("failed to assemble application")?;

            let report = demo::run(&app, &actions, !quiet)?;
            println!(
                "final count: {} ({} actions handled)",
                report.final_count, report.actions_handled
            );
            if stats {
                println!("{}", app.container().stats().performance_summary());
            }
            app.shutdown();
        }
    }

    Ok(())
}
