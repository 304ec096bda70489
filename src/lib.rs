use std::env;
use std::path::PathBuf;
use clap::Parser;
use crate::gui::application::run_application;
use crate::error::AppRunError;

pub mod device;
pub mod gui;
pub mod error;
pub mod config;

/// Heart rate monitor for paired health wearables.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Use the built-in simulated health service instead of a vendor SDK
    #[arg(long)]
    pub simulate: bool,

    /// Path to the JSON config file (default: next to the executable, or the OS config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub fn init_logging() {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

pub fn run(cli: Cli) -> Result<(), AppRunError> {
    run_application(cli.config, cli.simulate)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from(["pulse-monitor", "--simulate", "--config", "/tmp/pulse.json"]);
        assert!(cli.simulate);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/pulse.json")));

        let cli = Cli::parse_from(["pulse-monitor"]);
        assert!(!cli.simulate);
        assert_eq!(cli.config, None);
    }
}
