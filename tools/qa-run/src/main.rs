//! ACR 大体模质控检查的命令行入口.

mod result;
mod runner;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Analyse an ACR large phantom MRI QA examination.
#[derive(Debug, Parser)]
#[command(name = "qa-run", version)]
pub struct Cli {
    /// Directory holding the examination files.
    /// Defaults to `$ACR_QA_DIR`, then `$HOME/dataset/acr`.
    dir: Option<PathBuf>,

    /// Protocol configuration (TOML). The built-in ACR protocol is used when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Save every slice used by a metric as PNG under this directory.
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Worker threads for decoding and measuring.
    #[arg(long, short, default_value_t = utils::cpus())]
    jobs: usize,

    /// Log level.
    #[arg(long, env = "ACR_QA_LOG", default_value = "info")]
    log_level: log::LevelFilter,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()
    {
        eprintln!("cannot initialise logging: {e}");
    }

    match runner::run(&cli) {
        Ok(result) => {
            if let Err(e) = result.describe_into(std::io::stderr()) {
                log::warn!("cannot print summary: {e}");
            }
            result.exit_code()
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(2)
        }
    }
}
