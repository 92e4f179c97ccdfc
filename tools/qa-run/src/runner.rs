//! 程序运行函数.

use crate::result::QaResult;
use crate::Cli;
use acr_berry::prelude::*;
use std::error::Error;
use std::fs;
use utils::loader;

/// 实际运行.
pub fn run(cli: &Cli) -> Result<QaResult, Box<dyn Error>> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs.max(1))
        .build_global()?;

    let config = match &cli.config {
        Some(path) => {
            log::info!("loading protocol from {}", path.display());
            ProtocolConfig::from_toml_file(path)?
        }
        None => ProtocolConfig::default(),
    };
    let mut pipeline = Pipeline::new(config)?;
    if let Some(dir) = &cli.dump_dir {
        pipeline = pipeline.with_dump_dir(dir);
    }

    let dir = cli
        .dir
        .clone()
        .or_else(loader::dataset_dir_from_env_or_home)
        .ok_or("cannot determine the examination directory")?;
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()).into());
    }
    let files = loader::load_dir(&dir)?;
    log::info!("loaded {} files from {}", files.len(), dir.display());

    let result = QaResult::new(pipeline.run(&files));
    let json = result.to_json_pretty()?;
    match &cli.output {
        Some(path) => {
            fs::write(path, json)?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(result)
}
