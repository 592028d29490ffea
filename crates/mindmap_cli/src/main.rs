//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `mindmap_core` linkage, configuration and storage bootstrap.
//! - Print a short deterministic summary of the configured store.

use log::warn;
use mindmap_core::db::schema_version;
use mindmap_core::{
    core_version, init_from_config, open_unit_of_work, CoreConfig, Diagram, Favorite, User,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing `.env` is normal; the process environment still applies.
    let _ = dotenvy::dotenv();
    let config = CoreConfig::from_env();

    if let Err(err) = init_from_config(&config) {
        eprintln!("mindmap logging disabled: {err}");
    }
    for message in &config.warnings {
        warn!("event=config_load module=cli status=error detail={message}");
        eprintln!("mindmap config: {message}");
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mindmap error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut uow = open_unit_of_work(config)?;
    let store = config
        .database_path
        .as_deref()
        .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string());

    println!("mindmap_core version={}", core_version());
    println!("store={store} schema_version={}", schema_version(uow.connection())?);
    println!("users={}", uow.repository::<User>().count(None)?);
    println!("diagrams={}", uow.repository::<Diagram>().count(None)?);
    println!("favorites={}", uow.repository::<Favorite>().count(None)?);
    Ok(())
}
