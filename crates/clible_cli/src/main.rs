//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the configured store end to end: config, logging, migrations, seed.
//! - Print deterministic status lines for quick local sanity checks.

use clible_core::db::migrations::applied_migrations;
use clible_core::repo::book_repo::{BookRepository, SqliteBookRepository};
use clible_core::{core_version, init_logging, with_db, CoreConfig, RepoError};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("clible: {err}");
            return ExitCode::from(2);
        }
    };
    if let Err(err) = init_logging(&config.log_level, &config.log_dir) {
        eprintln!("clible: logging disabled: {err}");
    }

    println!("clible_core version={}", core_version());
    let status = with_db(&config.db_path, &config.open_options(), |conn| {
        let versions = applied_migrations(conn).map_err(clible_core::DbError::from)?;
        let books = SqliteBookRepository::try_new(conn)?.count()?;
        Ok::<_, RepoError>((versions, books))
    });

    match status {
        Ok((versions, books)) => {
            let latest = versions.last().map(|m| m.version).unwrap_or(0);
            println!("db path={}", config.db_path.display());
            println!("db schema_version={latest} migrations={}", versions.len());
            println!("db books={books}");
            println!("translations={}", config.translations.join(","));
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_status module=cli status=error error={err}");
            eprintln!("clible: {err}");
            ExitCode::FAILURE
        }
    }
}
