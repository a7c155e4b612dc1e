//! # Connectivity Check
//!
//! Loads database settings, installs the engine and its read replica, if
//! configured, and checks that both answer.
//!
//! ## Usage
//! ```bash
//! # Settings files, later ones override earlier ones
//! cargo run -p strata-db --bin dbcheck -- strata.toml local.toml
//!
//! # Environment only
//! STRATA__DB__DIALECT=sqlite STRATA__DB__PATH=./dev.db cargo run -p strata-db --bin dbcheck
//!
//! # Blocking driver
//! cargo run -p strata-db --bin dbcheck -- --blocking strata.toml
//! ```
//!
//! Exits non-zero if settings are invalid or the database is unreachable.

use std::env;
use std::process::ExitCode;
use strata_db::{
    create_blocking_engine, create_engine, BlockingSessionFactory, DbError, DbResult, Driver,
    EngineStats, SessionFactory, Settings,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    init_tracing();

    let mut blocking = false;
    let mut paths = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--blocking" | "-b" => blocking = true,
            _ => paths.push(arg),
        }
    }

    let outcome = Settings::load(&paths).and_then(|settings| {
        if blocking {
            check_blocking(&settings)
        } else {
            check_async(&settings)
        }
    });

    match outcome {
        Ok(stats) => {
            info!(
                connections = stats.connections,
                idle = stats.idle_connections,
                "Database reachable"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Database check failed");
            ExitCode::FAILURE
        }
    }
}

fn check_async(settings: &Settings) -> DbResult<EngineStats> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DbError::Runtime(e.to_string()))?;

    runtime.block_on(async {
        let config = settings.require_db()?;
        info!(url = %config.redacted_url(Driver::Async), "Checking database");

        let factory = SessionFactory::new();
        let engine = factory.create_and_set_engine(config)?;
        let replica = match &settings.replica {
            Some(replica) => {
                info!(url = %replica.redacted_url(Driver::Async), "Checking read replica");
                Some(create_engine(replica)?)
            }
            None => None,
        };
        factory.set_replica(replica.clone());

        let healthy = engine.health_check().await;
        let stats = engine.stats();
        engine.close().await;
        answered(engine.url(), healthy)?;

        if let Some(replica) = replica {
            let healthy = replica.health_check().await;
            replica.close().await;
            answered(replica.url(), healthy)?;
        }

        Ok(stats)
    })
}

fn check_blocking(settings: &Settings) -> DbResult<EngineStats> {
    let config = settings.require_db()?;
    info!(url = %config.redacted_url(Driver::Blocking), "Checking database");

    let factory = BlockingSessionFactory::new();
    let engine = factory.create_and_set_engine(config)?;
    let replica = match &settings.replica {
        Some(replica) => {
            info!(url = %replica.redacted_url(Driver::Blocking), "Checking read replica");
            Some(create_blocking_engine(replica)?)
        }
        None => None,
    };
    factory.set_replica(replica.clone());

    let healthy = engine.health_check();
    let stats = engine.stats();
    engine.close();
    answered(engine.engine().url(), healthy)?;

    if let Some(replica) = replica {
        let healthy = replica.health_check();
        replica.close();
        answered(replica.engine().url(), healthy)?;
    }

    Ok(stats)
}

fn answered(url: &str, healthy: bool) -> DbResult<()> {
    if healthy {
        Ok(())
    } else {
        Err(DbError::Configuration(format!(
            "database at {} did not answer",
            url
        )))
    }
}
