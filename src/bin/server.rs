use std::{fs::OpenOptions, net::SocketAddr, path::Path, process::ExitCode, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use family_ledger::{
    AppSettings, AppState, auth::IdentityResolver, build_router, config::Config,
    graceful_shutdown, open_db,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine, the environment may be set some other way.
    let _ = dotenvy::dotenv();

    let config = Config::parse();

    if let Err(error) = setup_logging(&config.log_path) {
        eprintln!("Could not set up logging: {error}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), String> {
    let database_path = config.database_path().map_err(|error| error.to_string())?;
    tracing::info!(
        "Using the {} database at {}",
        config.database_provider,
        database_path.display()
    );

    let connection = open_db(database_path)
        .map_err(|error| format!("Could not open database {}: {error}", database_path.display()))?;

    let identity = IdentityResolver::from_settings(&config.identity_settings())
        .map_err(|error| format!("Could not create the HTTP client: {error}"))?;

    let state = AppState::new(connection, identity, AppSettings::from(&config))
        .map_err(|error| format!("Could not initialize the database: {error}"))?;

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("HTTP server listening on {addr} in {} mode", config.mode);

    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(|error| format!("Server error: {error}"))
}

fn setup_logging(log_path: &Path) -> Result<(), std::io::Error> {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();

    Ok(())
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are converted into responses.
        .on_failure(());

    router.layer(tracing_layer)
}
