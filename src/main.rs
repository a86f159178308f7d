use actix_web::{middleware::Logger, web, App, HttpServer};
use std::io;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ms_auth::authority::Authority;
use ms_auth::config::AppConfig;
use ms_auth::db;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Bad configuration, a missing SECRET_KEY included, stops the process here.
    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let store = db::connect(&config.database_url).await.map_err(|e| {
        error!(error = %e, "could not open user store");
        io::Error::other(e)
    })?;

    let authority = Authority::new(&config.auth, store).map_err(|e| {
        error!(error = %e, "could not initialise authority");
        io::Error::other(e)
    })?;
    let authority = web::Data::new(authority);
    let service = web::Data::new(config.service.clone());

    let addr = format!("{}:{}", config.host, config.port);
    info!(
        service = %config.service.name,
        version = %config.service.version,
        api_prefix = %config.service.api_prefix,
        "Listening on: {}",
        addr
    );

    HttpServer::new(move || {
        let prefix = service.api_prefix.clone();
        App::new()
            .wrap(Logger::default())
            .app_data(authority.clone())
            .app_data(service.clone())
            .configure(move |cfg| ms_auth::configure(cfg, &prefix))
    })
    .bind(addr)?
    .run()
    .await?;

    info!("server stopped");
    Ok(())
}
