mod auth;
mod config;
mod error;
mod records;

use crate::auth::ApiTokens;
use crate::config::Args;
use actix_web::{middleware, web, App, HttpServer};
use logcar_core::emit::LineSink;
use logcar_core::LogCar;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let args = Args::parse_args();
    if args.tokens.is_empty() {
        log::warn!("no LOGCAR_API_TOKENS / --tokens configured; every /records request will be rejected");
    }

    let storage_config = logcar_core::Config::from_env();
    log::debug!("storage config: {storage_config:?}");
    if !storage_config.has_deployment_scope() {
        log::warn!("neither RAILWAY_DEPLOYMENT_ID nor RAILWAY_ENVIRONMENT_ID is set; reads will fail until one is");
    }

    let http = reqwest::Client::new();
    let backend = Arc::new(logcar_core::backboard::BackboardClient::new(http, storage_config.backboard_url.clone()));
    let sink = Arc::new(LineSink::stdout());
    let car = Arc::new(LogCar::new(sink, backend, storage_config));

    let tokens = web::Data::new(ApiTokens(Arc::new(args.tokens.clone())));
    let car_data = web::Data::new(car);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(tokens.clone())
            .app_data(car_data.clone())
            .service(records::create_record)
            .service(records::read_record)
            .service(records::update_record)
            .service(records::delete_record)
            .service(records::upload_file)
            .service(records::download_file)
    })
    .bind(args.address)?
    .run()
    .await
}
