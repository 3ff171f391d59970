use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use capscope::analysis::Analyzer;
use capscope::api::routes;
use capscope::models::config::{AnalysisArgs, AppConfig};
use capscope::utils::logging;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Capture-file analyzer with REST API")]
struct Args {
    /// Address the REST API binds to
    #[clap(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the REST API server
    #[clap(short, long, default_value = "8000")]
    port: u16,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "info")]
    log_level: String,

    #[clap(flatten)]
    analysis: AnalysisArgs,
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger with specified level
    logging::init_logger(logging::get_log_level(&args.log_level));

    info!("Starting capscope v{}", env!("CARGO_PKG_VERSION"));

    // Create application config
    let config = AppConfig {
        host: args.host,
        port: args.port,
        log_level: args.log_level,
        analysis: args.analysis.into(),
    };

    if !config.analysis.engine.enabled {
        warn!("Signature engine disabled, suricata results will be empty");
    } else {
        info!("Signature engine: {}", config.analysis.engine.binary.display());
    }
    info!(
        "Upload limit {} bytes, analysis timeout {}s",
        config.analysis.max_capture_bytes, config.analysis.analysis_timeout_secs
    );

    // Shared, read-only analysis state
    let analyzer = web::Data::new(Analyzer::new(config.analysis.clone()));

    info!("Starting capscope API server on {}:{}", config.host, config.port);

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(analyzer.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
