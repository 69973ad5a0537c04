use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod network;

use api::AppState;
use blockchain::{Ledger, ProofOfWork};
use config::NodeConfig;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::mine_block,
        api::handlers::new_transaction,
        api::handlers::get_pending_transactions,
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_nodes,
        api::handlers::register_nodes,
        api::handlers::resolve_conflicts
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::ChainSnapshot,
            api::models::TransactionRequest,
            api::models::TransactionResponse,
            api::models::MineResponse,
            api::models::ValidateResponse,
            api::models::RegisterNodesRequest,
            api::models::NodesResponse,
            api::models::ResolveResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger endpoints")
    ),
    info(
        title = "PoW Ledger API",
        version = "0.1.0",
        description = "A proof-of-work ledger node with longest valid chain consensus",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::parse();
    config.validate()?;

    let ledger = Ledger::with_pow(config.node_id(), ProofOfWork::new(config.difficulty));
    let state = web::Data::new(AppState::new(ledger, config.peer_timeout()));

    for peer in &config.peers {
        if let Err(err) = state.peers.register(peer) {
            warn!("Ignoring bootstrap peer: {}", err);
        }
    }

    info!(
        "Node {} starting at http://{}:{} (difficulty {}, {} peers)",
        state.ledger.node_id(),
        config.host,
        config.port,
        state.ledger.difficulty(),
        state.peers.len()
    );

    let server_state = state.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(server_state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    state.shutdown.stop();
    info!("Node {} stopped", state.ledger.node_id());

    Ok(())
}
