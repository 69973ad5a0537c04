use actix_web::{web, HttpResponse, Responder};
use log::{error, info, warn};

use super::models::{
    AppState, MineResponse, NodesResponse, RegisterNodesRequest, ResolveResponse,
    TransactionRequest, TransactionResponse, ValidateResponse,
};
use crate::blockchain::{LedgerError, Transaction};

/// Data structure for the node state
pub type AppStateData = web::Data<AppState>;

/// Mine a new block
///
/// Seals all pending transactions plus the mining reward into a new block.
/// The proof search runs on the blocking thread pool so chain reads keep
/// being served meanwhile.
#[utoipa::path(
    get,
    path = "/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 503, description = "Node is shutting down"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(state: AppStateData) -> impl Responder {
    let worker = state.clone();
    let mined = web::block(move || worker.ledger.mine_block_with(&worker.shutdown)).await;

    match mined {
        Ok(Ok(block)) => {
            let submitted = block.transactions.iter().filter(|t| !t.is_reward()).count();
            info!(
                "Forged block {} carrying {} submitted transactions",
                block.index, submitted
            );
            HttpResponse::Ok().json(MineResponse::from(block))
        }
        Ok(Err(LedgerError::MiningCancelled)) => {
            warn!("Mining cancelled by shutdown");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "error": "Mining was cancelled"
            }))
        }
        Ok(Err(err)) => {
            error!("Failed to mine block: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Failed to mine block: {}", err)
            }))
        }
        Err(err) => {
            error!("Mining worker failed: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Mining worker failed"
            }))
        }
    }
}

/// Create a new transaction
///
/// Adds a new transaction to the pending transactions
#[utoipa::path(
    post,
    path = "/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Body missing, malformed or lacking fields")
    )
)]
pub async fn new_transaction(state: AppStateData, body: web::Bytes) -> impl Responder {
    let transaction = match TransactionRequest::parse(&body) {
        Ok(transaction) => transaction,
        Err(err) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": err.to_string()
            }));
        }
    };

    let Transaction {
        sender,
        recipient,
        amount,
    } = transaction;
    let block_index = state.ledger.append_transaction(sender, recipient, amount);

    HttpResponse::Created().json(TransactionResponse {
        message: format!("Transaction will be added to Block {}", block_index),
        block_index,
    })
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(state: AppStateData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.pending_transactions())
}

/// Get the full blockchain
///
/// This is also the endpoint peers read during consensus.
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = crate::blockchain::ChainSnapshot)
    )
)]
pub async fn get_chain(state: AppStateData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.current_chain())
}

/// Check if the blockchain is valid
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(state: AppStateData) -> impl Responder {
    HttpResponse::Ok().json(ValidateResponse {
        valid: state.ledger.is_valid(),
        length: state.ledger.height(),
    })
}

/// List the known peers
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Known peers", body = NodesResponse)
    )
)]
pub async fn get_nodes(state: AppStateData) -> impl Responder {
    HttpResponse::Ok().json(NodesResponse {
        message: format!("{} known nodes", state.peers.len()),
        total_nodes: state.peers.peers(),
    })
}

/// Register peer nodes
///
/// Every address is checked before any is added
#[utoipa::path(
    post,
    path = "/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Peers registered", body = NodesResponse),
        (status = 400, description = "No list supplied or an address is invalid")
    )
)]
pub async fn register_nodes(
    state: AppStateData,
    request: Option<web::Json<RegisterNodesRequest>>,
) -> impl Responder {
    let nodes = match request.and_then(|request| request.into_inner().nodes) {
        Some(nodes) if !nodes.is_empty() => nodes,
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Please supply a valid list of nodes"
            }));
        }
    };

    match state.peers.register_all(&nodes) {
        Ok(_) => HttpResponse::Created().json(NodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes: state.peers.peers(),
        }),
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string()
        })),
    }
}

/// Resolve conflicts with the peers
///
/// Adopts the longest valid chain held by any known peer
#[utoipa::path(
    get,
    path = "/nodes/resolve",
    responses(
        (status = 200, description = "Consensus reached", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(state: AppStateData) -> impl Responder {
    let replaced = state.resolver.resolve(&state.ledger, &state.peers).await;
    let message = if replaced {
        "Our chain was replaced"
    } else {
        "Our chain is authoritative"
    };

    HttpResponse::Ok().json(ResolveResponse {
        message: message.to_string(),
        replaced,
        chain: state.ledger.current_chain().chain,
    })
}
