//! JSON-RPC 2.0 server over warp.
//!
//! Every method is a thin projection over the core subsystems; the
//! domain rules live in the ledger, pool and VM crates.

pub mod methods;
pub mod types;

use oxneo_config::{NodeConfig, ProtocolSettings};
use oxneo_ledger::{Blockchain, MemoryPool};
use oxneo_network::LocalNode;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use types::{RpcRequest, RpcResponse, ERR_METHOD_NOT_FOUND};
use warp::Filter;

/// Shared handles the method implementations operate on.
#[derive(Clone)]
pub struct RpcContext {
    pub blockchain: Arc<Blockchain>,
    pub mempool: Arc<RwLock<MemoryPool>>,
    pub node: Option<LocalNode>,
    pub settings: ProtocolSettings,
}

/// Runs the RPC server until `shutdown` resolves.
pub async fn serve(
    config: &NodeConfig,
    context: RpcContext,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let address: SocketAddr = format!("{}:{}", config.rpc.bind_address, config.rpc.port).parse()?;
    let context = Arc::new(context);

    let route = warp::post()
        .and(warp::path::end())
        .and(warp::body::json())
        .and(warp::any().map(move || context.clone()))
        .map(|request: serde_json::Value, context: Arc<RpcContext>| {
            let response = handle_value(request, context.as_ref());
            warp::reply::json(&response)
        });

    tracing::info!(%address, "rpc server started");
    let (_, server) = warp::serve(route).bind_with_graceful_shutdown(address, shutdown);
    server.await;
    Ok(())
}

/// Handles a single request or a batch.
fn handle_value(request: serde_json::Value, context: &RpcContext) -> serde_json::Value {
    match request {
        serde_json::Value::Array(batch) => serde_json::Value::Array(
            batch
                .into_iter()
                .map(|entry| serde_json::to_value(handle_single(entry, context)).unwrap_or_default())
                .collect(),
        ),
        single => serde_json::to_value(handle_single(single, context)).unwrap_or_default(),
    }
}

fn handle_single(request: serde_json::Value, context: &RpcContext) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(error) => {
            return RpcResponse::err(
                serde_json::Value::Null,
                types::ERR_INVALID_PARAMS,
                format!("malformed request: {error}"),
            )
        }
    };
    let id = request.id.clone();
    match methods::dispatch(&request.method, &request.params, context) {
        Some(Ok(result)) => RpcResponse::ok(id, result),
        Some(Err((code, message))) => RpcResponse::err(id, code, message),
        None => RpcResponse::err(
            id,
            ERR_METHOD_NOT_FOUND,
            format!("method {} not found", request.method),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_persistence::MemoryStore;
    use serde_json::json;

    fn test_context() -> RpcContext {
        let blockchain = Arc::new(
            Blockchain::new(Arc::new(MemoryStore::new()), ProtocolSettings::default()).unwrap(),
        );
        RpcContext {
            blockchain,
            mempool: Arc::new(RwLock::new(MemoryPool::default())),
            node: None,
            settings: ProtocolSettings::default(),
        }
    }

    #[test]
    fn unknown_method_returns_32601() {
        let context = test_context();
        let response = handle_single(
            json!({"jsonrpc": "2.0", "method": "nosuchmethod", "params": [], "id": 1}),
            &context,
        );
        assert_eq!(response.error.unwrap().code, ERR_METHOD_NOT_FOUND);
    }

    #[test]
    fn getblockcount_works() {
        let context = test_context();
        let response = handle_single(
            json!({"jsonrpc": "2.0", "method": "getblockcount", "params": [], "id": 1}),
            &context,
        );
        // Height 0 means one block (genesis).
        assert_eq!(response.result.unwrap(), json!(1));
    }

    #[test]
    fn batch_requests_answered_individually() {
        let context = test_context();
        let response = handle_value(
            json!([
                {"jsonrpc": "2.0", "method": "getblockcount", "params": [], "id": 1},
                {"jsonrpc": "2.0", "method": "bogus", "params": [], "id": 2}
            ]),
            &context,
        );
        let entries = response.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0]["result"].is_number());
        assert_eq!(entries[1]["error"]["code"], json!(ERR_METHOD_NOT_FOUND));
    }

    #[test]
    fn bad_params_return_32602() {
        let context = test_context();
        let response = handle_single(
            json!({"jsonrpc": "2.0", "method": "getblockhash", "params": ["not-a-number"], "id": 3}),
            &context,
        );
        assert_eq!(response.error.unwrap().code, types::ERR_INVALID_PARAMS);
    }
}
