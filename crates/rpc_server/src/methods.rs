//! RPC method implementations.

use crate::types::{internal_error, invalid_params, MethodResult};
use crate::RpcContext;
use oxneo_core::{Block, Transaction, UInt160, UInt256};
use oxneo_cryptography::base58::{address_from_script_hash, script_hash_from_address};
use oxneo_io::Serializable;
use oxneo_ledger::blockchain::TxExecutionState;
use oxneo_persistence::{StorageKey, StoreView};
use oxneo_smart_contract::native::{gas_token, neo_token};
use oxneo_smart_contract::{ApplicationEngine, ContractState, Container, TriggerType};
use oxneo_vm::{CallFlags, OpCode, ScriptBuilder, StackItem, VmState};
use serde_json::{json, Value};

/// Gas budget for read-only `invokefunction`/`invokescript` calls.
const INVOKE_GAS_CAP: i64 = 5_000_000_000;

/// Routes a method name; `None` means unknown method.
pub fn dispatch(method: &str, params: &Value, context: &RpcContext) -> Option<MethodResult> {
    Some(match method {
        "getblockcount" => get_block_count(context),
        "getbestblockhash" => get_best_block_hash(context),
        "getblockhash" => get_block_hash(params, context),
        "getblock" => get_block(params, context),
        "gettransaction" | "getrawtransaction" => get_transaction(params, context),
        "getcontractstate" => get_contract_state(params, context),
        "getstorage" => get_storage(params, context),
        "sendrawtransaction" => send_raw_transaction(params, context),
        "invokefunction" => invoke_function(params, context),
        "invokescript" => invoke_script(params, context),
        "getversion" => get_version(context),
        "getconnectioncount" => get_connection_count(context),
        "getpeers" => get_peers(context),
        "validateaddress" => validate_address(params),
        "getnep17balances" => get_nep17_balances(params, context),
        "getrawmempool" => get_raw_mempool(context),
        _ => return None,
    })
}

fn param(params: &Value, index: usize) -> Option<&Value> {
    params.as_array().and_then(|list| list.get(index))
}

fn get_block_count(context: &RpcContext) -> MethodResult {
    Ok(json!(context.blockchain.height() + 1))
}

fn get_best_block_hash(context: &RpcContext) -> MethodResult {
    Ok(json!(context.blockchain.current_hash().to_string()))
}

fn get_block_hash(params: &Value, context: &RpcContext) -> MethodResult {
    let index = param(params, 0)
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid_params("expected a block index"))?;
    let hash = context
        .blockchain
        .get_block_hash(index as u32)
        .ok_or_else(|| invalid_params(format!("no block at index {index}")))?;
    Ok(json!(hash.to_string()))
}

fn get_block(params: &Value, context: &RpcContext) -> MethodResult {
    let selector = param(params, 0).ok_or_else(|| invalid_params("expected index or hash"))?;
    let block = match selector {
        Value::Number(number) => {
            let index = number
                .as_u64()
                .ok_or_else(|| invalid_params("negative index"))?;
            context.blockchain.get_block_by_index(index as u32)
        }
        Value::String(text) => {
            let hash = UInt256::parse(text).map_err(|e| invalid_params(e.to_string()))?;
            context.blockchain.get_block(&hash)
        }
        _ => return Err(invalid_params("expected index or hash")),
    }
    .ok_or_else(|| invalid_params("unknown block"))?;

    let verbose = param(params, 1).and_then(Value::as_bool).unwrap_or(true);
    if verbose {
        Ok(block_to_json(&block, context))
    } else {
        let bytes = block.to_bytes().map_err(|e| internal_error(e.to_string()))?;
        Ok(json!(base64_encode(&bytes)))
    }
}

fn block_to_json(block: &Block, context: &RpcContext) -> Value {
    let hash = block.hash().map(|h| h.to_string()).unwrap_or_default();
    let confirmations = context.blockchain.height().saturating_sub(block.index()) + 1;
    json!({
        "hash": hash,
        "size": block.size(),
        "version": block.header.version,
        "previousblockhash": block.header.prev_hash.to_string(),
        "merkleroot": block.header.merkle_root.to_string(),
        "time": block.header.timestamp,
        "nonce": format!("{:016X}", block.header.nonce),
        "index": block.index(),
        "primary": block.header.primary_index,
        "nextconsensus": address_from_script_hash(block.header.next_consensus.as_bytes()),
        "confirmations": confirmations,
        "tx": block
            .transactions
            .iter()
            .map(tx_to_json)
            .collect::<Vec<Value>>(),
    })
}

fn tx_to_json(tx: &Transaction) -> Value {
    json!({
        "hash": tx.hash().map(|h| h.to_string()).unwrap_or_default(),
        "size": tx.size(),
        "version": tx.version,
        "nonce": tx.nonce,
        "sender": tx
            .sender()
            .map(|s| address_from_script_hash(s.as_bytes()))
            .unwrap_or_default(),
        "sysfee": tx.system_fee.to_string(),
        "netfee": tx.network_fee.to_string(),
        "validuntilblock": tx.valid_until_block,
        "script": base64_encode(&tx.script),
    })
}

fn get_transaction(params: &Value, context: &RpcContext) -> MethodResult {
    let text = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a transaction hash"))?;
    let hash = UInt256::parse(text).map_err(|e| invalid_params(e.to_string()))?;

    if let Some((tx, block_index, state)) = context.blockchain.get_transaction(&hash) {
        let mut value = tx_to_json(&tx);
        let confirmations = context.blockchain.height().saturating_sub(block_index) + 1;
        value["blockindex"] = json!(block_index);
        value["confirmations"] = json!(confirmations);
        value["vmstate"] = json!(match state {
            TxExecutionState::Halt => "HALT",
            TxExecutionState::Fault => "FAULT",
        });
        return Ok(value);
    }
    // Fall back to the pool for unconfirmed transactions.
    if let Some(tx) = context.mempool.read().get(&hash) {
        let mut value = tx_to_json(&tx);
        value["confirmations"] = json!(0);
        return Ok(value);
    }
    Err(invalid_params("unknown transaction"))
}

fn get_contract_state(params: &Value, context: &RpcContext) -> MethodResult {
    let text = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a contract hash"))?;
    let hash = UInt160::parse(text).map_err(|e| invalid_params(e.to_string()))?;
    let snapshot = context.blockchain.snapshot();
    let raw = snapshot
        .try_get(&oxneo_persistence::layout::contract_key(&hash))
        .ok_or_else(|| invalid_params("unknown contract"))?;
    let state = ContractState::from_bytes(&raw).map_err(|e| internal_error(e.to_string()))?;
    Ok(json!({
        "id": state.id,
        "updatecounter": state.update_counter,
        "hash": state.hash.to_string(),
        "script": base64_encode(&state.script),
        "methods": state
            .methods
            .iter()
            .map(|m| json!({
                "name": m.name,
                "offset": m.offset,
                "parametercount": m.parameter_count,
                "safe": m.safe,
            }))
            .collect::<Vec<Value>>(),
    }))
}

fn get_storage(params: &Value, context: &RpcContext) -> MethodResult {
    let id = param(params, 0)
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid_params("expected a contract id"))?;
    let key_b64 = param(params, 1)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a base64 key"))?;
    let key = base64_decode(key_b64).map_err(invalid_params)?;
    let snapshot = context.blockchain.snapshot();
    let item = snapshot
        .get_storage(&StorageKey::new(id as i32, key))
        .ok_or_else(|| invalid_params("no such storage entry"))?;
    Ok(json!(base64_encode(&item.value)))
}

fn send_raw_transaction(params: &Value, context: &RpcContext) -> MethodResult {
    let encoded = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a base64 transaction"))?;
    let bytes = base64_decode(encoded).map_err(invalid_params)?;
    let tx = Transaction::from_bytes(&bytes).map_err(|e| invalid_params(e.to_string()))?;
    let hash = tx.hash().map_err(|e| invalid_params(e.to_string()))?;

    let result = context
        .mempool
        .write()
        .try_add(tx.clone(), context.blockchain.as_ref());
    if !result.is_ok() {
        return Err(invalid_params(format!("transaction rejected: {result:?}")));
    }
    if let Some(node) = &context.node {
        node.relay_transaction(&tx);
    }
    Ok(json!({ "hash": hash.to_string() }))
}

fn parse_invoke_arg(value: &Value) -> Result<StackItem, (i64, String)> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid_params("argument must be an object"))?;
    let arg_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("argument missing type"))?;
    let arg_value = obj.get("value").unwrap_or(&Value::Null);
    match arg_type {
        "Integer" => {
            let number = match arg_value {
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| invalid_params("integer out of range"))?,
                Value::String(s) => s
                    .parse::<i64>()
                    .map_err(|_| invalid_params("unparsable integer"))?,
                _ => return Err(invalid_params("bad integer value")),
            };
            Ok(StackItem::from_int(number))
        }
        "Boolean" => Ok(StackItem::Boolean(
            arg_value
                .as_bool()
                .ok_or_else(|| invalid_params("bad boolean value"))?,
        )),
        "String" => Ok(StackItem::from_bytes(
            arg_value
                .as_str()
                .ok_or_else(|| invalid_params("bad string value"))?
                .as_bytes()
                .to_vec(),
        )),
        "ByteArray" => {
            let bytes = base64_decode(
                arg_value
                    .as_str()
                    .ok_or_else(|| invalid_params("bad byte array"))?,
            )
            .map_err(invalid_params)?;
            Ok(StackItem::from_bytes(bytes))
        }
        "Hash160" => {
            let hash = UInt160::parse(
                arg_value
                    .as_str()
                    .ok_or_else(|| invalid_params("bad hash160"))?,
            )
            .map_err(|e| invalid_params(e.to_string()))?;
            Ok(StackItem::from_bytes(hash.as_bytes().to_vec()))
        }
        other => Err(invalid_params(format!("unsupported argument type {other}"))),
    }
}

fn invoke_function(params: &Value, context: &RpcContext) -> MethodResult {
    let hash_text = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a contract hash"))?;
    let contract = UInt160::parse(hash_text).map_err(|e| invalid_params(e.to_string()))?;
    let method = param(params, 1)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a method name"))?;
    let args: Vec<StackItem> = match param(params, 2) {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(parse_invoke_arg)
            .collect::<Result<_, _>>()?,
        None => Vec::new(),
        _ => return Err(invalid_params("arguments must be an array")),
    };

    // script: push args, pack, flags, method, hash, System.Contract.Call.
    let mut builder = ScriptBuilder::new();
    for arg in args.iter().rev() {
        match arg {
            StackItem::Integer(value) => {
                builder.emit_push_int(value.clone());
            }
            StackItem::Boolean(value) => {
                builder.emit_push_bool(*value);
            }
            StackItem::ByteString(bytes) => {
                builder.emit_push_data(bytes.as_slice());
            }
            _ => return Err(invalid_params("unsupported argument item")),
        }
    }
    builder.emit_push_int(args.len() as i64);
    builder.emit(OpCode::Pack);
    builder.emit_push_int(CallFlags::ALL.bits() as i64);
    builder.emit_push_data(method.as_bytes());
    builder.emit_push_data(contract.as_bytes());
    builder.emit_syscall(oxneo_smart_contract::interop::syscall_id("System.Contract.Call"));

    run_invoke(builder.into_bytes(), context)
}

fn invoke_script(params: &Value, context: &RpcContext) -> MethodResult {
    let encoded = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected a base64 script"))?;
    let script = base64_decode(encoded).map_err(invalid_params)?;
    run_invoke(script, context)
}

fn run_invoke(script: Vec<u8>, context: &RpcContext) -> MethodResult {
    let mut engine = ApplicationEngine::new(
        TriggerType::Application,
        Container::None,
        context.blockchain.snapshot(),
        INVOKE_GAS_CAP,
        context.settings.magic,
        context.blockchain.height(),
        0,
    );
    engine
        .load_script(script.clone(), CallFlags::ALL)
        .map_err(|e| internal_error(e.to_string()))?;
    let state = engine.execute();

    let mut stack = Vec::new();
    for depth in (0..engine.result_stack().len()).rev() {
        if let Ok(item) = engine.result_stack().peek(depth) {
            stack.push(stack_item_to_json(&item));
        }
    }
    Ok(json!({
        "script": base64_encode(&script),
        "state": match state {
            VmState::Halt => "HALT",
            VmState::Fault => "FAULT",
            _ => "BREAK",
        },
        "gasconsumed": engine.gas_consumed().to_string(),
        "exception": engine.fault_reason(),
        "stack": stack,
    }))
}

fn stack_item_to_json(item: &StackItem) -> Value {
    match item {
        StackItem::Null => json!({ "type": "Any", "value": Value::Null }),
        StackItem::Boolean(value) => json!({ "type": "Boolean", "value": value }),
        StackItem::Integer(value) => json!({ "type": "Integer", "value": value.to_string() }),
        StackItem::ByteString(bytes) => {
            json!({ "type": "ByteString", "value": base64_encode(bytes) })
        }
        StackItem::Buffer(buffer) => {
            json!({ "type": "Buffer", "value": base64_encode(&buffer.borrow()) })
        }
        StackItem::Array(items) => json!({
            "type": "Array",
            "value": items.borrow().iter().map(stack_item_to_json).collect::<Vec<Value>>(),
        }),
        StackItem::Struct(items) => json!({
            "type": "Struct",
            "value": items.borrow().iter().map(stack_item_to_json).collect::<Vec<Value>>(),
        }),
        StackItem::Map(entries) => json!({
            "type": "Map",
            "value": entries
                .borrow()
                .iter()
                .map(|(key, value)| json!({
                    "key": stack_item_to_json(&key.to_item()),
                    "value": stack_item_to_json(value),
                }))
                .collect::<Vec<Value>>(),
        }),
        StackItem::Pointer { position, .. } => {
            json!({ "type": "Pointer", "value": position })
        }
        StackItem::InteropInterface(_) => json!({ "type": "InteropInterface" }),
    }
}

fn get_version(context: &RpcContext) -> MethodResult {
    Ok(json!({
        "useragent": format!("/neo-oxide:{}/", env!("CARGO_PKG_VERSION")),
        "network": context.settings.magic,
        "protocol": {
            "msperblock": context.settings.milliseconds_per_block,
            "maxtransactionsperblock": context.settings.max_transactions_per_block,
            "maxvaliduntilblockincrement": context.settings.max_valid_until_block_increment,
            "validatorscount": context.settings.validator_count(),
        },
    }))
}

fn get_connection_count(context: &RpcContext) -> MethodResult {
    Ok(json!(context
        .node
        .as_ref()
        .map(|node| node.peer_count())
        .unwrap_or(0)))
}

fn get_peers(context: &RpcContext) -> MethodResult {
    let connected: Vec<Value> = context
        .node
        .as_ref()
        .map(|node| {
            node.peer_snapshot()
                .into_iter()
                .map(|(address, height, agent)| {
                    json!({
                        "address": address.to_string(),
                        "lastblockindex": height,
                        "useragent": agent,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(json!({ "connected": connected }))
}

fn validate_address(params: &Value) -> MethodResult {
    let text = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected an address"))?;
    let valid = script_hash_from_address(text).is_ok();
    Ok(json!({ "address": text, "isvalid": valid }))
}

fn get_nep17_balances(params: &Value, context: &RpcContext) -> MethodResult {
    let text = param(params, 0)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("expected an address or script hash"))?;
    let account = if text.starts_with("0x") || text.len() == 40 {
        UInt160::parse(text).map_err(|e| invalid_params(e.to_string()))?
    } else {
        UInt160::from_bytes(
            script_hash_from_address(text).map_err(|e| invalid_params(e.to_string()))?,
        )
    };
    let snapshot = context.blockchain.snapshot();
    let balances = json!([
        {
            "assethash": oxneo_smart_contract::native::neo_hash().to_string(),
            "symbol": "NEO",
            "decimals": 0,
            "amount": neo_token::balance_of(&snapshot, &account).to_string(),
        },
        {
            "assethash": oxneo_smart_contract::native::gas_hash().to_string(),
            "symbol": "GAS",
            "decimals": 8,
            "amount": gas_token::balance_of(&snapshot, &account).to_string(),
        },
    ]);
    Ok(json!({
        "address": address_from_script_hash(account.as_bytes()),
        "balance": balances,
    }))
}

fn get_raw_mempool(context: &RpcContext) -> MethodResult {
    let hashes: Vec<String> = context
        .mempool
        .read()
        .verified_hashes()
        .into_iter()
        .map(|hash| hash.to_string())
        .collect();
    Ok(json!(hashes))
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(text: &str) -> Result<Vec<u8>, String> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| format!("invalid base64: {e}"))
}
