//! The interactive console attached to a running node.

use crate::system::NeoSystem;
use anyhow::Result;
use oxneo_core::UInt256;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads commands from stdin until `exit`/`stop` or EOF.
pub async fn run(system: &NeoSystem) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    print_help();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };
        let argument = parts.next();
        match command {
            "exit" | "stop" => break,
            "help" => print_help(),
            "showblock" => show_block(system, argument),
            "showtx" => show_tx(system, argument),
            "showpeers" => show_peers(system),
            "showpool" => show_pool(system),
            "showstate" => show_state(system),
            other => println!("unknown command {other:?}; try `help`"),
        }
    }
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  showblock <index|hash>   print a block");
    println!("  showtx <hash>            print a transaction");
    println!("  showpeers                list connected peers");
    println!("  showpool                 memory pool summary");
    println!("  showstate                chain tip summary");
    println!("  exit | stop              shut the node down");
}

fn show_block(system: &NeoSystem, argument: Option<&str>) {
    let Some(argument) = argument else {
        println!("usage: showblock <index|hash>");
        return;
    };
    let block = if let Ok(index) = argument.parse::<u32>() {
        system.blockchain.get_block_by_index(index)
    } else {
        match UInt256::parse(argument) {
            Ok(hash) => system.blockchain.get_block(&hash),
            Err(error) => {
                println!("bad block selector: {error}");
                return;
            }
        }
    };
    match block {
        Some(block) => {
            println!("index:         {}", block.index());
            println!(
                "hash:          {}",
                block.hash().map(|h| h.to_string()).unwrap_or_default()
            );
            println!("previous:      {}", block.header.prev_hash);
            println!("merkle root:   {}", block.header.merkle_root);
            println!("timestamp:     {}", block.header.timestamp);
            println!("transactions:  {}", block.transactions.len());
        }
        None => println!("block not found"),
    }
}

fn show_tx(system: &NeoSystem, argument: Option<&str>) {
    let Some(argument) = argument else {
        println!("usage: showtx <hash>");
        return;
    };
    let hash = match UInt256::parse(argument) {
        Ok(hash) => hash,
        Err(error) => {
            println!("bad transaction hash: {error}");
            return;
        }
    };
    if let Some((tx, block_index, state)) = system.blockchain.get_transaction(&hash) {
        println!("block:       {block_index}");
        println!("state:       {state:?}");
        println!("sender:      {}", tx.sender().map(|s| s.to_string()).unwrap_or_default());
        println!("system fee:  {}", tx.system_fee);
        println!("network fee: {}", tx.network_fee);
        println!("script:      {} byte(s)", tx.script.len());
    } else if system.mempool.read().contains(&hash) {
        println!("in memory pool (unconfirmed)");
    } else {
        println!("transaction not found");
    }
}

fn show_peers(system: &NeoSystem) {
    let peers = system.node.peer_snapshot();
    if peers.is_empty() {
        println!("no connected peers");
        return;
    }
    for (address, height, agent) in peers {
        println!("{address}  height={height}  {agent}");
    }
}

fn show_pool(system: &NeoSystem) {
    let pool = system.mempool.read();
    println!(
        "verified: {}  unverified: {}",
        pool.verified_count(),
        pool.unverified_count()
    );
}

fn show_state(system: &NeoSystem) {
    println!(
        "height: {}  tip: {}",
        system.blockchain.height(),
        system.blockchain.current_hash()
    );
}
