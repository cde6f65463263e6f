//! Live inventory server with a console for driving writes
//!
//! Run with: cargo run --example inventory_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example inventory_server                  # binds to 0.0.0.0:3000
//!   cargo run --example inventory_server 127.0.0.1:3001   # binds to 127.0.0.1:3001
//!
//! Connect a WebSocket client (e.g. `websocat ws://localhost:3000`) and send
//!   {"type":"subscribe","uuid":"<uuid>"}
//!
//! Then type commands on stdin:
//!   new                          print a fresh inventory uuid
//!   add <uuid> <qty> <name...>   add a product
//!   set <uuid> <id> <qty>        change a product's quantity
//!   rm <uuid> <id>               delete a product
//!   rename <uuid> <name...>      rename an inventory
//!   drop <uuid>                  delete an inventory (evicts viewers)
//!   list                         list inventories
//!   stats                        print usage statistics

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use inventory_live::store::InventoryStore;
use inventory_live::{InventoryServer, ServerConfig};

fn parse_bind_addr(arg: Option<String>) -> SocketAddr {
    match arg.as_deref() {
        None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        Some("localhost") => SocketAddr::from(([127, 0, 0, 1], 3000)),
        Some(s) => s.parse().unwrap_or_else(|e| {
            eprintln!("Invalid bind address '{}': {}", s, e);
            std::process::exit(1);
        }),
    }
}

fn run_command(store: &InventoryStore, line: &str) -> String {
    let parts: Vec<&str> = line.split_whitespace().collect();

    let result = match parts.as_slice() {
        ["new"] => Ok(uuid::Uuid::new_v4().to_string()),
        ["add", uuid, qty, name @ ..] if !name.is_empty() => match qty.parse::<i64>() {
            Ok(qty) => store
                .add_product(uuid, &name.join(" "), Some(qty))
                .map(|p| format!("added #{} {} x{}", p.id, p.name, p.quantity)),
            Err(_) => Ok(format!("bad quantity: {}", qty)),
        },
        ["set", uuid, id, qty] => match (id.parse::<i64>(), qty.parse::<i64>()) {
            (Ok(id), Ok(qty)) => store
                .update_quantity(uuid, id, qty)
                .map(|p| format!("#{} {} now x{}", p.id, p.name, p.quantity)),
            _ => Ok("usage: set <uuid> <id> <qty>".to_string()),
        },
        ["rm", uuid, id] => match id.parse::<i64>() {
            Ok(id) => store
                .delete_product(uuid, id)
                .map(|()| format!("deleted #{}", id)),
            Err(_) => Ok("usage: rm <uuid> <id>".to_string()),
        },
        ["rename", uuid, name @ ..] if !name.is_empty() => store
            .rename_inventory(uuid, &name.join(" "))
            .map(|name| format!("renamed to {}", name)),
        ["drop", uuid] => store
            .delete_inventory(uuid)
            .map(|evicted| format!("deleted, {} viewer(s) evicted", evicted)),
        ["list"] => Ok(store
            .list_inventories()
            .iter()
            .map(|inv| {
                format!(
                    "{} {:<16} products={} qty={} created={}",
                    inv.uuid,
                    inv.name.as_deref().unwrap_or("-"),
                    inv.product_count,
                    inv.total_quantity,
                    inv.created_at.format("%Y-%m-%d %H:%M:%S")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
        ["stats"] => Ok(format!("{:#?}", store.usage())),
        [] => Ok(String::new()),
        _ => Ok("unknown command".to_string()),
    };

    result.unwrap_or_else(|e| format!("error: {}", e))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("inventory_live=debug,info")),
        )
        .init();

    let bind_addr = parse_bind_addr(std::env::args().nth(1));
    let server = Arc::new(InventoryServer::new(ServerConfig::with_addr(bind_addr)));
    let store = Arc::new(InventoryStore::new(Arc::clone(server.publisher())));

    println!("Inventory live server on ws://{}", server.bind_addr());
    println!("Type commands on stdin (new, add, set, rm, rename, drop, list, stats)");

    tokio::spawn({
        let store = Arc::clone(&store);
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let output = run_command(&store, &line);
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
