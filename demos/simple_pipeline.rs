//! End-to-end fan-out demo
//!
//! Run with: cargo run --example simple_pipeline [BIND_ADDR] [DB_PATH]
//!
//! Examples:
//!   cargo run --example simple_pipeline                          # 127.0.0.1:7070, in-memory store
//!   cargo run --example simple_pipeline 127.0.0.1:7171           # custom port
//!   cargo run --example simple_pipeline 127.0.0.1:7070 notif.db  # persist to SQLite file
//!
//! Users 2 and 3 follow user 1. A producer task publishes a content event for
//! user 1 every two seconds. A client subscribed as user 2 prints every live
//! notification; user 3 never subscribes and reads its rows with `list` at exit.
//!
//! Tokens: `token-1`, `token-2`, `token-3` (one per user).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fanout_rs::broker::{Broker, MemoryBroker};
use fanout_rs::client::DeliveryClient;
use fanout_rs::ingress::{EventIngress, IngressConfig};
use fanout_rs::service::ListRequest;
use fanout_rs::store::SqliteNotificationStore;
use fanout_rs::{
    ContentEvent, DeliveryRegistry, DeliveryServer, MemoryFollowerGraph, NotificationPipeline,
    ServerConfig, StaticTokenVerifier,
};

const AUTHOR: i64 = 1;

fn print_usage() {
    eprintln!("Usage: simple_pipeline [BIND_ADDR] [DB_PATH]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 127.0.0.1:7070)");
    eprintln!("  DB_PATH      SQLite file for notifications (default: in-memory)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr: SocketAddr = match args.get(1) {
        Some(addr) => addr.replace("localhost", "127.0.0.1").parse()?,
        None => SocketAddr::from(([127, 0, 0, 1], 7070)),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fanout_rs=debug".parse()?)
                .add_directive("simple_pipeline=debug".parse()?),
        )
        .init();

    let store = Arc::new(match args.get(2) {
        Some(path) => SqliteNotificationStore::open(path)?,
        None => SqliteNotificationStore::open_in_memory()?,
    });

    let graph = Arc::new(MemoryFollowerGraph::new());
    graph.follow(2, AUTHOR);
    graph.follow(3, AUTHOR);

    let verifier = Arc::new(StaticTokenVerifier::new());
    for user in 1..=3 {
        verifier.issue(format!("token-{}", user), user);
    }

    let broker = MemoryBroker::new();
    let registry = Arc::new(DeliveryRegistry::new());

    let pipeline = Arc::new(NotificationPipeline::new(
        Arc::clone(&graph),
        Arc::clone(&store),
        Arc::clone(&registry),
    ));
    let ingress = EventIngress::start(&broker, IngressConfig::default(), pipeline).await?;

    let server = Arc::new(DeliveryServer::new(
        ServerConfig::with_addr(bind_addr),
        verifier,
        Arc::clone(&store),
        Arc::clone(&registry),
    ));
    let server_task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    println!("Delivery server on {}", bind_addr);
    println!("Users 2 and 3 follow user {}. Press Ctrl+C to stop.", AUTHOR);
    println!();

    // Give the listener a moment to bind before the client connects.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let subscriber = tokio::spawn(async move {
        let client = DeliveryClient::connect(bind_addr, "token-2").await?;
        let mut stream = client.subscribe().await?;
        while let Some(notification) = stream.next().await? {
            println!(
                "[user 2] #{} from user {}: {}",
                notification.id, notification.origin_user_id, notification.title
            );
        }
        Ok::<_, fanout_rs::error::Error>(())
    });

    let producer = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let mut content_id = 0;
            loop {
                content_id += 1;
                let event = ContentEvent::new(AUTHOR, content_id, format!("post #{}", content_id));
                match event.encode() {
                    Ok(payload) => {
                        if let Err(e) = broker.publish("tweets", payload).await {
                            eprintln!("Publish failed: {}", e);
                            return;
                        }
                    }
                    Err(e) => eprintln!("Encode failed: {}", e),
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");

    producer.abort();
    ingress.shutdown().await?;

    let mut reader = DeliveryClient::connect(bind_addr, "token-3").await?;
    let page = reader.list(ListRequest::first(3).limit(10)).await?;
    println!("[user 3] {} most recent notifications:", page.notifications.len());
    for notification in &page.notifications {
        println!("  #{} {}", notification.id, notification.title);
    }

    server.shutdown();
    let _ = server_task.await;
    let _ = subscriber.await;
    broker.close();

    let stats = registry.stats();
    println!(
        "Registry: opened={} closed={} delivered={} evicted={}",
        stats.opened, stats.closed, stats.delivered, stats.evicted
    );

    Ok(())
}
