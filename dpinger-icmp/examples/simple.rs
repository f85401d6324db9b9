use dpinger_icmp::IcmpEngine;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let ip = tokio::net::lookup_host(format!("{}:0", host))
        .await
        .expect("host lookup error")
        .next()
        .map(|val| val.ip())
        .unwrap();

    let engine = IcmpEngine::new().unwrap();
    match engine.send_echoes(&ip.to_string(), 4).await {
        Ok(result) => info!(?result, "measurement complete"),
        Err(err) => error!(?err),
    };
}
