//! Playback client example
//!
//! Connects to a Mopidy server, prints every server event, and reports the
//! playback state each time the connection comes (back) online.
//!
//! Run with: MOPIDY_HOST=localhost:6680 cargo run --example playback_client

use mopidy::{CallingConvention, MopidyClient};
use mopidy_core::ObservabilityConfig;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = MopidyClient::builder()
        .calling_convention(CallingConvention::ByPositionOrByName)
        .with_observability(ObservabilityConfig::default().with_traces(false).with_metrics(false))
        .build()
        .await?;

    println!("Connecting to {}", client.settings().url);

    client
        .on("event:*", |event| async move {
            println!("{} {}", event.name, event.payload);
        })
        .await;

    client
        .on("reconnectionPending", |event| async move {
            println!(
                "Connection lost, retrying in {} ms",
                event.payload["timeToAttempt"]
            );
        })
        .await;

    let reporter = client.clone();
    client
        .on("state:online", move |_| {
            let client = reporter.clone();
            async move {
                match client.call("playback.getState", vec![]).await {
                    Ok(state) => println!("Online, playback is {}", state),
                    Err(e) => println!("Online, but getState failed: {}", e),
                }
            }
        })
        .await;

    client.wait_until_online().await;
    println!("{} methods available", client.api().await.len());

    let volume = client.call("mixer.getVolume", vec![]).await?;
    println!("Volume: {}", volume);
    client
        .call("mixer.setVolume", vec![json!({"volume": volume})])
        .await?;

    tokio::signal::ctrl_c().await?;
    client.close().await;
    mopidy_core::shutdown_observability();
    Ok(())
}
