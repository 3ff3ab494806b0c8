//! Dynamic API integration tests
//!
//! The API tree is built from `core.describe` every time the transport
//! opens; these tests check the path mapping, the calling conventions and
//! the events around going online.

mod common;

use common::{mock_error_response, mock_event, record_event, record_events, sample_catalog, WAIT};
use common::{MockConnection, MockConnector};
use mopidy_client::{CallingConvention, ConnectionState, MethodNaming, MopidyClient};
use mopidy_core::Error;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

async fn online_with(builder: mopidy_client::ClientBuilder, catalog: Value) -> (MopidyClient, MockConnection) {
    let (connector, mut connections) = MockConnector::new();
    let client = builder
        .url("ws://mock/mopidy/ws")
        .with_transport(connector)
        .build()
        .await
        .unwrap();
    let connection = connections.next().await;
    connection.bring_online(&client, catalog).await;
    (client, connection)
}

fn spawn_call(client: &MopidyClient, path: &str, args: Vec<Value>) -> JoinHandle<mopidy_core::Result<Value>> {
    let client = client.clone();
    let path = path.to_string();
    tokio::spawn(async move { client.call(&path, args).await })
}

#[tokio::test]
async fn test_going_online_emits_state_after_api_is_built() {
    let (connector, mut connections) = MockConnector::new();
    let client = MopidyClient::builder()
        .url("ws://mock/mopidy/ws")
        .with_transport(connector)
        .auto_connect(false)
        .calling_convention(CallingConvention::ByPositionOnly)
        .build()
        .await
        .unwrap();
    let events = record_events(&client).await;

    let api_ready = std::sync::Arc::new(std::sync::Mutex::new(None));
    {
        let client_clone = client.clone();
        let api_ready = std::sync::Arc::clone(&api_ready);
        client
            .on("state:online", move |_| {
                let client = client_clone.clone();
                let api_ready = std::sync::Arc::clone(&api_ready);
                async move {
                    let len = client.api().await.len();
                    *api_ready.lock().unwrap() = Some(len);
                }
            })
            .await;
    }

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connecting);
    connections.next().await.bring_online(&client, sample_catalog()).await;

    assert_eq!(client.state(), ConnectionState::Online);
    assert_eq!(*api_ready.lock().unwrap(), Some(5));

    let events = events.lock().unwrap();
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "websocket:open",
            "websocket:outgoingMessage",
            "websocket:incomingMessage",
            "state",
            "state:online",
        ]
    );
    assert_eq!(events[3].1, json!("state:online"));
}

#[tokio::test]
async fn test_tree_paths_and_metadata() {
    let (client, _connection) = online_with(
        MopidyClient::builder().calling_convention(CallingConvention::ByPositionOnly),
        sample_catalog(),
    )
    .await;

    let api = client.api().await;
    assert_eq!(
        api.method_paths(),
        vec![
            "describe",
            "mixer.setVolume",
            "playback.getState",
            "playback.play",
            "tracklist.getTlTracks",
        ]
    );

    let play = api.method("playback.play").unwrap();
    assert_eq!(play.method(), "core.playback.play");
    assert_eq!(play.description(), Some("Play"));
    assert_eq!(play.param_names(), vec!["tl_track", "tlid"]);
    assert!(api.get("playback").unwrap().is_namespace());
}

#[tokio::test]
async fn test_default_convention_is_by_position_only() {
    let (client, connection) = online_with(MopidyClient::builder(), sample_catalog()).await;
    assert_eq!(
        client.settings().calling_convention,
        CallingConvention::ByPositionOnly
    );
    assert!(!client.settings().calling_convention_explicit);

    let call = spawn_call(&client, "playback.getState", vec![]);
    let sent = connection.next_sent().await;
    assert_eq!(sent["method"], "core.playback.get_state");
    assert!(sent.get("params").is_none());
    connection.respond(&sent["id"], json!("stopped"));
    assert_eq!(call.await.unwrap().unwrap(), json!("stopped"));

    let call = spawn_call(&client, "mixer.setVolume", vec![json!(50)]);
    let sent = connection.next_sent().await;
    assert_eq!(sent["params"], json!([50]));
    connection.respond(&sent["id"], json!(true));
    call.await.unwrap().unwrap();

    let call = spawn_call(&client, "playback.play", vec![json!({"tlid": 1})]);
    let sent = connection.next_sent().await;
    assert_eq!(sent["params"], json!([{"tlid": 1}]));
    connection.respond(&sent["id"], Value::Null);
    call.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_by_position_or_by_name() {
    let (client, connection) = online_with(
        MopidyClient::builder().calling_convention(CallingConvention::ByPositionOrByName),
        sample_catalog(),
    )
    .await;

    let cases = [
        (vec![], None),
        (vec![json!([1, 2])], Some(json!([1, 2]))),
        (vec![json!({"a": 1})], Some(json!({"a": 1}))),
    ];
    for (args, expected) in cases {
        let call = spawn_call(&client, "playback.play", args);
        let sent = connection.next_sent().await;
        assert_eq!(sent.get("params").cloned(), expected);
        connection.respond(&sent["id"], Value::Null);
        call.await.unwrap().unwrap();
    }

    let attempts_before = connection.send_attempts();

    let err = client
        .call("playback.play", vec![json!([1]), json!({"a": 1})])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Usage(_)));
    assert_eq!(
        err.to_string(),
        "Expected zero arguments, a single array, or a single object."
    );

    for scalar in [json!("x"), json!(5)] {
        let err = client.call("playback.play", vec![scalar]).await.unwrap_err();
        assert!(matches!(err, Error::Type(_)));
        assert_eq!(err.to_string(), "Expected an array or an object.");
    }

    assert_eq!(connection.send_attempts(), attempts_before);
    assert_eq!(client.pending_requests().await, 0);
}

#[tokio::test]
async fn test_relative_method_naming() {
    let (client, connection) = online_with(
        MopidyClient::builder()
            .calling_convention(CallingConvention::ByPositionOnly)
            .method_naming(MethodNaming::Relative),
        json!({"core.hello_world": {"params": []}}),
    )
    .await;

    let call = spawn_call(&client, "helloWorld", vec![]);
    let sent = connection.next_sent().await;
    assert_eq!(sent["method"], "hello_world");
    connection.respond(&sent["id"], json!("hi"));
    assert_eq!(call.await.unwrap().unwrap(), json!("hi"));
}

#[tokio::test]
async fn test_unknown_path() {
    let (client, _connection) = online_with(
        MopidyClient::builder().calling_convention(CallingConvention::ByPositionOnly),
        sample_catalog(),
    )
    .await;

    let err = client.call("playback.rewind", vec![]).await.unwrap_err();
    assert!(matches!(err, Error::MethodNotFound(_)));
}

#[tokio::test]
async fn test_server_events_are_camel_cased() {
    let (client, connection) = online_with(
        MopidyClient::builder().calling_convention(CallingConvention::ByPositionOnly),
        sample_catalog(),
    )
    .await;
    let started = record_event(&client, "event:trackPlaybackStarted").await;
    let all_events = record_event(&client, "event:*").await;

    connection.push(mock_event(
        "track_playback_started",
        json!({"tl_track": {"tlid": 7, "track": {"uri": "local:track:song.mp3"}}}),
    ));
    connection.push(mock_event("volume_changed", json!({"volume": 30})));
    // Once a later response has settled, both events are in the queue.
    let call = spawn_call(&client, "playback.getState", vec![]);
    let sent = connection.next_sent().await;
    connection.respond(&sent["id"], json!("playing"));
    call.await.unwrap().unwrap();
    client.flush_events().await;

    assert_eq!(
        *started.lock().unwrap(),
        vec![json!({"tl_track": {"tlid": 7, "track": {"uri": "local:track:song.mp3"}}})]
    );
    assert_eq!(all_events.lock().unwrap().len(), 2);
    assert_eq!(all_events.lock().unwrap()[1], json!({"volume": 30}));
}

#[tokio::test]
async fn test_event_handler_can_await_api_call() {
    let (client, connection) = online_with(
        MopidyClient::builder().calling_convention(CallingConvention::ByPositionOnly),
        sample_catalog(),
    )
    .await;

    let (result_tx, mut results) = mpsc::unbounded_channel();
    let caller = client.clone();
    client
        .on("event:trackPlaybackStarted", move |_| {
            let client = caller.clone();
            let result_tx = result_tx.clone();
            async move {
                let state = client.call("playback.getState", vec![]).await;
                let _ = result_tx.send(state);
            }
        })
        .await;
    let volume = record_event(&client, "event:volumeChanged").await;

    connection.push(mock_event("track_playback_started", json!({"tl_track": {"tlid": 1}})));
    connection.push(mock_event("volume_changed", json!({"volume": 10})));
    let sent = connection.next_sent().await;
    assert_eq!(sent["method"], "core.playback.get_state");
    connection.respond(&sent["id"], json!("playing"));

    let state = tokio::time::timeout(WAIT, results.recv())
        .await
        .expect("handler did not finish")
        .unwrap();
    assert_eq!(state.unwrap(), json!("playing"));

    client.flush_events().await;
    assert_eq!(*volume.lock().unwrap(), vec![json!({"volume": 10})]);
    assert_eq!(client.pending_requests().await, 0);
}

#[tokio::test]
async fn test_failed_describe_keeps_client_connecting() {
    let (connector, mut connections) = MockConnector::new();
    let client = MopidyClient::builder()
        .url("ws://mock/mopidy/ws")
        .with_transport(connector)
        .calling_convention(CallingConvention::ByPositionOnly)
        .build()
        .await
        .unwrap();
    let online = record_event(&client, "state:online").await;

    let connection = connections.next().await;
    connection.open();
    let describe = connection.next_sent().await;
    connection.push(mock_error_response(&describe["id"], -32603, "Internal error"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.state(), ConnectionState::Connecting);
    assert!(client.api().await.is_empty());
    assert!(online.lock().unwrap().is_empty());
}
