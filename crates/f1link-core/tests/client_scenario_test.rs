// End-to-end walk through a client's life against the scripted transport.
#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{MockTransport, approx, client, settle};
use f1link_core::{ClientConfig, ConnectionState, CoreError, ServerIdentity, TelemetryClient};

#[tokio::test]
async fn connect_update_and_disconnect() {
    let transport = MockTransport::new();
    let client = client(&transport);
    assert_eq!(client.state(), ConnectionState::NotConnected);
    assert_eq!(client.server_url().as_str(), "wss://example/test");
    assert_eq!(client.root_topic_path(), "cars");

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connecting);
    assert_eq!(transport.connect_calls(), 1);

    assert!(transport.establish());
    settle().await;
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(transport.subscriptions(), vec!["cars".to_owned()]);
    assert_eq!(client.metrics().count_of_updates, 0);

    transport.publish("/cars/steering", "0.42");
    settle().await;
    assert!(approx(client.steering(), 0.42));
    assert_eq!(client.metrics().count_of_successful_topic_source_updates, 1);

    let before = client.telemetry();
    transport.publish("/cars/gear", "fifth");
    settle().await;
    assert_eq!(client.gear(), 0);
    assert_eq!(*client.telemetry(), *before);

    let metrics = client.metrics();
    assert_eq!(metrics.count_of_failed_topic_source_updates, 1);
    assert_eq!(metrics.count_of_successful_topic_source_updates, 1);
    assert_eq!(metrics.count_of_updates, 2);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnecting);
    settle().await;
    assert_eq!(client.state(), ConnectionState::NotConnected);
    assert_eq!(transport.disconnect_calls(), 1);
    assert_eq!(client.last_error(), None);
}

#[tokio::test]
async fn transitions_are_reported_in_order() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let mut transitions = client.transitions();

    client.connect().await.unwrap();
    transport.establish();
    settle().await;
    client.disconnect().await;
    settle().await;

    let mut seen = Vec::new();
    while let Ok(t) = transitions.try_recv() {
        seen.push((t.from, t.to));
    }
    assert_eq!(
        seen,
        vec![
            (ConnectionState::NotConnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
            (ConnectionState::Connected, ConnectionState::Disconnecting),
            (ConnectionState::Disconnecting, ConnectionState::NotConnected),
        ]
    );
}

#[tokio::test]
async fn state_watchers_see_the_connection_open() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let mut state = client.watch_state();
    assert_eq!(*state.current(), ConnectionState::NotConnected);

    client.connect().await.unwrap();
    transport.establish();

    let reached = state
        .wait_for(|s| *s == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(reached, ConnectionState::Connected);
}

#[tokio::test]
async fn telemetry_watchers_get_published_snapshots() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let mut telemetry = client.watch_telemetry();

    client.connect().await.unwrap();
    transport.establish();
    settle().await;
    transport.publish("cars/Braking", "0.75");

    let snap = telemetry.changed().await.unwrap();
    assert!(approx(snap.braking, 0.75));
    assert!(approx(telemetry.current().braking, 0.75));
}

#[test]
fn empty_root_path_fails_before_touching_the_transport() {
    let transport = MockTransport::new();
    let err = TelemetryClient::with_endpoint("wss://example/test", "", transport.clone())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        CoreError::InvalidIdentity {
            field: "root_topic_path",
            ..
        }
    ));
    assert_eq!(transport.connect_calls(), 0);
}

#[test]
fn empty_endpoint_fails_before_touching_the_transport() {
    let transport = MockTransport::new();
    let result = TelemetryClient::with_endpoint("", "/cars", transport.clone());
    assert!(matches!(
        result,
        Err(CoreError::InvalidIdentity {
            field: "endpoint",
            ..
        })
    ));
    assert_eq!(transport.connect_calls(), 0);
}

#[test]
fn oversized_metrics_window_fails_construction() {
    let transport = MockTransport::new();
    let mut config = ClientConfig::new(ServerIdentity::new("wss://example/test", "/cars").unwrap());
    config.metrics.window = Duration::from_secs(u64::MAX / 4);

    let result = TelemetryClient::new(config, transport.clone());
    assert!(matches!(result, Err(CoreError::Config { .. })));
    assert_eq!(transport.connect_calls(), 0);
}
