// Loading and watching a configuration document through the source adapter
mod common;

use std::{sync::Arc, time::Duration};

use common::FakeConfigClient;
use nacos_bridge::{
    ConfigOptions, Error, KeyValue, NacosSource, WatchState,
    ports::source::{Source, Watcher},
};
use tokio_util::sync::CancellationToken;

fn options() -> ConfigOptions {
    ConfigOptions::builder("http://10.0.0.1:8848", "ns1")
        .group("G")
        .data_id("app.yaml")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_load_returns_document_keyed_by_data_id() {
    let client = Arc::new(FakeConfigClient::with_document("G", "app.yaml", "a: 1"));
    let source = NacosSource::with_client(options(), client);

    let kvs = source.load().await.unwrap();
    assert_eq!(kvs, vec![KeyValue::new("app.yaml", "a: 1")]);
}

#[tokio::test]
async fn test_load_failure_names_document() {
    let client = Arc::new(FakeConfigClient {
        fail_get: true,
        ..Default::default()
    });
    let source = NacosSource::with_client(options(), client);

    match source.load().await {
        Err(Error::ConfigFetch { data_id, group, .. }) => {
            assert_eq!(data_id, "app.yaml");
            assert_eq!(group, "G");
        }
        other => panic!("expected ConfigFetch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_change_is_delivered_and_mismatch_dropped() {
    let client = Arc::new(FakeConfigClient::with_document("G", "app.yaml", "a: 1"));
    let source = NacosSource::with_client(options(), client.clone());
    let mut watcher = source.watch().await.unwrap();
    assert_eq!(watcher.state(), WatchState::Active);

    client.broadcast("G", "other.yaml", "x");
    client.broadcast("G", "app.yaml", "a: 2");

    let kvs = watcher.next().await.unwrap().unwrap();
    assert_eq!(kvs, vec![KeyValue::new("app.yaml", "a: 2")]);

    // Nothing else is queued
    let pending = tokio::time::timeout(Duration::from_millis(50), watcher.next()).await;
    assert!(pending.is_err());
}

#[tokio::test]
async fn test_config_queue_keeps_only_latest_version() {
    let client = Arc::new(FakeConfigClient::default());
    let source = NacosSource::with_client(options(), client.clone());
    let mut watcher = source.watch().await.unwrap();

    for version in 1..=5 {
        client.broadcast("G", "app.yaml", &format!("a: {version}"));
    }

    let kvs = watcher.next().await.unwrap().unwrap();
    assert_eq!(kvs[0].value, b"a: 5".to_vec());
}

#[tokio::test]
async fn test_stop_cancels_listener_once_and_ends_stream() {
    let client = Arc::new(FakeConfigClient::default());
    let source = NacosSource::with_client(options(), client.clone());
    let mut watcher = source.watch().await.unwrap();

    watcher.stop().await.unwrap();
    watcher.close().await.unwrap();
    assert_eq!(client.cancel_count(), 1);
    assert_eq!(client.listener_count(), 0);
    assert_eq!(watcher.state(), WatchState::Closed);

    let next = tokio::time::timeout(Duration::from_millis(100), watcher.next())
        .await
        .expect("next must not block after stop");
    assert_eq!(next.unwrap(), None);
}

#[tokio::test]
async fn test_stopping_one_watcher_keeps_sibling_listening() {
    let client = Arc::new(FakeConfigClient::default());
    let source = NacosSource::with_client(options(), client.clone());
    let first = source.watch().await.unwrap();
    let mut second = source.watch().await.unwrap();

    first.stop().await.unwrap();
    assert_eq!(client.cancel_count(), 1);
    assert_eq!(client.listener_count(), 1);

    client.broadcast("G", "app.yaml", "a: 2");
    let kvs = tokio::time::timeout(Duration::from_millis(500), second.next())
        .await
        .expect("sibling watcher must still receive changes")
        .unwrap()
        .unwrap();
    assert_eq!(kvs, vec![KeyValue::new("app.yaml", "a: 2")]);
}

#[tokio::test]
async fn test_refused_listen_leaves_nothing_behind() {
    let client = Arc::new(FakeConfigClient {
        fail_listen: true,
        ..Default::default()
    });
    let source = NacosSource::with_client(options(), client.clone());

    assert!(matches!(
        source.watch().await,
        Err(Error::Subscribe { .. })
    ));
    assert_eq!(client.cancel_count(), 0);
}

#[tokio::test]
async fn test_dropping_watcher_cancels_listener() {
    let client = Arc::new(FakeConfigClient::default());
    let source = NacosSource::with_client(options(), client.clone());
    let watcher = source.watch().await.unwrap();

    drop(watcher);
    assert!(common::eventually(|| client.cancel_count() == 1).await);
}

#[tokio::test]
async fn test_source_port_is_usable_generically() {
    async fn first_change<S: Source>(source: &S) -> Option<Vec<KeyValue>> {
        let mut watcher = source.watch().await.ok()?;
        let next = watcher.next().await.ok()?;
        watcher.stop().await.ok()?;
        next
    }

    let client = Arc::new(FakeConfigClient::default());
    let parent = CancellationToken::new();
    let source = NacosSource::with_client(options(), client.clone()).with_cancellation(&parent);

    let pusher = {
        let client = client.clone();
        tokio::spawn(async move {
            assert!(common::eventually(|| client.listener_count() == 1).await);
            client.broadcast("G", "app.yaml", "a: 3");
        })
    };

    let change = first_change(&source).await;
    pusher.await.unwrap();
    assert_eq!(change, Some(vec![KeyValue::new("app.yaml", "a: 3")]));
    assert_eq!(client.cancel_count(), 1);
}
