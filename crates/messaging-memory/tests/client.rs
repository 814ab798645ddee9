//! Request/response correlation over the in-memory broker.

mod common;

use common::{Text, broker_with_delay, counting_metrics, send_raw, spawn_echo_responder};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::time::{Instant, timeout};
use trellis_messaging::broker::{Broker, Delivery, Publisher, Subscription};
use trellis_messaging::client::{Error as ClientError, RequestClient, RequestClientOptions};
use trellis_messaging::metrics::NoopMetrics;
use trellis_messaging::{CORRELATION_ID, ErrorKind, Properties};
use trellis_messaging_memory::MemoryBroker;

type TextClient = RequestClient<
    MemoryBroker,
    Text,
    serde_json::Error,
    serde_json::Error,
    Text,
    serde_json::Error,
>;

async fn client(broker: &MemoryBroker, timeout: Duration) -> TextClient {
    TextClient::new(
        broker,
        RequestClientOptions::new("requests", "responses").with_timeout(timeout),
        Arc::new(NoopMetrics),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_request_returns_matching_reply() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let _responder = spawn_echo_responder(&broker, "requests", "responses").await;
    let client = client(&broker, Duration::from_secs(2)).await;

    let reply = client.request(Text::new("ping")).await.unwrap();

    assert_eq!(reply, Text::new("ping"));
}

#[tokio::test]
async fn test_request_times_out_once_without_retry() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let metrics = counting_metrics();
    let mut spy = broker.subscribe("requests", "spy").await.unwrap();

    let client = TextClient::new(
        &broker,
        RequestClientOptions::new("requests", "responses"),
        metrics.clone(),
    )
    .await
    .unwrap();

    let start = Instant::now();
    let result = client
        .request_with_timeout(Text::new("anyone?"), Duration::from_millis(200))
        .await;
    let elapsed = start.elapsed();

    match result {
        Err(e @ ClientError::Timeout(_)) => assert!(e.is_timeout()),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1));
    assert_eq!(metrics.timed_out.load(Ordering::SeqCst), 1);

    // Exactly one request went out
    let sent = spy.receive_timeout(Duration::from_millis(50)).await.unwrap();
    assert!(sent.is_some());
    let resent = spy.receive_timeout(Duration::from_millis(50)).await.unwrap();
    assert!(resent.is_none());
}

#[tokio::test]
async fn test_replies_for_other_ids_are_discarded() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let mut requests = broker.subscribe("requests", "responder").await.unwrap();
    let replies = broker.publisher("responses").await.unwrap();
    let client = client(&broker, Duration::from_secs(2)).await;

    let responder = tokio::spawn(async move {
        let request = requests.receive().await.unwrap();
        let id = request.properties().get(CORRELATION_ID).cloned().unwrap();
        requests.acknowledge(&request).await.unwrap();

        let wrong = Properties::from([(CORRELATION_ID.to_string(), "someone-else".to_string())]);
        let right = Properties::from([(CORRELATION_ID.to_string(), id)]);

        replies
            .send(Bytes::try_from(Text::new("not yours")).unwrap(), wrong)
            .await
            .unwrap();
        replies
            .send(Bytes::new(), Properties::new())
            .await
            .unwrap();
        replies
            .send(Bytes::try_from(Text::new("yours")).unwrap(), right)
            .await
            .unwrap();
    });

    let reply = client.request(Text::new("question")).await.unwrap();

    assert_eq!(reply, Text::new("yours"));
    responder.await.unwrap();
    assert_eq!(broker.pending("responses", client.subscriber()), 0);
}

#[tokio::test]
async fn test_concurrent_clients_get_only_their_own_replies() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let _responder = spawn_echo_responder(&broker, "requests", "responses").await;

    let first = client(&broker, Duration::from_secs(2)).await;
    let second = client(&broker, Duration::from_secs(2)).await;
    assert_ne!(first.subscriber(), second.subscriber());

    let (a, b) = tokio::join!(
        first.request(Text::new("from first")),
        second.request(Text::new("from second")),
    );

    assert_eq!(a.unwrap(), Text::new("from first"));
    assert_eq!(b.unwrap(), Text::new("from second"));
}

#[tokio::test]
async fn test_concurrent_requests_on_one_client() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let _responder = spawn_echo_responder(&broker, "requests", "responses").await;
    let client = client(&broker, Duration::from_secs(2)).await;

    let requests = (0..16).map(|i| {
        let client = client.clone();
        async move { client.request(Text(format!("request {i}"))).await }
    });

    let replies = timeout(Duration::from_secs(5), join_all(requests))
        .await
        .unwrap();

    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.unwrap(), Text(format!("request {i}")));
    }
}

#[tokio::test]
async fn test_undecodable_reply_fails_that_request() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let mut requests = broker.subscribe("requests", "responder").await.unwrap();
    let client = client(&broker, Duration::from_secs(2)).await;

    let responder = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let request = requests.receive().await.unwrap();
            let id = request.properties().get(CORRELATION_ID).cloned().unwrap();
            requests.acknowledge(&request).await.unwrap();

            let properties = Properties::from([(CORRELATION_ID.to_string(), id)]);
            send_raw(&broker, "responses", Bytes::from("{garbage"), properties).await;
        })
    };

    let result = client.request(Text::new("question")).await;

    assert!(matches!(result, Err(ClientError::Deserialize(_))));
    responder.await.unwrap();
}

#[tokio::test]
async fn test_interrupted_broker_closes_client() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let client = client(&broker, Duration::from_secs(60)).await;

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.request(Text::new("stuck")).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.interrupt();

    let result = timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ClientError::Closed(ErrorKind::Fatal))));

    let after = client.request(Text::new("later")).await;
    assert!(matches!(after, Err(ClientError::Closed(ErrorKind::Fatal))));
    assert_eq!(after.unwrap_err().kind(), ErrorKind::Fatal);
}

#[tokio::test]
async fn test_disconnected_broker_closes_client_as_retryable() {
    let broker = broker_with_delay(Duration::from_secs(60));
    let client = client(&broker, Duration::from_secs(60)).await;

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.request(Text::new("stuck")).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.disconnect();

    let result = timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap();
    let error = result.unwrap_err();
    assert!(error.is_channel_failure());
    assert_eq!(error.kind(), ErrorKind::Retryable);
}
