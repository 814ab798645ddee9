//! Broker behaviour against a live server. Run with a JetStream-enabled
//! `nats-server -js` on localhost and `cargo test -- --ignored`.

use std::time::Duration;

use bytes::Bytes;
use serial_test::serial;
use trellis_messaging::broker::{Broker, Delivery, Publisher, Subscription};
use trellis_messaging::{CORRELATION_ID, Properties};
use trellis_messaging_nats::{NatsBroker, NatsBrokerOptions};
use uuid::Uuid;

async fn broker() -> NatsBroker {
    let mut options = NatsBrokerOptions::new("nats://localhost:4222");
    options.redelivery_delay = Duration::from_millis(100);

    NatsBroker::connect(options).await.unwrap()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires a local nats-server with JetStream"]
#[serial]
async fn test_properties_travel_as_headers() {
    let broker = broker().await;
    let topic = unique("props");

    let mut subscription = broker.subscribe(&topic, "reader").await.unwrap();
    let publisher = broker.publisher(&topic).await.unwrap();

    let properties = Properties::from([(CORRELATION_ID.to_string(), "abc".to_string())]);
    publisher
        .send(Bytes::from("payload"), properties.clone())
        .await
        .unwrap();

    let delivery = subscription
        .receive_timeout(Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    subscription.acknowledge(&delivery).await.unwrap();

    assert_eq!(delivery.payload(), &Bytes::from("payload"));
    assert_eq!(delivery.properties(), &properties);
}

#[tokio::test]
#[ignore = "requires a local nats-server with JetStream"]
#[serial]
async fn test_rejected_message_comes_back() {
    let broker = broker().await;
    let topic = unique("nak");

    let mut subscription = broker.subscribe(&topic, "worker").await.unwrap();
    broker
        .publisher(&topic)
        .await
        .unwrap()
        .send(Bytes::from("again"), Properties::new())
        .await
        .unwrap();

    let first = subscription
        .receive_timeout(Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    subscription.negative_acknowledge(&first).await.unwrap();

    let second = subscription
        .receive_timeout(Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    subscription.acknowledge(&second).await.unwrap();

    assert_eq!(first.redeliveries(), 0);
    assert_eq!(second.payload(), &Bytes::from("again"));
    assert_eq!(second.redeliveries(), 1);
}

#[tokio::test]
#[ignore = "requires a local nats-server with JetStream"]
#[serial]
async fn test_distinct_subscribers_fan_out() {
    let broker = broker().await;
    let topic = unique("fanout");

    let mut first = broker.subscribe(&topic, "first").await.unwrap();
    let mut second = broker.subscribe(&topic, "second").await.unwrap();
    broker
        .publisher(&topic)
        .await
        .unwrap()
        .send(Bytes::from("both"), Properties::new())
        .await
        .unwrap();

    for subscription in [&mut first, &mut second] {
        let delivery = subscription
            .receive_timeout(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        subscription.acknowledge(&delivery).await.unwrap();
        assert_eq!(delivery.payload(), &Bytes::from("both"));
    }
}

#[tokio::test]
#[ignore = "requires a local nats-server with JetStream"]
#[serial]
async fn test_private_subscriptions_each_see_new_messages() {
    let broker = broker().await;
    let topic = unique("private");
    let publisher = broker.publisher(&topic).await.unwrap();

    publisher
        .send(Bytes::from("before"), Properties::new())
        .await
        .unwrap();

    let mut first = broker.subscribe_private(&topic).await.unwrap();
    let mut second = broker.subscribe_private(&topic).await.unwrap();
    assert_ne!(first.subscriber(), second.subscriber());

    publisher
        .send(Bytes::from("after"), Properties::new())
        .await
        .unwrap();

    for subscription in [&mut first, &mut second] {
        let delivery = subscription
            .receive_timeout(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        subscription.acknowledge(&delivery).await.unwrap();
        assert_eq!(delivery.payload(), &Bytes::from("after"));
    }
}
