//! Relationship extraction service.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trellis_kg_extract::{DEFAULT_SUBSCRIBER, ExtractConfig, ExtractStage};
use trellis_messaging::client::RequestClientOptions;
use trellis_messaging::consumer::DEFAULT_MAX_REDELIVERIES;
use trellis_messaging::supervisor::{Exit, Supervisor, SupervisorOptions};
use trellis_messaging_nats::NatsBrokerOptions;
use trellis_schema::topics::{
    GRAPH_LOAD, LLM_COMPLETE_TEXT, LLM_COMPLETE_TEXT_RESPONSE, VECTORS_CHUNK_LOAD, VECTORS_LOAD,
};

#[derive(Parser, Debug)]
#[command(name = "kg-extract-relationships", version, about = "Extracts graph relationships from text chunks", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short = 'p', long, env = "TRELLIS_BROKER_URL", default_value = "nats://localhost:4222")]
    broker_url: String,

    /// Input topic
    #[arg(short, long, env = "TRELLIS_INPUT_TOPIC", default_value = VECTORS_CHUNK_LOAD)]
    input_topic: String,

    /// Subscriber name on the input topic
    #[arg(short, long, env = "TRELLIS_SUBSCRIBER", default_value = DEFAULT_SUBSCRIBER)]
    subscriber: String,

    /// Topic for graph edges
    #[arg(short, long, env = "TRELLIS_OUTPUT_TOPIC", default_value = GRAPH_LOAD)]
    output_topic: String,

    /// Topic for entity embeddings
    #[arg(short = 'c', long, env = "TRELLIS_VECTOR_TOPIC", default_value = VECTORS_LOAD)]
    vector_topic: String,

    /// Topic for LLM requests
    #[arg(long, env = "TRELLIS_LLM_REQUEST_TOPIC", default_value = LLM_COMPLETE_TEXT)]
    llm_request_topic: String,

    /// Topic for LLM replies
    #[arg(long, env = "TRELLIS_LLM_RESPONSE_TOPIC", default_value = LLM_COMPLETE_TEXT_RESPONSE)]
    llm_response_topic: String,

    /// How long to wait for each LLM reply, in milliseconds
    #[arg(long, env = "TRELLIS_LLM_TIMEOUT_MS", default_value_t = 500_000)]
    llm_timeout_ms: u64,

    /// Redeliveries after which a message that keeps failing is dropped
    #[arg(long, env = "TRELLIS_MAX_REDELIVERIES", default_value_t = DEFAULT_MAX_REDELIVERIES)]
    max_redeliveries: u32,

    /// Pause before rebuilding the stage after a failure, in seconds
    #[arg(long, env = "TRELLIS_RESTART_BACKOFF_SECS", default_value_t = 10)]
    restart_backoff_secs: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, env = "TRELLIS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = ExtractConfig::new(NatsBrokerOptions::new(args.broker_url));
    config.input_topic = args.input_topic;
    config.subscriber = args.subscriber;
    config.triples_topic = args.output_topic;
    config.vectors_topic = args.vector_topic;
    config.llm = RequestClientOptions::new(args.llm_request_topic, args.llm_response_topic)
        .with_timeout(Duration::from_millis(args.llm_timeout_ms));
    config.max_redeliveries = Some(args.max_redeliveries);

    let shutdown_token = CancellationToken::new();

    tokio::spawn({
        let shutdown_token = shutdown_token.clone();
        async move {
            wait_for_signal().await;
            info!("shutdown requested");
            shutdown_token.cancel();
        }
    });

    let supervisor = Supervisor::<ExtractStage<NatsBrokerOptions>>::new(
        config,
        SupervisorOptions {
            restart_backoff: Duration::from_secs(args.restart_backoff_secs),
        },
        shutdown_token,
    );

    match supervisor.run().await {
        Exit::Shutdown => info!("stopped"),
        Exit::Fatal => error!("broker stopped serving, exiting"),
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }

    let _ = tokio::signal::ctrl_c().await;
}
