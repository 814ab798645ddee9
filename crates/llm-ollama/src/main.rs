//! Text-completion service.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trellis_llm_ollama::{
    CompletionConfig, CompletionStage, DEFAULT_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_SUBSCRIBER,
    OllamaCompleter, OllamaError,
};
use trellis_messaging::consumer::DEFAULT_MAX_REDELIVERIES;
use trellis_messaging::supervisor::{Exit, Supervisor, SupervisorOptions};
use trellis_messaging_nats::NatsBrokerOptions;
use trellis_schema::topics::{LLM_COMPLETE_TEXT, LLM_COMPLETE_TEXT_RESPONSE};

#[derive(Parser, Debug)]
#[command(name = "llm-ollama-text", version, about = "Completes text prompts with an Ollama model", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short = 'p', long, env = "TRELLIS_BROKER_URL", default_value = "nats://localhost:4222")]
    broker_url: String,

    /// Input topic
    #[arg(short, long, env = "TRELLIS_INPUT_TOPIC", default_value = LLM_COMPLETE_TEXT)]
    input_topic: String,

    /// Subscriber name on the input topic
    #[arg(short, long, env = "TRELLIS_SUBSCRIBER", default_value = DEFAULT_SUBSCRIBER)]
    subscriber: String,

    /// Output topic
    #[arg(short, long, env = "TRELLIS_OUTPUT_TOPIC", default_value = LLM_COMPLETE_TEXT_RESPONSE)]
    output_topic: String,

    /// Model name
    #[arg(short, long, env = "TRELLIS_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Ollama server address
    #[arg(short = 'r', long, env = "TRELLIS_OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama: String,

    /// Longest a single completion may take, in seconds
    #[arg(long, env = "TRELLIS_COMPLETION_TIMEOUT_SECS", default_value_t = 600)]
    completion_timeout_secs: u64,

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
async fn main() -> Result<(), OllamaError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let completer = OllamaCompleter::new(
        &args.ollama,
        args.model,
        Duration::from_secs(args.completion_timeout_secs),
    )?;
    info!("using model '{}' at {}", completer.model(), args.ollama);

    let mut config = CompletionConfig::new(NatsBrokerOptions::new(args.broker_url), completer);
    config.input_topic = args.input_topic;
    config.subscriber = args.subscriber;
    config.output_topic = args.output_topic;
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

    let supervisor = Supervisor::<CompletionStage<NatsBrokerOptions, OllamaCompleter>>::new(
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

    Ok(())
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
