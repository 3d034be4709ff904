use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use shellbot_input::bot::{Bot, LocalBot, Utterance};
use shellbot_input::channel::error::ChannelError;
use shellbot_input::channel::{Message, Receiver, channel};
use shellbot_input::context::{CheckRule, Context, SWITCH_KEY};
use shellbot_input::machines::InputRequest;
use shellbot_input::state_machine::DEFAULT_TICK;
use shellbot_input::store::{JsonFileStore, MemoryStore, Store};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "shellbot_input=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let question =
        std::env::var("INPUT_QUESTION").unwrap_or_else(|_| "What's up, Doc?".to_string());
    let retry_delay = seconds("INPUT_RETRY_SECS", 20);
    let cancel_delay = seconds("INPUT_CANCEL_SECS", 40);

    let context = Arc::new(Context::with_settings(json!({ "switch": "on" })));
    context.check(
        SWITCH_KEY,
        CheckRule::builder()
            .validate(Box::new(|value: &Value| matches!(value.as_str(), Some("on" | "off"))))
            .build(),
    )?;

    let store: Arc<dyn Store> = match std::env::var("INPUT_STORE") {
        Ok(path) => Arc::new(JsonFileStore::open(path)?),
        Err(_) => Arc::new(MemoryStore::new()),
    };

    let (mouth, utterances) = channel();
    let (fan, tokens) = channel();
    let bot: Arc<dyn Bot> = Arc::new(LocalBot::builder().mouth(mouth).store(store).build());

    let request = InputRequest::builder()
        .question(question)
        .maybe_mask(std::env::var("INPUT_MASK").ok())
        .maybe_regex(std::env::var("INPUT_REGEX").ok())
        .retry_delay(retry_delay)
        .cancel_delay(cancel_delay)
        .key("demo.answer")
        .build()?;

    info!(request = ?request, "Asking");

    let speaker = tokio::spawn(speak(utterances));

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if fan.put(line).is_err() {
                return;
            }
        }
        let _ = fan.shutdown();
    });

    let handle = shellbot_input::ask(
        request,
        Arc::clone(&bot),
        Arc::clone(&context),
        tokens,
        DEFAULT_TICK,
    );

    let control = handle.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            control.cancel();
        }
    });

    let machine = handle.join().await?;
    drop(bot);
    drop(machine);
    speaker.await?;

    match context.get_str("demo.answer") {
        Some(answer) => println!("answer: {answer}"),
        None => println!("no answer"),
    }

    Ok(())
}

/// Print everything the bot says until it goes away.
async fn speak(utterances: Receiver<Utterance>) {
    loop {
        match utterances.get(Duration::from_secs(1)).await {
            Ok(Message::Payload(utterance)) => println!("{utterance}"),
            Ok(Message::Shutdown) => break,
            Err(ChannelError::Closed) => break,
            Err(ChannelError::Empty) => {}
        }
    }
}

fn seconds(name: &str, default: u64) -> Duration {
    let seconds = std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(seconds)
}
