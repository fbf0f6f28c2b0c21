//! Direct message tester
//!
//! Plays the chat gateway against a real broker: publishes direct messages
//! to the bot's inbound queue and prints what the bot sends back.
//!
//! Usage:
//!   cargo run --bin dm-tester -- send --from 1001 "!sr 2500"
//!   cargo run --bin dm-tester -- listen --duration 30
//!   cargo run --bin dm-tester -- conversation --from 1001

use std::time::Duration;

use amqprs::channel::{
    BasicConsumeArguments, BasicPublishArguments, Channel, QueueBindArguments,
    QueueDeclareArguments,
};
use amqprs::BasicProperties;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lfg_registry::amqp::{
    AmqpConfig, AmqpConnection, DirectMessage, MessageEnvelope, OutboundMessage,
    DIRECT_MESSAGE_QUEUE, INBOUND_ROUTING_KEY, OUTBOUND_EXCHANGE,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "dm-tester")]
#[command(about = "Send direct messages to the LFG registry bot over RabbitMQ")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "amqp://localhost:5672/%2f")]
    amqp_url: String,

    #[arg(long, default_value = "guest")]
    username: String,

    #[arg(long, default_value = "guest")]
    password: String,

    #[arg(long, default_value = DIRECT_MESSAGE_QUEUE)]
    queue: String,

    #[arg(long, default_value = OUTBOUND_EXCHANGE)]
    exchange: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one direct message
    Send {
        /// Sender user id
        #[arg(short, long)]
        from: String,
        /// Message text
        text: String,
        /// Mark the sender as a bot account
        #[arg(long)]
        bot: bool,
        /// Seconds to wait for replies
        #[arg(short, long, default_value = "3")]
        wait: u64,
    },
    /// Print outbound messages for a while
    Listen {
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
    /// Walk one user through profile, search and update commands
    Conversation {
        #[arg(short, long)]
        from: String,
    },
}

async fn publish_direct_message(
    channel: &Channel,
    queue: &str,
    message: DirectMessage,
) -> Result<()> {
    let envelope = MessageEnvelope::new(message, INBOUND_ROUTING_KEY);
    let payload = envelope.to_bytes()?;

    let mut properties = BasicProperties::default();
    properties
        .with_message_id(&envelope.correlation_id)
        .with_content_type("application/json");

    channel
        .basic_publish(properties, payload, BasicPublishArguments::new("", queue))
        .await
        .context("Failed to publish direct message")?;
    Ok(())
}

/// Bind a private queue to the outbound exchange and return its deliveries
async fn subscribe_outbound(
    channel: &Channel,
    exchange: &str,
) -> Result<UnboundedReceiver<amqprs::channel::ConsumerMessage>> {
    let (queue, _, _) = channel
        .queue_declare(QueueDeclareArguments::exclusive_server_named())
        .await?
        .ok_or_else(|| anyhow!("Broker did not return a queue name"))?;

    channel
        .queue_bind(QueueBindArguments::new(&queue, exchange, "dm.#"))
        .await
        .with_context(|| format!("Failed to bind to exchange {}", exchange))?;

    let args = BasicConsumeArguments::new(&queue, "dm-tester")
        .manual_ack(false)
        .finish();
    let (_tag, rx) = channel.basic_consume_rx(args).await?;
    Ok(rx)
}

async fn print_replies(
    rx: &mut UnboundedReceiver<amqprs::channel::ConsumerMessage>,
    window: Duration,
) -> usize {
    let mut received = 0;
    let deadline = tokio::time::Instant::now() + window;

    while let Ok(Some(message)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        let Some(content) = message.content else {
            continue;
        };
        match MessageEnvelope::<OutboundMessage>::from_bytes(&content) {
            Ok(envelope) => {
                received += 1;
                println!("📨 to {}:", envelope.payload.recipient_id);
                for line in envelope.payload.content.lines() {
                    println!("   {}", line);
                }
            }
            Err(e) => println!("⚠️  Undecodable outbound message: {}", e),
        }
    }
    received
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    println!("🔌 Connecting to RabbitMQ at: {}", cli.amqp_url);
    let config = AmqpConfig::from_url(&cli.amqp_url, &cli.username, &cli.password)?;
    let connection = match AmqpConnection::new(AmqpConfig {
        max_retries: 1,
        ..config
    })
    .await
    {
        Ok(connection) => {
            println!("✅ Connected to RabbitMQ successfully!");
            connection
        }
        Err(e) => {
            eprintln!("❌ Failed to connect to RabbitMQ: {}", e);
            std::process::exit(1);
        }
    };

    let channel = connection.connection().open_channel(None).await?;
    let mut replies = subscribe_outbound(&channel, &cli.exchange).await?;

    match cli.command {
        Commands::Send {
            from,
            text,
            bot,
            wait,
        } => {
            let mut message = DirectMessage::new(from.clone(), text.clone());
            message.author_is_bot = bot;
            publish_direct_message(&channel, &cli.queue, message).await?;
            println!("📤 {} → {:?}", from, text);

            let received = print_replies(&mut replies, Duration::from_secs(wait)).await;
            if received == 0 {
                println!("⏱️  No reply within {}s", wait);
            }
        }
        Commands::Listen { duration } => {
            println!("👂 Listening for {}s...", duration);
            let received = print_replies(&mut replies, Duration::from_secs(duration)).await;
            println!("📊 {} messages received", received);
        }
        Commands::Conversation { from } => {
            let script = [
                "!help",
                "!sr 2500",
                "!role tank",
                "!description flex evenings, EU",
                "!search role tank -sr 2500 -notify",
                "!update",
                "!search -delete",
            ];
            for text in script {
                publish_direct_message(&channel, &cli.queue, DirectMessage::new(from.clone(), text))
                    .await?;
                println!("📤 {} → {:?}", from, text);
                print_replies(&mut replies, Duration::from_secs(2)).await;
            }
        }
    }

    connection.close().await?;
    Ok(())
}
