//! BitMEX stream monitor
//!
//! Connects to the realtime API, subscribes the four public streams for the
//! configured symbol and logs every emission under the stream's own target:
//! - **quote**: top of book changes
//! - **position**: position changes
//! - **order_events**: raw order updates
//! - **orders**: open orders snapshots
//!
//! Credentials come from `BITMEX_API_KEY` / `BITMEX_API_SECRET`.

use anyhow::Context;
use bitmex_streams::core::Topic;
use bitmex_streams::exchanges::{BitmexWsClient, RealtimeClient};
use bitmex_streams::infrastructure::{init_logging, Config};
use bitmex_streams::rest::{Credentials, RequestSigner};
use bitmex_streams::stream::SharedStream;
use bitmex_streams::FeedContext;
use std::time::Duration;

/// Delay before resubscribing after an open orders failure
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Main application state
pub struct StreamApp {
    config: Config,
    credentials: Credentials,
}

impl StreamApp {
    pub fn new(config: Config, credentials: Credentials) -> Self {
        Self { config, credentials }
    }

    /// Run until the connection closes or Ctrl-C
    pub async fn run(self) -> anyhow::Result<()> {
        let feed = &self.config.feed;
        tracing::info!(target: "feed", "Starting BitMEX streams for {}", feed.symbol);

        let context = FeedContext::from_config(&self.config, self.credentials.clone())
            .context("building REST client")?;
        spawn_loggers(&context);

        let mut client = BitmexWsClient::new(feed.ws_url.clone(), RequestSigner::new(self.credentials))
            .with_authentication(feed.authenticate)
            .with_max_table_len(feed.max_table_len);
        client.connect().await.context("connecting to realtime API")?;
        client
            .subscribe(&feed.symbol, &[Topic::Quote, Topic::Position, Topic::Order])
            .await
            .context("subscribing")?;

        let metrics = context.metrics();
        tokio::select! {
            result = context.run(&mut client) => result.context("realtime feed")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "feed", "Interrupted, shutting down");
            }
        }

        tracing::info!(target: "feed", "Final metrics: {:?}", metrics.snapshot());
        Ok(())
    }
}

fn spawn_loggers(context: &FeedContext) {
    let quote = context.quote();
    tokio::spawn(async move {
        let mut sub = quote.subscribe();
        while let Some(Ok(q)) = sub.recv().await {
            tracing::info!(target: "quote", bid = %q.bid, ask = %q.ask);
        }
    });

    let position = context.position();
    tokio::spawn(async move {
        let mut sub = position.subscribe();
        while let Some(Ok(p)) = sub.recv().await {
            tracing::info!(target: "position", price = ?p.price, quantity = %p.quantity);
        }
    });

    let events = context.order_events();
    tokio::spawn(async move {
        let mut sub = events.subscribe();
        while let Some(Ok(batch)) = sub.recv().await {
            for order in batch.iter() {
                tracing::info!(target: "order_events", "{}", order.raw());
            }
        }
    });

    tokio::spawn(log_open_orders(context.open_orders()));
}

/// Open orders fail on the first REST error; resubscribe after a pause
async fn log_open_orders(stream: SharedStream<bitmex_streams::core::OrderSnapshot>) {
    loop {
        let mut sub = stream.subscribe();
        loop {
            match sub.recv().await {
                Some(Ok(snapshot)) => {
                    let ids: Vec<&str> = snapshot.iter().filter_map(|o| o.order_id()).collect();
                    tracing::info!(target: "orders", open = snapshot.len(), "{:?}", ids);
                }
                Some(Err(error)) => {
                    tracing::error!(target: "orders", "{}; retrying in {:?}", error, RESUBSCRIBE_DELAY);
                    break;
                }
                None => return,
            }
        }
        drop(sub);
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading config")?;
    let _guards = init_logging(&config.logging)?;

    let credentials = Credentials::from_env();
    if !credentials.is_complete() {
        tracing::warn!(
            target: "feed",
            "BITMEX_API_KEY / BITMEX_API_SECRET not set; position, order and REST data will be unavailable"
        );
    }

    StreamApp::new(config, credentials).run().await
}
