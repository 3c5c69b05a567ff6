//! The long-lived feed connection.
//!
//! One connection carries all four topic subscriptions. When it closes the
//! subscriber reopens it at once and re-issues every subscribe request; a
//! failed connect is retried after `retry_delay`. Only an endpoint that
//! cannot even be turned into a request ends [`Subscriber::run`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use txelevator_core::ElevatorError;
use txelevator_rpc::{Incoming, JsonRpcRequest};

use crate::handler::EventHandler;
use crate::topic::TopicRouter;

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Node WebSocket endpoint, e.g. `ws://127.0.0.1:28114`.
    pub ws_url: String,
    /// Pause after a failed connect attempt.
    pub retry_delay: Duration,
}

impl SubscriberConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Routes frames of one connection to the event handler.
pub struct Feed<'a> {
    router: TopicRouter,
    handler: &'a EventHandler,
}

impl<'a> Feed<'a> {
    pub fn new(handler: &'a EventHandler) -> Self {
        Self {
            router: TopicRouter::new(),
            handler,
        }
    }

    /// Requests to send right after the connection opens.
    pub fn open(&mut self) -> Vec<JsonRpcRequest> {
        self.router.subscribe_requests()
    }

    /// Handle one text frame. Failures are logged and never end the feed.
    pub async fn on_text(&mut self, text: &str) {
        let incoming = match Incoming::parse(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, "unparseable frame from node");
                return;
            }
        };

        match incoming {
            Incoming::Response(resp) => {
                if let Some((topic, subscription)) = self.router.on_response(resp) {
                    info!(%topic, %subscription, "subscribed");
                }
            }
            Incoming::Notification(params) => {
                let Some(topic) = self.router.route(&params.subscription) else {
                    debug!(subscription = %params.subscription, "push for unknown subscription");
                    return;
                };
                if let Err(e) = self.handler.dispatch(topic, &params).await {
                    error!(%topic, error = %e, "failed to apply feed event");
                }
            }
        }
    }
}

/// Node event feed subscriber. Owns the only writer path into the store.
pub struct Subscriber {
    config: SubscriberConfig,
    handler: EventHandler,
}

impl Subscriber {
    pub fn new(config: SubscriberConfig, handler: EventHandler) -> Self {
        Self { config, handler }
    }

    /// Run until the endpoint proves unusable. Never returns `Ok`.
    pub async fn run(&self) -> Result<(), ElevatorError> {
        loop {
            let request = self
                .config
                .ws_url
                .as_str()
                .into_client_request()
                .map_err(|e| fatal(&self.config.ws_url, e))?;

            info!(url = %self.config.ws_url, "connecting to node feed");
            match tokio_tungstenite::connect_async(request).await {
                Ok((stream, _)) => {
                    info!(url = %self.config.ws_url, "connected to node feed");
                    self.session(stream).await;
                    warn!(url = %self.config.ws_url, "node feed disconnected, reconnecting");
                }
                Err(e @ (tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_))) => {
                    return Err(fatal(&self.config.ws_url, e));
                }
                Err(e) => {
                    warn!(
                        url = %self.config.ws_url,
                        error = %e,
                        retry_in = ?self.config.retry_delay,
                        "node feed connect failed"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    async fn session<S>(&self, stream: tokio_tungstenite::WebSocketStream<S>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut source) = stream.split();
        let mut feed = Feed::new(&self.handler);

        for req in feed.open() {
            let text = match serde_json::to_string(&req) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "failed to encode subscribe request");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                warn!(error = %e, "failed to send subscribe request");
                return;
            }
        }

        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => feed.on_text(text.as_str()).await,
                Ok(Message::Ping(payload)) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return;
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "node closed the feed");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "node feed receive error");
                    return;
                }
            }
        }
    }
}

fn fatal(url: &str, e: tungstenite::Error) -> ElevatorError {
    ElevatorError::Config(format!("cannot build node feed request for {url}: {e}"))
}
