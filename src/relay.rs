//! Per-connection relay between a browser, the upstream planner and Gmail.
//!
//! A turn walks a fixed sequence: forward the question, read the derived
//! search query, page through matching mail forwarding genuine messages one
//! at a time, signal completion and read back the final answer. Only the
//! acknowledgment and answer waits are bounded; a timeout there yields an
//! absent value and the turn moves on.

use crate::config::{RelayConfig, DONE_TOKEN, EXIT_TOKEN, FINAL_PROMPT};
use crate::envelope::{Envelope, EnvelopeKind};
use crate::errors::{RelayError, RelayResult};
use crate::gmail_api::{MailAuthenticator, Mailbox};
use crate::utils::{is_promotional, remove_quotes};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Counters for one fetch-filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub total_checked: usize,
    pub total_nonpromo: usize,
}

/// What a single browser turn produced.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Send `answer` back to the browser. `None` when the answer wait timed out.
    Reply {
        answer: Option<String>,
        stats: FetchStats,
    },
    /// The turn failed; the browser gets no reply.
    Failed(RelayError),
    /// The browser asked to exit.
    Closed,
}

/// One browser session and its dedicated upstream planner connection.
pub struct RelaySession {
    id: Uuid,
    config: Arc<RelayConfig>,
    authenticator: Arc<dyn MailAuthenticator>,
    upstream: UpstreamStream,
}

impl RelaySession {
    /// Open the upstream planner connection for a new browser session.
    pub async fn connect(
        config: Arc<RelayConfig>,
        authenticator: Arc<dyn MailAuthenticator>,
    ) -> RelayResult<Self> {
        let id = Uuid::new_v4();
        debug!("[{}] Connecting to upstream planner at {}", id, config.upstream_url);

        let (upstream, _response) =
            connect_async(config.upstream_url.as_str())
                .await
                .map_err(|e| RelayError::Connect {
                    url: config.upstream_url.clone(),
                    reason: e.to_string(),
                })?;

        info!("[{}] Upstream planner connected", id);
        Ok(Self {
            id,
            config,
            authenticator,
            upstream,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run one browser turn to completion.
    pub async fn handle_turn(&mut self, msg: &str) -> TurnOutcome {
        info!("[{}] [BROWSER] {}", self.id, msg);

        if msg.eq_ignore_ascii_case(EXIT_TOKEN) {
            if let Err(e) = self.send(EnvelopeKind::Exit, EXIT_TOKEN).await {
                warn!("[{}] Failed to forward exit upstream: {}", self.id, e);
            }
            info!("[{}] Browser requested exit", self.id);
            return TurnOutcome::Closed;
        }

        match self.run_turn(msg).await {
            Ok((answer, stats)) => TurnOutcome::Reply { answer, stats },
            Err(e) => {
                error!("[{}] Turn failed: {}", self.id, e);
                TurnOutcome::Failed(e)
            }
        }
    }

    async fn run_turn(&mut self, msg: &str) -> RelayResult<(Option<String>, FetchStats)> {
        self.send(EnvelopeKind::Question, msg).await?;

        let query = self.recv(EnvelopeKind::Query).await?;
        let query = remove_quotes(&query.payload);
        info!("[{}] [SERVER] {}", self.id, query);

        let mailbox = self.authenticator.authenticate().await?;
        info!("[{}] Fetching emails with query: {}", self.id, query);

        let stats = self.fetch_and_forward(mailbox.as_ref(), &query).await?;
        info!(
            "[{}] Processed {} emails, kept {} genuine ones",
            self.id, stats.total_checked, stats.total_nonpromo
        );

        self.send(EnvelopeKind::Done, DONE_TOKEN).await?;
        let ack = self
            .recv_within(EnvelopeKind::Ack, self.config.done_ack_timeout)
            .await?;
        debug!("[{}] Done acknowledgment: {:?}", self.id, ack.map(|a| a.payload));

        self.send(EnvelopeKind::Prompt, FINAL_PROMPT).await?;
        let answer = self
            .recv_within(EnvelopeKind::Answer, self.config.answer_timeout)
            .await?
            .map(|a| a.payload);
        if answer.is_none() {
            warn!("[{}] Final answer timed out", self.id);
        }

        Ok((answer, stats))
    }

    /// Page through matching mail and forward every genuine message upstream.
    pub async fn fetch_and_forward(
        &mut self,
        mailbox: &dyn Mailbox,
        query: &str,
    ) -> RelayResult<FetchStats> {
        let max_results = self.config.max_results;
        let page_size = self.config.page_size;
        let mut stats = FetchStats::default();

        if max_results == 0 {
            return Ok(stats);
        }

        let mut page = mailbox.list_page(query, page_size, None).await?;

        'pages: while !page.message_ids.is_empty() {
            for message_id in &page.message_ids {
                stats.total_checked += 1;
                let message = mailbox.get_message(message_id).await?;

                let subject = message.subject.clone().unwrap_or_default();
                let snippet = message.snippet.clone().unwrap_or_default();
                if is_promotional(&subject, &snippet) {
                    debug!(
                        "[{}] [{}] Skipping promotional mail: {}",
                        self.id, stats.total_checked, subject
                    );
                    continue;
                }

                stats.total_nonpromo += 1;
                debug!(
                    "[{}] [{}] Keeping genuine mail: {}",
                    self.id, stats.total_checked, subject
                );

                self.send(EnvelopeKind::Date, message.date.as_deref().unwrap_or_default())
                    .await?;
                self.send(EnvelopeKind::Subject, &subject).await?;
                self.send(EnvelopeKind::Body, &message.body).await?;

                // Ack contents carry no meaning; they only pace the stream
                let ack = self
                    .recv_within(EnvelopeKind::Ack, self.config.ack_timeout)
                    .await?;
                if ack.is_none() {
                    debug!("[{}] No acknowledgment for {}", self.id, message_id);
                }

                if stats.total_nonpromo >= max_results {
                    break 'pages;
                }
            }

            match page.next_page_token.take() {
                Some(token) => {
                    page = mailbox.list_page(query, page_size, Some(&token)).await?;
                }
                None => break,
            }
        }

        Ok(stats)
    }

    /// Close the upstream connection. Errors are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.upstream.close(None).await {
            debug!("[{}] Upstream close: {}", self.id, e);
        }
        info!("[{}] Session closed", self.id);
    }

    async fn send(&mut self, kind: EnvelopeKind, payload: &str) -> RelayResult<()> {
        let frame = self
            .config
            .wire_format
            .encode(&Envelope::new(kind, payload))?;
        self.upstream.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Wait for the next frame of `expected` kind, skipping control frames.
    ///
    /// An acknowledgment that arrives after its wait elapsed is still in
    /// flight when the next wait starts; it is dropped here rather than read
    /// as the next frame.
    async fn recv(&mut self, expected: EnvelopeKind) -> RelayResult<Envelope> {
        loop {
            let text = match self.upstream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                Some(Ok(Message::Close(_))) | None => return Err(RelayError::UpstreamClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            let envelope = self.config.wire_format.parse(&text, expected)?;
            if envelope.kind == EnvelopeKind::Ack && expected != EnvelopeKind::Ack {
                debug!("[{}] Dropping late acknowledgment while waiting for {}", self.id, expected);
                continue;
            }
            return envelope.expect_kind(expected);
        }
    }

    /// Like `recv`, but an elapsed bound yields `None` instead of an error.
    async fn recv_within(
        &mut self,
        expected: EnvelopeKind,
        bound: Duration,
    ) -> RelayResult<Option<Envelope>> {
        let waited = tokio::time::timeout(bound, self.recv(expected)).await;
        match waited {
            Ok(result) => result.map(Some),
            Err(_) => {
                debug!("[{}] Timed out after {:?} waiting for {}", self.id, bound, expected);
                Ok(None)
            }
        }
    }
}
