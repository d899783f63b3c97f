//! Shared test doubles: a scripted upstream planner on a loopback websocket
//! and an in-memory mailbox that serves one message per page.
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gmail_relay::errors::{GmailApiError, GmailResult};
use gmail_relay::gmail_api::MessagePage;
use gmail_relay::{EmailMessage, Envelope, EnvelopeKind, MailAuthenticator, Mailbox, WireFormat};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// ---------------------------------------------------------------------------
// Mail doubles
// ---------------------------------------------------------------------------

pub fn genuine(id: &str, subject: &str) -> EmailMessage {
    EmailMessage {
        id: id.to_string(),
        thread_id: id.to_string(),
        subject: Some(subject.to_string()),
        from: Some("orders@zomato.com".to_string()),
        date: Some("Mon, 14 Apr 2025 10:00:00 +0530".to_string()),
        snippet: Some("Your order was delivered. Amount paid Rs 250.50".to_string()),
        body: format!("Body of {}", id),
    }
}

pub fn promotional(id: &str) -> EmailMessage {
    EmailMessage {
        id: id.to_string(),
        thread_id: id.to_string(),
        subject: Some("Flat 50% OFF this weekend".to_string()),
        from: Some("promo@zomato.com".to_string()),
        date: Some("Tue, 15 Apr 2025 09:00:00 +0530".to_string()),
        snippet: Some("Hurry, limited time only".to_string()),
        body: "promo body".to_string(),
    }
}

/// Serves `messages` `page_size` at a time, using the next index as page token.
#[derive(Clone)]
pub struct FakeMailbox {
    pub messages: Arc<Vec<EmailMessage>>,
    pub list_calls: Arc<AtomicUsize>,
    pub queries: Arc<Mutex<Vec<String>>>,
    pub fail_get: bool,
}

impl FakeMailbox {
    pub fn new(messages: Vec<EmailMessage>) -> Self {
        Self {
            messages: Arc::new(messages),
            list_calls: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
            fail_get: false,
        }
    }

    pub fn failing(messages: Vec<EmailMessage>) -> Self {
        let mut mailbox = Self::new(messages);
        mailbox.fail_get = true;
        mailbox
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn list_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> GmailResult<MessagePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        let start = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + page_size as usize).min(self.messages.len());
        let message_ids = self.messages[start.min(end)..end]
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = if end < self.messages.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(MessagePage {
            message_ids,
            next_page_token,
        })
    }

    async fn get_message(&self, message_id: &str) -> GmailResult<EmailMessage> {
        if self.fail_get {
            return Err(GmailApiError::NetworkError("connection reset".to_string()));
        }
        self.messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| GmailApiError::MessageRetrievalError(message_id.to_string()))
    }
}

pub struct FakeAuthenticator {
    pub mailbox: FakeMailbox,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn new(mailbox: FakeMailbox) -> Arc<Self> {
        Arc::new(Self {
            mailbox,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            mailbox: FakeMailbox::new(Vec::new()),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MailAuthenticator for FakeAuthenticator {
    async fn authenticate(&self) -> GmailResult<Box<dyn Mailbox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GmailApiError::AuthError("token expired".to_string()));
        }
        Ok(Box::new(self.mailbox.clone()))
    }
}

// ---------------------------------------------------------------------------
// Planner double
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PlannerScript {
    pub format: WireFormat,
    /// Acknowledge each message triple and the completion token.
    pub acknowledge: bool,
    /// Final answer; `None` never answers.
    pub answer: Option<String>,
    /// How the derived query is built from the question.
    pub query_for: fn(&str) -> String,
    /// Pause before acknowledging a message triple.
    pub ack_delay: Duration,
    /// Pause before acknowledging the completion token.
    pub done_ack_delay: Duration,
}

impl PlannerScript {
    pub fn cooperative(answer: &str) -> Self {
        Self {
            format: WireFormat::Tagged,
            acknowledge: true,
            answer: Some(answer.to_string()),
            query_for: quoted_query,
            ack_delay: Duration::ZERO,
            done_ack_delay: Duration::ZERO,
        }
    }

    pub fn silent_acks(answer: &str) -> Self {
        Self {
            acknowledge: false,
            ..Self::cooperative(answer)
        }
    }
}

/// Wraps the question in assorted quote characters, like a model would.
pub fn quoted_query(question: &str) -> String {
    format!("“{}” 'INR' after:`2025/01/01`", question)
}

/// Frames the planner saw, tagged with the connection index.
pub type Recorded = mpsc::UnboundedReceiver<(usize, Envelope)>;

/// Start a planner accepting `connections` websocket clients.
///
/// The returned receiver closes once every connection has ended.
pub async fn spawn_planner(script: PlannerScript, connections: usize) -> (String, Recorded) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for index in 0..connections {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let tx = tx.clone();
            let script = script.clone();
            tokio::spawn(async move {
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                run_planner_connection(index, ws, script, tx).await;
            });
        }
    });

    (url, rx)
}

async fn run_planner_connection(
    index: usize,
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    script: PlannerScript,
    tx: mpsc::UnboundedSender<(usize, Envelope)>,
) {
    let mut expect_question = true;
    let mut field = 0usize;

    while let Some(Ok(frame)) = ws.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let envelope = match script.format {
            WireFormat::Tagged => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => envelope,
                Err(_) => continue,
            },
            WireFormat::Plain => {
                let kind = if expect_question {
                    expect_question = false;
                    if text == "exit" {
                        EnvelopeKind::Exit
                    } else {
                        EnvelopeKind::Question
                    }
                } else if text == "Done" {
                    EnvelopeKind::Done
                } else if text == "How is it Going?" {
                    expect_question = true;
                    EnvelopeKind::Prompt
                } else {
                    field += 1;
                    match field % 3 {
                        1 => EnvelopeKind::Date,
                        2 => EnvelopeKind::Subject,
                        _ => EnvelopeKind::Body,
                    }
                };
                Envelope::new(kind, text)
            }
        };

        let _ = tx.send((index, envelope.clone()));

        let delay = match envelope.kind {
            EnvelopeKind::Body => script.ack_delay,
            EnvelopeKind::Done => script.done_ack_delay,
            _ => Duration::ZERO,
        };
        if script.acknowledge && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = match envelope.kind {
            EnvelopeKind::Question => Some(Envelope::new(
                EnvelopeKind::Query,
                (script.query_for)(&envelope.payload),
            )),
            EnvelopeKind::Body | EnvelopeKind::Done if script.acknowledge => {
                Some(Envelope::new(EnvelopeKind::Ack, "ok"))
            }
            EnvelopeKind::Prompt => script
                .answer
                .clone()
                .map(|answer| Envelope::new(EnvelopeKind::Answer, answer)),
            _ => None,
        };

        if let Some(reply) = reply {
            let frame = script.format.encode(&reply).unwrap();
            if ws.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    }
}

/// Collect everything the planner recorded until all its connections closed.
pub async fn collect(mut rx: Recorded) -> Vec<(usize, Envelope)> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
        frames.push(frame);
    }
    frames
}

pub fn kinds(frames: &[(usize, Envelope)]) -> Vec<EnvelopeKind> {
    frames.iter().map(|(_, e)| e.kind).collect()
}
