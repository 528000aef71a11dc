//! Change notifications delivered to chat-robot webhooks.
//!
//! Notifications are fire-and-forget: [`Notifier::notify`] only enqueues, and a
//! background worker posts each message on its own task. A slow or failing
//! webhook therefore never holds up a polling cycle. [`NotifierWorker::join`]
//! resolves once every [`Notifier`] clone is dropped and all in-flight
//! deliveries have finished.

use chrono::Utc;
use log::{error, info, warn};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

use crate::config::{PhoneBook, ProjectConfig};
use crate::models::ProjectStatus;

const QUEUE_CAPACITY: usize = 256;
const BOT_PREFIX: &str = "[CI Bot]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    CommitChange,
    PipelineChange,
    /// Not produced by [`detect_changes`]; composes the generic message.
    #[allow(dead_code)]
    Other(String),
}

impl ChangeEvent {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CommitChange => "commit_change",
            Self::PipelineChange => "pipeline_change",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transitions between two consecutive observations of the same project.
pub fn detect_changes(previous: &ProjectStatus, current: &ProjectStatus) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    if previous.development.commit.sha != current.development.commit.sha {
        events.push(ChangeEvent::CommitChange);
    }
    if previous.development.pipeline.status != current.development.pipeline.status
        || previous.release.pipeline.status != current.release.pipeline.status
    {
        events.push(ChangeEvent::PipelineChange);
    }

    events
}

#[derive(Debug, Serialize)]
struct RobotMessage<'a> {
    msgtype: &'static str,
    text: RobotText<'a>,
    at: RobotAt<'a>,
}

#[derive(Debug, Serialize)]
struct RobotText<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RobotAt<'a> {
    is_at_all: bool,
    at_mobiles: &'a [String],
}

/// A fully composed message ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub project: String,
    pub event: ChangeEvent,
    pub endpoint: String,
    pub content: String,
    pub mobiles: Vec<String>,
}

impl Notification {
    /// Builds the notification for `event`, or `None` when the project has no
    /// webhook configured.
    pub fn compose(
        event: ChangeEvent,
        project: &ProjectConfig,
        status: &ProjectStatus,
        phone_books: &[PhoneBook],
    ) -> Option<Self> {
        if project.message_group.is_empty() {
            return None;
        }

        let names: Vec<&str> = project.message_at.split(',').map(str::trim).collect();
        let mobiles = resolve_mobiles(&names, phone_books);

        let mut content = String::new();
        if !names.is_empty() {
            content.push_str(BOT_PREFIX);
        }
        content.push_str(&message_body(&event, status));

        Some(Self {
            project: status.name.clone(),
            event,
            endpoint: project.message_group.clone(),
            content,
            mobiles,
        })
    }

    fn payload(&self) -> RobotMessage<'_> {
        RobotMessage {
            msgtype: "text",
            text: RobotText {
                content: &self.content,
            },
            at: RobotAt {
                is_at_all: false,
                at_mobiles: &self.mobiles,
            },
        }
    }
}

fn resolve_mobiles(names: &[&str], phone_books: &[PhoneBook]) -> Vec<String> {
    names
        .iter()
        .flat_map(|name| {
            phone_books
                .iter()
                .filter(move |entry| entry.name == *name)
                .map(|entry| entry.phone.clone())
        })
        .collect()
}

fn message_body(event: &ChangeEvent, status: &ProjectStatus) -> String {
    let dev = &status.development;
    let rel = &status.release;

    match event {
        ChangeEvent::CommitChange => format!(
            "Project [{}] has a new commit\nIntro: {}\nBranch: {}\nCommit SHA: {}\nAuthor: {}\nCommitted at: {}\nMessage: {}\nCommit CI status: {}\nRelease SHA: {}\nAuthor: {}\nCommitted at: {}\nMessage: {}\nRelease CI status: {}",
            status.name,
            status.intro,
            status.branch,
            dev.commit.short_sha,
            dev.commit.author,
            dev.commit.created_at,
            dev.commit.message,
            dev.pipeline.status,
            rel.commit.short_sha,
            rel.commit.author,
            rel.commit.created_at,
            rel.commit.message,
            rel.pipeline.status,
        ),
        ChangeEvent::PipelineChange => format!(
            "Project [{}] pipeline status changed\nCommit CI status: {}\nRelease CI status: {}",
            status.name, dev.pipeline.status, rel.pipeline.status,
        ),
        ChangeEvent::Other(kind) => format!("Project [{}] has event: {kind}", status.name),
    }
}

/// Appends the millisecond `timestamp` query parameter the robot API expects.
fn timestamped_url(endpoint: &str, millis: i64) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut()
        .append_pair("timestamp", &millis.to_string());
    Ok(url)
}

/// Cloneable handle used by fetchers to enqueue notifications.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

pub struct NotifierWorker {
    handle: JoinHandle<()>,
}

impl Notifier {
    pub fn spawn(client: Client) -> (Self, NotifierWorker) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run_worker(client, rx));

        (Self { tx }, NotifierWorker { handle })
    }

    /// Queues `notification` without waiting. A full queue drops it.
    pub fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            let dropped = match &e {
                mpsc::error::TrySendError::Full(n) | mpsc::error::TrySendError::Closed(n) => n,
            };
            warn!(
                "[{}] dropping {} notification: {e}",
                dropped.project, dropped.event
            );
        }
    }
}

impl NotifierWorker {
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Notifier worker stopped abnormally: {e}");
        }
    }
}

async fn run_worker(client: Client, mut rx: mpsc::Receiver<Notification>) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(notification) => {
                    in_flight.spawn(deliver(client.clone(), notification));
                }
                None => break,
            },
            Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = finished {
                    error!("Webhook delivery task failed: {e}");
                }
            }
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        if let Err(e) = finished {
            error!("Webhook delivery task failed: {e}");
        }
    }
}

async fn deliver(client: Client, notification: Notification) {
    let project = &notification.project;

    let url = match timestamped_url(&notification.endpoint, Utc::now().timestamp_millis()) {
        Ok(url) => url,
        Err(e) => {
            error!("[{project}] invalid webhook URL: {e}");
            return;
        }
    };

    let response = match client.post(url).json(&notification.payload()).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("[{project}] webhook delivery failed: {e}");
            return;
        }
    };

    let status = response.status();
    match response.text().await {
        Ok(body) => info!(
            "[{project}] webhook delivered: {} status {status}, body: {body}",
            notification.event
        ),
        Err(e) => error!("[{project}] failed to read webhook response: {e}"),
    }
}
