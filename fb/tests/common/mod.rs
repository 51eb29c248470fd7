//! Fixture host for integration tests
//!
//! Stands in for the CAD add-in: watches the command file, records each new
//! command, and answers through the response file.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fusionbridge::channel::{ChannelPaths, CommandEnvelope};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

/// What the fixture writes back for a command; `None` leaves it unanswered
pub type Responder = Box<dyn Fn(&CommandEnvelope) -> Option<String> + Send + Sync>;

pub struct FixtureHost {
    seen: Arc<Mutex<Vec<CommandEnvelope>>>,
    task: JoinHandle<()>,
}

impl FixtureHost {
    /// Watch `paths` and answer each new command after `delay`
    pub fn spawn(paths: ChannelPaths, delay: Duration, responder: Responder) -> Self {
        Self::spawn_with_marker(paths, delay, responder, false)
    }

    /// Like [`spawn`](Self::spawn), also touching the completion marker after each answer
    pub fn spawn_with_marker(paths: ChannelPaths, delay: Duration, responder: Responder, marker: bool) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        let task = tokio::spawn(async move {
            let mut last = String::new();
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let Ok(text) = tokio::fs::read_to_string(&paths.command).await else {
                    continue;
                };
                if text == last {
                    continue;
                }
                last = text.clone();

                let envelope: CommandEnvelope = serde_json::from_str(&text).expect("command file is not an envelope");
                recorded.lock().unwrap().push(envelope.clone());

                tokio::time::sleep(delay).await;
                if let Some(response) = responder(&envelope) {
                    tokio::fs::write(&paths.response, response).await.unwrap();
                    if marker {
                        tokio::fs::write(paths.marker(), "").await.unwrap();
                    }
                }
            }
        });

        Self { seen, task }
    }

    /// Commands observed so far, in order
    pub fn seen(&self) -> Vec<CommandEnvelope> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_names(&self) -> Vec<String> {
        self.seen().into_iter().map(|c| c.command).collect()
    }
}

impl Drop for FixtureHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Always answer with the same text
pub fn fixed(response: &'static str) -> Responder {
    Box::new(move |_| Some(response.to_string()))
}

/// Echo the `tag` parameter back as the result
pub fn echo_tag() -> Responder {
    Box::new(|cmd| {
        let tag = cmd.parameters.get("tag").cloned().unwrap_or(Value::Null);
        Some(json!({"status": "success", "result": {"tag": tag, "command": cmd.command}}).to_string())
    })
}

/// Succeed for every tool except `failing`, which reports `message`
pub fn fail_on(failing: &'static str, message: &'static str) -> Responder {
    Box::new(move |cmd| {
        let response = if cmd.command == failing {
            json!({"status": "error", "message": message, "traceback": "Traceback (most recent call last)"})
        } else {
            json!({"status": "success", "result": cmd.command})
        };
        Some(response.to_string())
    })
}
