//! Scripted in-memory gateway for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use super::gateway::{Command, CommandGateway, Result};

enum Step {
    Reply(Result<Option<Value>>),
    Held(oneshot::Receiver<()>, Result<Option<Value>>),
}

/// Replays queued responses per command name. Unscripted calls succeed with
/// no payload.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<HashMap<&'static str, VecDeque<Step>>>,
    calls: Mutex<Vec<Command>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, command: &'static str, result: Result<Option<Value>>) {
        self.push(command, Step::Reply(result));
    }

    pub fn progress(&self, values: &[u8]) {
        for value in values {
            self.reply("get_download_progress", Ok(Some(json!(value))));
        }
    }

    /// Queues a response that is only delivered once the returned sender fires
    /// (or is dropped).
    pub fn hold(&self, command: &'static str, result: Result<Option<Value>>) -> oneshot::Sender<()> {
        let (release, held) = oneshot::channel();
        self.push(command, Step::Held(held, result));
        release
    }

    pub fn calls(&self) -> Vec<Command> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.name() == command)
            .count()
    }

    fn push(&self, command: &'static str, step: Step) {
        self.script
            .lock()
            .unwrap()
            .entry(command)
            .or_default()
            .push_back(step);
    }
}

#[async_trait]
impl CommandGateway for ScriptedGateway {
    async fn invoke(&self, command: Command) -> Result<Option<Value>> {
        let step = self
            .script
            .lock()
            .unwrap()
            .get_mut(command.name())
            .and_then(VecDeque::pop_front);
        self.calls.lock().unwrap().push(command);

        match step {
            None => Ok(None),
            Some(Step::Reply(result)) => result,
            Some(Step::Held(held, result)) => {
                let _ = held.await;
                result
            }
        }
    }
}
