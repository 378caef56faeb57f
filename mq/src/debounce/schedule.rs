//! Per-topic pending reset timers

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::messages::ControllerRequest;

#[derive(Debug)]
struct PendingReset {
    generation: u64,
    timer: JoinHandle<()>,
}

/// At most one pending reset per topic
///
/// Each armed timer carries a generation number. A timer that fires after
/// being cancelled or replaced reports a generation that no longer matches,
/// and [`ResetSchedule::take_if_current`] rejects it.
#[derive(Debug, Default)]
pub struct ResetSchedule {
    pending: HashMap<String, PendingReset>,
    next_generation: u64,
}

impl ResetSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, topic: &str) -> bool {
        self.pending.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Armed topics, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.pending.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Cancel the pending reset for `topic`; returns whether one was pending
    pub fn cancel(&mut self, topic: &str) -> bool {
        match self.pending.remove(topic) {
            Some(pending) => {
                pending.timer.abort();
                debug!(%topic, generation = pending.generation, "ResetSchedule: cancelled");
                true
            }
            None => false,
        }
    }

    /// Arm a reset for `topic` after `delay`, replacing any pending one
    ///
    /// When the delay elapses a [`ControllerRequest::ResetElapsed`] is sent on
    /// `notify`. Returns the generation of the new timer.
    pub fn schedule(&mut self, topic: &str, delay: Duration, notify: mpsc::Sender<ControllerRequest>) -> u64 {
        self.cancel(topic);

        self.next_generation += 1;
        let generation = self.next_generation;
        let elapsed_topic = topic.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = notify
                .send(ControllerRequest::ResetElapsed {
                    topic: elapsed_topic,
                    generation,
                })
                .await;
        });

        debug!(%topic, generation, ?delay, "ResetSchedule: armed");
        self.pending.insert(topic.to_string(), PendingReset { generation, timer });
        generation
    }

    /// Consume the entry for `topic` if it still belongs to `generation`
    pub fn take_if_current(&mut self, topic: &str, generation: u64) -> bool {
        match self.pending.get(topic) {
            Some(pending) if pending.generation == generation => {
                self.pending.remove(topic);
                true
            }
            _ => false,
        }
    }

    /// Cancel everything; returns how many resets were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
        dropped
    }
}

impl Drop for ResetSchedule {
    fn drop(&mut self) {
        self.clear();
    }
}
