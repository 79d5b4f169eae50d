//! In-memory queue for listener tests

use super::{Notification, QueueService};
use crate::error::{RefresherError, RefresherResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer to `receive`
pub(crate) enum Delivery {
    Messages(Vec<Notification>),
    Unreachable(&'static str),
}

/// Queue that replays scripted deliveries and records settlements
#[derive(Default)]
pub(crate) struct FakeQueue {
    script: Mutex<VecDeque<Delivery>>,
    acknowledged: Mutex<Vec<String>>,
    abandoned: Mutex<Vec<String>>,
    fail_settlement: bool,
}

impl FakeQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A queue whose acknowledge/abandon calls always fail
    pub(crate) fn failing_settlement() -> Self {
        Self {
            fail_settlement: true,
            ..Self::default()
        }
    }

    pub(crate) fn push(&self, delivery: Delivery) {
        self.script.lock().unwrap().push_back(delivery);
    }

    /// Queue up a single notification with the given id
    pub(crate) fn push_one(&self, id: &str) {
        self.push(Delivery::Messages(vec![notification(id)]));
    }

    pub(crate) fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }

    pub(crate) fn abandoned(&self) -> Vec<String> {
        self.abandoned.lock().unwrap().clone()
    }
}

pub(crate) fn notification(id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        handle: format!("handle-{}", id),
        delivery_count: Some(1),
    }
}

#[async_trait]
impl QueueService for FakeQueue {
    fn service_name(&self) -> &'static str {
        "Fake"
    }

    fn describe(&self) -> String {
        "fake queue".to_string()
    }

    async fn connect(&self) -> RefresherResult<()> {
        Ok(())
    }

    async fn receive(&self, max: u32, _wait: Duration) -> RefresherResult<Vec<Notification>> {
        match self.script.lock().unwrap().pop_front() {
            Some(Delivery::Messages(mut messages)) => {
                messages.truncate(max as usize);
                Ok(messages)
            }
            Some(Delivery::Unreachable(reason)) => Err(RefresherError::transport("Fake", reason)),
            None => Ok(Vec::new()),
        }
    }

    async fn acknowledge(&self, notification: &Notification) -> RefresherResult<()> {
        if self.fail_settlement {
            return Err(RefresherError::transport("Fake", "acknowledge refused"));
        }
        self.acknowledged
            .lock()
            .unwrap()
            .push(notification.handle.clone());
        Ok(())
    }

    async fn abandon(&self, notification: &Notification) -> RefresherResult<()> {
        if self.fail_settlement {
            return Err(RefresherError::transport("Fake", "abandon refused"));
        }
        self.abandoned
            .lock()
            .unwrap()
            .push(notification.handle.clone());
        Ok(())
    }
}
