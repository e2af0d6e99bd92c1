//! Mock notifier for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{Notifier, ServerEvent};

/// Records delivered events; optionally fails every send.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<String>>,
    count: AtomicUsize,
    fail: bool,
}

impl MockNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, event: &ServerEvent) -> Result<(), String> {
        if self.fail {
            return Err("mock failure".to_string());
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(event.message());
        Ok(())
    }
}

#[async_trait]
impl Notifier for Arc<MockNotifier> {
    async fn send(&self, event: &ServerEvent) -> Result<(), String> {
        self.as_ref().send(event).await
    }
}
