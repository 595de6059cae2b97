use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

impl NoticeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub posted_at: Instant,
}

/// Transient user-facing messages plus the blocking yes/no prompt.
#[async_trait(?Send)]
pub trait Notifier {
    fn notify(&self, level: NoticeLevel, message: &str);

    async fn confirm(&self, message: &str) -> bool;
}

/// Headless notifier: keeps every notice and answers confirmations from a queue.
///
/// Notices expire `ttl` after posting; expiry is computed on read so no timer is needed.
#[derive(Debug)]
pub struct NotificationCenter {
    ttl: Duration,
    notices: RefCell<Vec<Notice>>,
    confirm_prompts: RefCell<Vec<String>>,
    queued_answers: RefCell<VecDeque<bool>>,
    default_answer: Cell<bool>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL)
    }
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            notices: RefCell::new(Vec::new()),
            confirm_prompts: RefCell::new(Vec::new()),
            queued_answers: RefCell::new(VecDeque::new()),
            default_answer: Cell::new(true),
        }
    }

    pub fn set_default_answer(&self, answer: bool) {
        self.default_answer.set(answer);
    }

    /// The next `confirm` call answers `answer` instead of the default.
    pub fn queue_answer(&self, answer: bool) {
        self.queued_answers.borrow_mut().push_back(answer);
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices
            .borrow()
            .iter()
            .map(|notice| notice.message.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.borrow().last().cloned()
    }

    pub fn visible(&self) -> Vec<Notice> {
        let now = Instant::now();
        self.notices
            .borrow()
            .iter()
            .filter(|notice| now.saturating_duration_since(notice.posted_at) < self.ttl)
            .cloned()
            .collect()
    }

    /// Drops notices whose TTL has passed; returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut notices = self.notices.borrow_mut();
        let before = notices.len();
        notices.retain(|notice| now.saturating_duration_since(notice.posted_at) < self.ttl);
        before - notices.len()
    }

    pub fn confirm_prompts(&self) -> Vec<String> {
        self.confirm_prompts.borrow().clone()
    }

    pub fn clear(&self) {
        self.notices.borrow_mut().clear();
        self.confirm_prompts.borrow_mut().clear();
    }
}

#[async_trait(?Send)]
impl Notifier for NotificationCenter {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.borrow_mut().push(Notice {
            level,
            message: message.to_string(),
            posted_at: Instant::now(),
        });
    }

    async fn confirm(&self, message: &str) -> bool {
        self.confirm_prompts.borrow_mut().push(message.to_string());
        let queued = self.queued_answers.borrow_mut().pop_front();
        queued.unwrap_or_else(|| self.default_answer.get())
    }
}
