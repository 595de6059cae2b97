use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use futures::future::join_all;
use kontext_contracts::events::{EventPayload, EventWriter};
use serde_json::Value;

use crate::error::{error_chain_text, ValidationError};
use crate::gallery::SharedGallery;
use crate::gateway::RemoteGateway;
use crate::notify::{NoticeLevel, Notifier};
use crate::scheduler::{Scheduler, TimerKey};
use crate::surface::RenderSurface;

pub const CARD_REMOVAL_DELAY: Duration = Duration::from_millis(300);
pub const CARD_REMOVAL_STAGGER: Duration = Duration::from_millis(50);

const DELETE_ONE_PROMPT: &str =
    "Are you sure you want to delete this image? This action cannot be undone.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Counts settled operations and reports `true` exactly once, when the last one settles.
#[derive(Debug)]
struct SettleCounter {
    total: usize,
    settled: Cell<usize>,
}

impl SettleCounter {
    fn new(total: usize) -> Self {
        Self {
            total,
            settled: Cell::new(0),
        }
    }

    fn settle(&self) -> bool {
        let settled = self.settled.get() + 1;
        self.settled.set(settled);
        settled == self.total
    }
}

/// Selection and deletion over the gallery.
pub struct GalleryCommands {
    gateway: Rc<dyn RemoteGateway>,
    gallery: SharedGallery,
    surface: Rc<dyn RenderSurface>,
    scheduler: Rc<Scheduler>,
    notifier: Rc<dyn Notifier>,
    events: EventWriter,
}

impl GalleryCommands {
    pub fn new(
        gateway: Rc<dyn RemoteGateway>,
        gallery: SharedGallery,
        surface: Rc<dyn RenderSurface>,
        scheduler: Rc<Scheduler>,
        notifier: Rc<dyn Notifier>,
        events: EventWriter,
    ) -> Self {
        Self {
            gateway,
            gallery,
            surface,
            scheduler,
            notifier,
            events,
        }
    }

    pub fn select(&self, ids: &[String]) -> usize {
        let selected = {
            let mut gallery = self.gallery.borrow_mut();
            ids.iter().filter(|id| gallery.select(id)).count()
        };
        self.sync_selection();
        selected
    }

    pub fn deselect(&self, ids: &[String]) -> usize {
        let removed = {
            let mut gallery = self.gallery.borrow_mut();
            ids.iter().filter(|id| gallery.deselect(id)).count()
        };
        self.sync_selection();
        removed
    }

    pub fn toggle(&self, id: &str) -> bool {
        let selected = self.gallery.borrow_mut().toggle(id);
        self.sync_selection();
        selected
    }

    pub fn select_all(&self) -> usize {
        let selected = self.gallery.borrow_mut().select_all();
        self.sync_selection();
        selected
    }

    pub fn deselect_all(&self) {
        self.gallery.borrow_mut().deselect_all();
        self.sync_selection();
    }

    fn sync_selection(&self) {
        let visible = self.gallery.borrow().has_selection();
        self.surface.set_bulk_actions_visible(visible);
    }

    /// Copies a record's prompt for the form; `None` when the id is unknown.
    pub fn use_prompt(&self, id: &str) -> Option<String> {
        let prompt = self
            .gallery
            .borrow()
            .get(id)
            .map(|record| record.prompt.clone())?;
        self.notifier.notify(NoticeLevel::Info, "Prompt copied to input");
        Some(prompt)
    }

    pub async fn delete(&self, id: &str) -> DeleteOutcome {
        if !self.notifier.confirm(DELETE_ONE_PROMPT).await {
            return DeleteOutcome::Cancelled;
        }
        if self.remove_remote(id, CARD_REMOVAL_DELAY).await {
            self.surface.refresh(&self.gallery.borrow());
            self.sync_selection();
            self.notifier
                .notify(NoticeLevel::Success, "Image deleted successfully");
            DeleteOutcome::Deleted
        } else {
            self.notifier
                .notify(NoticeLevel::Error, "Failed to delete image");
            DeleteOutcome::Failed
        }
    }

    /// Deletes every selected record concurrently; `Ok(None)` when the user declined.
    pub async fn delete_selected(&self) -> Result<Option<BatchOutcome>, ValidationError> {
        let ids = self.gallery.borrow().selected_ids();
        if ids.is_empty() {
            let err = ValidationError::NoSelection;
            self.notifier.notify(NoticeLevel::Error, &err.to_string());
            return Err(err);
        }
        let prompt = format!(
            "Are you sure you want to delete {} selected image(s)? This action cannot be undone.",
            ids.len()
        );
        if !self.notifier.confirm(&prompt).await {
            return Ok(None);
        }

        let total = ids.len();
        let counter = SettleCounter::new(total);
        let deletes = ids.iter().enumerate().map(|(index, id)| {
            let counter = &counter;
            async move {
                let delay = CARD_REMOVAL_DELAY + CARD_REMOVAL_STAGGER * index as u32;
                let deleted = self.remove_remote(id, delay).await;
                if counter.settle() {
                    self.finish_batch(total);
                }
                deleted
            }
        });
        let results = join_all(deletes).await;

        let succeeded = results.iter().filter(|deleted| **deleted).count();
        let outcome = BatchOutcome {
            requested: total,
            succeeded,
            failed: total - succeeded,
        };
        if outcome.succeeded > 0 {
            self.notifier.notify(
                NoticeLevel::Success,
                &format!("Successfully deleted {} image(s)", outcome.succeeded),
            );
        }
        if outcome.failed > 0 {
            self.notifier.notify(
                NoticeLevel::Error,
                &format!("Failed to delete {} image(s)", outcome.failed),
            );
        }
        Ok(Some(outcome))
    }

    fn finish_batch(&self, requested: usize) {
        self.surface.refresh(&self.gallery.borrow());
        self.sync_selection();
        let mut payload = EventPayload::new();
        payload.insert("requested".to_string(), Value::from(requested));
        payload.insert(
            "remaining_selected".to_string(),
            Value::from(self.gallery.borrow().selection_len()),
        );
        self.events.record("bulk_delete_settled", payload);
    }

    /// Removes locally only after the remote delete succeeded.
    async fn remove_remote(&self, id: &str, card_delay: Duration) -> bool {
        let result = self.gateway.delete_record(id).await;
        let mut payload = EventPayload::new();
        payload.insert("id".to_string(), Value::String(id.to_string()));
        match result {
            Ok(true) => {
                self.gallery.borrow_mut().remove(id);
                self.scheduler
                    .schedule(TimerKey::CardRemoval(id.to_string()), card_delay);
                self.events.record("delete_completed", payload);
                true
            }
            Ok(false) => {
                payload.insert(
                    "error".to_string(),
                    Value::String("server refused delete".to_string()),
                );
                self.events.record("delete_failed", payload);
                false
            }
            Err(err) => {
                payload.insert(
                    "error".to_string(),
                    Value::String(error_chain_text(&err, 2000)),
                );
                self.events.record("delete_failed", payload);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kontext_contracts::events::{event_types, read_events};

    use super::*;
    use crate::gallery::GalleryStore;
    use crate::notify::NotificationCenter;
    use crate::surface::MemorySurface;
    use crate::test_support::{record, temp_events, FakeGateway};

    struct Rig {
        gateway: Rc<FakeGateway>,
        gallery: SharedGallery,
        memory: Rc<MemorySurface>,
        scheduler: Rc<Scheduler>,
        center: Rc<NotificationCenter>,
        commands: GalleryCommands,
        events: EventWriter,
    }

    fn rig(gateway: FakeGateway, events: EventWriter, ids: &[&str]) -> Rig {
        let gateway = Rc::new(gateway);
        let gallery = GalleryStore::shared();
        gallery
            .borrow_mut()
            .hydrate(ids.iter().map(|id| record(id)).collect());
        let memory = Rc::new(MemorySurface::new());
        memory.replace_cards(&gallery.borrow().snapshot());
        let scheduler = Rc::new(Scheduler::new());
        let center = Rc::new(NotificationCenter::default());
        let commands = GalleryCommands::new(
            gateway.clone(),
            Rc::clone(&gallery),
            memory.clone(),
            Rc::clone(&scheduler),
            center.clone(),
            events.clone(),
        );
        Rig {
            gateway,
            gallery,
            memory,
            scheduler,
            center,
            commands,
            events,
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn selection_drives_bulk_action_visibility() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let rig = rig(FakeGateway::new(), events, &["a", "b", "c"]);

        assert_eq!(rig.commands.select(&ids(&["a", "ghost"])), 1);
        assert!(rig.memory.bulk_actions_visible());
        assert!(rig.commands.toggle("b"));
        assert_eq!(rig.commands.deselect(&ids(&["a", "b"])), 2);
        assert!(!rig.memory.bulk_actions_visible());
        assert_eq!(rig.commands.select_all(), 3);
        rig.commands.deselect_all();
        assert!(!rig.memory.bulk_actions_visible());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn single_delete_waits_for_remote_then_animates_out() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let gateway = FakeGateway::new();
        gateway.fail_delete("b");
        let rig = rig(gateway, events, &["a", "b"]);

        rig.center.queue_answer(false);
        assert_eq!(rig.commands.delete("a").await, DeleteOutcome::Cancelled);
        assert!(rig.gateway.deletes.borrow().is_empty());

        assert_eq!(rig.commands.delete("a").await, DeleteOutcome::Deleted);
        assert_eq!(rig.gallery.borrow().ids(), vec!["b"]);
        assert!(rig
            .scheduler
            .is_pending(&TimerKey::CardRemoval("a".to_string())));
        assert_eq!(rig.memory.card_ids(), vec!["a", "b"]);

        assert_eq!(rig.commands.delete("b").await, DeleteOutcome::Failed);
        assert_eq!(rig.gallery.borrow().ids(), vec!["b"]);
        assert_eq!(
            rig.center.messages(),
            vec!["Image deleted successfully", "Failed to delete image"]
        );
        assert_eq!(
            rig.center.confirm_prompts()[0],
            "Are you sure you want to delete this image? This action cannot be undone."
        );

        let due = rig.scheduler.wait_next().await;
        assert_eq!(due, vec![TimerKey::CardRemoval("a".to_string())]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_delete_settles_into_one_refresh() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let gateway = FakeGateway::new().with_delay(Duration::from_millis(80));
        gateway.fail_delete("c");
        let rig = rig(gateway, events, &["a", "b", "c", "d"]);
        rig.commands.select(&ids(&["a", "b", "c"]));
        let refreshes_before = rig.memory.refresh_count();

        let outcome = rig.commands.delete_selected().await?;
        assert_eq!(
            outcome,
            Some(BatchOutcome {
                requested: 3,
                succeeded: 2,
                failed: 1
            })
        );
        assert_eq!(rig.memory.refresh_count() - refreshes_before, 1);
        assert_eq!(rig.gallery.borrow().ids(), vec!["c", "d"]);
        assert_eq!(rig.gallery.borrow().selected_ids(), vec!["c"]);
        assert!(rig.memory.bulk_actions_visible());
        assert_eq!(*rig.gateway.deletes.borrow(), vec!["a", "b", "c"]);
        assert_eq!(
            rig.center.confirm_prompts(),
            vec!["Are you sure you want to delete 3 selected image(s)? This action cannot be undone."]
        );
        assert_eq!(
            rig.center.messages(),
            vec!["Successfully deleted 2 image(s)", "Failed to delete 1 image(s)"]
        );

        // Card removals are staggered: a at 300 ms, b at 350 ms.
        assert_eq!(
            rig.scheduler.wait_next().await,
            vec![TimerKey::CardRemoval("a".to_string())]
        );
        assert_eq!(
            rig.scheduler.wait_next().await,
            vec![TimerKey::CardRemoval("b".to_string())]
        );

        let types = event_types(&read_events(rig.events.path())?);
        assert_eq!(types.iter().filter(|kind| *kind == "bulk_delete_settled").count(), 1);
        assert_eq!(types.last().map(String::as_str), Some("bulk_delete_settled"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refused_deletes_keep_their_records() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let gateway = FakeGateway::new().with_delay(Duration::from_millis(20));
        gateway.refuse_delete("a");
        gateway.refuse_delete("c");
        let rig = rig(gateway, events, &["a", "b", "c"]);

        assert_eq!(rig.commands.delete("a").await, DeleteOutcome::Failed);
        assert_eq!(rig.gallery.borrow().ids(), vec!["a", "b", "c"]);
        assert!(!rig
            .scheduler
            .is_pending(&TimerKey::CardRemoval("a".to_string())));

        rig.commands.select(&ids(&["b", "c"]));
        let refreshes_before = rig.memory.refresh_count();
        let outcome = rig.commands.delete_selected().await?;
        assert_eq!(
            outcome,
            Some(BatchOutcome {
                requested: 2,
                succeeded: 1,
                failed: 1
            })
        );
        assert_eq!(rig.memory.refresh_count() - refreshes_before, 1);
        assert_eq!(rig.gallery.borrow().ids(), vec!["a", "c"]);
        assert_eq!(rig.gallery.borrow().selected_ids(), vec!["c"]);
        assert_eq!(
            rig.center.messages(),
            vec![
                "Failed to delete image",
                "Successfully deleted 1 image(s)",
                "Failed to delete 1 image(s)"
            ]
        );

        let failed = read_events(rig.events.path())?
            .into_iter()
            .filter(|event| event["type"] == "delete_failed")
            .count();
        assert_eq!(failed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn bulk_delete_needs_a_selection() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let rig = rig(FakeGateway::new(), events, &["a"]);

        assert_eq!(
            rig.commands.delete_selected().await,
            Err(ValidationError::NoSelection)
        );
        assert!(rig.center.confirm_prompts().is_empty());

        rig.commands.select_all();
        rig.center.queue_answer(false);
        assert_eq!(rig.commands.delete_selected().await, Ok(None));
        assert!(rig.gateway.deletes.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn use_prompt_copies_known_records_only() -> anyhow::Result<()> {
        let (_temp, events) = temp_events()?;
        let rig = rig(FakeGateway::new(), events, &["a"]);

        assert_eq!(rig.commands.use_prompt("a").as_deref(), Some("prompt for a"));
        assert_eq!(rig.commands.use_prompt("ghost"), None);
        assert_eq!(rig.center.messages(), vec!["Prompt copied to input"]);
        Ok(())
    }
}
