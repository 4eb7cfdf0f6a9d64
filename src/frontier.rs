//! Deduplicated FIFO of pending work items.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::model::WorkItem;

#[derive(Debug, Default, Clone)]
pub struct Frontier {
    queue: VecDeque<WorkItem>,
    links: HashSet<String>,
}

impl Frontier {
    /// Build the frontier from raw input, skipping anything already completed
    /// and collapsing duplicate links (first occurrence wins).
    pub fn load<I>(raw: I, completed: &HashSet<String>) -> Self
    where
        I: IntoIterator<Item = WorkItem>,
    {
        let mut frontier = Frontier::default();
        let mut skipped_done = 0usize;
        let mut skipped_dup = 0usize;

        for item in raw {
            if item.link.trim().is_empty() {
                warn!("Skipping work item without a link: {:?}", item.name);
                continue;
            }
            if completed.contains(&item.link) {
                skipped_done += 1;
                continue;
            }
            if !frontier.push(item) {
                skipped_dup += 1;
            }
        }

        debug!(
            pending = frontier.len(),
            skipped_done, skipped_dup, "frontier loaded"
        );
        frontier
    }

    /// Append to the back unless the link is already queued.
    pub fn push(&mut self, item: WorkItem) -> bool {
        if !self.links.insert(item.link.clone()) {
            return false;
        }
        self.queue.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        let item = self.queue.pop_front()?;
        self.links.remove(&item.link);
        Some(item)
    }

    /// Put an item back at the front, e.g. when its processing was abandoned.
    pub fn push_front(&mut self, item: WorkItem) {
        if self.contains(&item.link) {
            return;
        }
        self.links.insert(item.link.clone());
        self.queue.push_front(item);
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.queue.iter()
    }
}
