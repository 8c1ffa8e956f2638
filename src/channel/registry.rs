//! Event name → ordered handler list.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    by_event: HashMap<String, Vec<(u64, Handler)>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to `event`'s list. Returns its id and whether it is the
    /// first handler for that event.
    pub fn add(&mut self, event: &str, handler: Handler) -> (u64, bool) {
        self.next_id += 1;
        let id = self.next_id;
        let list = self.by_event.entry(event.to_string()).or_default();
        list.push((id, handler));
        (id, list.len() == 1)
    }

    /// Remove exactly one handler. Returns true when that removal left the
    /// event with no handlers (the entry is dropped).
    pub fn remove(&mut self, event: &str, id: u64) -> bool {
        let Some(list) = self.by_event.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_event.remove(event);
            return removed;
        }
        false
    }

    /// Handlers in registration order, cloned so they can run outside the lock.
    pub fn handlers_for(&self, event: &str) -> Vec<Handler> {
        self.by_event
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<String> {
        self.by_event.keys().cloned().collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map_or(0, Vec::len)
    }
}
