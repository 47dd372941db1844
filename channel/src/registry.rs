use crate::event::ChannelEvent;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::rc::Rc;
use tracing::error;
use tracing::warn;

/// Subscriber callback. Identity is the `Rc` allocation, so keep the handle
/// around to unsubscribe later.
pub type Handler = Rc<dyn Fn(&ChannelEvent) -> anyhow::Result<()>>;

pub fn handler<F>(callback: F) -> Handler
where
    F: Fn(&ChannelEvent) -> anyhow::Result<()> + 'static,
{
    Rc::new(callback)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Event name to handlers, in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: HashMap<String, Vec<Handler>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the pair was already registered.
    pub fn on(&mut self, event_name: &str, handler: &Handler) -> bool {
        let entries = self.handlers.entry(event_name.to_string()).or_default();
        if entries.iter().any(|existing| Rc::ptr_eq(existing, handler)) {
            return false;
        }
        entries.push(Rc::clone(handler));
        true
    }

    /// Returns `false` when the pair was not registered.
    pub fn off(&mut self, event_name: &str, handler: &Handler) -> bool {
        let Some(entries) = self.handlers.get_mut(event_name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|existing| !Rc::ptr_eq(existing, handler));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.handlers.remove(event_name);
        }
        removed
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers.get(event_name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Delivers `event` to every handler registered under its name. A failing
    /// or panicking handler is logged and skipped.
    pub fn dispatch(&self, event: &ChannelEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(entries) = self.handlers.get(event.name()) else {
            return report;
        };
        for (index, entry) in entries.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| (**entry)(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(event = event.name(), index, error = %err, "event handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(event = event.name(), index, "event handler panicked");
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(&str, usize)> = self
            .handlers
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("SubscriptionRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;

    fn message(name: &str) -> ChannelEvent {
        ChannelEvent::Message {
            name: name.to_string(),
            payload: json!({}),
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Handler {
        let log = Rc::clone(log);
        handler(move |event| {
            log.borrow_mut().push(format!("{tag}:{}", event.name()));
            Ok(())
        })
    }

    #[test]
    fn duplicate_registration_is_delivered_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = recorder(&log, "a");
        let mut registry = SubscriptionRegistry::new();

        assert!(registry.on("navigation_update", &first));
        assert!(!registry.on("navigation_update", &first));
        registry.dispatch(&message("navigation_update"));

        assert_eq!(*log.borrow(), vec!["a:navigation_update".to_string()]);
    }

    #[test]
    fn same_handler_can_listen_to_several_names() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let shared = recorder(&log, "a");
        let mut registry = SubscriptionRegistry::new();
        registry.on("connect", &shared);
        registry.on("disconnect", &shared);

        registry.dispatch(&ChannelEvent::Connect);
        registry.dispatch(&ChannelEvent::Disconnect {
            reason: "transport close".to_string(),
        });

        assert_eq!(
            *log.borrow(),
            vec!["a:connect".to_string(), "a:disconnect".to_string()]
        );
    }

    #[test]
    fn dispatch_preserves_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        for tag in ["first", "second", "third"] {
            registry.on("tick", &recorder(&log, tag));
        }

        let report = registry.dispatch(&message("tick"));

        assert_eq!(report.delivered, 3);
        assert_eq!(
            *log.borrow(),
            vec![
                "first:tick".to_string(),
                "second:tick".to_string(),
                "third:tick".to_string()
            ]
        );
    }

    #[test]
    fn failing_handlers_do_not_block_later_ones() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        registry.on("tick", &handler(|_| anyhow::bail!("bad payload")));
        registry.on("tick", &handler(|_| panic!("handler bug")));
        registry.on("tick", &recorder(&log, "last"));

        let report = registry.dispatch(&message("tick"));

        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                failed: 2
            }
        );
        assert_eq!(*log.borrow(), vec!["last:tick".to_string()]);
    }

    #[test]
    fn removing_twice_is_a_no_op() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handle = recorder(&log, "a");
        let mut registry = SubscriptionRegistry::new();
        registry.on("tick", &handle);

        assert!(registry.off("tick", &handle));
        assert!(!registry.off("tick", &handle));
        assert!(!registry.off("never-registered", &handle));
        assert!(registry.is_empty());

        registry.dispatch(&message("tick"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn off_only_removes_the_named_registration() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handle = recorder(&log, "a");
        let mut registry = SubscriptionRegistry::new();
        registry.on("connect", &handle);
        registry.on("disconnect", &handle);

        registry.off("connect", &handle);

        assert_eq!(registry.handler_count("connect"), 0);
        assert_eq!(registry.handler_count("disconnect"), 1);
    }
}
