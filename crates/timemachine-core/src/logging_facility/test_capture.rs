//! In-memory event capture for logging assertions in tests
//!
//! `init_test_capture` installs a global subscriber that records every
//! event of the test binary. Events from parallel tests share the buffer,
//! so assertions should key on something unique to the test: an op name,
//! a tag, a reason string.

use crate::core_types::schema::{
    is_terminal_event, EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_COMPONENT, FIELD_EVENT,
    FIELD_OP,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub component: Option<String>,
    pub op: Option<String>,
    pub event: Option<String>,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn is(&self, op: &str, event: &str) -> bool {
        self.op.as_deref() == Some(op) && self.event.as_deref() == Some(event)
    }
}

/// Start and terminal event counts for one operation name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Boundary {
    pub starts: usize,
    pub ends: usize,
    pub errors: usize,
}

impl Boundary {
    /// Every start has exactly one terminal event
    pub fn is_balanced(&self) -> bool {
        self.starts == self.ends + self.errors
    }
}

/// Strings are stored unquoted; everything else through its `Debug` form.
#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let fields = fields.0;
        let captured = CapturedEvent {
            level: *event.metadata().level(),
            component: fields.get(FIELD_COMPONENT).cloned(),
            op: fields.get(FIELD_OP).cloned(),
            event: fields.get(FIELD_EVENT).cloned(),
            fields,
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

/// Handle onto the captured events
#[derive(Clone, Default)]
pub struct TestCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TestCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CapturedEvent) -> bool,
    {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    /// First event for `op` with the given event name
    pub fn find(&self, op: &str, event: &str) -> Option<CapturedEvent> {
        self.events().into_iter().find(|e| e.is(op, event))
    }

    pub fn boundary(&self, op: &str) -> Boundary {
        let mut boundary = Boundary::default();
        for e in self.events() {
            if e.op.as_deref() != Some(op) {
                continue;
            }
            match e.event.as_deref() {
                Some(EVENT_START) => boundary.starts += 1,
                Some(EVENT_END) => boundary.ends += 1,
                Some(EVENT_END_ERROR) => boundary.errors += 1,
                _ => {}
            }
        }
        boundary
    }

    /// # Panics
    ///
    /// When no event for `op` named `event` was captured.
    pub fn assert_event_exists(&self, op: &str, event: &str) {
        let events = self.events();
        assert!(
            events.iter().any(|e| e.is(op, event)),
            "no {} event for op {} among {} captured events",
            event,
            op,
            events.len()
        );
    }

    /// # Panics
    ///
    /// When `op` was not closed by exactly one terminal event.
    pub fn assert_closed_once(&self, op: &str) {
        let terminal = self.count_events(|e| {
            e.op.as_deref() == Some(op) && e.event.as_deref().is_some_and(is_terminal_event)
        });
        assert_eq!(terminal, 1, "op {} has {} terminal events", op, terminal);
    }
}

static GLOBAL_CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture subscriber on first call and return the shared
/// handle.
///
/// ```
/// use timemachine_core::logging_facility::test_capture::init_test_capture;
/// use timemachine_core::log_op_start;
///
/// let capture = init_test_capture();
/// log_op_start!("list");
/// capture.assert_event_exists("list", "start");
/// ```
pub fn init_test_capture() -> TestCapture {
    GLOBAL_CAPTURE
        .get_or_init(|| {
            let capture = TestCapture::default();
            let layer = CaptureLayer {
                events: capture.events.clone(),
            };
            let _ = tracing_subscriber::registry().with(layer).try_init();
            capture
        })
        .clone()
}
