//! State and command fan-out between device pollers, device drivers and the broker side.
//!
//! Pollers push readings with [`StatePublisher::send_state`]; every registered [`StateObserver`]
//! gets them synchronously. Commands travel the other way through [`CommandPublisher`]. Payloads
//! are wrapped in an [`Event`] so neither side has to share concrete types with the bus; a
//! consumer checks the type it understands and ignores the rest:
//!
//! ```
//! use std::sync::Arc;
//! use twomqtt::bus::{Event, StateObserver, StatePublisher};
//!
//! struct Reading { celsius: f64 }
//!
//! struct Printer;
//! impl StateObserver for Printer {
//!     fn receive_state(&self, event: &Event) {
//!         if let Some(r) = event.downcast_ref::<Reading>() {
//!             println!("{}", r.celsius);
//!         }
//!     }
//! }
//!
//! let bus = StatePublisher::default();
//! bus.register(Arc::new(Printer));
//! bus.send_state(Event::new(Reading { celsius: 21.5 }));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Opcode agreed between a command producer and the device driver consuming it
pub type Command = i64;

/// Type-tagged, cheaply clonable payload
#[derive(Clone)]
pub struct Event {
    type_id: TypeId,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Event {
    #[inline]
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Event { type_id: TypeId::of::<T>(), type_name: std::any::type_name::<T>(), payload: Arc::new(payload) }
    }

    /// Event with no payload, for commands that carry no parameters
    #[inline]
    pub fn empty() -> Self {
        Self::new(())
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// True when both events share the same payload allocation
    #[inline]
    pub fn ptr_eq(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.type_name)
    }
}

pub trait StateObserver: Sync + Send {
    fn receive_state(&self, event: &Event);
}

pub trait CommandObserver: Sync + Send {
    fn receive_command(&self, cmd: Command, event: &Event);
}

/// Identity set of observers.
///
/// Dispatch walks a snapshot taken under the read lock, so observers run without any lock held and
/// may register further observers from inside their callbacks.
pub struct Publisher<O: ?Sized> {
    observers: RwLock<Vec<Arc<O>>>,
}

pub type StatePublisher = Publisher<dyn StateObserver>;
pub type CommandPublisher = Publisher<dyn CommandObserver>;

impl<O: ?Sized> Default for Publisher<O> {
    fn default() -> Self {
        Publisher { observers: RwLock::new(Vec::new()) }
    }
}

impl<O: ?Sized> Publisher<O> {
    /// Adds `observer` unless the same instance is already registered. Returns whether it was added.
    pub fn register(&self, observer: Arc<O>) -> bool {
        let mut observers = self.observers.write();
        if observers.iter().any(|o| std::ptr::addr_eq(Arc::as_ptr(o), Arc::as_ptr(&observer))) {
            return false;
        }
        observers.push(observer);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    #[inline]
    fn snapshot(&self) -> Vec<Arc<O>> {
        self.observers.read().clone()
    }
}

impl Publisher<dyn StateObserver> {
    pub fn send_state(&self, event: Event) {
        log::debug!("Sending state to observers, {:?}", event);
        for o in self.snapshot() {
            o.receive_state(&event);
        }
        log::debug!("Finished sending state to observers");
    }
}

impl Publisher<dyn CommandObserver> {
    pub fn send_command(&self, cmd: Command, event: Event) {
        log::debug!("Sending command to observers, cmd: {}, {:?}", cmd, event);
        for o in self.snapshot() {
            o.receive_command(cmd, &event);
        }
        log::debug!("Finished sending command to observers");
    }
}

impl<O: ?Sized> fmt::Debug for Publisher<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Publisher {{ observers: {} }}", self.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<Event>>,
        commands: Mutex<Vec<(Command, Event)>>,
    }

    impl StateObserver for Recorder {
        fn receive_state(&self, event: &Event) {
            self.states.lock().push(event.clone());
        }
    }

    impl CommandObserver for Recorder {
        fn receive_command(&self, cmd: Command, event: &Event) {
            self.commands.lock().push((cmd, event.clone()));
        }
    }

    #[derive(Debug, PartialEq)]
    struct Reading(u32);

    #[test]
    fn test_event_type_discrimination() {
        let e = Event::new(Reading(7));
        assert!(e.is::<Reading>());
        assert!(!e.is::<u32>());
        assert_eq!(e.downcast_ref::<Reading>(), Some(&Reading(7)));
        assert!(e.downcast_ref::<String>().is_none());
        assert!(e.type_name().ends_with("Reading"));
        assert!(Event::empty().is::<()>());
        assert!(e.ptr_eq(&e.clone()));
        assert!(!e.ptr_eq(&Event::new(Reading(7))));
    }

    #[test]
    fn test_state_fan_out() {
        let bus = StatePublisher::default();
        let observers: Vec<Arc<Recorder>> = (0..3).map(|_| Arc::new(Recorder::default())).collect();
        for o in &observers {
            assert!(bus.register(o.clone()));
        }
        assert_eq!(bus.len(), 3);

        let e = Event::new(Reading(1));
        bus.send_state(e.clone());
        for o in &observers {
            let states = o.states.lock();
            assert_eq!(states.len(), 1);
            assert!(states[0].ptr_eq(&e));
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let bus = StatePublisher::default();
        let o = Arc::new(Recorder::default());
        assert!(bus.register(o.clone()));
        assert!(!bus.register(o.clone()));
        assert_eq!(bus.len(), 1);

        bus.send_state(Event::new(Reading(2)));
        assert_eq!(o.states.lock().len(), 1);
    }

    #[test]
    fn test_command_fan_out() {
        let bus = CommandPublisher::default();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        bus.register(a.clone());
        bus.register(b.clone());
        bus.register(a.clone());

        bus.send_command(42, Event::new("on".to_string()));
        for o in [&a, &b] {
            let commands = o.commands.lock();
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].0, 42);
            assert_eq!(commands[0].1.downcast_ref::<String>().map(String::as_str), Some("on"));
        }
    }

    #[test]
    fn test_no_retroactive_delivery() {
        let bus = StatePublisher::default();
        bus.send_state(Event::new(Reading(1)));
        let late = Arc::new(Recorder::default());
        bus.register(late.clone());
        assert!(late.states.lock().is_empty());
    }

    struct SelfRegistering {
        bus: Arc<StatePublisher>,
        other: Arc<Recorder>,
        calls: AtomicUsize,
    }

    impl StateObserver for SelfRegistering {
        fn receive_state(&self, _event: &Event) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bus.register(self.other.clone());
        }
    }

    #[test]
    fn test_register_during_dispatch() {
        let bus = Arc::new(StatePublisher::default());
        let other = Arc::new(Recorder::default());
        let o = Arc::new(SelfRegistering { bus: bus.clone(), other: other.clone(), calls: AtomicUsize::new(0) });
        bus.register(o.clone());

        bus.send_state(Event::new(Reading(1)));
        assert_eq!(o.calls.load(Ordering::SeqCst), 1);
        assert!(other.states.lock().is_empty());

        bus.send_state(Event::new(Reading(2)));
        assert_eq!(other.states.lock().len(), 1);
    }

    #[test]
    fn test_concurrent_register_and_send() {
        let bus = Arc::new(StatePublisher::default());
        let observers: Vec<Arc<Recorder>> = (0..8).map(|_| Arc::new(Recorder::default())).collect();

        std::thread::scope(|s| {
            for o in &observers {
                let bus = bus.clone();
                let o = o.clone();
                s.spawn(move || {
                    bus.register(o.clone());
                    bus.register(o);
                });
            }
            for _ in 0..4 {
                let bus = bus.clone();
                s.spawn(move || {
                    for i in 0..50 {
                        bus.send_state(Event::new(Reading(i)));
                    }
                });
            }
        });

        assert_eq!(bus.len(), 8);
        for o in &observers {
            assert!(o.states.lock().len() <= 200);
        }
    }
}
