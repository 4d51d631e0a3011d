//! Reactive container capability.
//!
//! The engine never owns a reactive runtime; the host (a UI framework, a
//! test, the CLI) hands it one through [`ReactiveHost`]. The engine is the
//! only writer of the cells it creates and issues exactly one `set` per cell
//! per public operation.
//!
//! [`LocalHost`] is a small single-threaded implementation: each cell is an
//! `Rc<RefCell<T>>` with a write counter and change subscribers.
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// The three primitives a host must supply.
pub trait ReactiveHost {
    type Cell<T: Clone + 'static>;

    /// Create a fresh cell holding `initial`.
    fn create<T: Clone + 'static>(&self, initial: T) -> Self::Cell<T>;

    /// Current value of the cell.
    fn get<T: Clone + 'static>(&self, cell: &Self::Cell<T>) -> T;

    /// Store `value`; subsequent `get`s must observe it.
    fn set<T: Clone + 'static>(&self, cell: &Self::Cell<T>, value: T);
}

// ------------------------------- LocalHost -------------------------------- //

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalHost;

impl ReactiveHost for LocalHost {
    type Cell<T: Clone + 'static> = Signal<T>;

    fn create<T: Clone + 'static>(&self, initial: T) -> Signal<T> { Signal::new(initial) }
    fn get<T: Clone + 'static>(&self, cell: &Signal<T>) -> T { cell.get() }
    fn set<T: Clone + 'static>(&self, cell: &Signal<T>, value: T) { cell.set(value) }
}

type Subscriber<T> = Box<dyn Fn(&T)>;

struct Inner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<Subscriber<T>>>,
}

/// Shared, observable cell. Clones point at the same value.
pub struct Signal<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self { Self { inner: Rc::clone(&self.inner) } }
}

impl<T: Clone> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> T { self.inner.value.borrow().clone() }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&self.inner.value.borrow()) }

    /// Replace the value, bump the version and notify subscribers.
    /// Subscribers must not write back into the signal they observe.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.inner.version.set(self.inner.version.get() + 1);
        let value = self.inner.value.borrow();
        for subscriber in self.inner.subscribers.borrow().iter() {
            subscriber(&value);
        }
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 { self.inner.version.get() }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) {
        self.inner.subscribers.borrow_mut().push(Box::new(f));
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}
