//! Observable field values.
//!
//! A [`Property`] holds one mutable value and a list of change listeners.
//! Assigning a different value swaps it in first and then notifies every
//! listener with `(old, new)`; assigning an equal value is silent.

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};

/// Change callback receiving `(old, new)`.
pub type Listener<T> = Box<dyn Fn(&T, &T)>;

pub struct Property<T> {
    value: RefCell<T>,
    listeners: RefCell<Vec<Listener<T>>>,
}

impl<T: Clone + PartialEq> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replaces the value and notifies listeners.
    ///
    /// Returns `false` without notifying when `value` equals the current one.
    /// Listeners run after the new value is visible through [`Property::get`].
    pub fn set(&self, value: T) -> bool {
        if *self.value.borrow() == value {
            return false;
        }

        let old = self.value.replace(value);
        let new = self.get();
        for listener in self.listeners.borrow().iter() {
            listener(&old, &new);
        }
        true
    }

    /// Registers a change listener. Listeners cannot be removed; they live as
    /// long as the property.
    pub fn subscribe(&self, listener: impl Fn(&T, &T) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl<T: Debug> Debug for Property<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.value.borrow().fmt(f)
    }
}
