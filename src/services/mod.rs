pub mod allocation;
pub mod availability;
pub mod booking;
pub mod expiry;
pub mod notifications;
pub mod participants;
pub mod payments;
pub mod pricing;
pub mod refunds;

#[cfg(test)]
pub(crate) mod testing;

use notifications::Notification;

/// A committed state change plus the notifications it should trigger.
/// Dispatch happens after the database lock is released.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, notifications: Vec<Notification>) -> Self {
        Self {
            value,
            notifications,
        }
    }
}
