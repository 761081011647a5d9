// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use kanal::{Receiver, Sender};

/// Single writer, multi subscriber notification.
///
/// Each call to [`Signal::connect`] creates an unbounded channel; [`Signal::emit`]
/// sends a clone of the value to every subscriber still listening.
/// Subscribers whose receiver has been dropped are forgotten on the next emit.
pub struct Signal<T> {
    subscribers: Vec<Sender<T>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self) -> Receiver<T> {
        let (tx, rx) = kanal::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, value: T) {
        self.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_to_all() {
        let mut signal = Signal::new();
        let a = signal.connect();
        let b = signal.connect();
        signal.emit(3u32);
        assert_eq!(a.try_recv().unwrap(), Some(3));
        assert_eq!(b.try_recv().unwrap(), Some(3));
        assert_eq!(a.try_recv().unwrap(), None);
    }

    #[test]
    fn test_dropped_subscriber() {
        let mut signal = Signal::new();
        let a = signal.connect();
        let b = signal.connect();
        drop(b);
        signal.emit(1u32);
        assert_eq!(signal.subscriber_count(), 1);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_no_subscribers() {
        let mut signal = Signal::<u32>::new();
        signal.emit(1);
        assert_eq!(signal.subscriber_count(), 0);
    }
}
