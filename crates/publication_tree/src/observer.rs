//! Change notifications
//!
//! Each list delivers addresses synchronously, in subscription order, at the
//! moment the event happens. Subscribers hold a [`Subscription`]; dropping it
//! (or calling [`Subscription::close`]) removes it from the list on the next
//! notification.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::address::EventAddress;

/// Receiving end of an observer list
#[derive(Debug)]
pub struct Subscription {
    rx: Receiver<EventAddress>,
}

impl Subscription {
    /// Next queued address, if any
    pub fn try_recv(&self) -> Option<EventAddress> {
        match self.rx.try_recv() {
            Ok(address) => Some(address),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued so far
    pub fn drain(&self) -> Vec<EventAddress> {
        self.rx.try_iter().collect()
    }

    pub fn close(self) {
        drop(self.rx);
    }
}

#[derive(Debug, Default)]
pub struct ObserverList {
    senders: Vec<Sender<EventAddress>>,
}

impl ObserverList {
    pub fn subscribe(&mut self) -> Subscription {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        Subscription { rx }
    }

    /// Deliver to every live subscriber, pruning closed ones
    pub fn notify(&mut self, address: &EventAddress) {
        self.senders.retain(|tx| tx.send(address.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// The three observer lists of a tree
#[derive(Debug, Default)]
pub struct Observers {
    /// A node was registered, deferred or resolved
    pub node_added: ObserverList,
    /// A deferred node was fetched successfully
    pub node_resolved: ObserverList,
    /// The bookmark moved the traversal position
    pub bookmark_moved: ObserverList,
}
