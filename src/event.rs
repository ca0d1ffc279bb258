//! Event queue carrying connection ownership between threads.
//!
//! The queue is the single handoff point: a connection inside an event is
//! owned by whichever thread holds the event, and by nobody once it has been
//! sent. Dequeueing blocks on an empty queue; shutdown is signalled with one
//! sentinel per worker.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::connection::Connection;

/// Work items dispatched to the worker pool.
#[derive(Debug)]
pub(crate) enum Event {
    /// A freshly accepted connection; TLS handshake not yet run.
    NewConnection(Connection),
    /// A keep-alive connection handed back for its next request.
    DataReady(Connection),
    /// Sentinel telling one worker to exit.
    Shutdown,
}

pub(crate) type EventSender = Sender<Event>;
pub(crate) type EventReceiver = Receiver<Event>;

/// Creates the shared event queue.
pub(crate) fn event_queue() -> (EventSender, EventReceiver) {
    unbounded()
}
