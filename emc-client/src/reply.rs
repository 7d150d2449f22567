//! Completions that forward their reply into a `tokio::sync::oneshot` channel.
//!
//! The dispatcher still runs on the event-loop thread; an async task awaits
//! the receiver. Faults arrive the same way, with a fault `Status`.

use tokio::sync::oneshot;
use tracing::trace;

use crate::completion::{Completion, GetReply, StoreReply};

/// Builds a get-shaped completion and the receiver for its reply.
pub fn get_channel<U: 'static, C: 'static>() -> (Completion<U, C>, oneshot::Receiver<GetReply>) {
    let (tx, rx) = oneshot::channel();
    let completion = Completion::get(move |_: &mut U, reply: GetReply, _: C| {
        if tx.send(reply).is_err() {
            trace!("get reply receiver dropped");
        }
    });
    (completion, rx)
}

/// Builds a store-shaped completion and the receiver for its reply.
pub fn store_channel<U: 'static, C: 'static>() -> (Completion<U, C>, oneshot::Receiver<StoreReply>)
{
    let (tx, rx) = oneshot::channel();
    let completion = Completion::store(move |_: &mut U, reply: StoreReply, _: C| {
        if tx.send(reply).is_err() {
            trace!("store reply receiver dropped");
        }
    });
    (completion, rx)
}
