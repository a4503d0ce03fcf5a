//! Handles to running actors

use crate::address::Address;
use crate::envelope::Envelope;
use crate::error::{ActorError, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use strand_kernel::{ActorLink, ActorLinkRef, Complete};
use tokio::sync::mpsc::UnboundedSender;

struct Inner {
    address: Address,
    sender: UnboundedSender<Envelope>,
}

/// An opaque reference to an actor's mailbox
///
/// Cloning is cheap. Two refs are the same actor when they share a
/// mailbox, which `same_actor` checks.
#[derive(Clone)]
pub struct ActorRef {
    inner: Arc<Inner>,
}

impl ActorRef {
    pub(crate) fn new(address: Address, sender: UnboundedSender<Envelope>) -> Self {
        Self {
            inner: Arc::new(Inner { address, sender }),
        }
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    /// Deliver an envelope; fails once the actor has stopped
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.inner
            .sender
            .send(envelope)
            .map_err(|_| ActorError::Stopped(self.inner.address.to_string()))
    }

    pub fn tell(&self, message: Complete) -> Result<()> {
        self.send(Envelope::tell(message))
    }

    pub fn same_actor(&self, other: &ActorRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.sender.is_closed()
    }

    /// This ref as a kernel value
    pub fn link(&self) -> ActorLinkRef {
        Arc::new(self.clone())
    }

    pub fn to_complete(&self) -> Complete {
        Complete::Actor(self.link())
    }

    /// Recover the ref behind a kernel actor value
    pub fn from_link(link: &dyn ActorLink) -> Option<ActorRef> {
        link.as_any().downcast_ref::<ActorRef>().cloned()
    }
}

impl ActorLink for ActorRef {
    fn address(&self) -> String {
        self.inner.address.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({})", self.inner.address)
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<actor {}>", self.inner.address)
    }
}
