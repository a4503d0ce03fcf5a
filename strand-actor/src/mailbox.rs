//! Mailboxes and reply collection

use crate::actor_ref::ActorRef;
use crate::address::Address;
use crate::envelope::{Envelope, RequestId};
use std::time::Duration;
use strand_kernel::Complete;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tokio::time::Instant;

/// The receiving end of an actor's queue
///
/// Unbounded and ordered. Exactly one consumer owns it.
#[derive(Debug)]
pub struct Mailbox {
    receiver: UnboundedReceiver<Envelope>,
}

impl Mailbox {
    /// Create a mailbox and the ref that delivers into it
    pub fn new(address: Address) -> (ActorRef, Mailbox) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ActorRef::new(address, sender), Mailbox { receiver })
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Dequeue without waiting
    pub fn try_recv(&mut self) -> Option<Envelope> {
        match self.receiver.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Gathers the responses to one ask made from outside the actor system
///
/// Collection ends at the first end-of-stream response or when the timeout
/// expires; either way the responses received so far are returned.
#[derive(Debug)]
pub struct ResponseCollector {
    reply_to: ActorRef,
    mailbox: Mailbox,
    request: RequestId,
    timeout: Duration,
    handle: Handle,
}

/// What a collector gathered
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub responses: Vec<Complete>,
    /// False when collection stopped on the timeout
    pub complete: bool,
}

impl Collected {
    /// The final response, if the stream ended
    pub fn last(&self) -> Option<&Complete> {
        if self.complete {
            self.responses.last()
        } else {
            None
        }
    }
}

impl ResponseCollector {
    pub(crate) fn new(
        reply_to: ActorRef,
        mailbox: Mailbox,
        request: RequestId,
        timeout: Duration,
        handle: Handle,
    ) -> Self {
        Self {
            reply_to,
            mailbox,
            request,
            timeout,
            handle,
        }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    /// The ref responses are addressed to
    pub fn reply_to(&self) -> &ActorRef {
        &self.reply_to
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block the calling thread until collection ends
    ///
    /// Must not be called from inside an async context; use
    /// [`ResponseCollector::collect_async`] there.
    pub fn collect(self) -> Collected {
        let handle = self.handle.clone();
        handle.block_on(self.collect_async())
    }

    pub async fn collect_async(mut self) -> Collected {
        let deadline = Instant::now() + self.timeout;
        let mut responses = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, self.mailbox.recv()).await {
                Ok(Some(Envelope::Response {
                    request,
                    payload,
                    end_of_stream,
                })) if request == self.request => {
                    responses.push(payload);
                    if end_of_stream {
                        return Collected {
                            responses,
                            complete: true,
                        };
                    }
                }
                Ok(Some(other)) => {
                    tracing::debug!(
                        kind = other.kind(),
                        address = %self.reply_to.address(),
                        "collector ignored envelope"
                    );
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!(
                        request = %self.request,
                        received = responses.len(),
                        "collector timed out"
                    );
                    break;
                }
            }
        }

        Collected {
            responses,
            complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_mailbox_preserves_order() {
        let (actor, mut mailbox) = Mailbox::new(Address::create("a").unwrap());
        for i in 0..5 {
            actor.tell(Complete::int(i)).unwrap();
        }
        assert_eq!(mailbox.len(), 5);
        for i in 0..5 {
            match mailbox.try_recv() {
                Some(Envelope::Tell { message }) => assert_eq!(message, Complete::int(i)),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(mailbox.try_recv().is_none());
    }

    #[test]
    fn test_send_after_close_fails() {
        let (actor, mut mailbox) = Mailbox::new(Address::create("a").unwrap());
        mailbox.close();
        assert!(actor.tell(Complete::null()).is_err());
    }

    #[test]
    fn test_collector_stops_at_end_of_stream() {
        let rt = runtime();
        let (reply_to, mailbox) = Mailbox::new(Address::create("$ask/1").unwrap());
        let request = RequestId::next();
        for (i, last) in [(1, false), (2, false), (3, true), (4, true)] {
            reply_to
                .send(Envelope::Response {
                    request,
                    payload: Complete::int(i),
                    end_of_stream: last,
                })
                .unwrap();
        }
        let collector = ResponseCollector::new(
            reply_to,
            mailbox,
            request,
            Duration::from_secs(5),
            rt.handle().clone(),
        );
        let collected = collector.collect();
        assert!(collected.complete);
        assert_eq!(
            collected.responses,
            vec![Complete::int(1), Complete::int(2), Complete::int(3)]
        );
        assert_eq!(collected.last(), Some(&Complete::int(3)));
    }

    #[test]
    fn test_collector_timeout_returns_partial() {
        let rt = runtime();
        let (reply_to, mailbox) = Mailbox::new(Address::create("$ask/2").unwrap());
        let request = RequestId::next();
        reply_to
            .send(Envelope::Response {
                request,
                payload: Complete::str("partial"),
                end_of_stream: false,
            })
            .unwrap();
        // Responses to other requests are ignored
        reply_to
            .send(Envelope::Response {
                request: RequestId::next(),
                payload: Complete::str("other"),
                end_of_stream: true,
            })
            .unwrap();

        let collector = ResponseCollector::new(
            reply_to.clone(),
            mailbox,
            request,
            Duration::from_millis(50),
            rt.handle().clone(),
        );
        let collected = collector.collect();
        assert!(!collected.complete);
        assert_eq!(collected.responses, vec![Complete::str("partial")]);
        assert_eq!(collected.last(), None);
    }
}
