//! Messages exchanged through mailboxes

use crate::actor_ref::ActorRef;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use strand_kernel::Complete;

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Correlates the responses to an ask with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Envelope {
    /// Fire and forget
    Tell { message: Complete },
    /// A request; every response goes to `requester`
    Ask {
        requester: ActorRef,
        request: RequestId,
        message: Complete,
    },
    /// One element of the reply to an ask
    Response {
        request: RequestId,
        payload: Complete,
        end_of_stream: bool,
    },
    Stop,
}

impl Envelope {
    pub fn tell(message: Complete) -> Self {
        Envelope::Tell { message }
    }

    pub fn ask(requester: ActorRef, message: Complete) -> (RequestId, Self) {
        let request = RequestId::next();
        (
            request,
            Envelope::Ask {
                requester,
                request,
                message,
            },
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Tell { .. } => "tell",
            Envelope::Ask { .. } => "ask",
            Envelope::Response { .. } => "response",
            Envelope::Stop => "stop",
        }
    }
}
