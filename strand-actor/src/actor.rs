//! The per-actor message loop
//!
//! Each live actor is one tokio task owning a `Machine`. Envelopes are
//! handled strictly one at a time. While the machine has tasks parked on
//! unbound variables only responses (and stop) are consumed; asks and
//! tells are deferred in arrival order until the machine goes idle.

use crate::actor_ref::ActorRef;
use crate::address::Address;
use crate::envelope::{Envelope, RequestId};
use crate::image::ActorImage;
use crate::mailbox::Mailbox;
use crate::system::Registry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use strand_kernel::{
    ActorHost, ActorLink, ActorLinkRef, Complete, Env, Ident, KernelError, Literal, Machine, RunState,
    Stmt, VarId, MESSAGE_IDENT, REPLY_IDENT,
};

#[derive(Debug, Clone)]
struct Requester {
    actor: ActorRef,
    request: RequestId,
}

impl Requester {
    fn reply(&self, payload: Complete, end_of_stream: bool) -> Result<(), String> {
        self.actor
            .send(Envelope::Response {
                request: self.request,
                payload,
                end_of_stream,
            })
            .map_err(|err| err.to_string())
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Kernel services for one actor, borrowed for the duration of a run
struct Host<'a> {
    this: &'a ActorRef,
    pending: &'a mut HashMap<RequestId, VarId>,
    current: &'a mut Option<Requester>,
}

fn local_ref(link: &ActorLinkRef) -> Result<ActorRef, String> {
    ActorRef::from_link(link.as_ref()).ok_or_else(|| format!("{} is not a local actor", link.address()))
}

impl ActorHost for Host<'_> {
    fn is_self(&self, target: &dyn ActorLink) -> bool {
        ActorRef::from_link(target).is_some_and(|target| target.same_actor(self.this))
    }

    fn tell(&mut self, target: &ActorLinkRef, message: Complete) -> Result<(), String> {
        local_ref(target)?.tell(message).map_err(|err| err.to_string())
    }

    fn ask(&mut self, target: &ActorLinkRef, message: Complete, reply: VarId) -> Result<(), String> {
        let target = local_ref(target)?;
        let (request, envelope) = Envelope::ask(self.this.clone(), message);
        target.send(envelope).map_err(|err| err.to_string())?;
        tracing::trace!(target = %target.address(), %request, "ask sent");
        self.pending.insert(request, reply);
        Ok(())
    }

    fn respond(&mut self, value: Complete, end_of_stream: bool) -> Result<(), String> {
        let requester = if end_of_stream {
            self.current.take()
        } else {
            self.current.clone()
        };
        let requester = requester.ok_or_else(|| "no request to respond to".to_string())?;
        // The requester may have given up waiting
        if let Err(err) = requester.reply(value, end_of_stream) {
            tracing::debug!(error = %err, "response dropped");
        }
        Ok(())
    }
}

pub(crate) struct ActorProcess {
    address: Address,
    this: ActorRef,
    image: ActorImage,
    machine: Machine,
    env: Env,
    mailbox: Mailbox,
    registry: Registry,
    deferred: VecDeque<Envelope>,
    pending: HashMap<RequestId, VarId>,
    current: Option<Requester>,
    starting: bool,
    /// Store size before the message being handled
    handler_mark: usize,
}

impl ActorProcess {
    pub(crate) fn new(
        this: ActorRef,
        image: ActorImage,
        mailbox: Mailbox,
        registry: Registry,
        trace: bool,
    ) -> Self {
        Self {
            address: this.address().clone(),
            this,
            image,
            machine: Machine::new().with_trace(trace),
            env: Env::empty(),
            mailbox,
            registry,
            deferred: VecDeque::new(),
            pending: HashMap::new(),
            current: None,
            starting: true,
            handler_mark: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("actor started");

        if let Flow::Stop = self.start() {
            self.deregister();
            return;
        }

        while let Some(envelope) = self.next().await {
            let flow = match envelope {
                Envelope::Stop => Flow::Stop,
                Envelope::Response {
                    request,
                    payload,
                    end_of_stream,
                } => self.on_response(request, payload, end_of_stream),
                other if self.machine.is_waiting() => {
                    self.deferred.push_back(other);
                    Flow::Continue
                }
                Envelope::Tell { message } => self.on_tell(message),
                Envelope::Ask {
                    requester,
                    request,
                    message,
                } => {
                    let requester = Requester {
                        actor: requester,
                        request,
                    };
                    self.on_ask(requester, message)
                }
            };
            if let Flow::Stop = flow {
                break;
            }
        }

        self.deregister();
        tracing::debug!(steps = self.machine.steps(), "actor stopped");
    }

    async fn next(&mut self) -> Option<Envelope> {
        if !self.machine.is_waiting() {
            if let Some(envelope) = self.deferred.pop_front() {
                return Some(envelope);
            }
        }
        self.mailbox.recv().await
    }

    /// Bind parameters, imports and state, then run the init body
    fn start(&mut self) -> Flow {
        let expr = Arc::clone(self.image.expr());
        let cfg = self.image.cfg();

        let mut bindings = Vec::with_capacity(expr.params.len() + cfg.imports.len());
        for param in &expr.params {
            let Some(value) = cfg.args.get(&Literal::str(param.as_str())) else {
                tracing::error!(param = %param, "missing actor argument");
                return Flow::Stop;
            };
            bindings.push((param.clone(), self.machine.store().alloc_complete(value)));
        }
        for (member, value) in &cfg.imports {
            bindings.push((member.clone(), self.machine.store().alloc_complete(value)));
        }

        let env = Env::empty().extend(bindings);
        self.env = self.machine.declare(&env, &expr.state);
        self.machine.spawn(Arc::clone(&expr.init), self.env.clone());
        self.run_machine()
    }

    fn on_tell(&mut self, message: Complete) -> Flow {
        let Some(handler) = self.image.expr().tell_handler.clone() else {
            tracing::warn!(%message, "tell without a tell handler");
            return Flow::Continue;
        };
        self.handle(handler, message, None)
    }

    fn on_ask(&mut self, requester: Requester, message: Complete) -> Flow {
        let Some(handler) = self.image.expr().ask_handler.clone() else {
            tracing::warn!(%message, "ask without an ask handler");
            let failure = Complete::Failed(format!("{} does not handle asks", self.address));
            if let Err(err) = requester.reply(failure, true) {
                tracing::debug!(error = %err, "response dropped");
            }
            return Flow::Continue;
        };
        self.handle(handler, message, Some(requester))
    }

    fn handle(&mut self, handler: Arc<Stmt>, message: Complete, requester: Option<Requester>) -> Flow {
        let message_var = self.machine.store().alloc_complete(&message);
        let mut bindings = vec![(Ident::new(MESSAGE_IDENT), message_var)];
        if requester.is_some() {
            bindings.push((Ident::new(REPLY_IDENT), self.machine.fresh_var()));
        }
        self.current = requester;
        self.machine.spawn(handler, self.env.extend(bindings));
        self.run_machine()
    }

    fn on_response(&mut self, request: RequestId, payload: Complete, end_of_stream: bool) -> Flow {
        if !end_of_stream {
            tracing::debug!(%request, "ignored intermediate response");
            return Flow::Continue;
        }
        let Some(var) = self.pending.remove(&request) else {
            tracing::debug!(%request, "response to unknown request");
            return Flow::Continue;
        };
        if let Err(err) = self.machine.bind_complete(var, &payload) {
            tracing::warn!(%request, error = %err, "could not bind response");
        }
        self.run_machine()
    }

    fn run_machine(&mut self) -> Flow {
        let mut host = Host {
            this: &self.this,
            pending: &mut self.pending,
            current: &mut self.current,
        };
        let result = self.machine.run(&mut host);
        self.settle(result)
    }

    fn settle(&mut self, result: strand_kernel::Result<RunState>) -> Flow {
        match result {
            Ok(RunState::Waiting) => Flow::Continue,
            Ok(RunState::Idle) => {
                if self.starting {
                    self.starting = false;
                    self.handler_mark = self.machine.mark();
                    tracing::debug!(cells = self.handler_mark, "actor initialized");
                    return Flow::Continue;
                }
                if let Some(requester) = self.current.take() {
                    let failure = Complete::Failed(format!("{} finished without responding", self.address));
                    if let Err(err) = requester.reply(failure, true) {
                        tracing::debug!(error = %err, "response dropped");
                    }
                }
                self.collect();
                Flow::Continue
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: KernelError) -> Flow {
        self.machine.reset();
        self.pending.clear();

        if self.starting {
            tracing::error!(error = %err, "actor initialization failed");
            return Flow::Stop;
        }

        tracing::warn!(error = %err, "message handling failed");
        if let Some(requester) = self.current.take() {
            let failure = Complete::Failed(err.to_string());
            if let Err(send_err) = requester.reply(failure, true) {
                tracing::debug!(error = %send_err, "response dropped");
            }
        }
        self.collect();
        Flow::Continue
    }

    /// Free the cells of the last handled message
    ///
    /// Cells stay allocated while a reply is outstanding or when the
    /// handler bound actor state to something it created.
    fn collect(&mut self) {
        if !self.pending.is_empty() {
            return;
        }
        if !self.machine.release(self.handler_mark) {
            tracing::trace!(cells = self.machine.mark(), "handler cells kept by actor state");
        }
        self.handler_mark = self.machine.mark();
    }

    /// Number of variable cells held by this actor's machine
    #[cfg(test)]
    pub(crate) fn cells(&self) -> usize {
        self.machine.mark()
    }

    fn deregister(&mut self) {
        self.mailbox.close();
        let mut registry = self.registry.write();
        if registry
            .get(&self.address)
            .is_some_and(|registered| registered.same_actor(&self.this))
        {
            registry.remove(&self.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ActorCfg;
    use strand_kernel::CompleteRec;

    fn process(source: &str) -> ActorProcess {
        let expr = strand_lang::lower_actor(source).unwrap().kernel;
        let cfg = ActorCfg {
            args: CompleteRec::new(Some(Literal::str(expr.name.as_str()))),
            imports: Vec::new(),
            trace: false,
        };
        let image = ActorImage::new(Arc::new(expr), cfg);
        let (this, mailbox) = Mailbox::new(Address::create("doubler").unwrap());
        ActorProcess::new(this, image, mailbox, Registry::default(), false)
    }

    fn payload(envelope: Envelope) -> Complete {
        match envelope {
            Envelope::Response { payload, .. } => payload,
            other => panic!("expected a response, got {}", other.kind()),
        }
    }

    #[test]
    fn test_cells_stay_bounded_across_messages() {
        let mut process = process(
            "actor Doubler() in
                var base = 1
                handle ask n in n * 2 + base end
                handle tell 'note'#{'v': v} in var w = v + base skip end
            end",
        );
        assert!(matches!(process.start(), Flow::Continue));
        let baseline = process.cells();

        let (client, mut replies) = Mailbox::new(Address::create("client").unwrap());
        for i in 0..100 {
            let requester = Requester {
                actor: client.clone(),
                request: RequestId::next(),
            };
            assert!(matches!(process.on_ask(requester, Complete::int(i)), Flow::Continue));
            assert!(matches!(
                process.on_tell(Complete::from(Complete::record("note").with("v", i))),
                Flow::Continue
            ));
            assert_eq!(process.cells(), baseline);
        }

        let mut last = None;
        while let Some(envelope) = replies.try_recv() {
            last = Some(payload(envelope));
        }
        assert_eq!(last, Some(Complete::int(199)));
    }

    #[test]
    fn test_failed_message_releases_cells() {
        let mut process = process("actor Divider() in handle ask n in 10 / n end end");
        assert!(matches!(process.start(), Flow::Continue));
        let baseline = process.cells();

        let (client, mut replies) = Mailbox::new(Address::create("client").unwrap());
        for i in [0, 5, 0] {
            let requester = Requester {
                actor: client.clone(),
                request: RequestId::next(),
            };
            process.on_ask(requester, Complete::int(i));
            assert_eq!(process.cells(), baseline);
        }

        let answers: Vec<Complete> = std::iter::from_fn(|| replies.try_recv()).map(payload).collect();
        assert_eq!(answers.len(), 3);
        assert!(answers[0].is_failed());
        assert_eq!(answers[1], Complete::int(2));
        assert!(answers[2].is_failed());
    }
}
