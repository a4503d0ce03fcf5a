//! Staged actor construction
//!
//! `ActorBuilder<S>` moves through `Init → Ready → Parsed → Configured →
//! Constructed → Spawned`. Each stage consumes the previous one, so no
//! stage can be skipped or repeated:
//!
//! ```ignore
//! let spawned = system
//!     .builder()
//!     .set_address(Address::create("counter")?)
//!     .set_args(vec![Complete::int(0)])
//!     .set_source(source)
//!     .parse()?
//!     .configure()?
//!     .construct()?
//!     .spawn()?;
//! ```

use crate::actor_ref::ActorRef;
use crate::address::Address;
use crate::error::{ActorError, Result};
use crate::image::{args_record, ActorCfg, ActorImage};
use crate::system::ActorSystem;
use std::sync::Arc;
use strand_kernel::{ActorExpr, Complete, CompleteRec, Literal};
use strand_lang::{ActorDecl, Lowered};

/// Address, arguments and trace flag may be set
#[derive(Debug)]
pub struct Init;

/// Source text attached
#[derive(Debug)]
pub struct Ready {
    source: String,
}

/// Source lowered to an actor expression
#[derive(Debug)]
pub struct Parsed {
    lowered: Lowered<ActorDecl, ActorExpr>,
}

/// Arguments bound to parameters
#[derive(Debug)]
pub struct Configured {
    expr: ActorExpr,
    args: CompleteRec,
}

/// Imports resolved; ready to instantiate
#[derive(Debug)]
pub struct Constructed {
    image: ActorImage,
}

/// Registered and running
#[derive(Debug)]
pub struct Spawned {
    actor: ActorRef,
}

#[derive(Debug)]
pub struct ActorBuilder<S> {
    system: ActorSystem,
    address: Option<Address>,
    args: Vec<Complete>,
    trace: bool,
    stage: S,
}

impl<S> ActorBuilder<S> {
    fn advance<T>(self, stage: T) -> ActorBuilder<T> {
        ActorBuilder {
            system: self.system,
            address: self.address,
            args: self.args,
            trace: self.trace,
            stage,
        }
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }
}

impl ActorBuilder<Init> {
    pub fn new(system: ActorSystem) -> Self {
        Self {
            system,
            address: None,
            args: Vec::new(),
            trace: false,
            stage: Init,
        }
    }

    /// Defaults to the actor's declared name
    pub fn set_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn set_args(mut self, args: Vec<Complete>) -> Self {
        self.args = args;
        self
    }

    pub fn set_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn set_source(self, source: impl Into<String>) -> ActorBuilder<Ready> {
        let source = source.into();
        self.advance(Ready { source })
    }

    /// Run every stage on `source`
    pub fn spawn(self, source: &str) -> Result<ActorBuilder<Spawned>> {
        self.set_source(source).parse()?.configure()?.construct()?.spawn()
    }
}

impl ActorBuilder<Ready> {
    pub fn source(&self) -> &str {
        &self.stage.source
    }

    pub fn parse(self) -> Result<ActorBuilder<Parsed>> {
        let lowered = strand_lang::lower_actor(&self.stage.source)?;
        tracing::debug!(actor = %lowered.kernel.name, "parsed actor");
        Ok(self.advance(Parsed { lowered }))
    }
}

impl ActorBuilder<Parsed> {
    pub fn surface(&self) -> &ActorDecl {
        &self.stage.lowered.surface
    }

    pub fn expr(&self) -> &ActorExpr {
        &self.stage.lowered.kernel
    }

    pub fn configure(self) -> Result<ActorBuilder<Configured>> {
        let expr = self.stage.lowered.kernel.clone();
        let args = args_record(&expr, &self.args)?;
        Ok(self.advance(Configured { expr, args }))
    }
}

impl ActorBuilder<Configured> {
    /// The configuration record
    pub fn config(&self) -> &CompleteRec {
        &self.stage.args
    }

    pub fn construct(self) -> Result<ActorBuilder<Constructed>> {
        let Configured { expr, args } = &self.stage;

        let mut imports = Vec::new();
        for import in &expr.imports {
            let module = self.system.module(&import.module)?;
            for member in &import.members {
                let value = module
                    .get(&Literal::str(member.as_str()))
                    .ok_or_else(|| ActorError::ModuleMemberNotFound {
                        module: import.module.clone(),
                        member: member.to_string(),
                    })?;
                imports.push((member.clone(), value.clone()));
            }
        }

        let cfg = ActorCfg {
            args: args.clone(),
            imports,
            trace: self.trace,
        };
        let image = ActorImage::new(Arc::new(expr.clone()), cfg);
        Ok(self.advance(Constructed { image }))
    }
}

impl ActorBuilder<Constructed> {
    /// A reusable snapshot of the constructed actor
    pub fn image(&self) -> ActorImage {
        self.stage.image.clone()
    }

    pub fn spawn(self) -> Result<ActorBuilder<Spawned>> {
        let address = match &self.address {
            Some(address) => address.clone(),
            None => Address::create(self.stage.image.name())?,
        };
        let actor = self.stage.image.spawn(&self.system, address, Vec::new())?;
        Ok(self.advance(Spawned { actor }))
    }
}

impl ActorBuilder<Spawned> {
    pub fn actor_ref(&self) -> &ActorRef {
        &self.stage.actor
    }

    pub fn address(&self) -> &Address {
        self.stage.actor.address()
    }

    pub fn into_ref(self) -> ActorRef {
        self.stage.actor
    }
}
