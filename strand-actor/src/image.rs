//! Reusable actor snapshots

use crate::actor_ref::ActorRef;
use crate::address::Address;
use crate::error::{ActorError, Result};
use crate::system::ActorSystem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strand_kernel::{ActorExpr, Complete, CompleteRec, Ident, Literal};

/// The closed configuration of an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCfg {
    /// Arguments keyed by parameter name, labelled with the actor name
    pub args: CompleteRec,
    /// Imported module members, in import order
    pub imports: Vec<(Ident, Complete)>,
    #[serde(default)]
    pub trace: bool,
}

/// Bundle `args` into the configuration record of `expr`
///
/// The record is labelled with the actor name and keyed by parameter name.
pub(crate) fn args_record(expr: &ActorExpr, args: &[Complete]) -> Result<CompleteRec> {
    if expr.params.len() != args.len() {
        return Err(ActorError::Arity {
            actor: expr.name.to_string(),
            expected: expr.params.len(),
            got: args.len(),
        });
    }

    let mut record = CompleteRec::new(Some(Literal::str(expr.name.as_str())));
    for (param, value) in expr.params.iter().zip(args) {
        record.insert(Literal::str(param.as_str()), value.clone());
    }
    Ok(record)
}

/// A lowered actor together with its configuration
///
/// Images are immutable. Every `spawn` starts an independent actor with
/// its own mailbox and machine; the kernel tree is shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorImage {
    expr: Arc<ActorExpr>,
    cfg: ActorCfg,
}

impl ActorImage {
    pub fn new(expr: Arc<ActorExpr>, cfg: ActorCfg) -> Self {
        Self { expr, cfg }
    }

    pub fn expr(&self) -> &Arc<ActorExpr> {
        &self.expr
    }

    pub fn cfg(&self) -> &ActorCfg {
        &self.cfg
    }

    pub fn name(&self) -> &str {
        self.expr.name.as_str()
    }

    /// Start a new actor from this image at `address`
    ///
    /// `args` gives one value per parameter and replaces the configured
    /// arguments for this actor only. An empty list keeps the arguments
    /// closed into the image.
    ///
    /// Returns once the actor is registered; its init runs on the actor's
    /// own task afterwards.
    pub fn spawn(&self, system: &ActorSystem, address: Address, args: Vec<Complete>) -> Result<ActorRef> {
        let image = if args.is_empty() {
            self.clone()
        } else {
            self.with_args(&args)?
        };
        system.spawn_image(image, address)
    }

    /// A copy of this image configured with other arguments
    pub fn with_args(&self, args: &[Complete]) -> Result<Self> {
        let cfg = ActorCfg {
            args: args_record(&self.expr, args)?,
            imports: self.cfg.imports.clone(),
            trace: self.cfg.trace,
        };
        Ok(Self {
            expr: Arc::clone(&self.expr),
            cfg,
        })
    }

    /// Serialize to JSON; fails if the configuration holds actor refs
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
