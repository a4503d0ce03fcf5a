//! Spawn an actor from source and ask it one message.

use super::{lang_error, load_config, read_source};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strand_actor::{ActorError, ActorSystem, Address};
use strand_kernel::{Complete, Completion, Env, Ident, Machine, RunState};

pub struct AskOptions {
    pub args: Vec<String>,
    pub address: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Evaluate a standalone expression to a complete value
fn evaluate(source: &str) -> Result<Complete> {
    let dest = Ident::new("$value");
    let stmt = strand_lang::lower_value(source, &dest)
        .map_err(|err| lang_error(source, &err))?
        .kernel;
    let mut machine = Machine::new();
    let env = machine.declare(&Env::empty(), std::slice::from_ref(&dest));
    let Some(var) = env.get(&dest) else {
        bail!("Failed to evaluate `{}`", source);
    };
    if machine.execute(Arc::new(stmt), env)? == RunState::Waiting {
        bail!("`{}` does not evaluate to a value", source);
    }
    match machine.complete(var) {
        Completion::Done(value) => Ok(value),
        Completion::Pending(_) => bail!("`{}` is not fully bound", source),
        Completion::Unsendable(kind) => bail!("`{}` contains a {}", source, kind),
    }
}

pub fn ask_actor(config_path: &Path, path: &Path, message: &str, opts: AskOptions) -> Result<()> {
    let config = load_config(config_path)?;
    let source = read_source(path)?;
    let message = evaluate(message).context("Invalid message")?;
    let args = opts
        .args
        .iter()
        .map(|arg| evaluate(arg))
        .collect::<Result<Vec<_>>>()
        .context("Invalid actor argument")?;

    let system = ActorSystem::new(config).context("Failed to start actor system")?;
    let mut builder = system.builder().set_args(args);
    if let Some(address) = &opts.address {
        builder = builder.set_address(Address::create(address)?);
    }

    let actor = match builder.spawn(&source) {
        Ok(spawned) => spawned.into_ref(),
        Err(ActorError::Lang(err)) => return Err(lang_error(&source, &err)),
        Err(err) => return Err(err).context("Failed to spawn actor"),
    };
    tracing::debug!(actor = %actor.address(), "asking");

    let mut collector = system.ask(&actor, message)?;
    if let Some(ms) = opts.timeout_ms {
        collector = collector.with_timeout(Duration::from_millis(ms));
    }
    let collected = collector.collect();

    let mut failed = None;
    for response in &collected.responses {
        match response {
            Complete::Failed(reason) => failed = Some(reason.clone()),
            value => println!("{}", value),
        }
    }
    system.shutdown();

    if let Some(reason) = failed {
        bail!("Actor failed: {}", reason);
    }
    if !collected.complete {
        bail!("Timed out waiting for {}", actor.address());
    }
    Ok(())
}
