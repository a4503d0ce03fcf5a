//! Run a plain statement program.

use super::{lang_error, read_source};
use anyhow::Result;
use std::path::Path;
use strand_kernel::{Completion, Env, Machine, RunState};

pub fn run_program(path: &Path, trace: bool) -> Result<()> {
    let source = read_source(path)?;
    let program = strand_lang::lower_program(&source)
        .map_err(|err| lang_error(&source, &err))?
        .kernel;

    let mut machine = Machine::new().with_trace(trace);
    let env = machine.declare(&Env::empty(), &program.globals);
    let state = machine.execute(program.body.clone(), env.clone())?;
    if state == RunState::Waiting {
        tracing::warn!(parked = machine.parked(), "program blocked on unbound variables");
    }
    tracing::debug!(steps = machine.steps(), "program finished");

    for name in &program.globals {
        let Some(var) = env.get(name) else { continue };
        match machine.complete(var) {
            Completion::Done(value) => println!("{} = {}", name, value),
            Completion::Pending(_) => println!("{} = _", name),
            Completion::Unsendable(kind) => println!("{} = <{}>", name, kind.to_lowercase()),
        }
    }

    Ok(())
}
