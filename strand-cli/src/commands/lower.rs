//! Print the lowered kernel form of a source file.

use super::{lang_error, read_source};
use anyhow::Result;
use std::path::Path;
use strand_lang::Token;

pub fn lower_source(path: &Path, json: bool) -> Result<()> {
    let source = read_source(path)?;
    let tokens = strand_lang::tokenize(&source).map_err(|err| lang_error(&source, &err))?;
    let is_actor = tokens.first().is_some_and(|t| t.token == Token::Actor);

    if is_actor {
        let lowered = strand_lang::lower_actor(&source).map_err(|err| lang_error(&source, &err))?;
        if json {
            println!("{}", serde_json::to_string_pretty(&lowered.kernel)?);
        } else {
            println!("{}", lowered.kernel);
        }
    } else {
        let lowered = strand_lang::lower_program(&source).map_err(|err| lang_error(&source, &err))?;
        if json {
            println!("{}", serde_json::to_string_pretty(lowered.kernel.body.as_ref())?);
        } else {
            println!("{}", lowered.kernel);
        }
    }

    Ok(())
}
