//! List modules visible to the actor system.

use super::load_config;
use anyhow::{bail, Result};
use std::path::Path;
use strand_actor::{DirectoryBroker, ModuleBroker};

pub fn list_modules(config_path: &Path, prefix: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let Some(root) = config.module_dir() else {
        bail!("No module_root configured in {}", config_path.display());
    };

    let broker = DirectoryBroker::new(root);
    for path in broker.list(prefix) {
        match broker.source(&path).map(|source| strand_actor::evaluate_module(&path, &source)) {
            Some(Ok(module)) => {
                let members: Vec<String> = module.fields.iter().map(|(f, _)| f.to_string()).collect();
                println!("{} [{}]", path, members.join(", "));
            }
            Some(Err(err)) => println!("{} (invalid: {})", path, err),
            None => println!("{}", path),
        }
    }
    Ok(())
}
