//! Resolve addresses against a route table.

use super::read_source;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use strand_actor::{Address, RouteTable};

#[derive(Serialize)]
struct Resolution<'a> {
    address: &'a str,
    pattern: Option<String>,
    target: Option<&'a str>,
    params: BTreeMap<String, String>,
}

pub fn resolve_routes(table_path: &Path, addresses: &[String], json: bool) -> Result<()> {
    let content = read_source(table_path)?;
    let routes: BTreeMap<String, String> =
        serde_yaml::from_str(&content).context("Failed to parse route table")?;
    let table = RouteTable::build(routes).context("Invalid route table")?;

    let mut resolutions = Vec::with_capacity(addresses.len());
    for raw in addresses {
        let address = Address::create(raw)?;
        let resolution = match table.find(&address) {
            Some(found) => Resolution {
                address: raw,
                pattern: Some(found.pattern.to_string()),
                target: Some(found.value.as_str()),
                params: found.params,
            },
            None => Resolution {
                address: raw,
                pattern: None,
                target: None,
                params: BTreeMap::new(),
            },
        };
        resolutions.push(resolution);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&resolutions)?);
        return Ok(());
    }

    for r in &resolutions {
        match (&r.pattern, r.target) {
            (Some(pattern), Some(target)) => {
                let params: Vec<String> = r.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                if params.is_empty() {
                    println!("{} -> {} ({})", r.address, target, pattern);
                } else {
                    println!("{} -> {} ({}) {}", r.address, target, pattern, params.join(" "));
                }
            }
            _ => println!("{} -> no route", r.address),
        }
    }

    Ok(())
}
