use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn strand() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("strand").expect("strand binary")
}

#[test]
fn run_prints_top_level_variables() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file = dir.path().join("fact.strand");
    fs::write(
        &file,
        r#"
        func fact(n) in
            if n <= 1 then 1 else n * fact(n - 1) end
        end
        var answer = fact(5)
        var big = 6000000000 > answer
        var greeting = 'hello' + ', ' + 'world'
        "#,
    )?;

    strand()
        .current_dir(dir.path())
        .args(["run", "fact.strand"])
        .assert()
        .success()
        .stdout(predicate::str::contains("answer = 120"))
        .stdout(predicate::str::contains("big = true"))
        .stdout(predicate::str::contains("greeting = 'hello, world'"))
        .stdout(predicate::str::contains("fact = <proc>"));
    Ok(())
}

#[test]
fn run_reports_errors_with_position() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file = dir.path().join("bad.strand");
    fs::write(&file, "var x = 1\nvar y = x +\n")?;

    strand()
        .args(["run", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 3"));
    Ok(())
}

#[test]
fn lower_prints_kernel_form() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file = dir.path().join("and.strand");
    fs::write(&file, "var a = true\nvar x = a && false\n")?;

    strand()
        .args(["lower", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("var a, x"))
        .stdout(predicate::str::contains("if a then"));
    Ok(())
}

#[test]
fn lower_actor_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file = dir.path().join("echo.strand");
    fs::write(&file, "actor Echo() in handle ask m in m end end")?;

    let assert = strand()
        .args(["lower", "--json", file.to_str().unwrap()])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["name"], "Echo");
    assert!(value["ask_handler"].is_object());
    assert!(value["tell_handler"].is_null());
    Ok(())
}

#[test]
fn ask_spawns_and_prints_reply() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("lib/shop"))?;
    fs::write(dir.path().join("lib/shop/prices.strand"), "{'apple': 3}")?;
    fs::write(dir.path().join("strand.yml"), "name: cli\nworker_threads: 1\nmodule_root: lib\n")?;
    fs::write(
        dir.path().join("pricer.strand"),
        r#"
        actor Pricer(discount) in
            import shop.prices[apple]
            handle ask 'quote'#{'qty': q} in
                emit 'pricing'
                q * apple - discount
            end
        end
        "#,
    )?;

    strand()
        .current_dir(dir.path())
        .args(["ask", "pricer.strand", "'quote'#{'qty': 4}", "--arg", "2"])
        .assert()
        .success()
        .stdout(predicate::str::diff("'pricing'\n10\n"));
    Ok(())
}

#[test]
fn ask_reports_actor_failure() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file = dir.path().join("div.strand");
    fs::write(&file, "actor Div() in handle ask n in 1 / n end end")?;

    strand()
        .current_dir(dir.path())
        .args(["ask", "div.strand", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("division by zero"));
    Ok(())
}

#[test]
fn routes_resolve_addresses() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let table = dir.path().join("routes.yml");
    fs::write(
        &table,
        "\"users/{id}\": user\n\"users/{id}/orders/{}\": order\nhealth: health\n",
    )?;

    strand()
        .args(["routes", table.to_str().unwrap(), "users/7", "health", "nope"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users/7 -> user (users/{id}) id=7"))
        .stdout(predicate::str::contains("health -> health (health)"))
        .stdout(predicate::str::contains("nope -> no route"));

    let assert = strand()
        .args(["routes", "--json", table.to_str().unwrap(), "users/1/orders/2"])
        .assert()
        .success();
    let value: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(value[0]["target"], "order");
    assert_eq!(value[0]["params"]["id"], "1");
    Ok(())
}

#[test]
fn routes_reject_ambiguous_table() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let table = dir.path().join("routes.yml");
    fs::write(&table, "\"users/{id}\": a\nusers/me: b\n")?;

    strand()
        .args(["routes", table.to_str().unwrap(), "users/me"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ambiguous route"));
    Ok(())
}

#[test]
fn modules_lists_module_root() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("lib/shop"))?;
    fs::write(dir.path().join("lib/shop/prices.strand"), "{'apple': 3, 'pear': 4}")?;
    fs::write(dir.path().join("lib/util.strand"), "42")?;
    fs::write(dir.path().join("strand.yml"), "module_root: lib\n")?;

    strand()
        .current_dir(dir.path())
        .arg("modules")
        .assert()
        .success()
        .stdout(predicate::str::contains("shop.prices ['apple', 'pear']"))
        .stdout(predicate::str::contains("util (invalid:"));
    Ok(())
}
