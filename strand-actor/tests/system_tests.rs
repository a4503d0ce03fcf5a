//! End-to-end tests: actors built from source, talking through the system

use std::sync::Arc;
use std::time::Duration;
use strand_actor::{
    ActorError, ActorRef, ActorSystem, Address, Collected, Envelope, Mailbox, MemoryBroker, SystemConfig,
};
use strand_kernel::{Complete, CompleteRec, Literal};

fn system() -> ActorSystem {
    let mut config = SystemConfig::default();
    config.name = "test".to_string();
    config.worker_threads = 2;
    ActorSystem::new(config).unwrap()
}

fn addr(path: &str) -> Address {
    Address::create(path).unwrap()
}

fn spawn(system: &ActorSystem, address: &str, args: Vec<Complete>, source: &str) -> ActorRef {
    system
        .builder()
        .set_address(addr(address))
        .set_args(args)
        .spawn(source)
        .unwrap()
        .into_ref()
}

fn ask(system: &ActorSystem, actor: &ActorRef, message: impl Into<Complete>) -> Collected {
    system.ask(actor, message.into()).unwrap().collect()
}

/// The final response of a completed ask
fn reply(system: &ActorSystem, actor: &ActorRef, message: impl Into<Complete>) -> Complete {
    let collected = ask(system, actor, message);
    assert!(collected.complete, "ask timed out: {:?}", collected.responses);
    collected.responses.last().cloned().unwrap()
}

fn failure(value: &Complete) -> &str {
    match value {
        Complete::Failed(message) => message,
        other => panic!("expected a failure, got {}", other),
    }
}

fn recv(system: &ActorSystem, mailbox: &mut Mailbox) -> Envelope {
    system
        .handle()
        .block_on(async { tokio::time::timeout(Duration::from_secs(5), mailbox.recv()).await })
        .expect("timed out waiting for an envelope")
        .expect("mailbox closed")
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

const ADDER: &str = r#"
    actor Adder(k) in
        handle ask 'add'#{'n': n} in n + k end
    end
"#;

fn add(n: i32) -> Complete {
    Complete::record("add").with("n", n).into()
}

#[test]
fn test_ask_reply() {
    let system = system();
    let adder = spawn(&system, "math/adder", vec![Complete::int(10)], ADDER);

    assert_eq!(reply(&system, &adder, add(5)), Complete::int(15));
    assert_eq!(system.actor_at(&addr("/math/adder/")).map(|a| a.same_actor(&adder)), Some(true));
    assert!(system.actor_at(&addr("math")).is_none());
}

#[test]
fn test_tells_arrive_in_order() {
    let system = system();
    let (sink, mut inbox) = system.mailbox(addr("sink"));
    let forwarder = spawn(
        &system,
        "forwarder",
        vec![sink.to_complete()],
        "actor Forwarder(target) in handle tell m in target.tell(m * 10) end end",
    );

    for i in 1..=5 {
        system.tell(&forwarder, Complete::int(i)).unwrap();
    }
    for i in 1..=5 {
        match recv(&system, &mut inbox) {
            Envelope::Tell { message } => assert_eq!(message, Complete::int(i * 10)),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_ask_across_actors() {
    let system = system();
    let doubler = spawn(&system, "doubler", vec![], "actor Doubler() in handle ask n in n * 2 end end");
    let front = spawn(
        &system,
        "front",
        vec![doubler.to_complete()],
        "actor Front(back) in handle ask n in back.ask(n) + 1 end end",
    );

    assert_eq!(reply(&system, &front, Complete::int(20)), Complete::int(41));
    assert_eq!(reply(&system, &front, Complete::int(1)), Complete::int(3));
}

#[test]
fn test_self_ask_is_rejected() {
    let system = system();
    let mirror = spawn(
        &system,
        "mirror",
        vec![],
        r#"
        actor Mirror() in
            handle ask 'loop'#{'me': me} in me.ask(1) end
            handle ask n in n end
        end
        "#,
    );

    let message: Complete = Complete::record("loop").with("me", mirror.to_complete()).into();
    let response = reply(&system, &mirror, message);
    assert!(failure(&response).contains("cannot ask itself"), "{}", response);

    // Still serving
    assert_eq!(reply(&system, &mirror, Complete::int(7)), Complete::int(7));
}

#[test]
fn test_failure_is_reported_and_actor_survives() {
    let system = system();
    let divider = spawn(&system, "divider", vec![], "actor Divider() in handle ask n in 100 / n end end");

    let response = reply(&system, &divider, Complete::int(0));
    assert!(failure(&response).contains("division by zero"), "{}", response);
    assert_eq!(reply(&system, &divider, Complete::int(4)), Complete::int(25));
}

#[test]
fn test_failed_reply_propagates_through_requester() {
    let system = system();
    let divider = spawn(&system, "divider", vec![], "actor Divider() in handle ask n in 100 / n end end");
    let front = spawn(
        &system,
        "front",
        vec![divider.to_complete()],
        "actor Front(back) in handle ask n in back.ask(n) + 1 end end",
    );

    let response = reply(&system, &front, Complete::int(0));
    let message = failure(&response);
    assert!(message.contains("Failed value"), "{}", message);
    assert!(message.contains("division by zero"), "{}", message);

    assert_eq!(reply(&system, &front, Complete::int(50)), Complete::int(3));
}

#[test]
fn test_asks_wait_while_handler_is_suspended() {
    let system = system();
    let (sink, mut inbox) = system.mailbox(addr("sink"));
    let front = spawn(
        &system,
        "front",
        vec![sink.to_complete()],
        "actor Front(back) in handle ask n in back.ask(n) + 1 end end",
    );

    let first = system.ask(&front, Complete::int(1)).unwrap();
    let (requester, request) = match recv(&system, &mut inbox) {
        Envelope::Ask {
            requester,
            request,
            message,
        } => {
            assert_eq!(message, Complete::int(1));
            (requester, request)
        }
        other => panic!("unexpected {:?}", other),
    };
    assert!(requester.same_actor(&front));

    // Deferred until the first ask is answered
    let second = system.ask(&front, Complete::int(2)).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(inbox.try_recv().is_none());

    // Intermediate responses are not bound to the reply variable
    for (payload, end_of_stream) in [(Complete::int(-1), false), (Complete::int(10), true)] {
        requester
            .send(Envelope::Response {
                request,
                payload,
                end_of_stream,
            })
            .unwrap();
    }
    assert_eq!(first.collect().last(), Some(&Complete::int(11)));

    match recv(&system, &mut inbox) {
        Envelope::Ask {
            requester,
            request,
            message,
        } => {
            assert_eq!(message, Complete::int(2));
            requester
                .send(Envelope::Response {
                    request,
                    payload: Complete::int(20),
                    end_of_stream: true,
                })
                .unwrap();
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(second.collect().last(), Some(&Complete::int(21)));
}

#[test]
fn test_emit_streams_responses() {
    let system = system();
    let counter = spawn(
        &system,
        "counter",
        vec![],
        "actor Counter() in handle ask n in emit n; emit n + 1; n + 2 end end",
    );

    let collected = ask(&system, &counter, Complete::int(3));
    assert!(collected.complete);
    assert_eq!(
        collected.responses,
        vec![Complete::int(3), Complete::int(4), Complete::int(5)]
    );
}

#[test]
fn test_actor_without_ask_handler() {
    let system = system();
    let sink = spawn(&system, "sink", vec![], "actor Sink() in handle tell m in skip end end");
    let response = reply(&system, &sink, Complete::int(1));
    assert!(failure(&response).contains("does not handle asks"));
}

#[test]
fn test_unmatched_message_fails_the_ask() {
    let system = system();
    let adder = spawn(&system, "adder", vec![Complete::int(1)], ADDER);
    let response = reply(&system, &adder, Complete::str("hello"));
    assert!(failure(&response).contains("Unhandled"), "{}", response);
}

#[test]
fn test_image_spawns_independent_actors() {
    let system = system();
    let image = system
        .builder()
        .set_args(vec![Complete::int(100)])
        .set_source(ADDER)
        .parse()
        .unwrap()
        .configure()
        .unwrap()
        .construct()
        .unwrap()
        .image();

    let a = image.spawn(&system, addr("adders/a"), vec![]).unwrap();
    let b = image.spawn(&system, addr("adders/b"), vec![]).unwrap();
    assert!(!a.same_actor(&b));
    assert_eq!(system.addresses(), vec![addr("adders/a"), addr("adders/b")]);

    assert_eq!(reply(&system, &a, add(1)), Complete::int(101));
    assert_eq!(reply(&system, &b, add(2)), Complete::int(102));

    assert!(system.stop(&addr("adders/a")));
    assert!(wait_until(|| a.is_stopped()));
    assert_eq!(reply(&system, &b, add(3)), Complete::int(103));
}

fn adder_image(system: &ActorSystem, k: i32) -> strand_actor::ActorImage {
    system
        .builder()
        .set_args(vec![Complete::int(k)])
        .set_source(ADDER)
        .parse()
        .unwrap()
        .configure()
        .unwrap()
        .construct()
        .unwrap()
        .image()
}

#[test]
fn test_image_spawns_with_new_arguments() {
    let system = system();
    let image = adder_image(&system, 100);

    let closed = image.spawn(&system, addr("adders/closed"), vec![]).unwrap();
    let small = image.spawn(&system, addr("adders/small"), vec![Complete::int(1)]).unwrap();
    let large = image.spawn(&system, addr("adders/large"), vec![Complete::int(1000)]).unwrap();

    assert_eq!(reply(&system, &closed, add(5)), Complete::int(105));
    assert_eq!(reply(&system, &small, add(5)), Complete::int(6));
    assert_eq!(reply(&system, &large, add(5)), Complete::int(1005));

    // The image itself is unchanged
    assert_eq!(image.cfg().args.get(&Literal::str("k")), Some(&Complete::int(100)));
}

#[test]
fn test_image_spawn_checks_arity() {
    let system = system();
    let image = adder_image(&system, 1);
    let err = image
        .spawn(&system, addr("adder"), vec![Complete::int(1), Complete::int(2)])
        .unwrap_err();
    assert!(matches!(err, ActorError::Arity { expected: 1, got: 2, .. }));
    assert_eq!(system.actor_count(), 0);
}

const RECORDER: &str = r#"
    actor Recorder(sink, tag) in
        var origin = {'tag': tag}
        handle tell n in sink.tell({'from': origin.tag, 'n': n}) end
    end
"#;

fn recorded(system: &ActorSystem, inbox: &mut Mailbox) -> Complete {
    match recv(system, inbox) {
        Envelope::Tell { message } => message,
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_image_instances_keep_separate_histories() {
    let system = system();
    let (sink_a, mut inbox_a) = system.mailbox(addr("sinks/a"));
    let (sink_b, mut inbox_b) = system.mailbox(addr("sinks/b"));
    let image = system
        .builder()
        .set_args(vec![sink_a.to_complete(), Complete::str("a")])
        .set_source(RECORDER)
        .parse()
        .unwrap()
        .configure()
        .unwrap()
        .construct()
        .unwrap()
        .image();

    let a = image.spawn(&system, addr("recorders/a"), vec![]).unwrap();
    let b = image
        .spawn(&system, addr("recorders/b"), vec![sink_b.to_complete(), Complete::str("b")])
        .unwrap();

    for i in 0..20 {
        system.tell(&a, Complete::int(i)).unwrap();
        system.tell(&b, Complete::int(100 + i)).unwrap();
    }

    for i in 0..20 {
        let expected_a: Complete = CompleteRec::new(None).with("from", "a").with("n", i).into();
        let expected_b: Complete = CompleteRec::new(None).with("from", "b").with("n", 100 + i).into();
        assert_eq!(recorded(&system, &mut inbox_a), expected_a);
        assert_eq!(recorded(&system, &mut inbox_b), expected_b);
    }
    std::thread::sleep(Duration::from_millis(50));
    assert!(inbox_a.try_recv().is_none());
    assert!(inbox_b.try_recv().is_none());
}

#[test]
fn test_failed_unification_keeps_actor_state() {
    let system = system();
    let cell = spawn(
        &system,
        "cell",
        vec![],
        r#"
        actor Cell() in
            var s = 5
            handle ask 'get' in s end
            handle ask 'poke'#{'k': k} in k = s; k end
        end
        "#,
    );
    let poke = |k: i32| -> Complete { Complete::record("poke").with("k", k).into() };

    assert_eq!(reply(&system, &cell, Complete::str("get")), Complete::int(5));
    let response = reply(&system, &cell, poke(10));
    assert!(failure(&response).contains("cannot unify"), "{}", response);
    assert_eq!(reply(&system, &cell, Complete::str("get")), Complete::int(5));
    assert_eq!(reply(&system, &cell, poke(5)), Complete::int(5));
    assert_eq!(reply(&system, &cell, Complete::str("get")), Complete::int(5));
}

#[test]
fn test_cyclic_record_fails_only_its_ask() {
    let system = system();
    let knot = spawn(
        &system,
        "knot",
        vec![],
        r#"
        actor Knot() in
            handle ask 'tie' in var r = {'next': r} r end
            handle ask n in n end
        end
        "#,
    );
    let adder = spawn(&system, "adder", vec![Complete::int(1)], ADDER);

    let response = reply(&system, &knot, Complete::str("tie"));
    assert!(failure(&response).contains("cyclic record"), "{}", response);
    assert_eq!(reply(&system, &knot, Complete::int(4)), Complete::int(4));
    assert_eq!(reply(&system, &adder, add(1)), Complete::int(2));
}

#[test]
fn test_address_in_use() {
    let system = system();
    spawn(&system, "adder", vec![Complete::int(1)], ADDER);
    let err = system
        .builder()
        .set_address(addr("adder"))
        .set_args(vec![Complete::int(2)])
        .spawn(ADDER)
        .unwrap_err();
    assert!(matches!(err, ActorError::AddressInUse(_)));
    assert_eq!(system.actor_count(), 1);
}

#[test]
fn test_default_address_is_actor_name() {
    let system = system();
    let spawned = system.builder().set_args(vec![Complete::int(1)]).spawn(ADDER).unwrap();
    assert_eq!(spawned.address(), &addr("Adder"));
}

#[test]
fn test_arity_is_checked_when_configuring() {
    let system = system();
    let err = system
        .builder()
        .set_source(ADDER)
        .parse()
        .unwrap()
        .configure()
        .unwrap_err();
    assert!(matches!(err, ActorError::Arity { expected: 1, got: 0, .. }));
}

#[test]
fn test_configured_record() {
    let system = system();
    let configured = system
        .builder()
        .set_args(vec![Complete::int(3)])
        .set_source(ADDER)
        .parse()
        .unwrap()
        .configure()
        .unwrap();
    assert_eq!(configured.config().to_string(), "'Adder'#{'k': 3}");
}

const PRICER: &str = r#"
    actor Pricer() in
        import shop.prices[apple, pear]
        handle ask 'quote'#{'fruit': 'apple', 'qty': q} in q * apple end
        handle ask 'quote'#{'fruit': 'pear', 'qty': q} in q * pear end
    end
"#;

fn quote(fruit: &str, qty: i32) -> Complete {
    Complete::record("quote").with("fruit", fruit).with("qty", qty).into()
}

#[test]
fn test_imports_from_module_table() {
    let system = system();
    system
        .load_module("shop.prices", "var base = 3\n{'apple': base, 'pear': base + 2}")
        .unwrap();
    let pricer = spawn(&system, "pricer", vec![], PRICER);

    assert_eq!(reply(&system, &pricer, quote("apple", 2)), Complete::int(6));
    assert_eq!(reply(&system, &pricer, quote("pear", 2)), Complete::int(10));
}

#[test]
fn test_imports_from_broker_are_cached() {
    let system = system();
    system.set_broker(Arc::new(
        MemoryBroker::new().with("shop.prices", "{'apple': 1, 'pear': 2}"),
    ));
    assert!(system.module_paths().is_empty());

    let pricer = spawn(&system, "pricer", vec![], PRICER);
    assert_eq!(system.module_paths(), vec!["shop.prices"]);
    assert_eq!(reply(&system, &pricer, quote("pear", 4)), Complete::int(8));
}

#[test]
fn test_missing_module_registers_nothing() {
    let system = system();
    let err = system.builder().spawn(PRICER).unwrap_err();
    assert!(matches!(err, ActorError::ModuleNotFound(ref m) if m == "shop.prices"));
    assert_eq!(system.actor_count(), 0);

    system.load_module("shop.prices", "{'apple': 1}").unwrap();
    let err = system.builder().spawn(PRICER).unwrap_err();
    assert!(matches!(
        err,
        ActorError::ModuleMemberNotFound { ref member, .. } if member == "pear"
    ));
    assert_eq!(system.actor_count(), 0);
}

#[test]
fn test_image_json_round_trip() {
    let system = system();
    let image = system
        .builder()
        .set_args(vec![Complete::int(7)])
        .set_source(ADDER)
        .parse()
        .unwrap()
        .configure()
        .unwrap()
        .construct()
        .unwrap()
        .image();

    let json = image.to_json().unwrap();
    let restored = strand_actor::ActorImage::from_json(&json).unwrap();
    assert_eq!(restored, image);

    let adder = restored.spawn(&system, addr("restored"), vec![]).unwrap();
    assert_eq!(reply(&system, &adder, add(1)), Complete::int(8));
}

#[test]
fn test_image_with_actor_argument_does_not_serialize() {
    let system = system();
    let (sink, _inbox) = system.mailbox(addr("sink"));
    let image = system
        .builder()
        .set_args(vec![sink.to_complete()])
        .set_source("actor Forwarder(target) in handle tell m in target.tell(m) end end")
        .parse()
        .unwrap()
        .configure()
        .unwrap()
        .construct()
        .unwrap()
        .image();
    assert!(matches!(image.to_json(), Err(ActorError::Serialization(_))));
}

#[test]
fn test_failed_init_deregisters() {
    let system = system();
    let actor = spawn(&system, "broken", vec![], "actor Broken() in var x = 1 / 0 end");
    assert!(wait_until(|| system.actor_at(&addr("broken")).is_none()));
    assert!(wait_until(|| actor.is_stopped()));
    assert!(actor.tell(Complete::int(1)).is_err());

    // The released address can be reused
    let adder = spawn(&system, "broken", vec![Complete::int(1)], ADDER);
    assert_eq!(reply(&system, &adder, add(1)), Complete::int(2));
}

#[test]
fn test_actor_state_from_init() {
    let system = system();
    let scaler = spawn(
        &system,
        "scaler",
        vec![Complete::int(6)],
        r#"
        actor Scaler(limit) in
            var half = limit / 2
            func scale(x) in x * half end
            handle ask n in scale(n) end
        end
        "#,
    );
    assert_eq!(reply(&system, &scaler, Complete::int(5)), Complete::int(15));
}

#[test]
fn test_shutdown_stops_everything() {
    let system = system();
    let a = spawn(&system, "a", vec![Complete::int(1)], ADDER);
    let b = spawn(&system, "b", vec![Complete::int(2)], ADDER);
    system.shutdown();
    assert_eq!(system.actor_count(), 0);
    assert!(wait_until(|| a.is_stopped() && b.is_stopped()));
    assert!(!system.stop(&addr("a")));
}

#[test]
fn test_global_system_is_shared() {
    let first = ActorSystem::global().unwrap();
    let second = ActorSystem::global().unwrap();
    assert!(std::ptr::eq(first, second));
    assert_eq!(first.name(), "strand");
}
