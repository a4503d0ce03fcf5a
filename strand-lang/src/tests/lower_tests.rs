use crate::{lower_actor, lower_program, LangError};

fn lowered(source: &str) -> String {
    lower_program(source).unwrap().kernel.to_string()
}

#[test]
fn test_and_with_literal_operands() {
    let cases = [
        ("false && false", "if false then\n    x = false\nelse\n    x = false\nend"),
        ("false && true", "if false then\n    x = true\nelse\n    x = false\nend"),
        ("true && false", "if true then\n    x = false\nelse\n    x = false\nend"),
        ("true && true", "if true then\n    x = true\nelse\n    x = false\nend"),
    ];
    for (expr, expected) in cases {
        let source = format!("var x = {}", expr);
        assert_eq!(lowered(&source), format!("var x\n{}", expected), "lowering {}", expr);
    }
}

#[test]
fn test_and_with_compound_left_operand() {
    insta::assert_snapshot!(lowered("var a = 3\nvar x = a > 5 && a < 11"), @r"
    var a, x
    a = 3
    local $v0 in
        $v0 = a > 5
        if $v0 then
            x = a < 11
        else
            x = false
        end
    end
    ");
}

#[test]
fn test_or_is_symmetric() {
    insta::assert_snapshot!(lowered("var x = f(1) || b"), @r"
    var x
    local $v0 in
        f(1, $v0)
        if $v0 then
            x = true
        else
            x = b
        end
    end
    ");
}

#[test]
fn test_nested_temporaries_are_numbered_in_order() {
    insta::assert_snapshot!(lowered("var x = (a + 1) * (b - 2)"), @r"
    var x
    local $v0, $v1 in
        $v0 = a + 1
        $v1 = b - 2
        x = $v0 * $v1
    end
    ");
}

#[test]
fn test_func_gets_return_parameter() {
    insta::assert_snapshot!(lowered("func inc(n) in n + 1 end"), @r"
    var inc
    inc = proc (n, $ret) in
        $ret = n + 1
    end
    ");
}

#[test]
fn test_nested_var_scopes_rest_of_block() {
    insta::assert_snapshot!(lowered("proc p(out) in var t = 2 out = t * t end"), @r"
    var p
    p = proc (out) in
        local t in
            t = 2
            out = t * t
        end
    end
    ");
}

#[test]
fn test_actor_handlers_lower_to_one_case_chain() {
    let source = r#"
        actor Echo() in
            handle ask 'ping'#{'n': n} in n + 1 end
            handle ask other in other end
        end
    "#;
    let lowered = lower_actor(source).unwrap();
    insta::assert_snapshot!(lowered.kernel.to_string(), @r"
    actor Echo() in
        handle ask $m in
            case $m of 'ping'#{'n': n} then
                $r = n + 1
                respond $r
            else
                local other in
                    other = $m
                    $r = other
                    respond $r
                end
            end
        end
    end
    ");
}

#[test]
fn test_tell_handler_falls_through_to_unhandled() {
    let source = "actor Sink() in handle tell 'put'#{'v': v} in skip end end";
    let kernel = lower_actor(source).unwrap().kernel;
    assert!(kernel.ask_handler.is_none());
    let handler = kernel.tell_handler.unwrap().to_string();
    assert!(handler.ends_with("else\n    unhandled $m\nend"), "{}", handler);
}

#[test]
fn test_actor_state_is_hoisted() {
    let source = "actor A(limit) in var half = limit / 2 func twice(x) in x * 2 end end";
    let kernel = lower_actor(source).unwrap().kernel;
    let state: Vec<&str> = kernel.state.iter().map(|i| i.as_str()).collect();
    assert_eq!(state, vec!["half", "twice"]);
}

#[test]
fn test_value_block_must_end_with_expression() {
    let err = lower_program("func f(x) in var y = x end").unwrap_err();
    assert!(matches!(err, LangError::Lower { .. }));

    let err = lower_actor("actor A() in handle ask m in y = m end end").unwrap_err();
    assert!(matches!(err, LangError::Lower { .. }));

    let err = lower_program("var x = if a then 1 end").unwrap_err();
    assert!(matches!(err, LangError::Lower { .. }));
}

#[test]
fn test_duplicate_features_rejected() {
    let err = lower_program("var r = {'a': 1, 'a': 2}").unwrap_err();
    assert!(matches!(err, LangError::Lower { ref message, .. } if message.contains("'a'")));
}

#[test]
fn test_unused_expression_rejected() {
    assert!(lower_program("1 + 2").is_err());
    assert!(lower_program("p(1)").is_ok());
}
