use std::cell::RefCell;
use std::mem::discriminant;
use std::rc::Rc;

use lispy::{
    EnvError, Environment, Error, EvalError, Node, Number, ParseError, Sexpr, Span, eval_str,
    parse_str, tokenize,
};

fn global() -> Rc<RefCell<Environment>> {
    Environment::new_global_populated()
}

fn assert_eval_display(env: &Rc<RefCell<Environment>>, input: &str, expected: &str) {
    match eval_str(input, env) {
        Ok(node) => assert_eq!(node.to_string(), expected, "Input: {}", input),
        Err(e) => panic!("Evaluation failed for input '{}': {:?}", input, e),
    }
}

fn assert_eval_error(env: &Rc<RefCell<Environment>>, input: &str, expected: &EvalError) {
    match eval_str(input, env) {
        Err(Error::Eval(e)) => assert_eq!(
            discriminant(&e),
            discriminant(expected),
            "Input: {}, got {:?}",
            input,
            e
        ),
        other => panic!("Expected evaluation error for '{}', got {:?}", input, other),
    }
}

#[test]
fn test_tokenize_simple_expression() {
    let texts: Vec<String> = tokenize("(+ 1 2)")
        .unwrap()
        .iter()
        .map(|t| t.kind.to_string())
        .collect();
    assert_eq!(texts, vec!["(", "+", "1", "2", ")"]);
}

#[test]
fn test_parse_nested_expression() {
    let node = parse_str("(+ 1 (* 2 3))").unwrap();
    let s = Span::default();
    let expected = Node::new_list(
        vec![
            Node::new_symbol("+", s),
            Node::new_int(1, s),
            Node::new_list(
                vec![
                    Node::new_symbol("*", s),
                    Node::new_int(2, s),
                    Node::new_int(3, s),
                ],
                s,
            ),
        ],
        s,
    );
    assert_eq!(node, expected);
    let Sexpr::List(items) = &node.kind else {
        panic!("Expected list, got {:?}", node.kind);
    };
    assert!(matches!(items[1].kind, Sexpr::Number(Number::Int(1))));
}

#[test]
fn test_render_then_parse_round_trip() {
    for input in ["(a (b 1) 2.5 (c (d -3)) ())", "x", "-7", "1e100", "(quote (1 2.0))"] {
        let node = parse_str(input).unwrap();
        let reparsed = parse_str(&node.to_string()).unwrap();
        assert_eq!(reparsed, node, "Input: {}", input);
    }
}

#[test]
fn test_simple_arithmetic() {
    let env = global();
    assert_eval_display(&env, "(+ 1 2)", "3");
    assert_eval_display(&env, "(- 10 4 3)", "3");
    assert_eval_display(&env, "(/ 7 2)", "3.5");
    assert_eval_display(&env, "(* 2 2.5)", "5.0");
}

#[test]
fn test_define_then_use() {
    let env = global();
    let result = eval_str("(define r 10)", &env).unwrap();
    assert!(matches!(result.kind, Sexpr::Void));
    assert_eval_display(&env, "(* r r)", "100");
    assert_eval_display(&env, "(* pi (* r r))", "314.1592653589793");
}

#[test]
fn test_lambda_frame_does_not_leak() {
    let env = global();
    assert_eval_display(&env, "((lambda (x) (* x x)) 5)", "25");
    assert!(env.borrow().get("x").is_none());
    assert_eval_error(
        &env,
        "x",
        &EvalError::EnvError(EnvError::UnboundVariable(String::new(), Span::default())),
    );
}

#[test]
fn test_if_branches() {
    let env = global();
    assert_eval_display(&env, "(if (> 3 2) 1 2)", "1");
    assert_eval_display(&env, "(if (> 2 3) 1 2)", "2");
    assert_eval_display(&env, "(if 0 (quote yes) (quote no))", "yes");
    assert_eval_display(&env, "(if (quote ()) (quote yes) (quote no))", "no");
}

#[test]
fn test_unbound_symbol_leaves_env_unmodified() {
    let env = global();
    let before = env.borrow().get_identifiers();
    match eval_str("undefined_var", &env) {
        Err(Error::Eval(EvalError::EnvError(EnvError::UnboundVariable(name, _)))) => {
            assert_eq!(name, "undefined_var")
        }
        other => panic!("Expected unbound variable error, got {:?}", other),
    }
    assert_eq!(env.borrow().get_identifiers(), before);
}

#[test]
fn test_failed_define_does_not_bind() {
    let env = global();
    assert!(eval_str("(define y (car 5))", &env).is_err());
    assert!(env.borrow().get("y").is_none());
}

#[test]
fn test_unbalanced_input_is_syntax_error() {
    let env = global();
    assert!(matches!(
        eval_str("(+ 1 2", &env),
        Err(Error::Parse(ParseError::UnexpectedEof(_)))
    ));
    assert!(matches!(
        eval_str(")", &env),
        Err(Error::Parse(ParseError::UnexpectedToken { .. }))
    ));
    assert!(matches!(
        eval_str("   ", &env),
        Err(Error::Parse(ParseError::UnexpectedEof(_)))
    ));
}

#[test]
fn test_make_adder_closures() {
    let env = global();
    assert_eval_display(
        &env,
        "(define make-adder (lambda (n) (lambda (x) (+ x n))))
         (define add5 (make-adder 5))
         (add5 2)",
        "7",
    );
}

#[test]
fn test_set_on_captured_variable_is_observed() {
    let env = global();
    eval_str(
        "(define make-counter
           (lambda ()
             ((lambda (count)
                (lambda () (begin (set! count (+ count 1)) count)))
              0)))
         (define c (make-counter))",
        &env,
    )
    .unwrap();
    assert_eval_display(&env, "(c)", "1");
    assert_eval_display(&env, "(c)", "2");
    assert_eval_display(&env, "(c)", "3");
}

#[test]
fn test_recursive_programs() {
    let env = global();
    eval_str(
        "(define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))
         (define fib (lambda (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))
         (define count (lambda (item L)
           (if (null? L) 0 (+ (if (equal? item (car L)) 1 0) (count item (cdr L))))))",
        &env,
    )
    .unwrap();
    assert_eval_display(&env, "(fact 10)", "3628800");
    assert_eval_display(&env, "(fib 15)", "610");
    assert_eval_display(&env, "(count 0 (list 0 1 2 3 0 0))", "3");
    assert_eval_display(&env, "(map fib (list 1 2 3 4 5 6))", "(1 1 2 3 5 8)");
}

#[test]
fn test_integer_overflow_is_an_error() {
    let env = global();
    assert_eval_error(
        &env,
        "(* 9223372036854775807 2)",
        &EvalError::InvalidArguments(String::new(), Span::default()),
    );
    assert_eval_error(
        &env,
        "(/ 1 0)",
        &EvalError::InvalidArguments(String::new(), Span::default()),
    );
}

#[test]
fn test_calling_a_number_fails() {
    let env = global();
    assert_eval_error(
        &env,
        "(1 2 3)",
        &EvalError::NotAProcedure(Sexpr::Void, Span::default()),
    );
}

#[test]
fn test_deep_recursion_is_reported_not_fatal() {
    std::thread::Builder::new()
        .stack_size(lispy::INTERPRETER_STACK_SIZE)
        .spawn(|| {
            let env = global();
            eval_str(
                "(define down (lambda (n) (if (= n 0) 0 (down (- n 1)))))",
                &env,
            )
            .unwrap();
            assert_eval_error(
                &env,
                "(down 100000)",
                &EvalError::RecursionLimit(0, Span::default()),
            );
            // The same environment keeps working afterwards
            assert_eval_display(&env, "(down 200)", "0");
        })
        .unwrap()
        .join()
        .unwrap();
}

#[test]
fn test_deeply_nested_input_is_syntax_error() {
    let input = format!("{}{}", "(".repeat(200_000), ")".repeat(200_000));
    assert!(matches!(
        eval_str(&input, &global()),
        Err(Error::Parse(ParseError::NestingTooDeep(_)))
    ));
}
