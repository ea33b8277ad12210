//! End-to-end behaviour of each process construct.
//!
//! Most tests run under a `Probe`: `x` records what is sent to it, `z` hands
//! out 0, 1, 2, ... to receivers and `y` is bound to 2.

use pike::test_support::{run_probe_err, run_probe_ok, Injector, Probe, Sensor};
use pike::{
    ChannelId, Config, Definition, EvalError, Expr, Pattern, Process, Quiescence, StuckChannel, Value,
};

fn nil() -> Process {
    Process::nil()
}

fn nums(values: &[i64]) -> Vec<Value> {
    values.iter().map(|n| Value::Num(*n)).collect()
}

fn tuple(items: Vec<Expr>) -> Expr {
    Expr::tuple(items)
}

// ============================================================================
// Nil and send
// ============================================================================

#[test]
fn nil_does_nothing() {
    assert!(run_probe_ok(nil()).is_empty());
}

#[test]
fn send_delivers_value_to_channel() {
    let values = run_probe_ok(Process::send("x", "y", nil()));
    assert_eq!(values, nums(&[2]));
}

#[test]
fn evaluation_continues_after_send_is_taken() {
    let values = run_probe_ok(Process::send("x", "y", Process::send("x", "y", nil())));
    assert_eq!(values, nums(&[2, 2]));
}

#[test]
fn send_only_proceeds_when_channel_allows() {
    let mut probe = Probe::from_parts(
        Config::default(),
        Sensor::new("x").resuming_at_most(0),
        Injector::new("z"),
    );
    let summary = probe
        .run(Process::send("x", "y", Process::send("x", "y", nil())))
        .unwrap();
    assert_eq!(probe.numbers(), vec![2]);
    assert!(matches!(summary.quiescence, Quiescence::Blocked(ref stuck) if stuck[0].name == "x"));
}

// ============================================================================
// Receive
// ============================================================================

#[test]
fn receive_asks_channel_for_a_value() {
    let mut probe = Probe::new();
    probe.run(Process::receive("z", "y", nil())).unwrap();
    assert_eq!(probe.injected.get(), 1);
}

#[test]
fn receive_binds_locally_for_the_rest_of_the_process() {
    let mut probe = Probe::new();
    probe
        .run(Process::receive("z", "t", Process::send("x", "t", nil())))
        .unwrap();
    assert_eq!(probe.numbers(), vec![0]);
    let root = probe.interp.root();
    assert!(probe.interp.lookup(root, "t").is_none());
}

#[test]
fn receive_shadows_outer_binding() {
    let mut probe = Probe::new();
    probe
        .run(Process::receive("z", "y", Process::send("x", "y", nil())))
        .unwrap();
    assert_eq!(probe.numbers(), vec![0]);
    let root = probe.interp.root();
    assert_eq!(probe.interp.lookup(root, "y"), Some(&Value::Num(2)));
}

#[test]
fn receive_only_proceeds_when_channel_allows() {
    let mut probe = Probe::from_parts(
        Config::default(),
        Sensor::new("x"),
        Injector::new("z").with_limit(0),
    );
    let summary = probe
        .run(Process::receive("z", "y", Process::send("x", "y", nil())))
        .unwrap();
    assert!(probe.values().is_empty());
    match summary.quiescence {
        Quiescence::Blocked(stuck) => assert_eq!(stuck[0].pending_receives, 1),
        other => panic!("expected blocked receive, got {:?}", other),
    }
}

// ============================================================================
// Replicated receive
// ============================================================================

#[test]
fn replicated_receive_relistens_after_each_message() {
    let mut probe = Probe::from_parts(
        Config::default(),
        Sensor::new("x"),
        Injector::new("z").with_limit(3),
    );
    let summary = probe
        .run(Process::replicate("z", "y", Process::send("x", "y", nil())))
        .unwrap();
    assert_eq!(probe.numbers(), vec![0, 1, 2]);
    // still listening, which is not a deadlock
    assert!(summary.quiescence.is_terminated());
}

#[test]
fn replicated_receive_drains_buffered_sends_in_order() {
    let program = Process::new_channel(
        "c",
        Process::parallel(vec![
            Process::send("c", 0, nil()),
            Process::send("c", 1, nil()),
            Process::send("c", 2, nil()),
            Process::replicate("c", "v", Process::send("x", "v", nil())),
        ]),
    );
    let mut probe = Probe::new();
    let summary = probe.run(program).unwrap();
    assert_eq!(probe.numbers(), vec![0, 1, 2]);
    assert!(summary.quiescence.is_terminated());
}

#[test]
fn single_receive_fires_once() {
    let program = Process::new_channel(
        "c",
        Process::parallel(vec![
            Process::send("c", 0, nil()),
            Process::send("c", 1, nil()),
            Process::receive("c", "v", Process::send("x", "v", nil())),
        ]),
    );
    let mut probe = Probe::new();
    let summary = probe.run(program).unwrap();
    assert_eq!(probe.numbers(), vec![0]);
    match summary.quiescence {
        Quiescence::Blocked(stuck) => {
            assert_eq!(stuck.len(), 1);
            assert_eq!(stuck[0].pending_sends, 1);
        }
        other => panic!("expected one unmatched send, got {:?}", other),
    }
}

// ============================================================================
// Parallel composition and run
// ============================================================================

#[test]
fn parallel_runs_every_branch() {
    let program = Process::par(
        Process::receive("z", "t", Process::send("x", "t", nil())),
        Process::send("x", "y", nil()),
    );
    assert_eq!(run_probe_ok(program), nums(&[2, 0]));
}

#[test]
fn run_starts_both_processes() {
    let program = Process::run(Process::send("x", 1, nil()), Process::send("x", 2, nil()));
    assert_eq!(run_probe_ok(program), nums(&[1, 2]));
}

// ============================================================================
// New
// ============================================================================

#[test]
fn new_binds_a_fresh_channel() {
    let mut probe = Probe::new();
    probe
        .run(Process::new_channel("n", Process::send("x", "n", nil())))
        .unwrap();
    let values = probe.values();
    assert!(matches!(values[0], Value::Channel(_)));
    assert_eq!(probe.interp.describe(&values[0]), "n#1");
}

#[test]
fn each_new_allocates_a_distinct_channel() {
    let program = Process::new_channel(
        "a",
        Process::send("x", "a", Process::new_channel("a", Process::send("x", "a", nil()))),
    );
    let mut probe = Probe::new();
    probe.run(program).unwrap();
    let values = probe.values();
    assert_eq!(values.len(), 2);
    assert_ne!(values[0], values[1]);
    assert_eq!(probe.interp.describe(&values[1]), "a#2");
}

#[test]
fn fresh_channel_buffers_sends_until_a_receive_occurs() {
    // new(t).(z?n.t!n.z?g.() | z?n.t!n.() | x!t.())
    let program = Process::new_channel(
        "t",
        Process::parallel(vec![
            Process::receive("z", "n", Process::send("t", "n", Process::receive("z", "g", nil()))),
            Process::receive("z", "n", Process::send("t", "n", nil())),
            Process::send("x", "t", nil()),
        ]),
    );
    let mut probe = Probe::new();
    let summary = probe.run(program).unwrap();

    let t = probe.values()[0].clone();
    let id = t.as_channel().expect("x received the channel");
    let backlog = probe.interp.runtime.port(id).unwrap().backlog();
    assert_eq!(backlog.sends, 2);
    assert_eq!(backlog.receives, 0);
    assert!(!summary.quiescence.is_terminated());

    // Draining t shows the sends were queued in order and resumes the first sender.
    probe.interp.bind("t", t.clone()).unwrap();
    let drain = Process::receive(
        "t",
        "a",
        Process::send("x", "a", Process::receive("t", "b", Process::send("x", "b", nil()))),
    );
    let summary = probe.run(drain).unwrap();
    assert_eq!(probe.values(), vec![t, Value::Num(0), Value::Num(1)]);
    assert_eq!(probe.injected.get(), 3);
    assert!(summary.quiescence.is_terminated());
}

#[test]
fn fresh_channel_buffers_receives_until_a_send_occurs() {
    // new(t).(t?g.g!y.() | t?g.() | x!t.())
    let program = Process::new_channel(
        "t",
        Process::parallel(vec![
            Process::receive("t", "g", Process::send("g", "y", nil())),
            Process::receive("t", "g", nil()),
            Process::send("x", "t", nil()),
        ]),
    );
    let mut probe = Probe::new();
    probe.run(program).unwrap();

    let t = probe.values()[0].clone();
    let id = t.as_channel().unwrap();
    assert_eq!(probe.interp.runtime.port(id).unwrap().backlog().receives, 2);

    probe.interp.bind("t", t.clone()).unwrap();
    let summary = probe.run(Process::send("t", "x", nil())).unwrap();
    assert_eq!(probe.values(), vec![t, Value::Num(2)]);
    match summary.quiescence {
        Quiescence::Blocked(stuck) => assert_eq!(stuck[0].pending_receives, 1),
        other => panic!("second receiver should still wait, got {:?}", other),
    }
}

#[test]
fn rendezvous_is_independent_of_schedule_order() {
    let send = || Process::send("c", 7, nil());
    let recv = || Process::receive("c", "v", Process::send("x", "v", nil()));

    let send_first = Process::new_channel("c", Process::par(send(), recv()));
    let recv_first = Process::new_channel("c", Process::par(recv(), send()));

    assert_eq!(run_probe_ok(send_first), nums(&[7]));
    assert_eq!(run_probe_ok(recv_first), nums(&[7]));
}

#[test]
fn blocked_receive_is_reported_at_quiescence() {
    let mut probe = Probe::new();
    let summary = probe
        .run(Process::new_channel("c", Process::receive("c", "v", nil())))
        .unwrap();
    // x and z take the first two slots
    assert_eq!(
        summary.quiescence,
        Quiescence::Blocked(vec![StuckChannel {
            id: ChannelId(2),
            name: "c#1".into(),
            pending_sends: 0,
            pending_receives: 1,
        }])
    );
}

// ============================================================================
// Tuple patterns
// ============================================================================

fn exchange(payload: Expr, pattern: Pattern, body: Process) -> Process {
    Process::new_channel(
        "c",
        Process::par(Process::send("c", payload, nil()), Process::receive("c", pattern, body)),
    )
}

#[test]
fn tuple_pattern_destructures() {
    let program = exchange(
        tuple(vec![1.into(), 2.into()]),
        Pattern::tuple(vec!["a".into(), "b".into()]),
        Process::send("x", "b", Process::send("x", "a", nil())),
    );
    assert_eq!(run_probe_ok(program), nums(&[2, 1]));
}

#[test]
fn nested_tuple_pattern_destructures() {
    let program = exchange(
        tuple(vec![tuple(vec![1.into(), "y".into()]), true.into()]),
        Pattern::tuple(vec![
            Pattern::tuple(vec!["a".into(), "b".into()]),
            "flag".into(),
        ]),
        Process::send("x", tuple(vec!["flag".into(), "b".into(), "a".into()]), nil()),
    );
    assert_eq!(
        run_probe_ok(program),
        vec![Value::Tuple(vec![Value::Bool(true), Value::Num(2), Value::Num(1)])]
    );
}

#[test]
fn tuple_pattern_rejects_longer_tuple() {
    let program = exchange(
        tuple(vec![1.into(), 2.into(), 3.into()]),
        Pattern::tuple(vec!["a".into(), "b".into()]),
        Process::send("x", "a", nil()),
    );
    let err = run_probe_err(program);
    assert!(matches!(err, EvalError::PatternMismatch { .. }));
}

#[test]
fn tuple_pattern_rejects_scalar() {
    let program = exchange(
        1.into(),
        Pattern::tuple(vec!["a".into(), "b".into()]),
        Process::send("x", "a", nil()),
    );
    match run_probe_err(program) {
        EvalError::PatternMismatch { pattern, value } => {
            assert_eq!(pattern.to_string(), "[a, b]");
            assert_eq!(value, Value::Num(1));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn empty_tuple_matches_only_empty_tuple() {
    let ok = exchange(tuple(vec![]), Pattern::tuple(vec![]), Process::send("x", 1, nil()));
    assert_eq!(run_probe_ok(ok), nums(&[1]));

    let too_long = exchange(tuple(vec![0.into()]), Pattern::tuple(vec![]), nil());
    assert!(matches!(run_probe_err(too_long), EvalError::PatternMismatch { .. }));

    let too_short = exchange(tuple(vec![]), Pattern::tuple(vec!["a".into()]), nil());
    assert!(matches!(run_probe_err(too_short), EvalError::PatternMismatch { .. }));
}

#[test]
fn mismatch_aborts_other_branches() {
    let program = Process::par(
        exchange(1.into(), Pattern::tuple(vec!["a".into()]), nil()),
        (0..10).rev().fold(nil(), |next, n| Process::send("x", n, next)),
    );
    let mut probe = Probe::new();
    assert!(probe.run(program).is_err());
    assert!(probe.numbers().len() < 10);
    assert_eq!(probe.interp.pending().count(), 0);
}

// ============================================================================
// Conditionals
// ============================================================================

#[test]
fn if_true_runs_then_branch() {
    let program = Process::cond(true, Process::send("x", 1, nil()), Process::send("x", 2, nil()));
    assert_eq!(run_probe_ok(program), nums(&[1]));
}

#[test]
fn if_false_runs_else_branch() {
    let program = Process::cond(false, Process::send("x", 1, nil()), Process::send("x", 2, nil()));
    assert_eq!(run_probe_ok(program), nums(&[2]));
}

#[test]
fn if_requires_boolean_guard() {
    let program = Process::cond("y", Process::send("x", 1, nil()), Process::send("x", 2, nil()));
    let mut probe = Probe::new();
    let err = probe.run(program).unwrap_err();
    assert_eq!(err, EvalError::NonBooleanGuard { found: Value::Num(2) });
    assert!(probe.values().is_empty());
}

#[test]
fn if_on_computed_comparison() {
    // new(r).(<![1, y, r] | r?b.if b then x!1 else x!0)
    let program = Process::new_channel(
        "r",
        Process::par(
            Process::send("<", tuple(vec![1.into(), "y".into(), "r".into()]), nil()),
            Process::receive(
                "r",
                "b",
                Process::cond("b", Process::send("x", 1, nil()), Process::send("x", 0, nil())),
            ),
        ),
    );
    assert_eq!(run_probe_ok(program), nums(&[1]));
}

// ============================================================================
// Built-in operators
// ============================================================================

fn compute(op: &str, left: Expr, right: Expr) -> Process {
    Process::new_channel(
        "r",
        Process::par(
            Process::send(op, tuple(vec![left, right, "r".into()]), nil()),
            Process::receive("r", "v", Process::send("x", "v", nil())),
        ),
    )
}

#[test]
fn arithmetic_operators() {
    assert_eq!(run_probe_ok(compute("+", 2.into(), "y".into())), nums(&[4]));
    assert_eq!(run_probe_ok(compute("-", 2.into(), 5.into())), nums(&[-3]));
    assert_eq!(run_probe_ok(compute("*", 6.into(), 7.into())), nums(&[42]));
    assert_eq!(run_probe_ok(compute("/", 7.into(), 2.into())), nums(&[3]));
    assert_eq!(run_probe_ok(compute("%", 7.into(), 2.into())), nums(&[1]));
}

#[test]
fn comparison_operators() {
    let t = || vec![Value::Bool(true)];
    assert_eq!(run_probe_ok(compute(">", 3.into(), 2.into())), t());
    assert_eq!(run_probe_ok(compute("<=", 2.into(), 2.into())), t());
    assert_eq!(run_probe_ok(compute(">=", 1.into(), 2.into())), vec![Value::Bool(false)]);
}

#[test]
fn equality_is_structural_and_channels_by_identity() {
    let same = compute(
        "==",
        tuple(vec![1.into(), tuple(vec!["x".into()])]),
        tuple(vec![1.into(), tuple(vec!["x".into()])]),
    );
    assert_eq!(run_probe_ok(same), vec![Value::Bool(true)]);

    let different_channels = compute("==", "x".into(), "z".into());
    assert_eq!(run_probe_ok(different_channels), vec![Value::Bool(false)]);

    let not_equal = compute("/=", tuple(vec![]), tuple(vec![0.into()]));
    assert_eq!(run_probe_ok(not_equal), vec![Value::Bool(true)]);
}

#[test]
fn operator_requires_three_tuple() {
    let program = Process::send("+", tuple(vec![1.into(), 2.into()]), nil());
    assert!(matches!(run_probe_err(program), EvalError::OperatorArity { .. }));
}

#[test]
fn operator_requires_numbers() {
    let program = compute("+", true.into(), 1.into());
    assert!(matches!(run_probe_err(program), EvalError::OperandType { .. }));
}

#[test]
fn operator_requires_result_channel() {
    let program = Process::send("+", tuple(vec![1.into(), 2.into(), 3.into()]), nil());
    assert!(matches!(run_probe_err(program), EvalError::ResultNotChannel { .. }));
}

#[test]
fn operator_reports_division_by_zero() {
    assert!(matches!(
        run_probe_err(compute("/", 1.into(), 0.into())),
        EvalError::Arithmetic { .. }
    ));
}

#[test]
fn sender_to_operator_waits_for_result_to_be_taken() {
    // +![1, 1, r].x!0 with nobody listening on r: x never hears 0
    let program = Process::new_channel(
        "r",
        Process::send("+", tuple(vec![1.into(), 1.into(), "r".into()]), Process::send("x", 0, nil())),
    );
    let mut probe = Probe::new();
    let summary = probe.run(program).unwrap();
    assert!(probe.values().is_empty());
    assert!(!summary.quiescence.is_terminated());
}

// ============================================================================
// Definitions
// ============================================================================

#[test]
fn def_procedures_communicate() {
    // new(c).def p[a] = a?v.x!v and q[b] = b!5 run (q![c] | p![c])
    let program = Process::new_channel(
        "c",
        Process::def(
            vec![
                Definition::new(
                    "p",
                    Pattern::tuple(vec!["a".into()]),
                    Process::receive("a", "v", Process::send("x", "v", nil())),
                ),
                Definition::new("q", Pattern::tuple(vec!["b".into()]), Process::send("b", 5, nil())),
            ],
            Process::par(
                Process::send("q", tuple(vec!["c".into()]), nil()),
                Process::send("p", tuple(vec!["c".into()]), nil()),
            ),
        ),
    );
    let mut probe = Probe::new();
    let summary = probe.run(program).unwrap();
    assert_eq!(probe.numbers(), vec![5]);
    assert!(summary.quiescence.is_terminated());
}

#[test]
fn def_with_run_continuation() {
    // new(c).def p[a] = a?v.x!v and q[b] = b!5 run (q![c] run p![c])
    let program = Process::new_channel(
        "c",
        Process::def(
            vec![
                Definition::new(
                    "p",
                    Pattern::tuple(vec!["a".into()]),
                    Process::receive("a", "v", Process::send("x", "v", nil())),
                ),
                Definition::new("q", Pattern::tuple(vec!["b".into()]), Process::send("b", 5, nil())),
            ],
            Process::run(
                Process::send("q", tuple(vec!["c".into()]), nil()),
                Process::send("p", tuple(vec!["c".into()]), nil()),
            ),
        ),
    );
    let mut probe = Probe::new();
    let summary = probe.run(program).unwrap();
    assert_eq!(probe.numbers(), vec![5]);
    assert!(summary.quiescence.is_terminated());
}

#[test]
fn def_procedures_are_mutually_recursive() {
    // def even[n] = if n == 0 then x!1 else -![n, 1, odd]
    // and odd[n]  = if n == 0 then x!0 else -![n, 1, even]
    // run even![7]
    let branch = |on_zero: i64, other: &str| {
        Process::new_channel(
            "z0",
            Process::par(
                Process::send("==", tuple(vec!["n".into(), 0.into(), "z0".into()]), nil()),
                Process::receive(
                    "z0",
                    "done",
                    Process::cond(
                        "done",
                        Process::send("x", on_zero, nil()),
                        Process::send("-", tuple(vec!["n".into(), 1.into(), other.into()]), nil()),
                    ),
                ),
            ),
        )
    };
    let program = Process::def(
        vec![
            Definition::new("even", "n", branch(1, "odd")),
            Definition::new("odd", "n", branch(0, "even")),
        ],
        Process::send("even", 7, nil()),
    );
    assert_eq!(run_probe_ok(program), nums(&[0]));
}

#[test]
fn def_names_are_scoped_to_the_block() {
    let program = Process::par(
        Process::def(vec![Definition::new("p", "a", nil())], nil()),
        Process::send("p", 1, nil()),
    );
    assert!(matches!(
        run_probe_err(program),
        EvalError::UnboundVariable { ref name, .. } if name == "p"
    ));
}
