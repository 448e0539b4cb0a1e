mod common;

use common::{markers, root, Fixture, OWNER};
use opjit_ast::{Context, OpCode, OpId, PadIndex, Term, Type};
use opjit_jit::{EditSet, JitCompiler, JitEngine, JitError, JitOptions};
use opjit_runtime::{Interp, OpState, RuntimeError, Scalar};
use pretty_assertions::assert_eq;

fn engine(options: JitOptions) -> JitEngine {
    JitEngine::new(options).expect("engine")
}

fn compile(engine: &mut JitEngine, fx: &Fixture, root: &Term) -> Result<EditSet, JitError> {
    JitCompiler::new(engine).compile(OWNER, std::slice::from_ref(root), &fx.scope)
}

fn prepare(fx: Fixture, inputs: &[(PadIndex, Scalar)]) -> Interp {
    let mut interp = fx.into_interp();
    for (slot, value) in inputs {
        interp.set_pad(*slot, value.clone()).expect("pad");
    }
    interp
}

/// Run without compiling anything.
fn interpret(fx: Fixture, inputs: &[(PadIndex, Scalar)]) -> Interp {
    let mut interp = prepare(fx, inputs);
    interp.run().expect("run");
    interp
}

// =============================================================================
// Programs
// =============================================================================

/// `$x += 1; $x *= 3; $x -= 0.5`
fn updates() -> (Fixture, Term, PadIndex) {
    let mut fx = Fixture::new();
    let (x, slot) = fx.declare("$x", Type::Unspecified);
    let (t, v) = (fx.var(x), fx.int(1));
    let s1 = fx.arith_assign(OpCode::Add, t, v);
    let (t, v) = (fx.var(x), fx.num(3.0));
    let s2 = fx.arith_assign(OpCode::Multiply, t, v);
    let (t, v) = (fx.var(x), fx.num(0.5));
    let s3 = fx.arith_assign(OpCode::Subtract, t, v);
    let program = fx.program(vec![s1, s2, s3]);
    (fx, program, slot)
}

struct Modulo {
    fx: Fixture,
    program: Term,
    r: PadIndex,
    a: PadIndex,
    b: PadIndex,
    c: PadIndex,
    fragment: OpId,
}

/// `$r = $a + $b % $c`
fn modulo() -> Modulo {
    let mut fx = Fixture::new();
    let (r, r_slot) = fx.declare("$r", Type::Unspecified);
    let (a, a_slot) = fx.declare("$a", Type::Unspecified);
    let (b, b_slot) = fx.declare("$b", Type::Unspecified);
    let (c, c_slot) = fx.declare("$c", Type::Unspecified);

    let target = fx.var(r);
    let left = fx.var(a);
    let (bv, cv) = (fx.var(b), fx.var(c));
    let rem = fx.arith(OpCode::Modulo, bv, cv);
    let fragment = root(&rem);
    let sum = fx.arith(OpCode::Add, left, rem);
    let stmt = fx.assign(target, sum);
    let program = fx.program(vec![stmt]);
    Modulo {
        fx,
        program,
        r: r_slot,
        a: a_slot,
        b: b_slot,
        c: c_slot,
        fragment,
    }
}

// =============================================================================
// Batches
// =============================================================================

#[test]
fn test_assignment_statements_share_one_unit() {
    let mut engine = engine(JitOptions::debug());
    let (fx, program, x) = updates();
    let edits = compile(&mut engine, &fx, &program).expect("compile");

    assert_eq!(edits.replacements().count(), 1);
    assert_eq!(edits.detach_count(), 0);
    let unit = edits.replacements().next().expect("unit");
    assert!(unit.subtrees.is_empty());
    assert!(unit.code_size > 0);
    assert_eq!(engine.unit_count(), 1);

    let ns = markers(&program);
    let mut interp = prepare(fx, &[(x, Scalar::Int(2))]);
    let created = interp.apply_edits(edits).expect("apply");
    assert_eq!(interp.graph().exec_order(), vec![ns[0], created[0]]);
    interp.run().expect("run");
    assert_eq!(interp.pad(x), Some(&Scalar::Num(8.5)));

    let (fx, _, x) = updates();
    let baseline = interpret(fx, &[(x, Scalar::Int(2))]);
    assert_eq!(baseline.pad(x), Some(&Scalar::Num(8.5)));
}

#[test]
fn test_typed_additions_share_one_unit() {
    // $x += $y; $x += $y; $x += $y
    fn build() -> (Fixture, Term, PadIndex, PadIndex) {
        let mut fx = Fixture::new();
        let (x, x_slot) = fx.declare("$x", Type::Double);
        let (y, y_slot) = fx.declare("$y", Type::Int);
        let mut stmts = Vec::new();
        for _ in 0..3 {
            let (xv, yv) = (fx.var(x), fx.var(y));
            stmts.push(fx.arith_assign(OpCode::Add, xv, yv));
        }
        let program = fx.program(stmts);
        (fx, program, x_slot, y_slot)
    }

    let mut engine = engine(JitOptions::debug());
    let (fx, program, x, y) = build();
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    assert_eq!(edits.replacements().count(), 1);
    assert_eq!(edits.detach_count(), 0);
    assert_eq!(engine.unit_count(), 1);

    let inputs = [(x, Scalar::Num(1.5)), (y, Scalar::Int(2))];
    let mut interp = prepare(fx, &inputs);
    interp.apply_edits(edits).expect("apply");
    interp.run().expect("run");
    assert_eq!(interp.pad(x), Some(&Scalar::Num(7.5)));
    assert_eq!(interp.pad(y), Some(&Scalar::Int(2)));

    let (fx, _, x, y) = build();
    let baseline = interpret(fx, &[(x, Scalar::Num(1.5)), (y, Scalar::Int(2))]);
    assert_eq!(baseline.pad(x), Some(&Scalar::Num(7.5)));
}

#[test]
fn test_opaque_statement_splits_batches() {
    // $x += 1; $t += 1; $x *= 2  with $t trap-carrying
    let mut fx = Fixture::new();
    let (x, x_slot) = fx.declare("$x", Type::Unspecified);
    let (t, t_slot) = fx.declare("$t", Type::Opaque);
    let (target, v) = (fx.var(x), fx.int(1));
    let s1 = fx.arith_assign(OpCode::Add, target, v);
    let (target, v) = (fx.var(t), fx.int(1));
    let interpreted = [root(&target), root(&v)];
    let s2 = fx.arith_assign(OpCode::Add, target, v);
    let s2_root = root(&s2);
    let (target, v) = (fx.var(x), fx.int(2));
    let s3 = fx.arith_assign(OpCode::Multiply, target, v);
    let program = fx.program(vec![s1, s2, s3]);

    let mut engine = engine(JitOptions::debug());
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    assert_eq!(edits.replacements().count(), 2);
    assert_eq!(edits.detach_count(), 0);

    let ns = markers(&program);
    let mut interp = prepare(fx, &[(x_slot, Scalar::Int(1)), (t_slot, Scalar::Int(5))]);
    let created = interp.apply_edits(edits).expect("apply");
    assert_eq!(
        interp.graph().exec_order(),
        vec![
            ns[0],
            created[0],
            ns[1],
            interpreted[0],
            interpreted[1],
            s2_root,
            ns[2],
            created[1],
        ]
    );
    interp.run().expect("run");
    assert_eq!(interp.pad(x_slot), Some(&Scalar::Num(4.0)));
    assert_eq!(interp.pad(t_slot), Some(&Scalar::Num(6.0)));
}

#[test]
fn test_scalar_root_pushes_result() {
    // -($a * $b) as a bare expression
    fn build() -> (Fixture, Term, PadIndex, PadIndex) {
        let mut fx = Fixture::new();
        let (a, a_slot) = fx.declare("$a", Type::Unspecified);
        let (b, b_slot) = fx.declare("$b", Type::Unspecified);
        let (av, bv) = (fx.var(a), fx.var(b));
        let product = fx.arith(OpCode::Multiply, av, bv);
        let neg = fx.negate(product);
        let expr = fx.expression(neg);
        (fx, expr, a_slot, b_slot)
    }

    let mut engine = engine(JitOptions::debug());
    let (fx, expr, a, b) = build();
    let edits = compile(&mut engine, &fx, &expr).expect("compile");
    let inputs = [(a, Scalar::Int(2)), (b, Scalar::Str("3 apples".into()))];
    let mut interp = prepare(fx, &inputs);
    let created = interp.apply_edits(edits).expect("apply");
    assert_eq!(interp.graph().root(), Some(created[0]));
    interp.run().expect("run");
    assert_eq!(interp.stack_values(), vec![Scalar::Num(-6.0)]);

    let (fx, _, a, b) = build();
    let inputs = [(a, Scalar::Int(2)), (b, Scalar::Str("3 apples".into()))];
    assert_eq!(interpret(fx, &inputs).stack_values(), vec![Scalar::Num(-6.0)]);
}

#[test]
fn test_unsigned_constants() {
    // $x = 18446744073709551615; $r = 9223372036854779904 + 1.0
    const BIG: u64 = (1 << 63) + 4096;
    fn build() -> (Fixture, Term, PadIndex, PadIndex) {
        let mut fx = Fixture::new();
        let (x, x_slot) = fx.declare("$x", Type::Unspecified);
        let (r, r_slot) = fx.declare("$r", Type::Unspecified);
        let (xv, max) = (fx.var(x), fx.uint(u64::MAX));
        let s1 = fx.assign(xv, max);
        let rv = fx.var(r);
        let (big, one) = (fx.uint(BIG), fx.num(1.0));
        let sum = fx.arith(OpCode::Add, big, one);
        let s2 = fx.assign(rv, sum);
        let program = fx.program(vec![s1, s2]);
        (fx, program, x_slot, r_slot)
    }

    let mut engine = engine(JitOptions::debug());
    let (fx, program, x, r) = build();
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    assert_eq!(edits.replacements().count(), 1);
    assert_eq!(engine.unit_count(), 1);

    let mut interp = prepare(fx, &[]);
    interp.apply_edits(edits).expect("apply");
    interp.run().expect("run");
    assert_eq!(interp.pad(x), Some(&Scalar::UInt(u64::MAX)));
    assert_eq!(interp.pad(r), Some(&Scalar::Num(BIG as f64 + 1.0)));

    let (fx, _, x, r) = build();
    let baseline = interpret(fx, &[]);
    assert_eq!(baseline.pad(x), interp.pad(x));
    assert_eq!(baseline.pad(r), interp.pad(r));
}

#[test]
fn test_compile_leaves_graph_untouched() {
    let mut engine = engine(JitOptions::default());
    let (fx, program, _) = updates();
    let before = fx.graph.exec_order();
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    assert_eq!(fx.graph.exec_order(), before);
    assert!(edits.iter().all(|edit| edit.owner() == OWNER));
}

// =============================================================================
// Call-backs
// =============================================================================

#[test]
fn test_modulo_runs_through_callback() {
    let mut engine = engine(JitOptions::debug());
    let Modulo {
        fx,
        program,
        r,
        a,
        b,
        c,
        fragment,
    } = modulo();
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    assert_eq!(edits.replacements().count(), 1);
    assert_eq!(edits.detach_count(), 1);
    let unit = edits.replacements().next().expect("unit");
    assert_eq!(unit.subtrees, vec![fragment]);

    let inputs = [(a, Scalar::Int(1)), (b, Scalar::Int(7)), (c, Scalar::Int(4))];
    let mut interp = prepare(fx, &inputs);
    let created = interp.apply_edits(edits).expect("apply");
    let graph = interp.graph();
    assert_eq!(graph.op(created[0]).expect("native").kids, vec![fragment]);
    assert_eq!(graph.op(fragment).expect("fragment").state, OpState::Detached);
    assert_eq!(graph.op(fragment).expect("fragment").next, None);
    interp.run().expect("run");
    assert_eq!(interp.pad(r), Some(&Scalar::Num(4.0)));

    let m = modulo();
    let inputs = [(m.a, Scalar::Int(1)), (m.b, Scalar::Int(7)), (m.c, Scalar::Int(4))];
    assert_eq!(interpret(m.fx, &inputs).pad(m.r), Some(&Scalar::Num(4.0)));
}

#[test]
fn test_callback_fault_surfaces() {
    let mut engine = engine(JitOptions::debug());
    let m = modulo();
    let edits = compile(&mut engine, &m.fx, &m.program).expect("compile");
    let inputs = [(m.a, Scalar::Int(1)), (m.b, Scalar::Int(7)), (m.c, Scalar::Int(0))];
    let mut interp = prepare(m.fx, &inputs);
    interp.apply_edits(edits).expect("apply");
    assert_eq!(interp.run(), Err(RuntimeError::IllegalModulus));
}

#[test]
fn test_nested_batch_inside_callback() {
    // $r = $a + (($b + $c) % $d)
    fn build() -> (Fixture, Term, [PadIndex; 5], OpId) {
        let mut fx = Fixture::new();
        let (r, r_slot) = fx.declare("$r", Type::Unspecified);
        let (a, a_slot) = fx.declare("$a", Type::Unspecified);
        let (b, b_slot) = fx.declare("$b", Type::Unspecified);
        let (c, c_slot) = fx.declare("$c", Type::Unspecified);
        let (d, d_slot) = fx.declare("$d", Type::Unspecified);

        let target = fx.var(r);
        let left = fx.var(a);
        let (bv, cv) = (fx.var(b), fx.var(c));
        let inner = fx.arith(OpCode::Add, bv, cv);
        let dv = fx.var(d);
        let rem = fx.arith(OpCode::Modulo, inner, dv);
        let modulo = root(&rem);
        let sum = fx.arith(OpCode::Add, left, rem);
        let stmt = fx.assign(target, sum);
        let program = fx.program(vec![stmt]);
        (fx, program, [r_slot, a_slot, b_slot, c_slot, d_slot], modulo)
    }
    let values = [5, 7, 4, 3].map(Scalar::Int);

    let mut engine = engine(JitOptions::debug());
    let (fx, program, slots, modulo) = build();
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    let units: Vec<_> = edits.replacements().cloned().collect();
    assert_eq!(units.len(), 2);
    assert_eq!(edits.detach_count(), 1);
    assert!(units[0].subtrees.is_empty());
    assert_eq!(units[1].subtrees, vec![modulo]);

    let inputs: Vec<_> = slots[1..].iter().copied().zip(values.clone()).collect();
    let ns = markers(&program);
    let mut interp = prepare(fx, &inputs);
    let created = interp.apply_edits(edits).expect("apply");
    assert_eq!(interp.graph().exec_order(), vec![ns[0], created[1]]);
    assert_eq!(interp.graph().op(modulo).expect("fragment").kids[0], created[0]);
    interp.run().expect("run");
    assert_eq!(interp.pad(slots[0]), Some(&Scalar::Num(7.0)));

    let (fx, _, slots, _) = build();
    let inputs: Vec<_> = slots[1..].iter().copied().zip(values).collect();
    assert_eq!(interpret(fx, &inputs).pad(slots[0]), Some(&Scalar::Num(7.0)));
}

#[test]
fn test_ternary_fragment_stops_at_both_branches() {
    // $r = $a + ($c ? $x : $y)
    let mut fx = Fixture::new();
    let (r, r_slot) = fx.declare("$r", Type::Unspecified);
    let (a, a_slot) = fx.declare("$a", Type::Unspecified);
    let (c, c_slot) = fx.declare("$c", Type::Unspecified);
    let (x, x_slot) = fx.declare("$x", Type::Unspecified);
    let (y, y_slot) = fx.declare("$y", Type::Unspecified);
    let target = fx.var(r);
    let left = fx.var(a);
    let (cv, xv, yv) = (fx.var(c), fx.var(x), fx.var(y));
    let branches = [root(&xv), root(&yv)];
    let choice = fx.ternary(cv, xv, yv);
    let sum = fx.arith(OpCode::Add, left, choice);
    let stmt = fx.assign(target, sum);
    let program = fx.program(vec![stmt]);

    let mut engine = engine(JitOptions::debug());
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    let inputs = [
        (a_slot, Scalar::Int(1)),
        (x_slot, Scalar::Int(10)),
        (y_slot, Scalar::Int(20)),
    ];
    let mut interp = prepare(fx, &inputs);
    interp.apply_edits(edits).expect("apply");
    for exit in branches {
        assert_eq!(interp.graph().op(exit).expect("branch").next, None);
    }

    interp.set_pad(c_slot, Scalar::Int(1)).expect("pad");
    interp.run().expect("run");
    assert_eq!(interp.pad(r_slot), Some(&Scalar::Num(11.0)));

    interp.set_pad(c_slot, Scalar::Str("0".into())).expect("pad");
    interp.run().expect("run");
    assert_eq!(interp.pad(r_slot), Some(&Scalar::Num(21.0)));
}

#[test]
fn test_declaration_restored_on_fault() {
    // my $v = $a * 2; $r = $a + $b % $z
    let mut fx = Fixture::new();
    let (v, v_slot) = fx.declare("$v", Type::Unspecified);
    let (r, _) = fx.declare("$r", Type::Unspecified);
    let (a, a_slot) = fx.declare("$a", Type::Unspecified);
    let (b, b_slot) = fx.declare("$b", Type::Unspecified);
    let (z, _) = fx.declare("$z", Type::Unspecified);

    let decl = fx.my(v);
    let (av, two) = (fx.var(a), fx.int(2));
    let product = fx.arith(OpCode::Multiply, av, two);
    let s1 = fx.assign(decl, product);
    let target = fx.var(r);
    let left = fx.var(a);
    let (bv, zv) = (fx.var(b), fx.var(z));
    let rem = fx.arith(OpCode::Modulo, bv, zv);
    let sum = fx.arith(OpCode::Add, left, rem);
    let s2 = fx.assign(target, sum);
    let program = fx.program(vec![s1, s2]);

    let mut engine = engine(JitOptions::debug());
    let edits = compile(&mut engine, &fx, &program).expect("compile");
    assert_eq!(edits.replacements().count(), 1);

    let inputs = [
        (v_slot, Scalar::Int(99)),
        (a_slot, Scalar::Int(5)),
        (b_slot, Scalar::Int(3)),
    ];
    let mut interp = prepare(fx, &inputs);
    interp.apply_edits(edits).expect("apply");
    assert_eq!(interp.run(), Err(RuntimeError::IllegalModulus));
    assert_eq!(interp.pad(v_slot), Some(&Scalar::Int(99)));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_constant_target_is_rejected() {
    fn build() -> (Fixture, Term) {
        let mut fx = Fixture::new();
        let (x, _) = fx.declare("$x", Type::Unspecified);
        let (one, xv) = (fx.int(1), fx.var(x));
        let stmt = fx.arith_assign(OpCode::Add, one, xv);
        let program = fx.program(vec![stmt]);
        (fx, program)
    }

    let mut strict = engine(JitOptions::debug());
    let (fx, program) = build();
    match compile(&mut strict, &fx, &program) {
        Err(JitError::RepresentationMismatch(msg)) => {
            assert!(msg.starts_with("Can only assign to scalars"), "{msg}")
        }
        other => panic!("expected a representation error, got {other:?}"),
    }

    let mut lenient = engine(JitOptions::debug().lenient());
    let (fx, program) = build();
    let edits = compile(&mut lenient, &fx, &program).expect("lenient compile");
    assert!(edits.is_empty());
}

#[test]
fn test_string_constant_is_unsupported() {
    let mut fx = Fixture::new();
    let (x, _) = fx.declare("$x", Type::Unspecified);
    let (xv, s) = (fx.var(x), fx.string("abc"));
    let stmt = fx.arith_assign(OpCode::Add, xv, s);
    let program = fx.program(vec![stmt]);

    let mut engine = engine(JitOptions::debug());
    let err = compile(&mut engine, &fx, &program).expect_err("string constant");
    assert!(matches!(err, JitError::UnsupportedConstant(_)));
    assert!(err.to_string().starts_with("Unable to emit this type of constant"));
}

#[test]
fn test_caller_context_is_rejected() {
    let mut engine = engine(JitOptions::debug());
    let check = |engine: &mut JitEngine, fx: &Fixture, root: &Term| {
        let err = compile(engine, fx, root).expect_err("caller context");
        assert!(matches!(err, JitError::UnimplementedContext(Context::Caller)));
        assert_eq!(err.to_string(), "Caller-determined context not implemented");
    };

    // Root expression.
    let mut fx = Fixture::new();
    let (a, _) = fx.declare("$a", Type::Unspecified);
    let (l, r) = (fx.var(a), fx.num(2.0));
    let product = fx.arith(OpCode::Multiply, l, r);
    let expr = fx.expression(product).with_context(Context::Caller);
    check(&mut engine, &fx, &expr);

    // Root assignment.
    let mut fx = Fixture::new();
    let (a, _) = fx.declare("$a", Type::Unspecified);
    let (l, r) = (fx.var(a), fx.num(2.0));
    let assign = fx.assign(l, r);
    let expr = fx.expression(assign).with_context(Context::Caller);
    check(&mut engine, &fx, &expr);

    // Call-back fragment.
    let mut fx = Fixture::new();
    let (a, _) = fx.declare("$a", Type::Unspecified);
    let (b, _) = fx.declare("$b", Type::Unspecified);
    let left = fx.var(a);
    let (bv, two) = (fx.var(b), fx.int(2));
    let rem = fx.arith(OpCode::Modulo, bv, two).with_context(Context::Caller);
    let sum = fx.arith(OpCode::Add, left, rem);
    let program = fx.program(vec![sum]);
    check(&mut engine, &fx, &program);
}

#[test]
fn test_lenient_mode_keeps_good_batches() {
    // 1 += $x; $t += 1; $x += 2
    fn build() -> (Fixture, Term, PadIndex) {
        let mut fx = Fixture::new();
        let (x, x_slot) = fx.declare("$x", Type::Unspecified);
        let (t, _) = fx.declare("$t", Type::Opaque);
        let (one, xv) = (fx.int(1), fx.var(x));
        let s1 = fx.arith_assign(OpCode::Add, one, xv);
        let (tv, one) = (fx.var(t), fx.int(1));
        let s2 = fx.arith_assign(OpCode::Add, tv, one);
        let (xv, two) = (fx.var(x), fx.int(2));
        let s3 = fx.arith_assign(OpCode::Add, xv, two);
        let program = fx.program(vec![s1, s2, s3]);
        (fx, program, x_slot)
    }

    let mut strict = engine(JitOptions::debug());
    let (fx, program, _) = build();
    assert!(compile(&mut strict, &fx, &program).is_err());

    let mut lenient = engine(JitOptions::debug().lenient());
    let (fx, program, x) = build();
    let edits = compile(&mut lenient, &fx, &program).expect("compile");
    assert_eq!(edits.replacements().count(), 1);

    let mut interp = prepare(fx, &[(x, Scalar::Int(1))]);
    interp.apply_edits(edits).expect("apply");
    interp.run().expect("run");
    assert_eq!(interp.pad(x), Some(&Scalar::Num(3.0)));
}

#[test]
fn test_failed_batch_drops_nested_edits() {
    // $a + (($b + $c) % $d) + "x"
    fn build() -> (Fixture, Term) {
        let mut fx = Fixture::new();
        let (a, _) = fx.declare("$a", Type::Unspecified);
        let (b, _) = fx.declare("$b", Type::Unspecified);
        let (c, _) = fx.declare("$c", Type::Unspecified);
        let (d, _) = fx.declare("$d", Type::Unspecified);
        let av = fx.var(a);
        let (bv, cv) = (fx.var(b), fx.var(c));
        let inner = fx.arith(OpCode::Add, bv, cv);
        let dv = fx.var(d);
        let rem = fx.arith(OpCode::Modulo, inner, dv);
        let sum = fx.arith(OpCode::Add, av, rem);
        let x = fx.string("x");
        let concat = fx.arith(OpCode::Add, sum, x);
        let program = fx.program(vec![concat]);
        (fx, program)
    }

    let mut strict = engine(JitOptions::debug());
    let (fx, program) = build();
    let err = compile(&mut strict, &fx, &program).expect_err("string constant");
    assert!(matches!(err, JitError::UnsupportedConstant(_)));

    let mut lenient = engine(JitOptions::debug().lenient());
    let (fx, program) = build();
    let edits = compile(&mut lenient, &fx, &program).expect("lenient compile");
    assert!(edits.is_empty());
    // The outer batch and the nested `$b + $c` batch were both defined.
    assert_eq!(lenient.unit_count(), 2);
}
