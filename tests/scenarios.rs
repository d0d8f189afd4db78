//! Integration tests for the six named scenarios this kernel is expected
//! to satisfy end to end: folding (add-zero, beta, control elimination),
//! hash-consing, free-variable analysis, and tail-call lowering.

use lumina_ir::arena::{Arena, ArenaConfig};
use lumina_ir::builder::BodyBuilder;
use lumina_ir::fold::{construct_control, construct_let, construct_prim_op};
use lumina_ir::instruction::{make_join, make_return, make_tail_call, make_yield};
use lumina_ir::module::Module;
use lumina_ir::node::{AddressSpace, Annotation, IntWidth, Payload};
use lumina_ir::passes::tailcall::{lower_tailcalls, TailcallConfig, RUNTIME_HELPERS};
use lumina_ir::primop::PrimOp;
use lumina_ir::types::{make_int_type, make_join_point_type, make_qualified_type};
use lumina_ir::value::{make_fn_addr, make_int_literal, make_variable};

fn folding_module() -> Module {
    Module::new("scenarios", Arena::new(ArenaConfig::default()))
}

/// Scenario A — folding add-zero: `add(0, v)` where `v` is a varying
/// (non-uniform) `i32` variable returns `v` itself, pointer-equal.
#[test]
fn scenario_a_folding_add_zero() {
    let mut module = folding_module();
    let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
    let varying_i32 = make_qualified_type(module.arena_mut(), i32_ty, false);
    let v = make_variable(module.arena_mut(), None, Some(varying_i32));
    let zero = make_int_literal(module.arena_mut(), IntWidth::W32, 0, i32_ty);

    let sum = construct_prim_op(module.arena_mut(), PrimOp::Add, vec![], vec![zero, v]).unwrap();
    assert_eq!(sum, v);
}

/// Scenario B — folding beta: `let(quote [a, b], λ(x, y). yield [x, y])`
/// reduces to `yield [a, b]` directly, without ever constructing the
/// intermediate lambda's body as a separate node graph.
#[test]
fn scenario_b_folding_beta() {
    let mut module = folding_module();
    let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
    let a = make_int_literal(module.arena_mut(), IntWidth::W32, 10, i32_ty);
    let b = make_int_literal(module.arena_mut(), IntWidth::W32, 20, i32_ty);

    let quote = construct_prim_op(module.arena_mut(), PrimOp::Quote, vec![], vec![a, b]).unwrap();
    let x = make_variable(module.arena_mut(), None, Some(i32_ty));
    let y = make_variable(module.arena_mut(), None, Some(i32_ty));
    let tail = make_yield(module.arena_mut(), vec![x, y]);

    let folded = construct_let(module.arena_mut(), quote, vec![x, y], tail, false).unwrap();
    match &module.arena().node(folded).payload {
        Payload::Yield { args } => assert_eq!(args, &vec![a, b]),
        other => panic!("expected Yield [a, b], got {other:?}"),
    }
}

/// Scenario C — control elimination: `control(λ(jp). join(jp, [k]))`
/// folded under `let(control(...), λ(y). yield [y])` reduces straight to
/// `yield [k]`, with neither the `Control` nor the intermediate `Join`
/// surviving.
#[test]
fn scenario_c_control_elimination() {
    let mut module = folding_module();
    let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
    let k = make_int_literal(module.arena_mut(), IntWidth::W32, 7, i32_ty);

    let jp_ty = make_join_point_type(module.arena_mut(), vec![i32_ty]);
    let jp = make_variable(module.arena_mut(), None, Some(jp_ty));
    let case = module.make_case(vec![jp]);
    let join = make_join(module.arena_mut(), jp, vec![k]);
    module.set_case_body(case, join);

    let control = construct_control(module.arena_mut(), case);
    // Eliminated eagerly: a Control whose only body is a join back to its
    // own join-point folds to a Block before it ever becomes a Let's
    // instruction.
    assert!(!matches!(module.arena().node(control).payload, Payload::Control { .. }));

    let y = make_variable(module.arena_mut(), None, Some(i32_ty));
    let tail = make_yield(module.arena_mut(), vec![y]);
    let folded = construct_let(module.arena_mut(), control, vec![y], tail, false).unwrap();

    match &module.arena().node(folded).payload {
        Payload::Yield { args } => assert_eq!(args, &vec![k]),
        other => panic!("expected Yield [k], got {other:?}"),
    }
}

/// Scenario D — hash-consing: structural nodes with identical payloads
/// collapse to one allocation, but nominal nodes never do even when every
/// field matches.
#[test]
fn scenario_d_hash_consing() {
    let mut module = folding_module();
    let a = make_int_type(module.arena_mut(), IntWidth::W32, true);
    let b = make_int_type(module.arena_mut(), IntWidth::W32, true);
    assert_eq!(a, b, "two int32 types must be pointer-equal");

    let f1 = module.declare_function("identity", vec![], vec![a], vec![a]);
    let f2 = module.declare_function("identity", vec![], vec![a], vec![a]);
    assert_ne!(f1, f2, "two Function declarations never collapse, even with identical signatures");
}

/// Scenario E — free variables: `f(p) = let x = add(p, 1) in g(y, x)`
/// where `y` is bound outside `f` reports exactly `[y]`.
#[test]
fn scenario_e_free_variables() {
    let mut module = folding_module();
    let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
    let one = make_int_literal(module.arena_mut(), IntWidth::W32, 1, i32_ty);
    let y = make_variable(module.arena_mut(), None, Some(i32_ty));

    let g = module.declare_function("g", vec![], vec![i32_ty, i32_ty], vec![i32_ty]);
    let g_addr = make_fn_addr(module.arena_mut(), g);

    let f = module.declare_function("f", vec![], vec![i32_ty], vec![i32_ty]);
    let p = match &module.arena().node(f).payload {
        Payload::Function { params, .. } => params[0],
        _ => unreachable!(),
    };

    let mut bb = BodyBuilder::begin();
    let add = lumina_ir::instruction::make_prim_op(module.arena_mut(), PrimOp::Add, vec![], vec![p, one]);
    let xs = bb.bind_instruction(module.arena_mut(), add, &[i32_ty]);
    let x = xs[0];
    let call = lumina_ir::instruction::make_call(module.arena_mut(), g_addr, vec![y, x]);
    let call_vars = bb.bind_instruction(module.arena_mut(), call, &[i32_ty]);
    let ret = make_return(module.arena_mut(), call_vars);
    let body = bb.finish(module.arena_mut(), ret);
    module.set_function_body(f, body);

    let free = lumina_ir::analysis::compute_free_variables(module.arena(), f);
    assert_eq!(free, vec![y]);
}

/// Scenario F — tail-call lowering: an `EntryPoint`-annotated function `F`
/// whose body is a bare `tail_call G(a)` into non-leaf function `G` lowers
/// into an entry-point wrapper, two indirect functions with the expected
/// parameter counts, and a top dispatcher whose `Match` literals cover
/// `0`, `fn_ptrs[F]`, and `fn_ptrs[G]`.
#[test]
fn scenario_f_tail_call_lowering() {
    let mut src = Module::new("src", Arena::new(ArenaConfig::default()));
    let i32_ty = make_int_type(src.arena_mut(), IntWidth::W32, true);

    let g = src.declare_function("g", vec![], vec![i32_ty], vec![]);
    let g_param = match &src.arena().node(g).payload {
        Payload::Function { params, .. } => params[0],
        _ => unreachable!(),
    };
    let self_addr = make_fn_addr(src.arena_mut(), g);
    let g_tail = make_tail_call(src.arena_mut(), self_addr, vec![g_param]);
    src.set_function_body(g, g_tail);

    let entry_flag = src.arena_mut().intern_string("EntryPoint");
    let f = src.declare_function("f", vec![Annotation::Flag(entry_flag)], vec![i32_ty], vec![]);
    let f_param = match &src.arena().node(f).payload {
        Payload::Function { params, .. } => params[0],
        _ => unreachable!(),
    };
    let g_addr = make_fn_addr(src.arena_mut(), g);
    let f_tail = make_tail_call(src.arena_mut(), g_addr, vec![f_param]);
    src.set_function_body(f, f_tail);

    let mut dst = Module::new("dst", Arena::new(ArenaConfig::default()));
    let u32_ty = make_int_type(dst.arena_mut(), IntWidth::W32, false);
    for name in RUNTIME_HELPERS {
        let helper = dst.declare_function(*name, vec![], vec![u32_ty], vec![u32_ty]);
        let ret = make_return(dst.arena_mut(), vec![]);
        dst.set_function_body(helper, ret);
    }
    dst.declare_global_variable("next_fn", vec![], u32_ty, AddressSpace::Private, None);

    lower_tailcalls(TailcallConfig::default(), &src, &mut dst).unwrap();

    // The entry-point wrapper keeps the original name and signature.
    let wrapper = dst.find_declaration("f").expect("entry-point wrapper `f`");
    match &dst.arena().node(wrapper).payload {
        Payload::Function { params, .. } => assert_eq!(params.len(), 1),
        other => panic!("expected Function, got {other:?}"),
    }

    // Both non-leaf functions become zero-parameter indirect functions.
    let f_indirect = dst.find_declaration("f_indirect").expect("f_indirect");
    match &dst.arena().node(f_indirect).payload {
        Payload::Function { params, .. } => assert!(params.is_empty()),
        other => panic!("expected Function, got {other:?}"),
    }
    let g_indirect = dst.find_declaration("g_indirect").expect("g_indirect");
    match &dst.arena().node(g_indirect).payload {
        Payload::Function { params, .. } => assert!(params.is_empty()),
        other => panic!("expected Function, got {other:?}"),
    }

    let dispatcher = dst
        .find_declaration("generated_top_dispatcher")
        .expect("a dispatcher is generated once any non-leaf function exists");
    let loop_case = match &dst.arena().node(dispatcher).payload {
        Payload::Function { body: Some(body), .. } => find_loop_case(dst.arena(), *body),
        other => panic!("expected Function with a body, got {other:?}"),
    };
    let literals = match &dst.arena().node(loop_case).payload {
        Payload::Case { body: Some(body), .. } => find_match_literals(dst.arena(), *body),
        other => panic!("expected Case with a body, got {other:?}"),
    };
    let mut values: Vec<i64> = literals
        .iter()
        .map(|&l| lumina_ir::value::extract_int_literal_value(dst.arena(), l).unwrap())
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2], "match literals are 0, fn_ptrs[f], fn_ptrs[g] in some order");
}

fn find_loop_case(arena: &Arena, mut id: lumina_ir::arena::NodeId) -> lumina_ir::arena::NodeId {
    loop {
        match &arena.node(id).payload {
            Payload::Let { instruction, tail, .. } => {
                if let Payload::Loop { body, .. } = &arena.node(*instruction).payload {
                    return *body;
                }
                id = *tail;
            }
            other => panic!("expected a Let chain containing a Loop, got {other:?}"),
        }
    }
}

fn find_match_literals(arena: &Arena, mut id: lumina_ir::arena::NodeId) -> Vec<lumina_ir::arena::NodeId> {
    loop {
        match &arena.node(id).payload {
            Payload::Let { instruction, tail, .. } => {
                if let Payload::Match { literals, .. } = &arena.node(*instruction).payload {
                    return literals.clone();
                }
                id = *tail;
            }
            other => panic!("expected a Let chain containing a Match, got {other:?}"),
        }
    }
}
