//! Tail-call lowering: rewrites a module built around ordinary recursive
//! calls into one that runs on a GPU thread with no call stack, emulating
//! recursion with a dispatcher loop and an explicit stack in memory
//! (spec.md §8 Scenario F).
//!
//! Grounded in `original_source/src/shady/passes/lower_tailcalls.c`: every
//! non-leaf function becomes a zero-argument "indirect" function reached
//! only through a generated top-level dispatcher, parameters are passed
//! through `push_stack`/`pop_stack` primops instead of the call ABI, a
//! `TailCall` becomes a `push_stack` of the arguments followed by a call
//! to a `builtin_fork` runtime helper that records which function should
//! run next, and the dispatcher is a `Match` over a `next_fn` global
//! inside a `Loop`, gated per-case on which SIMD lanes are still active.
//! `Leaf`-annotated functions (those the source language's analysis proved
//! never recurse) are left with their ordinary signature and call
//! convention, since nothing ever needs to suspend them mid-call.
//!
//! This module does not reuse [`crate::rewriter`]: that rewriter's
//! structural recreation assumes `src` and `dst` are the same arena
//! (nominal nodes pass through unchanged by raw id), which does not hold
//! here — this pass genuinely rewrites one module into another. `process`
//! below is this pass's own cache-checked dispatcher, mirroring
//! `lower_tailcalls.c`'s own `process` function rather than extending the
//! shared rewriter (see `DESIGN.md`).

use std::collections::HashMap;

use crate::arena::{Arena, NodeId, Sym};
use crate::builder::BodyBuilder;
use crate::diagnostics::{CompileError, CompileResult};
use crate::module::Module;
use crate::node::{Annotation, IntWidth, NodeTag, Payload};
use crate::primop::PrimOp;

/// The runtime helper functions a `dst` module must pre-declare before
/// calling [`lower_tailcalls`] — the emulated scheduler this pass targets
/// (`SPEC_FULL.md` §4). Declaring these is the caller's job: this pass
/// only rewrites calls into them, it never synthesizes their bodies.
pub const RUNTIME_HELPERS: &[&str] = &[
    "builtin_fork",
    "builtin_join",
    "builtin_create_control_point",
    "builtin_entry_join_point",
    "builtin_get_active_branch",
    "builtin_init_scheduler",
];

/// Tuning knobs for the generated dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct TailcallConfig {
    /// Whether to emit the top-level dispatcher loop at all. A module with
    /// no non-leaf functions needs none, regardless of this flag.
    pub dynamic_scheduling: bool,
    /// Caps the number of dispatcher-loop iterations with a counted
    /// bail-out, for drivers that require statically bounded loops.
    pub max_top_iterations: Option<u32>,
}

impl Default for TailcallConfig {
    fn default() -> Self {
        Self {
            dynamic_scheduling: true,
            max_top_iterations: None,
        }
    }
}

struct Ctx {
    config: TailcallConfig,
    /// Assigned dispatcher pointer per *source* function id, shared
    /// between a function's own lowering and any `FnAddr` referring to it
    /// from elsewhere in the module.
    fn_ptrs: HashMap<NodeId, u32>,
    next_fn_ptr: u32,
    /// (src, dst) ids of every non-leaf function that got a body, in
    /// processing order — the dispatcher's `Match` cases are built from
    /// this list.
    non_leaf_bodies: Vec<(NodeId, NodeId)>,
    /// Entry points discovered during the main pass, lifted into their
    /// own wrapper function once the dispatcher exists.
    pending_entry_points: Vec<(String, Vec<NodeId>, Vec<NodeId>, u32)>,
    top_dispatcher: Option<NodeId>,
    init_fn: NodeId,
    u32_ty: NodeId,
    /// src NodeId -> dst NodeId, covering both cross-arena structural
    /// recreation memoization and the variable-remapping this pass must
    /// do by hand (no shared arena means no id reuse is ever valid).
    processed: HashMap<NodeId, NodeId>,
}

impl Ctx {
    fn fn_ptr(&mut self, func: NodeId) -> u32 {
        *self.fn_ptrs.entry(func).or_insert_with(|| {
            let ptr = self.next_fn_ptr;
            self.next_fn_ptr += 1;
            ptr
        })
    }
}

/// `lower_tailcalls(config, src, dst)` (spec.md §8 Scenario F): rewrites
/// every declaration in `src` into `dst`, replacing recursive calls with
/// the push/fork/dispatch scheme described above.
pub fn lower_tailcalls(config: TailcallConfig, src: &Module, dst: &mut Module) -> CompileResult<()> {
    for name in RUNTIME_HELPERS {
        if dst.find_declaration(name).is_none() {
            return Err(CompileError::configuration(
                "TC001",
                format!("tail-call lowering requires a pre-declared `{name}` runtime helper"),
            ));
        }
    }
    if dst.find_declaration("next_fn").is_none() {
        return Err(CompileError::configuration(
            "TC002",
            "tail-call lowering requires a pre-declared `next_fn` global variable",
        ));
    }

    let u32_ty = crate::types::make_int_type(dst.arena_mut(), IntWidth::W32, false);

    let init_fn = dst.declare_function("generated_init", Vec::new(), Vec::new(), Vec::new());
    let init_body = crate::instruction::make_return(dst.arena_mut(), Vec::new());
    dst.set_function_body(init_fn, init_body);

    let mut ctx = Ctx {
        config,
        fn_ptrs: HashMap::new(),
        next_fn_ptr: 1,
        non_leaf_bodies: Vec::new(),
        pending_entry_points: Vec::new(),
        top_dispatcher: None,
        init_fn,
        u32_ty,
        processed: HashMap::new(),
    };

    for &decl in src.declarations() {
        process(src, dst, &mut ctx, decl)?;
    }

    if config.dynamic_scheduling && !ctx.non_leaf_bodies.is_empty() {
        let dispatcher = generate_top_dispatcher(dst, &mut ctx)?;
        ctx.top_dispatcher = Some(dispatcher);
    }

    let pending = std::mem::take(&mut ctx.pending_entry_points);
    for (name, param_types, return_types, fn_ptr) in pending {
        lift_entry_point(dst, &mut ctx, &name, param_types, return_types, fn_ptr)?;
    }

    Ok(())
}

/// Cache-checked dispatch over every node tag. Mirrors
/// `lower_tailcalls.c::process`'s role: a single entry point every
/// recursive call goes through, so a node already rewritten is never
/// rewritten twice and cycles (a basic block jumping back to itself) are
/// broken by registering the destination id before descending.
fn process(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    if let Some(&cached) = ctx.processed.get(&id) {
        return Ok(cached);
    }
    match src.arena().node(id).tag {
        NodeTag::Function => process_function(src, dst, ctx, id),
        NodeTag::Constant => process_constant(src, dst, ctx, id),
        NodeTag::GlobalVariable => process_global(src, dst, ctx, id),
        NodeTag::BasicBlock => process_basic_block(src, dst, ctx, id),
        NodeTag::Case => process_case(src, dst, ctx, id),
        NodeTag::Variable => process_variable(dst, ctx, id),
        NodeTag::FnAddr => process_fn_addr(src, dst, ctx, id),
        NodeTag::Call => process_call(src, dst, ctx, id),
        NodeTag::TailCall => process_tail_call(src, dst, ctx, id),
        NodeTag::Join => process_join(src, dst, ctx, id),
        NodeTag::PrimOpInst => process_prim_op(src, dst, ctx, id),
        NodeTag::PtrType => process_ptr_type(src, dst, ctx, id),
        _ => process_generic(src, dst, ctx, id),
    }
}

fn has_flag(arena: &Arena, annotations: &[Annotation], name: &str) -> bool {
    annotations.iter().any(|a| match a {
        Annotation::Flag(sym) => arena.resolve_string(*sym) == name,
        Annotation::Value { name: n, .. } => arena.resolve_string(*n) == name,
    })
}

/// Re-interns a string across arenas. `Sym` handles are arena-local — a
/// `Sym` from `src` is meaningless as an index into `dst`'s string table.
fn resym(src: &Module, dst: &mut Module, sym: Sym) -> Sym {
    dst.arena_mut().intern_string(src.arena().resolve_string(sym))
}

fn process_annotations(
    src: &Module,
    dst: &mut Module,
    ctx: &mut Ctx,
    annotations: &[Annotation],
) -> CompileResult<Vec<Annotation>> {
    annotations
        .iter()
        .map(|a| match a {
            Annotation::Flag(sym) => Ok(Annotation::Flag(resym(src, dst, *sym))),
            Annotation::Value { name, value } => {
                let name = resym(src, dst, *name);
                let value = process(src, dst, ctx, *value)?;
                Ok(Annotation::Value { name, value })
            }
        })
        .collect()
}

fn runtime_helper(dst: &mut Module, name: &str) -> CompileResult<NodeId> {
    let decl = dst.find_declaration(name).ok_or_else(|| {
        CompileError::configuration("TC001", format!("missing required runtime helper declaration `{name}`"))
    })?;
    Ok(crate::value::make_fn_addr(dst.arena_mut(), decl))
}

fn process_function(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (name, annotations, params, return_types, body) = match &src.arena().node(id).payload {
        Payload::Function {
            name,
            annotations,
            params,
            return_types,
            body,
        } => (
            src.arena().resolve_string(*name).to_string(),
            annotations.clone(),
            params.clone(),
            return_types.clone(),
            *body,
        ),
        _ => unreachable!(),
    };

    let is_leaf = has_flag(src.arena(), &annotations, "Leaf");
    let is_entry = has_flag(src.arena(), &annotations, "EntryPoint");

    if !is_leaf && !ctx.config.dynamic_scheduling {
        return Err(CompileError::configuration(
            "TC003",
            format!(
                "function `{name}` is not Leaf, but dynamic_scheduling is disabled: no dispatcher can be generated to run it"
            ),
        ));
    }

    if is_leaf {
        let param_types: Vec<NodeId> = params
            .iter()
            .map(|&p| {
                let ty = src.arena().node(p).ty.expect("leaf function parameter must be typed");
                process(src, dst, ctx, ty)
            })
            .collect::<CompileResult<_>>()?;
        let return_types: Vec<NodeId> = return_types
            .iter()
            .map(|&t| process(src, dst, ctx, t))
            .collect::<CompileResult<_>>()?;
        let new_annotations = process_annotations(src, dst, ctx, &annotations)?;

        let new_func = dst.declare_function(&name, new_annotations, param_types, return_types);
        ctx.processed.insert(id, new_func);

        let new_params = match &dst.arena().node(new_func).payload {
            Payload::Function { params, .. } => params.clone(),
            _ => unreachable!(),
        };
        for (&old_p, &new_p) in params.iter().zip(new_params.iter()) {
            ctx.processed.insert(old_p, new_p);
        }

        if let Some(body) = body {
            let mut new_body = process(src, dst, ctx, body)?;
            if is_entry {
                new_body = wrap_with_init_call(dst, ctx, new_body);
            }
            dst.set_function_body(new_func, new_body);
        }
        return Ok(new_func);
    }

    // Non-leaf: the function can suspend mid-call (it recurses through a
    // `TailCall`), so it is only ever reached through the dispatcher loop.
    // It is renamed, stripped down to zero parameters (each original
    // parameter is popped off the emulated stack instead of passed), and
    // tagged with the pointer value the dispatcher switches on.
    let indirect_name = format!("{name}_indirect");
    let return_types: Vec<NodeId> = return_types
        .iter()
        .map(|&t| process(src, dst, ctx, t))
        .collect::<CompileResult<_>>()?;
    let param_types: Vec<NodeId> = params
        .iter()
        .map(|&p| {
            let ty = src.arena().node(p).ty.expect("non-leaf function parameter must be typed");
            process(src, dst, ctx, ty)
        })
        .collect::<CompileResult<_>>()?;

    let fn_ptr = ctx.fn_ptr(id);
    let mut new_annotations = process_annotations(src, dst, ctx, &annotations)?;
    new_annotations.retain(|a| !matches!(a, Annotation::Flag(s) if dst.arena().resolve_string(*s) == "EntryPoint"));
    let fn_id_value = crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, fn_ptr as i64, ctx.u32_ty);
    let fn_id_name = dst.arena_mut().intern_string("FnId");
    new_annotations.push(Annotation::Value {
        name: fn_id_name,
        value: fn_id_value,
    });

    let new_func = dst.declare_function(&indirect_name, new_annotations, Vec::new(), return_types.clone());
    ctx.processed.insert(id, new_func);

    if let Some(body) = body {
        let mut bb = BodyBuilder::begin();
        for (&old_param, &param_ty) in params.iter().zip(param_types.iter()) {
            let (unqualified, is_uniform) = crate::types::strip_qualifier(dst.arena(), param_ty);
            let pop = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::PopStack, vec![unqualified], Vec::new());
            let popped = bb.bind_instruction(dst.arena_mut(), pop, &[unqualified]);
            let mut value = popped[0];
            if is_uniform {
                let bcast = crate::instruction::make_prim_op(
                    dst.arena_mut(),
                    PrimOp::SubgroupBroadcastFirst,
                    Vec::new(),
                    vec![value],
                );
                let bcasted = bb.bind_instruction(dst.arena_mut(), bcast, &[unqualified]);
                value = bcasted[0];
            }
            ctx.processed.insert(old_param, value);
        }
        let processed_body = process(src, dst, ctx, body)?;
        let new_body = bb.finish(dst.arena_mut(), processed_body);
        dst.set_function_body(new_func, new_body);
        ctx.non_leaf_bodies.push((id, new_func));
    }

    if is_entry {
        ctx.pending_entry_points
            .push((name, param_types, return_types, fn_ptr));
    }

    Ok(new_func)
}

fn wrap_with_init_call(dst: &mut Module, ctx: &Ctx, body: NodeId) -> NodeId {
    let init_callee = crate::value::make_fn_addr(dst.arena_mut(), ctx.init_fn);
    let call = crate::instruction::make_call(dst.arena_mut(), init_callee, Vec::new());
    let mut bb = BodyBuilder::begin();
    bb.bind_instruction_void(call);
    bb.finish(dst.arena_mut(), body)
}

/// Builds a wrapper function under the function's original name and
/// signature: it initializes the scheduler, pushes its arguments onto the
/// emulated stack (in reverse, so the indirect function's sequence of
/// pops reads them back in declaration order), forks into the renamed
/// indirect function, and runs the dispatcher loop to completion.
fn lift_entry_point(
    dst: &mut Module,
    ctx: &mut Ctx,
    original_name: &str,
    param_types: Vec<NodeId>,
    return_types: Vec<NodeId>,
    fn_ptr: u32,
) -> CompileResult<NodeId> {
    let wrapper = dst.declare_function(original_name, Vec::new(), param_types, return_types);
    let params = match &dst.arena().node(wrapper).payload {
        Payload::Function { params, .. } => params.clone(),
        _ => unreachable!(),
    };

    let mut bb = BodyBuilder::begin();

    let init_callee = crate::value::make_fn_addr(dst.arena_mut(), ctx.init_fn);
    bb.bind_instruction_void(crate::instruction::make_call(dst.arena_mut(), init_callee, Vec::new()));

    let init_sched = runtime_helper(dst, "builtin_init_scheduler")?;
    bb.bind_instruction_void(crate::instruction::make_call(dst.arena_mut(), init_sched, Vec::new()));

    for &param in params.iter().rev() {
        let push = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::PushStack, Vec::new(), vec![param]);
        bb.bind_instruction_void(push);
    }

    let fn_ptr_literal = crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, fn_ptr as i64, ctx.u32_ty);
    let fork_callee = runtime_helper(dst, "builtin_fork")?;
    bb.bind_instruction_void(crate::instruction::make_call(dst.arena_mut(), fork_callee, vec![fn_ptr_literal]));

    let dispatcher = ctx
        .top_dispatcher
        .expect("top dispatcher must be generated before any entry point is lifted");
    let dispatcher_callee = crate::value::make_fn_addr(dst.arena_mut(), dispatcher);
    bb.bind_instruction_void(crate::instruction::make_call(dst.arena_mut(), dispatcher_callee, Vec::new()));

    let ret = crate::instruction::make_return(dst.arena_mut(), Vec::new());
    let body = bb.finish(dst.arena_mut(), ret);
    dst.set_function_body(wrapper, body);
    Ok(wrapper)
}

fn process_case(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (params, body) = match &src.arena().node(id).payload {
        Payload::Case { params, body } => (params.clone(), *body),
        _ => unreachable!(),
    };
    let new_params = remap_params(src, dst, ctx, &params)?;
    let new_case = dst.make_case(new_params);
    ctx.processed.insert(id, new_case);
    if let Some(body) = body {
        let new_body = process(src, dst, ctx, body)?;
        dst.set_case_body(new_case, new_body);
    }
    Ok(new_case)
}

fn process_basic_block(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (name, params, body) = match &src.arena().node(id).payload {
        Payload::BasicBlock { name, params, body } => (
            src.arena().resolve_string(*name).to_string(),
            params.clone(),
            *body,
        ),
        _ => unreachable!(),
    };
    let new_params = remap_params(src, dst, ctx, &params)?;
    let new_block = dst.declare_basic_block(&name, new_params);
    // Registered before the body is processed: a basic block may jump
    // back to itself, and `process`'s cache check is what breaks the cycle.
    ctx.processed.insert(id, new_block);
    if let Some(body) = body {
        let new_body = process(src, dst, ctx, body)?;
        dst.set_basic_block_body(new_block, new_body);
    }
    Ok(new_block)
}

fn remap_params(src: &Module, dst: &mut Module, ctx: &mut Ctx, params: &[NodeId]) -> CompileResult<Vec<NodeId>> {
    let mut new_params = Vec::with_capacity(params.len());
    for &p in params {
        let ty = src.arena().node(p).ty;
        let new_ty = match ty {
            Some(t) => Some(process(src, dst, ctx, t)?),
            None => None,
        };
        let new_p = crate::value::make_variable(dst.arena_mut(), None, new_ty);
        ctx.processed.insert(p, new_p);
        new_params.push(new_p);
    }
    Ok(new_params)
}

fn process_variable(dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    // A variable reachable here was not registered by its binder first —
    // this only happens through a cycle the caller has not yet broken.
    // Best-effort: give it a fresh, untyped placeholder; whichever binder
    // eventually runs overwrites this cache entry with the real one.
    let fresh = crate::value::make_variable(dst.arena_mut(), None, None);
    ctx.processed.insert(id, fresh);
    Ok(fresh)
}

fn process_constant(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (name, annotations, type_hint, value) = match &src.arena().node(id).payload {
        Payload::Constant {
            name,
            annotations,
            type_hint,
            value,
        } => (
            src.arena().resolve_string(*name).to_string(),
            annotations.clone(),
            *type_hint,
            *value,
        ),
        _ => unreachable!(),
    };
    let new_annotations = process_annotations(src, dst, ctx, &annotations)?;
    let new_type_hint = match type_hint {
        Some(t) => Some(process(src, dst, ctx, t)?),
        None => None,
    };
    let new_const = dst.declare_constant(&name, new_annotations, new_type_hint, None);
    ctx.processed.insert(id, new_const);
    if let Some(value) = value {
        let new_value = process(src, dst, ctx, value)?;
        if let Payload::Constant { value: slot, .. } = &mut dst.arena_mut().node_mut(new_const).payload {
            *slot = Some(new_value);
        }
    }
    Ok(new_const)
}

fn process_global(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (name, annotations, ty, address_space, init) = match &src.arena().node(id).payload {
        Payload::GlobalVariable {
            name,
            annotations,
            ty,
            address_space,
            init,
        } => (
            src.arena().resolve_string(*name).to_string(),
            annotations.clone(),
            *ty,
            *address_space,
            *init,
        ),
        _ => unreachable!(),
    };
    let new_annotations = process_annotations(src, dst, ctx, &annotations)?;
    let new_ty = process(src, dst, ctx, ty)?;
    let new_global = dst.declare_global_variable(&name, new_annotations, new_ty, address_space, None);
    ctx.processed.insert(id, new_global);
    if let Some(init) = init {
        let new_init = process(src, dst, ctx, init)?;
        if let Payload::GlobalVariable { init: slot, .. } = &mut dst.arena_mut().node_mut(new_global).payload {
            *slot = Some(new_init);
        }
    }
    Ok(new_global)
}

fn process_fn_addr(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let func = match &src.arena().node(id).payload {
        Payload::FnAddr { func } => *func,
        _ => unreachable!(),
    };
    lower_fn_addr_value(src, dst, ctx, func)
}

/// A first-class function pointer lowers to a plain `u32`: zero for a
/// `Leaf` function (nothing ever dispatches to it indirectly, so the
/// sentinel is never matched in the dispatcher's `Match`), or its
/// assigned dispatcher pointer otherwise.
fn lower_fn_addr_value(src: &Module, dst: &mut Module, ctx: &mut Ctx, func: NodeId) -> CompileResult<NodeId> {
    let annotations = match &src.arena().node(func).payload {
        Payload::Function { annotations, .. } => annotations.clone(),
        _ => unreachable!(),
    };
    let value = if has_flag(src.arena(), &annotations, "Leaf") {
        0
    } else {
        ctx.fn_ptr(func) as i64
    };
    Ok(crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, value, ctx.u32_ty))
}

fn process_call(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (callee, args) = match &src.arena().node(id).payload {
        Payload::Call { callee, args } => (*callee, args.clone()),
        _ => unreachable!(),
    };
    let new_args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;
    // Ordinary (non-tail) calls in this model only ever target `Leaf`
    // functions — a non-leaf callee would need to suspend the caller,
    // which only a `TailCall` can express. Keep the callee as a genuine
    // `FnAddr` to the processed function rather than routing it through
    // `lower_fn_addr_value`'s int-lowering, which is for values that end
    // up stored or compared, not invoked directly.
    let new_callee = match &src.arena().node(callee).payload {
        Payload::FnAddr { func } => {
            let new_func = process(src, dst, ctx, *func)?;
            crate::value::make_fn_addr(dst.arena_mut(), new_func)
        }
        _ => process(src, dst, ctx, callee)?,
    };
    Ok(crate::instruction::make_call(dst.arena_mut(), new_callee, new_args))
}

fn process_tail_call(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (target, args) = match &src.arena().node(id).payload {
        Payload::TailCall { target, args } => (*target, args.clone()),
        _ => unreachable!(),
    };
    let new_target = process(src, dst, ctx, target)?;
    let new_args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;

    let mut bb = BodyBuilder::begin();
    for arg in new_args.into_iter().rev() {
        let push = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::PushStack, Vec::new(), vec![arg]);
        bb.bind_instruction_void(push);
    }
    let fork_callee = runtime_helper(dst, "builtin_fork")?;
    let fork_call = crate::instruction::make_call(dst.arena_mut(), fork_callee, vec![new_target]);
    bb.bind_instruction_void(fork_call);
    let ret = crate::instruction::make_return(dst.arena_mut(), Vec::new());
    Ok(bb.finish(dst.arena_mut(), ret))
}

fn process_join(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (join_point, args) = match &src.arena().node(id).payload {
        Payload::Join { join_point, args } => (*join_point, args.clone()),
        _ => unreachable!(),
    };
    let new_join_point = process(src, dst, ctx, join_point)?;
    let new_args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;

    let mut bb = BodyBuilder::begin();
    for arg in new_args.into_iter().rev() {
        let push = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::PushStack, Vec::new(), vec![arg]);
        bb.bind_instruction_void(push);
    }
    // A join point value is an opaque (destination, tree node) pair; it
    // is produced as a 2-element composite by `create_joinpoint`, so it
    // is taken apart the same way any other composite value is, indexed
    // by position.
    let idx0 = crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, 0, ctx.u32_ty);
    let extract_dst = crate::instruction::make_prim_op(
        dst.arena_mut(),
        PrimOp::Extract,
        vec![ctx.u32_ty],
        vec![new_join_point, idx0],
    );
    let dst_vars = bb.bind_instruction(dst.arena_mut(), extract_dst, &[ctx.u32_ty]);
    let idx1 = crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, 1, ctx.u32_ty);
    let extract_tree = crate::instruction::make_prim_op(
        dst.arena_mut(),
        PrimOp::Extract,
        vec![ctx.u32_ty],
        vec![new_join_point, idx1],
    );
    let tree_vars = bb.bind_instruction(dst.arena_mut(), extract_tree, &[ctx.u32_ty]);

    let join_callee = runtime_helper(dst, "builtin_join")?;
    let join_call = crate::instruction::make_call(dst.arena_mut(), join_callee, vec![dst_vars[0], tree_vars[0]]);
    bb.bind_instruction_void(join_call);
    let ret = crate::instruction::make_return(dst.arena_mut(), Vec::new());
    Ok(bb.finish(dst.arena_mut(), ret))
}

fn process_prim_op(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (op, type_args, operands) = match &src.arena().node(id).payload {
        Payload::PrimOpInst { op, type_args, operands } => (*op, type_args.clone(), operands.clone()),
        _ => unreachable!(),
    };
    let new_type_args: Vec<NodeId> = type_args.iter().map(|&t| process(src, dst, ctx, t)).collect::<CompileResult<_>>()?;
    let new_operands: Vec<NodeId> = operands.iter().map(|&o| process(src, dst, ctx, o)).collect::<CompileResult<_>>()?;
    match op {
        PrimOp::CreateJoinPoint => {
            let callee = runtime_helper(dst, "builtin_create_control_point")?;
            Ok(crate::instruction::make_call(dst.arena_mut(), callee, new_operands))
        }
        PrimOp::DefaultJoinPoint => {
            let callee = runtime_helper(dst, "builtin_entry_join_point")?;
            Ok(crate::instruction::make_call(dst.arena_mut(), callee, new_operands))
        }
        _ => Ok(crate::fold::construct_prim_op(dst.arena_mut(), op, new_type_args, new_operands)),
    }
}

/// A pointer to a function lowers to a plain dispatcher index, so a
/// pointer *to a function type* is really just a `u32`.
fn process_ptr_type(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let (pointee, address_space) = match &src.arena().node(id).payload {
        Payload::PtrType { pointee, address_space } => (*pointee, *address_space),
        _ => unreachable!(),
    };
    if matches!(src.arena().node(pointee).payload, Payload::FnType { .. }) {
        return Ok(ctx.u32_ty);
    }
    let new_pointee = process(src, dst, ctx, pointee)?;
    Ok(crate::types::make_ptr_type(dst.arena_mut(), new_pointee, address_space))
}

/// Structural recreation for every tag not given its own handler above —
/// plain types, literals, composite values, and the structured-control /
/// let-chain instructions, each rebuilt field-by-field through `process`.
fn process_generic(src: &Module, dst: &mut Module, ctx: &mut Ctx, id: NodeId) -> CompileResult<NodeId> {
    let payload = src.arena().node(id).payload.clone();
    let ty = src.arena().node(id).ty;
    let result = match payload {
        Payload::IntType { width, signed } => crate::types::make_int_type(dst.arena_mut(), width, signed),
        Payload::FloatType { width } => crate::types::make_float_type(dst.arena_mut(), width),
        Payload::BoolType => crate::types::make_bool_type(dst.arena_mut()),
        Payload::MaskType => crate::types::make_mask_type(dst.arena_mut()),
        Payload::ArrayType { element, length } => {
            let element = process(src, dst, ctx, element)?;
            let length = match length {
                Some(l) => Some(process(src, dst, ctx, l)?),
                None => None,
            };
            crate::types::make_array_type(dst.arena_mut(), element, length)
        }
        Payload::PackType { element, width } => {
            let element = process(src, dst, ctx, element)?;
            crate::types::make_pack_type(dst.arena_mut(), element, width)
        }
        Payload::RecordType {
            members,
            names,
            decorated,
        } => {
            let members: Vec<NodeId> = members.iter().map(|&m| process(src, dst, ctx, m)).collect::<CompileResult<_>>()?;
            let names = names.as_ref().map(|ns| ns.iter().map(|&n| resym(src, dst, n)).collect());
            crate::types::make_record_type(dst.arena_mut(), members, names, decorated)
        }
        Payload::FnType {
            is_basic_block,
            param_types,
            return_types,
        } => {
            let param_types: Vec<NodeId> = param_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            let return_types: Vec<NodeId> = return_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            crate::types::make_fn_type(dst.arena_mut(), is_basic_block, param_types, return_types)
        }
        Payload::QualifiedType { inner, is_uniform } => {
            let inner = process(src, dst, ctx, inner)?;
            crate::types::make_qualified_type(dst.arena_mut(), inner, is_uniform)
        }
        Payload::JoinPointType { param_types } => {
            let param_types: Vec<NodeId> = param_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            crate::types::make_join_point_type(dst.arena_mut(), param_types)
        }
        Payload::DeclRefType { decl } => {
            let decl = process(src, dst, ctx, decl)?;
            crate::types::make_decl_ref_type(dst.arena_mut(), decl)
        }
        Payload::IntLiteral { width, value } => {
            let ty = match ty {
                Some(t) => process(src, dst, ctx, t)?,
                None => ctx.u32_ty,
            };
            crate::value::make_int_literal(dst.arena_mut(), width, value, ty)
        }
        Payload::FloatLiteral { width, bits } => {
            let ty = match ty {
                Some(t) => process(src, dst, ctx, t)?,
                None => ctx.u32_ty,
            };
            crate::value::make_float_literal(dst.arena_mut(), width, bits, ty)
        }
        Payload::BoolLiteral(value) => {
            let ty = match ty {
                Some(t) => process(src, dst, ctx, t)?,
                None => crate::types::make_bool_type(dst.arena_mut()),
            };
            crate::value::make_bool_literal(dst.arena_mut(), value, ty)
        }
        Payload::StringLiteral(text) => {
            let sym = resym(src, dst, text);
            crate::value::make_string_literal(dst.arena_mut(), sym)
        }
        Payload::NullPtr { ty: pty } => {
            let pty = process(src, dst, ctx, pty)?;
            crate::value::make_null_ptr(dst.arena_mut(), pty)
        }
        Payload::Undef { ty: pty } => {
            let pty = process(src, dst, ctx, pty)?;
            crate::value::make_undef(dst.arena_mut(), pty)
        }
        Payload::Composite { ty: cty, elements } => {
            let cty = process(src, dst, ctx, cty)?;
            let elements: Vec<NodeId> = elements.iter().map(|&e| process(src, dst, ctx, e)).collect::<CompileResult<_>>()?;
            crate::value::make_composite(dst.arena_mut(), cty, elements)
        }
        Payload::Tuple { elements } => {
            let elements: Vec<NodeId> = elements.iter().map(|&e| process(src, dst, ctx, e)).collect::<CompileResult<_>>()?;
            let new_ty = match ty {
                Some(t) => Some(process(src, dst, ctx, t)?),
                None => None,
            };
            crate::value::make_tuple(dst.arena_mut(), elements, new_ty)
        }
        Payload::DeclRef { decl } => {
            let decl = process(src, dst, ctx, decl)?;
            crate::value::make_decl_ref(dst.arena_mut(), decl)
        }
        Payload::Control { inside } => {
            let inside = process(src, dst, ctx, inside)?;
            crate::fold::construct_control(dst.arena_mut(), inside)
        }
        Payload::Block { yield_types, inside } => {
            let yield_types: Vec<NodeId> = yield_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            let inside = process(src, dst, ctx, inside)?;
            crate::instruction::make_block(dst.arena_mut(), yield_types, inside)
        }
        Payload::If {
            condition,
            yield_types,
            if_true,
            if_false,
        } => {
            let condition = process(src, dst, ctx, condition)?;
            let yield_types: Vec<NodeId> = yield_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            let if_true = process(src, dst, ctx, if_true)?;
            let if_false = match if_false {
                Some(f) => Some(process(src, dst, ctx, f)?),
                None => None,
            };
            crate::instruction::make_if(dst.arena_mut(), condition, yield_types, if_true, if_false)
        }
        Payload::Match {
            inspect,
            yield_types,
            literals,
            cases,
            default_case,
        } => {
            let inspect = process(src, dst, ctx, inspect)?;
            let yield_types: Vec<NodeId> = yield_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            let literals: Vec<NodeId> = literals.iter().map(|&l| process(src, dst, ctx, l)).collect::<CompileResult<_>>()?;
            let cases: Vec<NodeId> = cases.iter().map(|&c| process(src, dst, ctx, c)).collect::<CompileResult<_>>()?;
            let default_case = process(src, dst, ctx, default_case)?;
            crate::instruction::make_match(dst.arena_mut(), inspect, yield_types, literals, cases, default_case)
        }
        Payload::Loop {
            yield_types,
            initial_args,
            body,
        } => {
            let yield_types: Vec<NodeId> = yield_types
                .iter()
                .map(|&t| process(src, dst, ctx, t))
                .collect::<CompileResult<_>>()?;
            let initial_args: Vec<NodeId> = initial_args
                .iter()
                .map(|&a| process(src, dst, ctx, a))
                .collect::<CompileResult<_>>()?;
            let body = process(src, dst, ctx, body)?;
            crate::instruction::make_loop(dst.arena_mut(), yield_types, initial_args, body)
        }
        Payload::Yield { args } => {
            let args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;
            crate::instruction::make_yield(dst.arena_mut(), args)
        }
        Payload::Let {
            instruction,
            variables,
            tail,
            is_mutable,
        } => {
            let new_instruction = process(src, dst, ctx, instruction)?;
            let new_vars = remap_params(src, dst, ctx, &variables)?;
            let new_tail = process(src, dst, ctx, tail)?;
            crate::instruction::make_let(dst.arena_mut(), new_instruction, new_vars, new_tail, is_mutable)
        }
        Payload::Return { args } => {
            let args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;
            crate::instruction::make_return(dst.arena_mut(), args)
        }
        Payload::MergeBreak { args } => {
            let args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;
            crate::instruction::make_merge_break(dst.arena_mut(), args)
        }
        Payload::MergeContinue { args } => {
            let args: Vec<NodeId> = args.iter().map(|&a| process(src, dst, ctx, a)).collect::<CompileResult<_>>()?;
            crate::instruction::make_merge_continue(dst.arena_mut(), args)
        }
        Payload::Unreachable => crate::instruction::make_unreachable(dst.arena_mut()),
        _ => unreachable!("tag handled directly by process() before reaching process_generic"),
    };
    Ok(result)
}

/// Builds the `generated_top_dispatcher` function: `loop { match *next_fn
/// { 0 => break; <fn_ptr> => if should_run { call indirect } continue; ...
/// default => unreachable } }`, gated per case on whether this thread's
/// lane is among the active branch mask (`SPEC_FULL.md` §4, grounded in
/// `lower_tailcalls.c`'s generated `top_function`).
fn generate_top_dispatcher(dst: &mut Module, ctx: &mut Ctx) -> CompileResult<NodeId> {
    let u32_ty = ctx.u32_ty;
    let bool_ty = crate::types::make_bool_type(dst.arena_mut());

    let iter_param = ctx
        .config
        .max_top_iterations
        .map(|_| crate::value::make_variable(dst.arena_mut(), None, Some(u32_ty)));
    let loop_params: Vec<NodeId> = iter_param.into_iter().collect();
    let loop_case = dst.make_case(loop_params.clone());

    let next_fn_global = dst.find_declaration("next_fn").ok_or_else(|| {
        CompileError::configuration("TC002", "missing required `next_fn` global variable declaration")
    })?;
    let next_fn_ref = crate::value::make_decl_ref(dst.arena_mut(), next_fn_global);
    let load = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::Load, vec![u32_ty], vec![next_fn_ref]);

    let mut bb = BodyBuilder::begin();
    let next_fn_val = bb.bind_instruction(dst.arena_mut(), load, &[u32_ty])[0];

    let active_branch_callee = runtime_helper(dst, "builtin_get_active_branch")?;
    let active_call = crate::instruction::make_call(dst.arena_mut(), active_branch_callee, vec![next_fn_val]);
    let active_branch = bb.bind_instruction(dst.arena_mut(), active_call, &[u32_ty])[0];

    let local_id = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::SubgroupLocalId, Vec::new(), Vec::new());
    let local_id_val = bb.bind_instruction(dst.arena_mut(), local_id, &[u32_ty])[0];

    let active_check = crate::instruction::make_prim_op(
        dst.arena_mut(),
        PrimOp::MaskIsThreadActive,
        Vec::new(),
        vec![active_branch, local_id_val],
    );
    let should_run = bb.bind_instruction(dst.arena_mut(), active_check, &[bool_ty])[0];

    // Every path that stays in the loop re-enters `loop_case` with the
    // incremented counter (when one is configured) so the bail-out check
    // above actually advances; a path that exits the loop entirely
    // (`MergeBreak`) always carries zero args, matching the loop's empty
    // `yield_types`.
    let continue_args: Vec<NodeId> = match loop_params.first().copied() {
        Some(iter) => {
            let one = crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, 1, u32_ty);
            let inc = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::Add, Vec::new(), vec![iter, one]);
            vec![bb.bind_instruction(dst.arena_mut(), inc, &[u32_ty])[0]]
        }
        None => Vec::new(),
    };

    if let (Some(max), Some(iter)) = (ctx.config.max_top_iterations, loop_params.first().copied()) {
        let limit = crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, max as i64, u32_ty);
        let cmp = crate::instruction::make_prim_op(dst.arena_mut(), PrimOp::GreaterEqual, Vec::new(), vec![iter, limit]);
        let cmp_val = bb.bind_instruction(dst.arena_mut(), cmp, &[bool_ty])[0];

        let break_case = dst.make_case(Vec::new());
        let break_body = crate::instruction::make_merge_break(dst.arena_mut(), Vec::new());
        dst.set_case_body(break_case, break_body);

        let cont_case = dst.make_case(Vec::new());
        let cont_body = crate::instruction::make_yield(dst.arena_mut(), Vec::new());
        dst.set_case_body(cont_case, cont_body);

        let bail_if = crate::instruction::make_if(dst.arena_mut(), cmp_val, Vec::new(), break_case, Some(cont_case));
        bb.bind_instruction_void(bail_if);
    }

    let mut literals = vec![crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, 0, u32_ty)];
    let zero_case = dst.make_case(Vec::new());
    let zero_body = wrap_in_should_run_exit(dst, should_run, continue_args.clone());
    dst.set_case_body(zero_case, zero_body);
    let mut cases = vec![zero_case];

    for &(_src_func, dst_func) in &ctx.non_leaf_bodies.clone() {
        let fn_ptr = *ctx
            .fn_ptrs
            .get(&_src_func)
            .expect("non-leaf function must have been assigned a dispatcher pointer");
        literals.push(crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, fn_ptr as i64, u32_ty));

        let call_callee = crate::value::make_fn_addr(dst.arena_mut(), dst_func);
        let call = crate::instruction::make_call(dst.arena_mut(), call_callee, Vec::new());
        let mut case_bb = BodyBuilder::begin();
        case_bb.bind_instruction_void(call);
        let case_body = wrap_in_should_run(dst, should_run, case_bb, continue_args.clone());
        let case = dst.make_case(Vec::new());
        dst.set_case_body(case, case_body);
        cases.push(case);
    }

    let default_case = dst.make_case(Vec::new());
    let default_body = crate::instruction::make_unreachable(dst.arena_mut());
    dst.set_case_body(default_case, default_body);

    let match_node = crate::instruction::make_match(
        dst.arena_mut(),
        next_fn_val,
        Vec::new(),
        literals,
        cases,
        default_case,
    );
    bb.bind_instruction_void(match_node);
    let loop_yield = crate::instruction::make_yield(dst.arena_mut(), Vec::new());
    let loop_body_chain = bb.finish(dst.arena_mut(), loop_yield);
    dst.set_case_body(loop_case, loop_body_chain);

    let initial_args: Vec<NodeId> = loop_params
        .iter()
        .map(|_| crate::value::make_int_literal(dst.arena_mut(), IntWidth::W32, 0, u32_ty))
        .collect();
    let loop_node = crate::instruction::make_loop(dst.arena_mut(), Vec::new(), initial_args, loop_case);

    let mut top_bb = BodyBuilder::begin();
    top_bb.bind_instruction_void(loop_node);
    let ret = crate::instruction::make_return(dst.arena_mut(), Vec::new());
    let top_body = top_bb.finish(dst.arena_mut(), ret);

    let dispatcher = dst.declare_function("generated_top_dispatcher", Vec::new(), Vec::new(), Vec::new());
    dst.set_function_body(dispatcher, top_body);
    Ok(dispatcher)
}

/// `if should_run { <case body>; yield } else { yield }; merge_continue
/// continue_args` — a dispatcher case only actually invokes the function
/// it matched on for the SIMD lanes that are still active; the rest fall
/// through to the next loop iteration alongside it, carrying the
/// (possibly incremented) loop-carried state forward either way.
fn wrap_in_should_run(dst: &mut Module, should_run: NodeId, mut inner: BodyBuilder, continue_args: Vec<NodeId>) -> NodeId {
    let then_case = dst.make_case(Vec::new());
    let then_yield = crate::instruction::make_yield(dst.arena_mut(), Vec::new());
    let then_body = inner.finish(dst.arena_mut(), then_yield);
    dst.set_case_body(then_case, then_body);

    let else_case = dst.make_case(Vec::new());
    let else_body = crate::instruction::make_yield(dst.arena_mut(), Vec::new());
    dst.set_case_body(else_case, else_body);

    let if_node = crate::instruction::make_if(dst.arena_mut(), should_run, Vec::new(), then_case, Some(else_case));
    let mut outer = BodyBuilder::begin();
    outer.bind_instruction_void(if_node);
    let cont = crate::instruction::make_merge_continue(dst.arena_mut(), continue_args);
    outer.finish(dst.arena_mut(), cont)
}

/// `if should_run { merge_break } else { merge_continue continue_args }` —
/// the `next_fn == 0` dispatcher case: a lane only actually exits the loop
/// once its own kill request is the one the whole subgroup converged on
/// this round: `0 => if should_run, merge-break (this thread exits)`
/// (`SPEC_FULL.md` §4); any lane not yet running its chosen branch stays
/// in the loop like every other case.
fn wrap_in_should_run_exit(dst: &mut Module, should_run: NodeId, continue_args: Vec<NodeId>) -> NodeId {
    let then_case = dst.make_case(Vec::new());
    let then_body = crate::instruction::make_merge_break(dst.arena_mut(), Vec::new());
    dst.set_case_body(then_case, then_body);

    let else_case = dst.make_case(Vec::new());
    let else_body = crate::instruction::make_merge_continue(dst.arena_mut(), continue_args);
    dst.set_case_body(else_case, else_body);

    let if_node = crate::instruction::make_if(dst.arena_mut(), should_run, Vec::new(), then_case, Some(else_case));
    let mut outer = BodyBuilder::begin();
    outer.bind_instruction_void(if_node);
    // Both arms exit the loop's structured body (break or continue); the
    // tail below the if is provably dead, but a terminator is still
    // required to close the let-chain.
    let unreachable = crate::instruction::make_unreachable(dst.arena_mut());
    outer.finish(dst.arena_mut(), unreachable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::node::AddressSpace;

    fn declare_runtime_helpers(dst: &mut Module) {
        let u32_ty = crate::types::make_int_type(dst.arena_mut(), IntWidth::W32, false);
        for name in RUNTIME_HELPERS {
            let f = dst.declare_function(*name, Vec::new(), vec![u32_ty], vec![u32_ty]);
            let ret = crate::instruction::make_return(dst.arena_mut(), Vec::new());
            dst.set_function_body(f, ret);
        }
        dst.declare_global_variable("next_fn", Vec::new(), u32_ty, AddressSpace::Private, None);
    }

    #[test]
    fn lowering_without_any_non_leaf_function_needs_no_dispatcher() {
        let mut src = Module::new("src", Arena::new(ArenaConfig::default()));
        let i32_ty = crate::types::make_int_type(src.arena_mut(), IntWidth::W32, true);
        let func = src.declare_function(
            "main",
            vec![Annotation::Flag(src.arena_mut().intern_string("Leaf"))],
            Vec::new(),
            vec![i32_ty],
        );
        let lit = crate::value::make_int_literal(src.arena_mut(), IntWidth::W32, 1, i32_ty);
        let ret = crate::instruction::make_return(src.arena_mut(), vec![lit]);
        src.set_function_body(func, ret);

        let mut dst = Module::new("dst", Arena::new(ArenaConfig::default()));
        declare_runtime_helpers(&mut dst);

        lower_tailcalls(TailcallConfig::default(), &src, &mut dst).unwrap();
        assert!(dst.find_declaration("main").is_some());
        assert!(dst.find_declaration("generated_top_dispatcher").is_none());
    }

    #[test]
    fn missing_runtime_helper_is_a_configuration_error() {
        let src = Module::new("src", Arena::new(ArenaConfig::default()));
        let mut dst = Module::new("dst", Arena::new(ArenaConfig::default()));
        let err = lower_tailcalls(TailcallConfig::default(), &src, &mut dst).unwrap_err();
        assert_eq!(err.code(), "TC001");
    }

    #[test]
    fn non_leaf_function_without_dynamic_scheduling_is_a_configuration_error() {
        let mut src = Module::new("src", Arena::new(ArenaConfig::default()));
        let i32_ty = crate::types::make_int_type(src.arena_mut(), IntWidth::W32, true);
        let recurse = src.declare_function("count_down", Vec::new(), vec![i32_ty], Vec::new());
        let param = match &src.arena().node(recurse).payload {
            Payload::Function { params, .. } => params[0],
            _ => unreachable!(),
        };
        let self_addr = crate::value::make_fn_addr(src.arena_mut(), recurse);
        let tail = crate::instruction::make_tail_call(src.arena_mut(), self_addr, vec![param]);
        src.set_function_body(recurse, tail);

        let mut dst = Module::new("dst", Arena::new(ArenaConfig::default()));
        declare_runtime_helpers(&mut dst);

        let config = TailcallConfig {
            dynamic_scheduling: false,
            max_top_iterations: None,
        };
        let err = lower_tailcalls(config, &src, &mut dst).unwrap_err();
        assert_eq!(err.code(), "TC003");
    }

    #[test]
    fn non_leaf_function_is_renamed_and_assigned_a_dispatcher_pointer() {
        let mut src = Module::new("src", Arena::new(ArenaConfig::default()));
        let i32_ty = crate::types::make_int_type(src.arena_mut(), IntWidth::W32, true);
        let recurse = src.declare_function("count_down", Vec::new(), vec![i32_ty], Vec::new());
        let param = match &src.arena().node(recurse).payload {
            Payload::Function { params, .. } => params[0],
            _ => unreachable!(),
        };
        let self_addr = crate::value::make_fn_addr(src.arena_mut(), recurse);
        let tail = crate::instruction::make_tail_call(src.arena_mut(), self_addr, vec![param]);
        src.set_function_body(recurse, tail);

        let mut dst = Module::new("dst", Arena::new(ArenaConfig::default()));
        declare_runtime_helpers(&mut dst);

        lower_tailcalls(TailcallConfig::default(), &src, &mut dst).unwrap();
        assert!(dst.find_declaration("count_down_indirect").is_some());
        assert!(dst.find_declaration("generated_top_dispatcher").is_some());
    }
}
