//! Method body rewriting.
//!
//! [`Rewriter::rewrite`] turns a method into an interceptable one. The original body stays in
//! place and is wrapped by two calls into the dispatch hook:
//!
//! ```text
//! pre:   in = ArgPack(this, args..)
//!        if Hook<In, Out>(head, in, out out):  write back by-ref args; return out.t0
//! body:  original instructions, every `ret` replaced by `br post`
//! post:  [stash return value]
//!        post_in = ArgPack(ret, this, args..)
//!        if Hook<PostIn, Out>(tail, post_in, out out): write back by-ref args; return out.t0
//!        return stash
//! ```
//!
//! # Argument slots
//!
//! Slot 0 is `this` for instance methods, formal parameters follow in order and the return
//! value is the sentinel slot `-1`. [`ArgumentLayout`] lists which slots travel into the pre
//! hook, into the post hook and back out of either hook.
//!
//! # Clean-up
//!
//! After splicing, unconditional branches to the immediately following instruction are
//! removed (everything that pointed at them moves to the successor), short branches pushed
//! out of range are widened until a fixed point is reached, debug records are re-derived
//! from the instructions they were bound to and the maximum stack depth is recomputed.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::{
    assembly::{Emitter, Instruction, InstructionId, OpCode, Operand},
    hotfix::{
        pack::{pack_constructor, pack_field, pack_instance},
        HotfixConfig, PackSynthesizer, TokenHasher,
    },
    metadata::{
        identity::call_site_identity,
        method::{compute_max_stack, MethodBody, MethodDef, ParamAttributes},
        module::{MethodId, Module},
        signatures::{MethodReference, MethodSignature, TypeSignature},
    },
    project::Session,
    Error, Result,
};

/// Slot number of the return value.
pub const RETURN_SLOT: i32 = -1;

/// Classification of a method's arguments into pack slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentLayout {
    /// Slots passed to the pre hook.
    pub in_args: Vec<i32>,
    /// Slots passed to the post hook, return value first.
    pub post_in_args: Vec<i32>,
    /// Slots the hooks may overwrite, return value first.
    pub out_args: Vec<i32>,
    /// Declared type per slot, the return type last.
    pub arg_types: Vec<TypeSignature>,
    /// Pack element type per slot (referent of by-ref slots).
    pub element_types: Vec<TypeSignature>,
    /// The method returns a value.
    pub returns_value: bool,
}

impl ArgumentLayout {
    /// Classifies the arguments of `method`.
    ///
    /// Returns `None` if the method or its declaring type is not part of `module`.
    #[must_use]
    pub fn classify(module: &Module, method: MethodId) -> Option<Self> {
        let def = module.method(method)?;
        let mut layout = ArgumentLayout {
            returns_value: def.returns_value(),
            ..ArgumentLayout::default()
        };
        if layout.returns_value {
            layout.out_args.push(RETURN_SLOT);
            layout.post_in_args.push(RETURN_SLOT);
        }

        if def.has_this() {
            let owner = module.type_def(def.declaring_type)?;
            let this = module.self_signature(def.declaring_type, &module.name)?;
            layout.in_args.push(0);
            layout.post_in_args.push(0);
            if owner.is_value_type() {
                layout.out_args.push(0);
                layout.arg_types.push(TypeSignature::by_ref(this.clone()));
            } else {
                layout.arg_types.push(this.clone());
            }
            layout.element_types.push(this);
        }

        let first = i32::from(def.has_this());
        for (index, param) in def.params.iter().enumerate() {
            let slot = first + i32::try_from(index).ok()?;
            layout.post_in_args.push(slot);
            if param.param_type.is_by_ref() {
                layout.out_args.push(slot);
                if param.flags.contains(ParamAttributes::IN)
                    || !param.flags.contains(ParamAttributes::OUT)
                {
                    layout.in_args.push(slot);
                }
            } else {
                layout.in_args.push(slot);
            }
            layout.arg_types.push(param.param_type.clone());
            layout.element_types.push(param.param_type.element().clone());
        }

        if layout.returns_value {
            layout.arg_types.push(def.return_type.clone());
            layout.element_types.push(def.return_type.clone());
        }
        Some(layout)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn position(&self, slot: i32) -> usize {
        let count = self.element_types.len() as i32;
        ((slot + count) % count) as usize
    }

    /// Pack element type of a slot.
    #[must_use]
    pub fn element(&self, slot: i32) -> &TypeSignature {
        &self.element_types[self.position(slot)]
    }

    /// Pack element types of a slot list.
    #[must_use]
    pub fn elements(&self, slots: &[i32]) -> Vec<TypeSignature> {
        slots.iter().map(|slot| self.element(*slot).clone()).collect()
    }

    fn is_by_ref(&self, slot: i32) -> bool {
        self.arg_types[self.position(slot)].is_by_ref()
    }
}

/// Outcome of rewriting one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    /// Module the method belongs to.
    pub module: String,
    /// The rewritten method.
    pub method: MethodId,
    /// Call-site identity (`"<type id> <signature>"`).
    pub identity: String,
    /// Token passed to the pre hook.
    pub head_token: i64,
    /// Token passed to the post hook.
    pub tail_token: i64,
    /// Arity of the pre-hook pack.
    pub in_arity: usize,
    /// Arity of the post-hook pack.
    pub post_in_arity: usize,
    /// Arity of the output pack.
    pub out_arity: usize,
    /// Branches to the next instruction that were removed.
    pub elided_branches: usize,
    /// Short branches widened to their long form.
    pub widened_branches: usize,
}

/// Everything the splice needs besides the body itself.
struct CallPlan {
    in_pack: TypeSignature,
    post_pack: TypeSignature,
    out_pack: TypeSignature,
    pre_hook: MethodReference,
    post_hook: MethodReference,
    head: i64,
    tail: i64,
}

#[derive(Debug, Default, Clone, Copy)]
struct BodyEdit {
    elided: usize,
    widened: usize,
}

/// Rewrites methods, synthesizing argument packs and assigning call-site tokens on the way.
#[derive(Debug)]
pub struct Rewriter {
    config: HotfixConfig,
    packs: PackSynthesizer,
    tokens: TokenHasher,
    rewritten: HashSet<(String, MethodId)>,
}

impl Rewriter {
    /// Creates a rewriter with an empty token table.
    #[must_use]
    pub fn new(config: HotfixConfig) -> Self {
        Self::with_tokens(config, TokenHasher::new())
    }

    /// Creates a rewriter that assigns tokens through `tokens`.
    #[must_use]
    pub fn with_tokens(config: HotfixConfig, tokens: TokenHasher) -> Self {
        Rewriter {
            config,
            packs: PackSynthesizer::new(),
            tokens,
            rewritten: HashSet::new(),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &HotfixConfig {
        &self.config
    }

    /// The token table, including every collision resolved so far.
    #[must_use]
    pub fn tokens(&self) -> &TokenHasher {
        &self.tokens
    }

    /// Releases the token table, e.g. to persist it.
    #[must_use]
    pub fn into_tokens(self) -> TokenHasher {
        self.tokens
    }

    /// Rewrites `method` of `module`.
    ///
    /// The runtime assembly is loaded into the session if needed and receives the argument
    /// packs; the target module gains a reference to it and is marked dirty.
    ///
    /// # Errors
    /// - [`Error::ModuleNotLoaded`] if `module` is not held by the session
    /// - [`Error::NoBody`] if the method has no body
    /// - [`Error::Malformed`] if the body references instructions outside itself, or the
    ///   method was already rewritten by this rewriter
    /// - [`Error::MissingRuntimeMember`] if the runtime assembly lacks the dispatch hook
    pub fn rewrite(
        &mut self,
        session: &mut Session,
        module: &str,
        method: MethodId,
    ) -> Result<Injection> {
        let target = session
            .get(module)
            .ok_or_else(|| Error::ModuleNotLoaded(module.to_string()))?;
        let module_name = target.name.clone();
        let def = target.method(method).ok_or_else(|| {
            malformed_error!("Method {} is not defined in {}", method.index(), module_name)
        })?;
        def.body().ok_or(Error::NoBody(def.token))?.validate()?;
        let layout = ArgumentLayout::classify(target, method).ok_or_else(|| {
            malformed_error!("Declaring type of method {} is missing", method.index())
        })?;
        let identity = call_site_identity(target, method).ok_or_else(|| {
            malformed_error!("Method {} has no call-site identity", method.index())
        })?;

        let key = (module_name.clone(), method);
        if self.rewritten.contains(&key) {
            return Err(malformed_error!("{} was already rewritten", identity));
        }

        let runtime = session.load(&self.config.runtime_assembly)?;
        let runtime_name = runtime.name.clone();
        let in_pack = pack_instance(
            runtime,
            &self.config,
            &module_name,
            layout.elements(&layout.in_args),
        );
        let post_pack = pack_instance(
            runtime,
            &self.config,
            &module_name,
            layout.elements(&layout.post_in_args),
        );
        let out_pack = pack_instance(
            runtime,
            &self.config,
            &module_name,
            layout.elements(&layout.out_args),
        );
        let pre_hook = hook_reference(
            runtime,
            &self.config,
            &module_name,
            in_pack.clone(),
            out_pack.clone(),
        )?;
        let post_hook = hook_reference(
            runtime,
            &self.config,
            &module_name,
            post_pack.clone(),
            out_pack.clone(),
        )?;
        for slots in [&layout.in_args, &layout.post_in_args, &layout.out_args] {
            self.packs.ensure(runtime, &self.config, slots.len())?;
        }

        let plan = CallPlan {
            in_pack,
            post_pack,
            out_pack,
            pre_hook,
            post_hook,
            head: self.tokens.token(Some(&format!("{} head", identity))),
            tail: self.tokens.token(Some(&format!("{} tail", identity))),
        };

        let target = session
            .get_mut(&module_name)
            .ok_or_else(|| Error::ModuleNotLoaded(module_name.clone()))?;
        let def = target.method_mut(method).ok_or_else(|| {
            malformed_error!("Method {} is not defined in {}", method.index(), module_name)
        })?;
        let edit = splice(def, &layout, &plan)?;
        target.add_assembly_ref(&runtime_name);
        target.mark_dirty();
        self.rewritten.insert(key);

        info!(module = %module_name, method = %identity, head = plan.head, "method injected");
        Ok(Injection {
            module: module_name,
            method,
            identity,
            head_token: plan.head,
            tail_token: plan.tail,
            in_arity: layout.in_args.len(),
            post_in_arity: layout.post_in_args.len(),
            out_arity: layout.out_args.len(),
            elided_branches: edit.elided,
            widened_branches: edit.widened,
        })
    }
}

/// The dispatch hook instantiated for one pair of packs.
fn hook_reference(
    runtime: &Module,
    config: &HotfixConfig,
    from: &str,
    in_pack: TypeSignature,
    out_pack: TypeSignature,
) -> Result<MethodReference> {
    let hook_type = runtime
        .find_type(&config.hook_type)
        .ok_or_else(|| Error::MissingRuntimeMember(config.hook_type.clone()))?;
    if runtime
        .find_method_with_param_count(hook_type, &config.hook_method, 3)
        .is_none()
    {
        return Err(Error::MissingRuntimeMember(format!(
            "{}::{}",
            config.hook_type, config.hook_method
        )));
    }

    Ok(MethodReference {
        declaring: TypeSignature::Class(runtime.type_ref_from(from, &config.hook_type)),
        name: config.hook_method.clone(),
        signature: MethodSignature::new(
            false,
            TypeSignature::Boolean,
            vec![
                TypeSignature::I8,
                TypeSignature::GenericParamMethod(0),
                TypeSignature::by_ref(TypeSignature::GenericParamMethod(1)),
            ],
        ),
        generic_args: vec![in_pack, out_pack],
    })
}

fn slot_index(slot: i32) -> Result<u16> {
    u16::try_from(slot).map_err(|_| malformed_error!("Argument slot {} is out of range", slot))
}

fn load_slots(
    emit: &mut Emitter<'_>,
    layout: &ArgumentLayout,
    slots: &[i32],
    value_local: Option<u16>,
) -> Result<()> {
    for slot in slots {
        if *slot == RETURN_SLOT {
            if let Some(local) = value_local {
                emit.ldloc(local)?;
            }
            continue;
        }
        emit.ldarg(slot_index(*slot)?)?;
        if layout.is_by_ref(*slot) {
            emit.ldobj(layout.element(*slot).clone())?;
        }
    }
    Ok(())
}

fn write_back(
    emit: &mut Emitter<'_>,
    layout: &ArgumentLayout,
    out_pack: &TypeSignature,
    out_local: u16,
) -> Result<()> {
    for (field, slot) in layout.out_args.iter().enumerate() {
        if *slot == RETURN_SLOT {
            continue;
        }
        emit.ldarg(slot_index(*slot)?)?;
        emit.ldloc(out_local)?;
        emit.ldfld(pack_field(out_pack, field))?;
        emit.stobj(layout.element(*slot).clone())?;
    }
    Ok(())
}

/// Splices the hook calls into a method body.
fn splice(method: &mut MethodDef, layout: &ArgumentLayout, plan: &CallPlan) -> Result<BodyEdit> {
    let token = method.token;
    let returns_value = method.returns_value();
    let return_type = method.return_type.clone();
    let MethodDef { body, debug, .. } = method;
    let body = body.as_mut().ok_or(Error::NoBody(token))?;

    let binding = debug.as_ref().map(|info| info.bind(body));

    let in_local = body.add_local(plan.in_pack.clone());
    let post_local = body.add_local(plan.post_pack.clone());
    let out_local = body.add_local(plan.out_pack.clone());
    let value_local = returns_value.then(|| body.add_local(return_type));

    if body.is_empty() {
        let mut emit = Emitter::append(body);
        if let Some(local) = value_local {
            emit.ldloc(local)?;
        }
        emit.op(OpCode::Ret)?;
    }
    let (Some(body_start), Some(body_end)) = (body.first(), body.last()) else {
        return Err(malformed_error!("Method body of {} is empty", token));
    };
    let returns: Vec<InstructionId> = body
        .iter()
        .filter(|(_, instruction)| instruction.opcode == OpCode::Ret)
        .map(|(id, _)| id)
        .collect();

    emit_post(body, layout, plan, returns.is_empty(), (post_local, out_local, value_local))?;
    let post_start = body
        .next(body_end)
        .ok_or_else(|| malformed_error!("Post-call sequence of {} was not emitted", token))?;
    body.close_open_regions(post_start)?;

    for ret in returns {
        body.replace(ret, OpCode::BrS, Operand::Target(post_start))?;
    }

    emit_pre(body, layout, plan, body_start, (in_local, out_local))?;

    let elided = elide_branches_to_next(body)?;
    let widened = legalize_branches(body)?;
    if let (Some(info), Some(binding)) = (debug.as_mut(), binding) {
        info.apply(body, binding);
    }
    body.max_stack = compute_max_stack(body, returns_value)?;
    body.init_locals = true;

    debug!(%token, elided, widened, "body spliced");
    Ok(BodyEdit { elided, widened })
}

fn emit_post(
    body: &mut MethodBody,
    layout: &ArgumentLayout,
    plan: &CallPlan,
    never_returns: bool,
    (post_local, out_local, value_local): (u16, u16, Option<u16>),
) -> Result<()> {
    let mut emit = Emitter::append(body);
    let post_end = emit.label(Instruction::new(OpCode::Ret));
    let post_jump = match value_local {
        Some(local) => emit.label(Instruction::load_local(local)),
        None => post_end,
    };

    if let (Some(local), false) = (value_local, never_returns) {
        emit.stloc(local)?;
    }
    if !layout.post_in_args.is_empty() {
        emit.ldloca(post_local)?;
        load_slots(&mut emit, layout, &layout.post_in_args, value_local)?;
        emit.call(pack_constructor(&plan.post_pack))?;
    }
    emit.ldc_i8(plan.tail)?;
    emit.ldloc(post_local)?;
    emit.ldloca(out_local)?;
    emit.call(plan.post_hook.clone())?;

    if layout.returns_value || !layout.out_args.is_empty() {
        emit.branch(OpCode::BrfalseS, post_jump)?;
    } else {
        emit.op(OpCode::Pop)?;
    }
    write_back(&mut emit, layout, &plan.out_pack, out_local)?;
    if layout.returns_value {
        emit.ldloc(out_local)?;
        emit.ldfld(pack_field(&plan.out_pack, 0))?;
        emit.op(OpCode::Ret)?;
        emit.place(post_jump)?;
    }
    emit.place(post_end)?;
    Ok(())
}

fn emit_pre(
    body: &mut MethodBody,
    layout: &ArgumentLayout,
    plan: &CallPlan,
    body_start: InstructionId,
    (in_local, out_local): (u16, u16),
) -> Result<()> {
    let mut emit = Emitter::before(body, body_start);
    if !layout.in_args.is_empty() {
        emit.ldloca(in_local)?;
        load_slots(&mut emit, layout, &layout.in_args, None)?;
        emit.call(pack_constructor(&plan.in_pack))?;
    }
    emit.ldc_i8(plan.head)?;
    emit.ldloc(in_local)?;
    emit.ldloca(out_local)?;
    emit.call(plan.pre_hook.clone())?;
    emit.branch(OpCode::BrfalseS, body_start)?;

    write_back(&mut emit, layout, &plan.out_pack, out_local)?;
    if layout.returns_value {
        emit.ldloc(out_local)?;
        emit.ldfld(pack_field(&plan.out_pack, 0))?;
    }
    emit.op(OpCode::Ret)?;
    Ok(())
}

/// Removes unconditional branches whose target is the next instruction.
///
/// Repeats until none is left; returns the number removed.
///
/// # Errors
/// Propagates [`MethodBody::remove`] failures.
pub fn elide_branches_to_next(body: &mut MethodBody) -> Result<usize> {
    let mut removed = 0;
    loop {
        let candidate = body.iter().find_map(|(id, instruction)| {
            let next = body.next(id)?;
            let unconditional = matches!(instruction.opcode, OpCode::Br | OpCode::BrS);
            (unconditional && instruction.targets() == [next]).then_some(id)
        });
        let Some(id) = candidate else {
            return Ok(removed);
        };
        body.remove(id)?;
        removed += 1;
    }
}

/// Widens short branches whose displacement no longer fits in one byte.
///
/// Offsets are recomputed after every round, since a widened branch moves everything behind
/// it; returns the number of widened branches once a round finds nothing left to widen.
///
/// # Errors
/// Returns [`Error::Malformed`] if a branch targets an instruction outside the body.
pub fn legalize_branches(body: &mut MethodBody) -> Result<usize> {
    let mut widened = 0;
    loop {
        body.compute_offsets();
        let mut out_of_range = Vec::new();
        for (id, instruction) in body.iter() {
            if !instruction.is_short_branch() {
                continue;
            }
            let origin = i64::from(instruction.offset) + i64::from(instruction.size());
            for target in instruction.targets() {
                let Some(destination) = body.get(target).filter(|_| body.contains(target)) else {
                    return Err(malformed_error!(
                        "Branch {} targets {} outside the body",
                        id,
                        target
                    ));
                };
                if i8::try_from(i64::from(destination.offset) - origin).is_err() {
                    out_of_range.push((id, instruction.opcode));
                    break;
                }
            }
        }

        if out_of_range.is_empty() {
            return Ok(widened);
        }
        for (id, opcode) in out_of_range {
            let long = opcode
                .long_form()
                .ok_or_else(|| malformed_error!("{} has no long form", opcode))?;
            body.set_opcode(id, long)?;
            widened += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::{DecliningHandler, Interpreter},
        metadata::{
            debuginfo::MethodDebugInfo,
            method::{ExceptionHandler, ExceptionHandlerFlags, ParamDef},
            sequencepoints::SequencePoint,
        },
        project::SessionConfig,
        test::{game_module, hotfix_session, method_named, runtime_module},
    };

    fn opcodes(body: &MethodBody) -> Vec<OpCode> {
        body.iter().map(|(_, instruction)| instruction.opcode).collect()
    }

    #[test]
    fn classify_instance_with_out_param() {
        let module = game_module();
        let id = method_named(&module, "Game.Player", "TryRead");
        let layout = ArgumentLayout::classify(&module, id).unwrap();

        // int TryRead(int key, out int value) on a class
        assert_eq!(layout.in_args, vec![0, 1]);
        assert_eq!(layout.post_in_args, vec![-1, 0, 1, 2]);
        assert_eq!(layout.out_args, vec![-1, 2]);
        assert_eq!(layout.element(2), &TypeSignature::I4);
        assert_eq!(layout.element(RETURN_SLOT), &TypeSignature::I4);
        assert!(layout.is_by_ref(2));
        assert!(!layout.is_by_ref(0));
    }

    #[test]
    fn classify_value_type_this() {
        let module = game_module();
        let id = method_named(&module, "Game.Vector", "Scale");
        let layout = ArgumentLayout::classify(&module, id).unwrap();
        assert_eq!(layout.in_args, vec![0, 1]);
        assert_eq!(layout.out_args, vec![0]);
        assert!(layout.is_by_ref(0));
        assert!(!layout.returns_value);
    }

    #[test]
    fn rewrite_static_function() {
        let mut session = hotfix_session();
        let module = session.get("Game").unwrap();
        let id = method_named(module, "Game.Math", "Twice");
        let mut rewriter = Rewriter::new(HotfixConfig::default());

        let injection = rewriter.rewrite(&mut session, "Game", id).unwrap();
        assert_eq!(injection.head_token, -injection.tail_token);
        assert_eq!((injection.in_arity, injection.post_in_arity, injection.out_arity), (1, 2, 1));
        assert_eq!(injection.identity, "Game.Math Twice(System.Int32)");
        assert_eq!(injection.elided_branches, 1);

        let module = session.get("Game").unwrap();
        assert!(module.is_dirty());
        assert!(module.assembly_refs().iter().any(|name| name == "HotfixRuntime"));
        let body = module.method(id).unwrap().body().unwrap();
        assert_eq!(body.locals.len(), 4);
        assert!(body.init_locals);
        assert_eq!(body.max_stack, 3);

        let code = opcodes(body);
        assert_eq!(code[0], OpCode::LdlocaS);
        assert!(code.contains(&OpCode::LdcI8));
        // Original `ldarg.0; ldc.i4.2; mul` survives between the two hook calls.
        let mul = code.iter().position(|op| *op == OpCode::Mul).unwrap();
        assert_eq!(code[mul + 1], OpCode::Stloc3);
        assert!(!code[..mul].contains(&OpCode::Stloc3));

        let runtime = session.get("HotfixRuntime").unwrap();
        assert!(runtime.find_type("Hotfix.ArgPack`1").is_some());
        assert!(runtime.find_type("Hotfix.ArgPack`2").is_some());
        assert!(runtime.is_dirty());
    }

    #[test]
    fn second_rewrite_is_rejected() {
        let mut session = hotfix_session();
        let id = method_named(session.get("Game").unwrap(), "Game.Math", "Twice");
        let mut rewriter = Rewriter::new(HotfixConfig::default());
        rewriter.rewrite(&mut session, "Game", id).unwrap();
        assert!(matches!(
            rewriter.rewrite(&mut session, "Game", id),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn missing_hook_is_reported() {
        let mut session = hotfix_session();
        let id = method_named(session.get("Game").unwrap(), "Game.Math", "Twice");
        let config = HotfixConfig::default().with_hook("Hotfix.HotfixCaller", "Nope");
        let mut rewriter = Rewriter::new(config);
        assert!(matches!(
            rewriter.rewrite(&mut session, "Game", id),
            Err(Error::MissingRuntimeMember(_))
        ));

        let runtime = session.get("HotfixRuntime").unwrap();
        assert!(!runtime.is_dirty());
        assert!(runtime.find_type("Hotfix.ArgPack`1").is_none());
        assert!(!session.get("Game").unwrap().is_dirty());
    }

    #[test]
    fn failed_rewrite_can_be_retried() {
        let mut session = Session::open(SessionConfig::new("unused"));
        session.insert(game_module());
        let id = method_named(session.get("Game").unwrap(), "Game.Math", "Twice");
        let original = session.get("Game").unwrap().method(id).unwrap().body().unwrap().len();
        let mut rewriter = Rewriter::new(HotfixConfig::default());

        assert!(matches!(
            rewriter.rewrite(&mut session, "Game", id),
            Err(Error::ModuleNotFound(_))
        ));
        let body = session.get("Game").unwrap().method(id).unwrap().body().unwrap();
        assert_eq!(body.len(), original);

        session.insert(runtime_module());
        let injection = rewriter.rewrite(&mut session, "Game", id).unwrap();
        assert_eq!(injection.identity, "Game.Math Twice(System.Int32)");
        let body = session.get("Game").unwrap().method(id).unwrap().body().unwrap();
        assert!(body.len() > original);
    }

    #[test]
    fn trailing_handler_ends_before_post_call() {
        let mut session = hotfix_session();
        let game = session.get_mut("Game").unwrap();
        let ty = game.find_type("Game.Math").unwrap();

        // br.s try; exit: ret; try: nop; leave.s exit; finally: endfinally
        let mut body = MethodBody::new();
        let exit = body.create(Instruction::new(OpCode::Ret));
        let guarded = body.create(Instruction::new(OpCode::Nop));
        body.push(Instruction::with(OpCode::BrS, Operand::Target(guarded)));
        body.append(exit).unwrap();
        body.append(guarded).unwrap();
        body.push(Instruction::with(OpCode::LeaveS, Operand::Target(exit)));
        let finally = body.push(Instruction::new(OpCode::Endfinally));
        body.add_handler(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: guarded,
            try_end: Some(finally),
            filter_start: None,
            handler_start: finally,
            handler_end: None,
            catch_type: None,
        });
        let id = game.add_method(
            ty,
            MethodDef::new(
                "Guarded",
                crate::metadata::method::MethodAttributes::PUBLIC
                    | crate::metadata::method::MethodAttributes::STATIC,
                TypeSignature::Void,
                vec![],
            )
            .with_body(body),
        );

        let injection = Rewriter::new(HotfixConfig::default())
            .rewrite(&mut session, "Game", id)
            .unwrap();

        let module = session.get("Game").unwrap();
        let body = module.method(id).unwrap().body().unwrap();
        body.validate().unwrap();
        let handler = &body.handlers()[0];
        let post_start = body.next(finally);
        assert!(post_start.is_some());
        assert_eq!(handler.handler_end, post_start);
        assert_eq!(handler.try_end, Some(finally));
        assert_eq!(
            body.get(exit).unwrap().operand,
            Operand::Target(post_start.unwrap())
        );

        let config = HotfixConfig::default();
        let mut interpreter = Interpreter::new(module, &config, DecliningHandler::new());
        let result = interpreter.execute(id, vec![]).unwrap();
        assert_eq!(result.return_value, None);
        assert_eq!(
            interpreter.into_handler().tokens(),
            vec![injection.head_token, injection.tail_token]
        );
    }

    #[test]
    fn empty_body_receives_return() {
        let mut session = hotfix_session();
        let game = session.get_mut("Game").unwrap();
        let ty = game.find_type("Game.Math").unwrap();
        let id = game.add_method(
            ty,
            MethodDef::new(
                "Zero",
                crate::metadata::method::MethodAttributes::PUBLIC
                    | crate::metadata::method::MethodAttributes::STATIC,
                TypeSignature::I4,
                vec![ParamDef::new("x", TypeSignature::I4)],
            )
            .with_body(MethodBody::new()),
        );

        Rewriter::new(HotfixConfig::default())
            .rewrite(&mut session, "Game", id)
            .unwrap();
        let body = session.get("Game").unwrap().method(id).unwrap().body().unwrap();
        assert_eq!(
            body.last().and_then(|last| body.get(last)).map(|i| i.opcode),
            Some(OpCode::Ret)
        );
        body.validate().unwrap();
    }

    #[test]
    fn no_body_is_rejected() {
        let mut session = hotfix_session();
        let game = session.get_mut("Game").unwrap();
        let ty = game.find_type("Game.Math").unwrap();
        let id = game.add_method(
            ty,
            MethodDef::new(
                "Extern",
                crate::metadata::method::MethodAttributes::PUBLIC,
                TypeSignature::Void,
                vec![],
            ),
        );
        assert!(matches!(
            Rewriter::new(HotfixConfig::default()).rewrite(&mut session, "Game", id),
            Err(Error::NoBody(_))
        ));
    }

    #[test]
    fn sequence_points_follow_original_code() {
        let mut session = hotfix_session();
        let game = session.get_mut("Game").unwrap();
        let id = method_named(game, "Game.Math", "Twice");
        game.method_mut(id).unwrap().debug = Some(MethodDebugInfo {
            sequence_points: vec![SequencePoint::new(0, 12, 5, 12, 20)],
            scopes: vec![],
        });

        Rewriter::new(HotfixConfig::default())
            .rewrite(&mut session, "Game", id)
            .unwrap();
        let method = session.get("Game").unwrap().method(id).unwrap();
        let mut body = method.body().unwrap().clone();
        body.compute_offsets();
        let offset = method.debug.as_ref().unwrap().sequence_points[0].il_offset;
        let at = body.offset_index()[&offset];
        assert_eq!(body.get(at).unwrap().opcode, OpCode::Ldarg0);
        assert!(offset > 0);
    }

    #[test]
    fn elision_repoints_referrers() {
        let mut body = MethodBody::new();
        let ret = body.create(Instruction::new(OpCode::Ret));
        let nop = body.create(Instruction::new(OpCode::Nop));
        let jump = body.create(Instruction::with(OpCode::BrS, Operand::Target(nop)));
        let guard = body.push(Instruction::with(OpCode::BrtrueS, Operand::Target(jump)));
        body.append(jump).unwrap();
        body.append(nop).unwrap();
        body.append(ret).unwrap();

        assert_eq!(elide_branches_to_next(&mut body).unwrap(), 1);
        assert!(!body.contains(jump));
        assert_eq!(body.get(guard).unwrap().targets(), vec![nop]);
        assert!(body.referrers(jump).is_empty());
        assert_eq!(body.referrers(nop).len(), 1);
        body.validate().unwrap();
    }

    #[test]
    fn legalization_reaches_fixed_point() {
        let mut body = MethodBody::new();
        let near = body.create(Instruction::new(OpCode::Nop));
        let far = body.create(Instruction::new(OpCode::Ret));
        // `inner` reaches `near` with exactly 127 bytes to spare, until `outer` grows.
        let inner = body.push(Instruction::with(OpCode::BrS, Operand::Target(near)));
        let outer = body.push(Instruction::with(OpCode::BrS, Operand::Target(far)));
        for _ in 0..125 {
            body.push(Instruction::new(OpCode::Nop));
        }
        body.append(near).unwrap();
        for _ in 0..70 {
            body.push(Instruction::new(OpCode::Nop));
        }
        body.append(far).unwrap();

        assert_eq!(legalize_branches(&mut body).unwrap(), 2);
        assert_eq!(body.get(inner).unwrap().opcode, OpCode::Br);
        assert_eq!(body.get(outer).unwrap().opcode, OpCode::Br);
        assert_eq!(legalize_branches(&mut body).unwrap(), 0);
    }

    #[test]
    fn in_range_branches_stay_short() {
        let mut body = MethodBody::new();
        let target = body.create(Instruction::new(OpCode::Ret));
        let jump = body.push(Instruction::with(OpCode::BrS, Operand::Target(target)));
        for _ in 0..127 {
            body.push(Instruction::new(OpCode::Nop));
        }
        body.append(target).unwrap();
        assert_eq!(legalize_branches(&mut body).unwrap(), 0);
        assert_eq!(body.get(jump).unwrap().opcode, OpCode::BrS);
    }
}
