//! The instruction loop.

use tracing::debug;

use crate::{
    assembly::{Instruction, InstructionId, OpCode, Operand},
    emulation::{EmValue, HeapRef, HookHandler, Pointer, StructValue},
    hotfix::HotfixConfig,
    metadata::{
        method::MethodBody,
        module::{MethodId, Module},
        signatures::{FieldReference, MethodReference, TypeSignature},
    },
    Error, Result,
};

fn fault(message: impl Into<String>) -> Error {
    Error::Emulation(message.into())
}

/// Execution limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Instructions executed before the run is aborted
    pub max_steps: u64,
    /// Evaluation stack depth before the run is aborted
    pub max_stack: usize,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_steps: 100_000,
            max_stack: 1_024,
        }
    }
}

/// Outcome of [`Interpreter::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// The returned value, `None` for void methods
    pub return_value: Option<EmValue>,
    /// Final referent of each by-reference argument, by argument index
    pub by_ref: Vec<(u16, EmValue)>,
    /// Instructions executed
    pub steps: u64,
}

impl ExecutionResult {
    /// Final referent of by-reference argument `index`.
    #[must_use]
    pub fn by_ref_arg(&self, index: u16) -> Option<&EmValue> {
        self.by_ref
            .iter()
            .find(|(arg, _)| *arg == index)
            .map(|(_, value)| value)
    }
}

/// State of the executing method.
struct Frame {
    args: Vec<EmValue>,
    locals: Vec<EmValue>,
    cells: Vec<EmValue>,
    stack: Vec<EmValue>,
}

enum Flow {
    Next,
    Jump(InstructionId),
    Return(Option<EmValue>),
}

/// Executes method bodies of one module.
///
/// Calls into the argument-pack constructors and the dispatch hook named by the
/// [`HotfixConfig`] are resolved internally; the hook decision is delegated to a
/// [`HookHandler`]. Reference-type objects live on a heap owned by the interpreter, so
/// they can be prepared before and inspected after a run.
pub struct Interpreter<'a, H: HookHandler> {
    module: &'a Module,
    config: &'a HotfixConfig,
    handler: H,
    limits: EmulationLimits,
    heap: Vec<StructValue>,
}

impl<'a, H: HookHandler> Interpreter<'a, H> {
    /// Creates an interpreter with default limits.
    #[must_use]
    pub fn new(module: &'a Module, config: &'a HotfixConfig, handler: H) -> Self {
        Interpreter {
            module,
            config,
            handler,
            limits: EmulationLimits::default(),
            heap: Vec::new(),
        }
    }

    /// Replaces the execution limits.
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The hook handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Releases the hook handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Allocates an object of `type_id` with default field values.
    pub fn alloc(&mut self, type_id: &str) -> EmValue {
        let mut object = StructValue::new(type_id);
        if let Some(ty) = self.module.find_type(type_id).and_then(|id| self.module.type_def(id)) {
            for field in ty.fields.iter().filter(|field| !field.is_static()) {
                object
                    .fields
                    .insert(field.name.clone(), self.default_value(&field.field_type));
            }
        }
        self.heap.push(object);
        EmValue::Object(HeapRef(self.heap.len() - 1))
    }

    /// A heap object.
    #[must_use]
    pub fn object(&self, object: HeapRef) -> Option<&StructValue> {
        self.heap.get(object.0)
    }

    /// A heap object, mutable.
    pub fn object_mut(&mut self, object: HeapRef) -> Option<&mut StructValue> {
        self.heap.get_mut(object.0)
    }

    /// Runs `method` with `args`, `this` first for instance methods.
    ///
    /// By-reference parameters (and `this` of value types) take the initial referent; the
    /// interpreter supplies the pointer and reports the final referent in
    /// [`ExecutionResult::by_ref`].
    ///
    /// # Errors
    /// Returns [`Error::NoBody`] for bodiless methods and [`Error::Emulation`] for an
    /// argument count mismatch, an unsupported instruction, a type mismatch, an exceeded
    /// limit or a thrown exception.
    pub fn execute(&mut self, method: MethodId, args: Vec<EmValue>) -> Result<ExecutionResult> {
        let module = self.module;
        let def = module
            .method(method)
            .ok_or_else(|| fault(format!("Method {} is not defined", method.index())))?;
        let body = def.body().ok_or(Error::NoBody(def.token))?;
        let signature = def.signature();
        if args.len() != signature.arg_count() {
            return Err(fault(format!(
                "{} expects {} arguments, got {}",
                def.name,
                signature.arg_count(),
                args.len()
            )));
        }

        let value_this = def.has_this()
            && module
                .type_def(def.declaring_type)
                .is_some_and(|ty| ty.is_value_type());
        let mut frame = Frame {
            args: Vec::with_capacity(args.len()),
            locals: body.locals.iter().map(|local| self.default_value(local)).collect(),
            cells: Vec::new(),
            stack: Vec::new(),
        };
        let mut by_ref_args = Vec::new();
        for (index, value) in args.into_iter().enumerate() {
            let by_ref = if def.has_this() {
                if index == 0 {
                    value_this
                } else {
                    signature.params[index - 1].is_by_ref()
                }
            } else {
                signature.params[index].is_by_ref()
            };
            if by_ref {
                frame.cells.push(value);
                let cell = frame.cells.len() - 1;
                by_ref_args.push((index, cell));
                frame.args.push(EmValue::Ptr(Pointer::Cell(cell)));
            } else {
                frame.args.push(value);
            }
        }

        let (return_value, steps) = self.run(body, &mut frame)?;
        #[allow(clippy::cast_possible_truncation)]
        let by_ref = by_ref_args
            .into_iter()
            .map(|(index, cell)| (index as u16, frame.cells[cell].clone()))
            .collect();
        debug!(method = %def.name, steps, "emulation finished");
        Ok(ExecutionResult {
            return_value: if def.returns_value() { return_value } else { None },
            by_ref,
            steps,
        })
    }

    fn run(&mut self, body: &MethodBody, frame: &mut Frame) -> Result<(Option<EmValue>, u64)> {
        let mut current = body.first().ok_or_else(|| fault("Empty method body"))?;
        let mut steps = 0u64;
        loop {
            steps += 1;
            if steps > self.limits.max_steps {
                return Err(fault(format!("Step limit of {} exceeded", self.limits.max_steps)));
            }
            let instruction = body
                .get(current)
                .ok_or(Error::InstructionNotInBody(current.0))?;
            match self.step(instruction, frame)? {
                Flow::Next => {
                    current = body
                        .next(current)
                        .ok_or_else(|| fault("Execution ran past the end of the body"))?;
                }
                Flow::Jump(target) => current = target,
                Flow::Return(value) => return Ok((value, steps)),
            }
            if frame.stack.len() > self.limits.max_stack {
                return Err(fault("Evaluation stack limit exceeded"));
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, instruction: &Instruction, frame: &mut Frame) -> Result<Flow> {
        let operand = &instruction.operand;
        match instruction.opcode {
            OpCode::Nop => {}
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::Ldarg => {
                let index = variable(instruction.argument_index())?;
                let value = self.read(frame, &Pointer::Arg(index))?;
                frame.stack.push(value);
            }
            OpCode::LdargaS | OpCode::Ldarga => {
                let index = variable(instruction.argument_index())?;
                frame.stack.push(EmValue::Ptr(Pointer::Arg(index)));
            }
            OpCode::StargS | OpCode::Starg => {
                let index = variable(instruction.argument_index())?;
                let value = pop(frame)?;
                self.write(frame, &Pointer::Arg(index), value)?;
            }
            OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc => {
                let index = variable(instruction.local_index())?;
                let value = self.read(frame, &Pointer::Local(index))?;
                frame.stack.push(value);
            }
            OpCode::LdlocaS | OpCode::Ldloca => {
                let index = variable(instruction.local_index())?;
                frame.stack.push(EmValue::Ptr(Pointer::Local(index)));
            }
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc => {
                let index = variable(instruction.local_index())?;
                let value = pop(frame)?;
                self.write(frame, &Pointer::Local(index), value)?;
            }
            OpCode::Ldnull => frame.stack.push(EmValue::Null),
            OpCode::LdcI4M1 => frame.stack.push(EmValue::I32(-1)),
            OpCode::LdcI40 => frame.stack.push(EmValue::I32(0)),
            OpCode::LdcI41 => frame.stack.push(EmValue::I32(1)),
            OpCode::LdcI42 => frame.stack.push(EmValue::I32(2)),
            OpCode::LdcI43 => frame.stack.push(EmValue::I32(3)),
            OpCode::LdcI44 => frame.stack.push(EmValue::I32(4)),
            OpCode::LdcI45 => frame.stack.push(EmValue::I32(5)),
            OpCode::LdcI46 => frame.stack.push(EmValue::I32(6)),
            OpCode::LdcI47 => frame.stack.push(EmValue::I32(7)),
            OpCode::LdcI48 => frame.stack.push(EmValue::I32(8)),
            OpCode::LdcI4S | OpCode::LdcI4 => match operand {
                Operand::Int32(value) => frame.stack.push(EmValue::I32(*value)),
                _ => return Err(operand_error(instruction)),
            },
            OpCode::LdcI8 => match operand {
                Operand::Int64(value) => frame.stack.push(EmValue::I64(*value)),
                _ => return Err(operand_error(instruction)),
            },
            OpCode::LdcR4 => match operand {
                Operand::Float32(value) => frame.stack.push(EmValue::F64(f64::from(*value))),
                _ => return Err(operand_error(instruction)),
            },
            OpCode::LdcR8 => match operand {
                Operand::Float64(value) => frame.stack.push(EmValue::F64(*value)),
                _ => return Err(operand_error(instruction)),
            },
            OpCode::Ldstr => match operand {
                Operand::String(value) => frame.stack.push(EmValue::Str(value.clone())),
                _ => return Err(operand_error(instruction)),
            },
            OpCode::Dup => {
                let top = frame.stack.last().cloned().ok_or_else(|| fault("Stack underflow"))?;
                frame.stack.push(top);
            }
            OpCode::Pop => {
                pop(frame)?;
            }
            OpCode::Ret => {
                return Ok(Flow::Return(frame.stack.pop()));
            }

            OpCode::BrS | OpCode::Br | OpCode::LeaveS | OpCode::Leave => {
                return Ok(Flow::Jump(target(instruction)?));
            }
            OpCode::BrfalseS | OpCode::Brfalse | OpCode::BrtrueS | OpCode::Brtrue => {
                let value = pop(frame)?;
                let expected = matches!(instruction.opcode, OpCode::BrtrueS | OpCode::Brtrue);
                if value.is_true() == expected {
                    return Ok(Flow::Jump(target(instruction)?));
                }
            }
            OpCode::BeqS
            | OpCode::Beq
            | OpCode::BneUnS
            | OpCode::BneUn
            | OpCode::BgeS
            | OpCode::Bge
            | OpCode::BgeUnS
            | OpCode::BgeUn
            | OpCode::BgtS
            | OpCode::Bgt
            | OpCode::BgtUnS
            | OpCode::BgtUn
            | OpCode::BleS
            | OpCode::Ble
            | OpCode::BleUnS
            | OpCode::BleUn
            | OpCode::BltS
            | OpCode::Blt
            | OpCode::BltUnS
            | OpCode::BltUn => {
                let right = pop(frame)?;
                let left = pop(frame)?;
                if branch_taken(instruction.opcode, &left, &right)? {
                    return Ok(Flow::Jump(target(instruction)?));
                }
            }
            OpCode::Switch => {
                let value = pop(frame)?.as_i64().ok_or_else(|| fault("switch on a non-integer"))?;
                if let Operand::Switch(targets) = operand {
                    if let Some(target) = usize::try_from(value).ok().and_then(|i| targets.get(i)) {
                        return Ok(Flow::Jump(*target));
                    }
                }
            }

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::DivUn
            | OpCode::Rem
            | OpCode::RemUn
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::ShrUn => {
                let right = pop(frame)?;
                let left = pop(frame)?;
                frame.stack.push(arithmetic(instruction.opcode, left, right)?);
            }
            OpCode::Neg => {
                let value = match pop(frame)? {
                    EmValue::I32(value) => EmValue::I32(value.wrapping_neg()),
                    EmValue::I64(value) => EmValue::I64(value.wrapping_neg()),
                    EmValue::F64(value) => EmValue::F64(-value),
                    other => return Err(fault(format!("neg on {other}"))),
                };
                frame.stack.push(value);
            }
            OpCode::Not => {
                let value = match pop(frame)? {
                    EmValue::I32(value) => EmValue::I32(!value),
                    EmValue::I64(value) => EmValue::I64(!value),
                    other => return Err(fault(format!("not on {other}"))),
                };
                frame.stack.push(value);
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::CgtUn | OpCode::Clt | OpCode::CltUn => {
                let right = pop(frame)?;
                let left = pop(frame)?;
                let result = match instruction.opcode {
                    OpCode::Ceq => equals(&left, &right),
                    OpCode::Cgt | OpCode::CgtUn => {
                        compare(&left, &right)? == Some(std::cmp::Ordering::Greater)
                    }
                    _ => compare(&left, &right)? == Some(std::cmp::Ordering::Less),
                };
                frame.stack.push(EmValue::from(result));
            }
            OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvU1
            | OpCode::ConvU2
            | OpCode::ConvU4
            | OpCode::ConvI8
            | OpCode::ConvU8
            | OpCode::ConvI
            | OpCode::ConvU
            | OpCode::ConvR4
            | OpCode::ConvR8 => {
                let value = pop(frame)?;
                frame.stack.push(convert(instruction.opcode, &value)?);
            }

            OpCode::Ldfld => {
                let field = field_operand(instruction)?;
                let value = match pop(frame)? {
                    EmValue::Struct(value) => value
                        .fields
                        .get(&field.name)
                        .cloned()
                        .ok_or_else(|| fault(format!("Field {} is missing", field.name)))?,
                    EmValue::Ptr(pointer) => {
                        self.read(frame, &Pointer::Field(Box::new(pointer), field.name.clone()))?
                    }
                    EmValue::Object(object) => {
                        self.read(frame, &Pointer::HeapField(object, field.name.clone()))?
                    }
                    other => return Err(fault(format!("ldfld {} on {other}", field.name))),
                };
                frame.stack.push(value);
            }
            OpCode::Ldflda => {
                let field = field_operand(instruction)?;
                let pointer = field_pointer(pop(frame)?, &field.name)?;
                frame.stack.push(EmValue::Ptr(pointer));
            }
            OpCode::Stfld => {
                let field = field_operand(instruction)?;
                let value = pop(frame)?;
                let pointer = field_pointer(pop(frame)?, &field.name)?;
                self.write(frame, &pointer, value)?;
            }
            OpCode::Ldobj
            | OpCode::LdindI1
            | OpCode::LdindU1
            | OpCode::LdindI2
            | OpCode::LdindU2
            | OpCode::LdindI4
            | OpCode::LdindU4
            | OpCode::LdindI8
            | OpCode::LdindI
            | OpCode::LdindR4
            | OpCode::LdindR8
            | OpCode::LdindRef => {
                let pointer = pointer_operand(pop(frame)?)?;
                let value = self.read(frame, &pointer)?;
                frame.stack.push(value);
            }
            OpCode::Stobj
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::StindI8
            | OpCode::StindI
            | OpCode::StindR4
            | OpCode::StindR8
            | OpCode::StindRef => {
                let value = pop(frame)?;
                let pointer = pointer_operand(pop(frame)?)?;
                self.write(frame, &pointer, value)?;
            }
            OpCode::Initobj => {
                let ty = match operand {
                    Operand::Type(ty) => ty.clone(),
                    _ => return Err(operand_error(instruction)),
                };
                let pointer = pointer_operand(pop(frame)?)?;
                let value = self.default_value(&ty);
                self.write(frame, &pointer, value)?;
            }

            OpCode::Call | OpCode::Callvirt => {
                let method = match operand {
                    Operand::Method(method) => method,
                    _ => return Err(operand_error(instruction)),
                };
                if let Some(value) = self.call(method, frame)? {
                    frame.stack.push(value);
                }
            }
            OpCode::Newobj => {
                let method = match operand {
                    Operand::Method(method) => method,
                    _ => return Err(operand_error(instruction)),
                };
                let args = pop_args(frame, method.signature.params.len())?;
                let value = match self.pack_id(&method.declaring) {
                    Some(type_id) => EmValue::Struct(pack_value(type_id, args)),
                    None => self.handler.call(method, &args)?,
                };
                frame.stack.push(value);
            }
            OpCode::Throw => {
                let exception = pop(frame)?;
                return Err(fault(format!("Exception thrown: {exception}")));
            }
            other => return Err(fault(format!("Unsupported instruction {other}"))),
        }
        Ok(Flow::Next)
    }

    /// Resolves a call: pack constructors and the dispatch hook internally, everything else
    /// through the handler.
    fn call(&mut self, method: &MethodReference, frame: &mut Frame) -> Result<Option<EmValue>> {
        let args = pop_args(frame, method.signature.params.len())?;

        if method.name == ".ctor" && method.signature.has_this {
            if let Some(type_id) = self.pack_id(&method.declaring) {
                let this = pointer_operand(pop(frame)?)?;
                self.write(frame, &this, EmValue::Struct(pack_value(type_id, args)))?;
                return Ok(None);
            }
        }

        let declaring = method.declaring.type_ref().map(|reference| reference.id.as_str());
        if declaring == Some(self.config.hook_type.as_str())
            && method.name == self.config.hook_method
        {
            let [token, pack, results]: [EmValue; 3] = args
                .try_into()
                .map_err(|_| fault("Dispatch hook takes three arguments"))?;
            let token = token.as_i64().ok_or_else(|| fault("Hook token is not an integer"))?;
            let pack = match pack {
                EmValue::Struct(pack) => pack,
                other => return Err(fault(format!("Hook argument pack is {other}"))),
            };
            let results = pointer_operand(results)?;
            let mut out = match self.read(frame, &results)? {
                EmValue::Struct(out) => out,
                other => return Err(fault(format!("Hook result pack is {other}"))),
            };
            let handled = self.handler.dispatch(token, &pack, &mut out);
            debug!(token, handled, "dispatch hook called");
            if handled {
                self.write(frame, &results, EmValue::Struct(out))?;
            }
            return Ok(Some(EmValue::from(handled)));
        }

        let mut all = Vec::with_capacity(args.len() + 1);
        if method.signature.has_this {
            all.push(pop(frame)?);
        }
        all.extend(args);
        let value = self.handler.call(method, &all)?;
        Ok((!method.resolved_signature().return_type.is_void()).then_some(value))
    }

    /// Type id of an argument-pack signature.
    fn pack_id<'s>(&self, ty: &'s TypeSignature) -> Option<&'s str> {
        let id = ty.type_ref()?.id.as_str();
        self.config.pack_arity(id).map(|_| id)
    }

    fn read(&self, frame: &Frame, pointer: &Pointer) -> Result<EmValue> {
        let value = match pointer {
            Pointer::Arg(index) => frame.args.get(usize::from(*index)).cloned(),
            Pointer::Local(index) => frame.locals.get(usize::from(*index)).cloned(),
            Pointer::Cell(index) => frame.cells.get(*index).cloned(),
            Pointer::HeapField(object, name) => self
                .heap
                .get(object.0)
                .and_then(|object| object.fields.get(name))
                .cloned(),
            Pointer::Field(base, name) => match self.read(frame, base)? {
                EmValue::Struct(value) => value.fields.get(name).cloned(),
                EmValue::Object(object) => self
                    .heap
                    .get(object.0)
                    .and_then(|object| object.fields.get(name))
                    .cloned(),
                _ => None,
            },
        };
        value.ok_or_else(|| fault(format!("Invalid read through {pointer:?}")))
    }

    fn write(&mut self, frame: &mut Frame, pointer: &Pointer, value: EmValue) -> Result<()> {
        let slot = match pointer {
            Pointer::Arg(index) => frame.args.get_mut(usize::from(*index)),
            Pointer::Local(index) => frame.locals.get_mut(usize::from(*index)),
            Pointer::Cell(index) => frame.cells.get_mut(*index),
            Pointer::HeapField(object, name) => {
                let object = self
                    .heap
                    .get_mut(object.0)
                    .ok_or_else(|| fault(format!("Dangling object {}", object.0)))?;
                object.fields.insert(name.clone(), value);
                return Ok(());
            }
            Pointer::Field(base, name) => {
                return match self.read(frame, base)? {
                    EmValue::Struct(mut outer) => {
                        outer.fields.insert(name.clone(), value);
                        self.write(frame, base, EmValue::Struct(outer))
                    }
                    EmValue::Object(object) => {
                        self.write(frame, &Pointer::HeapField(object, name.clone()), value)
                    }
                    other => Err(fault(format!("Field {name} written on {other}"))),
                };
            }
        };
        let slot = slot.ok_or_else(|| fault(format!("Invalid write through {pointer:?}")))?;
        *slot = value;
        Ok(())
    }

    /// The zero value of a type; value types get their instance fields.
    fn default_value(&self, ty: &TypeSignature) -> EmValue {
        match ty {
            TypeSignature::Boolean
            | TypeSignature::Char
            | TypeSignature::I1
            | TypeSignature::U1
            | TypeSignature::I2
            | TypeSignature::U2
            | TypeSignature::I4
            | TypeSignature::U4 => EmValue::I32(0),
            TypeSignature::I8 | TypeSignature::U8 | TypeSignature::I | TypeSignature::U => {
                EmValue::I64(0)
            }
            TypeSignature::R4 | TypeSignature::R8 => EmValue::F64(0.0),
            TypeSignature::ValueType(_) | TypeSignature::GenericInst(..) if ty.is_value_type() => {
                let Some(reference) = ty.type_ref() else {
                    return EmValue::Null;
                };
                let mut value = StructValue::new(reference.id.clone());
                if self.config.pack_arity(&reference.id).is_some() {
                    for (index, element) in ty.generic_args().iter().enumerate() {
                        value.set_element(index, self.default_value(element));
                    }
                } else if let Some(def) = self
                    .module
                    .find_type(&reference.id)
                    .and_then(|id| self.module.type_def(id))
                {
                    for field in def.fields.iter().filter(|field| !field.is_static()) {
                        let field_type = field.field_type.substitute(ty.generic_args(), &[]);
                        value.fields.insert(field.name.clone(), self.default_value(&field_type));
                    }
                }
                EmValue::Struct(value)
            }
            _ => EmValue::Null,
        }
    }
}

fn pop(frame: &mut Frame) -> Result<EmValue> {
    frame.stack.pop().ok_or_else(|| fault("Stack underflow"))
}

fn pop_args(frame: &mut Frame, count: usize) -> Result<Vec<EmValue>> {
    if frame.stack.len() < count {
        return Err(fault("Stack underflow"));
    }
    Ok(frame.stack.split_off(frame.stack.len() - count))
}

fn pack_value(type_id: &str, elements: Vec<EmValue>) -> StructValue {
    let mut pack = StructValue::new(type_id);
    for (index, element) in elements.into_iter().enumerate() {
        pack.set_element(index, element);
    }
    pack
}

fn variable(index: Option<u16>) -> Result<u16> {
    index.ok_or_else(|| fault("Variable instruction without index"))
}

fn target(instruction: &Instruction) -> Result<InstructionId> {
    match instruction.operand {
        Operand::Target(target) => Ok(target),
        _ => Err(operand_error(instruction)),
    }
}

fn operand_error(instruction: &Instruction) -> Error {
    fault(format!("Unexpected operand on {}", instruction.opcode))
}

fn field_operand(instruction: &Instruction) -> Result<&FieldReference> {
    match &instruction.operand {
        Operand::Field(field) => Ok(field),
        _ => Err(operand_error(instruction)),
    }
}

fn pointer_operand(value: EmValue) -> Result<Pointer> {
    match value {
        EmValue::Ptr(pointer) => Ok(pointer),
        other => Err(fault(format!("Expected a managed pointer, found {other}"))),
    }
}

fn field_pointer(target: EmValue, name: &str) -> Result<Pointer> {
    match target {
        EmValue::Ptr(pointer) => Ok(Pointer::Field(Box::new(pointer), name.to_string())),
        EmValue::Object(object) => Ok(Pointer::HeapField(object, name.to_string())),
        EmValue::Null => Err(fault(format!("Null reference accessing {name}"))),
        other => Err(fault(format!("Field {name} addressed on {other}"))),
    }
}

fn equals(left: &EmValue, right: &EmValue) -> bool {
    match (left.as_i64(), right.as_i64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(left: &EmValue, right: &EmValue) -> Result<Option<std::cmp::Ordering>> {
    match (left, right) {
        (EmValue::F64(l), EmValue::F64(r)) => Ok(l.partial_cmp(r)),
        _ => match (left.as_i64(), right.as_i64()) {
            (Some(l), Some(r)) => Ok(Some(l.cmp(&r))),
            _ => Err(fault(format!("Cannot compare {left} with {right}"))),
        },
    }
}

fn branch_taken(opcode: OpCode, left: &EmValue, right: &EmValue) -> Result<bool> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    Ok(match opcode {
        OpCode::BeqS | OpCode::Beq => equals(left, right),
        OpCode::BneUnS | OpCode::BneUn => !equals(left, right),
        OpCode::BgeS | OpCode::Bge | OpCode::BgeUnS | OpCode::BgeUn => {
            matches!(compare(left, right)?, Some(Greater | Equal))
        }
        OpCode::BgtS | OpCode::Bgt | OpCode::BgtUnS | OpCode::BgtUn => {
            compare(left, right)? == Some(Greater)
        }
        OpCode::BleS | OpCode::Ble | OpCode::BleUnS | OpCode::BleUn => {
            matches!(compare(left, right)?, Some(Less | Equal))
        }
        _ => compare(left, right)? == Some(Less),
    })
}

fn arithmetic(opcode: OpCode, left: EmValue, right: EmValue) -> Result<EmValue> {
    match (left, right) {
        (EmValue::I32(l), EmValue::I32(r)) => {
            #[allow(clippy::cast_possible_truncation)]
            let value = integer_op(opcode, i64::from(l), i64::from(r), 32)? as i32;
            Ok(EmValue::I32(value))
        }
        (EmValue::F64(l), EmValue::F64(r)) => Ok(EmValue::F64(match opcode {
            OpCode::Add => l + r,
            OpCode::Sub => l - r,
            OpCode::Mul => l * r,
            OpCode::Div => l / r,
            OpCode::Rem => l % r,
            other => return Err(fault(format!("{other} on floats"))),
        })),
        (left, right) => match (left.as_i64(), right.as_i64()) {
            (Some(l), Some(r)) => Ok(EmValue::I64(integer_op(opcode, l, r, 64)?)),
            _ => Err(fault(format!("{opcode} on {left} and {right}"))),
        },
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integer_op(opcode: OpCode, l: i64, r: i64, width: u32) -> Result<i64> {
    let narrow = |value: i64| if width == 32 { i64::from(value as i32) } else { value };
    let unsigned = |value: i64| if width == 32 { u64::from(value as u32) } else { value as u64 };
    let shift = (r as u32) & (width - 1);
    Ok(narrow(match opcode {
        OpCode::Add => l.wrapping_add(r),
        OpCode::Sub => l.wrapping_sub(r),
        OpCode::Mul => l.wrapping_mul(r),
        OpCode::Div | OpCode::Rem if r == 0 => return Err(fault("Division by zero")),
        OpCode::Div => l.wrapping_div(r),
        OpCode::Rem => l.wrapping_rem(r),
        OpCode::DivUn | OpCode::RemUn if unsigned(r) == 0 => return Err(fault("Division by zero")),
        OpCode::DivUn => (unsigned(l) / unsigned(r)) as i64,
        OpCode::RemUn => (unsigned(l) % unsigned(r)) as i64,
        OpCode::And => l & r,
        OpCode::Or => l | r,
        OpCode::Xor => l ^ r,
        OpCode::Shl => l.wrapping_shl(shift),
        OpCode::Shr => narrow(l).wrapping_shr(shift),
        OpCode::ShrUn => (unsigned(l) >> shift) as i64,
        other => return Err(fault(format!("{other} is not arithmetic"))),
    }))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn convert(opcode: OpCode, value: &EmValue) -> Result<EmValue> {
    let integer = match value {
        EmValue::F64(value) => *value as i64,
        other => other
            .as_i64()
            .ok_or_else(|| fault(format!("{opcode} on {other}")))?,
    };
    Ok(match opcode {
        OpCode::ConvI1 => EmValue::I32(i32::from(integer as i8)),
        OpCode::ConvU1 => EmValue::I32(i32::from(integer as u8)),
        OpCode::ConvI2 => EmValue::I32(i32::from(integer as i16)),
        OpCode::ConvU2 => EmValue::I32(i32::from(integer as u16)),
        OpCode::ConvI4 | OpCode::ConvU4 => EmValue::I32(integer as i32),
        OpCode::ConvR4 | OpCode::ConvR8 => match value {
            EmValue::F64(value) => EmValue::F64(*value),
            _ => EmValue::F64(integer as f64),
        },
        _ => EmValue::I64(integer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::DecliningHandler,
        test::{game_module, method_named},
    };

    #[test]
    fn executes_arithmetic_and_branches() {
        let module = game_module();
        let config = HotfixConfig::default();
        let mut interpreter = Interpreter::new(&module, &config, DecliningHandler::new());

        let twice = method_named(&module, "Game.Math", "Twice");
        let result = interpreter.execute(twice, vec![EmValue::I32(21)]).unwrap();
        assert_eq!(result.return_value, Some(EmValue::I32(42)));
        assert_eq!(result.steps, 4);

        let clamp = method_named(&module, "Game.Math", "Clamp");
        for (input, expected) in [(-5, 0), (0, 0), (7, 7)] {
            let result = interpreter.execute(clamp, vec![EmValue::I32(input)]).unwrap();
            assert_eq!(result.return_value, Some(EmValue::I32(expected)), "{input}");
        }
    }

    #[test]
    fn by_ref_arguments_are_reported() {
        let module = game_module();
        let config = HotfixConfig::default();
        let mut interpreter = Interpreter::new(&module, &config, DecliningHandler::new());

        let player = interpreter.alloc("Game.Player");
        let try_read = method_named(&module, "Game.Player", "TryRead");
        let result = interpreter
            .execute(try_read, vec![player, EmValue::I32(4), EmValue::I32(0)])
            .unwrap();
        assert_eq!(result.return_value, Some(EmValue::I32(1)));
        assert_eq!(result.by_ref_arg(2), Some(&EmValue::I32(5)));

        let scale = method_named(&module, "Game.Vector", "Scale");
        let vector = StructValue::new("Game.Vector").with_field("x", EmValue::I32(3));
        let result = interpreter
            .execute(scale, vec![vector.into(), EmValue::I32(4)])
            .unwrap();
        assert_eq!(result.return_value, None);
        let this = result.by_ref_arg(0).and_then(EmValue::as_struct).unwrap();
        assert_eq!(this.field("x"), Some(&EmValue::I32(12)));
    }

    #[test]
    fn heap_objects_are_mutated_in_place() {
        let module = game_module();
        let config = HotfixConfig::default();
        let mut interpreter = Interpreter::new(&module, &config, DecliningHandler::new());

        let player = interpreter.alloc("Game.Player");
        let EmValue::Object(handle) = &player else {
            panic!("expected an object");
        };
        let handle = *handle;
        assert_eq!(interpreter.object(handle).unwrap().field("hp"), Some(&EmValue::I32(0)));
        interpreter
            .object_mut(handle)
            .unwrap()
            .fields
            .insert("hp".to_string(), EmValue::I32(9));

        let health = method_named(&module, "Game.Player", "get_Health");
        let result = interpreter.execute(health, vec![player.clone()]).unwrap();
        assert_eq!(result.return_value, Some(EmValue::I32(9)));

        interpreter
            .execute(method_named(&module, "Game.Player", "Reset"), vec![player])
            .unwrap();
        assert_eq!(interpreter.object(handle).unwrap().field("hp"), Some(&EmValue::I32(0)));
    }

    #[test]
    fn limits_and_argument_checks() {
        let module = game_module();
        let config = HotfixConfig::default();
        let twice = method_named(&module, "Game.Math", "Twice");

        let mut interpreter = Interpreter::new(&module, &config, DecliningHandler::new())
            .with_limits(EmulationLimits { max_steps: 2, max_stack: 16 });
        assert!(matches!(
            interpreter.execute(twice, vec![EmValue::I32(1)]),
            Err(Error::Emulation(_))
        ));
        assert!(matches!(
            interpreter.execute(twice, vec![]),
            Err(Error::Emulation(_))
        ));
    }

    #[test]
    fn integer_semantics() {
        assert_eq!(
            arithmetic(OpCode::Add, EmValue::I32(i32::MAX), EmValue::I32(1)).unwrap(),
            EmValue::I32(i32::MIN)
        );
        assert_eq!(
            arithmetic(OpCode::ShrUn, EmValue::I32(-1), EmValue::I32(28)).unwrap(),
            EmValue::I32(15)
        );
        assert_eq!(
            arithmetic(OpCode::Mul, EmValue::I64(3), EmValue::I32(4)).unwrap(),
            EmValue::I64(12)
        );
        assert!(arithmetic(OpCode::Div, EmValue::I32(1), EmValue::I32(0)).is_err());
        assert_eq!(convert(OpCode::ConvI1, &EmValue::I32(0x1FF)).unwrap(), EmValue::I32(-1));
    }
}
