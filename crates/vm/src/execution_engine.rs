//! The execution engine: fetch, charge, dispatch.

use crate::error::{VmError, VmResult};
use crate::evaluation_stack::EvaluationStack;
use crate::execution_context::ExecutionContext;
use crate::gas_table;
use crate::instruction::Instruction;
use crate::jump_table;
use crate::op_code::OpCode;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::try_context::TryState;
use crate::vm_state::VmState;
use std::cell::RefCell;
use std::rc::Rc;

/// Hard resource bounds enforced during execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionEngineLimits {
    /// Maximum items tracked by the reference counter.
    pub max_stack_size: usize,
    /// Maximum size of a single item, in bytes.
    pub max_item_size: usize,
    /// Maximum invocation stack depth.
    pub max_invocation_stack_size: usize,
    /// Maximum nested `TRY` regions per context.
    pub max_try_nesting_depth: usize,
    /// Maximum integer width, in bytes.
    pub max_integer_size: usize,
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self {
            max_stack_size: 2048,
            max_item_size: 1 << 20,
            max_invocation_stack_size: 1024,
            max_try_nesting_depth: 16,
            max_integer_size: 32,
        }
    }
}

/// Host hook invoked for `SYSCALL` instructions. The bare engine rejects
/// every syscall; the application engine routes them to interop services.
pub trait SyscallRouter {
    /// Executes the syscall identified by `id` against `engine`.
    fn on_syscall(&mut self, engine: &mut ExecutionEngine, id: u32) -> VmResult<()>;
}

/// A router with no services registered.
pub struct NoSyscalls;

impl SyscallRouter for NoSyscalls {
    fn on_syscall(&mut self, _engine: &mut ExecutionEngine, id: u32) -> VmResult<()> {
        Err(VmError::UnknownSyscall(id))
    }
}

/// The stack machine. Deterministic and single-threaded; one engine per
/// script invocation.
pub struct ExecutionEngine {
    state: VmState,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: EvaluationStack,
    reference_counter: Rc<RefCell<ReferenceCounter>>,
    limits: ExecutionEngineLimits,
    gas_consumed: i64,
    gas_limit: i64,
    /// In-flight script exception during unwinding.
    uncaught_exception: Option<StackItem>,
    /// Why the engine faulted, when it did.
    fault_reason: Option<VmError>,
    /// Digest signed by the current script container; consumed by
    /// `CHECKSIG`/`CHECKMULTISIG`.
    container_digest: Option<[u8; 32]>,
    /// Set by handlers that moved the instruction pointer themselves.
    jumping: bool,
}

impl ExecutionEngine {
    /// Creates an engine with default limits and an unbounded gas budget.
    pub fn new() -> Self {
        Self::with_limits(ExecutionEngineLimits::default())
    }

    /// Creates an engine with explicit limits.
    pub fn with_limits(limits: ExecutionEngineLimits) -> Self {
        let counter = Rc::new(RefCell::new(ReferenceCounter::new()));
        Self {
            state: VmState::None,
            invocation_stack: Vec::new(),
            result_stack: EvaluationStack::new(counter.clone()),
            reference_counter: counter,
            limits,
            gas_consumed: 0,
            gas_limit: i64::MAX,
            uncaught_exception: None,
            fault_reason: None,
            container_digest: None,
            jumping: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VmState {
        self.state
    }

    /// Resource limits in force.
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// Gas consumed so far.
    pub fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    /// Sets the gas budget; exceeding it faults the engine.
    pub fn set_gas_limit(&mut self, limit: i64) {
        self.gas_limit = limit;
    }

    /// The gas budget.
    pub fn gas_limit(&self) -> i64 {
        self.gas_limit
    }

    /// The reason for the fault, if the engine faulted.
    pub fn fault_reason(&self) -> Option<&VmError> {
        self.fault_reason.as_ref()
    }

    /// The shared reference counter.
    pub fn reference_counter(&self) -> &Rc<RefCell<ReferenceCounter>> {
        &self.reference_counter
    }

    /// Items left on the result stack after `Halt`.
    pub fn result_stack(&self) -> &EvaluationStack {
        &self.result_stack
    }

    /// Sets the digest that `CHECKSIG`/`CHECKMULTISIG` verify against.
    pub fn set_container_digest(&mut self, digest: [u8; 32]) {
        self.container_digest = Some(digest);
    }

    /// The container digest, if one was provided.
    pub fn container_digest(&self) -> Option<&[u8; 32]> {
        self.container_digest.as_ref()
    }

    /// Invocation stack depth.
    pub fn invocation_depth(&self) -> usize {
        self.invocation_stack.len()
    }

    /// The executing context.
    pub fn current_context(&self) -> VmResult<&ExecutionContext> {
        self.invocation_stack
            .last()
            .ok_or(VmError::InvalidOperand("no execution context".into()))
    }

    /// The executing context, mutably.
    pub fn current_context_mut(&mut self) -> VmResult<&mut ExecutionContext> {
        self.invocation_stack
            .last_mut()
            .ok_or(VmError::InvalidOperand("no execution context".into()))
    }

    /// The context that will resume when the current one returns.
    pub fn calling_context(&self) -> Option<&ExecutionContext> {
        let len = self.invocation_stack.len();
        if len >= 2 {
            self.invocation_stack.get(len - 2)
        } else {
            None
        }
    }

    /// Loads a script as a new top-level context with its own stack.
    pub fn load_script(&mut self, script: Script, rv_count: i32) -> VmResult<&mut ExecutionContext> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::InvocationOverflow);
        }
        let context = ExecutionContext::new(script, rv_count, self.reference_counter.clone());
        self.invocation_stack.push(context);
        Ok(self.invocation_stack.last_mut().expect("just pushed"))
    }

    /// Pushes an already-built context (used by `CALL` handlers).
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::InvocationOverflow);
        }
        self.invocation_stack.push(context);
        Ok(())
    }

    /// Pushes onto the current context's evaluation stack.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        let context = self.current_context()?;
        context.with_stack(|stack| stack.push(item));
        Ok(())
    }

    /// Pops from the current context's evaluation stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        let context = self.current_context()?;
        context.with_stack(|stack| stack.pop())
    }

    /// Peeks `depth` items below the top of the current stack.
    pub fn peek(&self, depth: usize) -> VmResult<StackItem> {
        let context = self.current_context()?;
        context.with_stack(|stack| stack.peek(depth))
    }

    /// Pops an integer bounded by the engine's integer width.
    pub fn pop_integer(&mut self) -> VmResult<num_bigint::BigInt> {
        let item = self.pop()?;
        item.get_integer(self.limits.max_integer_size)
    }

    /// Pops a boolean.
    pub fn pop_boolean(&mut self) -> VmResult<bool> {
        Ok(self.pop()?.get_boolean())
    }

    /// Pops a byte-convertible item.
    pub fn pop_bytes(&mut self) -> VmResult<Vec<u8>> {
        self.pop()?.get_byte_array()
    }

    /// Charges `cost` gas, faulting when the budget is exceeded.
    pub fn add_gas(&mut self, cost: i64) -> VmResult<()> {
        let consumed = self.gas_consumed.saturating_add(cost);
        if consumed > self.gas_limit {
            return Err(VmError::OutOfGas {
                consumed: self.gas_consumed,
                cost,
                limit: self.gas_limit,
            });
        }
        self.gas_consumed = consumed;
        Ok(())
    }

    /// Moves the current context's instruction pointer to an absolute
    /// `position` and suppresses the automatic advance for this step.
    pub fn jump_to(&mut self, position: usize) -> VmResult<()> {
        let script_len = self.current_context()?.script().len();
        if position > script_len {
            return Err(VmError::InvalidOperand(format!(
                "jump target {position} outside script of {script_len} byte(s)"
            )));
        }
        self.current_context_mut()?.instruction_pointer = position;
        self.jumping = true;
        Ok(())
    }

    /// Resolves a relative jump offset against an instruction's position.
    pub fn checked_target(&self, instruction: &Instruction, offset: i32) -> VmResult<usize> {
        let base = instruction.pointer as i64;
        let target = base + offset as i64;
        let script_len = self.current_context()?.script().len() as i64;
        if target < 0 || target > script_len {
            return Err(VmError::InvalidOperand(format!(
                "jump offset {offset} leaves script bounds"
            )));
        }
        Ok(target as usize)
    }

    /// Marks that the current step moved the instruction pointer.
    pub fn set_jumping(&mut self) {
        self.jumping = true;
    }

    /// Raises a script-level exception and starts unwinding.
    pub fn throw(&mut self, exception: StackItem) -> VmResult<()> {
        self.uncaught_exception = Some(exception);
        self.handle_exception()
    }

    /// Runs to completion with no syscall services.
    pub fn execute(&mut self) -> VmState {
        self.execute_with(&mut NoSyscalls)
    }

    /// Runs to completion, routing syscalls through `router`.
    pub fn execute_with(&mut self, router: &mut dyn SyscallRouter) -> VmState {
        while self.state == VmState::None {
            self.step(router);
        }
        self.state
    }

    /// Executes a single instruction.
    fn step(&mut self, router: &mut dyn SyscallRouter) {
        if self.invocation_stack.is_empty() {
            self.state = VmState::Halt;
            return;
        }

        let depth = self.invocation_stack.len();
        self.jumping = false;

        let result = self.fetch_and_dispatch(router, depth);
        if let Err(error) = result {
            tracing::debug!(%error, "engine fault");
            self.fault_reason = Some(error);
            self.state = VmState::Fault;
        }
    }

    fn fetch_and_dispatch(&mut self, router: &mut dyn SyscallRouter, depth: usize) -> VmResult<()> {
        let instruction = match self.invocation_stack[depth - 1].current_instruction() {
            Some(decoded) => decoded?,
            // Running off the end of the script is an implicit RET.
            None => Instruction {
                pointer: self.invocation_stack[depth - 1].script().len(),
                opcode: OpCode::Ret,
                operand: Vec::new(),
                size: 0,
            },
        };

        self.add_gas(gas_table::opcode_price(instruction.opcode))?;

        if instruction.opcode == OpCode::Syscall {
            let id = instruction.operand_u32()?;
            router.on_syscall(self, id)?;
        } else {
            jump_table::dispatch(self, &instruction)?;
        }

        // The counter's post-instruction sweep doubles as the stack limit.
        let total = self.reference_counter.borrow_mut().check_zero_referred();
        if total > self.limits.max_stack_size {
            return Err(VmError::StackOverflow {
                count: total,
                limit: self.limits.max_stack_size,
            });
        }

        // Advance the captured frame unless it jumped or was unloaded.
        if !self.jumping && self.invocation_stack.len() >= depth {
            let context = &mut self.invocation_stack[depth - 1];
            context.instruction_pointer = instruction.pointer + instruction.size;
        }
        Ok(())
    }

    /// Unloads the current context for `RET`, moving return values to the
    /// caller (or the result stack when this was the last frame).
    pub fn unload_current_context(&mut self) -> VmResult<()> {
        let context = self
            .invocation_stack
            .pop()
            .ok_or(VmError::InvalidOperand("no context to unload".into()))?;

        let shares_stack = self
            .invocation_stack
            .last()
            .map(|caller| caller.shares_stack_with(&context))
            .unwrap_or(false);

        if !shares_stack {
            let stack_len = context.stack_len();
            if context.rv_count >= 0 && stack_len != context.rv_count as usize {
                return Err(VmError::InvalidOperand(format!(
                    "context returned {stack_len} item(s), declared {}",
                    context.rv_count
                )));
            }
            match self.invocation_stack.last() {
                Some(caller) => {
                    context.with_stack(|source| {
                        caller.with_stack(|target| {
                            for item in source_drain(source) {
                                target.push(item);
                            }
                        });
                    });
                }
                None => {
                    let result_stack = &mut self.result_stack;
                    context.with_stack(|source| {
                        for item in source_drain(source) {
                            result_stack.push(item);
                        }
                    });
                }
            }
        }
        if self.invocation_stack.is_empty() {
            self.state = VmState::Halt;
        }
        Ok(())
    }

    /// Routes the in-flight exception to the innermost receptive `TRY`
    /// region, running pending `finally` blocks on the way out.
    pub fn handle_exception(&mut self) -> VmResult<()> {
        let exception = self
            .uncaught_exception
            .clone()
            .ok_or(VmError::InvalidOperand("no exception in flight".into()))?;

        // Find the innermost try context that can catch or must finalize.
        let mut target: Option<(usize, usize, bool)> = None;
        'search: for ci in (0..self.invocation_stack.len()).rev() {
            let context = &self.invocation_stack[ci];
            for ti in (0..context.try_stack.len()).rev() {
                let try_ctx = &context.try_stack[ti];
                if try_ctx.can_catch() {
                    target = Some((ci, ti, true));
                    break 'search;
                }
                if try_ctx.finally_pointer.is_some() && try_ctx.state != TryState::Finally {
                    target = Some((ci, ti, false));
                    break 'search;
                }
            }
        }

        let Some((ci, ti, is_catch)) = target else {
            let message = describe_exception(&exception);
            return Err(VmError::UnhandledException(message));
        };

        // Drop every frame above the handler.
        while self.invocation_stack.len() > ci + 1 {
            self.invocation_stack.pop();
        }
        let context = &mut self.invocation_stack[ci];
        context.try_stack.truncate(ti + 1);

        if is_catch {
            let try_ctx = context.try_stack.last_mut().expect("kept above");
            try_ctx.state = TryState::Catch;
            let catch_pointer = try_ctx.catch_pointer.expect("can_catch checked");
            context.instruction_pointer = catch_pointer;
            context.with_stack(|stack| stack.push(exception));
            self.uncaught_exception = None;
        } else {
            let try_ctx = context.try_stack.last_mut().expect("kept above");
            try_ctx.state = TryState::Finally;
            let finally_pointer = try_ctx.finally_pointer.expect("checked above");
            context.instruction_pointer = finally_pointer;
            // The exception stays in flight; ENDFINALLY rethrows it.
        }
        self.jumping = true;
        Ok(())
    }

    /// Whether an exception is unwinding (set between THROW and its catch).
    pub fn has_uncaught_exception(&self) -> bool {
        self.uncaught_exception.is_some()
    }

    /// Takes the in-flight exception, if any (used by `ENDFINALLY`).
    pub fn continue_unwinding(&mut self) -> VmResult<()> {
        if self.uncaught_exception.is_some() {
            self.handle_exception()
        } else {
            Ok(())
        }
    }
}

/// Empties `stack` bottom-first so items arrive on the target in their
/// original order.
fn source_drain(stack: &mut EvaluationStack) -> Vec<StackItem> {
    let mut items = Vec::with_capacity(stack.len());
    while !stack.is_empty() {
        let bottom = stack.len() - 1;
        match stack.remove(bottom) {
            Ok(item) => items.push(item),
            Err(_) => break,
        }
    }
    items
}

fn describe_exception(exception: &StackItem) -> String {
    match exception.get_byte_array() {
        Ok(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => text.to_string(),
            Err(_) => hex::encode(&bytes),
        },
        Err(_) => exception.type_name().to_string(),
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
