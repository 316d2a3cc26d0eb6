//! Per-invocation execution state.

use crate::evaluation_stack::EvaluationStack;
use crate::instruction::Instruction;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::slot::Slot;
use crate::try_context::TryContext;
use std::cell::RefCell;
use std::rc::Rc;

/// State shared between a context and the contexts it spawns with `CALL`:
/// the script, the evaluation stack and the static field slot.
#[derive(Debug)]
pub struct SharedStates {
    pub script: Script,
    pub evaluation_stack: RefCell<EvaluationStack>,
    pub static_fields: RefCell<Option<Slot>>,
}

/// One frame of the invocation stack.
///
/// `CALL` frames share their parent's evaluation stack and static fields;
/// locals, arguments and the try stack are always frame-local.
#[derive(Debug)]
pub struct ExecutionContext {
    shared: Rc<SharedStates>,
    /// Position of the next instruction to execute.
    pub instruction_pointer: usize,
    /// Items this frame returns; -1 returns the whole stack.
    pub rv_count: i32,
    /// Local variable slot, populated by `INITSLOT`.
    pub local_variables: Option<Slot>,
    /// Argument slot, populated by `INITSLOT`.
    pub arguments: Option<Slot>,
    /// Active `TRY` regions, innermost last.
    pub try_stack: Vec<TryContext>,
}

impl ExecutionContext {
    /// Creates a frame for a freshly loaded script with its own stack.
    pub fn new(script: Script, rv_count: i32, counter: Rc<RefCell<ReferenceCounter>>) -> Self {
        Self {
            shared: Rc::new(SharedStates {
                script,
                evaluation_stack: RefCell::new(EvaluationStack::new(counter)),
                static_fields: RefCell::new(None),
            }),
            instruction_pointer: 0,
            rv_count,
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
        }
    }

    /// Creates a `CALL` frame at `position` sharing this frame's script,
    /// evaluation stack and static fields.
    pub fn clone_at(&self, position: usize) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            instruction_pointer: position,
            rv_count: -1,
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
        }
    }

    /// The frame's script.
    pub fn script(&self) -> &Script {
        &self.shared.script
    }

    /// The shared state handle; used to detect stack sharing on unload.
    pub fn shared(&self) -> &Rc<SharedStates> {
        &self.shared
    }

    /// Whether this frame shares its evaluation stack with `other`.
    pub fn shares_stack_with(&self, other: &ExecutionContext) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Decodes the instruction at the current pointer. `None` past the end
    /// of the script, which the engine treats as an implicit `RET`.
    pub fn current_instruction(&self) -> Option<crate::error::VmResult<Instruction>> {
        if self.instruction_pointer >= self.shared.script.len() {
            return None;
        }
        Some(Instruction::decode(
            self.shared.script.as_bytes(),
            self.instruction_pointer,
        ))
    }

    /// Runs `f` with mutable access to the evaluation stack.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut EvaluationStack) -> R) -> R {
        f(&mut self.shared.evaluation_stack.borrow_mut())
    }

    /// Number of items on the evaluation stack.
    pub fn stack_len(&self) -> usize {
        self.shared.evaluation_stack.borrow().len()
    }
}
