//! Stack-manipulation handlers.

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::stack_item::{item_to_index, StackItem};

/// `DEPTH`: push the item count.
pub fn depth(engine: &mut ExecutionEngine) -> VmResult<()> {
    let depth = engine.current_context()?.stack_len();
    engine.push(StackItem::from_int(depth as i64))
}

/// `DROP`.
pub fn drop_top(engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.pop().map(|_| ())
}

/// `NIP`: remove the item under the top.
pub fn nip(engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = engine.current_context()?;
    context.with_stack(|stack| stack.remove(1)).map(|_| ())
}

/// `XDROP`: pop `n`, remove the item `n` deep.
pub fn xdrop(engine: &mut ExecutionEngine) -> VmResult<()> {
    let n = item_to_index(&engine.pop()?, usize::MAX >> 1)?;
    let context = engine.current_context()?;
    context.with_stack(|stack| stack.remove(n)).map(|_| ())
}

/// `CLEAR`: empty the evaluation stack.
pub fn clear(engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = engine.current_context()?;
    context.with_stack(|stack| stack.clear());
    Ok(())
}

/// `DUP`.
pub fn dup(engine: &mut ExecutionEngine) -> VmResult<()> {
    let top = engine.peek(0)?;
    engine.push(top)
}

/// `OVER`: copy the second item to the top.
pub fn over(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.peek(1)?;
    engine.push(item)
}

/// `PICK`: pop `n`, copy the item `n` deep to the top.
pub fn pick(engine: &mut ExecutionEngine) -> VmResult<()> {
    let n = item_to_index(&engine.pop()?, usize::MAX >> 1)?;
    let item = engine.peek(n)?;
    engine.push(item)
}

/// `TUCK`: copy the top under the second item.
pub fn tuck(engine: &mut ExecutionEngine) -> VmResult<()> {
    let top = engine.peek(0)?;
    let context = engine.current_context()?;
    context.with_stack(|stack| stack.insert(2, top))
}

/// `SWAP`.
pub fn swap(engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = engine.current_context()?;
    let item = context.with_stack(|stack| stack.remove(1))?;
    engine.push(item)
}

/// `ROT`: move the third item to the top.
pub fn rot(engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = engine.current_context()?;
    let item = context.with_stack(|stack| stack.remove(2))?;
    engine.push(item)
}

/// `ROLL`: pop `n`, move the item `n` deep to the top.
pub fn roll(engine: &mut ExecutionEngine) -> VmResult<()> {
    let n = item_to_index(&engine.pop()?, usize::MAX >> 1)?;
    if n == 0 {
        return Ok(());
    }
    let context = engine.current_context()?;
    let item = context.with_stack(|stack| stack.remove(n))?;
    engine.push(item)
}

/// `REVERSE3` / `REVERSE4`.
pub fn reverse_n(engine: &mut ExecutionEngine, n: usize) -> VmResult<()> {
    let context = engine.current_context()?;
    context.with_stack(|stack| stack.reverse(n))
}

/// `REVERSEN`: pop `n`, reverse the top `n`.
pub fn reverse_top(engine: &mut ExecutionEngine) -> VmResult<()> {
    let n = item_to_index(&engine.pop()?, usize::MAX >> 1)?;
    let context = engine.current_context()?;
    context.with_stack(|stack| stack.reverse(n))
}
