//! The application engine: the VM plus chain state.

use crate::error::{ContractError, ContractResult};
use crate::interop;
use crate::notification::NotifyEventArgs;
use crate::trigger::TriggerType;
use oxneo_core::witness_rule::{WitnessContext, WitnessRuleAction};
use oxneo_core::{Signer, Transaction, UInt160, UInt256, WitnessScope};
use oxneo_persistence::StoreCache;
use oxneo_vm::{
    CallFlags, ExecutionEngine, Script, SyscallRouter, VmError, VmResult, VmState,
};

/// Gas cap for a single witness verification run (1.5 GAS).
pub const MAX_VERIFICATION_GAS: i64 = 150_000_000;

/// What the executing script belongs to.
pub enum Container {
    /// A transaction; `CheckWitness` consults its signers.
    Transaction(Transaction),
    /// A persisting block, for the OnPersist/PostPersist triggers.
    Block { hash: UInt256 },
    /// No container (ad-hoc invocations, tests, RPC `invokescript`).
    None,
}

impl Container {
    /// The hash signed by witnesses of this container.
    pub fn hash(&self) -> Option<UInt256> {
        match self {
            Container::Transaction(tx) => tx.hash().ok(),
            Container::Block { hash } => Some(*hash),
            Container::None => None,
        }
    }

    /// The signers, when the container is a transaction.
    pub fn signers(&self) -> &[Signer] {
        match self {
            Container::Transaction(tx) => &tx.signers,
            _ => &[],
        }
    }
}

/// One entry of the script-hash stack, tied to the VM frame that loaded
/// it.
struct Frame {
    /// Invocation depth at which this script was loaded; the frame dies
    /// when the VM unwinds below it.
    min_depth: usize,
    script_hash: UInt160,
    call_flags: CallFlags,
}

/// Chain-facing state the syscall handlers operate on. Split from the VM
/// so the engine and the host can be borrowed independently.
pub struct HostContext {
    /// The mutation-tracking view this execution writes into.
    pub snapshot: StoreCache,
    /// Why we are executing.
    pub trigger: TriggerType,
    /// The script's container.
    pub container: Container,
    /// Network magic, exposed to scripts.
    pub network_magic: u32,
    /// Persisting block timestamp (ms), exposed via `GetTime`.
    pub timestamp: u64,
    /// Chain height visible to this execution.
    pub height: u32,
    /// Notifications emitted so far.
    pub notifications: Vec<NotifyEventArgs>,
    frames: Vec<Frame>,
}

impl HostContext {
    /// Drops frames whose VM context has returned.
    fn sync_frames(&mut self, engine: &ExecutionEngine) {
        let depth = engine.invocation_depth();
        while self
            .frames
            .last()
            .map(|f| f.min_depth > depth)
            .unwrap_or(false)
        {
            self.frames.pop();
        }
    }

    /// The currently executing script's hash.
    pub fn current_script_hash(&self) -> Option<UInt160> {
        self.frames.last().map(|f| f.script_hash)
    }

    /// The hash of the script that called the current one.
    pub fn calling_script_hash(&self) -> Option<UInt160> {
        if self.frames.len() >= 2 {
            self.frames.get(self.frames.len() - 2).map(|f| f.script_hash)
        } else {
            None
        }
    }

    /// The entry script's hash.
    pub fn entry_script_hash(&self) -> Option<UInt160> {
        self.frames.first().map(|f| f.script_hash)
    }

    /// The current frame's capability flags.
    pub fn current_call_flags(&self) -> CallFlags {
        self.frames
            .last()
            .map(|f| f.call_flags)
            .unwrap_or(CallFlags::NONE)
    }

    /// Whether the current frame is the entry frame.
    pub fn is_entry(&self) -> bool {
        self.frames.len() == 1
    }

    fn push_frame(&mut self, min_depth: usize, script_hash: UInt160, call_flags: CallFlags) {
        self.frames.push(Frame {
            min_depth,
            script_hash,
            call_flags,
        });
    }

    /// Grows the script-hash stack for a `System.Contract.Call`.
    pub(crate) fn push_frame_for_call(
        &mut self,
        min_depth: usize,
        script_hash: UInt160,
        call_flags: CallFlags,
    ) {
        self.push_frame(min_depth, script_hash, call_flags);
    }

    /// Answers `System.Runtime.CheckWitness` for `hash`.
    ///
    /// True when the hash is already on the script-hash stack, or when a
    /// transaction signer matches and its scope admits the current calling
    /// context.
    pub fn check_witness(&self, hash: &UInt160) -> bool {
        if self.frames.iter().any(|f| f.script_hash == *hash) {
            return true;
        }
        let Some(signer) = self
            .container
            .signers()
            .iter()
            .find(|s| s.account == *hash)
        else {
            return false;
        };
        self.signer_scope_admits(signer)
    }

    fn signer_scope_admits(&self, signer: &Signer) -> bool {
        if signer.scopes.contains(WitnessScope::GLOBAL) {
            return true;
        }
        if signer.scopes.contains(WitnessScope::CALLED_BY_ENTRY) {
            // Valid in the entry context and in contracts it calls directly.
            let called_by_entry = self.calling_script_hash().is_some()
                && self.calling_script_hash() == self.entry_script_hash();
            if self.is_entry() || called_by_entry {
                return true;
            }
        }
        if signer.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            if let Some(current) = self.current_script_hash() {
                if signer.allowed_contracts.contains(&current) {
                    return true;
                }
            }
        }
        if signer.scopes.contains(WitnessScope::WITNESS_RULES) {
            let current = self.current_script_hash();
            let calling = self.calling_script_hash();
            let ctx = WitnessContext {
                current_script_hash: current.as_ref(),
                calling_script_hash: calling.as_ref(),
                is_entry: self.is_entry(),
            };
            for rule in &signer.rules {
                if rule.condition.matches(&ctx) {
                    return rule.action == WitnessRuleAction::Allow;
                }
            }
        }
        false
    }
}

impl SyscallRouter for HostContext {
    fn on_syscall(&mut self, engine: &mut ExecutionEngine, id: u32) -> VmResult<()> {
        self.sync_frames(engine);
        let descriptor = interop::descriptor(id).ok_or(VmError::UnknownSyscall(id))?;
        if !self.current_call_flags().contains(descriptor.required_flags) {
            return Err(VmError::MissingCallFlags(id));
        }
        engine.add_gas(descriptor.price)?;
        (descriptor.handler)(self, engine)
    }
}

/// The VM wired to chain state for one invocation.
pub struct ApplicationEngine {
    vm: ExecutionEngine,
    host: HostContext,
}

impl ApplicationEngine {
    /// Creates an engine over `snapshot` with the given budget.
    pub fn new(
        trigger: TriggerType,
        container: Container,
        snapshot: StoreCache,
        gas_limit: i64,
        network_magic: u32,
        height: u32,
        timestamp: u64,
    ) -> Self {
        let mut vm = ExecutionEngine::new();
        vm.set_gas_limit(gas_limit);
        if let Some(hash) = container.hash() {
            vm.set_container_digest(*hash.as_bytes());
        }
        Self {
            vm,
            host: HostContext {
                snapshot,
                trigger,
                container,
                network_magic,
                timestamp,
                height,
                notifications: Vec::new(),
                frames: Vec::new(),
            },
        }
    }

    /// Loads a script as a new top-level context with the given flags.
    pub fn load_script(&mut self, script: Vec<u8>, call_flags: CallFlags) -> ContractResult<()> {
        let script_hash = UInt160::from_script(&script);
        self.vm.load_script(Script::new(script), -1)?;
        let depth = self.vm.invocation_depth();
        self.host.push_frame(depth, script_hash, call_flags);
        Ok(())
    }

    /// Runs to completion.
    pub fn execute(&mut self) -> VmState {
        let state = self.vm.execute_with(&mut self.host);
        self.host.sync_frames(&self.vm);
        state
    }

    /// The VM state after [`ApplicationEngine::execute`].
    pub fn state(&self) -> VmState {
        self.vm.state()
    }

    /// Gas consumed so far.
    pub fn gas_consumed(&self) -> i64 {
        self.vm.gas_consumed()
    }

    /// Why the engine faulted, when it did.
    pub fn fault_reason(&self) -> Option<String> {
        self.vm.fault_reason().map(|e| e.to_string())
    }

    /// Items on the result stack after a halt.
    pub fn result_stack(&self) -> &oxneo_vm::evaluation_stack::EvaluationStack {
        self.vm.result_stack()
    }

    /// Notifications emitted during execution.
    pub fn notifications(&self) -> &[NotifyEventArgs] {
        &self.host.notifications
    }

    /// Direct access to the underlying VM (tests, syscall plumbing).
    pub fn vm_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.vm
    }

    /// Direct access to the host context.
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    /// Tears the engine down into its store cache and notifications; the
    /// caller folds the cache into the block pipeline on success.
    pub fn into_parts(self) -> (StoreCache, Vec<NotifyEventArgs>) {
        (self.host.snapshot, self.host.notifications)
    }

    /// Runs one witness of a signed payload under the Verification
    /// trigger: verification script first on the invocation stack, then
    /// the invocation script on top so its outputs feed the verification
    /// run. Returns the gas spent, or an error describing the failure.
    pub fn verify_witness(
        container: Container,
        snapshot: StoreCache,
        verification_script: &[u8],
        invocation_script: &[u8],
        gas_limit: i64,
        network_magic: u32,
        height: u32,
    ) -> ContractResult<i64> {
        let mut engine = ApplicationEngine::new(
            TriggerType::Verification,
            container,
            snapshot,
            gas_limit.min(MAX_VERIFICATION_GAS),
            network_magic,
            height,
            0,
        );
        engine.load_script(verification_script.to_vec(), CallFlags::READ_ONLY)?;
        if !invocation_script.is_empty() {
            engine.load_script(invocation_script.to_vec(), CallFlags::NONE)?;
        }
        let state = engine.execute();
        if state != VmState::Halt {
            return Err(ContractError::NativeFailure(format!(
                "witness verification faulted: {}",
                engine.fault_reason().unwrap_or_default()
            )));
        }
        if engine.result_stack().len() != 1 {
            return Err(ContractError::NativeFailure(format!(
                "witness verification left {} results",
                engine.result_stack().len()
            )));
        }
        let truthy = engine
            .result_stack()
            .peek(0)
            .map(|item| item.get_boolean())
            .unwrap_or(false);
        if !truthy {
            return Err(ContractError::NativeFailure(
                "witness verification returned false".into(),
            ));
        }
        Ok(engine.gas_consumed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_persistence::{MemoryStore, Store};

    fn fresh_cache() -> StoreCache {
        StoreCache::new(MemoryStore::new().snapshot())
    }

    #[test]
    fn plain_script_executes() {
        let mut engine = ApplicationEngine::new(
            TriggerType::Application,
            Container::None,
            fresh_cache(),
            10_000_000,
            0x4e45,
            0,
            0,
        );
        engine
            .load_script(vec![0x11, 0x12, 0x9e], CallFlags::ALL)
            .unwrap();
        assert_eq!(engine.execute(), VmState::Halt);
        assert_eq!(
            engine.result_stack().peek(0).unwrap().get_integer(32).unwrap(),
            3.into()
        );
        assert!(engine.gas_consumed() > 0);
    }

    #[test]
    fn push1_witness_verifies() {
        // The trivial witness: empty invocation, verification = PUSH1.
        let gas = ApplicationEngine::verify_witness(
            Container::None,
            fresh_cache(),
            &[0x11],
            &[],
            10_000_000,
            0x4e45,
            0,
        )
        .unwrap();
        assert!(gas > 0);
    }

    #[test]
    fn pushf_witness_fails() {
        let result = ApplicationEngine::verify_witness(
            Container::None,
            fresh_cache(),
            &[0x09],
            &[],
            10_000_000,
            0x4e45,
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn witness_with_extra_results_fails() {
        let result = ApplicationEngine::verify_witness(
            Container::None,
            fresh_cache(),
            &[0x11, 0x11],
            &[],
            10_000_000,
            0x4e45,
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn check_witness_sees_transaction_signers() {
        let account = UInt160::from_bytes([7u8; 20]);
        let tx = Transaction {
            signers: vec![Signer::global(account)],
            script: vec![0x11],
            witnesses: vec![Default::default()],
            ..Default::default()
        };
        let mut engine = ApplicationEngine::new(
            TriggerType::Application,
            Container::Transaction(tx),
            fresh_cache(),
            10_000_000,
            0x4e45,
            0,
            0,
        );
        engine.load_script(vec![0x11], CallFlags::ALL).unwrap();
        assert!(engine.host().check_witness(&account));
        assert!(!engine.host().check_witness(&UInt160::zero()));
    }
}
