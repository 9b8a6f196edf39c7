//! Contract execution layer.
//!
//! The bytecode interpreter itself is a drop-in collaborator behind the
//! [`Interpreter`] trait (Ethereum London semantics are assumed of real
//! implementations). What the chain owns is the *contract interface*:
//! deterministic address derivation, code and storage persistence, and
//! synchronization of balances and nonces with the ledger. That lives in
//! [`EvmAdapter`].

use std::collections::BTreeMap;

use crate::config::ContractConfig;
use crate::types::Address;

pub mod adapter;

pub use adapter::{CallOutcome, DeployOutcome, EvmAdapter};

/// One 32-byte EVM storage word.
pub type StorageWord = [u8; 32];

/// Contract storage: 32-byte key → 32-byte value.
pub type ContractStorage = BTreeMap<StorageWord, StorageWord>;

/// A contract-creation message handed to the interpreter.
pub struct CreateMessage<'a> {
    pub sender: Address,
    /// The address the contract will live at.
    pub create_address: Address,
    /// Init code (constructor); its return value is the runtime code.
    pub code: &'a [u8],
    /// ABI-encoded constructor arguments.
    pub data: &'a [u8],
    pub value: u64,
    pub gas_limit: u64,
}

/// A contract-call message handed to the interpreter.
pub struct CallMessage<'a> {
    pub sender: Address,
    pub contract: Address,
    /// Runtime code of the callee.
    pub code: &'a [u8],
    /// Call data (selector + arguments).
    pub data: &'a [u8],
    pub value: u64,
    pub gas_limit: u64,
}

/// Result of one interpreter execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmOutcome {
    pub success: bool,
    pub output: Vec<u8>,
    pub gas_used: u64,
    pub error: Option<String>,
}

impl VmOutcome {
    pub fn success(output: Vec<u8>, gas_used: u64) -> Self {
        Self {
            success: true,
            output,
            gas_used,
            error: None,
        }
    }

    pub fn failure(gas_used: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Vec::new(),
            gas_used,
            error: Some(error.into()),
        }
    }
}

/// Bytecode execution seam.
///
/// Implementations must be deterministic: the same message and storage
/// must produce the same outcome on every node, or state roots diverge.
pub trait Interpreter: Send {
    /// Executes init code; on success `output` is the runtime code to
    /// store at the new address.
    fn create(&mut self, msg: &CreateMessage<'_>, storage: &mut ContractStorage) -> VmOutcome;

    /// Executes a call against deployed runtime code.
    fn call(&mut self, msg: &CallMessage<'_>, storage: &mut ContractStorage) -> VmOutcome;
}

/// Placeholder interpreter for nodes built without a full EVM.
///
/// Deployment stores the init code verbatim as runtime code; calls
/// return empty output. Gas follows the flat deploy/call estimate
/// formulas, so fee accounting still behaves realistically. Useful for
/// tests and for isolating the chain while a real interpreter is wired
/// in.
#[derive(Clone, Debug)]
pub struct StaticCodeInterpreter {
    deploy_base_gas: u64,
    deploy_per_byte: u64,
    call_base_gas: u64,
    call_per_byte: u64,
}

impl StaticCodeInterpreter {
    pub fn new(contracts: &ContractConfig) -> Self {
        Self {
            deploy_base_gas: contracts.deploy_base_gas,
            deploy_per_byte: contracts.deploy_per_byte,
            call_base_gas: contracts.call_base_gas,
            call_per_byte: contracts.call_per_byte,
        }
    }
}

impl Default for StaticCodeInterpreter {
    fn default() -> Self {
        Self::new(&ContractConfig::default())
    }
}

impl Interpreter for StaticCodeInterpreter {
    fn create(&mut self, msg: &CreateMessage<'_>, _storage: &mut ContractStorage) -> VmOutcome {
        let gas = self.deploy_base_gas + msg.code.len() as u64 * self.deploy_per_byte;
        if gas > msg.gas_limit {
            return VmOutcome::failure(msg.gas_limit, "out of gas");
        }
        VmOutcome::success(msg.code.to_vec(), gas)
    }

    fn call(&mut self, msg: &CallMessage<'_>, _storage: &mut ContractStorage) -> VmOutcome {
        let gas = self.call_base_gas + msg.data.len() as u64 * self.call_per_byte;
        if gas > msg.gas_limit {
            return VmOutcome::failure(msg.gas_limit, "out of gas");
        }
        VmOutcome::success(Vec::new(), gas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_msg<'a>(code: &'a [u8], gas_limit: u64) -> CreateMessage<'a> {
        CreateMessage {
            sender: Address([1u8; 20]),
            create_address: Address([2u8; 20]),
            code,
            data: &[],
            value: 0,
            gas_limit,
        }
    }

    #[test]
    fn static_interpreter_returns_code_as_runtime() {
        let mut vm = StaticCodeInterpreter::default();
        let code = vec![0x60, 0x80, 0x60, 0x40];
        let mut storage = ContractStorage::new();

        let outcome = vm.create(&create_msg(&code, 1_000_000), &mut storage);
        assert!(outcome.success);
        assert_eq!(outcome.output, code);
        assert_eq!(outcome.gas_used, 32_000 + 4 * 200);
    }

    #[test]
    fn static_interpreter_enforces_gas_limit() {
        let mut vm = StaticCodeInterpreter::default();
        let code = vec![0u8; 100];
        let mut storage = ContractStorage::new();

        let outcome = vm.create(&create_msg(&code, 10), &mut storage);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("out of gas"));
    }

    #[test]
    fn call_gas_scales_with_calldata() {
        let mut vm = StaticCodeInterpreter::default();
        let mut storage = ContractStorage::new();
        let data = vec![0xaa; 4];
        let msg = CallMessage {
            sender: Address([1u8; 20]),
            contract: Address([2u8; 20]),
            code: &[0x60],
            data: &data,
            value: 0,
            gas_limit: 1_000_000,
        };
        let outcome = vm.call(&msg, &mut storage);
        assert!(outcome.success);
        assert_eq!(outcome.gas_used, 21_000 + 4 * 68);
    }
}
