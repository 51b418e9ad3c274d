// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::cbor::encode_cbor;
use charta_core::serde::{deserialize_hex, serialize_hex};
use charta_core::{ID_LEN, InstanceId, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Named argument of an instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,

    #[serde(serialize_with = "serialize_hex", deserialize_with = "deserialize_hex")]
    pub value: Vec<u8>,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The two kinds of state changes a ledger accepts: spawning a new instance of
/// a contract or invoking a command on an existing instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Spawn { contract: String, args: Vec<Argument> },
    Invoke { command: String, args: Vec<Argument> },
}

impl Operation {
    pub fn args(&self) -> &[Argument] {
        match self {
            Operation::Spawn { args, .. } => args,
            Operation::Invoke { args, .. } => args,
        }
    }

    /// Value of the argument with the given name, if present.
    pub fn arg(&self, name: &str) -> Option<&[u8]> {
        self.args()
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| arg.value.as_slice())
    }
}

/// A single proposed state change, targeting one ledger instance.
///
/// Instructions are the unit everything else is derived from: signatures are
/// made over the instruction digest and identifiers of spawned instances are
/// derived from the digest of the instruction which spawned them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Instance this instruction operates on. For spawns this is the instance
    /// of the document governing the spawn.
    pub target: InstanceId,

    pub operation: Operation,

    /// Submission counters of the signing identities, in signature order.
    pub signer_counters: Vec<u64>,
}

impl Instruction {
    pub fn spawn(target: InstanceId, contract: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            target,
            operation: Operation::Spawn {
                contract: contract.into(),
                args,
            },
            signer_counters: Vec::new(),
        }
    }

    pub fn invoke(target: InstanceId, command: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            target,
            operation: Operation::Invoke {
                command: command.into(),
                args,
            },
            signer_counters: Vec::new(),
        }
    }

    pub fn with_counters(mut self, counters: Vec<u64>) -> Self {
        self.signer_counters = counters;
        self
    }

    /// Digest of the CBOR encoding of this instruction, the payload all
    /// signatures are made over.
    pub fn digest(&self) -> [u8; ID_LEN] {
        let bytes = encode_cbor(self)
            // All fields of an instruction are plain data, if CBOR still fails
            // something is badly broken.
            .expect("CBOR encoder failed due to a critical IO error");
        *InstanceId::derive(&bytes).as_bytes()
    }

    /// Deterministic identifier of the instance this instruction spawns.
    pub fn derived_id(&self) -> InstanceId {
        InstanceId::derive(self.digest())
    }
}

/// A signature over an instruction digest by one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub signer: PublicKey,
    pub signature: Signature,
}

/// A signed submission unit: one instruction plus the signatures authorizing
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub instruction: Instruction,
    pub signatures: Vec<TransactionSignature>,
}

impl Transaction {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            signatures: Vec::new(),
        }
    }

    /// Append a signature over the instruction digest.
    ///
    /// Must be called after the signer counters are set, the digest covers
    /// them.
    pub fn sign(&mut self, private_key: &PrivateKey) {
        let digest = self.instruction.digest();
        self.signatures.push(TransactionSignature {
            signer: private_key.public_key(),
            signature: private_key.sign(&digest),
        });
    }

    /// Whether every attached signature verifies against the instruction
    /// digest.
    pub fn verify(&self) -> bool {
        let digest = self.instruction.digest();
        !self.signatures.is_empty()
            && self
                .signatures
                .iter()
                .all(|entry| entry.signer.verify(&digest, &entry.signature))
    }
}

#[cfg(test)]
mod tests {
    use charta_core::{InstanceId, PrivateKey};

    use super::{Argument, Instruction, Transaction};

    fn sample_instruction() -> Instruction {
        Instruction::spawn(
            InstanceId::derive(b"scope"),
            "document",
            vec![Argument::new("name", b"Project A".to_vec())],
        )
        .with_counters(vec![1])
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(sample_instruction().digest(), sample_instruction().digest());
    }

    #[test]
    fn digest_covers_counters() {
        let a = sample_instruction();
        let b = sample_instruction().with_counters(vec![2]);
        assert_ne!(a.digest(), b.digest());
        assert_ne!(a.derived_id(), b.derived_id());
    }

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let mut tx = Transaction::new(sample_instruction());
        assert!(!tx.verify());

        tx.sign(&private_key);
        assert!(tx.verify());

        // Tampering with the instruction invalidates the signature.
        tx.instruction.signer_counters = vec![99];
        assert!(!tx.verify());
    }

    #[test]
    fn arg_lookup() {
        let instruction = sample_instruction();
        assert_eq!(
            instruction.operation.arg("name"),
            Some(b"Project A".as_slice())
        );
        assert_eq!(instruction.operation.arg("missing"), None);
    }
}
