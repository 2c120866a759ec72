//! # Encrypted Call Model
//!
//! A UEI task names an arbitrary external call whose every component is a
//! ciphertext: the decoder that interprets it, the target contract, the
//! function selector and each argument. Only the attached native `value`
//! and the deadline are public.

use serde::{Deserialize, Serialize};
use veil_core::{Address, Amount, CiphertextHandle, EncryptedInput, Plaintext, TaskId, Timestamp};

/// The call description as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCall {
    /// Encrypted decoder address.
    pub decoder: EncryptedInput,
    /// Encrypted target address.
    pub target: EncryptedInput,
    /// Encrypted 4-byte selector.
    pub selector: EncryptedInput,
    /// Encrypted arguments in call order.
    pub args: Vec<EncryptedInput>,
}

impl EncryptedCall {
    /// Every input in decrypt order: decoder, target, selector, then args.
    pub fn inputs(&self) -> impl Iterator<Item = &EncryptedInput> {
        [&self.decoder, &self.target, &self.selector]
            .into_iter()
            .chain(self.args.iter())
    }

    /// Handles in decrypt order.
    pub fn handles(&self) -> Vec<CiphertextHandle> {
        self.inputs().map(|i| i.handle).collect()
    }

    /// Number of ciphertexts in the call.
    pub fn handle_count(&self) -> usize {
        3 + self.args.len()
    }
}

/// A decrypted task, as fed to plan building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedTask {
    /// Ledger-assigned task id.
    pub task_id: TaskId,
    /// Submitting account.
    pub submitter: Address,
    /// Decoder contract.
    pub decoder: Address,
    /// Call target.
    pub target: Address,
    /// Function selector.
    pub selector: [u8; 4],
    /// Arguments in call order.
    pub args: Vec<Plaintext>,
    /// Native value attached to the call.
    pub value: Amount,
    /// Latest acceptable execution reference time.
    pub deadline: Timestamp,
}

impl DecryptedTask {
    /// Rebuild a task from plaintexts laid out in [`EncryptedCall::inputs`]
    /// order. Returns `None` when the components have the wrong kinds.
    pub fn from_plaintexts(
        task_id: TaskId,
        submitter: Address,
        value: Amount,
        deadline: Timestamp,
        plaintexts: &[Plaintext],
    ) -> Option<Self> {
        let [decoder, target, selector, args @ ..] = plaintexts else {
            return None;
        };
        Some(Self {
            task_id,
            submitter,
            decoder: decoder.as_address()?,
            target: target.as_address()?,
            selector: selector.as_selector()?,
            args: args.to_vec(),
            value,
            deadline,
        })
    }
}

/// ABI-style encoding: `selector ‖ word(arg_0) ‖ word(arg_1) ‖ …`.
///
/// Each argument is one 32-byte big-endian word; addresses are left-padded.
/// Returns `None` if an argument is itself a selector.
pub fn encode_calldata(selector: [u8; 4], args: &[Plaintext]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(4 + 32 * args.len());
    out.extend_from_slice(&selector);
    for arg in args {
        out.extend_from_slice(&encode_word(arg)?);
    }
    Some(out)
}

fn encode_word(arg: &Plaintext) -> Option<[u8; 32]> {
    let mut word = [0u8; 32];
    match arg {
        Plaintext::Uint(v) => word[24..].copy_from_slice(&v.to_be_bytes()),
        Plaintext::Address(a) => word[12..].copy_from_slice(&a.0),
        Plaintext::Selector(_) => return None,
    }
    Some(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::sha256_raw;

    #[test]
    fn calldata_is_selector_then_words() {
        let to = Address([0x11; 20]);
        let data =
            encode_calldata([0xa9, 0x05, 0x9c, 0xbb], &[Plaintext::Address(to), Plaintext::Uint(258)])
                .unwrap();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], &[0x11; 20]);
        assert_eq!(&data[36..66], &[0u8; 30]);
        assert_eq!(&data[66..], &[0x01, 0x02]);
    }

    #[test]
    fn selector_argument_rejected() {
        assert!(encode_calldata([0; 4], &[Plaintext::Selector([1; 4])]).is_none());
    }

    #[test]
    fn task_rebuilt_from_plaintexts() {
        let id = TaskId(sha256_raw(&[b"t"]));
        let deadline = Timestamp::from_epoch_secs(10).unwrap();
        let plain = [
            Plaintext::Address(Address([1; 20])),
            Plaintext::Address(Address([2; 20])),
            Plaintext::Selector([3; 4]),
            Plaintext::Uint(9),
        ];
        let task = DecryptedTask::from_plaintexts(id, Address([0; 20]), 0, deadline, &plain).unwrap();
        assert_eq!(task.target, Address([2; 20]));
        assert_eq!(task.args, vec![Plaintext::Uint(9)]);

        assert!(DecryptedTask::from_plaintexts(id, Address([0; 20]), 0, deadline, &plain[..2])
            .is_none());
        let swapped = [plain[2], plain[1], plain[0]];
        assert!(DecryptedTask::from_plaintexts(id, Address([0; 20]), 0, deadline, &swapped)
            .is_none());
    }
}
