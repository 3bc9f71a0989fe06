//! circuit inputs
//!
//! signal names and layout are what the circom circuits were compiled
//! against: every value a decimal string, path elements as arrays, path
//! indices packed into one integer.

use alloy_primitives::{Address, B256, U256};
use ap_core::field::{address_to_field, word_to_u256};
use ap_core::{Circuit, MerklePath};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// one field element, rendered as a decimal string
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signal(pub U256);

impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10)
            .map(Signal)
            .map_err(serde::de::Error::custom)
    }
}

impl From<U256> for Signal {
    fn from(value: U256) -> Self {
        Signal(value)
    }
}

impl From<u64> for Signal {
    fn from(value: u64) -> Self {
        Signal(U256::from(value))
    }
}

impl From<B256> for Signal {
    fn from(value: B256) -> Self {
        Signal(word_to_u256(value))
    }
}

impl From<Address> for Signal {
    fn from(value: Address) -> Self {
        Signal(address_to_field(value))
    }
}

fn elements(path: &MerklePath) -> Vec<Signal> {
    path.elements.iter().copied().map(Signal).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardInputs {
    pub rate: Signal,
    pub fee: Signal,
    pub instance: Signal,
    pub reward_nullifier: Signal,
    pub ext_data_hash: Signal,

    pub note_secret: Signal,
    pub note_nullifier: Signal,

    pub input_amount: Signal,
    pub input_secret: Signal,
    pub input_nullifier: Signal,
    pub input_root: Signal,
    pub input_path_elements: Vec<Signal>,
    pub input_path_indices: Signal,
    pub input_nullifier_hash: Signal,

    pub output_amount: Signal,
    pub output_secret: Signal,
    pub output_nullifier: Signal,
    pub output_root: Signal,
    pub output_path_indices: Signal,
    pub output_path_elements: Vec<Signal>,
    pub output_commitment: Signal,

    pub deposit_block: Signal,
    pub deposit_root: Signal,
    pub deposit_path_indices: Signal,
    pub deposit_path_elements: Vec<Signal>,

    pub withdrawal_block: Signal,
    pub withdrawal_root: Signal,
    pub withdrawal_path_indices: Signal,
    pub withdrawal_path_elements: Vec<Signal>,
}

impl RewardInputs {
    pub fn public_inputs(&self) -> Vec<U256> {
        [
            self.rate,
            self.fee,
            self.instance,
            self.reward_nullifier,
            self.ext_data_hash,
            self.input_root,
            self.input_nullifier_hash,
            self.output_root,
            self.output_path_indices,
            self.output_commitment,
            self.deposit_root,
            self.withdrawal_root,
        ]
        .map(|s| s.0)
        .to_vec()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawInputs {
    /// withdrawn amount plus relayer fee
    pub amount: Signal,
    pub ext_data_hash: Signal,

    pub input_amount: Signal,
    pub input_secret: Signal,
    pub input_nullifier: Signal,
    pub input_nullifier_hash: Signal,
    pub input_root: Signal,
    pub input_path_indices: Signal,
    pub input_path_elements: Vec<Signal>,

    pub output_amount: Signal,
    pub output_secret: Signal,
    pub output_nullifier: Signal,
    pub output_root: Signal,
    pub output_path_indices: Signal,
    pub output_path_elements: Vec<Signal>,
    pub output_commitment: Signal,
}

impl WithdrawInputs {
    pub fn public_inputs(&self) -> Vec<U256> {
        [
            self.amount,
            self.ext_data_hash,
            self.input_root,
            self.input_nullifier_hash,
            self.output_root,
            self.output_path_indices,
            self.output_commitment,
        ]
        .map(|s| s.0)
        .to_vec()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeUpdateInputs {
    pub old_root: Signal,
    pub new_root: Signal,
    pub leaf: Signal,
    pub path_indices: Signal,
    pub path_elements: Vec<Signal>,
}

impl TreeUpdateInputs {
    pub fn public_inputs(&self) -> Vec<U256> {
        [self.old_root, self.new_root, self.leaf, self.path_indices]
            .map(|s| s.0)
            .to_vec()
    }
}

/// path side of the input/output slots
pub(crate) fn path_signals(path: &MerklePath) -> (Signal, Vec<Signal>) {
    (Signal::from(path.indices), elements(path))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CircuitInputs {
    Reward(RewardInputs),
    Withdraw(WithdrawInputs),
    TreeUpdate(TreeUpdateInputs),
}

impl CircuitInputs {
    pub fn circuit(&self) -> Circuit {
        match self {
            CircuitInputs::Reward(_) => Circuit::Reward,
            CircuitInputs::Withdraw(_) => Circuit::Withdraw,
            CircuitInputs::TreeUpdate(_) => Circuit::TreeUpdate,
        }
    }

    /// public signals in circuit order
    pub fn public_inputs(&self) -> Vec<U256> {
        match self {
            CircuitInputs::Reward(i) => i.public_inputs(),
            CircuitInputs::Withdraw(i) => i.public_inputs(),
            CircuitInputs::TreeUpdate(i) => i.public_inputs(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn tree_update() -> TreeUpdateInputs {
        TreeUpdateInputs {
            old_root: Signal::from(1u64),
            new_root: Signal::from(2u64),
            leaf: Signal::from(3u64),
            path_indices: Signal::from(5u64),
            path_elements: vec![Signal::from(7u64); 3],
        }
    }

    #[test]
    fn test_json_uses_circuit_signal_names() {
        let json: Value =
            serde_json::from_str(&CircuitInputs::TreeUpdate(tree_update()).to_json().unwrap())
                .unwrap();
        assert_eq!(json["oldRoot"], "1");
        assert_eq!(json["pathIndices"], "5");
        assert_eq!(json["pathElements"][2], "7");
        assert!(json.get("old_root").is_none());
    }

    #[test]
    fn test_large_values_stay_decimal() {
        let s = Signal(U256::MAX);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, format!("\"{}\"", U256::MAX));
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_address_signal() {
        let s = Signal::from(Address::repeat_byte(0xff));
        assert_eq!(s.0.bit_len(), 160);
    }

    #[test]
    fn test_path_signals_pack_indices() {
        let path = MerklePath {
            elements: vec![U256::from(1u8), U256::from(2u8)],
            indices: 0b10,
        };
        let (indices, elements) = path_signals(&path);
        assert_eq!(indices, Signal::from(2u64));
        assert_eq!(elements.len(), 2);
        assert_eq!(CircuitInputs::TreeUpdate(tree_update()).circuit(), Circuit::TreeUpdate);
    }
}
