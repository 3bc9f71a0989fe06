//! on-chain call arguments
//!
//! abi layouts match the miner contract. hashes and roots travel as bytes32,
//! indices and amounts as uint256.

use alloy_primitives::{keccak256, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};
use serde::{Deserialize, Serialize};

use crate::field::{address_to_field, word_to_u256};

sol! {
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct RewardExtData {
        address relayer;
        bytes encryptedAccount;
    }

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct WithdrawExtData {
        uint256 fee;
        address recipient;
        address relayer;
        bytes encryptedAccount;
    }

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct AccountUpdate {
        bytes32 inputRoot;
        bytes32 inputNullifierHash;
        bytes32 outputRoot;
        uint256 outputPathIndices;
        bytes32 outputCommitment;
    }

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct RewardArgs {
        uint256 rate;
        uint256 fee;
        address instance;
        bytes32 rewardNullifier;
        bytes32 extDataHash;
        bytes32 depositRoot;
        bytes32 withdrawalRoot;
        RewardExtData extData;
        AccountUpdate account;
    }

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct WithdrawArgs {
        uint256 amount;
        bytes32 extDataHash;
        WithdrawExtData extData;
        AccountUpdate account;
    }

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct TreeUpdateArgs {
        bytes32 oldRoot;
        bytes32 newRoot;
        bytes32 leaf;
        uint256 pathIndices;
    }

    interface IMiner {
        function reward(bytes _proof, RewardArgs _args) external;
        function reward(bytes _proof, RewardArgs _args, bytes _treeUpdateProof, TreeUpdateArgs _treeUpdateArgs) external;
        function withdraw(bytes _proof, WithdrawArgs _args) external;
        function withdraw(bytes _proof, WithdrawArgs _args, bytes _treeUpdateProof, TreeUpdateArgs _treeUpdateArgs) external;
    }
}

/// keccak256 with the top byte cleared so the digest fits the snark field
pub fn masked_keccak(data: &[u8]) -> B256 {
    let mut hash = keccak256(data);
    hash.0[0] = 0;
    hash
}

impl RewardExtData {
    pub fn hash(&self) -> B256 {
        masked_keccak(&SolValue::abi_encode(self))
    }
}

impl WithdrawExtData {
    pub fn hash(&self) -> B256 {
        masked_keccak(&SolValue::abi_encode(self))
    }
}

impl RewardArgs {
    /// reward circuit public signals, in circuit order
    pub fn public_inputs(&self) -> Vec<U256> {
        vec![
            self.rate,
            self.fee,
            address_to_field(self.instance),
            word_to_u256(self.rewardNullifier),
            word_to_u256(self.extDataHash),
            word_to_u256(self.account.inputRoot),
            word_to_u256(self.account.inputNullifierHash),
            word_to_u256(self.account.outputRoot),
            self.account.outputPathIndices,
            word_to_u256(self.account.outputCommitment),
            word_to_u256(self.depositRoot),
            word_to_u256(self.withdrawalRoot),
        ]
    }
}

impl WithdrawArgs {
    /// withdraw circuit public signals, in circuit order
    pub fn public_inputs(&self) -> Vec<U256> {
        vec![
            self.amount,
            word_to_u256(self.extDataHash),
            word_to_u256(self.account.inputRoot),
            word_to_u256(self.account.inputNullifierHash),
            word_to_u256(self.account.outputRoot),
            self.account.outputPathIndices,
            word_to_u256(self.account.outputCommitment),
        ]
    }
}

impl TreeUpdateArgs {
    pub fn public_inputs(&self) -> Vec<U256> {
        vec![
            word_to_u256(self.oldRoot),
            word_to_u256(self.newRoot),
            word_to_u256(self.leaf),
            self.pathIndices,
        ]
    }
}

/// recovery witness bridging a one-step stale account root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeUpdateProof {
    pub proof: Bytes,
    pub args: TreeUpdateArgs,
}

/// calldata for `Miner.reward`, with the recovery overload when a witness is present
pub fn encode_reward_call(proof: &Bytes, args: &RewardArgs, tree_update: Option<&TreeUpdateProof>) -> Bytes {
    let data = match tree_update {
        None => IMiner::reward_0Call {
            _proof: proof.clone(),
            _args: args.clone(),
        }
        .abi_encode(),
        Some(update) => IMiner::reward_1Call {
            _proof: proof.clone(),
            _args: args.clone(),
            _treeUpdateProof: update.proof.clone(),
            _treeUpdateArgs: update.args.clone(),
        }
        .abi_encode(),
    };
    Bytes::from(data)
}

/// calldata for `Miner.withdraw`
pub fn encode_withdraw_call(
    proof: &Bytes,
    args: &WithdrawArgs,
    tree_update: Option<&TreeUpdateProof>,
) -> Bytes {
    let data = match tree_update {
        None => IMiner::withdraw_0Call {
            _proof: proof.clone(),
            _args: args.clone(),
        }
        .abi_encode(),
        Some(update) => IMiner::withdraw_1Call {
            _proof: proof.clone(),
            _args: args.clone(),
            _treeUpdateProof: update.proof.clone(),
            _treeUpdateArgs: update.args.clone(),
        }
        .abi_encode(),
    };
    Bytes::from(data)
}
