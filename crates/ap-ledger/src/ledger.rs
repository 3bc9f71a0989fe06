//! reward/withdraw verification state machine
//!
//! single writer. every call either passes all checks and commits, or
//! mutates nothing. committed state:
//! - reward nullifiers (one per note)
//! - account nullifiers (one per consumed account)
//! - account root history, `account_roots[k]` = root after k insertions

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes, B256, U256};
use ap_core::field::u256_to_word;
use ap_core::{
    AccountEvent, AccountUpdate, Circuit, MemoryEventLog, MerkleTree, ProofVerifier, RateUpdate,
    Rates, RewardArgs, TreeUpdateProof, WithdrawArgs, RANGE_LIMIT, TREE_HEIGHT,
};
use tracing::{debug, info, warn};

use crate::error::{Rejection, Result};
use crate::trees::TreeRoots;

/// payout released by a successful withdraw; the transfer itself is external
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub account: AccountEvent,
    pub recipient: Address,
    pub recipient_amount: U256,
    pub relayer: Address,
    pub fee: U256,
}

pub struct Ledger<V, T> {
    verifier: V,
    trees: T,
    rates: Rates,
    capacity: u64,
    account_nullifiers: HashSet<B256>,
    reward_nullifiers: HashSet<B256>,
    account_roots: Vec<B256>,
    log: MemoryEventLog,
}

impl<V: ProofVerifier, T: TreeRoots> Ledger<V, T> {
    pub fn new(verifier: V, trees: T, log: MemoryEventLog) -> ap_core::Result<Self> {
        Self::with_height(verifier, trees, log, TREE_HEIGHT)
    }

    pub fn with_height(
        verifier: V,
        trees: T,
        log: MemoryEventLog,
        height: usize,
    ) -> ap_core::Result<Self> {
        let empty = MerkleTree::new(height)?;
        Ok(Self {
            verifier,
            trees,
            rates: Rates::new(),
            capacity: empty.capacity() as u64,
            account_nullifiers: HashSet::new(),
            reward_nullifiers: HashSet::new(),
            account_roots: vec![u256_to_word(empty.root())],
            log,
        })
    }

    pub fn set_rates(&mut self, updates: &[RateUpdate]) {
        for update in updates {
            info!(instance = %update.instance, rate = %update.value, "rate updated");
        }
        self.rates.set_rates(updates);
    }

    pub fn rate(&self, instance: Address) -> U256 {
        self.rates.rate(instance)
    }

    pub fn rates(&self) -> &Rates {
        &self.rates
    }

    pub fn trees(&self) -> &T {
        &self.trees
    }

    pub fn trees_mut(&mut self) -> &mut T {
        &mut self.trees
    }

    pub fn log(&self) -> &MemoryEventLog {
        &self.log
    }

    pub fn account_count(&self) -> u64 {
        self.account_roots.len() as u64 - 1
    }

    pub fn current_root(&self) -> B256 {
        self.account_roots[self.account_roots.len() - 1]
    }

    /// root after `count` insertions
    pub fn account_root(&self, count: u64) -> Option<B256> {
        self.account_roots.get(count as usize).copied()
    }

    pub fn is_reward_spent(&self, reward_nullifier: B256) -> bool {
        self.reward_nullifiers.contains(&reward_nullifier)
    }

    pub fn is_account_spent(&self, nullifier_hash: B256) -> bool {
        self.account_nullifiers.contains(&nullifier_hash)
    }

    pub fn reward(
        &mut self,
        proof: &[u8],
        args: &RewardArgs,
        tree_update: Option<&TreeUpdateProof>,
    ) -> Result<AccountEvent> {
        self.check_reward(proof, args, tree_update)
            .inspect_err(|e| warn!(error = %e, "reward rejected"))?;

        self.reward_nullifiers.insert(args.rewardNullifier);
        let event = self.commit(&args.account, tree_update, &args.extData.encryptedAccount);
        info!(
            index = event.index,
            instance = %args.instance,
            fee = %args.fee,
            "reward accepted"
        );
        Ok(event)
    }

    fn check_reward(
        &self,
        proof: &[u8],
        args: &RewardArgs,
        tree_update: Option<&TreeUpdateProof>,
    ) -> Result<()> {
        if self.reward_nullifiers.contains(&args.rewardNullifier) {
            return Err(Rejection::AlreadySpent);
        }
        if args.extDataHash != args.extData.hash() {
            return Err(Rejection::IncorrectExtDataHash);
        }
        if args.instance == Address::ZERO
            || args.rate.is_zero()
            || args.rate != self.rates.rate(args.instance)
        {
            return Err(Rejection::InvalidRewardRate);
        }
        if args.fee >= RANGE_LIMIT {
            return Err(Rejection::FeeOutOfRange);
        }
        if !self.trees.is_known_deposit_root(args.depositRoot) {
            return Err(Rejection::InvalidRoot { tree: "deposit" });
        }
        if !self.trees.is_known_withdrawal_root(args.withdrawalRoot) {
            return Err(Rejection::InvalidRoot { tree: "withdrawal" });
        }
        self.validate_account_update(&args.account, tree_update)?;

        if !self
            .verifier
            .verify(Circuit::Reward, proof, &args.public_inputs())
        {
            return Err(Rejection::InvalidRewardProof);
        }
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        proof: &[u8],
        args: &WithdrawArgs,
        tree_update: Option<&TreeUpdateProof>,
    ) -> Result<WithdrawReceipt> {
        self.check_withdraw(proof, args, tree_update)
            .inspect_err(|e| warn!(error = %e, "withdraw rejected"))?;

        let account = self.commit(&args.account, tree_update, &args.extData.encryptedAccount);
        let receipt = WithdrawReceipt {
            account,
            recipient: args.extData.recipient,
            recipient_amount: args.amount - args.extData.fee,
            relayer: args.extData.relayer,
            fee: args.extData.fee,
        };
        info!(
            index = receipt.account.index,
            recipient = %receipt.recipient,
            amount = %receipt.recipient_amount,
            fee = %receipt.fee,
            "withdraw accepted"
        );
        Ok(receipt)
    }

    fn check_withdraw(
        &self,
        proof: &[u8],
        args: &WithdrawArgs,
        tree_update: Option<&TreeUpdateProof>,
    ) -> Result<()> {
        self.validate_account_update(&args.account, tree_update)?;
        if args.extDataHash != args.extData.hash() {
            return Err(Rejection::IncorrectExtDataHash);
        }
        if args.amount >= RANGE_LIMIT {
            return Err(Rejection::AmountOutOfRange);
        }
        if !self
            .verifier
            .verify(Circuit::Withdraw, proof, &args.public_inputs())
        {
            return Err(Rejection::InvalidWithdrawProof);
        }
        if args.amount < args.extData.fee {
            return Err(Rejection::InsufficientAmountForFee);
        }
        Ok(())
    }

    /// freshness, insert position and the one-step recovery bridge
    fn validate_account_update(
        &self,
        account: &AccountUpdate,
        tree_update: Option<&TreeUpdateProof>,
    ) -> Result<()> {
        if self.account_nullifiers.contains(&account.inputNullifierHash) {
            return Err(Rejection::OutdatedAccountState);
        }
        let count = self.account_count();
        if count >= self.capacity {
            return Err(Rejection::AccountTreeFull);
        }

        if account.inputRoot == self.current_root() {
            if account.outputPathIndices != U256::from(count) {
                return Err(Rejection::IncorrectAccountInsertIndex);
            }
            return Ok(());
        }

        let Some(update) = tree_update else {
            return Err(Rejection::OutdatedAccountMerkleRoot);
        };
        if update.args.oldRoot != self.current_root() {
            return Err(Rejection::OutdatedTreeUpdateMerkleRoot);
        }
        // only the root right before the current one can be bridged
        let previous = count.checked_sub(1);
        let bridged = previous.is_some_and(|prev| {
            account.outputPathIndices == U256::from(prev)
                && self.account_root(prev) == Some(account.inputRoot)
        });
        if !bridged {
            return Err(Rejection::OutdatedAccountMerkleRoot);
        }
        if update.args.leaf != account.outputCommitment {
            return Err(Rejection::IncorrectCommitmentInserted);
        }
        if update.args.pathIndices != U256::from(count) {
            return Err(Rejection::IncorrectAccountInsertIndex);
        }
        if !self.verifier.verify(
            Circuit::TreeUpdate,
            &update.proof,
            &update.args.public_inputs(),
        ) {
            return Err(Rejection::InvalidTreeUpdateProof);
        }
        debug!(count, "stale account root bridged by tree update");
        Ok(())
    }

    fn commit(
        &mut self,
        account: &AccountUpdate,
        tree_update: Option<&TreeUpdateProof>,
        encrypted_account: &Bytes,
    ) -> AccountEvent {
        self.account_nullifiers.insert(account.inputNullifierHash);
        let new_root = match tree_update {
            Some(update) if account.inputRoot != self.current_root() => update.args.newRoot,
            _ => account.outputRoot,
        };
        self.account_roots.push(new_root);
        self.log.push_account(
            account.outputCommitment,
            account.inputNullifierHash,
            encrypted_account.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trees::MemoryTrees;
    use ap_core::proof::digest::{digest_proof, DigestVerifier};
    use ap_core::{RewardExtData, TreeUpdateArgs, WithdrawExtData};

    const HEIGHT: usize = 6;

    struct Fixture {
        ledger: Ledger<DigestVerifier, MemoryTrees>,
        instance: Address,
    }

    fn fixture() -> Fixture {
        let log = MemoryEventLog::new();
        let trees = MemoryTrees::new(log.clone(), HEIGHT).unwrap();
        let mut ledger = Ledger::with_height(DigestVerifier, trees, log, HEIGHT).unwrap();
        let instance = Address::repeat_byte(0x11);
        ledger.set_rates(&[RateUpdate {
            instance,
            value: U256::from(10u8),
        }]);
        Fixture { ledger, instance }
    }

    /// structurally valid args against the ledger's current state
    fn reward_args(f: &Fixture, seed: u8) -> RewardArgs {
        let ext = RewardExtData {
            relayer: Address::ZERO,
            encryptedAccount: Bytes::from(vec![seed; 8]),
        };
        RewardArgs {
            rate: U256::from(10u8),
            fee: U256::ZERO,
            instance: f.instance,
            rewardNullifier: B256::repeat_byte(seed),
            extDataHash: ext.hash(),
            depositRoot: f.ledger.trees().deposit_root(),
            withdrawalRoot: f.ledger.trees().withdrawal_root(),
            extData: ext,
            account: AccountUpdate {
                inputRoot: f.ledger.current_root(),
                inputNullifierHash: B256::repeat_byte(seed.wrapping_add(100)),
                outputRoot: B256::repeat_byte(seed.wrapping_add(50)),
                outputPathIndices: U256::from(f.ledger.account_count()),
                outputCommitment: B256::repeat_byte(seed.wrapping_add(150)),
            },
        }
    }

    fn prove(args: &RewardArgs) -> Bytes {
        digest_proof(Circuit::Reward, &args.public_inputs())
    }

    #[test]
    fn test_reward_then_replay() {
        let mut f = fixture();
        let args = reward_args(&f, 1);
        let event = f.ledger.reward(&prove(&args), &args, None).unwrap();
        assert_eq!(event.index, 0);
        assert_eq!(f.ledger.account_count(), 1);
        assert_eq!(f.ledger.current_root(), args.account.outputRoot);
        assert!(f.ledger.is_account_spent(args.account.inputNullifierHash));

        let err = f.ledger.reward(&prove(&args), &args, None).unwrap_err();
        assert_eq!(err, Rejection::AlreadySpent);
        assert_eq!(f.ledger.log().accounts_since(0).len(), 1);
    }

    #[test]
    fn test_rate_checks() {
        let f = fixture();
        let mut args = reward_args(&f, 2);
        args.rate = U256::from(11u8);
        assert_eq!(
            f.ledger.check_reward(&prove(&args), &args, None),
            Err(Rejection::InvalidRewardRate)
        );
        args.rate = U256::from(10u8);
        args.instance = Address::ZERO;
        assert_eq!(
            f.ledger.check_reward(&prove(&args), &args, None),
            Err(Rejection::InvalidRewardRate)
        );
    }

    #[test]
    fn test_unknown_roots_rejected() {
        let f = fixture();
        let mut args = reward_args(&f, 3);
        args.depositRoot = B256::repeat_byte(0xde);
        assert_eq!(
            f.ledger.check_reward(&prove(&args), &args, None),
            Err(Rejection::InvalidRoot { tree: "deposit" })
        );
        let mut args = reward_args(&f, 3);
        args.withdrawalRoot = B256::repeat_byte(0xde);
        assert_eq!(
            f.ledger.check_reward(&prove(&args), &args, None),
            Err(Rejection::InvalidRoot { tree: "withdrawal" })
        );
    }

    #[test]
    fn test_insert_index_tampering() {
        let mut f = fixture();
        let first = reward_args(&f, 4);
        f.ledger.reward(&prove(&first), &first, None).unwrap();

        for bad in [U256::ZERO, U256::from(2u8), U256::from(1u64 << 40)] {
            let mut args = reward_args(&f, 5);
            args.account.outputPathIndices = bad;
            assert_eq!(
                f.ledger.check_reward(&prove(&args), &args, None),
                Err(Rejection::IncorrectAccountInsertIndex),
                "index {}",
                bad
            );
        }
    }

    #[test]
    fn test_fee_range_boundaries() {
        let f = fixture();
        for (fee, ok) in [
            (RANGE_LIMIT - U256::from(1u8), true),
            (RANGE_LIMIT, false),
            (U256::MAX, false),
        ] {
            let mut args = reward_args(&f, 6);
            args.fee = fee;
            let result = f.ledger.check_reward(&prove(&args), &args, None);
            if ok {
                assert_eq!(result, Ok(()));
            } else {
                assert_eq!(result, Err(Rejection::FeeOutOfRange));
            }
        }
    }

    #[test]
    fn test_bad_proof_mutates_nothing() {
        let mut f = fixture();
        let args = reward_args(&f, 7);
        let err = f.ledger.reward(&[0u8; 32], &args, None).unwrap_err();
        assert_eq!(err, Rejection::InvalidRewardProof);
        assert_eq!(f.ledger.account_count(), 0);
        assert!(!f.ledger.is_reward_spent(args.rewardNullifier));
        assert!(!f.ledger.is_account_spent(args.account.inputNullifierHash));
    }

    fn bridge(f: &Fixture, args: &RewardArgs, new_root: B256) -> TreeUpdateProof {
        let update = TreeUpdateArgs {
            oldRoot: f.ledger.current_root(),
            newRoot: new_root,
            leaf: args.account.outputCommitment,
            pathIndices: U256::from(f.ledger.account_count()),
        };
        TreeUpdateProof {
            proof: digest_proof(Circuit::TreeUpdate, &update.public_inputs()),
            args: update,
        }
    }

    #[test]
    fn test_one_step_stale_is_bridged() {
        let mut f = fixture();
        let stale = reward_args(&f, 10);
        let first = reward_args(&f, 11);
        f.ledger.reward(&prove(&first), &first, None).unwrap();

        let err = f.ledger.reward(&prove(&stale), &stale, None).unwrap_err();
        assert_eq!(err, Rejection::OutdatedAccountMerkleRoot);

        let update = bridge(&f, &stale, B256::repeat_byte(0xab));
        let event = f.ledger.reward(&prove(&stale), &stale, Some(&update)).unwrap();
        assert_eq!(event.index, 1);
        assert_eq!(f.ledger.current_root(), B256::repeat_byte(0xab));
        assert_eq!(f.ledger.account_root(1), Some(first.account.outputRoot));
    }

    #[test]
    fn test_two_step_stale_is_rejected() {
        let mut f = fixture();
        let stale = reward_args(&f, 20);
        let first = reward_args(&f, 21);
        f.ledger.reward(&prove(&first), &first, None).unwrap();
        let outdated_update = bridge(&f, &stale, B256::repeat_byte(0xac));
        let second = reward_args(&f, 22);
        f.ledger.reward(&prove(&second), &second, None).unwrap();

        assert_eq!(
            f.ledger.check_reward(&prove(&stale), &stale, Some(&outdated_update)),
            Err(Rejection::OutdatedTreeUpdateMerkleRoot)
        );
        let fresh_update = bridge(&f, &stale, B256::repeat_byte(0xad));
        assert_eq!(
            f.ledger.check_reward(&prove(&stale), &stale, Some(&fresh_update)),
            Err(Rejection::OutdatedAccountMerkleRoot)
        );
    }

    #[test]
    fn test_bridge_tampering() {
        let mut f = fixture();
        let stale = reward_args(&f, 30);
        let first = reward_args(&f, 31);
        f.ledger.reward(&prove(&first), &first, None).unwrap();

        let mut update = bridge(&f, &stale, B256::repeat_byte(0xae));
        update.args.leaf = B256::repeat_byte(0x01);
        assert_eq!(
            f.ledger.check_reward(&prove(&stale), &stale, Some(&update)),
            Err(Rejection::IncorrectCommitmentInserted)
        );

        let mut update = bridge(&f, &stale, B256::repeat_byte(0xae));
        update.args.pathIndices = U256::from(5u8);
        assert_eq!(
            f.ledger.check_reward(&prove(&stale), &stale, Some(&update)),
            Err(Rejection::IncorrectAccountInsertIndex)
        );

        let mut update = bridge(&f, &stale, B256::repeat_byte(0xae));
        update.args.newRoot = B256::repeat_byte(0xaf);
        assert_eq!(
            f.ledger.check_reward(&prove(&stale), &stale, Some(&update)),
            Err(Rejection::InvalidTreeUpdateProof)
        );
    }

    fn withdraw_args(f: &Fixture, amount: U256, fee: U256) -> WithdrawArgs {
        let ext = WithdrawExtData {
            fee,
            recipient: Address::repeat_byte(0xbe),
            relayer: Address::repeat_byte(0xef),
            encryptedAccount: Bytes::from(vec![9u8; 4]),
        };
        WithdrawArgs {
            amount,
            extDataHash: ext.hash(),
            extData: ext,
            account: AccountUpdate {
                inputRoot: f.ledger.current_root(),
                inputNullifierHash: B256::repeat_byte(0x77),
                outputRoot: B256::repeat_byte(0x78),
                outputPathIndices: U256::from(f.ledger.account_count()),
                outputCommitment: B256::repeat_byte(0x79),
            },
        }
    }

    #[test]
    fn test_withdraw_amount_checks() {
        let mut f = fixture();
        for (amount, expected) in [
            (RANGE_LIMIT, Err(Rejection::AmountOutOfRange)),
            (U256::MAX, Err(Rejection::AmountOutOfRange)),
            (U256::from(5u8), Err(Rejection::InsufficientAmountForFee)),
        ] {
            let args = withdraw_args(&f, amount, U256::from(6u8));
            let proof = digest_proof(Circuit::Withdraw, &args.public_inputs());
            assert_eq!(f.ledger.check_withdraw(&proof, &args, None), expected);
        }

        let args = withdraw_args(&f, RANGE_LIMIT - U256::from(1u8), U256::from(6u8));
        let proof = digest_proof(Circuit::Withdraw, &args.public_inputs());
        let receipt = f.ledger.withdraw(&proof, &args, None).unwrap();
        assert_eq!(receipt.recipient_amount, RANGE_LIMIT - U256::from(7u8));
        assert_eq!(receipt.fee, U256::from(6u8));

        // same account state again
        let err = f.ledger.withdraw(&proof, &args, None).unwrap_err();
        assert_eq!(err, Rejection::OutdatedAccountState);
    }

    #[test]
    fn test_withdraw_ext_data_tampering() {
        let f = fixture();
        let mut args = withdraw_args(&f, U256::from(10u8), U256::ZERO);
        args.extDataHash = B256::ZERO;
        let proof = digest_proof(Circuit::Withdraw, &args.public_inputs());
        assert_eq!(
            f.ledger.check_withdraw(&proof, &args, None),
            Err(Rejection::IncorrectExtDataHash)
        );
    }
}
