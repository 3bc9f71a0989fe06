//! proof orchestrator
//!
//! turns an account plus a note (reward) or an amount (withdraw) into
//! circuit inputs, gets them proven and assembles the on-chain arguments.
//! every proof is built against the account root this controller last saw;
//! if someone else inserts first the ledger answers with a staleness
//! rejection and [`Controller::tree_update`] produces the bridging proof.

use std::future::Future;

use alloy_primitives::{Address, Bytes, I256, U256};
use ap_core::args::{encode_reward_call, encode_withdraw_call};
use ap_core::field::{address_to_field, u256_to_word};
use ap_core::{
    poseidon_hash, Account, AccountUpdate, CoreError, EncryptionPublicKey, EventKind,
    InsertTranscript, MerkleTree, Note, Rates, RewardArgs, RewardExtData, TreeUpdateArgs,
    TreeUpdateProof, WithdrawArgs, WithdrawExtData, TREE_HEIGHT,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::forest::{Forest, SyncReport};
use crate::inputs::{path_signals, CircuitInputs, RewardInputs, TreeUpdateInputs, WithdrawInputs};
use crate::prover::Prover;
use crate::source::EventSource;

/// where the per-instance AP rate comes from
pub trait RateSource {
    fn rate(&self, instance: Address) -> impl Future<Output = Result<U256>>;
}

impl RateSource for Rates {
    async fn rate(&self, instance: Address) -> Result<U256> {
        Ok(Rates::rate(self, instance))
    }
}

impl<R: RateSource> RateSource for &R {
    fn rate(&self, instance: Address) -> impl Future<Output = Result<U256>> {
        (**self).rate(instance)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_tree_height")]
    pub tree_height: usize,
}

fn default_tree_height() -> usize {
    TREE_HEIGHT
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tree_height: TREE_HEIGHT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RewardRequest {
    pub account: Account,
    pub note: Note,
    pub public_key: EncryptionPublicKey,
    pub fee: U256,
    pub relayer: Address,
}

#[derive(Clone, Debug)]
pub struct WithdrawRequest {
    pub account: Account,
    pub amount: U256,
    pub recipient: Address,
    pub public_key: EncryptionPublicKey,
    pub fee: U256,
    pub relayer: Address,
}

#[derive(Clone, Debug)]
pub struct RewardProof {
    pub proof: Bytes,
    pub args: RewardArgs,
    /// the account this claim creates
    pub account: Account,
    pub encrypted_account: Bytes,
}

impl RewardProof {
    pub fn calldata(&self, tree_update: Option<&TreeUpdateProof>) -> Bytes {
        encode_reward_call(&self.proof, &self.args, tree_update)
    }
}

#[derive(Clone, Debug)]
pub struct WithdrawProof {
    pub proof: Bytes,
    pub args: WithdrawArgs,
    pub account: Account,
}

impl WithdrawProof {
    pub fn calldata(&self, tree_update: Option<&TreeUpdateProof>) -> Bytes {
        encode_withdraw_call(&self.proof, &self.args, tree_update)
    }
}

fn signed(value: U256) -> Result<I256> {
    I256::try_from(value).map_err(|_| CoreError::Overflow(format!("{} exceeds i256", value)).into())
}

fn account_update(transcript: &InsertTranscript, input: &Account) -> AccountUpdate {
    AccountUpdate {
        inputRoot: u256_to_word(transcript.old_root),
        inputNullifierHash: u256_to_word(input.nullifier_hash),
        outputRoot: u256_to_word(transcript.new_root),
        outputPathIndices: U256::from(transcript.index),
        outputCommitment: u256_to_word(transcript.leaf),
    }
}

/// balance after claiming `note` at `rate`, minus the relayer fee
pub fn reward_amount(account: &Account, note: &Note, rate: U256, fee: U256) -> Result<I256> {
    if note.withdrawal_block < note.deposit_block {
        return Err(ClientError::InvalidNoteInterval {
            deposit_block: note.deposit_block,
            withdrawal_block: note.withdrawal_block,
        });
    }
    let interval = I256::try_from(note.withdrawal_block - note.deposit_block)
        .map_err(|e| CoreError::Overflow(e.to_string()))?;
    let accrued = signed(rate)?
        .checked_mul(interval)
        .ok_or_else(|| CoreError::Overflow("rate * interval".into()))?;
    let amount = signed(account.amount)?
        .checked_add(accrued)
        .and_then(|v| v.checked_sub(signed(fee).ok()?))
        .ok_or_else(|| CoreError::Overflow("reward amount".into()))?;
    Ok(amount)
}

pub struct Controller<S, P, R> {
    source: S,
    prover: P,
    rates: R,
    forest: Forest,
}

impl<S: EventSource, P: Prover, R: RateSource> Controller<S, P, R> {
    pub fn new(source: S, prover: P, rates: R, config: ControllerConfig) -> Result<Self> {
        Ok(Self {
            source,
            prover,
            rates,
            forest: Forest::new(config.tree_height)?,
        })
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn sync(&mut self) -> Result<SyncReport> {
        self.forest.sync(&self.source).await
    }

    pub async fn resync(&mut self) -> Result<SyncReport> {
        self.forest.resync(&self.source).await
    }

    /// claim AP for one note into `request.account`
    pub async fn reward(&mut self, request: RewardRequest) -> Result<RewardProof> {
        self.sync().await?;
        let mut accounts = self.forest.accounts().clone();
        self.prove_reward(request, &mut accounts).await
    }

    /// chain several claims, each consuming the account the previous one
    /// created. all proofs target the same synced tree plus the earlier
    /// outputs, so they must be submitted in order
    pub async fn batch_reward(
        &mut self,
        account: Account,
        notes: &[Note],
        public_key: EncryptionPublicKey,
        fee: U256,
        relayer: Address,
    ) -> Result<Vec<RewardProof>> {
        self.sync().await?;
        let mut accounts = self.forest.accounts().clone();
        let mut current = account;
        let mut proofs = Vec::with_capacity(notes.len());
        for note in notes {
            let request = RewardRequest {
                account: current,
                note: note.clone(),
                public_key,
                fee,
                relayer,
            };
            let proof = self.prove_reward(request, &mut accounts).await?;
            current = proof.account.clone();
            proofs.push(proof);
        }
        info!(count = proofs.len(), "batch reward prepared");
        Ok(proofs)
    }

    async fn prove_reward(
        &self,
        request: RewardRequest,
        accounts: &mut MerkleTree,
    ) -> Result<RewardProof> {
        let RewardRequest {
            account,
            note,
            public_key,
            fee,
            relayer,
        } = request;

        let rate = self.rates.rate(note.instance).await?;
        let new_amount = reward_amount(&account, &note, rate, fee)?;
        let new_account = Account::new(new_amount, None, None)?;

        let deposit_leaf = poseidon_hash(&[
            address_to_field(note.instance),
            note.commitment,
            U256::from(note.deposit_block),
        ])?;
        let deposit_index = self
            .forest
            .deposits()
            .index_of(deposit_leaf)
            .ok_or(ClientError::NoteNotFound {
                kind: EventKind::Deposit,
            })?;
        let deposit_path = self.forest.deposits().path(deposit_index)?;

        let withdrawal_leaf = poseidon_hash(&[
            address_to_field(note.instance),
            note.nullifier_hash,
            U256::from(note.withdrawal_block),
        ])?;
        let withdrawal_index = self
            .forest
            .withdrawals()
            .index_of(withdrawal_leaf)
            .ok_or(ClientError::NoteNotFound {
                kind: EventKind::Withdrawal,
            })?;
        let withdrawal_path = self.forest.withdrawals().path(withdrawal_index)?;

        let input_path = accounts
            .membership(account.commitment)?
            .circuit_path(accounts.height());
        let transcript = accounts.insert(new_account.commitment)?;

        let encrypted_account = new_account.encrypt(&public_key)?;
        let ext_data = RewardExtData {
            relayer,
            encryptedAccount: encrypted_account.clone(),
        };
        let ext_data_hash = ext_data.hash();

        let (input_path_indices, input_path_elements) = path_signals(&input_path);
        let (output_path_indices, output_path_elements) = path_signals(&transcript.path);
        let (deposit_path_indices, deposit_path_elements) = path_signals(&deposit_path);
        let (withdrawal_path_indices, withdrawal_path_elements) = path_signals(&withdrawal_path);
        let inputs = RewardInputs {
            rate: rate.into(),
            fee: fee.into(),
            instance: note.instance.into(),
            reward_nullifier: note.reward_nullifier.into(),
            ext_data_hash: ext_data_hash.into(),
            note_secret: note.secret.into(),
            note_nullifier: note.nullifier.into(),
            input_amount: account.amount.into(),
            input_secret: account.secret.into(),
            input_nullifier: account.nullifier.into(),
            input_root: transcript.old_root.into(),
            input_path_elements,
            input_path_indices,
            input_nullifier_hash: account.nullifier_hash.into(),
            output_amount: new_account.amount.into(),
            output_secret: new_account.secret.into(),
            output_nullifier: new_account.nullifier.into(),
            output_root: transcript.new_root.into(),
            output_path_indices,
            output_path_elements,
            output_commitment: new_account.commitment.into(),
            deposit_block: note.deposit_block.into(),
            deposit_root: self.forest.deposits().root().into(),
            deposit_path_indices,
            deposit_path_elements,
            withdrawal_block: note.withdrawal_block.into(),
            withdrawal_root: self.forest.withdrawals().root().into(),
            withdrawal_path_indices,
            withdrawal_path_elements,
        };

        let args = RewardArgs {
            rate,
            fee,
            instance: note.instance,
            rewardNullifier: u256_to_word(note.reward_nullifier),
            extDataHash: ext_data_hash,
            depositRoot: u256_to_word(self.forest.deposits().root()),
            withdrawalRoot: u256_to_word(self.forest.withdrawals().root()),
            extData: ext_data,
            account: account_update(&transcript, &account),
        };
        debug!(
            deposit_index,
            withdrawal_index,
            insert_index = transcript.index,
            "reward witness assembled"
        );

        let proof = self.prover.prove(&CircuitInputs::Reward(inputs)).await?;
        info!(
            instance = %note.instance,
            %rate,
            amount = %new_account.amount,
            insert_index = transcript.index,
            "reward proof ready"
        );
        Ok(RewardProof {
            proof,
            args,
            account: new_account,
            encrypted_account,
        })
    }

    /// move `amount` out of `request.account`, paying `fee` to the relayer
    pub async fn withdraw(&mut self, request: WithdrawRequest) -> Result<WithdrawProof> {
        self.sync().await?;
        let WithdrawRequest {
            account,
            amount,
            recipient,
            public_key,
            fee,
            relayer,
        } = request;

        let public_amount = amount
            .checked_add(fee)
            .ok_or_else(|| CoreError::Overflow("amount + fee".into()))?;
        let new_amount = signed(account.amount)?
            .checked_sub(signed(public_amount)?)
            .ok_or_else(|| CoreError::Overflow("withdraw amount".into()))?;
        let new_account = Account::new(new_amount, None, None)?;

        let mut accounts = self.forest.accounts().clone();
        let input_index = accounts
            .index_of(account.commitment)
            .ok_or(ClientError::AccountNotFound)?;
        let input_path = accounts.path(input_index)?;
        let transcript = accounts.insert(new_account.commitment)?;

        let encrypted_account = new_account.encrypt(&public_key)?;
        let ext_data = WithdrawExtData {
            fee,
            recipient,
            relayer,
            encryptedAccount: encrypted_account,
        };
        let ext_data_hash = ext_data.hash();

        let (input_path_indices, input_path_elements) = path_signals(&input_path);
        let (output_path_indices, output_path_elements) = path_signals(&transcript.path);
        let inputs = WithdrawInputs {
            amount: public_amount.into(),
            ext_data_hash: ext_data_hash.into(),
            input_amount: account.amount.into(),
            input_secret: account.secret.into(),
            input_nullifier: account.nullifier.into(),
            input_nullifier_hash: account.nullifier_hash.into(),
            input_root: transcript.old_root.into(),
            input_path_indices,
            input_path_elements,
            output_amount: new_account.amount.into(),
            output_secret: new_account.secret.into(),
            output_nullifier: new_account.nullifier.into(),
            output_root: transcript.new_root.into(),
            output_path_indices,
            output_path_elements,
            output_commitment: new_account.commitment.into(),
        };
        let args = WithdrawArgs {
            amount: public_amount,
            extDataHash: ext_data_hash,
            extData: ext_data,
            account: account_update(&transcript, &account),
        };

        let proof = self.prover.prove(&CircuitInputs::Withdraw(inputs)).await?;
        info!(
            %recipient,
            %amount,
            %fee,
            insert_index = transcript.index,
            "withdraw proof ready"
        );
        Ok(WithdrawProof {
            proof,
            args,
            account: new_account,
        })
    }

    /// proof that inserting `commitment` moves the account tree from its
    /// current root to the next one. `accounts` overrides the synced tree
    pub async fn tree_update(
        &mut self,
        commitment: U256,
        accounts: Option<&MerkleTree>,
    ) -> Result<TreeUpdateProof> {
        let mut tree = match accounts {
            Some(tree) => tree.clone(),
            None => {
                self.sync().await?;
                self.forest.accounts().clone()
            }
        };
        let transcript = tree.insert(commitment)?;
        let (path_indices, path_elements) = path_signals(&transcript.path);
        let inputs = TreeUpdateInputs {
            old_root: transcript.old_root.into(),
            new_root: transcript.new_root.into(),
            leaf: commitment.into(),
            path_indices,
            path_elements,
        };
        let args = TreeUpdateArgs {
            oldRoot: u256_to_word(transcript.old_root),
            newRoot: u256_to_word(transcript.new_root),
            leaf: u256_to_word(commitment),
            pathIndices: U256::from(transcript.index),
        };
        let proof = self
            .prover
            .prove(&CircuitInputs::TreeUpdate(inputs))
            .await?;
        info!(insert_index = transcript.index, "tree update proof ready");
        Ok(TreeUpdateProof { proof, args })
    }
}
