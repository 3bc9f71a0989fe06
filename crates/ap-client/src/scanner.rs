//! account recovery from the published log
//!
//! every `NewAccount` event carries the boxed account. trial-decrypt all of
//! them with the holder's key, keep the ones that open to the advertised
//! commitment, and the newest one whose nullifier nobody consumed is the
//! live balance.

use std::collections::HashSet;

use alloy_primitives::B256;
use ap_core::field::u256_to_word;
use ap_core::{Account, AccountEvent, EncryptionKeypair};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info};

/// an account that decrypted under our key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedAccount {
    pub index: u64,
    pub account: Account,
}

fn try_open(keys: &EncryptionKeypair, event: &AccountEvent) -> Option<OwnedAccount> {
    let account = Account::decrypt(keys, &event.encrypted_account).ok()?;
    if u256_to_word(account.commitment) != event.commitment {
        debug!(index = event.index, "decrypted account does not match commitment");
        return None;
    }
    Some(OwnedAccount {
        index: event.index,
        account,
    })
}

/// every event that opens under `keys`, in log order
pub fn owned_accounts(keys: &EncryptionKeypair, events: &[AccountEvent]) -> Vec<OwnedAccount> {
    #[cfg(feature = "parallel")]
    let mut owned: Vec<OwnedAccount> = events
        .par_iter()
        .filter_map(|event| try_open(keys, event))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let mut owned: Vec<OwnedAccount> = events
        .iter()
        .filter_map(|event| try_open(keys, event))
        .collect();

    owned.sort_by_key(|o| o.index);
    owned
}

/// newest owned account whose nullifier hash no event has consumed
pub fn latest_unspent(keys: &EncryptionKeypair, events: &[AccountEvent]) -> Option<OwnedAccount> {
    let spent: HashSet<B256> = events.iter().map(|e| e.nullifier_hash).collect();
    let owned = owned_accounts(keys, events);
    let found = owned
        .into_iter()
        .rev()
        .find(|o| !spent.contains(&u256_to_word(o.account.nullifier_hash)));
    match &found {
        Some(o) => info!(index = o.index, amount = %o.account.amount, "found unspent account"),
        None => info!("no unspent account"),
    }
    found
}
