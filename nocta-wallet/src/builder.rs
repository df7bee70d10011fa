//! Transaction building and signing.
//!
//! All signing happens locally. Every signature, outer per-input and the
//! staking record's inner one alike, is verified immediately after
//! generation; a failed self-check aborts construction and no partial
//! transaction is ever returned.

use nct_crypto_keys::{sign, verify, PrivateKey, PublicKey, Signature};
use nct_transaction_core::{
    ExtraEntry, ExtraField, StakingRecord, Transaction, TransactionPrefix, TxInput, TxOutput,
    TX_VERSION,
};
use rand_core::{CryptoRng, RngCore};

use crate::{
    error::{Result, WalletError},
    types::WalletOutput,
    BLOCK_TIME_SECONDS,
};

/// Seconds per stake-lock day.
const SECONDS_PER_DAY: u64 = 86_400;

/// A spend keypair held by the wallet.
#[derive(Clone)]
pub struct SpendKeypair {
    public: PublicKey,
    private: PrivateKey,
}

impl SpendKeypair {
    /// Pair a private scalar with its public key.
    pub fn new(private: PrivateKey) -> Self {
        let public = PublicKey::from(&private);
        Self { public, private }
    }

    /// Decode a keypair from the 32-byte private scalar.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(PrivateKey::try_from(bytes)?))
    }

    /// Draw a fresh keypair from `rng`.
    pub fn from_random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(PrivateKey::from_random(rng))
    }

    /// The public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The private half.
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }
}

/// A transfer destination: a validated spend public key and an amount.
#[derive(Clone, Copy, Debug)]
pub struct Destination {
    /// The recipient's spend public key.
    pub key: PublicKey,
    /// Amount in atomic units.
    pub amount: u64,
}

impl Destination {
    /// Validate a raw 32-byte key into a destination.
    pub fn new(key_bytes: &[u8], amount: u64) -> Result<Self> {
        Ok(Self {
            key: PublicKey::try_from(key_bytes)?,
            amount,
        })
    }
}

/// A spendable output paired with the keypair able to sign for it.
pub struct InputCredentials<'a> {
    /// The output being spent.
    pub output: &'a WalletOutput,
    /// The owner's keypair.
    pub keypair: &'a SpendKeypair,
}

impl<'a> InputCredentials<'a> {
    /// Pair `output` with its owner from `keys`.
    pub fn resolve(output: &'a WalletOutput, keys: &'a [SpendKeypair]) -> Result<Self> {
        let keypair = keys
            .iter()
            .find(|k| k.public().as_bytes() == &output.owner_key)
            .ok_or_else(|| {
                WalletError::CryptoInvalidEncoding(format!(
                    "no spend key available for output owner {}",
                    hex::encode(output.owner_key)
                ))
            })?;
        Ok(Self { output, keypair })
    }
}

/// Stake lock arithmetic: the unlock height for `lock_days` from
/// `current_height`.
pub fn stake_unlock_height(current_height: u64, lock_days: u32) -> u64 {
    current_height + u64::from(lock_days) * SECONDS_PER_DAY / BLOCK_TIME_SECONDS
}

/// Build and sign a transfer.
///
/// Outputs follow `destinations` in order; positive change goes back to
/// `change_key`. `unlock_time` is zero unless the caller overrides it.
pub fn build_transfer<R: RngCore + CryptoRng>(
    rng: &mut R,
    inputs: &[InputCredentials<'_>],
    destinations: &[Destination],
    change_key: &PublicKey,
    fee: u64,
    unlock_time: u64,
) -> Result<Transaction> {
    let tx_private = PrivateKey::from_random(rng);
    let tx_public = PublicKey::from(&tx_private);

    let input_total: u64 = inputs.iter().map(|c| c.output.amount).sum();
    let output_total: u64 = destinations.iter().map(|d| d.amount).sum();
    let required = output_total
        .checked_add(fee)
        .ok_or(WalletError::InsufficientFunds {
            required: u64::MAX,
            available: input_total,
        })?;
    if input_total < required {
        return Err(WalletError::InsufficientFunds {
            required,
            available: input_total,
        });
    }

    let mut outputs: Vec<TxOutput> = destinations
        .iter()
        .map(|d| TxOutput {
            amount: d.amount,
            key: d.key.to_bytes(),
        })
        .collect();
    let change = input_total - required;
    if change > 0 {
        outputs.push(TxOutput {
            amount: change,
            key: change_key.to_bytes(),
        });
    }

    let prefix = TransactionPrefix {
        version: TX_VERSION,
        unlock_time,
        inputs: inputs
            .iter()
            .map(|c| TxInput::key(c.output.amount, c.output.tx_hash, c.output.out_index))
            .collect(),
        outputs,
        extra: ExtraField::with_tx_pubkey(tx_public.to_bytes()),
    };

    sign_prefix(rng, prefix, inputs)
}

/// Build the staking preparation transaction: a transfer to self producing
/// `[stake_amount, staking_fee, change]` in that order.
pub fn build_stake_preparation<R: RngCore + CryptoRng>(
    rng: &mut R,
    inputs: &[InputCredentials<'_>],
    own_key: &PublicKey,
    stake_amount: u64,
    staking_fee: u64,
    network_fee: u64,
) -> Result<Transaction> {
    let destinations = [
        Destination {
            key: *own_key,
            amount: stake_amount,
        },
        Destination {
            key: *own_key,
            amount: staking_fee,
        },
    ];
    build_transfer(rng, inputs, &destinations, own_key, network_fee, 0)
}

/// Build and sign the staking transaction.
///
/// Consumes exactly the `[amount, fee]` pair from the preparation
/// transaction and emits one output of `stake_amount` back to the staker,
/// locked until the computed unlock height. The extra field carries the
/// transaction public key and a staking record whose inner signature covers
/// the fixed-width `(amount, lock_days, unlock_time)` message.
pub fn build_staking_transaction<R: RngCore + CryptoRng>(
    rng: &mut R,
    amount_input: InputCredentials<'_>,
    fee_input: InputCredentials<'_>,
    staker: &SpendKeypair,
    stake_amount: u64,
    lock_days: u32,
    current_height: u64,
) -> Result<Transaction> {
    let tx_private = PrivateKey::from_random(rng);
    let tx_public = PublicKey::from(&tx_private);

    let unlock_time = stake_unlock_height(current_height, lock_days);
    let message = StakingRecord::message_for(stake_amount, lock_days, unlock_time);
    let inner = sign(rng, &message, staker.public(), staker.private());
    if !verify(&message, staker.public(), &inner) {
        return Err(self_check_failure());
    }

    let prefix = TransactionPrefix {
        version: TX_VERSION,
        unlock_time,
        inputs: vec![
            TxInput::key(
                amount_input.output.amount,
                amount_input.output.tx_hash,
                amount_input.output.out_index,
            ),
            TxInput::key(
                fee_input.output.amount,
                fee_input.output.tx_hash,
                fee_input.output.out_index,
            ),
        ],
        outputs: vec![TxOutput {
            amount: stake_amount,
            key: staker.public().to_bytes(),
        }],
        extra: ExtraField {
            entries: vec![
                ExtraEntry::TxPubKey(tx_public.to_bytes()),
                ExtraEntry::Staking(StakingRecord {
                    amount: stake_amount,
                    unlock_time,
                    lock_days,
                    signature: inner,
                }),
            ],
        },
    };

    sign_prefix(rng, prefix, &[amount_input, fee_input])
}

/// Sign one signature per input over the prefix hash, self-verifying each.
fn sign_prefix<R: RngCore + CryptoRng>(
    rng: &mut R,
    prefix: TransactionPrefix,
    inputs: &[InputCredentials<'_>],
) -> Result<Transaction> {
    let prefix_hash = prefix.hash();
    let mut signatures: Vec<Signature> = Vec::with_capacity(inputs.len());
    for credentials in inputs {
        let signature = sign(
            rng,
            &prefix_hash,
            credentials.keypair.public(),
            credentials.keypair.private(),
        );
        if !verify(&prefix_hash, credentials.keypair.public(), &signature) {
            return Err(self_check_failure());
        }
        signatures.push(signature);
    }
    Ok(Transaction::new(prefix, signatures)?)
}

fn self_check_failure() -> WalletError {
    WalletError::CryptoInvalidEncoding("signature failed post-generation self-check".to_string())
}
