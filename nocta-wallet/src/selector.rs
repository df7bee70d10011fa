//! Input selection.
//!
//! Transfers pick spendable outputs greedy largest-first. Staking picks the
//! exact (stake, fee) output pair produced by a single preparation
//! transaction.

use nct_transaction_core::Hash;

use crate::{
    error::{Result, WalletError},
    types::WalletOutput,
};

/// Select inputs covering `target + fee`, largest amounts first.
///
/// Ties on equal amount break toward the older output (block height, then
/// producing tx hash, then output index), so the selection is deterministic
/// for a given UTXO set.
pub fn select_transfer_inputs<'a>(
    spendable: &[&'a WalletOutput],
    target: u64,
    fee: u64,
) -> Result<Vec<&'a WalletOutput>> {
    let required = target
        .checked_add(fee)
        .ok_or(WalletError::InsufficientFunds {
            required: u64::MAX,
            available: spendable.iter().map(|o| o.amount).sum(),
        })?;

    let mut candidates: Vec<&WalletOutput> = spendable.to_vec();
    candidates.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.block_height.cmp(&b.block_height))
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
            .then_with(|| a.out_index.cmp(&b.out_index))
    });

    let mut selected = Vec::new();
    let mut total = 0u64;
    for output in candidates {
        if total >= required {
            break;
        }
        total = total.saturating_add(output.amount);
        selected.push(output);
    }

    if total < required {
        return Err(WalletError::InsufficientFunds {
            required,
            available: total,
        });
    }
    Ok(selected)
}

/// Sum of the amounts in a selection.
pub fn selected_total(selection: &[&WalletOutput]) -> u64 {
    selection.iter().map(|o| o.amount).sum()
}

/// Whether some single preparation transaction provides both an unspent
/// output of exactly `stake_amount` and a distinct one of exactly `fee`.
pub fn has_precise_staking_outputs(
    spendable: &[&WalletOutput],
    stake_amount: u64,
    fee: u64,
) -> bool {
    spendable
        .iter()
        .filter(|o| o.amount == stake_amount)
        .any(|amount_out| {
            spendable.iter().any(|fee_out| {
                fee_out.amount == fee
                    && fee_out.tx_hash == amount_out.tx_hash
                    && fee_out.out_index != amount_out.out_index
            })
        })
}

/// Pick exactly the `[amount, fee]` pair from the given preparation
/// transaction.
pub fn pick_staking_inputs<'a>(
    spendable: &[&'a WalletOutput],
    stake_amount: u64,
    fee: u64,
    prep_tx_hash: &Hash,
) -> Result<[&'a WalletOutput; 2]> {
    let from_prep = |amount: u64, exclude: Option<u32>| {
        spendable
            .iter()
            .find(|o| {
                o.tx_hash == *prep_tx_hash
                    && o.amount == amount
                    && Some(o.out_index) != exclude
            })
            .copied()
    };

    let amount_input = from_prep(stake_amount, None).ok_or(
        WalletError::NoPreciseStakingOutputs {
            amount: stake_amount,
            fee,
        },
    )?;
    let fee_input = from_prep(fee, Some(amount_input.out_index)).ok_or(
        WalletError::NoPreciseStakingOutputs {
            amount: stake_amount,
            fee,
        },
    )?;

    Ok([amount_input, fee_input])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(tx_byte: u8, out_index: u32, amount: u64, block_height: u64) -> WalletOutput {
        WalletOutput {
            owner_key: [1u8; 32],
            amount,
            block_height,
            block_timestamp: 0,
            tx_hash: [tx_byte; 32],
            out_index,
            unlock_time: 0,
            tx_pubkey: [0u8; 32],
            global_output_index: None,
            is_coinbase: false,
            is_staking_origin: false,
            spent_at_height: None,
        }
    }

    #[test]
    fn greedy_selection_prefers_largest() {
        let a = output(1, 0, 10_000, 100);
        let b = output(2, 0, 3_000, 101);
        let c = output(3, 0, 500, 102);
        let spendable = vec![&c, &b, &a];

        let selected = select_transfer_inputs(&spendable, 9_000, 100).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].amount, 10_000);

        let selected = select_transfer_inputs(&spendable, 12_000, 100).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected_total(&selected), 13_000);
    }

    #[test]
    fn equal_amounts_break_toward_older_output() {
        let newer = output(1, 0, 5_000, 200);
        let older = output(2, 0, 5_000, 100);
        let spendable = vec![&newer, &older];

        let selected = select_transfer_inputs(&spendable, 4_000, 0).unwrap();
        assert_eq!(selected[0].block_height, 100);
    }

    #[test]
    fn underfunding_reports_required_and_available() {
        let a = output(1, 0, 1_000, 100);
        let spendable = vec![&a];

        let err = select_transfer_inputs(&spendable, 5_000, 100).unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                required: 5_100,
                available: 1_000,
            }
        );
    }

    #[test]
    fn staking_pair_must_come_from_one_transaction() {
        let stake = output(1, 0, 5_000_000_000, 100);
        let fee_same_tx = output(1, 1, 1_000, 100);
        let fee_other_tx = output(2, 0, 1_000, 100);

        let split = vec![&stake, &fee_other_tx];
        assert!(!has_precise_staking_outputs(&split, 5_000_000_000, 1_000));

        let paired = vec![&stake, &fee_same_tx];
        assert!(has_precise_staking_outputs(&paired, 5_000_000_000, 1_000));

        let picked =
            pick_staking_inputs(&paired, 5_000_000_000, 1_000, &[1u8; 32]).unwrap();
        assert_eq!(picked[0].amount, 5_000_000_000);
        assert_eq!(picked[1].amount, 1_000);
    }

    #[test]
    fn staking_pick_fails_without_the_exact_pair() {
        let stake = output(1, 0, 5_000_000_000, 100);
        let spendable = vec![&stake];

        assert_eq!(
            pick_staking_inputs(&spendable, 5_000_000_000, 1_000, &[1u8; 32]).unwrap_err(),
            WalletError::NoPreciseStakingOutputs {
                amount: 5_000_000_000,
                fee: 1_000,
            }
        );
    }

    #[test]
    fn equal_stake_and_fee_require_two_distinct_outputs() {
        let only = output(1, 0, 1_000, 100);
        let spendable = vec![&only];
        assert!(!has_precise_staking_outputs(&spendable, 1_000, 1_000));

        let second = output(1, 1, 1_000, 100);
        let spendable = vec![&only, &second];
        assert!(has_precise_staking_outputs(&spendable, 1_000, 1_000));

        let picked = pick_staking_inputs(&spendable, 1_000, 1_000, &[1u8; 32]).unwrap();
        assert_ne!(picked[0].out_index, picked[1].out_index);
    }
}
