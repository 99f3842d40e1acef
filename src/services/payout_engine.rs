use crate::models::{DelegationRecord, Party, PayoutRow, PayoutTable};
use crate::services::hive_rpc::VestingRatio;
use crate::utils::helpers::round3;
use log::{error, info};
use std::collections::HashSet;

const PERIODS_PER_YEAR: f64 = 52.0; // weekly payout runs

/// Splits the delegation list into individual payout rows and the aggregated
/// partner subtotal. Upstream order is preserved; a record that fails to
/// parse is logged and skipped rather than failing the run.
pub fn classify_delegations(
    delegations: &[DelegationRecord],
    partner_accounts: &HashSet<String>,
    ratio: &VestingRatio,
) -> (Vec<PayoutRow>, f64) {
    let mut rows = Vec::new();
    let mut partner_hp = 0.0;

    for record in delegations {
        let raw = record.vesting_shares.trim_end_matches(" VESTS").trim();
        let vesting_shares: f64 = match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                error!(
                    "Error processing delegation from {}: {} ({:?})",
                    record.delegator, e, record.vesting_shares
                );
                continue;
            }
        };
        let delegated_hp = round3(ratio.vests_to_hp(vesting_shares));
        if partner_accounts.contains(&record.delegator) {
            partner_hp += delegated_hp;
        } else {
            rows.push(PayoutRow::new(
                Party::Delegator(record.delegator.clone()),
                delegated_hp,
            ));
        }
    }

    (rows, round3(partner_hp))
}

/// Receiver row first, partner aggregate second, individual delegators after,
/// matching the snapshot layout.
pub fn build_table(
    receiver: &str,
    own_hp: f64,
    partner_hp: f64,
    individual: Vec<PayoutRow>,
) -> PayoutTable {
    let mut rows = Vec::with_capacity(individual.len() + 2);
    rows.push(PayoutRow::new(Party::Receiver(receiver.to_string()), own_hp));
    rows.push(PayoutRow::new(Party::Partners, partner_hp));
    rows.extend(individual);
    PayoutTable {
        rows,
        total_delegated_hp: 0.0,
        earnings_hp: 0.0,
        apr_percent: None,
    }
}

/// Fills the derived columns: proportional token payment and annualized
/// yield per row, plus the table-wide total and APR. Pure over its inputs.
///
/// The share denominator is the partner aggregate plus the individual
/// delegator rows; the receiver's own holdings are not part of it. A zero
/// denominator yields a zero payment on every row.
pub fn allocate(
    table: &mut PayoutTable,
    earnings_hp: f64,
    token_fixed_price: f64,
    hive_deduction_multiplier: f64,
) {
    let total = round3(
        table
            .rows
            .iter()
            .filter(|row| !matches!(row.party, Party::Receiver(_)))
            .map(|row| row.delegated_hp)
            .sum(),
    );
    table.total_delegated_hp = total;
    table.earnings_hp = round3(earnings_hp);

    for row in &mut table.rows {
        if matches!(row.party, Party::Receiver(_)) {
            row.token_payment = 0.0;
            row.apr = None;
            continue;
        }
        let hp_share = if total > 0.0 {
            earnings_hp * row.delegated_hp / total
        } else {
            0.0
        };
        row.token_payment = round3(hp_share * hive_deduction_multiplier / token_fixed_price);
        row.apr = if row.delegated_hp > 0.0 {
            Some(round3(hp_share / row.delegated_hp * PERIODS_PER_YEAR * 100.0))
        } else {
            None
        };
    }

    table.apr_percent = if total > 0.0 {
        Some(round3(earnings_hp / total * PERIODS_PER_YEAR * 100.0))
    } else {
        None
    };

    info!(
        "Allocated {} HP over {} rows (total delegated: {} HP)",
        table.earnings_hp,
        table.rows.len(),
        table.total_delegated_hp
    );
}
