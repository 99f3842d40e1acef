/// Labels used for synthetic rows in the snapshot file. In memory, rows are
/// discriminated by `Party`; these strings only appear at the serialization
/// boundary.
pub const PARTNER_LABEL: &str = "Partner Accounts";
pub const TOTAL_LABEL: &str = "Total";
pub const EARNINGS_LABEL: &str = "Earnings for the period";
pub const APR_LABEL: &str = "APR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Party {
    /// The account receiving the delegations; owns the earnings being split.
    Receiver(String),
    /// Aggregate of all partner-account delegations.
    Partners,
    /// An individual delegator, paid on-chain when eligible.
    Delegator(String),
}

impl Party {
    pub fn account_label(&self) -> &str {
        match self {
            Party::Receiver(name) | Party::Delegator(name) => name,
            Party::Partners => PARTNER_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutRow {
    pub party: Party,
    pub delegated_hp: f64,
    pub token_payment: f64,
    pub apr: Option<f64>,
    pub tx_id: Option<String>,
}

impl PayoutRow {
    pub fn new(party: Party, delegated_hp: f64) -> Self {
        Self {
            party,
            delegated_hp,
            token_payment: 0.0,
            apr: None,
            tx_id: None,
        }
    }
}

/// The in-memory payout table for one run. Mutated in place by each stage:
/// allocation fills the derived columns, dispatch fills `tx_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutTable {
    pub rows: Vec<PayoutRow>,
    /// Partner aggregate plus individual delegators; the receiver's own row
    /// is excluded from the proportional-share denominator.
    pub total_delegated_hp: f64,
    pub earnings_hp: f64,
    pub apr_percent: Option<f64>,
}
