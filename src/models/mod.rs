mod delegation;
mod payout;

pub use delegation::DelegationRecord;
pub use payout::{Party, PayoutRow, PayoutTable};
pub use payout::{APR_LABEL, EARNINGS_LABEL, PARTNER_LABEL, TOTAL_LABEL};
