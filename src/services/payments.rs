use crate::config::Config;
use crate::error::PaymentError;
use crate::models::{Party, PayoutTable};
use crate::services::wallet::{EngineWallet, TokenWallet};
use log::{error, info, warn};

const PAYMENT_MEMO: &str = "Delegation reward payout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    NotConfigured,
    Configured,
    Disbursing,
    Done,
    /// Payments switched off by configuration; terminal, no on-chain calls.
    Disabled,
}

pub struct DispatchReport {
    pub state: DispatchState,
    pub payments_made: usize,
    pub final_balance: Option<f64>,
}

struct Dispatcher {
    state: DispatchState,
}

impl Dispatcher {
    fn new() -> Self {
        Self {
            state: DispatchState::NotConfigured,
        }
    }

    fn advance(&mut self, next: DispatchState) {
        info!("Payment dispatch: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Runs the dispatch stage over the allocated table. Wallet configuration
/// failure is fatal to this stage and happens before any transfer; once
/// disbursing, each transfer stands alone and a failed row is logged and
/// skipped.
pub async fn process_payments(
    table: &mut PayoutTable,
    config: &Config,
) -> Result<DispatchReport, PaymentError> {
    let mut dispatcher = Dispatcher::new();

    if !config.activate_payments {
        dispatcher.advance(DispatchState::Disabled);
        info!("Payments are deactivated. Only the snapshot was generated.");
        return Ok(DispatchReport {
            state: dispatcher.state,
            payments_made: 0,
            final_balance: None,
        });
    }

    let active_key = config
        .active_key
        .as_deref()
        .ok_or_else(|| PaymentError::Configure("active key not configured".to_string()))?;
    let wallet = EngineWallet::configure(
        &config.payment_account,
        active_key,
        &config.hive_node,
        &config.engine_node,
    )?;
    dispatcher.advance(DispatchState::Configured);

    disburse(&mut dispatcher, table, &wallet, config).await
}

async fn disburse(
    dispatcher: &mut Dispatcher,
    table: &mut PayoutTable,
    wallet: &impl TokenWallet,
    config: &Config,
) -> Result<DispatchReport, PaymentError> {
    dispatcher.advance(DispatchState::Disbursing);

    // Track the spendable balance locally so an underfunded wallet skips
    // rows instead of broadcasting transfers that would bounce. If the
    // lookup fails the guard is dropped and each transfer fends for itself.
    let mut available = match wallet.balance(&config.token_name).await {
        Ok(balance) => {
            info!(
                "{} balance before payments: {}",
                config.token_name, balance
            );
            Some(balance)
        }
        Err(e) => {
            warn!("Error fetching {} balance: {}", config.token_name, e);
            None
        }
    };

    let mut payments_made = 0;
    for row in &mut table.rows {
        // Receiver and partner-aggregate rows are not payees.
        let Party::Delegator(account) = &row.party else {
            continue;
        };
        if config.ignore_payment_accounts.contains(account) {
            info!("Skipping ignored account {}", account);
            continue;
        }
        if row.token_payment <= 0.0 {
            continue;
        }
        if let Some(balance) = available {
            if row.token_payment > balance {
                warn!(
                    "Insufficient {} balance for {}: {} needed, {} available",
                    config.token_name, account, row.token_payment, balance
                );
                continue;
            }
        }
        match wallet
            .transfer(account, &config.token_name, row.token_payment, PAYMENT_MEMO)
            .await
        {
            Ok(tx_id) => {
                info!(
                    "Paid {} {} to {} ({})",
                    row.token_payment, config.token_name, account, tx_id
                );
                row.tx_id = Some(tx_id);
                payments_made += 1;
                if let Some(balance) = available.as_mut() {
                    *balance -= row.token_payment;
                }
            }
            Err(e) => {
                error!("Error making payment to {}: {}", account, e);
            }
        }
    }

    if payments_made == 0 {
        info!("No payments were made: no eligible delegators or amounts.");
    }

    let final_balance = match wallet.balance(&config.token_name).await {
        Ok(balance) => {
            info!(
                "Updated {} balance after payments: {}",
                config.token_name, balance
            );
            Some(balance)
        }
        Err(e) => {
            warn!("Error fetching final balance: {}", e);
            None
        }
    };

    dispatcher.advance(DispatchState::Done);
    Ok(DispatchReport {
        state: dispatcher.state,
        payments_made,
        final_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayoutRow;
    use crate::services::payout_engine::{allocate, build_table};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct MockWallet {
        transfers: Mutex<Vec<(String, f64)>>,
        fail_for: HashSet<String>,
        balance: f64,
    }

    impl MockWallet {
        fn new(fail_for: &[&str], balance: f64) -> Self {
            Self {
                transfers: Mutex::new(Vec::new()),
                fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
                balance,
            }
        }
    }

    #[async_trait]
    impl TokenWallet for MockWallet {
        async fn transfer(
            &self,
            to: &str,
            _token: &str,
            quantity: f64,
            _memo: &str,
        ) -> Result<String, PaymentError> {
            if self.fail_for.contains(to) {
                return Err(PaymentError::Signing("mock transfer failure".to_string()));
            }
            self.transfers
                .lock()
                .unwrap()
                .push((to.to_string(), quantity));
            Ok(format!("tx-{to}"))
        }

        async fn balance(&self, _token: &str) -> Result<f64, PaymentError> {
            Ok(self.balance)
        }
    }

    fn test_config(ignore: &[&str]) -> Config {
        let ignore_joined = ignore.join(",");
        let vars = [
            ("RECEIVER_ACCOUNT", "receiver"),
            ("PAYMENT_ACCOUNT", "payer"),
            ("IGNORE_PAYMENT_ACCOUNTS", ignore_joined.as_str()),
        ];
        Config::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
        .unwrap()
    }

    fn allocated_table() -> PayoutTable {
        let individual = vec![
            PayoutRow::new(Party::Delegator("alice".into()), 200.0),
            PayoutRow::new(Party::Delegator("iggy".into()), 200.0),
            PayoutRow::new(Party::Delegator("dusty".into()), 0.0),
        ];
        let mut table = build_table("receiver", 1000.0, 100.0, individual);
        allocate(&mut table, 50.0, 1.0, 1.0);
        table
    }

    #[tokio::test]
    async fn deactivated_payments_short_circuit() {
        let mut table = allocated_table();
        let config = test_config(&[]);
        let report = process_payments(&mut table, &config).await.unwrap();
        assert_eq!(report.state, DispatchState::Disabled);
        assert_eq!(report.payments_made, 0);
        assert!(table.rows.iter().all(|row| row.tx_id.is_none()));
    }

    #[tokio::test]
    async fn pays_eligible_delegators_only() {
        let mut table = allocated_table();
        let config = test_config(&["iggy"]);
        let wallet = MockWallet::new(&[], 100.0);
        let mut dispatcher = Dispatcher::new();

        let report = disburse(&mut dispatcher, &mut table, &wallet, &config)
            .await
            .unwrap();

        // "iggy" is ignore-listed despite a positive payment, "dusty" has a
        // zero payment, receiver and partner rows are excluded by type.
        let transfers = wallet.transfers.lock().unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].0, "alice");
        assert_eq!(transfers[0].1, 20.0);
        drop(transfers);

        assert_eq!(report.state, DispatchState::Done);
        assert_eq!(report.payments_made, 1);
        assert_eq!(report.final_balance, Some(100.0));
        assert_eq!(table.rows[2].tx_id.as_deref(), Some("tx-alice"));
        assert_eq!(table.rows[3].tx_id, None);
    }

    #[tokio::test]
    async fn underfunded_wallet_skips_rows_it_cannot_cover() {
        let individual = vec![
            PayoutRow::new(Party::Delegator("first".into()), 100.0),
            PayoutRow::new(Party::Delegator("second".into()), 100.0),
        ];
        let mut table = build_table("receiver", 0.0, 0.0, individual);
        // 20 tokens per delegator, but only 25 in the wallet.
        allocate(&mut table, 40.0, 1.0, 1.0);

        let config = test_config(&[]);
        let wallet = MockWallet::new(&[], 25.0);
        let mut dispatcher = Dispatcher::new();
        let report = disburse(&mut dispatcher, &mut table, &wallet, &config)
            .await
            .unwrap();

        assert_eq!(report.payments_made, 1);
        assert_eq!(table.rows[2].tx_id.as_deref(), Some("tx-first"));
        assert_eq!(table.rows[3].tx_id, None);
    }

    #[tokio::test]
    async fn failed_transfer_skips_row_and_continues() {
        let individual = vec![
            PayoutRow::new(Party::Delegator("bad".into()), 100.0),
            PayoutRow::new(Party::Delegator("good".into()), 100.0),
        ];
        let mut table = build_table("receiver", 0.0, 0.0, individual);
        allocate(&mut table, 10.0, 1.0, 1.0);

        let config = test_config(&[]);
        let wallet = MockWallet::new(&["bad"], 50.0);
        let mut dispatcher = Dispatcher::new();
        let report = disburse(&mut dispatcher, &mut table, &wallet, &config)
            .await
            .unwrap();

        assert_eq!(report.payments_made, 1);
        assert_eq!(table.rows[2].tx_id, None);
        assert_eq!(table.rows[3].tx_id.as_deref(), Some("tx-good"));
    }
}
