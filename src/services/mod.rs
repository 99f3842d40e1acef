pub mod hive_rpc;
pub mod notifier;
pub mod payments;
pub mod payout_engine;
pub mod wallet;
