use crate::error::PersistenceError;
use crate::models::{PayoutTable, APR_LABEL, EARNINGS_LABEL, TOTAL_LABEL};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_PREFIX: &str = "pd_";

/// Serializes the augmented table to a dated CSV under `dir`. Refuses to
/// overwrite: the run timestamp in the filename is the uniqueness key.
pub fn write_snapshot(
    dir: &Path,
    token_name: &str,
    table: &PayoutTable,
    run_stamp: &str,
) -> Result<PathBuf, PersistenceError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{SNAPSHOT_PREFIX}{run_stamp}.csv"));
    let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(PersistenceError::AlreadyExists(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let payment_column = format!("{token_name} Payment");
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record([
        "Account",
        "Delegated HP",
        payment_column.as_str(),
        "APR",
        "TxID",
    ])?;
    for row in &table.rows {
        writer.write_record([
            row.party.account_label(),
            fmt3(row.delegated_hp).as_str(),
            fmt3(row.token_payment).as_str(),
            fmt_apr(row.apr).as_str(),
            row.tx_id.as_deref().unwrap_or(""),
        ])?;
    }
    writer.write_record([TOTAL_LABEL, fmt3(table.total_delegated_hp).as_str(), "", "", ""])?;
    writer.write_record([EARNINGS_LABEL, fmt3(table.earnings_hp).as_str(), "", "", ""])?;
    writer.write_record([APR_LABEL, fmt_apr(table.apr_percent).as_str(), "", "", ""])?;
    writer.flush().map_err(PersistenceError::Io)?;

    info!("Snapshot written to {}", path.display());
    Ok(path)
}

/// The lexicographically greatest filename under `dir` matching `prefix`,
/// which the timestamp format makes the most recent. An empty or missing
/// directory means "no prior period", not an error.
pub fn latest_snapshot(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            info!("No snapshot directory at {}", dir.display());
            return None;
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    let latest = names.pop().map(|name| dir.join(name));
    match &latest {
        Some(path) => info!("Latest snapshot: {}", path.display()),
        None => info!("No snapshot files found in {}", dir.display()),
    }
    latest
}

/// The receiver's `Delegated HP` in the named snapshot. Degrades to 0 when
/// the file is absent, malformed, or carries no row for the account.
pub fn previous_own_hp(path: Option<&Path>, account: &str) -> f64 {
    let Some(path) = path else {
        info!("No previous snapshot, treating previous own HP as 0");
        return 0.0;
    };
    match read_own_hp(path, account) {
        Ok(Some(hp)) => {
            info!("Previous own HP for {}: {}", account, hp);
            hp
        }
        Ok(None) => {
            warn!("No usable row for {} in {}", account, path.display());
            0.0
        }
        Err(e) => {
            warn!("Error reading previous snapshot {}: {}", path.display(), e);
            0.0
        }
    }
}

fn read_own_hp(path: &Path, account: &str) -> Result<Option<f64>, PersistenceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let account_idx = headers.iter().position(|h| h == "Account");
    let hp_idx = headers.iter().position(|h| h == "Delegated HP");
    let (Some(account_idx), Some(hp_idx)) = (account_idx, hp_idx) else {
        return Ok(None);
    };
    for record in reader.records() {
        let record = record?;
        if record.get(account_idx) == Some(account) {
            return Ok(record.get(hp_idx).and_then(|v| v.parse().ok()));
        }
    }
    Ok(None)
}

fn fmt3(value: f64) -> String {
    format!("{value:.3}")
}

fn fmt_apr(apr: Option<f64>) -> String {
    apr.map(|value| format!("{value:.3}"))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Party, PayoutRow};
    use crate::services::payout_engine::{allocate, build_table};
    use std::fs::File;
    use std::io::Write;

    fn sample_table() -> PayoutTable {
        let individual = vec![PayoutRow::new(Party::Delegator("bob".into()), 300.0)];
        let mut table = build_table("receiver", 1000.0, 200.0, individual);
        allocate(&mut table, 100.0, 1.0, 1.0);
        table
    }

    #[test]
    fn empty_or_missing_directory_means_no_prior_period() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_snapshot(dir.path(), SNAPSHOT_PREFIX), None);
        assert_eq!(
            latest_snapshot(&dir.path().join("nowhere"), SNAPSHOT_PREFIX),
            None
        );
        assert_eq!(previous_own_hp(None, "receiver"), 0.0);
    }

    #[test]
    fn write_then_read_round_trips_the_receiver_row() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table();
        let path =
            write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_10-00-00").unwrap();

        let latest = latest_snapshot(dir.path(), SNAPSHOT_PREFIX).unwrap();
        assert_eq!(latest, path);
        assert_eq!(previous_own_hp(Some(&latest), "receiver"), 1000.0);
    }

    #[test]
    fn latest_snapshot_orders_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table();
        write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_10-00-00").unwrap();
        let newer =
            write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_11-30-00").unwrap();
        assert_eq!(latest_snapshot(dir.path(), SNAPSHOT_PREFIX), Some(newer));
    }

    #[test]
    fn never_overwrites_an_existing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table();
        write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_10-00-00").unwrap();
        assert!(matches!(
            write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_10-00-00"),
            Err(PersistenceError::AlreadyExists(_))
        ));
    }

    #[test]
    fn malformed_or_incomplete_files_degrade_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let garbled = dir.path().join("pd_garbled.csv");
        File::create(&garbled)
            .unwrap()
            .write_all(b"not,a\nreal snapshot")
            .unwrap();
        assert_eq!(previous_own_hp(Some(&garbled), "receiver"), 0.0);

        let table = sample_table();
        let path =
            write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_10-00-00").unwrap();
        assert_eq!(previous_own_hp(Some(&path), "nobody"), 0.0);
    }

    #[test]
    fn individual_rows_remain_readable_alongside_synthetic_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table();
        let path =
            write_snapshot(dir.path(), "NEXO", &table, "08-06-2026_10-00-00").unwrap();
        assert_eq!(previous_own_hp(Some(&path), "bob"), 300.0);
        assert_eq!(previous_own_hp(Some(&path), "Partner Accounts"), 200.0);
    }
}
