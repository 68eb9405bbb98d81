use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::models::{Status, TransactionUpdate};
use crate::store::{self, Correlated};

/// Feed status value meaning the payment has not settled yet.
pub const FEED_PENDING: &str = "PENDING";

/// Status a freshly ingested feed item starts with.
pub fn initial_status(feed_status: &str) -> Status {
    if feed_status.eq_ignore_ascii_case(FEED_PENDING) {
        Status::Pending
    } else {
        Status::Cleared
    }
}

/// Move a correlated row from Pending to Cleared once the feed no longer
/// reports it as pending. Cleared rows are never touched, and classification
/// fields are never written here. Returns whether the row changed.
pub fn reconcile_status(conn: &Connection, stored: &Correlated, feed_status: &str) -> Result<bool> {
    if stored.status != Status::Pending || initial_status(feed_status) == Status::Pending {
        return Ok(false);
    }
    let update = TransactionUpdate {
        status: Some(Status::Cleared),
        ..Default::default()
    };
    let changed = store::update_transaction(conn, stored.id, &update)?;
    if changed {
        debug!(id = stored.id, feed_status, "Status cleared");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::models::TxnType;
    use crate::store::test_support::seed;

    fn pending_row(conn: &Connection) -> Correlated {
        let id = seed(conn, "2024-04-06", "Tesco", -42.5);
        conn.execute(
            "UPDATE transactions SET status = 'Pending', txn_type = 'Personal' WHERE id = ?1",
            [id],
        )
        .unwrap();
        Correlated { id, status: Status::Pending, reference: None }
    }

    #[test]
    fn test_pending_moves_to_cleared() {
        let (_dir, conn) = test_db();
        let row = pending_row(&conn);
        assert!(reconcile_status(&conn, &row, "SETTLED").unwrap());
        let txn = store::get_transaction(&conn, row.id).unwrap().unwrap();
        assert_eq!(txn.status, Status::Cleared);
        assert_eq!(txn.classification.txn_type, TxnType::Personal);
    }

    #[test]
    fn test_still_pending_is_left_alone() {
        let (_dir, conn) = test_db();
        let row = pending_row(&conn);
        assert!(!reconcile_status(&conn, &row, "PENDING").unwrap());
        assert!(!reconcile_status(&conn, &row, "pending").unwrap());
        let txn = store::get_transaction(&conn, row.id).unwrap().unwrap();
        assert_eq!(txn.status, Status::Pending);
    }

    #[test]
    fn test_cleared_never_reverts() {
        let (_dir, conn) = test_db();
        let id = seed(&conn, "2024-04-06", "Tesco", -42.5);
        let row = Correlated { id, status: Status::Cleared, reference: None };
        assert!(!reconcile_status(&conn, &row, "PENDING").unwrap());
        let txn = store::get_transaction(&conn, id).unwrap().unwrap();
        assert_eq!(txn.status, Status::Cleared);
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(initial_status("PENDING"), Status::Pending);
        assert_eq!(initial_status("SETTLED"), Status::Cleared);
        assert_eq!(initial_status("REVERSED"), Status::Cleared);
    }
}
