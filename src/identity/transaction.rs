use tracing::debug;

use super::IdentityError;
use crate::store::StoreTx;

/// Commit on success, roll back on any error.
///
/// A failed rollback is only logged: the error that caused it is the one the
/// caller needs, and the backend discards the writes when the connection drops.
pub(crate) async fn settle<T>(
    tx: Box<dyn StoreTx>,
    result: Result<T, IdentityError>,
) -> Result<T, IdentityError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                debug!("rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}
