//! Scoped transaction helper.
//!
//! Every mutating table operation acquires its transaction through
//! [`transaction!`]: begin, run the block, commit on `Ok`, roll back on
//! `Err`. The connection scope is released on every exit path.

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$client.transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `pgtable::TableResult<T>`.
///
/// # Example
///
/// ```ignore
/// let mut client = pool.get().await?;
/// pgtable::transaction!(client, tx, {
///     tx.execute("DELETE FROM staging.events", &[]).await?;
///     Ok(())
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        let $tx = ($client)
            .transaction()
            .await
            .map_err($crate::TableError::from_db_error)?;

        let __pgtable_tx_result = async { $body }.await;
        match __pgtable_tx_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err($crate::TableError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::TableError::Connection(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}
