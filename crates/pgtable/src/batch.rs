//! Sequential batch updates.
//!
//! Rows are applied in chunks, one transaction per chunk, strictly in
//! order. There is no retry or backpressure: a failing chunk propagates
//! immediately, earlier chunks stay committed, and the remainder is left
//! unattempted.

use crate::client::GenericClient;
use crate::error::{TableError, TableResult};
use crate::ident::Ident;
use crate::param::Params;
use crate::record::{PgValue, Record};
use crate::table::Database;
use std::time::Instant;
use tracing::info;

pub(crate) async fn update_batches(
    db: &Database,
    table: &str,
    rows: &[Record],
    merge_column: &str,
    batch_size: usize,
) -> TableResult<u64> {
    if rows.is_empty() {
        return Ok(0);
    }
    let batch_size = batch_size.max(1);
    let target = Ident::qualified(db.schema(), table)?;
    let merge_ident = Ident::new(merge_column)?;

    let total = rows.len();
    let batches = total.div_ceil(batch_size);
    info!(table, total, batch_size, batches, "starting batch update");

    let mut client = db.client().await?;
    let started = Instant::now();
    let mut updated = 0u64;

    for (index, chunk) in rows.chunks(batch_size).enumerate() {
        let low = index * batch_size;
        let high = low + chunk.len();
        if index > 0 {
            let elapsed = started.elapsed().as_secs_f64();
            let eta_secs = (elapsed / index as f64) * (batches - index) as f64;
            info!(
                batch = index + 1,
                batches,
                low,
                high,
                total,
                eta_secs = eta_secs as u64,
                "updating batch"
            );
        } else {
            info!(batch = index + 1, batches, low, high, total, "updating batch");
        }

        let count = crate::transaction!(client, tx, {
            let mut count = 0u64;
            for record in chunk {
                let (sql, params) = build_row_update(&target, &merge_ident, merge_column, record)?;
                count += tx.execute(&sql, &params.as_refs()).await?;
            }
            Ok(count)
        })?;
        updated += count;
    }

    Ok(updated)
}

/// One UPDATE per record: every key except the merge column becomes a SET
/// clause; the merge column selects the row.
fn build_row_update(
    target: &str,
    merge_ident: &Ident,
    merge_column: &str,
    record: &Record,
) -> TableResult<(String, Params)> {
    let key = record.get(merge_column).ok_or_else(|| {
        TableError::validation(format!("record is missing merge column {merge_column:?}"))
    })?;

    let mut params = Params::new();
    let mut sets = Vec::new();
    for (column, value) in record {
        if column == merge_column {
            continue;
        }
        let idx = params.push(PgValue(value.clone()));
        sets.push(format!("{} = ${idx}", Ident::new(column)?));
    }
    if sets.is_empty() {
        return Err(TableError::validation(
            "record has no columns to update besides the merge column",
        ));
    }

    let key_idx = params.push(PgValue(key.clone()));
    Ok((
        format!(
            "UPDATE {target} SET {} WHERE {merge_ident} = ${key_idx}",
            sets.join(", ")
        ),
        params,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn row_update_sets_everything_but_the_merge_column() {
        let merge = Ident::new("id").unwrap();
        let rec = record(&[
            ("fee_price", json!(1.5)),
            ("fee_value", json!(12)),
            ("id", json!(7)),
        ]);
        let (sql, params) = build_row_update("public.fees", &merge, "id", &rec).unwrap();
        assert_eq!(
            sql,
            "UPDATE public.fees SET fee_price = $1, fee_value = $2 WHERE id = $3"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn missing_merge_column_is_rejected() {
        let merge = Ident::new("id").unwrap();
        let rec = record(&[("fee_price", json!(1.5))]);
        let err = build_row_update("public.fees", &merge, "id", &rec).unwrap_err();
        assert!(err.to_string().contains("merge column"));
    }

    #[test]
    fn merge_only_record_is_rejected() {
        let merge = Ident::new("id").unwrap();
        let rec = record(&[("id", json!(7))]);
        assert!(build_row_update("public.fees", &merge, "id", &rec).is_err());
    }
}
