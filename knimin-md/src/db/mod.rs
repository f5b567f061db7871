//! Lookup store access for knimin-md
//!
//! Narrow query/update surface over the shared SQLite store. Every error is
//! wrapped with the name of the query that raised it.

pub mod barcodes;
pub mod logins;
pub mod lookups;
pub mod surveys;
pub mod zipcodes;

pub use knimin_common::db::{create_schema, init_database};

use knimin_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

/// Upper bound on bound parameters per statement
pub(crate) const MAX_BIND_PARAMS: usize = 500;

/// Placeholder marker replaced with `?, ?, ...` in set-valued queries
pub(crate) const IDS: &str = "{ids}";

/// Comma-separated list of `n` positional placeholders
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Run a single-column barcode query over a set of barcodes
///
/// `template` contains one or more `{ids}` markers; each is expanded to the
/// placeholders of the current chunk and bound in order. Inputs larger than
/// `MAX_BIND_PARAMS` are split across several statements.
pub(crate) async fn select_barcodes(
    pool: &SqlitePool,
    context: &str,
    template: &str,
    barcodes: &[String],
) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    if barcodes.is_empty() {
        return Ok(found);
    }

    let repeats = template.matches(IDS).count().max(1);
    let chunk_size = (MAX_BIND_PARAMS / repeats).max(1);

    for chunk in barcodes.chunks(chunk_size) {
        let sql = template.replace(IDS, &placeholders(chunk.len()));
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for _ in 0..repeats {
            for barcode in chunk {
                query = query.bind(barcode.as_str());
            }
        }
        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| Error::query(context, e))?;
        found.extend(rows);
    }

    Ok(found)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[tokio::test]
    async fn test_select_barcodes_chunks_large_inputs() {
        let pool = memory_store().await;
        for i in 0..(MAX_BIND_PARAMS + 20) {
            insert_kit_barcode(&pool, &format!("{:09}", i), None, None, false, None).await;
        }

        let requested: Vec<String> = (0..(MAX_BIND_PARAMS + 40))
            .map(|i| format!("{:09}", i))
            .collect();
        let found = select_barcodes(
            &pool,
            "test_select",
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids})",
            &requested,
        )
        .await
        .unwrap();

        assert_eq!(found.len(), MAX_BIND_PARAMS + 20);
    }

    #[tokio::test]
    async fn test_select_barcodes_repeated_marker() {
        let pool = memory_store().await;
        insert_kit_barcode(&pool, "000000001", None, None, false, None).await;
        insert_handout_barcode(&pool, "000000002").await;

        let requested = vec![
            "000000001".to_string(),
            "000000002".to_string(),
            "000000003".to_string(),
        ];
        let found = select_barcodes(
            &pool,
            "test_union",
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids}) \
             UNION SELECT barcode FROM ag_handout_barcodes WHERE barcode IN ({ids})",
            &requested,
        )
        .await
        .unwrap();

        assert_eq!(found.len(), 2);
        assert!(!found.contains("000000003"));
    }

    #[tokio::test]
    async fn test_store_errors_carry_query_context() {
        let pool = memory_store().await;
        let err = select_barcodes(
            &pool,
            "broken_query",
            "SELECT barcode FROM no_such_table WHERE barcode IN ({ids})",
            &["000000001".to_string()],
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("broken_query"));
    }
}
