use ledgerlink_core::TransactionRecord;

use crate::error::AggregatorError;
use crate::types::{Aggregator, TransactionsRequest};

/// Drives the transaction listing to completion, advancing `offset` by
/// `count` until the accumulated records reach the server-reported total.
/// Records come back in the order the server delivered them. The first failed
/// request aborts the whole fetch.
pub async fn all_transactions<A>(
    api: &A,
    mut request: TransactionsRequest,
) -> Result<Vec<TransactionRecord>, AggregatorError>
where
    A: Aggregator + ?Sized,
{
    let first = api.transactions_page(&request).await?;
    let total = first.total;
    let mut records = first.transactions;

    while records.len() < total {
        request.offset += request.count;
        let page = api.transactions_page(&request).await?;
        if page.transactions.is_empty() {
            return Err(AggregatorError::TruncatedFeed {
                received: records.len(),
                total,
            });
        }
        records.extend(page.transactions);
    }

    tracing::debug!(
        total,
        range = %request.range,
        "Fetched all transactions"
    );
    Ok(records)
}
