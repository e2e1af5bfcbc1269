// Pure size arithmetic shared by production and QC
pub mod allocation;

// Orders and customers
pub mod customers;
pub mod orders;

// Production floor
pub mod production;
pub mod qc;

// Stores
pub mod inventory;
pub mod procurement;

// Billing
pub mod invoicing;

// Staff, access and help content
pub mod access;
pub mod files;
pub mod tutorials;

// Downloadable CSV artifacts
pub mod artifacts;

use chrono::NaiveDate;
use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, Order, PaginatorTrait,
    QueryFilter, QuerySelect, Select,
};
use std::sync::Arc;
use tracing::warn;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::PaginatedResponse;

/// Next business number for the day, e.g. `ORD-20240611-0003`.
///
/// Continues from the highest suffix already issued for the day, so deleted rows never free a
/// number. Must run inside the transaction that inserts the row; the column's unique index
/// rejects a concurrent duplicate.
pub(crate) async fn next_document_number<E, C>(
    conn: &C,
    column: E::Column,
    prefix: &str,
    date: NaiveDate,
) -> Result<String, ServiceError>
where
    E: EntityTrait,
    E::Model: Sync,
    C: ConnectionTrait,
{
    let stem = format!("{}-{}-", prefix, date.format("%Y%m%d"));
    let issued: Vec<String> = E::find()
        .select_only()
        .column(column)
        .filter(column.starts_with(stem.as_str()))
        .into_tuple()
        .all(conn)
        .await?;
    let next = highest_suffix(&stem, &issued) + 1;
    Ok(format!("{}{:04}", stem, next))
}

/// Largest numeric suffix after `stem`; unparsable numbers are ignored
fn highest_suffix(stem: &str, issued: &[String]) -> u64 {
    issued
        .iter()
        .filter_map(|number| number.strip_prefix(stem))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

/// Runs a paginated select; `page` is one-based
pub(crate) async fn fetch_page<E, M, C>(
    select: Select<E>,
    conn: &C,
    page: u64,
    limit: u64,
) -> Result<PaginatedResponse<M>, ServiceError>
where
    E: EntityTrait<Model = M>,
    M: FromQueryResult + Sized + Send + Sync,
    C: ConnectionTrait,
{
    let page = page.max(1);
    let limit = limit.max(1);
    let paginator = select.paginate(conn, limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;
    Ok(PaginatedResponse::new(items, total, page, limit))
}

/// `asc` / `desc` (any case); anything else falls back to `default`
pub(crate) fn sort_direction(value: Option<&str>, default: Order) -> Order {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("asc") => Order::Asc,
        Some("desc") => Order::Desc,
        _ => default,
    }
}

/// Trimmed, non-empty search term
pub(crate) fn search_term(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Case-insensitive substring match on a text column; `%` and `_` in the term match literally
pub(crate) fn contains_ci<C: ColumnTrait>(column: C, term: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(like_pattern(term)).escape('\\'))
}

fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Publishes an event after commit; delivery failures are logged only
pub(crate) async fn publish(sender: &Option<Arc<EventSender>>, event: Event) {
    if let Some(sender) = sender {
        if let Err(e) = sender.send(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }
}

/// Empty or whitespace-only optional text becomes `None`
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_direction_parsing() {
        assert_eq!(sort_direction(Some("ASC"), Order::Desc), Order::Asc);
        assert_eq!(sort_direction(Some(" desc "), Order::Asc), Order::Desc);
        assert_eq!(sort_direction(Some("sideways"), Order::Desc), Order::Desc);
        assert_eq!(sort_direction(None, Order::Asc), Order::Asc);
    }

    #[test]
    fn optional_text_cleanup() {
        assert_eq!(clean_optional(Some("  ".into())), None);
        assert_eq!(clean_optional(Some(" rush ".into())), Some("rush".into()));
        assert_eq!(search_term(Some("")), None);
    }

    #[test]
    fn like_wildcards_in_search_terms_are_escaped() {
        assert_eq!(like_pattern("ORD_1"), "%ord\\_1%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn numbering_continues_after_gaps() {
        let stem = "ORD-20240611-";
        let issued = vec![
            "ORD-20240611-0002".to_string(),
            "ORD-20240611-0007".to_string(),
            "ORD-20240611-junk".to_string(),
        ];
        assert_eq!(highest_suffix(stem, &issued), 7);
        assert_eq!(highest_suffix(stem, &[]), 0);
    }
}
