//! # Report Repository
//!
//! Sales summaries over a time range: revenue, transaction count and the
//! best selling product.
//!
//! Ranges are half-open (`created_at >= start AND created_at < end`). The
//! best seller is grouped by the product name captured at sale time, so
//! renamed or deleted products still report under the name they sold as.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use kasir_core::{BestSellingProduct, ReportRange, SalesReport};

/// Repository for sales reports.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Summarizes all transactions created within `range`.
    pub async fn sales_report(&self, range: ReportRange) -> DbResult<SalesReport> {
        let start = range.start.timestamp_millis();
        let end = range.end.timestamp_millis();

        let (total_revenue, total_transactions): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(total_amount), 0), COUNT(*)
            FROM transactions
            WHERE created_at >= ?1 AND created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        // Ties go to the name that sorts first.
        let best_selling_product = sqlx::query_as::<_, BestSellingProduct>(
            r#"
            SELECT td.product_name AS name, SUM(td.quantity) AS quantity_sold
            FROM transaction_details td
            JOIN transactions t ON t.id = td.transaction_id
            WHERE t.created_at >= ?1 AND t.created_at < ?2
            GROUP BY td.product_name
            ORDER BY quantity_sold DESC, td.product_name ASC
            LIMIT 1
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;

        debug!(
            start = %range.start,
            end = %range.end,
            total_transactions,
            "Built sales report"
        );

        Ok(SalesReport {
            total_revenue,
            total_transactions,
            best_selling_product,
        })
    }

    /// Report for the current UTC day.
    pub async fn today(&self) -> DbResult<SalesReport> {
        let range = ReportRange::for_day(Utc::now().date_naive())?;
        self.sales_report(range).await
    }

    /// Report from the start of `start` through the end of `end`.
    ///
    /// Returns `DbError::InvalidInput` if `start` is after `end`.
    pub async fn for_dates(&self, start: NaiveDate, end: NaiveDate) -> DbResult<SalesReport> {
        let range = ReportRange::for_dates(start, end)?;
        self.sales_report(range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::{Database, DbConfig};
    use chrono::{DateTime, Duration};
    use kasir_core::CoreError;

    async fn insert_sale(db: &Database, at: DateTime<Utc>, lines: &[(&str, i64, i64)]) {
        let total: i64 = lines.iter().map(|(_, _, subtotal)| subtotal).sum();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO transactions (total_amount, created_at) VALUES (?1, ?2) RETURNING id",
        )
        .bind(total)
        .bind(at.timestamp_millis())
        .fetch_one(db.pool())
        .await
        .unwrap();

        for (name, quantity, subtotal) in lines {
            sqlx::query(
                "INSERT INTO transaction_details \
                 (transaction_id, product_id, product_name, quantity, subtotal) \
                 VALUES (?1, 1, ?2, ?3, ?4)",
            )
            .bind(id)
            .bind(*name)
            .bind(*quantity)
            .bind(*subtotal)
            .execute(db.pool())
            .await
            .unwrap();
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_report_for_dates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let start = ReportRange::for_day(day(2024, 3, 1)).unwrap().start;

        insert_sale(&db, start + Duration::hours(9), &[("Kopi", 2, 20000)]).await;
        insert_sale(&db, start + Duration::hours(30), &[("Teh", 5, 25000), ("Kopi", 1, 10000)]).await;
        // Outside the range
        insert_sale(&db, start - Duration::minutes(1), &[("Roti", 50, 50000)]).await;

        let report = db
            .reports()
            .for_dates(day(2024, 3, 1), day(2024, 3, 2))
            .await
            .unwrap();
        assert_eq!(report.total_revenue, 55000);
        assert_eq!(report.total_transactions, 2);
        assert_eq!(
            report.best_selling_product,
            Some(BestSellingProduct {
                name: "Teh".to_string(),
                quantity_sold: 5,
            })
        );

        // End of the last day is exclusive of the next midnight
        let single = db.reports().for_dates(day(2024, 3, 1), day(2024, 3, 1)).await.unwrap();
        assert_eq!(single.total_transactions, 1);
    }

    #[tokio::test]
    async fn test_empty_report() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let report = db.reports().today().await.unwrap();
        assert_eq!(report.total_revenue, 0);
        assert_eq!(report.total_transactions, 0);
        assert_eq!(report.best_selling_product, None);
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .reports()
            .for_dates(day(2024, 3, 2), day(2024, 3, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidInput(CoreError::InvalidDateRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_range_ending_on_last_date_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .reports()
            .for_dates(day(2024, 3, 1), NaiveDate::MAX)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidInput(CoreError::InvalidDateRange { .. })
        ));
    }
}
