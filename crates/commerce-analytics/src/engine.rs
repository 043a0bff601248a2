//! Analytics engine using DuckDB for OLAP queries.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use commerce_domain::{Customer, Order, OrderItem, Product, Review, Seller};
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Timestamp layout used when binding domain timestamps.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// DuckDB-based analytics engine over the marketplace export.
///
/// Tables are filled once through [`AnalyticsEngine::load_csv_dir`] or the
/// `ingest_*` methods; every query afterwards only reads them.
pub struct AnalyticsEngine {
    pub(crate) conn: Connection,
}

impl AnalyticsEngine {
    /// Create a new in-memory analytics engine.
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let engine = Self { conn };
        engine.initialize_schema()?;
        Ok(engine)
    }

    /// Create an in-memory engine and load the dataset found in `dir`.
    pub fn from_csv_dir<P: AsRef<Path>>(dir: P, files: &DatasetFiles) -> Result<Self> {
        let engine = Self::new_in_memory()?;
        engine.load_csv_dir(dir, files)?;
        Ok(engine)
    }

    /// Initialize the analytics schema.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Orders fact table; timestamps are NULL when missing or malformed
            CREATE TABLE IF NOT EXISTS orders (
                order_id VARCHAR NOT NULL,
                customer_id VARCHAR,
                order_purchase_timestamp TIMESTAMP,
                order_delivered_customer_date TIMESTAMP,
                order_estimated_delivery_date TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS order_items (
                order_id VARCHAR NOT NULL,
                product_id VARCHAR
            );

            CREATE TABLE IF NOT EXISTS products (
                product_id VARCHAR NOT NULL,
                product_category_name VARCHAR
            );

            CREATE TABLE IF NOT EXISTS customers (
                customer_id VARCHAR NOT NULL,
                customer_state VARCHAR
            );

            CREATE TABLE IF NOT EXISTS sellers (
                seller_id VARCHAR NOT NULL,
                seller_state VARCHAR
            );

            CREATE TABLE IF NOT EXISTS order_reviews (
                order_id VARCHAR NOT NULL,
                review_score DOUBLE
            );

            -- Delivered orders only; day difference is floored like a timedelta
            CREATE OR REPLACE VIEW deliveries AS
            SELECT
                order_id,
                customer_id,
                CAST(floor(
                    (epoch(order_delivered_customer_date) - epoch(order_purchase_timestamp)) / 86400
                ) AS BIGINT) AS delivery_time_days,
                COALESCE(order_delivered_customer_date > order_estimated_delivery_date, FALSE) AS is_delayed
            FROM orders
            WHERE order_delivered_customer_date IS NOT NULL;
            "#,
        )?;
        Ok(())
    }

    /// Load all six CSV files of the dataset from `dir`.
    ///
    /// Every column is read as text and converted on insert: timestamps and
    /// review scores that fail to parse become NULL instead of aborting the
    /// load. Extra columns in the files are ignored.
    pub fn load_csv_dir<P: AsRef<Path>>(&self, dir: P, files: &DatasetFiles) -> Result<LoadSummary> {
        let dir = dir.as_ref();
        tracing::info!(dir = %dir.display(), "Loading dataset");

        let summary = LoadSummary {
            orders: self.load_table(
                &files.resolve(dir, &files.orders)?,
                "orders",
                r#"
                order_id,
                NULLIF(customer_id, ''),
                TRY_CAST(NULLIF(order_purchase_timestamp, '') AS TIMESTAMP),
                TRY_CAST(NULLIF(order_delivered_customer_date, '') AS TIMESTAMP),
                TRY_CAST(NULLIF(order_estimated_delivery_date, '') AS TIMESTAMP)
                "#,
            )?,
            order_items: self.load_table(
                &files.resolve(dir, &files.order_items)?,
                "order_items",
                "order_id, NULLIF(product_id, '')",
            )?,
            products: self.load_table(
                &files.resolve(dir, &files.products)?,
                "products",
                "product_id, NULLIF(product_category_name, '')",
            )?,
            customers: self.load_table(
                &files.resolve(dir, &files.customers)?,
                "customers",
                "customer_id, NULLIF(customer_state, '')",
            )?,
            sellers: self.load_table(
                &files.resolve(dir, &files.sellers)?,
                "sellers",
                "seller_id, NULLIF(seller_state, '')",
            )?,
            reviews: self.load_table(
                &files.resolve(dir, &files.reviews)?,
                "order_reviews",
                "order_id, TRY_CAST(NULLIF(review_score, '') AS DOUBLE)",
            )?,
        };

        tracing::info!(
            orders = summary.orders,
            order_items = summary.order_items,
            products = summary.products,
            customers = summary.customers,
            sellers = summary.sellers,
            reviews = summary.reviews,
            "Dataset loaded"
        );

        Ok(summary)
    }

    /// Insert the projection `select` of one CSV file into `table`.
    fn load_table(&self, path: &Path, table: &str, select: &str) -> Result<usize> {
        let query = format!(
            "INSERT INTO {table} SELECT {select} FROM read_csv('{}', header = true, all_varchar = true)",
            sql_literal(path)
        );
        let count = self.conn.execute(&query, [])?;
        tracing::debug!(table, rows = count, path = %path.display(), "Loaded CSV");
        Ok(count)
    }

    /// Ingest an order record.
    pub fn ingest_order(&self, order: &Order) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO orders (
                order_id, customer_id, order_purchase_timestamp,
                order_delivered_customer_date, order_estimated_delivery_date
            ) VALUES (
                ?, ?,
                TRY_CAST(CAST(? AS VARCHAR) AS TIMESTAMP),
                TRY_CAST(CAST(? AS VARCHAR) AS TIMESTAMP),
                TRY_CAST(CAST(? AS VARCHAR) AS TIMESTAMP)
            )
            "#,
            params![
                order.order_id,
                order.customer_id,
                format_timestamp(order.purchase_timestamp),
                format_timestamp(order.delivered_timestamp),
                format_timestamp(order.estimated_delivery_date),
            ],
        )?;
        Ok(())
    }

    /// Ingest an order line item.
    pub fn ingest_order_item(&self, item: &OrderItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO order_items (order_id, product_id) VALUES (?, ?)",
            params![item.order_id, item.product_id],
        )?;
        Ok(())
    }

    /// Ingest a product.
    pub fn ingest_product(&self, product: &Product) -> Result<()> {
        self.conn.execute(
            "INSERT INTO products (product_id, product_category_name) VALUES (?, ?)",
            params![product.product_id, product.category_name],
        )?;
        Ok(())
    }

    /// Ingest a customer.
    pub fn ingest_customer(&self, customer: &Customer) -> Result<()> {
        self.conn.execute(
            "INSERT INTO customers (customer_id, customer_state) VALUES (?, ?)",
            params![customer.customer_id, customer.state],
        )?;
        Ok(())
    }

    /// Ingest a seller.
    pub fn ingest_seller(&self, seller: &Seller) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sellers (seller_id, seller_state) VALUES (?, ?)",
            params![seller.seller_id, seller.state],
        )?;
        Ok(())
    }

    /// Ingest a review.
    pub fn ingest_review(&self, review: &Review) -> Result<()> {
        self.conn.execute(
            "INSERT INTO order_reviews (order_id, review_score) VALUES (?, ?)",
            params![review.order_id, review.review_score],
        )?;
        Ok(())
    }

    /// Batch ingest orders.
    pub fn ingest_orders_batch(&self, orders: &[Order]) -> Result<usize> {
        let mut count = 0;
        for order in orders {
            self.ingest_order(order)?;
            count += 1;
        }
        Ok(count)
    }

    /// Batch ingest sellers.
    pub fn ingest_sellers_batch(&self, sellers: &[Seller]) -> Result<usize> {
        let mut count = 0;
        for seller in sellers {
            self.ingest_seller(seller)?;
            count += 1;
        }
        Ok(count)
    }
}

/// File names of the six dataset tables, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFiles {
    /// Orders with purchase, delivery and estimated timestamps.
    pub orders: String,
    /// One row per unit sold, linking orders to products.
    pub order_items: String,
    /// Products with their category.
    pub products: String,
    /// Customers with their state.
    pub customers: String,
    /// Sellers with their state.
    pub sellers: String,
    /// Review scores per order.
    pub reviews: String,
}

impl DatasetFiles {
    /// Join `name` onto `dir`, failing early when the file is absent.
    fn resolve(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        if !path.is_file() {
            return Err(AnalyticsError::MissingInput(path));
        }
        Ok(path)
    }
}

impl Default for DatasetFiles {
    fn default() -> Self {
        Self {
            orders: "olist_orders_dataset.csv".to_string(),
            order_items: "olist_order_items_dataset.csv".to_string(),
            products: "olist_products_dataset.csv".to_string(),
            customers: "olist_customers_dataset.csv".to_string(),
            sellers: "olist_sellers_dataset.csv".to_string(),
            reviews: "olist_order_reviews_dataset.csv".to_string(),
        }
    }
}

/// Rows inserted per table by a dataset load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Rows in `orders`.
    pub orders: usize,
    /// Rows in `order_items`.
    pub order_items: usize,
    /// Rows in `products`.
    pub products: usize,
    /// Rows in `customers`.
    pub customers: usize,
    /// Rows in `sellers`.
    pub sellers: usize,
    /// Rows in `reviews`.
    pub reviews: usize,
}

impl LoadSummary {
    /// Total rows across all tables.
    #[must_use]
    pub fn total(&self) -> usize {
        self.orders + self.order_items + self.products + self.customers + self.sellers + self.reviews
    }
}

fn format_timestamp(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

/// Escape a path for use inside a single-quoted SQL string.
fn sql_literal(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn count(engine: &AnalyticsEngine, table: &str) -> i64 {
        engine
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_engine() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        assert_eq!(count(&engine, "orders"), 0);
        assert_eq!(count(&engine, "deliveries"), 0);
    }

    #[test]
    fn test_ingest_order_derives_delivery() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let at = |d, h| {
            NaiveDate::from_ymd_opt(2018, 3, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };

        engine
            .ingest_orders_batch(&[
                Order {
                    order_id: "o1".to_string(),
                    customer_id: "c1".to_string(),
                    purchase_timestamp: Some(at(1, 10)),
                    delivered_timestamp: Some(at(4, 9)),
                    estimated_delivery_date: Some(at(3, 0)),
                },
                Order {
                    order_id: "o2".to_string(),
                    customer_id: "c2".to_string(),
                    purchase_timestamp: Some(at(1, 10)),
                    delivered_timestamp: None,
                    estimated_delivery_date: Some(at(9, 0)),
                },
            ])
            .unwrap();

        assert_eq!(count(&engine, "orders"), 2);
        assert_eq!(count(&engine, "deliveries"), 1);

        let (days, delayed): (i64, bool) = engine
            .conn
            .query_row(
                "SELECT delivery_time_days, is_delayed FROM deliveries WHERE order_id = 'o1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(days, 2);
        assert!(delayed);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let err = engine.load_csv_dir(dir.path(), &DatasetFiles::default()).unwrap_err();
        match err {
            AnalyticsError::MissingInput(path) => {
                assert!(path.ends_with("olist_orders_dataset.csv"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_named_like_input_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("olist_orders_dataset.csv")).unwrap();

        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let err = engine.load_csv_dir(dir.path(), &DatasetFiles::default()).unwrap_err();
        assert!(matches!(err, AnalyticsError::MissingInput(_)), "{err}");
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal(Path::new("/data/o'brien.csv")), "/data/o''brien.csv");
    }
}
