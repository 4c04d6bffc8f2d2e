//! # Product Repository
//!
//! Database operations for products (the durable inventory store).
//!
//! ## Key Operations
//! - CRUD operations behind [`InventoryStore`]
//! - Listing with the optional category resolved by id
//!
//! Stock is only decremented by the checkout unit of work (see
//! [`crate::repository::transaction`]); `update` here replaces stock as part
//! of plain product management.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::InventoryStore;
use kasir_core::{Category, NewProduct, Product, ProductWithCategory};

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// let created = repo.create(NewProduct { name: "Kopi".into(), price: 10000, stock: 10, category_id: None }).await?;
/// let product = repo.get_by_id(created.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

/// Row shape of the products ⟕ categories join.
#[derive(Debug, sqlx::FromRow)]
struct ProductCategoryRow {
    id: i64,
    name: String,
    price: i64,
    stock: i64,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_description: Option<String>,
}

impl From<ProductCategoryRow> for ProductWithCategory {
    fn from(row: ProductCategoryRow) -> Self {
        let category = match (row.category_id, row.category_name) {
            (Some(id), Some(name)) => Some(Category {
                id,
                name,
                description: row.category_description.unwrap_or_default(),
            }),
            _ => None,
        };

        ProductWithCategory {
            product: Product {
                id: row.id,
                name: row.name,
                price: row.price,
                stock: row.stock,
                category_id: row.category_id,
            },
            category,
        }
    }
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Lists all products ordered by id.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, stock, category_id
            FROM products
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    /// Lists all products with their category resolved.
    ///
    /// A dangling or null `category_id` yields `category: None`.
    pub async fn list_with_categories(&self) -> DbResult<Vec<ProductWithCategory>> {
        let rows = sqlx::query_as::<_, ProductCategoryRow>(
            r#"
            SELECT
                p.id,
                p.name,
                p.price,
                p.stock,
                p.category_id,
                c.name AS category_name,
                c.description AS category_description
            FROM products p
            LEFT JOIN categories c ON p.category_id = c.id
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductWithCategory::from).collect())
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, stock, category_id
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product with its assigned id
    /// * `Err(DbError::InvalidInput)` - Validation failed
    /// * `Err(DbError::ForeignKeyViolation)` - Category doesn't exist
    pub async fn create(&self, product: NewProduct) -> DbResult<Product> {
        product.validate()?;
        debug!(name = %product.name, "Inserting product");

        let created = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, price, stock, category_id)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, name, price, stock, category_id
            "#,
        )
        .bind(product.name.trim())
        .bind(product.price)
        .bind(product.stock)
        .bind(product.category_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Replaces an existing product's fields.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Updated product
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, id: i64, product: NewProduct) -> DbResult<Product> {
        product.validate()?;
        debug!(id = %id, "Updating product");

        let updated = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name = ?2,
                price = ?3,
                stock = ?4,
                category_id = ?5
            WHERE id = ?1
            RETURNING id, name, price, stock, category_id
            "#,
        )
        .bind(id)
        .bind(product.name.trim())
        .bind(product.price)
        .bind(product.stock)
        .bind(product.category_id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Deletes a product.
    ///
    /// Transaction details keep their snapshot of the name and subtotal.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl InventoryStore for ProductRepository {
    async fn get(&self, id: i64) -> DbResult<Option<Product>> {
        self.get_by_id(id).await
    }

    async fn list(&self) -> DbResult<Vec<Product>> {
        ProductRepository::list(self).await
    }

    async fn create(&self, product: NewProduct) -> DbResult<Product> {
        ProductRepository::create(self, product).await
    }

    async fn update(&self, id: i64, product: NewProduct) -> DbResult<Product> {
        ProductRepository::update(self, id, product).await
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        ProductRepository::delete(self, id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
