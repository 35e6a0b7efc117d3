//! Product catalog database operations.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::CatalogCandidate;

const PRODUCT_COLUMNS: &str = "id, name, generic_name, manufacturer, price, in_stock, \
     stock_quantity, requires_prescription, image_urls, active";

impl Database {
    /// Insert or update a product.
    pub fn upsert_product(&self, product: &CatalogCandidate) -> DbResult<()> {
        upsert_product_on(&self.conn, product)
    }

    /// Insert or update many products in one transaction.
    ///
    /// Either every product is stored or none is.
    pub fn import_products(&mut self, products: &[CatalogCandidate]) -> DbResult<usize> {
        let tx = self.transaction()?;
        for product in products {
            upsert_product_on(&tx, product)?;
        }
        tx.commit()?;
        Ok(products.len())
    }

    /// Get a product by id.
    pub fn get_product(&self, id: &str) -> DbResult<Option<CatalogCandidate>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
        let result = self
            .conn
            .query_row(&sql, [id], ProductRow::from_row)
            .optional()?;

        result.map(|row| row.try_into()).transpose()
    }

    /// Case-insensitive substring search on name or generic name.
    ///
    /// Case folding is Unicode-aware (`casefold`), not SQLite's ASCII-only
    /// `LIKE`. Only active products, ordered by name, at most `limit` rows.
    pub fn search_products(&self, query: &str, limit: usize) -> DbResult<Vec<CatalogCandidate>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE active = 1
            AND (casefold(name) LIKE ?1 ESCAPE '\' OR casefold(generic_name) LIKE ?1 ESCAPE '\')
            ORDER BY name
            LIMIT ?2
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![pattern, limit], ProductRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// List products, optionally only active ones.
    pub fn list_products(&self, active_only: bool) -> DbResult<Vec<CatalogCandidate>> {
        let filter = if active_only { "WHERE active = 1" } else { "" };
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products {filter} ORDER BY name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], ProductRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Number of active products.
    pub fn count_active_products(&self) -> DbResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM products WHERE active = 1", [], |row| {
                    row.get(0)
                })?;
        Ok(count.max(0) as usize)
    }

    /// Mark product as inactive (soft delete).
    pub fn deactivate_product(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE products SET active = 0, updated_at = datetime('now') WHERE id = ?",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Update stock level; `in_stock` follows the quantity.
    pub fn set_stock(&self, id: &str, quantity: u32) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE products
            SET stock_quantity = ?2, in_stock = ?3, updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, quantity, quantity > 0],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("product {id}")));
        }
        Ok(())
    }
}

fn upsert_product_on(conn: &Connection, product: &CatalogCandidate) -> DbResult<()> {
    if product.id.trim().is_empty() {
        return Err(DbError::Constraint("product id must not be empty".into()));
    }
    if product.name.trim().is_empty() {
        return Err(DbError::Constraint(format!(
            "product {} has an empty name",
            product.id
        )));
    }
    if !product.price.is_finite() || product.price < 0.0 {
        return Err(DbError::Constraint(format!(
            "product {} has invalid price {}",
            product.id, product.price
        )));
    }

    let image_urls_json = serde_json::to_string(&product.image_urls)?;

    conn.execute(
        r#"
        INSERT INTO products (
            id, name, generic_name, manufacturer, price, in_stock,
            stock_quantity, requires_prescription, image_urls, active, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            generic_name = excluded.generic_name,
            manufacturer = excluded.manufacturer,
            price = excluded.price,
            in_stock = excluded.in_stock,
            stock_quantity = excluded.stock_quantity,
            requires_prescription = excluded.requires_prescription,
            image_urls = excluded.image_urls,
            active = excluded.active,
            updated_at = datetime('now')
        "#,
        params![
            product.id,
            product.name,
            product.generic_name,
            product.manufacturer,
            product.price,
            product.in_stock,
            product.stock_quantity,
            product.requires_prescription,
            image_urls_json,
            product.active,
        ],
    )?;
    Ok(())
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Intermediate row struct for database mapping.
struct ProductRow {
    id: String,
    name: String,
    generic_name: Option<String>,
    manufacturer: Option<String>,
    price: f64,
    in_stock: bool,
    stock_quantity: i64,
    requires_prescription: bool,
    image_urls: String,
    active: bool,
}

impl ProductRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            generic_name: row.get(2)?,
            manufacturer: row.get(3)?,
            price: row.get(4)?,
            in_stock: row.get(5)?,
            stock_quantity: row.get(6)?,
            requires_prescription: row.get(7)?,
            image_urls: row.get(8)?,
            active: row.get(9)?,
        })
    }
}

impl TryFrom<ProductRow> for CatalogCandidate {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let stock_quantity = u32::try_from(row.stock_quantity).map_err(|_| {
            DbError::Constraint(format!(
                "product {} has invalid stock quantity {}",
                row.id, row.stock_quantity
            ))
        })?;

        Ok(CatalogCandidate {
            id: row.id,
            name: row.name,
            generic_name: row.generic_name,
            manufacturer: row.manufacturer,
            price: row.price,
            in_stock: row.in_stock,
            stock_quantity,
            requires_prescription: row.requires_prescription,
            image_urls: serde_json::from_str(&row.image_urls)?,
            active: row.active,
        })
    }
}
