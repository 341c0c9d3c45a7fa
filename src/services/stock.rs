//! Stock ledger: locked reads and authoritative decrements of product stock.
//!
//! Both operations are scoped to a caller-owned transaction; nothing here is
//! visible to other transactions until the caller commits. The locked read is
//! the only stock value checkout may trust — the advisory checks in the cart
//! path can be stale by the time an order is created.

use crate::entities::{product, Product, ProductStatus};
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

/// Stock and price of one product at locked-read time.
#[derive(Debug, Clone)]
pub struct StockRecord {
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub status: ProductStatus,
}

impl From<product::Model> for StockRecord {
    fn from(model: product::Model) -> Self {
        Self {
            product_id: model.id,
            name: model.name,
            price: model.price,
            stock_quantity: model.stock_quantity,
            status: model.status,
        }
    }
}

/// Acquires an exclusive row lock on each product and returns its current
/// stock and price. Rows are locked in ascending-id order so two checkouts
/// sharing products always contend in the same order and cannot deadlock.
///
/// The locks are held until the enclosing transaction commits or rolls back.
pub async fn lock_and_read(
    txn: &DatabaseTransaction,
    product_ids: &[Uuid],
) -> Result<Vec<StockRecord>, ServiceError> {
    let mut ids: Vec<Uuid> = product_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut query = Product::find()
        .filter(product::Column::Id.is_in(ids))
        .order_by_asc(product::Column::Id);

    // SQLite has a single writer per database and no FOR UPDATE syntax; the
    // explicit row lock is a Postgres concern.
    if txn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }

    let products = query.all(txn).await?;
    Ok(products.into_iter().map(StockRecord::from).collect())
}

/// Subtracts `quantity` from the locked row. The guard filter makes a negative
/// result impossible even if a caller skipped validation against the locked
/// read.
pub async fn decrement(
    txn: &DatabaseTransaction,
    record: &StockRecord,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(quantity),
        )
        .filter(product::Column::Id.eq(record.product_id))
        .filter(product::Column::StockQuantity.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(record.name.clone()));
    }
    Ok(())
}
