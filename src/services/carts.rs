//! Cart store: CRUD over a user's pending line items.
//!
//! Stock checks in this module are advisory — they keep obviously-unfillable
//! lines out of carts but are re-validated under row locks at checkout.

use crate::{
    entities::{cart, cart_item, product, vendor, Cart, CartItem, Product, ProductStatus, Vendor},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service. One cart per user, created lazily on first access.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart, creating an empty one on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }

        let cart_id = Uuid::new_v4();
        let cart = cart::ActiveModel {
            id: Set(cart_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let cart = cart.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!("Created cart {} for user {}", cart_id, user_id);
        Ok(cart)
    }

    /// Adds a product to the cart, merging into an existing line for the same
    /// product.
    ///
    /// The product must exist and be active; the requested quantity must not
    /// exceed current stock (advisory check, re-validated at checkout).
    /// Quantity floors are enforced on the input DTO at the request boundary.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<(), ServiceError> {
        let product = Product::find_by_id(input.product_id)
            .filter(product::Column::Status.eq(ProductStatus::Active))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found or inactive".to_string()))?;

        if product.stock_quantity < input.quantity {
            return Err(ServiceError::InsufficientStock(product.name));
        }

        let cart = self.get_or_create_cart(user_id).await?;

        let txn = self.db.begin().await?;

        let existing_item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing_item {
            let merged = item.quantity + input.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(merged);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                quantity: Set(input.quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added product {} x{} to cart {}",
            input.product_id, input.quantity, cart.id
        );
        Ok(())
    }

    /// Sets the quantity of a cart line. Quantity floors are enforced on the
    /// request DTO; callers that want removal use `remove_item`.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let item = self.find_owned_item(user_id, item_id).await?;

        let product = Product::find_by_id(item.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        if product.stock_quantity < quantity {
            return Err(ServiceError::InsufficientStock(product.name));
        }

        let cart_id = item.cart_id;
        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { cart_id, item_id })
            .await;

        Ok(())
    }

    /// Removes a cart line. Absent lines yield `CartItemNotFound` semantics.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let item = self.find_owned_item(user_id, item_id).await?;
        let cart_id = item.cart_id;

        CartItem::delete_by_id(item.id).exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;

        Ok(())
    }

    /// Empties the cart. Clearing an absent or already-empty cart is a no-op
    /// success.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(());
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;

        info!("Cleared cart {}", cart.id);
        Ok(())
    }

    /// Display projection of the cart: lines joined with live product and
    /// vendor data, plus a 2-dp total. Distinct from the locked read used at
    /// checkout.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user_id).await?;

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let vendor_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|(_, p)| p.as_ref().map(|p| p.vendor_id))
            .collect();
        let vendors: HashMap<Uuid, String> = Vendor::find()
            .filter(vendor::Column::Id.is_in(vendor_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|v| (v.id, v.business_name))
            .collect();

        let mut items = Vec::with_capacity(rows.len());
        let mut total = Decimal::ZERO;
        for (item, product) in rows {
            let product = product.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "cart item {} references missing product",
                    item.id
                ))
            })?;
            let line_total = product.price * Decimal::from(item.quantity);
            total += line_total;
            items.push(CartLineView {
                id: item.id,
                product_id: product.id,
                name: product.name,
                price: product.price,
                image_url: product.image_url,
                vendor_name: vendors.get(&product.vendor_id).cloned(),
                quantity: item.quantity,
                stock_quantity: product.stock_quantity,
                line_total,
            });
        }

        Ok(CartView {
            id: cart.id,
            items,
            total_amount: to_money(total),
        })
    }

    async fn find_owned_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        };

        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))
    }
}

/// Rounds to the cent and pins the scale so whole-number totals still
/// serialize with two decimal places.
fn to_money(amount: Decimal) -> Decimal {
    let mut amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(2);
    amount
}

/// Input for adding an item to the cart
#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// One cart line joined with live product data
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub vendor_name: Option<String>,
    pub quantity: i32,
    pub stock_quantity: i32,
    pub line_total: Decimal,
}

/// Cart snapshot for display
#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartLineView>,
    pub total_amount: Decimal,
}
