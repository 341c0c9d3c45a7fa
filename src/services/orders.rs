//! Order transaction manager: the atomic cart-to-order conversion.
//!
//! Checkout is all-or-nothing: one database transaction covers the locked
//! stock read, validation, order and item inserts, stock decrements and cart
//! clearing. Any failure rolls the whole thing back; nothing is visible to
//! other transactions until commit.

use crate::{
    entities::{
        cart, cart_item, order, order_item, vendor, Cart, CartItem, Order, OrderItem, OrderStatus,
        PaymentStatus, Product, Vendor,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coupons::CouponService, payments::PaymentMethod, stock},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Checkout input. `payment_method` outside the allow-list is stored as NULL
/// rather than failing the order; `coupon_code` is re-validated server-side.
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub shipping_address: Option<String>,
    pub payment_method: Option<String>,
    pub coupon_code: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    coupons: CouponService,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        coupons: CouponService,
    ) -> Self {
        Self {
            db,
            event_sender,
            coupons,
        }
    }

    /// Converts the user's cart into an order.
    ///
    /// Not idempotent: a double submit that races the cart-clearing step can
    /// create two orders. Clients are expected to disable resubmission; see
    /// DESIGN.md for the idempotency-token trade-off.
    ///
    /// On success the cart is empty, stock is decremented by exactly the
    /// ordered quantities, and a best-effort confirmation event is emitted
    /// after commit.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn create_order_from_cart(
        &self,
        user_id: Uuid,
        user_email: Option<String>,
        input: CreateOrderInput,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.db.begin().await?;

        // Absent cart and empty cart are the same business outcome
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        else {
            return Err(ServiceError::CartEmpty);
        };

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        // Lock every referenced product in ascending-id order; the returned
        // quantities and prices are authoritative for the rest of the
        // transaction.
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let locked: HashMap<Uuid, stock::StockRecord> = stock::lock_and_read(&txn, &product_ids)
            .await?
            .into_iter()
            .map(|r| (r.product_id, r))
            .collect();

        for item in &items {
            let record = locked
                .get(&item.product_id)
                .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;
            if record.stock_quantity < item.quantity {
                // Abort the whole checkout even if other lines are satisfiable
                return Err(ServiceError::InsufficientStock(record.name.clone()));
            }
        }

        let total_amount: Decimal = items
            .iter()
            .map(|item| locked[&item.product_id].price * Decimal::from(item.quantity))
            .sum();

        let payment_method = input
            .payment_method
            .as_deref()
            .and_then(PaymentMethod::parse)
            .map(|m| m.as_str().to_string());

        // Server-side coupon redemption against the locked subtotal; the
        // discount is recorded separately and never alters price snapshots.
        let redeemed_code = input.coupon_code.filter(|c| !c.trim().is_empty());
        let discount_amount = match &redeemed_code {
            Some(code) => {
                self.coupons
                    .redeem_for_checkout(&txn, code, total_amount)
                    .await?
            }
            None => Decimal::ZERO,
        };

        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            total_amount: Set(total_amount),
            discount_amount: Set(discount_amount),
            status: Set(OrderStatus::Pending),
            payment_method: Set(payment_method),
            payment_status: Set(PaymentStatus::Pending),
            shipping_address: Set(input.shipping_address),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        order.insert(&txn).await?;

        for item in &items {
            let record = &locked[&item.product_id];
            let order_item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                // Price snapshot from the locked read, immune to later
                // catalog changes
                price: Set(record.price),
            };
            order_item.insert(&txn).await?;
        }

        for item in &items {
            stock::decrement(&txn, &locked[&item.product_id], item.quantity).await?;
        }

        // Items move into the order; the cart row itself persists, now empty
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        if let Some(code) = redeemed_code {
            self.event_sender
                .send_or_log(Event::CouponRedeemed { order_id, code })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                user_id,
                user_email,
                total_amount,
            })
            .await;

        info!(%order_id, %total_amount, "order created from cart {}", cart.id);
        Ok(order_id)
    }

    /// Lists the user's orders, newest first, items embedded.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        let per_page = per_page.clamp(1, 100);
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order = self.load_items(&order_ids).await?;

        Ok((
            orders
                .into_iter()
                .map(|o| {
                    let items = items_by_order.remove(&o.id).unwrap_or_default();
                    OrderView::from_model(o, items)
                })
                .collect(),
            total,
        ))
    }

    /// Loads a single order owned by the user, items joined with product and
    /// vendor names.
    #[instrument(skip(self))]
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound("No order found related to this ID".to_string())
            })?;

        let mut items_by_order = self.load_items(&[order.id]).await?;
        let items = items_by_order.remove(&order.id).unwrap_or_default();
        Ok(OrderView::from_model(order, items))
    }

    async fn load_items(
        &self,
        order_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<OrderItemView>>, ServiceError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.to_vec()))
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

        let mut by_order: HashMap<Uuid, Vec<OrderItemView>> = HashMap::new();
        for (item, product) in rows {
            let (product_name, vendor_name) = match product {
                Some(p) => (Some(p.name), vendors.get(&p.vendor_id).cloned()),
                None => (None, None),
            };
            by_order.entry(item.order_id).or_default().push(OrderItemView {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                product_name,
                vendor_name,
            });
        }
        Ok(by_order)
    }
}

/// Order line projection: the snapshot price plus live product/vendor names.
#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub product_name: Option<String>,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    pub shipping_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    fn from_model(model: order::Model, items: Vec<OrderItemView>) -> Self {
        Self {
            id: model.id,
            total_amount: model.total_amount,
            discount_amount: model.discount_amount,
            status: model.status,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            shipping_address: model.shipping_address,
            created_at: model.created_at,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_is_sum_of_locked_line_totals() {
        let lines = [(dec!(19.99), 2), (dec!(5.00), 3)];
        let total: Decimal = lines
            .iter()
            .map(|(price, qty)| *price * Decimal::from(*qty))
            .sum();
        assert_eq!(total, dec!(54.98));
    }

    #[test]
    fn unknown_payment_method_becomes_null() {
        let stored = Some("paypal")
            .and_then(PaymentMethod::parse)
            .map(|m| m.as_str().to_string());
        assert_eq!(stored, None);

        let stored = Some("bkash")
            .and_then(PaymentMethod::parse)
            .map(|m| m.as_str().to_string());
        assert_eq!(stored.as_deref(), Some("bkash"));
    }

    #[test]
    fn create_order_input_deserialization() {
        let json = r#"{
            "shipping_address": "12 Market Street",
            "payment_method": "card",
            "coupon_code": "SAVE20"
        }"#;
        let input: CreateOrderInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.payment_method.as_deref(), Some("card"));
        assert_eq!(input.coupon_code.as_deref(), Some("SAVE20"));
    }
}
