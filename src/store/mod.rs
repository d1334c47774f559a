//! Persistence seam. Handlers only ever talk to [`Store`]; `mongo` backs it in
//! production and `memory` backs tests and local runs.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{
    Cart, Category, DeliveryMethod, Order, OrderStatus, PaymentStatus, Product, Role, User,
};

pub const MAX_PAGE_SIZE: u64 = 100;
/// Highest page number honoured; keeps the skip offset inside MongoDB's `i64` range.
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("failed to decode record: {0}")]
    Decode(#[from] mongodb::bson::de::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 1-based page plus page size, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64) -> Self {
        PageRequest {
            page: page.filter(|p| *p > 0).unwrap_or(1).min(MAX_PAGE),
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(default_limit)
                .min(MAX_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryMethodFilter {
    pub search: Option<String>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderSortField {
    #[default]
    CreatedAt,
    TotalAmount,
    OrderNumber,
    Status,
}

impl OrderSortField {
    pub fn field_name(self) -> &'static str {
        match self {
            OrderSortField::CreatedAt => "createdAt",
            OrderSortField::TotalAmount => "totalAmount",
            OrderSortField::OrderNumber => "orderNumber",
            OrderSortField::Status => "status",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "createdAt" => Some(OrderSortField::CreatedAt),
            "totalAmount" => Some(OrderSortField::TotalAmount),
            "orderNumber" => Some(OrderSortField::OrderNumber),
            "status" => Some(OrderSortField::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSort {
    pub field: OrderSortField,
    pub descending: bool,
}

impl Default for OrderSort {
    fn default() -> Self {
        OrderSort {
            field: OrderSortField::CreatedAt,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<ObjectId>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub order_number: Option<String>,
    /// Inclusive lower bound on `createdAt`.
    pub created_from: Option<BsonDateTime>,
    /// Exclusive upper bound on `createdAt`.
    pub created_before: Option<BsonDateTime>,
    pub sort: OrderSort,
}

/// Month boundaries used by the dashboard statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsWindow {
    pub this_month_start: BsonDateTime,
    pub last_month_start: BsonDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBucket {
    pub count: u64,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: u64,
    pub orders_this_month: u64,
    pub orders_last_month: u64,
    pub revenue_this_month: i64,
    pub revenue_last_month: i64,
    pub total_revenue: i64,
    pub orders_by_status: BTreeMap<String, u64>,
    pub payment_stats: BTreeMap<String, PaymentBucket>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<User>, u64)>;
    async fn save_user(&self, user: &User) -> StoreResult<bool>;
    async fn delete_user(&self, id: &ObjectId) -> StoreResult<bool>;

    // products
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn find_product(&self, id: &ObjectId) -> StoreResult<Option<Product>>;
    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Product>, u64)>;
    async fn save_product(&self, product: &Product) -> StoreResult<bool>;
    async fn delete_product(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Takes `quantity` units off a variation only if at least that many are in
    /// stock. `false` means nothing changed.
    async fn reserve_stock(
        &self,
        product_id: &ObjectId,
        variation_index: u32,
        quantity: i64,
    ) -> StoreResult<bool>;

    /// Puts `quantity` units back. `false` when the product or variation is gone.
    async fn release_stock(
        &self,
        product_id: &ObjectId,
        variation_index: u32,
        quantity: i64,
    ) -> StoreResult<bool>;

    // categories
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn find_category(&self, id: &ObjectId) -> StoreResult<Option<Category>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn save_category(&self, category: &Category) -> StoreResult<bool>;
    async fn delete_category(&self, id: &ObjectId) -> StoreResult<bool>;

    // delivery methods
    async fn insert_delivery_method(&self, method: &DeliveryMethod) -> StoreResult<()>;
    async fn find_delivery_method(&self, id: &ObjectId) -> StoreResult<Option<DeliveryMethod>>;
    async fn list_delivery_methods(
        &self,
        filter: &DeliveryMethodFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<DeliveryMethod>, u64)>;
    async fn save_delivery_method(&self, method: &DeliveryMethod) -> StoreResult<bool>;
    async fn delete_delivery_method(&self, id: &ObjectId) -> StoreResult<bool>;

    // carts
    async fn find_cart(&self, user_id: &ObjectId) -> StoreResult<Option<Cart>>;
    async fn save_cart(&self, cart: &Cart) -> StoreResult<()>;

    // orders
    /// Fails with [`StoreError::Duplicate`] when the order number is taken.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;
    async fn find_order(&self, id: &ObjectId) -> StoreResult<Option<Order>>;
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Order>, u64)>;
    async fn save_order(&self, order: &Order) -> StoreResult<bool>;
    /// Replaces the order only while its stored status is one of `expected`.
    /// `false` means another writer moved it first, or it is gone.
    async fn save_order_if_status(
        &self,
        order: &Order,
        expected: &[OrderStatus],
    ) -> StoreResult<bool>;
    async fn order_stats(&self, window: StatsWindow) -> StoreResult<OrderStats>;
}
