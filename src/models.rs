use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub fn to_chrono(dt: BsonDateTime) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(dt.timestamp_millis())
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

// ---------------------------------------------------------------- users

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub addresses: Vec<Address>,
    pub created_at: BsonDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id.to_hex(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            addresses: user.addresses.clone(),
            created_at: to_chrono(user.created_at),
        }
    }
}

// ---------------------------------------------------------------- catalog

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub price: i64,
    /// Absolute amount taken off `price`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    pub stock: i64,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Variation {
    pub fn effective_price(&self) -> i64 {
        self.price.saturating_sub(self.discount.unwrap_or(0)).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default)]
    pub variations: Vec<Variation>,
    #[serde(default)]
    pub is_featured: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub variations: Vec<Variation>,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        ProductResponse {
            id: product.id.to_hex(),
            name: product.name.clone(),
            description: product.description.clone(),
            category: product.category.clone(),
            brand: product.brand.clone(),
            variations: product.variations.clone(),
            is_featured: product.is_featured,
            created_at: to_chrono(product.created_at),
            updated_at: to_chrono(product.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Category> for CategoryResponse {
    fn from(category: &Category) -> Self {
        CategoryResponse {
            id: category.id.to_hex(),
            name: category.name.clone(),
            created_at: to_chrono(category.created_at),
        }
    }
}

// ---------------------------------------------------------------- delivery

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMethod {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_desc: Option<String>,
    pub is_enabled: bool,
    pub created_by: ObjectId,
    pub updated_by: ObjectId,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMethodResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_desc: Option<String>,
    pub is_enabled: bool,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&DeliveryMethod> for DeliveryMethodResponse {
    fn from(method: &DeliveryMethod) -> Self {
        DeliveryMethodResponse {
            id: method.id.to_hex(),
            name: method.name.clone(),
            subtitle: method.subtitle.clone(),
            price: method.price,
            validation_desc: method.validation_desc.clone(),
            is_enabled: method.is_enabled,
            created_by: method.created_by.to_hex(),
            updated_by: method.updated_by.to_hex(),
            created_at: to_chrono(method.created_at),
            updated_at: to_chrono(method.updated_at),
        }
    }
}

// ---------------------------------------------------------------- cart

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ObjectId,
    pub variation_index: u32,
    pub quantity: i64,
    /// Unit price captured when the item was added.
    pub price: i64,
}

impl CartItem {
    /// `None` when price times quantity does not fit in an `i64`.
    pub fn line_total(&self) -> Option<i64> {
        self.price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: ObjectId,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub updated_at: BsonDateTime,
}

impl Cart {
    pub fn empty(user_id: ObjectId) -> Self {
        Cart {
            user_id,
            items: Vec::new(),
            updated_at: BsonDateTime::now(),
        }
    }

    pub fn subtotal(&self) -> Option<i64> {
        self.items
            .iter()
            .try_fold(0i64, |sum, item| sum.checked_add(item.line_total()?))
    }

    pub fn item_count(&self) -> Option<i64> {
        self.items
            .iter()
            .try_fold(0i64, |count, item| count.checked_add(item.quantity))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub product_id: String,
    pub variation_index: u32,
    pub quantity: i64,
    pub price: i64,
    pub line_total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub item_count: i64,
    pub subtotal: i64,
}

impl CartResponse {
    /// `None` when a line total or the subtotal overflows.
    pub fn build(cart: &Cart) -> Option<Self> {
        let items = cart
            .items
            .iter()
            .map(|item| {
                Some(CartItemResponse {
                    product_id: item.product_id.to_hex(),
                    variation_index: item.variation_index,
                    quantity: item.quantity,
                    price: item.price,
                    line_total: item.line_total()?,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(CartResponse {
            items,
            item_count: cart.item_count()?,
            subtotal: cart.subtotal()?,
        })
    }
}

// ---------------------------------------------------------------- orders

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    #[default]
    #[serde(alias = "pending")]
    #[strum(to_string = "submitted", serialize = "pending")]
    Submitted,
    #[serde(alias = "confirmed", alias = "processing")]
    #[strum(to_string = "inProgress", serialize = "confirmed", serialize = "processing")]
    InProgress,
    #[serde(alias = "shipped")]
    #[strum(to_string = "posted", serialize = "shipped")]
    Posted,
    #[serde(alias = "delivered")]
    #[strum(to_string = "done", serialize = "delivered")]
    Done,
    #[serde(alias = "cancelled")]
    #[strum(to_string = "canceled", serialize = "cancelled")]
    Canceled,
    #[strum(to_string = "returned")]
    Returned,
}

impl OrderStatus {
    /// Customers may only cancel before the parcel leaves.
    pub fn is_cancelable(self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Done | OrderStatus::Canceled | OrderStatus::Returned
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

/// Line of an order, copied from the catalog at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ObjectId,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_brand: Option<String>,
    pub variation_index: u32,
    #[serde(default)]
    pub variation_details: VariationDetails,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub order_number: String,
    pub items: Vec<OrderItem>,

    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax: i64,
    pub discount: i64,
    pub total_amount: i64,

    pub shipping_address: ShippingAddress,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<BsonDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

impl Order {
    /// Sets the status and stamps the matching milestone. Repeated calls re-stamp.
    pub fn apply_status(&mut self, status: OrderStatus, now: BsonDateTime) {
        self.status = status;
        match status {
            OrderStatus::InProgress => self.confirmed_at = Some(now),
            OrderStatus::Posted => self.shipped_at = Some(now),
            OrderStatus::Done => self.delivered_at = Some(now),
            _ => {}
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_brand: Option<String>,
    pub variation_index: u32,
    pub variation_details: VariationDetails,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_price: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub order_number: String,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax: i64,
    pub discount: i64,
    pub total_amount: i64,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        OrderResponse {
            id: order.id.to_hex(),
            user_id: order.user_id.to_hex(),
            order_number: order.order_number.clone(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_hex(),
                    product_name: item.product_name.clone(),
                    product_brand: item.product_brand.clone(),
                    variation_index: item.variation_index,
                    variation_details: item.variation_details.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                })
                .collect(),
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            tax: order.tax,
            discount: order.discount,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address.clone(),
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method.clone(),
            created_at: to_chrono(order.created_at),
            updated_at: to_chrono(order.updated_at),
            confirmed_at: order.confirmed_at.map(to_chrono),
            shipped_at: order.shipped_at.map(to_chrono),
            delivered_at: order.delivered_at.map(to_chrono),
            customer_notes: order.customer_notes.clone(),
            admin_notes: order.admin_notes.clone(),
            tracking_number: order.tracking_number.clone(),
        }
    }
}

/// What the customer gets back right after checkout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub order_number: String,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        OrderSummary {
            id: order.id.to_hex(),
            order_number: order.order_number.clone(),
            total_amount: order.total_amount,
            status: order.status,
            payment_status: order.payment_status,
            created_at: to_chrono(order.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_parses_dashboard_and_legacy_labels() {
        assert_eq!(OrderStatus::from_str("submitted"), Ok(OrderStatus::Submitted));
        assert_eq!(OrderStatus::from_str("pending"), Ok(OrderStatus::Submitted));
        assert_eq!(OrderStatus::from_str("inProgress"), Ok(OrderStatus::InProgress));
        assert_eq!(OrderStatus::from_str("confirmed"), Ok(OrderStatus::InProgress));
        assert_eq!(OrderStatus::from_str("shipped"), Ok(OrderStatus::Posted));
        assert_eq!(OrderStatus::from_str("delivered"), Ok(OrderStatus::Done));
        assert_eq!(OrderStatus::from_str("cancelled"), Ok(OrderStatus::Canceled));
        assert_eq!(OrderStatus::from_str("returned"), Ok(OrderStatus::Returned));
        assert!(OrderStatus::from_str("lost").is_err());
    }

    #[test]
    fn status_prints_canonical_label() {
        assert_eq!(OrderStatus::InProgress.to_string(), "inProgress");
        assert_eq!(OrderStatus::Canceled.to_string(), "canceled");
        assert_eq!(
            serde_json::to_value(OrderStatus::InProgress).unwrap(),
            serde_json::json!("inProgress")
        );
        let legacy: OrderStatus = serde_json::from_str("\"shipped\"").unwrap();
        assert_eq!(legacy, OrderStatus::Posted);
    }

    #[test]
    fn only_early_statuses_are_cancelable() {
        assert!(OrderStatus::Submitted.is_cancelable());
        assert!(OrderStatus::InProgress.is_cancelable());
        assert!(!OrderStatus::Posted.is_cancelable());
        assert!(!OrderStatus::Done.is_cancelable());
        assert!(!OrderStatus::Canceled.is_cancelable());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::Posted.is_terminal());
    }

    #[test]
    fn effective_price_never_negative() {
        let mut variation = Variation {
            color: None,
            size: None,
            price: 1000,
            discount: Some(250),
            weight: None,
            stock: 1,
            images: vec!["a.jpg".into()],
        };
        assert_eq!(variation.effective_price(), 750);
        variation.discount = Some(5000);
        assert_eq!(variation.effective_price(), 0);
        variation.discount = None;
        assert_eq!(variation.effective_price(), 1000);
    }

    #[test]
    fn bson_chrono_conversion_keeps_millis() {
        let now = BsonDateTime::now();
        assert_eq!(to_bson(to_chrono(now)), now);
    }
}
