//! Order lifecycle: checkout from the cart, cancellation with restock, and the
//! admin status surface.
//!
//! Stock is reserved per variation with a guarded decrement. A checkout that
//! fails part way releases whatever it already reserved, so a rejected order
//! never leaves stock changed. There is no multi-document transaction.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::auth::{AdminUser, CurrentUser};
use crate::config::PricingConfig;
use crate::error::ApiError;
use crate::models::{
    to_bson, Cart, Order, OrderItem, OrderResponse, OrderStatus, OrderSummary, PaymentStatus,
    ShippingAddress, User, VariationDetails,
};
use crate::response;
use crate::store::{
    OrderFilter, OrderSort, OrderSortField, PageRequest, StatsWindow, Store, StoreError,
};
use crate::{parse_object_id, AppState};

pub const ORDER_NUMBER_PREFIX: &str = "MP";
const ORDER_NUMBER_ATTEMPTS: usize = 5;
const DEFAULT_COUNTRY: &str = "Iran";
const USER_PAGE_SIZE: u64 = 10;
const ADMIN_PAGE_SIZE: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax: i64,
    pub discount: i64,
    pub total_amount: i64,
}

fn order_too_large() -> ApiError {
    ApiError::Validation("Order total is too large".into())
}

pub fn compute_totals(
    items: &[OrderItem],
    pricing: &PricingConfig,
) -> Result<OrderTotals, ApiError> {
    let subtotal = items
        .iter()
        .try_fold(0i64, |sum, item| sum.checked_add(item.total_price))
        .ok_or_else(order_too_large)?;
    let shipping_cost = if subtotal > pricing.free_shipping_threshold {
        0
    } else {
        pricing.shipping_fee
    };
    let tax = 0;
    let discount = 0;
    let total_amount = subtotal
        .checked_add(shipping_cost)
        .and_then(|total| total.checked_add(tax))
        .and_then(|total| total.checked_sub(discount))
        .ok_or_else(order_too_large)?;

    Ok(OrderTotals {
        subtotal,
        shipping_cost,
        tax,
        discount,
        total_amount,
    })
}

/// `MP` + last 8 digits of the epoch-millisecond clock + 3 random digits.
pub fn generate_order_number<R: Rng + ?Sized>(now_millis: i64, rng: &mut R) -> String {
    format!(
        "{}{:08}{:03}",
        ORDER_NUMBER_PREFIX,
        now_millis.rem_euclid(100_000_000),
        rng.gen_range(0..1000)
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub notes: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ShippingAddressInput {
    pub fn into_address(self) -> Result<ShippingAddress, ApiError> {
        let required = |value: &Option<String>, field: &str| {
            present(value).ok_or_else(|| {
                ApiError::Validation(format!("{field} is required in shipping address"))
            })
        };

        Ok(ShippingAddress {
            full_name: required(&self.full_name, "fullName")?,
            phone: required(&self.phone, "phone")?,
            street: required(&self.street, "street")?,
            city: required(&self.city, "city")?,
            postal_code: required(&self.postal_code, "postalCode")?,
            country: present(&self.country).unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            notes: present(&self.notes),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: Option<ShippingAddressInput>,
    pub payment_method: Option<String>,
    pub customer_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub tracking_number: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub user_id: Option<String>,
    pub order_number: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

pub fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    OrderStatus::from_str(raw.trim()).map_err(|_| ApiError::Validation("Invalid status".into()))
}

pub fn parse_payment_status(raw: &str) -> Result<PaymentStatus, ApiError> {
    PaymentStatus::from_str(raw.trim())
        .map_err(|_| ApiError::Validation("Invalid payment status".into()))
}

fn parse_date(raw: &str, end_of_range: bool) -> Result<BsonDateTime, ApiError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(to_bson(at.with_timezone(&Utc)));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::Validation(format!("Invalid date: {raw}")))?;
    // a bare end date covers the whole day
    let day = if end_of_range { day.succ_opt().unwrap_or(day) } else { day };
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ApiError::Validation(format!("Invalid date: {raw}")))?;
    Ok(to_bson(Utc.from_utc_datetime(&midnight)))
}

impl AdminOrderQuery {
    pub fn to_filter(&self) -> Result<OrderFilter, ApiError> {
        let field = match present(&self.sort_by) {
            Some(raw) => OrderSortField::parse(&raw)
                .ok_or_else(|| ApiError::Validation(format!("Invalid sort field: {raw}")))?,
            None => OrderSortField::CreatedAt,
        };
        let descending = !matches!(present(&self.sort_order).as_deref(), Some("asc"));

        Ok(OrderFilter {
            user_id: present(&self.user_id)
                .map(|id| parse_object_id(&id))
                .transpose()?,
            status: present(&self.status)
                .map(|s| parse_status(&s))
                .transpose()?,
            payment_status: present(&self.payment_status)
                .map(|s| parse_payment_status(&s))
                .transpose()?,
            order_number: present(&self.order_number),
            created_from: present(&self.start_date)
                .map(|d| parse_date(&d, false))
                .transpose()?,
            created_before: present(&self.end_date)
                .map(|d| parse_date(&d, true))
                .transpose()?,
            sort: OrderSort { field, descending },
        })
    }
}

/// Calendar-month boundaries (UTC) around `now`.
pub fn stats_window(now: DateTime<Utc>) -> StatsWindow {
    let (year, month) = (now.year(), now.month());
    let (last_year, last_month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    let start = |y: i32, m: u32| {
        Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0)
            .single()
            .map(to_bson)
            .unwrap_or_else(BsonDateTime::now)
    };

    StatsWindow {
        this_month_start: start(year, month),
        last_month_start: start(last_year, last_month),
    }
}

// ---------------------------------------------------------------- lifecycle

async fn build_items(store: &dyn Store, cart: &Cart) -> Result<Vec<OrderItem>, ApiError> {
    let mut items = Vec::with_capacity(cart.items.len());

    for line in &cart.items {
        let product = store
            .find_product(&line.product_id)
            .await?
            .ok_or_else(|| ApiError::InvalidReference("Invalid product in cart".into()))?;
        let variation = product
            .variations
            .get(line.variation_index as usize)
            .ok_or_else(|| {
                ApiError::InvalidReference(format!(
                    "Invalid variation for product {}",
                    product.name
                ))
            })?;

        if variation.stock < line.quantity {
            return Err(ApiError::InsufficientStock(format!(
                "Insufficient stock for {}. Available: {}",
                product.name, variation.stock
            )));
        }

        items.push(OrderItem {
            product_id: product.id,
            product_name: product.name.clone(),
            product_brand: product.brand.clone(),
            variation_index: line.variation_index,
            variation_details: VariationDetails {
                color: variation.color.clone(),
                size: variation.size.clone(),
                weight: variation.weight.clone(),
            },
            quantity: line.quantity,
            unit_price: line.price,
            total_price: line.line_total().ok_or_else(order_too_large)?,
        });
    }

    Ok(items)
}

/// Puts every item's quantity back. Items whose product or variation has
/// since disappeared are skipped.
pub async fn restock(store: &dyn Store, items: &[OrderItem]) -> Result<(), StoreError> {
    for item in items {
        if !store
            .release_stock(&item.product_id, item.variation_index, item.quantity)
            .await?
        {
            warn!(
                "Could not restock {} (variation {}); product no longer exists",
                item.product_id, item.variation_index
            );
        }
    }
    Ok(())
}

async fn rollback(store: &dyn Store, items: &[OrderItem]) {
    if let Err(e) = restock(store, items).await {
        warn!("Failed to release reserved stock: {}", e);
    }
}

/// Takes stock for every item, or for none of them.
pub async fn reserve(store: &dyn Store, items: &[OrderItem]) -> Result<(), ApiError> {
    for (reserved, item) in items.iter().enumerate() {
        match store
            .reserve_stock(&item.product_id, item.variation_index, item.quantity)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                rollback(store, &items[..reserved]).await;
                return Err(ApiError::InsufficientStock(format!(
                    "Insufficient stock for {}",
                    item.product_name
                )));
            }
            Err(e) => {
                rollback(store, &items[..reserved]).await;
                return Err(e.into());
            }
        }
    }
    Ok(())
}

async fn insert_with_fresh_number(store: &dyn Store, order: &mut Order) -> Result<(), ApiError> {
    for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
        order.order_number =
            generate_order_number(Utc::now().timestamp_millis(), &mut rand::thread_rng());
        match store.insert_order(order).await {
            Ok(()) => return Ok(()),
            Err(StoreError::Duplicate(_)) => {
                warn!(attempt, "Order number {} already taken", order.order_number);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Conflict("Could not allocate a unique order number".into()))
}

pub async fn place_order(
    store: &dyn Store,
    pricing: &PricingConfig,
    user: &User,
    request: CreateOrderRequest,
) -> Result<Order, ApiError> {
    let shipping_address = request
        .shipping_address
        .ok_or_else(|| ApiError::Validation("Shipping address is required".into()))?
        .into_address()?;

    let mut cart = match store.find_cart(&user.id).await? {
        Some(cart) if !cart.items.is_empty() => cart,
        _ => return Err(ApiError::EmptyCart),
    };

    let items = build_items(store, &cart).await?;
    let totals = compute_totals(&items, pricing)?;

    reserve(store, &items).await?;

    let now = BsonDateTime::now();
    let mut order = Order {
        id: ObjectId::new(),
        user_id: user.id,
        order_number: String::new(),
        items,
        subtotal: totals.subtotal,
        shipping_cost: totals.shipping_cost,
        tax: totals.tax,
        discount: totals.discount,
        total_amount: totals.total_amount,
        shipping_address,
        status: OrderStatus::Submitted,
        payment_status: PaymentStatus::Pending,
        payment_method: present(&request.payment_method),
        created_at: now,
        updated_at: now,
        confirmed_at: None,
        shipped_at: None,
        delivered_at: None,
        customer_notes: present(&request.customer_notes),
        admin_notes: None,
        tracking_number: None,
    };

    if let Err(e) = insert_with_fresh_number(store, &mut order).await {
        rollback(store, &order.items).await;
        return Err(e);
    }

    cart.items.clear();
    cart.updated_at = now;
    if let Err(e) = store.save_cart(&cart).await {
        warn!(
            "Order {} placed but cart of user {} was not cleared: {}",
            order.order_number, user.id, e
        );
    }

    info!(
        "Order {} created for user {} ({} items, total {})",
        order.order_number,
        user.id,
        order.items.len(),
        order.total_amount
    );
    Ok(order)
}

pub async fn cancel(
    store: &dyn Store,
    user: &User,
    order_id: &ObjectId,
) -> Result<Order, ApiError> {
    let mut order = store
        .find_order(order_id)
        .await?
        .filter(|order| order.user_id == user.id)
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    if !order.status.is_cancelable() {
        return Err(ApiError::InvalidTransition(
            "Order cannot be cancelled at this stage".into(),
        ));
    }

    let open = [OrderStatus::Submitted, OrderStatus::InProgress];
    order.apply_status(OrderStatus::Canceled, BsonDateTime::now());
    if !store.save_order_if_status(&order, &open).await? {
        return Err(ApiError::InvalidTransition(
            "Order cannot be cancelled at this stage".into(),
        ));
    }
    restock(store, &order.items).await?;

    info!("Order {} cancelled by user {}", order.order_number, user.id);
    Ok(order)
}

/// Admin status change. Any status may follow any other; only the value itself is checked.
pub async fn update_status(
    store: &dyn Store,
    order_id: &ObjectId,
    request: UpdateStatusRequest,
) -> Result<Order, ApiError> {
    let status = match present(&request.status) {
        Some(raw) => parse_status(&raw)?,
        None => return Err(ApiError::Validation("Status is required".into())),
    };

    let mut order = store
        .find_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    let previous = order.status;
    if previous.is_terminal() && previous != status {
        warn!(
            "Order {} moved out of terminal status {}",
            order.order_number, previous
        );
    }
    order.apply_status(status, BsonDateTime::now());
    if let Some(tracking_number) = present(&request.tracking_number) {
        order.tracking_number = Some(tracking_number);
    }
    if let Some(admin_notes) = present(&request.admin_notes) {
        order.admin_notes = Some(admin_notes);
    }
    store.save_order(&order).await?;

    info!(
        "Order {} status {} -> {}",
        order.order_number, previous, order.status
    );
    Ok(order)
}

// ---------------------------------------------------------------- handlers

pub async fn create_order(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    payload: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    debug!("Creating order for user {}", user.id);
    let order = place_order(
        state.store.as_ref(),
        &state.config.pricing,
        &user,
        payload.into_inner(),
    )
    .await?;

    Ok(response::created(
        "Order created successfully",
        json!({ "order": OrderSummary::from(&order) }),
    ))
}

pub async fn list_my_orders(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = PageRequest::new(query.page, query.limit, USER_PAGE_SIZE);
    let filter = OrderFilter {
        user_id: Some(user.id),
        ..OrderFilter::default()
    };
    let (orders, total) = state.store.list_orders(&filter, page).await?;

    debug!("Retrieved {} of {} orders for user {}", orders.len(), total, user.id);
    let orders: Vec<OrderResponse> = orders.iter().map(OrderResponse::from).collect();
    Ok(response::ok(
        "Orders retrieved successfully",
        json!({
            "orders": orders,
            "pagination": response::pagination(&page, total, "totalOrders"),
        }),
    ))
}

pub async fn get_my_order(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_object_id(&id)?;
    let order = state
        .store
        .find_order(&order_id)
        .await?
        .filter(|order| order.user_id == user.id)
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    Ok(response::ok(
        "Order retrieved successfully",
        json!({ "order": OrderResponse::from(&order) }),
    ))
}

pub async fn cancel_order(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_object_id(&id)?;
    let order = cancel(state.store.as_ref(), &user, &order_id).await?;

    Ok(response::ok(
        "Order cancelled successfully",
        json!({ "order": OrderResponse::from(&order) }),
    ))
}

pub async fn list_all_orders(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<AdminOrderQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = PageRequest::new(query.page, query.limit, ADMIN_PAGE_SIZE);
    let filter = query.to_filter()?;
    let (orders, total) = state.store.list_orders(&filter, page).await?;

    debug!("Admin order listing returned {} of {}", orders.len(), total);
    let orders: Vec<OrderResponse> = orders.iter().map(OrderResponse::from).collect();
    Ok(response::ok(
        "Orders retrieved successfully",
        json!({
            "orders": orders,
            "pagination": response::pagination(&page, total, "totalOrders"),
            "filters": {
                "status": filter.status,
                "paymentStatus": filter.payment_status,
                "userId": filter.user_id.map(|id| id.to_hex()),
                "orderNumber": filter.order_number,
                "startDate": query.start_date,
                "endDate": query.end_date,
                "sortBy": filter.sort.field.field_name(),
                "sortOrder": if filter.sort.descending { "desc" } else { "asc" },
            },
        }),
    ))
}

pub async fn get_any_order(
    state: web::Data<AppState>,
    _admin: AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_object_id(&id)?;
    let order = state
        .store
        .find_order(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    Ok(response::ok(
        "Order retrieved successfully",
        json!({ "order": OrderResponse::from(&order) }),
    ))
}

pub async fn update_order_status(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_object_id(&id)?;
    debug!("Admin {} updating status of order {}", admin.id, order_id);
    let order = update_status(state.store.as_ref(), &order_id, payload.into_inner()).await?;

    Ok(response::ok(
        "Order status updated successfully",
        json!({ "order": OrderResponse::from(&order) }),
    ))
}

pub async fn update_payment_status(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
    payload: web::Json<UpdatePaymentRequest>,
) -> Result<HttpResponse, ApiError> {
    let order_id = parse_object_id(&id)?;
    let payment_status = match present(&payload.payment_status) {
        Some(raw) => parse_payment_status(&raw)?,
        None => return Err(ApiError::Validation("Payment status is required".into())),
    };

    let mut order = state
        .store
        .find_order(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
    order.payment_status = payment_status;
    order.updated_at = BsonDateTime::now();
    state.store.save_order(&order).await?;

    info!(
        "Admin {} set payment status of order {} to {}",
        admin.id, order.order_number, payment_status
    );
    Ok(response::ok(
        "Payment status updated successfully",
        json!({ "order": OrderResponse::from(&order) }),
    ))
}

pub async fn order_stats(
    state: web::Data<AppState>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let stats = state.store.order_stats(stats_window(Utc::now())).await?;
    Ok(response::ok("Order statistics retrieved successfully", stats))
}
