use actix_web::{web, HttpResponse};
use mongodb::bson::DateTime as BsonDateTime;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{Cart, CartItem, CartResponse, Product};
use crate::response;
use crate::{parse_object_id, AppState};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub variation_index: u32,
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Quantity must be between 1 and 1000000"
    ))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Quantity must be between 1 and 1000000"
    ))]
    pub quantity: i64,
}

fn cart_too_large() -> ApiError {
    ApiError::Validation("Cart total is too large".into())
}

/// Rejects a cart whose line totals or subtotal no longer fit in an `i64`.
fn check_totals(cart: &Cart) -> Result<(), ApiError> {
    CartResponse::build(cart).map(|_| ()).ok_or_else(cart_too_large)
}

/// Adds `quantity` of a variation, merging into an existing line. The price
/// snapshot is refreshed to the variation's current effective price.
pub fn add_line(
    cart: &mut Cart,
    product: &Product,
    variation_index: u32,
    quantity: i64,
) -> Result<(), ApiError> {
    let variation = product
        .variations
        .get(variation_index as usize)
        .ok_or_else(|| {
            ApiError::InvalidReference(format!("Invalid variation for product {}", product.name))
        })?;

    let existing = cart
        .items
        .iter()
        .position(|item| item.product_id == product.id && item.variation_index == variation_index);
    let wanted = quantity
        .checked_add(existing.map_or(0, |i| cart.items[i].quantity))
        .ok_or_else(cart_too_large)?;

    if wanted > variation.stock {
        return Err(ApiError::InsufficientStock(format!(
            "Insufficient stock for {}. Available: {}",
            product.name, variation.stock
        )));
    }

    let line = CartItem {
        product_id: product.id,
        variation_index,
        quantity: wanted,
        price: variation.effective_price(),
    };
    let mut updated = cart.clone();
    match existing {
        Some(i) => updated.items[i] = line,
        None => updated.items.push(line),
    }
    check_totals(&updated)?;

    *cart = updated;
    Ok(())
}

fn line_not_found() -> ApiError {
    ApiError::NotFound("Cart item not found".into())
}

fn cart_body(cart: &Cart) -> Result<serde_json::Value, ApiError> {
    let cart = CartResponse::build(cart).ok_or_else(cart_too_large)?;
    Ok(json!({ "cart": cart }))
}

pub async fn get_cart(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let cart = state
        .store
        .find_cart(&user.id)
        .await?
        .unwrap_or_else(|| Cart::empty(user.id));

    debug!("Cart for user {} has {} lines", user.id, cart.items.len());
    Ok(response::ok("Cart retrieved successfully", cart_body(&cart)?))
}

pub async fn add_item(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    payload: web::Json<AddItemRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload.validate()?;

    let product_id = parse_object_id(&payload.product_id)?;
    let product = state
        .store
        .find_product(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;

    let mut cart = state
        .store
        .find_cart(&user.id)
        .await?
        .unwrap_or_else(|| Cart::empty(user.id));
    add_line(&mut cart, &product, payload.variation_index, payload.quantity)?;
    cart.updated_at = BsonDateTime::now();
    state.store.save_cart(&cart).await?;

    info!(
        "User {} added {} x {} (variation {}) to cart",
        user.id, payload.quantity, product.name, payload.variation_index
    );
    Ok(response::ok("Item added to cart", cart_body(&cart)?))
}

pub async fn update_item(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    index: web::Path<usize>,
    payload: web::Json<UpdateItemRequest>,
) -> Result<HttpResponse, ApiError> {
    let index = index.into_inner();
    let payload = payload.into_inner();
    payload.validate()?;

    let mut cart = state
        .store
        .find_cart(&user.id)
        .await?
        .ok_or_else(line_not_found)?;
    let line = cart.items.get(index).cloned().ok_or_else(line_not_found)?;

    let product = state
        .store
        .find_product(&line.product_id)
        .await?
        .ok_or_else(|| ApiError::InvalidReference("Invalid product in cart".into()))?;
    let variation = product
        .variations
        .get(line.variation_index as usize)
        .ok_or_else(|| {
            ApiError::InvalidReference(format!("Invalid variation for product {}", product.name))
        })?;
    if payload.quantity > variation.stock {
        return Err(ApiError::InsufficientStock(format!(
            "Insufficient stock for {}. Available: {}",
            product.name, variation.stock
        )));
    }

    cart.items[index].quantity = payload.quantity;
    check_totals(&cart)?;
    cart.updated_at = BsonDateTime::now();
    state.store.save_cart(&cart).await?;

    Ok(response::ok("Cart item updated", cart_body(&cart)?))
}

pub async fn remove_item(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    index: web::Path<usize>,
) -> Result<HttpResponse, ApiError> {
    let index = index.into_inner();
    let mut cart = state
        .store
        .find_cart(&user.id)
        .await?
        .ok_or_else(line_not_found)?;
    if index >= cart.items.len() {
        return Err(line_not_found());
    }

    cart.items.remove(index);
    cart.updated_at = BsonDateTime::now();
    state.store.save_cart(&cart).await?;

    Ok(response::ok("Item removed from cart", cart_body(&cart)?))
}

pub async fn clear_cart(
    state: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let mut cart = Cart::empty(user.id);
    cart.updated_at = BsonDateTime::now();
    state.store.save_cart(&cart).await?;

    debug!("Cleared cart for user {}", user.id);
    Ok(response::ok("Cart cleared", cart_body(&cart)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variation;
    use mongodb::bson::oid::ObjectId;

    fn product(stock: i64) -> Product {
        Product {
            id: ObjectId::new(),
            name: "Bird cage".into(),
            description: None,
            category: vec!["birds".into()],
            brand: None,
            variations: vec![Variation {
                color: Some("white".into()),
                size: None,
                price: 300_000,
                discount: Some(50_000),
                weight: None,
                stock,
                images: vec!["cage.jpg".into()],
            }],
            is_featured: false,
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        }
    }

    #[test]
    fn merges_lines_for_same_variation() {
        let product = product(5);
        let mut cart = Cart::empty(ObjectId::new());
        add_line(&mut cart, &product, 0, 2).unwrap();
        add_line(&mut cart, &product, 0, 1).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.items[0].price, 250_000);
        assert_eq!(cart.subtotal(), Some(750_000));
    }

    #[test]
    fn merged_quantity_cannot_exceed_stock() {
        let product = product(3);
        let mut cart = Cart::empty(ObjectId::new());
        add_line(&mut cart, &product, 0, 2).unwrap();
        assert!(matches!(
            add_line(&mut cart, &product, 0, 2),
            Err(ApiError::InsufficientStock(_))
        ));
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[test]
    fn oversized_totals_leave_cart_unchanged() {
        let mut pricey = product(i64::MAX);
        pricey.variations[0].price = i64::MAX / 2;
        pricey.variations[0].discount = None;
        let mut cart = Cart::empty(ObjectId::new());

        assert!(matches!(
            add_line(&mut cart, &pricey, 0, 3),
            Err(ApiError::Validation(_))
        ));
        assert!(cart.items.is_empty());

        add_line(&mut cart, &pricey, 0, 1).unwrap();
        assert!(matches!(
            add_line(&mut cart, &pricey, 0, i64::MAX),
            Err(ApiError::Validation(_))
        ));
        assert_eq!(cart.items[0].quantity, 1);

        let mut other = product(i64::MAX);
        other.variations[0].price = i64::MAX / 2 + 10;
        other.variations[0].discount = None;
        assert!(matches!(
            add_line(&mut cart, &other, 0, 1),
            Err(ApiError::Validation(_))
        ));
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn quantity_has_an_upper_bound() {
        let request: AddItemRequest = serde_json::from_value(json!({
            "productId": ObjectId::new().to_hex(),
            "quantity": 1_000_001,
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let request: UpdateItemRequest =
            serde_json::from_value(json!({ "quantity": 1_000_000 })).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn unknown_variation_is_rejected() {
        let product = product(3);
        let mut cart = Cart::empty(ObjectId::new());
        assert!(matches!(
            add_line(&mut cart, &product, 4, 1),
            Err(ApiError::InvalidReference(_))
        ));
        assert!(cart.items.is_empty());
    }
}
