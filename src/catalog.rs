use actix_web::{web, HttpResponse};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use validator::{Validate, ValidationError};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::models::{Category, CategoryResponse, Product, ProductResponse, Variation};
use crate::response;
use crate::store::{PageRequest, ProductFilter, StoreError};
use crate::{parse_object_id, AppState};

const PRODUCT_PAGE_SIZE: u64 = 10;

fn non_blank_entries(values: &[String]) -> Result<(), ValidationError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(ValidationError::new("blank_entry"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariationInput {
    pub color: Option<String>,
    pub size: Option<String>,
    #[validate(range(
        min = 1,
        max = 1_000_000_000_000,
        message = "Price must be between 1 and 1000000000000"
    ))]
    pub price: i64,
    #[validate(range(
        min = 0,
        max = 1_000_000_000_000,
        message = "Discount must be between 0 and 1000000000000"
    ))]
    pub discount: Option<i64>,
    pub weight: Option<String>,
    #[validate(range(
        min = 0,
        max = 1_000_000,
        message = "Stock must be between 0 and 1000000"
    ))]
    pub stock: i64,
    #[validate(
        length(min = 1, message = "At least one image is required"),
        custom = "non_blank_entries"
    )]
    pub images: Vec<String>,
}

impl From<VariationInput> for Variation {
    fn from(input: VariationInput) -> Self {
        Variation {
            color: input.color,
            size: input.size,
            price: input.price,
            discount: input.discount,
            weight: input.weight,
            stock: input.stock,
            images: input.images,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    #[validate(
        length(min = 1, message = "At least one category is required"),
        custom = "non_blank_entries"
    )]
    pub category: Vec<String>,
    #[validate(length(max = 100, message = "Brand cannot exceed 100 characters"))]
    pub brand: Option<String>,
    #[validate(length(min = 1, message = "At least one variation is required"))]
    pub variations: Vec<VariationInput>,
    #[serde(default)]
    pub is_featured: bool,
}

impl ProductRequest {
    /// Checks the product and every variation; nothing is written on failure.
    pub fn checked(mut self) -> Result<Self, ApiError> {
        self.name = self.name.trim().to_string();
        self.validate()?;
        for variation in &self.variations {
            variation.validate()?;
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
}

pub async fn create_product(
    state: web::Data<AppState>,
    _admin: AdminUser,
    payload: web::Json<ProductRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner().checked()?;
    debug!("Creating new product: {}", payload.name);

    let now = BsonDateTime::now();
    let product = Product {
        id: ObjectId::new(),
        name: payload.name,
        description: payload.description,
        category: payload.category,
        brand: payload.brand,
        variations: payload.variations.into_iter().map(Variation::from).collect(),
        is_featured: payload.is_featured,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_product(&product).await?;

    info!("Product created successfully with ID: {}", product.id);
    Ok(response::created(
        "Product created successfully",
        json!({ "product": ProductResponse::from(&product) }),
    ))
}

pub async fn get_product(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let product_id = parse_object_id(&id)?;
    debug!("Fetching product with ID: {}", product_id);

    match state.store.find_product(&product_id).await? {
        Some(product) => Ok(response::ok(
            "Product retrieved successfully",
            json!({ "product": ProductResponse::from(&product) }),
        )),
        None => {
            debug!("Product not found: {}", product_id);
            Err(ApiError::NotFound("Product not found".into()))
        }
    }
}

pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let page = PageRequest::new(query.page, query.limit, PRODUCT_PAGE_SIZE);
    let filter = ProductFilter {
        category: query.category.filter(|c| !c.trim().is_empty()),
        search: query.search.filter(|s| !s.trim().is_empty()),
        featured: query.featured,
    };

    let (products, total) = state.store.list_products(&filter, page).await?;
    info!("Retrieved {} products", products.len());

    let products: Vec<ProductResponse> = products.iter().map(ProductResponse::from).collect();
    Ok(response::ok(
        "Products retrieved successfully",
        json!({
            "products": products,
            "pagination": response::pagination(&page, total, "totalProducts"),
        }),
    ))
}

/// Replaces the editable fields, variations (and their stock) included.
pub async fn update_product(
    state: web::Data<AppState>,
    _admin: AdminUser,
    id: web::Path<String>,
    payload: web::Json<ProductRequest>,
) -> Result<HttpResponse, ApiError> {
    let product_id = parse_object_id(&id)?;
    let payload = payload.into_inner().checked()?;

    let mut product = state
        .store
        .find_product(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;

    product.name = payload.name;
    product.description = payload.description;
    product.category = payload.category;
    product.brand = payload.brand;
    product.variations = payload.variations.into_iter().map(Variation::from).collect();
    product.is_featured = payload.is_featured;
    product.updated_at = BsonDateTime::now();

    if !state.store.save_product(&product).await? {
        return Err(ApiError::NotFound("Product not found".into()));
    }

    info!("Product updated successfully: {}", product_id);
    Ok(response::ok(
        "Product updated successfully",
        json!({ "product": ProductResponse::from(&product) }),
    ))
}

pub async fn delete_product(
    state: web::Data<AppState>,
    _admin: AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let product_id = parse_object_id(&id)?;
    debug!("Deleting product: {}", product_id);

    if !state.store.delete_product(&product_id).await? {
        debug!("Product not found for deletion: {}", product_id);
        return Err(ApiError::NotFound("Product not found".into()));
    }

    info!("Product deleted successfully: {}", product_id);
    Ok(response::message("Product deleted successfully"))
}

// ---------------------------------------------------------------- categories

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Category name must be between 1 and 100 characters"
    ))]
    pub name: String,
}

const CATEGORY_EXISTS: &str = "Category already exists";

fn category_conflict(err: StoreError) -> ApiError {
    match err {
        StoreError::Duplicate(_) => ApiError::Duplicate(CATEGORY_EXISTS.into()),
        other => other.into(),
    }
}

pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = state.store.list_categories().await?;
    let categories: Vec<CategoryResponse> = categories.iter().map(CategoryResponse::from).collect();
    Ok(response::ok(
        "Categories retrieved successfully",
        json!({ "categories": categories }),
    ))
}

pub async fn create_category(
    state: web::Data<AppState>,
    _admin: AdminUser,
    payload: web::Json<CategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut payload = payload.into_inner();
    payload.name = payload.name.trim().to_string();
    payload.validate()?;

    let category = Category {
        id: ObjectId::new(),
        name: payload.name,
        created_at: BsonDateTime::now(),
    };
    state
        .store
        .insert_category(&category)
        .await
        .map_err(category_conflict)?;

    info!("Category created: {}", category.name);
    Ok(response::created(
        "Category created successfully",
        json!({ "category": CategoryResponse::from(&category) }),
    ))
}

pub async fn update_category(
    state: web::Data<AppState>,
    _admin: AdminUser,
    id: web::Path<String>,
    payload: web::Json<CategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let category_id = parse_object_id(&id)?;
    let mut payload = payload.into_inner();
    payload.name = payload.name.trim().to_string();
    payload.validate()?;

    let mut category = state
        .store
        .find_category(&category_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".into()))?;
    category.name = payload.name;

    if !state
        .store
        .save_category(&category)
        .await
        .map_err(category_conflict)?
    {
        return Err(ApiError::NotFound("Category not found".into()));
    }

    info!("Category updated: {}", category_id);
    Ok(response::ok(
        "Category updated successfully",
        json!({ "category": CategoryResponse::from(&category) }),
    ))
}

pub async fn delete_category(
    state: web::Data<AppState>,
    _admin: AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let category_id = parse_object_id(&id)?;
    if !state.store.delete_category(&category_id).await? {
        return Err(ApiError::NotFound("Category not found".into()));
    }

    info!("Category deleted: {}", category_id);
    Ok(response::message("Category deleted successfully"))
}
