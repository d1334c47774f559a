use actix_web::{web, HttpResponse};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::models::{DeliveryMethod, DeliveryMethodResponse};
use crate::response;
use crate::store::{DeliveryMethodFilter, PageRequest, MAX_PAGE_SIZE};
use crate::{parse_object_id, AppState};

const ADMIN_PAGE_SIZE: u64 = 10;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryMethodRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    pub subtitle: Option<String>,
    #[validate(range(
        min = 0,
        max = 1_000_000_000_000,
        message = "Price must be between 0 and 1000000000000"
    ))]
    pub price: i64,
    pub validation_desc: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeliveryMethodRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub subtitle: Option<String>,
    #[validate(range(
        min = 0,
        max = 1_000_000_000_000,
        message = "Price must be between 0 and 1000000000000"
    ))]
    pub price: Option<i64>,
    pub validation_desc: Option<String>,
    pub is_enabled: Option<bool>,
}

impl UpdateDeliveryMethodRequest {
    pub fn apply(self, method: &mut DeliveryMethod) {
        if let Some(name) = self.name {
            method.name = name;
        }
        if let Some(subtitle) = self.subtitle {
            method.subtitle = Some(subtitle);
        }
        if let Some(price) = self.price {
            method.price = price;
        }
        if let Some(validation_desc) = self.validation_desc {
            method.validation_desc = Some(validation_desc);
        }
        if let Some(is_enabled) = self.is_enabled {
            method.is_enabled = is_enabled;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMethodQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub is_enabled: Option<bool>,
}

fn method_not_found() -> ApiError {
    ApiError::NotFound("Delivery method not found".into())
}

fn method_body(method: &DeliveryMethod) -> serde_json::Value {
    json!({ "deliveryMethod": DeliveryMethodResponse::from(method) })
}

async fn load(state: &AppState, raw_id: &str) -> Result<DeliveryMethod, ApiError> {
    let id = parse_object_id(raw_id)?;
    state
        .store
        .find_delivery_method(&id)
        .await?
        .ok_or_else(method_not_found)
}

pub async fn list_enabled(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let filter = DeliveryMethodFilter {
        search: None,
        is_enabled: Some(true),
    };
    let (methods, _) = state
        .store
        .list_delivery_methods(&filter, PageRequest::new(None, None, MAX_PAGE_SIZE))
        .await?;

    let methods: Vec<DeliveryMethodResponse> =
        methods.iter().map(DeliveryMethodResponse::from).collect();
    Ok(response::ok(
        "Delivery methods retrieved successfully",
        json!({ "deliveryMethods": methods }),
    ))
}

/// Public lookup; disabled methods are hidden.
pub async fn get_enabled(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let method = load(&state, &id).await?;
    if !method.is_enabled {
        return Err(method_not_found());
    }
    Ok(response::ok(
        "Delivery method retrieved successfully",
        method_body(&method),
    ))
}

pub async fn list_all(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<DeliveryMethodQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let page = PageRequest::new(query.page, query.limit, ADMIN_PAGE_SIZE);
    let filter = DeliveryMethodFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        is_enabled: query.is_enabled,
    };

    let (methods, total) = state.store.list_delivery_methods(&filter, page).await?;
    debug!("Retrieved {} of {} delivery methods", methods.len(), total);

    let methods: Vec<DeliveryMethodResponse> =
        methods.iter().map(DeliveryMethodResponse::from).collect();
    Ok(response::ok(
        "Delivery methods retrieved successfully",
        json!({
            "deliveryMethods": methods,
            "pagination": response::pagination(&page, total, "totalDeliveryMethods"),
        }),
    ))
}

pub async fn create(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    payload: web::Json<CreateDeliveryMethodRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut payload = payload.into_inner();
    payload.name = payload.name.trim().to_string();
    payload.validate()?;

    let now = BsonDateTime::now();
    let method = DeliveryMethod {
        id: ObjectId::new(),
        name: payload.name,
        subtitle: payload.subtitle,
        price: payload.price,
        validation_desc: payload.validation_desc,
        is_enabled: payload.is_enabled,
        created_by: admin.id,
        updated_by: admin.id,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_delivery_method(&method).await?;

    info!("Admin {} created delivery method {}", admin.id, method.id);
    Ok(response::created(
        "Delivery method created successfully",
        method_body(&method),
    ))
}

pub async fn update(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
    payload: web::Json<UpdateDeliveryMethodRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut payload = payload.into_inner();
    payload.name = payload.name.map(|name| name.trim().to_string());
    payload.validate()?;

    let mut method = load(&state, &id).await?;
    payload.apply(&mut method);
    method.updated_by = admin.id;
    method.updated_at = BsonDateTime::now();

    if !state.store.save_delivery_method(&method).await? {
        return Err(method_not_found());
    }

    info!("Admin {} updated delivery method {}", admin.id, method.id);
    Ok(response::ok(
        "Delivery method updated successfully",
        method_body(&method),
    ))
}

pub async fn toggle(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let mut method = load(&state, &id).await?;
    method.is_enabled = !method.is_enabled;
    method.updated_by = admin.id;
    method.updated_at = BsonDateTime::now();

    if !state.store.save_delivery_method(&method).await? {
        return Err(method_not_found());
    }

    info!(
        "Admin {} {} delivery method {}",
        admin.id,
        if method.is_enabled { "enabled" } else { "disabled" },
        method.id
    );
    Ok(response::ok(
        "Delivery method status updated successfully",
        method_body(&method),
    ))
}

pub async fn delete(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let method_id = parse_object_id(&id)?;
    if !state.store.delete_delivery_method(&method_id).await? {
        return Err(method_not_found());
    }

    info!("Admin {} deleted delivery method {}", admin.id, method_id);
    Ok(response::message("Delivery method deleted successfully"))
}
