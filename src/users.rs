use actix_web::{web, HttpResponse};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use validator::{Validate, ValidationError};

use crate::auth::{hash_password, normalize_email, normalize_name, AdminUser, CurrentUser};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::{Role, User, UserResponse};
use crate::response;
use crate::store::{PageRequest, Store, StoreError, UserFilter};
use crate::{parse_object_id, AppState};

const USER_PAGE_SIZE: u64 = 10;
const EMAIL_TAKEN: &str = "User with this email already exists";

static PASSWORD_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"[a-z]", r"[A-Z]", r"\d", r"[@$!%*?&]", r"^[A-Za-z\d@$!%*?&]"]
        .into_iter()
        .map(|rule| Regex::new(rule).expect("password rule is a valid pattern"))
        .collect()
});

/// Admin passwords need a lowercase letter, an uppercase letter, a digit and
/// one of `@$!%*?&`, and must start with a letter, digit or one of those symbols.
pub fn strong_password(password: &str) -> Result<(), ValidationError> {
    if !PASSWORD_RULES.iter().all(|rule| rule.is_match(password)) {
        let mut err = ValidationError::new("weak_password");
        err.message = Some(
            "Password must contain uppercase, lowercase, number and special character".into(),
        );
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(
        length(min = 8, message = "Password must be at least 8 characters"),
        custom = "strong_password"
    )]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub role: Option<Role>,
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".into())
}

async fn create_admin_account(
    store: &dyn Store,
    cost: u32,
    name: Option<String>,
    email: String,
    password: String,
) -> Result<User, ApiError> {
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Duplicate(EMAIL_TAKEN.into()));
    }

    let user = User {
        id: ObjectId::new(),
        name,
        email,
        password_hash: hash_password(password, cost).await?,
        role: Role::Admin,
        addresses: Vec::new(),
        created_at: BsonDateTime::now(),
    };
    match store.insert_user(&user).await {
        Ok(()) => Ok(user),
        Err(StoreError::Duplicate(_)) => Err(ApiError::Duplicate(EMAIL_TAKEN.into())),
        Err(e) => Err(e.into()),
    }
}

/// Creates the first admin from `ADMIN_EMAIL`/`ADMIN_PASSWORD` when both are
/// set and no account uses that email yet.
pub async fn ensure_bootstrap_admin(store: &dyn Store, config: &AppConfig) -> Result<(), ApiError> {
    let (email, password) = match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => (normalize_email(email), password.clone()),
        _ => {
            debug!("No bootstrap admin configured");
            return Ok(());
        }
    };

    if let Some(existing) = store.find_user_by_email(&email).await? {
        if !existing.is_admin() {
            warn!("Bootstrap admin email {} belongs to a non-admin account", email);
        }
        return Ok(());
    }

    if password.len() < 8 || strong_password(&password).is_err() {
        return Err(ApiError::Validation(
            "ADMIN_PASSWORD does not meet the admin password policy".into(),
        ));
    }

    let admin = create_admin_account(store, config.bcrypt_cost, None, email, password).await?;
    info!("Bootstrap admin created: {}", admin.email);
    Ok(())
}

pub async fn list_users(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let page = PageRequest::new(query.page, query.limit, USER_PAGE_SIZE);
    let filter = UserFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        role: query.role,
    };

    let (users, total) = state.store.list_users(&filter, page).await?;
    debug!("Retrieved {} of {} users", users.len(), total);

    let users: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
    Ok(response::ok(
        "Users retrieved successfully",
        json!({
            "users": users,
            "pagination": response::pagination(&page, total, "totalUsers"),
        }),
    ))
}

pub async fn profile(CurrentUser(user): CurrentUser) -> Result<HttpResponse, ApiError> {
    Ok(response::ok(
        "Profile retrieved successfully",
        json!({ "user": UserResponse::from(&user) }),
    ))
}

pub async fn create_admin(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    payload: web::Json<CreateAdminRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut payload = payload.into_inner();
    payload.email = normalize_email(&payload.email);
    payload.name = payload.name.trim().to_string();
    payload.validate()?;

    let user = create_admin_account(
        state.store.as_ref(),
        state.config.bcrypt_cost,
        Some(payload.name),
        payload.email,
        payload.password,
    )
    .await?;

    info!("Admin {} created admin account {}", admin.id, user.id);
    Ok(response::created(
        "Admin created successfully",
        json!({ "user": UserResponse::from(&user) }),
    ))
}

pub async fn get_user(
    state: web::Data<AppState>,
    _admin: AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = parse_object_id(&id)?;
    let user = state
        .store
        .find_user(&user_id)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(response::ok(
        "User retrieved successfully",
        json!({ "user": UserResponse::from(&user) }),
    ))
}

pub async fn update_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
    payload: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = parse_object_id(&id)?;
    let mut payload = payload.into_inner();
    payload.name = normalize_name(payload.name);
    payload.validate()?;

    let mut user = state
        .store
        .find_user(&user_id)
        .await?
        .ok_or_else(user_not_found)?;
    if let Some(name) = payload.name {
        user.name = Some(name);
    }
    if let Some(role) = payload.role {
        user.role = role;
    }

    if !state.store.save_user(&user).await? {
        return Err(user_not_found());
    }

    info!("Admin {} updated user {}", admin.id, user.id);
    Ok(response::ok(
        "User updated successfully",
        json!({ "user": UserResponse::from(&user) }),
    ))
}

pub async fn delete_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = parse_object_id(&id)?;
    if user_id == admin.id {
        return Err(ApiError::Validation("You cannot delete your own account".into()));
    }
    if !state.store.delete_user(&user_id).await? {
        return Err(user_not_found());
    }

    info!("Admin {} deleted user {}", admin.id, user_id);
    Ok(response::message("User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn password_policy() {
        assert!(strong_password("Str0ng!pass").is_ok());
        assert!(strong_password("weakpass1!").is_err());
        assert!(strong_password("NoDigits!!").is_err());
        assert!(strong_password("NoSpecial12").is_err());
        assert!(strong_password("#BadChar1!").is_err());
        assert!(strong_password("Good#Char1!").is_ok());
    }

    #[test]
    fn password_rules_compile_once() {
        assert_eq!(PASSWORD_RULES.len(), 5);
        let first = PASSWORD_RULES.as_ptr();
        for _ in 0..3 {
            assert!(strong_password("Str0ng!pass").is_ok());
        }
        assert_eq!(PASSWORD_RULES.as_ptr(), first);
    }

    #[test]
    fn create_admin_request_checks_length_and_name() {
        let short = CreateAdminRequest {
            name: "Ali".into(),
            email: "ali@example.com".into(),
            password: "S0!a".into(),
        };
        assert!(short.validate().is_err());

        let nameless = CreateAdminRequest {
            name: "A".into(),
            email: "ali@example.com".into(),
            password: "Str0ng!pass".into(),
        };
        assert!(nameless.validate().is_err());
    }

    #[actix_web::test]
    async fn bootstrap_admin_is_created_once() {
        let store = MemoryStore::new();
        let mut config = AppConfig::with_secret("secret");
        config.bcrypt_cost = 4;
        config.admin_email = Some("Root@Example.com".into());
        config.admin_password = Some("Str0ng!pass".into());

        ensure_bootstrap_admin(&store, &config).await.unwrap();
        ensure_bootstrap_admin(&store, &config).await.unwrap();

        let admin = store
            .find_user_by_email("root@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_admin());
        let (users, total) = store
            .list_users(&UserFilter::default(), PageRequest::new(None, None, 10))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(users.len(), 1);
    }

    #[actix_web::test]
    async fn bootstrap_rejects_weak_password() {
        let store = MemoryStore::new();
        let mut config = AppConfig::with_secret("secret");
        config.admin_email = Some("root@example.com".into());
        config.admin_password = Some("password".into());

        assert!(matches!(
            ensure_bootstrap_admin(&store, &config).await,
            Err(ApiError::Validation(_))
        ));
    }
}
