#![allow(dead_code)]

use std::sync::Arc;

use actix_web::web;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde_json::{json, Value};

use miropet_api::auth::generate_token;
use miropet_api::config::AppConfig;
use miropet_api::models::{Cart, CartItem, Product, Role, User, Variation};
use miropet_api::store::{MemoryStore, Store};
use miropet_api::AppState;

pub const SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "Passw0rd!";

/// Application state over a fresh in-memory store, plus seeding helpers.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub state: web::Data<AppState>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut config = AppConfig::with_secret(SECRET);
        config.bcrypt_cost = 4;
        let state = web::Data::new(AppState::new(store.clone(), config));
        TestContext { store, state }
    }

    pub async fn seed_user(&self, email: &str, role: Role) -> User {
        let user = User {
            id: ObjectId::new(),
            name: Some("Test User".into()),
            email: email.to_string(),
            password_hash: bcrypt::hash(PASSWORD, 4).expect("hash password"),
            role,
            addresses: Vec::new(),
            created_at: BsonDateTime::now(),
        };
        self.store.insert_user(&user).await.expect("insert user");
        user
    }

    pub fn bearer(&self, user: &User) -> (&'static str, String) {
        let token = generate_token(&user.id, SECRET, chrono::Duration::hours(1)).expect("token");
        ("Authorization", format!("Bearer {token}"))
    }

    pub async fn seed_product(&self, name: &str, price: i64, stock: i64) -> Product {
        let now = BsonDateTime::now();
        let product = Product {
            id: ObjectId::new(),
            name: name.to_string(),
            description: None,
            category: vec!["dogs".into()],
            brand: Some("Miro".into()),
            variations: vec![Variation {
                color: Some("red".into()),
                size: Some("M".into()),
                price,
                discount: None,
                weight: None,
                stock,
                images: vec!["item.jpg".into()],
            }],
            is_featured: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_product(&product).await.expect("insert product");
        product
    }

    pub async fn fill_cart(&self, user: &User, lines: &[(&Product, i64)]) {
        let cart = Cart {
            user_id: user.id,
            items: lines
                .iter()
                .map(|(product, quantity)| CartItem {
                    product_id: product.id,
                    variation_index: 0,
                    quantity: *quantity,
                    price: product.variations[0].effective_price(),
                })
                .collect(),
            updated_at: BsonDateTime::now(),
        };
        self.store.save_cart(&cart).await.expect("save cart");
    }

    pub async fn stock_of(&self, product: &Product) -> i64 {
        self.store
            .find_product(&product.id)
            .await
            .expect("find product")
            .expect("product exists")
            .variations[0]
            .stock
    }

    pub async fn cart_len(&self, user: &User) -> usize {
        self.store
            .find_cart(&user.id)
            .await
            .expect("find cart")
            .map_or(0, |cart| cart.items.len())
    }
}

pub fn shipping_address() -> Value {
    json!({
        "fullName": "Sara Ahmadi",
        "phone": "09120000000",
        "street": "Valiasr St. 12",
        "city": "Tehran",
        "postalCode": "1234567890"
    })
}
