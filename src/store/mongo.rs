use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions, ReplaceOptions},
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::{
    DeliveryMethodFilter, OrderFilter, OrderStats, PageRequest, PaymentBucket, ProductFilter,
    StatsWindow, Store, StoreError, StoreResult, UserFilter,
};
use crate::config::AppConfig;
use crate::models::{
    Cart, Category, DeliveryMethod, Order, OrderStatus, PaymentStatus, Product, User,
};

const USERS: &str = "users";
const PRODUCTS: &str = "products";
const CATEGORIES: &str = "categories";
const DELIVERY_METHODS: &str = "deliverymethods";
const CARTS: &str = "carts";
const ORDERS: &str = "orders";

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(config: &AppConfig) -> Result<Self, MongoError> {
        let client = Client::with_uri_str(&config.mongo_uri).await?;
        let store = MongoStore {
            database: client.database(&config.database_name),
        };
        store.ensure_indexes().await?;
        info!(database = %config.database_name, "MongoDB connection established");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), MongoError> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.collection::<User>(USERS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.collection::<Category>(CATEGORIES)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "name": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.collection::<Cart>(CARTS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "userId": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;

        let orders = self.collection::<Order>(ORDERS);
        orders
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "orderNumber": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        for keys in [
            doc! { "userId": 1 },
            doc! { "status": 1 },
            doc! { "paymentStatus": 1 },
            doc! { "createdAt": -1 },
        ] {
            orders
                .create_index(IndexModel::builder().keys(keys).build(), None)
                .await?;
        }

        debug!("MongoDB indexes ensured");
        Ok(())
    }

    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }

    async fn insert<T: Serialize + Send + Sync>(&self, name: &str, record: &T) -> StoreResult<()> {
        self.collection::<T>(name)
            .insert_one(record, None)
            .await
            .map_err(|e| duplicate_or(e, name))?;
        Ok(())
    }

    async fn find_by_id<T>(&self, name: &str, id: &ObjectId) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(self
            .collection::<T>(name)
            .find_one(doc! { "_id": *id }, None)
            .await?)
    }

    async fn replace_by_id<T: Serialize + Send + Sync>(
        &self,
        name: &str,
        id: &ObjectId,
        record: &T,
    ) -> StoreResult<bool> {
        let result = self
            .collection::<T>(name)
            .replace_one(doc! { "_id": *id }, record, None)
            .await
            .map_err(|e| duplicate_or(e, name))?;
        Ok(result.matched_count > 0)
    }

    async fn delete_by_id(&self, name: &str, id: &ObjectId) -> StoreResult<bool> {
        let result = self
            .collection::<Document>(name)
            .delete_one(doc! { "_id": *id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn page<T>(
        &self,
        name: &str,
        filter: Document,
        sort: Document,
        page: PageRequest,
    ) -> StoreResult<(Vec<T>, u64)>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let collection = self.collection::<T>(name);
        let total = collection.count_documents(filter.clone(), None).await?;
        let options = FindOptions::builder()
            .sort(sort)
            .skip(page.skip())
            .limit(i64::try_from(page.limit).unwrap_or(i64::MAX))
            .build();
        let records = collection.find(filter, options).await?.try_collect().await?;
        Ok((records, total))
    }

    async fn sum_total_amount(&self, filter: Document) -> StoreResult<i64> {
        let pipeline = [
            doc! { "$match": filter },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$totalAmount" } } },
        ];
        let mut cursor = self
            .collection::<Order>(ORDERS)
            .aggregate(pipeline, None)
            .await?;
        Ok(match cursor.try_next().await? {
            Some(group) => number(&group, "total"),
            None => 0,
        })
    }

    async fn group_orders(&self, field: &str) -> StoreResult<Vec<Document>> {
        let pipeline = [doc! {
            "$group": {
                "_id": format!("${field}"),
                "count": { "$sum": 1 },
                "totalAmount": { "$sum": "$totalAmount" },
            }
        }];
        let cursor = self
            .collection::<Order>(ORDERS)
            .aggregate(pipeline, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

fn duplicate_or(err: MongoError, collection: &str) -> StoreError {
    let duplicate = matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    );
    if duplicate {
        StoreError::Duplicate(collection.to_string())
    } else {
        StoreError::Database(err)
    }
}

fn number(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

fn contains_ignore_case(needle: &str) -> Document {
    doc! { "$regex": regex::escape(needle), "$options": "i" }
}

fn variation_stock_path(variation_index: u32) -> String {
    format!("variations.{variation_index}.stock")
}

fn order_filter_document(filter: &OrderFilter) -> Document {
    let mut query = doc! {};
    if let Some(user_id) = filter.user_id {
        query.insert("userId", user_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.to_string());
    }
    if let Some(payment_status) = filter.payment_status {
        query.insert("paymentStatus", payment_status.to_string());
    }
    if let Some(order_number) = &filter.order_number {
        query.insert("orderNumber", contains_ignore_case(order_number));
    }
    let mut created = doc! {};
    if let Some(from) = filter.created_from {
        created.insert("$gte", from);
    }
    if let Some(before) = filter.created_before {
        created.insert("$lt", before);
    }
    if !created.is_empty() {
        query.insert("createdAt", created);
    }
    query
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.insert(USERS, user).await
    }

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<User>> {
        self.find_by_id(USERS, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .collection::<User>(USERS)
            .find_one(doc! { "email": email }, None)
            .await?)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<User>, u64)> {
        let mut query = doc! {};
        if let Some(search) = &filter.search {
            query.insert(
                "$or",
                vec![
                    doc! { "name": contains_ignore_case(search) },
                    doc! { "email": contains_ignore_case(search) },
                ],
            );
        }
        if let Some(role) = filter.role {
            query.insert("role", role.to_string());
        }
        self.page(USERS, query, doc! { "createdAt": -1 }, page).await
    }

    async fn save_user(&self, user: &User) -> StoreResult<bool> {
        self.replace_by_id(USERS, &user.id, user).await
    }

    async fn delete_user(&self, id: &ObjectId) -> StoreResult<bool> {
        self.delete_by_id(USERS, id).await
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.insert(PRODUCTS, product).await
    }

    async fn find_product(&self, id: &ObjectId) -> StoreResult<Option<Product>> {
        self.find_by_id(PRODUCTS, id).await
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Product>, u64)> {
        let mut query = doc! {};
        if let Some(category) = &filter.category {
            query.insert("category", category.as_str());
        }
        if let Some(search) = &filter.search {
            query.insert(
                "$or",
                vec![
                    doc! { "name": contains_ignore_case(search) },
                    doc! { "brand": contains_ignore_case(search) },
                ],
            );
        }
        if let Some(featured) = filter.featured {
            query.insert("isFeatured", featured);
        }
        self.page(PRODUCTS, query, doc! { "createdAt": -1 }, page).await
    }

    async fn save_product(&self, product: &Product) -> StoreResult<bool> {
        self.replace_by_id(PRODUCTS, &product.id, product).await
    }

    async fn delete_product(&self, id: &ObjectId) -> StoreResult<bool> {
        self.delete_by_id(PRODUCTS, id).await
    }

    async fn reserve_stock(
        &self,
        product_id: &ObjectId,
        variation_index: u32,
        quantity: i64,
    ) -> StoreResult<bool> {
        let path = variation_stock_path(variation_index);
        let mut filter = doc! { "_id": *product_id };
        filter.insert(path.clone(), doc! { "$gte": quantity });
        let mut increment = doc! {};
        increment.insert(path, -quantity);

        let result = self
            .collection::<Product>(PRODUCTS)
            .update_one(filter, doc! { "$inc": increment }, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn release_stock(
        &self,
        product_id: &ObjectId,
        variation_index: u32,
        quantity: i64,
    ) -> StoreResult<bool> {
        let path = variation_stock_path(variation_index);
        let mut filter = doc! { "_id": *product_id };
        filter.insert(path.clone(), doc! { "$exists": true });
        let mut increment = doc! {};
        increment.insert(path, quantity);

        let result = self
            .collection::<Product>(PRODUCTS)
            .update_one(filter, doc! { "$inc": increment }, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        self.insert(CATEGORIES, category).await
    }

    async fn find_category(&self, id: &ObjectId) -> StoreResult<Option<Category>> {
        self.find_by_id(CATEGORIES, id).await
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        Ok(self
            .collection::<Category>(CATEGORIES)
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn save_category(&self, category: &Category) -> StoreResult<bool> {
        self.replace_by_id(CATEGORIES, &category.id, category).await
    }

    async fn delete_category(&self, id: &ObjectId) -> StoreResult<bool> {
        self.delete_by_id(CATEGORIES, id).await
    }

    async fn insert_delivery_method(&self, method: &DeliveryMethod) -> StoreResult<()> {
        self.insert(DELIVERY_METHODS, method).await
    }

    async fn find_delivery_method(&self, id: &ObjectId) -> StoreResult<Option<DeliveryMethod>> {
        self.find_by_id(DELIVERY_METHODS, id).await
    }

    async fn list_delivery_methods(
        &self,
        filter: &DeliveryMethodFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<DeliveryMethod>, u64)> {
        let mut query = doc! {};
        if let Some(search) = &filter.search {
            query.insert(
                "$or",
                vec![
                    doc! { "name": contains_ignore_case(search) },
                    doc! { "subtitle": contains_ignore_case(search) },
                ],
            );
        }
        if let Some(enabled) = filter.is_enabled {
            query.insert("isEnabled", enabled);
        }
        self.page(DELIVERY_METHODS, query, doc! { "price": 1, "createdAt": -1 }, page)
            .await
    }

    async fn save_delivery_method(&self, method: &DeliveryMethod) -> StoreResult<bool> {
        self.replace_by_id(DELIVERY_METHODS, &method.id, method).await
    }

    async fn delete_delivery_method(&self, id: &ObjectId) -> StoreResult<bool> {
        self.delete_by_id(DELIVERY_METHODS, id).await
    }

    async fn find_cart(&self, user_id: &ObjectId) -> StoreResult<Option<Cart>> {
        Ok(self
            .collection::<Cart>(CARTS)
            .find_one(doc! { "userId": *user_id }, None)
            .await?)
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection::<Cart>(CARTS)
            .replace_one(doc! { "userId": cart.user_id }, cart, options)
            .await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.insert(ORDERS, order).await
    }

    async fn find_order(&self, id: &ObjectId) -> StoreResult<Option<Order>> {
        self.find_by_id(ORDERS, id).await
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let direction = if filter.sort.descending { -1 } else { 1 };
        let mut sort = doc! {};
        sort.insert(filter.sort.field.field_name(), direction);
        self.page(ORDERS, order_filter_document(filter), sort, page)
            .await
    }

    async fn save_order(&self, order: &Order) -> StoreResult<bool> {
        self.replace_by_id(ORDERS, &order.id, order).await
    }

    async fn save_order_if_status(
        &self,
        order: &Order,
        expected: &[OrderStatus],
    ) -> StoreResult<bool> {
        let statuses: Vec<String> = expected.iter().map(ToString::to_string).collect();
        let result = self
            .collection::<Order>(ORDERS)
            .replace_one(
                doc! { "_id": order.id, "status": { "$in": statuses } },
                order,
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn order_stats(&self, window: StatsWindow) -> StoreResult<OrderStats> {
        let orders = self.collection::<Order>(ORDERS);
        let paid = PaymentStatus::Paid.to_string();
        let this_month = doc! { "createdAt": { "$gte": window.this_month_start } };
        let last_month = doc! {
            "createdAt": { "$gte": window.last_month_start, "$lt": window.this_month_start }
        };

        let mut stats = OrderStats {
            total_orders: orders.count_documents(None, None).await?,
            orders_this_month: orders.count_documents(this_month.clone(), None).await?,
            orders_last_month: orders.count_documents(last_month.clone(), None).await?,
            ..OrderStats::default()
        };

        let mut paid_this_month = this_month;
        paid_this_month.insert("paymentStatus", paid.as_str());
        stats.revenue_this_month = self.sum_total_amount(paid_this_month).await?;

        let mut paid_last_month = last_month;
        paid_last_month.insert("paymentStatus", paid.as_str());
        stats.revenue_last_month = self.sum_total_amount(paid_last_month).await?;

        stats.total_revenue = self
            .sum_total_amount(doc! { "paymentStatus": paid.as_str() })
            .await?;

        for group in self.group_orders("status").await? {
            if let Ok(status) = group.get_str("_id") {
                stats
                    .orders_by_status
                    .insert(status.to_string(), number(&group, "count") as u64);
            }
        }
        for group in self.group_orders("paymentStatus").await? {
            if let Ok(payment_status) = group.get_str("_id") {
                stats.payment_stats.insert(
                    payment_status.to_string(),
                    PaymentBucket {
                        count: number(&group, "count") as u64,
                        total_amount: number(&group, "totalAmount"),
                    },
                );
            }
        }

        Ok(stats)
    }
}
