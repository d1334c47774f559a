use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::cmp::Ordering;
use tokio::sync::Mutex;

use super::{
    DeliveryMethodFilter, OrderFilter, OrderSortField, OrderStats, PageRequest, ProductFilter,
    StatsWindow, Store, StoreError, StoreResult, UserFilter,
};
use crate::models::{
    Cart, Category, DeliveryMethod, Order, OrderStatus, PaymentStatus, Product, User,
};

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    products: Vec<Product>,
    categories: Vec<Category>,
    delivery_methods: Vec<DeliveryMethod>,
    carts: Vec<Cart>,
    orders: Vec<Order>,
}

/// Process-local store with the same uniqueness rules as the MongoDB indexes.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn paginate<T: Clone>(matching: Vec<&T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = matching.len() as u64;
    let records = matching
        .into_iter()
        .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
        .cloned()
        .collect();
    (records, total)
}

fn replace_where<T: Clone>(records: &mut [T], record: &T, same: impl Fn(&T) -> bool) -> bool {
    match records.iter_mut().find(|r| same(r)) {
        Some(slot) => {
            *slot = record.clone();
            true
        }
        None => false,
    }
}

fn remove_where<T>(records: &mut Vec<T>, same: impl Fn(&T) -> bool) -> bool {
    let before = records.len();
    records.retain(|r| !same(r));
    records.len() != before
}

fn order_matches(order: &Order, filter: &OrderFilter) -> bool {
    filter.user_id.map_or(true, |id| order.user_id == id)
        && filter.status.map_or(true, |s| order.status == s)
        && filter.payment_status.map_or(true, |s| order.payment_status == s)
        && filter
            .order_number
            .as_deref()
            .map_or(true, |n| contains_ignore_case(Some(&order.order_number), n))
        && filter.created_from.map_or(true, |from| order.created_at >= from)
        && filter.created_before.map_or(true, |before| order.created_at < before)
}

fn compare_orders(a: &Order, b: &Order, field: OrderSortField) -> Ordering {
    match field {
        OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        OrderSortField::TotalAmount => a.total_amount.cmp(&b.total_amount),
        OrderSortField::OrderNumber => a.order_number.cmp(&b.order_number),
        OrderSortField::Status => a.status.to_string().cmp(&b.status.to_string()),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut db = self.inner.lock().await;
        if db.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("users".into()));
        }
        db.users.push(user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<User>> {
        let db = self.inner.lock().await;
        Ok(db.users.iter().find(|u| u.id == *id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let db = self.inner.lock().await;
        Ok(db.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<User>, u64)> {
        let db = self.inner.lock().await;
        let mut matching: Vec<&User> = db
            .users
            .iter()
            .filter(|u| filter.role.map_or(true, |role| u.role == role))
            .filter(|u| {
                filter.search.as_deref().map_or(true, |s| {
                    contains_ignore_case(u.name.as_deref(), s)
                        || contains_ignore_case(Some(&u.email), s)
                })
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }

    async fn save_user(&self, user: &User) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        if db
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Duplicate("users".into()));
        }
        Ok(replace_where(&mut db.users, user, |u| u.id == user.id))
    }

    async fn delete_user(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(remove_where(&mut db.users, |u| u.id == *id))
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.inner.lock().await.products.push(product.clone());
        Ok(())
    }

    async fn find_product(&self, id: &ObjectId) -> StoreResult<Option<Product>> {
        let db = self.inner.lock().await;
        Ok(db.products.iter().find(|p| p.id == *id).cloned())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Product>, u64)> {
        let db = self.inner.lock().await;
        let mut matching: Vec<&Product> = db
            .products
            .iter()
            .filter(|p| {
                filter
                    .category
                    .as_ref()
                    .map_or(true, |c| p.category.contains(c))
            })
            .filter(|p| filter.featured.map_or(true, |f| p.is_featured == f))
            .filter(|p| {
                filter.search.as_deref().map_or(true, |s| {
                    contains_ignore_case(Some(&p.name), s)
                        || contains_ignore_case(p.brand.as_deref(), s)
                })
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }

    async fn save_product(&self, product: &Product) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(replace_where(&mut db.products, product, |p| p.id == product.id))
    }

    async fn delete_product(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(remove_where(&mut db.products, |p| p.id == *id))
    }

    async fn reserve_stock(
        &self,
        product_id: &ObjectId,
        variation_index: u32,
        quantity: i64,
    ) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        let variation = db
            .products
            .iter_mut()
            .find(|p| p.id == *product_id)
            .and_then(|p| p.variations.get_mut(variation_index as usize));
        match variation {
            Some(v) if v.stock >= quantity => {
                v.stock -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_stock(
        &self,
        product_id: &ObjectId,
        variation_index: u32,
        quantity: i64,
    ) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        let variation = db
            .products
            .iter_mut()
            .find(|p| p.id == *product_id)
            .and_then(|p| p.variations.get_mut(variation_index as usize));
        match variation {
            Some(v) => {
                v.stock = v.stock.saturating_add(quantity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut db = self.inner.lock().await;
        if db.categories.iter().any(|c| c.name == category.name) {
            return Err(StoreError::Duplicate("categories".into()));
        }
        db.categories.push(category.clone());
        Ok(())
    }

    async fn find_category(&self, id: &ObjectId) -> StoreResult<Option<Category>> {
        let db = self.inner.lock().await;
        Ok(db.categories.iter().find(|c| c.id == *id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let db = self.inner.lock().await;
        let mut categories = db.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn save_category(&self, category: &Category) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        if db
            .categories
            .iter()
            .any(|c| c.id != category.id && c.name == category.name)
        {
            return Err(StoreError::Duplicate("categories".into()));
        }
        Ok(replace_where(&mut db.categories, category, |c| c.id == category.id))
    }

    async fn delete_category(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(remove_where(&mut db.categories, |c| c.id == *id))
    }

    async fn insert_delivery_method(&self, method: &DeliveryMethod) -> StoreResult<()> {
        self.inner.lock().await.delivery_methods.push(method.clone());
        Ok(())
    }

    async fn find_delivery_method(&self, id: &ObjectId) -> StoreResult<Option<DeliveryMethod>> {
        let db = self.inner.lock().await;
        Ok(db.delivery_methods.iter().find(|m| m.id == *id).cloned())
    }

    async fn list_delivery_methods(
        &self,
        filter: &DeliveryMethodFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<DeliveryMethod>, u64)> {
        let db = self.inner.lock().await;
        let mut matching: Vec<&DeliveryMethod> = db
            .delivery_methods
            .iter()
            .filter(|m| filter.is_enabled.map_or(true, |e| m.is_enabled == e))
            .filter(|m| {
                filter.search.as_deref().map_or(true, |s| {
                    contains_ignore_case(Some(&m.name), s)
                        || contains_ignore_case(m.subtitle.as_deref(), s)
                })
            })
            .collect();
        matching.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(paginate(matching, page))
    }

    async fn save_delivery_method(&self, method: &DeliveryMethod) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(replace_where(&mut db.delivery_methods, method, |m| m.id == method.id))
    }

    async fn delete_delivery_method(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(remove_where(&mut db.delivery_methods, |m| m.id == *id))
    }

    async fn find_cart(&self, user_id: &ObjectId) -> StoreResult<Option<Cart>> {
        let db = self.inner.lock().await;
        Ok(db.carts.iter().find(|c| c.user_id == *user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        let mut db = self.inner.lock().await;
        if !replace_where(&mut db.carts, cart, |c| c.user_id == cart.user_id) {
            db.carts.push(cart.clone());
        }
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut db = self.inner.lock().await;
        if db
            .orders
            .iter()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::Duplicate("orders".into()));
        }
        db.orders.push(order.clone());
        Ok(())
    }

    async fn find_order(&self, id: &ObjectId) -> StoreResult<Option<Order>> {
        let db = self.inner.lock().await;
        Ok(db.orders.iter().find(|o| o.id == *id).cloned())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let db = self.inner.lock().await;
        let mut matching: Vec<&Order> = db
            .orders
            .iter()
            .filter(|o| order_matches(o, filter))
            .collect();
        let sort = filter.sort;
        matching.sort_by(|a, b| {
            let ordering = compare_orders(a, b, sort.field);
            if sort.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(paginate(matching, page))
    }

    async fn save_order(&self, order: &Order) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(replace_where(&mut db.orders, order, |o| o.id == order.id))
    }

    async fn save_order_if_status(
        &self,
        order: &Order,
        expected: &[OrderStatus],
    ) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        Ok(replace_where(&mut db.orders, order, |o| {
            o.id == order.id && expected.contains(&o.status)
        }))
    }

    async fn order_stats(&self, window: StatsWindow) -> StoreResult<OrderStats> {
        let db = self.inner.lock().await;
        let mut stats = OrderStats {
            total_orders: db.orders.len() as u64,
            ..OrderStats::default()
        };

        for order in &db.orders {
            let paid = order.payment_status == PaymentStatus::Paid;
            if order.created_at >= window.this_month_start {
                stats.orders_this_month += 1;
                if paid {
                    stats.revenue_this_month += order.total_amount;
                }
            } else if order.created_at >= window.last_month_start {
                stats.orders_last_month += 1;
                if paid {
                    stats.revenue_last_month += order.total_amount;
                }
            }
            if paid {
                stats.total_revenue += order.total_amount;
            }

            *stats
                .orders_by_status
                .entry(order.status.to_string())
                .or_default() += 1;
            let bucket = stats
                .payment_stats
                .entry(order.payment_status.to_string())
                .or_default();
            bucket.count += 1;
            bucket.total_amount += order.total_amount;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ShippingAddress, Variation};
    use crate::store::OrderSort;
    use mongodb::bson::DateTime as BsonDateTime;

    fn product(stock: i64) -> Product {
        let now = BsonDateTime::now();
        Product {
            id: ObjectId::new(),
            name: "Cat food".into(),
            description: None,
            category: vec!["cat".into()],
            brand: Some("Purrfect".into()),
            variations: vec![Variation {
                color: None,
                size: Some("2kg".into()),
                price: 100_000,
                discount: None,
                weight: None,
                stock,
                images: vec!["food.jpg".into()],
            }],
            is_featured: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn order(number: &str, created_at: i64, total: i64, payment: PaymentStatus) -> Order {
        let at = BsonDateTime::from_millis(created_at);
        Order {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            order_number: number.into(),
            items: Vec::new(),
            subtotal: total,
            shipping_cost: 0,
            tax: 0,
            discount: 0,
            total_amount: total,
            shipping_address: ShippingAddress {
                full_name: "Sara".into(),
                phone: "0912".into(),
                street: "Main".into(),
                city: "Tehran".into(),
                postal_code: "12345".into(),
                country: "Iran".into(),
                notes: None,
            },
            status: OrderStatus::Submitted,
            payment_status: payment,
            payment_method: None,
            created_at: at,
            updated_at: at,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            customer_notes: None,
            admin_notes: None,
            tracking_number: None,
        }
    }

    #[tokio::test]
    async fn reserve_stock_never_goes_negative() {
        let store = MemoryStore::new();
        let p = product(3);
        store.insert_product(&p).await.unwrap();

        assert!(store.reserve_stock(&p.id, 0, 2).await.unwrap());
        assert!(!store.reserve_stock(&p.id, 0, 2).await.unwrap());
        assert!(!store.reserve_stock(&p.id, 1, 1).await.unwrap());

        let stored = store.find_product(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.variations[0].stock, 1);

        assert!(store.release_stock(&p.id, 0, 2).await.unwrap());
        assert!(!store.release_stock(&ObjectId::new(), 0, 2).await.unwrap());
        let stored = store.find_product(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.variations[0].stock, 3);
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let store = MemoryStore::new();
        store
            .insert_order(&order("MP1", 1, 10, PaymentStatus::Pending))
            .await
            .unwrap();
        let err = store
            .insert_order(&order("MP1", 2, 10, PaymentStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn lists_orders_newest_first_with_filters() {
        let store = MemoryStore::new();
        for (n, at) in [("MP1", 10), ("MP2", 30), ("MP3", 20)] {
            store
                .insert_order(&order(n, at, 5, PaymentStatus::Pending))
                .await
                .unwrap();
        }

        let (orders, total) = store
            .list_orders(&OrderFilter::default(), PageRequest::new(None, Some(2), 10))
            .await
            .unwrap();
        assert_eq!(total, 3);
        let numbers: Vec<_> = orders.iter().map(|o| o.order_number.as_str()).collect();
        assert_eq!(numbers, ["MP2", "MP3"]);

        let filter = OrderFilter {
            order_number: Some("mp3".into()),
            sort: OrderSort::default(),
            ..OrderFilter::default()
        };
        let (orders, total) = store
            .list_orders(&filter, PageRequest::new(None, None, 10))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(orders[0].order_number, "MP3");
    }

    #[tokio::test]
    async fn far_pages_are_empty() {
        let store = MemoryStore::new();
        store
            .insert_order(&order("MP1", 1, 10, PaymentStatus::Pending))
            .await
            .unwrap();
        let page = PageRequest {
            page: u64::MAX,
            limit: 100,
        };
        let (orders, total) = store
            .list_orders(&OrderFilter::default(), page)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn status_guarded_save_only_wins_once() {
        let store = MemoryStore::new();
        let placed = order("MP1", 1, 10, PaymentStatus::Pending);
        store.insert_order(&placed).await.unwrap();

        let mut canceled = placed.clone();
        canceled.status = OrderStatus::Canceled;
        let open = [OrderStatus::Submitted, OrderStatus::InProgress];

        assert!(store.save_order_if_status(&canceled, &open).await.unwrap());
        assert!(!store.save_order_if_status(&canceled, &open).await.unwrap());

        let mut stray = order("MP2", 2, 10, PaymentStatus::Pending);
        stray.status = OrderStatus::Canceled;
        assert!(!store.save_order_if_status(&stray, &open).await.unwrap());

        let stored = store.find_order(&placed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn stats_split_months_and_count_paid_revenue() {
        let store = MemoryStore::new();
        let window = StatsWindow {
            last_month_start: BsonDateTime::from_millis(100),
            this_month_start: BsonDateTime::from_millis(200),
        };
        store
            .insert_order(&order("A", 50, 1_000, PaymentStatus::Paid))
            .await
            .unwrap();
        store
            .insert_order(&order("B", 150, 2_000, PaymentStatus::Paid))
            .await
            .unwrap();
        store
            .insert_order(&order("C", 250, 4_000, PaymentStatus::Paid))
            .await
            .unwrap();
        store
            .insert_order(&order("D", 260, 8_000, PaymentStatus::Pending))
            .await
            .unwrap();

        let stats = store.order_stats(window).await.unwrap();
        assert_eq!(stats.total_orders, 4);
        assert_eq!(stats.orders_this_month, 2);
        assert_eq!(stats.orders_last_month, 1);
        assert_eq!(stats.revenue_this_month, 4_000);
        assert_eq!(stats.revenue_last_month, 2_000);
        assert_eq!(stats.total_revenue, 7_000);
        assert_eq!(stats.orders_by_status["submitted"], 4);
        assert_eq!(stats.payment_stats["paid"].count, 3);
        assert_eq!(stats.payment_stats["pending"].total_amount, 8_000);
    }

    #[tokio::test]
    async fn duplicate_emails_rejected() {
        let store = MemoryStore::new();
        let user = User {
            id: ObjectId::new(),
            name: None,
            email: "a@b.co".into(),
            password_hash: "x".into(),
            role: Default::default(),
            addresses: Vec::new(),
            created_at: BsonDateTime::now(),
        };
        store.insert_user(&user).await.unwrap();
        let twin = User {
            id: ObjectId::new(),
            ..user.clone()
        };
        assert!(matches!(
            store.insert_user(&twin).await,
            Err(StoreError::Duplicate(_))
        ));
        let (users, total) = store
            .list_users(&UserFilter::default(), PageRequest::new(None, None, 10))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].id, user.id);
    }
}
