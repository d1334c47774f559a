use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::{json, Value};

use crate::store::PageRequest;

#[derive(Serialize)]
struct Envelope<'a, T> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        message,
        data: Some(data),
    })
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope {
        success: true,
        message,
        data: Some(data),
    })
}

pub fn message(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::<()> {
        success: true,
        message,
        data: None,
    })
}

/// Pagination block; the total is reported under a resource-specific key
/// (`totalOrders`, `totalUsers`, ...).
pub fn pagination(page: &PageRequest, total: u64, total_key: &str) -> Value {
    let total_pages = total.div_ceil(page.limit);
    let mut value = json!({
        "currentPage": page.page,
        "totalPages": total_pages,
        "limit": page.limit,
        "hasNextPage": page.page < total_pages,
        "hasPrevPage": page.page > 1,
    });
    value[total_key] = json!(total);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let page = PageRequest::new(Some(2), Some(10), 10);
        let value = pagination(&page, 25, "totalOrders");
        assert_eq!(value["currentPage"], 2);
        assert_eq!(value["totalPages"], 3);
        assert_eq!(value["totalOrders"], 25);
        assert_eq!(value["hasNextPage"], true);
        assert_eq!(value["hasPrevPage"], true);
    }

    #[test]
    fn empty_result_has_no_pages() {
        let page = PageRequest::new(None, None, 20);
        let value = pagination(&page, 0, "totalUsers");
        assert_eq!(value["totalPages"], 0);
        assert_eq!(value["hasNextPage"], false);
        assert_eq!(value["hasPrevPage"], false);
    }
}
