mod common;

use actix_web::{http::StatusCode, test, App};
use serde_json::{json, Value};

use common::{TestContext, PASSWORD};
use miropet_api::configure;
use miropet_api::models::Role;

#[actix_web::test]
async fn register_then_login() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "name": "Nima", "email": "Nima@Example.com", "password": "secret1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], "nima@example.com");
    assert_eq!(body["data"]["user"]["role"], "customer");
    assert!(body["data"]["user"].get("passwordHash").is_none());
    assert!(body["data"]["token"].as_str().is_some());

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "nima@example.com", "password": "secret1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let token = body["data"]["token"].as_str().expect("token").to_string();

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["user"]["email"], "nima@example.com");
}

#[actix_web::test]
async fn register_rejects_duplicate_email_and_bad_input() {
    let ctx = TestContext::new();
    ctx.seed_user("taken@example.com", Role::Customer).await;
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "email": "TAKEN@example.com", "password": "secret1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "email": "short@example.com", "password": "123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Validation failed");
    assert!(body["errors"]["password"].is_array());
}

#[actix_web::test]
async fn login_failures_are_indistinguishable() {
    let ctx = TestContext::new();
    ctx.seed_user("known@example.com", Role::Customer).await;
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    let mut messages = Vec::new();
    for (email, password) in [
        ("known@example.com", "wrong-password"),
        ("unknown@example.com", PASSWORD),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": email, "password": password }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        messages.push(body["message"].clone());
    }
    assert_eq!(messages[0], "Invalid email or password");
    assert_eq!(messages[0], messages[1]);
}

#[actix_web::test]
async fn change_password_requires_current_password() {
    let ctx = TestContext::new();
    let user = ctx.seed_user("pw@example.com", Role::Customer).await;
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    let req = test::TestRequest::put()
        .uri("/api/auth/change-password")
        .insert_header(ctx.bearer(&user))
        .set_json(json!({ "currentPassword": "nope", "newPassword": "another1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::put()
        .uri("/api/auth/change-password")
        .insert_header(ctx.bearer(&user))
        .set_json(json!({ "currentPassword": PASSWORD, "newPassword": "another1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "pw@example.com", "password": "another1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn protected_routes_need_a_valid_token() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    let req = test::TestRequest::get().uri("/api/orders").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);

    let req = test::TestRequest::get()
        .uri("/api/cart")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/products")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn admin_routes_reject_customers() {
    let ctx = TestContext::new();
    let customer = ctx.seed_user("buyer@example.com", Role::Customer).await;
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    for uri in ["/api/orders/admin/all", "/api/orders/admin/stats", "/api/users"] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(ctx.bearer(&customer))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
    }
}

#[actix_web::test]
async fn health_is_public() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().app_data(ctx.state.clone()).configure(configure)).await;

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
