use actix_web::{web, HttpResponse};

use super::{ApiError, AppState};
use crate::checkout::{CheckoutLine, CheckoutRequest, CheckoutResponse};

/// POST /api/checkout
pub async fn create_checkout(
    state: web::Data<AppState>,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let CheckoutRequest { items, customer_info } = body.into_inner();
    let lines: Vec<CheckoutLine> = items.into_iter().map(CheckoutLine::from).collect();

    let session = state.checkout.create_session(lines, customer_info).await?;

    Ok(HttpResponse::Ok().json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{edition, test_state};
    use super::super::configure;
    use crate::checkout::reservation::tests::FakeProvider;
    use crate::fulfillment::OversellPolicy;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn cart(id: &str, price: u64, quantity: u32) -> Value {
        json!({
            "items": [{
                "id": id,
                "title": "The Wave",
                "price": price,
                "quantity": quantity,
                "size": "small",
                "sizeDisplay": "Small (8x10)",
                "imageUrl": null
            }],
            "customerInfo": {
                "name": "Hokusai",
                "email": "hokusai@example.com",
                "address": {
                    "line1": "1 Sumida",
                    "city": "Tokyo",
                    "postalCode": "130-0014",
                    "country": "JP"
                }
            }
        })
    }

    #[actix_web::test]
    async fn test_checkout_returns_session() {
        let provider = Arc::new(FakeProvider::new());
        let (state, _) = test_state(vec![edition("wave", "small", 50, 3)], provider.clone(), OversellPolicy::default()).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/checkout")
            .set_json(cart("wave", 5000, 2))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["sessionId"], "cs_test_1");
        assert_eq!(body["url"], "https://checkout.example/1");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].lines[0].title, "The Wave - Small (8x10)");
    }

    #[actix_web::test]
    async fn test_sold_out_is_conflict() {
        let provider = Arc::new(FakeProvider::new());
        let (state, _) = test_state(vec![edition("wave", "small", 10, 10)], provider.clone(), OversellPolicy::default()).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/checkout")
            .set_json(cart("wave", 5000, 1))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("sold out"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_unknown_artwork_is_not_found() {
        let provider = Arc::new(FakeProvider::new());
        let (state, _) = test_state(vec![], provider, OversellPolicy::default()).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/checkout")
            .set_json(cart("ghost", 5000, 1))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn test_malformed_body_is_bad_request_with_error_field() {
        let provider = Arc::new(FakeProvider::new());
        let (state, _) = test_state(vec![], provider, OversellPolicy::default()).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/checkout")
            .set_json(json!({ "items": "nope" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }
}
