use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::{ApiError, AppState};
use crate::domain::edition::ArtworkEdition;

/// Size option as shown on a product page. Display only; checkout re-reads
/// the ledger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeAvailability {
    pub size: String,
    pub price: u64,
    pub edition_limit: u32,
    pub remaining: u32,
    pub sold_out: bool,
}

impl From<&ArtworkEdition> for SizeAvailability {
    fn from(edition: &ArtworkEdition) -> Self {
        Self {
            size: edition.size.clone(),
            price: edition.price_minor_units,
            edition_limit: edition.edition_limit,
            remaining: edition.remaining(),
            sold_out: edition.is_sold_out(),
        }
    }
}

/// GET /api/artworks/{artwork_id}/editions
pub async fn list_editions(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let artwork_id = path.into_inner();
    let editions = state.store.editions_for_artwork(&artwork_id).await?;
    if editions.is_empty() {
        return Err(ApiError::NotFound(format!("Artwork {} not found", artwork_id)));
    }

    let sizes: Vec<SizeAvailability> = editions.iter().map(SizeAvailability::from).collect();
    Ok(HttpResponse::Ok().json(sizes))
}

#[cfg(test)]
mod tests {
    use super::super::configure;
    use super::super::tests::{edition, test_state};
    use crate::checkout::reservation::tests::FakeProvider;
    use crate::fulfillment::OversellPolicy;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_lists_remaining_per_size() {
        let (state, _) = test_state(
            vec![edition("wave", "large", 10, 10), edition("wave", "small", 50, 3)],
            Arc::new(FakeProvider::new()),
            OversellPolicy::default(),
        )
        .await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/artworks/wave/editions").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let sizes = body.as_array().unwrap();
        assert_eq!(sizes.len(), 2);

        let small = sizes.iter().find(|s| s["size"] == "small").unwrap();
        assert_eq!(small["remaining"], 47);
        assert_eq!(small["soldOut"], false);
        let large = sizes.iter().find(|s| s["size"] == "large").unwrap();
        assert_eq!(large["soldOut"], true);
    }

    #[actix_web::test]
    async fn test_unknown_artwork_is_not_found() {
        let (state, _) = test_state(vec![], Arc::new(FakeProvider::new()), OversellPolicy::default()).await;
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/artworks/ghost/editions").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
