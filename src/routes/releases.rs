use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use super::routes_state::RouteState;
use crate::http_objects::{
    ProductGroups,
    ProductReleaseList,
    ReleaseAPIError,
    ReleaseList,
    ReleaseStats,
};

/// List all releases, newest first
#[utoipa::path(
    get,
    path = "/api/releases",
    tag = "releases",
    responses(
        (status = 200, description = "All releases, newest first", body = ReleaseList),
        (status = INTERNAL_SERVER_ERROR, description = "Release store unavailable")
    ),
)]
pub async fn list_releases(
    State(state): State<RouteState>,
) -> Result<Json<ReleaseList>, ReleaseAPIError> {
    let entries = state
        .blob_storage
        .list(None)
        .await
        .map_err(ReleaseAPIError::internal_error)?;
    Ok(Json(data_model::list(&entries).into()))
}

/// List the releases of one product, newest first
#[utoipa::path(
    get,
    path = "/api/releases/{product}",
    tag = "releases",
    params(
        ("product" = String, Path, description = "Product name, matched exactly")
    ),
    responses(
        (status = 200, description = "Releases of the product", body = ProductReleaseList),
        (status = INTERNAL_SERVER_ERROR, description = "Release store unavailable")
    ),
)]
pub async fn list_product_releases(
    Path(product): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<ProductReleaseList>, ReleaseAPIError> {
    // The prefix only narrows the listing; tags decide the product.
    let entries = state
        .blob_storage
        .list(Some(&product))
        .await
        .map_err(ReleaseAPIError::internal_error)?;
    let releases = data_model::list_by_product(&entries, &product);
    debug!(
        product = %product,
        listed = entries.len(),
        matched = releases.len(),
        "filtered product releases"
    );
    Ok(Json(data_model::ProductGroup { product, releases }.into()))
}

/// Releases grouped by product for display
#[utoipa::path(
    get,
    path = "/api/products",
    tag = "releases",
    responses(
        (status = 200, description = "Products in name order, each newest first", body = ProductGroups),
        (status = INTERNAL_SERVER_ERROR, description = "Release store unavailable")
    ),
)]
pub async fn list_products(
    State(state): State<RouteState>,
) -> Result<Json<ProductGroups>, ReleaseAPIError> {
    let entries = state
        .blob_storage
        .list(None)
        .await
        .map_err(ReleaseAPIError::internal_error)?;
    let products = data_model::group_by_product(&entries)
        .into_iter()
        .map(ProductReleaseList::from)
        .collect();
    Ok(Json(ProductGroups { products }))
}

/// Aggregate statistics over all releases
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "releases",
    responses(
        (status = 200, description = "Release statistics", body = ReleaseStats),
        (status = INTERNAL_SERVER_ERROR, description = "Release store unavailable")
    ),
)]
pub async fn release_stats(
    State(state): State<RouteState>,
) -> Result<Json<ReleaseStats>, ReleaseAPIError> {
    let entries = state
        .blob_storage
        .list(None)
        .await
        .map_err(ReleaseAPIError::internal_error)?;
    Ok(Json(data_model::aggregate(&entries).into()))
}
