use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use data_model::format_size;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ReleaseAPIError {
    #[serde(skip)]
    status_code: StatusCode,
    message: String,
}

impl ReleaseAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_str())
    }

    pub fn internal_error_str(e: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl IntoResponse for ReleaseAPIError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            error!("API Error: {} - {}", status_code, self.message);
        }
        (status_code, self.message).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseMetadata {
    pub product: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
    /// ISO-8601 upload time reported by the store
    pub upload_date: String,
    pub size: u64,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<data_model::ReleaseMetadata> for ReleaseMetadata {
    fn from(metadata: data_model::ReleaseMetadata) -> Self {
        Self {
            product: metadata.product,
            version: metadata.version,
            platform: metadata.platform,
            arch: metadata.arch,
            upload_date: metadata.upload_date,
            size: metadata.size,
            filename: metadata.filename,
            checksum: metadata.checksum,
            description: metadata.description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Storage key of the artifact
    pub key: String,
    /// Relative URL that streams the artifact
    pub download_url: String,
    pub metadata: ReleaseMetadata,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
}

impl From<data_model::ReleaseEntry> for Release {
    fn from(entry: data_model::ReleaseEntry) -> Self {
        Self {
            download_url: format!("/download/{}", entry.key.url_encoded()),
            key: entry.key.get().to_string(),
            metadata: entry.metadata.into(),
            size: entry.size,
            uploaded: entry.uploaded,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReleaseList {
    pub count: usize,
    pub releases: Vec<Release>,
}

impl From<Vec<data_model::ReleaseEntry>> for ReleaseList {
    fn from(entries: Vec<data_model::ReleaseEntry>) -> Self {
        let releases: Vec<Release> = entries.into_iter().map(Release::from).collect();
        Self {
            count: releases.len(),
            releases,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductReleaseList {
    pub product: String,
    pub count: usize,
    pub releases: Vec<Release>,
}

impl From<data_model::ProductGroup> for ProductReleaseList {
    fn from(group: data_model::ProductGroup) -> Self {
        let ReleaseList { count, releases } = group.releases.into();
        Self {
            product: group.product,
            count,
            releases,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductGroups {
    pub products: Vec<ProductReleaseList>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductStats {
    pub count: u64,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStats {
    pub total_releases: u64,
    pub total_size: u64,
    /// `totalSize` rendered for humans, e.g. `1.5 GB`
    pub total_size_formatted: String,
    pub products: BTreeMap<String, ProductStats>,
    pub platforms: BTreeMap<String, u64>,
    pub latest_upload: Option<DateTime<Utc>>,
}

impl From<data_model::AggregateStats> for ReleaseStats {
    fn from(stats: data_model::AggregateStats) -> Self {
        Self {
            total_releases: stats.total_releases,
            total_size: stats.total_size,
            total_size_formatted: format_size(stats.total_size),
            products: stats
                .products
                .into_iter()
                .map(|(name, p)| {
                    (
                        name,
                        ProductStats {
                            count: p.count,
                            size: p.size,
                        },
                    )
                })
                .collect(),
            platforms: stats.platforms,
            latest_upload: stats.latest_upload,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub env: String,
}
