pub mod catalog;
pub mod key_parser;

use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Display},
};

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

pub use catalog::{aggregate, group_by_product, list, list_by_product, ProductGroup};
pub use key_parser::parse;

/// Value used for any of product, version, platform or arch when neither the
/// key nor the tags provide one.
pub const UNKNOWN: &str = "unknown";

// Same unreserved set as a browser's encodeURIComponent, so `/` is escaped
// and the whole key fits in one path segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Storage key of a release artifact, e.g. `tool/1.2.0/linux-x64/tool.tar.gz`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseKey(String);

impl ReleaseKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn get(&self) -> &str {
        &self.0
    }

    /// Percent-encodes the key so it can travel as a single URL path segment.
    pub fn url_encoded(&self) -> String {
        utf8_percent_encode(&self.0, KEY_SEGMENT).to_string()
    }
}

impl Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReleaseKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An object as reported by the store, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStorageEntry {
    pub key: ReleaseKey,
    pub size: u64,
    /// Missing when the store could not report a creation time for the
    /// object; such entries are excluded from every view.
    pub uploaded: Option<DateTime<Utc>>,
    pub tags: HashMap<String, String>,
}

/// The tag fields a producer may attach to an object.
///
/// Product, version, platform and arch override what the key path says;
/// checksum and description can only come from tags. Any other tag key is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseTags {
    pub product: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub checksum: Option<String>,
    pub description: Option<String>,
}

impl ReleaseTags {
    pub fn from_map(tags: &HashMap<String, String>) -> Self {
        let field = |name: &str| {
            tags.get(name)
                .filter(|value| !value.is_empty())
                .cloned()
        };
        Self {
            product: field("product"),
            version: field("version"),
            platform: field("platform"),
            arch: field("arch"),
            checksum: field("checksum"),
            description: field("description"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub product: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
    /// ISO-8601, millisecond precision, UTC.
    pub upload_date: String,
    pub size: u64,
    pub filename: String,
    pub checksum: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseEntry {
    pub key: ReleaseKey,
    pub metadata: ReleaseMetadata,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductStats {
    pub count: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStats {
    pub total_releases: u64,
    pub total_size: u64,
    pub products: BTreeMap<String, ProductStats>,
    pub platforms: BTreeMap<String, u64>,
    pub latest_upload: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
enum SizeUnit {
    B,
    KB,
    MB,
    GB,
    TB,
}

const SIZE_UNITS: [SizeUnit; 5] = [
    SizeUnit::B,
    SizeUnit::KB,
    SizeUnit::MB,
    SizeUnit::GB,
    SizeUnit::TB,
];

/// Formats a byte count for humans: `1536` becomes `"1.5 KB"`.
///
/// The unit is the largest power of 1024 not exceeding `bytes`, capped at TB,
/// and the value is rounded to two decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut index = 0;
    while index + 1 < SIZE_UNITS.len() && bytes >= 1024u64.pow(index as u32 + 1) {
        index += 1;
    }
    let scaled = bytes as f64 / 1024f64.powi(index as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[index].as_ref())
}
