use chrono::SecondsFormat;

use crate::{RawStorageEntry, ReleaseMetadata, ReleaseTags, UNKNOWN};

/// Keys shorter than this are not treated as `product/version/platform-arch/file`.
const MIN_STRUCTURED_SEGMENTS: usize = 4;

/// Fields read off the key path before tag overrides are applied.
struct KeyFields<'a> {
    product: Option<&'a str>,
    version: Option<&'a str>,
    platform: Option<&'a str>,
    arch: Option<&'a str>,
    filename: String,
}

fn key_fields(key: &str) -> KeyFields<'_> {
    let segments: Vec<&str> = key.split('/').collect();
    if segments.len() < MIN_STRUCTURED_SEGMENTS {
        return KeyFields {
            product: None,
            version: None,
            platform: None,
            arch: None,
            filename: segments.last().copied().unwrap_or(key).to_string(),
        };
    }

    let (platform, arch) = match segments[2].split_once('-') {
        Some((platform, arch)) => (platform, Some(arch)),
        None => (segments[2], None),
    };
    KeyFields {
        product: Some(segments[0]),
        version: Some(segments[1]),
        platform: Some(platform),
        arch,
        filename: segments[3..].join("/"),
    }
}

fn resolve(tag: Option<String>, from_key: Option<&str>) -> String {
    tag.or_else(|| {
        from_key
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
    .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Derives release metadata from an object's key and tags.
///
/// Malformed keys never fail: they fall back to tags and `"unknown"`. The
/// only `None` is for an entry without an upload timestamp, which callers
/// must drop.
pub fn parse(entry: &RawStorageEntry) -> Option<ReleaseMetadata> {
    let uploaded = entry.uploaded?;
    let tags = ReleaseTags::from_map(&entry.tags);
    let fields = key_fields(entry.key.get());

    Some(ReleaseMetadata {
        product: resolve(tags.product, fields.product),
        version: resolve(tags.version, fields.version),
        platform: resolve(tags.platform, fields.platform),
        arch: resolve(tags.arch, fields.arch),
        upload_date: uploaded.to_rfc3339_opts(SecondsFormat::Millis, true),
        size: entry.size,
        filename: fields.filename,
        checksum: tags.checksum,
        description: tags.description,
    })
}
