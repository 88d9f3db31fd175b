use std::collections::BTreeMap;

use crate::{key_parser, AggregateStats, RawStorageEntry, ReleaseEntry};

/// Releases of one product, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductGroup {
    pub product: String,
    pub releases: Vec<ReleaseEntry>,
}

fn parse_all(entries: &[RawStorageEntry]) -> impl Iterator<Item = ReleaseEntry> + '_ {
    entries.iter().filter_map(|entry| {
        let metadata = key_parser::parse(entry)?;
        Some(ReleaseEntry {
            key: entry.key.clone(),
            size: entry.size,
            uploaded: entry.uploaded?,
            metadata,
        })
    })
}

// Stable, so equal timestamps keep their input order.
fn sort_newest_first(releases: &mut [ReleaseEntry]) {
    releases.sort_by(|a, b| b.uploaded.cmp(&a.uploaded));
}

/// Every parseable entry, newest upload first.
pub fn list(entries: &[RawStorageEntry]) -> Vec<ReleaseEntry> {
    let mut releases: Vec<ReleaseEntry> = parse_all(entries).collect();
    sort_newest_first(&mut releases);
    releases
}

/// Entries whose resolved product is exactly `product`, newest first.
///
/// The key prefix the entries were fetched with does not count: a tag can move
/// an entry to another product.
pub fn list_by_product(entries: &[RawStorageEntry], product: &str) -> Vec<ReleaseEntry> {
    let mut releases: Vec<ReleaseEntry> = parse_all(entries)
        .filter(|release| release.metadata.product == product)
        .collect();
    sort_newest_first(&mut releases);
    releases
}

pub fn aggregate(entries: &[RawStorageEntry]) -> AggregateStats {
    parse_all(entries).fold(AggregateStats::default(), |mut stats, release| {
        stats.total_releases += 1;
        stats.total_size += release.size;

        let product = stats
            .products
            .entry(release.metadata.product)
            .or_default();
        product.count += 1;
        product.size += release.size;

        *stats.platforms.entry(release.metadata.platform).or_default() += 1;

        if stats.latest_upload.is_none_or(|latest| release.uploaded > latest) {
            stats.latest_upload = Some(release.uploaded);
        }
        stats
    })
}

/// Groups releases by product for display: products in ascending name order,
/// each group newest first.
pub fn group_by_product(entries: &[RawStorageEntry]) -> Vec<ProductGroup> {
    let mut groups: BTreeMap<String, Vec<ReleaseEntry>> = BTreeMap::new();
    for release in parse_all(entries) {
        groups
            .entry(release.metadata.product.clone())
            .or_default()
            .push(release);
    }
    groups
        .into_iter()
        .map(|(product, mut releases)| {
            sort_newest_first(&mut releases);
            ProductGroup { product, releases }
        })
        .collect()
}
