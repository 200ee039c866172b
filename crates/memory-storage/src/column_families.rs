//! Column family definitions for RocksDB.
//!
//! - items: memory items keyed by ULID, so key order is creation order
//! - sharp_edges: registered hazards keyed by edge id

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for memory items
pub const CF_ITEMS: &str = "items";

/// Column family name for sharp edges
pub const CF_SHARP_EDGES: &str = "sharp_edges";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_ITEMS, CF_SHARP_EDGES];

/// Items are small JSON documents read far more often than written
fn items_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_ITEMS, items_options()),
        ColumnFamilyDescriptor::new(CF_SHARP_EDGES, Options::default()),
    ]
}
