// Test that tagging two fields with #[cache_key] fails to compile.

use multicache_macros::CacheKeyed;

#[derive(CacheKeyed)]
#[allow(dead_code)]
struct Product {
    #[cache_key]
    id: u64,
    #[cache_key]
    sku: String,
}

fn main() {}
