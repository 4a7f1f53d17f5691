// Test that #[cache_key] on the type only accepts `accessor` and `bound`.

use multicache_macros::CacheKeyed;

#[derive(CacheKeyed)]
#[cache_key(method = id)]
#[allow(dead_code)]
struct Product {
    id: u64,
}

fn main() {}
