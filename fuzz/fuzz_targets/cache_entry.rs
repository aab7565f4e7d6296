#![no_main]

use libfuzzer_sys::fuzz_target;
use outpost_io::CacheEntry;

fuzz_target!(|data: &[u8]| {
    // 손상된 레코드는 에러로 끝나야 하며 패닉하면 안 됨
    if let Ok(entry) = serde_json::from_slice::<CacheEntry>(data) {
        if let Ok(points) = entry.decode_points() {
            let rebuilt = CacheEntry::from_points(entry.category.clone(), &points);
            assert_eq!(rebuilt.decode_points().ok(), Some(points));
        }
    }
});
