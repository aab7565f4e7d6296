#![no_main]

use libfuzzer_sys::fuzz_target;
use outpost_core::point::Point;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(points) = Point::parse_lines(text) {
            // 파싱에 성공한 포인트는 다시 직렬화해도 파싱 가능해야 함
            for p in points {
                let line = p.to_string();
                assert!(Point::parse_lines(&line).is_ok(), "reparse failed: {line}");
            }
        }
    }
});
