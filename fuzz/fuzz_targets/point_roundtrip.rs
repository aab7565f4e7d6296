#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use outpost_core::point::{FieldValue, Point};

/// 퍼저용 구조적 포인트 입력
#[derive(Arbitrary, Debug)]
struct FuzzPoint {
    name: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FuzzField)>,
    timestamp: i64,
}

#[derive(Arbitrary, Debug)]
enum FuzzField {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl FuzzField {
    fn to_value(&self) -> FieldValue {
        match self {
            FuzzField::Int(v) => FieldValue::Int(*v),
            FuzzField::UInt(v) => FieldValue::UInt(*v),
            FuzzField::Float(v) => FieldValue::Float(*v),
            FuzzField::Bool(v) => FieldValue::Bool(*v),
            FuzzField::Str(v) => FieldValue::Str(v.clone()),
        }
    }
}

/// 한 줄 형식으로 표현 가능한 문자열인지 확인
fn representable(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_control)
}

fn representable_str(field: &FuzzField) -> bool {
    match field {
        FuzzField::Str(s) => !s.chars().any(char::is_control),
        _ => true,
    }
}

fuzz_target!(|input: FuzzPoint| {
    if !representable(&input.name) || input.name.starts_with('#') {
        return;
    }
    let tags: BTreeMap<String, String> = input
        .tags
        .into_iter()
        .filter(|(k, v)| representable(k) && representable(v))
        .take(16)
        .collect();
    let fields: BTreeMap<String, FieldValue> = input
        .fields
        .iter()
        .filter(|(k, v)| representable(k) && representable_str(v))
        .take(16)
        .map(|(k, v)| (k.clone(), v.to_value()))
        .collect();

    let Ok(point) = Point::new(input.name, tags, fields, input.timestamp) else {
        return;
    };

    let line = point.to_string();
    let parsed = Point::parse_lines(&line).expect("serialized point must parse");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].to_string(), line);
});
