//! 측정 포인트 -- 불변 측정 레코드와 텍스트 직렬화
//!
//! [`Point`]는 이름, 태그, 필드, 타임스탬프로 구성된 측정값입니다.
//! 한 번 생성되면 변경되지 않으며, 결정적인 라인 프로토콜 텍스트로
//! 직렬화됩니다. 실패 캐시는 이 텍스트를 저장했다가
//! [`Point::parse_lines`]로 복원합니다.
//!
//! # 텍스트 형식
//! ```text
//! cpu,host=web-01,region=ap usage=0.5,cores=8i,name="x86" 1700000000000000000
//! ```
//! - 정수 `i`, 부호 없는 정수 `u` 접미어
//! - 문자열 필드는 큰따옴표로 감싸고 `"`, `\`, 개행을 이스케이프
//! - 이름/키/태그 값은 `,` `=` 공백 `"` `\` 개행을 이스케이프

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::PointError;

/// 필드 값
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 부호 있는 정수
    Int(i64),
    /// 부호 없는 정수
    UInt(u64),
    /// 부동소수점
    Float(f64),
    /// 불리언
    Bool(bool),
    /// 문자열
    Str(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}i"),
            Self::UInt(v) => write!(f, "{v}u"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => {
                f.write_str("\"")?;
                for c in v.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// 불변 측정 포인트
///
/// 필드는 비공개이며 생성 후에는 읽기 전용 접근자만 제공합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: i64,
}

impl Point {
    /// 원시 구성 요소로 포인트를 생성합니다.
    ///
    /// # Errors
    /// - 이름이 비어있는 경우
    /// - 필드가 하나도 없는 경우
    /// - 태그 키나 필드 키가 비어있는 경우
    /// - 유한하지 않은 실수 필드(NaN, inf)가 있는 경우
    pub fn new(
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        timestamp: i64,
    ) -> Result<Self, PointError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PointError::EmptyName);
        }
        if fields.is_empty() {
            return Err(PointError::NoFields { name });
        }
        if tags.contains_key("") {
            return Err(PointError::InvalidTag {
                key: String::new(),
                reason: "tag key must not be empty".to_owned(),
            });
        }
        if fields.contains_key("") {
            return Err(PointError::InvalidField {
                key: String::new(),
                reason: "field key must not be empty".to_owned(),
            });
        }
        if let Some((key, _)) = fields
            .iter()
            .find(|(_, v)| matches!(v, FieldValue::Float(f) if !f.is_finite()))
        {
            return Err(PointError::InvalidField {
                key: key.clone(),
                reason: "float value must be finite".to_owned(),
            });
        }
        Ok(Self {
            name,
            tags,
            fields,
            timestamp,
        })
    }

    /// 측정 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 태그 (키 정렬)
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// 필드 (키 정렬)
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// 타임스탬프 (Unix epoch 나노초)
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// 여러 줄의 라인 프로토콜 텍스트를 포인트 목록으로 파싱합니다.
    ///
    /// 빈 줄은 건너뜁니다. 한 줄이라도 잘못되면 전체가 실패합니다.
    pub fn parse_lines(text: &str) -> Result<Vec<Point>, PointError> {
        text.lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| {
                parse_line(line).map_err(|reason| PointError::Malformed { line: line_no, reason })
            })
            .collect()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.name)?;
        for (k, v) in &self.tags {
            f.write_str(",")?;
            write_escaped(f, k)?;
            f.write_str("=")?;
            write_escaped(f, v)?;
        }
        f.write_str(" ")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_escaped(f, k)?;
            write!(f, "={v}")?;
        }
        write!(f, " {}", self.timestamp)
    }
}

/// 포인트 빌더
///
/// 타임스탬프를 지정하지 않으면 현재 시각이 사용됩니다.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    name: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<i64>,
}

impl PointBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// 태그를 추가합니다.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// 필드를 추가합니다.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// 타임스탬프(나노초)를 지정합니다.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// 포인트를 생성합니다.
    pub fn build(self) -> Result<Point, PointError> {
        let ts = self.timestamp.unwrap_or_else(now_nanos);
        Point::new(self.name, self.tags, self.fields, ts)
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    for c in s.chars() {
        match c {
            ',' | '=' | ' ' | '"' | '\\' => write!(f, "\\{c}")?,
            '\n' => f.write_str("\\n")?,
            _ => write!(f, "{c}")?,
        }
    }
    Ok(())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// 이스케이프와 (선택적으로) 따옴표를 고려하여 구분자로 분할합니다.
fn split_unescaped(s: &str, sep: u8, respect_quotes: bool) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_quotes = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' if respect_quotes => in_quotes = !in_quotes,
            _ if b == sep && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn split_key_value(pair: &str) -> Result<(String, &str), String> {
    let parts = split_unescaped(pair, b'=', true);
    if parts.len() < 2 || parts[0].is_empty() {
        return Err(format!("expected key=value, got '{pair}'"));
    }
    let key_len = parts[0].len();
    Ok((unescape(parts[0]), &pair[key_len + 1..]))
}

fn parse_field_value(raw: &str) -> Result<FieldValue, String> {
    if let Some(inner) = raw.strip_prefix('"') {
        let inner = inner
            .strip_suffix('"')
            .ok_or_else(|| format!("unterminated string value '{raw}'"))?;
        return Ok(FieldValue::Str(unescape(inner)));
    }
    if let Some(num) = raw.strip_suffix('i') {
        return num
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|e| format!("invalid integer '{raw}': {e}"));
    }
    if let Some(num) = raw.strip_suffix('u') {
        return num
            .parse::<u64>()
            .map(FieldValue::UInt)
            .map_err(|e| format!("invalid unsigned '{raw}': {e}"));
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(FieldValue::Bool(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(FieldValue::Bool(false)),
        _ => {}
    }
    raw.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|e| format!("invalid float '{raw}': {e}"))
}

fn parse_line(line: &str) -> Result<Point, String> {
    let sections = split_unescaped(line, b' ', true);
    if sections.len() != 3 {
        return Err(format!(
            "expected 3 space-separated sections, got {}",
            sections.len()
        ));
    }

    let mut head = split_unescaped(sections[0], b',', false).into_iter();
    let name = unescape(head.next().unwrap_or_default());
    let mut tags = BTreeMap::new();
    for pair in head {
        let (k, v) = split_key_value(pair)?;
        tags.insert(k, unescape(v));
    }

    let mut fields = BTreeMap::new();
    for pair in split_unescaped(sections[1], b',', true) {
        let (k, v) = split_key_value(pair)?;
        fields.insert(k, parse_field_value(v)?);
    }

    let timestamp = sections[2]
        .parse::<i64>()
        .map_err(|e| format!("invalid timestamp '{}': {e}", sections[2]))?;

    Point::new(name, tags, fields, timestamp).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Point {
        PointBuilder::new("cpu")
            .tag("host", "web-01")
            .tag("region", "ap-northeast")
            .field("usage", 0.5)
            .field("cores", 8i64)
            .field("model", "x86")
            .timestamp(1_700_000_000_000_000_000)
            .build()
            .unwrap()
    }

    #[test]
    fn serialization_is_deterministic() {
        let text = sample().to_string();
        assert_eq!(
            text,
            r#"cpu,host=web-01,region=ap-northeast cores=8i,model="x86",usage=0.5 1700000000000000000"#
        );
        assert_eq!(text, sample().to_string());
    }

    #[test]
    fn parse_restores_point() {
        let p = sample();
        let parsed = Point::parse_lines(&p.to_string()).unwrap();
        assert_eq!(parsed, vec![p]);
    }

    #[test]
    fn escaped_identifiers_and_strings_survive() {
        let p = PointBuilder::new("disk io")
            .tag("path", "/var/lib,data=x")
            .field("msg", "say \"hi\"\\ twice\nnext line")
            .field("ok", true)
            .field("bytes", 42u64)
            .timestamp(1)
            .build()
            .unwrap();
        let text = p.to_string();
        assert!(!text.contains('\n'));
        let parsed = Point::parse_lines(&text).unwrap();
        assert_eq!(parsed[0], p);
    }

    #[test]
    fn parse_multiple_lines_skips_blank() {
        let text = format!("{}\n\n{}\n", sample(), sample());
        assert_eq!(Point::parse_lines(&text).unwrap().len(), 2);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = Point::parse_lines("cpu usage=1").unwrap_err();
        assert!(matches!(err, PointError::Malformed { line: 1, .. }));

        assert!(Point::parse_lines("cpu usage=abc 1").is_err());
        assert!(Point::parse_lines("cpu usage=\"open 1").is_err());
        assert!(Point::parse_lines("cpu usage=1 notanumber").is_err());
    }

    #[test]
    fn new_rejects_invalid_points() {
        assert!(matches!(
            PointBuilder::new("").field("a", 1i64).build(),
            Err(PointError::EmptyName)
        ));
        assert!(matches!(
            PointBuilder::new("cpu").build(),
            Err(PointError::NoFields { .. })
        ));
        assert!(matches!(
            PointBuilder::new("cpu").field("a", f64::NAN).build(),
            Err(PointError::InvalidField { .. })
        ));
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert!(matches!(
            PointBuilder::new("m").field("", 1i64).build(),
            Err(PointError::InvalidField { .. })
        ));
        assert!(matches!(
            PointBuilder::new("m").tag("", "v").field("a", 1i64).build(),
            Err(PointError::InvalidTag { .. })
        ));

        // 빈 태그 값은 텍스트로 되돌릴 수 있으므로 허용
        let p = PointBuilder::new("m")
            .tag("host", "")
            .field("a", 1i64)
            .timestamp(1)
            .build()
            .unwrap();
        assert_eq!(Point::parse_lines(&p.to_string()).unwrap(), vec![p]);
    }

    #[test]
    fn builder_defaults_timestamp_to_now() {
        let p = PointBuilder::new("cpu").field("a", 1i64).build().unwrap();
        assert!(p.timestamp() > 0);
    }

    #[test]
    fn bool_shorthand_is_accepted() {
        let parsed = Point::parse_lines("up ok=t,down=F 5").unwrap();
        assert_eq!(parsed[0].fields()["ok"], FieldValue::Bool(true));
        assert_eq!(parsed[0].fields()["down"], FieldValue::Bool(false));
    }
}
