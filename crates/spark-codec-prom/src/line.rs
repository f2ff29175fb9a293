//! 单行文本暴露格式的解析。
//!
//! # 语法（What）
//! ```text
//! metric_name[{key="value",...}] value [timestamp]
//! ```
//! - 标签值为双引号字符串，支持 `\\`、`\"`、`\n` 三种转义，未知转义原样保留；
//! - 标签列表允许尾随逗号，`{}` 合法；
//! - 数值接受浮点数以及 `NaN`、`Inf`、`+Inf`、`-Inf`（大小写不敏感）；
//! - 时间戳为毫秒，允许浮点写法，小数部分截断。
//!
//! # 实现方式（How）
//! - 在 `&str` 上做单趟扫描，结果直接写入调用方提供的 [`Row`]，指标名复用其字符串容量。

use thiserror::Error;

use crate::row::{Row, Tag};

/// 单行解析失败的原因。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("missing metric name")]
    MissingName,
    #[error("missing value")]
    MissingValue,
    #[error("missing `}}` at the end of tags")]
    UnclosedTags,
    #[error("missing `=` after tag key {0:?}")]
    MissingTagEquals(String),
    #[error("empty tag key")]
    EmptyTagKey,
    #[error("value for tag {0:?} must be a quoted string")]
    UnquotedTagValue(String),
    #[error("missing closing quote for tag {0:?}")]
    UnclosedTagValue(String),
    #[error("missing `,` after tag {0:?}")]
    MissingTagSeparator(String),
    #[error("cannot parse value {0:?}")]
    InvalidValue(String),
    #[error("cannot parse timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("unexpected trailing data {0:?}")]
    TrailingData(String),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// 解析已去除首尾空白的一行，结果覆写 `row` 的全部字段。
pub(crate) fn parse_line(line: &str, row: &mut Row) -> Result<(), LineError> {
    row.clear();
    let name_end = line
        .find(|c: char| c == '{' || c.is_ascii_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return Err(LineError::MissingName);
    }
    row.metric.push_str(name);

    let mut rest = &line[name_end..];
    if let Some(tags) = rest.strip_prefix('{') {
        rest = parse_tags(tags, &mut row.tags)?;
    }

    let mut fields = rest.split_ascii_whitespace();
    let value = fields.next().ok_or(LineError::MissingValue)?;
    row.value = parse_value(value)?;
    if let Some(timestamp) = fields.next() {
        row.timestamp = parse_timestamp(timestamp)?;
    }
    if let Some(extra) = fields.next() {
        return Err(LineError::TrailingData(extra.to_owned()));
    }
    Ok(())
}

/// 解析 `{` 之后的标签列表，返回 `}` 之后的剩余文本。
fn parse_tags<'a>(mut s: &'a str, tags: &mut Vec<Tag>) -> Result<&'a str, LineError> {
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix('}') {
            return Ok(rest);
        }
        let delimiter = s.find(['=', '}', ',']).ok_or(LineError::UnclosedTags)?;
        let key = s[..delimiter].trim();
        if !s[delimiter..].starts_with('=') {
            return Err(LineError::MissingTagEquals(key.to_owned()));
        }
        if key.is_empty() {
            return Err(LineError::EmptyTagKey);
        }
        let quoted = s[delimiter + 1..].trim_start();
        let body = quoted
            .strip_prefix('"')
            .ok_or_else(|| LineError::UnquotedTagValue(key.to_owned()))?;

        let mut value = String::new();
        let consumed = unescape_until_quote(body, &mut value)
            .ok_or_else(|| LineError::UnclosedTagValue(key.to_owned()))?;
        tags.push(Tag {
            key: key.to_owned(),
            value,
        });

        s = body[consumed..].trim_start();
        if let Some(rest) = s.strip_prefix(',') {
            s = rest;
        } else if s.is_empty() {
            return Err(LineError::UnclosedTags);
        } else if !s.starts_with('}') {
            return Err(LineError::MissingTagSeparator(key.to_owned()));
        }
    }
}

/// 把 `body` 中直到未转义 `"` 的内容反转义写入 `out`，返回包含结束引号在内消费的字节数。
fn unescape_until_quote(body: &str, out: &mut String) -> Option<usize> {
    let mut chars = body.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Some(index + 1),
            '\\' => match chars.next()? {
                (_, 'n') => out.push('\n'),
                (_, '\\') => out.push('\\'),
                (_, '"') => out.push('"'),
                (_, other) => {
                    out.push('\\');
                    out.push(other);
                }
            },
            c => out.push(c),
        }
    }
    None
}

fn parse_value(text: &str) -> Result<f64, LineError> {
    // `f64::from_str` 已接受大小写不敏感的 `NaN`/`Inf`/`Infinity` 及可选符号。
    text.parse::<f64>()
        .map_err(|_| LineError::InvalidValue(text.to_owned()))
}

fn parse_timestamp(text: &str) -> Result<i64, LineError> {
    if let Ok(millis) = text.parse::<i64>() {
        return Ok(millis);
    }
    match text.parse::<f64>() {
        Ok(millis) if millis.is_finite() => Ok(millis.trunc() as i64),
        _ => Err(LineError::InvalidTimestamp(text.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Row, LineError> {
        let mut row = Row::default();
        parse_line(line, &mut row).map(|()| row)
    }

    #[test]
    fn bare_metric_with_value() {
        let row = parse("metric1 1").expect("合法行");
        assert_eq!(row.metric, "metric1");
        assert!(row.tags.is_empty());
        assert_eq!(row.value, 1.0);
        assert_eq!(row.timestamp, 0);
    }

    #[test]
    fn tags_and_timestamp() {
        let row = parse(r#"http_requests_total{method="post", code="200",} 1027 1395066363000"#)
            .expect("合法行");
        assert_eq!(row.metric, "http_requests_total");
        assert_eq!(row.tag("method"), Some("post"));
        assert_eq!(row.tag("code"), Some("200"));
        assert_eq!(row.value, 1027.0);
        assert_eq!(row.timestamp, 1_395_066_363_000);
    }

    #[test]
    fn escaped_tag_values() {
        let row = parse(r#"msdos_file_access_time_seconds{path="C:\\DIR\\FILE.TXT",error="Cannot find file:\n\"FILE.TXT\""} 1.458255915e9"#)
            .expect("合法行");
        assert_eq!(row.tag("path"), Some(r"C:\DIR\FILE.TXT"));
        assert_eq!(row.tag("error"), Some("Cannot find file:\n\"FILE.TXT\""));
        assert_eq!(row.value, 1.458255915e9);
    }

    #[test]
    fn special_values() {
        assert!(parse("m NaN").expect("NaN").value.is_nan());
        assert_eq!(parse("m +Inf").expect("+Inf").value, f64::INFINITY);
        assert_eq!(parse("m Inf").expect("Inf").value, f64::INFINITY);
        assert_eq!(parse("m -Inf").expect("-Inf").value, f64::NEG_INFINITY);
        assert_eq!(parse("m -1.5e-3").expect("科学计数").value, -1.5e-3);
    }

    #[test]
    fn float_timestamp_is_truncated() {
        assert_eq!(parse("m 1 1700000000123.9").expect("浮点时间戳").timestamp, 1_700_000_000_123);
    }

    #[test]
    fn empty_tag_list_without_space() {
        let row = parse("m{}2").expect("空标签");
        assert!(row.tags.is_empty());
        assert_eq!(row.value, 2.0);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(parse("metric"), Err(LineError::MissingValue));
        assert_eq!(parse("m{a=\"b\""), Err(LineError::UnclosedTags));
        assert_eq!(parse("m{a=\"b\",c"), Err(LineError::UnclosedTags));
        assert_eq!(parse("m{a=b} 1"), Err(LineError::UnquotedTagValue("a".into())));
        assert_eq!(parse("m{a} 1"), Err(LineError::MissingTagEquals("a".into())));
        assert_eq!(parse("m{=\"b\"} 1"), Err(LineError::EmptyTagKey));
        assert_eq!(parse("m{a=\"b} 1"), Err(LineError::UnclosedTagValue("a".into())));
        assert_eq!(
            parse("m{a=\"b\" c=\"d\"} 1"),
            Err(LineError::MissingTagSeparator("a".into()))
        );
        assert_eq!(parse("m abc"), Err(LineError::InvalidValue("abc".into())));
        assert_eq!(parse("m 1 soon"), Err(LineError::InvalidTimestamp("soon".into())));
        assert_eq!(parse("m 1 2 3"), Err(LineError::TrailingData("3".into())));
        assert_eq!(parse("{a=\"b\"} 1"), Err(LineError::MissingName));
    }

    #[test]
    fn reused_row_is_fully_overwritten() {
        let mut row = Row::default();
        parse_line(r#"a{x="1"} 5 10"#, &mut row).expect("首行");
        parse_line("b 6", &mut row).expect("次行");
        assert_eq!(row.metric, "b");
        assert!(row.tags.is_empty());
        assert_eq!(row.timestamp, 0);
    }
}
