use std::collections::BTreeMap;

/// One observation from the exposition text, `name{label="value",...} value [timestamp]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleParseError {
    #[error("line is a comment, not a sample")]
    Comment,
    #[error("invalid metric name")]
    InvalidName,
    #[error("label set is not terminated")]
    UnterminatedLabels,
    #[error("malformed label near '{0}'")]
    MalformedLabel(String),
    #[error("label '{0}' appears more than once")]
    DuplicateLabel(String),
    #[error("missing value")]
    MissingValue,
    #[error("invalid value '{0}'")]
    InvalidValue(String),
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("unexpected trailing input '{0}'")]
    TrailingInput(String),
}

impl MetricSample {
    pub fn parse(line: &str) -> Result<Self, SampleParseError> {
        let line = line.trim();
        if line.starts_with('#') {
            return Err(SampleParseError::Comment);
        }

        let name_len = line
            .find(|c: char| !is_name_char(c))
            .unwrap_or(line.len());
        let (name, rest) = line.split_at(name_len);
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(SampleParseError::InvalidName);
        }

        let (labels, rest) = match rest.strip_prefix('{') {
            Some(label_text) => parse_labels(label_text)?,
            None => (BTreeMap::new(), rest),
        };

        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Err(SampleParseError::InvalidName);
        }

        let mut fields = rest.split_whitespace();
        let value = fields.next().ok_or(SampleParseError::MissingValue)?;
        let value = value
            .parse::<f64>()
            .map_err(|_| SampleParseError::InvalidValue(value.to_string()))?;

        if let Some(timestamp) = fields.next() {
            timestamp
                .parse::<i64>()
                .map_err(|_| SampleParseError::InvalidTimestamp(timestamp.to_string()))?;
        }

        if let Some(trailing) = fields.next() {
            return Err(SampleParseError::TrailingInput(trailing.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            labels,
            value,
        })
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Parse the label set following an opening brace, returning the labels and the input after the
/// closing brace.
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), SampleParseError> {
    let mut labels = BTreeMap::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }
        if rest.is_empty() {
            return Err(SampleParseError::UnterminatedLabels);
        }

        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            return Err(SampleParseError::MalformedLabel(rest.to_string()));
        }
        let (name, after_name) = rest.split_at(name_len);

        let quoted = after_name
            .trim_start()
            .strip_prefix('=')
            .map(str::trim_start)
            .and_then(|s| s.strip_prefix('"'))
            .ok_or_else(|| SampleParseError::MalformedLabel(name.to_string()))?;
        let (value, after_value) =
            parse_quoted(quoted).ok_or(SampleParseError::UnterminatedLabels)?;

        if labels.insert(name.to_string(), value).is_some() {
            return Err(SampleParseError::DuplicateLabel(name.to_string()));
        }

        rest = after_value.trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma;
        } else if rest.is_empty() {
            return Err(SampleParseError::UnterminatedLabels);
        } else if !rest.starts_with('}') {
            return Err(SampleParseError::MalformedLabel(name.to_string()));
        }
    }
}

/// Read a label value up to its closing quote, undoing `\\`, `\"` and `\n` escapes.
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, &input[i + 1..])),
            '\\' => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, escaped) => value.push(escaped),
            },
            c => value.push(c),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_sample_without_labels() {
        let sample =
            MetricSample::parse("java_lang_Memory_NonHeapMemoryUsage_committed 4.1943040E7")
                .unwrap();

        assert_eq!("java_lang_Memory_NonHeapMemoryUsage_committed", sample.name);
        assert!(sample.labels.is_empty());
        assert_eq!(41943040.0, sample.value);
    }

    #[test]
    fn parse_sample_with_labels() {
        let sample = MetricSample::parse(
            r#"io_prometheus_jmx_tabularData_Server_1_Disk_Usage_Table_size{source="/dev/sda1"} 7.516192768E9"#,
        )
        .unwrap();

        assert_eq!(
            "io_prometheus_jmx_tabularData_Server_1_Disk_Usage_Table_size",
            sample.name
        );
        assert_eq!(labels(&[("source", "/dev/sda1")]), sample.labels);
        assert_eq!(7.516192768E9, sample.value);
    }

    #[test]
    fn parse_build_info() {
        let sample = MetricSample::parse(
            r#"jmx_exporter_build_info{version="0.20.0",name="jmx_prometheus_javaagent",} 1.0"#,
        )
        .unwrap();

        assert_eq!(
            labels(&[("version", "0.20.0"), ("name", "jmx_prometheus_javaagent")]),
            sample.labels
        );
        assert_eq!(1.0, sample.value);
    }

    #[test]
    fn parse_escaped_label_values() {
        let sample =
            MetricSample::parse(r#"m{path="C:\\temp",quote="say \"hi\"",multi="a\nb"} 1"#)
                .unwrap();

        assert_eq!(
            labels(&[
                ("path", "C:\\temp"),
                ("quote", "say \"hi\""),
                ("multi", "a\nb")
            ]),
            sample.labels
        );
    }

    #[test]
    fn parse_special_values_and_timestamp() {
        assert_eq!(
            f64::INFINITY,
            MetricSample::parse("m_bucket{le=\"+Inf\"} +Inf").unwrap().value
        );
        assert_eq!(f64::NEG_INFINITY, MetricSample::parse("m -Inf").unwrap().value);
        assert!(MetricSample::parse("m NaN").unwrap().value.is_nan());
        assert_eq!(3.0, MetricSample::parse("m 3 1700000000000").unwrap().value);
    }

    #[test]
    fn reject_malformed_lines() {
        assert_eq!(
            Err(SampleParseError::Comment),
            MetricSample::parse("# TYPE m gauge")
        );
        assert_eq!(Err(SampleParseError::InvalidName), MetricSample::parse("1m 2"));
        assert_eq!(Err(SampleParseError::InvalidName), MetricSample::parse("m-x 2"));
        assert_eq!(Err(SampleParseError::MissingValue), MetricSample::parse("m"));
        assert_eq!(
            Err(SampleParseError::UnterminatedLabels),
            MetricSample::parse("m{a=\"b\",")
        );
        assert_eq!(
            Err(SampleParseError::MalformedLabel("a".to_string())),
            MetricSample::parse("m{a=\"b\" 1")
        );
        assert_eq!(
            Err(SampleParseError::UnterminatedLabels),
            MetricSample::parse("m{a=\"b} 1")
        );
        assert_eq!(
            Err(SampleParseError::MalformedLabel("a".to_string())),
            MetricSample::parse("m{a=b} 1")
        );
        assert_eq!(
            Err(SampleParseError::DuplicateLabel("a".to_string())),
            MetricSample::parse("m{a=\"1\",a=\"2\"} 1")
        );
        assert_eq!(
            Err(SampleParseError::InvalidValue("one".to_string())),
            MetricSample::parse("m one")
        );
        assert_eq!(
            Err(SampleParseError::InvalidTimestamp("later".to_string())),
            MetricSample::parse("m 1 later")
        );
        assert_eq!(
            Err(SampleParseError::TrailingInput("extra".to_string())),
            MetricSample::parse("m 1 2 extra")
        );
    }
}
