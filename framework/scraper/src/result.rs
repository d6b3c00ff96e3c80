use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use anyhow::Context;
use compat_matrix_core::prelude::MatrixResult;

use crate::sample::MetricSample;

/// The lines of one scrape, in the order they appeared in the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    lines: Vec<String>,
}

/// Identifies a time series: the metric name and its full label set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl Display for SeriesKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "{{{labels}}}")?;
        }
        Ok(())
    }
}

impl ScrapeResult {
    /// Split a response body into non-blank lines.
    pub fn from_body(body: &str) -> Self {
        Self {
            lines: body
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The first line starting with `prefix`.
    pub fn find_prefix(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .find(|line| line.starts_with(prefix))
    }

    /// Lines that should hold a sample, which is everything except `#` comments.
    pub fn sample_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| !line.trim_start().starts_with('#'))
    }

    /// Parse every sample line, failing on the first one that is malformed.
    pub fn samples(&self) -> MatrixResult<Vec<MetricSample>> {
        self.sample_lines()
            .map(|line| {
                MetricSample::parse(line)
                    .with_context(|| format!("Malformed metric line '{line}'"))
            })
            .collect()
    }

    /// The distinct series present in this scrape.
    pub fn series_keys(&self) -> MatrixResult<BTreeSet<SeriesKey>> {
        Ok(self
            .samples()?
            .into_iter()
            .map(|sample| SeriesKey {
                name: sample.name,
                labels: sample.labels,
            })
            .collect())
    }

    /// Series that appear more than once, in the order their repeat was seen.
    pub fn duplicate_series(&self) -> MatrixResult<Vec<SeriesKey>> {
        let mut seen = BTreeSet::new();
        let mut duplicates = Vec::new();
        for sample in self.samples()? {
            let key = SeriesKey {
                name: sample.name,
                labels: sample.labels,
            };
            if seen.contains(&key) {
                if !duplicates.contains(&key) {
                    duplicates.push(key);
                }
            } else {
                seen.insert(key);
            }
        }

        Ok(duplicates)
    }
}
