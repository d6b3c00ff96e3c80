//! Properties of a scrape that checks can assert on.
//!
//! Every failure is a [HarnessError::AssertionFailure] so that it is reported as such.

use compat_matrix_core::prelude::{HarnessError, MatrixResult};
use compat_matrix_scraper::{MetricSample, ScrapeResult, SeriesKey};

/// A line starting with `metric_name` exists and its value is greater than zero.
pub fn assert_positive_value(result: &ScrapeResult, metric_name: &str) -> MatrixResult<()> {
    let line = result
        .find_prefix(metric_name)
        .ok_or_else(|| HarnessError::assertion(format!("Metric {metric_name} not found.")))?;

    let sample = MetricSample::parse(line).map_err(|e| {
        HarnessError::assertion(format!("Metric {metric_name} has an unreadable line '{line}': {e}"))
    })?;

    if sample.value > 0.0 {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "{metric_name} should be > 0 but was {}",
            sample.value
        ))
        .into())
    }
}

/// Every prefix starts at least one line. Order does not matter.
pub fn assert_prefixes_present(result: &ScrapeResult, prefixes: &[&str]) -> MatrixResult<()> {
    let missing = prefixes
        .iter()
        .filter(|prefix| result.find_prefix(prefix).is_none())
        .copied()
        .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!("Metrics not found: {}", missing.join(", "))).into())
    }
}

/// If a `build_info_metric` line is present it names `identifier` as a quoted label value.
///
/// An absent build info line passes.
pub fn assert_build_info_identifier(
    result: &ScrapeResult,
    build_info_metric: &str,
    identifier: &str,
) -> MatrixResult<()> {
    let Some(line) = result.find_prefix(build_info_metric) else {
        log::debug!("No {build_info_metric} line, skipping the identifier check");
        return Ok(());
    };

    let needle = format!("\"{identifier}\"");
    if line.contains(&needle) {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!("Expected {needle} in '{line}'")).into())
    }
}

/// If a `build_info_metric` line is present it never has `sentinel` as a quoted label value.
///
/// An absent build info line passes.
pub fn assert_build_info_excludes(
    result: &ScrapeResult,
    build_info_metric: &str,
    sentinel: &str,
) -> MatrixResult<()> {
    let Some(line) = result.find_prefix(build_info_metric) else {
        log::debug!("No {build_info_metric} line, skipping the sentinel check");
        return Ok(());
    };

    let needle = format!("\"{sentinel}\"");
    if line.contains(&needle) {
        Err(HarnessError::assertion(format!("Unexpected {needle} in '{line}'")).into())
    } else {
        Ok(())
    }
}

/// The scrape is not empty, every sample line parses and no series appears twice.
pub fn assert_well_formed(result: &ScrapeResult) -> MatrixResult<()> {
    if result.is_empty() {
        return Err(HarnessError::assertion("The scrape returned no lines").into());
    }

    let duplicates = result
        .duplicate_series()
        .map_err(|e| HarnessError::assertion(format!("{e:#}")))?;
    if !duplicates.is_empty() {
        return Err(HarnessError::assertion(format!(
            "Duplicate series: {}",
            duplicates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .into());
    }

    Ok(())
}

/// Both scrapes hold exactly the same series, values aside.
pub fn assert_same_series(first: &ScrapeResult, second: &ScrapeResult) -> MatrixResult<()> {
    let first = first
        .series_keys()
        .map_err(|e| HarnessError::assertion(format!("{e:#}")))?;
    let second = second
        .series_keys()
        .map_err(|e| HarnessError::assertion(format!("{e:#}")))?;

    if first == second {
        return Ok(());
    }

    Err(HarnessError::assertion(format!(
        "Series changed between scrapes. Only in the first: [{}]. Only in the second: [{}]",
        describe(first.difference(&second)),
        describe(second.difference(&first)),
    ))
    .into())
}

fn describe<'a>(keys: impl Iterator<Item = &'a SeriesKey>) -> String {
    keys.map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"# HELP java_lang_Memory_NonHeapMemoryUsage_committed NonHeapMemoryUsage
# TYPE java_lang_Memory_NonHeapMemoryUsage_committed untyped
java_lang_Memory_NonHeapMemoryUsage_committed 2.4576E7
io_prometheus_jmx_tabularData_Server_1_Disk_Usage_Table_size{source="/dev/sda1"} 7.516192768E9
io_prometheus_jmx_tabularData_Server_2_Disk_Usage_Table_size{source="/dev/sda2"} 1.073741824E11
jmx_exporter_build_info{version="1.0.0",name="jmx_prometheus_javaagent",} 1.0
"#;

    fn kind(result: MatrixResult<()>) -> &'static str {
        result
            .unwrap_err()
            .downcast_ref::<HarnessError>()
            .unwrap()
            .kind()
    }

    #[test]
    fn positive_value() {
        let result = ScrapeResult::from_body(BODY);
        assert_positive_value(&result, "java_lang_Memory_NonHeapMemoryUsage_committed").unwrap();

        let err = assert_positive_value(&result, "jvm_missing").unwrap_err();
        assert_eq!("Metric jvm_missing not found.", err.to_string());
    }

    #[test]
    fn zero_and_nan_are_not_positive() {
        let result = ScrapeResult::from_body("a 0.0\nb NaN\nc -1\n");
        for name in ["a", "b", "c"] {
            assert_eq!("AssertionFailure", kind(assert_positive_value(&result, name)));
        }
    }

    #[test]
    fn prefixes_in_any_order() {
        let result = ScrapeResult::from_body(BODY);
        assert_prefixes_present(
            &result,
            &[
                "io_prometheus_jmx_tabularData_Server_2_Disk_Usage_Table_size{source=\"/dev/sda2\"} 1.073741824E11",
                "io_prometheus_jmx_tabularData_Server_1_Disk_Usage_Table_size{source=\"/dev/sda1\"} 7.516192768E9",
            ],
        )
        .unwrap();
    }

    #[test]
    fn every_missing_prefix_is_named() {
        let result = ScrapeResult::from_body(BODY);
        let err = assert_prefixes_present(&result, &["x_total", "java_lang", "y_total"]).unwrap_err();
        assert_eq!("Metrics not found: x_total, y_total", err.to_string());
    }

    #[test]
    fn build_info_identifier_is_quoted() {
        let result = ScrapeResult::from_body(BODY);
        assert_build_info_identifier(&result, "jmx_exporter_build_info", "jmx_prometheus_javaagent")
            .unwrap();

        // A prefix of the real value must not count.
        assert_eq!(
            "AssertionFailure",
            kind(assert_build_info_identifier(
                &result,
                "jmx_exporter_build_info",
                "jmx_prometheus"
            ))
        );
        assert!(assert_build_info_identifier(
            &result,
            "jmx_exporter_build_info",
            "jmx_prometheus_javaagent_java6"
        )
        .is_err());
    }

    #[test]
    fn build_info_checks_pass_without_build_info() {
        let result = ScrapeResult::from_body("jvm_threads_current 12\n");
        assert_build_info_identifier(&result, "jmx_exporter_build_info", "anything").unwrap();
        assert_build_info_excludes(&result, "jmx_exporter_build_info", "unknown").unwrap();
    }

    #[test]
    fn unknown_build_version_is_rejected() {
        let good = ScrapeResult::from_body(BODY);
        assert_build_info_excludes(&good, "jmx_exporter_build_info", "unknown").unwrap();

        let bad = ScrapeResult::from_body(
            "jmx_exporter_build_info{version=\"unknown\",name=\"jmx_prometheus_javaagent\",} 1.0\n",
        );
        assert_eq!(
            "AssertionFailure",
            kind(assert_build_info_excludes(&bad, "jmx_exporter_build_info", "unknown"))
        );
    }

    #[test]
    fn well_formed_output() {
        assert_well_formed(&ScrapeResult::from_body(BODY)).unwrap();

        assert!(assert_well_formed(&ScrapeResult::from_body("\n\n")).is_err());
        assert!(assert_well_formed(&ScrapeResult::from_body("a{b=\"c\" 1\n")).is_err());

        let err = assert_well_formed(&ScrapeResult::from_body("a{b=\"c\"} 1\na{b=\"c\"} 2\n"))
            .unwrap_err();
        assert_eq!("Duplicate series: a{b=\"c\"}", err.to_string());
    }

    #[test]
    fn same_series_ignores_values() {
        let first = ScrapeResult::from_body("a{b=\"c\"} 1\nd 2\n");
        let second = ScrapeResult::from_body("d 5\na{b=\"c\"} 3\n");
        assert_same_series(&first, &second).unwrap();
    }

    #[test]
    fn changed_series_are_listed() {
        let first = ScrapeResult::from_body("a 1\nb 2\n");
        let second = ScrapeResult::from_body("a 1\nc 2\n");

        let err = assert_same_series(&first, &second).unwrap_err();
        assert_eq!(
            "Series changed between scrapes. Only in the first: [b]. Only in the second: [c]",
            err.to_string()
        );
    }
}
