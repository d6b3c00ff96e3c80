use compat_matrix_runner::prelude::*;

const NON_HEAP_COMMITTED: &str = "java_lang_Memory_NonHeapMemoryUsage_committed";
const BUILD_INFO: &str = "jmx_exporter_build_info";
/// What the agent reports as its version when it was built without one.
const UNKNOWN_VERSION: &str = "unknown";

/// The disk usage table published by the example application, two servers with two disks each.
const TABULAR_DISK_USAGE: &[&str] = &[
    r#"io_prometheus_jmx_tabularData_Server_1_Disk_Usage_Table_size{source="/dev/sda1"} 7.516192768E9"#,
    r#"io_prometheus_jmx_tabularData_Server_1_Disk_Usage_Table_size{source="/dev/sda2"} 1.5032385536E10"#,
    r#"io_prometheus_jmx_tabularData_Server_2_Disk_Usage_Table_size{source="/dev/sda1"} 2.5769803776E10"#,
    r#"io_prometheus_jmx_tabularData_Server_2_Disk_Usage_Table_size{source="/dev/sda2"} 1.073741824E11"#,
];

pub fn jvm_metric(ctx: &mut ScenarioContext) -> HookResult {
    verify_jvm_metric(&ctx.scrape()?)
}

pub fn tabular_metrics(ctx: &mut ScenarioContext) -> HookResult {
    verify_tabular_metrics(&ctx.scrape()?)
}

pub fn build_info_name(ctx: &mut ScenarioContext) -> HookResult {
    let identifier = ctx.expected_build_identifier();
    verify_build_info_name(&ctx.scrape()?, &identifier)
}

pub fn build_version_not_unknown(ctx: &mut ScenarioContext) -> HookResult {
    verify_build_version(&ctx.scrape()?)
}

pub fn well_formed_output(ctx: &mut ScenarioContext) -> HookResult {
    assert_well_formed(&ctx.scrape()?)
}

pub fn stable_series(ctx: &mut ScenarioContext) -> HookResult {
    let first = ctx.scrape()?;
    let second = ctx.scrape()?;
    assert_same_series(&first, &second)
}

fn verify_jvm_metric(result: &ScrapeResult) -> HookResult {
    assert_positive_value(result, NON_HEAP_COMMITTED)
}

fn verify_tabular_metrics(result: &ScrapeResult) -> HookResult {
    assert_prefixes_present(result, TABULAR_DISK_USAGE)
}

fn verify_build_info_name(result: &ScrapeResult, identifier: &str) -> HookResult {
    assert_build_info_identifier(result, BUILD_INFO, identifier)
}

// No easy way to check the version itself.
fn verify_build_version(result: &ScrapeResult) -> HookResult {
    assert_build_info_excludes(result, BUILD_INFO, UNKNOWN_VERSION)
}
