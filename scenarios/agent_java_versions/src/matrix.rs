use compat_matrix_runner::prelude::BuildIdentifierTable;

/// Every runtime image the agent is expected to work on, paired with each agent build that
/// supports it.
pub const SCENARIOS: &[(&str, &str)] = &[
    // HotSpot
    ("openjdk:8-jre", "jmx_prometheus_javaagent"),
    ("openjdk:8-jre", "jmx_prometheus_javaagent_java6"),
    ("openjdk:11-jre", "jmx_prometheus_javaagent_java6"),
    ("openjdk:11-jre", "jmx_prometheus_javaagent"),
    ("openjdk:17-oracle", "jmx_prometheus_javaagent_java6"),
    ("openjdk:17-oracle", "jmx_prometheus_javaagent"),
    ("ticketfly/java:6", "jmx_prometheus_javaagent_java6"),
    ("openjdk:7", "jmx_prometheus_javaagent_java6"),
    ("openjdk:7", "jmx_prometheus_javaagent"),
    // OpenJ9
    ("ibmjava:8-jre", "jmx_prometheus_javaagent_java6"),
    ("ibmjava:8-jre", "jmx_prometheus_javaagent"),
    ("ibmjava:11", "jmx_prometheus_javaagent_java6"),
    ("ibmjava:11", "jmx_prometheus_javaagent"),
    ("adoptopenjdk/openjdk11-openj9", "jmx_prometheus_javaagent_java6"),
    ("adoptopenjdk/openjdk11-openj9", "jmx_prometheus_javaagent"),
];

/// The name each agent build reports in its build info.
pub fn build_identifiers() -> BuildIdentifierTable {
    BuildIdentifierTable::new()
        .with_suffix_rule("_java6", "jmx_prometheus_javaagent_java6")
        .with_default("jmx_prometheus_javaagent")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn no_duplicate_scenarios() {
        let unique = SCENARIOS.iter().collect::<HashSet<_>>();
        assert_eq!(SCENARIOS.len(), unique.len());
    }

    #[test]
    fn java6_image_only_runs_the_java6_agent() {
        let variants = SCENARIOS
            .iter()
            .filter(|(image, _)| *image == "ticketfly/java:6")
            .map(|(_, variant)| *variant)
            .collect::<Vec<_>>();

        assert_eq!(vec!["jmx_prometheus_javaagent_java6"], variants);
    }

    #[test]
    fn every_variant_has_an_identifier() {
        let identifiers = build_identifiers();
        for (_, variant) in SCENARIOS {
            assert_eq!(*variant, identifiers.identifier_for(variant));
        }
    }
}
