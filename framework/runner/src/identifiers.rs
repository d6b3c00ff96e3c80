/// Maps an agent variant to the identifier its build-info metric is expected to carry.
///
/// Rules are matched by variant suffix, first match wins. A variant that matches no rule uses the
/// default identifier if one is set, and its own id otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIdentifierTable {
    suffix_rules: Vec<(String, String)>,
    default_identifier: Option<String>,
}

impl BuildIdentifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix_rule(
        mut self,
        variant_suffix: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        self.suffix_rules
            .push((variant_suffix.into(), identifier.into()));
        self
    }

    pub fn with_default(mut self, identifier: impl Into<String>) -> Self {
        self.default_identifier = Some(identifier.into());
        self
    }

    pub fn identifier_for(&self, agent_variant: &str) -> String {
        self.suffix_rules
            .iter()
            .find(|(suffix, _)| agent_variant.ends_with(suffix.as_str()))
            .map(|(_, identifier)| identifier.clone())
            .or_else(|| self.default_identifier.clone())
            .unwrap_or_else(|| agent_variant.to_string())
    }
}
