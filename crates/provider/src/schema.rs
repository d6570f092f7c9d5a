//! Resource schema
//!
//! Attribute declarations for the feed resource, plus the validation and
//! replacement rules derived from them.

use uuid::Uuid;

use crate::state::{bool_value, DynamicValue};

/// Resource type name of the feed resource
pub const FEED_TYPE_NAME: &str = "feedform_feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Bool,
}

/// Value check applied to a configured attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Non-empty and not only whitespace
    NotWhitespace,
    /// Parses as a UUID
    Uuid,
}

impl Validator {
    fn check(&self, value: &str) -> Option<String> {
        match self {
            Validator::NotWhitespace if value.trim().is_empty() => {
                Some("expected a non-empty string that is not only whitespace".to_string())
            }
            Validator::Uuid if Uuid::parse_str(value).is_err() => {
                Some(format!("expected a UUID, got {:?}", value))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    /// A change forces destroy and re-create instead of an update
    pub force_new: bool,
    pub default: Option<DynamicValue>,
    pub validator: Option<Validator>,
}

impl Attribute {
    fn new(name: &'static str, kind: AttributeType) -> Self {
        Self {
            name,
            kind,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            default: None,
            validator: None,
        }
    }

    pub fn required(name: &'static str, kind: AttributeType) -> Self {
        Self {
            required: true,
            ..Self::new(name, kind)
        }
    }

    pub fn optional(name: &'static str, kind: AttributeType) -> Self {
        Self {
            optional: true,
            ..Self::new(name, kind)
        }
    }

    pub fn computed(name: &'static str, kind: AttributeType) -> Self {
        Self {
            computed: true,
            ..Self::new(name, kind)
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: DynamicValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Nested block represented as a list of maps
#[derive(Debug, Clone)]
pub struct NestedBlock {
    pub name: &'static str,
    pub max_items: usize,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub version: i64,
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<NestedBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// User-facing problem report
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn at(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// Schema of the feed resource
pub fn feed_schema() -> ResourceSchema {
    ResourceSchema {
        version: 0,
        attributes: vec![
            Attribute::computed("id", AttributeType::String),
            Attribute::required("name", AttributeType::String)
                .force_new()
                .with_validator(Validator::NotWhitespace),
            Attribute::optional("project_id", AttributeType::String)
                .force_new()
                .with_validator(Validator::Uuid),
        ],
        blocks: vec![NestedBlock {
            name: "features",
            max_items: 1,
            attributes: vec![
                Attribute::optional("permanent_delete", AttributeType::Bool)
                    .with_default(bool_value(false)),
                Attribute::optional("restore", AttributeType::Bool)
                    .with_default(bool_value(false)),
            ],
        }],
    }
}

impl ResourceSchema {
    /// Validate a resource configuration
    pub fn validate(&self, config: &DynamicValue) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for attr in &self.attributes {
            let value = config.get(attr.name).filter(|v| !v.is_null());
            check_attribute(attr, value, attr.name, &mut diagnostics);
        }

        for block in &self.blocks {
            let items = match config.get(block.name) {
                None | Some(DynamicValue::Null) => continue,
                Some(DynamicValue::List(items)) => items,
                Some(_) => {
                    diagnostics.push(
                        Diagnostic::error("Invalid block", "expected a list of blocks")
                            .at(block.name),
                    );
                    continue;
                }
            };

            if items.len() > block.max_items {
                diagnostics.push(
                    Diagnostic::error(
                        "Too many blocks",
                        format!(
                            "at most {} \"{}\" block(s) allowed, got {}",
                            block.max_items,
                            block.name,
                            items.len()
                        ),
                    )
                    .at(block.name),
                );
            }

            for (index, item) in items.iter().enumerate() {
                for attr in &block.attributes {
                    let path = format!("{}.{}.{}", block.name, index, attr.name);
                    let value = item.get(attr.name).filter(|v| !v.is_null());
                    check_attribute(attr, value, &path, &mut diagnostics);
                }
            }
        }

        diagnostics
    }

    /// Force-new attributes whose value differs between prior and planned state
    pub fn requires_replace(&self, prior: &DynamicValue, planned: &DynamicValue) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|attr| attr.force_new)
            .filter(|attr| comparable(prior.get(attr.name)) != comparable(planned.get(attr.name)))
            .map(|attr| attr.name.to_string())
            .collect()
    }

    /// Fill block attribute defaults into a configuration
    pub fn apply_defaults(&self, config: &DynamicValue) -> DynamicValue {
        let mut config = config.clone();
        if let DynamicValue::Map(map) = &mut config {
            for block in &self.blocks {
                if let Some(DynamicValue::List(items)) = map.get_mut(block.name) {
                    for item in items.iter_mut() {
                        if let DynamicValue::Map(fields) = item {
                            for attr in &block.attributes {
                                if let Some(default) = &attr.default {
                                    let slot = fields
                                        .entry(attr.name.to_string())
                                        .or_insert(DynamicValue::Null);
                                    if slot.is_null() {
                                        *slot = default.clone();
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        config
    }
}

fn check_attribute(
    attr: &Attribute,
    value: Option<&DynamicValue>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let value = match value {
        Some(value) => value,
        None => {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!("The argument \"{}\" is required", attr.name),
                    )
                    .at(path),
                );
            }
            return;
        }
    };

    if attr.computed && !attr.optional && !attr.required {
        // Computed-only values are set by the provider, never configured
        return;
    }

    match (attr.kind, value) {
        (AttributeType::String, DynamicValue::String(s)) => {
            if let Some(problem) = attr.validator.and_then(|v| v.check(s)) {
                diagnostics.push(Diagnostic::error("Invalid value", problem).at(path));
            }
        }
        (AttributeType::Bool, DynamicValue::Bool(_)) => {}
        (kind, _) => {
            diagnostics.push(
                Diagnostic::error("Incorrect attribute value type", format!("expected {:?}", kind))
                    .at(path),
            );
        }
    }
}

/// Null and empty strings compare equal, matching how unset optional
/// strings are stored.
fn comparable(value: Option<&DynamicValue>) -> Option<&DynamicValue> {
    match value {
        None | Some(DynamicValue::Null) => None,
        Some(DynamicValue::String(s)) if s.is_empty() => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{get_block, list_value, make_state, null_value, string_value};

    const PROJECT: &str = "11111111-1111-1111-1111-111111111111";

    #[test]
    fn test_valid_config() {
        let config = make_state(vec![
            ("name", string_value("pkgs")),
            ("project_id", string_value(PROJECT)),
            (
                "features",
                list_value(vec![make_state(vec![("restore", bool_value(true))])]),
            ),
        ]);
        assert!(feed_schema().validate(&config).is_empty());
    }

    #[test]
    fn test_whitespace_name_rejected() {
        let config = make_state(vec![("name", string_value("   "))]);
        let diagnostics = feed_schema().validate(&config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));
    }

    #[test]
    fn test_missing_name_rejected() {
        let diagnostics = feed_schema().validate(&make_state(vec![]));
        assert_eq!(diagnostics[0].summary, "Missing required argument");
    }

    #[test]
    fn test_bad_project_id_rejected() {
        let config = make_state(vec![
            ("name", string_value("pkgs")),
            ("project_id", string_value("platform")),
        ]);
        let diagnostics = feed_schema().validate(&config);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("project_id"));
    }

    #[test]
    fn test_features_block_limits() {
        let config = make_state(vec![
            ("name", string_value("pkgs")),
            (
                "features",
                list_value(vec![
                    make_state(vec![]),
                    make_state(vec![("restore", string_value("yes"))]),
                ]),
            ),
        ]);
        let diagnostics = feed_schema().validate(&config);
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attributes, vec!["features", "features.1.restore"]);
    }

    #[test]
    fn test_requires_replace() {
        let schema = feed_schema();
        let prior = make_state(vec![
            ("id", string_value("0b0c7b5e-3c2c-4f7a-9a0e-6f4a8d3f2a11")),
            ("name", string_value("pkgs")),
            ("project_id", null_value()),
        ]);

        let renamed = make_state(vec![
            ("name", string_value("pkgs-v2")),
            ("project_id", string_value("")),
        ]);
        assert_eq!(schema.requires_replace(&prior, &renamed), vec!["name"]);

        let moved = make_state(vec![
            ("name", string_value("pkgs")),
            ("project_id", string_value(PROJECT)),
        ]);
        assert_eq!(schema.requires_replace(&prior, &moved), vec!["project_id"]);
    }

    #[test]
    fn test_apply_defaults() {
        let config = make_state(vec![
            ("name", string_value("pkgs")),
            (
                "features",
                list_value(vec![make_state(vec![("restore", bool_value(true))])]),
            ),
        ]);
        let schema = feed_schema();
        let filled = schema.apply_defaults(&config);
        let block = get_block(&filled, "features").unwrap();
        assert_eq!(block.get("restore"), Some(&bool_value(true)));
        assert_eq!(block.get("permanent_delete"), Some(&bool_value(false)));
    }
}
