use serde::{Deserialize, Serialize};

/// The primitive shape a [`ConfigField`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFieldType {
    String,
    Int,
    Bool,
    Select,
    Multiselect,
    Password,
    Object,
}

/// Constraints applied to a single field's value during validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Validation {
    pub pattern: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
}

/// One node in a plugin's declarative configuration tree.
///
/// Plugins build these with the fluent constructors below rather than
/// deriving them from struct reflection — see the design notes on why this
/// implementation favors an explicit, declarative spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    pub r#type: ConfigFieldType,
    pub label: String,
    pub description: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub options: Option<Vec<String>>,
    pub validation: Option<Validation>,
    pub sensitive: bool,
    pub placeholder: Option<String>,
    pub fields: Option<Vec<ConfigField>>,
    pub is_array: bool,
}

impl ConfigField {
    pub fn new(name: impl Into<String>, r#type: ConfigFieldType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            r#type,
            description: String::new(),
            required: false,
            default: None,
            options: None,
            validation: None,
            sensitive: false,
            placeholder: None,
            fields: None,
            is_array: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ConfigFieldType::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ConfigFieldType::Int)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ConfigFieldType::Bool)
    }

    pub fn password(name: impl Into<String>) -> Self {
        Self::new(name, ConfigFieldType::Password).sensitive()
    }

    pub fn select(name: impl Into<String>, options: Vec<String>) -> Self {
        let mut f = Self::new(name, ConfigFieldType::Select);
        f.options = Some(options);
        f
    }

    pub fn object(name: impl Into<String>, fields: Vec<ConfigField>) -> Self {
        let mut f = Self::new(name, ConfigFieldType::Object);
        f.fields = Some(fields);
        f
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// A plugin's full declarative configuration description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSpec {
    pub fields: Vec<ConfigField>,
}

impl ConfigSpec {
    pub fn new(fields: Vec<ConfigField>) -> Self {
        Self { fields }
    }

    /// Depth-first walk of every field paired with its dotted path from the
    /// root. The validator and masking helpers use this to locate sensitive
    /// leaves.
    pub fn walk(&self) -> Vec<(String, &ConfigField)> {
        let mut out = Vec::new();
        walk_fields(&self.fields, "", &mut out);
        out
    }
}

fn walk_fields<'a>(fields: &'a [ConfigField], prefix: &str, out: &mut Vec<(String, &'a ConfigField)>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        out.push((path.clone(), field));
        if let Some(nested) = &field.fields {
            walk_fields(nested, &path, out);
        }
    }
}
