use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Column type of a list field.
///
/// The wire format is the backend's type tag (`"Text"`, `"Number"`, ...).
/// Tags this editor has no dedicated handling for are kept verbatim in
/// `Other` and edited as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldType {
    #[default]
    Text,
    Number,
    DateTime,
    Choice,
    Boolean,
    Other(String),
}

impl FieldType {
    /// Parse a backend type tag
    ///
    /// # Examples
    /// ```
    /// use listsheet::FieldType;
    ///
    /// assert_eq!(FieldType::from_tag("Choice"), FieldType::Choice);
    /// assert_eq!(FieldType::from_tag("Integer"), FieldType::Number);
    /// assert_eq!(FieldType::from_tag("Counter"), FieldType::Other("Counter".into()));
    /// ```
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Text" | "Note" => FieldType::Text,
            "Number" | "Integer" | "Currency" => FieldType::Number,
            "DateTime" => FieldType::DateTime,
            "Choice" => FieldType::Choice,
            "Boolean" => FieldType::Boolean,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::DateTime => "DateTime",
            FieldType::Choice => "Choice",
            FieldType::Boolean => "Boolean",
            FieldType::Other(tag) => tag,
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(FieldType::from_tag(&tag))
    }
}

/// Schema descriptor for one spreadsheet column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Stable internal name, used as the key in row data
    pub name: String,

    /// Display label
    pub title: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    /// Allowed values, only meaningful for `Choice` fields
    #[serde(default)]
    pub choices: Vec<String>,
}

impl FieldDefinition {
    pub fn new(name: &str, title: &str, field_type: FieldType) -> Self {
        FieldDefinition {
            name: name.to_string(),
            title: title.to_string(),
            field_type,
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }
}

/// Look up a field by internal name
pub fn find_field<'a>(fields: &'a [FieldDefinition], name: &str) -> Option<&'a FieldDefinition> {
    fields.iter().find(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_type_tags_survive_a_round_trip() {
        let field: FieldDefinition = serde_json::from_value(json!({
            "name": "Author",
            "title": "Created By",
            "type": "User",
            "required": false
        }))
        .unwrap();

        assert_eq!(field.field_type, FieldType::Other("User".to_string()));
        assert!(field.choices.is_empty());
        assert_eq!(serde_json::to_value(&field).unwrap()["type"], "User");
    }

    #[test]
    fn missing_optional_keys_default() {
        let field: FieldDefinition =
            serde_json::from_value(json!({"name": "Title", "title": "Title"})).unwrap();
        assert_eq!(field.field_type, FieldType::Text);
        assert!(!field.required);
    }
}
