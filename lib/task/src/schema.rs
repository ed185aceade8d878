//! Form schemas with field-level edit authorization.
//!
//! A schema lists the fields of a task's form. A field may restrict editing
//! to a subset of users; absence of such a list means any task assignee may
//! edit it. Schema *validation* (types, required fields) belongs to the
//! external form library; this module only answers "who may edit what".

use caseflow_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single field in a form schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Field name, the key under which values are saved.
    pub name: String,
    /// Display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Field type hint for the rendering surface.
    #[serde(default)]
    pub field_type: Option<String>,
    /// Users allowed to edit this field; `None` means any assignee.
    #[serde(default)]
    pub assignees: Option<Vec<UserId>>,
}

impl FormField {
    /// Creates an unrestricted field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            field_type: None,
            assignees: None,
        }
    }

    /// Restricts the field to the given editors.
    #[must_use]
    pub fn restricted_to(mut self, editors: Vec<UserId>) -> Self {
        self.assignees = Some(editors);
        self
    }

    /// Returns true if the user may edit this field.
    #[must_use]
    pub fn editable_by(&self, user: &UserId) -> bool {
        match &self.assignees {
            Some(editors) => editors.contains(user),
            None => true,
        }
    }
}

/// An ordered list of form fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSchema {
    /// The fields, in display order.
    pub fields: Vec<FormField>,
}

impl FormSchema {
    /// Creates a schema from fields.
    #[must_use]
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    /// Returns the names of the fields the user may edit.
    #[must_use]
    pub fn editable_fields(&self, user: &UserId) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| f.editable_by(user))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Returns true if the schema mentions the field at all.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salary_schema() -> FormSchema {
        FormSchema::new(vec![
            FormField::new("name"),
            FormField::new("salary").restricted_to(vec![UserId::new("u2")]),
        ])
    }

    #[test]
    fn unrestricted_field_is_editable_by_anyone() {
        let field = FormField::new("name");
        assert!(field.editable_by(&UserId::new("anyone")));
    }

    #[test]
    fn restricted_field_filters_editors() {
        let schema = salary_schema();

        let u1_fields = schema.editable_fields(&UserId::new("u1"));
        assert!(u1_fields.contains("name"));
        assert!(!u1_fields.contains("salary"));

        let u2_fields = schema.editable_fields(&UserId::new("u2"));
        assert!(u2_fields.contains("salary"));
    }

    #[test]
    fn schema_wire_format_is_a_field_array() {
        let schema = salary_schema();
        let json = serde_json::to_value(&schema).expect("serialize");
        assert!(json.is_array());
        assert_eq!(json[1]["assignees"][0], "u2");
    }

    #[test]
    fn schema_parses_camel_case_fields() {
        let json = serde_json::json!([
            {"name": "amount", "fieldType": "number"},
            {"name": "notes"}
        ]);
        let schema: FormSchema = serde_json::from_value(json).expect("deserialize");
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.fields[0].field_type.as_deref(), Some("number"));
        assert!(schema.has_field("notes"));
    }
}
