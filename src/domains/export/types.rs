use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult, ValidationError};
use crate::validation::{Validate, ValidationBuilder};

/// Longest entity type name a job record can carry
pub const MAX_OBJECT_TYPE_LENGTH: usize = 100;

/// Where a field's value lives for a given entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A fixed column of the entity table
    Default,
    /// A key in the attribute store
    Custom,
    /// A taxonomy reached through the tag relation tables
    Tag,
}

impl FieldKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FieldKind::Default => "default",
            FieldKind::Custom => "custom",
            FieldKind::Tag => "tag",
        }
    }
}

/// A classified field reference. The name is kept raw here and escaped
/// for its destination by the SQL builders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub kind: FieldKind,
    pub name: String,
    pub csv_label: String,
}

impl FieldRef {
    /// Parse a dotted field string such as `custom.rating`.
    ///
    /// `taxonomy.` is accepted as an alias of `tag.` for settings saved by
    /// older versions.
    pub fn parse(raw: &str, csv_label: &str) -> Result<Self, ValidationError> {
        let (prefix, name) = raw
            .split_once('.')
            .ok_or_else(|| ValidationError::malformed_field(raw))?;

        let kind = match prefix {
            "default" => FieldKind::Default,
            "custom" => FieldKind::Custom,
            "tag" | "taxonomy" => FieldKind::Tag,
            _ => return Err(ValidationError::malformed_field(raw)),
        };

        if name.is_empty() {
            return Err(ValidationError::malformed_field(raw));
        }

        Ok(Self {
            kind,
            name: name.to_string(),
            csv_label: csv_label.to_string(),
        })
    }

    /// The canonical dotted form, e.g. `tag.category`
    pub fn key(&self) -> String {
        format!("{}.{}", self.kind.prefix(), self.name)
    }

    /// Label used for the CSV column, falling back to the bare name.
    pub fn label(&self) -> &str {
        if self.csv_label.is_empty() {
            &self.name
        } else {
            &self.csv_label
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    NotContains,
    Empty,
    NotEmpty,
}

impl Rule {
    /// Accepts the symbolic rule names and the operator spellings stored by
    /// earlier saved settings.
    pub fn from_wire(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "eq" | "=" => Ok(Rule::Eq),
            "neq" | "<>" => Ok(Rule::Neq),
            "gt" | ">" => Ok(Rule::Gt),
            "gte" | ">=" => Ok(Rule::Gte),
            "lt" | "<" => Ok(Rule::Lt),
            "lte" | "<=" => Ok(Rule::Lte),
            "contains" | "LIKE" => Ok(Rule::Contains),
            "not_contains" | "NOT LIKE" => Ok(Rule::NotContains),
            "empty" => Ok(Rule::Empty),
            "not_empty" | "not empty" => Ok(Rule::NotEmpty),
            _ => Err(ValidationError::invalid_rule(raw)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Eq => "eq",
            Rule::Neq => "neq",
            Rule::Gt => "gt",
            Rule::Gte => "gte",
            Rule::Lt => "lt",
            Rule::Lte => "lte",
            Rule::Contains => "contains",
            Rule::NotContains => "not_contains",
            Rule::Empty => "empty",
            Rule::NotEmpty => "not_empty",
        }
    }

    /// Rules that compare the value against the field, optionally cast.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Rule::Eq | Rule::Neq | Rule::Gt | Rule::Gte | Rule::Lt | Rule::Lte
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cast {
    Alpha,
    Date,
    Number,
}

impl Cast {
    /// Missing, empty and `none` all mean "compare as stored".
    pub fn from_wire(raw: Option<&str>) -> Result<Option<Self>, ValidationError> {
        match raw {
            None | Some("") | Some("none") => Ok(None),
            Some("alpha") => Ok(Some(Cast::Alpha)),
            Some("date") => Ok(Some(Cast::Date)),
            Some("number") => Ok(Some(Cast::Number)),
            Some(other) => Err(ValidationError::invalid_cast(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub field: FieldRef,
    pub rule: Rule,
    pub value: Option<String>,
    pub cast: Option<Cast>,
}

impl FilterSpec {
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRequest {
    pub field: String,
    #[serde(default)]
    pub csv_label: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    pub field: String,
    pub rule: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub cast: Option<String>,
}

/// The field/filter document exchanged with the settings layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub object_type: String,
    #[serde(default)]
    pub fields: Vec<FieldRequest>,
    #[serde(default)]
    pub filters: Vec<FilterRequest>,
}

impl Validate for ExportRequest {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("objectType", Some(self.object_type.as_str()))
            .required()
            .max_length(MAX_OBJECT_TYPE_LENGTH)
            .validate()?;

        if self.fields.is_empty() {
            return Err(DomainError::Validation(ValidationError::required("fields")));
        }
        Ok(())
    }
}

impl ExportRequest {
    pub fn from_json(body: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(body).map_err(ValidationError::malformed_request)
    }

    /// Classify every field and filter. Nothing downstream sees raw strings.
    pub fn into_validated(self) -> DomainResult<ValidatedExport> {
        self.validate()?;

        let fields = self
            .fields
            .iter()
            .map(|f| FieldRef::parse(&f.field, &f.csv_label))
            .collect::<Result<Vec<_>, _>>()?;

        let filters = self
            .filters
            .into_iter()
            .map(|f| {
                Ok(FilterSpec {
                    field: FieldRef::parse(&f.field, "")?,
                    rule: Rule::from_wire(&f.rule)?,
                    cast: Cast::from_wire(f.cast.as_deref())?,
                    value: f.value,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(ValidatedExport {
            entity_type: self.object_type,
            fields,
            filters,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedExport {
    pub entity_type: String,
    pub fields: Vec<FieldRef>,
    pub filters: Vec<FilterSpec>,
}

/// Job progress. Steps only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Started,
    PreparingScratch,
    FilteringEntities,
    CompilingResults,
    CleaningUp,
    Done,
}

impl ExportStatus {
    pub const ALL: [ExportStatus; 6] = [
        ExportStatus::Started,
        ExportStatus::PreparingScratch,
        ExportStatus::FilteringEntities,
        ExportStatus::CompilingResults,
        ExportStatus::CleaningUp,
        ExportStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Started => "started",
            ExportStatus::PreparingScratch => "preparing_scratch",
            ExportStatus::FilteringEntities => "filtering_entities",
            ExportStatus::CompilingResults => "compiling_results",
            ExportStatus::CleaningUp => "cleaning_up",
            ExportStatus::Done => "done",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExportStatus::Started => "Started",
            ExportStatus::PreparingScratch => "Preparing",
            ExportStatus::FilteringEntities => "Filtering entities",
            ExportStatus::CompilingResults => "Collecting data",
            ExportStatus::CleaningUp => "Cleaning up",
            ExportStatus::Done => "Finished",
        }
    }

    pub fn next(&self) -> Option<ExportStatus> {
        match self {
            ExportStatus::Started => Some(ExportStatus::PreparingScratch),
            ExportStatus::PreparingScratch => Some(ExportStatus::FilteringEntities),
            ExportStatus::FilteringEntities => Some(ExportStatus::CompilingResults),
            ExportStatus::CompilingResults => Some(ExportStatus::CleaningUp),
            ExportStatus::CleaningUp => Some(ExportStatus::Done),
            ExportStatus::Done => None,
        }
    }

    /// What the job is doing right now: a job that reached step N is busy with step N+1.
    pub fn activity(&self) -> &'static str {
        self.next().unwrap_or(ExportStatus::Done).description()
    }

    pub fn is_done(&self) -> bool {
        *self == ExportStatus::Done
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::Internal(format!("Invalid status {} in export_jobs", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: Uuid,
    pub scratch_table_name: String,
    pub result_table_name: String,
    pub status_step: ExportStatus,
    pub owner_id: i64,
    pub entity_type_label: String,
    pub start_time: DateTime<Utc>,
    pub compiled_statements: Option<String>,
}

impl ExportJob {
    pub fn status_description(&self) -> &'static str {
        self.status_step.activity()
    }
}

/// Job view handed to callers; the compiled SQL stays in the registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobResponse {
    pub id: Uuid,
    pub status_step: ExportStatus,
    pub status_description: String,
    pub owner_id: i64,
    pub entity_type_label: String,
    pub start_time: DateTime<Utc>,
    pub is_done: bool,
}

impl From<&ExportJob> for ExportJobResponse {
    fn from(job: &ExportJob) -> Self {
        Self {
            id: job.id,
            status_step: job.status_step,
            status_description: job.status_description().to_string(),
            owner_id: job.owner_id,
            entity_type_label: job.entity_type_label.clone(),
            start_time: job.start_time,
            is_done: job.status_step.is_done(),
        }
    }
}

/// Statistics for one CSV download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub rows_written: u64,
    pub bytes_written: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultField {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomField {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagField {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCatalog {
    pub default_fields: Vec<DefaultField>,
    pub custom_fields: Vec<CustomField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_fields: Option<Vec<TagField>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ref_parses_known_prefixes() {
        let field = FieldRef::parse("default.post_title", "Title").unwrap();
        assert_eq!(field.kind, FieldKind::Default);
        assert_eq!(field.name, "post_title");
        assert_eq!(field.label(), "Title");

        let field = FieldRef::parse("custom.rating.v2", "").unwrap();
        assert_eq!(field.kind, FieldKind::Custom);
        assert_eq!(field.name, "rating.v2");
        assert_eq!(field.label(), "rating.v2");

        assert_eq!(FieldRef::parse("tag.category", "").unwrap().kind, FieldKind::Tag);
        assert_eq!(FieldRef::parse("taxonomy.post_tag", "").unwrap().key(), "tag.post_tag");
    }

    #[test]
    fn test_field_ref_rejects_unknown_prefixes() {
        for raw in ["post_title", "meta.rating", "Default.post_title", "custom.", ".x", ""] {
            assert_eq!(
                FieldRef::parse(raw, "x"),
                Err(ValidationError::MalformedField(raw.to_string())),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_rule_accepts_symbolic_and_legacy_spellings() {
        assert_eq!(Rule::from_wire("eq").unwrap(), Rule::Eq);
        assert_eq!(Rule::from_wire("=").unwrap(), Rule::Eq);
        assert_eq!(Rule::from_wire("NOT LIKE").unwrap(), Rule::NotContains);
        assert_eq!(Rule::from_wire("not empty").unwrap(), Rule::NotEmpty);
        assert_eq!(Rule::from_wire(">=").unwrap(), Rule::Gte);
        assert!(!Rule::Contains.is_ordering());
        assert!(Rule::Lt.is_ordering());
    }

    #[test]
    fn test_rule_rejects_anything_else() {
        for raw in ["like", "EQ", "between", "1=1; DROP TABLE x", ""] {
            assert_eq!(Rule::from_wire(raw), Err(ValidationError::InvalidRule(raw.to_string())));
        }
    }

    #[test]
    fn test_cast_from_wire() {
        assert_eq!(Cast::from_wire(None).unwrap(), None);
        assert_eq!(Cast::from_wire(Some("")).unwrap(), None);
        assert_eq!(Cast::from_wire(Some("none")).unwrap(), None);
        assert_eq!(Cast::from_wire(Some("number")).unwrap(), Some(Cast::Number));
        assert_eq!(
            Cast::from_wire(Some("integer")),
            Err(ValidationError::InvalidCast("integer".to_string()))
        );
    }

    #[test]
    fn test_request_from_json_and_validate() {
        let body = r#"{
            "objectType": "post",
            "fields": [{"field": "default.post_title", "csvLabel": "Title"}],
            "filters": [
                {"field": "custom.rating", "rule": "gt", "value": "3", "cast": "number"},
                {"field": "tag.category", "rule": "not_empty"}
            ]
        }"#;
        let validated = ExportRequest::from_json(body).unwrap().into_validated().unwrap();
        assert_eq!(validated.entity_type, "post");
        assert_eq!(validated.fields.len(), 1);
        assert_eq!(validated.filters[0].cast, Some(Cast::Number));
        assert_eq!(validated.filters[1].rule, Rule::NotEmpty);
        assert_eq!(validated.filters[1].value_or_empty(), "");
    }

    #[test]
    fn test_request_errors_surface_before_compilation() {
        assert!(matches!(
            ExportRequest::from_json("{not json"),
            Err(ValidationError::MalformedRequest(_))
        ));

        let bad_rule = r#"{"objectType":"post","fields":[{"field":"default.ID","csvLabel":"ID"}],
            "filters":[{"field":"default.ID","rule":"regexp","value":"1"}]}"#;
        let err = ExportRequest::from_json(bad_rule).unwrap().into_validated().unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::InvalidRule(_))));

        let no_fields = r#"{"objectType":"post","fields":[]}"#;
        let err = ExportRequest::from_json(no_fields).unwrap().into_validated().unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::Required { .. })));

        let long_type = format!(
            r#"{{"objectType":"{}","fields":[{{"field":"default.ID"}}]}}"#,
            "p".repeat(MAX_OBJECT_TYPE_LENGTH + 1)
        );
        let err = ExportRequest::from_json(&long_type).unwrap().into_validated().unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::MaxLength { .. })));
    }

    #[test]
    fn test_status_sequence_and_descriptions() {
        let mut status = ExportStatus::Started;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            assert!(next > status);
            status = next;
            seen.push(status);
        }
        assert_eq!(seen, ExportStatus::ALL.to_vec());

        assert_eq!(ExportStatus::Started.activity(), "Preparing");
        assert_eq!(ExportStatus::FilteringEntities.activity(), "Collecting data");
        assert_eq!(ExportStatus::Done.activity(), "Finished");
    }

    #[test]
    fn test_status_round_trips_through_storage_codes() {
        for status in ExportStatus::ALL {
            assert_eq!(status.as_str().parse::<ExportStatus>().unwrap(), status);
        }
        assert!("finished".parse::<ExportStatus>().is_err());
    }
}
