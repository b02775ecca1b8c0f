//! Attribute definitions and typed value conversion.
//!
//! An [`Attribute`] describes one named parameter of a detail type or of a
//! single variant. Its [`AttributeType`] decides how raw values (user input,
//! defaults, rendered formulas) are converted into the JSON values stored in
//! `Item::parameters`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::core::CatalogError;
use crate::providers::CatalogProvider;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("attribute name pattern is valid"));

/// Closed set of attribute value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Free text, stored as-is
    String,
    /// Whole number (`int(float(x))` semantics)
    Integer,
    /// Decimal number rounded half up to the configured precision
    Number,
    /// Strict `true` / `false`
    Boolean,
    /// ISO 8601 date and time
    Datetime,
    /// ISO 8601 calendar date
    Date,
    /// Id of an entry in a reference catalog
    Catalog,
}

impl AttributeType {
    /// Lower-case name as used in snapshots and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Catalog => "catalog",
        }
    }

    /// Whether values of this type take part in count multiplication.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "datetime" => Ok(Self::Datetime),
            "date" => Ok(Self::Date),
            "catalog" => Ok(Self::Catalog),
            other => Err(CatalogError::Other {
                message: format!("Unknown attribute type '{other}'"),
            }),
        }
    }
}

/// Reference tables shipped with the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuiltinCatalog {
    NominalDiameter,
    PipeDiameter,
    LoadGroup,
    Material,
    CoveringType,
    Covering,
    SupportDistance,
}

impl BuiltinCatalog {
    /// All built-in catalogs.
    pub const ALL: [Self; 7] = [
        Self::NominalDiameter,
        Self::PipeDiameter,
        Self::LoadGroup,
        Self::Material,
        Self::CoveringType,
        Self::Covering,
        Self::SupportDistance,
    ];

    /// Model name of the catalog.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NominalDiameter => "NominalDiameter",
            Self::PipeDiameter => "PipeDiameter",
            Self::LoadGroup => "LoadGroup",
            Self::Material => "Material",
            Self::CoveringType => "CoveringType",
            Self::Covering => "Covering",
            Self::SupportDistance => "SupportDistance",
        }
    }
}

/// Catalog a `catalog` attribute draws its values from.
///
/// Serialized as the built-in model name or the numeric id of a dynamic
/// directory (either as a JSON number or a numeric string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCatalogRef", into = "String")]
pub enum CatalogRef {
    /// One of the built-in reference tables
    Builtin(BuiltinCatalog),
    /// User-defined directory
    Directory(i64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCatalogRef {
    Id(i64),
    Text(String),
}

impl TryFrom<RawCatalogRef> for CatalogRef {
    type Error = CatalogError;

    fn try_from(raw: RawCatalogRef) -> Result<Self, Self::Error> {
        match raw {
            RawCatalogRef::Id(id) => Ok(Self::Directory(id)),
            RawCatalogRef::Text(text) => text.parse(),
        }
    }
}

impl From<CatalogRef> for String {
    fn from(catalog: CatalogRef) -> Self {
        catalog.to_string()
    }
}

impl FromStr for CatalogRef {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(builtin) = BuiltinCatalog::ALL.iter().find(|b| b.as_str() == s) {
            return Ok(Self::Builtin(*builtin));
        }
        s.parse::<i64>().map(Self::Directory).map_err(|_| CatalogError::Other {
            message: format!(
                "Catalog '{s}' must be a built-in catalog or a numeric directory id"
            ),
        })
    }
}

impl fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(builtin) => f.write_str(builtin.as_str()),
            Self::Directory(id) => write!(f, "{id}"),
        }
    }
}

/// One allowed value of a choice-restricted attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChoice {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_usage() -> String {
    "custom".to_string()
}

/// Named, typed parameter of a detail type or variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: i64,
    /// Owner when the attribute applies to every variant of a type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_type_id: Option<i64>,
    /// Owner when the attribute belongs to a single variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_usage")]
    pub usage: String,
    /// Formula; when set the attribute is never user-editable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<AttributeChoice>>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub position: i32,
}

impl Attribute {
    /// Create a plain attribute with no formula, default or choices.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            id,
            detail_type_id: None,
            variant_id: None,
            name: name.into(),
            attr_type,
            label: None,
            description: None,
            usage: default_usage(),
            calculated_value: None,
            default: None,
            catalog: None,
            choices: None,
            is_required: false,
            position: 0,
        }
    }

    /// Formula text, if the attribute is calculated.
    #[must_use]
    pub fn formula(&self) -> Option<&str> {
        self.calculated_value.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    #[must_use]
    pub fn is_calculated(&self) -> bool {
        self.formula().is_some()
    }

    fn default_value(&self) -> Option<&str> {
        self.default.as_deref().filter(|d| !d.is_empty())
    }

    fn has_choices(&self) -> bool {
        self.choices.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Whether `value` is one of the declared choices.
    ///
    /// Values are compared by their plain text form, so `12`, `12` and `"12"`
    /// are the same choice.
    #[must_use]
    pub fn accepts_choice(&self, value: &Value) -> bool {
        match &self.choices {
            Some(choices) if !choices.is_empty() => {
                let needle = plain_text(value);
                choices.iter().any(|choice| plain_text(&choice.value) == needle)
            }
            _ => true,
        }
    }

    /// Convert a raw value into the stored representation of this attribute.
    ///
    /// `field` names the attribute in error messages (`default` when checking
    /// a default during validation).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ConversionError`] when the value does not fit the
    /// type, or [`CatalogError::CatalogEntryNotFound`] for unknown catalog ids.
    pub fn convert(
        &self,
        raw: &Value,
        precision: u32,
        catalogs: &dyn CatalogProvider,
    ) -> Result<Value, CatalogError> {
        self.convert_as(&self.name, raw, precision, catalogs)
    }

    fn convert_as(
        &self,
        field: &str,
        raw: &Value,
        precision: u32,
        catalogs: &dyn CatalogProvider,
    ) -> Result<Value, CatalogError> {
        let unsuitable = |reason: String| CatalogError::ConversionError {
            attribute: field.to_string(),
            reason: format!("Unsuitable value for type {}: {reason}", self.attr_type),
        };

        match self.attr_type {
            AttributeType::String => Ok(match raw {
                Value::String(_) => raw.clone(),
                other => Value::String(plain_text(other)),
            }),
            AttributeType::Integer => {
                let number = as_f64(raw).map_err(unsuitable)?;
                Ok(Value::from(number.trunc() as i64))
            }
            AttributeType::Number => {
                let number = as_f64(raw).map_err(unsuitable)?;
                let rounded = round_half_up(number, precision);
                serde_json::Number::from_f64(rounded)
                    .map(Value::Number)
                    .ok_or_else(|| unsuitable(format!("{rounded} is not a finite number")))
            }
            AttributeType::Boolean => match raw {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) if s.trim() == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s.trim() == "false" => Ok(Value::Bool(false)),
                other => Err(unsuitable(format!("expected true or false, got {}", plain_text(other)))),
            },
            AttributeType::Date => {
                let text = plain_text(raw);
                NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .map_err(|e| unsuitable(e.to_string()))
            }
            AttributeType::Datetime => {
                let text = plain_text(raw);
                parse_datetime(text.trim()).map(Value::String).map_err(unsuitable)
            }
            AttributeType::Catalog => {
                let catalog = self.catalog.as_ref().ok_or_else(|| CatalogError::ConversionError {
                    attribute: field.to_string(),
                    reason: "catalog attribute has no catalog".to_string(),
                })?;
                if !catalogs.catalog_exists(catalog) {
                    return Err(CatalogError::ConversionError {
                        attribute: field.to_string(),
                        reason: format!("catalog {catalog} does not exist"),
                    });
                }
                let id = as_f64(raw).map_err(unsuitable)?.trunc() as i64;
                if catalogs.lookup(catalog, id).is_none() {
                    return Err(CatalogError::CatalogEntryNotFound {
                        catalog: catalog.to_string(),
                        key: id,
                    });
                }
                Ok(Value::from(id))
            }
        }
    }

    /// Validate the definition before it is stored.
    ///
    /// Clears `catalog` on non-catalog types, then checks the owner scope, the
    /// name pattern, the restrictions on calculated attributes, the catalog
    /// reference and the default value. All problems are reported together.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidAttribute`] with one entry per offending
    /// field.
    pub fn clean(
        &mut self,
        precision: u32,
        catalogs: &dyn CatalogProvider,
    ) -> Result<(), CatalogError> {
        let mut errors = BTreeMap::new();

        match (self.detail_type_id, self.variant_id) {
            (None, None) => {
                errors.insert(
                    "detail_type".to_string(),
                    "Either a detail type or a variant must be set".to_string(),
                );
            }
            (Some(_), Some(_)) => {
                errors.insert(
                    "detail_type".to_string(),
                    "A detail type and a variant cannot both be set".to_string(),
                );
            }
            _ => {}
        }

        if !NAME_PATTERN.is_match(&self.name) {
            errors.insert(
                "name".to_string(),
                "Must contain only latin letters, digits and _".to_string(),
            );
        }

        if self.is_calculated() {
            if self.has_choices() {
                errors.insert(
                    "choices".to_string(),
                    "Choices are not allowed on a calculated attribute".to_string(),
                );
            }
            if self.default_value().is_some() {
                errors.insert(
                    "default".to_string(),
                    "A default is not allowed on a calculated attribute".to_string(),
                );
            }
            if self.is_required {
                errors.insert(
                    "is_required".to_string(),
                    "A calculated attribute cannot be required".to_string(),
                );
            }
        }

        if self.attr_type != AttributeType::Catalog {
            self.catalog = None;
        }

        match (&self.catalog, self.attr_type) {
            (None, AttributeType::Catalog) => {
                errors.insert(
                    "catalog".to_string(),
                    "A catalog must be selected for catalog attributes".to_string(),
                );
            }
            (Some(catalog), _) if !catalogs.catalog_exists(catalog) => {
                errors.insert(
                    "catalog".to_string(),
                    format!("Catalog {catalog} is neither built in nor an existing directory"),
                );
            }
            _ => {}
        }

        if !errors.contains_key("catalog") {
            if let Some(default) = self.default_value() {
                let raw = Value::String(default.to_string());
                if let Err(e) = self.convert_as("default", &raw, precision, catalogs) {
                    errors.insert("default".to_string(), e.to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::InvalidAttribute {
                name: self.name.clone(),
                errors,
            })
        }
    }

    /// Converted default value, if one is declared.
    ///
    /// # Errors
    ///
    /// Propagates conversion failures of the default text.
    pub fn converted_default(
        &self,
        precision: u32,
        catalogs: &dyn CatalogProvider,
    ) -> Option<Result<Value, CatalogError>> {
        self.default_value()
            .map(|d| self.convert(&Value::String(d.to_string()), precision, catalogs))
    }
}

/// Text form of a JSON value as it would be typed by a user.
pub(crate) fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_f64(raw: &Value) -> Result<f64, String> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(format!("'{}' is not a number", plain_text(raw))),
    }
}

fn parse_datetime(text: &str) -> Result<String, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.to_rfc3339());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(format!("{}T00:00:00", date.format("%Y-%m-%d")));
    }
    Err(format!("'{text}' is not an ISO 8601 date and time"))
}

/// Round half away from zero at `precision` decimal places.
///
/// Works on the shortest decimal representation of `value`, so `2.675`
/// rounds to `2.68` rather than following its binary approximation down.
#[must_use]
pub fn round_half_up(value: f64, precision: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let text = format!("{}", value.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let precision = precision as usize;
    if frac_part.len() <= precision {
        return value;
    }

    let digits = format!("{int_part}{}", &frac_part[..precision]);
    let Ok(mut scaled) = digits.parse::<u128>() else {
        return value;
    };
    if frac_part.as_bytes()[precision] >= b'5' {
        scaled += 1;
    }

    let magnitude = scaled as f64 / 10f64.powi(precision as i32);
    if value.is_sign_negative() { -magnitude } else { magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticCatalogs;
    use serde_json::json;

    fn attr(attr_type: AttributeType) -> Attribute {
        let mut a = Attribute::new(1, "x", attr_type);
        a.detail_type_id = Some(1);
        a
    }

    #[test]
    fn test_integer_truncates_float_text() {
        let catalogs = StaticCatalogs::default();
        let a = attr(AttributeType::Integer);
        assert_eq!(a.convert(&json!("12.9"), 2, &catalogs).unwrap(), json!(12));
        assert_eq!(a.convert(&json!(-3.7), 2, &catalogs).unwrap(), json!(-3));
        assert!(a.convert(&json!("abc"), 2, &catalogs).is_err());
    }

    #[test]
    fn test_number_rounds_half_up() {
        let catalogs = StaticCatalogs::default();
        let a = attr(AttributeType::Number);
        assert_eq!(a.convert(&json!("2.675"), 2, &catalogs).unwrap().as_f64(), Some(2.68));
        assert_eq!(a.convert(&json!(1.005), 2, &catalogs).unwrap().as_f64(), Some(1.01));
        assert_eq!(a.convert(&json!("4"), 2, &catalogs).unwrap().as_f64(), Some(4.0));
        assert_eq!(round_half_up(-0.125, 2), -0.13);
    }

    #[test]
    fn test_boolean_is_strict() {
        let catalogs = StaticCatalogs::default();
        let a = attr(AttributeType::Boolean);
        assert_eq!(a.convert(&json!("true"), 2, &catalogs).unwrap(), json!(true));
        assert_eq!(a.convert(&json!(false), 2, &catalogs).unwrap(), json!(false));
        let err = a.convert(&json!("yes"), 2, &catalogs).unwrap_err();
        assert!(err.to_string().contains("Unsuitable value for type boolean"));
    }

    #[test]
    fn test_dates_are_stored_as_iso_text() {
        let catalogs = StaticCatalogs::default();
        assert_eq!(
            attr(AttributeType::Date).convert(&json!("2024-03-01"), 2, &catalogs).unwrap(),
            json!("2024-03-01")
        );
        assert_eq!(
            attr(AttributeType::Datetime)
                .convert(&json!("2024-03-01 10:20:30"), 2, &catalogs)
                .unwrap(),
            json!("2024-03-01T10:20:30")
        );
        assert!(attr(AttributeType::Date).convert(&json!("01.03.2024"), 2, &catalogs).is_err());
    }

    #[test]
    fn test_catalog_value_must_exist() {
        let catalogs = StaticCatalogs::default()
            .with_entry(CatalogRef::Builtin(BuiltinCatalog::LoadGroup), 3, json!({"lgv": 13}));
        let mut a = attr(AttributeType::Catalog);
        a.catalog = Some(CatalogRef::Builtin(BuiltinCatalog::LoadGroup));
        assert_eq!(a.convert(&json!("3"), 2, &catalogs).unwrap(), json!(3));
        assert!(matches!(
            a.convert(&json!(4), 2, &catalogs),
            Err(CatalogError::CatalogEntryNotFound { key: 4, .. })
        ));
    }

    #[test]
    fn test_catalog_ref_parsing() {
        assert_eq!(
            "LoadGroup".parse::<CatalogRef>().unwrap(),
            CatalogRef::Builtin(BuiltinCatalog::LoadGroup)
        );
        assert_eq!("12".parse::<CatalogRef>().unwrap(), CatalogRef::Directory(12));
        assert!("Unknown".parse::<CatalogRef>().is_err());

        let from_json: CatalogRef = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(from_json, CatalogRef::Directory(7));
        assert_eq!(serde_json::to_value(CatalogRef::Directory(7)).unwrap(), json!("7"));
    }

    #[test]
    fn test_choices_compare_as_text() {
        let mut a = attr(AttributeType::Integer);
        a.choices = Some(vec![
            AttributeChoice {
                value: json!(10),
                label: None,
            },
            AttributeChoice {
                value: json!("20"),
                label: Some("twenty".into()),
            },
        ]);
        assert!(a.accepts_choice(&json!("10")));
        assert!(a.accepts_choice(&json!(20)));
        assert!(!a.accepts_choice(&json!(30)));
    }

    #[test]
    fn test_clean_rejects_calculated_with_extras() {
        let catalogs = StaticCatalogs::default();
        let mut a = attr(AttributeType::Number);
        a.calculated_value = Some("d + 5".into());
        a.default = Some("1".into());
        a.is_required = true;
        a.choices = Some(vec![AttributeChoice {
            value: json!(1),
            label: None,
        }]);

        match a.clean(2, &catalogs) {
            Err(CatalogError::InvalidAttribute { errors, .. }) => {
                let keys: Vec<_> = errors.keys().cloned().collect();
                assert_eq!(keys, vec!["choices", "default", "is_required"]);
            }
            other => panic!("expected InvalidAttribute, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_checks_scope_name_and_catalog() {
        let catalogs = StaticCatalogs::default();

        let mut both = attr(AttributeType::String);
        both.variant_id = Some(2);
        assert!(both.clean(2, &catalogs).is_err());

        let mut bad_name = attr(AttributeType::String);
        bad_name.name = "d-1".into();
        assert!(bad_name.clean(2, &catalogs).is_err());

        let mut no_catalog = attr(AttributeType::Catalog);
        assert!(no_catalog.clean(2, &catalogs).is_err());

        let mut missing_dir = attr(AttributeType::Catalog);
        missing_dir.catalog = Some(CatalogRef::Directory(99));
        assert!(missing_dir.clean(2, &catalogs).is_err());

        let mut cleared = attr(AttributeType::Integer);
        cleared.catalog = Some(CatalogRef::Builtin(BuiltinCatalog::Material));
        cleared.clean(2, &catalogs).unwrap();
        assert_eq!(cleared.catalog, None);
    }

    #[test]
    fn test_clean_converts_default() {
        let catalogs = StaticCatalogs::default();
        let mut a = attr(AttributeType::Boolean);
        a.default = Some("maybe".into());
        match a.clean(2, &catalogs) {
            Err(CatalogError::InvalidAttribute { errors, .. }) => {
                assert!(errors["default"].contains("boolean"));
            }
            other => panic!("expected InvalidAttribute, got {other:?}"),
        }

        a.default = Some("true".into());
        assert!(a.clean(2, &catalogs).is_ok());
    }
}
