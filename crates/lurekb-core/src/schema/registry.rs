//! Category schemas and record validation
//!
//! Every category declares its optional fields, the shape each field is
//! expected to have, and how the field merges. The declaration doubles as the
//! extraction template handed to collaborators that draft candidate records.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::category::Category;
use super::policy::MergePolicy;
use crate::error::{Error, Result};

/// Shape of a category field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text
    Text,
    /// List of strings
    List,
    /// Keyed map of strings (e.g. colour per water clarity)
    Map,
}

impl FieldKind {
    /// Policy used when a field of this shape does not override it
    pub const fn default_policy(&self) -> MergePolicy {
        match self {
            Self::Text => MergePolicy::PreferLonger,
            Self::List => MergePolicy::UnionList,
            Self::Map => MergePolicy::Overwrite,
        }
    }
}

/// Declaration of a single optional field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name as stored on the item
    pub name: &'static str,
    /// Expected shape
    pub kind: FieldKind,
    /// Merge behaviour
    pub policy: MergePolicy,
    /// Placeholder text shown in the template
    pub hint: &'static str,
    /// Example keys for map fields
    pub entries: &'static [(&'static str, &'static str)],
}

impl FieldSpec {
    const fn text(name: &'static str, hint: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            policy: FieldKind::Text.default_policy(),
            hint,
            entries: &[],
        }
    }

    const fn list(name: &'static str, hint: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::List,
            policy: FieldKind::List.default_policy(),
            hint,
            entries: &[],
        }
    }

    const fn map(
        name: &'static str,
        hint: &'static str,
        entries: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            name,
            kind: FieldKind::Map,
            policy: FieldKind::Map.default_policy(),
            hint,
            entries,
        }
    }

    /// Template value for this field
    fn template_value(&self) -> Value {
        match self.kind {
            FieldKind::Text => Value::String(self.hint.to_string()),
            FieldKind::List => json!([self.hint]),
            FieldKind::Map => {
                let map: Map<String, Value> = self
                    .entries
                    .iter()
                    .map(|(key, hint)| (key.to_string(), Value::String(hint.to_string())))
                    .collect();
                Value::Object(map)
            }
        }
    }
}

/// Schema of a single category
#[derive(Debug, Clone, Copy)]
pub struct CategorySchema {
    pub category: Category,
    /// Placeholder for the required `name` field
    pub name_hint: &'static str,
    /// Optional fields in document order
    pub fields: &'static [FieldSpec],
    /// Bumped whenever the field list or document rendering changes
    pub template_version: u32,
}

impl CategorySchema {
    /// Look up a field declaration
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const FISH_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("habits", "Behaviour and habitat"),
    FieldSpec::list("best_season", "Best season (spring/summer/autumn/winter)"),
    FieldSpec::list("best_time", "Best time of day (dawn/dusk/night/day)"),
    FieldSpec::list("lures", "Recommended lures"),
    FieldSpec::list("techniques", "Recommended techniques"),
    FieldSpec::text("water_layer", "Water layer (bottom/middle/top/all)"),
    FieldSpec::text("difficulty", "Difficulty (easy/medium/hard)"),
    FieldSpec::text("tips", "Practical tips"),
];

const LURE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("category", "Lure family (soft/hard/metal/topwater)"),
    FieldSpec::list("subtypes", "Subtypes (e.g. straight tail worm, craw)"),
    FieldSpec::list("weights", "Weights (e.g. 3g, 5g, 7g)"),
    FieldSpec::map(
        "colors",
        "Colour per water condition",
        &[
            ("recommended", "Recommended colour"),
            ("muddy_water", "Colour for muddy water"),
            ("clear_water", "Colour for clear water"),
        ],
    ),
    FieldSpec::list("target_fish", "Target species"),
    FieldSpec::list("techniques", "Suitable techniques"),
    FieldSpec::text("price_range", "Price range"),
    FieldSpec::text("tips", "Usage tips"),
];

const RIG_FIELDS: &[FieldSpec] = &[
    FieldSpec::list("components", "Components (e.g. soft plastic, bullet weight, EWG hook)"),
    FieldSpec::list("suitable_fish", "Suitable species"),
    FieldSpec::list("suitable_environment", "Suitable environment (e.g. cover, rock gaps)"),
    FieldSpec::text("advantages", "Advantages"),
    FieldSpec::text("disadvantages", "Disadvantages"),
    FieldSpec::text("difficulty", "Difficulty (easy/medium/hard)"),
    FieldSpec::text("setup_tips", "Setup tips"),
];

const SPOT_TYPE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("category", "Spot family (structure/terrain/vegetation)"),
    FieldSpec::text("description", "Description"),
    FieldSpec::text("how_to_find", "How to find it"),
    FieldSpec::list("target_fish", "Target species"),
    FieldSpec::list("techniques", "Suitable techniques"),
    FieldSpec::map(
        "seasonal_tips",
        "Tips per season",
        &[
            ("spring", "Spring tips"),
            ("summer", "Summer tips"),
            ("autumn", "Autumn tips"),
            ("winter", "Winter tips"),
        ],
    ),
    FieldSpec::text("tips", "Practical tips"),
];

const SPOT_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("location", "Location or area"),
    FieldSpec::text("water_type", "Water type (river/lake/reservoir/stream)"),
    FieldSpec::list("target_fish", "Target species"),
    FieldSpec::list("best_season", "Best season"),
    FieldSpec::text("description", "Description"),
    FieldSpec::text("tips", "Practical tips"),
];

const EQUIPMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("category", "Gear type (rod/reel/line/terminal tackle)"),
    FieldSpec::text("description", "Description"),
    FieldSpec::list("suitable_fish", "Suitable species"),
    FieldSpec::text("price_range", "Price range"),
    FieldSpec::text("tips", "Selection tips"),
];

const TECHNIQUE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("description", "Description"),
    FieldSpec::list("steps", "Steps"),
    FieldSpec::list("target_fish", "Target species"),
    FieldSpec::list("lures", "Suitable lures"),
    FieldSpec::text("difficulty", "Difficulty (easy/medium/hard)"),
    FieldSpec::text("tips", "Practical tips"),
];

const BUILTIN_SCHEMAS: &[CategorySchema] = &[
    CategorySchema {
        category: Category::Fish,
        name_hint: "Species name (e.g. Mandarin fish)",
        fields: FISH_FIELDS,
        template_version: 1,
    },
    CategorySchema {
        category: Category::Lure,
        name_hint: "Lure name (e.g. Soft plastic worm)",
        fields: LURE_FIELDS,
        template_version: 1,
    },
    CategorySchema {
        category: Category::Rig,
        name_hint: "Rig name (e.g. Texas rig)",
        fields: RIG_FIELDS,
        template_version: 1,
    },
    CategorySchema {
        category: Category::SpotType,
        name_hint: "Spot type (e.g. Bridge pier)",
        fields: SPOT_TYPE_FIELDS,
        template_version: 1,
    },
    CategorySchema {
        category: Category::Spot,
        name_hint: "Spot name",
        fields: SPOT_FIELDS,
        template_version: 1,
    },
    CategorySchema {
        category: Category::Equipment,
        name_hint: "Gear name",
        fields: EQUIPMENT_FIELDS,
        template_version: 1,
    },
    CategorySchema {
        category: Category::Technique,
        name_hint: "Technique name (e.g. Dragging)",
        fields: TECHNIQUE_FIELDS,
        template_version: 1,
    },
];

/// Registry of category schemas
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: BTreeMap<Category, CategorySchema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    /// Registry with the built-in fishing schemas
    pub fn builtin() -> Self {
        Self::from_schemas(BUILTIN_SCHEMAS.iter().copied())
    }

    /// Registry with an explicit set of schemas
    pub fn from_schemas(schemas: impl IntoIterator<Item = CategorySchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.category, s)).collect(),
        }
    }

    /// Get the schema of a category
    pub fn schema(&self, category: Category) -> Option<&CategorySchema> {
        self.schemas.get(&category)
    }

    /// Categories that have a schema
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.schemas.keys().copied()
    }

    /// Whether `record` is a minimally well-formed candidate for `category`.
    ///
    /// Fails closed: unknown categories and records without a non-empty
    /// `name` are rejected. Optional fields are not type-checked.
    pub fn validate(&self, record: &Value, category: &str) -> bool {
        category
            .parse::<Category>()
            .and_then(|c| self.check(record, c))
            .is_ok()
    }

    /// Validate a candidate and explain the first problem found
    pub fn check(&self, record: &Value, category: Category) -> Result<()> {
        if self.schema(category).is_none() {
            return Err(Error::validation(
                category.as_str(),
                "no schema registered for category",
            ));
        }

        let object = record
            .as_object()
            .ok_or_else(|| Error::validation(category.as_str(), "record must be a JSON object"))?;

        match object.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => Ok(()),
            Some(Value::String(_)) => Err(Error::validation(
                category.as_str(),
                "field 'name' must not be empty",
            )),
            Some(_) => Err(Error::validation(
                category.as_str(),
                "field 'name' must be a string",
            )),
            None => Err(Error::validation(
                category.as_str(),
                "missing required field 'name'",
            )),
        }
    }

    /// Merge policy for a field.
    ///
    /// Declared fields use their declaration; anything else falls back to the
    /// shapes of the two values being merged.
    pub fn field_policy(&self, category: Category, field: &str, old: &Value, new: &Value) -> MergePolicy {
        if field == "aliases" {
            return MergePolicy::UnionList;
        }
        self.schema(category)
            .and_then(|schema| schema.field(field))
            .map(|spec| spec.policy)
            .unwrap_or_else(|| MergePolicy::infer(old, new))
    }

    /// Template version of a category (0 if the category has no schema)
    pub fn template_version(&self, category: Category) -> u32 {
        self.schema(category).map(|s| s.template_version).unwrap_or(0)
    }

    /// Field template for extraction collaborators
    pub fn template(&self, category: Category) -> Option<Value> {
        let schema = self.schema(category)?;
        let mut template = Map::new();
        template.insert("name".into(), Value::String(schema.name_hint.to_string()));
        template.insert("aliases".into(), json!(["Alternative names"]));
        for field in schema.fields {
            template.insert(field.name.to_string(), field.template_value());
        }
        Some(Value::Object(template))
    }

    /// Pretty-printed template
    pub fn describe(&self, category: Category) -> Option<String> {
        self.template(category)
            .and_then(|t| serde_json::to_string_pretty(&t).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_name() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.validate(&json!({"name": "Mandarin fish"}), "fish"));
        assert!(!registry.validate(&json!({"habits": "ambush predator"}), "fish"));
        assert!(!registry.validate(&json!({"name": ""}), "fish"));
        assert!(!registry.validate(&json!({"name": "   "}), "fish"));
        assert!(!registry.validate(&json!({"name": 42}), "fish"));
        assert!(!registry.validate(&json!(["name"]), "fish"));
    }

    #[test]
    fn test_validate_fails_closed_on_unknown_category() {
        let registry = SchemaRegistry::builtin();
        assert!(!registry.validate(&json!({"name": "Rain"}), "weather_tips"));
    }

    #[test]
    fn test_validate_fails_closed_without_schema() {
        let registry = SchemaRegistry::from_schemas(
            BUILTIN_SCHEMAS.iter().copied().filter(|s| s.category == Category::Fish),
        );
        assert!(registry.validate(&json!({"name": "Perch"}), "fish"));
        assert!(!registry.validate(&json!({"name": "Texas rig"}), "rig"));
    }

    #[test]
    fn test_optional_fields_are_not_type_checked() {
        let registry = SchemaRegistry::builtin();
        let record = json!({"name": "Perch", "best_season": "spring", "tips": ["odd"]});
        assert!(registry.check(&record, Category::Fish).is_ok());
    }

    #[test]
    fn test_field_policy_declared_and_inferred() {
        let registry = SchemaRegistry::builtin();
        let null = Value::Null;
        assert_eq!(
            registry.field_policy(Category::Fish, "lures", &null, &null),
            MergePolicy::UnionList
        );
        assert_eq!(
            registry.field_policy(Category::Fish, "habits", &null, &null),
            MergePolicy::PreferLonger
        );
        assert_eq!(
            registry.field_policy(Category::Lure, "colors", &null, &null),
            MergePolicy::Overwrite
        );
        assert_eq!(
            registry.field_policy(Category::Fish, "local_names", &json!([]), &json!(["x"])),
            MergePolicy::UnionList
        );
        assert_eq!(
            registry.field_policy(Category::Fish, "max_weight_kg", &json!(3), &json!(4)),
            MergePolicy::Overwrite
        );
    }

    #[test]
    fn test_template_shape() {
        let registry = SchemaRegistry::builtin();
        let template = registry.template(Category::Lure).unwrap();
        assert!(template["name"].is_string());
        assert!(template["aliases"].is_array());
        assert!(template["weights"].is_array());
        assert!(template["colors"]["muddy_water"].is_string());

        let described = registry.describe(Category::SpotType).unwrap();
        assert!(described.contains("seasonal_tips"));
        assert!(described.contains("how_to_find"));
    }

    #[test]
    fn test_every_category_has_a_builtin_schema() {
        let registry = SchemaRegistry::builtin();
        for category in Category::all() {
            assert!(registry.schema(*category).is_some(), "{category} has no schema");
            assert!(registry.template_version(*category) >= 1);
        }
    }
}
