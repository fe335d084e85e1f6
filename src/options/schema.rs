// ABOUTME: Statically declared option/attribute schemas and override merging.
// ABOUTME: Produces the full projection for commands and the safe projection for fingerprints.

use super::removable::RemovableDef;
use super::value::OptionValue;
use crate::entity::EntityError;
use crate::types::{EntityName, ImageRef};
use std::collections::BTreeMap;

/// Entity-level inputs available to computed defaults. Configuration-file
/// variants have no single image.
pub struct Scope<'a> {
    pub name: &'a EntityName,
    pub image: Option<&'a ImageRef>,
}

/// Default for a declared option or attribute: fixed, computed against the
/// entity scope at resolution time, or absent.
#[derive(Clone)]
pub enum DefaultValue {
    None,
    Fixed(OptionValue),
    Computed(fn(&Scope<'_>) -> Option<OptionValue>),
}

/// One declared, renderable deployment option.
#[derive(Clone)]
pub struct OptionDef {
    pub name: &'static str,
    pub flag: &'static str,
    pub safe: bool,
    pub default: DefaultValue,
    pub aliases: &'static [&'static str],
    pub removable: Option<RemovableDef>,
}

impl OptionDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            flag: name,
            safe: true,
            default: DefaultValue::None,
            aliases: &[],
            removable: None,
        }
    }

    /// Rendered flag name, when it differs from the option name.
    pub fn flag(mut self, flag: &'static str) -> Self {
        self.flag = flag;
        self
    }

    /// Exclude this option from the configuration fingerprint (volatile
    /// fields like replica counts or restart switches).
    pub fn unsafe_(mut self) -> Self {
        self.safe = false;
        self
    }

    pub fn fixed(mut self, value: OptionValue) -> Self {
        self.default = DefaultValue::Fixed(value);
        self
    }

    pub fn computed(mut self, f: fn(&Scope<'_>) -> Option<OptionValue>) -> Self {
        self.default = DefaultValue::Computed(f);
        self
    }

    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn removable(mut self, def: RemovableDef) -> Self {
        self.removable = Some(def);
        self
    }
}

/// One declared entity-level attribute (configuration, not a CLI flag).
#[derive(Clone)]
pub struct AttributeDef {
    pub name: &'static str,
    pub default: DefaultValue,
    pub aliases: &'static [&'static str],
}

impl AttributeDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            default: DefaultValue::None,
            aliases: &[],
        }
    }

    pub fn fixed(mut self, value: OptionValue) -> Self {
        self.default = DefaultValue::Fixed(value);
        self
    }

    pub fn computed(mut self, f: fn(&Scope<'_>) -> Option<OptionValue>) -> Self {
        self.default = DefaultValue::Computed(f);
        self
    }

    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }
}

/// Declared option/attribute set of one entity type.
pub struct Schema {
    options: Vec<OptionDef>,
    attributes: Vec<AttributeDef>,
}

impl Schema {
    /// Panics when two options declare the same rendered flag; schemas are
    /// static declarations, so this is a programming error.
    pub fn new(options: Vec<OptionDef>, attributes: Vec<AttributeDef>) -> Self {
        let mut seen = std::collections::HashSet::new();
        for def in &options {
            assert!(
                seen.insert(def.flag),
                "duplicate option flag in schema: {}",
                def.flag
            );
        }
        Self {
            options,
            attributes,
        }
    }

    pub fn options(&self) -> &[OptionDef] {
        &self.options
    }
}

/// Caller-supplied overrides for one entity construction.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    options: Vec<(String, OptionValue)>,
    attributes: Vec<(String, OptionValue)>,
}

impl Overrides {
    pub fn option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.push((name.into(), value));
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    pub fn option_entries(&self) -> &[(String, OptionValue)] {
        &self.options
    }

    /// Drop any supplied values for the given option names.
    pub fn without_options(mut self, names: &[&str]) -> Self {
        self.options.retain(|(name, _)| !names.contains(&name.as_str()));
        self
    }
}

/// One option after resolution, carrying its diff behavior.
#[derive(Clone, Debug)]
pub struct ResolvedOption {
    pub name: String,
    pub flag: String,
    pub value: OptionValue,
    pub safe: bool,
    pub removable: Option<RemovableDef>,
}

/// Fully resolved option/attribute set for one entity instance.
#[derive(Debug)]
pub struct Resolved {
    options: Vec<ResolvedOption>,
    attributes: Vec<(String, OptionValue)>,
}

impl Resolved {
    pub fn options(&self) -> &[ResolvedOption] {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&ResolvedOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&OptionValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Render the full option set as a flag string in declaration order.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        for option in &self.options {
            option.value.render(&option.flag, &mut out);
        }
        out.join(" ")
    }

    /// The safe projection: stable-sorted inputs for the configuration
    /// fingerprint.
    pub fn safe_options(&self) -> BTreeMap<String, serde_json::Value> {
        self.options
            .iter()
            .filter(|o| o.safe)
            .map(|o| (o.name.clone(), option_value_json(&o.value)))
            .collect()
    }
}

fn option_value_json(value: &OptionValue) -> serde_json::Value {
    match value {
        OptionValue::Switch(b) => serde_json::Value::Bool(*b),
        OptionValue::Int(n) => serde_json::Value::Number((*n).into()),
        OptionValue::Str(s) => serde_json::Value::String(s.clone()),
        OptionValue::List(values) => serde_json::Value::Array(
            values
                .iter()
                .map(|v| serde_json::Value::String(v.clone()))
                .collect(),
        ),
    }
}

/// Merge caller overrides onto a schema's declarations.
///
/// Declared options resolve override-then-default in declaration order.
/// Undeclared option names pass through as ad hoc flags (rendered under
/// their own name, treated safe). Undeclared attribute names are input
/// errors. A deprecated alias maps onto the current name with a warning;
/// supplying both spellings is rejected rather than silently picking one.
pub fn resolve(
    schema: &Schema,
    scope: &Scope<'_>,
    overrides: &Overrides,
) -> Result<Resolved, EntityError> {
    let canonical_options = canonicalize(
        &overrides.options,
        schema.options.iter().map(|d| (d.name, d.aliases)),
    )?;
    let canonical_attributes = canonicalize(
        &overrides.attributes,
        schema.attributes.iter().map(|d| (d.name, d.aliases)),
    )?;

    // Any attribute name that matched nothing declared is an input error
    for (name, _) in &canonical_attributes {
        if !schema.attributes.iter().any(|d| d.name == name) {
            return Err(EntityError::UnknownAttribute(name.clone()));
        }
    }

    let mut options = Vec::new();
    for def in &schema.options {
        let value = canonical_options
            .iter()
            .find(|(name, _)| name == def.name)
            .map(|(_, v)| v.clone())
            .or_else(|| match &def.default {
                DefaultValue::None => None,
                DefaultValue::Fixed(v) => Some(v.clone()),
                DefaultValue::Computed(f) => f(scope),
            });

        if let Some(value) = value {
            options.push(ResolvedOption {
                name: def.name.to_string(),
                flag: def.flag.to_string(),
                value,
                safe: def.safe,
                removable: def.removable.clone(),
            });
        }
    }

    // Pass-through options keep their input order after the declared set
    for (name, value) in &canonical_options {
        if !schema.options.iter().any(|d| d.name == name) {
            options.push(ResolvedOption {
                name: name.clone(),
                flag: name.clone(),
                value: value.clone(),
                safe: true,
                removable: None,
            });
        }
    }

    let mut attributes = Vec::new();
    for def in &schema.attributes {
        let value = canonical_attributes
            .iter()
            .find(|(name, _)| name == def.name)
            .map(|(_, v)| v.clone())
            .or_else(|| match &def.default {
                DefaultValue::None => None,
                DefaultValue::Fixed(v) => Some(v.clone()),
                DefaultValue::Computed(f) => f(scope),
            });

        if let Some(value) = value {
            attributes.push((def.name.to_string(), value));
        }
    }

    Ok(Resolved {
        options,
        attributes,
    })
}

/// Map supplied names onto canonical declared names, warning on deprecated
/// aliases and rejecting old+new dual specification.
fn canonicalize<'d>(
    supplied: &[(String, OptionValue)],
    declarations: impl Iterator<Item = (&'d str, &'d [&'d str])> + Clone,
) -> Result<Vec<(String, OptionValue)>, EntityError> {
    let mut result: Vec<(String, OptionValue)> = Vec::new();
    let mut spelling: Vec<(String, String)> = Vec::new(); // canonical -> supplied spelling

    for (name, value) in supplied {
        let canonical = declarations
            .clone()
            .find(|(declared, aliases)| *declared == name || aliases.contains(&name.as_str()))
            .map(|(declared, _)| declared.to_string())
            .unwrap_or_else(|| name.clone());

        if &canonical != name {
            tracing::warn!(
                old = %name,
                new = %canonical,
                "deprecated option name, use the current name"
            );
        }

        if let Some((_, previous)) = spelling.iter().find(|(c, _)| c == &canonical) {
            if previous != name {
                let (old, new) = if previous == &canonical {
                    (name.clone(), previous.clone())
                } else {
                    (previous.clone(), name.clone())
                };
                return Err(EntityError::AmbiguousOption { old, new });
            }
            // Same spelling supplied twice: the later value wins
            if let Some(entry) = result.iter_mut().find(|(c, _)| c == &canonical) {
                entry.1 = value.clone();
            }
            continue;
        }

        spelling.push((canonical.clone(), name.clone()));
        result.push((canonical, value.clone()));
    }

    Ok(result)
}
