//! Configured material set and the roles each material plays in the flow step.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::MaterialError;

/// The set of legal materials and their flow roles.
///
/// Deserialized from the `materials` section of the config file; any field
/// left out falls back to the built-in table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialTable {
    /// Every legal material label.
    #[serde(default = "default_materials")]
    pub materials: BTreeSet<String>,

    /// Materials that block flow and hold no water.
    #[serde(default = "default_solid")]
    pub solid: BTreeSet<String>,

    /// Materials pinned to full depth every tick.
    #[serde(default = "default_source")]
    pub source: BTreeSet<String>,

    /// Materials pinned to zero depth every tick.
    #[serde(default = "default_drain")]
    pub drain: BTreeSet<String>,

    /// Share of a cell's depth that moves down per tick. Unlisted materials
    /// pass everything.
    #[serde(default = "default_flow_fraction")]
    pub flow_fraction: BTreeMap<String, f64>,

    /// Material used for cells a level file leaves out.
    #[serde(default = "default_material")]
    pub default_material: String,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self {
            materials: default_materials(),
            solid: default_solid(),
            source: default_source(),
            drain: default_drain(),
            flow_fraction: default_flow_fraction(),
            default_material: default_material(),
        }
    }
}

impl MaterialTable {
    /// Whether `material` is a legal label.
    pub fn contains(&self, material: &str) -> bool {
        self.materials.contains(material)
    }

    /// Whether `material` blocks flow.
    pub fn is_solid(&self, material: &str) -> bool {
        self.solid.contains(material)
    }

    /// Whether `material` is pinned full.
    pub fn is_source(&self, material: &str) -> bool {
        self.source.contains(material)
    }

    /// Whether `material` is pinned empty.
    pub fn is_drain(&self, material: &str) -> bool {
        self.drain.contains(material)
    }

    /// Share of depth `material` passes downward per tick.
    pub fn flow_fraction(&self, material: &str) -> f64 {
        self.flow_fraction
            .get(material)
            .copied()
            .unwrap_or(1.0)
            .clamp(0.0, 1.0)
    }

    /// Check that every role refers to a declared material.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), MaterialError> {
        if !self.contains(&self.default_material) {
            return Err(MaterialError::UndeclaredDefault(
                self.default_material.clone(),
            ));
        }
        let roles: [(&'static str, &BTreeSet<String>); 3] = [
            ("solid", &self.solid),
            ("source", &self.source),
            ("drain", &self.drain),
        ];
        for (role, set) in roles {
            if let Some(material) = set.iter().find(|m| !self.contains(m)) {
                return Err(MaterialError::UndeclaredRole {
                    role,
                    material: material.clone(),
                });
            }
        }
        for (material, fraction) in &self.flow_fraction {
            if !self.contains(material) {
                return Err(MaterialError::UndeclaredRole {
                    role: "flow_fraction",
                    material: material.clone(),
                });
            }
            if !(0.0..=1.0).contains(fraction) {
                return Err(MaterialError::FractionOutOfRange(material.clone()));
            }
        }
        Ok(())
    }
}

fn labels(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| (*n).to_owned()).collect()
}

fn default_materials() -> BTreeSet<String> {
    labels(&[
        "space", "stone", "spring", "sink", "brick", "hole", "filter", "gate",
    ])
}

fn default_solid() -> BTreeSet<String> {
    labels(&["stone", "brick"])
}

fn default_source() -> BTreeSet<String> {
    labels(&["spring"])
}

fn default_drain() -> BTreeSet<String> {
    labels(&["sink"])
}

fn default_flow_fraction() -> BTreeMap<String, f64> {
    BTreeMap::from([("filter".to_owned(), 0.5)])
}

fn default_material() -> String {
    "space".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_consistent() {
        let table = MaterialTable::default();
        assert!(table.validate().is_ok());
        assert!(table.is_solid("stone"));
        assert!(table.is_source("spring"));
        assert!(table.is_drain("sink"));
        assert!(!table.is_solid("space"));
    }

    #[test]
    fn flow_fraction_defaults_to_full() {
        let table = MaterialTable::default();
        assert!((table.flow_fraction("space") - 1.0).abs() < f64::EPSILON);
        assert!((table.flow_fraction("filter") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn undeclared_solid_is_rejected() {
        let mut table = MaterialTable::default();
        table.solid.insert("lava".to_owned());
        assert_eq!(
            table.validate(),
            Err(MaterialError::UndeclaredRole {
                role: "solid",
                material: "lava".to_owned(),
            })
        );
    }

    #[test]
    fn fraction_out_of_range_is_rejected() {
        let mut table = MaterialTable::default();
        table.flow_fraction.insert("space".to_owned(), 1.5);
        assert_eq!(
            table.validate(),
            Err(MaterialError::FractionOutOfRange("space".to_owned()))
        );
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let table: MaterialTable = serde_json::from_str(r#"{"solid":["stone"]}"#).unwrap();
        assert_eq!(table.solid.len(), 1);
        assert!(table.contains("brick"));
        assert_eq!(table.default_material, "space");
    }
}
