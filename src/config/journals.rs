use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::PIXELS_PER_MM;
use crate::project::TargetWidth;

/// Name of the mandatory fallback entry.
pub const DEFAULT_JOURNAL: &str = "Default";

/// Figure constraints imposed by one journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalRule {
    #[serde(alias = "singleColumnWidth_mm")]
    pub single_column_width_mm: f64,
    #[serde(alias = "doubleColumnWidth_mm")]
    pub double_column_width_mm: f64,
    #[serde(alias = "maxHeight_mm")]
    pub max_height_mm: f64,
    #[serde(alias = "dpi")]
    pub dpi_halftone: u32,
    #[serde(alias = "fontMin_pt")]
    pub font_min_pt: f64,
}

impl JournalRule {
    pub fn width_mm(&self, target: TargetWidth) -> f64 {
        match target {
            TargetWidth::Single => self.single_column_width_mm,
            TargetWidth::Double => self.double_column_width_mm,
        }
    }

    /// Canvas width in screen pixels for the target column.
    pub fn canvas_width_px(&self, target: TargetWidth) -> f64 {
        self.width_mm(target) * PIXELS_PER_MM
    }
}

/// Journal key → rule, always containing [`DEFAULT_JOURNAL`].
#[derive(Clone, Debug, PartialEq)]
pub struct JournalRules {
    rules: BTreeMap<String, JournalRule>,
}

fn rule(single: f64, double: f64, max_height: f64, dpi: u32, font_min: f64) -> JournalRule {
    JournalRule {
        single_column_width_mm: single,
        double_column_width_mm: double,
        max_height_mm: max_height,
        dpi_halftone: dpi,
        font_min_pt: font_min,
    }
}

impl Default for JournalRules {
    fn default() -> Self {
        Self::built_in()
    }
}

impl JournalRules {
    /// Common life-science journals.
    pub fn built_in() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(DEFAULT_JOURNAL.to_string(), rule(85.0, 180.0, 240.0, 300, 6.0));
        rules.insert("Nature".to_string(), rule(89.0, 183.0, 247.0, 300, 5.0));
        rules.insert("Science".to_string(), rule(55.0, 183.0, 245.0, 300, 6.0));
        rules.insert("Cell".to_string(), rule(85.0, 174.0, 225.0, 300, 6.0));
        rules.insert("PLOS".to_string(), rule(83.0, 173.0, 233.0, 300, 8.0));
        Self { rules }
    }

    /// Parse a JSON object of journal key → rule.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let rules: BTreeMap<String, JournalRule> = serde_json::from_str(json)?;
        if !rules.contains_key(DEFAULT_JOURNAL) {
            return Err(ConfigError::MissingDefault);
        }
        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Rule for `journal`, falling back to the default entry.
    pub fn get(&self, journal: &str) -> &JournalRule {
        match self.rules.get(journal) {
            Some(rule) => rule,
            None => {
                tracing::debug!(journal, "unknown journal; using default rules");
                self.default_rule()
            }
        }
    }

    pub fn default_rule(&self) -> &JournalRule {
        // Both constructors guarantee the key.
        &self.rules[DEFAULT_JOURNAL]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.rules)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_journal_falls_back_to_default() {
        let rules = JournalRules::built_in();
        assert_eq!(rules.get("Journal of Imaginary Results"), rules.default_rule());
        assert_eq!(rules.get("Nature").double_column_width_mm, 183.0);
    }

    #[test]
    fn json_requires_default() {
        let err = JournalRules::from_json(
            r#"{"Nature": {"single_column_width_mm": 89, "double_column_width_mm": 183, "max_height_mm": 247, "dpi_halftone": 300, "font_min_pt": 5}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefault));
    }

    #[test]
    fn json_accepts_camel_aliases() {
        let rules = JournalRules::from_json(
            r#"{"Default": {"singleColumnWidth_mm": 80, "doubleColumnWidth_mm": 170, "maxHeight_mm": 230, "dpi_halftone": 600, "font_min_pt": 7}}"#,
        )
        .unwrap();
        assert_eq!(rules.default_rule().single_column_width_mm, 80.0);
        assert!((rules.default_rule().canvas_width_px(TargetWidth::Double) - 170.0 * 3.78).abs() < 1e-9);
    }

    #[test]
    fn built_in_round_trips_through_json() {
        let rules = JournalRules::built_in();
        let json = rules.to_json().unwrap();
        assert_eq!(JournalRules::from_json(&json).unwrap(), rules);
    }
}
