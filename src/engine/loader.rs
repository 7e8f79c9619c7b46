// SPDX-License-Identifier: MIT

//! Trigger loader - YAML loading, validation and compilation
//!
//! Every template is compiled and every weight table checked here, so a bad
//! trigger file stops the daemon at startup instead of misbehaving later.

use super::condition;
use super::error::ConfigError;
use super::router::TriggerRule;
use super::selector::ResponseTable;
use super::template::Template;
use super::types::{TriggerDefinition, TriggerFile};
use std::fs;
use std::path::Path;

/// A loaded trigger file: the definition as written plus compiled rules
#[derive(Debug, Clone)]
pub struct TriggerSet {
    definition: TriggerFile,
    rules: Vec<TriggerRule>,
}

impl TriggerSet {
    pub fn definition(&self) -> &TriggerFile {
        &self.definition
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    pub fn timeout_s(&self) -> u64 {
        self.definition.trigger_timeout_s
    }

    pub fn into_rules(self) -> Vec<TriggerRule> {
        self.rules
    }

    /// Serialize the definition back to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(&self.definition)?)
    }
}

/// Loads trigger files
pub struct TriggerLoader;

impl TriggerLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and compile a trigger file from disk
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<TriggerSet, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::parse_yaml(&content)?;
        log::info!(
            "Loaded {} trigger(s) from {} (special timeout {}s)",
            set.rules.len(),
            path.display(),
            set.timeout_s()
        );
        Ok(set)
    }

    /// Parse and compile a trigger file from a YAML string
    pub fn parse_yaml(content: &str) -> Result<TriggerSet, ConfigError> {
        let definition: TriggerFile = serde_yaml::from_str(content)?;
        Self::compile(definition)
    }

    /// Compile every trigger, reporting all failures at once
    pub fn compile(definition: TriggerFile) -> Result<TriggerSet, ConfigError> {
        let mut rules = Vec::with_capacity(definition.triggers.len());
        let mut errors = Vec::new();

        for (index, def) in definition.triggers.iter().enumerate() {
            match compile_trigger(index, def) {
                Ok(rule) => rules.push(rule),
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        match errors.len() {
            0 => Ok(TriggerSet { definition, rules }),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Multiple(errors)),
        }
    }
}

impl Default for TriggerLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_trigger(index: usize, def: &TriggerDefinition) -> Result<TriggerRule, Vec<ConfigError>> {
    let mut errors = Vec::new();
    let syntax = |field: &str, template: &str, message: String| ConfigError::Syntax {
        index,
        field: field.to_string(),
        template: template.to_string(),
        message,
    };

    let test = condition::parse(&def.test)
        .map_err(|e| errors.push(syntax("test", &def.test, e.to_string())))
        .ok();

    let legacy_instance = Template::compile(&def.legacy_instance)
        .map_err(|e| errors.push(syntax("legacy_instance", &def.legacy_instance, e.to_string())))
        .ok();

    let mut compiled = Vec::with_capacity(def.response.len());
    for (key, text) in def.response.iter() {
        match Template::compile(text) {
            Ok(template) => compiled.push((key.clone(), template)),
            Err(e) => errors.push(syntax(&format!("response {}", key), text, e.to_string())),
        }
    }

    let responses = ResponseTable::build(compiled)
        .map_err(|message| errors.push(ConfigError::weights(index, message)))
        .ok();

    match (test, legacy_instance, responses) {
        (Some(test), Some(legacy_instance), Some(responses)) if errors.is_empty() => {
            Ok(TriggerRule {
                index,
                test,
                legacy_instance,
                responses,
                enforce_special_timeout: def.enforce_special_timeout,
                send_cubes_count: def.send_cubes_count,
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ResponseKey;
    use std::io::Write;

    const SAMPLE: &str = r#"
trigger_timeout_s: 600
triggers:
  - test: "{{ message | regex_search('\\bdrink\\b', ignorecase=True) }}"
    legacy_instance: "{{ instance }}.d"
    enforce_special_timeout: true
    response:
      10: "DRINK!"
      default: "{{ display_sender }} should drink"
  - test: "instance == 'duh'"
    send_cubes_count: 2
    response:
      default: "duh"
"#;

    #[test]
    fn test_parse_sample() {
        let set = TriggerLoader::parse_yaml(SAMPLE).unwrap();
        assert_eq!(set.timeout_s(), 600);
        assert_eq!(set.rules().len(), 2);

        let first = &set.rules()[0];
        assert_eq!(first.index, 0);
        assert!(first.enforce_special_timeout);
        assert_eq!(first.responses.total_weight(), 10);
        assert!(first.responses.has_default());
        assert_eq!(first.legacy_instance.source(), "{{ instance }}.d");

        let second = &set.rules()[1];
        assert_eq!(second.send_cubes_count, 2);
        assert_eq!(second.legacy_instance.source(), "{{ instance }}");
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let set = TriggerLoader::parse_yaml(SAMPLE).unwrap();
        let yaml = set.to_yaml().unwrap();
        let reloaded = TriggerLoader::parse_yaml(&yaml).unwrap();
        assert_eq!(reloaded.definition(), set.definition());

        let keys: Vec<_> = reloaded.definition().triggers[0]
            .response
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(
            keys,
            vec![ResponseKey::Weight(10), ResponseKey::Name("default".into())]
        );
    }

    #[test]
    fn test_weights_over_100_rejected() {
        let yaml = r#"
trigger_timeout_s: 5
triggers:
  - test: "true"
    response:
      60: "a"
      50: "b"
"#;
        let err = TriggerLoader::parse_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Weights { index: 0, .. }));
        assert!(err.to_string().contains("sum to 110"));
    }

    #[test]
    fn test_all_errors_reported() {
        let yaml = r#"
trigger_timeout_s: 5
triggers:
  - test: "true"
    response:
      default: "fine"
  - test: "zclass == 'abtech'"
    response:
      -5: "a"
  - test: "true"
    legacy_instance: "{{ instance"
    response:
      often: "x"
"#;
        match TriggerLoader::parse_yaml(yaml).unwrap_err() {
            ConfigError::Multiple(errors) => {
                assert_eq!(errors.len(), 4);
                assert!(matches!(errors[0], ConfigError::Syntax { index: 1, .. }));
                assert!(matches!(errors[1], ConfigError::Weights { index: 1, .. }));
                assert!(matches!(errors[2], ConfigError::Syntax { index: 2, .. }));
                assert!(matches!(errors[3], ConfigError::Weights { index: 2, .. }));
            }
            other => panic!("Expected Multiple, got {:?}", other),
        }
    }

    #[test]
    fn test_float_key_reported_with_other_errors() {
        let yaml = r#"
trigger_timeout_s: 5
triggers:
  - test: "zclass == 'abtech'"
    response:
      default: "a"
  - test: "true"
    response:
      10.5: "b"
"#;
        match TriggerLoader::parse_yaml(yaml).unwrap_err() {
            ConfigError::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], ConfigError::Syntax { index: 0, .. }));
                assert!(matches!(errors[1], ConfigError::Weights { index: 1, .. }));
                assert!(errors[1].to_string().contains("10.5"));
            }
            other => panic!("Expected Multiple, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_response_template_rejected() {
        let yaml = r#"
trigger_timeout_s: 5
triggers:
  - test: "true"
    response:
      default: "{{ nobody }}"
"#;
        let err = TriggerLoader::parse_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("response \"default\""));
    }

    #[test]
    fn test_missing_timeout_rejected() {
        let yaml = "triggers: []\n";
        assert!(matches!(
            TriggerLoader::parse_yaml(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let set = TriggerLoader::new().load_file(file.path()).unwrap();
        assert_eq!(set.rules().len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TriggerLoader::new()
            .load_file("/nonexistent/triggers.yaml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
