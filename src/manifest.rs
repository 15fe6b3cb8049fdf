use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_yaml::{Mapping, Value};

use crate::error_codes::{CodedError, E_MANIFEST_INVALID, E_OVERRIDE_INVALID};
use crate::schema::{EffectConfig, Manifest, MANIFEST_VERSION};

/// Environment keys that may be patched from the command line.
const ENVIRONMENT_OVERRIDE_KEYS: &[&str] = &[
    "surface.width",
    "surface.height",
    "device_pixel_ratio",
    "fps",
    "duration.frames",
    "seed",
    "reduced_motion",
];

/// One `--set key=value` override. A bare key is shorthand for `effect.<key>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamOverride {
    pub path: Vec<String>,
    pub value: Value,
}

impl ParamOverride {
    pub fn parse(raw: &str) -> Result<Self> {
        let (key, raw_value) = raw
            .split_once('=')
            .ok_or_else(|| override_error(format!("override '{raw}' must look like key=value")))?;
        let key = key.trim();
        let raw_value = raw_value.trim();
        if key.is_empty() {
            return Err(override_error(format!("override '{raw}' has an empty key")));
        }
        if raw_value.is_empty() {
            return Err(override_error(format!("override '{key}' has an empty value")));
        }

        let mut path = key.split('.').map(str::to_owned).collect::<Vec<_>>();
        if path.len() == 1 {
            path.insert(0, "effect".to_owned());
        }
        if path.iter().any(String::is_empty) {
            return Err(override_error(format!("override key '{key}' has an empty segment")));
        }
        validate_override_path(&path)?;

        let value = parse_scalar(raw_value);
        if let Some(number) = value_as_float(&value, raw_value) {
            if !number.is_finite() {
                return Err(override_error(format!(
                    "override '{key}' must be a finite number, got '{raw_value}'"
                )));
            }
        }

        Ok(Self { path, value })
    }

    pub fn key(&self) -> String {
        self.path.join(".")
    }

    fn apply(&self, root: &mut Value) -> Result<()> {
        let mut node = root;
        let (last, parents) = self
            .path
            .split_last()
            .ok_or_else(|| anyhow!("override path is empty"))?;
        for segment in parents {
            let mapping = as_mapping(node, &self.key())?;
            node = mapping
                .entry(Value::String(segment.clone()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }
        let mapping = as_mapping(node, &self.key())?;
        mapping.insert(Value::String(last.clone()), self.value.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManifestLoadOptions {
    pub overrides: Vec<ParamOverride>,
}

pub fn load_and_validate_manifest(path: &Path) -> Result<Manifest> {
    load_and_validate_manifest_with_options(path, &ManifestLoadOptions::default())
}

pub fn load_and_validate_manifest_with_options(
    path: &Path,
    options: &ManifestLoadOptions,
) -> Result<Manifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))
        .map_err(|error| manifest_error(format!("{error:#}")))?;
    parse_manifest_str(&contents, &path.display().to_string(), options)
}

/// Parse, patch and validate a manifest held in memory. `origin` names the
/// source in error messages.
pub fn parse_manifest_str(
    contents: &str,
    origin: &str,
    options: &ManifestLoadOptions,
) -> Result<Manifest> {
    let mut tree: Value = serde_yaml::from_str(contents)
        .map_err(|error| manifest_error(yaml_error_message(origin, &error)))?;
    if !tree.is_mapping() {
        return Err(manifest_error(format!("{origin}: manifest root must be a mapping")));
    }

    for param_override in &options.overrides {
        param_override
            .apply(&mut tree)
            .map_err(|error| override_error(format!("{error:#}")))?;
    }

    let manifest: Manifest = serde_yaml::from_value(tree)
        .map_err(|error| manifest_error(yaml_error_message(origin, &error)))?;
    validate_manifest(&manifest).map_err(|error| manifest_error(format!("{origin}: {error:#}")))?;
    Ok(manifest)
}

fn validate_manifest(manifest: &Manifest) -> Result<()> {
    if manifest.version != MANIFEST_VERSION {
        bail!(
            "unsupported manifest version {} (expected {MANIFEST_VERSION})",
            manifest.version
        );
    }
    manifest.environment.validate()?;
    manifest
        .effect
        .validate()
        .context("invalid effect configuration")?;
    Ok(())
}

fn validate_override_path(path: &[String]) -> Result<()> {
    let (section, rest) = path
        .split_first()
        .ok_or_else(|| override_error("override key is empty"))?;
    let field = rest.join(".");
    match section.as_str() {
        "effect" => {
            let known = effect_field_names();
            if rest.len() != 1 || !known.iter().any(|name| name == &field) {
                return Err(override_error(format!("unknown effect field '{field}'")));
            }
        }
        "environment" => {
            if !ENVIRONMENT_OVERRIDE_KEYS.contains(&field.as_str()) {
                return Err(override_error(format!(
                    "environment.{field} cannot be overridden (allowed: {})",
                    ENVIRONMENT_OVERRIDE_KEYS.join(", ")
                )));
            }
        }
        other => {
            return Err(override_error(format!(
                "unknown override section '{other}' (expected effect or environment)"
            )));
        }
    }
    Ok(())
}

/// Field names of [`EffectConfig`] as they appear in YAML.
pub fn effect_field_names() -> Vec<String> {
    match serde_yaml::to_value(EffectConfig::default()) {
        Ok(Value::Mapping(mapping)) => mapping
            .keys()
            .filter_map(|key| key.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// YAML scalar parse, except that `#rgb` colours (comments to YAML) stay
/// strings.
fn parse_scalar(raw: &str) -> Value {
    if raw.starts_with('#') {
        return Value::String(raw.to_owned());
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_owned()),
    }
}

fn value_as_float(value: &Value, raw: &str) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(_) => raw.parse::<f64>().ok(),
        _ => None,
    }
}

fn as_mapping<'a>(node: &'a mut Value, key: &str) -> Result<&'a mut Mapping> {
    node.as_mapping_mut()
        .ok_or_else(|| anyhow!("cannot apply override '{key}': parent is not a mapping"))
}

fn yaml_error_message(origin: &str, error: &serde_yaml::Error) -> String {
    let location = error
        .location()
        .map(|location| format!("line {}, column {}", location.line(), location.column()))
        .unwrap_or_else(|| "unknown location".to_owned());
    format!("failed to parse yaml in {origin} at {location}: {error}")
}

fn manifest_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(CodedError::usage(E_MANIFEST_INVALID, message))
}

fn override_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(CodedError::usage(E_OVERRIDE_INVALID, message))
}
