// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Workflow definition structures
//!
//! Defines the schema for workflow files (`.ciflow/*.yml` or `*.toml`).
//! Files are parsed straight into these types; nothing in a step command
//! is evaluated beyond `${{ ... }}` substitution.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::CiflowError;

/// Job timeout applied when a job declares none
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(360 * 60);

/// Pipeline definition from a workflow file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Workflow name
    #[serde(default = "default_name")]
    pub name: String,

    /// Events that activate this workflow
    #[serde(rename = "on", deserialize_with = "de_triggers", serialize_with = "ser_triggers")]
    pub triggers: Vec<Trigger>,

    /// Global environment variables
    #[serde(default, deserialize_with = "de_env")]
    pub env: BTreeMap<String, String>,

    /// Maximum number of concurrently running job instances
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Jobs in declaration order
    pub jobs: OrderedMap<JobTemplate>,
}

fn default_name() -> String {
    "workflow".to_string()
}

impl PipelineDefinition {
    /// Load a definition, choosing the format from the file extension
    pub fn from_file(path: &Path) -> Result<Self, CiflowError> {
        if !path.exists() {
            return Err(CiflowError::WorkflowNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CiflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse a definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, CiflowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse a definition from TOML
    pub fn from_toml(source: &str) -> Result<Self, CiflowError> {
        toml::from_str(source).map_err(Into::into)
    }

    /// Serialize the definition to YAML
    pub fn to_yaml(&self) -> Result<String, CiflowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a job by name
    pub fn get_job(&self, name: &str) -> Option<&JobTemplate> {
        self.jobs.get(name)
    }

    /// Get all job names in declaration order
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.keys().collect()
    }
}

/// Kind of incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::PullRequest => write!(f, "pull_request"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "push" => Ok(Self::Push),
            "pull_request" | "pr" => Ok(Self::PullRequest),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

/// Event kind plus the branch patterns it accepts.
///
/// An empty pattern list accepts every branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: EventKind,
    #[serde(default)]
    pub branches: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BranchFilter {
    #[serde(default)]
    branches: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriggerSpec {
    Single(EventKind),
    Kinds(Vec<EventKind>),
    Filtered(BTreeMap<EventKind, Option<BranchFilter>>),
}

fn de_triggers<'de, D>(deserializer: D) -> Result<Vec<Trigger>, D::Error>
where
    D: Deserializer<'de>,
{
    let spec = TriggerSpec::deserialize(deserializer)?;
    let triggers = match spec {
        TriggerSpec::Single(kind) => vec![Trigger {
            kind,
            branches: vec![],
        }],
        TriggerSpec::Kinds(kinds) => kinds
            .into_iter()
            .map(|kind| Trigger {
                kind,
                branches: vec![],
            })
            .collect(),
        TriggerSpec::Filtered(map) => map
            .into_iter()
            .map(|(kind, filter)| Trigger {
                kind,
                branches: filter.unwrap_or_default().branches,
            })
            .collect(),
    };
    Ok(triggers)
}

#[allow(clippy::ptr_arg)]
fn ser_triggers<S>(triggers: &Vec<Trigger>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(triggers.len()))?;
    for trigger in triggers {
        let mut filter = BTreeMap::new();
        filter.insert("branches", &trigger.branches);
        map.serialize_entry(&trigger.kind, &filter)?;
    }
    map.end()
}

/// A job template: steps plus the axes it is multiplied across
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobTemplate {
    /// Runtime environment descriptor (target platform)
    #[serde(default)]
    pub runs_on: Option<String>,

    /// Wall-clock budget for all steps of one instance
    #[serde(
        default,
        deserialize_with = "de_timeout",
        serialize_with = "ser_timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Matrix axes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixSpec>,

    /// Job-level environment variables
    #[serde(default, deserialize_with = "de_env")]
    pub env: BTreeMap<String, String>,

    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl JobTemplate {
    /// Effective timeout for this job
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_JOB_TIMEOUT)
    }
}

/// Matrix axes in declaration order, each with its ordered values
pub type MatrixSpec = OrderedMap<Vec<AxisValue>>;

/// A matrix axis value. Scalars of any type are carried as text.
///
/// An unquoted value the parser read as a float keeps only its shortest
/// form (`1.70` becomes `1.7`); `is_float` lets validation point that out.
#[derive(Debug, Clone)]
pub struct AxisValue {
    text: String,
    float: bool,
}

impl AxisValue {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the value was written as an unquoted float
    pub fn is_float(&self) -> bool {
        self.float
    }
}

impl PartialEq for AxisValue {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for AxisValue {}

impl std::hash::Hash for AxisValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for AxisValue {
    fn from(s: &str) -> Self {
        Self {
            text: s.to_string(),
            float: false,
        }
    }
}

impl Serialize for AxisValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for AxisValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let scalar = Scalar::deserialize(deserializer)?;
        let float = matches!(scalar, Scalar::Float(_));
        Ok(AxisValue {
            text: scalar.into_string(),
            float,
        })
    }
}

/// A single step within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Stable identifier; derived from the name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    pub name: String,

    /// What the step does
    #[serde(flatten)]
    pub action: StepAction,

    /// Named cache entries restored into the workspace before the step runs
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub inputs: OrderedMap<CacheSpec>,

    /// Step-level environment variables
    #[serde(default, deserialize_with = "de_env")]
    pub env: BTreeMap<String, String>,

    /// Shell override (defaults to the runner's shell)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
}

impl Step {
    /// Identifier of this step
    pub fn id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => slugify(&self.name),
        }
    }

    /// Kind of this step
    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Step action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Run a shell command
    Run(String),

    /// Hand a workspace directory to the cache
    SaveCache(CacheSpec),

    /// Regenerate an artifact and fail if it differs from the committed one
    DriftCheck(DriftCheck),
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Run(_) => StepKind::Run,
            Self::SaveCache(_) => StepKind::SaveCache,
            Self::DriftCheck(_) => StepKind::DriftCheck,
        }
    }
}

/// Step kinds, for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Run,
    SaveCache,
    DriftCheck,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::SaveCache => write!(f, "save_cache"),
            Self::DriftCheck => write!(f, "drift_check"),
        }
    }
}

/// Reference to a cache entry.
///
/// The key is derived from `namespace` plus the exact bytes of `files`;
/// `path` is the workspace directory the entry is restored into or saved
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub namespace: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    pub path: PathBuf,
}

/// Drift check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftCheck {
    /// Committed artifact, relative to the source tree
    pub artifact: PathBuf,
    /// Command that regenerates the artifact in place
    pub regenerate: String,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching for this workflow's jobs
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordered maps
// ─────────────────────────────────────────────────────────────────────────────

/// String-keyed map that keeps document order and duplicate keys.
///
/// Duplicates are kept so validation can report them instead of having the
/// parser silently keep the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<T>(Vec<(String, T)>);

impl<T> OrderedMap<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        self.0.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for OrderedMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for OrderedMap<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<T: Serialize> Serialize for OrderedMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<T> {
    type Value = OrderedMap<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, T>()? {
            entries.push((key, value));
        }
        Ok(OrderedMap(entries))
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OrderedMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scalars, environment maps and durations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s,
        }
    }
}

fn de_env<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Scalar>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.into_string()))
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeoutSpec {
    Minutes(u64),
    Text(String),
}

fn de_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<TimeoutSpec>::deserialize(deserializer)? {
        None => Ok(None),
        Some(TimeoutSpec::Minutes(m)) => minutes(m).map(Some).map_err(de::Error::custom),
        Some(TimeoutSpec::Text(s)) => parse_duration(&s).map(Some).map_err(de::Error::custom),
    }
}

fn ser_timeout<S>(timeout: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match timeout {
        Some(d) => serializer.serialize_str(&format!("{}ms", d.as_millis())),
        None => serializer.serialize_none(),
    }
}

/// Parse a duration such as `"90s"`, `"30m"`, `"2h"`, `"500ms"` or `"15"` (minutes)
pub fn parse_duration(value: &str) -> Result<Duration, CiflowError> {
    let invalid = || CiflowError::InvalidTimeout {
        value: value.to_string(),
    };

    let text = value.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    let unit_ms: u64 = match unit.trim() {
        "" | "m" | "min" => 60_000,
        "ms" => 1,
        "s" | "sec" => 1000,
        "h" => 3_600_000,
        _ => return Err(invalid()),
    };

    match amount.checked_mul(unit_ms) {
        Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(invalid()),
    }
}

/// A bare integer timeout counts minutes
fn minutes(value: u64) -> Result<Duration, CiflowError> {
    parse_duration(&value.to_string())
}

/// Format a duration the way timeouts are written
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CI_YAML: &str = r#"
name: CI
on:
  push:
    branches: [main]
  pull_request:
    branches: [main]
env:
  CARGO_TERM_COLOR: always
jobs:
  fmt:
    steps:
      - name: Check formatting
        run: cargo fmt --all -- --check
  test:
    runs_on: ${{ matrix.os }}
    timeout: 30m
    matrix:
      os: [ubuntu-latest, macos-latest, windows-latest]
      toolchain: [stable, "1.70"]
    env:
      RUST_BACKTRACE: 1
    steps:
      - name: Test
        run: cargo test --verbose
        inputs:
          registry:
            namespace: cargo-${{ matrix.os }}
            files: [Cargo.lock]
            path: target
      - name: Save build cache
        save_cache:
          namespace: cargo-${{ matrix.os }}
          files: [Cargo.lock]
          path: target
  lockfile:
    steps:
      - name: Lockfile is current
        drift_check:
          artifact: Cargo.lock
          regenerate: cargo update --workspace
"#;

    #[test]
    fn test_parse_workflow() {
        let def = PipelineDefinition::from_yaml(CI_YAML).unwrap();
        assert_eq!(def.name, "CI");
        assert_eq!(def.job_names(), vec!["fmt", "test", "lockfile"]);
        assert_eq!(def.triggers.len(), 2);
        assert_eq!(def.env.get("CARGO_TERM_COLOR").unwrap(), "always");

        let test = def.get_job("test").unwrap();
        assert_eq!(test.timeout(), Duration::from_secs(30 * 60));
        assert_eq!(test.env.get("RUST_BACKTRACE").unwrap(), "1");

        let matrix = test.matrix.as_ref().unwrap();
        assert_eq!(matrix.keys().collect::<Vec<_>>(), vec!["os", "toolchain"]);
        let toolchains: Vec<_> = matrix
            .get("toolchain")
            .unwrap()
            .iter()
            .map(|v| v.as_str().to_string())
            .collect();
        assert_eq!(toolchains, vec!["stable", "1.70"]);
        assert!(matrix.get("toolchain").unwrap().iter().all(|v| !v.is_float()));

        assert_eq!(test.steps[0].kind(), StepKind::Run);
        assert_eq!(test.steps[0].inputs.len(), 1);
        assert_eq!(test.steps[1].kind(), StepKind::SaveCache);
    }

    #[test]
    fn test_parse_drift_check_step() {
        let def = PipelineDefinition::from_yaml(CI_YAML).unwrap();
        let lockfile = def.get_job("lockfile").unwrap();
        match &lockfile.steps[0].action {
            StepAction::DriftCheck(check) => {
                assert_eq!(check.artifact, PathBuf::from("Cargo.lock"));
                assert_eq!(check.regenerate, "cargo update --workspace");
            }
            other => panic!("Expected drift check, got {:?}", other),
        }
        assert_eq!(lockfile.timeout(), DEFAULT_JOB_TIMEOUT);
    }

    #[test]
    fn test_duplicate_job_names_are_kept() {
        let yaml = r#"
on: push
jobs:
  build:
    steps:
      - name: a
        run: "true"
  build:
    steps:
      - name: b
        run: "true"
"#;
        let def = PipelineDefinition::from_yaml(yaml).unwrap();
        let names: Vec<_> = def.jobs.keys().collect();
        assert_eq!(names, vec!["build", "build"]);

        let validation = crate::pipeline::PipelineValidator::validate(&def);
        assert!(validation
            .errors
            .iter()
            .any(|e| e == "Duplicate job name: 'build'"));

        // TOML rejects the repeated table while parsing
        let toml = "on = \"push\"\n[jobs.build]\nsteps = []\n[jobs.build]\nsteps = []\n";
        assert!(PipelineDefinition::from_toml(toml).is_err());
    }

    #[test]
    fn test_trigger_list_forms() {
        let def = PipelineDefinition::from_yaml(
            "on: [push, pull_request]\njobs:\n  a:\n    steps: []\n",
        )
        .unwrap();
        assert_eq!(def.triggers.len(), 2);
        assert!(def.triggers.iter().all(|t| t.branches.is_empty()));

        let def = PipelineDefinition::from_yaml("on: push\njobs:\n  a:\n    steps: []\n").unwrap();
        assert_eq!(def.triggers[0].kind, EventKind::Push);
    }

    #[test]
    fn test_parse_toml_workflow() {
        let source = r#"
name = "toml-ci"
concurrency = 2

[on.push]
branches = ["main"]

[jobs.check]
timeout = "90s"
steps = [{ name = "Check", run = "cargo check" }]

[jobs.check.matrix]
target = ["wasm32-unknown-unknown", "x86_64-unknown-linux-gnu"]
"#;
        let def = PipelineDefinition::from_toml(source).unwrap();
        assert_eq!(def.name, "toml-ci");
        assert_eq!(def.concurrency, Some(2));
        let check = def.get_job("check").unwrap();
        assert_eq!(check.timeout(), Duration::from_secs(90));
        assert_eq!(check.matrix.as_ref().unwrap().get("target").unwrap().len(), 2);
    }

    #[test]
    fn test_step_id_derivation() {
        let step = Step {
            id: None,
            name: "Check wasm32 (strict)".into(),
            action: StepAction::Run("cargo check".into()),
            inputs: OrderedMap::new(),
            env: BTreeMap::new(),
            shell: None,
        };
        assert_eq!(step.id(), "check-wasm32-strict");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(900));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("400000000000000000h").is_err());
        assert!(parse_duration("18446744073709551615m").is_err());
    }

    #[test]
    fn test_integer_timeouts_are_checked() {
        let workflow = |timeout: &str| {
            format!(
                "on: push\njobs:\n  a:\n    timeout: {}\n    steps: []\n",
                timeout
            )
        };

        let def = PipelineDefinition::from_yaml(&workflow("45")).unwrap();
        assert_eq!(def.get_job("a").unwrap().timeout(), Duration::from_secs(45 * 60));

        for rejected in ["0", "400000000000000000"] {
            let err = PipelineDefinition::from_yaml(&workflow(rejected)).unwrap_err();
            assert!(
                err.to_string().contains("Invalid timeout"),
                "{}: {}",
                rejected,
                err
            );
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(1800)), "30m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn test_round_trip_yaml() {
        let def = PipelineDefinition::from_yaml(CI_YAML).unwrap();
        let yaml = def.to_yaml().unwrap();
        let parsed = PipelineDefinition::from_yaml(&yaml).unwrap();

        assert_eq!(parsed.name, def.name);
        assert_eq!(parsed.job_names(), def.job_names());
        assert_eq!(parsed.triggers, def.triggers);
        assert_eq!(
            parsed.get_job("test").unwrap().timeout(),
            def.get_job("test").unwrap().timeout()
        );
    }
}
