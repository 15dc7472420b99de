//! Environment composition for bridged children.
//!
//! The host side only sees variables named in the `WSLENV` visibility
//! manifest. Each manifest token is `NAME<flag>`, the flag telling the bridge
//! how to translate the value on the way across.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use tracing::debug;
use winbridge_commons::is_path_shaped;

use crate::command::CommandSpec;

/// Name of the visibility manifest variable.
pub const VISIBILITY_MANIFEST_VAR: &str = "WSLENV";

/// Variable names whose values are conventionally a single path.
const PATH_LIKE_KEYS: &[&str] = &[
    "PATH",
    "HOME",
    "GOPATH",
    "GOROOT",
    "TMPDIR",
    "TEMP",
    "TMP",
    "USERPROFILE",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Per-variable translation flag in the visibility manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WslEnvFlag {
    /// Passed through untranslated, native to host only.
    Plain,
    /// Translated as a single path.
    Path,
    /// Translated as a colon-separated list of paths.
    PathList,
    /// Passed through only from host to native.
    Reverse,
}

impl WslEnvFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "/u",
            Self::Path => "/p",
            Self::PathList => "/l",
            Self::Reverse => "/w",
        }
    }
}

impl fmt::Display for WslEnvFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_path_like_key(key: &str) -> bool {
    PATH_LIKE_KEYS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(key))
}

/// Pick the manifest flag for one variable.
///
/// A colon list whose segments are mostly path-shaped wins, then a
/// path-shaped value, then a well-known path variable name.
pub fn infer_flag(key: &str, value: &str) -> WslEnvFlag {
    if value.contains(':') {
        let segments: Vec<&str> = value.split(':').collect();
        let path_like = segments.iter().filter(|s| is_path_shaped(s)).count();
        if path_like * 2 > segments.len() {
            return WslEnvFlag::PathList;
        }
    }
    if is_path_shaped(value) || is_path_like_key(key) {
        return WslEnvFlag::Path;
    }
    WslEnvFlag::Plain
}

/// Build the manifest value for `vars`, keys sorted for determinism.
pub fn build_visibility_manifest<'a, I>(vars: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut tokens: Vec<(&str, WslEnvFlag)> = vars
        .into_iter()
        .map(|(key, value)| (key.as_str(), infer_flag(key, value)))
        .collect();
    tokens.sort_unstable_by(|a, b| a.0.cmp(b.0));
    tokens
        .into_iter()
        .map(|(key, flag)| format!("{key}{flag}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Environment handed to the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposedEnv {
    /// Leave the caller's environment untouched.
    Inherit,
    /// Replace the environment with exactly these variables, in order.
    Explicit(IndexMap<String, String>),
}

impl ComposedEnv {
    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Self::Inherit => None,
            Self::Explicit(vars) => vars.get(key).map(String::as_str),
        }
    }

    /// `KEY=VALUE` rendering, empty for [`ComposedEnv::Inherit`].
    pub fn to_entries(&self) -> Vec<String> {
        match self {
            Self::Inherit => Vec::new(),
            Self::Explicit(vars) => vars.iter().map(|(k, v)| format!("{k}={v}")).collect(),
        }
    }
}

/// Compose the child environment from the current process environment.
pub fn compose(spec: &CommandSpec) -> ComposedEnv {
    if spec.env.is_empty() && !spec.tunnel_env {
        return ComposedEnv::Inherit;
    }
    compose_with(spec, std::env::vars())
}

/// Compose against an explicit inherited snapshot.
pub fn compose_with<I>(spec: &CommandSpec, inherited: I) -> ComposedEnv
where
    I: IntoIterator<Item = (String, String)>,
{
    if spec.env.is_empty() && !spec.tunnel_env {
        return ComposedEnv::Inherit;
    }

    let mut vars: IndexMap<String, String> = inherited.into_iter().collect();
    for (key, value) in &spec.env {
        vars.insert(key.clone(), value.clone());
    }

    if spec.tunnel_env && !spec.env.is_empty() {
        let manifest = build_visibility_manifest(&spec.env);
        let merged = match vars.get(VISIBILITY_MANIFEST_VAR) {
            Some(existing) if !existing.is_empty() => format!("{existing}:{manifest}"),
            _ => manifest,
        };
        debug!(manifest = %merged, "publishing variables to host");
        vars.insert(VISIBILITY_MANIFEST_VAR.to_string(), merged);
    }

    ComposedEnv::Explicit(vars)
}

/// Convenience for callers holding a plain map.
pub fn manifest_for(vars: &HashMap<String, String>) -> String {
    build_visibility_manifest(vars)
}
