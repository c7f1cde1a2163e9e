use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConfigFile {
    pub domain: Option<String>,
    #[serde(alias = "manual_endpoints")]
    pub endpoints: Option<Vec<String>>,
    pub concurrency: Option<usize>,
    pub rate: Option<u32>,
    /// Milliseconds.
    pub timeout: Option<u64>,
    pub workers: Option<usize>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub export: Option<bool>,
    pub save_dir: Option<String>,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub expect: Option<String>,
    pub follow_redirects: Option<bool>,
    pub insecure: Option<bool>,
    pub user_agent: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".apihealth").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn parse_config(contents: &str, origin: &Path) -> Result<ConfigFile, String> {
    serde_yaml::from_str::<ConfigFile>(contents)
        .map_err(|e| format!("failed to parse config '{}': {e}", origin.display()))
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(ConfigFile::default()),
        Ok(contents) => parse_config(&contents, path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

fn default_config_yaml() -> String {
    r#"# apihealth config
#
# Location (default):
#   ~/.apihealth/config.yml

# Target (optional, the CLI argument wins)
# domain: example.com
# Skip discovery and test exactly these endpoints:
# endpoints:
#   - /api/users
#   - https://api.example.com/v1/health

# Performance
concurrency: 10
rate: 0
# Per-request timeout for the test phase, in milliseconds
timeout: 10000
workers: 4

# HTTP (optional)
# proxy: http://127.0.0.1:8080
# header: "Authorization: Bearer <token>"
# user_agent: "apihealth"
follow_redirects: true
insecure: false

# Matching: 2xx always passes, these codes pass too
# expect: "401,403"

# Output (optional)
# output: ./results.json
# output_format: json
export: false
# save_dir: ~/.apihealth/runs

# Output styling
no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &Path) -> Result<bool, String> {
    if path.exists() {
        return Ok(false);
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    let contents = default_config_yaml();
    std::fs::write(path, contents)
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(true)
}
