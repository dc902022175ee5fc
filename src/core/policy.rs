//! Rule file management
//!
//! Rule files are standalone JSON documents containing a [`FirewallRuleset`].
//! `vpclab rules --format json` writes one for the walkthrough's rules, and
//! `vpclab simulate --rules <file>` evaluates packets against one.

use crate::core::firewall::{FirewallRuleset, MAX_RULES};
use std::path::{Path, PathBuf};

/// Largest rule file accepted, in bytes
pub const MAX_RULE_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Error type for rule file operations
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Rule file not found: {0}")]
    NotFound(PathBuf),

    #[error("Rule file too large: {0} bytes (max {MAX_RULE_FILE_SIZE})")]
    TooLarge(u64),

    #[error("Rule file contains {0} rules (max {MAX_RULES})")]
    TooManyRules(usize),

    #[error("Invalid rule file: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Loads and validates a ruleset from a JSON file.
///
/// # Async
/// Uses `tokio::fs` for non-blocking file I/O.
///
/// # Errors
///
/// Returns `Err` if the file is missing, oversized, malformed, or any rule
/// fails validation.
pub async fn load_ruleset(path: &Path) -> Result<FirewallRuleset, PolicyError> {
    if !tokio::fs::try_exists(path).await? {
        return Err(PolicyError::NotFound(path.to_path_buf()));
    }

    let size = tokio::fs::metadata(path).await?.len();
    if size > MAX_RULE_FILE_SIZE {
        return Err(PolicyError::TooLarge(size));
    }

    let json = tokio::fs::read_to_string(path).await?;
    let ruleset = parse_ruleset(&json)?;

    tracing::info!(
        "Loaded {} rules for network '{}' from {}",
        ruleset.rules.len(),
        ruleset.network,
        path.display()
    );
    Ok(ruleset)
}

/// Parses and validates a ruleset from JSON text.
///
/// # Errors
///
/// Returns `Err` on malformed JSON or an invalid rule.
pub fn parse_ruleset(json: &str) -> Result<FirewallRuleset, PolicyError> {
    let ruleset: FirewallRuleset = serde_json::from_str(json)?;

    if ruleset.rules.len() > MAX_RULES {
        return Err(PolicyError::TooManyRules(ruleset.rules.len()));
    }

    ruleset
        .validate()
        .map_err(|e| PolicyError::Invalid(e.to_string()))?;

    Ok(ruleset)
}

/// Saves a ruleset as pretty JSON using an atomic write pattern.
/// 1. Writes to a temporary file next to the target.
/// 2. Flushes it to disk.
/// 3. Atomically renames to the target path.
///
/// # Errors
///
/// Returns `Err` if serialization or any file operation fails.
pub async fn save_ruleset(path: &Path, ruleset: &FirewallRuleset) -> Result<(), PolicyError> {
    use tokio::io::AsyncWriteExt;

    let json = serde_json::to_string_pretty(ruleset)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.sync_all().await?;

    tokio::fs::rename(&temp_path, path).await?;
    tracing::info!("Saved {} rules to {}", ruleset.rules.len(), path.display());
    Ok(())
}
