use crate::error::ProvisionError;
use crate::prompt::Prompter;
use anyhow::{Context, Result};
use std::path::Path;
use toml::{Table, Value};

/// Prompt answers for unattended runs, loaded from a TOML document.
///
/// Keys are dotted paths into nested tables, so `account.name` is answered by
///
/// ```toml
/// [account]
/// name = "deploy"
/// ```
#[derive(Debug, Clone, Default)]
pub struct Answers {
    table: Table,
}

impl Answers {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers file {}", path.display()))?;
        content
            .parse()
            .with_context(|| format!("Failed to parse answers file {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut current = self.table.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// String answers exactly as written; `ask` trims, secrets do not.
    fn text(&self, key: &str) -> Result<Option<String>, ProvisionError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Integer(i)) => Ok(Some(i.to_string())),
            Some(other) => Err(ProvisionError::InvalidInput {
                key: key.to_string(),
                reason: format!("expected a string, found {}", other.type_str()),
            }),
        }
    }
}

impl std::str::FromStr for Answers {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { table: s.parse()? })
    }
}

impl Prompter for Answers {
    fn confirm(&self, key: &str, default: bool, message: &str) -> Result<bool> {
        let answer = match self.get(key) {
            None => default,
            Some(Value::Boolean(b)) => *b,
            Some(other) => {
                return Err(ProvisionError::InvalidInput {
                    key: key.to_string(),
                    reason: format!("expected a boolean, found {}", other.type_str()),
                }
                .into())
            }
        };
        tracing::debug!("{message} -> {answer} ({key})");
        Ok(answer)
    }

    fn ask(&self, key: &str, message: &str) -> Result<String> {
        let answer = self.text(key)?.map(|s| s.trim().to_string()).unwrap_or_default();
        tracing::debug!("{message} -> {answer:?} ({key})");
        Ok(answer)
    }

    fn ask_secret(&self, key: &str, _message: &str) -> Result<String> {
        Ok(self.text(key)?.ok_or_else(|| ProvisionError::MissingAnswer(key.to_string()))?)
    }

    fn interactive(&self) -> bool {
        false
    }
}
