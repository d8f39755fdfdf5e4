//! Parser for the column key specification.
//!
//! The grammar is `group (";" group)*` with `group = keyId ":" colName ("," colName)*`.
//! Whitespace around tokens is ignored. Empty groups (such as a trailing `;`) are skipped.
//! Tokens may not contain whitespace, control characters, or the separators.

use crate::error::{Error, Result};
use std::collections::HashSet;

/// Columns encrypted with one master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnKeyGroup {
    /// Master key protecting every column of the group
    pub master_key_id: String,
    /// Column paths, in the order they were listed
    pub column_paths: Vec<String>,
}

/// Parsed mapping from master key ID to column paths
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnKeySpec {
    groups: Vec<ColumnKeyGroup>,
}

impl ColumnKeySpec {
    /// Parses a column key specification
    pub fn parse(spec: &str) -> Result<Self> {
        let mut groups = Vec::new();
        let mut seen_keys = HashSet::new();
        let mut seen_columns = HashSet::new();

        for raw_group in spec.split(';') {
            let raw_group = raw_group.trim();
            if raw_group.is_empty() {
                continue;
            }

            let (key_part, columns_part) = raw_group.split_once(':').ok_or_else(|| {
                Error::Configuration(format!(
                    "incorrect key to columns mapping in column keys: [{}]",
                    raw_group
                ))
            })?;

            let master_key_id = parse_token(key_part, "master key ID")?;
            if !seen_keys.insert(master_key_id.clone()) {
                return Err(Error::Configuration(format!(
                    "master key '{}' is listed in more than one group",
                    master_key_id
                )));
            }

            let mut column_paths = Vec::new();
            for raw_column in columns_part.split(',') {
                let column = parse_token(raw_column, "column name")?;
                if !seen_columns.insert(column.clone()) {
                    return Err(Error::Configuration(format!(
                        "multiple keys defined for column '{}'",
                        column
                    )));
                }
                column_paths.push(column);
            }

            groups.push(ColumnKeyGroup {
                master_key_id,
                column_paths,
            });
        }

        if groups.is_empty() {
            return Err(Error::Configuration(format!(
                "no column keys found in [{}]",
                spec
            )));
        }

        Ok(Self { groups })
    }

    /// Groups in specification order
    pub fn groups(&self) -> &[ColumnKeyGroup] {
        &self.groups
    }

    /// Column paths protected by the given master key
    pub fn columns_for(&self, master_key_id: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|g| g.master_key_id == master_key_id)
            .map(|g| g.column_paths.as_slice())
    }

    /// Master key protecting the given column path
    pub fn master_key_for(&self, column_path: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.column_paths.iter().any(|c| c == column_path))
            .map(|g| g.master_key_id.as_str())
    }

    /// Number of encrypted columns
    pub fn column_count(&self) -> usize {
        self.groups.iter().map(|g| g.column_paths.len()).sum()
    }
}

fn parse_token(raw: &str, what: &str) -> Result<String> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(Error::Configuration(format!(
            "empty {} in column keys",
            what
        )));
    }

    if let Some(c) = token
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, ':' | ';' | ','))
    {
        return Err(Error::Configuration(format!(
            "illegal character {:?} in {} '{}'",
            c, what, token
        )));
    }

    Ok(token.to_string())
}
