//! Leading `---` delimited YAML block of a Markdown document.

use serde_yaml::{Mapping, Value};
use thiserror::Error;

const DELIMITER: &str = "---";

#[derive(Debug, Error)]
pub enum FrontmatterError {
    #[error("document has no frontmatter block")]
    Missing,
    #[error("frontmatter is not a mapping")]
    NotMapping,
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    pub yaml: &'a str,
    pub body: &'a str,
}

pub fn split(text: &str) -> Option<Split<'_>> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if trim_eol(first) != DELIMITER {
        return None;
    }
    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if trim_eol(line) == DELIMITER {
            return Some(Split {
                yaml: &text[yaml_start..offset],
                body: &text[offset + line.len()..],
            });
        }
        offset += line.len();
    }
    None
}

/// Parses the frontmatter mapping. `None` when there is no block or the block
/// is not a YAML mapping; an empty block yields an empty mapping.
pub fn parse(text: &str) -> Option<Mapping> {
    let split = split(text)?;
    parse_block(split.yaml).ok()
}

/// Returns `text` with `field` set to `value` inside the frontmatter. The body
/// after the closing delimiter is preserved as-is.
pub fn set_field(text: &str, field: &str, value: &str) -> Result<String, FrontmatterError> {
    let split = split(text).ok_or(FrontmatterError::Missing)?;
    let mut mapping = parse_block(split.yaml)?;
    mapping.insert(
        Value::String(field.to_string()),
        Value::String(value.to_string()),
    );
    let yaml = serde_yaml::to_string(&mapping)?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", split.body))
}

fn parse_block(yaml: &str) -> Result<Mapping, FrontmatterError> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(FrontmatterError::NotMapping),
    }
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
