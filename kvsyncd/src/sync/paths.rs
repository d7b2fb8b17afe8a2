use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("document path is empty")]
    Empty,
    #[error("document path contains unsupported component")]
    UnsupportedComponent,
}

/// Maps a vault-relative document path ("notes/a.md") under `vault_root`.
pub fn document_path_for(vault_root: &Path, document_path: &str) -> Result<PathBuf, PathError> {
    if document_path.trim().is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = vault_root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(document_path).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                pushed = true;
            }
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    if !pushed {
        return Err(PathError::Empty);
    }
    Ok(out)
}

/// Inverse of [`document_path_for`]: absolute filesystem path to a
/// vault-relative path with `/` separators.
pub fn relative_document_path(vault_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(vault_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

pub fn is_markdown(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("md"))
}

pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_document_path_under_vault_root() {
        let root = PathBuf::from("/vault");
        let mapped = document_path_for(&root, "notes/a.md").unwrap();
        assert_eq!(mapped, PathBuf::from("/vault/notes/a.md"));
    }

    #[test]
    fn rejects_parent_dir() {
        let root = PathBuf::from("/vault");
        assert!(matches!(
            document_path_for(&root, "../secret.md"),
            Err(PathError::UnsupportedComponent)
        ));
        assert!(matches!(
            document_path_for(&root, "/"),
            Err(PathError::Empty)
        ));
    }

    #[test]
    fn relative_path_uses_forward_slashes() {
        let root = Path::new("/vault");
        assert_eq!(
            relative_document_path(root, Path::new("/vault/blog/post.md")).as_deref(),
            Some("blog/post.md")
        );
        assert_eq!(relative_document_path(root, Path::new("/other/x.md")), None);
    }

    #[test]
    fn markdown_and_hidden_detection() {
        assert!(is_markdown("a.md"));
        assert!(is_markdown("dir/B.MD"));
        assert!(!is_markdown(".md"));
        assert!(!is_markdown("a.md.tmp"));
        assert!(is_hidden(".obsidian/workspace.md"));
        assert!(is_hidden("notes/.draft.md"));
        assert!(!is_hidden("notes/draft.md"));
    }
}
