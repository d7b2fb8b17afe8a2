use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::paths::{is_hidden, is_markdown, relative_document_path};

/// A document was created or its content changed. Removals are not reported;
/// orphan collection notices those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChanged {
    pub path: String,
}

pub fn start_document_watcher(
    root: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<DocumentChanged>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = root.to_path_buf();
    let watch_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        match res {
            Ok(event) => {
                for changed in map_event(&watch_root, event) {
                    let _ = tx.send(changed);
                }
            }
            Err(err) => tracing::warn!(error = %err, "document watcher error"),
        }
    })?;
    watcher.watch(root.as_path(), RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

fn map_event(root: &Path, event: Event) -> Vec<DocumentChanged> {
    let paths = match event.kind {
        // Only the destination of a rename is a live document.
        EventKind::Modify(notify::event::ModifyKind::Name(
            notify::event::RenameMode::Both,
        )) => event.paths.into_iter().skip(1).collect(),
        EventKind::Modify(notify::event::ModifyKind::Name(
            notify::event::RenameMode::From,
        )) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(_) => event.paths,
        _ => Vec::new(),
    };
    paths
        .iter()
        .filter_map(|path| relative_document_path(root, path))
        .filter(|path| is_markdown(path) && !is_hidden(path))
        .map(|path| DocumentChanged { path })
        .collect()
}
