pub mod cache;
pub mod debounce;
pub mod documents;
pub mod duplicates;
pub mod engine;
pub mod error_log;
pub mod frontmatter;
pub mod metadata;
pub mod orphans;
pub mod paths;
pub mod reconcile;
pub mod remote;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;
