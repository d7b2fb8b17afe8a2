pub fn describe_outcome(path: &str, outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Skipped => format!("{path}: skipped"),
        SyncOutcome::SkippedWithError(message) => format!("skipped with error: {message}"),
        SyncOutcome::Acted(_) if outcome.is_failure() => {
            format!("sync failed: {}", outcome.error_messages(path).join("; "))
        }
        SyncOutcome::Acted(actions) => {
            let removed = actions
                .deleted
                .iter()
                .map(|step| format!("removed \"{}\"", step.key));
            let uploaded = actions
                .uploaded
                .iter()
                .map(|step| format!("uploaded \"{}\"", step.key));
            let steps: Vec<String> = removed.chain(uploaded).collect();
            format!("{path}: {}", steps.join(", then "))
        }
    }
}

pub fn describe_report(report: &BulkReport) -> String {
    let mut line = format!(
        "sync finished: {} succeeded, {} failed, {} skipped",
        report.succeeded, report.failed, report.skipped
    );
    if report.ids_reassigned > 0 {
        line.push_str(&format!(", {} duplicate ids reassigned", report.ids_reassigned));
    }
    if report.orphans_removed > 0 || report.orphans_failed > 0 {
        line.push_str(&format!(
            ", {} orphans removed, {} orphans failed",
            report.orphans_removed, report.orphans_failed
        ));
    }
    line
}

/// Accepts a vault-relative path or an absolute path inside the vault.
fn normalize_document_arg(vault_root: &Path, arg: &str) -> anyhow::Result<String> {
    let candidate = Path::new(arg);
    let relative = if candidate.is_absolute() {
        relative_document_path(vault_root, candidate)
            .with_context(|| format!("{arg} is not inside the vault"))?
    } else {
        arg.replace('\\', "/")
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect::<Vec<_>>()
            .join("/")
    };
    document_path_for(vault_root, &relative)
        .with_context(|| format!("invalid document path: {arg}"))?;
    Ok(relative)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_state_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEFAULT_STATE_DIR_NAME)
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("{name} is not set"))
}

fn read_string_env(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
