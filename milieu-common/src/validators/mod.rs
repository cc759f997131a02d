/// Lowercases and trims an email address. Returns `None` when nothing
/// usable remains.
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

pub fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Paths must be relative, slash-separated, free of traversal segments, and
/// name an env file (`.env` or `.env.*`).
pub fn is_valid_env_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return false;
    }

    let filename = segments[segments.len() - 1];
    filename == ".env" || filename.starts_with(".env.")
}
