//! Identifier helpers for games and instances.

/// Returns true if an id is safe to use as a single path component on all platforms.
///
/// Rules:
/// - Must be non-empty and not "." or ".."
/// - Must not contain path separators ('/' or '\\')
/// - Must not contain control characters, NUL, or Windows-reserved characters
/// - Must not end with '.' or space
pub fn is_safe_path_component(id: &str) -> bool {
    if id.is_empty() || id == "." || id == ".." {
        return false;
    }

    if id.ends_with('.') || id.ends_with(' ') {
        return false;
    }

    !id.chars().any(|c| {
        c == '/'
            || c == '\\'
            || c.is_control()
            || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|')
    })
}

/// Lowercase a display name and collapse everything but ASCII alphanumerics to `_`.
///
/// Runs of separators collapse to one underscore; leading and trailing
/// underscores are dropped.
pub fn sanitize_id(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Game id for emulated content: `game_<platform>_<sanitized name>`.
pub fn emulated_game_id(platform: &str, display_name: &str) -> String {
    format!("game_{}_{}", platform, sanitize_id(display_name))
}

/// Instance id for a ROM file, from its content hash.
pub fn file_instance_id(hash: &str) -> String {
    let short = hash.get(..16).unwrap_or(hash);
    format!("file_{short}")
}

/// Instance id for a Steam installation.
pub fn steam_instance_id(app_id: &str) -> String {
    format!("steam_{app_id}")
}

/// Game id for a Steam installation.
pub fn steam_game_id(app_id: &str) -> String {
    format!("game_steam_{app_id}")
}

/// Display name from a ROM filename: extension removed, `_` and `-` become spaces.
pub fn display_name_from_filename(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };
    stem.replace(['_', '-'], " ").trim().to_string()
}
