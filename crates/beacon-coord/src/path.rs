//! Namespace path helpers
//!
//! Paths follow ZooKeeper rules: absolute, `/`-separated, no empty,
//! `.` or `..` components, no trailing slash except for the root.

use crate::error::{CoordError, CoordResult};

/// The root path
pub const ROOT: &str = "/";

/// Validate a namespace path
pub fn validate(path: &str) -> CoordResult<()> {
    if !path.starts_with('/') {
        return Err(CoordError::invalid_path(path, "path must be absolute"));
    }

    if path == ROOT {
        return Ok(());
    }

    if path.ends_with('/') {
        return Err(CoordError::invalid_path(path, "trailing slash"));
    }

    for component in path[1..].split('/') {
        validate_component(component).map_err(|reason| CoordError::invalid_path(path, reason))?;
    }

    Ok(())
}

fn validate_component(component: &str) -> Result<(), String> {
    if component.is_empty() {
        return Err("empty path component".into());
    }
    if component == "." || component == ".." {
        return Err(format!("relative component '{}'", component));
    }
    if component.chars().any(|c| c == '\0' || c.is_control()) {
        return Err("control character in path".into());
    }
    Ok(())
}

/// Join a parent path with a single child name
pub fn join(parent: &str, child: &str) -> CoordResult<String> {
    validate(parent)?;
    if child.contains('/') {
        return Err(CoordError::invalid_path(child, "child name contains '/'"));
    }
    validate_component(child).map_err(|reason| CoordError::invalid_path(child, reason))?;

    if parent == ROOT {
        Ok(format!("/{}", child))
    } else {
        Ok(format!("{}/{}", parent, child))
    }
}

/// Parent of a path (`None` for the root)
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last component of a path (empty for the root)
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Every ancestor of `path` plus `path` itself, shortest first, root excluded
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn prefixes(path: &str) -> Vec<&str> {
    if path == ROOT {
        return Vec::new();
    }
    path.char_indices()
        .skip(1)
        .filter(|(_, c)| *c == '/')
        .map(|(idx, _)| &path[..idx])
        .chain(std::iter::once(path))
        .collect()
}
