//! Container path safety policy.
//!
//! Every path-accepting sandbox operation resolves its input here first.
//! This is the only defense against traversal out of the container's
//! working directory into the host bind-mount hierarchy.

use crate::{Error, Result};

/// Resolves a container path against the sandbox working directory.
///
/// Rejects any path containing a parent-directory segment. Relative
/// paths are joined onto `work_dir`; absolute paths are used as-is.
pub fn resolve_container_path(work_dir: &str, path: &str) -> Result<String> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(Error::path_safety(format!(
            "Path contains potentially unsafe patterns: {}",
            path
        )));
    }

    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("{}/{}", work_dir.trim_end_matches('/'), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_join_work_dir() {
        assert_eq!(
            resolve_container_path("/workspace", "main.py").unwrap(),
            "/workspace/main.py"
        );
        assert_eq!(
            resolve_container_path("/workspace/", "src/app.js").unwrap(),
            "/workspace/src/app.js"
        );
    }

    #[test]
    fn test_absolute_paths_pass_through() {
        assert_eq!(
            resolve_container_path("/workspace", "/tmp/data.txt").unwrap(),
            "/tmp/data.txt"
        );
    }

    #[test]
    fn test_traversal_rejection() {
        assert!(resolve_container_path("/workspace", "../etc/passwd").is_err());
        assert!(resolve_container_path("/workspace", "src/../../etc/passwd").is_err());
        assert!(resolve_container_path("/workspace", "/data/../../etc").is_err());
    }

    #[test]
    fn test_dotdot_as_filename_fragment_is_allowed() {
        // Only whole `..` segments are traversal; `..foo` is a valid name.
        assert_eq!(
            resolve_container_path("/workspace", "..hidden").unwrap(),
            "/workspace/..hidden"
        );
    }
}
