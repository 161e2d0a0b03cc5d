pub mod cat;
pub mod hidden;
pub mod init;
pub mod ls;
pub mod mkdir;
pub mod mv;
pub mod note;
pub mod rm;
pub mod service;
pub mod stat;
pub mod touch;
pub mod write;

use std::io::{self, Read};

use anyhow::{Context, Result};

/// Normalize a path to have a leading slash
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Read all of stdin.
pub fn read_stdin() -> Result<Vec<u8>> {
    let mut content = Vec::new();
    io::stdin()
        .read_to_end(&mut content)
        .context("Failed to read stdin")?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/b"), "/a/b");
        assert_eq!(normalize_path("/a"), "/a");
        assert_eq!(normalize_path(""), "/");
    }
}
