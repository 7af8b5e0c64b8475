//! Minimal IDF reading: just enough to find the `Version` object.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdfError {
    #[error("failed to read input file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input file '{}' has no Version object", .0.display())]
    MissingVersion(PathBuf),
}

/// Returns the `Version Identifier` field of an IDF document, e.g. `22.2`.
///
/// Comments (`!` to end of line) are ignored and the object name is matched
/// case-insensitively, so both `Version,22.2;` and the multi-line form are
/// accepted.
pub fn parse_version_identifier(text: &str) -> Option<String> {
    let stripped: String = text
        .lines()
        .map(|line| line.split('!').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n");

    stripped.split(';').find_map(|object| {
        let mut fields = object.split(',').map(str::trim);
        let name = fields.next()?;
        if !name.eq_ignore_ascii_case("version") {
            return None;
        }
        fields.next().filter(|v| !v.is_empty()).map(str::to_string)
    })
}

/// Converts a version identifier to the dashed three-part form used in
/// install directory names: `22.2` becomes `22-2-0`.
pub fn ep_version_string(identifier: &str) -> String {
    let mut parts: Vec<&str> = identifier.trim().split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    parts.join("-")
}

/// Reads the engine version an input file targets, in dashed form.
pub fn read_ep_version(path: &Path) -> Result<String, IdfError> {
    // Comments may carry Latin-1 bytes; only the ASCII Version object matters.
    let bytes = std::fs::read(path).map_err(|source| IdfError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_version_identifier(&String::from_utf8_lossy(&bytes))
        .map(|v| ep_version_string(&v))
        .ok_or_else(|| IdfError::MissingVersion(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_version() {
        let idf = "! header comment\nVersion,22.2;\n\nBuilding,Ref,0.0;";
        assert_eq!(parse_version_identifier(idf).as_deref(), Some("22.2"));
    }

    #[test]
    fn test_multi_line_version_with_comments() {
        let idf = "Timestep,6;\n  VERSION,\n    9.6;                     !- Version Identifier\n";
        assert_eq!(parse_version_identifier(idf).as_deref(), Some("9.6"));
    }

    #[test]
    fn test_commented_out_version_is_ignored() {
        let idf = "! Version,7.2;\nBuilding,Ref;";
        assert_eq!(parse_version_identifier(idf), None);
    }

    #[test]
    fn test_ep_version_string() {
        assert_eq!(ep_version_string("22.2"), "22-2-0");
        assert_eq!(ep_version_string("9.6.0"), "9-6-0");
        assert_eq!(ep_version_string("8"), "8-0-0");
    }

    #[test]
    fn test_read_ep_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.idf");
        std::fs::write(&path, "Version,22.2;").unwrap();
        assert_eq!(read_ep_version(&path).unwrap(), "22-2-0");

        std::fs::write(&path, "Building,Ref;").unwrap();
        assert!(matches!(
            read_ep_version(&path),
            Err(IdfError::MissingVersion(_))
        ));
    }

    #[test]
    fn test_read_ep_version_tolerates_latin1_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.idf");
        std::fs::write(&path, b"! Setpoint 21\xb0C\nVersion,22.2;\n").unwrap();
        assert_eq!(read_ep_version(&path).unwrap(), "22-2-0");
    }
}
