/// Grammar document decoding by file extension.
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::error::Error;
use crate::transport;

/// Anything that can turn a grammar file into its canonical JSON document.
/// The installer only sees this trait, never a concrete decoder.
pub trait Decode: Sync {
    /// Decode the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDocumentType` for unsupported extensions,
    /// or `Error::DecodeFailed` for malformed content.
    fn decode(&self, path: &Path) -> Result<Value, Error>;
}

/// Production decoder: property lists in-process, CSON through an external converter.
pub struct FormatLoader {
    /// Command invoked as `<converter> <path>`, printing JSON on stdout.
    converter: PathBuf,
}

/// Supported on-disk grammar formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarFormat {
    /// CSON, converted to JSON by an external command.
    Cson,
    /// Plain JSON.
    Json,
    /// XML or binary property list (`.plist`, `.tmLanguage`).
    PropertyList,
}

impl Decode for FormatLoader {
    fn decode(&self, path: &Path) -> Result<Value, Error> {
        return match format_for_path(path)? {
            GrammarFormat::Cson => self.decode_cson(path),
            GrammarFormat::Json => decode_json(path),
            GrammarFormat::PropertyList => decode_property_list(path),
        };
    }
}

impl FormatLoader {
    /// Run the CSON converter and parse its stdout.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecodeFailed` if the converter fails or prints invalid JSON.
    fn decode_cson(&self, path: &Path) -> Result<Value, Error> {
        let program = self.converter.display().to_string();
        let mut cmd = Command::new(&self.converter);
        cmd.arg(path);
        let output = transport::capture(&mut cmd, &program).map_err(|e| {
            return Error::DecodeFailed {
                path: path.to_path_buf(),
                reason: format!("failed to convert CSON: {e}"),
            };
        })?;
        return serde_json::from_slice(&output.stdout).map_err(|e| {
            return Error::DecodeFailed {
                path: path.to_path_buf(),
                reason: format!("converter printed invalid JSON: {e}"),
            };
        });
    }

    /// Create a loader that converts CSON with the given command.
    pub const fn new(converter: PathBuf) -> Self {
        return Self { converter };
    }
}

/// Read and parse a JSON grammar.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read, or `Error::DecodeFailed` on malformed JSON.
fn decode_json(path: &Path) -> Result<Value, Error> {
    let content = std::fs::read(path)?;
    return serde_json::from_slice(&content).map_err(|e| {
        return Error::DecodeFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
    });
}

/// Parse an XML or binary property list into a JSON document.
///
/// # Errors
///
/// Returns `Error::DecodeFailed` if the plist is malformed.
fn decode_property_list(path: &Path) -> Result<Value, Error> {
    return plist::from_file(path).map_err(|e: plist::Error| {
        return Error::DecodeFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
    });
}

/// Map a file extension to its grammar format, ignoring case.
///
/// # Errors
///
/// Returns `Error::InvalidDocumentType` for unknown extensions.
pub fn format_for_path(path: &Path) -> Result<GrammarFormat, Error> {
    let ext = path
        .extension()
        .and_then(|e| return e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    return match ext.as_str() {
        "cson" => Ok(GrammarFormat::Cson),
        "json" => Ok(GrammarFormat::Json),
        "plist" | "tmlanguage" => Ok(GrammarFormat::PropertyList),
        _ => Err(Error::InvalidDocumentType {
            path: path.to_path_buf(),
        }),
    };
}

/// Extract the scope a grammar declares for itself.
/// Reads `scopeName`, falling back to the older `scope` key.
///
/// # Errors
///
/// Returns `Error::MissingScope` if neither key holds a string,
/// or `Error::InvalidScope` if the name cannot be used as a file name.
pub fn scope_name(document: &Value, path: &Path) -> Result<String, Error> {
    let scope = document
        .get("scopeName")
        .or_else(|| return document.get("scope"))
        .and_then(Value::as_str)
        .ok_or_else(|| return Error::MissingScope { path: path.to_path_buf() })?;

    let unusable = scope.is_empty()
        || scope == "."
        || scope == ".."
        || scope.contains(['/', '\\'])
        || scope.contains('\0');
    if unusable {
        return Err(Error::InvalidScope {
            path: path.to_path_buf(),
            scope: scope.to_string(),
        });
    }

    return Ok(scope.to_string());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::unwrap_used, reason = "test code")]
mod tests {
    use serde_json::json;

    use super::*;

    const PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>name</key>
    <string>Foo</string>
    <key>scopeName</key>
    <string>source.foo</string>
    <key>fileTypes</key>
    <array>
        <string>foo</string>
    </array>
</dict>
</plist>
"#;

    fn loader() -> FormatLoader {
        return FormatLoader::new(PathBuf::from("cat"));
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(
            format_for_path(Path::new("Foo.tmLanguage")).unwrap(),
            GrammarFormat::PropertyList
        );
        assert_eq!(format_for_path(Path::new("a.JSON")).unwrap(), GrammarFormat::Json);
        assert_eq!(format_for_path(Path::new("a.cson")).unwrap(), GrammarFormat::Cson);
    }

    #[test]
    fn unknown_extension_is_invalid_document_type() {
        let err = loader().decode(Path::new("grammar.yaml")).unwrap_err();
        assert!(matches!(err, Error::InvalidDocumentType { .. }));
        assert!(err.to_string().starts_with("Invalid document type"));
    }

    #[test]
    fn decodes_property_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Foo.tmLanguage");
        std::fs::write(&path, PLIST).unwrap();

        let doc = loader().decode(&path).unwrap();
        assert_eq!(
            doc,
            json!({ "name": "Foo", "scopeName": "source.foo", "fileTypes": ["foo"] })
        );
    }

    #[test]
    fn malformed_json_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"scopeName\": ").unwrap();

        let err = loader().decode(&path).unwrap_err();
        assert!(matches!(err, Error::DecodeFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn cson_goes_through_converter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.cson");
        std::fs::write(&path, r#"{"scopeName": "source.cson"}"#).unwrap();

        let doc = loader().decode(&path).unwrap();
        assert_eq!(doc, json!({ "scopeName": "source.cson" }));
    }

    #[cfg(unix)]
    #[test]
    fn failing_converter_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.cson");
        std::fs::write(&path, "scopeName: 'source.cson'").unwrap();

        let err = FormatLoader::new(PathBuf::from("false")).decode(&path).unwrap_err();
        assert!(matches!(err, Error::DecodeFailed { .. }));
    }

    #[test]
    fn scope_falls_back_to_legacy_key() {
        let doc = json!({ "scope": "source.old" });
        assert_eq!(scope_name(&doc, Path::new("x.json")).unwrap(), "source.old");
    }

    #[test]
    fn missing_scope_is_error() {
        let err = scope_name(&json!({ "name": "x" }), Path::new("x.json")).unwrap_err();
        assert!(matches!(err, Error::MissingScope { .. }));
    }

    #[test]
    fn path_like_scope_is_rejected() {
        let err = scope_name(&json!({ "scopeName": "../etc" }), Path::new("x.json")).unwrap_err();
        assert!(matches!(err, Error::InvalidScope { .. }));
    }
}
