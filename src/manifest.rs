//! Manifest persistence and rebuilding: which scopes each origin produced.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Origin identifier -> sorted scope names. Keys are kept sorted by the
/// `BTreeMap`, so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    /// Scopes produced by each origin.
    pub sources: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Rebuild a manifest from registered scopes, merged onto `base`.
    ///
    /// Each scope is appended to its origin's list in `base`, then every list
    /// is sorted and deduplicated. Pure: the same inputs give the same output.
    pub fn build(registry: &HashMap<String, String>, base: &Self) -> Self {
        let mut sources = base.sources.clone();
        for (scope, origin) in registry {
            sources.entry(origin.clone()).or_default().push(scope.clone());
        }
        for scopes in sources.values_mut() {
            scopes.sort();
            scopes.dedup();
        }
        return Self { sources };
    }

    /// Origins in manifest order, used as descriptors for a refresh.
    pub fn descriptors(&self) -> Vec<String> {
        return self.sources.keys().cloned().collect();
    }

    /// Parse a manifest from TOML content.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the content is not a table of string arrays.
    pub fn parse(content: &str) -> Result<Self, Error> {
        return Ok(toml::from_str(content)?);
    }

    /// Read and parse a manifest from disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::ManifestNotFound` if the file doesn't exist,
    /// `Error::Io` for other read failures,
    /// or `Error::TomlDe` if the content is invalid.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ManifestNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&content);
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlSer` if serialization fails.
    pub fn serialize(&self) -> Result<String, Error> {
        return Ok(toml::to_string_pretty(self)?);
    }

    /// Number of scopes across all origins.
    pub fn scope_count(&self) -> usize {
        return self.sources.values().map(Vec::len).sum();
    }

    /// Write the manifest to disk, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlSer` if serialization fails,
    /// or `Error::Io` if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let content = self.serialize()?;
        std::fs::write(path, content)?;
        return Ok(());
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::unwrap_used, reason = "test code")]
mod tests {
    use super::*;

    fn registry(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        return pairs
            .iter()
            .map(|(scope, origin)| ((*scope).to_string(), (*origin).to_string()))
            .collect();
    }

    #[test]
    fn inverts_and_sorts() {
        let registry = registry(&[
            ("source.zed", "https://github.com/b/z"),
            ("source.alpha", "https://github.com/b/z"),
            ("source.mid", "https://github.com/a/m"),
        ]);
        let manifest = Manifest::build(&registry, &Manifest::default());

        assert_eq!(manifest.descriptors(), vec!["https://github.com/a/m", "https://github.com/b/z"]);
        assert_eq!(
            manifest.sources["https://github.com/b/z"],
            vec!["source.alpha", "source.zed"]
        );
        assert_eq!(manifest.scope_count(), 3);
    }

    #[test]
    fn rebuild_is_byte_identical() {
        let registry = registry(&[("source.b", "y"), ("source.a", "x"), ("source.c", "x")]);
        let first = Manifest::build(&registry, &Manifest::default()).serialize().unwrap();
        let second = Manifest::build(&registry, &Manifest::default()).serialize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn add_mode_merges_into_base() {
        let base = Manifest {
            sources: BTreeMap::from([("a".to_string(), vec!["x".to_string()])]),
        };
        let manifest = Manifest::build(&registry(&[("y", "b")]), &base);
        assert_eq!(
            manifest.sources,
            BTreeMap::from([
                ("a".to_string(), vec!["x".to_string()]),
                ("b".to_string(), vec!["y".to_string()]),
            ])
        );
    }

    #[test]
    fn seeded_scopes_are_not_duplicated() {
        let base = Manifest {
            sources: BTreeMap::from([("a".to_string(), vec!["x".to_string()])]),
        };
        let manifest = Manifest::build(&registry(&[("x", "a"), ("w", "a")]), &base);
        assert_eq!(manifest.sources["a"], vec!["w", "x"]);
    }

    #[test]
    fn parses_quoted_origin_keys() {
        let content = "\"https://github.com/u/r\" = [\"source.r\"]\n\"vendor/foo\" = []\n";
        let manifest = Manifest::parse(content).unwrap();
        assert_eq!(manifest.sources["https://github.com/u/r"], vec!["source.r"]);
        assert!(manifest.sources["vendor/foo"].is_empty());
        assert_eq!(Manifest::parse(&manifest.serialize().unwrap()).unwrap(), manifest);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::read(&dir.path().join("grammars.toml")).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound { .. }));
    }
}
