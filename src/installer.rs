//! Fetch one package source and install its grammars under their scope names.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::Error;
use crate::grammar::{self, Decode};
use crate::registry::{Registration, ScopeRegistry};
use crate::source::PackageSource;
use crate::transport::Transport;

/// A scope skipped because another origin already claimed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    /// Origin holding the scope.
    pub existing: String,
    /// The contested scope name.
    pub scope: String,
}

/// What one source contributed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Scopes skipped as duplicates, in candidate order.
    pub duplicates: Vec<Duplicate>,
    /// Scopes newly written to the output directory, in candidate order.
    pub installed: Vec<String>,
    /// Canonical origin identifier of the source.
    pub origin: String,
}

/// Everything needed to install a source, shared by all workers of a run.
pub struct Installer<'a> {
    /// Grammar decoder for candidate files.
    pub decoder: &'a dyn Decode,
    /// Directory receiving `<scope>.json` files.
    pub output: &'a Path,
    /// Run-wide scope registry.
    pub registry: &'a ScopeRegistry,
    /// Download settings for remote sources.
    pub transport: &'a Transport,
}

impl Installer<'_> {
    /// Resolve, fetch, decode, and register every grammar of one source.
    ///
    /// Every candidate is decoded before anything is registered, so a source
    /// either installs all its scopes or none. Duplicate scopes are skipped
    /// with a warning, keeping the first registrant. Prints one summary line
    /// for the source on success.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedSource` if the descriptor can't be resolved,
    /// `Error::RetrievalFailed` if fetching fails, or any decode, scope, or
    /// write error for a candidate file. On error the source's registrations
    /// and written files are removed again.
    pub fn install(&self, workdir: &Path, descriptor: &str) -> Result<InstallReport, Error> {
        let source = PackageSource::resolve(descriptor)?;
        let origin = source.origin();
        tracing::debug!(%origin, workdir = %workdir.display(), "fetching");

        let candidates = source.fetch(workdir, self.transport)?;
        let grammars = candidates
            .iter()
            .map(|path| return self.load(path))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut report = InstallReport {
            duplicates: Vec::new(),
            installed: Vec::new(),
            origin,
        };
        for (scope, document) in grammars {
            if let Err(e) = self.install_grammar(scope, &document, &mut report) {
                self.roll_back(&report);
                return Err(e);
            }
        }

        if report.installed.is_empty() {
            println!("{}: (none)", report.origin);
        } else {
            println!("{}: {}", report.origin, report.installed.join(", "));
        }
        return Ok(report);
    }

    /// Register one decoded grammar and write it if its scope is unclaimed.
    ///
    /// # Errors
    ///
    /// Returns serialization or I/O errors. The scope is already recorded in
    /// `report.installed` when they occur.
    fn install_grammar(&self, scope: String, document: &Value, report: &mut InstallReport) -> Result<(), Error> {
        match self.registry.register(&scope, &report.origin) {
            Registration::Duplicate { existing } => {
                tracing::warn!(
                    %scope,
                    current = %report.origin,
                    previous = %existing,
                    "duplicated scope, keeping previous package"
                );
                report.duplicates.push(Duplicate { existing, scope });
            },
            Registration::Installed => {
                let path = self.output_path(&scope);
                report.installed.push(scope);
                let mut json = serde_json::to_string_pretty(document)?;
                json.push('\n');
                std::fs::write(path, json)?;
            },
        }

        return Ok(());
    }

    /// Decode one candidate file and extract its scope name.
    ///
    /// # Errors
    ///
    /// Returns decode or scope errors.
    fn load(&self, path: &Path) -> Result<(String, Value), Error> {
        let document = self.decoder.decode(path)?;
        let scope = grammar::scope_name(&document, path)?;
        return Ok((scope, document));
    }

    /// Output file for a scope.
    fn output_path(&self, scope: &str) -> PathBuf {
        return self.output.join(format!("{scope}.json"));
    }

    /// Undo a partially installed source: release its scopes and delete their files.
    fn roll_back(&self, report: &InstallReport) {
        self.registry.release(&report.installed, &report.origin);
        for scope in &report.installed {
            match std::fs::remove_file(self.output_path(scope)) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    tracing::warn!(%scope, error = %e, "could not remove partial install");
                },
                _ => {},
            }
        }
        return;
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::unwrap_used, reason = "test code")]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::grammar::FormatLoader;

    fn transport() -> Transport {
        return Transport::new(Duration::from_secs(30), Duration::from_secs(10));
    }

    fn write_grammar(root: &Path, relative: &str, document: &Value) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string(document).unwrap()).unwrap();
        return path;
    }

    #[test]
    fn installed_file_matches_decoded_document() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let document = json!({
            "scopeName": "source.foo",
            "patterns": [{ "match": "\\bfoo\\b", "name": "keyword.foo" }],
        });
        let path = write_grammar(src.path(), "foo.json", &document);

        let loader = FormatLoader::new(PathBuf::from("cat"));
        let registry = ScopeRegistry::new();
        let transport = transport();
        let installer = Installer {
            decoder: &loader,
            output: out.path(),
            registry: &registry,
            transport: &transport,
        };

        let report = installer.install(src.path(), path.to_str().unwrap()).unwrap();
        assert_eq!(report.installed, vec!["source.foo"]);

        let written = std::fs::read_to_string(out.path().join("source.foo.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&written).unwrap(), document);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
    }

    #[test]
    fn duplicate_scope_keeps_first_origin() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let first = write_grammar(src.path(), "a/grammars/one.json", &json!({ "scopeName": "source.dup", "name": "first" }));
        let second = write_grammar(src.path(), "b/grammars/two.json", &json!({ "scopeName": "source.dup", "name": "second" }));

        let loader = FormatLoader::new(PathBuf::from("cat"));
        let registry = ScopeRegistry::new();
        let transport = transport();
        let installer = Installer {
            decoder: &loader,
            output: out.path(),
            registry: &registry,
            transport: &transport,
        };

        let winner = installer.install(src.path(), first.to_str().unwrap()).unwrap();
        let loser = installer.install(src.path(), second.to_str().unwrap()).unwrap();

        assert_eq!(winner.installed, vec!["source.dup"]);
        assert!(loser.installed.is_empty());
        assert_eq!(
            loser.duplicates,
            vec![Duplicate { existing: winner.origin.clone(), scope: "source.dup".to_string() }]
        );

        let written = std::fs::read_to_string(out.path().join("source.dup.json")).unwrap();
        let written: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(written["name"], "first");
    }

    #[test]
    fn unresolvable_and_missing_sources_fail() {
        let out = tempfile::tempdir().unwrap();
        let loader = FormatLoader::new(PathBuf::from("cat"));
        let registry = ScopeRegistry::new();
        let transport = transport();
        let installer = Installer {
            decoder: &loader,
            output: out.path(),
            registry: &registry,
            transport: &transport,
        };

        let err = installer.install(out.path(), "https://example.com/page").unwrap_err();
        assert!(matches!(err, Error::UnsupportedSource { .. }));

        // Not remote, so it resolves as a local directory that isn't there.
        let err = installer.install(out.path(), "ftp://example.com/x").unwrap_err();
        assert!(matches!(err, Error::RetrievalFailed { .. }));
    }

    #[test]
    fn undecodable_candidate_installs_nothing() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_grammar(src.path(), "pkg/grammars/a.json", &json!({ "scopeName": "source.half" }));
        std::fs::write(src.path().join("pkg/grammars/b.json"), "{ not json").unwrap();

        let loader = FormatLoader::new(PathBuf::from("cat"));
        let registry = ScopeRegistry::new();
        let transport = transport();
        let installer = Installer {
            decoder: &loader,
            output: out.path(),
            registry: &registry,
            transport: &transport,
        };

        let pkg = src.path().join("pkg");
        let err = installer.install(src.path(), pkg.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::DecodeFailed { .. }));
        assert_eq!(registry.scope_count(), 0);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_write_releases_claimed_scopes() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_grammar(src.path(), "pkg/grammars/a.json", &json!({ "scopeName": "source.a" }));
        write_grammar(src.path(), "pkg/grammars/b.json", &json!({ "scopeName": "source.b" }));

        let loader = FormatLoader::new(PathBuf::from("cat"));
        let registry = ScopeRegistry::new();
        let transport = transport();
        let missing_output = out.path().join("absent");
        let installer = Installer {
            decoder: &loader,
            output: &missing_output,
            registry: &registry,
            transport: &transport,
        };

        let pkg = src.path().join("pkg");
        let err = installer.install(src.path(), pkg.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(registry.scope_count(), 0);
    }
}
