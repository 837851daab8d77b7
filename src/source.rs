//! Package sources: where a grammar collection comes from and how to fetch it.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Error;
use crate::transport::{self, Transport};

/// Ref used for GitHub archives when the descriptor names none.
const DEFAULT_REF: &str = "master";

/// Prefix of descriptors fetched as GitHub repository archives.
const GITHUB_PREFIX: &str = "https://github.com";

/// Lowercased suffixes of files that are a grammar on their own.
const GRAMMAR_SUFFIXES: [&str; 4] = [".cson", ".json", ".plist", ".tmlanguage"];

/// Prefix of descriptors fetched with `svn export`.
const SVN_PREFIX: &str = "http://svn.textmate.org";

/// Suffix of descriptors fetched as generic tarballs.
const TARBALL_SUFFIX: &str = ".tar.gz";

/// A GitHub repository pinned to a ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    /// Branch, tag, or commit to download.
    pub reference: String,
    /// Repository name without any `.git` suffix.
    pub repo: String,
    /// Owning user or organization.
    pub user: String,
}

/// One retrieval mechanism together with the location it retrieves from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Archive of a GitHub repository at a ref.
    GitHub(GitHubRepo),
    /// Local directory searched for grammar files.
    LocalDirectory(PathBuf),
    /// Local file that is itself a grammar.
    LocalFile(PathBuf),
    /// URL of a single grammar file.
    RemoteGrammar(String),
    /// Subversion repository whose `Syntaxes` directory holds the grammars.
    Subversion(String),
    /// URL of a `.tar.gz` archive.
    Tarball(String),
}

/// Which [`PackageSource`] variant handles a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// See [`PackageSource::GitHub`].
    GitHub,
    /// See [`PackageSource::LocalDirectory`].
    LocalDirectory,
    /// See [`PackageSource::LocalFile`].
    LocalFile,
    /// See [`PackageSource::RemoteGrammar`].
    RemoteGrammar,
    /// See [`PackageSource::Subversion`].
    Subversion,
    /// See [`PackageSource::Tarball`].
    Tarball,
}

impl GitHubRepo {
    /// URL of the `.tar.gz` archive GitHub serves for this ref.
    pub fn archive_url(&self) -> String {
        return format!(
            "{GITHUB_PREFIX}/{}/{}/archive/{}.tar.gz",
            self.user, self.repo, self.reference
        );
    }

    /// Display form of the repository. The ref is only spelled out when it isn't `master`.
    pub fn canonical_url(&self) -> String {
        let base = format!("{GITHUB_PREFIX}/{}/{}", self.user, self.repo);
        if self.reference == DEFAULT_REF {
            return base;
        }
        return format!("{base}@{}", self.reference);
    }

    /// Parse `https://github.com/<user>/<repo>[.git][@ref]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedSource` if the URL is malformed or lacks
    /// a user or repository segment.
    pub fn parse(descriptor: &str) -> Result<Self, Error> {
        let unsupported = || {
            return Error::UnsupportedSource {
                descriptor: descriptor.to_string(),
            };
        };

        let (location, reference) = match descriptor.split_once('@') {
            None => (descriptor, DEFAULT_REF),
            Some((location, "")) => (location, DEFAULT_REF),
            Some((location, reference)) => (location, reference),
        };

        let parsed = url::Url::parse(location).map_err(|_err| return unsupported())?;
        let mut segments = parsed
            .path_segments()
            .ok_or_else(unsupported)?
            .filter(|s| return !s.is_empty());
        let user = segments.next().ok_or_else(unsupported)?;
        let repo = segments.next().ok_or_else(unsupported)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if repo.is_empty() {
            return Err(unsupported());
        }

        return Ok(Self {
            reference: reference.to_string(),
            repo: repo.to_string(),
            user: user.to_string(),
        });
    }
}

impl PackageSource {
    /// Retrieve the source into `workdir` and list its candidate grammar files.
    ///
    /// Local sources are read in place. Remote sources are downloaded below `workdir`,
    /// which must exist and belong to this unit of work alone.
    ///
    /// # Errors
    ///
    /// Returns `Error::RetrievalFailed` naming the origin if any download,
    /// extraction, or export fails, or if a local source does not exist.
    pub fn fetch(&self, workdir: &Path, transport: &Transport) -> Result<Vec<PathBuf>, Error> {
        let origin = self.origin();
        let retrieval_failed = |e: Error| {
            return Error::RetrievalFailed {
                origin: origin.clone(),
                reason: e.to_string(),
            };
        };

        return match self {
            Self::GitHub(repo) => fetch_tarball(&repo.archive_url(), workdir, transport)
                .map_err(retrieval_failed),
            Self::LocalDirectory(dir) => {
                if !dir.is_dir() {
                    return Err(retrieval_failed(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "directory does not exist",
                    ))));
                }
                Ok(collect_grammar_files(dir))
            },
            Self::LocalFile(path) => {
                if !path.is_file() {
                    return Err(retrieval_failed(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "file does not exist",
                    ))));
                }
                Ok(vec![path.clone()])
            },
            Self::RemoteGrammar(url) => {
                let dest = workdir.join(remote_file_name(url));
                transport
                    .download_grammar(url, &dest)
                    .map_err(retrieval_failed)?;
                Ok(vec![dest])
            },
            Self::Subversion(url) => {
                let dest = workdir.join("Syntaxes");
                transport::svn_export(&format!("{url}/Syntaxes"), &dest)
                    .map_err(retrieval_failed)?;
                Ok(collect_syntaxes(&dest))
            },
            Self::Tarball(url) => fetch_tarball(url, workdir, transport).map_err(retrieval_failed),
        };
    }

    /// Canonical display identifier, used as the manifest key.
    pub fn origin(&self) -> String {
        return match self {
            Self::GitHub(repo) => repo.canonical_url(),
            Self::LocalDirectory(path) | Self::LocalFile(path) => path.display().to_string(),
            Self::RemoteGrammar(url) | Self::Subversion(url) | Self::Tarball(url) => url.clone(),
        };
    }

    /// Classify a descriptor and build the matching source.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedSource` if no rule matches or a GitHub URL is malformed.
    pub fn resolve(descriptor: &str) -> Result<Self, Error> {
        return Ok(match classify(descriptor)? {
            SourceKind::GitHub => Self::GitHub(GitHubRepo::parse(descriptor)?),
            SourceKind::LocalDirectory => Self::LocalDirectory(PathBuf::from(descriptor)),
            SourceKind::LocalFile => Self::LocalFile(PathBuf::from(descriptor)),
            SourceKind::RemoteGrammar => Self::RemoteGrammar(descriptor.to_string()),
            SourceKind::Subversion => Self::Subversion(descriptor.to_string()),
            SourceKind::Tarball => Self::Tarball(descriptor.to_string()),
        });
    }
}

/// Decide which source variant handles a descriptor, from its text alone.
///
/// # Errors
///
/// Returns `Error::UnsupportedSource` for remote descriptors matching no rule.
pub fn classify(descriptor: &str) -> Result<SourceKind, Error> {
    let is_remote = descriptor.starts_with("http:") || descriptor.starts_with("https:");
    let single_file = has_grammar_suffix(descriptor);

    if !is_remote {
        return Ok(if single_file { SourceKind::LocalFile } else { SourceKind::LocalDirectory });
    }
    if single_file {
        return Ok(SourceKind::RemoteGrammar);
    }
    if descriptor.starts_with(GITHUB_PREFIX) {
        return Ok(SourceKind::GitHub);
    }
    if descriptor.starts_with(SVN_PREFIX) {
        return Ok(SourceKind::Subversion);
    }
    if descriptor.ends_with(TARBALL_SUFFIX) {
        return Ok(SourceKind::Tarball);
    }
    return Err(Error::UnsupportedSource {
        descriptor: descriptor.to_string(),
    });
}

/// Walk a directory tree and keep files that sit where grammars live.
/// Entries are visited in file-name order so the result is stable.
pub fn collect_grammar_files(dir: &Path) -> Vec<PathBuf> {
    return WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file() && is_grammar_candidate(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
}

/// List property-list grammars directly inside an exported `Syntaxes` directory.
fn collect_syntaxes(dir: &Path) -> Vec<PathBuf> {
    return WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            return e.file_type().is_file()
                && matches!(lowercase_extension(e.path()).as_deref(), Some("plist" | "tmlanguage"));
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
}

/// Download an archive into `workdir`, unpack it, and search the unpacked tree.
///
/// # Errors
///
/// Returns `Error::CommandFailed` or `Error::Io` from download or extraction.
fn fetch_tarball(url: &str, workdir: &Path, transport: &Transport) -> Result<Vec<PathBuf>, Error> {
    let archive = workdir.join("archive");
    let extracted = workdir.join("extracted");

    transport.download_archive(url, &archive)?;
    transport::extract(&archive, &extracted)?;

    return Ok(collect_grammar_files(&extracted));
}

/// True if the descriptor names a single grammar file.
fn has_grammar_suffix(descriptor: &str) -> bool {
    let lower = descriptor.to_ascii_lowercase();
    return GRAMMAR_SUFFIXES.iter().any(|suffix| return lower.ends_with(suffix));
}

/// Location rules for grammar files inside a package tree:
/// property lists must sit in `Syntaxes/`, CSON and JSON in `grammars/`,
/// and `.tmLanguage` files are accepted anywhere.
fn is_grammar_candidate(path: &Path) -> bool {
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| return name.to_str());

    return match lowercase_extension(path).as_deref() {
        Some("cson" | "json") => parent == Some("grammars"),
        Some("plist") => parent == Some("Syntaxes"),
        Some("tmlanguage") => true,
        _ => false,
    };
}

/// File extension, lowercased.
fn lowercase_extension(path: &Path) -> Option<String> {
    return path
        .extension()
        .and_then(|e| return e.to_str())
        .map(str::to_ascii_lowercase);
}

/// Local file name for a downloaded grammar: the last path segment of its URL.
fn remote_file_name(url: &str) -> &str {
    return url.rsplit('/').next().unwrap_or(url);
}
