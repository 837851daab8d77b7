//! Driver for the two run modes: add one source, or refresh every source.

use std::path::Path;
use std::process::ExitCode;

use crate::config::Config;
use crate::dispatcher;
use crate::error;
use crate::grammar::FormatLoader;
use crate::installer::{InstallReport, Installer};
use crate::manifest::Manifest;
use crate::registry::ScopeRegistry;
use crate::source::PackageSource;
use crate::transport::{self, Transport};

/// Collaborators every mode needs, built once from the config.
struct Environment {
    /// Loaded settings.
    config: Config,
    /// Decoder for candidate grammar files.
    loader: FormatLoader,
    /// Download settings.
    transport: Transport,
}

/// Fetch and install a single descriptor, then merge its scopes into the manifest.
///
/// Scopes already listed under other origins stay claimed by them. A missing
/// manifest is treated as empty, so this also bootstraps a new one.
///
/// # Errors
///
/// Returns config, preparation, or manifest errors, and any installer error
/// for the source. The manifest is left untouched on failure.
pub fn add(root: &Path, descriptor: &str) -> Result<ExitCode, error::Error> {
    let env = prepare_environment(root)?;

    let base = match Manifest::read(&env.config.manifest) {
        Err(error::Error::ManifestNotFound { .. }) => Manifest::default(),
        Err(e) => return Err(e),
        Ok(m) => m,
    };

    let origin = PackageSource::resolve(descriptor)?.origin();
    let registry = ScopeRegistry::seeded(&base, &origin);
    let installer = Installer {
        decoder: &env.loader,
        output: &env.config.output,
        registry: &registry,
        transport: &env.transport,
    };

    let workdir = tempfile::Builder::new().prefix("grammar-sync-").tempdir()?;
    let report = installer.install(workdir.path(), descriptor)?;
    workdir.close()?;
    print_duplicate_report(std::slice::from_ref(&report));

    let manifest = Manifest::build(&registry.snapshot(), &base);
    manifest.write(&env.config.manifest)?;

    println!("Done");
    return Ok(ExitCode::SUCCESS);
}

/// Print how many duplicate scopes were skipped. Each one was already logged
/// as a warning when it was found.
fn print_duplicate_report(reports: &[InstallReport]) {
    let skipped: usize = reports.iter().map(|r| return r.duplicates.len()).sum();
    if skipped == 0 {
        return;
    }

    eprintln!("{skipped} duplicated scopes skipped");
    return;
}

/// Load config, create the output directory, and run the preparation command.
///
/// # Errors
///
/// Returns config errors, `Error::Io` if the output directory can't be created,
/// or `Error::CommandFailed` if preparation fails.
fn prepare_environment(root: &Path) -> Result<Environment, error::Error> {
    let config = Config::load(root)?;
    std::fs::create_dir_all(&config.output)?;
    transport::prepare(&config.prepare, root)?;

    return Ok(Environment {
        loader: FormatLoader::new(config.converter.clone()),
        transport: Transport::new(config.archive_timeout, config.grammar_timeout),
        config,
    });
}

/// Re-fetch every origin in the manifest concurrently and rebuild it from scratch.
///
/// Origins that fail or produce nothing disappear from the rewritten manifest.
/// Exits non-zero when any source failed, after the manifest is written.
///
/// # Errors
///
/// Returns `Error::ManifestNotFound` if there is no manifest, config or
/// preparation errors, or dispatch-level failures.
pub fn refresh(root: &Path) -> Result<ExitCode, error::Error> {
    let env = prepare_environment(root)?;
    let previous = Manifest::read(&env.config.manifest)?;
    let descriptors = previous.descriptors();

    let registry = ScopeRegistry::new();
    let installer = Installer {
        decoder: &env.loader,
        output: &env.config.output,
        registry: &registry,
        transport: &env.transport,
    };

    tracing::info!(sources = descriptors.len(), workers = env.config.workers, "refreshing");
    let summary = dispatcher::dispatch(&descriptors, &installer, env.config.workers)?;
    tracing::info!(registered = registry.scope_count(), "dispatch finished");

    let manifest = Manifest::build(&registry.snapshot(), &Manifest::default());
    manifest.write(&env.config.manifest)?;
    tracing::info!(
        scopes = manifest.scope_count(),
        sources = manifest.sources.len(),
        "manifest written"
    );

    print_duplicate_report(&summary.reports);
    for (descriptor, e) in &summary.failures {
        eprintln!("error: {descriptor}: {e}");
    }

    println!("Done");
    if summary.failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    return Ok(ExitCode::FAILURE);
}
