//! Config-file seeding.
//!
//! The worker reads its secret from a per-user `.env` file. On first run that
//! file does not exist, so it is copied from the template shipped in the
//! package and the user is told which key to fill in. This step is advisory:
//! it never fails the launch.
//!
//! [`worker_environment`] reads the file back so its entries reach the
//! worker's environment. Values are passed through as-is; the secret is never
//! checked here.

use std::path::Path;
use tracing::{debug, info, warn};

/// What [`ensure_config`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// The config file already existed; it was left untouched.
    Existing,
    /// The template was copied to the config path.
    Seeded,
    /// Neither config nor template exists.
    NoTemplate,
    /// Copying failed; logged and ignored.
    Failed,
}

/// Make sure `config_path` exists, seeding it from `template_path`.
///
/// Never overwrites an existing file. On seeding, a single warning line
/// naming the file and `secret_key` is written to stderr.
pub fn ensure_config(config_path: &Path, template_path: &Path, secret_key: &str) -> Materialized {
    if config_path.exists() {
        debug!("Config present at {}", config_path.display());
        return Materialized::Existing;
    }
    if !template_path.exists() {
        debug!(
            "No config template at {}; skipping",
            template_path.display()
        );
        return Materialized::NoTemplate;
    }

    let copied = config_path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|_| std::fs::copy(template_path, config_path));

    match copied {
        Ok(_) => {
            info!(
                "Seeded {} from {}",
                config_path.display(),
                template_path.display()
            );
            eprintln!(
                "docmistral: created {} - set {secret_key} in it before converting documents",
                config_path.display()
            );
            Materialized::Seeded
        }
        Err(e) => {
            warn!(
                "Could not create {} from template: {e}",
                config_path.display()
            );
            Materialized::Failed
        }
    }
}

/// Entries of the `.env` file at `config_path` that are not already set in
/// this process's environment.
///
/// A missing or malformed file yields whatever could be read, never an error.
pub fn worker_environment(config_path: &Path) -> Vec<(String, String)> {
    let iter = match dotenvy::from_path_iter(config_path) {
        Ok(iter) => iter,
        Err(e) => {
            debug!("No config loaded from {}: {e}", config_path.display());
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for item in iter {
        match item {
            Ok((key, _)) if std::env::var_os(&key).is_some() => {
                debug!("{key} already set in environment; keeping it");
            }
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!("Stopped reading {}: {e}", config_path.display());
                break;
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn seeds_from_template_verbatim() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join(".env.example");
        let config = dir.path().join("home").join(".env");
        std::fs::write(&template, b"MISTRAL_API_KEY=changeme\n").unwrap();

        assert_eq!(
            ensure_config(&config, &template, "MISTRAL_API_KEY"),
            Materialized::Seeded
        );
        assert_eq!(std::fs::read(&config).unwrap(), b"MISTRAL_API_KEY=changeme\n");
    }

    #[test]
    fn never_overwrites_existing_config() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join(".env.example");
        let config = dir.path().join(".env");
        std::fs::write(&template, "MISTRAL_API_KEY=changeme\n").unwrap();
        std::fs::write(&config, "MISTRAL_API_KEY=real-secret\n").unwrap();

        assert_eq!(
            ensure_config(&config, &template, "MISTRAL_API_KEY"),
            Materialized::Existing
        );
        assert_eq!(
            std::fs::read_to_string(&config).unwrap(),
            "MISTRAL_API_KEY=real-secret\n"
        );
    }

    #[test]
    fn missing_template_is_silent_noop() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join(".env");
        assert_eq!(
            ensure_config(&config, &dir.path().join("nope"), "MISTRAL_API_KEY"),
            Materialized::NoTemplate
        );
        assert!(!config.exists());
    }

    #[test]
    fn worker_environment_reads_entries() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join(".env");
        std::fs::write(
            &config,
            "# comment\nDOCMISTRAL_TEST_ONLY_KEY=abc123\nDOCMISTRAL_TEST_QUOTED=\"a b\"\n",
        )
        .unwrap();

        let entries = worker_environment(&config);
        assert!(entries.contains(&("DOCMISTRAL_TEST_ONLY_KEY".to_string(), "abc123".to_string())));
        assert!(entries.contains(&("DOCMISTRAL_TEST_QUOTED".to_string(), "a b".to_string())));
    }

    #[test]
    fn worker_environment_prefers_process_env() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join(".env");
        // PATH is always set for the test process.
        std::fs::write(&config, "PATH=/nowhere\n").unwrap();
        assert!(worker_environment(&config).is_empty());
    }

    #[test]
    fn worker_environment_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(worker_environment(&dir.path().join(".env")).is_empty());
    }

    #[test]
    fn copy_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join(".env.example");
        std::fs::write(&template, "K=V\n").unwrap();
        // Parent "directory" is a regular file, so create_dir_all fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let config = blocker.join(".env");

        assert_eq!(
            ensure_config(&config, &template, "MISTRAL_API_KEY"),
            Materialized::Failed
        );
    }
}
