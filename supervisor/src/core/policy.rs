//! Declarative sandbox policy for one worker session.
//!
//! This is a translation step only: the document is handed to the external
//! enforcement runtime, which interprets and enforces it. Nothing here
//! touches the network or the filesystem.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Domains the worker may reach: source hosting, the agent API, and the two
/// package registries the worker installs from.
const ALLOWED_DOMAINS: &[&str] = &[
    "github.com",
    "*.github.com",
    "api.anthropic.com",
    "registry.npmjs.org",
    "pypi.org",
    "*.pypi.org",
];

/// Explicitly denied even if an allow pattern would match.
const DENIED_DOMAINS: &[&str] = &["169.254.169.254"];

/// Home-directory subpaths the worker must never read.
const DENIED_HOME_SUBPATHS: &[&str] = &[".ssh", ".aws", ".gnupg", ".config/gcloud", ".kube"];

/// File-name globs the worker must never write, anywhere.
const DENIED_WRITE_GLOBS: &[&str] = &["*.pem", "*.key", ".env*", "*credentials*", "id_rsa*"];

/// Isolation policy handed to the sandbox enforcement runtime.
///
/// Immutable per session: generated fresh at session start and never mutated
/// while the worker runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub allowed_domains: Vec<String>,
    pub denied_domains: Vec<String>,
    pub denied_read_paths: Vec<String>,
    pub allowed_write_roots: Vec<String>,
    pub denied_write_globs: Vec<String>,
}

/// Build the policy document for a session.
///
/// Pure function of the invoking user's home directory and the project root.
pub fn materialize(home_dir: &Path, project_root: &Path) -> SandboxPolicy {
    SandboxPolicy {
        allowed_domains: ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        denied_domains: DENIED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        denied_read_paths: DENIED_HOME_SUBPATHS
            .iter()
            .map(|sub| home_dir.join(sub).display().to_string())
            .collect(),
        allowed_write_roots: vec![
            project_root.display().to_string(),
            "/tmp".to_string(),
        ],
        denied_write_globs: DENIED_WRITE_GLOBS.iter().map(|g| g.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn policy_allows_registries_and_agent_api() {
        let policy = materialize(&PathBuf::from("/home/dev"), &PathBuf::from("/work/project"));
        assert!(policy.allowed_domains.iter().any(|d| d == "github.com"));
        assert!(
            policy
                .allowed_domains
                .iter()
                .any(|d| d == "api.anthropic.com")
        );
        assert!(
            policy
                .allowed_domains
                .iter()
                .any(|d| d == "registry.npmjs.org")
        );
        assert!(policy.allowed_domains.iter().any(|d| d == "pypi.org"));
    }

    #[test]
    fn policy_denies_sensitive_home_subpaths() {
        let policy = materialize(&PathBuf::from("/home/dev"), &PathBuf::from("/work/project"));
        assert!(
            policy
                .denied_read_paths
                .iter()
                .any(|p| p == "/home/dev/.ssh")
        );
        assert!(
            policy
                .denied_read_paths
                .iter()
                .any(|p| p == "/home/dev/.aws")
        );
    }

    #[test]
    fn policy_limits_writes_to_project_and_tmp() {
        let policy = materialize(&PathBuf::from("/home/dev"), &PathBuf::from("/work/project"));
        assert_eq!(policy.allowed_write_roots, vec!["/work/project", "/tmp"]);
        assert!(policy.denied_write_globs.iter().any(|g| g == "*.pem"));
    }

    #[test]
    fn policy_is_deterministic() {
        let home = PathBuf::from("/home/dev");
        let root = PathBuf::from("/work/project");
        assert_eq!(materialize(&home, &root), materialize(&home, &root));
    }
}
