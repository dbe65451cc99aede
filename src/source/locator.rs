//! Source locators and the allow-list that gates them.

use std::fmt;
use std::path::{Path, PathBuf};

use ureq::http::Uri;

use crate::error::{PipelineError, PipelineResult};

/// Domain allowed when no policy is configured.
pub const DEFAULT_ALLOWED_DOMAIN: &str = "huggingface.co";

/// Where a job reads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// A file on the local filesystem.
    Local(PathBuf),
    /// An `https` URL; `host` is the lower-cased authority host.
    Remote { url: String, host: String },
}

impl SourceLocator {
    /// Parse a locator string. `http(s)://` strings are remote, anything else is a local path.
    ///
    /// Only `https` is accepted for remote locators.
    pub fn parse(locator: &str) -> PipelineResult<Self> {
        let lower = locator.to_ascii_lowercase();
        if !(lower.starts_with("https://") || lower.starts_with("http://")) {
            if locator.trim().is_empty() {
                return Err(invalid(locator, "empty locator"));
            }
            return Ok(Self::Local(PathBuf::from(locator)));
        }

        let uri: Uri = locator
            .parse()
            .map_err(|e| invalid(locator, format!("malformed url: {e}")))?;
        if uri.scheme_str() != Some("https") {
            return Err(invalid(locator, "only https urls are accepted"));
        }
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(locator, "url has no host"))?
            .to_ascii_lowercase();
        Ok(Self::Remote {
            url: locator.to_owned(),
            host,
        })
    }

    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::Local(path.as_ref().to_path_buf())
    }

    /// Last path segment (query string removed), used for format inference.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote { url, .. } => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_owned)
            }
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote { url, .. } => f.write_str(url),
        }
    }
}

/// Allow-list of remote domains and local path prefixes a job may read from.
///
/// A domain entry admits the domain itself and its subdomains. Local paths are canonicalized
/// before the prefix comparison, so `..` segments and symlinks cannot escape a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    allowed_domains: Vec<String>,
    allowed_path_prefixes: Vec<PathBuf>,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            allowed_domains: vec![DEFAULT_ALLOWED_DOMAIN.to_owned()],
            allowed_path_prefixes: Vec::new(),
        }
    }
}

impl SourcePolicy {
    /// A policy that allows nothing.
    pub fn deny_all() -> Self {
        Self {
            allowed_domains: Vec::new(),
            allowed_path_prefixes: Vec::new(),
        }
    }

    pub fn allow_domain(mut self, domain: impl AsRef<str>) -> Self {
        let domain = domain.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
        if !domain.is_empty() && !self.allowed_domains.contains(&domain) {
            self.allowed_domains.push(domain);
        }
        self
    }

    pub fn allow_path_prefix(mut self, prefix: impl AsRef<Path>) -> Self {
        self.allowed_path_prefixes.push(prefix.as_ref().to_path_buf());
        self
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn allowed_path_prefixes(&self) -> &[PathBuf] {
        &self.allowed_path_prefixes
    }

    /// Check a locator against the allow-list.
    ///
    /// Remote locators are checked without touching the network. Local locators are
    /// canonicalized, which requires the path to exist.
    pub fn check(&self, locator: &SourceLocator) -> PipelineResult<()> {
        match locator {
            SourceLocator::Remote { host, .. } => {
                let allowed = self
                    .allowed_domains
                    .iter()
                    .any(|d| host == d || host.ends_with(&format!(".{d}")));
                if allowed {
                    Ok(())
                } else {
                    Err(invalid(
                        locator,
                        format!("host '{host}' is not in the allowed domains {:?}", self.allowed_domains),
                    ))
                }
            }
            SourceLocator::Local(path) => {
                if self.allowed_path_prefixes.is_empty() {
                    return Err(invalid(locator, "local sources are not allowed by this policy"));
                }
                let resolved = path
                    .canonicalize()
                    .map_err(|e| invalid(locator, format!("cannot resolve path: {e}")))?;
                let allowed = self.allowed_path_prefixes.iter().any(|prefix| {
                    prefix
                        .canonicalize()
                        .map(|p| resolved.starts_with(p))
                        .unwrap_or(false)
                });
                if allowed {
                    Ok(())
                } else {
                    Err(invalid(locator, "path is outside the allowed prefixes"))
                }
            }
        }
    }
}

fn invalid(locator: impl fmt::Display, reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidSource {
        locator: locator.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(url: &str) -> SourceLocator {
        SourceLocator::parse(url).unwrap()
    }

    #[test]
    fn default_policy_admits_huggingface_and_subdomains() {
        let policy = SourcePolicy::default();
        policy
            .check(&remote("https://huggingface.co/datasets/Dustinhax/tyt/resolve/main/x.parquet"))
            .unwrap();
        policy.check(&remote("https://cdn-lfs.huggingface.co/a.csv")).unwrap();
    }

    #[test]
    fn lookalike_domains_are_rejected() {
        let policy = SourcePolicy::default();
        for url in [
            "https://evilhuggingface.co/x.csv",
            "https://huggingface.co.evil.com/x.csv",
            "https://example.com/x.csv",
        ] {
            let err = policy.check(&remote(url)).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidSource { .. }), "{url}: {err}");
        }
    }

    #[test]
    fn plain_http_is_rejected_at_parse_time() {
        let err = SourceLocator::parse("http://huggingface.co/x.csv").unwrap_err();
        assert!(err.to_string().contains("only https"));
    }

    #[test]
    fn local_paths_need_a_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.csv");
        std::fs::write(&file, "a\n1\n").unwrap();
        let locator = SourceLocator::local(&file);

        assert!(SourcePolicy::default().check(&locator).is_err());
        SourcePolicy::default()
            .allow_path_prefix(dir.path())
            .check(&locator)
            .unwrap();
    }

    #[test]
    fn dot_dot_cannot_escape_a_prefix() {
        let root = tempfile::tempdir().unwrap();
        let allowed = root.path().join("allowed");
        std::fs::create_dir(&allowed).unwrap();
        std::fs::write(root.path().join("secret.csv"), "a\n").unwrap();

        let sneaky = SourceLocator::local(allowed.join("..").join("secret.csv"));
        let err = SourcePolicy::deny_all()
            .allow_path_prefix(&allowed)
            .check(&sneaky)
            .unwrap_err();
        assert!(err.to_string().contains("outside the allowed prefixes"));
    }

    #[test]
    fn file_name_ignores_query_string() {
        let loc = remote("https://huggingface.co/d/contribDB_1980.csv.gz?download=true");
        assert_eq!(loc.file_name().as_deref(), Some("contribDB_1980.csv.gz"));
    }
}
