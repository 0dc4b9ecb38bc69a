// publisher-core/src/domain/location.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const ARCHIVE_SUFFIX: &str = ".zip";

/// Where a package comes from. Classified once when the manifest is parsed so
/// acquisition matches on a closed type instead of re-testing prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Location {
    Local(PathBuf),
    Archive(PathBuf),
    GitRemote(GitRemote),
    ObjectStore(ObjectStoreUri),
    /// Kept so that a bad location only fails its own project at acquisition.
    Invalid { raw: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitProtocol {
    Https,
    Ssh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemote {
    pub protocol: GitProtocol,
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub git_ref: Option<String>,
    pub subpath: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScheme {
    S3,
    Gcs,
}

impl StoreScheme {
    pub fn prefix(&self) -> &'static str {
        match self {
            StoreScheme::S3 => "s3://",
            StoreScheme::Gcs => "gs://",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreUri {
    pub scheme: StoreScheme,
    pub bucket: String,
    /// Key prefix without leading or trailing slashes. Empty means the whole bucket.
    pub prefix: String,
}

impl ObjectStoreUri {
    pub fn is_archive(&self) -> bool {
        self.prefix.ends_with(ARCHIVE_SUFFIX)
    }
}

impl GitRemote {
    pub fn clone_url(&self) -> String {
        match self.protocol {
            GitProtocol::Https => format!("https://{}/{}/{}", self.host, self.owner, self.repo),
            GitProtocol::Ssh => format!("git@{}:{}/{}.git", self.host, self.owner, self.repo),
        }
    }
}

impl Location {
    pub fn parse(raw: &str) -> Location {
        match classify(raw.trim()) {
            Ok(location) => location,
            Err(reason) => Location::Invalid {
                raw: raw.to_string(),
                reason,
            },
        }
    }

    /// Packages sharing an origin key are fetched once. Git remotes group by
    /// the base remote URL regardless of ref or subpath.
    pub fn origin_key(&self) -> String {
        match self {
            Location::GitRemote(remote) => remote.clone_url(),
            other => other.to_string(),
        }
    }
}

fn classify(raw: &str) -> Result<Location, String> {
    if raw.is_empty() {
        return Err("location is empty".into());
    }
    if let Some(rest) = raw.strip_prefix("s3://") {
        return parse_object_store(StoreScheme::S3, rest);
    }
    if let Some(rest) = raw.strip_prefix("gs://") {
        return parse_object_store(StoreScheme::Gcs, rest);
    }
    if let Some(rest) = raw.strip_prefix("https://") {
        return parse_https_remote(rest);
    }
    if raw.starts_with("http://") {
        return Err("plain http remotes are not supported, use https".into());
    }
    if let Some(rest) = raw.strip_prefix("git@") {
        return parse_ssh_remote(rest);
    }
    if raw.starts_with('/') || raw.starts_with("./") || raw.starts_with("../") {
        let path = PathBuf::from(raw);
        return Ok(if raw.ends_with(ARCHIVE_SUFFIX) {
            Location::Archive(path)
        } else {
            Location::Local(path)
        });
    }
    Err("expected ./path, /path, https://, git@, s3:// or gs://".into())
}

fn parse_object_store(scheme: StoreScheme, rest: &str) -> Result<Location, String> {
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err("bucket name is missing".into());
    }
    Ok(Location::ObjectStore(ObjectStoreUri {
        scheme,
        bucket: bucket.to_string(),
        prefix: prefix.trim_matches('/').to_string(),
    }))
}

// https://<host>/<owner>/<repo>[.git][/tree/<ref>[/<subpath>]]
fn parse_https_remote(rest: &str) -> Result<Location, String> {
    let segments: Vec<&str> = rest
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let [host, owner, repo, tail @ ..] = segments.as_slice() else {
        return Err("expected https://<host>/<owner>/<repo>".into());
    };
    if repo.ends_with(ARCHIVE_SUFFIX) || tail.last().is_some_and(|s| s.ends_with(ARCHIVE_SUFFIX)) {
        return Err("remote archives are not supported".into());
    }

    // GitLab nests the tree marker under "-".
    let tail = match tail {
        ["-", rest @ ..] => rest,
        other => other,
    };
    let (git_ref, subpath) = match tail {
        [] => (None, None),
        ["tree", git_ref] => (Some(git_ref.to_string()), None),
        ["tree", git_ref, sub @ ..] => (Some(git_ref.to_string()), Some(sub.join("/"))),
        _ => return Err("expected /tree/<ref>/<subpath> after the repository".into()),
    };

    Ok(Location::GitRemote(GitRemote {
        protocol: GitProtocol::Https,
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.trim_end_matches(".git").to_string(),
        git_ref,
        subpath,
    }))
}

// git@<host>:<owner>/<repo>[.git][/<subpath>]
fn parse_ssh_remote(rest: &str) -> Result<Location, String> {
    let (host, path) = rest
        .split_once(':')
        .ok_or_else(|| "expected git@<host>:<owner>/<repo>".to_string())?;
    let segments: Vec<&str> = path
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let [owner, repo, sub @ ..] = segments.as_slice() else {
        return Err("expected git@<host>:<owner>/<repo>".into());
    };
    if host.is_empty() {
        return Err("host is missing".into());
    }

    Ok(Location::GitRemote(GitRemote {
        protocol: GitProtocol::Ssh,
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.trim_end_matches(".git").to_string(),
        git_ref: None,
        subpath: (!sub.is_empty()).then(|| sub.join("/")),
    }))
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) | Location::Archive(path) => write!(f, "{}", path.display()),
            Location::GitRemote(remote) => match remote.protocol {
                GitProtocol::Https => {
                    write!(f, "{}", remote.clone_url())?;
                    if let Some(git_ref) = &remote.git_ref {
                        write!(f, "/tree/{}", git_ref)?;
                        if let Some(sub) = &remote.subpath {
                            write!(f, "/{}", sub)?;
                        }
                    }
                    Ok(())
                }
                GitProtocol::Ssh => {
                    write!(f, "{}", remote.clone_url())?;
                    if let Some(sub) = &remote.subpath {
                        write!(f, "/{}", sub)?;
                    }
                    Ok(())
                }
            },
            Location::ObjectStore(uri) => {
                write!(f, "{}{}", uri.scheme.prefix(), uri.bucket)?;
                if !uri.prefix.is_empty() {
                    write!(f, "/{}", uri.prefix)?;
                }
                Ok(())
            }
            Location::Invalid { raw, .. } => write!(f, "{}", raw),
        }
    }
}

impl From<String> for Location {
    fn from(raw: String) -> Self {
        Location::parse(&raw)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}
