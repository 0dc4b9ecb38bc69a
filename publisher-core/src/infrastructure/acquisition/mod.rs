// publisher-core/src/infrastructure/acquisition/mod.rs

// Puts every package of a project on local disk under `<target>/<package>`,
// whatever its origin. Packages that share an origin are fetched once.

use futures::future::try_join_all;
use futures::{StreamExt, TryStreamExt};
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::domain::config::{PackageDecl, ensure_path_component};
use crate::domain::error::DomainError;
use crate::domain::location::{GitRemote, Location, ObjectStoreUri};
use crate::error::PublisherError;
use crate::infrastructure::fs;
use crate::ports::source::{GitClient, ObjectStoreResolver};

const STAGING_PREFIX: &str = ".acquire-";

/// What to do when a git location names a subpath the clone does not have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubpathPolicy {
    /// Log a warning and use the whole clone.
    #[default]
    Lenient,
    /// Fail the package with `PackageNotFound`.
    Strict,
}

pub struct PackageAcquirer {
    git: Arc<dyn GitClient>,
    stores: Arc<dyn ObjectStoreResolver>,
    /// Relative local and archive paths resolve against this directory.
    server_root: PathBuf,
    subpath_policy: SubpathPolicy,
}

/// Packages fetched together, in declaration order.
struct OriginGroup<'a> {
    key: String,
    members: Vec<&'a PackageDecl>,
}

fn group_by_origin(decls: &[PackageDecl]) -> Vec<OriginGroup<'_>> {
    let mut groups: Vec<OriginGroup<'_>> = Vec::new();
    for decl in decls {
        let key = decl.location.origin_key();
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.members.push(decl),
            None => groups.push(OriginGroup {
                key,
                members: vec![decl],
            }),
        }
    }
    groups
}

fn not_found(message: String) -> PublisherError {
    DomainError::PackageNotFound(message).into()
}

impl PackageAcquirer {
    pub fn new(
        git: Arc<dyn GitClient>,
        stores: Arc<dyn ObjectStoreResolver>,
        server_root: PathBuf,
        subpath_policy: SubpathPolicy,
    ) -> Self {
        Self {
            git,
            stores,
            server_root,
            subpath_policy,
        }
    }

    /// Populates `target_root/<package>` for every declaration. Origin groups
    /// run concurrently; each stages into its own temporary directory.
    #[instrument(skip(self, decls), fields(packages = decls.len(), target = %target_root.display()))]
    pub async fn materialize(
        &self,
        decls: &[PackageDecl],
        target_root: &Path,
    ) -> Result<(), PublisherError> {
        for decl in decls {
            ensure_path_component(&decl.name)?;
        }
        tokio::fs::create_dir_all(target_root).await?;

        let groups = group_by_origin(decls);
        info!(groups = groups.len(), "Acquiring packages");

        try_join_all(
            groups
                .iter()
                .map(|group| self.materialize_group(group, target_root)),
        )
        .await?;
        Ok(())
    }

    async fn materialize_group(
        &self,
        group: &OriginGroup<'_>,
        target_root: &Path,
    ) -> Result<(), PublisherError> {
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(target_root)?;

        debug!(origin = %group.key, members = group.members.len(), "Fetching origin");
        let first = group.members[0];
        let result = match &first.location {
            Location::GitRemote(_) => self.from_git(&group.members, staging.path(), target_root).await,
            Location::ObjectStore(uri) => {
                self.from_object_store(uri, &group.members, staging.path(), target_root)
                    .await
            }
            Location::Local(path) => self.from_local(path, &group.members, target_root).await,
            Location::Archive(path) => {
                self.from_archive(path, &group.members, staging.path(), target_root)
                    .await
            }
            Location::Invalid { raw, reason } => Err(not_found(format!(
                "package '{}' has unsupported location '{}': {}",
                first.name, raw, reason
            ))),
        };

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(path = %staging_path.display(), error = %e, "Failed to remove staging directory");
        }
        result
    }

    fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.server_root.join(path)
        }
    }

    // --- LOCAL ---

    async fn from_local(
        &self,
        path: &Path,
        members: &[&PackageDecl],
        target_root: &Path,
    ) -> Result<(), PublisherError> {
        let source = self.resolve_local(path);
        if !tokio::fs::metadata(&source).await.is_ok_and(|m| m.is_dir()) {
            return Err(not_found(format!(
                "package '{}': {} is not a directory",
                members[0].name,
                source.display()
            )));
        }
        copy_to_members(&source, members, target_root).await
    }

    // --- ARCHIVE ---

    async fn from_archive(
        &self,
        path: &Path,
        members: &[&PackageDecl],
        staging: &Path,
        target_root: &Path,
    ) -> Result<(), PublisherError> {
        let archive = self.resolve_local(path);
        if !tokio::fs::metadata(&archive).await.is_ok_and(|m| m.is_file()) {
            return Err(not_found(format!(
                "package '{}': archive {} does not exist",
                members[0].name,
                archive.display()
            )));
        }
        let unpacked = staging.join(archive_stem(&archive));
        let dest = unpacked.clone();
        fs::blocking(move || fs::unpack_zip(&archive, &dest)).await?;
        copy_to_members(&unpacked, members, target_root).await
    }

    // --- GIT ---

    async fn from_git(
        &self,
        members: &[&PackageDecl],
        staging: &Path,
        target_root: &Path,
    ) -> Result<(), PublisherError> {
        // One clone per distinct ref within the origin.
        let mut by_ref: BTreeMap<Option<String>, Vec<(&PackageDecl, &GitRemote)>> = BTreeMap::new();
        for &member in members {
            if let Location::GitRemote(remote) = &member.location {
                by_ref
                    .entry(remote.git_ref.clone())
                    .or_default()
                    .push((member, remote));
            }
        }

        for (index, (git_ref, packages)) in by_ref.into_iter().enumerate() {
            let clone_dir = staging.join(format!("clone-{}", index));
            let url = packages[0].1.clone_url();
            self.git
                .clone_repo(&url, git_ref.as_deref(), &clone_dir)
                .await?;

            let git_dir = clone_dir.join(".git");
            if tokio::fs::metadata(&git_dir).await.is_ok() {
                tokio::fs::remove_dir_all(&git_dir).await?;
            }

            for (package, remote) in packages {
                let source = self.subpath_source(&clone_dir, package, remote).await?;
                copy_package(&source, &target_root.join(&package.name)).await?;
            }
        }
        Ok(())
    }

    async fn subpath_source(
        &self,
        clone_dir: &Path,
        package: &PackageDecl,
        remote: &GitRemote,
    ) -> Result<PathBuf, PublisherError> {
        let Some(subpath) = &remote.subpath else {
            return Ok(clone_dir.to_path_buf());
        };
        let relative = safe_relative_path(subpath)?;
        let candidate = clone_dir.join(relative);
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_dir()) {
            return Ok(candidate);
        }

        match self.subpath_policy {
            SubpathPolicy::Lenient => {
                warn!(
                    package = %package.name,
                    subpath = %subpath,
                    "Subpath not found in clone, using the whole repository"
                );
                Ok(clone_dir.to_path_buf())
            }
            SubpathPolicy::Strict => Err(not_found(format!(
                "package '{}': subpath '{}' not found in {}",
                package.name,
                subpath,
                remote.clone_url()
            ))),
        }
    }

    // --- OBJECT STORAGE ---

    async fn from_object_store(
        &self,
        uri: &ObjectStoreUri,
        members: &[&PackageDecl],
        staging: &Path,
        target_root: &Path,
    ) -> Result<(), PublisherError> {
        let store = self.stores.resolve(uri)?;
        let location = Location::ObjectStore(uri.clone());
        let contents = staging.join("contents");

        if uri.is_archive() {
            let object = ObjectPath::from(uri.prefix.as_str());
            match store.head(&object).await {
                Ok(_) => {}
                Err(object_store::Error::NotFound { .. }) => {
                    return Err(not_found(format!("no object found at {}", location)));
                }
                Err(e) => return Err(e.into()),
            }
            let file_name = object.filename().unwrap_or("package.zip").to_string();
            let archive = staging.join(&file_name);
            download(store.as_ref(), &object, &archive).await?;

            let dest = contents.clone();
            let zip = archive.clone();
            fs::blocking(move || fs::unpack_zip(&zip, &dest)).await?;
            tokio::fs::remove_file(&archive).await?;
        } else {
            let prefix = (!uri.prefix.is_empty()).then(|| ObjectPath::from(uri.prefix.as_str()));
            let objects: Vec<_> = store.list(prefix.as_ref()).try_collect().await?;
            if objects.is_empty() {
                return Err(not_found(format!("no objects found under {}", location)));
            }

            let mut downloaded = 0usize;
            for meta in &objects {
                let Some(relative) = relative_object_path(&meta.location, prefix.as_ref()) else {
                    continue;
                };
                download(store.as_ref(), &meta.location, &contents.join(relative)).await?;
                downloaded += 1;
            }
            // A lone object sitting at the prefix itself has no place in the tree.
            if downloaded == 0 {
                return Err(not_found(format!("no objects found under {}", location)));
            }
            info!(objects = downloaded, origin = %location, "Downloaded objects");
        }

        copy_to_members(&contents, members, target_root).await
    }
}

async fn download(
    store: &dyn ObjectStore,
    location: &ObjectPath,
    dest: &Path,
) -> Result<(), PublisherError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut stream = store.get(location).await?.into_stream();
    let mut file = tokio::fs::File::create(dest).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Path of `object` below `prefix`, or `None` for the prefix itself.
fn relative_object_path(object: &ObjectPath, prefix: Option<&ObjectPath>) -> Option<PathBuf> {
    let parts: Vec<String> = match prefix {
        Some(prefix) => object
            .prefix_match(prefix)?
            .map(|part| part.as_ref().to_string())
            .collect(),
        None => object.parts().map(|part| part.as_ref().to_string()).collect(),
    };
    if parts.is_empty() || parts.iter().any(|p| p == ".." || p == ".") {
        return None;
    }
    Some(parts.iter().collect())
}

/// Rejects absolute subpaths and any `..` component.
fn safe_relative_path(subpath: &str) -> Result<PathBuf, PublisherError> {
    let path = PathBuf::from(subpath);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(PublisherError::UnsafePath(subpath.to_string()));
    }
    Ok(path)
}

fn archive_stem(archive: &Path) -> String {
    archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string())
}

async fn copy_to_members(
    source: &Path,
    members: &[&PackageDecl],
    target_root: &Path,
) -> Result<(), PublisherError> {
    for member in members {
        copy_package(source, &target_root.join(&member.name)).await?;
    }
    Ok(())
}

async fn copy_package(source: &Path, dest: &Path) -> Result<(), PublisherError> {
    // A local package already sitting at its target is left alone.
    if let (Ok(a), Ok(b)) = (source.canonicalize(), dest.canonicalize()) {
        if a == b {
            return Ok(());
        }
    }
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();
    fs::blocking(move || fs::replace_dir_with_copy(&source, &dest)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use object_store::PutPayload;
    use object_store::memory::InMemory;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    /// Serves clones from a directory on disk and records every request.
    struct FakeGit {
        repo: PathBuf,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl GitClient for FakeGit {
        async fn clone_repo(
            &self,
            url: &str,
            git_ref: Option<&str>,
            dest: &Path,
        ) -> Result<(), PublisherError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), git_ref.map(str::to_string)));
            fs::replace_dir_with_copy(&self.repo, dest)?;
            Ok(())
        }
    }

    struct MemoryStores(Arc<InMemory>);

    impl ObjectStoreResolver for MemoryStores {
        fn resolve(&self, _uri: &ObjectStoreUri) -> Result<Arc<dyn ObjectStore>, PublisherError> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        _dir: TempDir,
        server_root: PathBuf,
        target: PathBuf,
        git: Arc<FakeGit>,
        store: Arc<InMemory>,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let dir = tempdir()?;
            let server_root = dir.path().join("server");
            let repo = dir.path().join("repo");
            for sub in ["a", "b"] {
                std::fs::create_dir_all(repo.join(sub))?;
                std::fs::write(repo.join(sub).join("publisher.json"), format!("{{\"name\": \"{}\"}}", sub))?;
            }
            std::fs::create_dir_all(repo.join(".git"))?;
            std::fs::write(repo.join("README.md"), "samples")?;
            std::fs::create_dir_all(&server_root)?;

            Ok(Self {
                target: dir.path().join("target"),
                git: Arc::new(FakeGit {
                    repo,
                    calls: Mutex::new(Vec::new()),
                }),
                store: Arc::new(InMemory::new()),
                server_root,
                _dir: dir,
            })
        }

        fn acquirer(&self, policy: SubpathPolicy) -> PackageAcquirer {
            PackageAcquirer::new(
                self.git.clone(),
                Arc::new(MemoryStores(self.store.clone())),
                self.server_root.clone(),
                policy,
            )
        }

        fn staging_left(&self) -> bool {
            std::fs::read_dir(&self.target)
                .unwrap()
                .filter_map(|e| e.ok())
                .any(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
        }
    }

    fn package(name: &str, location: &str) -> PackageDecl {
        PackageDecl {
            name: name.to_string(),
            location: Location::parse(location),
        }
    }

    fn zip_bytes(files: &[(&str, &str)]) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, zip::write::SimpleFileOptions::default())?;
            writer.write_all(body.as_bytes())?;
        }
        Ok(writer.finish()?.into_inner())
    }

    #[test]
    fn test_grouping_by_origin() {
        let decls = vec![
            package("a", "https://host/org/repo/tree/main/a"),
            package("local", "./local"),
            package("b", "https://host/org/repo/tree/main/b"),
        ];
        let groups = group_by_origin(&decls);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[1].key, "./local");
    }

    #[tokio::test]
    async fn test_two_subpaths_one_clone() -> Result<()> {
        let fx = Fixture::new()?;
        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(
                &[
                    package("a", "https://host/org/repo/tree/main/a"),
                    package("b", "https://host/org/repo/tree/main/b"),
                ],
                &fx.target,
            )
            .await?;

        let calls = fx.git.calls.lock().unwrap().clone();
        assert_eq!(calls, [("https://host/org/repo".to_string(), Some("main".to_string()))]);
        assert!(fx.target.join("a/publisher.json").exists());
        assert!(fx.target.join("b/publisher.json").exists());
        assert!(!fx.target.join("a/README.md").exists());
        assert!(!fx.staging_left());
        Ok(())
    }

    #[tokio::test]
    async fn test_whole_clone_without_subpath() -> Result<()> {
        let fx = Fixture::new()?;
        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("samples", "git@host:org/repo.git")], &fx.target)
            .await?;
        assert!(fx.target.join("samples/README.md").exists());
        assert!(fx.target.join("samples/a/publisher.json").exists());
        assert!(!fx.target.join("samples/.git").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_subpath_policy() -> Result<()> {
        let fx = Fixture::new()?;
        let decls = [package("c", "https://host/org/repo/tree/main/c")];

        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(&decls, &fx.target)
            .await?;
        assert!(fx.target.join("c/README.md").exists());

        let err = fx
            .acquirer(SubpathPolicy::Strict)
            .materialize(&decls, &fx.target)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::PackageNotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_subpath_cannot_escape_clone() -> Result<()> {
        let fx = Fixture::new()?;
        let err = fx
            .acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("x", "git@host:org/repo/../../etc")], &fx.target)
            .await
            .unwrap_err();
        assert!(matches!(err, PublisherError::UnsafePath(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_local_directory() -> Result<()> {
        let fx = Fixture::new()?;
        std::fs::create_dir_all(fx.server_root.join("faa"))?;
        std::fs::write(fx.server_root.join("faa/publisher.json"), "{}")?;

        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "./faa")], &fx.target)
            .await?;
        assert!(fx.target.join("faa/publisher.json").exists());

        let err = fx
            .acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("gone", "./gone")], &fx.target)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gone"));
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_archive_is_unpacked() -> Result<()> {
        let fx = Fixture::new()?;
        std::fs::write(
            fx.server_root.join("faa.zip"),
            zip_bytes(&[("publisher.json", "{}"), ("flights.malloy", "source: f is duckdb.table('f.csv')")])?,
        )?;

        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "./faa.zip")], &fx.target)
            .await?;
        assert!(fx.target.join("faa/flights.malloy").exists());
        assert!(!fx.staging_left());
        Ok(())
    }

    #[tokio::test]
    async fn test_object_store_prefix() -> Result<()> {
        let fx = Fixture::new()?;
        for (key, body) in [
            ("packages/faa/publisher.json", "{}"),
            ("packages/faa/models/flights.malloy", "source: f is duckdb.table('f.csv')"),
            ("packages/other/publisher.json", "{}"),
        ] {
            fx.store
                .put(&ObjectPath::from(key), PutPayload::from(body.as_bytes().to_vec()))
                .await?;
        }

        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "s3://bucket/packages/faa")], &fx.target)
            .await?;
        assert!(fx.target.join("faa/publisher.json").exists());
        assert!(fx.target.join("faa/models/flights.malloy").exists());
        assert!(!fx.target.join("faa/other").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_object_store_empty_prefix_is_not_found() -> Result<()> {
        let fx = Fixture::new()?;
        let err = fx
            .acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "gs://bucket/nothing/here")], &fx.target)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::PackageNotFound(_))));
        assert!(err.to_string().contains("gs://bucket/nothing/here"));
        Ok(())
    }

    #[tokio::test]
    async fn test_object_at_the_prefix_itself_is_not_found() -> Result<()> {
        let fx = Fixture::new()?;
        fx.store
            .put(&ObjectPath::from("packages/faa"), PutPayload::from(b"{}".to_vec()))
            .await?;

        let err = fx
            .acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "s3://bucket/packages/faa")], &fx.target)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::PackageNotFound(_))));
        assert!(!fx.target.join("faa").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_object_store_archive_is_unpacked() -> Result<()> {
        let fx = Fixture::new()?;
        fx.store
            .put(
                &ObjectPath::from("bundles/faa.zip"),
                PutPayload::from(zip_bytes(&[("publisher.json", "{}")])?),
            )
            .await?;

        fx.acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "gs://bucket/bundles/faa.zip")], &fx.target)
            .await?;
        assert!(fx.target.join("faa/publisher.json").exists());
        assert!(!fx.target.join("faa/faa.zip").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_location_names_value() -> Result<()> {
        let fx = Fixture::new()?;
        let err = fx
            .acquirer(SubpathPolicy::Lenient)
            .materialize(&[package("faa", "ftp://old/faa")], &fx.target)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::PackageNotFound(_))));
        assert!(err.to_string().contains("ftp://old/faa"));
        Ok(())
    }
}
