//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use larets_core::ArchiveExtractor;
use larets_repo::index::ChartIndex;
use larets_repo::{
    CommitSummary, Engine, EngineConfig, EngineParts, HttpOrigin, MemoryStore, MetadataStore,
    NativeIndexer, PackagingTool, RepoError, Result, VersionControlTool,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tar::{Builder, Header};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Engine over a temp storage root, the in-memory store and a fake `git`
pub struct Harness {
    pub engine: Engine,
    pub store: MemoryStore,
    pub vcs: Arc<FakeVcs>,
    pub storage: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(|_| {}, Arc::new(NativeIndexer))
    }

    pub fn with_config(configure: impl FnOnce(&mut EngineConfig)) -> Self {
        Self::build(configure, Arc::new(NativeIndexer))
    }

    pub fn with_packaging(packaging: Arc<dyn PackagingTool>) -> Self {
        Self::build(|_| {}, packaging)
    }

    fn build(configure: impl FnOnce(&mut EngineConfig), packaging: Arc<dyn PackagingTool>) -> Self {
        let storage = TempDir::new().unwrap();
        let mut config = EngineConfig {
            storage_path: storage.path().to_path_buf(),
            fetch_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        configure(&mut config);

        let store = MemoryStore::new();
        let vcs = Arc::new(FakeVcs::default());
        let parts = EngineParts {
            store: Arc::new(store.clone()),
            vcs: vcs.clone(),
            packaging,
            extractor: Arc::new(ArchiveExtractor),
            http: HttpOrigin::new(config.fetch_timeout).unwrap(),
        };

        Self {
            engine: Engine::from_parts(config, parts),
            store,
            vcs,
            storage,
        }
    }

    pub fn root(&self) -> &Path {
        self.storage.path()
    }
}

/// Records calls and lays down just enough on disk to look like git did
#[derive(Default)]
pub struct FakeVcs {
    pub calls: Mutex<Vec<String>>,
    pub branches: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl FakeVcs {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, url: &str) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RepoError::remote(url, None, "fatal: repository not found"));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionControlTool for FakeVcs {
    async fn init_bare(&self, path: &Path, branch: &str) -> Result<()> {
        self.record(format!("init_bare {}", branch));
        self.check(&path.display().to_string())?;
        std::fs::write(path.join("HEAD"), format!("ref: refs/heads/{}\n", branch)).unwrap();
        Ok(())
    }

    async fn mirror_clone(&self, url: &str, path: &Path) -> Result<()> {
        self.record(format!("mirror_clone {}", url));
        self.check(url)?;
        std::fs::write(path.join("HEAD"), "ref: refs/heads/master\n").unwrap();
        Ok(())
    }

    async fn fetch_all(&self, path: &Path) -> Result<()> {
        self.record("fetch_all".to_string());
        self.check(&path.display().to_string())
    }

    async fn list_branches(&self, _path: &Path) -> Result<Vec<String>> {
        Ok(self.branches.lock().unwrap().clone())
    }

    async fn log(&self, _path: &Path, limit: usize) -> Result<Vec<CommitSummary>> {
        Ok((0..15)
            .map(|i| CommitSummary {
                id: format!("{:040x}", i),
                summary: format!("commit {}", i),
            })
            .take(limit)
            .collect())
    }

    async fn create_branch(&self, _path: &Path, branch: &str, base: Option<&str>) -> Result<()> {
        self.record(format!("create_branch {} {}", branch, base.unwrap_or("HEAD")));
        self.branches.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn delete_branch(&self, _path: &Path, branch: &str) -> Result<()> {
        self.record(format!("delete_branch {}", branch));
        self.branches.lock().unwrap().retain(|b| b != branch);
        Ok(())
    }
}

/// Packaging tool whose index builds always fail
pub struct BrokenIndexer;

#[async_trait]
impl PackagingTool for BrokenIndexer {
    async fn build_index(
        &self,
        _charts_dir: &Path,
        _download_base: &str,
        index_path: &Path,
    ) -> Result<ChartIndex> {
        Err(RepoError::storage(index_path, "disk full"))
    }
}

fn add_entry<W: std::io::Write>(builder: &mut Builder<W>, path: &str, content: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, content).unwrap();
}

/// A packaged chart
pub fn chart_tgz(name: &str, version: &str) -> Vec<u8> {
    let chart_yaml = format!(
        "apiVersion: v2\nname: {}\nversion: {}\nappVersion: \"2.0\"\ndescription: A test chart\nkeywords:\n  - test\n",
        name, version
    );
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    add_entry(&mut builder, &format!("{}/Chart.yaml", name), chart_yaml.as_bytes());
    add_entry(&mut builder, &format!("{}/values.yaml", name), b"replicas: 1\n");
    builder.into_inner().unwrap().finish().unwrap()
}

/// A `docker save` style archive
pub fn image_tar(tag: &str, layers: &[&str]) -> Vec<u8> {
    let manifest = serde_json::json!([{
        "Config": "config.json",
        "RepoTags": [tag],
        "Layers": layers,
    }]);
    let mut builder = Builder::new(Vec::new());
    add_entry(&mut builder, "manifest.json", manifest.to_string().as_bytes());
    add_entry(&mut builder, "config.json", b"{}");
    for layer in layers {
        add_entry(&mut builder, layer, b"layer");
    }
    builder.into_inner().unwrap()
}

pub const ORIGIN_INDEX: &str = "apiVersion: v1\nentries:\n  nginx:\n    - name: nginx\n      version: 15.0.0\n      urls:\n        - charts/nginx-15.0.0.tgz\ngenerated: \"2024-01-01T00:00:00Z\"\n";

/// Serve a chart index at `/index.yaml`
pub async fn mount_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ORIGIN_INDEX))
        .mount(server)
        .await;
}

/// Move a file's modification time into the past
pub fn age_file(path: &Path, by: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

/// Every file under `root`, relative and sorted
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

/// Artifact rows of a repository, straight from the store
pub async fn stored_artifacts(store: &MemoryStore, repository_id: i64) -> usize {
    store.list_artifacts(repository_id).await.unwrap().len()
}
