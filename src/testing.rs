//! Hand-rolled fakes for unit tests

use crate::builder::{self, BuilderImage};
use crate::error::KilnResult;
use crate::lifecycle::{Lifecycle, LifecycleDescriptor};
use crate::orchestration::{ContainerConfig, ContainerRuntime, VolumeInfo};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    images: HashMap<String, HashMap<String, String>>,
    pulled: Vec<String>,
    created: Vec<ContainerConfig>,
    binaries: HashMap<String, String>,
    copies: Vec<(String, String, usize)>,
    started: Vec<String>,
    exit_codes: HashMap<String, i32>,
    hanging: HashSet<String>,
    killed: Vec<String>,
    removed: Vec<String>,
    volumes: BTreeMap<String, HashMap<String, String>>,
    removed_volumes: Vec<String>,
}

/// In-memory runtime that records every call
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an image available locally with the given labels
    pub fn with_image(self, name: &str, labels: HashMap<String, String>) -> Self {
        self.state.lock().unwrap().images.insert(name.to_string(), labels);
        self
    }

    /// Make the container running `binary` exit with `status`
    pub fn fail_phase(self, binary: &str, status: i32) -> Self {
        self.state
            .lock()
            .unwrap()
            .exit_codes
            .insert(binary.to_string(), status);
        self
    }

    /// Make the container running `binary` never exit
    pub fn hang_phase(self, binary: &str) -> Self {
        self.state.lock().unwrap().hanging.insert(binary.to_string());
        self
    }

    pub fn created(&self) -> Vec<ContainerConfig> {
        self.state.lock().unwrap().created.clone()
    }

    /// Binary names of every created container, in order
    pub fn created_binaries(&self) -> Vec<String> {
        self.created()
            .iter()
            .filter_map(|c| c.entrypoint.as_deref())
            .map(|e| e.rsplit('/').next().unwrap_or(e).to_string())
            .collect()
    }

    pub fn copies(&self) -> Vec<(String, String, usize)> {
        self.state.lock().unwrap().copies.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.state.lock().unwrap().volumes.keys().cloned().collect()
    }

    pub fn volume_labels(&self, name: &str) -> Option<HashMap<String, String>> {
        self.state.lock().unwrap().volumes.get(name).cloned()
    }

    pub fn removed_volumes(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_volumes.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn is_available(&self) -> KilnResult<bool> {
        Ok(true)
    }

    async fn ensure_ready(&self) -> KilnResult<()> {
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> KilnResult<bool> {
        Ok(self.state.lock().unwrap().images.contains_key(image))
    }

    async fn pull(&self, image: &str) -> KilnResult<()> {
        let mut state = self.state.lock().unwrap();
        state.pulled.push(image.to_string());
        state.images.entry(image.to_string()).or_default();
        Ok(())
    }

    async fn image_labels(&self, image: &str) -> KilnResult<HashMap<String, String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .get(image)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, config: &ContainerConfig) -> KilnResult<String> {
        let mut state = self.state.lock().unwrap();
        let id = format!("ctr-{}", state.created.len());
        let binary = config
            .entrypoint
            .as_deref()
            .and_then(|e| e.rsplit('/').next())
            .unwrap_or_default()
            .to_string();
        state.binaries.insert(id.clone(), binary);
        state.created.push(config.clone());
        Ok(id)
    }

    async fn copy_archive(
        &self,
        container_id: &str,
        dest: &str,
        mut archive: Box<dyn Read + Send>,
    ) -> KilnResult<()> {
        let mut data = Vec::new();
        archive.read_to_end(&mut data).unwrap();
        drop(archive);
        self.state.lock().unwrap().copies.push((
            container_id.to_string(),
            dest.to_string(),
            data.len(),
        ));
        Ok(())
    }

    async fn start_attached(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<i32> {
        let (binary, hang, status) = {
            let mut state = self.state.lock().unwrap();
            state.started.push(container_id.to_string());
            let binary = state.binaries.get(container_id).cloned().unwrap_or_default();
            let hang = state.hanging.contains(&binary);
            let status = state.exit_codes.get(&binary).copied().unwrap_or(0);
            (binary, hang, status)
        };

        on_output(format!("===> {}", binary.to_uppercase()));
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(status)
    }

    async fn kill(&self, container_id: &str) -> KilnResult<()> {
        self.state.lock().unwrap().killed.push(container_id.to_string());
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> KilnResult<()> {
        self.state.lock().unwrap().removed.push(container_id.to_string());
        Ok(())
    }

    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>) -> KilnResult<()> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .entry(name.to_string())
            .or_insert_with(|| labels.clone());
        Ok(())
    }

    async fn volume_inspect(&self, name: &str) -> KilnResult<Option<VolumeInfo>> {
        Ok(self.state.lock().unwrap().volumes.get(name).map(|labels| VolumeInfo {
            name: name.to_string(),
            labels: labels.clone(),
            mountpoint: None,
            created_at: None,
        }))
    }

    async fn volume_remove(&self, name: &str) -> KilnResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.volumes.remove(name).is_some() {
            state.removed_volumes.push(name.to_string());
        }
        Ok(())
    }

    async fn volume_list(&self, prefix: &str) -> KilnResult<Vec<VolumeInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .volumes
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, labels)| VolumeInfo {
                name: name.clone(),
                labels: labels.clone(),
                mountpoint: None,
                created_at: None,
            })
            .collect())
    }

    fn runtime_name(&self) -> &'static str {
        "Fake"
    }
}

/// Lifecycle serving a small in-memory archive and counting open streams
pub struct FakeLifecycle {
    descriptor: LifecycleDescriptor,
    creator: bool,
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl FakeLifecycle {
    /// A lifecycle supporting the given platform APIs and buildpack API 0.4
    pub fn new(platform_apis: &[&str]) -> Self {
        let list = platform_apis
            .iter()
            .map(|v| format!("\"{}\"", v))
            .collect::<Vec<_>>()
            .join(", ");
        let content = format!(
            "[apis.buildpack]\nsupported = [\"0.4\"]\n[apis.platform]\nsupported = [{}]\n[lifecycle]\nversion = \"0.11.1\"\n",
            list
        );
        Self {
            descriptor: LifecycleDescriptor::parse(&content, "fake").unwrap(),
            creator: true,
            opened: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without_creator(mut self) -> Self {
        self.creator = false;
        self
    }

    /// Number of times `open` was called
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    live: Arc<AtomicUsize>,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Lifecycle for FakeLifecycle {
    fn descriptor(&self) -> &LifecycleDescriptor {
        &self.descriptor
    }

    fn open(&self) -> KilnResult<Box<dyn Read + Send>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedStream {
            inner: Cursor::new(b"fake lifecycle archive".to_vec()),
            live: Arc::clone(&self.live),
        }))
    }

    fn has_creator_binary(&self) -> bool {
        self.creator
    }

    fn source_name(&self) -> &str {
        "fake"
    }
}

/// Name of the builder image registered by [`runtime_with_builder`]
pub const BUILDER: &str = "example/builder";

/// A fake runtime that already has a valid builder image
pub fn runtime_with_builder() -> FakeRuntime {
    FakeRuntime::new().with_image(BUILDER, builder::fixtures::labels())
}

/// The builder image registered by [`runtime_with_builder`]
pub fn builder_image() -> BuilderImage {
    builder::fixtures::builder(BUILDER)
}
