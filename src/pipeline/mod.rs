//! Text -> image -> 3D asset pipeline.
//!
//! ```text
//! prompt ─► image space ─► reference image ─► model space ─► mesh
//!                               │                  │
//!                               └──── AssetStore ◄─┘  (every artifact, as soon as fetched)
//! ```
//!
//! The model space is one of three backends with different step sequences:
//!
//! | backend               | steps                                                      |
//! |-----------------------|------------------------------------------------------------|
//! | InstantMesh           | check_input_image → preprocess → generate_mvs → make3d     |
//! | Hunyuan3D-2           | generation_all                                             |
//! | Hunyuan3D-2mini-Turbo | on_gen_mode_change(Turbo) → generation_all                 |
//!
//! Steps run strictly in sequence, each through the retry executor.

pub mod backend;
pub mod client;
pub mod params;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{MayaError, Result};
use crate::retry::{retry, OperationLog, RetryPolicy};
use crate::settings::{expand_home, get_with_env_fallback, maya_dir, PipelineSettings};

pub use backend::{detect_backend, BackendKind, Detection, DetectionSource};
pub use client::{FileData, GradioClient, SpaceClient};
pub use params::{resolve_params, RawParams, ResolvedParams};
pub use storage::{content_type_for, AssetStore, ResourceChanged, ResourceKind, StoredAsset};

/// Text-to-image request settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageOptions {
    pub api_name: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            api_name: "/infer".to_string(),
            width: 1024,
            height: 1024,
            steps: 4,
        }
    }
}

impl From<&PipelineSettings> for ImageOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            api_name: settings.image_api.clone(),
            width: settings.image_width,
            height: settings.image_height,
            steps: settings.image_steps,
        }
    }
}

/// Artifacts written by one run, in the order they were produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineArtifacts {
    pub image: Option<PathBuf>,
    pub processed_image: Option<PathBuf>,
    pub multiview: Option<PathBuf>,
    pub mesh: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub backend: BackendKind,
    pub params: ResolvedParams,
    pub artifacts: PipelineArtifacts,
}

pub struct AssetPipeline {
    image_client: Arc<dyn SpaceClient>,
    model_client: Arc<dyn SpaceClient>,
    backend: BackendKind,
    params: ResolvedParams,
    image: ImageOptions,
    store: Arc<AssetStore>,
    policy: RetryPolicy,
    log: Arc<OperationLog>,
}

impl std::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("image_space", &self.image_client.name())
            .field("model_space", &self.model_client.name())
            .field("backend", &self.backend)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl AssetPipeline {
    pub fn new(
        image_client: Arc<dyn SpaceClient>,
        model_client: Arc<dyn SpaceClient>,
        backend: BackendKind,
        params: ResolvedParams,
        store: Arc<AssetStore>,
    ) -> Self {
        Self {
            image_client,
            model_client,
            backend,
            params,
            image: ImageOptions::default(),
            store,
            policy: RetryPolicy::default(),
            log: Arc::new(OperationLog::new()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_image_options(mut self, image: ImageOptions) -> Self {
        self.image = image;
        self
    }

    pub fn with_operation_log(mut self, log: Arc<OperationLog>) -> Self {
        self.log = log;
        self
    }

    /// Connect both spaces from settings and detect the backend.
    pub async fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        let token = get_with_env_fallback(
            &settings.hf_token,
            &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"],
            None,
        );
        let asset_dir = settings
            .asset_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| maya_dir().join("assets"));

        let image_client = GradioClient::connect(&settings.image_space, token.as_deref()).await?;
        let model_client = GradioClient::connect(&settings.model_space, token.as_deref()).await?;

        let backend = detect_backend(settings.backend.as_deref(), &model_client)
            .await
            .into_result(&settings.model_space)?;
        let params = resolve_params(backend, &RawParams::from(settings));
        tracing::info!("Pipeline backend {} with {:?}", backend, params);

        Ok(Self::new(
            Arc::new(image_client),
            Arc::new(model_client),
            backend,
            params,
            Arc::new(AssetStore::new(asset_dir)?),
        )
        .with_retry_policy(settings.retry)
        .with_image_options(ImageOptions::from(settings)))
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    pub fn operation_log(&self) -> &Arc<OperationLog> {
        &self.log
    }

    /// Run the whole pipeline for one prompt.
    pub async fn run(&self, prompt: &str) -> Result<PipelineRun> {
        if prompt.trim().is_empty() {
            return Err(MayaError::MissingData("Prompt is empty".to_string()));
        }

        let run_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let mut artifacts = PipelineArtifacts::default();
        tracing::info!("[{}] Starting {} pipeline", run_id, self.backend);

        // 1. Reference image
        let image_args = || {
            vec![
                json!(prompt),
                json!(self.params.seed),
                json!(false),
                json!(self.image.width),
                json!(self.image.height),
                json!(self.image.steps),
            ]
        };
        let image_client = self.image_client.as_ref();
        let image_file = self
            .step(&run_id, "image", image_client, &self.image.api_name, image_args, &[0])
            .await?;
        let (image_path, image_bytes) = self
            .persist(&run_id, &image_file, image_client, "image", "png", ResourceKind::Image)
            .await?;
        artifacts.image = Some(image_path.clone());

        let uploaded = self.upload(&run_id, &image_path, image_bytes).await?;

        // 2. Mesh
        match self.backend {
            BackendKind::InstantMesh => {
                self.run_instantmesh(&run_id, uploaded, &mut artifacts).await?
            }
            BackendKind::Hunyuan3D2 => self.run_hunyuan(&run_id, uploaded, &mut artifacts).await?,
            BackendKind::Hunyuan3D2MiniTurbo => {
                self.call(&run_id, "mode", "/on_gen_mode_change", || vec![json!("Turbo")])
                    .await?;
                self.run_hunyuan(&run_id, uploaded, &mut artifacts).await?
            }
        }

        tracing::info!("[{}] Pipeline finished: {:?}", run_id, artifacts.mesh);
        Ok(PipelineRun {
            run_id,
            backend: self.backend,
            params: self.params,
            artifacts,
        })
    }

    async fn run_instantmesh(
        &self,
        run_id: &str,
        input: FileData,
        artifacts: &mut PipelineArtifacts,
    ) -> Result<()> {
        let model = self.model_client.as_ref();

        self.call(run_id, "check_input", "/check_input_image", || vec![input.to_value()])
            .await?;

        let preprocess_args = || vec![input.to_value(), json!(true)];
        let processed = self
            .step(run_id, "preprocess", model, "/preprocess", preprocess_args, &[0])
            .await?;
        let (path, _) = self
            .persist(run_id, &processed, model, "processed", "png", ResourceKind::ProcessedImage)
            .await?;
        artifacts.processed_image = Some(path);

        let mvs_args = || {
            vec![
                processed.to_value(),
                json!(self.params.steps),
                json!(self.params.seed),
            ]
        };
        let multiview = self
            .step(run_id, "multiview", model, "/generate_mvs", mvs_args, &[0])
            .await?;
        let (path, _) = self
            .persist(run_id, &multiview, model, "multiview", "png", ResourceKind::MultiView)
            .await?;
        artifacts.multiview = Some(path);

        // make3d returns (obj, glb); prefer the glb
        let make3d_args = || vec![multiview.to_value()];
        let mesh = self
            .step(run_id, "mesh", model, "/make3d", make3d_args, &[1, 0])
            .await?;
        let (path, _) = self
            .persist(run_id, &mesh, model, "mesh", "glb", ResourceKind::Mesh)
            .await?;
        artifacts.mesh = Some(path);
        Ok(())
    }

    async fn run_hunyuan(
        &self,
        run_id: &str,
        input: FileData,
        artifacts: &mut PipelineArtifacts,
    ) -> Result<()> {
        let model = self.model_client.as_ref();
        let params = self.params;
        let turbo = self.backend == BackendKind::Hunyuan3D2MiniTurbo;

        // generation_all returns (white mesh, textured mesh, html, ...); prefer textured
        let generation_args = || {
            let mut args = vec![Value::Null, input.to_value()];
            if turbo {
                // Multi-view inputs left empty
                args.extend([Value::Null, Value::Null, Value::Null, Value::Null]);
            }
            args.extend([
                json!(params.steps),
                json!(params.guidance_scale),
                json!(params.seed),
                json!(params.octree_resolution),
                json!(true),
            ]);
            if turbo {
                args.extend([json!(8000), json!(false)]);
            }
            args
        };
        let mesh = self
            .step(run_id, "mesh", model, "/generation_all", generation_args, &[1, 0])
            .await?;
        let (path, _) = self
            .persist(run_id, &mesh, model, "mesh", "glb", ResourceKind::Mesh)
            .await?;
        artifacts.mesh = Some(path);
        Ok(())
    }

    /// Predict on the model space through the retry executor.
    async fn call<A>(&self, run_id: &str, step: &str, api_name: &str, args: A) -> Result<Vec<Value>>
    where
        A: Fn() -> Vec<Value>,
    {
        let op_id = format!("{}:{}", run_id, step);
        let client = self.model_client.as_ref();
        retry(self.policy, Some(&op_id), Some(&self.log), || {
            client.predict(api_name, args())
        })
        .await
    }

    /// Predict and take the first file found at the given output indices.
    async fn step<A>(
        &self,
        run_id: &str,
        step: &str,
        client: &dyn SpaceClient,
        api_name: &str,
        args: A,
        indices: &[usize],
    ) -> Result<FileData>
    where
        A: Fn() -> Vec<Value>,
    {
        let op_id = format!("{}:{}", run_id, step);
        tracing::info!("[{}] {} {}", run_id, client.name(), api_name);

        retry(self.policy, Some(&op_id), Some(&self.log), || {
            let args = args();
            async move {
                let outputs = client.predict(api_name, args).await?;
                indices
                    .iter()
                    .filter_map(|i| outputs.get(*i))
                    .find_map(FileData::from_output)
                    .ok_or_else(|| {
                        MayaError::MissingData(format!(
                            "{} returned no file for step '{}'",
                            api_name, step
                        ))
                    })
            }
        })
        .await
    }

    /// Download an artifact and write it to the store before anything else runs.
    async fn persist(
        &self,
        run_id: &str,
        file: &FileData,
        client: &dyn SpaceClient,
        prefix: &str,
        default_ext: &str,
        kind: ResourceKind,
    ) -> Result<(PathBuf, Vec<u8>)> {
        let op_id = format!("{}:download_{}", run_id, prefix);
        let bytes =
            retry(self.policy, Some(&op_id), Some(&self.log), || client.download(file)).await?;
        if bytes.is_empty() {
            return Err(MayaError::MissingData(format!("{} artifact is empty", prefix)));
        }

        let ext = file.extension().unwrap_or_else(|| default_ext.to_string());
        let stored = self
            .store
            .save(Some(run_id), prefix, &ext, kind, &bytes)
            .await?;
        Ok((stored.path, bytes))
    }

    async fn upload(&self, run_id: &str, path: &std::path::Path, bytes: Vec<u8>) -> Result<FileData> {
        let op_id = format!("{}:upload", run_id);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());
        let client = self.model_client.as_ref();
        retry(self.policy, Some(&op_id), Some(&self.log), || {
            client.upload(&filename, bytes.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    /// Scripted space: each endpoint pops its next response.
    struct ScriptedSpace {
        name: String,
        responses: Mutex<HashMap<String, VecDeque<Result<Vec<Value>>>>>,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl ScriptedSpace {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn respond(self, api: &str, response: Result<Vec<Value>>) -> Self {
            self.responses
                .lock()
                .entry(api.to_string())
                .or_default()
                .push_back(response);
            self
        }

        fn called(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(api, _)| api.clone()).collect()
        }
    }

    #[async_trait]
    impl SpaceClient for ScriptedSpace {
        fn name(&self) -> &str {
            &self.name
        }

        async fn endpoints(&self) -> Result<Vec<String>> {
            Ok(self.responses.lock().keys().cloned().collect())
        }

        async fn upload(&self, filename: &str, _bytes: Vec<u8>) -> Result<FileData> {
            Ok(FileData::from_path(format!("/uploaded/{}", filename)))
        }

        async fn predict(&self, api_name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
            self.calls.lock().push((api_name.to_string(), args));
            self.responses
                .lock()
                .get_mut(api_name)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Err(MayaError::Backend(format!("no script for {}", api_name))))
        }

        async fn download(&self, file: &FileData) -> Result<Vec<u8>> {
            Ok(format!("bytes of {}", file.path).into_bytes())
        }
    }

    fn file(path: &str) -> Value {
        json!({"path": path})
    }

    fn image_space() -> Arc<ScriptedSpace> {
        Arc::new(
            ScriptedSpace::new("black-forest-labs/FLUX.1-schnell")
                .respond("/infer", Ok(vec![file("/tmp/ref.webp"), json!(42)])),
        )
    }

    fn pipeline(
        model: Arc<ScriptedSpace>,
        backend: BackendKind,
    ) -> (tempfile::TempDir, AssetPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AssetStore::new(dir.path()).unwrap());
        let params = resolve_params(backend, &RawParams::default());
        let pipeline = AssetPipeline::new(image_space(), model, backend, params, store)
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)));
        (dir, pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn test_instantmesh_runs_four_steps_in_order() {
        let model = Arc::new(
            ScriptedSpace::new("TencentARC/InstantMesh")
                .respond("/check_input_image", Ok(vec![]))
                .respond("/preprocess", Ok(vec![file("/tmp/processed.png")]))
                .respond("/generate_mvs", Ok(vec![file("/tmp/mvs.png"), file("/tmp/show.png")]))
                .respond("/make3d", Ok(vec![file("/tmp/mesh.obj"), file("/tmp/mesh.glb")])),
        );
        let (_dir, pipeline) = pipeline(model.clone(), BackendKind::InstantMesh);
        let mut changes = pipeline.store().subscribe();

        let run = pipeline.run("a red dragon").await.unwrap();

        assert_eq!(
            model.called(),
            vec!["/check_input_image", "/preprocess", "/generate_mvs", "/make3d"]
        );
        let mesh = run.artifacts.mesh.unwrap();
        assert_eq!(mesh.extension().unwrap(), "glb");
        assert!(run.artifacts.processed_image.is_some());
        assert!(run.artifacts.multiview.is_some());

        let kinds: Vec<ResourceKind> = std::iter::from_fn(|| changes.try_recv().ok())
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Image,
                ResourceKind::ProcessedImage,
                ResourceKind::MultiView,
                ResourceKind::Mesh
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_instantmesh_steps_param_is_sent() {
        let model = Arc::new(
            ScriptedSpace::new("TencentARC/InstantMesh")
                .respond("/check_input_image", Ok(vec![]))
                .respond("/preprocess", Ok(vec![file("/tmp/p.png")]))
                .respond("/generate_mvs", Ok(vec![file("/tmp/m.png")]))
                .respond("/make3d", Ok(vec![file("/tmp/mesh.obj")])),
        );
        let (_dir, pipeline) = pipeline(model.clone(), BackendKind::InstantMesh);
        pipeline.run("castle").await.unwrap();

        let calls = model.calls.lock();
        let (_, mvs_args) = calls.iter().find(|(api, _)| api == "/generate_mvs").unwrap();
        assert_eq!(mvs_args[1], json!(75));
        assert_eq!(mvs_args[2], json!(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hunyuan_single_call_prefers_textured_mesh() {
        let model = Arc::new(ScriptedSpace::new("tencent/Hunyuan3D-2").respond(
            "/generation_all",
            Ok(vec![file("/tmp/white.glb"), file("/tmp/textured.glb"), json!("<html>")]),
        ));
        let (_dir, pipeline) = pipeline(model.clone(), BackendKind::Hunyuan3D2);
        let run = pipeline.run("a chair").await.unwrap();

        assert_eq!(model.called(), vec!["/generation_all"]);
        let calls = model.calls.lock();
        // caption, image, steps, guidance, seed, octree, remove_bg
        assert_eq!(calls[0].1.len(), 7);
        assert_eq!(calls[0].1[2], json!(50));
        assert_eq!(calls[0].1[5], json!(256));
        assert!(run.artifacts.mesh.is_some());
        assert!(run.artifacts.multiview.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turbo_sets_mode_first() {
        let model = Arc::new(
            ScriptedSpace::new("tencent/Hunyuan3D-2mini-Turbo")
                .respond("/on_gen_mode_change", Ok(vec![json!({"__type__": "update"})]))
                .respond("/generation_all", Ok(vec![file("/tmp/white.glb")])),
        );
        let (_dir, pipeline) = pipeline(model.clone(), BackendKind::Hunyuan3D2MiniTurbo);
        pipeline.run("a lamp").await.unwrap();

        assert_eq!(model.called(), vec!["/on_gen_mode_change", "/generation_all"]);
        let calls = model.calls.lock();
        assert_eq!(calls[0].1, vec![json!("Turbo")]);
        assert_eq!(calls[1].1[6], json!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let model = Arc::new(
            ScriptedSpace::new("tencent/Hunyuan3D-2")
                .respond(
                    "/generation_all",
                    Err(MayaError::Backend("GPU task aborted".into())),
                )
                .respond("/generation_all", Ok(vec![file("/tmp/m.glb")])),
        );
        let (_dir, pipeline) = pipeline(model.clone(), BackendKind::Hunyuan3D2);
        let run = pipeline.run("a boat").await.unwrap();

        assert_eq!(model.called().len(), 2);
        let entries = pipeline
            .operation_log()
            .entries(&format!("{}:mesh", run.run_id));
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_mesh_is_not_retried() {
        let model = Arc::new(
            ScriptedSpace::new("tencent/Hunyuan3D-2")
                .respond("/generation_all", Ok(vec![Value::Null, Value::Null])),
        );
        let (dir, pipeline) = pipeline(model.clone(), BackendKind::Hunyuan3D2);
        let err = pipeline.run("a boat").await.unwrap_err();

        assert!(matches!(err, MayaError::MissingData(_)));
        assert_eq!(model.called().len(), 1);

        // The reference image was still persisted
        let run_dirs: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(run_dirs.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_backend_error_verbatim() {
        let quota = "You have exceeded your GPU quota";
        let mut space = ScriptedSpace::new("tencent/Hunyuan3D-2");
        for _ in 0..3 {
            space = space.respond("/generation_all", Err(MayaError::Backend(quota.into())));
        }
        let (_dir, pipeline) = pipeline(Arc::new(space), BackendKind::Hunyuan3D2);

        match pipeline.run("a boat").await {
            Err(MayaError::Backend(msg)) => assert_eq!(msg, quota),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let model = Arc::new(ScriptedSpace::new("tencent/Hunyuan3D-2"));
        let (_dir, pipeline) = pipeline(model, BackendKind::Hunyuan3D2);
        assert!(matches!(
            pipeline.run("   ").await,
            Err(MayaError::MissingData(_))
        ));
    }
}
