// Sandbox file-attachment preview modules
pub mod cache;
pub mod error;
pub mod fetch;
pub mod file_type;
pub mod renderer;
pub mod url;
pub mod view;

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use futures::future::join_all;
use tracing::{debug, info};

use crate::shared::config::{PreviewConfig, ProxyConfig};
use cache::ContentCache;
use fetch::{AuthSession, CachingFetcher, FetchSnapshot, FileFetcher, HttpFileFetcher};
use renderer::RendererRegistry;
use view::{AttachmentOptions, AttachmentView, ClickCallback, FileAttachmentView, FileDescriptor};

/// Resolves, fetches and renders attachments against one backend, sharing a
/// single content cache.
pub struct PreviewPipeline<F> {
    fetcher: CachingFetcher<F>,
    registry: RendererRegistry,
    backend_url: String,
    auth: AuthSession,
    proxy: Option<ProxyConfig>,
    on_click: Option<ClickCallback>,
}

impl<F: FileFetcher> PreviewPipeline<F> {
    pub fn new(
        fetcher: F,
        cache: Arc<ContentCache>,
        config: &PreviewConfig,
        auth: AuthSession,
    ) -> Self {
        Self {
            fetcher: CachingFetcher::new(fetcher, cache, &config.backend_url),
            registry: RendererRegistry::with_defaults(),
            backend_url: config.backend_url.clone(),
            auth,
            proxy: config.proxy.clone(),
            on_click: None,
        }
    }

    #[allow(dead_code)]
    pub fn with_registry(mut self, registry: RendererRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_on_click(mut self, on_click: ClickCallback) -> Self {
        self.on_click = Some(on_click);
        self
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        self.fetcher.cache()
    }

    pub fn attachment_url(&self, descriptor: &FileDescriptor, options: &AttachmentOptions) -> String {
        let resolved = url::attachment_url(
            &self.backend_url,
            descriptor.sandbox_id(),
            &descriptor.path,
            options.local_preview_url.as_deref(),
        );
        match self.proxy.as_ref() {
            Some(proxy) => url::rewrite_proxy_url(&resolved, &proxy.host_suffix, &proxy.local_base),
            None => resolved,
        }
    }

    /// Build the view without fetching anything.
    pub fn open(&self, descriptor: FileDescriptor, options: AttachmentOptions) -> FileAttachmentView {
        let file_url = self.attachment_url(&descriptor, &options);
        let view = FileAttachmentView::new(descriptor, options, self.auth.clone(), file_url);
        match self.on_click.as_ref() {
            Some(on_click) => view.with_on_click(on_click.clone()),
            None => view,
        }
    }

    /// Build the view and fetch whatever its current inputs require.
    pub async fn load(
        &self,
        descriptor: FileDescriptor,
        options: AttachmentOptions,
    ) -> FileAttachmentView {
        let mut view = self.open(descriptor, options);
        let requirements = view.requirements();

        if let Some(request) = requirements.image.as_ref() {
            view.apply_image_snapshot(FetchSnapshot::loading());
            debug!("{} -> {}", request.path, view.state());
            let snapshot = self
                .fetcher
                .fetch_image_content(&request.sandbox_id, &request.path)
                .await;
            view.apply_image_snapshot(snapshot);
        }

        if let Some(request) = requirements.content.as_ref() {
            view.apply_content_snapshot(FetchSnapshot::loading());
            debug!("{} -> {}", request.path, view.state());
            let snapshot = self
                .fetcher
                .fetch_file_content(&request.sandbox_id, &request.path)
                .await;
            view.apply_content_snapshot(snapshot);
        }

        debug!("{} -> {}", view.descriptor().path, view.state());
        view
    }

    /// Grid layout: every attachment expanded, fetched concurrently.
    pub async fn load_grid(
        &self,
        paths: &[String],
        sandbox_id: Option<&str>,
        preview_enabled: bool,
    ) -> Vec<FileAttachmentView> {
        let loads = paths.iter().map(|path| {
            let descriptor = FileDescriptor::new(path.clone(), sandbox_id.map(str::to_string));
            let options = AttachmentOptions {
                preview_enabled,
                collapsed: false,
                local_preview_url: None,
            };
            self.load(descriptor, options)
        });
        join_all(loads).await
    }

    pub fn render(&self, view: &FileAttachmentView) -> AttachmentView {
        view.render(&self.registry)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve, fetch and render one attachment
    Inspect {
        path: String,
        #[arg(long, env = "SANDBOX_ID")]
        sandbox_id: Option<String>,
        /// Show the attachment as a plain card even for HTML, Markdown and CSV
        #[arg(long)]
        collapsed: bool,
        #[arg(long)]
        no_preview: bool,
        #[arg(long)]
        local_preview_url: Option<String>,
        /// Simulate a click on the attachment
        #[arg(long)]
        click: bool,
        #[arg(long)]
        json: bool,
    },
    /// Render several attachments as an expanded grid
    Grid {
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long, env = "SANDBOX_ID")]
        sandbox_id: Option<String>,
        #[arg(long)]
        no_preview: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print the category, label, icon and language of a filename
    Classify { filename: String },
    /// Print the content URL for a path
    Resolve {
        path: String,
        #[arg(long, env = "SANDBOX_ID")]
        sandbox_id: Option<String>,
    },
}

pub async fn run(config: PreviewConfig, command: Command) -> Result<()> {
    match command {
        Command::Classify { filename } => {
            let category = file_type::classify(&filename);
            let extension = file_type::extension_of(&filename);
            println!("category: {}", category.as_str());
            println!("label:    {}", file_type::label(category, Some(extension.as_str())));
            println!("icon:     {}", category.icon_name());
            println!("language: {}", file_type::language_for_filename(&filename));
            Ok(())
        }
        Command::Resolve { path, sandbox_id } => {
            println!(
                "{}",
                url::resolve_file_url(&config.backend_url, sandbox_id.as_deref(), &path)
            );
            Ok(())
        }
        Command::Inspect {
            path,
            sandbox_id,
            collapsed,
            no_preview,
            local_preview_url,
            click,
            json,
        } => {
            let pipeline = build_pipeline(&config)?;
            let descriptor = FileDescriptor::new(path, sandbox_id);
            let options = AttachmentOptions {
                preview_enabled: !no_preview,
                collapsed,
                local_preview_url,
            };
            let view = pipeline.load(descriptor, options).await;
            if click && !view.click() {
                info!("Click ignored in state {}", view.state());
            }
            print_views(&[pipeline.render(&view)], json)
        }
        Command::Grid {
            paths,
            sandbox_id,
            no_preview,
            json,
        } => {
            let pipeline = build_pipeline(&config)?;
            let views = pipeline
                .load_grid(&paths, sandbox_id.as_deref(), !no_preview)
                .await;
            let rendered: Vec<AttachmentView> = views.iter().map(|v| pipeline.render(v)).collect();
            info!(
                "Rendered {} attachments ({} cached URLs)",
                rendered.len(),
                pipeline.cache().len()
            );
            print_views(&rendered, json)
        }
    }
}

fn build_pipeline(config: &PreviewConfig) -> Result<PreviewPipeline<HttpFileFetcher>> {
    let auth = AuthSession::new(config.access_token.clone());
    let fetcher = HttpFileFetcher::new(&config.backend_url, auth.clone(), config.request_timeout())?;
    let cache = Arc::new(ContentCache::with_capacity(config.cache_capacity));
    info!(
        "Using backend {} (cache capacity: {})",
        config.backend_url,
        cache
            .capacity()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );

    let on_click: ClickCallback = Arc::new(|path: &str| info!("Open requested for {}", path));
    Ok(PreviewPipeline::new(fetcher, cache, config, auth).with_on_click(on_click))
}

fn print_views(views: &[AttachmentView], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(views)?);
        return Ok(());
    }

    for view in views {
        println!("{} [{}]", view.filename, view.state);
        println!("  {} · {} · {}", view.label, view.size, view.icon);
        println!("  url: {}", view.url);
        if let Some(src) = view.image_src.as_ref() {
            let shown: String = src.chars().take(80).collect();
            println!("  image: {}", shown);
        }
        if let Some(renderer::RenderOutcome::Rendered(preview)) = view.preview.as_ref() {
            if let Some(title) = preview.title.as_ref() {
                println!("  title: {}", title);
            }
            for line in preview.body.lines().take(20) {
                println!("  | {}", line);
            }
        }
        if let Some(message) = view.message.as_ref() {
            println!("  {}", message);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use view::PresentationState;

    struct StaticFetcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FileFetcher for StaticFetcher {
        async fn fetch_file_content(&self, _sandbox_id: &str, path: &str) -> FetchSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.contains("missing") {
                FetchSnapshot::failed("File missing.csv not found")
            } else {
                FetchSnapshot::ready("a,b\n1,2")
            }
        }

        async fn fetch_image_content(&self, _sandbox_id: &str, _path: &str) -> FetchSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FetchSnapshot::ready("data:image/png;base64,AA==")
        }
    }

    fn pipeline(config: &PreviewConfig) -> (PreviewPipeline<StaticFetcher>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = StaticFetcher {
            calls: calls.clone(),
        };
        let pipeline = PreviewPipeline::new(
            fetcher,
            Arc::new(ContentCache::unbounded()),
            config,
            AuthSession::new(Some("tok".to_string())),
        );
        (pipeline, calls)
    }

    fn expanded() -> AttachmentOptions {
        AttachmentOptions {
            collapsed: false,
            ..AttachmentOptions::default()
        }
    }

    #[tokio::test]
    async fn test_load_csv_preview() {
        let (pipeline, calls) = pipeline(&PreviewConfig::default());
        let view = pipeline
            .load(FileDescriptor::new("out/table.csv", Some("sb".to_string())), expanded())
            .await;

        assert_eq!(
            view.state(),
            PresentationState::PreviewReady {
                renderer: Some(renderer::RendererKind::Csv)
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rendered = pipeline.render(&view);
        assert!(rendered.url.contains("/sandboxes/sb/files/content?path=%2Fworkspace%2Fout%2Ftable.csv"));
    }

    #[tokio::test]
    async fn test_load_image_with_token() {
        let (pipeline, _) = pipeline(&PreviewConfig::default());
        let view = pipeline
            .load(
                FileDescriptor::new("shot.png", Some("sb".to_string())),
                AttachmentOptions::default(),
            )
            .await;

        assert_eq!(view.state(), PresentationState::ImageReady);
        assert_eq!(view.image_source().as_deref(), Some("data:image/png;base64,AA=="));
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_error_state() {
        let (pipeline, calls) = pipeline(&PreviewConfig::default());
        let descriptor = FileDescriptor::new("missing.csv", Some("sb".to_string()));

        let first = pipeline.load(descriptor.clone(), expanded()).await;
        let second = pipeline.load(descriptor, expanded()).await;

        assert_eq!(first.state(), PresentationState::PreviewError);
        assert_eq!(second.state(), PresentationState::PreviewError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_card_does_not_fetch() {
        let (pipeline, calls) = pipeline(&PreviewConfig::default());
        let view = pipeline
            .load(
                FileDescriptor::new("bundle.zip", Some("sb".to_string())),
                expanded(),
            )
            .await;

        assert_eq!(view.state(), PresentationState::GenericCard);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_grid_shares_cache() {
        let (pipeline, calls) = pipeline(&PreviewConfig::default());
        let paths = vec![
            "a.csv".to_string(),
            "/workspace/a.csv".to_string(),
            "b.md".to_string(),
            "c.zip".to_string(),
        ];

        let first = pipeline.load_grid(&paths[..1], Some("sb"), true).await;
        let views = pipeline.load_grid(&paths, Some("sb"), true).await;

        assert_eq!(first.len(), 1);
        assert_eq!(views.len(), 4);
        // a.csv once, b.md once; /workspace/a.csv resolves to the cached URL
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(views[3].state(), PresentationState::GenericCard);
    }

    #[test]
    fn test_attachment_url_rewrites_proxy() {
        let config = PreviewConfig {
            proxy: Some(ProxyConfig {
                host_suffix: "proxy.example.works".to_string(),
                local_base: "http://127.0.0.1:3000".to_string(),
            }),
            ..PreviewConfig::default()
        };
        let (pipeline, _) = pipeline(&config);
        let descriptor = FileDescriptor::new("https://8000-abc.proxy.example.works/index.html", None);

        assert_eq!(
            pipeline.attachment_url(&descriptor, &AttachmentOptions::default()),
            "http://127.0.0.1:3000/8000-abc/index.html"
        );
    }

    #[tokio::test]
    async fn test_custom_registry_without_csv() {
        let (pipeline, _) = pipeline(&PreviewConfig::default());
        let mut registry = RendererRegistry::empty();
        registry.register(Box::new(renderer::MarkdownRenderer));
        let pipeline = pipeline.with_registry(registry);

        let view = pipeline
            .load(FileDescriptor::new("t.csv", Some("sb".to_string())), expanded())
            .await;
        let rendered = pipeline.render(&view);

        assert!(matches!(
            rendered.preview,
            Some(renderer::RenderOutcome::Mismatch { .. })
        ));
        assert_eq!(rendered.message.as_deref(), Some(renderer::NO_PREVIEW_MESSAGE));
    }

    #[test]
    fn test_open_attaches_click_handler() {
        let (pipeline, _) = pipeline(&PreviewConfig::default());
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = clicks.clone();
        let pipeline = pipeline.with_on_click(Arc::new(move |_path: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let view = pipeline.open(FileDescriptor::new("notes.txt", None), AttachmentOptions::default());
        assert!(view.click());
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }
}
