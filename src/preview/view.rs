use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::fetch::{AuthSession, FetchSnapshot};
use super::file_type::{self, FileCategory};
use super::renderer::{select_renderer, PreviewInput, RenderOutcome, RendererKind, RendererRegistry};

pub type ClickCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[allow(dead_code)]
const LOCAL_BLOB_PREFIX: &str = "blob:";

/// A file referenced by an attachment, optionally living in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: String,
    pub sandbox_id: Option<String>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, sandbox_id: Option<String>) -> Self {
        Self {
            path: path.into(),
            sandbox_id: sandbox_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn filename(&self) -> &str {
        file_type::filename_of(&self.path)
    }

    pub fn extension(&self) -> String {
        file_type::extension_of(self.filename())
    }

    pub fn category(&self) -> FileCategory {
        file_type::classify(self.filename())
    }

    pub fn label(&self) -> String {
        file_type::label(self.category(), Some(self.extension().as_str()))
    }

    pub fn size_estimate(&self) -> String {
        file_type::estimate_size(&self.path, self.category())
    }

    pub fn sandbox_id(&self) -> Option<&str> {
        self.sandbox_id.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentOptions {
    pub preview_enabled: bool,
    /// Collapsed attachments never show rich previews.
    pub collapsed: bool,
    pub local_preview_url: Option<String>,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            preview_enabled: true,
            collapsed: true,
            local_preview_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub sandbox_id: String,
    pub path: String,
}

/// Data sources a view needs before its state can settle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRequirements {
    pub content: Option<FetchRequest>,
    pub image: Option<FetchRequest>,
}

impl DataRequirements {
    pub fn derive(descriptor: &FileDescriptor, options: &AttachmentOptions) -> Self {
        let request = |sandbox_id: &str| FetchRequest {
            sandbox_id: sandbox_id.to_string(),
            path: descriptor.path.clone(),
        };
        let sandbox = descriptor.sandbox_id();

        Self {
            content: sandbox
                .filter(|_| wants_rich_preview(descriptor, options))
                .map(request),
            image: sandbox
                .filter(|_| is_image_preview(descriptor, options))
                .map(request),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.image.is_none()
    }
}

pub fn is_image_preview(descriptor: &FileDescriptor, options: &AttachmentOptions) -> bool {
    descriptor.category() == FileCategory::Image && options.preview_enabled
}

pub fn wants_rich_preview(descriptor: &FileDescriptor, options: &AttachmentOptions) -> bool {
    select_renderer(&descriptor.extension()).is_some()
        && options.preview_enabled
        && !options.collapsed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PresentationState {
    ImageLoading,
    ImageError,
    ImageReady,
    PreviewLoading,
    PreviewError,
    PreviewEmpty,
    PreviewReady { renderer: Option<RendererKind> },
    GenericCard,
}

impl PresentationState {
    /// Whether a click on the attachment body opens the file.
    pub fn opens_on_click(&self) -> bool {
        !matches!(
            self,
            PresentationState::PreviewLoading | PresentationState::PreviewReady { .. }
        )
    }
}

impl fmt::Display for PresentationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PresentationState::ImageLoading => "image_loading",
            PresentationState::ImageError => "image_error",
            PresentationState::ImageReady => "image_ready",
            PresentationState::PreviewLoading => "preview_loading",
            PresentationState::PreviewError => "preview_error",
            PresentationState::PreviewEmpty => "preview_empty",
            PresentationState::PreviewReady { .. } => "preview_ready",
            PresentationState::GenericCard => "generic_card",
        };
        f.write_str(name)
    }
}

/// Pure state selection. Recomputed from scratch for every input change.
pub fn compute_state(
    descriptor: &FileDescriptor,
    options: &AttachmentOptions,
    image: &FetchSnapshot,
    content: &FetchSnapshot,
    error_flag: bool,
) -> PresentationState {
    if is_image_preview(descriptor, options) {
        if image.loading && descriptor.sandbox_id().is_some() {
            return PresentationState::ImageLoading;
        }
        if image.error.is_some() || error_flag {
            return PresentationState::ImageError;
        }
        return PresentationState::ImageReady;
    }

    if wants_rich_preview(descriptor, options) {
        if content.loading {
            return PresentationState::PreviewLoading;
        }
        if content.error.is_some() || error_flag {
            return PresentationState::PreviewError;
        }
        if content.data.as_deref().is_some_and(|data| !data.is_empty()) {
            return PresentationState::PreviewReady {
                renderer: select_renderer(&descriptor.extension()),
            };
        }
        return PresentationState::PreviewEmpty;
    }

    PresentationState::GenericCard
}

/// Everything a front end needs to draw one attachment.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub state: PresentationState,
    pub path: String,
    pub filename: String,
    pub category: FileCategory,
    pub label: String,
    pub size: String,
    pub icon: &'static str,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<RenderOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub clickable: bool,
}

/// One attachment: its inputs, the latest fetch snapshots and the local
/// error flag.
pub struct FileAttachmentView {
    descriptor: FileDescriptor,
    options: AttachmentOptions,
    auth: AuthSession,
    file_url: String,
    image: FetchSnapshot,
    content: FetchSnapshot,
    has_error: bool,
    image_fallback: Option<String>,
    on_click: Option<ClickCallback>,
}

impl FileAttachmentView {
    pub fn new(
        descriptor: FileDescriptor,
        options: AttachmentOptions,
        auth: AuthSession,
        file_url: String,
    ) -> Self {
        Self {
            descriptor,
            options,
            auth,
            file_url,
            image: FetchSnapshot::idle(),
            content: FetchSnapshot::idle(),
            has_error: false,
            image_fallback: None,
            on_click: None,
        }
    }

    pub fn with_on_click(mut self, on_click: ClickCallback) -> Self {
        self.on_click = Some(on_click);
        self
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn requirements(&self) -> DataRequirements {
        DataRequirements::derive(&self.descriptor, &self.options)
    }

    pub fn apply_image_snapshot(&mut self, snapshot: FetchSnapshot) {
        if snapshot.error.is_some() {
            self.has_error = true;
        }
        self.image = snapshot;
    }

    pub fn apply_content_snapshot(&mut self, snapshot: FetchSnapshot) {
        if snapshot.error.is_some() {
            self.has_error = true;
        }
        self.content = snapshot;
    }

    pub fn state(&self) -> PresentationState {
        compute_state(
            &self.descriptor,
            &self.options,
            &self.image,
            &self.content,
            self.has_error,
        )
    }

    /// Source for the image element: the authenticated fetch result when a
    /// sandbox and a token are present, the plain URL otherwise.
    pub fn image_source(&self) -> Option<String> {
        if self.state() != PresentationState::ImageReady {
            return None;
        }
        if let Some(fallback) = self.image_fallback.as_ref() {
            return Some(fallback.clone());
        }
        if self.descriptor.sandbox_id().is_some() && self.auth.is_authenticated() {
            self.image.data.clone()
        } else {
            Some(self.file_url.clone())
        }
    }

    /// The displayed image failed to load. Returns the local blob reference to
    /// retry with, if there is one; otherwise the view moves to `ImageError`.
    #[allow(dead_code)]
    pub fn on_image_load_failed(&mut self) -> Option<String> {
        let filename = self.descriptor.filename().to_string();
        let fallback = self
            .options
            .local_preview_url
            .as_ref()
            .filter(|u| u.starts_with(LOCAL_BLOB_PREFIX));

        match fallback {
            Some(local) if self.image_fallback.is_none() => {
                info!("Falling back to local preview for {}", filename);
                self.image_fallback = Some(local.clone());
                Some(local.clone())
            }
            _ => {
                warn!("Image failed to load: {}", filename);
                if self.descriptor.sandbox_id().is_some() && !self.auth.is_authenticated() {
                    warn!("No access token available for sandbox image {}", filename);
                }
                self.has_error = true;
                None
            }
        }
    }

    /// Click on the attachment body. Returns whether the callback ran.
    pub fn click(&self) -> bool {
        if !self.state().opens_on_click() {
            debug!("Ignoring click on {} in state {}", self.descriptor.path, self.state());
            return false;
        }
        self.open_external()
    }

    /// The explicit "open" action, available in every state.
    pub fn open_external(&self) -> bool {
        match self.on_click.as_ref() {
            Some(on_click) => {
                on_click(&self.descriptor.path);
                true
            }
            None => false,
        }
    }

    pub fn render(&self, registry: &RendererRegistry) -> AttachmentView {
        let state = self.state();
        let (preview, message) = match state {
            PresentationState::ImageError => (None, Some("Failed to load image".to_string())),
            PresentationState::PreviewError => (
                None,
                Some(format!(
                    "Error loading content (the path may need the {} prefix)",
                    super::url::WORKSPACE_ROOT
                )),
            ),
            PresentationState::PreviewEmpty => {
                (None, Some("Preview available, open the file to view it".to_string()))
            }
            PresentationState::PreviewReady { .. } => {
                let extension = self.descriptor.extension();
                let content = self.content.data.as_deref().unwrap_or_default();
                let outcome = registry.dispatch(&PreviewInput {
                    content,
                    preview_url: &self.file_url,
                    extension: &extension,
                });
                let message = match &outcome {
                    RenderOutcome::Mismatch { message } => Some(message.clone()),
                    RenderOutcome::Rendered(_) => None,
                };
                (Some(outcome), message)
            }
            _ => (None, None),
        };

        let category = self.descriptor.category();
        AttachmentView {
            state,
            path: self.descriptor.path.clone(),
            filename: self.descriptor.filename().to_string(),
            category,
            label: self.descriptor.label(),
            size: self.descriptor.size_estimate(),
            icon: category.icon_name(),
            url: self.file_url.clone(),
            image_src: self.image_source(),
            preview,
            message,
            clickable: state.opens_on_click() && self.on_click.is_some(),
        }
    }
}
