//! Renderers turn producer messages into client surface traffic.

pub mod debug;
mod surface;

use std::sync::Arc;

use crate::config::Config;
use crate::context::RenderContext;
use crate::env::EnvironmentKind;
use crate::exchange::DEFAULT_TOPIC;
use crate::message::Message;
use crate::transport::SurfaceFactory;

pub use debug::DebugCapture;
pub use surface::SurfaceRenderer;

pub trait Renderer: Send + Sync {
    /// Feed one message from the producer side.
    fn update(&self, message: Message, topic: &str);

    fn update_default(&self, message: Message) {
        self.update(message, DEFAULT_TOPIC);
    }
}

/// Renderer for hosts that cannot display anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn update(&self, _message: Message, _topic: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Surface,
    Null,
}

#[derive(Debug)]
enum Selected {
    Surface(SurfaceRenderer),
    Null(NullRenderer),
}

/// Picks a renderer for the host environment.
///
/// Notebook-like hosts with a surface factory get a [`SurfaceRenderer`];
/// everything else gets a [`NullRenderer`].
#[derive(Debug)]
pub struct AutoRenderer {
    selected: Selected,
}

impl AutoRenderer {
    pub fn new(ctx: &RenderContext, factory: Option<Arc<dyn SurfaceFactory>>, config: &Config) -> Self {
        let selected = match (ctx.environment.kind(), factory) {
            (EnvironmentKind::Notebook, Some(factory)) => {
                Selected::Surface(SurfaceRenderer::new(ctx, factory, config))
            }
            (EnvironmentKind::Notebook, None) => {
                tracing::info!("no client surface available, rendering disabled");
                Selected::Null(NullRenderer)
            }
            (EnvironmentKind::Terminal, _) => Selected::Null(NullRenderer),
            (EnvironmentKind::Unknown, _) => {
                tracing::error!("host environment detection failed, no renderer will be provided");
                Selected::Null(NullRenderer)
            }
        };
        tracing::debug!(kind = ?Self::kind_of(&selected), "renderer selected");
        Self { selected }
    }

    fn kind_of(selected: &Selected) -> RendererKind {
        match selected {
            Selected::Surface(_) => RendererKind::Surface,
            Selected::Null(_) => RendererKind::Null,
        }
    }

    pub fn kind(&self) -> RendererKind {
        Self::kind_of(&self.selected)
    }

    pub fn as_surface(&self) -> Option<&SurfaceRenderer> {
        match &self.selected {
            Selected::Surface(renderer) => Some(renderer),
            Selected::Null(_) => None,
        }
    }
}

impl Renderer for AutoRenderer {
    fn update(&self, message: Message, topic: &str) {
        match &self.selected {
            Selected::Surface(renderer) => renderer.update(message, topic),
            Selected::Null(renderer) => renderer.update(message, topic),
        }
    }
}
