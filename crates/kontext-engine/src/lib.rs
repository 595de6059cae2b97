//! Gallery, layout and request reconciliation for the Kontext image studio.
//!
//! Everything here is single-threaded: components share state through `Rc<RefCell<_>>` and
//! background reveal tasks are spawned with `tokio::task::spawn_local`, so a [`Session`] must
//! be driven from inside a `tokio::task::LocalSet`.

pub mod assets;
pub mod commands;
pub mod error;
pub mod gallery;
pub mod gateway;
pub mod http;
pub mod layout;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod session;
pub mod surface;
pub mod uploads;

#[cfg(test)]
mod test_support;

pub use assets::{AssetLoader, AssetStatus, ImmediateAssets};
pub use commands::{BatchOutcome, DeleteOutcome, GalleryCommands};
pub use error::{GatewayError, GenerationError, TransportError, ValidationError};
pub use gallery::{GalleryStore, SharedGallery};
pub use gateway::{GenerationRequest, RemoteGateway, UploadFile};
pub use http::{GatewayConfig, HttpAssetProbe, HttpGateway};
pub use layout::{column_count, LayoutEngine, LayoutState, ViewMode, Viewport};
pub use notify::{Notice, NoticeLevel, NotificationCenter, Notifier};
pub use orchestrator::{GenerationForm, GenerationOrchestrator, GenerationOutcome, GenerationPhase};
pub use scheduler::{Scheduler, TimerKey};
pub use session::{Session, SessionConfig, SessionParts, SessionReply};
pub use surface::{MemorySurface, PlaceholderBatch, RenderSurface, SurfaceCard, UploadState};
pub use uploads::{DropOutcome, StagedReference, UploadPipeline};
