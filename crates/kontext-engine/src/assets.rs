use futures::future::{self, LocalBoxFuture};
use kontext_contracts::ImageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Loaded,
    Failed,
}

/// Tells the layout when a card's image has settled, loaded or not.
pub trait AssetLoader {
    fn ready(&self, record: &ImageRecord) -> LocalBoxFuture<'static, AssetStatus>;
}

/// Every asset is already available; used headless and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateAssets;

impl AssetLoader for ImmediateAssets {
    fn ready(&self, _record: &ImageRecord) -> LocalBoxFuture<'static, AssetStatus> {
        Box::pin(future::ready(AssetStatus::Loaded))
    }
}
