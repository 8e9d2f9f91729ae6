use async_trait::async_trait;

use crate::message::{RawRequest, Reply};

/// Inbound seam between a transport and whatever resolves its requests.
///
/// Transports only know how to build a [`RawRequest`] and write back a
/// [`Reply`]; procedure semantics live behind this trait.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, request: RawRequest) -> Reply;
}
