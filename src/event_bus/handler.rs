use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::types::Event;

/// A subscriber invoked by the bus for every matching event
///
/// Every handler has the same calling contract: it is awaited, and it
/// reports failure through the returned `Result`. Synchronous callbacks are
/// adapted with [`sync_handler`], async closures with [`handler_fn`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;

    /// Name used in log records
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler backed by an async closure that receives its own copy of the event
pub struct FnHandler<F, Fut> {
    name: String,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as an [`EventHandler`]
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler {
        name: name.into(),
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handler backed by a plain function, called inline
pub struct SyncHandler<F> {
    name: String,
    f: F,
}

/// Wrap a synchronous closure as an [`EventHandler`]
pub fn sync_handler<F>(name: impl Into<String>, f: F) -> SyncHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    SyncHandler {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> EventHandler for SyncHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
