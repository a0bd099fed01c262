pub mod aggregator;
pub mod click;
pub mod creative;
pub mod error;
pub mod host;
pub mod macros;
pub mod models;
pub mod network;
pub mod offset;
pub mod parser;
pub mod settings;
pub mod tracking;
pub mod video_config;
pub mod xml;

pub use aggregator::{Aggregation, Aggregator, NoAdReason};
pub use error::{Result, VastError};
pub use settings::Settings;
pub use tracking::{TickReport, TrackingSession};
pub use video_config::VastVideoConfig;

pub mod async_api {
    use crate::aggregator::{Aggregation, Aggregator};
    use crate::error::{Result, VastError};
    use crate::host::TrackerDispatcher;
    use crate::network::{DefaultFetcher, VastFetcher};
    use crate::settings::Settings;

    // Fetching and resolving block on HTTP, so both run on the blocking pool
    async fn blocking<T, F>(work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| VastError::Other(format!("Blocking task failed: {e}")))?
    }

    /// Read a VAST document from a URL, `file://` URL or local path
    pub async fn fetch_vast_content(input: String, settings: Settings) -> Result<String> {
        blocking(move || DefaultFetcher::new(&settings)?.fetch(&input)).await
    }

    /// Fetch `input` and resolve its wrapper chain. Error trackers go
    /// through `dispatcher`.
    pub async fn resolve_vast<D>(input: String, settings: Settings, dispatcher: D) -> Result<Aggregation>
    where
        D: TrackerDispatcher + Send + 'static,
    {
        blocking(move || {
            let fetcher = DefaultFetcher::new(&settings)?;
            let xml = fetcher.fetch(&input)?;
            Ok(Aggregator::new(settings, fetcher, dispatcher).resolve(&xml))
        })
        .await
    }
}
