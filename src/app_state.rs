use std::sync::Arc;

use crate::{
    api::FeedApi,
    config::Config,
    feed::{ThreadMaterializer, TraversalLimits},
    store::SqliteStore,
};

#[derive(Clone)]
pub struct AppState {
    pub feed_api: FeedApi,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = SqliteStore::new(&config.database.url, config.cache.capacity).await?;
        store.init().await?;
        let store = Arc::new(store);

        // The SQLite store backs both repository seams
        let materializer = Arc::new(ThreadMaterializer::new(
            store.clone(),
            store,
            TraversalLimits::from_config(&config.feed),
        ));

        Ok(Self {
            feed_api: FeedApi::new(materializer),
            config,
        })
    }
}
