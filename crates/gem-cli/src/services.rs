//! Bundles every persistent store behind one `Services` context,
//! constructed once from the profile directory and handed to every
//! command — the "services" context named in the engine's design
//! notes, used here in place of module-level singletons.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use gem::request::{GmRequest, RequestContext};
use gem::store::bookmarks::Bookmarks;
use gem::store::feeds::{FeedAggregator, FeedFetcher};
use gem::store::identity::IdentityStore;
use gem::store::sitespec::SiteSpecStore;
use gem::store::trust::TrustStore;
use gem::store::visits::VisitLog;
use gem::store::StoreResult;

/// Up to this many transparent redirects are followed per feed job,
/// matching spec §4.9.
const MAX_FEED_REDIRECTS: u32 = 5;

/// Fetches a feed source URL by driving a real [`GmRequest`] through
/// the same pipeline interactive fetches use, transparently following
/// up to [`MAX_FEED_REDIRECTS`] redirects.
struct PipelineFetcher {
    ctx: Arc<RequestContext>,
}

impl FeedFetcher for PipelineFetcher {
    fn fetch(
        &self,
        url: String,
    ) -> Pin<Box<dyn Future<Output = StoreResult<(String, Vec<u8>)>> + Send>> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let mut current = url;
            for _ in 0..=MAX_FEED_REDIRECTS {
                let req = GmRequest::new(ctx.clone());
                req.set_url(&current)
                    .map_err(|e| gem::store::StoreError::Fetch(e.to_string()))?;
                req.submit()
                    .await
                    .map_err(|e| gem::store::StoreError::Fetch(e.to_string()))?;
                let resp = req.lock_response();
                if resp.status_code.map(|c| c.is_redirect()).unwrap_or(false) {
                    let target = resp.meta.clone();
                    drop(resp);
                    current = gem::GemUrl::parse(&current)
                        .ok()
                        .and_then(|base| base.absoluteize(&target).ok())
                        .map(|u| u.to_string())
                        .unwrap_or(target);
                    continue;
                }
                return Ok((resp.meta.clone(), resp.body.clone()));
            }
            Err(gem::store::StoreError::Fetch(format!(
                "too many redirects (> {MAX_FEED_REDIRECTS})"
            )))
        })
    }
}

/// Every long-lived store and the shared request context, loaded once
/// from a profile directory.
pub struct Services {
    pub data_dir: std::path::PathBuf,
    pub trust: Arc<TrustStore>,
    pub identities: Arc<IdentityStore>,
    pub bookmarks: Arc<Bookmarks>,
    pub visits: Arc<VisitLog>,
    pub site_spec: Arc<SiteSpecStore>,
    pub feeds: Arc<FeedAggregator>,
    pub request_ctx: Arc<RequestContext>,
}

impl Services {
    /// Load (or create empty) every store from `data_dir`.
    pub fn load(data_dir: std::path::PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let trust = Arc::new(TrustStore::load(&data_dir));
        let identities = Arc::new(IdentityStore::load(&data_dir)?);
        let bookmarks = Arc::new(Bookmarks::load(&data_dir));
        let visits = Arc::new(VisitLog::load(&data_dir));
        let site_spec = Arc::new(SiteSpecStore::load(&data_dir));

        let request_ctx = Arc::new(RequestContext::new(
            trust.clone(),
            identities.clone(),
            site_spec.clone(),
        ));
        let fetcher: Arc<dyn FeedFetcher> = Arc::new(PipelineFetcher { ctx: request_ctx.clone() });
        let feeds = Arc::new(FeedAggregator::load(&data_dir, fetcher));

        Ok(Self {
            data_dir,
            trust,
            identities,
            bookmarks,
            visits,
            site_spec,
            feeds,
            request_ctx,
        })
    }
}
