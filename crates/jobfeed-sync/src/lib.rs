//! Fetch cycle orchestration: paginate the upstream feed, normalize, order newest first.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobfeed_adapters::{normalize_all, PagePayload};
use jobfeed_core::CanonicalJobRecord;
use jobfeed_http::{
    CachePolicy, FetchError, FetchStrategyResolver, HttpClientConfig, ReqwestTransport,
    RequestOptions, Transport,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-sync";

pub const DEFAULT_PORTAL: &str = "metarh";
pub const DEFAULT_PER_PAGE: u32 = 100;
/// Safety bound for an upstream that never returns an empty page.
pub const DEFAULT_PAGE_CEILING: u32 = 50;
pub const DEFAULT_USER_AGENT: &str = "jobfeed-widget/0.1";

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub endpoint: Url,
    pub api_token: String,
    pub portal: String,
    pub per_page: u32,
    pub max_pages: u32,
    pub http_timeout_secs: Option<u64>,
    pub user_agent: String,
    pub relays_enabled: bool,
}

impl FeedConfig {
    pub fn new(base_url: &str, api_token: impl Into<String>) -> Result<Self> {
        let raw = format!("{}/jobfeed/index", base_url.trim().trim_end_matches('/'));
        let endpoint = Url::parse(&raw).with_context(|| format!("invalid feed base url {base_url}"))?;
        Ok(Self {
            endpoint,
            api_token: api_token.into(),
            portal: DEFAULT_PORTAL.to_string(),
            per_page: DEFAULT_PER_PAGE,
            max_pages: DEFAULT_PAGE_CEILING,
            http_timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            relays_enabled: true,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`FeedConfig::from_env`] against an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("JOBFEED_BASE_URL").context("JOBFEED_BASE_URL must be set")?;
        let api_token = lookup("JOBFEED_API_TOKEN").context("JOBFEED_API_TOKEN must be set")?;
        let mut config = Self::new(&base_url, api_token)?;

        if let Some(portal) = lookup("JOBFEED_PORTAL") {
            config.portal = portal;
        }
        config.per_page = lookup("JOBFEED_PER_PAGE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PER_PAGE)
            .max(1);
        config.max_pages = lookup("JOBFEED_MAX_PAGES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_CEILING)
            .max(1);
        config.http_timeout_secs = lookup("JOBFEED_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok());
        if let Some(user_agent) = lookup("JOBFEED_USER_AGENT") {
            config.user_agent = user_agent;
        }
        config.relays_enabled = lookup("JOBFEED_RELAYS_ENABLED")
            .map(|v| !matches!(v.as_str(), "0" | "false" | "FALSE" | "False"))
            .unwrap_or(true);
        Ok(config)
    }

    /// Page URL with a cache-busting `_t` parameter.
    pub fn page_url(&self, page: u32, timestamp_ms: i64) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("portal", &self.portal)
            .append_pair("per_page", &self.per_page.to_string())
            .append_pair("page", &page.to_string())
            .append_pair("_t", &timestamp_ms.to_string());
        url.into()
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::get()
            .header("Accept", "application/json")
            .header("X-Api-Key", self.api_token.clone())
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .cache(CachePolicy::NoStore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A page came back with no records.
    EmptyPage,
    /// Stopped at the page ceiling; records gathered so far are kept.
    CeilingReached,
}

#[derive(Debug, Clone)]
pub struct PagedFetch {
    pub records: Vec<JsonValue>,
    pub pages_requested: u32,
    pub termination: Termination,
}

/// Requests pages one at a time until an empty page or the ceiling.
pub struct PaginationDriver<'a> {
    resolver: &'a FetchStrategyResolver,
    config: &'a FeedConfig,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(resolver: &'a FetchStrategyResolver, config: &'a FeedConfig) -> Self {
        Self { resolver, config }
    }

    /// Any page failure aborts the whole fetch; no partial list is returned.
    pub async fn fetch_all_pages(&self) -> Result<PagedFetch, FetchError> {
        let options = self.config.request_options();
        let mut records = Vec::new();

        for page in 1..=self.config.max_pages {
            let url = self.config.page_url(page, Utc::now().timestamp_millis());
            debug!(page, "requesting page");

            let payload = self.resolver.resolve(&url, &options).await?;
            let items = PagePayload::parse(payload).into_records(page);
            if items.is_empty() {
                return Ok(PagedFetch {
                    records,
                    pages_requested: page,
                    termination: Termination::EmptyPage,
                });
            }
            records.extend(items);
        }

        warn!(
            max_pages = self.config.max_pages,
            records = records.len(),
            "page ceiling reached before an empty page"
        );
        Ok(PagedFetch {
            records,
            pages_requested: self.config.max_pages,
            termination: Termination::CeilingReached,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_requested: u32,
    pub raw_records: usize,
    pub jobs: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone)]
pub struct FeedRun {
    pub summary: FeedRunSummary,
    pub jobs: Vec<CanonicalJobRecord>,
}

pub struct FeedPipeline {
    config: FeedConfig,
    resolver: FetchStrategyResolver,
}

impl FeedPipeline {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(HttpClientConfig {
            timeout: config.http_timeout_secs.map(Duration::from_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: FeedConfig, transport: Arc<dyn Transport>) -> Self {
        let resolver = if config.relays_enabled {
            FetchStrategyResolver::new(transport)
        } else {
            FetchStrategyResolver::direct_only(transport)
        };
        Self { config, resolver }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// One end-to-end fetch cycle producing a wholly new, sorted job list.
    pub async fn run_once(&self) -> Result<FeedRun, FetchError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("feed_fetch", %run_id, portal = %self.config.portal);

        async {
            let paged = PaginationDriver::new(&self.resolver, &self.config)
                .fetch_all_pages()
                .await
                .inspect_err(|err| warn!(error = %err, kind = ?err.kind(), "feed fetch aborted"))?;

            let jobs = normalize_all(&paged.records);
            let summary = FeedRunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                pages_requested: paged.pages_requested,
                raw_records: paged.records.len(),
                jobs: jobs.len(),
                termination: paged.termination,
            };
            info!(
                pages = summary.pages_requested,
                jobs = summary.jobs,
                termination = ?summary.termination,
                "feed fetch complete"
            );
            Ok(FeedRun { summary, jobs })
        }
        .instrument(span)
        .await
    }

    pub async fn fetch_jobs(&self) -> Result<Vec<CanonicalJobRecord>, FetchError> {
        Ok(self.run_once().await?.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use jobfeed_core::JobId;
    use jobfeed_http::{StatusCode, TransportResponse};
    use serde_json::json;

    type Responder = Box<dyn Fn(u32) -> Result<TransportResponse, FetchError> + Send + Sync>;

    /// Answers by page number and records every request.
    struct PagedTransport {
        respond: Responder,
        calls: Mutex<Vec<(String, RequestOptions)>>,
    }

    impl PagedTransport {
        fn new(respond: impl Fn(u32) -> Result<TransportResponse, FetchError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(respond),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for PagedTransport {
        async fn send(&self, url: &str, options: &RequestOptions) -> Result<TransportResponse, FetchError> {
            self.calls.lock().unwrap().push((url.to_string(), options.clone()));
            let parsed = Url::parse(url).unwrap();
            let page = parsed
                .query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap();
            (self.respond)(page)
        }
    }

    fn ok_json(body: JsonValue) -> Result<TransportResponse, FetchError> {
        Ok(TransportResponse {
            status: StatusCode::OK,
            final_url: "https://api.example.test/jobfeed/index".to_string(),
            body: serde_json::to_vec(&body).unwrap(),
        })
    }

    fn page_of(n: usize, page: u32) -> JsonValue {
        let items: Vec<_> = (0..n)
            .map(|i| json!({"id": format!("{page}-{i}"), "title": "Analista"}))
            .collect();
        json!({ "data": items })
    }

    fn config() -> FeedConfig {
        let mut config = FeedConfig::new("https://api.example.test/v2/", "token-123").unwrap();
        config.relays_enabled = false;
        config
    }

    #[tokio::test]
    async fn stops_at_first_empty_page() {
        let counts = [100, 100, 0];
        let transport = PagedTransport::new(move |page| ok_json(page_of(counts[page as usize - 1], page)));
        let pipeline = FeedPipeline::with_transport(config(), transport.clone());

        let run = pipeline.run_once().await.unwrap();
        assert_eq!(transport.urls().len(), 3);
        assert_eq!(run.summary.pages_requested, 3);
        assert_eq!(run.summary.raw_records, 200);
        assert_eq!(run.jobs.len(), 200);
        assert_eq!(run.summary.termination, Termination::EmptyPage);
    }

    #[tokio::test]
    async fn page_ceiling_returns_accumulated_records() {
        let transport = PagedTransport::new(|page| ok_json(page_of(100, page)));
        let pipeline = FeedPipeline::with_transport(config(), transport.clone());

        let run = pipeline.run_once().await.unwrap();
        assert_eq!(transport.urls().len(), DEFAULT_PAGE_CEILING as usize);
        assert_eq!(run.jobs.len(), DEFAULT_PAGE_CEILING as usize * 100);
        assert_eq!(run.summary.termination, Termination::CeilingReached);
    }

    #[tokio::test]
    async fn failure_on_any_page_discards_everything() {
        let transport = PagedTransport::new(|page| match page {
            1 => ok_json(page_of(100, page)),
            _ => Err(FetchError::Transport {
                url: "https://api.example.test/jobfeed/index".to_string(),
                message: "connection reset".to_string(),
            }),
        });
        let pipeline = FeedPipeline::with_transport(config(), transport.clone());

        let err = pipeline.fetch_jobs().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
        assert_eq!(transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn malformed_page_ends_pagination() {
        let transport = PagedTransport::new(|page| match page {
            1 => ok_json(json!([{"id": 1}, {"id": 2}])),
            _ => ok_json(json!({"error": "unexpected"})),
        });
        let pipeline = FeedPipeline::with_transport(config(), transport.clone());

        let run = pipeline.run_once().await.unwrap();
        assert_eq!(run.jobs.len(), 2);
        assert_eq!(run.summary.pages_requested, 2);
        assert_eq!(run.summary.termination, Termination::EmptyPage);
    }

    #[tokio::test]
    async fn requests_carry_paging_params_and_headers() {
        let transport = PagedTransport::new(|page| ok_json(page_of(if page == 1 { 1 } else { 0 }, page)));
        let pipeline = FeedPipeline::with_transport(config(), transport.clone());
        pipeline.run_once().await.unwrap();

        let calls = transport.calls.lock().unwrap();
        let (url, options) = &calls[1];
        let parsed = Url::parse(url).unwrap();
        assert_eq!(parsed.path(), "/v2/jobfeed/index");
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["portal"], "metarh");
        assert_eq!(params["per_page"], "100");
        assert_eq!(params["page"], "2");
        assert!(params["_t"].parse::<i64>().is_ok());

        assert_eq!(options.header_value("X-Api-Key"), Some("token-123"));
        assert_eq!(options.header_value("Accept"), Some("application/json"));
        assert_eq!(options.header_value("Pragma"), Some("no-cache"));
        assert_eq!(options.cache, CachePolicy::NoStore);
    }

    #[tokio::test]
    async fn jobs_come_back_newest_first() {
        let transport = PagedTransport::new(|page| match page {
            1 => ok_json(json!({"data": [
                {"id": 1, "publicationDate": "2024-01-01"},
                {"id": 2, "publicationDate": "2024-03-01"},
            ]})),
            2 => ok_json(json!({"data": [{"id": 3, "publicationDate": "2023-12-01"}]})),
            _ => ok_json(json!({"data": []})),
        });
        let pipeline = FeedPipeline::with_transport(config(), transport);

        let ids: Vec<_> = pipeline.fetch_jobs().await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![JobId::Number(2), JobId::Number(1), JobId::Number(3)]);
    }

    #[tokio::test]
    async fn auth_failure_aborts_before_any_relay() {
        let transport = PagedTransport::new(|_| Ok(TransportResponse {
            status: StatusCode::FORBIDDEN,
            final_url: "https://api.example.test/jobfeed/index".to_string(),
            body: Vec::new(),
        }));
        let mut cfg = config();
        cfg.relays_enabled = true;
        let pipeline = FeedPipeline::with_transport(cfg, transport.clone());

        let err = pipeline.fetch_jobs().await.unwrap_err();
        assert!(matches!(err, FetchError::Auth { status: 403, .. }));
        assert_eq!(transport.urls().len(), 1);
    }

    #[test]
    fn config_reads_overrides_and_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JOBFEED_BASE_URL", "https://api.example.test/v2"),
            ("JOBFEED_API_TOKEN", "abc"),
            ("JOBFEED_MAX_PAGES", "5"),
            ("JOBFEED_RELAYS_ENABLED", "false"),
        ]);
        let config = FeedConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.endpoint.as_str(), "https://api.example.test/v2/jobfeed/index");
        assert_eq!(config.api_token, "abc");
        assert_eq!(config.portal, DEFAULT_PORTAL);
        assert_eq!(config.per_page, DEFAULT_PER_PAGE);
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.http_timeout_secs, None);
        assert!(!config.relays_enabled);
    }

    #[test]
    fn config_requires_base_url_and_token() {
        let err = FeedConfig::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("JOBFEED_BASE_URL"));

        let err = FeedConfig::from_lookup(|k| (k == "JOBFEED_BASE_URL").then(|| "https://x.test".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("JOBFEED_API_TOKEN"));
    }
}
