//! Session-caching gateway over an [`ErpClient`]
//!
//! Owns the cross-cutting concerns the raw client does not: the session is
//! authenticated once and cached for the run, a call rejected with an
//! authorization error triggers exactly one re-authentication, and every
//! wire call runs through the retry executor. Reverse-direction flows use
//! [`ErpGateway::upsert_remote`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use labsync_core::ExternalId;

use crate::client::{ErpClient, SessionToken};
use crate::error::ErpResult;
use crate::filter::Filter;
use crate::record::{ExternalRecord, FieldValues, PageRequest, RecordPage};
use crate::retry::RetryExecutor;

/// Gateway adding session and retry handling to a raw ERP client.
pub struct ErpGateway {
    client: Arc<dyn ErpClient>,
    retry: RetryExecutor,
    session: RwLock<Option<SessionToken>>,
    page_size: u32,
}

impl ErpGateway {
    /// Wrap a client with the given retry policy and search page size.
    pub fn new(client: Arc<dyn ErpClient>, retry: RetryExecutor, page_size: u32) -> Self {
        Self {
            client,
            retry,
            session: RwLock::new(None),
            page_size,
        }
    }

    /// The configured search page size.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Authenticate and verify the execution RPC exists.
    ///
    /// Called once at engine startup; failures here are fatal configuration
    /// errors and the engine refuses to start.
    #[instrument(skip(self))]
    pub async fn probe_capabilities(&self) -> ErpResult<()> {
        let session = self.current_session().await?;
        self.client.probe(&session).await?;
        info!("ERP capability probe succeeded");
        Ok(())
    }

    /// The cached session, authenticating if none is cached yet.
    async fn current_session(&self) -> ErpResult<SessionToken> {
        {
            let guard = self.session.read().await;
            if let Some(session) = guard.as_ref() {
                return Ok(session.clone());
            }
        }

        let mut guard = self.session.write().await;
        // Another caller may have authenticated while we waited.
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let client = self.client.clone();
        let session = self.retry.execute(|| client.authenticate()).await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn drop_session(&self) {
        self.session.write().await.take();
    }

    /// Run an operation with the cached session; on an authorization error
    /// re-authenticate once and retry the operation a single time.
    async fn with_session<T, F, Fut>(&self, op: F) -> ErpResult<T>
    where
        F: Fn(SessionToken) -> Fut,
        Fut: Future<Output = ErpResult<T>>,
    {
        let session = self.current_session().await?;
        match op(session).await {
            Err(e) if e.is_auth_error() => {
                debug!("session rejected mid-run, re-authenticating once");
                self.drop_session().await;
                let session = self.current_session().await?;
                op(session).await
            }
            other => other,
        }
    }

    /// Fetch one page of records.
    pub async fn search_page(
        &self,
        model: &str,
        filter: &Filter,
        fields: &[&str],
        page: PageRequest,
    ) -> ErpResult<RecordPage> {
        self.with_session(|session| async move {
            self.retry
                .execute(|| self.client.search(&session, model, filter, fields, page))
                .await
        })
        .await
    }

    /// Create or update a remote record, returning its external id.
    ///
    /// Used only by reverse-direction flows such as clinic→partner link
    /// repair; the forward sync path never writes to the ERP.
    #[instrument(skip(self, fields), fields(model = model))]
    pub async fn upsert_remote(
        &self,
        model: &str,
        external_id: Option<&ExternalId>,
        fields: &FieldValues,
    ) -> ErpResult<ExternalId> {
        match external_id {
            Some(id) => {
                self.with_session(|session| async move {
                    self.retry
                        .execute(|| self.client.update(&session, model, id, fields))
                        .await
                })
                .await?;
                Ok(id.clone())
            }
            None => {
                self.with_session(|session| async move {
                    self.retry
                        .execute(|| self.client.create(&session, model, fields))
                        .await
                })
                .await
            }
        }
    }

    /// Start a lazy, restartable feed over all records matching `filter`.
    #[must_use]
    pub fn search_feed(
        self: Arc<Self>,
        model: impl Into<String>,
        filter: Filter,
        fields: &[&str],
        limit: Option<u32>,
    ) -> RecordFeed {
        RecordFeed {
            gateway: self,
            model: model.into(),
            filter,
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            offset: 0,
            limit,
            fetched: 0,
            exhausted: false,
        }
    }
}

/// Lazy paginated sequence of external records.
///
/// Issues successive `search` calls transparently until exhaustion or the
/// overall `limit`; pages arrive in the order the ERP returns them.
pub struct RecordFeed {
    gateway: Arc<ErpGateway>,
    model: String,
    filter: Filter,
    fields: Vec<String>,
    offset: u32,
    limit: Option<u32>,
    fetched: u32,
    exhausted: bool,
}

impl RecordFeed {
    /// Fetch the next page, or `None` once the feed is exhausted.
    pub async fn next_page(&mut self) -> ErpResult<Option<Vec<ExternalRecord>>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut page_limit = self.gateway.page_size();
        if let Some(limit) = self.limit {
            let remaining = limit.saturating_sub(self.fetched);
            if remaining == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            page_limit = page_limit.min(remaining);
        }

        let field_refs: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        let page = self
            .gateway
            .search_page(
                &self.model,
                &self.filter,
                &field_refs,
                PageRequest {
                    offset: self.offset,
                    limit: page_limit,
                },
            )
            .await?;

        let count = page.records.len() as u32;
        self.offset += count;
        self.fetched += count;
        if !page.has_more || count == 0 {
            self.exhausted = true;
        }

        if page.records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page.records))
        }
    }

    /// Reset the feed to the beginning.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.fetched = 0;
        self.exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ErpClient;
    use crate::error::ErpError;
    use crate::retry::{RetryConfig, RetryExecutor};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StubClient {
        auth_calls: AtomicUsize,
        search_calls: AtomicUsize,
        reject_first_search: AtomicBool,
        total_records: i64,
    }

    impl StubClient {
        fn new(total_records: i64) -> Self {
            Self {
                auth_calls: AtomicUsize::new(0),
                search_calls: AtomicUsize::new(0),
                reject_first_search: AtomicBool::new(false),
                total_records,
            }
        }
    }

    #[async_trait]
    impl ErpClient for StubClient {
        async fn authenticate(&self) -> ErpResult<SessionToken> {
            let n = self.auth_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SessionToken::new(format!("{}", n + 1)))
        }

        async fn probe(&self, _session: &SessionToken) -> ErpResult<()> {
            Ok(())
        }

        async fn search(
            &self,
            _session: &SessionToken,
            _model: &str,
            _filter: &Filter,
            _fields: &[&str],
            page: PageRequest,
        ) -> ErpResult<RecordPage> {
            if self.reject_first_search.swap(false, Ordering::SeqCst) {
                return Err(ErpError::auth("session expired"));
            }
            self.search_calls.fetch_add(1, Ordering::SeqCst);

            let start = i64::from(page.offset);
            let end = (start + i64::from(page.limit)).min(self.total_records);
            let records = (start..end.max(start))
                .map(|i| {
                    let id = i + 1;
                    ExternalRecord::new(
                        ExternalId::from_numeric(id),
                        FieldValues::new().with("name", json!(format!("rec-{id}"))),
                    )
                })
                .collect::<Vec<_>>();
            let has_more = records.len() as u32 == page.limit;
            Ok(RecordPage { records, has_more })
        }

        async fn create(
            &self,
            _session: &SessionToken,
            _model: &str,
            _fields: &FieldValues,
        ) -> ErpResult<ExternalId> {
            Ok(ExternalId::from_numeric(99))
        }

        async fn update(
            &self,
            _session: &SessionToken,
            _model: &str,
            _id: &ExternalId,
            _fields: &FieldValues,
        ) -> ErpResult<()> {
            Ok(())
        }
    }

    fn no_retry() -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            max_retries: 0,
            jitter: false,
            ..RetryConfig::default()
        })
    }

    fn gateway_with(stub: StubClient, page_size: u32) -> (Arc<ErpGateway>, Arc<StubClient>) {
        let client = Arc::new(stub);
        let gateway = Arc::new(ErpGateway::new(client.clone(), no_retry(), page_size));
        (gateway, client)
    }

    #[tokio::test]
    async fn test_session_is_cached_across_calls() {
        let (gateway, client) = gateway_with(StubClient::new(1), 10);

        let mut feed = gateway.search_feed("res.partner", Filter::eq("active", true), &["name"], None);
        while feed.next_page().await.unwrap().is_some() {}

        assert_eq!(client.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reauthenticates_once_on_auth_error() {
        let stub = StubClient::new(1);
        stub.reject_first_search.store(true, Ordering::SeqCst);
        let (gateway, client) = gateway_with(stub, 10);

        let page = gateway
            .search_page(
                "res.partner",
                &Filter::eq("active", true),
                &["name"],
                PageRequest::first(10),
            )
            .await
            .unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(client.auth_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_feed_paginates_until_short_page() {
        let (gateway, client) = gateway_with(StubClient::new(5), 2);

        let mut feed = gateway.search_feed("product.product", Filter::eq("sale_ok", true), &["name"], None);
        let mut total = 0;
        while let Some(records) = feed.next_page().await.unwrap() {
            total += records.len();
        }

        assert_eq!(total, 5);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_feed_respects_overall_limit() {
        let (gateway, _client) = gateway_with(StubClient::new(8), 2);

        let mut feed =
            gateway.search_feed("product.product", Filter::eq("sale_ok", true), &["name"], Some(3));
        let mut total = 0;
        while let Some(records) = feed.next_page().await.unwrap() {
            total += records.len();
        }

        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_feed_restart_refetches_from_origin() {
        let (gateway, _client) = gateway_with(StubClient::new(3), 2);

        let mut feed = gateway.search_feed("hr.employee", Filter::eq("active", true), &["name"], None);
        let first = feed.next_page().await.unwrap().unwrap();
        while feed.next_page().await.unwrap().is_some() {}

        feed.restart();
        let again = feed.next_page().await.unwrap().unwrap();
        assert_eq!(first[0].id, again[0].id);
    }

    #[tokio::test]
    async fn test_upsert_remote_creates_when_id_absent() {
        let (gateway, _client) = gateway_with(StubClient::new(0), 10);

        let id = gateway
            .upsert_remote("res.partner", None, &FieldValues::new().with("name", json!("Clinic")))
            .await
            .unwrap();
        assert_eq!(id, ExternalId::from_numeric(99));
    }
}
