//! Engine property tests
//!
//! End-to-end tests over a mock ERP client and the in-memory store:
//! idempotence, partial-failure isolation, secondary-match precedence,
//! single-flight execution, run finalization under panic and
//! cancellation, and the price-update scenario.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use labsync_core::{EntityType, ExternalId, TenantId};
use labsync_engine::{EngineStores, SyncEngine};
use labsync_erp::{
    ErpClient, ErpError, ErpGateway, ErpResult, ExternalRecord, FieldValues, Filter, PageRequest,
    RecordPage, RetryConfig, RetryExecutor, SessionToken,
};
use labsync_store::{
    EntityStore, ExternalFields, InMemoryStore, InternalEntity, LocalRunLock, MappingStore,
    RunStatus, SyncLogStore,
};

// =============================================================================
// Mock ERP client
// =============================================================================

/// Mock ERP serving configured records per model, with switchable failure
/// behaviors.
#[derive(Default)]
struct MockErp {
    records: Mutex<HashMap<&'static str, Vec<ExternalRecord>>>,
    search_delay: Option<Duration>,
    panic_on_search: AtomicBool,
    search_rejects_session: AtomicBool,
    fail_auth: AtomicBool,
}

impl MockErp {
    fn new() -> Self {
        Self::default()
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    fn set_records(&self, model: &'static str, records: Vec<ExternalRecord>) {
        self.records.lock().unwrap().insert(model, records);
    }
}

fn record(id: i64, fields: Value) -> ExternalRecord {
    let Value::Object(map) = fields else {
        panic!("record fields must be an object");
    };
    ExternalRecord::new(ExternalId::from_numeric(id), FieldValues::from_map(map))
}

#[async_trait]
impl ErpClient for MockErp {
    async fn authenticate(&self) -> ErpResult<SessionToken> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ErpError::auth("invalid credentials"));
        }
        Ok(SessionToken::new("1"))
    }

    async fn probe(&self, _session: &SessionToken) -> ErpResult<()> {
        Ok(())
    }

    async fn search(
        &self,
        _session: &SessionToken,
        model: &str,
        _filter: &Filter,
        _fields: &[&str],
        page: PageRequest,
    ) -> ErpResult<RecordPage> {
        assert!(!self.panic_on_search.load(Ordering::SeqCst), "mock connector blew up");

        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        if self.search_rejects_session.load(Ordering::SeqCst) {
            return Err(ErpError::auth("session expired"));
        }

        let all = self
            .records
            .lock()
            .unwrap()
            .get(model)
            .cloned()
            .unwrap_or_default();
        let start = page.offset as usize;
        let end = (start + page.limit as usize).min(all.len());
        let records: Vec<ExternalRecord> = all
            .get(start..end.max(start))
            .unwrap_or_default()
            .to_vec();
        let has_more = records.len() as u32 == page.limit;
        Ok(RecordPage { records, has_more })
    }

    async fn create(
        &self,
        _session: &SessionToken,
        _model: &str,
        _fields: &FieldValues,
    ) -> ErpResult<ExternalId> {
        Ok(ExternalId::from_numeric(9001))
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

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    engine: SyncEngine,
    erp: Arc<MockErp>,
    store: Arc<InMemoryStore>,
    tenant: TenantId,
}

async fn connect(erp: MockErp, page_size: u32) -> Harness {
    let erp = Arc::new(erp);
    let tenant = TenantId::new();
    let store = Arc::new(InMemoryStore::new());
    let stores = EngineStores {
        entities: store.clone(),
        mappings: store.clone(),
        log: store.clone(),
        lock: Arc::new(LocalRunLock::new()),
    };
    let gateway = Arc::new(ErpGateway::new(
        erp.clone(),
        RetryExecutor::new(RetryConfig {
            max_retries: 0,
            jitter: false,
            ..RetryConfig::default()
        }),
        page_size,
    ));
    let engine = SyncEngine::connect(tenant, gateway, stores)
        .await
        .expect("engine should connect");
    Harness {
        engine,
        erp,
        store,
        tenant,
    }
}

fn price(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

async fn seed_service(h: &Harness, name: &str, list_price: &str) -> labsync_core::EntityId {
    h.store
        .seed_entity(InternalEntity::new(
            h.tenant,
            EntityType::Service,
            ExternalFields {
                price: Some(price(list_price)),
                ..ExternalFields::named(name)
            },
        ))
        .await
}

// =============================================================================
// Scenario: unmapped service matched by name, price updated
// =============================================================================

#[tokio::test]
async fn price_update_binds_by_name_and_succeeds() {
    let h = connect(MockErp::new(), 100).await;
    let seeded = seed_service(&h, "LD-CARILLAS", "500.00").await;

    h.erp.set_records(
        "product.product",
        vec![record(
            2,
            json!({"name": "LD-CARILLAS", "list_price": 600.00, "active": true}),
        )],
    );

    let outcome = h.engine.trigger_sync("products").await.unwrap();
    let run = outcome.run.expect("run should have started");
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.records_processed, 1);
    assert_eq!(run.records_failed, 0);

    // bound to the existing entity, not a duplicate
    let mapped = h
        .store
        .find(h.tenant, EntityType::Service, &ExternalId::from_numeric(2))
        .await
        .unwrap()
        .expect("mapping should exist");
    assert_eq!(mapped.internal_id, seeded);
    assert_eq!(h.store.count(h.tenant, EntityType::Service).await.unwrap(), 1);

    let entity = h
        .store
        .get(h.tenant, EntityType::Service, seeded)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.external.price.unwrap(), price("600.00"));
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn second_run_with_unchanged_data_performs_zero_writes() {
    let h = connect(MockErp::new(), 100).await;
    h.erp.set_records(
        "product.product",
        vec![
            record(1, json!({"name": "LD-ZIRCONIO", "list_price": 180.0, "active": true})),
            record(2, json!({"name": "LD-CARILLAS", "list_price": 600.0, "active": true})),
        ],
    );

    let first = h.engine.trigger_sync("products").await.unwrap().run.unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.records_processed, 2);
    let writes_after_first = h.store.write_count();

    let second = h.engine.trigger_sync("products").await.unwrap().run.unwrap();
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.records_processed, 2);
    assert_eq!(second.records_failed, 0);

    // no-ops counted as processed, but nothing written
    assert_eq!(h.store.write_count(), writes_after_first);
}

// =============================================================================
// Partial-failure isolation
// =============================================================================

#[tokio::test]
async fn malformed_record_is_skipped_and_the_rest_commit() {
    let h = connect(MockErp::new(), 100).await;
    h.erp.set_records(
        "product.product",
        vec![
            record(1, json!({"name": "LD-ZIRCONIO", "list_price": 180.0, "active": true})),
            // the ERP sends `false` for an empty name
            record(2, json!({"name": false, "list_price": 600.0, "active": true})),
            record(3, json!({"name": "LD-ESQUELETICO", "list_price": 210.0, "active": true})),
        ],
    );

    let run = h.engine.trigger_sync("products").await.unwrap().run.unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.records_processed, 2);
    assert_eq!(run.records_failed, 1);
    let message = run.error_message.expect("per-record failure should surface");
    assert!(message.contains("name"), "got: {message}");
    assert!(message.contains('2'), "error should carry the external id: {message}");

    assert_eq!(h.store.count(h.tenant, EntityType::Service).await.unwrap(), 2);
}

// =============================================================================
// Secondary-match precedence
// =============================================================================

#[tokio::test]
async fn remote_record_with_new_id_binds_to_existing_entity_by_email() {
    let h = connect(MockErp::new(), 100).await;
    let seeded = h
        .store
        .seed_entity(InternalEntity::new(
            h.tenant,
            EntityType::Clinic,
            ExternalFields {
                email: Some("a@x.com".to_string()),
                ..ExternalFields::named("Clinica Norte")
            },
        ))
        .await;

    h.erp.set_records(
        "res.partner",
        vec![record(
            77,
            json!({"name": "Clinica Norte", "email": "a@x.com", "active": true}),
        )],
    );

    let run = h.engine.trigger_sync("partners").await.unwrap().run.unwrap();
    assert_eq!(run.status, RunStatus::Success);

    // no duplicate entity was created
    assert_eq!(h.store.count(h.tenant, EntityType::Clinic).await.unwrap(), 1);
    let mapping = h
        .store
        .find(h.tenant, EntityType::Clinic, &ExternalId::from_numeric(77))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapping.internal_id, seeded);
}

// =============================================================================
// Single-flight
// =============================================================================

#[tokio::test]
async fn concurrent_triggers_yield_one_run_and_one_busy() {
    let erp = MockErp::new().with_delay(Duration::from_millis(150));
    let h = connect(erp, 100).await;
    h.erp.set_records(
        "product.product",
        vec![record(1, json!({"name": "LD-ZIRCONIO", "list_price": 180.0, "active": true}))],
    );

    let (a, b) = tokio::join!(
        h.engine.trigger_sync("products"),
        h.engine.trigger_sync("products"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(
        a.is_busy() != b.is_busy(),
        "expected exactly one busy rejection"
    );
    let completed = if a.is_busy() { b } else { a };
    assert!(completed.run.unwrap().status.is_terminal());

    // exactly one run reached the log
    let runs = h.store.read_recent(h.tenant, "products", 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].status.is_terminal());
}

#[tokio::test]
async fn different_modules_run_concurrently() {
    let erp = MockErp::new().with_delay(Duration::from_millis(50));
    let h = connect(erp, 100).await;

    let (products, partners) = tokio::join!(
        h.engine.trigger_sync("products"),
        h.engine.trigger_sync("partners"),
    );
    assert!(!products.unwrap().is_busy());
    assert!(!partners.unwrap().is_busy());
}

// =============================================================================
// Run finalization
// =============================================================================

#[tokio::test]
async fn panicking_synchronizer_still_finalizes_the_run() {
    let h = connect(MockErp::new(), 100).await;
    h.erp.panic_on_search.store(true, Ordering::SeqCst);

    let outcome = h.engine.trigger_sync("products").await.unwrap();
    let run = outcome.run.expect("run should be finalized, not stuck");
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.unwrap().contains("crashed"));

    // the log holds no run left in `running`
    let runs = h.store.read_recent(h.tenant, "products", 10).await.unwrap();
    assert!(runs.iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn auth_failure_mid_run_fails_the_whole_batch() {
    let h = connect(MockErp::new(), 100).await;
    // session rejected on every search, and re-authentication now fails too
    h.erp.search_rejects_session.store(true, Ordering::SeqCst);
    h.erp.fail_auth.store(true, Ordering::SeqCst);

    let run = h.engine.trigger_sync("products").await.unwrap().run.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.records_processed, 0);
    assert!(run
        .error_message
        .unwrap()
        .to_lowercase()
        .contains("authentication"));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancelled_run_keeps_committed_records_and_fails_with_reason() {
    // one record per page, each page slow, so cancellation lands mid-batch
    let erp = MockErp::new().with_delay(Duration::from_millis(100));
    let h = connect(erp, 1).await;
    h.erp.set_records(
        "product.product",
        (1..=5)
            .map(|i| {
                record(
                    i,
                    json!({"name": format!("LD-{i}"), "list_price": 100.0, "active": true}),
                )
            })
            .collect(),
    );

    let orchestrator = h.engine.orchestrator().clone();
    let trigger = tokio::spawn(async move { orchestrator.trigger_sync("products").await });

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(h.engine.orchestrator().cancel("products"));

    let run = trigger.await.unwrap().unwrap().run.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.unwrap().contains("cancelled"));

    // already-processed records stay committed, the rest were never pulled
    assert!(run.records_processed >= 1);
    assert!(run.records_processed < 5);
    let committed = h.store.count(h.tenant, EntityType::Service).await.unwrap();
    assert_eq!(committed, run.records_processed);
}

// =============================================================================
// Deactivation propagation
// =============================================================================

#[tokio::test]
async fn archived_remote_record_deactivates_the_entity() {
    let h = connect(MockErp::new(), 100).await;
    h.erp.set_records(
        "product.product",
        vec![record(2, json!({"name": "LD-CARILLAS", "list_price": 600.0, "active": true}))],
    );
    h.engine.trigger_sync("products").await.unwrap();

    h.erp.set_records(
        "product.product",
        vec![record(2, json!({"name": "LD-CARILLAS", "list_price": 600.0, "active": false}))],
    );
    h.engine.trigger_sync("products").await.unwrap();

    let mapping = h
        .store
        .find(h.tenant, EntityType::Service, &ExternalId::from_numeric(2))
        .await
        .unwrap()
        .unwrap();
    let entity = h
        .store
        .get(h.tenant, EntityType::Service, mapping.internal_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!entity.external.active);
}

// =============================================================================
// Reporting
// =============================================================================

#[tokio::test]
async fn reporter_exposes_history_and_counts() {
    let h = connect(MockErp::new(), 100).await;
    h.erp.set_records(
        "product.product",
        vec![record(1, json!({"name": "LD-ZIRCONIO", "list_price": 180.0, "active": true}))],
    );

    h.engine.trigger_sync("products").await.unwrap();
    h.engine.trigger_sync("products").await.unwrap();

    let reports = h.engine.reporter().recent_runs("products", 10).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, RunStatus::Success);

    let counts = h.engine.reporter().entity_counts().await.unwrap();
    assert_eq!(counts.services, 1);
    assert_eq!(counts.clinics, 0);

    assert_eq!(
        h.engine.reporter().failure_streak("products", 10).await.unwrap(),
        0
    );
}

// =============================================================================
// Reverse-direction repair
// =============================================================================

#[tokio::test]
async fn repairer_creates_missing_partner_and_binds_it() {
    let h = connect(MockErp::new(), 100).await;
    let clinic = h
        .store
        .seed_entity(InternalEntity::new(
            h.tenant,
            EntityType::Clinic,
            ExternalFields {
                email: Some("norte@clinic.example".to_string()),
                ..ExternalFields::named("Clinica Norte")
            },
        ))
        .await;

    let external = h.engine.repairer().ensure_remote_partner(clinic).await.unwrap();
    assert_eq!(external, ExternalId::from_numeric(9001));

    let mapping = h
        .store
        .find(h.tenant, EntityType::Clinic, &external)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapping.internal_id, clinic);

    // idempotent: a second call reuses the existing link
    let again = h.engine.repairer().ensure_remote_partner(clinic).await.unwrap();
    assert_eq!(again, external);
}
