//! JSON-RPC client for the ERP
//!
//! Speaks the ERP's JSON-RPC dialect: `common.login` for authentication,
//! `object.execute_kw` for model operations (`search_read`, `create`,
//! `write`). Authentication faults are distinguishable from empty results
//! and from generic server faults.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, instrument, trace};

use labsync_core::ExternalId;

use crate::client::{ErpClient, ErpConfig, SessionToken};
use crate::error::{ErpError, ErpResult};
use crate::filter::Filter;
use crate::record::{ExternalRecord, FieldValues, PageRequest, RecordPage};

/// JSON-RPC client over HTTP.
pub struct JsonRpcClient {
    config: ErpConfig,
    http: Client,
    endpoint: String,
    request_id: AtomicU64,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("config", &self.config.redacted())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl JsonRpcClient {
    /// Build a client from validated configuration.
    ///
    /// The request timeout is set on the HTTP client itself, independent of
    /// any retry policy layered on top.
    pub fn new(config: ErpConfig) -> ErpResult<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ErpError::InvalidConfiguration {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let endpoint = format!("{}/jsonrpc", config.base_url.trim_end_matches('/'));

        Ok(Self {
            config,
            http,
            endpoint,
            request_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC call and unwrap the `result` member.
    async fn call(&self, service: &str, method: &str, args: Value) -> ErpResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "service": service,
                "method": method,
                "args": args,
            },
            "id": id,
        });

        trace!(service, method, id, "ERP RPC request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ErpError::from_transport(e, self.config.timeout_secs))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ErpError::Unavailable {
                message: format!("ERP returned HTTP {status}"),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ErpError::invalid_response(format!("malformed JSON body: {e}")))?;

        if let Some(fault) = payload.get("error") {
            return Err(classify_fault(fault));
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| ErpError::invalid_response("response has neither result nor error"))
    }

    /// Invoke `execute_kw` on a model with an authenticated session.
    async fn execute_kw(
        &self,
        session: &SessionToken,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> ErpResult<Value> {
        let uid: i64 = session
            .as_str()
            .parse()
            .map_err(|_| ErpError::auth("session token is not a valid uid"))?;

        self.call(
            "object",
            "execute_kw",
            json!([
                self.config.database,
                uid,
                self.config.api_key,
                model,
                method,
                args,
                kwargs,
            ]),
        )
        .await
    }
}

/// Map a JSON-RPC fault object to an [`ErpError`].
fn classify_fault(fault: &Value) -> ErpError {
    let code = fault.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = fault
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown fault");
    let data_name = fault
        .pointer("/data/name")
        .and_then(Value::as_str)
        .unwrap_or("");
    let data_message = fault
        .pointer("/data/message")
        .and_then(Value::as_str)
        .unwrap_or(message);

    let auth_fault = data_name.ends_with("AccessDenied")
        || data_name.ends_with("AccessError")
        || data_name.ends_with("SessionExpired")
        || message.contains("Access Denied")
        || message.contains("Session expired");

    if auth_fault {
        ErpError::auth(data_message)
    } else {
        ErpError::Protocol {
            code,
            message: data_message.to_string(),
        }
    }
}

/// Convert one `search_read` row into an [`ExternalRecord`].
fn into_record(value: Value) -> ErpResult<ExternalRecord> {
    let Value::Object(mut map) = value else {
        return Err(ErpError::invalid_response("search row is not an object"));
    };

    let id = map
        .remove("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ErpError::invalid_response("search row has no numeric id"))?;

    Ok(ExternalRecord::new(
        ExternalId::from_numeric(id),
        FieldValues::from_map(map),
    ))
}

#[async_trait]
impl ErpClient for JsonRpcClient {
    #[instrument(skip(self))]
    async fn authenticate(&self) -> ErpResult<SessionToken> {
        let result = self
            .call(
                "common",
                "login",
                json!([self.config.database, self.config.username, self.config.api_key]),
            )
            .await?;

        // The ERP answers `false` (not a fault) for bad credentials.
        match result.as_i64() {
            Some(uid) if uid > 0 => {
                debug!(uid, "ERP login succeeded");
                Ok(SessionToken::new(uid.to_string()))
            }
            _ => Err(ErpError::auth(format!(
                "login rejected for user '{}'",
                self.config.username
            ))),
        }
    }

    #[instrument(skip(self, session))]
    async fn probe(&self, session: &SessionToken) -> ErpResult<()> {
        self.call("common", "version", json!([])).await?;

        // Verify the execution RPC itself works; without it every sync
        // operation would fail, so treat absence as a configuration error.
        let result = self
            .execute_kw(
                session,
                "res.partner",
                "search_count",
                json!([[]]),
                json!({}),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_auth_error() || e.is_transient() => Err(e),
            Err(_) => Err(ErpError::CapabilityMissing {
                capability: "object.execute_kw".to_string(),
            }),
        }
    }

    #[instrument(skip(self, session, filter, fields), fields(model = model, offset = page.offset))]
    async fn search(
        &self,
        session: &SessionToken,
        model: &str,
        filter: &Filter,
        fields: &[&str],
        page: PageRequest,
    ) -> ErpResult<RecordPage> {
        let result = self
            .execute_kw(
                session,
                model,
                "search_read",
                json!([filter.to_domain()]),
                json!({
                    "fields": fields,
                    "offset": page.offset,
                    "limit": page.limit,
                    "order": "id asc",
                }),
            )
            .await?;

        let Value::Array(rows) = result else {
            return Err(ErpError::invalid_response("search_read did not return a list"));
        };

        let count = rows.len();
        let records = rows
            .into_iter()
            .map(into_record)
            .collect::<ErpResult<Vec<_>>>()?;

        Ok(RecordPage {
            records,
            has_more: count as u32 == page.limit,
        })
    }

    #[instrument(skip(self, session, fields), fields(model = model))]
    async fn create(
        &self,
        session: &SessionToken,
        model: &str,
        fields: &FieldValues,
    ) -> ErpResult<ExternalId> {
        let result = self
            .execute_kw(
                session,
                model,
                "create",
                json!([Value::Object(fields.as_map().clone())]),
                json!({}),
            )
            .await?;

        result
            .as_i64()
            .map(ExternalId::from_numeric)
            .ok_or_else(|| ErpError::invalid_response("create did not return a numeric id"))
    }

    #[instrument(skip(self, session, fields), fields(model = model, id = %id))]
    async fn update(
        &self,
        session: &SessionToken,
        model: &str,
        id: &ExternalId,
        fields: &FieldValues,
    ) -> ErpResult<()> {
        let numeric = id.as_numeric().ok_or_else(|| {
            ErpError::invalid_response(format!("external id '{id}' is not numeric"))
        })?;

        let result = self
            .execute_kw(
                session,
                model,
                "write",
                json!([[numeric], Value::Object(fields.as_map().clone())]),
                json!({}),
            )
            .await?;

        if result.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ErpError::invalid_response("write did not acknowledge"))
        }
    }
}
