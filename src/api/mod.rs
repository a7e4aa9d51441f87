// ============================================================================
// Remote Resource Client
// ============================================================================
//
// Typed operations (list/get/create/update/delete) over the REST API. The
// client never touches the query cache; it only turns logical operations
// into requests and responses into entities or `ApiError`s.
//
// ============================================================================

pub mod accounts;
pub mod categories;
pub mod envelope;
pub mod rules;
pub mod statements;
pub mod transactions;
pub mod transport;
pub mod upload;

pub use transport::{
    ApiRequest, ApiResponse, Method, MultipartField, ReqwestTransport, RequestBody, Transport,
};
pub use upload::{ImportKind, StatementFile, UploadLimits, validate_batch};

use crate::connection::{ClientConfig, Session};
use crate::core::{ApiError, Entity, EntityId, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Called whenever the backend answers 401.
pub type UnauthorizedHook = Arc<dyn Fn(&ApiError) + Send + Sync>;

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    limits: UploadLimits,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>, session: Arc<Session>) -> Self {
        Self {
            transport,
            session,
            limits: UploadLimits::from(config),
            on_unauthorized: RwLock::new(None),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn upload_limits(&self) -> UploadLimits {
        self.limits
    }

    pub fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        let mut guard = self.on_unauthorized.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(hook);
    }

    fn notify_unauthorized(&self, err: &ApiError) {
        let hook = self
            .on_unauthorized
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook(err);
        }
    }

    /// Send one request and map any non-2xx status to an `ApiError`.
    pub async fn dispatch(&self, resource: &str, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = Uuid::new_v4().to_string();
        let mut request = request
            .resource(resource)
            .header(REQUEST_ID_HEADER, &request_id);
        if request.method.is_mutation() {
            if let Some(bearer) = self.session.bearer() {
                request = request.header("Authorization", &bearer);
            }
        }

        let span = info_span!(
            "api.request",
            method = request.method.as_str(),
            target = %request.target(),
            request_id = %request_id
        );

        async {
            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(err) => {
                    event!(Level::WARN, error = %err, "request failed without response");
                    return Err(err);
                }
            };

            if response.is_success() {
                event!(Level::DEBUG, status = response.status, "request succeeded");
                return Ok(response);
            }

            let err = envelope::decode_error(resource, &response);
            event!(Level::WARN, status = response.status, error = %err, "request rejected");
            if err.is_unauthorized() {
                self.notify_unauthorized(&err);
            }
            Err(err)
        }
        .instrument(span)
        .await
    }

    /// Send a request and decode the `data` member of the response.
    pub async fn fetch<T: DeserializeOwned>(&self, resource: &str, request: ApiRequest) -> Result<T> {
        let response = self.dispatch(resource, request).await?;
        envelope::decode_data(resource, &response)
    }

    /// Send a request whose response body is irrelevant.
    pub async fn execute(&self, resource: &str, request: ApiRequest) -> Result<()> {
        self.dispatch(resource, request).await.map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Generic entity operations
    // ------------------------------------------------------------------------

    pub(crate) async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        self.fetch(E::RESOURCE, ApiRequest::get(collection_path::<E>()))
            .await
    }

    pub(crate) async fn get<E: Entity>(&self, id: EntityId) -> Result<E> {
        self.fetch(E::RESOURCE, ApiRequest::get(item_path::<E>(id)))
            .await
    }

    pub(crate) async fn create<E: Entity, P: Serialize>(&self, payload: &P) -> Result<E> {
        let body = json_body(E::RESOURCE, payload)?;
        self.fetch(E::RESOURCE, ApiRequest::post(collection_path::<E>(), body))
            .await
    }

    pub(crate) async fn patch<E: Entity, P: Serialize>(&self, id: EntityId, changes: &P) -> Result<E> {
        let body = json_body(E::RESOURCE, changes)?;
        self.fetch(E::RESOURCE, ApiRequest::patch(item_path::<E>(id), body))
            .await
    }

    pub(crate) async fn remove<E: Entity>(&self, id: EntityId) -> Result<()> {
        self.execute(E::RESOURCE, ApiRequest::delete(item_path::<E>(id)))
            .await
    }
}

pub(crate) fn collection_path<E: Entity>() -> String {
    format!("/{}", E::RESOURCE)
}

pub(crate) fn item_path<E: Entity>(id: EntityId) -> String {
    format!("/{}/{}", E::RESOURCE, id)
}

pub(crate) fn json_body<P: Serialize>(resource: &str, payload: &P) -> Result<RequestBody> {
    serde_json::to_value(payload)
        .map(RequestBody::Json)
        .map_err(|e| ApiError::invalid_input(resource, e.to_string()))
}
