use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, ETAG, IF_MATCH},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dao::{
    identity::{Identity, IdentitySlot},
    models::{CanonicalState, Snapshot, WriteOrigin},
    normalize::normalize,
    remote_store::{
        BackendKind, RemoteStore, SnapshotListener, Subscription, TransactOutcome, TxUpdate,
        cas::{self, Versioned, VersionedBackend},
    },
    storage::{StorageError, StorageResult},
};

use super::{
    config::FirebaseConfig,
    error::{FirebaseDaoError, FirebaseResult},
    models::{
        ETAG_REQUEST_HEADER, LOOKUP_URL, LookupRequest, LookupResponse, RefreshRequest,
        RefreshResponse, SIGN_UP_URL, SignUpRequest, SignUpResponse, TOKEN_URL,
    },
    stream,
};

/// Remote store backed by the Firebase Realtime Database REST API.
#[derive(Clone)]
pub struct FirebaseStore {
    client: Client,
    config: Arc<FirebaseConfig>,
    identity: IdentitySlot,
}

impl FirebaseStore {
    /// Build the HTTP client; no request is issued until an identity is installed.
    pub fn connect(config: FirebaseConfig) -> FirebaseResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| FirebaseDaoError::ClientBuilder { source })?;

        Ok(Self {
            client,
            config: Arc::new(config),
            identity: IdentitySlot::new(),
        })
    }

    fn request(&self, method: Method, identity: &Identity) -> (String, RequestBuilder) {
        let url = self.config.document_url();
        let mut builder = self.client.request(method, &url);
        if let Some(token) = identity.token.as_deref() {
            builder = builder.query(&[("auth", token)]);
        }
        (url, builder)
    }

    async fn send(url: &str, builder: RequestBuilder) -> FirebaseResult<Response> {
        builder
            .send()
            .await
            .map_err(|source| FirebaseDaoError::RequestSend {
                url: url.to_owned(),
                source,
            })
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> FirebaseResult<T> {
        if !response.status().is_success() {
            return Err(FirebaseDaoError::RequestStatus {
                url: url.to_owned(),
                status: response.status(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| FirebaseDaoError::DecodeResponse {
                url: url.to_owned(),
                source,
            })
    }

    fn api_key(&self) -> FirebaseResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or(FirebaseDaoError::MissingApiKey)
    }

    /// Send a document request as the installed identity.
    ///
    /// ID tokens expire after an hour; a `401` is answered by renewing the
    /// token once and replaying the request.
    async fn authorized<F>(&self, method: Method, prepare: F) -> StorageResult<(String, Response)>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let identity = self.identity.require()?;
        let (url, builder) = self.request(method.clone(), &identity);
        let response = Self::send(&url, prepare(builder)).await?;
        if response.status() != StatusCode::UNAUTHORIZED || identity.refresh_token.is_none() {
            return Ok((url, response));
        }

        debug!(uid = %identity.uid, "Firebase rejected the ID token; renewing");
        let identity = self.refresh_identity().await?;
        let (url, builder) = self.request(method, &identity);
        let response = Self::send(&url, prepare(builder)).await?;
        Ok((url, response))
    }

    /// Exchange the installed identity's refresh token for a new ID token.
    pub(super) async fn refresh_identity(&self) -> StorageResult<Identity> {
        let current = self.identity.require()?;
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or(FirebaseDaoError::MissingRefreshToken)?;
        let builder = self
            .client
            .post(TOKEN_URL)
            .query(&[("key", self.api_key()?)])
            .form(&RefreshRequest::new(refresh_token));
        let response = Self::send(TOKEN_URL, builder).await?;
        let renewed: Identity = Self::decode::<RefreshResponse>(TOKEN_URL, response)
            .await?
            .into();

        if !self.identity.renew(renewed.clone()) {
            return Err(StorageError::Unauthenticated);
        }
        info!(uid = %renewed.uid, "Firebase ID token renewed");
        Ok(renewed)
    }

    async fn fetch(&self) -> StorageResult<Snapshot> {
        let (url, response) = self.authorized(Method::GET, |builder| builder).await?;
        let raw: Value = Self::decode(&url, response).await?;
        Ok(normalize(&raw))
    }

    async fn put(&self, state: &CanonicalState, origin: &WriteOrigin) -> StorageResult<()> {
        let document = state.to_document(Some(origin));
        let (url, response) = self
            .authorized(Method::PUT, |builder| builder.json(&document))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(FirebaseDaoError::RequestStatus {
                url,
                status: response.status(),
            }
            .into())
        }
    }

    /// Open the server-sent event stream for the tracker document.
    pub(super) async fn open_stream(&self) -> StorageResult<Response> {
        let (url, response) = self
            .authorized(Method::GET, |builder| {
                builder.header(ACCEPT, "text/event-stream")
            })
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(FirebaseDaoError::RequestStatus {
                url,
                status: response.status(),
            }
            .into())
        }
    }

    async fn sign_up(&self) -> FirebaseResult<Identity> {
        let builder = self
            .client
            .post(SIGN_UP_URL)
            .query(&[("key", self.api_key()?)])
            .json(&SignUpRequest {
                return_secure_token: true,
            });
        let response = Self::send(SIGN_UP_URL, builder).await?;
        let account = Self::decode::<SignUpResponse>(SIGN_UP_URL, response).await?;
        Ok(account.into())
    }

    /// Resolve the identity's ID token and check it was issued to its uid.
    async fn lookup(&self, identity: Identity) -> StorageResult<Identity> {
        let token = identity
            .token
            .as_deref()
            .ok_or(StorageError::Unauthenticated)?;
        let builder = self
            .client
            .post(LOOKUP_URL)
            .query(&[("key", self.api_key()?)])
            .json(&LookupRequest { id_token: token });
        let response = Self::send(LOOKUP_URL, builder).await?;
        // An invalid or expired token is reported as a bad request.
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            return Err(StorageError::Unauthenticated);
        }
        let account = Self::decode::<LookupResponse>(LOOKUP_URL, response).await?;
        if !account.belongs_to(&identity.uid) {
            warn!(uid = %identity.uid, "ID token was issued to another account");
            return Err(StorageError::Unauthenticated);
        }
        Ok(identity)
    }
}

impl VersionedBackend for FirebaseStore {
    type Revision = String;

    async fn read_versioned(&self) -> StorageResult<Versioned<String>> {
        let (url, response) = self
            .authorized(Method::GET, |builder| {
                builder.header(ETAG_REQUEST_HEADER, "true")
            })
            .await?;
        let revision = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| FirebaseDaoError::MissingEtag { url: url.clone() })?;
        let raw: Value = Self::decode(&url, response).await?;
        Ok(Versioned {
            snapshot: normalize(&raw),
            revision,
        })
    }

    async fn write_if(
        &self,
        expected: &String,
        state: &CanonicalState,
        origin: &WriteOrigin,
    ) -> StorageResult<bool> {
        let document = state.to_document(Some(origin));
        let (url, response) = self
            .authorized(Method::PUT, |builder| {
                builder
                    .header(IF_MATCH, expected.as_str())
                    .json(&document)
            })
            .await?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED => {
                debug!(etag = %expected, "Firebase rejected a stale ETag");
                Ok(false)
            }
            status if status.is_success() => Ok(true),
            status => Err(FirebaseDaoError::RequestStatus { url, status }.into()),
        }
    }
}

impl RemoteStore for FirebaseStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Firebase
    }

    fn identity(&self) -> &IdentitySlot {
        &self.identity
    }

    fn sign_in_anonymously(&self) -> BoxFuture<'static, StorageResult<Identity>> {
        let store = self.clone();
        Box::pin(async move { store.sign_up().await.map_err(Into::into) })
    }

    fn verify_identity(&self, identity: Identity) -> BoxFuture<'static, StorageResult<Identity>> {
        let store = self.clone();
        Box::pin(async move { store.lookup(identity).await })
    }

    fn read(&self) -> BoxFuture<'static, StorageResult<Snapshot>> {
        let store = self.clone();
        Box::pin(async move { store.fetch().await })
    }

    fn write(
        &self,
        state: CanonicalState,
        origin: WriteOrigin,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.put(&state, &origin).await })
    }

    fn subscribe(&self, listener: SnapshotListener) -> StorageResult<Subscription> {
        self.identity.require()?;
        let task = tokio::spawn(stream::follow(self.clone(), listener));
        Ok(Subscription::from_task(task))
    }

    fn transact(
        &self,
        origin: WriteOrigin,
        update: TxUpdate,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>> {
        let store = self.clone();
        Box::pin(async move { cas::run_transaction(&store, origin, update).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.config.document_url();
            let builder = store.client.get(&url).query(&[("shallow", "true")]);
            let response = Self::send(&url, builder).await?;
            // Permission errors still prove the database answered.
            if response.status().is_server_error() {
                return Err(FirebaseDaoError::RequestStatus {
                    url,
                    status: response.status(),
                }
                .into());
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_calls_fail_fast_without_identity() {
        let store = FirebaseStore::connect(FirebaseConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(matches!(store.read().await, Err(StorageError::Unauthenticated)));
        assert!(matches!(
            store.subscribe(Arc::new(|_| {})),
            Err(StorageError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn anonymous_sign_in_needs_an_api_key() {
        let store = FirebaseStore::connect(FirebaseConfig::new("http://127.0.0.1:9")).unwrap();
        let err = store.sign_in_anonymously().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn bare_uids_are_not_accepted() {
        let config = FirebaseConfig::new("http://127.0.0.1:9").with_api_key("key");
        let store = FirebaseStore::connect(config).unwrap();
        assert!(matches!(
            store.verify_identity(Identity::new("u1", None)).await,
            Err(StorageError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn renewal_needs_a_refresh_token() {
        let store = FirebaseStore::connect(FirebaseConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(matches!(
            store.refresh_identity().await,
            Err(StorageError::Unauthenticated)
        ));

        store.identity().set(Some(Identity::new("u1", Some("expired".into()))));
        assert!(matches!(
            store.refresh_identity().await,
            Err(StorageError::Unavailable { .. })
        ));
        assert_eq!(store.identity().require().unwrap().token.as_deref(), Some("expired"));
    }
}
