use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
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
    config::SupabaseConfig,
    error::{SupabaseDaoError, SupabaseResult},
    models::{
        AuthSession, AuthUser, CompetitionRow, PREFER_REPRESENTATION, PREFER_UPSERT,
        RefreshRequest, RowVersion,
    },
    realtime,
};

/// Remote store keeping the tracker state in a single PostgREST row.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    config: Arc<SupabaseConfig>,
    identity: IdentitySlot,
}

impl SupabaseStore {
    /// Build the HTTP client; no request is issued until an identity is installed.
    pub fn connect(config: SupabaseConfig) -> SupabaseResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| SupabaseDaoError::ClientBuilder { source })?;

        Ok(Self {
            client,
            config: Arc::new(config),
            identity: IdentitySlot::new(),
        })
    }

    pub(super) fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Request carrying the anon key, authorised as `identity` when it has a token.
    fn request(&self, method: Method, url: &str, identity: Option<&Identity>) -> RequestBuilder {
        let bearer = identity
            .and_then(|identity| identity.token.as_deref())
            .unwrap_or(self.config.anon_key.as_str());
        self.client
            .request(method, url)
            .header("apikey", self.config.anon_key.as_str())
            .bearer_auth(bearer)
    }

    fn row_filter(&self) -> String {
        format!("eq.{}", self.config.row_id)
    }

    async fn send(url: &str, builder: RequestBuilder) -> SupabaseResult<Response> {
        builder
            .send()
            .await
            .map_err(|source| SupabaseDaoError::RequestSend {
                url: url.to_owned(),
                source,
            })
    }

    async fn rows(url: &str, response: Response) -> SupabaseResult<Vec<CompetitionRow>> {
        if !response.status().is_success() {
            return Err(SupabaseDaoError::RequestStatus {
                url: url.to_owned(),
                status: response.status(),
            });
        }
        response
            .json::<Vec<CompetitionRow>>()
            .await
            .map_err(|source| SupabaseDaoError::DecodeResponse {
                url: url.to_owned(),
                source,
            })
    }

    /// Send a request as the installed identity, renewing an expired access
    /// token once when PostgREST answers `401`.
    async fn authorized<F>(&self, method: Method, url: &str, prepare: F) -> StorageResult<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let identity = self.identity.require()?;
        let builder = self.request(method.clone(), url, Some(&identity));
        let response = Self::send(url, prepare(builder)).await?;
        if response.status() != StatusCode::UNAUTHORIZED || identity.refresh_token.is_none() {
            return Ok(response);
        }

        debug!(uid = %identity.uid, "Supabase rejected the access token; renewing");
        let identity = self.refresh_identity().await?;
        let builder = self.request(method, url, Some(&identity));
        Ok(Self::send(url, prepare(builder)).await?)
    }

    /// Exchange the installed identity's refresh token for a new access token.
    async fn refresh_identity(&self) -> StorageResult<Identity> {
        let current = self.identity.require()?;
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or(SupabaseDaoError::MissingRefreshToken)?;
        let url = self.config.token_url();
        let builder = self
            .request(Method::POST, &url, None)
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshRequest { refresh_token });
        let response = Self::send(&url, builder).await?;
        let renewed: Identity = Self::session(&url, response).await?.into();

        if !self.identity.renew(renewed.clone()) {
            return Err(StorageError::Unauthenticated);
        }
        info!(uid = %renewed.uid, "Supabase access token renewed");
        Ok(renewed)
    }

    async fn session(url: &str, response: Response) -> SupabaseResult<AuthSession> {
        if !response.status().is_success() {
            return Err(SupabaseDaoError::RequestStatus {
                url: url.to_owned(),
                status: response.status(),
            });
        }
        response
            .json::<AuthSession>()
            .await
            .map_err(|source| SupabaseDaoError::DecodeResponse {
                url: url.to_owned(),
                source,
            })
    }

    pub(super) async fn fetch_row(&self) -> StorageResult<Option<CompetitionRow>> {
        let url = self.config.table_url();
        let filter = self.row_filter();
        let response = self
            .authorized(Method::GET, &url, |builder| {
                builder.query(&[("id", filter.as_str()), ("select", "*")])
            })
            .await?;
        Ok(Self::rows(&url, response).await?.into_iter().next())
    }

    async fn upsert(&self, state: &CanonicalState, origin: &WriteOrigin) -> StorageResult<()> {
        let url = self.config.table_url();
        let row = CompetitionRow::from_state(&self.config.row_id, state, origin);
        let response = self
            .authorized(Method::POST, &url, |builder| {
                builder.header("Prefer", PREFER_UPSERT).json(&[&row])
            })
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SupabaseDaoError::RequestStatus {
                url,
                status: response.status(),
            }
            .into())
        }
    }

    async fn sign_up(&self) -> SupabaseResult<Identity> {
        let url = self.config.signup_url();
        let builder = self.request(Method::POST, &url, None).json(&json!({}));
        let response = Self::send(&url, builder).await?;
        Ok(Self::session(&url, response).await?.into())
    }

    /// Ask GoTrue who the identity's access token belongs to.
    async fn fetch_user(&self, identity: Identity) -> StorageResult<Identity> {
        if identity.token.is_none() {
            return Err(StorageError::Unauthenticated);
        }
        let url = self.config.user_url();
        let response = Self::send(&url, self.request(Method::GET, &url, Some(&identity))).await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(StorageError::Unauthenticated);
        }
        if !response.status().is_success() {
            return Err(SupabaseDaoError::RequestStatus {
                url,
                status: response.status(),
            }
            .into());
        }
        let user = response
            .json::<AuthUser>()
            .await
            .map_err(|source| SupabaseDaoError::DecodeResponse { url, source })?;
        if user.id != identity.uid {
            warn!(uid = %identity.uid, "access token was issued to another user");
            return Err(StorageError::Unauthenticated);
        }
        Ok(identity)
    }
}

pub(super) fn snapshot_of(row: Option<&CompetitionRow>) -> Snapshot {
    row.map(|row| normalize(&row.document())).unwrap_or_default()
}

impl VersionedBackend for SupabaseStore {
    type Revision = RowVersion;

    async fn read_versioned(&self) -> StorageResult<Versioned<RowVersion>> {
        let row = self.fetch_row().await?;
        let revision = match &row {
            Some(row) => RowVersion::Present(row.revision),
            None => RowVersion::Missing,
        };
        Ok(Versioned {
            snapshot: snapshot_of(row.as_ref()),
            revision,
        })
    }

    async fn write_if(
        &self,
        expected: &RowVersion,
        state: &CanonicalState,
        origin: &WriteOrigin,
    ) -> StorageResult<bool> {
        let url = self.config.table_url();
        let row = CompetitionRow::from_state(&self.config.row_id, state, origin);

        match expected {
            RowVersion::Missing => {
                let response = self
                    .authorized(Method::POST, &url, |builder| builder.json(&[&row]))
                    .await?;
                match response.status() {
                    StatusCode::CONFLICT => {
                        debug!("Supabase row appeared concurrently");
                        Ok(false)
                    }
                    status if status.is_success() => Ok(true),
                    status => Err(SupabaseDaoError::RequestStatus { url, status }.into()),
                }
            }
            RowVersion::Present(revision) => {
                let revision_filter = match revision {
                    Some(revision) => format!("eq.{revision}"),
                    None => "is.null".to_owned(),
                };
                let filter = self.row_filter();
                let response = self
                    .authorized(Method::PATCH, &url, |builder| {
                        builder
                            .query(&[("id", filter.as_str()), ("revision", revision_filter.as_str())])
                            .header("Prefer", PREFER_REPRESENTATION)
                            .json(&row)
                    })
                    .await?;
                let updated = Self::rows(&url, response).await?;
                if updated.is_empty() {
                    debug!("Supabase row revision moved underneath the transaction");
                }
                Ok(!updated.is_empty())
            }
        }
    }
}

impl RemoteStore for SupabaseStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Supabase
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
        Box::pin(async move { store.fetch_user(identity).await })
    }

    fn read(&self) -> BoxFuture<'static, StorageResult<Snapshot>> {
        let store = self.clone();
        Box::pin(async move {
            let row = store.fetch_row().await?;
            Ok(snapshot_of(row.as_ref()))
        })
    }

    fn write(
        &self,
        state: CanonicalState,
        origin: WriteOrigin,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert(&state, &origin).await })
    }

    /// Listens on the Realtime channel, polling while it is unavailable.
    fn subscribe(&self, listener: SnapshotListener) -> StorageResult<Subscription> {
        self.identity.require()?;
        let task = tokio::spawn(realtime::follow(self.clone(), listener));
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
            let url = store.config.rest_root();
            let response = Self::send(&url, store.request(Method::GET, &url, None)).await?;
            if response.status().is_server_error() {
                return Err(SupabaseDaoError::RequestStatus {
                    url,
                    status: response.status(),
                }
                .into());
            }
            Ok(())
        })
    }
}
