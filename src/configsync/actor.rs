//! Sync actor loop and the synchronization unit.

use super::api::{https_client, ApiClientFactory};
use super::ticker::{Ticker, TickerFactory};
use super::{Request, SyncError, SyncSettings};
use crate::constants::{
    API_CERT_SECRET_NAME, CONFIGURATION_CONFIG_MAP_NAME, CONFIGURATION_ORG_ID_KEY,
    CONFIGURATION_RUNTIME_VIEW_KEY, IMAGE_ASSURANCE_NAMESPACE,
    OPERATOR_API_ACCESS_SERVICE_ACCOUNT, SERVICE_ACCOUNT_TOKEN_KEY, TLS_CERT_KEY,
};
use crate::controller::reconciler::dependencies::secret_value;
use crate::controller::store::{get_typed, to_dynamic, ClusterStore};
use crate::observability;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub(super) struct SyncActor {
    store: Arc<dyn ClusterStore>,
    api_factory: Arc<dyn ApiClientFactory>,
    ticker_factory: Arc<dyn TickerFactory>,
    settings: SyncSettings,
    last_error: Option<SyncError>,
}

impl SyncActor {
    pub(super) fn new(
        store: Arc<dyn ClusterStore>,
        api_factory: Arc<dyn ApiClientFactory>,
        ticker_factory: Arc<dyn TickerFactory>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            api_factory,
            ticker_factory,
            settings,
            last_error: None,
        }
    }

    /// Serve the mailbox and the ticker until `cancel` fires or every handle
    /// is dropped
    pub(super) async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Request>,
        cancel: CancellationToken,
        done: CancellationToken,
    ) {
        let mut ticker: Option<Box<dyn Ticker>> = None;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                tick = next_tick(&mut ticker) => {
                    if tick.is_some() {
                        self.sync().await;
                    } else {
                        debug!("Config sync ticker ended, waiting for a new start signal");
                        ticker = None;
                    }
                }
                request = inbox.recv() => match request {
                    Some(Request::StartSync) => {
                        if ticker.is_none() {
                            info!("🔄 Starting periodic configuration sync every {:?}", self.settings.interval);
                            self.sync().await;
                            ticker = Some(self.ticker_factory.new_ticker(self.settings.interval));
                        }
                    }
                    Some(Request::GetError(reply)) => {
                        let _ = reply.send(self.last_error.clone());
                    }
                    None => break,
                },
            }
        }

        drop(ticker);
        inbox.close();
        done.cancel();
        info!("Configuration sync stopped");
    }

    /// Synchronize once, keeping the outcome for error queries
    async fn sync(&mut self) {
        observability::metrics::increment_config_syncs();
        match self.sync_once().await {
            Ok(()) => self.last_error = None,
            Err(e) => {
                error!("❌ Failed to sync Image Assurance config map with API: {}", e);
                observability::metrics::increment_config_sync_errors(e.step());
                self.last_error = Some(e);
            }
        }
    }

    async fn sync_once(&self) -> Result<(), SyncError> {
        let store = self.store.as_ref();

        let mut config_map = get_typed::<ConfigMap>(
            store,
            Some(IMAGE_ASSURANCE_NAMESPACE),
            CONFIGURATION_CONFIG_MAP_NAME,
        )
        .await
        .map_err(|e| SyncError::ConfigurationRead(e.to_string()))?
        .ok_or_else(|| SyncError::ConfigurationRead("config map not found".to_string()))?;

        let token = get_typed::<Secret>(
            store,
            Some(IMAGE_ASSURANCE_NAMESPACE),
            OPERATOR_API_ACCESS_SERVICE_ACCOUNT,
        )
        .await
        .map_err(|e| SyncError::TokenRead(e.to_string()))?
        .ok_or_else(|| SyncError::TokenRead("token secret not found".to_string()))?;
        let token = secret_value(&token, SERVICE_ACCOUNT_TOKEN_KEY)
            .map(|t| String::from_utf8_lossy(t).into_owned())
            .ok_or(SyncError::TokenUnavailable)?;

        let cert_secret = get_typed::<Secret>(
            store,
            Some(&self.settings.operator_namespace),
            API_CERT_SECRET_NAME,
        )
        .await
        .map_err(|e| SyncError::Certificate(e.to_string()))?
        .ok_or_else(|| SyncError::Certificate("certificate secret not found".to_string()))?;
        let cert = secret_value(&cert_secret, TLS_CERT_KEY).ok_or_else(|| {
            SyncError::Certificate(format!("secret has no {TLS_CERT_KEY:?} field"))
        })?;

        let http = https_client(cert, self.settings.http_timeout)
            .map_err(|e| SyncError::ClientBuild(e.to_string()))?;
        let api = self
            .api_factory
            .create(http, &self.settings.endpoint, &token);

        let org_id = config_map
            .data
            .as_ref()
            .and_then(|d| d.get(CONFIGURATION_ORG_ID_KEY))
            .cloned()
            .unwrap_or_default();
        let organization = api
            .get_organization(&org_id)
            .await
            .map_err(|e| SyncError::OrganizationQuery(e.to_string()))?;

        config_map.data.get_or_insert_with(Default::default).insert(
            CONFIGURATION_RUNTIME_VIEW_KEY.to_string(),
            organization.settings.runtime_view_enabled.to_string(),
        );
        let updated =
            to_dynamic(&config_map).map_err(|e| SyncError::ConfigurationWrite(e.to_string()))?;
        self.store
            .update(&updated)
            .await
            .map_err(|e| SyncError::ConfigurationWrite(e.to_string()))?;

        debug!(
            "Synced organization {} settings: runtimeViewEnabled={}",
            org_id, organization.settings.runtime_view_enabled
        );
        Ok(())
    }
}

/// Next tick of the armed ticker; pends forever while idle
async fn next_tick(ticker: &mut Option<Box<dyn Ticker>>) -> Option<()> {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::super::api::{ApiError, MockOrganizationApi, Organization, OrganizationSettings};
    use super::super::ticker::{IntervalTickerFactory, ManualTickerFactory};
    use super::super::{ConfigSync, Syncer};
    use super::*;
    use crate::constants::{DEFAULT_OPERATOR_NAMESPACE, TLS_PRIVATE_KEY_KEY};
    use crate::controller::reconciler::certificates::mint_certificate_secret;
    use crate::controller::store::memory::InMemoryStore;
    use crate::controller::store::ObjectKey;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use reqwest::StatusCode;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hands out API clients answering with the next scripted response
    struct ScriptedApiFactory {
        responses: Mutex<VecDeque<Result<bool, StatusCode>>>,
        created: AtomicUsize,
    }

    impl ScriptedApiFactory {
        fn with(responses: Vec<Result<bool, StatusCode>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                created: AtomicUsize::new(0),
            })
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    impl ApiClientFactory for ScriptedApiFactory {
        fn create(
            &self,
            _http: reqwest::Client,
            base_url: &str,
            token: &str,
        ) -> Box<dyn crate::configsync::api::OrganizationApi> {
            assert_eq!(base_url, "https://ia-api:9443");
            assert_eq!(token, "api-token");
            self.created.fetch_add(1, Ordering::SeqCst);

            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(StatusCode::SERVICE_UNAVAILABLE));
            let mut api = MockOrganizationApi::new();
            api.expect_get_organization().returning(move |org_id| {
                assert_eq!(org_id, "org-1");
                response
                    .map(|enabled| Organization {
                        id: "org-1".to_string(),
                        name: "Acme".to_string(),
                        settings: OrganizationSettings {
                            runtime_view_enabled: enabled,
                        },
                    })
                    .map_err(ApiError::Status)
            });
            Box::new(api)
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            endpoint: "https://ia-api:9443".to_string(),
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(5),
        }
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store.insert(&ConfigMap {
            metadata: ObjectMeta {
                name: Some(CONFIGURATION_CONFIG_MAP_NAME.to_string()),
                namespace: Some(IMAGE_ASSURANCE_NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                CONFIGURATION_ORG_ID_KEY.to_string(),
                "org-1".to_string(),
            )])),
            ..ConfigMap::default()
        });
        store.insert(&Secret {
            metadata: ObjectMeta {
                name: Some(OPERATOR_API_ACCESS_SERVICE_ACCOUNT.to_string()),
                namespace: Some(IMAGE_ASSURANCE_NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                SERVICE_ACCOUNT_TOKEN_KEY.to_string(),
                ByteString(b"api-token".to_vec()),
            )])),
            ..Secret::default()
        });
        store.insert(
            &mint_certificate_secret(
                API_CERT_SECRET_NAME,
                DEFAULT_OPERATOR_NAMESPACE,
                TLS_PRIVATE_KEY_KEY,
                TLS_CERT_KEY,
                &["ia-api".to_string()],
            )
            .unwrap(),
        );
        Arc::new(store)
    }

    fn runtime_view(store: &InMemoryStore) -> Option<String> {
        let key = ObjectKey::of::<ConfigMap>(
            Some(IMAGE_ASSURANCE_NAMESPACE),
            CONFIGURATION_CONFIG_MAP_NAME,
        );
        store
            .object(&key)
            .and_then(|o| o.data["data"][CONFIGURATION_RUNTIME_VIEW_KEY].as_str().map(str::to_string))
    }

    #[tokio::test]
    async fn test_no_sync_before_start_signal() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(true)]);
        let tickers = Arc::new(ManualTickerFactory::default());
        let syncer = Syncer::spawn_with(
            store.clone(),
            api.clone(),
            tickers.clone(),
            settings(),
            CancellationToken::new(),
        );

        assert_eq!(syncer.error().await, None);
        assert_eq!(api.created(), 0);
        assert_eq!(tickers.created(), 0);
    }

    #[tokio::test]
    async fn test_start_syncs_and_writes_runtime_view() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(true)]);
        let tickers = Arc::new(ManualTickerFactory::default());
        let syncer = Syncer::spawn_with(
            store.clone(),
            api.clone(),
            tickers.clone(),
            settings(),
            CancellationToken::new(),
        );

        syncer.start_periodic_sync();
        assert_eq!(syncer.error().await, None);
        assert_eq!(runtime_view(&store).as_deref(), Some("true"));
        assert_eq!(tickers.periods(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_repeated_start_signals_arm_one_ticker() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(false); 4]);
        let tickers = Arc::new(ManualTickerFactory::default());
        let syncer = Syncer::spawn_with(
            store,
            api.clone(),
            tickers.clone(),
            settings(),
            CancellationToken::new(),
        );

        for _ in 0..3 {
            syncer.start_periodic_sync();
            syncer.error().await;
        }
        assert_eq!(tickers.created(), 1);
        assert_eq!(api.created(), 1);
    }

    #[tokio::test]
    async fn test_error_tracks_latest_sync() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Err(StatusCode::UNAUTHORIZED), Ok(true)]);
        let tickers = Arc::new(ManualTickerFactory::default());
        let syncer = Syncer::spawn_with(
            store.clone(),
            api,
            tickers.clone(),
            settings(),
            CancellationToken::new(),
        );

        assert_eq!(syncer.error().await, None);

        syncer.start_periodic_sync();
        assert!(matches!(
            syncer.error().await,
            Some(SyncError::OrganizationQuery(_))
        ));
        assert_eq!(runtime_view(&store), None);

        assert!(tickers.fire());
        assert_eq!(syncer.error().await, None);
        assert_eq!(runtime_view(&store).as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_missing_token_is_reported() {
        let store = InMemoryStore::new();
        let seeded = seeded_store();
        for key in [
            ObjectKey::of::<ConfigMap>(Some(IMAGE_ASSURANCE_NAMESPACE), CONFIGURATION_CONFIG_MAP_NAME),
            ObjectKey::of::<Secret>(Some(DEFAULT_OPERATOR_NAMESPACE), API_CERT_SECRET_NAME),
        ] {
            store.insert(&seeded.object(&key).unwrap());
        }
        store.insert(&Secret {
            metadata: ObjectMeta {
                name: Some(OPERATOR_API_ACCESS_SERVICE_ACCOUNT.to_string()),
                namespace: Some(IMAGE_ASSURANCE_NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        });

        let api = ScriptedApiFactory::with(vec![Ok(true)]);
        let syncer = Syncer::spawn_with(
            Arc::new(store),
            api.clone(),
            Arc::new(ManualTickerFactory::default()),
            settings(),
            CancellationToken::new(),
        );

        syncer.start_periodic_sync();
        assert_eq!(syncer.error().await, Some(SyncError::TokenUnavailable));
        assert_eq!(api.created(), 0);
    }

    #[tokio::test]
    async fn test_ended_ticker_is_rearmed_by_next_start() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(true); 2]);
        let tickers = Arc::new(ManualTickerFactory::default());
        let syncer = Syncer::spawn_with(
            store,
            api.clone(),
            tickers.clone(),
            settings(),
            CancellationToken::new(),
        );

        syncer.start_periodic_sync();
        syncer.error().await;
        tickers.end_all();
        syncer.error().await;

        syncer.start_periodic_sync();
        assert_eq!(syncer.error().await, None);
        assert_eq!(tickers.created(), 2);
        assert_eq!(api.created(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_active_actor() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(true); 3]);
        let tickers = Arc::new(ManualTickerFactory::default());
        let cancel = CancellationToken::new();
        let syncer = Syncer::spawn_with(
            store,
            api.clone(),
            tickers.clone(),
            settings(),
            cancel.clone(),
        );

        syncer.start_periodic_sync();
        assert_eq!(syncer.error().await, None);
        assert_eq!(api.created(), 1);
        assert_eq!(tickers.created(), 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), syncer.done().cancelled())
            .await
            .expect("actor stops promptly");

        // The ticker was dropped with the actor
        assert!(!tickers.fire());
        assert_eq!(syncer.error().await, Some(SyncError::Stopped));
        assert_eq!(api.created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_keeps_actor_running() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(true); 2]);
        let syncer = Syncer::spawn_with(
            store,
            api.clone(),
            Arc::new(IntervalTickerFactory),
            SyncSettings {
                interval: Duration::ZERO,
                ..settings()
            },
            CancellationToken::new(),
        );

        syncer.start_periodic_sync();
        assert_eq!(syncer.error().await, None);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(syncer.error().await, None);
        assert_eq!(api.created(), 2);
        assert!(!syncer.done().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_stops_actor() {
        let store = seeded_store();
        let api = ScriptedApiFactory::with(vec![Ok(true)]);
        let cancel = CancellationToken::new();
        let syncer = Syncer::spawn_with(
            store,
            api.clone(),
            Arc::new(ManualTickerFactory::default()),
            settings(),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), syncer.done().cancelled())
            .await
            .expect("actor stops promptly");

        syncer.start_periodic_sync();
        assert_eq!(syncer.error().await, Some(SyncError::Stopped));
        assert_eq!(api.created(), 0);
    }
}
