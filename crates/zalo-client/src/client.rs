//! `ZaloClient`: session, gateway, hooks, and polling behind one handle.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};
use zalo_core::{Snapshot, ZaloError, ZaloResult};

use crate::api::Endpoints;
use crate::dispatch::{DispatchConfig, Dispatcher, HandlerFailure, HandlerRegistry};
use crate::gateway::{Gateway, GatewayConfig};
use crate::hooks::{LifecycleHooks, TracingHooks};
use crate::login::{Authenticator, LoginRequest};
use crate::poller::{PollConfig, PollHandle, PollLoop, SnapshotSource};
use crate::session::{CookieJar, Session};
use crate::store::SessionSnapshot;

/// Client settings.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub gateway: GatewayConfig,
    pub endpoints: Endpoints,
    pub poll: PollConfig,
    pub dispatch: DispatchConfig,
}

/// A client for one account. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct ZaloClient {
    session: Arc<RwLock<Session>>,
    gateway: Gateway,
    endpoints: Arc<Endpoints>,
    hooks: Arc<dyn LifecycleHooks>,
    authenticator: Option<Arc<dyn Authenticator>>,
    poll: PollConfig,
    dispatch: DispatchConfig,
}

impl ZaloClient {
    /// A client with an empty (logged-out) session.
    pub fn new(config: ClientConfig) -> ZaloResult<Self> {
        Self::with_session(Session::new(), config)
    }

    /// A client around an existing session.
    pub fn with_session(session: Session, config: ClientConfig) -> ZaloResult<Self> {
        let session = Arc::new(RwLock::new(session));
        let gateway = Gateway::new(session.clone(), config.gateway)?;
        Ok(Self {
            session,
            gateway,
            endpoints: Arc::new(config.endpoints),
            hooks: Arc::new(TracingHooks),
            authenticator: None,
            poll: config.poll,
            dispatch: config.dispatch,
        })
    }

    /// A client restored from a persisted snapshot.
    pub fn restore(snapshot: &SessionSnapshot, config: ClientConfig) -> ZaloResult<Self> {
        Self::with_session(snapshot.restore()?, config)
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn hooks(&self) -> &dyn LifecycleHooks {
        self.hooks.as_ref()
    }

    // -- session surface --------------------------------------------------

    /// Load session cookies. See [`Session::set_session`].
    pub fn set_session(&self, cookies: &Value) -> bool {
        self.write().set_session(cookies)
    }

    pub fn get_session(&self) -> Option<CookieJar> {
        self.read().get_session()
    }

    /// Load the codec secret. See [`Session::set_secret_key`].
    pub fn set_secret_key(&self, key: &str) -> bool {
        self.write().set_secret_key(key)
    }

    pub fn get_secret_key(&self) -> Option<String> {
        self.read().get_secret_key()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_logged_in()
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().user_id().map(str::to_string)
    }

    pub fn imei(&self) -> Option<String> {
        self.read().imei().map(str::to_string)
    }

    pub fn set_imei(&self, imei: impl Into<String>) {
        self.write().set_imei(imei);
    }

    pub fn set_user_agent(&self, user_agent: Option<String>) {
        self.write().set_user_agent(user_agent);
    }

    /// Capture the session for persistence.
    pub fn snapshot(&self) -> ZaloResult<SessionSnapshot> {
        SessionSnapshot::capture(&self.read())
    }

    /// Drop all authentication state.
    pub fn logout(&self) {
        self.write().clear();
        info!("logged out");
    }

    // -- login ------------------------------------------------------------

    /// Log in through the configured [`Authenticator`], replacing any
    /// existing session. Stop polling before calling this.
    ///
    /// The user id is then refined through a profile fetch; if that fails the
    /// id from the grant or cookies is kept.
    pub async fn login(
        &self,
        phone: &str,
        password: &str,
        imei: &str,
        user_agent: Option<String>,
    ) -> ZaloResult<()> {
        let request = LoginRequest {
            phone: phone.to_string(),
            password: password.to_string(),
            imei: imei.to_string(),
            user_agent,
        };
        request.validate()?;

        let authenticator = self
            .authenticator
            .clone()
            .ok_or_else(|| ZaloError::Login("no authenticator configured".into()))?;

        self.hooks.on_logging_in(&request.phone);

        let grant = authenticator
            .authenticate(&request)
            .await
            .map_err(|e| match e {
                ZaloError::Login(_) => e,
                other => ZaloError::Login(other.to_string()),
            })?;

        let mut fresh = Session::new();
        if !fresh.set_session(&grant.cookies) {
            return Err(ZaloError::Login(
                "grant is missing the session or user id cookie".into(),
            ));
        }
        if !fresh.set_secret_key(&grant.secret_key) {
            return Err(ZaloError::Login("grant secret key is malformed".into()));
        }
        fresh.set_imei(request.imei.clone());
        fresh.set_user_agent(request.user_agent.clone());
        if let Some(user_id) = &grant.user_id {
            fresh.set_user_id(user_id.clone());
        }
        *self.write() = fresh;

        match self.fetch_account_info().await {
            Ok(account) if !account.user_id.is_empty() => {
                self.write().set_user_id(account.user_id);
            }
            Ok(_) => debug!("profile has no user id, keeping the one from cookies"),
            Err(e) => debug!("profile fetch after login failed, keeping cookie user id: {}", e),
        }

        let phone = grant.phone_number.as_deref().unwrap_or(&request.phone);
        self.hooks.on_logged_in(phone);
        Ok(())
    }

    // -- listening --------------------------------------------------------

    /// Build a poll loop over this client's session, plus the channel that
    /// receives handler failures. The loop is not started.
    pub fn poll_loop(
        &self,
        registry: HandlerRegistry,
    ) -> ZaloResult<(PollLoop<ZaloClient>, mpsc::Receiver<HandlerFailure>)> {
        let (dispatcher, failures) = Dispatcher::with_failure_channel(registry, &self.dispatch);
        Ok((self.build_loop(dispatcher)?, failures))
    }

    /// Start polling on a new task. Handler failures are only logged.
    pub fn listen(&self, registry: HandlerRegistry) -> ZaloResult<PollHandle> {
        let dispatcher = Dispatcher::new(registry, &self.dispatch);
        Ok(self.build_loop(dispatcher)?.spawn())
    }

    fn build_loop(&self, dispatcher: Dispatcher) -> ZaloResult<PollLoop<ZaloClient>> {
        let own_user_id = {
            let session = self.read();
            if !session.is_logged_in() {
                return Err(ZaloError::NotLoggedIn);
            }
            session.user_id().unwrap_or_default().to_string()
        };

        Ok(
            PollLoop::new(self.clone(), dispatcher, own_user_id, self.poll.clone())
                .with_hooks(self.hooks.clone()),
        )
    }
}

impl SnapshotSource for ZaloClient {
    fn fetch_snapshot(&self) -> Pin<Box<dyn Future<Output = ZaloResult<Snapshot>> + Send + '_>> {
        Box::pin(self.get_last_msgs())
    }
}
