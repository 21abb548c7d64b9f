//! The sync layer.
//!
//! [`SyncEngine`] mirrors the product catalog and the bound member's cart,
//! profile, and orders from a [`DocumentStore`] into local state, applies
//! shopper actions optimistically, and writes them back through per-entity
//! [`Mirror`]s. Store snapshots, write results, and identity changes arrive
//! as events on one queue and are applied one at a time by
//! [`SyncEngine::process_next`] or [`SyncEngine::settle`], so the engine
//! itself never needs a lock.
//!
//! Every per-member subscription and write is tagged with the session epoch
//! it belongs to. Events from an earlier epoch are discarded, so nothing from
//! a signed-out member can reach the next member's mirrors.

mod mirror;
mod retry;
mod write;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use fresh_market_core::profile::validate_sign_in;
use fresh_market_core::{
    Cart, Catalog, CategoryFilter, CheckoutKey, MemberProfile, Order, OrderDraft, Price,
    Product, ProductId, ProfileUpdate,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, instrument};

use crate::auth::{AuthProvider, Identity};
use crate::checkout::{Checkout, CheckoutOutcome, CheckoutState};
use crate::config::StorefrontConfig;
use crate::error::{
    Entity, Notification, Result, SyncError, add_breadcrumb, clear_sentry_user, set_sentry_user,
};
use crate::store::{
    Caller, DocPath, Document, DocumentStore, Revision, StorePaths, StoreResult, WriteMode,
};

pub use mirror::{Mirror, Mutation, RemoteOutcome, WriteRequest};
pub use retry::RetryPolicy;
pub use write::{WriteHandle, WriteState};

/// How long [`SyncEngine::settle`] waits for further events once no write
/// is outstanding.
const QUIET_PERIOD: Duration = Duration::from_millis(25);

static EMPTY_CART: Cart = Cart::new();
static IDLE: CheckoutState = CheckoutState::Idle;

// ===== Events =====

enum SyncEvent {
    Catalog(Vec<Document>),
    Feed(Option<Catalog>),
    IdentityChanged(Option<Identity>),
    Cart {
        epoch: u64,
        doc: Option<Document>,
    },
    Profile {
        epoch: u64,
        doc: Option<Document>,
    },
    Orders {
        epoch: u64,
        docs: Vec<Document>,
    },
    CartWritten {
        epoch: u64,
        seq: u64,
        outcome: std::result::Result<Document, String>,
    },
    ProfileWritten {
        epoch: u64,
        seq: u64,
        outcome: std::result::Result<Document, String>,
    },
    OrderCreated {
        epoch: u64,
        key: CheckoutKey,
        outcome: std::result::Result<Document, String>,
    },
}

impl SyncEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "catalog",
            Self::Feed(_) => "feed",
            Self::IdentityChanged(_) => "identity_changed",
            Self::Cart { .. } => "cart",
            Self::Profile { .. } => "profile",
            Self::Orders { .. } => "orders",
            Self::CartWritten { .. } => "cart_written",
            Self::ProfileWritten { .. } => "profile_written",
            Self::OrderCreated { .. } => "order_created",
        }
    }
}

/// A snapshot forwarder. Dropping it stops delivery immediately.
struct Subscription(JoinHandle<()>);

impl Drop for Subscription {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn forward<V, F>(
    mut updates: watch::Receiver<V>,
    events: mpsc::UnboundedSender<SyncEvent>,
    to_event: F,
) -> Subscription
where
    V: Clone + Send + Sync + 'static,
    F: Fn(V) -> SyncEvent + Send + 'static,
{
    Subscription(tokio::spawn(async move {
        loop {
            let value = updates.borrow_and_update().clone();
            if events.send(to_event(value)).is_err() {
                break;
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    }))
}

/// Counts a spawned store call until its result has been queued.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ===== Session =====

/// Mirrored state of the bound member.
struct Session {
    identity: Identity,
    caller: Caller,
    cart: Mirror<Cart>,
    profile: Mirror<MemberProfile>,
    /// A default profile has been written for a member without one.
    profile_initialized: bool,
    /// Shown once the profile write it belongs to commits.
    profile_notice: Option<(WriteHandle, Notification)>,
    orders: Vec<Order>,
    checkout: Checkout,
    /// Live cart, profile, and orders subscriptions. `None` while the store
    /// could not be reached; retried on rebind and on later store events.
    subscriptions: Option<Vec<Subscription>>,
}

impl Session {
    fn new(identity: Identity, subscriptions: Option<Vec<Subscription>>) -> Self {
        Self {
            caller: Caller::member(identity.id.clone()),
            identity,
            cart: Mirror::default(),
            profile: Mirror::default(),
            profile_initialized: false,
            profile_notice: None,
            orders: Vec::new(),
            checkout: Checkout::default(),
            subscriptions,
        }
    }
}

// ===== Engine =====

/// Mirrors remote documents into local state and writes shopper actions
/// back to the store.
///
/// Methods that issue store calls spawn Tokio tasks and must be called from
/// within a runtime.
pub struct SyncEngine {
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    retry: RetryPolicy,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    pending: Arc<AtomicUsize>,
    epoch: u64,
    session: Option<Session>,
    store_catalog: Option<Catalog>,
    feed_catalog: Option<Catalog>,
    catalog: Catalog,
    offline: bool,
    notifications: Vec<Notification>,
    catalog_sub: Option<Subscription>,
    feed_sub: Option<Subscription>,
    auth_sub: Option<Subscription>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("app_id", &self.paths.app_id())
            .field("epoch", &self.epoch)
            .field("member", &self.identity().map(|i| &i.id))
            .field("offline", &self.offline)
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine for the app configured in `config`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: &StorefrontConfig) -> Self {
        Self::with_paths(store, StorePaths::new(config.app_id.clone()), config.retry.clone())
    }

    #[must_use]
    pub fn with_paths(store: Arc<dyn DocumentStore>, paths: StorePaths, retry: RetryPolicy) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            paths,
            retry,
            events_tx,
            events_rx,
            pending: Arc::new(AtomicUsize::new(0)),
            epoch: 0,
            session: None,
            store_catalog: None,
            feed_catalog: None,
            catalog: Catalog::seed(),
            offline: false,
            notifications: Vec::new(),
            catalog_sub: None,
            feed_sub: None,
            auth_sub: None,
        }
    }

    // ===== Lifecycle =====

    /// Subscribe to the product catalog.
    ///
    /// If the store cannot be reached the seed catalog is shown and the
    /// engine reports itself offline.
    #[instrument(skip_all, fields(app_id = %self.paths.app_id()))]
    pub async fn open(&mut self) {
        self.catalog_sub = None;
        match self
            .store
            .watch_collection(&Caller::guest(), &self.paths.products())
            .await
        {
            Ok(updates) => {
                self.offline = false;
                self.catalog_sub = Some(forward(updates, self.events_tx.clone(), SyncEvent::Catalog));
                tracing::info!("catalog subscription opened");
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog unavailable, showing seed catalog");
                self.offline = true;
                self.store_catalog = None;
                self.rebuild_catalog();
            }
        }
    }

    /// Drop every subscription and the bound member's state.
    pub fn close(&mut self) {
        self.catalog_sub = None;
        self.feed_sub = None;
        self.auth_sub = None;
        self.unbind();
        tracing::info!("sync engine closed");
    }

    /// Bind a member identity and subscribe to their cart, profile, and
    /// orders. Any previously bound member is unbound first.
    #[instrument(skip_all, fields(member = %identity.id))]
    pub async fn bind(&mut self, identity: Identity) {
        if self.identity() == Some(&identity) {
            self.resubscribe().await;
            return;
        }
        self.unbind();
        let epoch = self.epoch;

        let subscriptions = match self.subscribe_member(&identity, epoch).await {
            Ok(subscriptions) => {
                self.offline = false;
                Some(subscriptions)
            }
            Err(e) => {
                tracing::warn!(error = %e, "member subscriptions unavailable, working offline");
                self.offline = true;
                self.notify(Notification::error(format!("連線失敗：{e}")));
                None
            }
        };

        set_sentry_user(&identity.id, None);
        tracing::info!(epoch, "member bound");
        self.session = Some(Session::new(identity, subscriptions));
    }

    async fn subscribe_member(&self, identity: &Identity, epoch: u64) -> StoreResult<Vec<Subscription>> {
        let caller = Caller::member(identity.id.clone());
        let cart = self
            .store
            .watch_document(&caller, &self.paths.cart(&identity.id))
            .await?;
        let profile = self
            .store
            .watch_document(&caller, &self.paths.profile(&identity.id))
            .await?;
        let orders = self
            .store
            .watch_collection(&caller, &self.paths.orders(&identity.id))
            .await?;
        Ok(vec![
            forward(cart, self.events_tx.clone(), move |doc| SyncEvent::Cart { epoch, doc }),
            forward(profile, self.events_tx.clone(), move |doc| SyncEvent::Profile { epoch, doc }),
            forward(orders, self.events_tx.clone(), move |docs| SyncEvent::Orders { epoch, docs }),
        ])
    }

    /// Subscribe the bound member if an earlier attempt failed.
    async fn resubscribe(&mut self) {
        let Some(identity) = self
            .session
            .as_ref()
            .filter(|s| s.subscriptions.is_none())
            .map(|s| s.identity.clone())
        else {
            return;
        };
        let epoch = self.epoch;
        match self.subscribe_member(&identity, epoch).await {
            Ok(subscriptions) => {
                tracing::info!(member = %identity.id, epoch, "member subscriptions restored");
                self.offline = false;
                if let Some(session) = self.session.as_mut() {
                    session.subscriptions = Some(subscriptions);
                }
            }
            Err(e) => tracing::debug!(error = %e, "member subscriptions still unavailable"),
        }
    }

    /// Unsubscribe from the bound member and clear their mirrored state.
    pub fn unbind(&mut self) {
        self.epoch += 1;
        if let Some(session) = self.session.take() {
            tracing::info!(member = %session.identity.id, "member unbound");
            clear_sentry_user();
        }
    }

    /// Follow sign-in and sign-out on `auth`.
    pub fn attach_auth(&mut self, auth: &dyn AuthProvider) {
        self.auth_sub = Some(forward(
            auth.identity_changes(),
            self.events_tx.clone(),
            SyncEvent::IdentityChanged,
        ));
    }

    /// Use catalogs published by a product feed instead of the store's.
    pub fn attach_feed(&mut self, updates: watch::Receiver<Option<Catalog>>) {
        self.feed_sub = Some(forward(updates, self.events_tx.clone(), SyncEvent::Feed));
    }

    // ===== Event pump =====

    /// Wait for and apply the next event. Returns `false` if no more events
    /// can arrive.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle(event).await;
                true
            }
            None => false,
        }
    }

    /// Apply events until every outstanding store call has reported back and
    /// no snapshot has arrived for a short quiet period.
    pub async fn settle(&mut self) {
        loop {
            while let Ok(event) = self.events_rx.try_recv() {
                self.handle(event).await;
            }
            if self.pending.load(Ordering::SeqCst) > 0 {
                if let Some(event) = self.events_rx.recv().await {
                    self.handle(event).await;
                }
                continue;
            }
            match tokio::time::timeout(QUIET_PERIOD, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle(event).await,
                _ => return,
            }
        }
    }

    async fn handle(&mut self, event: SyncEvent) {
        let current = self.epoch;
        // Any of these means the store answered again.
        let store_reached = matches!(
            event,
            SyncEvent::Catalog(_)
                | SyncEvent::CartWritten { .. }
                | SyncEvent::ProfileWritten { .. }
                | SyncEvent::OrderCreated { .. }
        );
        match event {
            SyncEvent::Catalog(docs) => self.on_catalog(&docs),
            SyncEvent::Feed(catalog) => {
                if let Some(catalog) = catalog {
                    tracing::debug!(products = catalog.all().len(), "feed catalog received");
                    self.feed_catalog = Some(catalog);
                    self.rebuild_catalog();
                }
            }
            SyncEvent::IdentityChanged(Some(identity)) => self.bind(identity).await,
            SyncEvent::IdentityChanged(None) => self.unbind(),
            SyncEvent::Cart { epoch, doc } if epoch == current => self.on_cart(doc),
            SyncEvent::Profile { epoch, doc } if epoch == current => self.on_profile(doc),
            SyncEvent::Orders { epoch, docs } if epoch == current => self.on_orders(&docs),
            SyncEvent::CartWritten {
                epoch,
                seq,
                outcome,
            } if epoch == current => self.on_cart_written(seq, outcome),
            SyncEvent::ProfileWritten {
                epoch,
                seq,
                outcome,
            } if epoch == current => self.on_profile_written(seq, outcome),
            SyncEvent::OrderCreated {
                epoch,
                key,
                outcome,
            } if epoch == current => self.on_order_created(key, outcome),
            stale => tracing::debug!(event = stale.name(), "discarding event from a previous session"),
        }
        if store_reached {
            self.resubscribe().await;
        }
    }

    // ===== Snapshots =====

    fn on_catalog(&mut self, docs: &[Document]) {
        let products = docs.iter().filter_map(decode_product).collect();
        self.store_catalog = Some(Catalog::new(products));
        self.offline = false;
        self.rebuild_catalog();
    }

    fn rebuild_catalog(&mut self) {
        let non_empty = |c: &Option<Catalog>| c.clone().filter(|c| !c.is_empty());
        self.catalog = non_empty(&self.feed_catalog)
            .or_else(|| non_empty(&self.store_catalog))
            .unwrap_or_else(Catalog::seed);
    }

    fn on_cart(&mut self, doc: Option<Document>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let outcome = match doc {
            Some(doc) => match doc.decode::<Cart>() {
                Ok(cart) => session.cart.apply_remote(doc.revision, cart),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring undecodable cart snapshot");
                    return;
                }
            },
            None => session.cart.apply_absent(),
        };
        log_remote(Entity::Cart, outcome);
    }

    fn on_profile(&mut self, doc: Option<Document>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let request = match doc {
            Some(doc) => {
                session.profile_initialized = true;
                match doc.decode::<MemberProfile>() {
                    Ok(profile) => log_remote(Entity::Profile, session.profile.apply_remote(doc.revision, profile)),
                    Err(e) => tracing::warn!(error = %e, "ignoring undecodable profile snapshot"),
                }
                None
            }
            None if !session.profile_initialized && !session.profile.is_dirty() => {
                session.profile_initialized = true;
                tracing::info!(member = %session.identity.id, "creating default profile");
                session.profile.mutate(|_| ()).request
            }
            None => {
                log_remote(Entity::Profile, session.profile.apply_absent());
                None
            }
        };
        if let Some(request) = request {
            self.write_profile(request);
        }
    }

    fn on_orders(&mut self, docs: &[Document]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let mut orders: Vec<Order> = docs.iter().filter_map(decode_order).collect();
        fresh_market_core::order::sort_newest_first(&mut orders);
        session.orders = orders;
    }

    // ===== Write results =====

    fn on_cart_written(&mut self, seq: u64, outcome: std::result::Result<Document, String>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let ack = decode_ack::<Cart>(outcome);
        let failed = ack.as_ref().err().cloned();
        let next = session.cart.acknowledge(seq, ack);
        let surfaced = failed.filter(|reason| session.cart.failure() == Some(reason.as_str()));
        let checkout = session.checkout.poll();

        if let Some(reason) = surfaced {
            self.persistence_failed(Entity::Cart, reason);
        }
        if let Some(next) = next {
            self.write_cart(next);
        }
        if let Some(outcome) = checkout {
            self.finish_checkout(outcome);
        }
    }

    fn on_profile_written(&mut self, seq: u64, outcome: std::result::Result<Document, String>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let ack = decode_ack::<MemberProfile>(outcome);
        let failed = ack.as_ref().err().cloned();
        let next = session.profile.acknowledge(seq, ack);
        let surfaced = failed.filter(|reason| session.profile.failure() == Some(reason.as_str()));

        let notice = match session.profile_notice.take() {
            Some((handle, notice)) => match handle.state() {
                WriteState::Committed(_) => Some(notice),
                WriteState::Failed(_) => None,
                WriteState::Pending => {
                    session.profile_notice = Some((handle, notice));
                    None
                }
            },
            None => None,
        };

        if let Some(reason) = surfaced {
            self.persistence_failed(Entity::Profile, reason);
        }
        if let Some(notice) = notice {
            self.notify(notice);
        }
        if let Some(next) = next {
            self.write_profile(next);
        }
    }

    fn on_order_created(&mut self, key: CheckoutKey, outcome: std::result::Result<Document, String>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let order = outcome.and_then(|doc| decode_order(&doc).ok_or_else(|| "order could not be decoded".to_string()));

        let (clear, settled) = match order {
            Ok(order) => {
                tracing::info!(order_id = %order.id, %key, total = %order.total(), "order stored");
                if !session.orders.iter().any(|o| o.id == order.id) {
                    session.orders.push(order.clone());
                    fresh_market_core::order::sort_newest_first(&mut session.orders);
                }
                if session.checkout.order_stored(key, order) {
                    let (handle, request) = session.cart.replace_after_write(Cart::new());
                    session.checkout.clearing(handle);
                    (request, session.checkout.poll())
                } else {
                    (None, None)
                }
            }
            Err(reason) => (None, session.checkout.fail(key, reason)),
        };

        if let Some(request) = clear {
            self.write_cart(request);
        }
        if let Some(outcome) = settled {
            self.finish_checkout(outcome);
        }
    }

    fn finish_checkout(&mut self, outcome: CheckoutOutcome) {
        match outcome {
            CheckoutOutcome::Committed(order) => {
                tracing::info!(order_id = %order.id, "checkout committed");
                add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order.id.as_str())]));
                self.notify(Notification::checkout_succeeded(order.total()));
            }
            CheckoutOutcome::Failed(reason) => self.persistence_failed(Entity::Order, reason),
        }
    }

    fn persistence_failed(&mut self, entity: Entity, reason: String) {
        let err = SyncError::PersistenceFailure { entity, reason };
        err.report();
        if let Some(notification) = Notification::from_error(&err) {
            self.notify(notification);
        }
    }

    // ===== Writes =====

    fn write_cart(&self, request: WriteRequest<Cart>) {
        let Some(session) = &self.session else {
            return;
        };
        let epoch = self.epoch;
        self.spawn_write(
            session.caller.clone(),
            self.paths.cart(&session.identity.id),
            WriteMode::Replace,
            request,
            move |seq, outcome| SyncEvent::CartWritten { epoch, seq, outcome },
        );
    }

    fn write_profile(&self, request: WriteRequest<MemberProfile>) {
        let Some(session) = &self.session else {
            return;
        };
        let epoch = self.epoch;
        self.spawn_write(
            session.caller.clone(),
            self.paths.profile(&session.identity.id),
            WriteMode::Merge,
            request,
            move |seq, outcome| SyncEvent::ProfileWritten { epoch, seq, outcome },
        );
    }

    fn spawn_write<T, F>(
        &self,
        caller: Caller,
        path: DocPath,
        mode: WriteMode,
        request: WriteRequest<T>,
        to_event: F,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce(u64, std::result::Result<Document, String>) -> SyncEvent + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let retry = self.retry.clone();
        let events = self.events_tx.clone();
        let pending = PendingGuard::new(&self.pending);
        let span = tracing::debug_span!("mirror_write", path = %path, seq = request.seq);

        tokio::spawn(
            async move {
                let outcome = match serde_json::to_value(&request.value) {
                    Ok(data) => retry
                        .run("write", || store.write(&caller, &path, data.clone(), mode))
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                let _ = events.send(to_event(request.seq, outcome));
                drop(pending);
            }
            .instrument(span),
        );
    }

    fn spawn_create_order(&self, caller: Caller, key: CheckoutKey, draft: &OrderDraft) {
        let Some(session) = &self.session else {
            return;
        };
        let collection = self.paths.orders(&session.identity.id);
        let store = Arc::clone(&self.store);
        let retry = self.retry.clone();
        let events = self.events_tx.clone();
        let pending = PendingGuard::new(&self.pending);
        let epoch = self.epoch;
        let data = serde_json::to_value(draft);
        let span = tracing::debug_span!("create_order", %key);

        tokio::spawn(
            async move {
                let idempotency_key = key.to_string();
                let outcome = match data {
                    Ok(data) => retry
                        .run("create_order", || {
                            store.create(&caller, &collection, data.clone(), Some(idempotency_key.as_str()))
                        })
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                let _ = events.send(SyncEvent::OrderCreated {
                    epoch,
                    key,
                    outcome,
                });
                drop(pending);
            }
            .instrument(span),
        );
    }

    // ===== Actions =====

    fn notify(&mut self, notification: Notification) {
        tracing::debug!(level = ?notification.level, message = %notification.message, "notification");
        self.notifications.push(notification);
    }

    fn reject<T>(&mut self, err: SyncError, message: Option<&str>) -> Result<T> {
        tracing::debug!(error = %err, "action rejected");
        let notification = message.map_or_else(|| Notification::from_error(&err), |m| Some(Notification::error(m)));
        if let Some(notification) = notification {
            self.notify(notification);
        }
        Err(err)
    }

    /// Add `quantity` units of a catalog product to the cart.
    ///
    /// Returns `None` when nothing changed (`quantity == 0`).
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] without a bound member,
    /// [`SyncError::AlreadySubmitting`] during checkout, and
    /// [`SyncError::UnknownProduct`] for products not currently offered.
    pub fn add_item(&mut self, product_id: &ProductId, quantity: u32) -> Result<Option<WriteHandle>> {
        let Some(session) = self.session.as_mut() else {
            return self.reject(SyncError::NotAuthenticated, Some("請先登入才能加入購物車"));
        };
        if session.checkout.state().is_submitting() {
            return self.reject(SyncError::AlreadySubmitting, None);
        }
        let Some(product) = self.catalog.get(product_id).filter(|p| p.enabled).cloned() else {
            return self.reject(SyncError::UnknownProduct(product_id.clone()), None);
        };
        if quantity == 0 {
            return Ok(None);
        }

        let mutation = session.cart.mutate(|cart| cart.add_item(&product, quantity));
        tracing::info!(product_id = %product.id, quantity, "item added to cart");
        add_breadcrumb("cart", "Added item", Some(&[("product_id", product.id.as_str())]));
        self.notify(Notification::added_to_cart(&product.name));
        if let Some(request) = mutation.request {
            self.write_cart(request);
        }
        Ok(Some(mutation.handle))
    }

    /// Change the quantity of a cart line by `delta`, removing it at zero.
    ///
    /// Returns `None` when the product is not in the cart.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] without a bound member and
    /// [`SyncError::AlreadySubmitting`] during checkout.
    pub fn adjust_quantity(&mut self, product_id: &ProductId, delta: i64) -> Result<Option<WriteHandle>> {
        let Some(session) = self.session.as_mut() else {
            return self.reject(SyncError::NotAuthenticated, Some("請先登入"));
        };
        if session.checkout.state().is_submitting() {
            return self.reject(SyncError::AlreadySubmitting, None);
        }
        if delta == 0 || session.cart.local().get(product_id).is_none() {
            return Ok(None);
        }

        let mutation = session.cart.mutate(|cart| cart.adjust_quantity(product_id, delta));
        tracing::info!(product_id = %product_id, delta, "cart quantity adjusted");
        if let Some(request) = mutation.request {
            self.write_cart(request);
        }
        Ok(Some(mutation.handle))
    }

    /// Toggle a product in the member's favorites. Returns whether it is now
    /// a favorite.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] without a bound member.
    pub fn toggle_favorite(&mut self, product_id: &ProductId) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return self.reject(SyncError::NotAuthenticated, Some("登入後才可使用我的最愛"));
        };
        let mutation = session.profile.mutate(|profile| profile.toggle_favorite(product_id));
        let now_favorite = mutation.result;
        tracing::info!(product_id = %product_id, now_favorite, "favorite toggled");
        self.notify(Notification::favorite_toggled(now_favorite));
        if let Some(request) = mutation.request {
            self.write_profile(request);
        }
        Ok(now_favorite)
    }

    /// Save profile edits.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] without a bound member and
    /// [`SyncError::InvalidProfile`] if the name or address is blank.
    pub fn update_profile(&mut self, update: ProfileUpdate) -> Result<WriteHandle> {
        if self.session.is_none() {
            return self.reject(SyncError::NotAuthenticated, Some("請先登入"));
        }
        let update = match update.validated() {
            Ok(update) => update,
            Err(e) => return self.reject(e.into(), None),
        };
        let Some(session) = self.session.as_mut() else {
            return Err(SyncError::NotAuthenticated);
        };
        let mutation = session.profile.mutate(|profile| profile.apply(update));
        session.profile_notice = Some((mutation.handle.clone(), Notification::profile_saved()));
        if let Some(request) = mutation.request {
            self.write_profile(request);
        }
        Ok(mutation.handle)
    }

    /// Record a login-screen sign-in: name and email are merged into the
    /// profile along with the sign-in time. Favorites are kept.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] without a bound member and
    /// [`SyncError::InvalidProfile`] if the name or email is blank.
    pub fn sign_in_profile(&mut self, name: &str, email: &str) -> Result<WriteHandle> {
        if self.session.is_none() {
            return self.reject(SyncError::NotAuthenticated, Some("請先登入"));
        }
        if let Err(e) = validate_sign_in(name, email) {
            return self.reject(e.into(), Some("請輸入姓名與電子郵件"));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(SyncError::NotAuthenticated);
        };
        let mutation = session
            .profile
            .mutate(|profile| profile.record_sign_in(name, email, Utc::now()));
        session.profile_notice = Some((mutation.handle.clone(), Notification::signed_in()));
        if let Some(request) = mutation.request {
            self.write_profile(request);
        }
        Ok(mutation.handle)
    }

    /// Start submitting the cart as an order.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`], [`SyncError::AlreadySubmitting`], or
    /// [`SyncError::EmptyCart`].
    #[instrument(skip_all)]
    pub fn begin_checkout(&mut self) -> Result<CheckoutKey> {
        let Some(session) = self.session.as_mut() else {
            return self.reject(SyncError::NotAuthenticated, Some("請先登入"));
        };
        let cart = session.cart.local().clone();
        let key = match session.checkout.begin(&cart) {
            Ok(key) => key,
            Err(e) => return self.reject(e, None),
        };
        let Some(draft) = OrderDraft::from_cart(
            key,
            session.identity.id.clone(),
            session.profile.local(),
            &cart,
        ) else {
            return self.reject(SyncError::EmptyCart, None);
        };
        tracing::info!(%key, total = %draft.total, lines = draft.items.len(), "checkout started");
        let caller = session.caller.clone();
        self.spawn_create_order(caller, key, &draft);
        Ok(key)
    }

    /// Submit the cart and wait until the order is stored and the cart is
    /// cleared.
    ///
    /// # Errors
    ///
    /// The errors of [`Self::begin_checkout`], or
    /// [`SyncError::PersistenceFailure`] if either store write failed.
    pub async fn checkout(&mut self) -> Result<Order> {
        self.begin_checkout()?;
        while self.checkout_state().is_submitting() {
            if !self.process_next().await {
                break;
            }
        }
        let Some(session) = &self.session else {
            return Err(SyncError::NotAuthenticated);
        };
        match session.checkout.state() {
            CheckoutState::Committed { .. } => session
                .checkout
                .placed()
                .cloned()
                .ok_or_else(|| SyncError::Decode("committed order missing".to_string())),
            CheckoutState::Failed { reason } => Err(SyncError::PersistenceFailure {
                entity: Entity::Order,
                reason: reason.clone(),
            }),
            CheckoutState::Idle | CheckoutState::Submitting { .. } => Err(SyncError::PersistenceFailure {
                entity: Entity::Order,
                reason: "checkout interrupted".to_string(),
            }),
        }
    }

    /// Re-issue writes that failed. Returns a handle per re-issued write.
    pub fn retry_failed(&mut self) -> Vec<WriteHandle> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let cart = session.cart.retry();
        let profile = session.profile.retry();
        let mut handles = Vec::new();
        if let Some((handle, request)) = cart {
            tracing::info!("retrying cart write");
            self.write_cart(request);
            handles.push(handle);
        }
        if let Some((handle, request)) = profile {
            tracing::info!("retrying profile write");
            self.write_profile(request);
            handles.push(handle);
        }
        handles
    }

    /// Abandon local changes whose writes failed and show the store's
    /// values again. Returns whether anything was reverted.
    pub fn discard_failed(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let cart = session.cart.revert();
        let profile = session.profile.revert();
        cart || profile
    }

    // ===== Reads =====

    /// The product catalog: feed, else store, else the seed catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Visible products for a browsing tab.
    #[must_use]
    pub fn products(&self, filter: &CategoryFilter) -> Vec<&Product> {
        static NO_FAVORITES: std::collections::BTreeSet<ProductId> = std::collections::BTreeSet::new();
        let favorites = self
            .session
            .as_ref()
            .map_or(&NO_FAVORITES, |s| &s.profile.local().favorites);
        self.catalog.filter(filter, favorites)
    }

    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        self.catalog.categories()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    /// The bound member's cart (empty when signed out).
    #[must_use]
    pub fn cart(&self) -> &Cart {
        self.session.as_ref().map_or(&EMPTY_CART, |s| s.cart.local())
    }

    #[must_use]
    pub fn cart_total(&self) -> Price {
        self.cart().total()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.cart().line_count()
    }

    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.cart().item_count()
    }

    #[must_use]
    pub fn profile(&self) -> Option<&MemberProfile> {
        self.session.as_ref().map(|s| s.profile.local())
    }

    /// The bound member's orders, newest first.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        self.session
            .as_ref()
            .map(|s| s.orders.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn checkout_state(&self) -> &CheckoutState {
        self.session.as_ref().map_or(&IDLE, |s| s.checkout.state())
    }

    /// Whether local changes to `entity` are not yet confirmed.
    #[must_use]
    pub fn is_dirty(&self, entity: Entity) -> bool {
        self.session.as_ref().is_some_and(|s| match entity {
            Entity::Cart => s.cart.is_dirty(),
            Entity::Profile => s.profile.is_dirty(),
            Entity::Order => s.checkout.state().is_submitting(),
        })
    }

    /// Reason of the unresolved failed write for `entity`, if any.
    #[must_use]
    pub fn write_failure(&self, entity: Entity) -> Option<&str> {
        let session = self.session.as_ref()?;
        match entity {
            Entity::Cart => session.cart.failure(),
            Entity::Profile => session.profile.failure(),
            Entity::Order => match session.checkout.state() {
                CheckoutState::Failed { reason } => Some(reason),
                _ => None,
            },
        }
    }

    /// Whether the store could not be reached, or the bound member's
    /// subscriptions are not yet live.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline
            || self
                .session
                .as_ref()
                .is_some_and(|s| s.subscriptions.is_none())
    }

    /// Take every notification raised since the last call.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}

// ===== Decoding =====

fn log_remote(entity: Entity, outcome: RemoteOutcome) {
    if outcome == RemoteOutcome::Deferred {
        let stale = SyncError::StaleRead { entity };
        tracing::debug!(reason = %stale, "remote snapshot deferred behind local write");
    }
}

fn decode_ack<T: for<'de> Deserialize<'de>>(
    outcome: std::result::Result<Document, String>,
) -> std::result::Result<(Revision, T), String> {
    let doc = outcome?;
    doc.decode::<T>()
        .map(|value| (doc.revision, value))
        .map_err(|e| e.to_string())
}

fn decode_product(doc: &Document) -> Option<Product> {
    doc.to_product()
        .map_err(|e| tracing::warn!(error = %e, "skipping malformed product"))
        .ok()
}

fn decode_order(doc: &Document) -> Option<Order> {
    doc.to_order()
        .map_err(|e| tracing::warn!(error = %e, "skipping malformed order"))
        .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fresh_market_core::MemberId;

    use super::*;
    use crate::auth::IdentityProvider;
    use crate::store::MemoryStore;

    fn identity(id: &str) -> Identity {
        Identity {
            id: MemberId::new(id),
            provider: IdentityProvider::Token,
        }
    }

    fn engine(store: &MemoryStore) -> SyncEngine {
        SyncEngine::with_paths(
            Arc::new(store.clone()),
            StorePaths::new("test"),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        )
    }

    #[tokio::test]
    async fn test_empty_store_shows_seed_catalog() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.open().await;
        engine.settle().await;
        assert_eq!(engine.catalog(), &Catalog::seed());
        assert!(!engine.is_offline());
    }

    #[tokio::test]
    async fn test_unavailable_store_degrades_to_offline() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let mut engine = engine(&store);
        engine.open().await;
        assert!(engine.is_offline());
        assert_eq!(engine.catalog().all().len(), 8);
    }

    #[tokio::test]
    async fn test_missing_profile_is_initialized() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.open().await;
        engine.bind(identity("u1")).await;
        engine.settle().await;

        let stored = store
            .get(&Caller::member(MemberId::new("u1")), &StorePaths::new("test").profile(&MemberId::new("u1")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.decode::<MemberProfile>().unwrap(), MemberProfile::default());
        assert_eq!(engine.profile().unwrap().name, "新用戶");
    }

    #[tokio::test]
    async fn test_add_item_writes_cart() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.open().await;
        engine.bind(identity("u1")).await;
        engine.settle().await;

        let mut handle = engine.add_item(&ProductId::new("p001"), 2).unwrap().unwrap();
        assert_eq!(engine.item_count(), 2);
        engine.settle().await;
        assert!(matches!(handle.wait().await, WriteState::Committed(_)));
        assert!(!engine.is_dirty(Entity::Cart));

        let notes = engine.drain_notifications();
        assert!(notes.iter().any(|n| n.message == "有機菠菜 已加入購物車"));
    }

    #[tokio::test]
    async fn test_unknown_product_rejected() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.bind(identity("u1")).await;
        assert!(matches!(
            engine.add_item(&ProductId::new("nope"), 1),
            Err(SyncError::UnknownProduct(_))
        ));
        assert_eq!(engine.line_count(), 0);
    }

    #[tokio::test]
    async fn test_unbind_clears_member_state() {
        let store = MemoryStore::new();
        let mut engine = engine(&store);
        engine.open().await;
        engine.bind(identity("u1")).await;
        engine.settle().await;
        engine.add_item(&ProductId::new("p002"), 1).unwrap();
        engine.toggle_favorite(&ProductId::new("p002")).unwrap();
        engine.settle().await;

        engine.bind(identity("u2")).await;
        engine.settle().await;
        assert_eq!(engine.identity().unwrap().id, MemberId::new("u2"));
        assert!(engine.cart().is_empty());
        assert!(engine.profile().unwrap().favorites.is_empty());
        assert!(engine.products(&CategoryFilter::Favorites).is_empty());
    }
}
