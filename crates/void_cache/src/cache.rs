//! Resource cache
//!
//! Content-addressed cache of loaded native objects. At most one fetch runs
//! per canonical key; requests arriving while it runs are queued on the entry
//! and all receive the same result, in the order they were queued.
//!
//! Fetches are futures. By default they are polled in place by
//! [`ResourceCache::process`] inside a private current-thread tokio runtime,
//! which is built on first use; with a tokio runtime handle they are spawned
//! and their results come back over a channel. Either way completions are
//! only applied inside `process`, on the context that owns the cache.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crossbeam_channel::{unbounded, Receiver, Sender};
use void_core::{CancellationToken, EntityId, NativeHandle};

use crate::error::{CacheError, CacheResult, TransportError};
use crate::key::{CacheKey, LibraryIndex};
use crate::manifest::LibraryManifest;
use crate::retry::{NoRetry, RetryPolicy};

/// Future producing a loaded object
pub type FetchFuture = Pin<Box<dyn Future<Output = CacheResult<NativeHandle>> + Send + 'static>>;
/// Starts attempt `n` (1-based) of a fetch
pub type FetchFn = Box<dyn FnMut(u32) -> FetchFuture>;
/// Picks the object a request wants out of a cached value
pub type ExtractFn = Box<dyn FnOnce(&NativeHandle) -> CacheResult<NativeHandle>>;
pub type SuccessFn = Box<dyn FnOnce(NativeHandle)>;
pub type FailureFn = Box<dyn FnOnce(CacheError)>;
/// Releases an entry's value on eviction; `None` if it never loaded
pub type DeleteAction = Box<dyn FnOnce(Option<NativeHandle>)>;

/// Load state of a cache entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    NotLoaded,
    Loading,
    Loaded,
}

/// How a request was served
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    /// Delivered from the cache before `request` returned
    Hit,
    /// Queued on a fetch already in flight
    Joined,
    /// Started a new fetch
    Started,
}

/// Outcome of [`ResourceCache::request`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requested {
    pub key: CacheKey,
    pub status: RequestStatus,
}

/// A request for one resource
pub struct CacheRequest {
    url: String,
    library: Option<String>,
    referrer: Option<EntityId>,
    fetch: FetchFn,
    extract: Option<ExtractFn>,
    on_delete: Option<DeleteAction>,
    token: Option<CancellationToken>,
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

impl CacheRequest {
    pub fn new(url: impl Into<String>, fetch: impl FnMut(u32) -> FetchFuture + 'static) -> Self {
        Self {
            url: url.into(),
            library: None,
            referrer: None,
            fetch: Box::new(fetch),
            extract: None,
            on_delete: None,
            token: None,
            on_success: None,
            on_failure: None,
        }
    }

    /// Library scope for relative-path matches
    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    /// Entity holding a reference to the entry
    pub fn referrer(mut self, entity: EntityId) -> Self {
        self.referrer = Some(entity);
        self
    }

    pub fn extract(
        mut self,
        extract: impl FnOnce(&NativeHandle) -> CacheResult<NativeHandle> + 'static,
    ) -> Self {
        self.extract = Some(Box::new(extract));
        self
    }

    /// Action run when the entry is evicted. The first request to supply one
    /// for an entry wins.
    pub fn on_delete(mut self, action: impl FnOnce(Option<NativeHandle>) + 'static) -> Self {
        self.on_delete = Some(Box::new(action));
        self
    }

    pub fn cancel_with(mut self, token: &CancellationToken) -> Self {
        self.token = Some(token.clone());
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(NativeHandle) + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce(CacheError) + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }
}

impl core::fmt::Debug for CacheRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheRequest")
            .field("url", &self.url)
            .field("library", &self.library)
            .field("referrer", &self.referrer)
            .finish()
    }
}

/// Counters reported in telemetry logs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub joins: u64,
    pub misses: u64,
    pub fetches: u64,
    pub retries: u64,
    pub failures: u64,
    pub evictions: u64,
}

impl core::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "hits={} joins={} misses={} fetches={} retries={} failures={} evictions={}",
            self.hits,
            self.joins,
            self.misses,
            self.fetches,
            self.retries,
            self.failures,
            self.evictions
        )
    }
}

struct Listener {
    token: Option<CancellationToken>,
    extract: Option<ExtractFn>,
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

impl Listener {
    fn is_cancelled(&self) -> bool {
        self.token.as_ref().map_or(false, |t| t.is_cancelled())
    }

    fn deliver(self, value: &NativeHandle) {
        if self.is_cancelled() {
            return;
        }
        let result = match self.extract {
            Some(extract) => extract(value),
            None => Ok(value.clone()),
        };
        match result {
            Ok(native) => {
                if let Some(f) = self.on_success {
                    f(native);
                }
            }
            Err(e) => {
                if let Some(f) = self.on_failure {
                    f(e);
                }
            }
        }
    }

    fn fail(self, error: CacheError) {
        if self.is_cancelled() {
            return;
        }
        if let Some(f) = self.on_failure {
            f(error);
        }
    }
}

struct CacheEntry {
    state: EntryState,
    value: Option<NativeHandle>,
    listeners: Vec<Listener>,
    referrers: HashSet<EntityId>,
    on_delete: Option<DeleteAction>,
    fetch: Option<FetchFn>,
    attempt: u32,
    load_id: u64,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            state: EntryState::NotLoaded,
            value: None,
            listeners: Vec::new(),
            referrers: HashSet::new(),
            on_delete: None,
            fetch: None,
            attempt: 0,
            load_id: 0,
        }
    }
}

struct InFlight {
    key: CacheKey,
    load_id: u64,
    future: FetchFuture,
}

struct Completion {
    key: CacheKey,
    load_id: u64,
    result: CacheResult<NativeHandle>,
}

/// Current-thread runtime giving in-place fetches a reactor and timers
#[derive(Default)]
struct LocalRuntime(Option<tokio::runtime::Runtime>);

impl LocalRuntime {
    fn get(&mut self) -> std::io::Result<&tokio::runtime::Runtime> {
        if self.0.is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            log::debug!("Started local fetch runtime");
            self.0 = Some(runtime);
        }
        match &self.0 {
            Some(runtime) => Ok(runtime),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "fetch runtime unavailable",
            )),
        }
    }
}

impl Drop for LocalRuntime {
    fn drop(&mut self) {
        // Blocking shutdown panics inside another runtime
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

enum Executor {
    Inline(LocalRuntime),
    Runtime(tokio::runtime::Handle),
}

/// Content-addressed, deduplicating resource cache
pub struct ResourceCache {
    entries: HashMap<CacheKey, CacheEntry>,
    index: LibraryIndex,
    retry: Box<dyn RetryPolicy>,
    executor: Executor,
    inflight: Vec<InFlight>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    next_load_id: u64,
    stats: CacheStats,
}

impl ResourceCache {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            entries: HashMap::new(),
            index: LibraryIndex::new(),
            retry: Box::new(NoRetry),
            executor: Executor::Inline(LocalRuntime::default()),
            inflight: Vec::new(),
            completion_tx,
            completion_rx,
            next_load_id: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Box::new(policy);
        self
    }

    /// Spawn fetches on a tokio runtime instead of polling them in place
    pub fn with_runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.executor = Executor::Runtime(handle);
        self
    }

    pub fn set_retry_policy(&mut self, policy: impl RetryPolicy + 'static) {
        self.retry = Box::new(policy);
    }

    pub fn index(&self) -> &LibraryIndex {
        &self.index
    }

    pub fn add_library(&mut self, manifest: &LibraryManifest) {
        self.index.add_library(manifest);
    }

    pub fn resolve_key(&self, url: &str, library: Option<&str>) -> CacheResult<CacheKey> {
        self.index.resolve(url, library)
    }

    /// Local file backing a library key
    pub fn local_path(&self, key: &CacheKey) -> Option<&Path> {
        self.index.local_path(key)
    }

    /// Request a resource.
    ///
    /// A loaded entry is delivered before this returns. A loading entry gets
    /// the callbacks queued. Otherwise the fetch starts; its result is
    /// delivered from a later [`process`](Self::process).
    pub fn request(&mut self, request: CacheRequest) -> CacheResult<Requested> {
        let key = self.index.resolve(&request.url, request.library.as_deref())?;
        let CacheRequest {
            referrer,
            mut fetch,
            extract,
            on_delete,
            token,
            on_success,
            on_failure,
            ..
        } = request;
        let listener = Listener {
            token,
            extract,
            on_success,
            on_failure,
        };

        let entry = self.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
        if let Some(entity) = referrer {
            entry.referrers.insert(entity);
        }
        if entry.on_delete.is_none() {
            entry.on_delete = on_delete;
        }

        let status = match entry.state {
            EntryState::Loaded => {
                self.stats.hits += 1;
                match &entry.value {
                    Some(value) => listener.deliver(value),
                    None => listener.fail(CacheError::Cleared(key.to_string())),
                }
                RequestStatus::Hit
            }
            EntryState::Loading => {
                self.stats.joins += 1;
                entry.listeners.push(listener);
                RequestStatus::Joined
            }
            EntryState::NotLoaded => {
                self.stats.misses += 1;
                self.next_load_id += 1;
                let load_id = self.next_load_id;
                let future = fetch(1);
                entry.state = EntryState::Loading;
                entry.listeners.push(listener);
                entry.fetch = Some(fetch);
                entry.attempt = 1;
                entry.load_id = load_id;
                log::debug!("Fetching {}", key);
                self.start(key.clone(), load_id, future);
                RequestStatus::Started
            }
        };
        Ok(Requested { key, status })
    }

    /// Apply finished fetches. Returns how many completions were handled.
    pub fn process(&mut self) -> usize {
        let mut ready = Vec::new();
        if !self.inflight.is_empty() {
            self.poll_inflight(&mut ready);
        }
        ready.extend(self.completion_rx.try_iter());

        let count = ready.len();
        for completion in ready {
            self.complete(completion);
        }

        for entry in self.entries.values_mut() {
            if entry.state == EntryState::Loading {
                entry.listeners.retain(|l| !l.is_cancelled());
            }
        }
        count
    }

    /// Drop `entity`'s reference; evicts when it was the last one
    pub fn unload(&mut self, key: &CacheKey, entity: EntityId) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if !entry.referrers.remove(&entity) || !entry.referrers.is_empty() {
            return false;
        }
        if let Some(entry) = self.entries.remove(key) {
            self.evict(key, entry);
        }
        true
    }

    /// Evict everything, failing requests still waiting on a fetch
    pub fn clear_all(&mut self) {
        let mut entries: Vec<(CacheKey, CacheEntry)> = self.entries.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, entry) in entries {
            self.evict(&key, entry);
        }
        self.inflight.clear();
        // Results of spawned fetches are stale now
        while self.completion_rx.try_recv().is_ok() {}
        log::debug!("Cache cleared ({})", self.stats);
    }

    pub fn get(&self, key: &CacheKey) -> Option<&NativeHandle> {
        self.entries.get(key).and_then(|e| e.value.as_ref())
    }

    pub fn state(&self, key: &CacheKey) -> EntryState {
        self.entries
            .get(key)
            .map_or(EntryState::NotLoaded, |e| e.state)
    }

    pub fn referrer_count(&self, key: &CacheKey) -> usize {
        self.entries.get(key).map_or(0, |e| e.referrers.len())
    }

    /// Requests still waiting on the entry's fetch
    pub fn waiting_count(&self, key: &CacheKey) -> usize {
        self.entries
            .get(key)
            .map_or(0, |e| e.listeners.iter().filter(|l| !l.is_cancelled()).count())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetches not yet completed
    pub fn loading_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == EntryState::Loading)
            .count()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Poll every in-place fetch once, moving finished ones into `ready`
    fn poll_inflight(&mut self, ready: &mut Vec<Completion>) {
        let inflight = &mut self.inflight;
        let Executor::Inline(local) = &mut self.executor else {
            return;
        };

        // Already inside a runtime: its context serves the fetches
        if tokio::runtime::Handle::try_current().is_ok() {
            let mut cx = Context::from_waker(futures_util::task::noop_waker_ref());
            poll_ready(inflight, &mut cx, ready);
            return;
        }

        match local.get() {
            Ok(runtime) => runtime.block_on(async {
                // Lets the driver pick up I/O and timer events without blocking
                tokio::task::yield_now().await;
                futures_util::future::poll_fn(|cx| {
                    poll_ready(inflight, cx, ready);
                    Poll::Ready(())
                })
                .await;
            }),
            Err(e) => {
                log::error!("Cannot start fetch runtime: {}", e);
                let error = CacheError::Transport(TransportError::Io(e.to_string()));
                ready.extend(inflight.drain(..).map(|f| Completion {
                    key: f.key,
                    load_id: f.load_id,
                    result: Err(error.clone()),
                }));
            }
        }
    }

    fn start(&mut self, key: CacheKey, load_id: u64, future: FetchFuture) {
        self.stats.fetches += 1;
        match &self.executor {
            Executor::Inline(_) => self.inflight.push(InFlight {
                key,
                load_id,
                future,
            }),
            Executor::Runtime(handle) => {
                let tx = self.completion_tx.clone();
                handle.spawn(async move {
                    let result = future.await;
                    let _ = tx.send(Completion {
                        key,
                        load_id,
                        result,
                    });
                });
            }
        }
    }

    fn complete(&mut self, completion: Completion) {
        let Completion {
            key,
            load_id,
            result,
        } = completion;
        let Some(entry) = self.entries.get_mut(&key) else {
            log::debug!("Dropping result for evicted entry {}", key);
            return;
        };
        if entry.state != EntryState::Loading || entry.load_id != load_id {
            log::debug!("Dropping stale result for {}", key);
            return;
        }

        let error = match result {
            Ok(value) => {
                entry.state = EntryState::Loaded;
                entry.value = Some(value.clone());
                entry.fetch = None;
                let listeners = core::mem::take(&mut entry.listeners);
                log::debug!("Loaded {} ({} waiting)", key, listeners.len());
                for listener in listeners {
                    listener.deliver(&value);
                }
                return;
            }
            Err(e) => e,
        };

        if self.retry.should_retry(&error, entry.attempt) {
            if let Some(fetch) = entry.fetch.as_mut() {
                entry.attempt += 1;
                let attempt = entry.attempt;
                let future = fetch(attempt);
                log::debug!("Retrying {} (attempt {}) after: {}", key, attempt, error);
                self.stats.retries += 1;
                self.start(key, load_id, future);
                return;
            }
        }

        entry.state = EntryState::NotLoaded;
        entry.fetch = None;
        let listeners = core::mem::take(&mut entry.listeners);
        self.stats.failures += 1;
        log::warn!("Fetch of {} failed: {}", key, error);
        for listener in listeners {
            listener.fail(error.clone());
        }
    }

    fn evict(&mut self, key: &CacheKey, mut entry: CacheEntry) {
        if entry.state == EntryState::Loading {
            self.inflight.retain(|f| f.key != *key);
            for listener in entry.listeners.drain(..) {
                listener.fail(CacheError::Cleared(key.to_string()));
            }
        }
        if let Some(action) = entry.on_delete.take() {
            action(entry.value.take());
        }
        self.stats.evictions += 1;
        log::debug!("Evicted {}", key);
    }
}

fn poll_ready(inflight: &mut Vec<InFlight>, cx: &mut Context<'_>, ready: &mut Vec<Completion>) {
    inflight.retain_mut(|f| match f.future.as_mut().poll(cx) {
        Poll::Ready(result) => {
            ready.push(Completion {
                key: f.key.clone(),
                load_id: f.load_id,
                result,
            });
            false
        }
        Poll::Pending => true,
    });
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("entries", &self.entries.len())
            .field("inflight", &self.inflight.len())
            .field("stats", &self.stats)
            .finish()
    }
}
