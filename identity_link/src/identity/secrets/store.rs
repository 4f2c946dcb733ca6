use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::identity::errors::IdentityError;
use crate::utils::{gen_random_string, now_ms, random_jitter};

use super::storage::SecretStorage;
use super::types::Secret;

/// Random bytes per secret key (256 bits).
const SECRET_KEY_BYTES: usize = 32;
const MAX_JITTER: Duration = Duration::from_secs(1);
/// Delay before retrying a rotation tick that failed.
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// How long a key id missing from storage is answered from memory.
const MISS_TTL_MS: i64 = 5_000;
const MAX_REMEMBERED_MISSES: usize = 1024;

/// The live set of signing secrets.
///
/// Secrets are cached in memory and backed by a [`SecretStorage`] shared by
/// every process of the signer domain. A background task wakes when the current
/// secret is half way through its life, mints a replacement when needed and
/// drops secrets older than the max age. Every secret, whether minted here,
/// announced on the storage feed, or found in storage on a cache miss, enters
/// the cache through the same observation path.
#[derive(Clone)]
pub struct SecretStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn SecretStorage>,
    state: Mutex<SecretState>,
    tasks: Mutex<Tasks>,
}

struct SecretState {
    max_age_ms: i64,
    secrets: BTreeMap<String, Secret>,
    current: Option<Secret>,
    /// Key ids recently looked up and not found, with the time of the lookup.
    misses: HashMap<String, i64>,
}

impl SecretState {
    fn recently_missed(&self, key_id: &str, now: i64) -> bool {
        self.misses
            .get(key_id)
            .is_some_and(|at| now - at < MISS_TTL_MS)
    }

    fn remember_miss(&mut self, key_id: &str, now: i64) {
        if self.misses.len() >= MAX_REMEMBERED_MISSES {
            self.misses.retain(|_, at| now - *at < MISS_TTL_MS);
            if self.misses.len() >= MAX_REMEMBERED_MISSES {
                self.misses.clear();
            }
        }
        self.misses.insert(key_id.to_string(), now);
    }
}

#[derive(Default)]
struct Tasks {
    scheduler: Option<JoinHandle<()>>,
    watch: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Jitter is capped at a quarter of the max age so that short-lived test
/// configurations still get a non-zero sleep between ticks.
fn max_jitter(max_age_ms: i64) -> Duration {
    let quarter = Duration::from_millis(u64::try_from(max_age_ms / 4).unwrap_or(0));
    quarter.min(MAX_JITTER)
}

impl SecretStore {
    /// Initialize the storage, load the live secrets, run the first rotation
    /// tick and start the background tasks.
    pub async fn start(
        storage: Arc<dyn SecretStorage>,
        max_age: Duration,
    ) -> Result<Self, IdentityError> {
        storage.init().await?;

        let store = Self {
            inner: Arc::new(Inner {
                storage,
                state: Mutex::new(SecretState {
                    max_age_ms: duration_ms(max_age),
                    secrets: BTreeMap::new(),
                    current: None,
                    misses: HashMap::new(),
                }),
                tasks: Mutex::new(Tasks::default()),
            }),
        };
        store.start_tasks().await?;
        Ok(store)
    }

    async fn start_tasks(&self) -> Result<(), IdentityError> {
        // Subscribe before the first refresh so no insert falls in between
        let watch = spawn_watch(&self.inner);
        lock(&self.inner.tasks).watch = Some(watch);

        let first = self.inner.tick().await;
        let delay = first.as_ref().copied().unwrap_or(RETRY_DELAY);
        lock(&self.inner.tasks).scheduler = Some(spawn_scheduler(&self.inner, delay));

        first.map(|_| ())
    }

    pub fn max_age(&self) -> Duration {
        let max_age_ms = lock(&self.inner.state).max_age_ms;
        Duration::from_millis(u64::try_from(max_age_ms).unwrap_or(0))
    }

    /// Change the max age. Stops and restarts the rotation schedule.
    pub async fn set_max_age(&self, max_age: Duration) -> Result<(), IdentityError> {
        self.stop();
        lock(&self.inner.state).max_age_ms = duration_ms(max_age);
        tracing::debug!(max_age_ms = duration_ms(max_age), "Restarting secret rotation");
        self.start_tasks().await
    }

    /// The most recently created live secret.
    pub fn get_current(&self) -> Result<Secret, IdentityError> {
        let state = lock(&self.inner.state);
        validate_secret(state.current.as_ref(), "Current secret", state.max_age_ms)
    }

    /// The secret an identity was signed with, if it is still live.
    ///
    /// A key id missing from both the cache and storage is not looked up in
    /// storage again for a few seconds.
    pub async fn get_by_key_id(&self, key_id: &str) -> Result<Secret, IdentityError> {
        let (cached, recently_missed) = {
            let state = lock(&self.inner.state);
            (
                state.secrets.get(key_id).cloned(),
                state.recently_missed(key_id, now_ms()),
            )
        };

        let secret = match cached {
            Some(secret) => Some(secret),
            None if recently_missed => None,
            None => {
                let found = self.inner.storage.get(key_id).await?;
                match &found {
                    Some(secret) => self.inner.observe_added(secret.clone()),
                    None => lock(&self.inner.state).remember_miss(key_id, now_ms()),
                }
                found
            }
        };

        let max_age_ms = lock(&self.inner.state).max_age_ms;
        validate_secret(
            secret.as_ref(),
            &format!("Secret for keyId {key_id}"),
            max_age_ms,
        )
    }

    /// Stop the rotation schedule and the storage watch.
    pub fn stop(&self) {
        lock(&self.inner.tasks).abort_all();
    }
}

impl Inner {
    fn observe_added(&self, secret: Secret) {
        let mut state = lock(&self.state);
        if secret.expires_at_ms(state.max_age_ms) < now_ms() {
            return;
        }
        state.misses.remove(&secret.id);

        let is_newer = state
            .current
            .as_ref()
            .is_none_or(|current| current.created_at_ms < secret.created_at_ms);
        if is_newer {
            tracing::debug!(key_id = %secret.id, "Current signing secret changed");
            state.current = Some(secret.clone());
        }
        state.secrets.insert(secret.id.clone(), secret);
    }

    /// One rotation step. Returns the delay until the next one.
    async fn tick(&self) -> Result<Duration, IdentityError> {
        let max_age_ms = lock(&self.state).max_age_ms;

        for secret in self.storage.list_since(now_ms() - max_age_ms).await? {
            self.observe_added(secret);
        }

        // A rotation is due once the current secret is within the jitter window
        // of its half-life. Processes whose jittered wake-up comes later see the
        // replacement in the refresh above and skip minting.
        let jitter_window_ms = duration_ms(max_jitter(max_age_ms));
        let needs_new_secret = {
            let state = lock(&self.state);
            state.current.as_ref().is_none_or(|current| {
                current.half_life_at_ms(state.max_age_ms) - jitter_window_ms <= now_ms()
            })
        };
        if needs_new_secret {
            let key = gen_random_string(SECRET_KEY_BYTES)?;
            let secret = self.storage.insert(&key, now_ms()).await?;
            tracing::info!(key_id = %secret.id, "Minted new signing secret");
            self.observe_added(secret);
        }

        let now = now_ms();
        let half_life_at = {
            let mut state = lock(&self.state);
            let max_age_ms = state.max_age_ms;
            state
                .secrets
                .retain(|_, secret| secret.expires_at_ms(max_age_ms) >= now);
            state
                .current
                .as_ref()
                .map_or(now, |current| current.half_life_at_ms(max_age_ms))
        };

        let until_half_life = u64::try_from(half_life_at - now).unwrap_or(0);
        let jitter = random_jitter(max_jitter(max_age_ms))?;
        Ok(Duration::from_millis(until_half_life).saturating_sub(jitter))
    }
}

impl Tasks {
    fn abort_all(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.abort();
        }
        if let Some(handle) = self.watch.take() {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }
}

fn validate_secret(
    secret: Option<&Secret>,
    desc: &str,
    max_age_ms: i64,
) -> Result<Secret, IdentityError> {
    let secret =
        secret.ok_or_else(|| IdentityError::SecretUnavailable(format!("{desc} is not available")))?;
    if secret.expires_at_ms(max_age_ms) < now_ms() {
        return Err(IdentityError::SecretUnavailable(format!(
            "{desc} is more than {max_age_ms}ms old"
        )));
    }
    Ok(secret.clone())
}

fn spawn_watch(inner: &Arc<Inner>) -> JoinHandle<()> {
    let mut feed = inner.storage.subscribe();
    let weak: Weak<Inner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(secret) => match weak.upgrade() {
                    Some(inner) => inner.observe_added(secret),
                    None => break,
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Secret feed lagged; relying on the next refresh");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_scheduler(inner: &Arc<Inner>, first_delay: Duration) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        let mut delay = first_delay;
        loop {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            delay = match inner.tick().await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(error = %e, "Secret rotation tick failed");
                    RETRY_DELAY
                }
            };
        }
    })
}
