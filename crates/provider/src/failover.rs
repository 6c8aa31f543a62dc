//! Multi-provider failover
//!
//! Providers form an ordered, degrading pool. Each call picks the best
//! provider not cooling down, retries it a bounded number of times for
//! transient failures, and on rate limits or persistent errors parks it in
//! the cooldown table and moves on. A wall-clock budget bounds the total
//! time one call may spend waiting.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use jobpilot_config::{Config, FailoverConfig, ProviderDescriptor};

use crate::{ChatParams, Completer, Message, OpenAiCompatProvider, Provider, ProviderError, Result};

/// Added to an advertised `retry-after` before trusting it
const RETRY_AFTER_BUFFER: Duration = Duration::from_secs(1);

/// Longest a provider can be parked
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay recommended when no provider is configured
const FALLBACK_CALL_DELAY: Duration = Duration::from_secs(5);

/// Retry and cooldown policy
#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    /// Attempts against one provider before failing over
    pub retries_before_failover: u32,
    /// Wall-clock budget for one `complete` call
    pub max_wait: Duration,
    pub connection_cooldown: Duration,
    pub api_error_cooldown: Duration,
    /// Slack added when sleeping out another provider's cooldown
    pub wait_margin: Duration,
    /// Pause before retrying after an empty response or API error
    pub retry_pause: Duration,
    /// Transport errors back off `backoff_base * 2^attempt`
    pub backoff_base: Duration,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self::from_config(&FailoverConfig::default())
    }
}

impl FailoverPolicy {
    pub fn from_config(config: &FailoverConfig) -> Self {
        Self {
            retries_before_failover: config.retries_before_failover,
            max_wait: Duration::from_secs(config.max_wait_secs),
            connection_cooldown: Duration::from_secs(config.connection_cooldown_secs),
            api_error_cooldown: Duration::from_secs(config.api_error_cooldown_secs),
            wait_margin: Duration::from_secs(config.wait_margin_secs),
            retry_pause: Duration::from_secs(2),
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// Provider id → instant it may be selected again.
///
/// Only registered catalog ids are ever stored. Entries are never cleared;
/// they go stale once their instant passes.
#[derive(Debug)]
pub struct CooldownTable {
    known: RwLock<HashSet<String>>,
    until: Mutex<HashMap<String, Instant>>,
}

impl CooldownTable {
    pub fn new<I, S>(provider_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: RwLock::new(provider_ids.into_iter().map(Into::into).collect()),
            until: Mutex::new(HashMap::new()),
        }
    }

    /// Accept cooldowns for more catalog ids
    pub fn register<I, S>(&self, provider_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(provider_ids.into_iter().map(Into::into));
    }

    pub fn knows(&self, provider_id: &str) -> bool {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(provider_id)
    }

    /// Park a provider for `duration`, capped at `MAX_COOLDOWN`; unknown ids
    /// are refused
    pub async fn set(&self, provider_id: &str, duration: Duration) -> bool {
        if !self.knows(provider_id) {
            warn!("refusing cooldown for unknown provider '{}'", provider_id);
            return false;
        }
        let now = Instant::now();
        let Some(until) = now.checked_add(duration.min(MAX_COOLDOWN)) else {
            warn!("cooldown for '{}' out of range", provider_id);
            return false;
        };
        self.until
            .lock()
            .await
            .insert(provider_id.to_string(), until);
        true
    }

    pub async fn available_at(&self, provider_id: &str) -> Option<Instant> {
        self.until.lock().await.get(provider_id).copied()
    }

    pub async fn is_available(&self, provider_id: &str, now: Instant) -> bool {
        match self.available_at(provider_id).await {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Remaining cooldown, zero when available
    pub async fn remaining(&self, provider_id: &str, now: Instant) -> Duration {
        self.available_at(provider_id)
            .await
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub async fn len(&self) -> usize {
        self.until.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// A catalog entry paired with the backend that serves it
pub struct ProviderSlot {
    pub descriptor: ProviderDescriptor,
    pub backend: Arc<dyn Provider>,
}

impl ProviderSlot {
    pub fn new(descriptor: ProviderDescriptor, backend: Arc<dyn Provider>) -> Self {
        Self {
            descriptor,
            backend,
        }
    }

    fn id(&self) -> &str {
        &self.descriptor.id
    }

    fn name(&self) -> &str {
        &self.descriptor.display_name
    }
}

/// Failover engine over an ordered provider pool
pub struct FailoverClient {
    slots: Vec<ProviderSlot>,
    policy: FailoverPolicy,
    cooldowns: Arc<CooldownTable>,
    model_override: Option<String>,
    temperature: f32,
}

impl FailoverClient {
    /// Slots are tried in the order given
    pub fn new(slots: Vec<ProviderSlot>, policy: FailoverPolicy) -> Self {
        let cooldowns = Arc::new(CooldownTable::new(
            slots.iter().map(|s| s.descriptor.id.clone()),
        ));
        Self {
            slots,
            policy,
            cooldowns,
            model_override: None,
            temperature: 0.7,
        }
    }

    /// Build the production pool from the provider catalog
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.failover.request_timeout_secs);
        let slots = config
            .providers
            .iter()
            .map(|descriptor| {
                let backend = OpenAiCompatProvider::from_descriptor(descriptor, timeout);
                ProviderSlot::new(descriptor.clone(), Arc::new(backend))
            })
            .collect();

        Self::new(slots, FailoverPolicy::from_config(&config.failover))
            .with_model_override(config.model_override())
    }

    /// Share a cooldown table with other engine instances.
    ///
    /// The table learns this pool's ids so every slot can be parked.
    pub fn with_cooldowns(mut self, cooldowns: Arc<CooldownTable>) -> Self {
        cooldowns.register(self.slots.iter().map(|s| s.descriptor.id.clone()));
        self.cooldowns = cooldowns;
        self
    }

    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    pub fn cooldowns(&self) -> Arc<CooldownTable> {
        Arc::clone(&self.cooldowns)
    }

    fn configured(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.backend.is_configured())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn has_configured(&self) -> bool {
        !self.configured().is_empty()
    }

    /// Display names of configured providers, in failover order
    pub fn configured_names(&self) -> Vec<String> {
        self.configured()
            .into_iter()
            .map(|idx| self.slots[idx].name().to_string())
            .collect()
    }

    fn expected_keys(&self) -> String {
        self.slots
            .iter()
            .map(|s| s.descriptor.key_env.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Pre-flight listing of the pool
    pub fn status_report(&self) -> String {
        let mut lines = vec!["  LLM providers (failover order):".to_string()];
        for slot in &self.slots {
            let status = if slot.backend.is_configured() {
                "ready"
            } else {
                "no key"
            };
            lines.push(format!("    {:12} [{}]", slot.name(), status));
        }
        if !self.has_configured() {
            lines.push("    WARNING: No API keys configured!".to_string());
        }
        lines.join("\n")
    }

    /// Pick the provider to try next and how long to wait for it.
    ///
    /// `exclude` (the provider that just failed) is moved to the back of the
    /// preference order rather than dropped.
    async fn next_provider(&self, exclude: Option<&str>) -> Option<(usize, Duration)> {
        let available = self.configured();
        if available.is_empty() {
            return None;
        }

        let mut ordered: Vec<usize> = available
            .iter()
            .copied()
            .filter(|&idx| Some(self.slots[idx].id()) != exclude)
            .collect();
        if ordered.len() < available.len() {
            ordered.extend(
                available
                    .iter()
                    .copied()
                    .filter(|&idx| Some(self.slots[idx].id()) == exclude),
            );
        }

        let now = Instant::now();
        for &idx in &ordered {
            if self.cooldowns.is_available(self.slots[idx].id(), now).await {
                return Some((idx, Duration::ZERO));
            }
        }

        let mut soonest: Option<(usize, Duration)> = None;
        for &idx in &ordered {
            let remaining = self.cooldowns.remaining(self.slots[idx].id(), now).await;
            if soonest.map_or(true, |(_, best)| remaining < best) {
                soonest = Some((idx, remaining));
            }
        }
        soonest
    }

    /// Drive one provider through its retry budget.
    ///
    /// `Err` carries the cooldown to apply before failing over.
    async fn try_provider(
        &self,
        slot: &ProviderSlot,
        messages: &[Message],
        max_tokens: u32,
    ) -> std::result::Result<String, Duration> {
        let params = ChatParams {
            model: self
                .model_override
                .clone()
                .unwrap_or_else(|| slot.backend.default_model()),
            messages: messages.to_vec(),
            max_tokens,
            temperature: self.temperature,
        };

        let attempts = self.policy.retries_before_failover.max(1);
        for attempt in 0..attempts {
            let last_attempt = attempt + 1 == attempts;

            match slot.backend.chat(params.clone()).await {
                Ok(response) => match response.usable_text() {
                    Some(text) => return Ok(text),
                    None if !last_attempt => {
                        warn!("[{}] empty response, retrying", slot.name());
                        sleep(self.policy.retry_pause).await;
                    }
                    None => {
                        warn!("[{}] empty response, failing over", slot.name());
                        return Err(self.policy.connection_cooldown);
                    }
                },
                Err(ProviderError::RateLimited { retry_after }) => {
                    let cooldown = retry_after
                        .map(|d| d.saturating_add(RETRY_AFTER_BUFFER))
                        .unwrap_or_else(|| slot.descriptor.default_cooldown());
                    info!(
                        "[{}] rate limited, cooling down for {}s",
                        slot.name(),
                        cooldown.as_secs()
                    );
                    return Err(cooldown);
                }
                Err(e) if e.is_transport() => {
                    if last_attempt {
                        warn!("[{}] connection failed: {}, failing over", slot.name(), e);
                        return Err(self.policy.connection_cooldown);
                    }
                    let backoff = self.policy.backoff_base * 2u32.saturating_pow(attempt);
                    warn!(
                        "[{}] connection failed, retrying in {}s",
                        slot.name(),
                        backoff.as_secs()
                    );
                    sleep(backoff).await;
                }
                Err(e) => {
                    if last_attempt {
                        warn!("[{}] API error: {}, failing over", slot.name(), e);
                        return Err(self.policy.api_error_cooldown);
                    }
                    warn!("[{}] API error: {}, retrying", slot.name(), e);
                    sleep(self.policy.retry_pause).await;
                }
            }
        }

        Err(self.policy.connection_cooldown)
    }
}

#[async_trait]
impl Completer for FailoverClient {
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<String> {
        if !self.has_configured() {
            return Err(ProviderError::NoProvidersConfigured(self.expected_keys()));
        }

        let started = Instant::now();
        let mut last_failed: Option<String> = None;

        loop {
            let waited = started.elapsed();
            let remaining = self.policy.max_wait.saturating_sub(waited);
            if remaining.is_zero() {
                return Err(ProviderError::AllProvidersExhausted { waited });
            }

            let (idx, wait) = self
                .next_provider(last_failed.as_deref())
                .await
                .ok_or_else(|| ProviderError::NoProvidersConfigured(self.expected_keys()))?;
            let slot = &self.slots[idx];

            if !wait.is_zero() {
                if wait > remaining {
                    warn!(
                        "soonest provider ({}) cools down in {}s, past the {}s left",
                        slot.name(),
                        wait.as_secs(),
                        remaining.as_secs()
                    );
                    return Err(ProviderError::AllProvidersExhausted { waited });
                }
                info!(
                    "all providers cooling down, waiting {}s for {}",
                    wait.as_secs(),
                    slot.name()
                );
                sleep(wait.saturating_add(self.policy.wait_margin).min(remaining)).await;
            }

            debug!("[{}] requesting completion", slot.name());
            match self.try_provider(slot, messages, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(cooldown) => {
                    self.cooldowns.set(slot.id(), cooldown).await;
                    last_failed = Some(slot.id().to_string());
                }
            }
        }
    }

    fn call_delay(&self) -> Duration {
        self.configured()
            .first()
            .map(|&idx| self.slots[idx].descriptor.delay())
            .unwrap_or(FALLBACK_CALL_DELAY)
    }
}
