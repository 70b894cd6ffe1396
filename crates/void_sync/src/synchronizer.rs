//! Property synchronizer
//!
//! Authoritative updates for networked properties arrive at irregular,
//! sparse intervals. Applying them as-is makes objects stutter, so a filtered
//! property is instead fed to a per-property filter and a once-per-tick
//! regression emits a smoothed value between measurements:
//!
//! ```text
//! value = previous + (current - previous) * t      t = elapsed * rate
//! ```
//!
//! where `previous` is what was shown when the last measurement arrived,
//! `current` the filter estimate after it, and `rate` the smoothed
//! measurement frequency. Once `t` passes 1 the next measurement is overdue
//! and the last value is held instead of overshooting.
//!
//! Time is injected as a [`Duration`] since session start so ticks are
//! deterministic.

use std::collections::BTreeMap;
use std::time::Duration;

use void_core::EntityId;
use void_dispatch::{PropertyKey, PropertyUpdate, PropertyValue};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::filter::ChannelFilter;
use crate::sink::UpdateSink;
use crate::strategy::FilterStrategy;

/// Filter state of one (entity, property) pair
#[derive(Debug, Clone)]
struct FilterState {
    strategy: FilterStrategy,
    filters: Vec<ChannelFilter>,
    /// Channels shown when the last measurement arrived
    previous: Vec<f32>,
    /// Filter estimate after the last measurement
    current: Vec<f32>,
    /// Channels of the last regressed value
    shown: Vec<f32>,
    value: PropertyValue,
    last_measurement: Duration,
    /// Measurements per second; zero until two have arrived
    rate: f32,
}

impl FilterState {
    fn new(
        key: PropertyKey,
        initial: PropertyValue,
        now: Duration,
        config: &SyncConfig,
    ) -> SyncResult<Self> {
        let strategy = FilterStrategy::for_kind(key, initial.kind())?;
        let channels = strategy.encode(key, &initial)?;
        let filters = channels
            .iter()
            .map(|c| ChannelFilter::new(*c, config.process_noise, config.measurement_noise))
            .collect();
        Ok(Self {
            strategy,
            filters,
            previous: channels.clone(),
            current: channels.clone(),
            shown: channels,
            value: initial,
            last_measurement: now,
            rate: 0.0,
        })
    }

    fn measure(
        &mut self,
        key: PropertyKey,
        value: &PropertyValue,
        now: Duration,
        smoothing: f32,
    ) -> SyncResult<()> {
        let channels = self.strategy.encode(key, value)?;

        let dt = now.saturating_sub(self.last_measurement).as_secs_f32();
        if dt > 0.0 {
            let instant = 1.0 / dt;
            self.rate = if self.rate > 0.0 {
                self.rate + smoothing * (instant - self.rate)
            } else {
                instant
            };
            self.last_measurement = now;
        }

        self.previous = self.shown.clone();
        self.current = self
            .filters
            .iter_mut()
            .zip(&channels)
            .map(|(f, c)| f.update(*c))
            .collect();
        Ok(())
    }

    /// Regressed value at `now`, or `None` while holding
    fn regress(&mut self, now: Duration) -> Option<PropertyValue> {
        if self.rate <= 0.0 {
            return None;
        }
        let elapsed = now.saturating_sub(self.last_measurement).as_secs_f32();
        let t = elapsed * self.rate;
        if t > 1.0 {
            return None;
        }

        self.shown = self
            .previous
            .iter()
            .zip(&self.current)
            .map(|(p, c)| p + (c - p) * t)
            .collect();
        self.value = self.strategy.decode(&self.shown, &self.value);
        Some(self.value.clone())
    }
}

/// Smooths networked property updates between sparse measurements
#[derive(Debug, Default)]
pub struct PropertySynchronizer {
    config: SyncConfig,
    filters: BTreeMap<(EntityId, PropertyKey), FilterState>,
}

impl PropertySynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config: config.sanitized(),
            filters: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start filtering a property, seeded with `initial` as its first
    /// measurement
    pub fn start(
        &mut self,
        entity: EntityId,
        key: PropertyKey,
        initial: PropertyValue,
        now: Duration,
    ) -> SyncResult<()> {
        if self.filters.contains_key(&(entity, key)) {
            return Err(SyncError::AlreadyFiltering { entity, key });
        }
        let state = FilterState::new(key, initial, now, &self.config)?;
        log::debug!(
            "Filtering {} of entity {} ({} channels)",
            key,
            entity,
            state.filters.len()
        );
        self.filters.insert((entity, key), state);
        Ok(())
    }

    /// Stop filtering and apply `value` as is, bypassing the filter
    pub fn stop(
        &mut self,
        entity: EntityId,
        key: PropertyKey,
        value: PropertyValue,
        sink: &mut dyn UpdateSink,
    ) -> SyncResult<bool> {
        if self.filters.remove(&(entity, key)).is_none() {
            return Err(SyncError::NotFiltering { entity, key });
        }
        log::debug!("Stopped filtering {} of entity {}", key, entity);
        Ok(sink.apply(entity, &PropertyUpdate::set(key, value))?)
    }

    /// Fold an authoritative value into the property's filter
    pub fn on_measurement(
        &mut self,
        entity: EntityId,
        key: PropertyKey,
        value: &PropertyValue,
        now: Duration,
    ) -> SyncResult<()> {
        let smoothing = self.config.rate_smoothing;
        let state = self
            .filters
            .get_mut(&(entity, key))
            .ok_or(SyncError::NotFiltering { entity, key })?;
        state.measure(key, value, now, smoothing)
    }

    /// Emit the regressed value of every active filter. Returns how many
    /// updates were applied.
    pub fn tick(&mut self, now: Duration, sink: &mut dyn UpdateSink) -> usize {
        let mut applied = 0;
        for (&(entity, key), state) in self.filters.iter_mut() {
            let Some(value) = state.regress(now) else {
                continue;
            };
            match sink.apply(entity, &PropertyUpdate::set(key, value)) {
                Ok(true) => applied += 1,
                Ok(false) => log::trace!("Filtered {} of entity {} not handled", key, entity),
                Err(e) => log::warn!("Filtered update of entity {} failed: {}", entity, e),
            }
        }
        applied
    }

    pub fn is_filtering(&self, entity: EntityId, key: PropertyKey) -> bool {
        self.filters.contains_key(&(entity, key))
    }

    /// Last value produced for a filtered property
    pub fn value(&self, entity: EntityId, key: PropertyKey) -> Option<&PropertyValue> {
        self.filters.get(&(entity, key)).map(|s| &s.value)
    }

    /// Estimated measurements per second of a filtered property
    pub fn rate(&self, entity: EntityId, key: PropertyKey) -> Option<f32> {
        self.filters.get(&(entity, key)).map(|s| s.rate)
    }

    pub fn active_count(&self) -> usize {
        self.filters.len()
    }

    /// Drop every filter of `entity` without applying anything
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        let before = self.filters.len();
        self.filters.retain(|(e, _), _| *e != entity);
        before - self.filters.len()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }
}
