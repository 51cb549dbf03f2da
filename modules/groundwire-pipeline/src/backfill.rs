//! Coordinate backfill: clean virtual locations, then assign coordinates
//! from the cache or the geocoding provider to every event with a usable
//! `(city, state)`.

use std::fmt;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use groundwire_common::{LocationCoordinate, LocationType};
use groundwire_store::Db;

use crate::geocode::Geocoder;
use crate::locations::{classify_city, is_valid_state, state_is_virtual, CityClass};

#[derive(Debug, Clone)]
pub struct BackfillSettings {
    pub use_cache: bool,
    pub reset: bool,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            use_cache: true,
            reset: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct BackfillStats {
    pub cities_cleared: u64,
    pub locations_cleared: u64,
    pub states_cleared: u64,
    pub cache_hits: u64,
    pub geocoded: u64,
    pub events_updated: u64,
    pub failures: u64,
}

impl fmt::Display for BackfillStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cleared {} cities / {} full / {} states, cache hits {}, geocoded {}, \
             events updated {}, failures {}",
            self.cities_cleared,
            self.locations_cleared,
            self.states_cleared,
            self.cache_hits,
            self.geocoded,
            self.events_updated,
            self.failures,
        )
    }
}

pub struct CoordinateBackfill<G> {
    db: Db,
    geocoder: G,
    settings: BackfillSettings,
    stats: BackfillStats,
}

impl<G: Geocoder> CoordinateBackfill<G> {
    pub fn new(db: Db, geocoder: G, settings: BackfillSettings) -> Self {
        Self {
            db,
            geocoder,
            settings,
            stats: BackfillStats::default(),
        }
    }

    pub async fn run(mut self) -> Result<BackfillStats> {
        if self.settings.reset {
            let cleared = self.db.reset_event_coordinates().await?;
            info!(cleared, "existing coordinates reset");
        }

        self.clean_virtual_locations().await?;
        self.assign_coordinates().await?;

        info!(stats = %self.stats, "coordinate backfill complete");
        Ok(self.stats)
    }

    /// Pre-pass: virtual or placeholder names must not reach the geocoder.
    /// A virtual city over a valid state demotes to state-level; over an
    /// invalid state both fields clear.
    async fn clean_virtual_locations(&mut self) -> Result<()> {
        let pairs = self.db.distinct_unresolved_locations().await?;

        for (city, state) in pairs {
            let state_str = state.as_deref().unwrap_or("");

            if !state_str.is_empty() && state_is_virtual(state_str) {
                let cleared = self.db.clear_event_state(state_str).await?;
                if cleared > 0 {
                    info!(state = state_str, cleared, "virtual state cleared");
                    self.stats.states_cleared += 1;
                }
                continue;
            }

            let Some(city) = city.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };

            match classify_city(city) {
                CityClass::Geographic => {}
                CityClass::Unknown => {
                    let cleared = self.db.clear_event_city(city, state.as_deref()).await?;
                    if cleared > 0 {
                        info!(city, cleared, "placeholder city cleared to state-level");
                        self.stats.cities_cleared += 1;
                    }
                }
                CityClass::Virtual => {
                    if is_valid_state(state_str) {
                        let cleared = self.db.clear_event_city(city, state.as_deref()).await?;
                        if cleared > 0 {
                            info!(city, state = state_str, cleared, "virtual city cleared");
                            self.stats.cities_cleared += 1;
                        }
                    } else {
                        let cleared = self.db.clear_event_location(city, state.as_deref()).await?;
                        if cleared > 0 {
                            info!(city, cleared, "virtual location fully cleared");
                            self.stats.locations_cleared += 1;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn assign_coordinates(&mut self) -> Result<()> {
        let pairs = self.db.locations_missing_coordinates().await?;
        info!(locations = pairs.len(), "locations to resolve");

        for (city, state) in pairs {
            let city_ref = city.as_deref().filter(|c| !c.is_empty());
            match self.resolve(city_ref, &state).await {
                Ok(Some((lat, lon))) => {
                    let updated = self
                        .db
                        .update_event_coordinates(city_ref, &state, lat, lon)
                        .await?;
                    self.stats.events_updated += updated;
                }
                Ok(None) => {
                    warn!(?city, state, "no coordinates found");
                    self.stats.failures += 1;
                }
                Err(e) => {
                    warn!(?city, state, error = %e, "geocoding failed");
                    self.stats.failures += 1;
                }
            }
        }

        Ok(())
    }

    /// Cache first, provider second, cache write-back on success.
    async fn resolve(&mut self, city: Option<&str>, state: &str) -> Result<Option<(f64, f64)>> {
        let location_type = if city.is_some() {
            LocationType::City
        } else {
            LocationType::State
        };

        if self.settings.use_cache {
            if let Some(hit) = self
                .db
                .coordinate_cache_get(city, state, location_type)
                .await?
            {
                self.stats.cache_hits += 1;
                return Ok(Some((hit.latitude, hit.longitude)));
            }
        }

        let Some((lat, lon)) = self.geocoder.geocode(city, state).await? else {
            return Ok(None);
        };
        self.stats.geocoded += 1;

        self.db
            .coordinate_cache_upsert(&LocationCoordinate {
                city: city.map(str::to_string),
                state: state.to_string(),
                location_type,
                latitude: lat,
                longitude: lon,
                source: "geocoder".to_string(),
                confidence: 1.0,
                last_verified: Utc::now(),
            })
            .await?;

        Ok(Some((lat, lon)))
    }
}
