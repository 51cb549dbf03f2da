//! Geocoding cache keyed on `(city, state, location_type)`. City is null
//! for state-level entries; the uniqueness index coalesces it to ''.

use groundwire_common::{LocationCoordinate, LocationType};

use crate::db::Db;
use crate::error::Result;
use crate::rows::CoordinateRow;

impl Db {
    pub async fn coordinate_cache_get(
        &self,
        city: Option<&str>,
        state: &str,
        location_type: LocationType,
    ) -> Result<Option<LocationCoordinate>> {
        let row = self
            .run("coordinate cache lookup", || {
                sqlx::query_as::<_, CoordinateRow>(
                    "SELECT city, state, location_type, latitude, longitude, source, \
                            confidence, last_verified \
                     FROM location_coordinates \
                     WHERE COALESCE(city, '') = COALESCE($1, '') \
                       AND state = $2 AND location_type = $3",
                )
                .bind(city)
                .bind(state)
                .bind(location_type.as_str())
                .fetch_optional(self.pool())
            })
            .await?
            .flatten();
        Ok(row.map(LocationCoordinate::from))
    }

    pub async fn coordinate_cache_upsert(&self, coord: &LocationCoordinate) -> Result<()> {
        self.run("coordinate cache upsert", || {
            sqlx::query(
                "INSERT INTO location_coordinates \
                     (city, state, location_type, latitude, longitude, source, confidence, last_verified) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (COALESCE(city, ''), state, location_type) DO UPDATE SET \
                     latitude = EXCLUDED.latitude, \
                     longitude = EXCLUDED.longitude, \
                     source = EXCLUDED.source, \
                     confidence = EXCLUDED.confidence, \
                     last_verified = EXCLUDED.last_verified",
            )
            .bind(&coord.city)
            .bind(&coord.state)
            .bind(coord.location_type.as_str())
            .bind(coord.latitude)
            .bind(coord.longitude)
            .bind(&coord.source)
            .bind(coord.confidence)
            .bind(coord.last_verified)
            .execute(self.pool())
        })
        .await?;
        Ok(())
    }
}
