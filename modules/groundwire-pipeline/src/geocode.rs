//! Geocoding provider behind a trait so the backfill stays testable
//! without network access.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve `(city, state)` — or a bare state — to coordinates.
    /// `Ok(None)` means the provider had no result.
    async fn geocode(&self, city: Option<&str>, state: &str) -> Result<Option<(f64, f64)>>;
}

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

pub struct HttpGeocoder {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl HttpGeocoder {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: GEOCODE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, city: Option<&str>, state: &str) -> Result<Option<(f64, f64)>> {
        let address = match city {
            Some(city) => format!("{city}, {state}, USA"),
            None => format!("{state}, USA"),
        };

        let response: GeocodeResponse = self
            .http
            .get(&self.base_url)
            .query(&[("address", address.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .context("geocode request")?
            .json()
            .await
            .context("geocode response")?;

        if response.status != "OK" {
            debug!(address, status = response.status, "geocoder returned no result");
            return Ok(None);
        }

        Ok(response
            .results
            .first()
            .map(|r| (r.geometry.location.lat, r.geometry.location.lng)))
    }
}
