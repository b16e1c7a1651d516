//! Google Geocoding and Places Nearby Search client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{pick_top, Place, PlaceResolver};
use crate::config::PlacesConfig;
use crate::{AppError, Result};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const NEARBY_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";

/// Results considered per search.
const SEARCH_LIMIT: usize = 6;

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

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    #[serde(default)]
    results: Vec<NearbyResult>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct NearbyResult {
    name: String,
    vicinity: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    geometry: Geometry,
}

/// Place resolver backed by Google Maps web services.
#[derive(Clone)]
pub struct GooglePlaceResolver {
    client: reqwest::Client,
    api_key: String,
    radius_meters: u32,
}

impl GooglePlaceResolver {
    /// Build a resolver with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no API key is configured, or
    /// `AppError::External` if the HTTP client cannot be built.
    pub fn new(config: &PlacesConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Config("places api key is not configured".into()));
        }
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key: config.api_key.clone(),
            radius_meters: config.search_radius_meters,
        })
    }

    fn url(base: &str, params: &[(&str, &str)]) -> Result<Url> {
        Url::parse_with_params(base, params)
            .map_err(|err| AppError::External(format!("invalid places url: {err}")))
    }

    async fn geocode_text(&self, text: &str) -> Result<Option<(f64, f64)>> {
        let url = Self::url(GEOCODE_URL, &[("address", text), ("key", self.api_key.as_str())])?;
        let response: GeocodeResponse = self.client.get(url).send().await?.json().await?;
        match response.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => return Err(AppError::External(format!("geocode status {other}"))),
        }
        let coords = response
            .results
            .into_iter()
            .next()
            .map(|r| (r.geometry.location.lat, r.geometry.location.lng));
        if coords.is_none() {
            warn!(text, "no geocoding results");
        }
        Ok(coords)
    }

    async fn nearby(&self, query: &str, lat: f64, lng: f64) -> Result<Option<Place>> {
        let location = format!("{lat},{lng}");
        let radius = self.radius_meters.to_string();
        let url = Self::url(
            NEARBY_URL,
            &[
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                ("keyword", query),
                ("type", "establishment"),
                ("key", self.api_key.as_str()),
            ],
        )?;
        let response: NearbyResponse = self.client.get(url).send().await?.json().await?;
        match response.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => return Err(AppError::External(format!("places status {other}"))),
        }
        let places: Vec<Place> = response
            .results
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(|r| Place {
                name: r.name,
                address: r.vicinity,
                rating: r.rating,
                ratings_total: r.user_ratings_total,
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
            })
            .collect();
        debug!(query, found = places.len(), "nearby search finished");
        Ok(pick_top(places))
    }
}

impl PlaceResolver for GooglePlaceResolver {
    fn geocode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(f64, f64)>>> + Send + 'a>> {
        Box::pin(self.geocode_text(text))
    }

    fn search_top_recommendation<'a>(
        &'a self,
        query: &'a str,
        lat: f64,
        lng: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Place>>> + Send + 'a>> {
        Box::pin(self.nearby(query, lat, lng))
    }
}
