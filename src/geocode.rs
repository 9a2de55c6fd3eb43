use crate::cache::PlaceCache;
use crate::config::GeocoderConfig;
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("provider rate limit hit")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// A completed lookup: either a place, or a well-formed provider response
/// that named no locality at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lookup {
    Found(Place),
    NoMatch,
}

/// The provider seam. One implementation ships; tests script their own.
#[async_trait]
pub trait ReverseGeocode: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Lookup, GeocodeError>;
}

/// Client for the Nominatim `reverse` JSON dialect (also spoken by hosted
/// providers such as LocationIQ, which take the credential as a `key`
/// parameter). Place names are requested in English.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, reqwest::Error> {
        log::debug!("Creating geocoder client for endpoint: {}", config.endpoint);
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    address: Option<ReverseAddress>,
    // Nominatim reports "unable to geocode" as a 200 with an error body.
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    country: Option<String>,
}

fn lookup_from_response(response: ReverseResponse) -> Lookup {
    if let Some(reason) = &response.error {
        log::debug!("Provider returned no locality: {}", reason);
    }
    let address = match response.address {
        Some(address) => address,
        None => return Lookup::NoMatch,
    };
    let city = address.city.or(address.town).or(address.village);
    let country = address.country;
    if city.is_none() && country.is_none() {
        return Lookup::NoMatch;
    }
    Lookup::Found(Place { city, country })
}

fn classify_send_error(e: reqwest::Error) -> GeocodeError {
    if e.is_timeout() {
        GeocodeError::Timeout
    } else {
        GeocodeError::Transport(e.to_string())
    }
}

#[async_trait]
impl ReverseGeocode for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Lookup, GeocodeError> {
        let mut request = self.client.get(format!("{}/reverse", self.endpoint)).query(&[
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("format", "jsonv2".to_string()),
            ("accept-language", "en".to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await.map_err(classify_send_error)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(GeocodeError::Transport(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        Ok(lookup_from_response(body))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolverStats {
    pub calls: u64,
    pub errors: u64,
    pub timeouts: u64,
}

/// Cache-first resolver over a [`ReverseGeocode`] provider.
///
/// Coordinates are quantized before lookup so near-duplicate shots share one
/// remote call. Each remote attempt counts toward `calls`; a lookup that ends
/// in a timeout counts toward `timeouts` once, any other terminal failure
/// toward `errors` once. Cache hits touch no counter.
pub struct Resolver {
    provider: Box<dyn ReverseGeocode>,
    cache: PlaceCache,
    request_delay: Duration,
    max_retries: u32,
    stats: ResolverStats,
}

impl Resolver {
    pub fn new(provider: Box<dyn ReverseGeocode>, cache: PlaceCache, config: &GeocoderConfig) -> Self {
        Self {
            provider,
            cache,
            request_delay: Duration::from_millis(config.request_delay_ms),
            max_retries: config.max_retries,
            stats: ResolverStats::default(),
        }
    }

    pub async fn resolve(&mut self, lat: f64, lon: f64) -> Result<Lookup, GeocodeError> {
        let key = PlaceCache::key(lat, lon);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("Place cache hit for {}", key);
            return Ok(hit.clone());
        }

        let mut pause = self.request_delay;
        let mut attempt = 0;
        loop {
            // Provider quota: one request at a time, paced by the configured delay.
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            self.stats.calls += 1;
            match self.provider.reverse(lat, lon).await {
                Ok(lookup) => {
                    self.cache.insert(key, lookup.clone());
                    return Ok(lookup);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    if matches!(e, GeocodeError::RateLimited | GeocodeError::Timeout) {
                        pause *= 2;
                    }
                    log::warn!(
                        "Geocoding ({}, {}) failed: {}. Retry {} of {}",
                        lat,
                        lon,
                        e,
                        attempt,
                        self.max_retries
                    );
                }
                Err(e) => {
                    match e {
                        GeocodeError::Timeout => self.stats.timeouts += 1,
                        _ => self.stats.errors += 1,
                    }
                    return Err(e);
                }
            }
        }
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    pub fn persist_cache(&self) -> Result<(), AppError> {
        self.cache.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn found(city: &str, country: &str) -> Lookup {
        Lookup::Found(Place {
            city: Some(city.to_string()),
            country: Some(country.to_string()),
        })
    }

    /// Pops one scripted response per call; panics if called more often than
    /// the script allows.
    struct ScriptedGeocoder {
        responses: Mutex<VecDeque<Result<Lookup, GeocodeError>>>,
    }

    impl ScriptedGeocoder {
        fn new(responses: Vec<Result<Lookup, GeocodeError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ReverseGeocode for ScriptedGeocoder {
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Lookup, GeocodeError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted geocoder ran out of responses")
        }
    }

    fn test_resolver(responses: Vec<Result<Lookup, GeocodeError>>, max_retries: u32) -> Resolver {
        let config = GeocoderConfig {
            endpoint: "http://localhost".to_string(),
            api_key: None,
            user_agent: "test".to_string(),
            request_timeout_secs: 1,
            request_delay_ms: 0,
            max_retries,
        };
        let dir = tempfile::tempdir().unwrap();
        let cache = PlaceCache::load(&dir.path().join("cache.json"));
        Resolver::new(Box::new(ScriptedGeocoder::new(responses)), cache, &config)
    }

    #[tokio::test]
    async fn same_coordinate_twice_makes_one_remote_call() {
        let mut resolver = test_resolver(vec![Ok(found("Paris", "France"))], 0);

        let first = resolver.resolve(48.8584, 2.2945).await.unwrap();
        let second = resolver.resolve(48.8584, 2.2945).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, found("Paris", "France"));
        assert_eq!(resolver.stats().calls, 1);
    }

    #[tokio::test]
    async fn nearby_coordinates_share_a_quantized_key() {
        let mut resolver = test_resolver(vec![Ok(found("Paris", "France"))], 0);

        resolver.resolve(48.85841, 2.29451).await.unwrap();
        // Rounds to the same 4-decimal key, so no second remote call.
        resolver.resolve(48.85838, 2.29449).await.unwrap();

        assert_eq!(resolver.stats().calls, 1);
    }

    #[tokio::test]
    async fn no_match_is_cached_too() {
        let mut resolver = test_resolver(vec![Ok(Lookup::NoMatch)], 0);

        assert_eq!(resolver.resolve(0.0, 0.0).await.unwrap(), Lookup::NoMatch);
        assert_eq!(resolver.resolve(0.0, 0.0).await.unwrap(), Lookup::NoMatch);
        assert_eq!(resolver.stats().calls, 1);
    }

    #[tokio::test]
    async fn timeout_after_retries_counts_once() {
        let mut resolver = test_resolver(
            vec![Err(GeocodeError::Timeout), Err(GeocodeError::Timeout)],
            1,
        );

        let result = resolver.resolve(10.0, 10.0).await;

        assert!(matches!(result, Err(GeocodeError::Timeout)));
        let stats = resolver.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn rate_limited_then_success_recovers() {
        let mut resolver = test_resolver(
            vec![Err(GeocodeError::RateLimited), Ok(found("Lyon", "France"))],
            1,
        );

        let result = resolver.resolve(45.76, 4.84).await.unwrap();

        assert_eq!(result, found("Lyon", "France"));
        let stats = resolver.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.timeouts, 0);
    }

    #[tokio::test]
    async fn transport_failure_counts_as_error() {
        let mut resolver = test_resolver(
            vec![Err(GeocodeError::Transport("boom".to_string()))],
            0,
        );

        let result = resolver.resolve(1.0, 2.0).await;

        assert!(matches!(result, Err(GeocodeError::Transport(_))));
        assert_eq!(resolver.stats().errors, 1);
        assert_eq!(resolver.stats().timeouts, 0);
    }

    #[tokio::test]
    async fn failed_lookup_is_not_cached() {
        let mut resolver = test_resolver(
            vec![
                Err(GeocodeError::Transport("boom".to_string())),
                Ok(found("Doha", "Qatar")),
            ],
            0,
        );

        assert!(resolver.resolve(25.28, 51.53).await.is_err());
        assert_eq!(
            resolver.resolve(25.28, 51.53).await.unwrap(),
            found("Doha", "Qatar")
        );
        assert_eq!(resolver.stats().calls, 2);
    }

    #[test]
    fn response_city_falls_back_through_town_and_village() {
        let body: ReverseResponse = serde_json::from_str(
            r#"{"address": {"town": "Ronda", "country": "Spain"}}"#,
        )
        .unwrap();
        assert_eq!(lookup_from_response(body), found("Ronda", "Spain"));

        let body: ReverseResponse = serde_json::from_str(
            r#"{"address": {"village": "Oia", "country": "Greece"}}"#,
        )
        .unwrap();
        assert_eq!(lookup_from_response(body), found("Oia", "Greece"));

        let body: ReverseResponse = serde_json::from_str(
            r#"{"address": {"city": "Lyon", "town": "ignored", "country": "France"}}"#,
        )
        .unwrap();
        assert_eq!(lookup_from_response(body), found("Lyon", "France"));
    }

    #[test]
    fn unable_to_geocode_body_is_no_match() {
        let body: ReverseResponse =
            serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert_eq!(lookup_from_response(body), Lookup::NoMatch);
    }

    #[test]
    fn address_without_locality_is_no_match() {
        let body: ReverseResponse = serde_json::from_str(r#"{"address": {}}"#).unwrap();
        assert_eq!(lookup_from_response(body), Lookup::NoMatch);
    }

    #[test]
    fn country_without_city_still_resolves() {
        let body: ReverseResponse =
            serde_json::from_str(r#"{"address": {"country": "Iceland"}}"#).unwrap();
        assert_eq!(
            lookup_from_response(body),
            Lookup::Found(Place {
                city: None,
                country: Some("Iceland".to_string()),
            })
        );
    }
}
