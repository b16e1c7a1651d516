//! Place lookup boundary used to enrich location-needing tasks.

pub mod google;

use std::future::Future;
use std::pin::Pin;

use crate::models::task::TaskLocation;
use crate::Result;

/// Minimum rating for a place to count as a quality recommendation.
pub const MIN_RATING: f64 = 4.0;

/// Minimum number of ratings for a quality recommendation.
pub const MIN_RATINGS_TOTAL: u32 = 50;

/// A place returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    /// Display name.
    pub name: String,
    /// Street address or vicinity.
    pub address: Option<String>,
    /// Average rating (0–5).
    pub rating: Option<f64>,
    /// Number of ratings.
    pub ratings_total: Option<u32>,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl Place {
    /// Location record attached to a task.
    #[must_use]
    pub fn to_task_location(&self) -> TaskLocation {
        TaskLocation {
            name: self.name.clone(),
            address: self.address.clone(),
            lat: Some(self.lat),
            lng: Some(self.lng),
        }
    }
}

/// Geocoding and place search.
pub trait PlaceResolver: Send + Sync {
    /// Coordinates for a free-text location, if it can be found.
    ///
    /// # Errors
    ///
    /// Returns `AppError::External` or `AppError::Timeout` on service failure.
    fn geocode<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(f64, f64)>>> + Send + 'a>>;

    /// Best place for `query` near a point, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::External` or `AppError::Timeout` on service failure.
    fn search_top_recommendation<'a>(
        &'a self,
        query: &'a str,
        lat: f64,
        lng: f64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Place>>> + Send + 'a>>;
}

/// Pick the recommendation from search results.
///
/// The highest rated place with at least [`MIN_RATING`] and
/// [`MIN_RATINGS_TOTAL`] wins; if none qualifies, the highest rated place.
#[must_use]
pub fn pick_top(mut places: Vec<Place>) -> Option<Place> {
    places.sort_by(|a, b| {
        b.rating
            .unwrap_or(0.0)
            .total_cmp(&a.rating.unwrap_or(0.0))
    });
    let quality = places.iter().position(|p| {
        p.rating.unwrap_or(0.0) >= MIN_RATING && p.ratings_total.unwrap_or(0) >= MIN_RATINGS_TOTAL
    });
    match quality {
        Some(idx) => Some(places.swap_remove(idx)),
        None => places.into_iter().next(),
    }
}

/// `Name ⭐⭐⭐⭐ (4.5) - Address`.
#[must_use]
pub fn format_place(place: &Place) -> String {
    let mut out = place.name.clone();
    if let Some(rating) = place.rating {
        let stars = rating.clamp(0.0, 5.0).floor();
        // Clamped to 0..=5 above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let stars = "⭐".repeat(stars as usize);
        out.push_str(&format!(" {stars} ({rating})"));
    }
    if let Some(address) = place.address.as_deref().filter(|a| !a.is_empty()) {
        out.push_str(&format!(" - {address}"));
    }
    out
}
