use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use waypoint_common::error::{JourneyError, JourneyResult};
use waypoint_common::{City, CityId, CityUpsert, Journey, Status};
use waypoint_store::{Document, JourneyRepo};

const MAX_QUOTE_CHARS: usize = 500;

/// Owns the route: city ordering, the single current city, and the Status
/// snapshot derived from it.
///
/// Writes are serialized through one lock so two concurrent `set_current`
/// calls cannot both leave their target flagged. The store itself has no
/// cross-document transactions.
pub struct JourneyEngine {
    repo: JourneyRepo,
    write_lock: Mutex<()>,
}

impl JourneyEngine {
    pub fn new(repo: JourneyRepo) -> Self {
        Self {
            repo,
            write_lock: Mutex::new(()),
        }
    }

    pub fn repo(&self) -> &JourneyRepo {
        &self.repo
    }

    // --- Reads ---

    pub async fn list_cities(&self) -> JourneyResult<Vec<City>> {
        Ok(self.repo.list_cities().await?)
    }

    pub async fn get_city(&self, id: &CityId) -> JourneyResult<City> {
        self.repo
            .get_city(id)
            .await?
            .ok_or_else(|| JourneyError::NotFound { id: id.clone() })
    }

    /// Current city plus the path travelled so far. No side effects.
    pub async fn compute_journey(&self) -> JourneyResult<Journey> {
        let cities = self.repo.list_cities().await?;
        Ok(journey_from(cities))
    }

    pub async fn status(&self) -> JourneyResult<Status> {
        Ok(self.repo.get_status().await?.unwrap_or_default())
    }

    pub async fn is_sleeping(&self) -> JourneyResult<bool> {
        Ok(self.status().await?.is_sleep)
    }

    // --- Writes ---

    /// Make `id` the only current city and mirror it into Status.
    pub async fn set_current(&self, id: &CityId) -> JourneyResult<City> {
        let _guard = self.write_lock.lock().await;

        let cities = self.repo.list_cities().await?;
        let mut target = cities
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| JourneyError::NotFound { id: id.clone() })?;

        for other in cities.iter().filter(|c| c.is_current && &c.id != id) {
            self.repo
                .patch_city(&other.id, doc(json!({ "isCurrent": false })))
                .await?;
        }

        let now = Utc::now();
        target.is_current = true;
        target.became_current_at = Some(now);
        self.repo
            .patch_city(
                id,
                doc(json!({ "isCurrent": true, "becameCurrentAt": now })),
            )
            .await?;
        self.repo.update_status(status_fields(&target)).await?;

        info!(
            city_id = %target.id,
            city = target.name.as_str(),
            order = target.sequence_order,
            "Current city changed"
        );
        Ok(target)
    }

    /// Create or edit a city. Sequence order collisions are rejected.
    /// Current-city flags are preserved, never set, by this call.
    pub async fn upsert_city(&self, input: CityUpsert) -> JourneyResult<City> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(JourneyError::Validation("city name must not be empty".into()));
        }
        check_coordinates(input.latitude, input.longitude)?;

        let _guard = self.write_lock.lock().await;

        let cities = self.repo.list_cities().await?;
        let id = input.id.clone().unwrap_or_else(CityId::generate);
        check_order_free(&cities, &id, input.sequence_order)?;

        let existing = cities.iter().find(|c| c.id == id);
        let city = City {
            id: id.clone(),
            name: name.to_string(),
            region: input.region.trim().to_string(),
            latitude: input.latitude,
            longitude: input.longitude,
            sequence_order: input.sequence_order,
            is_current: existing.map(|c| c.is_current).unwrap_or(false),
            became_current_at: existing.and_then(|c| c.became_current_at),
            keywords: input.keywords,
        };
        self.repo.put_city(&city).await?;

        if city.is_current {
            self.repo.update_status(status_fields(&city)).await?;
        }

        debug!(city_id = %city.id, order = city.sequence_order, created = existing.is_none(), "City saved");
        Ok(city)
    }

    /// Move a city to a new position on the route.
    pub async fn reorder(&self, id: &CityId, sequence_order: u32) -> JourneyResult<City> {
        let _guard = self.write_lock.lock().await;

        let cities = self.repo.list_cities().await?;
        let mut city = cities
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| JourneyError::NotFound { id: id.clone() })?;
        check_order_free(&cities, id, sequence_order)?;

        city.sequence_order = sequence_order;
        self.repo
            .patch_city(id, doc(json!({ "sequenceOrder": sequence_order })))
            .await?;
        Ok(city)
    }

    /// Delete a city and its posts. Removing the current city clears the
    /// city fields in Status.
    pub async fn remove_city(&self, id: &CityId) -> JourneyResult<City> {
        let _guard = self.write_lock.lock().await;

        let city = self
            .repo
            .get_city(id)
            .await?
            .ok_or_else(|| JourneyError::NotFound { id: id.clone() })?;
        self.repo.delete_city(id).await?;

        if city.is_current {
            self.repo
                .update_status(doc(json!({
                    "cityId": Value::Null,
                    "city": Value::Null,
                    "region": Value::Null,
                })))
                .await?;
            warn!(city_id = %id, "Removed the current city; route has no current stop");
        }
        Ok(city)
    }

    pub async fn set_sleep(&self, is_sleep: bool) -> JourneyResult<Status> {
        let status = self
            .repo
            .update_status(doc(json!({ "isSleep": is_sleep })))
            .await?;
        info!(is_sleep, "Sleep flag updated");
        Ok(status)
    }

    pub async fn set_quote(&self, quote: &str) -> JourneyResult<Status> {
        let quote = quote.trim();
        let len = quote.chars().count();
        if len == 0 || len > MAX_QUOTE_CHARS {
            return Err(JourneyError::Validation(format!(
                "quote must be 1-{MAX_QUOTE_CHARS} characters, got {len}"
            )));
        }
        Ok(self
            .repo
            .update_status(doc(json!({ "quote": quote })))
            .await?)
    }
}

/// Build the journey view from any list of cities.
///
/// Cities without usable coordinates are left out. The current city is the
/// flagged one. With none flagged (mid-seeding) the last stop on the route
/// stands in; with several flagged the one furthest along wins and a
/// warning is logged.
pub fn journey_from(mut cities: Vec<City>) -> Journey {
    cities.retain(|c| {
        let keep = has_coords(c);
        if !keep {
            warn!(city_id = %c.id, "City has no usable coordinates, leaving it off the journey");
        }
        keep
    });
    cities.sort_by(|a, b| {
        a.sequence_order
            .cmp(&b.sequence_order)
            .then_with(|| a.id.cmp(&b.id))
    });

    let flagged: Vec<&City> = cities.iter().filter(|c| c.is_current).collect();
    let current = match flagged.len() {
        0 => {
            let last = cities.last().cloned();
            if let Some(city) = &last {
                debug!(city_id = %city.id, "No current city flagged, using last stop");
            }
            last
        }
        1 => Some(flagged[0].clone()),
        n => {
            let pick = flagged
                .iter()
                .max_by_key(|c| c.sequence_order)
                .map(|c| (*c).clone());
            warn!(
                flagged = n,
                picked = pick.as_ref().map(|c| c.id.as_str()).unwrap_or_default(),
                "Multiple current cities flagged, using the furthest along"
            );
            pick
        }
    };

    let path = match &current {
        Some(current) => cities
            .iter()
            .filter(|c| c.sequence_order < current.sequence_order)
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    Journey {
        current_city: current,
        path,
    }
}

fn check_order_free(cities: &[City], id: &CityId, order: u32) -> JourneyResult<()> {
    match cities
        .iter()
        .find(|c| c.sequence_order == order && &c.id != id)
    {
        Some(other) => Err(JourneyError::SequenceConflict {
            order,
            existing: other.id.clone(),
        }),
        None => Ok(()),
    }
}

fn has_coords(city: &City) -> bool {
    (-90.0..=90.0).contains(&city.latitude) && (-180.0..=180.0).contains(&city.longitude)
}

fn check_coordinates(latitude: f64, longitude: f64) -> JourneyResult<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(JourneyError::Validation(format!(
            "latitude must be within -90..=90, got {latitude}"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(JourneyError::Validation(format!(
            "longitude must be within -180..=180, got {longitude}"
        )));
    }
    Ok(())
}

fn status_fields(city: &City) -> Document {
    doc(json!({
        "cityId": city.id,
        "city": city.name,
        "region": city.region,
        "latitude": city.latitude,
        "longitude": city.longitude,
    }))
}

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
