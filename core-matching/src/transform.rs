//! Service-native payload to [`UniversalItem`] conversion.
//!
//! Dispatch is a match over [`KnownService`]; unknown names fail with
//! [`MatchError::UnsupportedService`]. Each arm reads the service's JSON shape
//! and normalises durations to milliseconds.

use crate::error::{MatchError, Result};
use crate::model::{KnownService, SyncType, UniversalItem};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

/// Convert a native record from `service` into a universal item.
///
/// The native id is always stored under `external_ids[service]`, and an
/// ISRC is copied when the payload carries one.
///
/// # Errors
///
/// - [`MatchError::UnsupportedService`] if `service` has no mapping
/// - [`MatchError::InvalidPayload`] if `raw` is not a JSON object
/// - [`MatchError::MissingField`] if the id, title or artist is absent
///
/// # Examples
///
/// ```
/// use core_matching::to_universal;
/// use serde_json::json;
///
/// let raw = json!({
///     "id": 3135556,
///     "title": "Harder, Better, Faster, Stronger",
///     "duration": 224,
///     "artist": { "name": "Daft Punk" },
///     "album": { "title": "Discovery" }
/// });
///
/// let item = to_universal("deezer", &raw).unwrap();
/// assert_eq!(item.duration_ms, 224_000);
/// assert_eq!(item.external_id("deezer"), Some("3135556"));
/// ```
pub fn to_universal(service: &str, raw: &Value) -> Result<UniversalItem> {
    let known = KnownService::from_name(service)
        .ok_or_else(|| MatchError::UnsupportedService(service.to_string()))?;

    if !raw.is_object() {
        return Err(MatchError::InvalidPayload {
            service: service.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }

    let payload = Payload { service, raw };

    let item = match known {
        KnownService::Spotify => from_spotify(&payload)?,
        KnownService::AppleMusic => from_apple_music(&payload)?,
        KnownService::Deezer => from_deezer(&payload)?,
        KnownService::YouTubeMusic => from_youtube_music(&payload)?,
        KnownService::Tidal => from_tidal(&payload)?,
        KnownService::LastFm => from_lastfm(&payload)?,
    };

    trace!(
        service = %known,
        title = %item.title,
        has_isrc = item.isrc.is_some(),
        "Converted native item"
    );

    Ok(item)
}

/// Whether a native item-type tag from `service` belongs to `sync_type`.
///
/// Known services map their own tags (Spotify `saved_track`, Last.fm
/// `scrobble`, ...). The canonical tag (`sync_type.as_str()`) is accepted for
/// every service that supports the category.
pub fn matches_sync_type(service: &str, item_type: &str, sync_type: SyncType) -> bool {
    let item_type = item_type.trim().to_ascii_lowercase();

    match KnownService::from_name(service) {
        Some(known) => {
            let tags = native_tags(known, sync_type);
            if tags.is_empty() {
                return false;
            }
            item_type == sync_type.as_str() || tags.contains(&item_type.as_str())
        }
        None => item_type == sync_type.as_str(),
    }
}

/// Whether `service` offers the `sync_type` category at all.
///
/// Services without a mapping are assumed to support every category.
pub fn supports_sync_type(service: &str, sync_type: SyncType) -> bool {
    match KnownService::from_name(service) {
        Some(known) => !native_tags(known, sync_type).is_empty(),
        None => true,
    }
}

fn native_tags(service: KnownService, sync_type: SyncType) -> &'static [&'static str] {
    use KnownService::*;
    use SyncType::*;

    match (service, sync_type) {
        (Spotify, Favorites) => &["saved_track"],
        (Spotify, Playlists) => &["playlist_track"],
        (Spotify, RecentlyPlayed) => &["recently_played"],
        (AppleMusic, Favorites) => &["library-songs"],
        (AppleMusic, Playlists) => &["library-playlist-tracks", "playlist-tracks"],
        (AppleMusic, RecentlyPlayed) => &["recent-played-tracks"],
        (Deezer, Favorites) => &["favorite_track"],
        (Deezer, Playlists) => &["playlist_track"],
        (Deezer, RecentlyPlayed) => &["history"],
        (YouTubeMusic, Favorites) => &["liked_song"],
        (YouTubeMusic, Playlists) => &["playlist_item"],
        (YouTubeMusic, RecentlyPlayed) => &["history"],
        (Tidal, Favorites) => &["favorite_track"],
        (Tidal, Playlists) => &["playlist_track"],
        (Tidal, RecentlyPlayed) => &[],
        (LastFm, Favorites) => &["loved_track"],
        (LastFm, Playlists) => &[],
        (LastFm, RecentlyPlayed) => &["scrobble", "recent_track"],
    }
}

// ============================================================================
// Per-service mappings
// ============================================================================

fn from_spotify(payload: &Payload<'_>) -> Result<UniversalItem> {
    // Saved and recently-played tracks arrive wrapped in an envelope
    let track = payload.envelope("track");
    let added_at = payload
        .timestamp("/added_at")
        .or_else(|| payload.timestamp("/played_at"));

    let mut item = UniversalItem::new(
        track.required("/name", "name")?,
        track.required("/artists/0/name", "artists[0].name")?,
    );
    item.album = track.text("/album/name").unwrap_or_default();
    item.duration_ms = track.number("/duration_ms").unwrap_or(0);
    item.isrc = track.text("/external_ids/isrc");

    let artists: Vec<Value> = track
        .raw
        .pointer("/artists")
        .and_then(Value::as_array)
        .map(|artists| {
            artists
                .iter()
                .filter_map(|a| a.get("name").cloned())
                .collect()
        })
        .unwrap_or_default();
    if artists.len() > 1 {
        item.metadata.insert("artists".to_string(), Value::Array(artists));
    }
    if let Some(explicit) = track.raw.get("explicit").and_then(Value::as_bool) {
        item.metadata.insert("explicit".to_string(), Value::Bool(explicit));
    }

    finish(item, &track, track.required_id("/id", "id")?, added_at)
}

fn from_apple_music(payload: &Payload<'_>) -> Result<UniversalItem> {
    let mut item = UniversalItem::new(
        payload.required("/attributes/name", "attributes.name")?,
        payload.required("/attributes/artistName", "attributes.artistName")?,
    );
    item.album = payload.text("/attributes/albumName").unwrap_or_default();
    item.duration_ms = payload.number("/attributes/durationInMillis").unwrap_or(0);
    item.isrc = payload.text("/attributes/isrc");

    if let Some(rating) = payload.text("/attributes/contentRating") {
        item.metadata
            .insert("explicit".to_string(), Value::Bool(rating == "explicit"));
    }

    let added_at = payload.timestamp("/attributes/dateAdded");
    finish(item, payload, payload.required_id("/id", "id")?, added_at)
}

fn from_deezer(payload: &Payload<'_>) -> Result<UniversalItem> {
    let mut item = UniversalItem::new(
        payload.required("/title", "title")?,
        payload.required("/artist/name", "artist.name")?,
    );
    item.album = payload.text("/album/title").unwrap_or_default();
    item.duration_ms = payload.seconds_to_millis(payload.number("/duration"))?;
    item.isrc = payload.text("/isrc");

    if let Some(explicit) = payload.raw.get("explicit_lyrics").and_then(Value::as_bool) {
        item.metadata.insert("explicit".to_string(), Value::Bool(explicit));
    }

    let added_at = payload.unix_timestamp("/time_add");
    finish(item, payload, payload.required_id("/id", "id")?, added_at)
}

fn from_youtube_music(payload: &Payload<'_>) -> Result<UniversalItem> {
    let mut item = UniversalItem::new(
        payload.required("/title", "title")?,
        payload.required("/artists/0/name", "artists[0].name")?,
    );
    item.album = payload.text("/album/name").unwrap_or_default();
    let seconds = match payload.number("/duration_seconds") {
        Some(seconds) => Some(seconds),
        None => payload.clock_seconds("/duration")?,
    };
    item.duration_ms = payload.seconds_to_millis(seconds)?;

    if let Some(explicit) = payload.raw.get("isExplicit").and_then(Value::as_bool) {
        item.metadata.insert("explicit".to_string(), Value::Bool(explicit));
    }

    finish(item, payload, payload.required_id("/videoId", "videoId")?, None)
}

fn from_tidal(payload: &Payload<'_>) -> Result<UniversalItem> {
    // Favorites come back as {"created": ..., "item": {...}}
    let track = payload.envelope("item");
    let added_at = payload.timestamp("/created");

    let artist = match track.text("/artists/0/name") {
        Some(name) => name,
        None => track.required("/artist/name", "artist.name")?,
    };

    let mut item = UniversalItem::new(track.required("/title", "title")?, artist);
    item.album = track.text("/album/title").unwrap_or_default();
    item.duration_ms = track.seconds_to_millis(track.number("/duration"))?;
    item.isrc = track.text("/isrc");

    finish(item, &track, track.required_id("/id", "id")?, added_at)
}

fn from_lastfm(payload: &Payload<'_>) -> Result<UniversalItem> {
    let artist = match payload.text("/artist/#text") {
        Some(name) => name,
        None => payload.required("/artist/name", "artist.name")?,
    };

    let mut item = UniversalItem::new(payload.required("/name", "name")?, artist);
    item.album = payload.text("/album/#text").unwrap_or_default();
    item.duration_ms = payload.seconds_to_millis(payload.number("/duration"))?;

    if let Some(url) = payload.text("/url") {
        item.metadata.insert("url".to_string(), Value::String(url));
    }

    // mbid is frequently blank on Last.fm; the track url is stable too
    let id = match payload.text("/mbid") {
        Some(mbid) => mbid,
        None => payload.required("/url", "mbid")?,
    };

    let added_at = payload.unix_timestamp("/date/uts");
    finish(item, payload, id, added_at)
}

fn finish(
    mut item: UniversalItem,
    payload: &Payload<'_>,
    native_id: String,
    added_at: Option<DateTime<Utc>>,
) -> Result<UniversalItem> {
    item.external_ids
        .insert(payload.service.trim().to_string(), native_id);
    item.metadata.insert(
        "source_service".to_string(),
        Value::String(payload.service.trim().to_string()),
    );
    if let Some(added_at) = added_at {
        item.added_at = added_at;
    }
    Ok(item)
}

// ============================================================================
// JSON access helpers
// ============================================================================

struct Payload<'a> {
    service: &'a str,
    raw: &'a Value,
}

impl<'a> Payload<'a> {
    /// The nested object under `key`, or the payload itself when absent
    fn envelope(&self, key: &str) -> Payload<'a> {
        match self.raw.get(key) {
            Some(inner) if inner.is_object() => Payload {
                service: self.service,
                raw: inner,
            },
            _ => Payload {
                service: self.service,
                raw: self.raw,
            },
        }
    }

    fn text(&self, pointer: &str) -> Option<String> {
        self.raw
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn number(&self, pointer: &str) -> Option<u64> {
        match self.raw.pointer(pointer)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// RFC 3339, or the `+0000` offset form Tidal uses
    fn timestamp(&self, pointer: &str) -> Option<DateTime<Utc>> {
        let text = self.text(pointer)?;
        DateTime::parse_from_rfc3339(&text)
            .or_else(|_| DateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Parse an `m:ss` or `h:mm:ss` string into seconds
    ///
    /// Unparseable text is an unknown duration; a value too large for `u64`
    /// is an invalid payload.
    fn clock_seconds(&self, pointer: &str) -> Result<Option<u64>> {
        let Some(text) = self.text(pointer) else {
            return Ok(None);
        };

        let mut total: u64 = 0;
        for part in text.split(':') {
            let Ok(n) = part.trim().parse::<u64>() else {
                return Ok(None);
            };
            total = total
                .checked_mul(60)
                .and_then(|t| t.checked_add(n))
                .ok_or_else(|| self.invalid(format!("duration '{text}' is out of range")))?;
        }
        Ok(Some(total))
    }

    /// Seconds to milliseconds, 0 when unknown
    fn seconds_to_millis(&self, seconds: Option<u64>) -> Result<u64> {
        match seconds {
            None => Ok(0),
            Some(seconds) => seconds
                .checked_mul(1000)
                .ok_or_else(|| self.invalid(format!("duration {seconds}s is out of range"))),
        }
    }

    fn unix_timestamp(&self, pointer: &str) -> Option<DateTime<Utc>> {
        let secs = self.number(pointer)?;
        DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
    }

    fn required(&self, pointer: &str, field: &str) -> Result<String> {
        self.text(pointer).ok_or_else(|| self.missing(field))
    }

    /// Ids are strings on most services and integers on Deezer and Tidal
    fn required_id(&self, pointer: &str, field: &str) -> Result<String> {
        match self.raw.pointer(pointer) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(self.missing(field)),
        }
    }

    fn invalid(&self, reason: String) -> MatchError {
        MatchError::InvalidPayload {
            service: self.service.to_string(),
            reason,
        }
    }

    fn missing(&self, field: &str) -> MatchError {
        MatchError::MissingField {
            service: self.service.to_string(),
            field: field.to_string(),
        }
    }
}
