//! Canonical item model shared by every service.

use crate::error::MatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// What a sync should do with an item on the target side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    #[default]
    Create,
    Update,
    Delete,
}

impl ItemAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemAction::Create => "create",
            ItemAction::Update => "update",
            ItemAction::Delete => "delete",
        }
    }
}

impl FromStr for ItemAction {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" | "add" => Ok(ItemAction::Create),
            "update" => Ok(ItemAction::Update),
            "delete" | "remove" => Ok(ItemAction::Delete),
            other => Err(MatchError::InvalidPayload {
                service: "unknown".to_string(),
                reason: format!("unknown item action '{other}'"),
            }),
        }
    }
}

/// Category of content a sync job moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Favorites,
    Playlists,
    RecentlyPlayed,
}

impl SyncType {
    pub const ALL: [SyncType; 3] = [
        SyncType::Favorites,
        SyncType::Playlists,
        SyncType::RecentlyPlayed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Favorites => "favorites",
            SyncType::Playlists => "playlists",
            SyncType::RecentlyPlayed => "recently_played",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "favorites" | "favourites" | "likes" => Ok(SyncType::Favorites),
            "playlists" => Ok(SyncType::Playlists),
            "recently_played" | "history" => Ok(SyncType::RecentlyPlayed),
            _ => Err(MatchError::UnknownSyncType(s.to_string())),
        }
    }
}

/// Services whose native payloads the transformer understands.
///
/// New services are added by extending this set and the match arms in
/// [`crate::transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownService {
    Spotify,
    AppleMusic,
    Deezer,
    YouTubeMusic,
    Tidal,
    LastFm,
}

impl KnownService {
    /// Canonical registry name
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownService::Spotify => "spotify",
            KnownService::AppleMusic => "apple_music",
            KnownService::Deezer => "deezer",
            KnownService::YouTubeMusic => "youtube_music",
            KnownService::Tidal => "tidal",
            KnownService::LastFm => "lastfm",
        }
    }

    /// Resolve a service name, returning `None` for services without a mapping
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "spotify" => Some(KnownService::Spotify),
            "apple_music" | "applemusic" | "apple-music" => Some(KnownService::AppleMusic),
            "deezer" => Some(KnownService::Deezer),
            "youtube_music" | "youtubemusic" | "youtube-music" | "ytmusic" => {
                Some(KnownService::YouTubeMusic)
            }
            "tidal" => Some(KnownService::Tidal),
            "lastfm" | "last.fm" | "last_fm" => Some(KnownService::LastFm),
            _ => None,
        }
    }
}

impl fmt::Display for KnownService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownService {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| MatchError::UnsupportedService(s.to_string()))
    }
}

/// Service-agnostic representation of a track.
///
/// `title` and `artist` are the primary matching keys. `external_ids` maps a
/// service name to that service's native id for the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversalItem {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Duration in milliseconds, `0` when unknown
    pub duration_ms: u64,
    pub isrc: Option<String>,
    pub external_ids: HashMap<String, String>,
    /// Opaque passthrough data
    pub metadata: HashMap<String, serde_json::Value>,
    pub added_at: DateTime<Utc>,
    pub action: ItemAction,
}

impl UniversalItem {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: String::new(),
            duration_ms: 0,
            isrc: None,
            external_ids: HashMap::new(),
            metadata: HashMap::new(),
            added_at: Utc::now(),
            action: ItemAction::Create,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_isrc(mut self, isrc: impl Into<String>) -> Self {
        self.isrc = Some(isrc.into());
        self
    }

    pub fn with_external_id(mut self, service: impl Into<String>, id: impl Into<String>) -> Self {
        self.external_ids.insert(service.into(), id.into());
        self
    }

    pub fn with_action(mut self, action: ItemAction) -> Self {
        self.action = action;
        self
    }

    /// The ISRC if present and non-blank
    pub fn exact_id(&self) -> Option<&str> {
        self.isrc
            .as_deref()
            .map(str::trim)
            .filter(|isrc| !isrc.is_empty())
    }

    /// Native id on `service`, if known
    pub fn external_id(&self, service: &str) -> Option<&str> {
        self.external_ids.get(service).map(String::as_str)
    }

    /// Identifier used when reporting failures for this item
    pub fn display_id(&self) -> String {
        if let Some(isrc) = self.exact_id() {
            return isrc.to_string();
        }
        let mut ids: Vec<_> = self.external_ids.iter().collect();
        ids.sort();
        match ids.first() {
            Some((service, id)) => format!("{service}:{id}"),
            None => format!("{} - {}", self.artist, self.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_service_aliases() {
        assert_eq!(KnownService::from_name("Spotify"), Some(KnownService::Spotify));
        assert_eq!(KnownService::from_name("applemusic"), Some(KnownService::AppleMusic));
        assert_eq!(KnownService::from_name("ytmusic"), Some(KnownService::YouTubeMusic));
        assert_eq!(KnownService::from_name("last.fm"), Some(KnownService::LastFm));
        assert_eq!(KnownService::from_name("napster"), None);
        assert!("napster".parse::<KnownService>().is_err());
    }

    #[test]
    fn test_sync_type_round_trip() {
        for sync_type in SyncType::ALL {
            assert_eq!(sync_type.as_str().parse::<SyncType>().unwrap(), sync_type);
        }
        assert_eq!("recently-played".parse::<SyncType>().unwrap(), SyncType::RecentlyPlayed);
        assert!(matches!(
            "podcasts".parse::<SyncType>(),
            Err(MatchError::UnknownSyncType(_))
        ));
    }

    #[test]
    fn test_sync_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&SyncType::RecentlyPlayed).unwrap();
        assert_eq!(json, "\"recently_played\"");
    }

    #[test]
    fn test_exact_id_ignores_blank_isrc() {
        let item = UniversalItem::new("a", "b").with_isrc("   ");
        assert_eq!(item.exact_id(), None);

        let item = UniversalItem::new("a", "b").with_isrc(" USUM71900001 ");
        assert_eq!(item.exact_id(), Some("USUM71900001"));
    }

    #[test]
    fn test_display_id_prefers_isrc() {
        let item = UniversalItem::new("Song", "Artist").with_external_id("spotify", "abc");
        assert_eq!(item.display_id(), "spotify:abc");

        let item = item.with_isrc("GBAYE0601498");
        assert_eq!(item.display_id(), "GBAYE0601498");
    }

    #[test]
    fn test_item_action_parse() {
        assert_eq!("ADD".parse::<ItemAction>().unwrap(), ItemAction::Create);
        assert_eq!("remove".parse::<ItemAction>().unwrap(), ItemAction::Delete);
        assert!("merge".parse::<ItemAction>().is_err());
    }
}
