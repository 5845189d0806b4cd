//! Converts the same recordings from different services and checks that the
//! matcher recognises them as one item.

use core_matching::{find_best_match, score, to_universal, UniversalItem};
use serde_json::{json, Value};

fn spotify_fixture() -> Value {
    json!({
        "added_at": "2024-01-15T10:00:00Z",
        "track": {
            "id": "0VjIjW4GlUZAMYd2vXMi3b",
            "name": "Blinding Lights",
            "duration_ms": 200040,
            "artists": [{ "name": "The Weeknd" }],
            "album": { "name": "After Hours" }
        }
    })
}

fn deezer_fixture() -> Value {
    json!({
        "id": 908604612,
        "title": "Blinding Lights",
        "duration": 201,
        "artist": { "name": "The Weeknd" },
        "album": { "title": "After Hours" },
        "time_add": 1705312800
    })
}

fn apple_music_fixture() -> Value {
    json!({
        "id": "1499378615",
        "attributes": {
            "name": "Blinding Lights",
            "artistName": "The Weeknd",
            "albumName": "After Hours",
            "durationInMillis": 201573
        }
    })
}

fn youtube_music_fixture() -> Value {
    json!({
        "videoId": "J7p4bzqLvCw",
        "title": "Blinding Lights (Official Audio)",
        "artists": [{ "name": "The Weeknd" }],
        "album": { "name": "After Hours" },
        "duration_seconds": 202
    })
}

#[test]
fn test_same_track_across_services_scores_high() {
    let spotify = to_universal("spotify", &spotify_fixture()).unwrap();
    let others = [
        to_universal("deezer", &deezer_fixture()).unwrap(),
        to_universal("apple_music", &apple_music_fixture()).unwrap(),
        to_universal("youtube_music", &youtube_music_fixture()).unwrap(),
    ];

    for other in &others {
        let confidence = score(&spotify, other);
        assert!(
            confidence >= 0.8,
            "expected >= 0.8 against {:?}, got {confidence}",
            other.external_ids
        );
        assert_eq!(confidence, score(other, &spotify));
    }
}

#[test]
fn test_shared_isrc_wins_over_differing_metadata() {
    let mut spotify = spotify_fixture();
    spotify["track"]["external_ids"] = json!({ "isrc": "USUG11904206" });
    spotify["track"]["name"] = json!("Blinding Lights - 2020 Edit");

    let mut deezer = deezer_fixture();
    deezer["isrc"] = json!("USUG11904206");
    deezer["album"]["title"] = json!("Blinding Lights (Single)");

    let a = to_universal("spotify", &spotify).unwrap();
    let b = to_universal("deezer", &deezer).unwrap();
    assert_eq!(score(&a, &b), 1.0);

    deezer["isrc"] = json!("USUG11904999");
    let c = to_universal("deezer", &deezer).unwrap();
    assert_eq!(score(&a, &c), 0.0);
}

#[test]
fn test_best_match_picks_right_candidate_from_catalogue() {
    let source = to_universal("spotify", &spotify_fixture()).unwrap();

    let catalogue: Vec<UniversalItem> = vec![
        json!({
            "id": 1, "title": "Save Your Tears", "duration": 215,
            "artist": { "name": "The Weeknd" }, "album": { "title": "After Hours" }
        }),
        json!({
            "id": 2, "title": "Blinding Lights", "duration": 200,
            "artist": { "name": "The Weeknd" }, "album": { "title": "After Hours" }
        }),
        json!({
            "id": 3, "title": "Blinding Lights", "duration": 262,
            "artist": { "name": "Some Cover Band" }, "album": { "title": "Covers Vol. 2" }
        }),
    ]
    .iter()
    .map(|raw| to_universal("deezer", raw).unwrap())
    .collect();

    let (best, confidence) = find_best_match(&source, &catalogue, 0.8).unwrap();
    assert_eq!(best.external_id("deezer"), Some("2"));
    assert!(confidence >= 0.8);
}
