//! End-to-end discovery against mocked TMDB and Discord endpoints.
//!
//! Each test gets its own in-memory database and mock server, and drives the
//! real HTTP clients so request shapes are exercised along with the policy.

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use episodic::catalog::SeriesCatalog;
use episodic::discovery::{DiscoveryError, DiscoverySettings, EpisodeDiscovery};
use episodic::metadata::TmdbClient;
use episodic::notify::DiscordNotifier;
use episodic::storage::{Database, Series, Store, Subscription};

const CHANNEL: i64 = 987_654_321_012_345_678;

// 2024-05-01T00:00:00Z
const DAY0: i64 = 1_714_521_600;

fn at(day: i64, hour: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(DAY0 + day * 86_400 + hour * 3600, 0).unwrap()
}

async fn engine(server: &MockServer, db: &Database) -> EpisodeDiscovery {
    let http = reqwest::Client::new();
    let tmdb = Arc::new(
        TmdbClient::new(
            http.clone(),
            &format!("{}/3", server.uri()),
            SecretString::from("tmdb-token".to_string()),
            "en-US",
            0,
        )
        .unwrap(),
    );
    let discord = DiscordNotifier::new(
        http,
        &format!("{}/api/v10", server.uri()),
        SecretString::from("discord-token".to_string()),
    )
    .unwrap();
    let catalog = Arc::new(SeriesCatalog::new(
        tmdb.clone(),
        NonZeroUsize::new(32).unwrap(),
        Duration::from_secs(600),
    ));

    EpisodeDiscovery::new(
        Arc::new(db.clone()),
        tmdb,
        Arc::new(discord),
        catalog,
        DiscoverySettings::new(CHANNEL),
    )
}

async fn track(db: &Database, series_id: i64, name: &str, users: &[i64]) {
    db.upsert_series(&Series::new(series_id, name, None))
        .await
        .unwrap();
    for user in users {
        db.add_subscription(&Subscription {
            series_id,
            user_id: *user,
            created_at: DAY0,
        })
        .await
        .unwrap();
    }
}

async fn mount_series(server: &MockServer, id: i64, name: &str, status: &str, season: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/3/tv/{id}")))
        .and(header("Authorization", "Bearer tmdb-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "name": name,
            "status": status,
            "number_of_seasons": season,
            "poster_path": "/poster.jpg",
            "homepage": "https://example.com/show",
            "networks": [{"id": 1, "name": "HBO", "logo_path": "/hbo.png"}]
        })))
        .mount(server)
        .await;
}

async fn mount_season(server: &MockServer, id: i64, season: i64, episodes: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/3/tv/{id}/season/{season}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id * 100 + season,
            "season_number": season,
            "episodes": episodes
        })))
        .mount(server)
        .await;
}

async fn mount_discord(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/api/v10/channels/{CHANNEL}/messages")))
        .and(header("Authorization", "Bot discord-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1111222233334444"})))
        .mount(server)
        .await;
}

/// Bodies of every Discord message posted so far.
async fn posted_messages(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn complete_episode(number: i64, air_date: &str) -> Value {
    json!({
        "episode_number": number,
        "season_number": 1,
        "name": format!("Chapter {number}"),
        "air_date": air_date,
        "overview": "Something happens.",
        "still_path": "/still.jpg",
        "runtime": 58
    })
}

#[tokio::test]
async fn test_new_episode_is_announced_once() {
    let server = MockServer::start().await;
    let db = Database::open(":memory:").await.unwrap();
    track(&db, 100, "The Show", &[11, 22]).await;
    mount_series(&server, 100, "The Show", "Returning Series", 1).await;
    mount_season(
        &server,
        100,
        1,
        json!([
            complete_episode(1, "2024-04-20"),
            complete_episode(2, "2024-05-02"),
            complete_episode(3, "2024-05-09"),
            {"episode_number": 4, "air_date": null}
        ]),
    )
    .await;
    mount_discord(&server).await;

    let engine = engine(&server, &db).await;
    let token = CancellationToken::new();

    let report = engine.find_new_episodes_at(&token, at(1, 12)).await.unwrap();
    assert_eq!(report.episodes_announced, 1);
    assert_eq!(report.messages_sent, 1);

    let messages = posted_messages(&server).await;
    assert_eq!(messages.len(), 1);
    let body = &messages[0];
    assert_eq!(body["content"], "<@11> <@22>");
    assert_eq!(body["allowed_mentions"]["users"], json!(["11", "22"]));
    assert_eq!(body["embeds"][0]["title"], "Chapter 2");
    assert_eq!(body["embeds"][0]["author"]["name"], "The Show");
    assert_eq!(body["embeds"][0]["footer"]["text"], "HBO");

    let rows = db.notifications_for_series(100).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].season, rows[0].episode), (1, 2));
    assert_eq!(rows[0].message_id, Some(1_111_222_233_334_444));

    // A second pass finds nothing new
    let report = engine.find_new_episodes_at(&token, at(1, 22)).await.unwrap();
    assert_eq!(report.episodes_announced, 0);
    assert_eq!(posted_messages(&server).await.len(), 1);
    assert_eq!(db.notifications_for_series(100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ten_embeds_per_message() {
    let server = MockServer::start().await;
    let db = Database::open(":memory:").await.unwrap();
    track(&db, 7, "Anthology", &[1]).await;
    mount_series(&server, 7, "Anthology", "Returning Series", 1).await;
    let episodes: Vec<Value> = (1..=12)
        .map(|n| complete_episode(n, "2024-05-01"))
        .collect();
    mount_season(&server, 7, 1, Value::Array(episodes)).await;
    mount_discord(&server).await;

    let engine = engine(&server, &db).await;
    let report = engine
        .find_new_episodes_at(&CancellationToken::new(), at(2, 9))
        .await
        .unwrap();

    assert_eq!(report.episodes_announced, 12);
    assert_eq!(report.messages_sent, 2);
    let sizes: Vec<usize> = posted_messages(&server)
        .await
        .iter()
        .map(|m| m["embeds"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![10, 2]);
}

#[tokio::test]
async fn test_finished_series_are_announced_and_unsubscribed() {
    let server = MockServer::start().await;
    let db = Database::open(":memory:").await.unwrap();
    track(&db, 1, "Over Now", &[5, 6]).await;
    track(&db, 2, "Cut Short", &[6, 7]).await;
    track(&db, 3, "Still Going", &[8]).await;
    mount_series(&server, 1, "Over Now", "Ended", 2).await;
    mount_series(&server, 2, "Cut Short", "Canceled", 1).await;
    mount_series(&server, 3, "Still Going", "Returning Series", 4).await;
    mount_season(&server, 1, 2, json!([])).await;
    mount_season(&server, 2, 1, json!([])).await;
    mount_season(&server, 3, 4, json!([])).await;
    mount_discord(&server).await;

    let engine = engine(&server, &db).await;
    let report = engine
        .find_new_episodes_at(&CancellationToken::new(), at(3, 12))
        .await
        .unwrap();
    assert_eq!(report.finished_series, 2);
    assert_eq!(report.messages_sent, 1);

    let messages = posted_messages(&server).await;
    assert_eq!(messages.len(), 1);
    let body = &messages[0];
    assert_eq!(body["allowed_mentions"]["users"], json!(["5", "6", "7"]));
    assert_eq!(
        body["embeds"][0]["fields"],
        json!([
            {"name": "Cancelled", "value": "Cut Short", "inline": false},
            {"name": "Ended", "value": "Over Now", "inline": false}
        ])
    );

    // Subscriptions gone, series rows kept
    assert!(db.subscribers(&[1, 2]).await.unwrap().is_empty());
    assert_eq!(db.subscribers(&[3]).await.unwrap(), vec![8]);
    assert!(db.get_series(1).await.unwrap().is_some());
    assert!(db.get_series(2).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tmdb_failure_aborts_pass() {
    let server = MockServer::start().await;
    let db = Database::open(":memory:").await.unwrap();
    track(&db, 1, "Broken", &[5]).await;
    Mock::given(method("GET"))
        .and(path("/3/tv/1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = engine(&server, &db).await;
    let result = engine
        .find_new_episodes_at(&CancellationToken::new(), at(1, 12))
        .await;
    assert!(matches!(result, Err(DiscoveryError::Metadata(_))));
    assert!(posted_messages(&server).await.is_empty());
}

#[tokio::test]
async fn test_discord_rejection_leaves_episode_pending() {
    let server = MockServer::start().await;
    let db = Database::open(":memory:").await.unwrap();
    track(&db, 1, "Show", &[5]).await;
    mount_series(&server, 1, "Show", "Returning Series", 1).await;
    mount_season(&server, 1, 1, json!([complete_episode(1, "2024-05-01")])).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Missing Permissions"))
        .mount(&server)
        .await;

    let engine = engine(&server, &db).await;
    let result = engine
        .find_new_episodes_at(&CancellationToken::new(), at(1, 12))
        .await;
    assert!(matches!(result, Err(DiscoveryError::Notify(_))));
    assert!(db.notifications_for_series(1).await.unwrap().is_empty());
}
