//! Full pipeline: registry -> tick task -> broadcaster -> subscriber decode.

#[allow(dead_code)]
mod common;

use skyraid_core::ai::EnemyPattern;
use skyraid_core::events::GameEventType;
use skyraid_core::room::{JoinMode, RoomState};
use skyraid_core::snapshot::EntityViewKind;
use skyraid_core::test_helpers::frame;
use skyraid_core::wave::{ScriptedEnemy, WaveScript};

use common::{P1_SPAWN_X, SPAWN_Y, TestServer, close, fast_config, player};

#[tokio::test]
async fn two_players_join_move_and_overspeed_is_rejected() {
    let mut server = TestServer::new();
    let mut client = server.client("e2e");
    let registry = server.registry.clone();

    let info = registry
        .create_or_join(Some("e2e".into()), "p1", JoinMode::CreateOrJoin)
        .await
        .unwrap();
    assert_eq!(info.state, RoomState::Waiting);
    assert_eq!(info.members, vec!["p1"]);

    let info = registry
        .create_or_join(Some("e2e".into()), "p2", JoinMode::JoinOnly)
        .await
        .unwrap();
    assert_eq!(info.state, RoomState::Active);
    assert_eq!(info.members, vec!["p1", "p2"]);

    let snap = client.wait_for(|s| s.tick > info.tick).await;
    assert_eq!(snap.state, RoomState::Active);
    assert!(player(&snap, "p1").is_some() && player(&snap, "p2").is_some());
    let p1 = player(&snap, "p1").unwrap();
    assert!(close(p1.x, P1_SPAWN_X) && close(p1.y, SPAWN_Y));

    // In-bounds move well under max speed.
    registry
        .submit_input("e2e", "p1", frame(280.0, SPAWN_Y, false, 100, 1))
        .await
        .unwrap();
    let moved = client
        .wait_for(|s| player(s, "p1").is_some_and(|p| close(p.x, 280.0)))
        .await;

    // 500 units in 50 ms.
    registry
        .submit_input("e2e", "p1", frame(780.0, SPAWN_Y, false, 150, 2))
        .await
        .unwrap();
    let later = client.wait_for(|s| s.tick >= moved.tick + 5).await;
    let p1 = player(&later, "p1").unwrap();
    assert!(close(p1.x, 280.0), "rejected input moved the player to {}", p1.x);

    let joined = server.next_event(GameEventType::PlayerJoined).await;
    assert_eq!(joined.payload["playerId"], "p1");
    assert_eq!(joined.room_id, "e2e");
    let joined = server.next_event(GameEventType::PlayerJoined).await;
    assert_eq!(joined.payload["playerId"], "p2");
    assert_eq!(joined.payload["members"], 2);

    registry.destroy("e2e").await;
}

#[tokio::test]
async fn accepted_shot_spawns_a_player_bullet() {
    let server = TestServer::new();
    let mut client = server.client("shots");
    let registry = server.registry.clone();
    registry
        .create_or_join(Some("shots".into()), "p1", JoinMode::CreateOrJoin)
        .await
        .unwrap();
    registry
        .create_or_join(Some("shots".into()), "p2", JoinMode::CreateOrJoin)
        .await
        .unwrap();

    registry
        .submit_input("shots", "p1", frame(P1_SPAWN_X, SPAWN_Y, true, 100, 1))
        .await
        .unwrap();
    let snap = client
        .wait_for(|s| {
            s.entities
                .iter()
                .any(|e| e.kind == EntityViewKind::Bullet && e.subtype == "player")
        })
        .await;
    let bullet = snap
        .entities
        .iter()
        .find(|e| e.kind == EntityViewKind::Bullet && e.subtype == "player")
        .unwrap();
    assert!(bullet.vy < 0.0, "player bullets travel up");

    registry.destroy("shots").await;
}

#[tokio::test]
async fn leaving_player_disappears_from_snapshots() {
    let mut server = TestServer::new();
    let mut client = server.client("bye");
    let registry = server.registry.clone();
    registry
        .create_or_join(Some("bye".into()), "p1", JoinMode::CreateOrJoin)
        .await
        .unwrap();
    registry
        .create_or_join(Some("bye".into()), "p2", JoinMode::CreateOrJoin)
        .await
        .unwrap();

    registry.leave("bye", "p2").await.unwrap();
    let snap = client.wait_for(|s| player(s, "p2").is_none()).await;
    assert!(player(&snap, "p1").is_some());

    let left = server.next_event(GameEventType::PlayerLeft).await;
    assert_eq!(left.payload["playerId"], "p2");
    assert_eq!(left.payload["members"], 1);

    let info = registry.room_info("bye").await.unwrap();
    assert_eq!(info.members, vec!["p1"]);

    registry.destroy("bye").await;
}

#[tokio::test]
async fn clearing_the_final_wave_ends_in_victory() {
    let mut config = fast_config();
    config.sim.room.min_players = 1;
    config.sim.waves.max_waves = Some(1);
    // An enemy the AI cannot evaluate is removed, which clears the wave at once.
    config.sim.waves.scripted = vec![WaveScript {
        enemies: vec![ScriptedEnemy {
            x: 400.0,
            y: 100.0,
            pattern: EnemyPattern::Unknown,
            health: None,
            fire_interval_ticks: None,
        }],
    }];
    let mut server = TestServer::from_config(config);
    let mut client = server.client("win");

    let info = server
        .registry
        .create_or_join(Some("win".into()), "solo", JoinMode::CreateOrJoin)
        .await
        .unwrap();
    assert_eq!(info.state, RoomState::Ended);

    let cleared = server.next_event(GameEventType::WaveCleared).await;
    assert_eq!(cleared.payload["wave"], 1);
    let ended = server.next_event(GameEventType::GameEnded).await;
    assert_eq!(ended.payload["outcome"], "victory");
    assert_eq!(ended.tick, cleared.tick);

    let last = client.wait_for(|s| s.state == RoomState::Ended).await;
    assert_eq!(last.wave, 1);

    let err = server
        .registry
        .submit_input("win", "solo", frame(400.0, 560.0, false, 10, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, skyraid_server::error::RegistryError::RoomNotFound(_)));
}
