//! End-to-end tests driving a scripted fake engine over real pipes.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use uci_driver::{engines_from_config, Engine, EngineConfig, OptionConfig, UciError};

const FAKE_ENGINE: &str = r#"#!/bin/sh
while read line; do
  case "$line" in
    uci)
      echo "id name FakeFish 1.0"
      echo "id author Nobody"
      echo "option name Hash type spin default 16 min 1 max 1024"
      echo "option name Style type combo default Normal var Solid var Normal var Risky"
      echo "uciok"
      ;;
    isready)
      echo "readyok"
      ;;
    go*)
      echo "info depth 1 seldepth 2 score cp -42 nodes 1000 nps 500 pv e2e4 e7e5"
      echo "bestmove g1f3 ponder d7d5"
      ;;
    quit)
      exit 0
      ;;
    *)
      ;;
  esac
done
"#;

fn fake_engine_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "uci-driver-fake-{}-{tag}.sh",
        std::process::id()
    ));
    let mut file = std::fs::File::create(&path).expect("create fake engine script");
    file.write_all(FAKE_ENGINE.as_bytes())
        .expect("write fake engine script");

    let mut perms = file.metadata().expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

#[tokio::test]
async fn full_session_lifecycle() {
    let script = fake_engine_path("lifecycle");
    let config = EngineConfig {
        info_buf_cap: 8,
        ..EngineConfig::new(script.to_string_lossy().into_owned())
    };
    let engine = Engine::spawn(config).await.expect("spawn");

    engine.uci().await.expect("uci handshake");
    assert_eq!(engine.name(), "FakeFish 1.0");
    assert_eq!(engine.author(), "Nobody");
    assert_eq!(engine.display_name(), "FakeFish 1.0");

    let options = engine.default_options();
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].name, "Hash");
    assert_eq!(options[0].kind, "spin");
    assert_eq!(options[1].name, "Style");
    assert_eq!(options[1].var, ["Solid", "Normal", "Risky"]);

    engine.send_option("Hash", "128").await.expect("setoption");
    engine
        .wait_ready_ok(Duration::from_secs(5))
        .await
        .expect("readyok");

    engine
        .send_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
        .await
        .expect("position");
    engine.send_command("go depth 1").await.expect("go");

    let best = engine
        .wait_best_move(Duration::from_secs(5))
        .await
        .expect("bestmove");
    assert_eq!(best.bestmove, "g1f3");
    assert_eq!(best.ponder, "d7d5");
    assert_eq!(engine.last_best_move(), best);

    // The info line precedes bestmove, so it is already in the buffer.
    let infos = engine.get_info(-1);
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].depth, 1);
    assert_eq!(infos[0].seldepth, 2);
    assert_eq!(infos[0].score.value, -42);
    assert!(!infos[0].score.mate);
    assert_eq!(infos[0].pv, ["e2e4", "e7e5"]);

    engine.send_quit().await.expect("quit");
    assert!(matches!(
        engine.send_quit().await,
        Err(UciError::AlreadyExited)
    ));

    std::fs::remove_file(&script).ok();
}

#[tokio::test]
async fn second_search_yields_fresh_bestmove() {
    let script = fake_engine_path("fresh-bestmove");
    let engine = Engine::startup(EngineConfig::new(script.to_string_lossy().into_owned()))
        .await
        .expect("startup");

    engine.send_command("go depth 1").await.expect("go");
    let first = engine
        .wait_best_move(Duration::from_secs(5))
        .await
        .expect("first bestmove");

    engine.send_command("go depth 1").await.expect("go again");
    let second = engine
        .wait_best_move(Duration::from_secs(5))
        .await
        .expect("second bestmove");

    assert_eq!(first, second);
    assert_eq!(engine.last_best_move(), second);

    engine.send_quit().await.expect("quit");
    std::fs::remove_file(&script).ok();
}

#[tokio::test]
async fn startup_applies_configured_options() {
    let script = fake_engine_path("startup");
    let config = EngineConfig {
        display_name: "Test Rig".to_string(),
        uci_options: vec![OptionConfig {
            name: "Hash".to_string(),
            value: "64".to_string(),
        }],
        ..EngineConfig::new(script.to_string_lossy().into_owned())
    };
    let engine = Engine::startup(config).await.expect("startup");

    // The caller-supplied display name wins over the engine-reported one.
    assert_eq!(engine.display_name(), "Test Rig");
    engine.set_display_name("Renamed Rig");
    assert_eq!(engine.display_name(), "Renamed Rig");

    let set = engine.set_options();
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].name, "Hash");
    assert_eq!(set[0].value, "64");

    engine.send_quit().await.expect("quit");
    std::fs::remove_file(&script).ok();
}

#[tokio::test]
async fn wait_best_move_times_out_when_idle() {
    let script = fake_engine_path("ready-timeout");
    let engine = Engine::startup(EngineConfig::new(script.to_string_lossy().into_owned()))
        .await
        .expect("startup");

    // No search is running, so nothing will satisfy the wait.
    assert!(matches!(
        engine.wait_best_move(Duration::from_millis(50)).await,
        Err(UciError::Timeout)
    ));

    engine.send_quit().await.expect("quit");
    std::fs::remove_file(&script).ok();
}

#[tokio::test]
async fn spawn_rejects_missing_binary() {
    let config = EngineConfig::new("/nonexistent/engine-binary");
    assert!(matches!(
        Engine::spawn(config).await,
        Err(UciError::SpawnFailed(_))
    ));
}

#[tokio::test]
async fn spawn_rejects_invalid_config() {
    assert!(matches!(
        Engine::spawn(EngineConfig::default()).await,
        Err(UciError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn engines_from_config_starts_each_engine() {
    let script = fake_engine_path("from-config");
    let config_path = std::env::temp_dir().join(format!(
        "uci-driver-engines-{}.json",
        std::process::id()
    ));
    let raw = format!(
        r#"[{{"displayName": "Configured", "path": {:?}, "infoBufCap": 10,
             "UCIOptions": [{{"name": "Hash", "value": "32"}}]}}]"#,
        script.to_string_lossy()
    );
    std::fs::write(&config_path, raw).expect("write config");

    let engines = engines_from_config(&config_path).await.expect("engines");
    assert_eq!(engines.len(), 1);
    assert_eq!(engines[0].display_name(), "Configured");
    assert_eq!(engines[0].name(), "FakeFish 1.0");
    assert_eq!(engines[0].set_options().len(), 1);

    engines[0].send_quit().await.expect("quit");
    std::fs::remove_file(&config_path).ok();
    std::fs::remove_file(&script).ok();
}
