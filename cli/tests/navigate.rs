use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use futures::SinkExt;
use futures::StreamExt;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const ROUTES: &str = r#"[
    {
        "id": "1",
        "name": "Recommended Route",
        "eta": "15 min",
        "risk": "low",
        "coordinates": [
            { "latitude": 41.8397, "longitude": -87.6343 },
            { "latitude": 41.8403, "longitude": -87.6336 }
        ]
    },
    {
        "id": "2",
        "name": "Alternative Route",
        "eta": "12 min",
        "risk": "medium",
        "coordinates": [
            { "latitude": 41.8397, "longitude": -87.6343 },
            { "latitude": 41.8410, "longitude": -87.6320 }
        ]
    }
]"#;

fn saferoute_command(saferoute_home: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("saferoute")?;
    cmd.env("SAFEROUTE_HOME", saferoute_home)
        .env_remove("SAFEROUTE_API_URL")
        .env_remove("SAFEROUTE_SOCKET_URL")
        .env_remove("RUST_LOG");
    Ok(cmd)
}

fn write_home(config: &str) -> Result<(TempDir, PathBuf)> {
    let home = TempDir::new()?;
    std::fs::write(home.path().join("config.toml"), config)?;
    let routes = home.path().join("routes.json");
    std::fs::write(&routes, ROUTES)?;
    Ok((home, routes))
}

fn navigate_args(routes: &Path) -> Vec<String> {
    [
        "navigate",
        "--to-lat",
        "41.8403",
        "--to-lon",
        "-87.6336",
        "--from-lat",
        "41.8397",
        "--from-lon",
        "-87.6343",
        "--routes",
    ]
    .into_iter()
    .map(str::to_string)
    .chain([routes.display().to_string()])
    .collect()
}

#[test]
fn missing_routes_file_is_reported() -> Result<()> {
    let home = TempDir::new()?;
    saferoute_command(home.path())?
        .args(navigate_args(&home.path().join("absent.json")))
        .assert()
        .failure()
        .stderr(contains("failed to read routes"));
    Ok(())
}

#[test]
fn unknown_route_choice_fails_before_connecting() -> Result<()> {
    let (home, routes) = write_home("socket_url = \"http://127.0.0.1:1\"\n")?;
    let mut args = navigate_args(&routes);
    args.extend(["--route".to_string(), "9".to_string()]);
    saferoute_command(home.path())?
        .args(args)
        .assert()
        .failure()
        .stderr(contains("unknown route id 9"));
    Ok(())
}

#[test]
fn unreachable_server_without_reconnection_gives_up() -> Result<()> {
    let (home, routes) = write_home(
        r#"
socket_url = "http://127.0.0.1:1"

[channel]
reconnection = false
"#,
    )?;
    saferoute_command(home.path())?
        .args(navigate_args(&routes))
        .assert()
        .failure()
        .stdout(contains("* 1 [Recommended Route] 15 min (Low Risk)"))
        .stderr(contains("gave up reconnecting after 0 attempts"));
    Ok(())
}

/// Plays the server side of one navigation session and returns every frame
/// the client sent after the namespace connect.
async fn serve_one_session(listener: TcpListener) -> Result<Vec<String>> {
    let (stream, _) = listener.accept().await?;
    let mut socket = tokio_tungstenite::accept_async(stream).await?;
    socket
        .send(Message::text(
            r#"0{"sid":"e2e","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        ))
        .await?;

    let connect = socket.next().await.context("client left")??;
    assert_eq!(connect.to_text()?, "40");
    socket
        .send(Message::text(r#"40{"sid":"socket-e2e"}"#))
        .await?;

    let mut frames = Vec::new();
    while let Some(message) = socket.next().await {
        let message = message?;
        if message.is_close() {
            break;
        }
        let frame = message.to_text()?.to_string();
        if frame.starts_with(r#"42["start_navigation""#) {
            socket
                .send(Message::text(
                    r#"42["navigation_update",{"type":"location_update","latitude":41.84,"longitude":-87.6339}]"#,
                ))
                .await?;
        }
        let done = frame == "41";
        frames.push(frame);
        if done {
            break;
        }
    }
    Ok(frames)
}

#[tokio::test(flavor = "multi_thread")]
async fn navigate_follows_updates_and_stops_cleanly() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(serve_one_session(listener));

    let (home, routes) = write_home(&format!("socket_url = \"http://{addr}\"\n"))?;
    let mut cmd = saferoute_command(home.path())?;
    cmd.args(navigate_args(&routes))
        .args(["--duration-secs", "2"]);
    let output = tokio::task::spawn_blocking(move || cmd.output()).await??;
    let stdout = String::from_utf8(output.stdout)?;
    if !output.status.success() {
        bail!(
            "navigate failed: {stdout}\n{}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    assert!(stdout.contains("Selected route: Recommended Route"), "{stdout}");
    assert!(stdout.contains("Navigating to 41.8403, -87.6336."), "{stdout}");
    assert!(stdout.contains("Location: 41.8400, -87.6339"), "{stdout}");
    assert!(stdout.contains("Navigation stopped."), "{stdout}");

    let frames = server.await??;
    assert_eq!(frames.len(), 3, "{frames:?}");
    let start: JsonValue = serde_json::from_str(frames[0].trim_start_matches("42"))?;
    assert_eq!(
        start,
        json!([
            "start_navigation",
            {
                "start": { "latitude": 41.8397, "longitude": -87.6343 },
                "destination": { "latitude": 41.8403, "longitude": -87.6336 }
            }
        ])
    );
    assert_eq!(frames[1], r#"42["stop_navigation",{}]"#);
    assert_eq!(frames[2], "41");
    Ok(())
}
