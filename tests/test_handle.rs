mod common;

use std::time::Duration;

use tokio::time::pause;

use stream_supervisor::{StreamStatus, SupervisorHandleError};

use common::{advance, create_supervisor_and_get_handle, settle, FakeLauncher};

#[tokio::test]
async fn test_stop_terminates_live_child() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    handle.stop().await.unwrap();

    assert!(launcher.last().was_terminated());
    assert_eq!(launcher.live(), 0);
    let status = handle.status();
    assert_eq!(status.status, StreamStatus::Offline);
    assert!(status.logs.last().unwrap().ends_with("Stream stopped"));

    advance(Duration::from_secs(60)).await;
    assert_eq!(launcher.launches(), 1);
    assert!(!handle.is_running());
}

#[tokio::test]
async fn test_stop_kills_child_that_ignores_termination() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;
    let child = launcher.last();
    child.ignore_terminate();

    let started = tokio::time::Instant::now();
    handle.stop().await.unwrap();

    assert!(child.was_terminated());
    assert!(child.was_killed());
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(launcher.live(), 0);
    assert_eq!(handle.status().status, StreamStatus::Offline);
}

#[tokio::test]
async fn test_stop_does_not_kill_a_cooperative_child() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    handle.stop().await.unwrap();
    assert!(launcher.last().was_terminated());
    assert!(!launcher.last().was_killed());
}

#[tokio::test]
async fn test_stop_cancels_pending_restart() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    launcher.last().exit(1).await;
    settle().await;
    assert_eq!(handle.status().status, StreamStatus::Offline);

    handle.stop().await.unwrap();
    advance(Duration::from_secs(10)).await;

    assert_eq!(launcher.launches(), 1);
    assert_eq!(handle.status().status, StreamStatus::Offline);
}

#[tokio::test]
async fn test_restart_replaces_child_without_delay() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    handle.restart().unwrap();
    settle().await;

    assert!(launcher.child(0).was_terminated());
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.max_live(), 1);
    let status = handle.status();
    assert_eq!(status.status, StreamStatus::Live);
    assert_eq!(status.pid, Some(1001));

    // No timer was left behind by the forced restart.
    advance(Duration::from_secs(30)).await;
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn test_restart_while_waiting_starts_now() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    launcher.last().exit(1).await;
    settle().await;
    handle.restart().unwrap();
    settle().await;
    assert_eq!(launcher.launches(), 2);
    assert_eq!(handle.status().status, StreamStatus::Live);

    // The timer scheduled by the exit was cancelled.
    advance(Duration::from_secs(5)).await;
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.max_live(), 1);
}

#[tokio::test]
async fn test_uptime_tracks_current_child() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    advance(Duration::from_secs(90)).await;
    let status = handle.status();
    assert_eq!(status.uptime_secs, 90);
    assert_eq!(status.uptime, "00:01:30");

    launcher.last().exit(1).await;
    settle().await;
    assert_eq!(handle.status().uptime_secs, 0);

    advance(Duration::from_secs(5)).await;
    assert_eq!(handle.status().uptime_secs, 0);
}

#[tokio::test]
async fn test_handle_errors_after_stop() {
    pause();
    let launcher = FakeLauncher::default();
    let handle = create_supervisor_and_get_handle(&launcher).await;

    handle.stop().await.unwrap();
    settle().await;

    let result = handle.restart();
    assert!(matches!(result, Err(SupervisorHandleError::SendError(_))));
    let result = handle.stop().await;
    assert!(matches!(result, Err(SupervisorHandleError::SendError(_))));

    // Status stays readable.
    assert_eq!(handle.status().status, StreamStatus::Offline);
    handle.wait().await.unwrap();
}
