//! End-to-end session flow through the public session API, persisted to
//! a snapshot directory.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use huruf::game::questions::QuestionBank;
use huruf::game::state::{SessionStatus, Team};
use huruf::network::protocol::ServerMessage;
use huruf::network::registry::{ConnectionId, Outbound};
use huruf::network::session::{SessionConfig, SessionHandle, SessionManager};
use huruf::{FileSnapshotStore, SessionState, SnapshotStore};

fn manager_in(dir: &std::path::Path) -> (SessionManager, Arc<FileSnapshotStore>) {
    let store = Arc::new(FileSnapshotStore::open(dir).unwrap());
    let manager = SessionManager::new(
        store.clone(),
        Arc::new(QuestionBank::embedded()),
        SessionConfig::default(),
    );
    (manager, store)
}

async fn attach(
    manager: &SessionManager,
    id: &str,
    conn_id: ConnectionId,
) -> (SessionHandle, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = manager.connect(id, conn_id, tx).await.unwrap();
    (handle, rx)
}

async fn next_message(rx: &mut mpsc::Receiver<Outbound>) -> ServerMessage {
    let outbound = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no message within timeout")
        .expect("outbound queue closed");
    match outbound {
        Outbound::Message(message) => message,
        other => panic!("expected message, got {:?}", other),
    }
}

async fn next_state(rx: &mut mpsc::Receiver<Outbound>) -> SessionState {
    loop {
        if let ServerMessage::SessionState { state } = next_message(rx).await {
            return *state;
        }
    }
}

async fn send(handle: &SessionHandle, conn_id: ConnectionId, value: Value) {
    handle.inbound(conn_id, value.to_string()).await.unwrap();
}

#[tokio::test]
async fn test_buzz_and_correct_answer_claims_cell() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, store) = manager_in(dir.path());
    let id = manager.create_session(None).await.unwrap();

    let (host, mut host_rx) = attach(&manager, &id, 1).await;
    let (_, mut green_rx) = attach(&manager, &id, 2).await;
    next_state(&mut host_rx).await;
    next_state(&mut green_rx).await;

    send(&host, 2, json!({"type": "JOIN", "role": "buzzer", "team": "green"})).await;
    send(&host, 1, json!({"type": "MAIN_START_GAME"})).await;
    let started = next_state(&mut host_rx).await;
    assert_eq!(started.status, SessionStatus::Playing);
    let cell_id = started.active_cell_id.clone().unwrap();
    let answer = started.active_question.clone().unwrap().answer;

    send(&host, 2, json!({"type": "BUZZ_REQUEST", "team": "green"})).await;
    assert_eq!(next_message(&mut host_rx).await, ServerMessage::BuzzLocked { team: Team::Green });
    assert!(matches!(
        next_message(&mut host_rx).await,
        ServerMessage::TimerStart { team: Team::Green, .. }
    ));
    assert!(next_state(&mut host_rx).await.buzzer.locked);

    send(&host, 2, json!({"type": "SUBMIT_ANSWER", "team": "green", "answer": answer})).await;
    match next_message(&mut host_rx).await {
        ServerMessage::AnswerResult { team, correct, .. } => {
            assert_eq!(team, Team::Green);
            assert!(correct);
        }
        other => panic!("expected ANSWER_RESULT, got {:?}", other),
    }
    assert_eq!(
        next_message(&mut host_rx).await,
        ServerMessage::CellOwned { cell_id: cell_id.clone(), team: Team::Green }
    );
    let state = next_state(&mut host_rx).await;

    assert_eq!(state.cell(&cell_id).unwrap().owner, Some(Team::Green));
    assert_eq!(state.current_team_turn, Team::Green);
    assert!(state.active_cell_id.is_none());
    assert!(!state.buzzer.locked);
    assert_eq!(store.load(&id).unwrap().unwrap(), state);

    // The buzzer socket sees the same final state after its JOIN reply
    while next_state(&mut green_rx).await != state {}
}

#[tokio::test]
async fn test_restart_restores_from_snapshot_directory() {
    let dir = tempfile::tempdir().unwrap();
    let id;
    let saved;
    {
        let (manager, _) = manager_in(dir.path());
        id = manager.create_session(None).await.unwrap();
        let (host, mut rx) = attach(&manager, &id, 1).await;
        next_state(&mut rx).await;
        send(&host, 1, json!({"type": "START_GAME"})).await;
        saved = next_state(&mut rx).await;
    }

    let (manager, _) = manager_in(dir.path());
    let (_, mut rx) = attach(&manager, &id, 7).await;
    assert_eq!(next_state(&mut rx).await, saved);
}

#[tokio::test]
async fn test_legacy_snapshot_restores_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = manager_in(dir.path());
    let id = manager.create_session(None).await.unwrap();

    // Strip fields older snapshots never had
    let path = dir.path().join(format!("{id}.json"));
    let mut raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let object = raw.as_object_mut().unwrap();
    for field in ["autoJudge", "matchWins", "allowedBuzzTeams", "attemptNo", "stage"] {
        object.remove(field);
    }
    std::fs::write(&path, raw.to_string()).unwrap();

    let (fresh, _) = manager_in(dir.path());
    let (_, mut rx) = attach(&fresh, &id, 1).await;
    let state = next_state(&mut rx).await;

    assert!(state.auto_judge);
    assert_eq!(state.match_wins.green, 0);
    assert_eq!(state.allowed_buzz_teams, vec![Team::Green, Team::Red]);
    assert_eq!(state.attempt_no, 1);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _) = manager_in(dir.path());
    let (tx, _rx) = mpsc::channel(1);
    assert!(manager.connect("missing", 1, tx).await.is_err());
}
