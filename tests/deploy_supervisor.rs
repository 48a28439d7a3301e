// tests/deploy_supervisor.rs

use std::time::Duration;

use tokio::sync::mpsc;

use syncds::deploy::DeploySupervisor;
use syncds::protocol::{DeployStatus, Frame};
use syncds::transport::Outbound;
use syncds_test_utils::{init_tracing, with_timeout};

async fn next(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    with_timeout(rx.recv()).await.expect("outbound closed")
}

/// Collect frames up to and including the deploy's exit status.
async fn until_exit(rx: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
    let mut frames = Vec::new();
    loop {
        let frame = next(rx).await;
        let done = matches!(frame, Frame::DeployStatus(DeployStatus::Exited { .. }));
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

#[tokio::test]
async fn streams_stdout_then_stderr_then_exit() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(10));
    let (outbound, mut rx) = Outbound::channel(64);

    sup.deploy("echo out1; echo err1 >&2; echo out2; exit 3", None, &outbound)
        .await;

    let frames = until_exit(&mut rx).await;
    assert_eq!(
        frames,
        vec![
            Frame::DeployStatus(DeployStatus::Started {
                command: "echo out1; echo err1 >&2; echo out2; exit 3".into()
            }),
            Frame::DeployStdout("out1".into()),
            Frame::DeployStdout("out2".into()),
            Frame::DeployStderr("err1".into()),
            Frame::DeployStatus(DeployStatus::Exited {
                code: Some(3),
                success: false
            }),
        ]
    );
}

#[tokio::test]
async fn new_trigger_kills_previous_process_first() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(50));
    let (outbound, mut rx) = Outbound::channel(64);

    sup.deploy("echo first; sleep 30", None, &outbound).await;
    assert!(matches!(
        next(&mut rx).await,
        Frame::DeployStatus(DeployStatus::Started { .. })
    ));
    assert_eq!(next(&mut rx).await, Frame::DeployStdout("first".into()));
    assert!(sup.is_running().await);

    sup.deploy("echo second", None, &outbound).await;

    assert_eq!(
        next(&mut rx).await,
        Frame::DeployStatus(DeployStatus::KillSucceeded)
    );
    let rest = until_exit(&mut rx).await;
    assert!(matches!(
        &rest[0],
        Frame::DeployStatus(DeployStatus::Started { command }) if command == "echo second"
    ));
    assert_eq!(rest[1], Frame::DeployStdout("second".into()));
}

#[tokio::test]
async fn shutdown_kills_running_deploy() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(10));
    let (outbound, mut rx) = Outbound::channel(64);

    sup.deploy("sleep 30", None, &outbound).await;
    next(&mut rx).await; // Started
    assert!(sup.is_running().await);

    with_timeout(sup.shutdown(Some(&outbound))).await;
    assert_eq!(
        next(&mut rx).await,
        Frame::DeployStatus(DeployStatus::KillSucceeded)
    );
    assert!(!sup.is_running().await);
}

#[tokio::test]
async fn finished_deploy_is_not_killed_again() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(10));
    let (outbound, mut rx) = Outbound::channel(64);

    sup.deploy("true", None, &outbound).await;
    until_exit(&mut rx).await;
    // the runner finishes right after reporting the exit
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!sup.is_running().await);

    sup.deploy("true", None, &outbound).await;
    // straight to Started: no kill status in between
    assert!(matches!(
        next(&mut rx).await,
        Frame::DeployStatus(DeployStatus::Started { .. })
    ));
}

#[tokio::test]
async fn deploy_keeps_running_when_client_is_gone() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(10));
    let (outbound, rx) = Outbound::channel(1);
    drop(rx);

    sup.deploy("for i in 1 2 3 4 5; do echo $i; done; sleep 30", None, &outbound)
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sup.is_running().await);

    sup.shutdown(None).await;
    assert!(!sup.is_running().await);
}

#[tokio::test]
async fn invalid_utf8_output_does_not_stop_the_stream() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(10));
    let (outbound, mut rx) = Outbound::channel(64);

    let cmd = r"printf 'line1\n\377bad\nline3\n'; echo err >&2";
    sup.deploy(cmd, None, &outbound).await;

    let frames = until_exit(&mut rx).await;
    assert_eq!(
        frames,
        vec![
            Frame::DeployStatus(DeployStatus::Started {
                command: cmd.into()
            }),
            Frame::DeployStdout("line1".into()),
            Frame::DeployStdout("\u{FFFD}bad".into()),
            Frame::DeployStdout("line3".into()),
            Frame::DeployStderr("err".into()),
            Frame::DeployStatus(DeployStatus::Exited {
                code: Some(0),
                success: true
            }),
        ]
    );
}

#[tokio::test]
async fn kill_is_not_blocked_by_a_client_that_stopped_reading() {
    init_tracing();
    let sup = DeploySupervisor::new(Duration::from_millis(10));
    // Room for the start report only; nobody drains `_rx`.
    let (outbound, _rx) = Outbound::channel(1);

    sup.deploy("yes", None, &outbound).await;
    assert!(sup.is_running().await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    with_timeout(sup.shutdown(None)).await;
    assert!(!sup.is_running().await);
}
