//! Exec tunnel between an initiator and an in-process responder

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CONTAINER_ID, ChannelConnector, mock_backend};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use webtty_core::pump::transport::channel_pair;
use webtty_core::tunnel::{TunnelFrame, TunnelRequest};
use webtty_core::{
    ContainerAction, ContainerBackend, ExecOptions, FrameSink, FrameSource, LogOptions,
    MockBackend, ShellHandle, TunnelClient, TunnelError, TunnelResponder,
};

fn client(backend: Arc<MockBackend>, server_auth: Option<&str>, auth: &str) -> TunnelClient {
    TunnelClient::new(Arc::new(ChannelConnector::new(backend, server_auth)), auth)
}

#[tokio::test]
async fn wrong_auth_closes_before_exec() {
    let backend = mock_backend();
    let responder = TunnelResponder::new(backend.clone(), Some("secret".to_string()));
    let ((mut remote_rx, mut remote_tx), (mut local_rx, mut local_tx)) = channel_pair(8);

    let server = tokio::spawn(async move {
        responder
            .serve(&mut remote_rx, &mut remote_tx, CancellationToken::new())
            .await
    });

    let info = backend.get_info(CONTAINER_ID).await.unwrap();
    let hello = TunnelFrame::Hello {
        auth: "guess".to_string(),
        request: TunnelRequest::Exec {
            container: info,
            opts: ExecOptions::default(),
        },
    };
    local_tx.send_frame(hello.to_frame().unwrap()).await.unwrap();

    let result = server.await.unwrap();
    assert!(matches!(result, Err(TunnelError::Auth)));

    let frame = local_rx.next_frame().await.unwrap().unwrap();
    assert!(matches!(
        TunnelFrame::from_frame(&frame).unwrap(),
        TunnelFrame::Error { .. }
    ));
    assert!(local_rx.next_frame().await.is_none());
    assert_eq!(backend.exec_calls(), 0);
}

#[tokio::test]
async fn shell_end_on_responder_ends_initiator_read() {
    let backend = mock_backend();
    let client = client(backend.clone(), None, "");
    let info = client.get_info(CONTAINER_ID).await.unwrap();

    let shell = client.exec(info, ExecOptions::default()).await.unwrap();
    let controller = backend.next_shell().await.unwrap();

    controller.push_output(b"bye\r\n");
    controller.close_output();

    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(2), shell.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"bye\r\n");
    let n = tokio::time::timeout(Duration::from_secs(2), shell.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    for _ in 0..100 {
        if controller.is_exited() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(controller.is_exited());
}

#[tokio::test]
async fn client_surfaces_auth_failure() {
    let backend = mock_backend();
    let client = client(backend.clone(), Some("secret"), "nope");

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, TunnelError::Remote(_)));
    assert_eq!(backend.exec_calls(), 0);
}

#[tokio::test]
async fn unary_requests_round_trip() {
    let backend = mock_backend();
    let client = client(backend.clone(), Some("secret"), "secret");

    assert_eq!(client.ping().await.unwrap(), "mock");
    let list = client.list().await.unwrap();
    assert_eq!(list.len(), 1);
    let info = client.get_info(&CONTAINER_ID[..12]).await.unwrap();
    assert_eq!(info.id, CONTAINER_ID);

    client.restart(CONTAINER_ID).await.unwrap();
    assert_eq!(
        backend.actions(),
        vec![(ContainerAction::Restart, CONTAINER_ID.to_string())]
    );
    assert!(client.stop("missing").await.is_err());
}

#[tokio::test]
async fn exec_relays_input_output_and_exit() {
    let backend = mock_backend();
    let client = client(backend.clone(), None, "");
    let info = client.get_info(CONTAINER_ID).await.unwrap();

    let opts = ExecOptions {
        cmd: Some("bash".to_string()),
        ..Default::default()
    };
    let shell = client.exec(info, opts).await.unwrap();
    let controller = backend.next_shell().await.unwrap();
    assert_eq!(backend.exec_options()[0].cmd.as_deref(), Some("bash"));

    shell.write(b"ls\n").await.unwrap();
    assert_eq!(controller.next_input().await.unwrap(), b"ls\n");

    controller.push_output(b"file.txt\r\n");
    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(2), shell.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"file.txt\r\n");

    shell.exit().await.unwrap();
    for _ in 0..100 {
        if controller.is_exited() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(controller.is_exited());
}

#[tokio::test]
async fn exec_resize_retries_on_the_responder() {
    let backend = mock_backend();
    let client = client(backend.clone(), None, "");
    let info = client.get_info(CONTAINER_ID).await.unwrap();
    let shell = client.exec(info, ExecOptions::default()).await.unwrap();
    let controller = backend.next_shell().await.unwrap();

    controller.fail_resizes(1);
    shell.resize(120, 40).await.unwrap();
    // A write after the resize frame proves it has been handled
    shell.write(b"x").await.unwrap();
    assert_eq!(controller.next_input().await.unwrap(), b"x");

    assert_eq!(controller.resizes(), vec![(120, 40)]);
}

#[tokio::test]
async fn exec_activity_follows_remote_output() {
    let backend = mock_backend();
    let client = client(backend.clone(), None, "");
    let info = client.get_info(CONTAINER_ID).await.unwrap();
    let shell = client.exec(info, ExecOptions::default()).await.unwrap();
    let controller = backend.next_shell().await.unwrap();

    let mut activity = shell.activity().expect("activity is available once");
    assert!(shell.activity().is_none());

    controller.push_output(b"tick");
    tokio::time::timeout(Duration::from_secs(2), activity.recv())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn logs_stream_until_the_backend_ends() {
    let backend = mock_backend();
    backend.set_logs(CONTAINER_ID, b"one\ntwo\n");
    let client = client(backend.clone(), None, "");

    let mut stream = client.logs(LogOptions::new(CONTAINER_ID)).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out, b"one\ntwo\n");
}
