//! Integration tests against a real Docker engine.
//!
//! Tests are skipped if Docker is not available or SKIP_CONTAINER_TESTS=1.

#![cfg(feature = "docker")]

use relay::container::DockerBackend;
use relay::{
    BackendKind, BackendOptions, Container, Context, DockerOptions, LifecycleStep, Relay,
    RelayOptions,
};
use serial_test::serial;
use test_tag::tag;

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS")
        && (value == "1" || value.eq_ignore_ascii_case("true"))
    {
        return false;
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn docker_relay() -> Relay {
    let options = RelayOptions {
        backend: BackendOptions::Docker(DockerOptions::default()),
        ..Default::default()
    };
    Relay::new(options).expect("Failed to build docker relay")
}

/// Cleanup helper - removes container if exists.
async fn cleanup_container(relay: &Relay, name: &str) {
    let _ = relay.remove_container(&Context::new(), name).await;
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_docker_ping() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let backend = DockerBackend::new(&DockerOptions::default()).unwrap();
    backend.ping().await.expect("Failed to ping docker");
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_docker_lifecycle_exit_codes() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let relay = docker_relay();
    assert_eq!(relay.backend_kind(), BackendKind::Docker);
    let ctx = Context::new();

    for (name, command, expected) in [
        ("relay-test-true", "true", 0),
        ("relay-test-false", "false", 1),
    ] {
        cleanup_container(&relay, name).await;
        let container = Container::new("busybox:latest", name).with_command(command);

        relay.create_container(&ctx, &container).await.unwrap();
        relay.start_container(&ctx, name).await.unwrap();
        let code = relay.wait_container(&ctx, name).await.unwrap();
        assert_eq!(code, expected, "{} exit code", command);

        relay.remove_container(&ctx, name).await.unwrap();
    }
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_docker_missing_image_fails_pull() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let relay = docker_relay();
    let container = Container::new(
        "relay-nonexistent-image-for-tests:never",
        "relay-test-missing",
    );
    let err = relay
        .create_container(&Context::new(), &container)
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(LifecycleStep::Pull));
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_docker_attach_streams_output() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let relay = docker_relay();
    let name = "relay-test-attach";
    cleanup_container(&relay, name).await;
    let ctx = Context::new();
    let container = Container::new("busybox:latest", name)
        .with_command("echo relayed")
        .with_attach(true);
    relay.create_container(&ctx, &container).await.unwrap();

    let mut input: &[u8] = b"";
    let mut output = Vec::new();
    let attach_ctx = ctx.child();
    let (attached, code) = tokio::join!(
        relay.attach_to_container(&attach_ctx, name, &mut input, &mut output),
        async {
            relay.start_container(&ctx, name).await?;
            relay.wait_container(&ctx, name).await
        }
    );

    attached.unwrap();
    assert_eq!(code.unwrap(), 0);
    assert!(String::from_utf8_lossy(&output).contains("relayed"));

    relay.remove_container(&ctx, name).await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_docker_wait_deadline() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let relay = docker_relay();
    let name = "relay-test-sleep";
    cleanup_container(&relay, name).await;
    let ctx = Context::new();
    let container = Container::new("busybox:latest", name).with_command("sleep 30");

    relay.create_container(&ctx, &container).await.unwrap();
    relay.start_container(&ctx, name).await.unwrap();
    let err = relay
        .wait_container(&ctx.with_timeout(std::time::Duration::from_millis(200)), name)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    relay.remove_container(&ctx, name).await.unwrap();
}
