//! Sandbox client integration tests.
//!
//! The guard-rail tests run without Docker. The end-to-end tests
//! exercise a real container and are `#[ignore]`d so they only run when
//! a Docker daemon is available (`cargo test -- --ignored`).

use std::time::Duration;

use isobox_sandbox::{Error, LocalSandboxClient, SandboxClient, SandboxConfig};

fn docker_config() -> SandboxConfig {
    SandboxConfig {
        image: "python:3.12-slim".to_string(),
        timeout_secs: 30,
        ..Default::default()
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

// =============================================================================
// Guard rails (no Docker required)
// =============================================================================

#[tokio::test]
async fn test_uninitialized_client_rejects_operations() {
    let mut client = LocalSandboxClient::new();

    let err = client.run_command("echo test", None).await.unwrap_err();
    assert!(matches!(err, Error::NotInitialized));

    let err = client.read_file("file.txt").await.unwrap_err();
    assert!(matches!(err, Error::NotInitialized));

    let err = client.write_file("file.txt", "data").await.unwrap_err();
    assert!(matches!(err, Error::NotInitialized));
}

#[tokio::test]
async fn test_cleanup_is_idempotent_on_fresh_client() {
    let mut client = LocalSandboxClient::new();
    client.cleanup().await;
    client.cleanup().await;
    // Still usable as a facade afterwards.
    assert!(client.run_command("echo", None).await.is_err());
}

// =============================================================================
// End-to-end (requires Docker)
// =============================================================================

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_command_execution_round_trip() {
    init_logging();
    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();

    let output = client.run_command("echo 'test'", None).await.unwrap();
    assert_eq!(output, "test");

    client.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_sequential_commands_stay_ordered() {
    init_logging();
    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();

    let first = client.run_command("echo alpha", None).await.unwrap();
    let second = client.run_command("echo beta", None).await.unwrap();
    assert_eq!(first, "alpha");
    assert_eq!(second, "beta");

    client.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_command_timeout_is_enforced_promptly() {
    init_logging();
    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let err = client
        .run_command("sleep 10", Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    // Cancelled at the bound, not after the command finished.
    assert!(started.elapsed() < Duration::from_secs(5));

    client.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_dangerous_command_is_rejected_before_execution() {
    init_logging();
    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();

    let err = client.run_command("rm -rf /", None).await.unwrap_err();
    assert!(matches!(err, Error::CommandRejected(_)));

    client.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_write_then_read_file() {
    init_logging();
    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();

    client
        .write_file("notes/hello.txt", "hello")
        .await
        .unwrap();
    let content = client.read_file("notes/hello.txt").await.unwrap();
    assert_eq!(content, "hello");

    let err = client.read_file("nonexistent.txt").await.unwrap_err();
    assert!(err.is_not_found());

    client.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_directory_copy_round_trip() {
    init_logging();
    let src = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(src.path().join("nested")).unwrap();
    std::fs::write(src.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(src.path().join("nested/b.txt"), "beta").unwrap();

    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();

    client
        .copy_to(src.path().to_str().unwrap(), "uploaded")
        .await
        .unwrap();

    let dst = tempfile::tempdir().unwrap();
    client
        .copy_from("uploaded", dst.path().to_str().unwrap())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dst.path().join("uploaded/a.txt")).unwrap(),
        "alpha"
    );
    assert_eq!(
        std::fs::read_to_string(dst.path().join("uploaded/nested/b.txt")).unwrap(),
        "beta"
    );

    client.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_create_then_cleanup_allows_recreate() {
    init_logging();
    let mut client = LocalSandboxClient::new();
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();
    client.cleanup().await;
    client.cleanup().await;

    // The facade is reusable after teardown.
    client
        .create(docker_config(), Default::default())
        .await
        .unwrap();
    let output = client.run_command("echo again", None).await.unwrap();
    assert_eq!(output, "again");
    client.cleanup().await;
}
