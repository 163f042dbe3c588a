//! Integration tests for the push-once `snapshot` mode.

use crate::test_helpers::{get_test_log_path, run_kopia_metrics};
use crate::{FAKE_KOPIA_BIN, FAKE_ZFS_BIN};
use eyre::Result;
use kopia_metrics::AssertContains as _;
use kopia_metrics::test_util::{FakeGateway, unreachable_address};

#[test]
fn pushes_created_snapshot_inside_zfs_snapshot() -> Result<()> {
    let gateway = FakeGateway::start(200);
    let address = gateway.address();
    let (_kopia_dir, kopia_log) = get_test_log_path("kopia-create");
    let (_zfs_dir, zfs_log) = get_test_log_path("zfs");

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/home/alice",
            "--override-source",
            "alice@laptop:/home/alice",
            "--zfs",
            "tank/home@kopia",
            "--zfs-bin",
            FAKE_ZFS_BIN,
            "--gateway-address",
            &address,
        ],
        [
            ("FAKE_KOPIA_LOG", kopia_log.as_os_str()),
            ("FAKE_ZFS_LOG", zfs_log.as_os_str()),
        ],
    )?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).assert_contains_snippets(&[
        r#"Pushed metrics for host="laptop",path="/home/alice",user="alice""#,
    ]);

    let push = gateway.try_recv().expect("push received");
    assert_eq!(push.method, "PUT");
    assert_eq!(
        push.url,
        "/metrics/job/kopia-gw/host/laptop/path@base64/L2hvbWUvYWxpY2U=/user/alice"
    );
    push.body.assert_contains_lines(&[
        r#"total_size_bytes{host="laptop",path="/home/alice",user="alice"} 277"#,
        r#"file_count{host="laptop",path="/home/alice",user="alice"} 1"#,
        r#"dir_count{host="laptop",path="/home/alice",user="alice"} 1"#,
        r#"duration_seconds{host="laptop",path="/home/alice",user="alice"} 0"#,
    ]);
    assert!(gateway.try_recv().is_none(), "exactly one push");

    let zfs = std::fs::read_to_string(&zfs_log)?;
    assert_eq!(
        zfs.lines().collect::<Vec<_>>(),
        ["snapshot tank/home@kopia", "destroy tank/home@kopia"]
    );
    std::fs::read_to_string(&kopia_log)?.assert_contains_snippets(&[
        "snapshot create --json --override-source alice@laptop:/home/alice /home/alice",
    ]);
    Ok(())
}

#[test]
fn zfs_snapshot_destroyed_when_kopia_fails() -> Result<()> {
    let gateway = FakeGateway::start(200);
    let address = gateway.address();
    let (_zfs_dir, zfs_log) = get_test_log_path("zfs-failing-kopia");

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/data",
            "--zfs",
            "tank/data@kopia",
            "--zfs-bin",
            FAKE_ZFS_BIN,
            "--gateway-address",
            &address,
        ],
        [
            ("FAKE_KOPIA_FAIL", std::ffi::OsStr::new("1")),
            ("FAKE_ZFS_LOG", zfs_log.as_os_str()),
        ],
    )?;
    assert!(!output.status.success());
    String::from_utf8_lossy(&output.stderr).assert_contains_snippets(&["simulated failure"]);

    std::fs::read_to_string(&zfs_log)?
        .assert_contains_lines(&["snapshot tank/data@kopia", "destroy tank/data@kopia"]);
    assert!(gateway.try_recv().is_none(), "nothing pushed");
    Ok(())
}

#[test]
fn rejected_push_fails() -> Result<()> {
    let gateway = FakeGateway::start(400);
    let address = gateway.address();

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/data",
            "--gateway-address",
            &address,
        ],
        [],
    )?;
    assert!(!output.status.success());
    String::from_utf8_lossy(&output.stderr).assert_contains_snippets(&["status 400"]);
    Ok(())
}

#[test]
fn unreachable_gateway_fails() -> Result<()> {
    let address = unreachable_address();

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/data",
            "--gateway-address",
            &address,
            "--push-timeout",
            "2",
        ],
        [],
    )?;
    assert!(!output.status.success());
    String::from_utf8_lossy(&output.stderr)
        .assert_contains_snippets(&["failed to reach push gateway"]);
    Ok(())
}

#[test]
fn failed_zfs_snapshot_skips_kopia() -> Result<()> {
    let gateway = FakeGateway::start(200);
    let address = gateway.address();
    let (_kopia_dir, kopia_log) = get_test_log_path("kopia-skipped");
    let (_zfs_dir, zfs_log) = get_test_log_path("zfs-snapshot-fails");

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/data",
            "--zfs",
            "tank/data@kopia",
            "--zfs-bin",
            FAKE_ZFS_BIN,
            "--gateway-address",
            &address,
        ],
        [
            ("FAKE_KOPIA_LOG", kopia_log.as_os_str()),
            ("FAKE_ZFS_LOG", zfs_log.as_os_str()),
            ("FAKE_ZFS_FAIL", std::ffi::OsStr::new("snapshot")),
        ],
    )?;
    assert!(!output.status.success());
    String::from_utf8_lossy(&output.stderr)
        .assert_contains_snippets(&[r#"failed to create zfs snapshot "tank/data@kopia""#]);

    assert!(!kopia_log.exists(), "kopia must not run without its zfs snapshot");
    let zfs = std::fs::read_to_string(&zfs_log)?;
    assert_eq!(zfs.lines().collect::<Vec<_>>(), ["snapshot tank/data@kopia"]);
    assert!(gateway.try_recv().is_none(), "nothing pushed");
    Ok(())
}

/// A snapshot left behind on the dataset fails the run before anything is pushed
#[test]
fn failed_zfs_destroy_fails_without_push() -> Result<()> {
    let gateway = FakeGateway::start(200);
    let address = gateway.address();
    let (_kopia_dir, kopia_log) = get_test_log_path("kopia-destroy-fails");
    let (_zfs_dir, zfs_log) = get_test_log_path("zfs-destroy-fails");

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/data",
            "--zfs",
            "tank/data@kopia",
            "--zfs-bin",
            FAKE_ZFS_BIN,
            "--gateway-address",
            &address,
        ],
        [
            ("FAKE_KOPIA_LOG", kopia_log.as_os_str()),
            ("FAKE_ZFS_LOG", zfs_log.as_os_str()),
            ("FAKE_ZFS_FAIL", std::ffi::OsStr::new("destroy")),
        ],
    )?;
    assert!(!output.status.success());
    String::from_utf8_lossy(&output.stderr)
        .assert_contains_snippets(&[r#"failed to destroy zfs snapshot "tank/data@kopia""#]);

    std::fs::read_to_string(&kopia_log)?.assert_contains_snippets(&["snapshot create --json"]);
    std::fs::read_to_string(&zfs_log)?
        .assert_contains_lines(&["snapshot tank/data@kopia", "destroy tank/data@kopia"]);
    assert!(gateway.try_recv().is_none(), "nothing pushed");
    Ok(())
}

#[test]
fn kopia_error_reported_over_failed_destroy() -> Result<()> {
    let (_zfs_dir, zfs_log) = get_test_log_path("zfs-both-fail");

    let output = run_kopia_metrics(
        &[
            "--kopia-bin",
            FAKE_KOPIA_BIN,
            "snapshot",
            "/data",
            "--zfs",
            "tank/data@kopia",
            "--zfs-bin",
            FAKE_ZFS_BIN,
            "--gateway-address",
            &unreachable_address(),
        ],
        [
            ("FAKE_KOPIA_FAIL", std::ffi::OsStr::new("1")),
            ("FAKE_ZFS_LOG", zfs_log.as_os_str()),
            ("FAKE_ZFS_FAIL", std::ffi::OsStr::new("destroy")),
        ],
    )?;
    assert!(!output.status.success());
    // destroy failure is logged, the kopia failure is the returned error
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.assert_contains_snippets(&[
        "simulated failure",
        r#"failed to destroy zfs snapshot "tank/data@kopia""#,
    ]);
    assert!(!stderr.contains("failed to reach push gateway"), "{stderr}");

    std::fs::read_to_string(&zfs_log)?
        .assert_contains_lines(&["snapshot tank/data@kopia", "destroy tank/data@kopia"]);
    Ok(())
}
