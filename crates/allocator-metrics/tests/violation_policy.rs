//! Integration tests for the abort violation policy.
//!
//! A lifecycle violation under `ViolationPolicy::Abort` ends the process, so
//! the violating code runs in a child copy of this test binary and the parent
//! inspects how the child exited.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::process::Command;
use std::sync::Arc;

use allocator_metrics::catalog::{InMemoryCatalog, ViolationPolicy};
use allocator_metrics::registry::{AllocatorMetrics, RegistryOptions};
use allocator_test_utils::{resource_kinds, FakeAllocator};

/// Set in the child process; selects the violating branch.
const CHILD_ENV: &str = "ALLOCATOR_METRICS_VIOLATION_CHILD";

#[cfg(unix)]
const SIGABRT: i32 = 6;

fn run_child(test_name: &str) -> std::process::ExitStatus {
    let exe = std::env::current_exe().expect("test binary path");
    Command::new(exe)
        .args(["--exact", test_name, "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .status()
        .expect("child test process should start")
}

#[tokio::test]
async fn test_remove_untracked_role_aborts_process() {
    if std::env::var_os(CHILD_ENV).is_some() {
        let options = RegistryOptions::default();
        assert_eq!(options.policy, ViolationPolicy::Abort);

        let mut metrics = AllocatorMetrics::new(
            InMemoryCatalog::new(),
            Arc::new(FakeAllocator::new()),
            &resource_kinds(&["cpus"]),
            options,
        )
        .unwrap();

        // Does not return under the abort policy.
        let _ = metrics.remove_role("never-added");
        return;
    }

    let status = run_child("test_remove_untracked_role_aborts_process");

    assert!(!status.success(), "child exited cleanly: {status:?}");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(SIGABRT), "child status: {status:?}");
    }
}
