use std::process::{Child, Command};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use slotkeeper::config::SupervisorConfig;
use slotkeeper::errors::SupervisorError;
use slotkeeper::models::Role;
use slotkeeper::supervisor::{
    DetachedLaunch, FileLivenessStore, InstanceLock, LivenessStore, ProcessControl,
    ProcessIdentity, ProcessSupervisor, SysinfoProcessControl, WorkerInvocation,
};

/// A process the scheduler never started, standing in for whatever inherited a PID
/// after a reboot
fn unrelated_process() -> Child {
    Command::new("sleep").arg("60").spawn().unwrap()
}

/// Record naming `pid` but an older start time, as left behind by the previous boot
fn stale_record(pid: u32, control: &dyn ProcessControl) -> ProcessIdentity {
    let started = control.start_time(pid).unwrap();
    ProcessIdentity {
        pid,
        start_time: Some(started.saturating_sub(3600)),
    }
}

fn supervisor(dir: &TempDir, control: Arc<SysinfoProcessControl>) -> (ProcessSupervisor, Arc<FileLivenessStore>) {
    let liveness = Arc::new(FileLivenessStore::new(dir.path().join("run")));
    let config = SupervisorConfig {
        liveness_dir: dir.path().join("run"),
        terminate_grace: Duration::from_millis(500),
        settle_delay: Duration::ZERO,
        encoder_process_names: vec!["slotkeeper-test-encoder".into()],
        ..SupervisorConfig::default()
    };
    (
        ProcessSupervisor::new(liveness.clone(), control, &config),
        liveness,
    )
}

#[tokio::test]
async fn test_reclaim_leaves_process_with_recycled_pid_running() {
    let temp_dir = TempDir::new().unwrap();
    let control = Arc::new(SysinfoProcessControl::new());
    let (supervisor, liveness) = supervisor(&temp_dir, control.clone());

    let mut bystander = unrelated_process();
    let record = stale_record(bystander.id(), control.as_ref());
    liveness.write(Role::Record, record).await.unwrap();

    supervisor.reclaim(Role::Record).await;

    assert!(bystander.try_wait().unwrap().is_none());
    assert_eq!(liveness.read(Role::Record).await.unwrap(), None);

    bystander.kill().unwrap();
    bystander.wait().unwrap();
}

#[tokio::test]
async fn test_detached_launch_is_not_blocked_by_recycled_pid() {
    let temp_dir = TempDir::new().unwrap();
    let control = Arc::new(SysinfoProcessControl::new());
    let (supervisor, liveness) = supervisor(&temp_dir, control.clone());

    let mut bystander = unrelated_process();
    let record = stale_record(bystander.id(), control.as_ref());
    liveness.write(Role::Upload, record).await.unwrap();

    let invocation = WorkerInvocation {
        program: "sleep".into(),
        args: vec!["2".into()],
        env: vec![],
    };
    let outcome = supervisor
        .launch_detached(Role::Upload, &invocation)
        .await
        .unwrap();
    let DetachedLaunch::Launched { pid } = outcome else {
        panic!("expected a fresh upload worker, got {outcome:?}");
    };
    assert_ne!(pid, bystander.id());
    assert!(bystander.try_wait().unwrap().is_none());

    // The new record identifies the new worker, so a second poll sees it running
    let recorded = liveness.read(Role::Upload).await.unwrap().unwrap();
    assert_eq!(recorded.pid, pid);
    assert!(recorded.is_current(control.as_ref()));
    assert_eq!(
        supervisor
            .launch_detached(Role::Upload, &invocation)
            .await
            .unwrap(),
        DetachedLaunch::AlreadyRunning { pid }
    );

    bystander.kill().unwrap();
    bystander.wait().unwrap();
}

#[test]
fn test_instance_lock_naming_recycled_pid_is_taken_over() {
    let temp_dir = TempDir::new().unwrap();
    let control = SysinfoProcessControl::new();
    let path = temp_dir.path().join("slotkeeper.lock");

    let mut bystander = unrelated_process();
    let record = stale_record(bystander.id(), &control);
    std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

    let lock = InstanceLock::acquire(&path, &control).unwrap();
    let holder = ProcessIdentity::parse(&std::fs::read_to_string(lock.path()).unwrap()).unwrap();
    assert_eq!(holder.pid, std::process::id());

    bystander.kill().unwrap();
    bystander.wait().unwrap();
}

#[test]
fn test_instance_lock_held_by_live_owner_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let control = SysinfoProcessControl::new();
    let path = temp_dir.path().join("slotkeeper.lock");

    let mut owner = unrelated_process();
    let identity = ProcessIdentity::observe(owner.id(), &control);
    std::fs::write(&path, serde_json::to_string(&identity).unwrap()).unwrap();

    let pid = owner.id();
    assert!(matches!(
        InstanceLock::acquire(&path, &control),
        Err(SupervisorError::InstanceLocked { pid: holder, .. }) if holder == pid
    ));

    owner.kill().unwrap();
    owner.wait().unwrap();
}
