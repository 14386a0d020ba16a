//! Loading and live reload of the configuration roots.

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use controller_config::config::keys::{CONTROLLER_MONITOR_PORT, CONTROLLER_PORT};
use controller_config::config::{load_group, GroupKind, PrecedenceChain, ProcessProperties, PropertySource};
use controller_config::probe::{FailureKind, MonitorProbe, PortSource, ProbeSettings};
use controller_config::watch::{ReloadCoordinator, WatchdogState};

mod common;

use common::{eventually, SlowConnector, TempRoots};

const POLL: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(3);

#[test]
fn test_later_source_wins_per_key() {
    let roots = TempRoots::new();
    let base = roots.write("a.conf", "controller.port=1\ncontroller.monitor_port=2\ncontroller.ip=10.0.0.1\n");
    let over = roots.write("b.conf", "controller.port = 10\n");

    let chain = PrecedenceChain::new()
        .then(PropertySource::File(base))
        .then(PropertySource::File(over))
        .then(PropertySource::File(roots.home().join("missing.conf")));
    let group = load_group(GroupKind::Controller, &chain).unwrap();

    assert_eq!(group.get(CONTROLLER_PORT), Some("10"));
    assert_eq!(group.get(CONTROLLER_MONITOR_PORT), Some("2"));
    assert_eq!(group.get("controller.ip"), Some("10.0.0.1"));
}

#[test]
fn test_extended_override_is_dropped_on_next_reload() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=100\n");
    roots.write("ex/system-ex.conf", "controller.port=200\n");
    let registry = roots.registry();
    assert_eq!(registry.controller_port(), Ok(200));

    roots.remove("ex/system-ex.conf");
    assert_eq!(registry.controller_port(), Ok(200));

    registry.reload_settings().unwrap();
    assert_eq!(registry.controller_port(), Ok(100));
}

#[test]
fn test_process_properties_win_over_every_file() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=100\n");
    roots.write("ex/system-ex.conf", "controller.port=200\n");
    let registry = roots.registry_with(ProcessProperties::new().with("controller.port", "300"));
    assert_eq!(registry.controller_port(), Ok(300));
}

#[test]
fn test_readers_never_see_torn_settings() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=1\ncontroller.monitor_port=1\n");
    let registry = roots.registry();
    let stop = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let stop = stop.clone();
            let observed = observed.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let settings = registry.settings();
                    assert_eq!(
                        settings.controller.get(CONTROLLER_PORT),
                        settings.controller.get(CONTROLLER_MONITOR_PORT)
                    );
                    observed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let target = roots.home().join("system.conf");
    let staging = roots.home().join("system.conf.tmp");
    for n in 2..60 {
        fs::write(&staging, format!("controller.port={n}\ncontroller.monitor_port={n}\n")).unwrap();
        fs::rename(&staging, &target).unwrap();
        registry.reload_settings().unwrap();
    }

    stop.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(observed.load(Ordering::Relaxed) > 0);
    assert_eq!(registry.controller_port(), Ok(59));
}

#[test]
fn test_deleted_announcement_reads_empty() {
    let roots = TempRoots::new();
    roots.write("home/announcement.conf", "Maintenance at noon");
    let registry = roots.registry();

    let announcement = registry.announcement();
    assert_eq!(announcement.text, "Maintenance at noon");
    assert!(announcement.modified.is_some());

    roots.remove("home/announcement.conf");
    registry.reload_announcement();
    let announcement = registry.announcement();
    assert_eq!(announcement.text, "");
    assert!(announcement.modified.is_none());
}

#[tokio::test]
async fn test_settings_change_reloads_and_notifies_listeners() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=100\n");
    let registry = roots.registry();

    let seen = Arc::new(Mutex::new(Vec::new()));
    registry.add_settings_listener(|_| Err("listener failure".into()));
    let s = seen.clone();
    registry.add_settings_listener(move |settings| {
        s.lock().unwrap().push(settings.controller.get_port(CONTROLLER_PORT)?);
        Ok(())
    });

    let coordinator = ReloadCoordinator::start(registry.clone(), POLL);
    roots.write_changed("home/system.conf", "controller.port=101\n", 10);

    assert!(eventually(WAIT, || !seen.lock().unwrap().is_empty()).await);
    assert_eq!(*seen.lock().unwrap(), vec![101]);
    assert_eq!(registry.controller_port(), Ok(101));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_broken_settings_change_keeps_previous_snapshot() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=100\n");
    let registry = roots.registry();

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    registry.add_settings_listener(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let coordinator = ReloadCoordinator::start(registry.clone(), POLL);
    roots.write_changed("home/system.conf", "controller.port=\\u10\n", 10);
    tokio::time::sleep(POLL * 10).await;
    assert_eq!(registry.controller_port(), Ok(100));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The broken change is not retried, the next distinct change is applied.
    roots.write_changed("home/system.conf", "controller.port=102\n", 20);
    assert!(eventually(WAIT, || registry.controller_port() == Ok(102)).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_announcement_and_policy_reactions() {
    let roots = TempRoots::new();
    let registry = roots.registry();
    assert!(registry.announcement().is_empty());
    let default_policy = registry.policy_script();

    let coordinator = ReloadCoordinator::start(registry.clone(), POLL);

    roots.write_changed("home/announcement.conf", "New release", 10);
    assert!(eventually(WAIT, || registry.announcement().text == "New release").await);

    roots.write_changed("home/process_and_thread_policy.js", "function getProcessCount() { return 4; }", 10);
    assert!(eventually(WAIT, || registry.policy_script() != default_policy).await);
    assert!(registry.policy_script().contains("return 4"));

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_no_reload_after_shutdown() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=100\n");
    let registry = roots.registry();

    let coordinator = ReloadCoordinator::start(registry.clone(), POLL);
    assert!(coordinator
        .states()
        .iter()
        .all(|(_, state)| *state == WatchdogState::Running));
    coordinator.shutdown().await;

    roots.write_changed("home/system.conf", "controller.port=103\n", 10);
    tokio::time::sleep(POLL * 10).await;
    assert_eq!(registry.controller_port(), Ok(100));
}

#[tokio::test]
async fn test_probe_meets_deadline_while_listener_is_slow() {
    let roots = TempRoots::new();
    roots.write("home/system.conf", "controller.port=100\n");
    let registry = roots.registry();

    let entered = Arc::new(AtomicBool::new(false));
    let e = entered.clone();
    registry.add_settings_listener(move |_| {
        e.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1500));
        Ok(())
    });

    let coordinator = ReloadCoordinator::start(registry.clone(), POLL);
    roots.write_changed("home/system.conf", "controller.port=104\n", 10);
    assert!(eventually(WAIT, || entered.load(Ordering::SeqCst)).await);

    let probe = MonitorProbe::new(
        SlowConnector,
        PortSource::Registry(registry.clone()),
        ProbeSettings {
            workers: 2,
            deadline: Duration::from_millis(200),
        },
    );
    let started = Instant::now();
    let result = probe.status("10.1.1.1").await;

    assert_eq!(result.outcome.unwrap_err().kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_millis(700));
    assert_eq!(registry.controller_port(), Ok(104));

    coordinator.shutdown().await;
}
