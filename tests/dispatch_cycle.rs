use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use kennel::dog::{DogManager, DogState, SessionController, SessionError, StartOptions};
use kennel::mail::{Mailbox, Message, MessageType, Router};
use kennel::pending;
use kennel::plugin::{Recorder, Scanner};
use kennel::scheduler::{Scheduler, SchedulerOptions};

/// Session controller that keeps live sessions in memory.
#[derive(Clone, Default)]
struct MemorySessions {
    live: Arc<Mutex<HashSet<String>>>,
}

impl MemorySessions {
    fn kill(&self, dog: &str) {
        self.live.lock().unwrap().remove(dog);
    }
}

impl SessionController for MemorySessions {
    fn start(&self, dog: &str, _options: &StartOptions) -> Result<(), SessionError> {
        if !self.live.lock().unwrap().insert(dog.to_string()) {
            return Err(SessionError::AlreadyRunning {
                dog: dog.to_string(),
            });
        }
        Ok(())
    }

    fn is_running(&self, dog: &str) -> Result<bool, SessionError> {
        Ok(self.live.lock().unwrap().contains(dog))
    }
}

fn plugin(town: &Path, rel: &str, body: &str) {
    let dir = town.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("plugin.md"), body).unwrap();
}

/// Controller whose probes always fail, so stuck-repair never touches a dog.
#[derive(Clone, Copy)]
struct UnprobeableSessions;

impl SessionController for UnprobeableSessions {
    fn start(&self, _dog: &str, _options: &StartOptions) -> Result<(), SessionError> {
        Ok(())
    }

    fn is_running(&self, dog: &str) -> Result<bool, SessionError> {
        Err(SessionError::Probe {
            dog: dog.to_string(),
            message: "still starting".into(),
        })
    }
}

fn scheduler<S: SessionController>(town: &Path, sessions: S, rigs: &[String]) -> Scheduler<S> {
    Scheduler::new(
        DogManager::new(town),
        sessions,
        Scanner::new(town, rigs),
        Recorder::new(town),
        Router::new(town),
        SchedulerOptions::default(),
    )
}

#[test]
fn fleet_converges_over_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let town = dir.path();
    let dogs = DogManager::new(town);
    dogs.provision(&["alpha".into(), "bravo".into()]).unwrap();

    plugin(town, "plugins/rotate", "+++\n[gate]\ntype = \"cooldown\"\nduration = \"1h\"\n+++\nRotate logs.");
    plugin(town, "plugins/sweep", "Sweep temp files.");
    plugin(town, "gastown/plugins/compact", "Compact the rig database.");

    let sessions = MemorySessions::default();
    let sched = scheduler(town, sessions.clone(), &["gastown".into()]);

    // Two dogs, three plugins: the third waits.
    let first = sched.run_cycle();
    assert_eq!(first.discovered, 3);
    assert_eq!(first.dispatched, 2);
    assert_eq!(first.deferred, 1);

    // alpha finished and its session went away.
    sessions.kill("alpha");
    let second = sched.run_cycle();
    assert_eq!(second.repaired, 1);
    // rotate is cooling down; sweep has no gate and goes again to the free dog.
    assert_eq!(second.gated, 1);
    assert_eq!(second.dispatched, 1);

    let works: Vec<Option<String>> = dogs
        .list()
        .unwrap()
        .into_iter()
        .map(|d| d.work().map(str::to_string))
        .collect();
    assert_eq!(
        works,
        vec![Some("plugin:sweep".to_string()), Some("plugin:sweep".to_string())]
    );

    let mail = Mailbox::new(town.join("mail/dog/alpha")).list().unwrap();
    let subjects: Vec<&str> = mail.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Plugin: rotate", "Plugin: sweep"]);
    assert!(mail.iter().all(|m| m.msg_type == MessageType::Task));
}

#[test]
fn racing_schedulers_never_double_assign() {
    let dir = tempfile::tempdir().unwrap();
    let town = dir.path().to_path_buf();
    DogManager::new(&town).add("alpha").unwrap();
    for name in ["a", "b", "c", "d"] {
        plugin(&town, &format!("plugins/{name}"), name);
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let town = town.clone();
            thread::spawn(move || scheduler(&town, UnprobeableSessions, &[]).run_cycle())
        })
        .collect();
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let dispatched: usize = reports.iter().map(|r| r.dispatched).sum();
    assert_eq!(dispatched, 1);
    let alpha = DogManager::new(&town).get("alpha").unwrap();
    assert_eq!(alpha.state(), DogState::Working);
    assert_eq!(
        Mailbox::new(town.join("mail/dog/alpha")).count().unwrap(),
        1
    );
}

#[test]
fn spawn_notifications_clear_once_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let router = Router::new(dir.path());
    router
        .send(&Message::new(
            "gastown/witness",
            "mayor",
            "POLECAT_STARTED gastown/Toast",
            "Session: gt-gastown-polecat-Toast\nIssue: gt-abc123",
        ))
        .unwrap();

    let mailbox = router.mailbox("mayor").unwrap();
    let seen_by_a = pending::scan_for_spawns(&mailbox).unwrap();
    let seen_by_b = pending::scan_for_spawns(&router.mailbox("mayor").unwrap()).unwrap();

    let a = pending::clear_pending_spawn(&seen_by_a, "gt-gastown-polecat-Toast").unwrap();
    let b = pending::clear_pending_spawn(&seen_by_b, "gt-gastown-polecat-Toast").unwrap();
    assert_eq!(a + b, 1);
    assert!(pending::scan_for_spawns(&mailbox).unwrap().is_empty());
    assert_eq!(mailbox.list_archived().unwrap().len(), 1);
}
