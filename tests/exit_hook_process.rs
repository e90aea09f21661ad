//! The exit hook sweeping the global registry during real process teardown
//!
//! The test re-runs its own binary as a child. The child leaves a guarded
//! object alive when its test returns; the parent checks that the cleanup
//! ran after the harness finished, from the `atexit` callback.

use finalguard::{guard_slot, Action, ActionError, Binder, Finalize, GuardSlot};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

const JOURNAL_ENV: &str = "FINALGUARD_EXIT_JOURNAL";
const TEST_NAME: &str = "exit_hook_fires_survivors_at_process_exit";

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

/// A resource whose cleanup writes its label to a journal file.
struct JournaledResource {
    label: &'static str,
    journal: PathBuf,
    guard: GuardSlot,
}

impl Finalize for JournaledResource {
    fn cleanup_action(&self) -> Action {
        let journal = self.journal.clone();
        let label = self.label;
        Box::new(move || -> Result<(), ActionError> {
            append_line(&journal, label)?;
            Ok(())
        })
    }

    guard_slot!(guard);
}

fn run_child(journal: PathBuf) {
    let binder = Binder::global();
    let resource = |label| JournaledResource {
        label,
        journal: journal.clone(),
        guard: GuardSlot::new(),
    };

    let manual = binder.alloc(resource("manual")).unwrap();
    assert!(manual.finalize().unwrap());

    // Never reclaimed: only the exit sweep can run its cleanup.
    let survivor = binder.alloc(resource("survivor")).unwrap();
    std::mem::forget(survivor);

    append_line(&journal, "main returning").unwrap();
}

#[test]
fn exit_hook_fires_survivors_at_process_exit() {
    if let Some(journal) = std::env::var_os(JOURNAL_ENV) {
        run_child(PathBuf::from(journal));
        return;
    }

    let journal = std::env::temp_dir().join(format!(
        "finalguard-exit-{}-{}.log",
        std::process::id(),
        fastrand::u64(..)
    ));
    let _ = fs::remove_file(&journal);

    let status = Command::new(std::env::current_exe().unwrap())
        .args([TEST_NAME, "--exact", "--test-threads=1"])
        .env(JOURNAL_ENV, &journal)
        .status()
        .unwrap();
    let contents = fs::read_to_string(&journal).unwrap_or_default();
    let _ = fs::remove_file(&journal);

    assert!(status.success(), "child exited with {status}");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines, ["manual", "main returning", "survivor"]);
}
