use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use log::{debug, info};

use crate::error_handling::types::ProcessError;
use crate::signal_hub::SignalTrap;

/// Exit state of a spawned child, written from signal context.
#[derive(Debug, Default)]
pub struct ChildStatus {
    pid: AtomicI32,
    code: AtomicI32,
    reaped: AtomicBool,
}

impl ChildStatus {
    /// Collects the child if it has terminated. Never blocks, and only
    /// touches atomics and `waitpid`, so it is safe from a signal handler.
    pub fn try_reap(&self) {
        let pid = self.pid.load(Ordering::Acquire);
        if pid <= 0 || self.reaped.load(Ordering::Acquire) {
            return;
        }
        let mut status: libc::c_int = 0;
        // SAFETY: `status` is a valid out-pointer; WNOHANG keeps the call
        // from blocking.
        let rc = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if rc != pid {
            return;
        }
        let code = if libc::WIFEXITED(status) {
            libc::WEXITSTATUS(status)
        } else if libc::WIFSIGNALED(status) {
            128 + libc::WTERMSIG(status)
        } else {
            -1
        };
        self.code.store(code, Ordering::Release);
        self.reaped.store(true, Ordering::Release);
    }

    pub fn exit_code(&self) -> Option<i32> {
        if self.reaped.load(Ordering::Acquire) {
            Some(self.code.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

/// Handle on the R side program.
///
/// The relay never waits on the child; it is reaped asynchronously when
/// SIGCHLD arrives and its status is read back afterwards.
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    program: String,
    status: Arc<ChildStatus>,
}

impl ChildProcess {
    /// Spawns `argv` with the reaper already registered, so an immediate
    /// exit is still collected.
    ///
    /// Descriptors opened by this process are close-on-exec and do not
    /// leak into the child.
    pub fn spawn(argv: &[String], signals: &dyn SignalTrap) -> Result<Self, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

        let status = Arc::new(ChildStatus::default());
        let reaper = Arc::clone(&status);
        signals.trap(libc::SIGCHLD, Arc::new(move |_| reaper.try_reap()))?;

        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(program.clone(), e))?;
        let pid = child.id();
        // Dropping `child` neither kills nor waits on it.
        drop(child);

        status.pid.store(pid as i32, Ordering::Release);
        // SIGCHLD may have fired before the pid was published.
        status.try_reap();

        info!("Started {} (pid {}) with args {:?}", program, pid, args);
        Ok(Self {
            pid,
            program: program.clone(),
            status,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit code once the child has been reaped; signals map to
    /// `128 + signo`.
    pub fn exit_status(&self) -> Option<i32> {
        self.status.try_reap();
        let code = self.status.exit_code();
        debug!("Child {} status: {:?}", self.pid, code);
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::SignalError;
    use crate::signal_hub::{SignalHandler, SignalHub};
    use serial_test::serial;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn wait_for_exit(child: &ChildProcess) -> Option<i32> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(code) = child.exit_status() {
                return Some(code);
            }
            thread::sleep(Duration::from_millis(20));
        }
        None
    }

    /// Records registrations without touching process dispositions.
    #[derive(Default)]
    struct RecordingTrap {
        trapped: Mutex<Vec<libc::c_int>>,
    }

    impl SignalTrap for RecordingTrap {
        fn trap(&self, signal: libc::c_int, _handler: SignalHandler) -> Result<(), SignalError> {
            self.trapped.lock().unwrap().push(signal);
            Ok(())
        }
    }

    struct FailingTrap;

    impl SignalTrap for FailingTrap {
        fn trap(&self, signal: libc::c_int, _handler: SignalHandler) -> Result<(), SignalError> {
            Err(SignalError::InvalidSignal(signal))
        }
    }

    #[test]
    #[serial]
    fn test_exit_code_collected() {
        let hub = SignalHub::process();
        let child = ChildProcess::spawn(&argv(&["sh", "-c", "exit 3"]), &hub).unwrap();
        assert!(child.pid() > 0);
        assert_eq!(child.program(), "sh");
        assert_eq!(wait_for_exit(&child), Some(3));
    }

    #[test]
    #[serial]
    fn test_signal_death_maps_above_128() {
        let hub = SignalHub::process();
        let child = ChildProcess::spawn(&argv(&["sh", "-c", "kill -9 $$"]), &hub).unwrap();
        assert_eq!(wait_for_exit(&child), Some(128 + libc::SIGKILL));
    }

    #[test]
    #[serial]
    fn test_reaper_registered_for_sigchld() {
        let trap = RecordingTrap::default();
        let child = ChildProcess::spawn(&argv(&["true"]), &trap).unwrap();
        assert_eq!(*trap.trapped.lock().unwrap(), vec![libc::SIGCHLD]);
        // Without the hub, polling still collects the child.
        assert_eq!(wait_for_exit(&child), Some(0));
    }

    #[test]
    #[serial]
    fn test_spawn_failures() {
        let hub = SignalHub::process();
        assert!(matches!(
            ChildProcess::spawn(&[], &hub),
            Err(ProcessError::EmptyCommand)
        ));
        assert!(matches!(
            ChildProcess::spawn(&argv(&["/nonexistent/ntee-child"]), &hub),
            Err(ProcessError::SpawnFailed(_, _))
        ));
        assert!(matches!(
            ChildProcess::spawn(&argv(&["true"]), &FailingTrap),
            Err(ProcessError::SignalError(_))
        ));
    }
}
