//! # Signal Hub
//!
//! Process-wide fan-out of asynchronous Unix signals to any number of
//! handlers.
//!
//! The kernel keeps one disposition per signal. The hub installs a single
//! dispatch routine for every signal trapped through it and, on delivery,
//! calls each handler registered for that signal in registration order.
//!
//! ## Handler lists
//!
//! Each signal owns a slot holding a pointer to an immutable handler list.
//! Registering copies the current list, appends, and publishes the new list
//! with a release store; dispatch does an acquire load and walks whatever
//! list it sees. Published lists are never freed, so a dispatch that raced
//! with a registration still walks valid memory. Registrations happen during
//! setup only and are few, which keeps the retained lists small.
//!
//! ## Handler context
//!
//! Handlers run inside signal delivery. They must stick to
//! async-signal-safe work: atomics, `waitpid`, no locks, no allocation, no
//! logging.

use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::raw::c_int;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::error_handling::types::SignalError;

/// A callback run from signal context with the delivered signal number.
pub type SignalHandler = Arc<dyn Fn(c_int) + Send + Sync>;

/// Covers the classic and real-time signals on Linux.
const SIGNAL_SLOTS: usize = 65;

/// Registration seam used by the relay and the child-process reaper.
pub trait SignalTrap: Send + Sync {
    /// Adds `handler` to the list run when `signal` is delivered.
    fn trap(&self, signal: c_int, handler: SignalHandler) -> Result<(), SignalError>;

    /// Unblocks, for the calling thread, every signal trapped so far.
    ///
    /// Registration of all handlers a session needs must be complete before
    /// this is called.
    fn unblock_registered(&self) -> io::Result<()> {
        Ok(())
    }
}

struct TrapState {
    /// Every signal trapped so far; blocked while dispatch runs.
    mask: libc::sigset_t,
    /// Disposition in place before the first trap of each signal.
    previous: HashMap<c_int, libc::sighandler_t>,
}

struct Registry {
    slots: Vec<AtomicPtr<Vec<SignalHandler>>>,
    state: Mutex<TrapState>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    fn new() -> Self {
        // SAFETY: sigset_t is plain data; sigemptyset initialises it fully.
        let mask = unsafe {
            let mut mask: libc::sigset_t = mem::zeroed();
            libc::sigemptyset(&mut mask);
            mask
        };
        Self {
            slots: (0..SIGNAL_SLOTS)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            state: Mutex::new(TrapState {
                mask,
                previous: HashMap::new(),
            }),
        }
    }

    fn handlers(&self, signal: c_int) -> Option<&[SignalHandler]> {
        let slot = self.slots.get(usize::try_from(signal).ok()?)?;
        let list = slot.load(Ordering::Acquire);
        if list.is_null() {
            return None;
        }
        // SAFETY: a published list is never mutated or freed afterwards.
        Some(unsafe { &*list })
    }
}

extern "C" fn dispatch(signal: c_int) {
    let Some(registry) = REGISTRY.get() else {
        return;
    };
    if let Some(handlers) = registry.handlers(signal) {
        for handler in handlers {
            handler(signal);
        }
    }
}

/// Handle to the process-wide registry.
#[derive(Clone, Copy)]
pub struct SignalHub {
    registry: &'static Registry,
}

impl SignalHub {
    /// The hub shared by the whole process.
    pub fn process() -> Self {
        Self {
            registry: REGISTRY.get_or_init(Registry::new),
        }
    }

    /// Disposition `signal` had before the hub first trapped it.
    pub fn previous_disposition(&self, signal: c_int) -> Option<libc::sighandler_t> {
        let state = self.registry.state.lock().ok()?;
        state.previous.get(&signal).copied()
    }

    /// Number of handlers currently registered for `signal`.
    pub fn handler_count(&self, signal: c_int) -> usize {
        self.registry.handlers(signal).map_or(0, <[_]>::len)
    }
}

impl SignalTrap for SignalHub {
    fn trap(&self, signal: c_int, handler: SignalHandler) -> Result<(), SignalError> {
        if signal <= 0
            || signal as usize >= SIGNAL_SLOTS
            || signal == libc::SIGKILL
            || signal == libc::SIGSTOP
        {
            return Err(SignalError::InvalidSignal(signal));
        }

        let mut state = self
            .registry
            .state
            .lock()
            .map_err(|_| SignalError::RegistryPoisoned)?;

        let slot = &self.registry.slots[signal as usize];
        let mut next: Vec<SignalHandler> = self
            .registry
            .handlers(signal)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        next.push(handler);
        let count = next.len();

        let mut mask = state.mask;
        // SAFETY: `mask` is an initialised sigset_t and `signal` was range
        // checked above.
        unsafe {
            libc::sigaddset(&mut mask, signal);
        }

        // SAFETY: sigaction is plain data; every field the kernel reads is
        // set below or valid as zero.
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = dispatch as extern "C" fn(c_int) as libc::sighandler_t;
        action.sa_mask = mask;
        action.sa_flags = libc::SA_RESTART;

        // SAFETY: both pointers reference live, initialised sigaction values.
        let mut previous: libc::sigaction = unsafe { mem::zeroed() };
        let rc = unsafe { libc::sigaction(signal, &action, &mut previous) };
        if rc != 0 {
            return Err(SignalError::InstallFailed(signal, io::Error::last_os_error()));
        }

        // Published only once the kernel routes the signal to dispatch. The
        // superseded list stays allocated: a dispatch may still be walking it.
        slot.store(Box::into_raw(Box::new(next)), Ordering::Release);
        state.mask = mask;
        state.previous.entry(signal).or_insert(previous.sa_sigaction);

        debug!("Signal {} trapped, {} handler(s) registered", signal, count);
        Ok(())
    }

    fn unblock_registered(&self) -> io::Result<()> {
        let mask = {
            let state = self
                .registry
                .state
                .lock()
                .map_err(|_| io::Error::other(SignalError::RegistryPoisoned.to_string()))?;
            state.mask
        };
        // SAFETY: `mask` is an initialised sigset_t owned by this frame.
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_UNBLOCK, &mask, ptr::null_mut()) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(())
    }
}
