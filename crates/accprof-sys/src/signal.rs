//! Installing the fault/trap handlers and chaining to prior dispositions.
//!
//! | Platform | Protection fault | Single step |
//! |----------|------------------|-------------|
//! | Linux    | SIGSEGV          | SIGTRAP     |
//! | macOS    | SIGBUS / SIGSEGV | SIGTRAP     |
//!
//! Both fault signals are routed to the same handler on every platform.

use std::ffi::c_void;

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, raise, sigaction};

/// Signature of an `SA_SIGINFO` handler.
pub type SignalHandlerFn = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void);

/// The dispositions that were in place before our handlers were installed.
#[derive(Clone, Copy, Debug)]
pub struct SignalChain {
    segv: SigAction,
    bus: SigAction,
    trap: SigAction,
}

impl SignalChain {
    /// Install `fault` for SIGSEGV/SIGBUS and `trap` for SIGTRAP.
    ///
    /// Handlers run with `SA_ONSTACK` so that a chained stack-overflow
    /// handler still gets its alternate stack.
    ///
    /// # Safety
    ///
    /// The handlers must only perform async-signal-safe work.
    ///
    /// # Errors
    ///
    /// Returns the sigaction error. Any disposition already replaced is
    /// restored before returning.
    pub unsafe fn install(
        fault: SignalHandlerFn,
        trap: SignalHandlerFn,
    ) -> Result<Self, nix::Error> {
        let flags = SaFlags::SA_SIGINFO | SaFlags::SA_RESTART | SaFlags::SA_ONSTACK;
        let fault_action = SigAction::new(SigHandler::SigAction(fault), flags, SigSet::empty());
        let trap_action = SigAction::new(SigHandler::SigAction(trap), flags, SigSet::empty());

        unsafe {
            let segv = sigaction(Signal::SIGSEGV, &fault_action)?;
            let bus = match sigaction(Signal::SIGBUS, &fault_action) {
                Ok(prev) => prev,
                Err(e) => {
                    let _ = sigaction(Signal::SIGSEGV, &segv);
                    return Err(e);
                }
            };
            let trap = match sigaction(Signal::SIGTRAP, &trap_action) {
                Ok(prev) => prev,
                Err(e) => {
                    let _ = sigaction(Signal::SIGSEGV, &segv);
                    let _ = sigaction(Signal::SIGBUS, &bus);
                    return Err(e);
                }
            };
            Ok(Self { segv, bus, trap })
        }
    }

    const fn previous(&self, signal: Signal) -> Option<&SigAction> {
        match signal {
            Signal::SIGSEGV => Some(&self.segv),
            Signal::SIGBUS => Some(&self.bus),
            Signal::SIGTRAP => Some(&self.trap),
            _ => None,
        }
    }

    /// Hand a signal we do not own to the disposition that preceded us.
    ///
    /// A previous handler is called directly. A previous default or ignore
    /// disposition is reset to the default: a faulting instruction then
    /// re-executes and terminates the process as if no handler had been
    /// installed, and a trap (which does not re-execute) is raised again.
    ///
    /// # Safety
    ///
    /// Must be called from the signal handler that received `signum`, with
    /// the `info`/`context` pointers it was given.
    pub unsafe fn forward(
        &self,
        signum: libc::c_int,
        info: *mut libc::siginfo_t,
        context: *mut c_void,
    ) {
        let Ok(signal) = Signal::try_from(signum) else {
            return;
        };
        let Some(previous) = self.previous(signal) else {
            return;
        };

        match previous.handler() {
            SigHandler::SigAction(f) => f(signum, info, context),
            SigHandler::Handler(f) => f(signum),
            SigHandler::SigDfl | SigHandler::SigIgn => {
                let default =
                    SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
                unsafe {
                    let _ = sigaction(signal, &default);
                }
                if signal == Signal::SIGTRAP {
                    let _ = raise(signal);
                }
            }
        }
    }
}
