//! Resize notification
//!
//! The SIGWINCH handler only stores `true` into an atomic flag. The screen
//! swaps the flag back to `false` on its next `size()` call and re-probes.
//! Where no resize signal exists the input reader marks the flag when the
//! terminal library reports a resize key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "geometry dirty" flag.
#[derive(Clone, Debug, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the cached geometry as stale.
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    #[cfg(unix)]
    fn inner(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Installed resize handler; unregistered on `uninstall` or drop.
#[derive(Debug)]
pub struct ResizeNotifier {
    #[cfg(unix)]
    id: Option<signal_hook::SigId>,
}

impl ResizeNotifier {
    /// Register the SIGWINCH handler for `flag`.
    #[cfg(unix)]
    pub fn install(flag: &ResizeFlag) -> std::io::Result<Self> {
        let id = signal_hook::flag::register(signal_hook::consts::SIGWINCH, flag.inner())?;
        tracing::debug!("resize handler registered");
        Ok(Self { id: Some(id) })
    }

    /// No resize signal on this platform; resize keys drive the flag instead.
    #[cfg(not(unix))]
    pub fn install(_flag: &ResizeFlag) -> std::io::Result<Self> {
        tracing::debug!("no resize signal, relying on resize key events");
        Ok(Self {})
    }

    pub fn uninstall(&mut self) {
        #[cfg(unix)]
        if let Some(id) = self.id.take() {
            signal_hook::low_level::unregister(id);
            tracing::debug!("resize handler unregistered");
        }
    }
}

impl Drop for ResizeNotifier {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears_flag_once() {
        let flag = ResizeFlag::new();
        assert!(!flag.take());
        flag.mark();
        flag.mark();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = ResizeFlag::new();
        let other = flag.clone();
        other.mark();
        assert!(flag.is_set());
    }

    #[cfg(unix)]
    #[test]
    fn test_sigwinch_sets_flag() {
        let flag = ResizeFlag::new();
        let mut notifier = ResizeNotifier::install(&flag).unwrap();
        signal_hook::low_level::raise(signal_hook::consts::SIGWINCH).unwrap();
        assert!(flag.take());
        notifier.uninstall();
    }
}
