//! Interrupt masking for the main context
//!
//! The event dispatcher runs in interrupt context and shares the host frame
//! queue and the transmit slot table with the dispatch loop. Every
//! read-then-act sequence in the loop runs inside a [`CriticalSection`].

/// Interrupt mask of the target
pub trait InterruptControl {
    /// Mask interrupts, returning whether they were enabled before
    fn disable(&mut self) -> bool;

    /// Restore the enable state returned by [`disable`](Self::disable)
    fn restore(&mut self, was_enabled: bool);

    /// Enable or disable the controller's external interrupt line
    fn set_controller_irq(&mut self, enabled: bool);
}

/// Interrupts stay masked while this guard is alive
pub struct CriticalSection<'a, I: InterruptControl> {
    control: &'a mut I,
    was_enabled: bool,
}

impl<'a, I: InterruptControl> CriticalSection<'a, I> {
    pub fn enter(control: &'a mut I) -> Self {
        let was_enabled = control.disable();
        Self {
            control,
            was_enabled,
        }
    }
}

impl<I: InterruptControl> Drop for CriticalSection<'_, I> {
    fn drop(&mut self) {
        self.control.restore(self.was_enabled);
    }
}
