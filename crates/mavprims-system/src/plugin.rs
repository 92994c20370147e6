use crate::system::SystemCore;

/// A capability layered on one system.
///
/// `init` runs when the plugin is added, `enable` whenever the system is
/// discovered or reconnects, `disable` on connection loss, and
/// `disable` + `deinit` when the system shuts down. None of these are
/// called with an engine or registry lock held.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Register handlers and timeouts on `system`.
    fn init(&self, system: &SystemCore);

    /// Remove everything `init` registered.
    fn deinit(&self, system: &SystemCore);

    fn enable(&self) {}

    fn disable(&self) {}
}
