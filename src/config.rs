//! Configuration for the host heap and the global binder.

/// How reclaim notifications reach observers once an object becomes unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorMode {
    /// Deliver on the thread that dropped the last strong handle.
    #[default]
    Inline,
    /// Queue until [`Heap::collect`](crate::heap::Heap::collect) is called.
    Deferred,
    /// Hand off to a dedicated collector thread.
    Background,
}

/// Finalization runtime configuration.
///
/// # Examples
///
/// ```
/// use finalguard::{CollectorMode, FinalizeConfig};
///
/// let default_config = FinalizeConfig::default();
/// assert_eq!(default_config.collector_mode, CollectorMode::Inline);
/// assert!(default_config.install_exit_hook);
///
/// let custom = FinalizeConfig {
///     collector_mode: CollectorMode::Background,
///     notification_capacity: 64,
///     ..FinalizeConfig::default()
/// };
/// assert_eq!(custom.notification_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct FinalizeConfig {
    pub collector_mode: CollectorMode,
    /// Consulted by [`Binder::global`](crate::Binder::global).
    pub install_exit_hook: bool,
    pub collector_thread_name: String,
    /// Bounded channel size between mutators and the background collector.
    pub notification_capacity: usize,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            collector_mode: CollectorMode::Inline,
            install_exit_hook: true,
            collector_thread_name: "finalguard-collector".to_string(),
            notification_capacity: 1024,
        }
    }
}
