//! Declarative helpers for implementing [`Finalize`](crate::Finalize).

/// Expands to a `guard_slot` method returning the named [`GuardSlot`](crate::GuardSlot) field.
///
/// Use it inside an `impl Finalize for ...` block.
///
/// # Examples
///
/// ```rust
/// use finalguard::{guard_slot, Action, Finalize, GuardSlot};
///
/// struct TempDir {
///     path: std::path::PathBuf,
///     cleanup: GuardSlot,
/// }
///
/// impl Finalize for TempDir {
///     fn cleanup_action(&self) -> Action {
///         let path = self.path.clone();
///         Box::new(move || {
///             let _ = std::fs::remove_dir_all(path);
///             Ok(())
///         })
///     }
///
///     guard_slot!(cleanup);
/// }
///
/// let dir = TempDir { path: "/nonexistent".into(), cleanup: GuardSlot::new() };
/// assert!(dir.guard_slot().is_some());
/// ```
#[macro_export]
macro_rules! guard_slot {
    ($field:ident) => {
        fn guard_slot(&self) -> ::core::option::Option<&$crate::GuardSlot> {
            ::core::option::Option::Some(&self.$field)
        }
    };
}
