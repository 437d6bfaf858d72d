/// Anything that can be initialized with a `const` value.
///
/// Used to build fixed arrays of non-`Copy` containers, such as the
/// segregated allocator's per-bin page lists.
pub(crate) trait ConstInit {
    /// The `const` default initializer value for `Self`.
    const INIT: Self;
}
