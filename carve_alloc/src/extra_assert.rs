//! Assertions that only fire under the `extra_assertions` feature.
//!
//! The checks behind these macros walk whole containers or whole payloads,
//! far too expensive to leave on unconditionally. The argument expressions
//! are still type-checked when the feature is off; the `cfg!` test folds
//! the branch away so they are never evaluated.

macro_rules! extra_assert {
    ( $( $tokens:tt )+ ) => {
        if cfg!(feature = "extra_assertions") {
            assert!( $( $tokens )+ );
        }
    };
}

macro_rules! extra_assert_eq {
    ( $( $tokens:tt )+ ) => {
        if cfg!(feature = "extra_assertions") {
            assert_eq!( $( $tokens )+ );
        }
    };
}

/// Define a function that only has a body when the `extra_assertions`
/// feature is enabled. Without the feature it becomes an empty
/// `#[inline(always)]` shim that disappears from the final artifact, so
/// call sites need no `cfg` of their own.
macro_rules! extra_only {
    (
        fn $name:ident ( $( $arg:ident : $arg_ty:ty ),* $(,)? ) {
            $( $body:tt )*
        }
    ) => {
        #[cfg(feature = "extra_assertions")]
        fn $name ( $( $arg : $arg_ty ),* ) {
            $( $body )*
        }

        #[cfg(not(feature = "extra_assertions"))]
        #[inline(always)]
        #[allow(dead_code)]
        fn $name ( $( $arg : $arg_ty ),* ) {
            $( let _ = $arg; )*
        }
    };
}
