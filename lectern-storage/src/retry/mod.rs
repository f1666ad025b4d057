//! Retry machinery: transient-error classification and the backoff loop.

pub mod classifier;
pub mod executor;

pub use classifier::{
    classify, is_transient, sqlstate_class, DriverError, ErrorClass, TransientClass,
    TRANSIENT_SQLSTATE_CLASSES,
};
pub use executor::{retry_with_backoff, Classifier};
