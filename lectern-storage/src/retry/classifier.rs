//! Transient-error classification.
//!
//! Only errors the store driver explicitly marks with a transient SQLSTATE
//! class are retried. Missing rows never are, and anything without a
//! structured code (cancellation, decode failures, pool errors) fails fast so
//! programming errors do not masquerade as infrastructure flakiness.

use crate::context::ContextError;

/// SQLSTATE class prefixes that identify transient failures.
pub const TRANSIENT_SQLSTATE_CLASSES: [&str; 5] = [
    TransientClass::ConnectionException.code(),
    TransientClass::TransactionRollback.code(),
    TransientClass::InsufficientResources.code(),
    TransientClass::ObjectNotInPrerequisiteState.code(),
    TransientClass::OperatorIntervention.code(),
];

/// Capability of an error to report what the store driver said about it.
///
/// Implemented once per backing store; the classifier never sees concrete
/// driver types.
pub trait DriverError {
    /// The five-character SQLSTATE code, if the driver attached one.
    fn sql_state(&self) -> Option<&str>;

    /// Whether this is the "row not found" outcome.
    fn is_not_found(&self) -> bool {
        false
    }
}

/// An absent error is never retryable.
impl<E: DriverError> DriverError for Option<E> {
    fn sql_state(&self) -> Option<&str> {
        self.as_ref().and_then(|err| err.sql_state())
    }

    fn is_not_found(&self) -> bool {
        self.as_ref().is_some_and(|err| err.is_not_found())
    }
}

impl DriverError for ContextError {
    fn sql_state(&self) -> Option<&str> {
        None
    }
}

/// SQLSTATE classes treated as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientClass {
    /// `08`: connection exception
    ConnectionException,
    /// `40`: transaction rollback (deadlock, serialization failure)
    TransactionRollback,
    /// `53`: insufficient resources
    InsufficientResources,
    /// `55`: object not in prerequisite state
    ObjectNotInPrerequisiteState,
    /// `57`: operator intervention (admin shutdown, crash recovery)
    OperatorIntervention,
}

impl TransientClass {
    /// The two-character SQLSTATE class prefix.
    pub const fn code(&self) -> &'static str {
        match self {
            TransientClass::ConnectionException => "08",
            TransientClass::TransactionRollback => "40",
            TransientClass::InsufficientResources => "53",
            TransientClass::ObjectNotInPrerequisiteState => "55",
            TransientClass::OperatorIntervention => "57",
        }
    }

    /// Look up a class from its two-character prefix.
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "08" => Some(TransientClass::ConnectionException),
            "40" => Some(TransientClass::TransactionRollback),
            "53" => Some(TransientClass::InsufficientResources),
            "55" => Some(TransientClass::ObjectNotInPrerequisiteState),
            "57" => Some(TransientClass::OperatorIntervention),
            _ => None,
        }
    }
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A retry might succeed.
    Transient(TransientClass),
    /// Retrying cannot help.
    Permanent,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient(_))
    }
}

/// Extract the class prefix (first two characters) of a SQLSTATE code.
///
/// Returns `None` for codes that are too short.
pub fn sqlstate_class(code: &str) -> Option<&str> {
    code.get(..2)
}

/// Classify a driver error.
pub fn classify<E: DriverError + ?Sized>(err: &E) -> ErrorClass {
    if err.is_not_found() {
        return ErrorClass::Permanent;
    }

    err.sql_state()
        .and_then(sqlstate_class)
        .and_then(TransientClass::from_class)
        .map_or(ErrorClass::Permanent, ErrorClass::Transient)
}

/// Whether a retry of the failed operation might succeed.
pub fn is_transient<E: DriverError + ?Sized>(err: &E) -> bool {
    classify(err).is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Coded {
        code: Option<&'static str>,
        not_found: bool,
    }

    impl Coded {
        fn code(code: &'static str) -> Self {
            Self {
                code: Some(code),
                not_found: false,
            }
        }
    }

    impl DriverError for Coded {
        fn sql_state(&self) -> Option<&str> {
            self.code
        }

        fn is_not_found(&self) -> bool {
            self.not_found
        }
    }

    #[test]
    fn test_each_transient_class_is_retryable() {
        for code in ["08006", "40001", "40P01", "53300", "55P03", "57P01"] {
            assert!(is_transient(&Coded::code(code)), "{code} should be transient");
        }
    }

    #[test]
    fn test_class_mapping() {
        assert_eq!(
            classify(&Coded::code("08001")),
            ErrorClass::Transient(TransientClass::ConnectionException)
        );
        assert_eq!(
            classify(&Coded::code("40P01")),
            ErrorClass::Transient(TransientClass::TransactionRollback)
        );
        assert_eq!(
            classify(&Coded::code("57014")),
            ErrorClass::Transient(TransientClass::OperatorIntervention)
        );
    }

    #[test]
    fn test_permanent_classes() {
        // unique violation, syntax error, undefined table, data exception
        for code in ["23505", "42601", "42P01", "22P02"] {
            assert!(!is_transient(&Coded::code(code)), "{code} should be permanent");
        }
    }

    #[test]
    fn test_not_found_is_never_retryable() {
        let err = Coded {
            code: Some("08006"),
            not_found: true,
        };
        assert_eq!(classify(&err), ErrorClass::Permanent);
    }

    #[test]
    fn test_missing_code_is_permanent() {
        let err = Coded {
            code: None,
            not_found: false,
        };
        assert!(!is_transient(&err));
    }

    #[test]
    fn test_short_or_odd_codes_do_not_panic() {
        assert!(!is_transient(&Coded::code("")));
        assert!(!is_transient(&Coded::code("0")));
        assert!(!is_transient(&Coded::code("é8")));
        assert!(is_transient(&Coded::code("08")));
    }

    #[test]
    fn test_context_errors_are_permanent() {
        assert!(!is_transient(&ContextError::Cancelled));
        assert!(!is_transient(&ContextError::DeadlineExceeded));
    }

    #[test]
    fn test_absent_error_is_not_retryable() {
        let none: Option<Coded> = None;
        assert!(!is_transient(&none));
        assert!(is_transient(&Some(Coded::code("53100"))));
    }

    #[test]
    fn test_allow_list_matches_enum() {
        for class in TRANSIENT_SQLSTATE_CLASSES {
            let parsed = TransientClass::from_class(class).unwrap();
            assert_eq!(parsed.code(), class);
        }
    }
}
