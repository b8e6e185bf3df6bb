//! Unit tests for runtime errors

use core_types::{ErrorKind, InvalidAssumption, Node, RuntimeError, Value};

mod error_kind_tests {
    use super::*;

    #[test]
    fn test_error_kind_variants() {
        let _not_that_many = ErrorKind::NotThatManyFrames;
        let _invalid_argument = ErrorKind::InvalidArgument;
        let _invalid_mode = ErrorKind::InvalidMode;
        let _must_be_environ = ErrorKind::MustBeEnviron;
        let _recursive_promise = ErrorKind::RecursivePromise;
        let _invalid_call = ErrorKind::InvalidCall;
        let _interrupted = ErrorKind::Interrupted;
        let _io = ErrorKind::Io;
        let _internal = ErrorKind::Internal;
    }
}

mod error_construction_tests {
    use super::*;

    #[test]
    fn test_not_that_many_frames_message() {
        let err = RuntimeError::not_that_many_frames();
        assert_eq!(err.kind, ErrorKind::NotThatManyFrames);
        assert!(err.call.is_none());
    }

    #[test]
    fn test_call_attachment_changes_display() {
        let err = RuntimeError::invalid_argument("which");
        let plain = err.to_string();
        let with_call = err
            .with_call(Node::call_named(
                "sys.frame",
                vec![Node::arg(Node::constant(Value::Int(9)))],
            ))
            .to_string();
        assert!(plain.starts_with("Error: "));
        assert!(with_call.starts_with("Error in sys.frame(9): "));
    }

    #[test]
    fn test_invalid_assumption_is_not_a_runtime_error() {
        // The invalidation signal is a distinct type, caught at read sites.
        let signal = InvalidAssumption;
        assert_eq!(signal.to_string(), "assumption invalidated");
    }
}
