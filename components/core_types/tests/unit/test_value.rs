//! Unit tests for the Value enum

use core_types::{is_na_real, na_real, Value, LOGICAL_NA, LOGICAL_TRUE, NA_INT};

mod value_creation_tests {
    use super::*;

    #[test]
    fn test_value_null() {
        let val = Value::Null;
        assert!(matches!(val, Value::Null));
    }

    #[test]
    fn test_value_missing_and_unbound() {
        assert!(matches!(Value::Missing, Value::Missing));
        assert!(matches!(Value::Unbound, Value::Unbound));
    }

    #[test]
    fn test_value_logical() {
        assert!(matches!(Value::logical(true), Value::Logical(LOGICAL_TRUE)));
        assert!(matches!(Value::Logical(LOGICAL_NA), Value::Logical(LOGICAL_NA)));
    }

    #[test]
    fn test_value_int_na_sentinel() {
        let val = Value::Int(NA_INT);
        assert!(matches!(val, Value::Int(i) if i == i32::MIN));
    }

    #[test]
    fn test_value_double_na_bit_pattern() {
        let Value::Double(d) = Value::Double(na_real()) else {
            panic!("expected double");
        };
        assert!(is_na_real(d));
        assert!(d.is_nan());
    }

    #[test]
    fn test_value_complex() {
        let val = Value::Complex(1.0, -2.0);
        assert!(matches!(val, Value::Complex(re, im) if re == 1.0 && im == -2.0));
    }

    #[test]
    fn test_value_string_na() {
        assert!(matches!(Value::Str(None), Value::Str(None)));
        assert!(matches!(Value::string("abc"), Value::Str(Some(_))));
    }
}

mod value_display_tests {
    use super::*;

    #[test]
    fn test_display_na_values() {
        assert_eq!(Value::Int(NA_INT).to_string(), "NA");
        assert_eq!(Value::Double(na_real()).to_string(), "NA");
        assert_eq!(Value::Logical(LOGICAL_NA).to_string(), "NA");
        assert_eq!(Value::Str(None).to_string(), "NA");
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::logical(false).to_string(), "FALSE");
        assert_eq!(Value::string("hi").to_string(), "\"hi\"");
    }
}

mod value_type_tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "NULL");
        assert_eq!(Value::Int(1).type_name(), "integer");
        assert_eq!(Value::Double(1.0).type_name(), "double");
        assert_eq!(Value::string("x").type_name(), "character");
        assert_eq!(Value::Symbol("x".into()).type_name(), "symbol");
    }
}
