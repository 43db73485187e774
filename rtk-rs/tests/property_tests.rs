use proptest::prelude::*;
use rtk::decode::{format_list, list_element, parse_int, parse_list};
use rtk::{quote, Config, Session};

proptest! {
    /// List parsing never panics on arbitrary input; it returns Ok or Err.
    #[test]
    fn list_parser_does_not_panic(s in "\\PC*") {
        let _ = parse_list(&s);
    }

    /// Integer decoding accepts everything Rust prints for an i64.
    #[test]
    fn parse_int_reads_formatted_ints(n in any::<i64>()) {
        prop_assert_eq!(parse_int(&n.to_string()).unwrap(), n);
    }

    /// Hex results decode to the same value.
    #[test]
    fn parse_int_reads_hex(n in 0i64..=i64::MAX) {
        prop_assert_eq!(parse_int(&format!("0x{n:x}")).unwrap(), n);
    }
}

proptest! {
    /// A quoted element reads back as exactly one item, unchanged.
    #[test]
    fn list_element_survives_parsing(s in "[ -~\t\n]{0,24}") {
        let items = parse_list(&list_element(&s)).unwrap();
        prop_assert_eq!(items, vec![s]);
    }

    /// Whole lists keep their length and contents.
    #[test]
    fn format_list_survives_parsing(v in prop::collection::vec("[ -~]{0,12}", 0..8)) {
        let parsed = parse_list(&format_list(&v)).unwrap();
        prop_assert_eq!(parsed, v);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Text passed through a quoted option reaches the interpreter intact.
    #[test]
    fn quoted_text_is_evaluated_verbatim(s in "[ -~\n]{0,32}") {
        let session = Session::headless(Config::default()).unwrap();
        let result = session.eval(&format!("set x \"{}\"", quote(&s))).unwrap();
        prop_assert_eq!(result, s);
    }
}
