//! Property tests for semicolon stripping.
//!
//! Key invariant: whatever is sent to the database contains no `;`, and
//! every other character survives in its original order.

use proptest::prelude::*;
use sqlgate_core::{strip_semicolons, QueryRequest};

proptest! {
    #[test]
    fn output_never_contains_semicolons(sql in ".*") {
        let out = strip_semicolons(&sql);
        prop_assert!(!out.contains(';'));
    }

    #[test]
    fn other_characters_keep_their_order(sql in "[a-zA-Z0-9 ;'$(),*]{0,64}") {
        let expected: String = sql.chars().filter(|c| *c != ';').collect();
        prop_assert_eq!(strip_semicolons(&sql).into_owned(), expected);
    }

    #[test]
    fn input_without_semicolons_is_untouched(sql in "[^;]*") {
        prop_assert_eq!(strip_semicolons(&sql).into_owned(), sql.clone());
    }

    #[test]
    fn sanitized_request_sql_has_no_semicolons(sql in "[a-zA-Z ;]*[a-zA-Z][a-zA-Z ;]*") {
        let req = QueryRequest::new(sql, vec![], "all");
        let out = req.sanitized_sql().unwrap();
        prop_assert!(!out.contains(';'));
    }
}
