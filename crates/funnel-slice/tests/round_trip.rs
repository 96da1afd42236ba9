//! Round-trip law for canonical slice keys.
//!
//! For any fetch-relevant constraint set, re-parsing its canonical key and
//! rebuilding yields the same key, and shuffling clause order never changes
//! the key.

use chrono::NaiveDate;
use funnel_slice::{
    build_slice_key, parse_constraints, CohortSpec, ContextPair, DateRange, FetchParts,
};
use proptest::prelude::*;

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 9).unwrap()
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,7}"
}

fn context_pair() -> impl Strategy<Value = ContextPair> {
    (ident(), proptest::option::of(ident())).prop_map(|(key, value)| ContextPair { key, value })
}

fn date_range() -> impl Strategy<Value = DateRange> {
    (0i64..2000, 0i64..120).prop_map(|(offset, len)| {
        let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let start = base + chrono::Duration::days(offset);
        DateRange::new(start, start + chrono::Duration::days(len)).unwrap()
    })
}

fn fetch_parts() -> impl Strategy<Value = FetchParts> {
    (
        proptest::option::of(date_range()),
        any::<bool>(),
        proptest::option::of(ident()),
        proptest::collection::vec(context_pair(), 0..4),
        proptest::collection::vec(proptest::collection::vec(context_pair(), 1..3), 0..3),
    )
        .prop_map(|(range, cohort_mode, anchor, context, context_any)| {
            let (window, cohort) = match (range, cohort_mode) {
                (Some(range), true) => (None, Some(CohortSpec { anchor, range })),
                (range, _) => (range, None),
            };
            FetchParts {
                window,
                cohort,
                context,
                context_any,
            }
        })
}

proptest! {
    #[test]
    fn build_parse_build_is_identity(parts in fetch_parts()) {
        let key = build_slice_key(&parts);
        let reparsed = parse_constraints(&key, reference()).unwrap();
        prop_assert_eq!(build_slice_key(&reparsed.fetch), key);
    }

    #[test]
    fn clause_order_does_not_matter(parts in fetch_parts()) {
        let key = build_slice_key(&parts);

        let mut reversed = parts.clone();
        reversed.context.reverse();
        reversed.context_any.reverse();
        for group in &mut reversed.context_any {
            group.reverse();
        }
        prop_assert_eq!(build_slice_key(&reversed), key.clone());

        let shuffled: Vec<&str> = key.split(").").collect();
        if shuffled.len() > 1 {
            let mut clauses: Vec<String> = shuffled
                .iter()
                .map(|c| if c.ends_with(')') { (*c).to_string() } else { format!("{c})") })
                .collect();
            clauses.reverse();
            let reparsed = parse_constraints(&clauses.join("."), reference()).unwrap();
            prop_assert_eq!(build_slice_key(&reparsed.fetch), key);
        }
    }
}

#[test]
fn relative_and_absolute_forms_agree() {
    let relative = parse_constraints("window(-30d:-1d).context(channel:google)", reference())
        .unwrap();
    let absolute =
        parse_constraints("context(channel:google).window(9-Nov-25:8-Dec-25)", reference())
            .unwrap();
    assert_eq!(
        build_slice_key(&relative.fetch),
        build_slice_key(&absolute.fetch)
    );
}
