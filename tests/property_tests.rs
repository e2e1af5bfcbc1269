//! Property-based tests for the size arithmetic behind cutting, batching and QC.

use garment_erp::services::allocation::{
    add_each, distribute_proportionally, resolve_request, subtract_each, sum, validate_within,
    AllocationError, MoveRequest, SizeQuantity,
};
use proptest::prelude::*;

const SIZE_NAMES: [&str; 6] = ["XS", "S", "M", "L", "XL", "XXL"];

/// One to six distinct sizes with what each still has left
fn ceilings_strategy() -> impl Strategy<Value = Vec<SizeQuantity>> {
    prop::collection::vec(0i32..500, 1..=SIZE_NAMES.len()).prop_map(|quantities| {
        quantities
            .into_iter()
            .zip(SIZE_NAMES)
            .map(|(q, size)| SizeQuantity::new(size, q))
            .collect()
    })
}

/// Ceilings plus a total that fits inside them
fn ceilings_and_total() -> impl Strategy<Value = (Vec<SizeQuantity>, i32)> {
    ceilings_strategy()
        .prop_filter("needs something left", |c| sum(c) > 0)
        .prop_flat_map(|ceilings| {
            let available = sum(&ceilings);
            (Just(ceilings), 1..=available)
        })
}

/// Ceilings plus a per-size request no larger than each ceiling
fn ceilings_and_request() -> impl Strategy<Value = (Vec<SizeQuantity>, Vec<SizeQuantity>)> {
    ceilings_strategy().prop_flat_map(|ceilings| {
        let picks: Vec<_> = ceilings
            .iter()
            .map(|c| (0..=c.quantity, any::<bool>()))
            .collect();
        (Just(ceilings), picks)
    })
    .prop_map(|(ceilings, picks)| {
        let request = ceilings
            .iter()
            .zip(picks)
            .filter(|(_, (_, keep))| *keep)
            .map(|(c, (q, _))| SizeQuantity::new(c.size.to_lowercase(), q))
            .collect();
        (ceilings, request)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn proportional_split_moves_exactly_the_total((ceilings, total) in ceilings_and_total()) {
        let split = distribute_proportionally(total, &ceilings).unwrap();
        prop_assert_eq!(split.len(), ceilings.len());
        prop_assert_eq!(sum(&split), total);
        for (share, ceiling) in split.iter().zip(&ceilings) {
            prop_assert_eq!(&share.size, &ceiling.size);
            prop_assert!(share.quantity >= 0);
            prop_assert!(share.quantity <= ceiling.quantity);
        }
    }

    #[test]
    fn proportional_split_stays_within_one_piece_of_the_exact_share(
        (ceilings, total) in ceilings_and_total()
    ) {
        let available = i64::from(sum(&ceilings));
        let split = distribute_proportionally(total, &ceilings).unwrap();
        for (share, ceiling) in split.iter().zip(&ceilings) {
            // |share - total * cap / available| < 1, scaled by `available`
            let scaled = i64::from(share.quantity) * available;
            let exact = i64::from(total) * i64::from(ceiling.quantity);
            prop_assert!((scaled - exact).abs() < available);
        }
    }

    #[test]
    fn totals_beyond_what_is_left_are_refused(ceilings in ceilings_strategy(), extra in 1i32..100) {
        let total = sum(&ceilings) + extra;
        let refused = distribute_proportionally(total, &ceilings);
        prop_assert!(
            matches!(
                refused,
                Err(AllocationError::ExceedsRemaining { .. }) | Err(AllocationError::NothingRemaining)
            ),
            "unexpected result: {:?}",
            refused
        );
    }

    #[test]
    fn requests_within_the_ceilings_are_accepted_as_is(
        (ceilings, request) in ceilings_and_request()
    ) {
        let accepted = validate_within(&request, &ceilings).unwrap();
        prop_assert_eq!(accepted.len(), request.len());
        prop_assert_eq!(sum(&accepted), sum(&request));
        // the ceiling's spelling wins
        for row in &accepted {
            prop_assert!(ceilings.iter().any(|c| c.size == row.size));
        }
    }

    #[test]
    fn one_piece_too_many_is_refused(ceilings in ceilings_strategy(), pick in any::<prop::sample::Index>()) {
        let target = &ceilings[pick.index(ceilings.len())];
        let request = vec![SizeQuantity::new(target.size.clone(), target.quantity + 1)];
        let refused = validate_within(&request, &ceilings);
        prop_assert!(
            matches!(refused, Err(AllocationError::ExceedsRemaining { .. })),
            "unexpected result: {:?}",
            refused
        );
    }

    #[test]
    fn resolved_total_moves_only_non_zero_sizes((ceilings, total) in ceilings_and_total()) {
        let moved = resolve_request(&MoveRequest::Total(total), &ceilings).unwrap();
        prop_assert_eq!(sum(&moved), total);
        prop_assert!(moved.iter().all(|s| s.quantity > 0));
    }

    #[test]
    fn adding_then_subtracting_restores_the_base(
        (base, extra) in ceilings_and_request()
    ) {
        let grown = add_each(&base, &extra);
        prop_assert_eq!(sum(&grown), sum(&base) + sum(&extra));
        prop_assert_eq!(subtract_each(&grown, &extra), base);
    }
}

#[test]
fn unknown_sizes_are_named_in_the_error() {
    let ceilings = vec![SizeQuantity::new("S", 4), SizeQuantity::new("M", 4)];
    let request = vec![SizeQuantity::new(" XL ", 1)];
    assert_eq!(
        validate_within(&request, &ceilings),
        Err(AllocationError::UnknownSize("XL".to_string()))
    );
}

#[test]
fn zero_total_is_an_empty_move() {
    let ceilings = vec![SizeQuantity::new("S", 4)];
    assert_eq!(
        resolve_request(&MoveRequest::Total(0), &ceilings),
        Err(AllocationError::EmptyRequest)
    );
}
