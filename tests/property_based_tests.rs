use megasampler::expr::Expr;
use megasampler::interval::Interval;
use megasampler::oracle::ConcreteModel;
use megasampler::strengthen::strengthen;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Generate an arbitrary ordered bound pair
fn bound_pair() -> impl Strategy<Value = (i64, i64)> {
    (any::<i64>(), any::<i64>()).prop_map(|(a, b)| (a.min(b), a.max(b)))
}

proptest! {
    /// Tightening commutes with order: the result is always
    /// [max of lows, min of highs]
    #[test]
    fn prop_interval_tightening_is_order_independent(
        bounds in prop::collection::vec((any::<i64>(), any::<bool>()), 1..8)
    ) {
        let mut forward = Interval::top();
        for (bound, is_lower) in &bounds {
            if *is_lower {
                forward.set_lower_bound(*bound);
            } else {
                forward.set_upper_bound(*bound);
            }
        }
        let mut backward = Interval::top();
        for (bound, is_lower) in bounds.iter().rev() {
            if *is_lower {
                backward.set_lower_bound(*bound);
            } else {
                backward.set_upper_bound(*bound);
            }
        }
        prop_assert_eq!(forward, backward);

        let expected_low = bounds
            .iter()
            .filter(|(_, is_lower)| *is_lower)
            .map(|(b, _)| *b)
            .max()
            .unwrap_or(i64::MIN);
        let expected_high = bounds
            .iter()
            .filter(|(_, is_lower)| !*is_lower)
            .map(|(b, _)| *b)
            .min()
            .unwrap_or(i64::MAX);
        prop_assert_eq!(forward.low(), expected_low);
        prop_assert_eq!(forward.high(), expected_high);
    }

    /// Draws always land inside the interval, for any endpoints
    /// including the i64 extremes standing for infinity
    #[test]
    fn prop_random_in_range_membership((low, high) in bound_pair(), seed in any::<u64>()) {
        let interval = Interval::new(low, high);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..16 {
            let value = interval.random_in_range(&mut rng);
            prop_assert!(interval.is_in_range(value));
        }
    }

    /// Strengthening x + y <= c distributes the whole slack: the upper
    /// bounds sum back to exactly c
    #[test]
    fn prop_add_slack_is_fully_distributed(
        x in -1000i64..1000,
        y in -1000i64..1000,
        slack in 0i64..1000,
    ) {
        let rhs = x + y + slack;
        let xe = Expr::int_var("x");
        let ye = Expr::int_var("y");
        let literal = Expr::le(Expr::add(vec![xe.clone(), ye.clone()]), Expr::Int(rhs));
        let mut seed = ConcreteModel::new();
        seed.ints.insert("x".to_string(), x);
        seed.ints.insert("y".to_string(), y);
        let outcome = strengthen(&[literal], &seed);
        prop_assert_eq!(outcome.skipped, 0);
        let xi = outcome.map.get(&xe).unwrap();
        let yi = outcome.map.get(&ye).unwrap();
        prop_assert_eq!(xi.high() + yi.high(), rhs);
        // the seed point itself stays inside the box
        prop_assert!(xi.is_in_range(x));
        prop_assert!(yi.is_in_range(y));
    }

    /// Every point of the strengthened box of a two-sided bound satisfies
    /// the original literals
    #[test]
    fn prop_strengthened_box_is_sound(
        low in -100i64..100,
        width in 0i64..100,
        seed_offset in 0i64..100,
    ) {
        let high = low + width;
        let point = low + seed_offset.min(width);
        let x = Expr::int_var("x");
        let literals = vec![
            Expr::ge(x.clone(), Expr::Int(low)),
            Expr::le(x.clone(), Expr::Int(high)),
        ];
        let mut seed = ConcreteModel::new();
        seed.ints.insert("x".to_string(), point);
        let outcome = strengthen(&literals, &seed);
        let interval = outcome.map.get(&x).unwrap();
        prop_assert_eq!((interval.low(), interval.high()), (low, high));
    }
}
