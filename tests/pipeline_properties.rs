use std::cell::Cell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_data_stream::processing::{Comparator, Filter, Mapper, SortBy};
use rust_data_stream::{Producer, Stream, StreamError, StreamOptions, StreamResult, Value};

type Chain = fn(Stream) -> StreamResult<Stream>;

const INPUT: [i64; 10] = [3, 6, 2, 5, 1, 4, 6, 3, 3, 9];

fn stream(values: &[i64], optimize: bool) -> Stream {
    let options = StreamOptions {
        optimize,
        ..Default::default()
    };
    Stream::with_options(Producer::from_values(values.to_vec()), options)
}

fn pairs(values: &[i64], optimize: bool, chain: Chain) -> Vec<(Value, Value)> {
    chain(stream(values, optimize)).unwrap().to_pairs().unwrap()
}

fn ints(values: &[Value]) -> Vec<i64> {
    values.iter().filter_map(Value::as_i64).collect()
}

fn random(n: usize) -> Vec<i64> {
    let mut rng = StdRng::seed_from_u64(0x2545_F491);
    (0..n).map(|_| rng.random_range(0..100_000)).collect()
}

#[test]
fn fused_and_unfused_chains_agree() {
    let chains: &[(&str, Chain)] = &[
        ("limit.limit", |s| s.limit(5)?.limit(3)),
        ("tail.tail", |s| s.tail(4)?.tail(2)),
        ("skip.skip", |s| s.skip(2)?.skip(3)),
        ("reverse.reverse", |s| s.reverse()?.reverse()),
        ("flip.flip", |s| s.flip()?.flip()),
        ("reindex.reindex", |s| s.reindex(10, 2)?.reindex(0, 3)),
        ("reverse.sort", |s| s.reverse()?.sort(Comparator::by_value())),
        ("sort.reverse", |s| s.sort(Comparator::by_value())?.reverse()),
        ("sort.limit", |s| s.sort(Comparator::by_value())?.limit(4)),
        ("sort.limit.reverse", |s| s.sort(Comparator::by_value().reversed())?.limit(4)?.reverse()),
        ("sort.reverse.limit", |s| s.sort(Comparator::by_value())?.reverse()?.limit(4)),
        ("sort_limited.limit", |s| s.sort_limited(6, Comparator::by_value())?.limit(2)),
        ("map_key.map", |s| s.map_key(Mapper::UseValue)?.map(Mapper::UseKey)),
        ("map.map_key", |s| s.map(Mapper::UseKey)?.map_key(Mapper::UseValue)),
        ("filter.filter", |s| {
            s.filter(Filter::value(|v| v.as_i64().is_some_and(|x| x > 2)))?
                .filter(Filter::key(|k| k.as_i64().is_some_and(|x| x % 2 == 0)))
        }),
        ("filter(always)", |s| s.filter(Filter::always())),
    ];
    for &(name, chain) in chains {
        for input in [&INPUT[..], &[][..], &[7][..]] {
            assert_eq!(
                pairs(input, true, chain),
                pairs(input, false, chain),
                "chain {name} on {input:?}"
            );
        }
    }
}

fn outcome(values: &[i64], optimize: bool, chain: Chain) -> Result<Vec<(Value, Value)>, String> {
    chain(stream(values, optimize))
        .and_then(Stream::to_pairs)
        .map_err(|err| err.to_string())
}

fn fails_on_three() -> Filter {
    Filter::try_value(|v| match v.as_i64() {
        Some(3) => Err(StreamError::failed("three")),
        _ => Ok(true),
    })
}

#[test]
fn fusion_keeps_errors_of_fallible_stages() {
    let chains: &[(&str, Chain)] = &[
        ("fallible.never", |s| s.filter(fails_on_three())?.filter(Filter::never())),
        ("fallible.always", |s| s.filter(fails_on_three())?.filter(Filter::always())),
        ("never.fallible", |s| s.filter(Filter::never())?.filter(fails_on_three())),
        ("fallible.fallible", |s| s.filter(fails_on_three())?.filter(fails_on_three())),
        ("fallible.sort.limit", |s| {
            s.filter(fails_on_three())?.sort(Comparator::by_value())?.limit(2)
        }),
    ];
    for &(name, chain) in chains {
        for input in [&[1, 3, 5][..], &[1, 5][..]] {
            let fused = outcome(input, true, chain);
            assert_eq!(fused, outcome(input, false, chain), "chain {name} on {input:?}");
        }
    }
    assert_eq!(
        outcome(&[1, 3, 5], true, |s| s.filter(fails_on_three())?.filter(Filter::never())),
        Err(StreamError::failed("three").to_string())
    );
}

#[test]
fn shuffle_before_sort_is_irrelevant() {
    let sorted = stream(&[3, 6, 2, 5, 1, 4], true)
        .sort(Comparator::by_value())
        .unwrap()
        .to_list()
        .unwrap();
    for seed in 0..20 {
        for optimize in [true, false] {
            let out = stream(&[3, 6, 2, 5, 1, 4], optimize)
                .shuffle_seeded(seed)
                .unwrap()
                .sort(Comparator::by_value())
                .unwrap()
                .to_list()
                .unwrap();
            assert_eq!(out, sorted);
        }
    }
}

#[test]
fn cancelling_pairs_reproduce_the_input() {
    for input in [&INPUT[..], &[][..]] {
        let original = stream(input, false).to_pairs().unwrap();
        for optimize in [true, false] {
            assert_eq!(pairs(input, optimize, |s| s.reverse()?.reverse()), original);
            assert_eq!(pairs(input, optimize, |s| s.flip()?.flip()), original);
        }
    }
}

#[test]
fn limit_takes_the_smaller_bound() {
    for (a, b) in [(5, 3), (3, 5), (0, 4), (4, 4)] {
        let chained = stream(&INPUT, true).limit(a).unwrap().limit(b).unwrap().to_list().unwrap();
        let direct = stream(&INPUT, false).limit(a.min(b)).unwrap().to_list().unwrap();
        assert_eq!(chained, direct);
    }
}

#[test]
fn limit_zero_never_pulls() {
    let pulls = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&pulls);
    let producer = Producer::from_fn(move || {
        counter.set(counter.get() + 1);
        Some(Ok((Value::Null, Value::Int64(1))))
    });
    let out = Stream::new(producer).limit(0).unwrap().to_list().unwrap();
    assert!(out.is_empty());
    assert_eq!(pulls.get(), 0);
}

#[test]
fn limit_stops_pulling_once_satisfied() {
    let pulls = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&pulls);
    let producer = Producer::from_fn(move || {
        counter.set(counter.get() + 1);
        Some(Ok((Value::Null, Value::from(counter.get()))))
    });
    let out = Stream::new(producer).limit(3).unwrap().to_list().unwrap();
    assert_eq!(ints(&out), vec![1, 2, 3]);
    assert_eq!(pulls.get(), 3);
}

#[test]
fn top_k_matches_full_sort_and_compares_less() {
    let input = random(10_000);

    let counted = |calls: Rc<Cell<usize>>| {
        Comparator::custom(SortBy::Value, move |a, b| {
            calls.set(calls.get() + 1);
            a.compare(b)
        })
    };

    let sort_calls = Rc::new(Cell::new(0));
    let full = stream(&input, false)
        .sort(counted(Rc::clone(&sort_calls)))
        .unwrap()
        .limit(3)
        .unwrap()
        .to_list()
        .unwrap();

    let top_calls = Rc::new(Cell::new(0));
    let fused = stream(&input, true)
        .sort(counted(Rc::clone(&top_calls)))
        .unwrap()
        .limit(3)
        .unwrap();
    assert_eq!(fused.describe().unwrap(), vec!["sort_limited"]);
    let top = fused.to_list().unwrap();

    assert_eq!(top, full);
    let mut expected = input.clone();
    expected.sort_unstable();
    assert_eq!(ints(&top), expected[..3].to_vec());

    // Heap of 3: one comparison against the root per rejected element, a few per admission.
    assert!(top_calls.get() <= input.len() * 5, "top-k made {} comparisons", top_calls.get());
    assert!(top_calls.get() * 4 < sort_calls.get());
}

#[test]
fn best_and_worst_agree_with_sort_limit() {
    let input = random(500);
    for n in [0, 1, 7, 500, 600] {
        let best = stream(&input, true).best(n).unwrap().to_pairs().unwrap();
        let expected = stream(&input, false)
            .sort(Comparator::by_value().reversed())
            .unwrap()
            .limit(n)
            .unwrap()
            .to_pairs()
            .unwrap();
        assert_eq!(best, expected, "best({n})");

        let worst = stream(&input, true).worst(n).unwrap().to_pairs().unwrap();
        let expected = stream(&input, false)
            .sort(Comparator::by_value())
            .unwrap()
            .limit(n)
            .unwrap()
            .to_pairs()
            .unwrap();
        assert_eq!(worst, expected, "worst({n})");
    }
}

#[test]
fn segregate_keeps_first_seen_order_and_indices() {
    let buckets = Stream::from_values(vec![4, 2, 3, 1, 4, 2])
        .segregate(None)
        .unwrap()
        .to_list()
        .unwrap();
    let entry = |k: i64, v: i64| (Value::Int64(k), Value::Int64(v));
    assert_eq!(
        buckets,
        vec![
            Value::Map(vec![entry(0, 4), entry(4, 4)]),
            Value::Map(vec![entry(1, 2), entry(5, 2)]),
            Value::Map(vec![entry(2, 3)]),
            Value::Map(vec![entry(3, 1)]),
        ]
    );
}

#[test]
fn running_twice_is_a_structural_error() {
    let s = Stream::from_values(vec![1, 2, 3]);
    s.run().unwrap();
    let err = s.run().unwrap_err();
    assert!(matches!(err, StreamError::AlreadyExecuted { .. }));
}

#[test]
fn appending_after_a_terminal_fails() {
    let s = Stream::from_values(vec![1]);
    let _out = s.clone().count().unwrap();
    assert!(matches!(s.limit(1), Err(StreamError::PipeFrozen { operation: "limit" })));
}

#[test]
fn read_many_with_count_from_the_trigger() {
    let header = Filter::value(|v| v.as_i64().is_some_and(|x| x < 0));
    let count = Mapper::value(|v| Value::Int64(v.as_i64().map_or(0, i64::abs)));
    let out = Stream::from_values(vec![-2, 10, 11, -1, 20, -3, 30])
        .read_many(Some(header), count)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(
        out,
        vec![
            Value::List(vec![Value::Int64(10), Value::Int64(11)]),
            Value::List(vec![Value::Int64(20)]),
            Value::List(vec![Value::Int64(30)]),
        ]
    );
}

#[test]
fn window_emits_overlapping_slices() {
    let out = Stream::from_values(vec![1, 2, 3, 4, 5])
        .window(3, 1, false)
        .unwrap()
        .to_list()
        .unwrap();
    let list = |xs: &[i64]| Value::List(xs.iter().copied().map(Value::Int64).collect());
    assert_eq!(out, vec![list(&[1, 2, 3]), list(&[2, 3, 4]), list(&[3, 4, 5])]);
}
