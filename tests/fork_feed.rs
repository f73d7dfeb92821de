use rust_data_stream::processing::{reduce, Comparator, Filter, Mapper};
use rust_data_stream::{ErrorAction, ErrorPolicy, Outcome, Stream, StreamError, StreamResult, Value};

const INPUT: [i64; 6] = [5, 2, 7, 9, 2, 3];

type Terminal = fn(Stream) -> StreamResult<Outcome>;

fn even() -> Filter {
    Filter::value(|v| v.as_i64().is_some_and(|x| x % 2 == 0))
}

fn fails_on_seven() -> Mapper {
    Mapper::try_value(|v| match v.as_i64() {
        Some(7) => Err(StreamError::failed("seven")),
        _ => Ok(v.clone()),
    })
}

fn evens_only(pairs: Vec<(Value, Value)>, evens: &[i64]) {
    let list = Value::List(evens.iter().copied().map(Value::Int64).collect());
    assert_eq!(pairs, vec![(Value::Bool(true), list)]);
}

fn double() -> Mapper {
    Mapper::value(|v| Value::Int64(v.as_i64().unwrap_or(0) * 2))
}

fn independent(bucket: bool, terminal: Terminal) -> Value {
    let filter = if bucket { even() } else { even().negate() };
    let s = Stream::from_values(INPUT).filter(filter).unwrap();
    terminal(s).unwrap().get().unwrap()
}

#[test]
fn fork_children_match_independent_runs() {
    let terminals: &[(&str, Terminal)] = &[
        ("collect", |s| s.collect()),
        ("collect_pairs", |s| s.collect_pairs()),
        ("count", |s| s.count()),
        ("sum", |s| s.reduce(reduce::sum())),
        ("first", |s| s.first()),
        ("last", |s| s.last()),
        ("best", |s| s.best(1)?.collect()),
    ];
    for &(name, terminal) in terminals {
        let prototype = terminal(Stream::empty()).unwrap();
        let out = Stream::from_values(INPUT)
            .fork(Mapper::from(even()), prototype)
            .unwrap()
            .to_pairs()
            .unwrap();
        // Buckets appear in first-seen order: 5 is odd.
        assert_eq!(
            out,
            vec![
                (Value::Bool(false), independent(false, terminal)),
                (Value::Bool(true), independent(true, terminal)),
            ],
            "terminal {name}"
        );
    }
}

#[test]
fn fork_match_drives_caller_children() {
    let evens = Stream::empty().sort(Comparator::by_value().reversed()).unwrap().collect().unwrap();
    let odds = Stream::empty().reduce(reduce::sum()).unwrap();
    let out = Stream::from_values(INPUT)
        .fork_match(
            Mapper::from(even()),
            vec![
                (Value::Bool(true), evens.stream().clone()),
                (Value::Bool(false), odds.stream().clone()),
            ],
        )
        .unwrap()
        .to_pairs()
        .unwrap();

    let sorted_evens = Value::List(vec![Value::Int64(2), Value::Int64(2)]);
    assert_eq!(evens.get().unwrap(), sorted_evens);
    assert_eq!(odds.get().unwrap(), Value::Int64(24));
    assert_eq!(
        out,
        vec![(Value::Bool(true), sorted_evens), (Value::Bool(false), Value::Int64(24))]
    );
}

#[test]
fn nested_forks_route_independently() {
    let by_size = Mapper::from(Filter::value(|v| v.as_i64().is_some_and(|x| x > 4)));
    let inner = Stream::empty()
        .fork(by_size, Stream::empty().count().unwrap())
        .unwrap()
        .collect_pairs()
        .unwrap();
    let out = Stream::from_values(INPUT)
        .fork(Mapper::from(even()), inner)
        .unwrap()
        .collect_pairs()
        .unwrap()
        .get()
        .unwrap();
    let counts = |entries: &[(bool, i64)]| {
        Value::Map(entries.iter().map(|&(b, n)| (Value::Bool(b), Value::Int64(n))).collect())
    };
    assert_eq!(
        out,
        Value::Map(vec![
            (Value::Bool(false), counts(&[(true, 3), (false, 1)])),
            (Value::Bool(true), counts(&[(false, 2)])),
        ])
    );
}

#[test]
fn self_feed_doubles_until_the_bound() {
    let s = Stream::from_values(vec![1]);
    let out = s
        .clone()
        .map(double())
        .unwrap()
        .filter(Filter::value(|v| v.as_i64().is_some_and(|x| x <= 64)))
        .unwrap()
        .feed(std::slice::from_ref(&s))
        .unwrap()
        .to_list()
        .unwrap();
    let expected: Vec<Value> = [2, 4, 8, 16, 32, 64].into_iter().map(Value::Int64).collect();
    assert_eq!(out, expected);
}

#[test]
fn fed_stream_finishes_after_its_last_feeder() {
    let sink = Stream::empty();
    let left = Stream::from_values(vec![1, 2, 3]).feed(std::slice::from_ref(&sink)).unwrap();
    let right = Stream::from_values(vec![10, 20]).feed(std::slice::from_ref(&sink)).unwrap();
    let collected = sink.clone().map(double()).unwrap().collect().unwrap();

    assert_eq!(left.drain().unwrap().get().unwrap(), Value::Int64(3));
    assert!(!collected.is_ready());
    right.run().unwrap();
    assert!(collected.is_ready());

    let expected: Vec<Value> = [2, 4, 6, 20, 40].into_iter().map(Value::Int64).collect();
    assert_eq!(collected.get().unwrap(), Value::List(expected));
}

#[test]
fn indirect_cycles_are_rejected() {
    let a = Stream::empty();
    let b = Stream::empty();
    let c = Stream::empty();
    let b = b.feed(std::slice::from_ref(&c)).unwrap();
    let a = a.feed(std::slice::from_ref(&b)).unwrap();
    let err = c.feed(std::slice::from_ref(&a)).unwrap_err();
    assert!(matches!(err, StreamError::Loop { .. }));

    let err = b.fork(Mapper::constant(0), a).unwrap_err();
    assert!(matches!(err, StreamError::Loop { .. }));
}

#[test]
fn feeding_a_finished_stream_fails() {
    let done = Stream::from_values(vec![1]);
    done.run().unwrap();
    let err = Stream::from_values(vec![2]).feed(&[done]).unwrap_err();
    assert!(matches!(err, StreamError::FeedAfterTermination { .. }));
}

#[test]
fn child_failure_aborts_the_parent() {
    let failing = Stream::empty()
        .map(Mapper::try_value(|v| match v.as_i64() {
            Some(7) => Err(StreamError::failed("seven")),
            _ => Ok(v.clone()),
        }))
        .unwrap();
    let err = Stream::from_values(INPUT)
        .fork(Mapper::from(even()), failing)
        .unwrap()
        .to_list()
        .unwrap_err();
    assert!(matches!(err, StreamError::Failed { .. }));
}

#[test]
fn skip_keeps_healthy_children_when_one_fails_at_the_end() {
    let prototype = Stream::empty().reverse().unwrap().map(fails_on_seven()).unwrap();
    let parent = Stream::from_values(INPUT)
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .fork(Mapper::from(even()), prototype)
        .unwrap();
    let metrics = parent.metrics().unwrap();
    evens_only(parent.to_pairs().unwrap(), &[2, 2]);
    assert_eq!(metrics.snapshot().errors_skipped, 1);
}

#[test]
fn skip_stops_routing_to_a_failed_child() {
    let prototype = Stream::empty().map(fails_on_seven()).unwrap();
    let parent = Stream::from_values(INPUT)
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .fork(Mapper::from(even()), prototype)
        .unwrap();
    let metrics = parent.metrics().unwrap();
    evens_only(parent.to_pairs().unwrap(), &[2, 2]);
    assert_eq!(metrics.snapshot().errors_skipped, 1);
}

#[test]
fn stop_flushes_the_healthy_children() {
    let stop = || ErrorPolicy::custom(|_| ErrorAction::Stop);

    let prototype = Stream::empty().map(fails_on_seven()).unwrap();
    let out = Stream::from_values(INPUT)
        .on_error(stop())
        .unwrap()
        .fork(Mapper::from(even()), prototype)
        .unwrap()
        .to_pairs()
        .unwrap();
    evens_only(out, &[2]);

    let prototype = Stream::empty().reverse().unwrap().map(fails_on_seven()).unwrap();
    let out = Stream::from_values(INPUT)
        .on_error(stop())
        .unwrap()
        .fork(Mapper::from(even()), prototype)
        .unwrap()
        .to_pairs()
        .unwrap();
    evens_only(out, &[2, 2]);
}

#[test]
fn feed_skips_a_failed_target() {
    let sink = Stream::empty().map(fails_on_seven()).unwrap();
    let collected = sink.clone().collect().unwrap();
    let source = Stream::from_values(INPUT)
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .feed(std::slice::from_ref(&sink))
        .unwrap();
    // The signal that broke the sink is skipped at the source too.
    assert_eq!(source.to_list().unwrap().len(), INPUT.len() - 1);
    assert!(sink.has_failed());
    assert!(matches!(collected.get(), Err(StreamError::PreviousFailure { .. })));
}
