use std::sync::{Arc, Mutex};

use rust_data_stream::execution::{StreamEvent, StreamObserver};
use rust_data_stream::processing::{Comparator, Filter, Mapper};
use rust_data_stream::{
    ErrorAction, ErrorPolicy, Producer, Stream, StreamError, StreamOptions, Value,
};

fn fails_on_three() -> Mapper {
    Mapper::try_value(|v| match v.as_i64() {
        Some(3) => Err(StreamError::failed("three is not allowed")),
        _ => Ok(v.clone()),
    })
}

fn values(xs: &[i64]) -> Vec<Value> {
    xs.iter().copied().map(Value::Int64).collect()
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl StreamObserver for Recorder {
    fn on_event(&self, event: &StreamEvent) {
        let label = match event {
            StreamEvent::RunStarted { .. } => "started".to_string(),
            StreamEvent::ErrorHandled { action, .. } => format!("error:{action:?}"),
            StreamEvent::UpstreamStopped { .. } => "stopped".to_string(),
            StreamEvent::RunFinished { .. } => "finished".to_string(),
            StreamEvent::RunFailed { .. } => "failed".to_string(),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(label);
        }
    }
}

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

#[test]
fn abort_surfaces_the_original_error() {
    let s = Stream::from_values(vec![1, 2, 3, 4]).map(fails_on_three()).unwrap();
    let out = s.clone().collect().unwrap();
    let err = out.get().unwrap_err();
    assert!(matches!(
        err,
        StreamError::Failed { ref message } if message == "three is not allowed"
    ));
    assert!(matches!(out.get(), Err(StreamError::PreviousFailure { .. })));
    assert!(matches!(s.run(), Err(StreamError::AlreadyExecuted { .. })));
}

#[test]
fn skip_drops_only_the_offending_signal() {
    let s = Stream::from_values(vec![5, 3, 1, 4, 2])
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .map(fails_on_three())
        .unwrap()
        .sort(Comparator::by_value())
        .unwrap();
    let metrics = s.metrics().unwrap();
    assert_eq!(s.to_list().unwrap(), values(&[1, 2, 4, 5]));
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.errors_skipped, 1);
    assert_eq!(snapshot.signals_pulled, 5);
}

#[test]
fn stop_flushes_buffers_and_succeeds() {
    let policy = ErrorPolicy::custom(|_| ErrorAction::Stop);
    let out = Stream::from_values(vec![5, 1, 3, 2, 4])
        .on_error(policy)
        .unwrap()
        .map(fails_on_three())
        .unwrap()
        .sort(Comparator::by_value().reversed())
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(out, values(&[5, 1]));
}

#[test]
fn custom_policy_can_discriminate() {
    let policy = ErrorPolicy::custom(|err| match err {
        StreamError::ParseError { .. } => ErrorAction::Skip,
        _ => ErrorAction::Abort,
    });
    let parse_error = StreamError::ParseError {
        row: 2,
        column: "id".into(),
        raw: "x".into(),
        message: "bad".into(),
    };
    let producer = Producer::from_results(vec![
        Ok((Value::Int64(0), Value::Int64(1))),
        Err(parse_error),
        Ok((Value::Int64(2), Value::Int64(3))),
    ]);
    let out = Stream::with_options(
        producer,
        StreamOptions {
            error_policy: policy,
            ..Default::default()
        },
    )
    .to_list()
    .unwrap();
    assert_eq!(out, values(&[1, 3]));
}

#[test]
fn failing_predicates_follow_the_policy() {
    let picky = Filter::try_value(|v| match v.as_i64() {
        Some(x) if x < 0 => Err(StreamError::failed("negative")),
        Some(x) => Ok(x % 2 == 0),
        None => Ok(false),
    });
    let err = Stream::from_values(vec![2, -1, 4])
        .filter(picky.clone())
        .unwrap()
        .to_list()
        .unwrap_err();
    assert!(matches!(err, StreamError::Failed { .. }));

    let out = Stream::from_values(vec![2, -1, 4])
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .filter(picky)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(out, values(&[2, 4]));
}

#[test]
fn structural_errors_ignore_skip() {
    let s = Stream::from_values(vec![1]).on_error(ErrorPolicy::Skip).unwrap();
    s.run().unwrap();
    assert!(matches!(s.run(), Err(StreamError::AlreadyExecuted { .. })));
    assert!(matches!(
        s.clone().on_error(ErrorPolicy::Abort),
        Err(StreamError::AlreadyStarted { operation: "on_error" })
    ));
}

#[test]
fn assert_reports_the_failing_position() {
    let err = Stream::from_values(vec![1, 2, -3])
        .assert(Filter::value(|v| v.as_i64().is_some_and(|x| x > 0)), "must be positive")
        .unwrap()
        .drain()
        .unwrap()
        .get()
        .unwrap_err();
    assert!(matches!(err, StreamError::AssertionFailed { position: 2, .. }));
}

#[test]
fn observer_sees_the_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let out = Stream::from_values(vec![1, 2, 3, 4, 5])
        .observe(recorder.clone())
        .unwrap()
        .on_error(ErrorPolicy::Skip)
        .unwrap()
        .map(fails_on_three())
        .unwrap()
        .limit(3)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(out, values(&[1, 2, 4]));
    assert_eq!(recorder.take(), vec!["started", "error:Skip", "stopped", "finished"]);

    let _ = Stream::from_values(vec![3])
        .observe(recorder.clone())
        .unwrap()
        .map(fails_on_three())
        .unwrap()
        .to_list();
    assert_eq!(recorder.take(), vec!["started", "error:Abort", "failed"]);
}
