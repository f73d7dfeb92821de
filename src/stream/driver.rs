//! The push loop: pull from the producer, push into the pipe, deliver the end signal.

use std::time::Instant;

use tracing::debug;

use crate::error::{StreamError, StreamResult};
use crate::execution::StreamEvent;
use crate::signal::{Item, Signal};

use super::{RunState, Stream};

impl Stream {
    /// Execute the stream to completion.
    ///
    /// Fails with [`StreamError::AlreadyExecuted`] on a finished stream and
    /// [`StreamError::AlreadyRunning`] while it is being driven.
    pub fn run(&self) -> StreamResult<()> {
        self.begin()?;
        self.drive()
    }

    fn begin(&self) -> StreamResult<()> {
        if self.shared.driving.get() {
            return Err(StreamError::AlreadyRunning { stream_id: self.id() });
        }
        let mut core = self.core_mut()?;
        match core.state {
            RunState::NotStarted => {
                core.state = RunState::Running;
                core.started_at = Some(Instant::now());
                core.pipe.mark_started();
                debug!(stream_id = self.id(), stages = ?core.pipe.describe(), "stream started");
                core.pipe.instrumentation().emit(StreamEvent::RunStarted { stream_id: self.id() });
                Ok(())
            }
            RunState::Running => Err(StreamError::AlreadyRunning { stream_id: self.id() }),
            RunState::Done => Err(StreamError::AlreadyExecuted { stream_id: self.id() }),
        }
    }

    /// Drive a running stream: pull the producer dry, then deliver the end signal.
    fn drive(&self) -> StreamResult<()> {
        self.shared.driving.set(true);
        let result = self.pump().and_then(|()| self.deliver_end());
        self.complete(result)
    }

    fn pump(&self) -> StreamResult<()> {
        loop {
            self.drain_inbox()?;
            let mut core = self.core_mut()?;
            if !core.pipe.accepts_input() {
                return Ok(());
            }
            let Some(next) = core.producer.next() else {
                return Ok(());
            };
            core.pipe.metrics().on_pulled();
            match next {
                Ok((key, value)) => {
                    let position = core.take_position();
                    core.pipe.push(Signal::new(key, value, position))?;
                }
                Err(err) => core.pipe.recover(err)?,
            }
        }
    }

    /// Push everything this stream fed to itself while it was being driven.
    fn drain_inbox(&self) -> StreamResult<()> {
        loop {
            let next = self.shared.inbox.borrow_mut().pop_front();
            let Some((key, value)) = next else {
                return Ok(());
            };
            let mut core = self.core_mut()?;
            if !core.pipe.accepts_input() {
                continue;
            }
            let position = core.take_position();
            core.pipe.push(Signal::new(key, value, position))?;
        }
    }

    fn deliver_end(&self) -> StreamResult<()> {
        {
            let mut core = self.core_mut()?;
            let position = core.next_position;
            core.pipe.push(Signal::end(position))?;
        }
        if !self.shared.inbox.borrow().is_empty() {
            self.shared.inbox.borrow_mut().clear();
            return Err(StreamError::FeedAfterTermination { stream_id: self.id() });
        }
        Ok(())
    }

    /// Mark the stream done, notify observers and fire handlers. Returns `result` unchanged.
    fn complete(&self, result: StreamResult<()>) -> StreamResult<()> {
        self.shared.driving.set(false);
        let (on_success, on_finish) = {
            let mut core = self.core_mut()?;
            core.state = RunState::Done;
            let elapsed = core.started_at.map(|t| t.elapsed()).unwrap_or_default();
            let instr = core.pipe.instrumentation().clone();
            match &result {
                Ok(()) => {
                    instr.metrics.end_run(elapsed);
                    let metrics = instr.metrics.snapshot();
                    debug!(stream_id = self.id(), %metrics, "stream finished");
                    instr.emit(StreamEvent::RunFinished {
                        stream_id: self.id(),
                        elapsed,
                        metrics,
                    });
                }
                Err(err) => {
                    core.failure = Some(err.to_string());
                    debug!(stream_id = self.id(), error = %err, "stream failed");
                    instr.emit(StreamEvent::RunFailed {
                        stream_id: self.id(),
                        message: err.to_string(),
                    });
                }
            }
            let on_success = if result.is_ok() {
                std::mem::take(&mut core.on_success)
            } else {
                Vec::new()
            };
            (on_success, std::mem::take(&mut core.on_finish))
        };
        for handler in on_success.into_iter().chain(on_finish) {
            handler();
        }
        result
    }

    /// Push one item from a feeder or fork into this stream, starting it if needed.
    ///
    /// While the stream is being driven the item is queued and pushed by the driver, which
    /// keeps self-feeding iterative.
    pub(crate) fn accept(&self, item: Item) -> StreamResult<()> {
        if self.shared.driving.get() {
            self.shared.inbox.borrow_mut().push_back(item);
            return Ok(());
        }
        let state = self.core()?.state;
        match state {
            RunState::Done => {
                return Err(StreamError::FeedAfterTermination { stream_id: self.id() });
            }
            RunState::NotStarted => self.begin()?,
            RunState::Running => {}
        }
        self.shared.driving.set(true);
        let result = self.push_item(item).and_then(|()| self.drain_inbox());
        self.shared.driving.set(false);
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.complete(Err(err)),
        }
    }

    fn push_item(&self, (key, value): Item) -> StreamResult<()> {
        let mut core = self.core_mut()?;
        if !core.pipe.accepts_input() {
            return Ok(());
        }
        let position = core.take_position();
        core.pipe.push(Signal::new(key, value, position))
    }

    /// Drive the stream to completion unless it already finished. Idempotent.
    pub(crate) fn finish(&self) -> StreamResult<()> {
        if self.shared.driving.get() {
            return Err(StreamError::AlreadyRunning { stream_id: self.id() });
        }
        let state = self.core()?.state;
        match state {
            RunState::Done => Ok(()),
            RunState::NotStarted => self.run(),
            RunState::Running => self.drive(),
        }
    }

    pub(crate) fn attach_feeder(&self) {
        self.shared.feeders.set(self.shared.feeders.get() + 1);
    }

    /// A feeder reached its end; the stream finishes once no feeder is left.
    pub(crate) fn release_feeder(&self) -> StreamResult<()> {
        let left = self.shared.feeders.get().saturating_sub(1);
        self.shared.feeders.set(left);
        if left == 0 { self.finish() } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::error::StreamError;
    use crate::producer::Producer;
    use crate::stream::{RunState, Stream};
    use crate::types::Value;

    #[test]
    fn run_is_single_use() {
        let s = Stream::from_values(vec![1, 2]);
        s.run().unwrap();
        assert!(matches!(s.run(), Err(StreamError::AlreadyExecuted { .. })));
        assert_eq!(s.state().unwrap(), RunState::Done);
    }

    #[test]
    fn handlers_fire_once() {
        let hits = Rc::new(Cell::new(0));
        let (a, b) = (Rc::clone(&hits), Rc::clone(&hits));
        let s = Stream::from_values(vec![1])
            .on_success(move || a.set(a.get() + 1))
            .unwrap()
            .on_finish(move || b.set(b.get() + 10))
            .unwrap();
        s.run().unwrap();
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn producer_errors_abort_by_default() {
        let s = Stream::new(Producer::from_results(vec![
            Ok((Value::Int64(0), Value::Int64(1))),
            Err(StreamError::failed("bad row")),
        ]));
        let out = s.clone().collect().unwrap();
        assert!(matches!(s.run(), Err(StreamError::Failed { .. })));
        assert!(matches!(out.get(), Err(StreamError::PreviousFailure { .. })));
    }

    #[test]
    fn accept_starts_an_idle_stream() {
        let s = Stream::empty();
        let out = s.clone().collect().unwrap();
        s.accept((Value::Int64(0), Value::from("x"))).unwrap();
        assert_eq!(s.state().unwrap(), RunState::Running);
        s.finish().unwrap();
        s.finish().unwrap();
        assert_eq!(out.get().unwrap(), Value::List(vec![Value::from("x")]));
        assert!(matches!(
            s.accept((Value::Int64(1), Value::Null)),
            Err(StreamError::FeedAfterTermination { .. })
        ));
    }
}
