//! The ordered chain of stages owned by one stream.
//!
//! [`Pipe::append`] runs the fusion optimizer ([`optimizer`]) against the current tail before
//! linking a new stage. [`Pipe::push`] drives one signal through every stage, applying each
//! stage's [`Directive`] and the stream's [`ErrorPolicy`].

mod optimizer;

use std::sync::Arc;

use tracing::debug;

use crate::error::{StreamError, StreamResult};
use crate::execution::{
    ErrorAction, ErrorPolicy, ExecutionMetrics, Instrumentation, StreamEvent, StreamObserver,
};
use crate::operation::{Operation, OperationClass};
use crate::signal::{Directive, Signal};
use crate::stream::Stream;
use crate::types::Value;

use optimizer::Fusion;

pub struct Pipe {
    ops: Vec<Box<dyn Operation>>,
    is_terminal: bool,
    started: bool,
    stopped: bool,
    optimize: bool,
    policy: ErrorPolicy,
    instr: Instrumentation,
}

impl Pipe {
    pub(crate) fn new(optimize: bool, policy: ErrorPolicy, instr: Instrumentation) -> Self {
        Self {
            ops: Vec::new(),
            is_terminal: false,
            started: false,
            stopped: false,
            optimize,
            policy,
            instr,
        }
    }

    /// Append a stage, fusing it with the current tail when a rewrite applies.
    pub fn append(&mut self, op: Box<dyn Operation>) -> StreamResult<()> {
        self.check_open(op.name())?;
        if self.optimize {
            self.link(op);
        } else {
            self.attach(op);
        }
        Ok(())
    }

    pub(crate) fn check_open(&self, operation: &'static str) -> StreamResult<()> {
        if self.is_terminal {
            return Err(StreamError::PipeFrozen { operation });
        }
        if self.started {
            return Err(StreamError::AlreadyStarted { operation });
        }
        Ok(())
    }

    fn link(&mut self, op: Box<dyn Operation>) {
        let mut op = op;
        loop {
            let Some(tail) = self.ops.last() else {
                self.attach(op);
                return;
            };
            match optimizer::fuse(tail.as_ref(), op.as_ref()) {
                Fusion::Keep => {
                    self.attach(op);
                    return;
                }
                Fusion::DropNew => return,
                Fusion::DropBoth => {
                    self.ops.pop();
                    return;
                }
                Fusion::DropTail => {
                    self.ops.pop();
                }
                Fusion::Replace(next) => {
                    self.ops.pop();
                    op = next;
                }
            }
        }
    }

    fn attach(&mut self, op: Box<dyn Operation>) {
        if op.class() == OperationClass::Terminal {
            self.is_terminal = true;
        }
        self.ops.push(op);
    }

    pub(crate) fn set_policy(&mut self, policy: ErrorPolicy) -> StreamResult<()> {
        if self.started {
            return Err(StreamError::AlreadyStarted { operation: "on_error" });
        }
        self.policy = policy;
        Ok(())
    }

    pub(crate) fn set_observer(&mut self, observer: Arc<dyn StreamObserver>) -> StreamResult<()> {
        if self.started {
            return Err(StreamError::AlreadyStarted { operation: "observe" });
        }
        self.instr.observer = Some(observer);
        Ok(())
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// `false` once no stage will produce anything for further input.
    pub fn accepts_input(&self) -> bool {
        !self.stopped && self.ops.iter().all(|op| op.accepts_input())
    }

    /// Stage names, head first.
    pub fn describe(&self) -> Vec<&'static str> {
        self.ops.iter().map(|op| op.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn instrumentation(&self) -> &Instrumentation {
        &self.instr
    }

    pub(crate) fn metrics(&self) -> &Arc<ExecutionMetrics> {
        &self.instr.metrics
    }

    /// The terminal stage's result, if the pipe has one.
    pub fn outcome(&self) -> Option<Value> {
        if !self.is_terminal {
            return None;
        }
        self.ops.last().and_then(|op| op.outcome())
    }

    /// Streams any stage pushes into.
    pub fn targets(&self) -> Vec<Stream> {
        self.ops.iter().flat_map(|op| op.targets()).collect()
    }

    /// Same stages and configuration, no buffered state, not started.
    pub(crate) fn duplicate(&self, instr: Instrumentation) -> StreamResult<Pipe> {
        let ops = self
            .ops
            .iter()
            .map(|op| op.duplicate())
            .collect::<StreamResult<Vec<_>>>()?;
        Ok(Pipe {
            ops,
            is_terminal: self.is_terminal,
            started: false,
            stopped: false,
            optimize: self.optimize,
            policy: self.policy.clone(),
            instr,
        })
    }

    /// Push one signal into the head of the pipe.
    ///
    /// Returns an error only when the error policy aborts.
    pub fn push(&mut self, signal: Signal) -> StreamResult<()> {
        if !signal.terminal {
            self.instr.metrics.on_accepted();
        }
        self.push_at(0, signal)
    }

    fn push_at(&mut self, index: usize, signal: Signal) -> StreamResult<()> {
        let Some(op) = self.ops.get_mut(index) else {
            if !signal.terminal {
                self.instr.metrics.on_delivered();
            }
            return Ok(());
        };
        if !signal.terminal && op.class() == OperationClass::Terminal {
            self.instr.metrics.on_delivered();
        }
        let terminal = signal.terminal;
        let position = signal.position;
        match op.handle(signal) {
            Directive::Forward(next) => self.push_at(index + 1, next)?,
            Directive::ForwardMany(batch) => {
                for next in batch {
                    self.push_at(index + 1, next)?;
                }
            }
            Directive::Drop => {}
            Directive::StopUpstream(batch) => {
                self.stop(index, position);
                for next in batch {
                    self.push_at(index + 1, next)?;
                }
            }
            Directive::Fail(err) => self.recover(err)?,
            Directive::Partial(batch, errors) => {
                for err in errors {
                    self.recover(err)?;
                }
                for next in batch {
                    self.push_at(index + 1, next)?;
                }
            }
        }
        if terminal {
            self.push_at(index + 1, Signal::end(position))?;
        }
        Ok(())
    }

    fn stop(&mut self, index: usize, position: u64) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        debug!(
            stream_id = self.instr.stream_id,
            stage = self.ops[index].name(),
            position,
            "upstream stopped"
        );
        self.instr.metrics.on_upstream_stop();
        self.instr.emit(StreamEvent::UpstreamStopped {
            stream_id: self.instr.stream_id,
            position,
        });
    }

    /// Route an execution error through the policy. `Err` means abort.
    pub(crate) fn recover(&mut self, err: StreamError) -> StreamResult<()> {
        match self.instr.handle_error(&self.policy, &err) {
            ErrorAction::Abort => Err(err),
            ErrorAction::Skip => Ok(()),
            ErrorAction::Stop => {
                self.stopped = true;
                Ok(())
            }
        }
    }
}
