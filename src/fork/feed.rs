use std::rc::{Rc, Weak};

use crate::error::{StreamError, StreamResult};
use crate::operation::{Operation, OperationClass};
use crate::signal::{Directive, Signal};
use crate::stream::{Stream, StreamShared};

enum FeedTarget {
    Other(Stream),
    /// The owning stream; held weakly so the stream does not own itself.
    Itself(Weak<StreamShared>),
}

/// Pushes every signal into other streams and forwards it unchanged.
///
/// Targets are registered as feeders when the stage is built (copies made for fork children
/// register on their first signal); at end of input each target is released and finishes once
/// its last feeder has.
pub struct Feed {
    targets: Vec<FeedTarget>,
    attached: bool,
}

impl Feed {
    /// `targets` may contain `owner` itself.
    pub(crate) fn new(owner: &Stream, targets: &[Stream]) -> Self {
        let targets = targets
            .iter()
            .map(|target| {
                if target.same(owner) {
                    FeedTarget::Itself(Rc::downgrade(&owner.shared))
                } else {
                    target.attach_feeder();
                    FeedTarget::Other(target.clone())
                }
            })
            .collect();
        Self {
            targets,
            attached: true,
        }
    }

    fn attach(&mut self) {
        if self.attached {
            return;
        }
        self.attached = true;
        for target in &self.targets {
            if let FeedTarget::Other(stream) = target {
                stream.attach_feeder();
            }
        }
    }

    fn push(&self, signal: &Signal) -> StreamResult<()> {
        for target in &self.targets {
            let item = (signal.key.clone(), signal.value.clone());
            match target {
                FeedTarget::Other(stream) if stream.has_failed() => {}
                FeedTarget::Other(stream) => stream.accept(item)?,
                FeedTarget::Itself(weak) => {
                    if let Some(shared) = weak.upgrade() {
                        Stream { shared }.accept(item)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn release(&self) -> StreamResult<()> {
        for target in &self.targets {
            if let FeedTarget::Other(stream) = target {
                stream.release_feeder()?;
            }
        }
        Ok(())
    }
}

impl Operation for Feed {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Stateless
    }

    fn handle(&mut self, signal: Signal) -> Directive {
        self.attach();
        if signal.terminal {
            return match self.release() {
                Ok(()) => Directive::Drop,
                Err(err) => Directive::Fail(err),
            };
        }
        match self.push(&signal) {
            Ok(()) => Directive::Forward(signal),
            Err(err) => Directive::Fail(err),
        }
    }

    fn duplicate(&self) -> StreamResult<Box<dyn Operation>> {
        if self.targets.iter().any(|t| matches!(t, FeedTarget::Itself(_))) {
            return Err(StreamError::NotClonable { operation: "feed" });
        }
        Ok(Box::new(Feed {
            targets: self.targets().into_iter().map(FeedTarget::Other).collect(),
            attached: false,
        }))
    }

    fn targets(&self) -> Vec<Stream> {
        self.targets
            .iter()
            .filter_map(|target| match target {
                FeedTarget::Other(stream) => Some(stream.clone()),
                FeedTarget::Itself(_) => None,
            })
            .collect()
    }
}
