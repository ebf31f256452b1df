use crate::context::AmbientContext;
use crate::identity::ProcessIdentity;
use crate::processor::{
    AddLevelAndName, CallsiteAdder, Flow, FormatException, InjectProcessContext, LevelFilter,
    LevelThresholds, MergeContext, Processor, ProcessorError, RenameEventToMessage,
    TimeStamper, TraceCorrelation,
};
use crate::record::EventRecord;
use crate::render::{fallback_line, JsonRenderer};
use crate::trace::{TraceProvider, TraceSettings};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Ordered processor chain ending in the JSON renderer.
///
/// [`Pipeline::run`] never fails and never panics: a failing or panicking
/// processor turns the record into a fallback line.
pub struct Pipeline {
    processors: Vec<Box<dyn Processor>>,
    renderer: JsonRenderer,
    identity: ProcessIdentity,
}

impl Pipeline {
    /// A pipeline running exactly `processors`, in order.
    pub fn new(processors: Vec<Box<dyn Processor>>, identity: ProcessIdentity) -> Self {
        Pipeline {
            processors,
            renderer: JsonRenderer,
            identity,
        }
    }

    /// The fixed chain installed by configuration.
    pub fn standard(
        thresholds: LevelThresholds,
        identity: ProcessIdentity,
        tracer: Arc<dyn TraceProvider>,
        trace_settings: TraceSettings,
    ) -> Self {
        let processors: Vec<Box<dyn Processor>> = vec![
            Box::new(LevelFilter { thresholds }),
            Box::new(MergeContext),
            Box::new(TimeStamper),
            Box::new(CallsiteAdder),
            Box::new(AddLevelAndName),
            Box::new(InjectProcessContext {
                identity: identity.clone(),
            }),
            Box::new(TraceCorrelation {
                provider: tracer,
                settings: trace_settings,
            }),
            Box::new(RenameEventToMessage),
            Box::new(FormatException),
        ];
        Pipeline::new(processors, identity)
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Process one record into a line, or `None` when it was filtered out.
    pub fn run(&self, mut record: EventRecord, ambient: &AmbientContext) -> Option<String> {
        for processor in &self.processors {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                processor.process(&mut record, ambient)
            }))
            .unwrap_or_else(|payload| {
                Err(ProcessorError::new(processor.name(), panic_message(&*payload)))
            });

            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Drop) => return None,
                Err(err) => return Some(self.fallback(&record, ambient, &err.to_string())),
            }
        }

        match self.renderer.render(&record) {
            Ok(line) => Some(line),
            Err(err) => Some(self.fallback(&record, ambient, &err.to_string())),
        }
    }

    fn fallback(&self, record: &EventRecord, ambient: &AmbientContext, failure: &str) -> String {
        fallback_line(
            record.level,
            &record.logger,
            record.text(),
            failure,
            &self.identity,
            ambient,
        )
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
