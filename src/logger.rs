use crate::context;
use crate::dispatch::Dispatcher;
use crate::level::LogLevel;
use crate::record::{format_error_chain, Callsite, EventRecord};
use crate::trace::current_span_ids;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::Debug;
use std::panic::Location;
use std::sync::Arc;

/// Extra key/value pairs attached to one emission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Values that fail to serialize are kept as their
    /// `Debug` representation.
    pub fn with<V>(mut self, key: impl Into<String>, value: V) -> Self
    where
        V: Serialize + Debug,
    {
        let value = serde_json::to_value(&value).unwrap_or_else(|_| Value::String(format!("{:?}", value)));
        self.0.insert(key.into(), value);
        self
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<()> for Fields {
    fn from(_: ()) -> Self {
        Fields::default()
    }
}

impl From<Map<String, Value>> for Fields {
    fn from(map: Map<String, Value>) -> Self {
        Fields(map)
    }
}

/// Objects become their entries; any other value lands under `value`.
impl From<Value> for Fields {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Fields(map),
            Value::Null => Fields::default(),
            other => Fields::default().with("value", other),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Fields(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A named logger bound to a [`Dispatcher`].
///
/// Cheap to clone. Every emission method is infallible: whatever goes
/// wrong inside the pipeline or the sinks never reaches the caller.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    dispatcher: Arc<Dispatcher>,
}

impl Logger {
    pub(crate) fn new(name: impl Into<String>, dispatcher: Arc<Dispatcher>) -> Self {
        Logger {
            name: Arc::from(name.into()),
            dispatcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, fields: impl Into<Fields>) {
        self.emit(LogLevel::Debug, message.into(), fields.into(), None, caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>, fields: impl Into<Fields>) {
        self.emit(LogLevel::Info, message.into(), fields.into(), None, caller());
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>, fields: impl Into<Fields>) {
        self.emit(LogLevel::Warning, message.into(), fields.into(), None, caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>, fields: impl Into<Fields>) {
        self.emit(LogLevel::Error, message.into(), fields.into(), None, caller());
    }

    #[track_caller]
    pub fn critical(&self, message: impl Into<String>, fields: impl Into<Fields>) {
        self.emit(LogLevel::Critical, message.into(), fields.into(), None, caller());
    }

    /// Emit at ERROR with `error` and its causes rendered under `exception`.
    #[track_caller]
    pub fn exception(
        &self,
        message: impl Into<String>,
        error: &(dyn Error + 'static),
        fields: impl Into<Fields>,
    ) {
        let chain = format_error_chain(error);
        self.emit(LogLevel::Error, message.into(), fields.into(), Some(chain), caller());
    }

    #[track_caller]
    pub fn log(&self, level: LogLevel, message: impl Into<String>, fields: impl Into<Fields>) {
        self.emit(level, message.into(), fields.into(), None, caller());
    }

    /// Emit with an explicit callsite. This is what the [`crate::log!`]
    /// family of macros expands to.
    pub fn log_at(
        &self,
        callsite: Callsite,
        level: LogLevel,
        message: impl Into<String>,
        fields: impl Into<Fields>,
    ) {
        self.emit(level, message.into(), fields.into(), None, callsite);
    }

    fn emit(
        &self,
        level: LogLevel,
        message: String,
        fields: Fields,
        exception: Option<String>,
        callsite: Callsite,
    ) {
        let mut record = EventRecord::new(level, self.name.as_ref()).with_event(message);
        record.callsite = callsite;
        record.exception = exception;
        record.fields = fields.into_map();

        let mut ambient = context::current();
        ambient.span = current_span_ids();
        self.dispatcher.dispatch(record, &ambient);
    }
}

/// File and line of the caller; `#[track_caller]` carries no function name.
#[track_caller]
fn caller() -> Callsite {
    let location = Location::caller();
    Callsite {
        file: Some(location.file().to_string()),
        function: None,
        line: Some(location.line()),
    }
}

/// Path of the function enclosing a macro call, given the type name of an
/// item declared inside it. Closure and async block frames are dropped.
#[doc(hidden)]
pub fn enclosing_function(item_type_name: &'static str) -> &'static str {
    let mut name = item_type_name
        .rsplit_once("::")
        .map_or(item_type_name, |(outer, _)| outer);
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name
}

#[doc(hidden)]
#[macro_export]
macro_rules! __enclosing_function {
    () => {{
        fn __here() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::logger::enclosing_function(type_name_of(__here))
    }};
}

/// Emit through a [`Logger`] with the full callsite, function name
/// included.
///
/// ```ignore
/// log!(logger, LogLevel::Info, "user created", user_id = 7, plan = "pro");
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $message:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::logger::Logger::log_at(
            &$logger,
            $crate::record::Callsite {
                file: ::std::option::Option::Some(::std::string::String::from(::std::file!())),
                function: ::std::option::Option::Some(::std::string::String::from(
                    $crate::__enclosing_function!(),
                )),
                line: ::std::option::Option::Some(::std::line!()),
            },
            $level,
            $message,
            $crate::logger::Fields::new() $(.with(::std::stringify!($key), $value))*,
        )
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::level::LogLevel::Debug, $($rest)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::level::LogLevel::Info, $($rest)+)
    };
}

#[macro_export]
macro_rules! warning {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::level::LogLevel::Warning, $($rest)+)
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::level::LogLevel::Error, $($rest)+)
    };
}

#[macro_export]
macro_rules! critical {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::level::LogLevel::Critical, $($rest)+)
    };
}

impl Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::LogConfig;
    use crate::memory_sink::MemorySink;
    use crate::sink::SinkSet;
    use crate::trace::NoopTraceProvider;
    use serde_json::json;
    use std::collections::HashMap;

    fn setup() -> (Arc<Dispatcher>, MemorySink) {
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::new();
        dispatcher.configure_with(
            &LogConfig::default().with_minimum_level(LogLevel::Debug),
            SinkSet::new().with(Arc::new(sink.clone())),
            Arc::new(NoopTraceProvider),
        );
        (dispatcher, sink)
    }

    #[test]
    fn fields_from_json_object() {
        let fields = Fields::from(json!({"code": 42, "ok": true}));
        let map = fields.into_map();
        assert_eq!(map["code"], 42);
        assert_eq!(map["ok"], true);
    }

    #[test]
    fn unserializable_values_fall_back_to_debug() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON keys");
        let map = Fields::new().with("bad", bad).with("n", 3).into_map();
        assert!(map["bad"].as_str().unwrap().contains("tuple keys"));
        assert_eq!(map["n"], 3);
    }

    #[test]
    fn fields_from_pairs() {
        let fields: Fields = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(fields.into_map().len(), 2);
    }

    #[test]
    fn caller_event_field_is_kept() {
        let (dispatcher, sink) = setup();
        dispatcher
            .logger("app")
            .info("user created", json!({"event": "signup", "user": "u1"}));

        let record = &sink.records()[0];
        assert_eq!(record["message"], "user created");
        assert_eq!(record["event"], "signup");
        assert_eq!(record["user"], "u1");
    }

    #[test]
    fn macro_emission_carries_function_name() {
        let (dispatcher, sink) = setup();
        let logger = dispatcher.logger("app.routes");

        crate::info!(logger, "user created", user_id = 7, plan = "pro");
        crate::critical!(logger, "disk almost full");
        logger.info("method call", ());

        let records = sink.records();
        assert_eq!(records.len(), 3);
        let func = records[0]["func_name"].as_str().unwrap();
        assert!(
            func.ends_with("logger::tests::macro_emission_carries_function_name"),
            "{func}"
        );
        assert_eq!(records[0]["filename"], "logger.rs");
        assert!(records[0]["lineno"].is_u64());
        assert_eq!(records[0]["user_id"], 7);
        assert_eq!(records[0]["plan"], "pro");
        assert_eq!(records[0]["message"], "user created");
        assert_eq!(records[1]["level"], "CRITICAL");
        assert_eq!(records[1]["func_name"], records[0]["func_name"]);
        assert!(records[2].get("func_name").is_none());
    }

    #[test]
    fn enclosing_function_drops_closure_frames() {
        assert_eq!(
            enclosing_function("svc::routes::create_user::{{closure}}::{{closure}}::__here"),
            "svc::routes::create_user"
        );
        assert_eq!(enclosing_function("svc::main::__here"), "svc::main");
    }
}
