//! Value relay between two endpoints with error capture
//!
//! [`PropertySync`] never fails outward. A failed read, conversion or write
//! is adapted and written to the error sink when one is configured, and
//! logged otherwise. A successful sync clears the sink back to null.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::endpoint::PropertyEndPoint;
use crate::error::{BindError, Result};
use crate::value::Value;

/// Re-entrancy flag shared by the two directions of a binding
///
/// While a sync holds the guard, change notifications caused by its own
/// write are ignored instead of syncing back.
#[derive(Clone, Default)]
pub struct SyncGuard(Rc<Cell<bool>>);

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.get()
    }

    /// Take the guard; `None` while it is already held
    pub fn enter(&self) -> Option<SyncGuardToken> {
        if self.0.replace(true) {
            None
        } else {
            Some(SyncGuardToken(Rc::clone(&self.0)))
        }
    }
}

impl fmt::Debug for SyncGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SyncGuard").field(&self.0.get()).finish()
    }
}

/// Releases the guard on drop
pub struct SyncGuardToken(Rc<Cell<bool>>);

impl Drop for SyncGuardToken {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Direction of a sync, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    FromSource,
    FromDest,
}

/// Copies values from source to destination (and back for two-way bindings)
pub struct PropertySync {
    source: PropertyEndPoint,
    dest: PropertyEndPoint,
    error_sink: Option<PropertyEndPoint>,
    guard: SyncGuard,
    log_suppressed: bool,
}

impl PropertySync {
    pub fn new(source: PropertyEndPoint, dest: PropertyEndPoint) -> Self {
        Self {
            source,
            dest,
            error_sink: None,
            guard: SyncGuard::new(),
            log_suppressed: true,
        }
    }

    /// Route sync failures into `sink` instead of the log
    pub fn with_error_sink(mut self, sink: Option<PropertyEndPoint>) -> Self {
        self.error_sink = sink;
        self
    }

    pub fn with_guard(mut self, guard: SyncGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Whether failures without a sink are logged
    pub fn log_suppressed_errors(mut self, enabled: bool) -> Self {
        self.log_suppressed = enabled;
        self
    }

    pub fn source(&self) -> &PropertyEndPoint {
        &self.source
    }

    pub fn dest(&self) -> &PropertyEndPoint {
        &self.dest
    }

    pub fn guard(&self) -> &SyncGuard {
        &self.guard
    }

    /// Read the source, adapt with the destination's adapter, write the destination
    pub fn sync_from_source(&self) {
        self.run(SyncDirection::FromSource, || {
            let value = self.source.get_value()?;
            let value = self.dest.adapt(value)?;
            self.dest.set_value(value)
        });
    }

    /// Read the destination, adapt with the source's adapter, write the source
    pub fn sync_from_dest(&self) {
        self.run(SyncDirection::FromDest, || {
            let value = self.dest.get_value()?;
            let value = self.source.adapt(value)?;
            self.source.set_value(value)
        });
    }

    fn run(&self, direction: SyncDirection, relay: impl FnOnce() -> Result<()>) {
        let Some(_token) = self.guard.enter() else {
            tracing::trace!(?direction, "Sync already in progress, skipping");
            return;
        };
        match relay() {
            Ok(()) => self.clear_error(),
            Err(err) => self.report(direction, err),
        }
    }

    fn clear_error(&self) {
        if let Some(sink) = &self.error_sink {
            if let Err(err) = sink.set_value(Value::Null) {
                tracing::warn!(sink = sink.member(), error = %err, "Failed to clear error sink");
            }
        }
    }

    fn report(&self, direction: SyncDirection, err: BindError) {
        let Some(sink) = &self.error_sink else {
            if self.log_suppressed {
                tracing::warn!(
                    ?direction,
                    source = self.source.member(),
                    dest = self.dest.member(),
                    error = %err,
                    "Sync failed"
                );
            }
            return;
        };
        let written = sink
            .adapt(Value::Error(Rc::new(err)))
            .and_then(|value| sink.set_value(value));
        if let Err(sink_err) = written {
            tracing::warn!(
                ?direction,
                sink = sink.member(),
                error = %sink_err,
                "Failed to write error sink"
            );
        }
    }
}

impl fmt::Debug for PropertySync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySync")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("error_sink", &self.error_sink)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterRegistry;
    use crate::notify::PropertyNotifier;
    use crate::reflect::{Bindable, ObjectRef, TypeDescriptor, TypeKey};
    use crate::registry::TypeRegistry;
    use std::any::Any;

    #[derive(Default)]
    struct Form {
        amount: f64,
        text: String,
        error: Value,
        message: String,
        notifier: PropertyNotifier,
    }

    impl Bindable for Form {
        fn type_key(&self) -> TypeKey {
            TypeKey::of::<Self>()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn notifier(&self) -> Option<PropertyNotifier> {
            Some(self.notifier.clone())
        }
    }

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.register(
            TypeDescriptor::builder::<Form>("Form")
                .binding("amount", |f| f.amount, Some(|f, v| f.amount = v))
                .binding("text", |f| f.text.clone(), Some(|f, v| f.text = v))
                .binding("error", |f| f.error.clone(), Some(|f, v| f.error = v))
                .binding("message", |f| f.message.clone(), Some(|f, v| f.message = v))
                .build(),
        );
        registry
    }

    fn string_to_float(adapters: &AdapterRegistry) -> Option<crate::adapter::BoundAdapter> {
        adapters
            .get("string_to_float")
            .unwrap()
            .map(|d| d.create_default())
    }

    #[test]
    fn test_sync_from_dest_captures_errors_and_clears() {
        let registry = registry();
        let adapters = AdapterRegistry::with_builtins();
        let form = ObjectRef::new(Form::default());

        let source = PropertyEndPoint::resolve(&registry, form.clone(), "amount")
            .unwrap()
            .with_adapter(string_to_float(&adapters), None);
        let dest = PropertyEndPoint::resolve(&registry, form.clone(), "text").unwrap();
        let sink = PropertyEndPoint::resolve(&registry, form.clone(), "error").unwrap();
        let sync = PropertySync::new(source, dest).with_error_sink(Some(sink));

        form.with_mut(|f: &mut Form| f.text = "not a number".into());
        sync.sync_from_dest();
        assert!(form.with(|f: &Form| !f.error.is_null()).unwrap());
        assert_eq!(form.with(|f: &Form| f.amount).unwrap(), 0.0);

        form.with_mut(|f: &mut Form| f.text = "2.5".into());
        sync.sync_from_dest();
        assert!(form.with(|f: &Form| f.error.is_null()).unwrap());
        assert_eq!(form.with(|f: &Form| f.amount).unwrap(), 2.5);
    }

    #[test]
    fn test_error_sink_is_adapted() {
        let registry = registry();
        let adapters = AdapterRegistry::with_builtins();
        let form = ObjectRef::new(Form::default());
        let to_text = adapters
            .get("error_to_string")
            .unwrap()
            .map(|d| d.create_default());

        let source = PropertyEndPoint::resolve(&registry, form.clone(), "amount")
            .unwrap()
            .with_adapter(string_to_float(&adapters), None);
        let dest = PropertyEndPoint::resolve(&registry, form.clone(), "text").unwrap();
        let sink = PropertyEndPoint::resolve(&registry, form.clone(), "message")
            .unwrap()
            .with_adapter(to_text, None);
        let sync = PropertySync::new(source, dest).with_error_sink(Some(sink));

        form.with_mut(|f: &mut Form| f.text = "x".into());
        sync.sync_from_dest();
        let message = form.with(|f: &Form| f.message.clone()).unwrap();
        assert!(message.contains("string_to_float"), "{message}");
    }

    #[test]
    fn test_sync_without_sink_never_panics() {
        let registry = registry();
        let form = ObjectRef::new(Form::default());
        let source = PropertyEndPoint::resolve(&registry, form.clone(), "text").unwrap();
        let dest = PropertyEndPoint::resolve(&registry, form.clone(), "amount").unwrap();
        let sync = PropertySync::new(source, dest);

        form.with_mut(|f: &mut Form| f.text = "oops".into());
        sync.sync_from_source();
        assert_eq!(form.with(|f: &Form| f.amount).unwrap(), 0.0);
    }

    #[test]
    fn test_guard_blocks_nested_sync() {
        let guard = SyncGuard::new();
        let token = guard.enter();
        assert!(token.is_some());
        assert!(guard.is_active());
        assert!(guard.enter().is_none());
        drop(token);
        assert!(!guard.is_active());
    }

    #[test]
    fn test_echo_notification_is_ignored() {
        let registry = registry();
        let form = ObjectRef::new(Form::default());
        let source = PropertyEndPoint::resolve(&registry, form.clone(), "amount").unwrap();
        let dest = PropertyEndPoint::resolve(&registry, form.clone(), "text").unwrap();
        let sync = Rc::new(PropertySync::new(source, dest));

        let echo = Rc::clone(&sync);
        let _watch_dest = sync.dest().watch(move || echo.sync_from_dest());

        form.with_mut(|f: &mut Form| f.amount = 4.0);
        sync.sync_from_source();
        assert_eq!(form.with(|f: &Form| f.text.clone()).unwrap(), "4");
        assert_eq!(form.with(|f: &Form| f.amount).unwrap(), 4.0);
    }
}
