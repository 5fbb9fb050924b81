//! Single-loop message bus.
//!
//! - Registration happens before [`MessageBus::start`]; afterwards the
//!   routing table is owned by the dispatch task and is never locked again.
//! - Exactly one command is in flight at a time. The command handler runs
//!   with the submitter's [`Context`]; the events it returns are dispatched
//!   breadth-first with the bus's own context once the submitter has its
//!   result.
//! - Event handler failures are logged and counted but never reach the
//!   submitter, and never stop sibling handlers.

use std::any::type_name;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn};

use crate::command::Command;
use crate::config::BusConfig;
use crate::context::Context;
use crate::error::{BusError, SubmitStage};
use crate::event::{Event, SharedEvent};
use crate::handler::{HandlerDescriptor, HandlerResult, HandlerSet};
use crate::message::AsAny;
use crate::metrics::{DispatchStatus, MetricsHook, NoopMetrics};
use crate::queue::EventQueue;
use crate::registry::HandlerRegistry;

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of a bus. Moves forward only.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BusState {
    NotStarted,
    Running,
    Stopped,
}

struct Submission {
    command: Box<dyn Command>,
    command_type: &'static str,
    ctx: Context,
    reply: oneshot::Sender<Result<(), BusError>>,
}

struct Shared {
    config: BusConfig,
    metrics: Arc<dyn MetricsHook>,
    state: AtomicU8,
    registry: Mutex<Option<HandlerRegistry>>,
    sender: Mutex<Option<mpsc::Sender<Submission>>>,
    receiver: Mutex<Option<mpsc::Receiver<Submission>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, BusError> {
    mutex.lock().map_err(|_| BusError::Poisoned)
}

/// Cheap to clone; all clones drive the same bus.
#[derive(Clone)]
pub struct MessageBus {
    shared: Arc<Shared>,
}

pub struct MessageBusBuilder {
    config: BusConfig,
    metrics: Option<Arc<dyn MetricsHook>>,
}

impl MessageBusBuilder {
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsHook>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> MessageBus {
        let (sender, receiver) = mpsc::channel(self.config.channel_capacity());
        debug!(bus = %self.config.name, "message bus created");

        MessageBus {
            shared: Arc::new(Shared {
                metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
                config: self.config,
                state: AtomicU8::new(NOT_STARTED),
                registry: Mutex::new(Some(HandlerRegistry::new())),
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(Some(receiver)),
                dispatcher: Mutex::new(None),
            }),
        }
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MessageBusBuilder {
        MessageBusBuilder {
            config: BusConfig::default(),
            metrics: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn state(&self) -> BusState {
        match self.shared.state.load(Ordering::Acquire) {
            NOT_STARTED => BusState::NotStarted,
            RUNNING => BusState::Running,
            _ => BusState::Stopped,
        }
    }

    /// Register the single handler for command type `C`.
    pub fn register_command_handler<C, F>(&self, handler: F) -> Result<(), BusError>
    where
        C: Command,
        F: Fn(&Context, &C) -> HandlerResult + Send + Sync + 'static,
    {
        let descriptor = HandlerDescriptor::command::<C>();
        self.with_registry(descriptor, |registry| registry.insert_command(handler))
            .inspect_err(|err| warn!(bus = %self.name(), error = %err, "command handler rejected"))?;

        info!(bus = %self.name(), handler = %descriptor, "handler registered");
        Ok(())
    }

    /// Add a handler for event type `E`. Handlers run in registration order.
    pub fn register_event_handler<E, F>(&self, handler: F) -> Result<(), BusError>
    where
        E: Event,
        F: Fn(&Context, &E) -> HandlerResult + Send + Sync + 'static,
    {
        let descriptor = HandlerDescriptor::event::<E>();
        self.with_registry(descriptor, |registry| Ok(registry.push_event(handler)))
            .inspect_err(|err| warn!(bus = %self.name(), error = %err, "event handler rejected"))?;

        info!(bus = %self.name(), handler = %descriptor, "handler registered");
        Ok(())
    }

    /// Register every handler a service exposes.
    pub fn register_handlers<S: HandlerSet>(&self, set: Arc<S>) -> Result<(), BusError> {
        set.register_handlers(self)
    }

    fn with_registry<T>(
        &self,
        descriptor: HandlerDescriptor,
        f: impl FnOnce(&mut HandlerRegistry) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let already_started = BusError::AlreadyStarted {
            kind: descriptor.kind,
            message_type: descriptor.message_type,
        };

        if self.shared.state.load(Ordering::Acquire) != NOT_STARTED {
            return Err(already_started);
        }

        let mut guard = lock(&self.shared.registry)?;
        match guard.as_mut() {
            Some(registry) => f(registry),
            None => Err(already_started),
        }
    }

    /// Spawn the dispatch loop on the current tokio runtime.
    ///
    /// `ctx` is the bus context: event handlers receive it, and cancelling it
    /// ends the loop.
    pub fn start(&self, ctx: Context) -> Result<(), BusError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NotInRuntime)?;

        if self
            .shared
            .state
            .compare_exchange(NOT_STARTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!(bus = %self.name(), "message bus already started");
            return Err(BusError::AlreadyRunning);
        }

        let registry = lock(&self.shared.registry)?.take().unwrap_or_default();
        let receiver = lock(&self.shared.receiver)?
            .take()
            .ok_or(BusError::AlreadyRunning)?;

        let dispatcher = Dispatcher::new(
            self.shared.config.name.clone(),
            registry,
            Arc::clone(&self.shared.metrics),
            self.shared.config.queue_capacity,
        );
        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn(async move {
            dispatcher.run(ctx, receiver).await;
            shared.state.store(STOPPED, Ordering::Release);
        });

        *lock(&self.shared.dispatcher)? = Some(handle);
        info!(bus = %self.name(), "message bus started");
        Ok(())
    }

    /// Submit `command` and wait for its handler's result.
    ///
    /// Blocks while another command is being handled. Returns
    /// [`BusError::Cancelled`] if `ctx` finishes first; a command already
    /// accepted by the loop is still handled in that case.
    pub async fn handle_command<C: Command>(&self, ctx: &Context, command: C) -> Result<(), BusError> {
        let sender = self.sender()?;
        let (reply, result) = oneshot::channel();
        let submission = Submission {
            command: Box::new(command),
            command_type: type_name::<C>(),
            ctx: ctx.clone(),
            reply,
        };

        tokio::select! {
            biased;
            reason = ctx.done() => {
                return Err(BusError::Cancelled { stage: SubmitStage::Send, reason });
            }
            sent = sender.send(submission) => {
                sent.map_err(|_| BusError::Stopped)?;
            }
        }
        drop(sender);

        tokio::select! {
            biased;
            reason = ctx.done() => Err(BusError::Cancelled { stage: SubmitStage::Receive, reason }),
            outcome = result => outcome.unwrap_or(Err(BusError::Stopped)),
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Submission>, BusError> {
        lock(&self.shared.sender)?.clone().ok_or(BusError::Stopped)
    }

    /// Close submissions and wait for the dispatch loop to finish its current
    /// command. Calling it again is a no-op.
    pub async fn stop(&self) -> Result<(), BusError> {
        let (sender, dispatcher) = self.detach()?;
        if sender.is_none() && dispatcher.is_none() {
            return Ok(());
        }

        info!(bus = %self.name(), "stopping message bus");
        drop(sender);
        if let Some(handle) = dispatcher {
            if let Err(err) = handle.await {
                error!(bus = %self.name(), error = %err, "dispatch loop terminated abnormally");
            }
        }

        self.shared.state.store(STOPPED, Ordering::Release);
        info!(bus = %self.name(), "message bus stopped");
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn detach(
        &self,
    ) -> Result<(Option<mpsc::Sender<Submission>>, Option<JoinHandle<()>>), BusError> {
        let sender = lock(&self.shared.sender)?.take();
        let dispatcher = lock(&self.shared.dispatcher)?.take();
        Ok((sender, dispatcher))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn label<'a>(tag: &'a str, fallback: &'static str) -> &'a str {
    if tag.is_empty() { fallback } else { tag }
}

/// The dispatch loop's private state.
struct Dispatcher {
    name: String,
    registry: HandlerRegistry,
    queue: EventQueue<SharedEvent>,
    metrics: Arc<dyn MetricsHook>,
}

impl Dispatcher {
    fn new(
        name: String,
        registry: HandlerRegistry,
        metrics: Arc<dyn MetricsHook>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            name,
            registry,
            queue: EventQueue::with_capacity(queue_capacity),
            metrics,
        }
    }

    async fn run(mut self, ctx: Context, mut submissions: mpsc::Receiver<Submission>) {
        loop {
            tokio::select! {
                submission = submissions.recv() => {
                    let Some(submission) = submission else {
                        debug!(bus = %self.name, "submission channel closed");
                        break;
                    };
                    self.process(submission, &ctx);
                }
                reason = ctx.done() => {
                    info!(bus = %self.name, %reason, "bus context finished");
                    break;
                }
            }
        }
    }

    fn process(&mut self, submission: Submission, bus_ctx: &Context) {
        let Submission {
            command,
            command_type,
            ctx,
            reply,
        } = submission;

        let span = info_span!(
            "dispatch",
            bus = %self.name,
            command = label(command.command_type(), command_type),
            command_id = %command.command_id(),
        );
        let _entered = span.enter();

        // A submission can sit in the channel slot after its caller gave up.
        if let Some(reason) = ctx.err() {
            debug!(%reason, "submitter cancelled before dispatch, skipping command");
            let _ = reply.send(Err(BusError::Cancelled {
                stage: SubmitStage::Receive,
                reason,
            }));
            return;
        }

        let result = self.dispatch_command(&ctx, command.as_ref(), command_type);
        if reply.send(result).is_err() {
            debug!("submitter left before the result was delivered");
        }

        self.dispatch_events(bus_ctx);
    }

    fn dispatch_command(
        &mut self,
        ctx: &Context,
        command: &dyn Command,
        command_type: &'static str,
    ) -> Result<(), BusError> {
        let label = label(command.command_type(), command_type);
        let started = Instant::now();

        let Some(route) = self.registry.command_handler(command.as_any().type_id()) else {
            info!("no command handler found");
            self.metrics
                .observe_command(label, DispatchStatus::NoHandler, started.elapsed());
            return Err(BusError::NoHandler { command_type });
        };

        debug!(handler = %route.descriptor, "handling command");
        match (route.handler)(ctx, command) {
            Ok(events) => {
                self.metrics
                    .observe_command(label, DispatchStatus::Ok, started.elapsed());
                debug!(events = events.len(), "command handled");
                self.queue.enqueue_all(events);
                Ok(())
            }
            Err(err) => {
                self.metrics
                    .observe_command(label, DispatchStatus::Error, started.elapsed());
                info!(error = %err, "command handler failed");
                Err(BusError::Handler(err))
            }
        }
    }

    /// Drain the queue. Events emitted by a handler go to the back, so each
    /// generation finishes before the next one starts.
    fn dispatch_events(&mut self, ctx: &Context) {
        while let Some(event) = self.queue.dequeue() {
            let event: &dyn Event = &*event;
            let routes = self.registry.event_handlers(event.as_any().type_id());

            if routes.is_empty() {
                debug!(event = event.event_type(), "no event handlers registered");
                let event_type = label(event.event_type(), "unknown");
                self.metrics
                    .observe_event(event_type, DispatchStatus::NoHandler, Duration::ZERO);
                continue;
            }

            for route in routes {
                let event_type = label(event.event_type(), route.descriptor.message_type);
                let started = Instant::now();

                match (route.handler)(ctx, event) {
                    Ok(more) => {
                        self.metrics
                            .observe_event(event_type, DispatchStatus::Ok, started.elapsed());
                        self.queue.enqueue_all(more);
                    }
                    Err(err) => {
                        self.metrics
                            .observe_event(event_type, DispatchStatus::Error, started.elapsed());
                        warn!(handler = %route.descriptor, error = %err, "event handler failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::context::CancelReason;
    use crate::event::IntoSharedEvent;
    use crate::{CommandBase, EventBase, MessageFactory};

    #[derive(Debug, Default)]
    struct Kick {
        base: CommandBase,
    }
    crate::impl_command!(Kick);

    #[derive(Debug, Default)]
    struct Unhandled {
        base: CommandBase,
    }
    crate::impl_command!(Unhandled);

    #[derive(Debug)]
    struct Step {
        base: EventBase,
        name: &'static str,
    }
    crate::impl_event!(Step);

    fn step(name: &'static str) -> SharedEvent {
        Step {
            base: MessageFactory::system().event("step"),
            name,
        }
        .into_shared()
    }

    type Log = Arc<StdMutex<Vec<&'static str>>>;

    fn dispatcher(registry: HandlerRegistry) -> Dispatcher {
        Dispatcher::new("test".into(), registry, Arc::new(NoopMetrics), 4)
    }

    fn submit<C: Command>(d: &mut Dispatcher, command: C) -> Result<(), BusError> {
        submit_with(d, Context::background(), command)
    }

    fn submit_with<C: Command>(d: &mut Dispatcher, ctx: Context, command: C) -> Result<(), BusError> {
        let (reply, mut result) = oneshot::channel();
        let submission = Submission {
            command: Box::new(command),
            command_type: type_name::<C>(),
            ctx,
            reply,
        };
        d.process(submission, &Context::background());
        result.try_recv().unwrap()
    }

    #[test]
    fn missing_command_handler_leaves_queue_empty() {
        let mut d = dispatcher(HandlerRegistry::new());
        let err = submit(&mut d, Unhandled::default()).unwrap_err();

        assert!(matches!(err, BusError::NoHandler { .. }));
        assert!(d.queue.is_empty());
    }

    #[test]
    fn failing_command_handler_discards_nothing_into_queue() {
        let mut registry = HandlerRegistry::new();
        registry
            .insert_command(|_, _: &Kick| Err(anyhow::anyhow!("boom")))
            .unwrap();
        let mut d = dispatcher(registry);

        let err = submit(&mut d, Kick::default()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(d.queue.is_empty());
    }

    #[test]
    fn events_are_dispatched_breadth_first() {
        let log: Log = Arc::default();
        let mut registry = HandlerRegistry::new();
        registry
            .insert_command(|_, _: &Kick| Ok(vec![step("a"), step("b")]))
            .unwrap();

        let seen = Arc::clone(&log);
        registry.push_event(move |_, evt: &Step| {
            seen.lock().unwrap().push(evt.name);
            Ok(match evt.name {
                "a" => vec![step("a1")],
                "b" => vec![step("b1")],
                _ => Vec::new(),
            })
        });

        let mut d = dispatcher(registry);
        submit(&mut d, Kick::default()).unwrap();

        assert_eq!(*log.lock().unwrap(), ["a", "b", "a1", "b1"]);
        assert!(d.queue.is_empty());
    }

    #[derive(Debug, Default)]
    struct Unrelated {
        base: EventBase,
    }
    crate::impl_event!(Unrelated);

    #[test]
    fn events_reach_only_handlers_of_their_type() {
        let log: Log = Arc::default();
        let mut registry = HandlerRegistry::new();
        registry
            .insert_command(|_, _: &Kick| Ok(vec![step("a"), Unrelated::default().into_shared()]))
            .unwrap();

        let seen = Arc::clone(&log);
        registry.push_event(move |_, _: &Step| {
            seen.lock().unwrap().push("step");
            Ok(Vec::new())
        });
        let seen = Arc::clone(&log);
        registry.push_event(move |_, _: &Unrelated| {
            seen.lock().unwrap().push("unrelated");
            Ok(Vec::new())
        });

        let mut d = dispatcher(registry);
        submit(&mut d, Kick::default()).unwrap();
        assert_eq!(*log.lock().unwrap(), ["step", "unrelated"]);
    }

    #[test]
    fn failing_event_handler_does_not_stop_siblings() {
        let log: Log = Arc::default();
        let mut registry = HandlerRegistry::new();
        registry
            .insert_command(|_, _: &Kick| Ok(vec![step("a")]))
            .unwrap();
        registry.push_event(|_, _: &Step| Err(anyhow::anyhow!("first handler fails")));
        let seen = Arc::clone(&log);
        registry.push_event(move |_, evt: &Step| {
            seen.lock().unwrap().push(evt.name);
            Ok(Vec::new())
        });

        let mut d = dispatcher(registry);
        assert!(submit(&mut d, Kick::default()).is_ok());
        assert_eq!(*log.lock().unwrap(), ["a"]);
    }

    #[test]
    fn failing_event_handler_does_not_stop_later_events() {
        let log: Log = Arc::default();
        let mut registry = HandlerRegistry::new();
        registry
            .insert_command(|_, _: &Kick| Ok(vec![step("a"), step("b")]))
            .unwrap();
        let seen = Arc::clone(&log);
        registry.push_event(move |_, evt: &Step| {
            seen.lock().unwrap().push(evt.name);
            if evt.name == "a" {
                anyhow::bail!("fails on a");
            }
            Ok(Vec::new())
        });

        let mut d = dispatcher(registry);
        assert!(submit(&mut d, Kick::default()).is_ok());
        assert_eq!(*log.lock().unwrap(), ["a", "b"]);
    }

    #[test]
    fn command_from_cancelled_submitter_is_not_dispatched() {
        let log: Log = Arc::default();
        let mut registry = HandlerRegistry::new();
        let seen = Arc::clone(&log);
        registry
            .insert_command(move |_, _: &Kick| {
                seen.lock().unwrap().push("kick");
                Ok(vec![step("a")])
            })
            .unwrap();
        let mut d = dispatcher(registry);

        let ctx = Context::background();
        ctx.cancel();
        let err = submit_with(&mut d, ctx, Kick::default()).unwrap_err();

        assert!(matches!(
            err,
            BusError::Cancelled {
                stage: SubmitStage::Receive,
                reason: CancelReason::Cancelled,
            }
        ));
        assert!(log.lock().unwrap().is_empty());
        assert!(d.queue.is_empty());
    }

    #[test]
    fn registration_after_start_is_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let bus = MessageBus::new();

        rt.block_on(async {
            bus.start(Context::background()).unwrap();
            let err = bus
                .register_command_handler(|_, _: &Kick| Ok(Vec::new()))
                .unwrap_err();
            assert!(matches!(err, BusError::AlreadyStarted { .. }));
            bus.stop().await.unwrap();
        });
    }

    #[test]
    fn start_outside_runtime_fails() {
        let bus = MessageBus::new();
        assert!(matches!(
            bus.start(Context::background()),
            Err(BusError::NotInRuntime)
        ));
        assert_eq!(bus.state(), BusState::NotStarted);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let bus = MessageBus::new();
        bus.start(Context::background()).unwrap();

        assert!(matches!(
            bus.start(Context::background()),
            Err(BusError::AlreadyRunning)
        ));
        bus.stop().await.unwrap();
        assert_eq!(bus.state(), BusState::Stopped);
    }

    #[tokio::test]
    async fn submit_after_stop_reports_stopped() {
        let bus = MessageBus::new();
        bus.register_command_handler(|_, _: &Kick| Ok(Vec::new()))
            .unwrap();
        bus.start(Context::background()).unwrap();
        bus.stop().await.unwrap();
        bus.stop().await.unwrap();

        let err = bus
            .handle_command(&Context::background(), Kick::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Stopped));
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_send() {
        let bus = MessageBus::new();
        bus.register_command_handler(|_, _: &Kick| Ok(Vec::new()))
            .unwrap();
        bus.start(Context::background()).unwrap();

        let ctx = Context::background();
        ctx.cancel();
        let err = bus.handle_command(&ctx, Kick::default()).await.unwrap_err();
        assert!(matches!(
            err,
            BusError::Cancelled {
                stage: SubmitStage::Send,
                ..
            }
        ));

        bus.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deadline_while_waiting_for_result_reports_receive_stage() {
        let bus = MessageBus::new();
        bus.register_command_handler(|_, _: &Kick| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(Vec::new())
        })
        .unwrap();
        bus.start(Context::background()).unwrap();

        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let err = bus.handle_command(&ctx, Kick::default()).await.unwrap_err();
        assert!(matches!(
            err,
            BusError::Cancelled {
                stage: SubmitStage::Receive,
                ..
            }
        ));

        bus.stop().await.unwrap();
    }

    #[tokio::test]
    async fn cancelling_bus_context_ends_the_loop() {
        let bus = MessageBus::new();
        let bus_ctx = Context::background();
        bus.start(bus_ctx.clone()).unwrap();

        bus_ctx.cancel();
        bus.stop().await.unwrap();
        assert_eq!(bus.state(), BusState::Stopped);
    }
}
