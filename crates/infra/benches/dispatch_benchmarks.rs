use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use busline_core::{Entity, EntityId};
use busline_events::{
    CommandBase, Context, EventBase, EventRecorder, EventSource, IntoSharedEvent, MessageBus,
    MessageFactory, SharedEvent,
};
use busline_infra::{Repository, UnitOfWork};
use busline_observability::TracingMetrics;
use std::sync::Arc;

#[derive(Debug)]
struct Increment {
    base: CommandBase,
}
busline_events::impl_command!(Increment);

#[derive(Debug)]
struct Incremented {
    base: EventBase,
    depth: u8,
}
busline_events::impl_event!(Incremented);

#[derive(Debug, Clone)]
struct Counter {
    id: EntityId,
    name: String,
    recorder: EventRecorder,
}

impl Entity for Counter {
    type Id = EntityId;

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl EventSource for Counter {
    fn events(&self) -> &[SharedEvent] {
        self.recorder.events()
    }

    fn reset_events(&mut self) {
        self.recorder.reset_events()
    }
}

/// Bus whose command emits one event that cascades `depth` generations deep,
/// with `fan_out` handlers per event.
fn bus_with_cascade(depth: u8, fan_out: usize) -> MessageBus {
    let bus = MessageBus::builder()
        .metrics(Arc::new(TracingMetrics))
        .build();
    let factory = MessageFactory::system();

    let f = factory.clone();
    bus.register_command_handler(move |_, _: &Increment| {
        Ok(vec![
            Incremented {
                base: f.event("incremented"),
                depth: 0,
            }
            .into_shared(),
        ])
    })
    .unwrap();

    for handler in 0..fan_out {
        let f = factory.clone();
        bus.register_event_handler(move |_, evt: &Incremented| {
            if handler > 0 || evt.depth + 1 >= depth {
                return Ok(Vec::new());
            }
            Ok(vec![
                Incremented {
                    base: f.event("incremented"),
                    depth: evt.depth + 1,
                }
                .into_shared(),
            ])
        })
        .unwrap();
    }

    bus
}

fn bench_command_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let factory = MessageFactory::system();

    let mut group = c.benchmark_group("command_dispatch");
    group.throughput(Throughput::Elements(1));

    for (depth, fan_out) in [(1u8, 1usize), (4, 2), (16, 4)] {
        let bus = bus_with_cascade(depth, fan_out);
        rt.block_on(async { bus.start(Context::background()) }).unwrap();

        group.bench_with_input(
            BenchmarkId::new("cascade", format!("depth{depth}_fanout{fan_out}")),
            &bus,
            |b, bus| {
                let ctx = Context::background();
                b.iter(|| {
                    let cmd = Increment {
                        base: factory.command("increment"),
                    };
                    rt.block_on(bus.handle_command(&ctx, black_box(cmd))).unwrap();
                });
            },
        );

        rt.block_on(bus.stop()).unwrap();
    }

    group.finish();
}

fn bench_unit_of_work_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("unit_of_work_commit");

    for existing in [10usize, 100, 1000] {
        let mut uow = UnitOfWork::new(Repository::by_id(|a: &Counter, b: &Counter| a.name == b.name));
        uow.run(&Context::background(), |repo| {
            for n in 0..existing {
                repo.add(Counter {
                    id: EntityId::new(),
                    name: format!("counter-{n}"),
                    recorder: EventRecorder::new(),
                })?;
            }
            Ok(())
        })
        .unwrap();

        let mut next = 0usize;
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("add_one", existing), &existing, |b, _| {
            b.iter(|| {
                next += 1;
                let events = uow
                    .run(&Context::background(), |repo| {
                        repo.add(Counter {
                            id: EntityId::new(),
                            name: format!("extra-{next}"),
                            recorder: EventRecorder::new(),
                        })?;
                        Ok(())
                    })
                    .unwrap();
                black_box(events);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_command_dispatch, bench_unit_of_work_commit);
criterion_main!(benches);
