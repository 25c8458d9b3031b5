use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use saga::{
    CommandError, SagaDefinitionBuilder, SagaEnvelope, SagaEvent, SagaProcessor, SagaProgress,
    command_fn,
};
use serde::{Deserialize, Serialize};
use transport::InMemoryTransport;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Trip {
    id: u64,
    traveller: String,
    nights: u32,
}

fn trip() -> Trip {
    Trip {
        id: 1,
        traveller: "Ada Lovelace".to_string(),
        nights: 3,
    }
}

fn bench_envelope_encode(c: &mut Criterion) {
    let envelope = SagaEnvelope::new(trip(), SagaProgress::forward(1));

    c.bench_function("saga/envelope_encode", |b| {
        b.iter(|| envelope.encode().unwrap());
    });
}

fn bench_envelope_decode(c: &mut Criterion) {
    let bytes = SagaEnvelope::new(trip(), SagaProgress::backward(2))
        .encode()
        .unwrap();

    c.bench_function("saga/envelope_decode", |b| {
        b.iter(|| SagaEnvelope::<Trip>::decode(&bytes).unwrap());
    });
}

async fn travel_processor(fail_payment: bool) -> SagaProcessor<Trip, InMemoryTransport> {
    let ok = || command_fn(|_: Trip| async { Ok::<(), CommandError>(()) });

    SagaDefinitionBuilder::new()
        .step("FlightBookingService")
        .on_reply(ok())
        .with_compensation(ok())
        .step("HotelBookingService")
        .on_reply(ok())
        .with_compensation(ok())
        .step("PaymentService")
        .on_reply(command_fn(move |_: Trip| async move {
            if fail_payment {
                Err(CommandError::new("card declined"))
            } else {
                Ok(())
            }
        }))
        .build(Arc::new(InMemoryTransport::new()))
        .await
        .unwrap()
}

async fn run_to_end(processor: &SagaProcessor<Trip, InMemoryTransport>) {
    let mut events = processor.events();
    processor.start(trip()).await.unwrap();
    loop {
        let event: SagaEvent = events.recv().await.unwrap();
        if event.is_terminal() {
            break;
        }
    }
}

fn bench_saga_completed(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let processor = rt.block_on(travel_processor(false));

    c.bench_function("saga/three_steps_completed", |b| {
        b.iter(|| rt.block_on(run_to_end(&processor)));
    });
}

fn bench_saga_rolled_back(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let processor = rt.block_on(travel_processor(true));

    c.bench_function("saga/three_steps_rolled_back", |b| {
        b.iter(|| rt.block_on(run_to_end(&processor)));
    });
}

criterion_group!(
    benches,
    bench_envelope_encode,
    bench_envelope_decode,
    bench_saga_completed,
    bench_saga_rolled_back,
);
criterion_main!(benches);
