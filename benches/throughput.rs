//! Throughput Benchmark for apiserver
//!
//! This benchmark measures the request path without the network:
//! decode, aggregate, dispatch, execute and serialize.

use apiserver::connection::Pipeline;
use apiserver::handlers::{execute, ApiResult, HandlerRegistry};
use apiserver::protocol::{HttpResponse, RequestDecoder, StatusCode};
use apiserver::request::{AggregatorConfig, RequestAggregator};
use apiserver::routing::Dispatcher;
use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const USERS_GET: &[u8] = b"GET /users HTTP/1.1\r\nhost: bench\r\nemail: a@b.c\r\n\r\n";

const TOKENS_POST: &[u8] = b"POST /tokens HTTP/1.1\r\nhost: bench\r\n\
content-type: application/x-www-form-urlencoded\r\ncontent-length: 28\r\n\r\n\
userNo=12312&password=secret";

/// Runs every request in `input` through the full synchronous path.
fn process(
    input: &[u8],
    decoder: &mut RequestDecoder,
    aggregator: &mut RequestAggregator,
    dispatcher: &Dispatcher,
) -> usize {
    let mut buf = BytesMut::from(input);
    let mut written = 0;
    while let Some(part) = decoder.decode(&mut buf).unwrap() {
        if let Some(request) = aggregator.push(part).unwrap() {
            let result = execute(dispatcher.dispatch(request.context));
            let response = HttpResponse::json(StatusCode::Ok, &result, request.keep_alive).unwrap();
            written += response.serialize().len();
        }
    }
    written
}

/// Benchmark the decode → respond path per request type
fn bench_request_path(c: &mut Criterion) {
    let dispatcher = Dispatcher::default();

    let mut group = c.benchmark_group("request_path");
    group.throughput(Throughput::Elements(1));

    group.bench_function("users_get", |b| {
        let mut decoder = RequestDecoder::new();
        let mut aggregator = RequestAggregator::new(AggregatorConfig::default());
        b.iter(|| black_box(process(USERS_GET, &mut decoder, &mut aggregator, &dispatcher)));
    });

    group.bench_function("tokens_post_form", |b| {
        let mut decoder = RequestDecoder::new();
        let mut aggregator = RequestAggregator::new(AggregatorConfig::default());
        b.iter(|| black_box(process(TOKENS_POST, &mut decoder, &mut aggregator, &dispatcher)));
    });

    group.finish();
}

/// Benchmark pipelined batches on one connection's state
fn bench_pipelined(c: &mut Criterion) {
    let dispatcher = Dispatcher::default();
    let batch: Vec<u8> = USERS_GET.repeat(32);

    let mut group = c.benchmark_group("pipelined");
    group.throughput(Throughput::Elements(32));

    group.bench_function("users_x32", |b| {
        let mut decoder = RequestDecoder::new();
        let mut aggregator = RequestAggregator::new(AggregatorConfig::default());
        b.iter(|| black_box(process(&batch, &mut decoder, &mut aggregator, &dispatcher)));
    });

    group.finish();
}

/// Benchmark response serialization alone
fn bench_response(c: &mut Criterion) {
    let mut result = ApiResult::new();
    result.set_result_code("200");
    result.set("message", "Success");
    result.set("userNo", "12312");

    let mut group = c.benchmark_group("response");
    group.throughput(Throughput::Elements(1));

    group.bench_function("json_keep_alive", |b| {
        b.iter(|| {
            let response = HttpResponse::json(StatusCode::Ok, black_box(&result), true).unwrap();
            black_box(response.serialize());
        });
    });

    group.bench_function("json_gzip", |b| {
        b.iter(|| {
            let response = HttpResponse::json(StatusCode::Ok, black_box(&result), true)
                .unwrap()
                .compressed()
                .unwrap();
            black_box(response.serialize());
        });
    });

    group.finish();
}

/// Benchmark concurrent connections sharing one registry
fn bench_concurrent(c: &mut Criterion) {
    let pipeline = Pipeline::new(
        Dispatcher::new(Arc::new(HandlerRegistry::with_defaults())),
        AggregatorConfig::default(),
    );

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_users", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let dispatcher = pipeline.dispatcher().clone();
                    thread::spawn(move || {
                        let mut decoder = RequestDecoder::new();
                        let mut aggregator = RequestAggregator::new(AggregatorConfig::default());
                        let mut written = 0;
                        for _ in 0..1_000 {
                            written +=
                                process(USERS_GET, &mut decoder, &mut aggregator, &dispatcher);
                        }
                        written
                    })
                })
                .collect();

            for handle in handles {
                black_box(handle.join().unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_request_path,
    bench_pipelined,
    bench_response,
    bench_concurrent,
);

criterion_main!(benches);
