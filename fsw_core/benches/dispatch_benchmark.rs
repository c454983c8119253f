//! Command path micro-benchmark.
//!
//! Measures:
//! - Header parse + checksum alone
//! - Full dispatch of a registered command
//! - Rejected dispatch (unregistered function code)
//! - Child queue enqueue + dequeue round trip

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use fsw_common::events::{EventKind, EventSink, SharedSink};
use fsw_core::child::ChildQueue;
use fsw_core::cmd::CmdDispatcher;
use fsw_core::msg::{CmdPacket, CmdView};

const MID: u16 = 0x1880;

/// Discards events so the benchmark measures the command path only.
struct NullSink;

impl EventSink for NullSink {
    fn send(&self, _id: u16, _kind: EventKind, _text: &str) {}
}

fn null_sink() -> SharedSink {
    Arc::new(NullSink)
}

fn bench_parse(c: &mut Criterion) {
    let pkt = CmdPacket::build(MID, 4, &[0u8; 32]).unwrap();
    c.bench_function("cmd_view_parse_checksum", |b| {
        b.iter(|| {
            let view = CmdView::parse(black_box(&pkt)).unwrap();
            view.checksum_valid()
        });
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut disp: CmdDispatcher<u64> = CmdDispatcher::new(null_sink());
    disp.register(4, 32, |acc: &mut u64, buf: &[u8]| {
        *acc = acc.wrapping_add(u64::from(buf[8]));
        true
    })
    .unwrap();
    let good = CmdPacket::build(MID, 4, &[1u8; 32]).unwrap();
    let unknown = CmdPacket::build(MID, 20, &[]).unwrap();
    let mut acc = 0u64;

    c.bench_function("dispatch_registered", |b| {
        b.iter(|| disp.dispatch(&mut acc, black_box(&good)));
    });
    c.bench_function("dispatch_unregistered", |b| {
        b.iter(|| disp.dispatch(&mut acc, black_box(&unknown)));
    });
}

fn bench_queue_roundtrip(c: &mut Criterion) {
    let (mut tx, mut rx) = ChildQueue::<8>::create(null_sink());
    let pkt = CmdPacket::build(MID, 4, &[7u8; 64]).unwrap();

    c.bench_function("child_queue_roundtrip", |b| {
        b.iter(|| {
            tx.enqueue(black_box(&pkt)).unwrap();
            rx.dequeue().unwrap()
        });
    });
}

criterion_group!(benches, bench_parse, bench_dispatch, bench_queue_roundtrip);
criterion_main!(benches);
