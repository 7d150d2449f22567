//! # Dispatcher Benchmark Harness
//!
//! Purpose: Measure the per-request cost of the dispatch path (transform,
//! shard, correlate, complete) with no network in the way.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: A fixed PRNG seed keeps runs comparable.
//! 2. **Allocation Control**: Keys and values are built before timing starts.
//! 3. **Loopback Transport**: Requests are answered in-process through
//!    `on_response`, so only dispatcher work is timed.
//!
//! Usage: `emc-bench [ops] [keys] [hosts] [value_size]`

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use tracing::info;
use tracing_subscriber::EnvFilter;

use emc_client::{
    Cas, Client, ClientBuilder, Completion, ConnectionId, ConnectionKind, GetReply, HashKind,
    HostAddress, Request, Response, ResponseStatus, StoreArgs, StoreReply, Transport,
    TransportError,
};

const DEFAULT_OP_COUNT: usize = 1_000_000;
const DEFAULT_KEY_COUNT: usize = 1 << 16;
const DEFAULT_HOST_COUNT: usize = 4;
const DEFAULT_VALUE_SIZE: usize = 128;
const KEY_SIZE: usize = 16;

struct BenchConfig {
    op_count: usize,
    requested_keys: usize,
    key_count: usize,
    key_mask: usize,
    host_count: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let host_count = parse_usize(args.next(), DEFAULT_HOST_COUNT).max(1);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);

        let key_count = normalize_power_of_two(requested_keys);
        BenchConfig {
            op_count,
            requested_keys,
            key_count,
            key_mask: key_count - 1,
            host_count,
            value_size,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    value.max(1).next_power_of_two()
}

/// Tiny deterministic PRNG; XorShift is fast and keeps the workload reproducible.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn build_buffers(count: usize, size: usize, seed: u64) -> Vec<Bytes> {
    (0..count)
        .map(|i| {
            let mut buffer = vec![0u8; size];
            let bytes = (seed ^ i as u64).to_le_bytes();
            let copy_len = size.min(bytes.len());
            buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
            Bytes::from(buffer)
        })
        .collect()
}

/// Answers every request in-process with a success status.
#[derive(Default)]
struct LoopbackTransport {
    next_conn: u64,
    queued: Vec<Response>,
}

impl Transport for LoopbackTransport {
    fn connect(
        &mut self,
        _addr: SocketAddr,
        _kind: ConnectionKind,
    ) -> Result<ConnectionId, TransportError> {
        self.next_conn += 1;
        Ok(ConnectionId(self.next_conn))
    }

    fn send(&mut self, _conn: ConnectionId, request: Request) -> Result<(), TransportError> {
        let response = Response::new(request.opcode, request.opaque, ResponseStatus::NoError)
            .with_cas(Cas::new(u64::from(request.opaque.get()) + 1));
        let response = if request.opcode.is_get() {
            response.with_value(request.key.into_bytes(), request.value)
        } else {
            response
        };
        self.queued.push(response);
        Ok(())
    }

    fn close(&mut self, _conn: ConnectionId) {}
}

/// Completed-reply counter handed to every callback.
#[derive(Default)]
struct Tally {
    ok: u64,
    failed: u64,
}

impl Tally {
    fn record(&mut self, ok: bool) {
        if ok {
            self.ok += 1;
        } else {
            self.failed += 1;
        }
    }
}

type BenchClient = Client<LoopbackTransport, Tally>;

fn drain(client: &mut BenchClient) -> Result<()> {
    let responses = std::mem::take(&mut client.transport_mut().queued);
    for response in responses {
        client.on_response(response)?;
    }
    Ok(())
}

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!(
        "{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)"
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        eprintln!("emc-bench failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = BenchConfig::from_args();

    let hosts: Vec<HostAddress> = (0..config.host_count)
        .map(|i| -> Result<HostAddress> {
            let port = u16::try_from(11211 + i).context("host count exceeds port range")?;
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port).into())
        })
        .collect::<Result<_>>()?;
    let mut client: BenchClient = ClientBuilder::new()
        .hosts(hosts)
        .hash_kind(HashKind::Crc32)
        .build(LoopbackTransport::default(), Tally::default())
        .context("building client")?;

    let keys = build_buffers(config.key_count, KEY_SIZE, 0xA5A5_A5A5_A5A5_A5A5);
    let values = build_buffers(config.key_count, config.value_size, 0x5A5A_5A5A_5A5A_5A5A);

    info!(
        requested_keys = config.requested_keys,
        key_count = config.key_count,
        ops = config.op_count,
        hosts = config.host_count,
        value_size = config.value_size,
        "starting benchmark"
    );

    let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        client.set(
            &keys[idx],
            values[idx].clone(),
            Cas::NONE,
            StoreArgs::default(),
            Completion::store(|tally: &mut Tally, reply: StoreReply, _| {
                tally.record(reply.status.is_ok())
            }),
            (),
        )?;
        drain(&mut client)?;
    }
    report("SET", config.op_count, start.elapsed());

    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        client.get(
            &keys[idx],
            Completion::get(|tally: &mut Tally, reply: GetReply, _| {
                tally.record(reply.status.is_ok())
            }),
            (),
        )?;
        drain(&mut client)?;
    }
    report("GET", config.op_count, start.elapsed());

    let tally = client.user();
    ensure!(
        tally.ok == 2 * config.op_count as u64 && tally.failed == 0,
        "lost replies: ok={}, failed={}",
        tally.ok,
        tally.failed
    );

    let stats = client.shutdown();
    info!(
        issued = stats.issued,
        responses = stats.responses,
        connects = stats.connects,
        "benchmark finished"
    );
    Ok(())
}
