use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use emc_client::reply::get_channel;
use emc_client::{
    Cas, Client, ClientBuilder, ClientError, Completion, ConnectionId, ConnectionKind,
    Crc32Modulo, GetReply, HashKind, HostAddress, KeyTransformKind, Opcode, ProtocolViolation,
    Request, Response, ResponseStatus, ShardError, ShardResult, ShardingStrategy, Status,
    StoreArgs, StoreReply, Token, Transport, TransportError,
};

#[derive(Default)]
struct Log {
    connects: Vec<(SocketAddr, ConnectionId)>,
    sent: Vec<(ConnectionId, Request)>,
    closed: Vec<ConnectionId>,
}

/// In-memory transport that records every call.
struct RecordingTransport {
    log: Rc<RefCell<Log>>,
    next_conn: u64,
    refuse: Vec<SocketAddr>,
    fail_sends: bool,
}

impl RecordingTransport {
    fn new(log: Rc<RefCell<Log>>) -> Self {
        RecordingTransport {
            log,
            next_conn: 1,
            refuse: Vec::new(),
            fail_sends: false,
        }
    }
}

impl Transport for RecordingTransport {
    fn connect(
        &mut self,
        addr: SocketAddr,
        _kind: ConnectionKind,
    ) -> Result<ConnectionId, TransportError> {
        if self.refuse.contains(&addr) {
            return Err(TransportError::Connect(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        let conn = ConnectionId(self.next_conn);
        self.next_conn += 1;
        self.log.borrow_mut().connects.push((addr, conn));
        Ok(conn)
    }

    fn send(&mut self, conn: ConnectionId, request: Request) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Send(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        self.log.borrow_mut().sent.push((conn, request));
        Ok(())
    }

    fn close(&mut self, conn: ConnectionId) {
        self.log.borrow_mut().closed.push(conn);
    }
}

type Events = Rc<RefCell<Vec<(u32, Status)>>>;
type TestClient = Client<RecordingTransport, Events, u32>;

fn host(raw: &str) -> HostAddress {
    raw.parse().expect("host")
}

fn two_hosts() -> Vec<HostAddress> {
    vec![host("10.0.0.2:11211"), host("10.0.0.1:11211")]
}

fn first_byte(key: &[u8], count: usize) -> ShardResult {
    match (key.first(), count) {
        (_, 0) | (None, _) => Err(ShardError::NoEligibleHost),
        (Some(byte), count) => Ok(*byte as usize % count),
    }
}

fn record_get() -> Completion<Events, u32> {
    Completion::get(|events: &mut Events, reply: GetReply, id| {
        events.borrow_mut().push((id, reply.status))
    })
}

fn record_store() -> Completion<Events, u32> {
    Completion::store(|events: &mut Events, reply: StoreReply, id| {
        events.borrow_mut().push((id, reply.status))
    })
}

fn build(
    hosts: Vec<HostAddress>,
    transport: RecordingTransport,
    events: &Events,
    sharding: impl ShardingStrategy + 'static,
) -> TestClient {
    ClientBuilder::new()
        .hosts(hosts)
        .sharding(sharding)
        .build(transport, events.clone())
        .expect("client")
}

#[test]
fn routes_key_to_same_host_every_time() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        Crc32Modulo,
    );

    for id in 0..3 {
        client.get(b"foo", record_get(), id).expect("get");
    }

    let expected = Crc32Modulo.select(b"foo", 2).expect("select");
    let log = log.borrow();
    assert_eq!(log.connects.len(), 1);
    assert_eq!(log.connects[0].0, client.hosts()[expected].addr());
    assert!(log.sent.iter().all(|(conn, _)| *conn == log.connects[0].1));
    assert!(client.is_connected(expected));
    assert!(!client.is_connected(1 - expected));
}

#[test]
fn empty_host_list_has_no_eligible_host() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        Vec::new(),
        RecordingTransport::new(log.clone()),
        &events,
        Crc32Modulo,
    );

    let err = client.get(b"foo", record_get(), 0).unwrap_err();
    assert!(matches!(err, ClientError::NoEligibleHost));
    assert_eq!(client.pending_len(), 0);
    assert!(log.borrow().connects.is_empty());
}

#[test]
fn failed_connect_leaves_index_unchanged() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut transport = RecordingTransport::new(log.clone());
    transport.refuse.push("10.0.0.2:11211".parse().expect("addr"));
    let mut client = build(two_hosts(), transport, &events, first_byte);

    client.get(b"b", record_get(), 1).expect("host 0 reachable");
    let before = client.pending_len();
    let token_before = client.next_token();

    let err = client.get(b"a", record_get(), 2).unwrap_err();
    assert!(matches!(
        err,
        ClientError::ConnectFailed { addr, .. } if addr.to_string() == "10.0.0.2:11211"
    ));
    assert_eq!(client.pending_len(), before);
    assert_eq!(client.next_token(), token_before);
    assert!(events.borrow().is_empty());
    assert_eq!(client.stats().issue_failures, 1);
}

#[test]
fn failed_send_does_not_consume_token() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );

    client.transport_mut().fail_sends = true;
    let err = client.add(b"a", "v", record_store(), 0).unwrap_err();
    assert!(matches!(err, ClientError::SendFailed { .. }));
    assert_eq!(client.pending_len(), 0);
    assert_eq!(client.next_token(), Token::ZERO);

    client.transport_mut().fail_sends = false;
    assert_eq!(client.add(b"a", "v", record_store(), 0).expect("add"), Token::ZERO);
    assert_eq!(log.borrow().connects.len(), 1);
}

#[test]
fn shutdown_faults_every_pending_request_once() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );

    client.get(b"a", record_get(), 1).expect("get");
    client.add(b"b", "v", record_store(), 2).expect("add");
    client
        .set(b"c", "v", Cas::NONE, StoreArgs::default(), record_store(), 3)
        .expect("set");

    let stats = client.shutdown();
    assert_eq!(stats.shutdown, 3);
    assert_eq!(stats.in_flight, 0);

    let mut seen = events.borrow().clone();
    seen.sort_by_key(|(id, _)| *id);
    assert_eq!(
        seen,
        vec![
            (1, Status::Shutdown),
            (2, Status::Shutdown),
            (3, Status::Shutdown),
        ]
    );
    let mut closed = log.borrow().closed.clone();
    closed.sort();
    assert_eq!(closed, vec![ConnectionId(1), ConnectionId(2)]);
}

#[test]
fn drop_tears_down_like_shutdown() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );
    client.get(b"a", record_get(), 7).expect("get");
    drop(client);

    assert_eq!(*events.borrow(), vec![(7, Status::Shutdown)]);
    assert_eq!(log.borrow().closed, vec![ConnectionId(1)]);
}

#[test]
fn responses_match_tokens_out_of_order() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );

    let tokens: Vec<Token> = (0..3)
        .map(|id| client.get(b"a", record_get(), id).expect("get"))
        .collect();
    assert_eq!(tokens, vec![Token::new(0), Token::new(1), Token::new(2)]);

    let sent: Vec<(Token, Opcode)> = log
        .borrow()
        .sent
        .iter()
        .map(|(_, request)| (request.opaque, request.opcode))
        .collect();
    assert_eq!(
        sent,
        tokens.iter().map(|t| (*t, Opcode::GetK)).collect::<Vec<_>>()
    );

    client
        .on_response(Response::new(Opcode::GetK, tokens[2], ResponseStatus::KeyNotFound))
        .expect("response");
    client
        .on_response(
            Response::new(Opcode::GetK, tokens[0], ResponseStatus::NoError).with_value("a", "x"),
        )
        .expect("response");

    assert_eq!(
        *events.borrow(),
        vec![
            (2, Status::Server(ResponseStatus::KeyNotFound)),
            (0, Status::Server(ResponseStatus::NoError)),
        ]
    );
    assert_eq!(client.pending_len(), 1);
    assert!(client.is_pending(tokens[1]));
    assert_eq!(client.stats().responses, 2);
}

#[test]
fn protocol_violations_are_reported_separately() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );

    assert_eq!(
        client.on_response(Response::new(Opcode::GetK, Token::new(42), ResponseStatus::NoError)),
        Err(ProtocolViolation::UnknownToken(Token::new(42)))
    );

    let token = client
        .replace(b"a", "v", Cas::new(5), StoreArgs::new(1, 2), record_store(), 0)
        .expect("replace");
    assert_eq!(
        client.on_response(Response::new(Opcode::Add, token, ResponseStatus::NoError)),
        Err(ProtocolViolation::OpcodeMismatch {
            token,
            sent: Opcode::Replace.as_u8(),
            received: Opcode::Add.as_u8(),
        })
    );
    assert!(client.is_pending(token));
    assert!(events.borrow().is_empty());

    assert_eq!(
        client.on_connection_error(ConnectionId(99)),
        Err(ProtocolViolation::UnknownConnection(ConnectionId(99)))
    );
}

#[test]
fn connection_loss_faults_only_that_host() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );

    // "a" routes to host 1, "b" to host 0.
    client.get(b"a", record_get(), 1).expect("get");
    client.get(b"b", record_get(), 2).expect("get");
    client.get(b"a", record_get(), 3).expect("get");
    let lost = client.hosts()[1].connection().expect("connected");

    assert_eq!(client.on_connection_error(lost), Ok(2));
    assert_eq!(
        *events.borrow(),
        vec![(1, Status::ConnectionLost), (3, Status::ConnectionLost)]
    );
    assert!(!client.is_connected(1));
    assert!(client.is_connected(0));
    assert_eq!(client.pending_len(), 1);
    assert_eq!(log.borrow().closed, vec![lost]);

    client.get(b"a", record_get(), 4).expect("reconnect");
    assert!(client.is_connected(1));
    assert_ne!(client.hosts()[1].connection(), Some(lost));
    assert_eq!(client.stats().connection_lost, 2);
}

#[test]
fn sweep_faults_only_expired_requests() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client: TestClient = ClientBuilder::new()
        .hosts(two_hosts())
        .sharding(first_byte)
        .request_timeout(Duration::from_millis(100))
        .build(RecordingTransport::new(log), events.clone())
        .expect("client");

    client.get(b"a", record_get(), 1).expect("get");
    let issued = Instant::now();

    assert_eq!(client.sweep_expired(issued), 0);
    assert_eq!(client.sweep_expired(issued + Duration::from_millis(200)), 1);
    assert_eq!(*events.borrow(), vec![(1, Status::TimedOut)]);
    assert_eq!(client.pending_len(), 0);
    assert_eq!(client.stats().timed_out, 1);
}

#[test]
fn prune_cancels_but_keeps_connections() {
    let log = Rc::new(RefCell::new(Log::default()));
    let events = Events::default();
    let mut client = build(
        two_hosts(),
        RecordingTransport::new(log.clone()),
        &events,
        first_byte,
    );

    client.get(b"a", record_get(), 1).expect("get");
    client.get(b"b", record_get(), 2).expect("get");
    assert_eq!(client.prune_pending(), 2);
    assert_eq!(
        *events.borrow(),
        vec![(1, Status::Cancelled), (2, Status::Cancelled)]
    );
    assert!(client.is_connected(0) && client.is_connected(1));
    assert!(log.borrow().closed.is_empty());
}

#[test]
fn config_built_client_truncates_long_keys() {
    let log = Rc::new(RefCell::new(Log::default()));
    let config = emc_client::ClientConfig {
        hosts: vec!["10.0.0.1:11211".to_string()],
        hash: HashKind::None,
        key_transform: Some(KeyTransformKind::Len250),
        ..Default::default()
    };
    let mut client: Client<RecordingTransport> =
        Client::from_config(&config, RecordingTransport::new(log.clone()), ()).expect("client");

    let long_key = vec![b'k'; 300];
    client.get(&long_key, Completion::Discard, ()).expect("get");
    assert_eq!(log.borrow().sent[0].1.key.len(), 250);
}

#[test]
fn reply_channel_receives_response() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut client: Client<RecordingTransport> = ClientBuilder::new()
        .host(host("10.0.0.1:11211"))
        .hash_kind(HashKind::Crc32)
        .build(RecordingTransport::new(log), ())
        .expect("client");

    let (completion, mut rx) = get_channel();
    let token = client.get(b"k", completion, ()).expect("get");
    client
        .on_response(
            Response::new(Opcode::GetK, token, ResponseStatus::NoError)
                .with_value("k", "hello")
                .with_cas(Cas::new(77)),
        )
        .expect("response");

    let reply = rx.try_recv().expect("reply");
    assert!(reply.status.is_ok());
    assert_eq!(&reply.key[..], b"k");
    assert_eq!(&reply.value[..], b"hello");
    assert_eq!(reply.cas, Cas::new(77));
}

#[test]
fn discarded_responses_are_counted() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut client: Client<RecordingTransport> = ClientBuilder::new()
        .host(host("10.0.0.1:11211"))
        .hash_kind(HashKind::None)
        .build(RecordingTransport::new(log), ())
        .expect("client");

    let token = client
        .set(b"k", "v", Cas::NONE, StoreArgs::default(), Completion::Discard, ())
        .expect("set");
    client
        .on_response(Response::new(Opcode::Set, token, ResponseStatus::NoError))
        .expect("response");

    let stats = client.stats();
    assert_eq!(stats.issued, 1);
    assert_eq!(stats.responses, 1);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.retired(), stats.issued);
}
