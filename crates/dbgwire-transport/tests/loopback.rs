//! Writer output carried over a real loopback socket.

use std::thread;
use std::time::Duration;

use dbgwire_core::{Action, EventType};
use dbgwire_protocol::{Cursor, Reader, Writer};
use dbgwire_transport::{Connection, Incoming, TransportConfig};

fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn pair() -> (Connection, Connection) {
    let mut host = Connection::listen(TransportConfig::loopback()).unwrap();
    let port = host.local_addr().unwrap().port();
    let client = Connection::connect("127.0.0.1", port, TransportConfig::default()).unwrap();
    assert!(eventually(|| host.poll_accept()));
    (host, client)
}

fn recv(conn: &mut Connection) -> Incoming {
    let mut message = None;
    assert!(eventually(|| {
        message = conn.recv().unwrap();
        message.is_some()
    }));
    message.unwrap()
}

#[test]
fn finalized_buffer_arrives_byte_identical() {
    let (mut host, mut client) = pair();

    let mut writer = Writer::new();
    writer.begin_event(EventType::SetStatus).unwrap();
    writer.write_u32("state", 2).unwrap();
    writer.end_event().unwrap();
    writer.begin_event(EventType::SetLocals).unwrap();
    writer.write_data("blob", &vec![0x5a; 5000]).unwrap();
    writer.end_event().unwrap();
    writer.finalize().unwrap();

    host.send_buffer(writer.as_bytes()).unwrap();
    let Incoming::Buffer(buf) = recv(&mut client) else {
        panic!("expected a buffer");
    };
    assert_eq!(buf, writer.as_bytes());

    let mut reader = Reader::new(&buf).unwrap();
    assert_eq!(reader.get_event().unwrap(), Some(EventType::SetStatus.id()));
    assert_eq!(reader.find_u32("state", Cursor::EVENT).unwrap().value, 2);
}

#[test]
fn actions_and_buffers_interleave_in_order() {
    let (mut host, mut client) = pair();

    let mut writer = Writer::new();
    writer.finalize().unwrap();

    client.send_action(Action::Step.code()).unwrap();
    client.send_buffer(writer.as_bytes()).unwrap();
    client.send_action(Action::Custom(0x1002).code()).unwrap();

    assert_eq!(recv(&mut host), Incoming::Action(Action::Step.code()));
    assert_eq!(recv(&mut host), Incoming::Buffer(vec![0, 0, 0, 4]));
    assert_eq!(recv(&mut host), Incoming::Action(0x1002));
}

#[test]
fn client_sees_host_going_away() {
    let (host, mut client) = pair();
    drop(host);

    assert!(eventually(|| {
        let _ = client.recv();
        !client.is_connected()
    }));
    assert!(client.send_action(1).is_err());
}
