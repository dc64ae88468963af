//! End-to-end transfers over loopback TCP.

use std::io::Read;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use imgstream::codec::{
    ArrayDescriptor, Buffer, CodecError, DecodeLimits, ElementType, Image, Layout, Metadata,
    RawArray, Stage,
};
use imgstream::transport::{Reliability, TransportError};
use imgstream::{receive, request, send, serve, StreamError, TransferOptions};

fn fast() -> TransferOptions {
    TransferOptions::default()
        .with_timeout_secs(10)
        .with_poll_interval(Duration::from_millis(50))
}

/// Reserve an ephemeral port and release it for the transfer to use.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn sample(ty: ElementType, shape: Vec<usize>, layout: Layout) -> Image {
    let desc = ArrayDescriptor::new(shape, ty, layout);
    Image::from_fn(desc, |p| {
        p.iter().enumerate().map(|(axis, v)| (axis + 1) * v).sum::<usize>() as f64 % 100.0
    })
    .unwrap()
    .with_metadata(Metadata::new("embryo_t17", "/data/embryo.tif", 12))
}

fn push(image: &Image, options: &TransferOptions, receiver_delay: Duration) -> Image {
    let port = free_port();
    let recv_options = options.clone();
    let receiver = thread::spawn(move || {
        thread::sleep(receiver_delay);
        receive(port, &recv_options)
    });

    let sent = send(image, &format!("127.0.0.1:{port}"), options).unwrap();
    let received = receiver.join().unwrap().unwrap();
    assert!(sent > 0);
    received
}

fn pull(image: &Image, options: &TransferOptions, requester_delay: Duration) -> Image {
    let port = free_port();
    let image = image.clone();
    let send_options = options.clone();
    let server = thread::spawn(move || serve(&image, port, &send_options));

    thread::sleep(requester_delay);
    let received = request(&format!("tcp://127.0.0.1:{port}"), options).unwrap();
    server.join().unwrap().unwrap();
    received
}

#[test]
fn push_delivers_identical_array() {
    let image = sample(ElementType::UInt16, vec![200, 100, 5], Layout::Sliced);
    assert_eq!(push(&image, &fast(), Duration::ZERO), image);
}

#[test]
fn pull_delivers_identical_array() {
    let image = sample(ElementType::Float32, vec![200, 100, 5], Layout::Tiled(vec![50, 20, 5]));
    assert_eq!(pull(&image, &fast(), Duration::ZERO), image);
}

#[test]
fn push_and_pull_agree_whoever_starts_first() {
    let image = sample(ElementType::Int16, vec![40, 30, 3], Layout::Tiled(vec![16, 8, 3]));
    let options = fast();

    // Sender dials before the receiver listens.
    let pushed_late = push(&image, &options, Duration::from_millis(300));
    // Requester dials before the server listens.
    let port = free_port();
    let requester_options = options.clone();
    let requester = thread::spawn(move || {
        request(&format!("127.0.0.1:{port}"), &requester_options)
    });
    thread::sleep(Duration::from_millis(300));
    serve(&image, port, &options).unwrap();
    let pulled_late = requester.join().unwrap().unwrap();

    assert_eq!(pushed_late, image);
    assert_eq!(pulled_late, image);
    assert_eq!(pull(&image, &options, Duration::ZERO), pushed_late);
}

#[test]
fn every_type_and_layout_crosses_the_wire() {
    // A small send buffer forces many messages per transfer.
    let options = fast().with_buffer_size(4096);
    let layouts = [
        Layout::Contiguous,
        Layout::Sliced,
        Layout::Tiled(vec![16, 8, 3]),
    ];
    for ty in ElementType::ALL {
        for layout in &layouts {
            let image = sample(ty, vec![40, 30, 3], layout.clone());
            assert_eq!(push(&image, &options, Duration::ZERO), image, "{ty} {layout:?}");
        }
    }
}

#[test]
fn size_one_axis_crosses_the_wire() {
    let image = sample(ElementType::Float64, vec![1, 17, 1], Layout::Sliced);
    assert_eq!(pull(&image, &fast(), Duration::ZERO), image);
}

#[test]
fn best_effort_transfer_completes() {
    let options = fast().with_reliability(Reliability::BestEffort);
    let image = sample(ElementType::UInt8, vec![64, 64], Layout::Contiguous);
    assert_eq!(push(&image, &options, Duration::ZERO), image);
}

#[test]
fn receiver_refuses_array_beyond_its_limits() {
    let port = free_port();
    let limits = DecodeLimits {
        max_elements: 1_000,
        max_blocks: 16,
    };
    let recv_options = fast().with_limits(limits);
    let receiver = thread::spawn(move || receive(port, &recv_options));

    let options = fast().with_reliability(Reliability::BestEffort);
    let image = sample(ElementType::Float32, vec![64, 64], Layout::Contiguous);
    let _ = send(&image, &format!("127.0.0.1:{port}"), &options);

    let err = receiver.join().unwrap().unwrap_err();
    assert!(
        matches!(err, StreamError::Codec(CodecError::Validation(_))),
        "unexpected error {err:?}"
    );
}

#[test]
fn receiver_without_sender_times_out() {
    let options = fast().with_timeout_secs(1);
    let started = Instant::now();
    let err = receive(free_port(), &options).unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "unexpected error {err:?}");
    assert_eq!(err.stage(), Stage::Header);
    assert!(elapsed >= Duration::from_millis(900), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "returned after {elapsed:?}");
}

#[test]
fn sender_without_receiver_times_out() {
    let options = fast().with_timeout_secs(1);
    let image = sample(ElementType::UInt8, vec![8, 8], Layout::Contiguous);
    let started = Instant::now();
    let err = send(&image, &format!("127.0.0.1:{}", free_port()), &options).unwrap_err();

    assert!(err.is_timeout(), "unexpected error {err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn silent_peer_breaks_confirmed_transfer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // Accepts and drains, but never acknowledges.
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink);
    });

    let options = fast().with_timeout_secs(1);
    let image = sample(ElementType::UInt8, vec![8, 8], Layout::Contiguous);
    let err = send(&image, &addr.to_string(), &options).unwrap_err();

    assert!(
        matches!(
            err,
            StreamError::Transport {
                source: TransportError::AckTimeout { .. },
                ..
            }
        ),
        "unexpected error {err:?}"
    );
    peer.join().unwrap();
}

struct Hollow {
    descriptor: ArrayDescriptor,
    metadata: Metadata,
}

impl RawArray for Hollow {
    fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn buffers(&self) -> &[Buffer] {
        &[]
    }
}

#[test]
fn empty_array_never_opens_a_socket() {
    let empty = Hollow {
        descriptor: ArrayDescriptor::new(vec![16, 0], ElementType::Float32, Layout::Contiguous),
        metadata: Metadata::default(),
    };
    let port = free_port();

    let started = Instant::now();
    let err = serve(&empty, port, &fast()).unwrap_err();
    assert!(matches!(err, StreamError::Codec(CodecError::Validation(_))));
    assert!(started.elapsed() < Duration::from_millis(500));

    // The port was never bound.
    TcpListener::bind(("0.0.0.0", port)).unwrap();
}
