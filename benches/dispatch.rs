use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use wirebrief::{Dispatcher, Packet, RenderOptions, Renderer};

fn dns_query(id: u16, name: &str) -> Vec<u8> {
    let mut dns = id.to_be_bytes().to_vec();
    dns.extend_from_slice(&[0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
    for label in name.split('.') {
        dns.push(label.len() as u8);
        dns.extend_from_slice(label.as_bytes());
    }
    dns.extend_from_slice(&[0, 0, 1, 0, 1]);

    let mut udp = 53000u16.to_be_bytes().to_vec();
    udp.extend_from_slice(&53u16.to_be_bytes());
    udp.extend_from_slice(&((8 + dns.len()) as u16).to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(&dns);

    let mut ip = vec![0x45, 0x00];
    ip.extend_from_slice(&((20 + udp.len()) as u16).to_be_bytes());
    ip.extend_from_slice(&[0, 0, 0x40, 0, 64, 17, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1]);
    ip.extend_from_slice(&udp);

    let mut frame = vec![0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02, 0x08, 0x00];
    frame.extend_from_slice(&ip);
    frame
}

fn arp_request(host: u8) -> Vec<u8> {
    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, host, 0x08, 0x06]);
    frame.extend_from_slice(&[0, 1, 0x08, 0, 6, 4, 0, 1]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, host, 10, 0, 0, host]);
    frame.extend_from_slice(&[0; 6]);
    frame.extend_from_slice(&[10, 0, 0, 1]);
    frame
}

fn capture() -> Vec<Packet> {
    (0..1000u32)
        .map(|i| {
            let frame = if i % 4 == 0 {
                arp_request((i % 200) as u8 + 2)
            } else {
                dns_query(i as u16, &format!("host{}.example.com", i % 50))
            };
            Packet::from_ethernet(&frame, Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap()).unwrap()
        })
        .collect()
}

fn bench_dispatch(c: &mut Criterion) {
    let packets = capture();

    c.bench_function("dispatch_1000_packets", |b| {
        b.iter(|| {
            let mut dispatcher = Dispatcher::default();
            for packet in &packets {
                dispatcher.dispatch(black_box(packet));
            }
            dispatcher
        })
    });

    let mut dispatcher = Dispatcher::default();
    for packet in &packets {
        dispatcher.dispatch(packet);
    }
    c.bench_function("render_report", |b| {
        b.iter(|| {
            let mut renderer = Renderer::new(Vec::new(), RenderOptions::default());
            for block in dispatcher.summaries() {
                renderer.render(&block).unwrap();
            }
            renderer.into_inner()
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
