use std::io::{Read, Write};
use std::net::TcpListener;

use super::{Features, ModelClient};
use crate::config::NUM_LABELS;

// Minimal in-process predictor: one ring-mode session on the training
// stream and one prediction exchange on the prediction stream.
fn spawn_stub() -> (String, String, std::thread::JoinHandle<Vec<u32>>) {
    let train = TcpListener::bind("127.0.0.1:0").unwrap();
    let predict = TcpListener::bind("127.0.0.1:0").unwrap();
    let train_addr = train.local_addr().unwrap().to_string();
    let predict_addr = predict.local_addr().unwrap().to_string();

    let handle = std::thread::spawn(move || {
        let (mut t, _) = train.accept().unwrap();
        let (mut p, _) = predict.accept().unwrap();
        let mut commands = Vec::new();
        let mut word = [0u8; 4];

        // Ring announcement, echoed back.
        t.read_exact(&mut word).unwrap();
        commands.push(u32::from_le_bytes(word));
        t.write_all(&word).unwrap();

        // One operation command, answered with obs_to_wait = 3.
        t.read_exact(&mut word).unwrap();
        commands.push(u32::from_le_bytes(word));
        t.write_all(&3i32.to_le_bytes()).unwrap();

        // One prediction exchange.
        let mut features = [0u8; 3 * 4 + NUM_LABELS];
        p.read_exact(&mut features).unwrap();
        p.write_all(&4.5f32.to_le_bytes()).unwrap();
        p.write_all(&0.25f32.to_le_bytes()).unwrap();

        // End-of-session marker.
        t.read_exact(&mut word).unwrap();
        commands.push(u32::from_le_bytes(word));
        commands
    });

    (train_addr, predict_addr, handle)
}

#[test]
fn offline_commands_return_metrics() {
    let train = TcpListener::bind("127.0.0.1:0").unwrap();
    let predict = TcpListener::bind("127.0.0.1:0").unwrap();
    let train_addr = train.local_addr().unwrap().to_string();
    let predict_addr = predict.local_addr().unwrap().to_string();

    let stub = std::thread::spawn(move || {
        let (mut t, _) = train.accept().unwrap();
        let (_p, _) = predict.accept().unwrap();
        let mut word = [0u8; 4];
        let mut commands = Vec::new();
        for _ in 0..2 {
            t.read_exact(&mut word).unwrap();
            commands.push(u32::from_le_bytes(word));
            for err in [0.5f32, 1.5, 2.5] {
                t.write_all(&err.to_le_bytes()).unwrap();
            }
        }
        commands
    });

    let mut client = ModelClient::connect(&train_addr, &predict_addr).unwrap();
    let trained = client.train(120).unwrap();
    assert_eq!(trained.ps_pow_err, 0.5);
    assert_eq!(trained.pl_pow_err, 1.5);
    assert_eq!(trained.time_err, 2.5);
    let tested = client.test(120).unwrap();
    assert_eq!(tested.time_err, 2.5);

    let commands = stub.join().unwrap();
    assert_eq!(commands[0], 120 | 1 << 31);
    assert_eq!(commands[1], 120);
}

#[test]
fn ring_session_round_trip() {
    let (train_addr, predict_addr, stub) = spawn_stub();
    let mut client = ModelClient::connect(&train_addr, &predict_addr).unwrap();

    client.announce_ring(200).unwrap();
    assert_eq!(client.operation(200).unwrap(), 3);

    let mut per_label = [0u8; NUM_LABELS];
    per_label[4] = 2;
    let prediction = client
        .predict(&Features {
            cpu_user: 10.0,
            cpu_kernel: 5.0,
            cpu_idle: 85.0,
            per_label,
        })
        .unwrap();
    assert_eq!(prediction.power, 4.5);
    assert_eq!(prediction.time, 0.25);

    client.end_session().unwrap();

    let commands = stub.join().unwrap();
    assert_eq!(commands[0], 200);
    // Operation command: measurement count in the low bits, train intent
    // in the MSB.
    assert_eq!(commands[1], 200 | 1 << 31);
    assert_eq!(commands[2], 0);
}
