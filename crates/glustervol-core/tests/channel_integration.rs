// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Channel scenarios run against the in-memory volume library.

use std::sync::Arc;

use glustervol_core::testing::fake::FakeLibrary;
use glustervol_core::{
    ConnectOptions, GlusterProvider, IoWriter, OpenOptions, VolError, VolPath, WatchConfig,
};

fn provider() -> GlusterProvider {
    GlusterProvider::with_defaults(
        Arc::new(FakeLibrary::new()),
        ConnectOptions::default(),
        WatchConfig::default(),
    )
}

fn read_to_end(provider: &GlusterProvider, path: &VolPath) -> Vec<u8> {
    let mut channel = provider.new_channel(path, OpenOptions::reading(), None).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 16];
    while let Some(n) = channel.read(&mut buf).unwrap() {
        out.extend_from_slice(&buf[..n]);
    }
    channel.close().unwrap();
    out
}

#[test]
fn write_then_append_yields_hello_world() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/a").unwrap();

    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), Some(0o666))
        .unwrap();
    assert_eq!(channel.write(b"Hello, ").unwrap(), 7);
    channel.close().unwrap();

    let mut appender = provider
        .new_channel(&path, OpenOptions::writing().append(true), None)
        .unwrap();
    assert_eq!(appender.write(b"world!").unwrap(), 6);
    assert_eq!(appender.size().unwrap(), 13);
    appender.close().unwrap();

    assert_eq!(read_to_end(&provider, &path), b"Hello, world!");
}

#[test]
fn create_new_on_existing_path_always_already_exists() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/exists").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::writing().create(true), None)
        .unwrap();
    channel.close().unwrap();

    for mode in [None, Some(0o600), Some(0o777)] {
        let err = provider
            .new_channel(&path, OpenOptions::writing().create_new(true), mode)
            .unwrap_err();
        assert!(matches!(err, VolError::AlreadyExists(_)), "mode {mode:?}: {err}");
    }
}

#[test]
fn reads_require_the_read_option() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/wonly").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::writing().create(true), None)
        .unwrap();
    channel.write(b"data").unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(channel.read(&mut buf), Err(VolError::AccessDenied(_))));
    assert!(matches!(channel.read_at(&mut buf, 0), Err(VolError::AccessDenied(_))));
}

#[test]
fn writes_require_the_write_option() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/ronly").unwrap();
    provider
        .new_channel(&path, OpenOptions::writing().create(true), None)
        .unwrap()
        .close()
        .unwrap();

    let mut channel = provider.new_channel(&path, OpenOptions::reading(), None).unwrap();
    assert!(matches!(channel.write(b"nope"), Err(VolError::AccessDenied(_))));
}

#[test]
fn positional_write_past_eof_gap_fills_with_zeros() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/gap").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    channel.write(b"head").unwrap();

    assert_eq!(channel.write_at(b"tail", 100).unwrap(), 4);
    assert_eq!(channel.size().unwrap(), 104);
    channel.close().unwrap();

    let content = read_to_end(&provider, &path);
    assert_eq!(content.len(), 104);
    assert_eq!(&content[..4], b"head");
    assert!(content[4..100].iter().all(|&b| b == 0));
    assert_eq!(&content[100..], b"tail");
}

#[test]
fn positional_read_preserves_the_logical_position() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/pos").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    channel.write(b"abcdef").unwrap();
    channel.seek(2).unwrap();

    let mut peek = [0u8; 3];
    assert_eq!(channel.read_at(&mut peek, 0).unwrap(), Some(3));
    assert_eq!(&peek, b"abc");

    // The regular read continues from where it left off.
    let mut next = [0u8; 2];
    assert_eq!(channel.read(&mut next).unwrap(), Some(2));
    assert_eq!(&next, b"cd");
}

#[test]
fn positional_read_at_or_past_eof_is_end_of_stream() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/eof").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    channel.write(b"xy").unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(channel.read_at(&mut buf, 2).unwrap(), None);
    assert_eq!(channel.read_at(&mut buf, 50).unwrap(), None);
}

#[test]
fn transfer_between_channels_copies_byte_for_byte() {
    let provider = provider();
    let src_path = provider.get_path("gluster://server:data/src").unwrap();
    let dst_path = provider.get_path("gluster://server:data/dst").unwrap();

    // Larger than two transfer chunks, so the loop runs more than once.
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let mut src = provider
        .new_channel(&src_path, OpenOptions::read_write().create(true), None)
        .unwrap();
    src.write(&payload).unwrap();

    let mut dst = provider
        .new_channel(&dst_path, OpenOptions::read_write().create(true), None)
        .unwrap();
    let copied = src.transfer_to(0, payload.len() as u64, &mut dst).unwrap();
    assert_eq!(copied, payload.len() as u64);
    src.close().unwrap();
    dst.close().unwrap();

    assert_eq!(read_to_end(&provider, &dst_path), payload);
}

#[test]
fn transfer_to_an_io_sink_stops_at_the_requested_count() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/tsink").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    channel.write(&[7u8; 1000]).unwrap();

    let mut sink = IoWriter(Vec::new());
    assert_eq!(channel.transfer_to(100, 300, &mut sink).unwrap(), 300);
    assert_eq!(sink.0.len(), 300);
    assert!(sink.0.iter().all(|&b| b == 7));
}

#[test]
fn transfer_past_the_source_size_is_empty() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/tshort").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    channel.write(b"tiny").unwrap();

    let mut sink = IoWriter(Vec::new());
    assert_eq!(channel.transfer_to(10, 100, &mut sink).unwrap(), 0);
}

#[test]
fn closed_channel_rejects_every_operation() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/closed").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    channel.close().unwrap();
    // Double-close is a no-op, not an error.
    channel.close().unwrap();

    let mut buf = [0u8; 1];
    assert!(matches!(channel.read(&mut buf), Err(VolError::Closed("channel"))));
    assert!(matches!(channel.write(b"x"), Err(VolError::Closed("channel"))));
    assert!(matches!(channel.seek(0), Err(VolError::Closed("channel"))));
    assert!(matches!(channel.force(true), Err(VolError::Closed("channel"))));
    assert!(matches!(channel.size(), Err(VolError::Closed("channel"))));
}

#[test]
fn unsupported_channel_operations_say_so() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/unsup").unwrap();
    let mut channel = provider
        .new_channel(&path, OpenOptions::read_write().create(true), None)
        .unwrap();
    assert!(matches!(channel.truncate(0), Err(VolError::Unsupported(_))));
    assert!(matches!(channel.map(), Err(VolError::Unsupported(_))));
    assert!(matches!(channel.lock(), Err(VolError::Unsupported(_))));
}
