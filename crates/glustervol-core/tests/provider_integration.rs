// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Provider dispatch scenarios run against the in-memory volume library.

use std::sync::Arc;

use glustervol_core::testing::fake::FakeLibrary;
use glustervol_core::{
    AccessMode, ConnectOptions, CopyOption, GlusterProvider, OpenOptions, PosixPerm, ViewKind,
    VolError, VolPath, WatchConfig,
};

fn provider() -> GlusterProvider {
    GlusterProvider::with_defaults(
        Arc::new(FakeLibrary::new()),
        ConnectOptions::default(),
        WatchConfig::default(),
    )
}

fn create_file(provider: &GlusterProvider, path: &VolPath, content: &[u8], mode: u32) {
    let mut channel = provider
        .new_channel(path, OpenOptions::read_write().create(true), Some(mode))
        .unwrap();
    channel.write(content).unwrap();
    channel.close().unwrap();
}

#[test]
fn copy_without_replace_fails_when_target_exists() {
    let provider = provider();
    let a = provider.get_path("gluster://server:data/a").unwrap();
    let b = provider.get_path("gluster://server:data/b").unwrap();
    create_file(&provider, &a, b"source content", 0o644);
    create_file(&provider, &b, b"old", 0o644);

    let err = provider.copy(&a, &b, &[]).unwrap_err();
    assert!(matches!(err, VolError::AlreadyExists(_)));

    provider.copy(&a, &b, &[CopyOption::ReplaceExisting]).unwrap();
    let copied = provider.read_attributes(&b, true).unwrap();
    let source = provider.read_attributes(&a, true).unwrap();
    assert_eq!(copied.size, source.size);
}

#[test]
fn copy_attributes_carries_the_source_mode() {
    let provider = provider();
    let a = provider.get_path("gluster://server:data/attrsrc").unwrap();
    let b = provider.get_path("gluster://server:data/attrdst").unwrap();
    create_file(&provider, &a, b"payload", 0o640);

    provider.copy(&a, &b, &[CopyOption::CopyAttributes]).unwrap();
    let copied = provider.read_attributes(&b, true).unwrap();
    assert_eq!(copied.mode & 0o7777, 0o640);
}

#[test]
fn atomic_move_is_unsupported() {
    let provider = provider();
    let a = provider.get_path("gluster://server:data/am").unwrap();
    let b = provider.get_path("gluster://server:data/am2").unwrap();
    create_file(&provider, &a, b"x", 0o644);

    assert!(matches!(
        provider.copy(&a, &b, &[CopyOption::AtomicMove]),
        Err(VolError::Unsupported("atomic move"))
    ));
    assert!(matches!(
        provider.move_file(&a, &b, &[CopyOption::AtomicMove]),
        Err(VolError::Unsupported("atomic move"))
    ));
}

#[test]
fn move_renames_within_one_volume() {
    let provider = provider();
    let a = provider.get_path("gluster://server:data/mv-from").unwrap();
    let b = provider.get_path("gluster://server:data/mv-to").unwrap();
    create_file(&provider, &a, b"contents", 0o644);

    provider.move_file(&a, &b, &[]).unwrap();
    assert!(!provider.exists(&a));
    assert_eq!(provider.read_attributes(&b, true).unwrap().size, 8);
}

#[test]
fn move_across_volumes_is_unsupported() {
    let provider = provider();
    let a = provider.get_path("gluster://server:data/x").unwrap();
    let b = provider.get_path("gluster://server:backup/x").unwrap();
    create_file(&provider, &a, b"x", 0o644);

    assert!(matches!(
        provider.move_file(&a, &b, &[]),
        Err(VolError::Unsupported("cross-volume move"))
    ));
}

#[test]
fn delete_refuses_non_empty_directories() {
    let provider = provider();
    let dir = provider.get_path("gluster://server:data/dir").unwrap();
    provider.create_directory(&dir, None).unwrap();
    let child = dir.resolve_str("child");
    create_file(&provider, &child, b"x", 0o644);

    assert!(matches!(
        provider.delete(&dir),
        Err(VolError::DirectoryNotEmpty(_))
    ));

    provider.delete(&child).unwrap();
    provider.delete(&dir).unwrap();
    assert!(!provider.exists(&dir));
}

#[test]
fn delete_of_a_missing_path_is_not_found() {
    let provider = provider();
    let ghost = provider.get_path("gluster://server:data/ghost").unwrap();
    assert!(matches!(provider.delete(&ghost), Err(VolError::NotFound(_))));
}

#[test]
fn create_directory_requires_a_live_parent() {
    let provider = provider();
    let orphan = provider.get_path("gluster://server:data/no/such/deep").unwrap();
    assert!(matches!(
        provider.create_directory(&orphan, None),
        Err(VolError::NotFound(_))
    ));

    let dir = provider.get_path("gluster://server:data/made").unwrap();
    provider.create_directory(&dir, None).unwrap();
    assert!(matches!(
        provider.create_directory(&dir, None),
        Err(VolError::AlreadyExists(_))
    ));
}

#[test]
fn equal_paths_are_the_same_file_without_a_native_call() {
    let provider = provider();
    // The path does not exist; equality short-circuits before any stat.
    let ghost = provider.get_path("gluster://server:data/never-created").unwrap();
    assert!(provider.is_same_file(&ghost, &ghost).unwrap());
}

#[test]
fn same_file_compares_inodes_across_names() {
    let provider = provider();
    let a = provider.get_path("gluster://server:data/ino-a").unwrap();
    let b = provider.get_path("gluster://server:data/ino-b").unwrap();
    create_file(&provider, &a, b"1", 0o644);
    create_file(&provider, &b, b"2", 0o644);
    assert!(!provider.is_same_file(&a, &b).unwrap());

    let link = provider.get_path("gluster://server:data/ino-l").unwrap();
    provider.create_symbolic_link(&link, &a).unwrap();
    assert!(provider.is_same_file(&a, &link).unwrap());
}

#[test]
fn symlinks_round_trip_and_classify() {
    let provider = provider();
    let target = provider.get_path("gluster://server:data/t").unwrap();
    let link = provider.get_path("gluster://server:data/l").unwrap();
    create_file(&provider, &target, b"pointee", 0o644);

    provider.create_symbolic_link(&link, &target).unwrap();
    assert!(matches!(
        provider.create_symbolic_link(&link, &target),
        Err(VolError::AlreadyExists(_))
    ));

    assert!(provider.read_attributes(&link, false).unwrap().is_symbolic_link());
    assert!(provider.read_attributes(&link, true).unwrap().is_regular_file());
    assert_eq!(provider.read_symbolic_link(&link).unwrap(), target);

    assert!(matches!(
        provider.read_symbolic_link(&target),
        Err(VolError::NotALink(_))
    ));
}

#[test]
fn check_access_uses_posix_bit_values() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/guarded").unwrap();
    create_file(&provider, &path, b"secret", 0o600);

    provider.check_access(&path, &[AccessMode::Read, AccessMode::Write]).unwrap();
    assert!(matches!(
        provider.check_access(&path, &[AccessMode::Execute]),
        Err(VolError::AccessDenied(_))
    ));

    let ghost = provider.get_path("gluster://server:data/ghost").unwrap();
    assert!(matches!(
        provider.check_access(&ghost, &[AccessMode::Read]),
        Err(VolError::NotFound(_))
    ));
}

#[test]
fn attribute_view_snapshots_once_and_mutates_directly() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/viewed").unwrap();
    create_file(&provider, &path, b"viewable", 0o644);

    let view = provider.attribute_view(&path, ViewKind::Posix, true).unwrap();
    assert_eq!(view.attributes().unwrap().mode & 0o7777, 0o644);

    view.set_permissions([PosixPerm::OwnerRead, PosixPerm::OwnerWrite]).unwrap();

    // Applied immediately against the volume...
    let fresh = provider.read_attributes(&path, true).unwrap();
    assert_eq!(fresh.mode & 0o7777, 0o600);
    // ...but the view's snapshot is not refreshed.
    assert_eq!(view.attributes().unwrap().mode & 0o7777, 0o644);
}

#[test]
fn basic_view_is_capability_checked() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/basic").unwrap();
    create_file(&provider, &path, b"x", 0o644);

    let view = provider.attribute_view(&path, ViewKind::Basic, true).unwrap();
    assert!(view.attributes().is_ok());
    assert!(matches!(view.owner(), Err(VolError::Unsupported(_))));
    assert!(matches!(
        view.set_permissions([PosixPerm::OwnerRead]),
        Err(VolError::Unsupported(_))
    ));

    let owner = provider.attribute_view(&path, ViewKind::Owner, true).unwrap();
    assert!(owner.owner().is_ok());
    assert!(matches!(owner.attributes(), Err(VolError::Unsupported(_))));
}

#[test]
fn directory_stream_filters_through_the_provider() {
    let provider = provider();
    let dir = provider.get_path("gluster://server:data/listing").unwrap();
    provider.create_directory(&dir, None).unwrap();
    for name in ["one.log", "two.txt", "three.log"] {
        create_file(&provider, &dir.resolve_str(name), b"x", 0o644);
    }

    let matcher = provider.path_matcher("glob:*.log").unwrap();
    let filter = Box::new(move |path: &VolPath| {
        path.file_name_path().map(|name| name.matches(&matcher)).unwrap_or(false)
    });
    let mut stream = provider.new_directory_stream(&dir, Some(filter)).unwrap();
    let mut names: Vec<String> = stream
        .iter()
        .unwrap()
        .map(|entry| entry.unwrap().file_name().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["one.log", "three.log"]);
}

#[test]
fn listing_a_file_is_not_a_directory() {
    let provider = provider();
    let file = provider.get_path("gluster://server:data/flat").unwrap();
    create_file(&provider, &file, b"x", 0o644);
    assert!(matches!(
        provider.new_directory_stream(&file, None),
        Err(VolError::NotADirectory(_))
    ));
}

#[test]
fn capacity_queries_derive_from_statvfs() {
    let provider = provider();
    let volume = provider
        .new_filesystem("gluster://server:data/", ConnectOptions::default())
        .unwrap();
    assert_eq!(volume.total_space().unwrap(), 4096 * (1 << 20));
    assert_eq!(volume.unallocated_space().unwrap(), 4096 * (1 << 19));
    assert_eq!(volume.usable_space().unwrap(), 4096 * (1 << 18));
}

#[test]
fn closed_volume_is_evicted_and_operations_fail() {
    let provider = provider();
    let path = provider.get_path("gluster://server:data/later").unwrap();
    let volume = provider.get_filesystem("gluster://server:data/").unwrap();
    provider.close_filesystem(&volume).unwrap();

    assert!(matches!(
        provider.get_filesystem("gluster://server:data/"),
        Err(VolError::NotFound(_))
    ));
    assert!(matches!(
        provider.new_channel(&path, OpenOptions::reading(), None),
        Err(VolError::Closed("volume"))
    ));

    // A fresh connect works again after eviction.
    let reconnected = provider
        .new_filesystem("gluster://server:data/", ConnectOptions::default())
        .unwrap();
    assert!(reconnected.is_open());
}

#[test]
fn hidden_paths_have_a_dotted_final_segment() {
    let provider = provider();
    let hidden = provider.get_path("gluster://server:data/logs/.rotate").unwrap();
    let visible = provider.get_path("gluster://server:data/.logs/rotate").unwrap();
    assert!(provider.is_hidden(&hidden));
    assert!(!provider.is_hidden(&visible));
}
