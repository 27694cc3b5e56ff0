mod common;

use common::{sample_save, snapshot, test_config, write_file};
use savesmith::{
    backup::{BackupVault, RelocationMethod},
    install_archive, pack_artifact, scan_library, ArtifactKind, ArtifactType, ErrorKind,
};
use std::{fs, io::Write, path::Path};
use zip::{write::SimpleFileOptions, ZipWriter};

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            continue;
        }
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn emulator_root(tmp: &Path) -> std::path::PathBuf {
    let root = tmp.join("emu");
    fs::create_dir_all(root.join("savedata")).unwrap();
    fs::create_dir_all(root.join("savestates")).unwrap();
    root
}

#[test]
fn scan_groups_save_and_savestate_under_one_title() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savedata/BLES01234_save1/SLOT.DAT"), b"slot");
    write_file(&root.join("savestates/BLES01234_state1.sta"), b"state");
    let config = test_config(&tmp.path().join("scratch"));

    let library = scan_library(&config, &root).unwrap();
    assert_eq!(library.titles.len(), 1);
    let title = library.title("BLES01234").unwrap();
    assert_eq!(title.saves.len(), 1);
    assert_eq!(title.saves[0].label, "save1");
    assert_eq!(title.saves[0].kind, ArtifactKind::Directory);
    assert_eq!(title.savestates.len(), 1);
    assert_eq!(title.savestates[0].label, "state1.sta");
    assert_eq!(title.savestates[0].kind, ArtifactKind::File);
    assert!(!title.is_installed());
}

#[test]
fn scan_is_deterministic_for_an_unchanged_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savedata/BLES01234_save1/A.DAT"), b"a");
    write_file(&root.join("savedata/NPUB30910_slot/B.DAT"), b"b");
    write_file(&root.join("savedata/not-a-save/C.DAT"), b"c");
    write_file(&root.join("savestates/NPUB30910_q.sta"), b"q");
    let config = test_config(&tmp.path().join("scratch"));

    let first = scan_library(&config, &root).unwrap();
    let second = scan_library(&config, &root).unwrap();
    assert_eq!(first.titles, second.titles);
    assert_eq!(first.skipped, second.skipped);
    assert_eq!(first.skipped, vec![root.join("savedata/not-a-save")]);
}

#[test]
fn missing_root_is_root_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(&tmp.path().join("scratch"));
    let err = scan_library(&config, &tmp.path().join("nope")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RootNotFound);
}

#[test]
fn save_install_backs_up_existing_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savedata/BLES01234_save1/old.dat"), b"old");
    let config = test_config(&tmp.path().join("scratch"));

    let bytes = zip_bytes(&[
        ("BLES01234_save1/", b""),
        ("BLES01234_save1/new.dat", b"new"),
    ]);
    let outcome = install_archive(&config, &root, ArtifactType::Save, &bytes);
    assert!(outcome.ok, "{:?}", outcome.error);

    let installed = outcome.installed_path.unwrap();
    assert!(installed.ends_with("savedata/BLES01234_save1"));
    assert_eq!(fs::read(installed.join("new.dat")).unwrap(), b"new");
    assert!(!installed.join("old.dat").exists());

    let record = outcome.backup_record.unwrap();
    assert_eq!(record.method, RelocationMethod::Rename);
    assert_eq!(fs::read(record.backup_path.join("old.dat")).unwrap(), b"old");
    assert!(record.backup_path.starts_with(root.join("saveBackups/BLES01234_save1")));

    let vault = BackupVault::new(config.layout.backups_root(&root));
    let lineage = vault.lineage("BLES01234_save1").unwrap();
    assert_eq!(lineage, vec![record]);
}

#[test]
fn repeated_save_installs_grow_the_lineage() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    let config = test_config(&tmp.path().join("scratch"));

    for round in 0..3u8 {
        let bytes = zip_bytes(&[("BLES01234_save1/slot.dat", &[round])]);
        let outcome = install_archive(&config, &root, ArtifactType::Save, &bytes);
        assert!(outcome.ok, "{:?}", outcome.error);
        assert_eq!(outcome.backup_record.is_some(), round > 0);
    }

    let vault = BackupVault::new(config.layout.backups_root(&root));
    let lineage = vault.lineage("BLES01234_save1").unwrap();
    assert_eq!(lineage.len(), 2);
    assert!(lineage[0].created_at <= lineage[1].created_at);
    assert_eq!(fs::read(lineage[0].backup_path.join("slot.dat")).unwrap(), [0]);
    assert_eq!(fs::read(lineage[1].backup_path.join("slot.dat")).unwrap(), [1]);
    assert_eq!(
        fs::read(root.join("savedata/BLES01234_save1/slot.dat")).unwrap(),
        [2]
    );
}

#[test]
fn backup_is_reported_when_extraction_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savedata/BLES01234_save1/old.dat"), b"old");
    let config = test_config(&tmp.path().join("scratch"));

    let payload = b"NEW-SAVE-PAYLOAD-0123456789";
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(
            "BLES01234_save1/new.dat",
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored),
        )
        .unwrap();
    writer.write_all(payload).unwrap();
    let mut bytes = writer.finish().unwrap().into_inner();
    let at = bytes
        .windows(payload.len())
        .position(|window| window == payload)
        .unwrap();
    bytes[at] ^= 0xff;

    let outcome = install_archive(&config, &root, ArtifactType::Save, &bytes);
    assert!(!outcome.ok);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ExtractFailed));
    let record = outcome.backup_record.unwrap();
    assert_eq!(fs::read(record.backup_path.join("old.dat")).unwrap(), b"old");
    assert!(!root.join("savedata/BLES01234_save1").exists());
}

#[test]
fn savestate_install_overwrites_without_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savestates/BLES01234_state1.sta"), b"old");
    let config = test_config(&tmp.path().join("scratch"));

    let bytes = zip_bytes(&[("BLES01234_state1.sta", b"new")]);
    let outcome = install_archive(&config, &root, ArtifactType::Savestate, &bytes);
    assert!(outcome.ok, "{:?}", outcome.error);
    assert!(outcome.backup_record.is_none());
    assert_eq!(
        fs::read(root.join("savestates/BLES01234_state1.sta")).unwrap(),
        b"new"
    );
    assert!(!root.join("saveBackups").exists());
}

#[test]
fn ambiguous_archive_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savedata/BLES01234_save1/old.dat"), b"old");
    let before = snapshot(&root);
    let config = test_config(&tmp.path().join("scratch"));

    let bytes = zip_bytes(&[
        ("BLES01234_save1/a.dat", b"a"),
        ("BLES01234_save2/b.dat", b"b"),
    ]);
    let outcome = install_archive(&config, &root, ArtifactType::Save, &bytes);
    assert!(!outcome.ok);
    assert_eq!(outcome.error_kind, Some(ErrorKind::AmbiguousArchive));
    assert!(outcome.backup_record.is_none());
    assert_eq!(snapshot(&root), before);
}

#[test]
fn empty_archive_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    let config = test_config(&tmp.path().join("scratch"));

    let outcome = install_archive(&config, &root, ArtifactType::Save, &zip_bytes(&[]));
    assert_eq!(outcome.error_kind, Some(ErrorKind::EmptyArchive));
    assert_eq!(fs::read_dir(root.join("savedata")).unwrap().count(), 0);
}

#[test]
fn install_leaves_sibling_artifacts_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    write_file(&root.join("savedata/BLES01234_save2/keep.dat"), b"keep");
    let config = test_config(&tmp.path().join("scratch"));

    let bytes = zip_bytes(&[("BLES01234_save1/new.dat", b"new")]);
    let outcome = install_archive(&config, &root, ArtifactType::Save, &bytes);
    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(
        fs::read(root.join("savedata/BLES01234_save2/keep.dat")).unwrap(),
        b"keep"
    );
}

#[test]
fn packed_save_reinstalls_under_the_same_identity() {
    let tmp = tempfile::tempdir().unwrap();
    let source_root = emulator_root(&tmp.path().join("a"));
    let target_root = emulator_root(&tmp.path().join("b"));
    sample_save(&source_root.join("savedata/BLES01234_save1"));
    let config = test_config(&tmp.path().join("scratch"));

    let blob = pack_artifact(&config, &source_root.join("savedata/BLES01234_save1")).unwrap();
    assert_eq!(blob.source_name, "BLES01234_save1");
    let bytes = blob.read_bytes().unwrap();
    blob.dispose().unwrap();

    let outcome = install_archive(&config, &target_root, ArtifactType::Save, &bytes);
    assert!(outcome.ok, "{:?}", outcome.error);
    assert_eq!(
        snapshot(&source_root.join("savedata")),
        snapshot(&target_root.join("savedata"))
    );

    let library = scan_library(&config, &target_root).unwrap();
    let title = library.title("BLES01234").unwrap();
    assert_eq!(title.saves[0].name, "BLES01234_save1");
}

#[test]
fn concurrent_installs_of_different_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let root = emulator_root(tmp.path());
    let config = test_config(&tmp.path().join("scratch"));

    let names: Vec<String> = (0..4).map(|i| format!("BLES0123{i}_slot")).collect();
    std::thread::scope(|scope| {
        for name in &names {
            let config = &config;
            let root = &root;
            scope.spawn(move || {
                let entry = format!("{name}/data.bin");
                let bytes = zip_bytes(&[(entry.as_str(), name.as_bytes())]);
                let outcome = install_archive(config, root, ArtifactType::Save, &bytes);
                assert!(outcome.ok, "{:?}", outcome.error);
            });
        }
    });

    for name in &names {
        assert_eq!(
            fs::read(root.join("savedata").join(name).join("data.bin")).unwrap(),
            name.as_bytes()
        );
    }
    let library = scan_library(&config, &root).unwrap();
    assert_eq!(library.titles.len(), 4);
    assert!(library.skipped.is_empty());
}
