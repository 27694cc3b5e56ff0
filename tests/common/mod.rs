#![allow(dead_code)]

use savesmith::{config::AppConfig, EmulatorLayout};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub fn flat_layout() -> EmulatorLayout {
    EmulatorLayout {
        savedata_dir: PathBuf::from("savedata"),
        savestates_dir: PathBuf::from("savestates"),
        games_dir: PathBuf::from("games"),
        launch_binary: PathBuf::from("USRDIR/EBOOT.BIN"),
        title_metadata: PathBuf::from("PARAM.SFO"),
        backups_dir: PathBuf::from("saveBackups"),
    }
}

pub fn test_config(scratch: &Path) -> AppConfig {
    AppConfig {
        layout: flat_layout(),
        scratch_dir: Some(scratch.to_path_buf()),
        ..AppConfig::default()
    }
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Relative path -> contents for every file under `root`; directories map to `None`.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| entry.unwrap())
        .map(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let contents = entry
                .file_type()
                .is_file()
                .then(|| fs::read(entry.path()).unwrap());
            (rel, contents)
        })
        .collect()
}

pub fn sample_save(dir: &Path) {
    write_file(&dir.join("PARAM.SFO"), b"sfo");
    write_file(&dir.join("ICON0.PNG"), &[0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
    write_file(&dir.join("DATA/SLOT0.DAT"), &vec![7u8; 64 * 1024]);
    fs::create_dir_all(dir.join("EMPTY")).unwrap();
}
