use directories::BaseDirs;
use std::path::{Path, PathBuf};

pub const EMULATOR_NAME: &str = "RPCS3";

pub const SAVEDATA_DIR: &str = "dev_hdd0/home/00000001/savedata";
pub const SAVESTATES_DIR: &str = "savestates";
pub const GAMES_DIR: &str = "dev_hdd0/game";
pub const LAUNCH_BINARY: &str = "USRDIR/EBOOT.BIN";
pub const TITLE_METADATA: &str = "PARAM.SFO";
pub const BACKUPS_DIR: &str = "saveBackups";

const FLATPAK_ID: &str = "net.rpcs3.RPCS3";

/// Probes the usual per-user install locations for an RPCS3 root.
pub fn detect_root() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    let home = base.home_dir();
    let candidates = [
        base.config_dir().join("rpcs3"),
        home.join(".config/rpcs3"),
        home.join(".var/app").join(FLATPAK_ID).join("config/rpcs3"),
        home.join("Library/Application Support/rpcs3"),
    ];
    candidates.into_iter().find(|path| looks_like_root(path))
}

pub fn looks_like_root(path: &Path) -> bool {
    path.join("dev_hdd0").is_dir() || path.join(SAVESTATES_DIR).is_dir()
}
