//! Game sources backed by the local machine

mod emulated;
mod steam;

pub use emulated::{EmulatedSource, scan_roms};
pub use steam::{
    AppManifest, SteamSource, candidate_install_dirs, detect_install_dir, parse_app_manifest,
    scan_steamapps,
};
