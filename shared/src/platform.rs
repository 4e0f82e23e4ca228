//! Platform table for emulated content.
//!
//! Single source of truth for which file extensions belong to a platform and
//! which IGDB platform id it maps to.
//!
//! ```
//! use romshelf_shared::platform_by_id;
//!
//! let nes = platform_by_id("nes").unwrap();
//! assert!(nes.matches_extension("NES"));
//! assert_eq!(nes.igdb_id, Some(18));
//! ```

/// Static description of one platform.
#[derive(Debug, Clone, Copy)]
pub struct PlatformSpec {
    /// Short id used in paths and mappings (e.g. "snes")
    pub id: &'static str,

    /// Human-readable name
    pub name: &'static str,

    /// ROM extensions without dot, lowercase
    pub extensions: &'static [&'static str],

    /// IGDB platform id, if the catalog knows this platform
    pub igdb_id: Option<u32>,
}

impl PlatformSpec {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        extensions: &'static [&'static str],
        igdb_id: Option<u32>,
    ) -> Self {
        Self {
            id,
            name,
            extensions,
            igdb_id,
        }
    }

    /// Case-insensitive extension check (no leading dot).
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }
}

pub const PLATFORMS: &[PlatformSpec] = &[
    PlatformSpec::new("nes", "Nintendo Entertainment System", &["nes", "zip", "7z"], Some(18)),
    PlatformSpec::new("snes", "Super Nintendo", &["sfc", "smc", "fig", "zip"], Some(19)),
    PlatformSpec::new("n64", "Nintendo 64", &["z64", "n64", "v64"], Some(4)),
    PlatformSpec::new("gamecube", "GameCube", &["iso", "ciso", "gcz"], Some(21)),
    PlatformSpec::new("wii", "Wii", &["wbfs", "iso", "ciso", "gcz"], Some(5)),
    PlatformSpec::new("ps1", "PlayStation", &["iso", "bin", "cue"], Some(7)),
    PlatformSpec::new("ps2", "PlayStation 2", &["iso", "bin", "img"], Some(8)),
    // Catalog-only: no scan extensions configured yet
    PlatformSpec::new("genesis", "Sega Genesis", &[], Some(29)),
    PlatformSpec::new("saturn", "Sega Saturn", &[], Some(32)),
    PlatformSpec::new("dreamcast", "Dreamcast", &[], Some(23)),
    PlatformSpec::new("gba", "Game Boy Advance", &[], Some(24)),
    PlatformSpec::new("nds", "Nintendo DS", &[], Some(20)),
    PlatformSpec::new("3ds", "Nintendo 3DS", &[], Some(37)),
    PlatformSpec::new("psp", "PlayStation Portable", &[], Some(38)),
];

/// Look up a platform by its short id.
pub fn platform_by_id(id: &str) -> Option<&'static PlatformSpec> {
    PLATFORMS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(platform_by_id("wii").map(|p| p.igdb_id), Some(Some(5)));
        assert!(platform_by_id("atari").is_none());
    }

    #[test]
    fn test_extension_match_ignores_case() {
        let snes = platform_by_id("snes").unwrap();
        assert!(snes.matches_extension("SFC"));
        assert!(!snes.matches_extension("nes"));
    }

    #[test]
    fn test_ids_are_unique() {
        for (i, a) in PLATFORMS.iter().enumerate() {
            for b in &PLATFORMS[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }
}
