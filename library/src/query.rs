//! Filtering and sorting library listings

use std::cmp::Ordering;

use romshelf_shared::{Game, GameInstance};

/// One listing row: an instance and the game it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub game: Game,
    pub instance: GameInstance,
}

#[derive(Debug, Clone, Default)]
pub struct GameFilter {
    /// Case-insensitive substring of the game name
    pub search: Option<String>,
    /// Keep games having any of these genres (case-insensitive)
    pub genres: Vec<String>,
    pub installed_only: bool,
    pub source: Option<String>,
}

impl GameFilter {
    pub fn matches(&self, entry: &LibraryEntry) -> bool {
        if self.installed_only && !entry.instance.installed {
            return false;
        }
        if let Some(source) = &self.source
            && entry.instance.source != *source
        {
            return false;
        }
        if let Some(search) = &self.search
            && !entry
                .game
                .name
                .to_lowercase()
                .contains(&search.to_lowercase())
        {
            return false;
        }
        if !self.genres.is_empty()
            && !self.genres.iter().any(|wanted| {
                entry
                    .game
                    .genres
                    .iter()
                    .any(|g| g.eq_ignore_ascii_case(wanted))
            })
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortField {
    #[default]
    Name,
    FileSize,
    DateAdded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameSort {
    pub field: SortField,
    pub descending: bool,
}

impl GameSort {
    fn compare(&self, a: &LibraryEntry, b: &LibraryEntry) -> Ordering {
        let ord = match self.field {
            SortField::Name => a.game.name.to_lowercase().cmp(&b.game.name.to_lowercase()),
            SortField::FileSize => a.instance.file_size.cmp(&b.instance.file_size),
            SortField::DateAdded => a.instance.created_at.cmp(&b.instance.created_at),
        };
        if self.descending { ord.reverse() } else { ord }
    }

    pub fn apply(&self, entries: &mut [LibraryEntry]) {
        entries.sort_by(|a, b| self.compare(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, genres: &[&str], size: u64, source: &str) -> LibraryEntry {
        let mut game = Game::placeholder(format!("game_{name}"), name, "nes");
        game.genres = genres.iter().map(|g| g.to_string()).collect();
        let mut instance = GameInstance::new(
            format!("i_{name}"),
            game.id.clone(),
            source,
            "nes",
            name,
            name,
        );
        instance.file_size = size;
        LibraryEntry { game, instance }
    }

    #[test]
    fn test_filter_search_and_genres() {
        let zelda = entry("Zelda", &["Adventure"], 1, "emulated");
        let mario = entry("Super Mario", &["Platform"], 2, "emulated");

        let filter = GameFilter {
            search: Some("MAR".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&zelda));
        assert!(filter.matches(&mario));

        let filter = GameFilter {
            genres: vec!["adventure".to_string(), "puzzle".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&zelda));
        assert!(!filter.matches(&mario));
    }

    #[test]
    fn test_filter_source_and_installed() {
        let mut portal = entry("Portal", &[], 1, "steam");
        let filter = GameFilter {
            source: Some("emulated".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&portal));

        portal.instance.installed = false;
        let filter = GameFilter {
            installed_only: true,
            ..Default::default()
        };
        assert!(!filter.matches(&portal));
        assert!(GameFilter::default().matches(&portal));
    }

    #[test]
    fn test_sort_by_name_and_size() {
        let mut entries = vec![
            entry("zelda", &[], 3, "emulated"),
            entry("Asteroids", &[], 1, "emulated"),
            entry("Metroid", &[], 2, "emulated"),
        ];
        GameSort::default().apply(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.game.name.as_str()).collect();
        assert_eq!(names, vec!["Asteroids", "Metroid", "zelda"]);

        GameSort {
            field: SortField::FileSize,
            descending: true,
        }
        .apply(&mut entries);
        let sizes: Vec<_> = entries.iter().map(|e| e.instance.file_size).collect();
        assert_eq!(sizes, vec![3, 2, 1]);
    }
}
