use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::settings::Difficulty;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordEntry {
    pub word: String,
    pub difficulty: Difficulty,
}

/// The word handed to non-impostors, with the category it was drawn from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretWord {
    pub word: String,
    pub category: String,
}

/// Read access to the word-category content.
pub trait WordSource: Send + Sync {
    fn has_category(&self, name: &str) -> bool;

    /// Every word from `categories` admitted at `difficulty`.
    fn candidates(&self, categories: &[String], difficulty: Difficulty) -> Vec<SecretWord>;
}

pub fn pick_word<R: Rng + ?Sized>(
    source: &dyn WordSource,
    categories: &[String],
    difficulty: Difficulty,
    rng: &mut R,
) -> Option<SecretWord> {
    source.candidates(categories, difficulty).choose(rng).cloned()
}

#[derive(Debug, thiserror::Error)]
pub enum WordBankError {
    #[error("failed to read word bank: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse word bank: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("word bank has no words")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordBank {
    categories: BTreeMap<String, Vec<WordEntry>>,
}

impl WordBank {
    pub fn from_json(json: &str) -> Result<Self, WordBankError> {
        let bank: WordBank = serde_json::from_str(json)?;
        if bank.categories.values().all(|words| words.is_empty()) {
            return Err(WordBankError::Empty);
        }
        Ok(bank)
    }

    pub fn load(path: &Path) -> Result<Self, WordBankError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    pub fn word_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Small bank shipped with the binary.
    pub fn builtin() -> Self {
        use Difficulty::{Easy, Hard, Medium};

        let raw: &[(&str, &[(&str, Difficulty)])] = &[
            (
                "General",
                &[
                    ("Chair", Easy),
                    ("Phone", Easy),
                    ("Piano", Medium),
                    ("Elephant", Easy),
                    ("Pizza", Easy),
                    ("Beach", Easy),
                    ("Lisbon", Medium),
                    ("Microwave", Medium),
                    ("Lampshade", Hard),
                    ("Mirror", Medium),
                ],
            ),
            (
                "Animals",
                &[
                    ("Dog", Easy),
                    ("Cat", Easy),
                    ("Parrot", Medium),
                    ("Tiger", Medium),
                    ("Shark", Medium),
                    ("Ant", Hard),
                    ("Giraffe", Medium),
                    ("Platypus", Hard),
                    ("Chameleon", Hard),
                    ("Rabbit", Easy),
                ],
            ),
            (
                "Food",
                &[
                    ("Burger", Easy),
                    ("Sushi", Medium),
                    ("Ice cream", Easy),
                    ("Soup", Easy),
                    ("Lasagna", Medium),
                    ("Croissant", Medium),
                    ("Custard tart", Medium),
                    ("Duck rice", Hard),
                ],
            ),
            (
                "Places",
                &[
                    ("School", Easy),
                    ("Hospital", Easy),
                    ("Airport", Medium),
                    ("Cinema", Easy),
                    ("Library", Medium),
                    ("Museum", Medium),
                    ("Pharmacy", Medium),
                    ("Observatory", Hard),
                ],
            ),
            (
                "Objects",
                &[
                    ("Fork", Easy),
                    ("Watch", Medium),
                    ("Pillow", Medium),
                    ("Keys", Easy),
                    ("Glasses", Medium),
                    ("Charger", Medium),
                    ("Napkin", Hard),
                    ("Scissors", Medium),
                ],
            ),
            (
                "Sports",
                &[
                    ("Football", Easy),
                    ("Basketball", Medium),
                    ("Tennis", Medium),
                    ("Swimming", Easy),
                    ("Surf", Medium),
                    ("Golf", Hard),
                    ("Rugby", Hard),
                    ("Judo", Hard),
                ],
            ),
            (
                "Professions",
                &[
                    ("Doctor", Easy),
                    ("Farmer", Easy),
                    ("Firefighter", Easy),
                    ("Cook", Medium),
                    ("Carpenter", Hard),
                    ("Astronaut", Medium),
                    ("Painter", Easy),
                    ("Locksmith", Hard),
                ],
            ),
        ];

        let categories = raw
            .iter()
            .map(|(name, words)| {
                let entries = words
                    .iter()
                    .map(|(word, difficulty)| WordEntry {
                        word: (*word).to_string(),
                        difficulty: *difficulty,
                    })
                    .collect();
                ((*name).to_string(), entries)
            })
            .collect();

        Self { categories }
    }
}

impl Default for WordBank {
    fn default() -> Self {
        Self::builtin()
    }
}

impl WordSource for WordBank {
    fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    fn candidates(&self, categories: &[String], difficulty: Difficulty) -> Vec<SecretWord> {
        categories
            .iter()
            .filter_map(|name| self.categories.get(name).map(|words| (name, words)))
            .flat_map(|(name, words)| {
                words
                    .iter()
                    .filter(|entry| difficulty.admits(entry.difficulty))
                    .map(move |entry| SecretWord {
                        word: entry.word.clone(),
                        category: name.clone(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_builtin_has_general_category() {
        let bank = WordBank::builtin();
        assert!(bank.has_category("General"));
        assert!(!bank.has_category("general"));
        assert!(bank.word_count() > 0);
    }

    #[test]
    fn test_candidates_respect_difficulty() {
        let bank = WordBank::builtin();
        let easy = bank.candidates(&["Animals".into()], Difficulty::Easy);
        assert!(easy.iter().all(|w| ["Dog", "Cat", "Rabbit"].contains(&w.word.as_str())));

        let hard = bank.candidates(&["Animals".into()], Difficulty::Hard);
        assert!(hard.iter().all(|w| w.word != "Dog"));
        assert!(hard.iter().any(|w| w.word == "Platypus"));
    }

    #[test]
    fn test_pick_word_reports_category() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let bank = WordBank::builtin();
        let picked = pick_word(&bank, &["Food".into(), "Sports".into()], Difficulty::Medium, &mut rng)
            .unwrap();
        assert!(picked.category == "Food" || picked.category == "Sports");
    }

    #[test]
    fn test_pick_word_from_unknown_categories_is_none() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let bank = WordBank::builtin();
        assert!(pick_word(&bank, &["Nope".into()], Difficulty::Easy, &mut rng).is_none());
    }

    #[test]
    fn test_from_json() {
        let bank = WordBank::from_json(
            r#"{"Colors": [{"word": "Teal", "difficulty": "Hard"}]}"#,
        )
        .unwrap();
        assert_eq!(bank.category_names(), vec!["Colors"]);
        assert!(matches!(WordBank::from_json("{}"), Err(WordBankError::Empty)));
        assert!(matches!(WordBank::from_json("nope"), Err(WordBankError::Parse(_))));
    }
}
