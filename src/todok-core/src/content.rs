//! Debate content: topics, personas and stances.
//!
//! Both documents are read-only JSON files loaded once per session. Topics are
//! a bare array; personas live under a `characters` key.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::DebateError;

/// A debate position. User and model always hold opposite stances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Stance {
    #[serde(rename = "찬성")]
    Pro,
    #[serde(rename = "반대")]
    Con,
}

impl Stance {
    pub const ALL: [Stance; 2] = [Stance::Pro, Stance::Con];

    pub fn label(&self) -> &'static str {
        match self {
            Stance::Pro => "찬성",
            Stance::Con => "반대",
        }
    }

    /// The stance the other side of the debate takes.
    pub fn opposite(&self) -> Stance {
        match self {
            Stance::Pro => Stance::Con,
            Stance::Con => Stance::Pro,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Stance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "찬성" | "pro" | "for" => Ok(Stance::Pro),
            "반대" | "con" | "against" => Ok(Stance::Con),
            other => Err(format!("Unknown stance '{}': expected 찬성 or 반대", other)),
        }
    }
}

/// Role descriptions the model plays for each stance of a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StanceRoles {
    #[serde(rename = "찬성")]
    pub pro: String,
    #[serde(rename = "반대")]
    pub con: String,
}

impl StanceRoles {
    pub fn role_for(&self, stance: Stance) -> &str {
        match stance {
            Stance::Pro => &self.pro,
            Stance::Con => &self.con,
        }
    }
}

/// A debate topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    /// Short user-facing identifier.
    pub keyword: String,
    /// The full debate question.
    pub topic: String,
    pub stances: StanceRoles,
    /// Category used to group topics for selection.
    #[serde(rename = "type")]
    pub category: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub image_url: String,
}

impl Topic {
    /// Role description the model takes when arguing `stance`.
    pub fn role_for(&self, stance: Stance) -> &str {
        self.stances.role_for(stance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharInfo {
    pub personality: String,
    pub style: String,
}

/// One example exchange used to condition the persona's voice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FewShot {
    pub user: String,
    pub bot: String,
}

/// A speaking-style profile for the model's side of the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Persona {
    pub char_type: String,
    pub char_info: CharInfo,
    /// The first pair answers a logical user, the second an illogical one.
    pub few_shot: [FewShot; 2],
}

#[derive(Debug, Deserialize)]
struct CharactersDocument {
    characters: Vec<Persona>,
}

/// Topics and personas available to a session.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    topics: Vec<Topic>,
    personas: Vec<Persona>,
}

impl ContentStore {
    /// Build a store from already-parsed content, rejecting duplicate ids.
    pub fn new(topics: Vec<Topic>, personas: Vec<Persona>) -> Result<Self, DebateError> {
        if let Some(dup) = first_duplicate(topics.iter().map(|t| t.keyword.as_str())) {
            return Err(DebateError::ContentLoad {
                path: "topics".to_string(),
                message: format!("duplicate topic keyword '{}'", dup),
            });
        }
        if let Some(dup) = first_duplicate(personas.iter().map(|p| p.char_type.as_str())) {
            return Err(DebateError::ContentLoad {
                path: "characters".to_string(),
                message: format!("duplicate character '{}'", dup),
            });
        }
        Ok(Self { topics, personas })
    }

    /// Load both documents from disk. Either file failing fails the whole load.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        topics_path: P,
        characters_path: Q,
    ) -> Result<Self, DebateError> {
        let topics: Vec<Topic> = read_json(topics_path.as_ref())?;
        let characters: CharactersDocument = read_json(characters_path.as_ref())?;

        let store = Self::new(topics, characters.characters)?;
        info!(
            topics = store.topics.len(),
            personas = store.personas.len(),
            "Loaded debate content"
        );
        Ok(store)
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn find_topic(&self, keyword: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.keyword == keyword)
    }

    pub fn find_persona(&self, char_type: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.char_type == char_type)
    }

    /// Distinct topic categories in the order they first appear.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.topics
            .iter()
            .map(|t| t.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    pub fn topics_in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Topic> {
        self.topics.iter().filter(move |t| t.category == category)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DebateError> {
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Content file not found: {}: {}", path.display(), e);
        DebateError::ContentLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;

    serde_json::from_str(&content).map_err(|e| {
        error!("Content file is not valid JSON: {}: {}", path.display(), e);
        DebateError::ContentLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })
}

fn first_duplicate<'a>(ids: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = HashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{CHARACTERS_JSON, TOPICS_JSON};
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_stance_opposite_and_labels() {
        assert_eq!(Stance::Pro.opposite(), Stance::Con);
        assert_eq!(Stance::Con.opposite(), Stance::Pro);
        assert_eq!(Stance::Pro.to_string(), "찬성");
        assert_eq!("반대".parse::<Stance>().unwrap(), Stance::Con);
        assert_eq!(" PRO ".parse::<Stance>().unwrap(), Stance::Pro);
        assert!("중립".parse::<Stance>().is_err());
    }

    #[test]
    fn test_load_content() {
        let dir = TempDir::new().unwrap();
        let topics = write(&dir, "debate_topics.json", TOPICS_JSON);
        let chars = write(&dir, "characters.json", CHARACTERS_JSON);

        let store = ContentStore::load(&topics, &chars).unwrap();
        assert_eq!(store.topics().len(), 3);
        assert_eq!(store.personas().len(), 2);

        let topic = store.find_topic("교복 자율화").unwrap();
        assert_eq!(topic.role_for(Stance::Con), "교복 유지 측 교사");
        assert_eq!(topic.category, "교육");
        assert!(store.find_topic("없는 주제").is_none());

        let persona = store.find_persona("선비").unwrap();
        assert_eq!(persona.few_shot[1].user, "몰라.");
    }

    #[test]
    fn test_display_metadata_defaults_to_empty() {
        let store = fixtures::store();
        let topic = store.find_topic("게임 셧다운제").unwrap();
        assert!(topic.summary.is_empty());
        assert!(topic.image_url.is_empty());
    }

    #[test]
    fn test_missing_file_is_content_load_error() {
        let dir = TempDir::new().unwrap();
        let chars = write(&dir, "characters.json", CHARACTERS_JSON);
        let err = ContentStore::load(dir.path().join("nope.json"), &chars).unwrap_err();
        assert!(matches!(err, DebateError::ContentLoad { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_json_is_content_load_error() {
        let dir = TempDir::new().unwrap();
        let topics = write(&dir, "debate_topics.json", TOPICS_JSON);
        let chars = write(&dir, "characters.json", "{ \"characters\": [");
        let err = ContentStore::load(&topics, &chars).unwrap_err();
        match err {
            DebateError::ContentLoad { path, .. } => assert!(path.ends_with("characters.json")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_few_shot_must_have_two_pairs() {
        let dir = TempDir::new().unwrap();
        let topics = write(&dir, "debate_topics.json", TOPICS_JSON);
        let chars = write(
            &dir,
            "characters.json",
            r#"{"characters": [{
                "char_type": "외톨이",
                "char_info": {"personality": "p", "style": "s"},
                "few_shot": [{"user": "a", "bot": "b"}]
            }]}"#,
        );
        let err = ContentStore::load(&topics, &chars).unwrap_err();
        assert!(matches!(err, DebateError::ContentLoad { .. }));
    }

    #[test]
    fn test_duplicate_keyword_rejected() {
        let mut topics: Vec<Topic> = serde_json::from_str(TOPICS_JSON).unwrap();
        topics.push(topics[0].clone());
        let err = ContentStore::new(topics, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("교복 자율화"));
    }

    #[test]
    fn test_duplicate_char_type_rejected() {
        let characters: CharactersDocument = serde_json::from_str(CHARACTERS_JSON).unwrap();
        let mut personas = characters.characters;
        personas.push(personas[1].clone());

        let err = ContentStore::new(Vec::new(), personas).unwrap_err();
        match err {
            DebateError::ContentLoad { path, message } => {
                assert_eq!(path, "characters");
                assert!(message.contains("선비"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_categories_in_first_seen_order() {
        let store = fixtures::store();
        assert_eq!(store.categories(), vec!["교육", "사회"]);
        let education: Vec<_> = store
            .topics_in_category("교육")
            .map(|t| t.keyword.as_str())
            .collect();
        assert_eq!(education, vec!["교복 자율화", "수행평가 폐지"]);
    }
}
