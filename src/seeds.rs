//! Built-in content: preset sessions and example questions, so the console is
//! useful before anything has been generated.

use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize)]
pub struct PresetHint {
  pub hint_text: &'static str,
  pub hint_id: i64,
}

/// A complete session as the upstream `load_preset` call expects it.
#[derive(Clone, Debug, Serialize)]
pub struct Preset {
  pub question: &'static str,
  #[serde(rename = "groundTruth")]
  pub ground_truth: &'static str,
  pub hints: Vec<PresetHint>,
  pub candidates: Vec<&'static str>,
  #[serde(rename = "metricsById")]
  pub metrics_by_id: Map<String, Value>,
  #[serde(rename = "eliminationMap")]
  pub elimination_map: Map<String, Value>,
}

impl Preset {
  fn new(question: &'static str, ground_truth: &'static str, first_id: i64, hints: [&'static str; 4], candidates: [&'static str; 6]) -> Self {
    Self {
      question,
      ground_truth,
      hints: hints
        .into_iter()
        .enumerate()
        .map(|(i, t)| PresetHint { hint_text: t, hint_id: first_id + i as i64 })
        .collect(),
      candidates: candidates.to_vec(),
      metrics_by_id: Map::new(),
      elimination_map: Map::new(),
    }
  }

  /// Wire form sent to the upstream service.
  pub fn to_payload(&self) -> Value {
    serde_json::to_value(self).unwrap_or(Value::Null)
  }
}

pub fn presets() -> Vec<Preset> {
  vec![
    Preset::new(
      "What is the capital of Brazil?",
      "Brasília",
      1,
      [
        "It is a planned city founded in 1960.",
        "It is located in the Federal District.",
        "It was designed by Oscar Niemeyer and Lúcio Costa.",
        "It replaced Rio de Janeiro as the capital.",
      ],
      ["Rio de Janeiro", "São Paulo", "Salvador", "Belo Horizonte", "Curitiba", "Brasília"],
    ),
    Preset::new(
      "Which planet is known as the Red Planet?",
      "Mars",
      5,
      [
        "It is the fourth planet from the Sun.",
        "It has two small moons named Phobos and Deimos.",
        "Its surface is rich in iron oxide, giving it a rusty color.",
        "It is named after the Roman god of war.",
      ],
      ["Venus", "Jupiter", "Saturn", "Mercury", "Neptune", "Mars"],
    ),
    Preset::new(
      "Who wrote The Hobbit?",
      "J.R.R. Tolkien",
      9,
      [
        "He was a professor of Anglo-Saxon at Oxford University.",
        "He also wrote The Lord of the Rings trilogy.",
        "He is often considered the father of modern high fantasy literature.",
        "His initials are J.R.R.",
      ],
      ["J.K. Rowling", "C.S. Lewis", "George R.R. Martin", "Roald Dahl", "Isaac Asimov", "J.R.R. Tolkien"],
    ),
    Preset::new(
      "What is the tallest mountain in the world?",
      "Mount Everest",
      13,
      [
        "It is located in the Mahalangur Himal sub-range of the Himalayas.",
        "It sits on the border between Nepal and China.",
        "Its peak is 8,848 meters (29,029 ft) above sea level.",
        "It is named after a British Surveyor General of India.",
      ],
      ["K2", "Mount Kilimanjaro", "Denali", "Mount Fuji", "Mont Blanc", "Mount Everest"],
    ),
    Preset::new(
      "Who discovered penicillin?",
      "Alexander Fleming",
      17,
      [
        "He was a Scottish physician and microbiologist.",
        "The discovery happened accidentally in 1928 at St Mary's Hospital, London.",
        "He noticed that a mold called Penicillium notatum killed bacteria in a petri dish.",
        "He shared the Nobel Prize in Physiology or Medicine in 1945.",
      ],
      ["Marie Curie", "Louis Pasteur", "Charles Darwin", "Albert Einstein", "Isaac Newton", "Alexander Fleming"],
    ),
    Preset::new(
      "What is the largest ocean on Earth?",
      "Pacific Ocean",
      21,
      [
        "It covers more than 30% of Earth's surface.",
        "Its name was coined by explorer Ferdinand Magellan, meaning 'peaceful'.",
        "It contains the Mariana Trench, the deepest part of the world's oceans.",
        "It separates Asia and Australia from the Americas.",
      ],
      ["Atlantic Ocean", "Indian Ocean", "Arctic Ocean", "Southern Ocean", "Mediterranean Sea", "Pacific Ocean"],
    ),
  ]
}

/// Presets are keyed by their question text.
pub fn find_preset(key: &str) -> Option<Preset> {
  let key = key.trim();
  presets().into_iter().find(|p| p.question == key)
}

pub const EXAMPLE_QUESTIONS: [&str; 15] = [
  "What is the capital of Brazil?",
  "Which planet is known as the Red Planet?",
  "Who wrote The Hobbit?",
  "What is the tallest mountain in the world?",
  "Who discovered penicillin?",
  "What is the largest ocean on Earth?",
  "What is the chemical symbol for Gold?",
  "Who painted the Mona Lisa?",
  "What is the powerhouse of the cell?",
  "Who was the first person to walk on the Moon?",
  "What is the largest mammal in the world?",
  "What is the capital of Japan?",
  "What is the currency of the United Kingdom?",
  "What is the freezing point of water in Celsius?",
  "Who wrote the play 'Romeo and Juliet'?",
];

/// Example questions in a fresh random order.
pub fn suggested_questions() -> Vec<&'static str> {
  let mut qs = EXAMPLE_QUESTIONS.to_vec();
  qs.shuffle(&mut rand::thread_rng());
  qs
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_preset_lists_its_ground_truth_among_candidates() {
    for p in presets() {
      assert!(p.candidates.contains(&p.ground_truth), "{}", p.question);
      assert_eq!(p.hints.len(), 4);
    }
  }

  #[test]
  fn payload_uses_upstream_field_names() {
    let p = find_preset("Who wrote The Hobbit?").unwrap();
    let v = p.to_payload();
    assert_eq!(v["groundTruth"], "J.R.R. Tolkien");
    assert_eq!(v["hints"][0]["hint_id"], 9);
    assert!(v["metricsById"].as_object().unwrap().is_empty());
  }

  #[test]
  fn suggestions_are_a_permutation() {
    let mut got = suggested_questions();
    got.sort();
    let mut want = EXAMPLE_QUESTIONS.to_vec();
    want.sort();
    assert_eq!(got, want);
    assert!(find_preset("unknown").is_none());
  }
}
