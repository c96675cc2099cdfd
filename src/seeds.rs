//! Built-in content that keeps the app usable without an AI backend.
//!
//! Replies are shaped exactly like model output (a JSON object as text), so
//! they go through the same parsing and validation path as real responses.

use rand::seq::SliceRandom;
use serde_json::json;

use crate::domain::Mode;
use crate::gateway::RequestKind;

struct SeedProblem {
  language: &'static str,
  title: &'static str,
  description: &'static str,
  starter_code: &'static str,
}

const SEED_PROBLEMS: &[SeedProblem] = &[
  SeedProblem {
    language: "javascript",
    title: "Array Transformation Challenge",
    description: "<p>You are given an array of integers. Write a function <code>transformData</code> that performs the following:</p><ul><li>Filters out numbers less than 10.</li><li>Squares the remaining numbers.</li><li>Returns the final array sorted in descending order.</li></ul><p><b>Example:</b><br>Input: [5, 12, 8, 15, 3]<br>Output: [225, 144]</p>",
    starter_code: "/**\n * @param {number[]} arr\n * @return {number[]}\n */\nfunction transformData(arr) {\n    // Your code here\n}",
  },
  SeedProblem {
    language: "javascript",
    title: "Word Counter",
    description: "<p>Write a function <code>countWords</code> that returns the number of words in a sentence. Words are separated by one or more spaces.</p><p><b>Example:</b><br>Input: \"  hello   world \"<br>Output: 2</p>",
    starter_code: "function countWords(sentence) {\n    // Your code here\n}",
  },
  SeedProblem {
    language: "python",
    title: "Dictionary Frequency Map",
    description: "<p>Write a function <code>get_frequency</code> that takes a list of strings and returns a frequency map (dictionary).</p><p><b>Example:</b><br>Input: ['apple', 'banana', 'apple']<br>Output: {'apple': 2, 'banana': 1}</p>",
    starter_code: "def get_frequency(items):\n    # Your code here\n    pass",
  },
  SeedProblem {
    language: "python",
    title: "Running Total",
    description: "<p>Write a function <code>running_total</code> that returns a list where each element is the sum of all elements up to and including that position.</p><p><b>Example:</b><br>Input: [1, 2, 3]<br>Output: [1, 3, 6]</p>",
    starter_code: "def running_total(values):\n    # Your code here\n    pass",
  },
];

/// Text of an offline reply for the given request.
pub fn offline_reply(kind: &RequestKind) -> String {
  let value = match kind {
    RequestKind::Generate { mode: Mode::Challenge, language } => seed_problem(language),
    RequestKind::Generate { mode: Mode::MultipleChoice, .. } => seed_multiple_choice(),
    RequestKind::Generate { mode: Mode::FillBlanks, .. } => seed_fill_blanks(),
    RequestKind::Grade { .. } => seed_evaluation(),
  };
  value.to_string()
}

fn seed_problem(language: &str) -> serde_json::Value {
  let mut rng = rand::thread_rng();
  let same_lang: Vec<&SeedProblem> = SEED_PROBLEMS
    .iter()
    .filter(|p| p.language.eq_ignore_ascii_case(language))
    .collect();
  let pool: Vec<&SeedProblem> = if same_lang.is_empty() { SEED_PROBLEMS.iter().collect() } else { same_lang };
  let p = pool.choose(&mut rng).copied().unwrap_or(&SEED_PROBLEMS[0]);
  json!({ "title": p.title, "description": p.description, "starterCode": p.starter_code })
}

fn seed_multiple_choice() -> serde_json::Value {
  json!({
    "questions": [
      { "question": "Which data structure gives O(1) average lookup by key?",
        "options": ["Linked list", "Hash map", "Binary heap", "Stack"], "answer": 1 },
      { "question": "What does a <code>return</code> statement without a value return in most languages?",
        "options": ["Zero", "An empty string", "Nothing / the null-like value", "An error"], "answer": 2 },
      { "question": "Which loop is guaranteed to run its body at least once?",
        "options": ["for", "while", "do-while", "for-each"], "answer": 2 },
      { "question": "What is the time complexity of binary search on a sorted array?",
        "options": ["O(n)", "O(log n)", "O(n log n)", "O(1)"], "answer": 1 },
      { "question": "Which of these is immutable in Python?",
        "options": ["list", "dict", "set", "tuple"], "answer": 3 }
    ]
  })
}

fn seed_fill_blanks() -> serde_json::Value {
  json!({
    "snippets": [
      { "title": "Sum a list", "code": "total = 0\nfor n [BLANK] numbers:\n    total [BLANK] n", "answers": ["in", "+="] },
      { "title": "Define a function", "code": "[BLANK] greet(name):\n    return \"Hi \" + name", "answers": ["def"] },
      { "title": "Length of a string", "code": "size = [BLANK](\"hello\")", "answers": ["len"] },
      { "title": "Conditional", "code": "if x > 0:\n    print(\"positive\")\n[BLANK]:\n    print(\"not positive\")", "answers": ["else"] },
      { "title": "Import a module", "code": "[BLANK] math\nprint(math.sqrt(16))", "answers": ["import"] }
    ]
  })
}

fn seed_evaluation() -> serde_json::Value {
  json!({
    "score": 94,
    "rating": "★★★★★",
    "feedback": "Exceptional implementation! Your use of high-order functions demonstrates a strong grasp of modern language features. The logic is concise and highly readable.",
    "suggestions": [
      "<strong>Performance:</strong> Consider a single-pass reduce if the dataset becomes massive.",
      "<strong>Security:</strong> Add a check for null or undefined input arrays.",
      "<strong>Style:</strong> Use implicit returns in arrow functions for even cleaner logic."
    ]
  })
}
