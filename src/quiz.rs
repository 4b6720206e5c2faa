use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult},
    locator::StorageLocator,
    storage::ObjectStore,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuizOption {
    pub index: u32,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<QuizOption>,
    #[serde(rename = "answer")]
    pub correct_index: u32,
}

impl QuizQuestion {
    pub fn option(&self, index: u32) -> Option<&QuizOption> {
        self.options.iter().find(|o| o.index == index)
    }

    /// Validated at parse time, so always present on a fetched question.
    pub fn correct_option(&self) -> Option<&QuizOption> {
        self.option(self.correct_index)
    }

    fn validate(&self, position: usize) -> AppResult<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = self.options.iter().find(|o| !seen.insert(o.index)) {
            return Err(AppError::QuizPayloadMalformed(format!(
                "question {}: duplicate option index {}",
                position, dup.index
            )));
        }
        if self.correct_option().is_none() {
            return Err(AppError::QuizPayloadMalformed(format!(
                "question {}: answer {} matches no option",
                position, self.correct_index
            )));
        }
        Ok(())
    }
}

// {"data": {"outputs": {"text": "<prose>[...]"}}}
#[derive(Deserialize)]
struct GeneratorDocument {
    data: GeneratorData,
}

#[derive(Deserialize)]
struct GeneratorData {
    outputs: GeneratorOutputs,
}

#[derive(Deserialize)]
struct GeneratorOutputs {
    text: String,
}

/// Parses the JSON array that starts at the first `[` of `text`.
///
/// Leading prose is skipped; anything after the array is ignored.
pub fn extract_embedded_array<T: DeserializeOwned>(text: &str) -> AppResult<Vec<T>> {
    let start = text
        .find('[')
        .ok_or_else(|| AppError::QuizPayloadMalformed("no JSON array in generator text".into()))?;

    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Vec<T>>()
        .next()
        .unwrap_or_else(|| Err(serde::de::Error::custom("empty payload")))
        .map_err(|e| AppError::QuizPayloadMalformed(e.to_string()))
}

pub fn parse_quiz_document(raw: &[u8]) -> AppResult<Vec<QuizQuestion>> {
    let text = std::str::from_utf8(raw).map_err(|e| AppError::QuizFetchFailed(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| AppError::QuizFetchFailed(e.to_string()))?;
    let doc: GeneratorDocument = serde_json::from_value(value)
        .map_err(|e| AppError::QuizPayloadMalformed(format!("unexpected document shape: {}", e)))?;

    let questions: Vec<QuizQuestion> = extract_embedded_array(&doc.data.outputs.text)?;
    for (i, q) in questions.iter().enumerate() {
        q.validate(i)?;
    }
    Ok(questions)
}

pub async fn fetch_quiz(
    store: &dyn ObjectStore,
    locator: &StorageLocator,
) -> AppResult<Vec<QuizQuestion>> {
    let raw = store
        .get_object(locator.container(), locator.key())
        .await
        .map_err(|e| AppError::QuizFetchFailed(e.to_string()))?;
    parse_quiz_document(&raw)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    pub fn generator_document(text: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({ "data": { "outputs": { "text": text } } })).unwrap()
    }

    pub fn two_question_text() -> String {
        let questions = json!([
            {
                "question": "Which tool rotates the logs?",
                "options": [{"index": 0, "content": "logrotate"}, {"index": 1, "content": "cron"}],
                "answer": 0
            },
            {
                "question": "Default retention?",
                "options": [{"index": 0, "content": "7 days"}, {"index": 1, "content": "30 days"}],
                "answer": 1
            }
        ]);
        format!("Here is the quiz you asked for:\n\n{}", questions)
    }

    #[test]
    fn skips_leading_prose() {
        let text = r#"some prose ... [{"question":"Q","options":[{"index":0,"content":"A"}],"answer":0}]"#;
        let qs: Vec<QuizQuestion> = extract_embedded_array(text).unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].prompt, "Q");
        assert_eq!(qs[0].correct_option().unwrap().content, "A");
    }

    #[test]
    fn trailing_text_is_ignored() {
        let text = "intro [1, 2, 3] hope this helps!";
        let values: Vec<u32> = extract_embedded_array(text).unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn no_bracket_is_malformed() {
        let err = extract_embedded_array::<QuizQuestion>("sorry, no quiz today").unwrap_err();
        assert!(matches!(err, AppError::QuizPayloadMalformed(_)));
    }

    #[test]
    fn broken_array_is_malformed() {
        let err = extract_embedded_array::<QuizQuestion>("quiz: [{\"question\": ").unwrap_err();
        assert!(matches!(err, AppError::QuizPayloadMalformed(_)));
    }

    #[test]
    fn answer_must_match_an_option() {
        let text = r#"[{"question":"Q","options":[{"index":0,"content":"A"}],"answer":3}]"#;
        let err = parse_quiz_document(&generator_document(text)).unwrap_err();
        assert!(matches!(err, AppError::QuizPayloadMalformed(_)));
    }

    #[test]
    fn option_indices_must_be_unique() {
        let text = r#"[{"question":"Q","options":[{"index":0,"content":"A"},{"index":0,"content":"B"}],"answer":0}]"#;
        let err = parse_quiz_document(&generator_document(text)).unwrap_err();
        assert!(matches!(err, AppError::QuizPayloadMalformed(_)));
    }

    #[test]
    fn non_json_document_is_a_fetch_failure() {
        let err = parse_quiz_document(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, AppError::QuizFetchFailed(_)));
        let err = parse_quiz_document(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, AppError::QuizFetchFailed(_)));
    }

    #[test]
    fn json_without_generator_text_is_malformed() {
        for doc in [
            json!({ "data": {} }),
            json!({ "data": { "outputs": { "answer": "[]" } } }),
            json!({ "data": { "outputs": { "text": 42 } } }),
            json!([1, 2, 3]),
        ] {
            let err = parse_quiz_document(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
            assert!(matches!(err, AppError::QuizPayloadMalformed(_)), "{doc}: {err}");
        }
    }

    #[tokio::test]
    async fn fetches_from_store() {
        let store = MemoryStore::new();
        store.put("quizzes", "item-0.json", generator_document(&two_question_text()));
        let loc: StorageLocator = "s3://quizzes/item-0.json".parse().unwrap();

        let qs = fetch_quiz(&store, &loc).await.unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].correct_index, 1);
        assert_eq!(qs[1].correct_option().unwrap().content, "30 days");
    }

    #[tokio::test]
    async fn missing_object_is_a_fetch_failure() {
        let store = MemoryStore::new();
        let loc: StorageLocator = "s3://quizzes/missing.json".parse().unwrap();

        let err = fetch_quiz(&store, &loc).await.unwrap_err();
        assert!(matches!(err, AppError::QuizFetchFailed(_)));
    }
}
