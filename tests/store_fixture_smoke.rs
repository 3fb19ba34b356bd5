use std::collections::{HashMap, HashSet};

use serde_json::Value;

fn sample_store() -> anyhow::Result<Value> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/store.sample.json");
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn array<'a>(value: &'a Value, key: &str) -> anyhow::Result<&'a Vec<Value>> {
    value[key].as_array().ok_or_else(|| anyhow::anyhow!("`{key}` must be an array"))
}

#[test]
fn sample_store_respects_registry_invariants() -> anyhow::Result<()> {
    let store = sample_store()?;

    let questions: HashMap<&str, &Value> = array(&store, "questions")?
        .iter()
        .filter_map(|question| question["id"].as_str().map(|id| (id, question)))
        .collect();

    for (id, question) in &questions {
        match question["type"].as_str() {
            Some("open") => {
                let reference = question["referenceAnswer"].as_str().unwrap_or_default();
                assert!(!reference.trim().is_empty(), "open question {id} needs a reference answer");
            }
            Some("closed") => {
                let options = array(question, "options")?;
                let correct = options.iter().filter(|option| option["isCorrect"] == true).count();
                assert!(correct >= 1, "closed question {id} needs a correct option");
            }
            other => panic!("question {id} has unexpected type {other:?}"),
        }
    }

    let mut exam_ids = HashSet::new();
    for exam in array(&store, "exams")? {
        let id = exam["id"].as_str().unwrap_or_default();
        exam_ids.insert(id);

        let mut open = 0;
        let mut closed = 0;
        for question_id in array(exam, "questionIds")? {
            let question_id = question_id.as_str().unwrap_or_default();
            let question = questions
                .get(question_id)
                .unwrap_or_else(|| panic!("exam {id} references unknown question {question_id}"));
            match question["type"].as_str() {
                Some("open") => open += 1,
                _ => closed += 1,
            }
        }

        assert_eq!(exam["openQuestions"].as_u64(), Some(open), "exam {id} open count");
        assert_eq!(exam["closedQuestions"].as_u64(), Some(closed), "exam {id} closed count");
    }

    let student_ids: HashSet<&str> = array(&store, "students")?
        .iter()
        .filter_map(|student| student["id"].as_str())
        .collect();

    for submission in array(&store, "submissions")? {
        let id = submission["id"].as_str().unwrap_or_default();
        let exam_id = submission["examId"].as_str().unwrap_or_default();
        let student_id = submission["studentId"].as_str().unwrap_or_default();
        assert!(exam_ids.contains(exam_id), "submission {id} references unknown exam");
        assert!(student_ids.contains(student_id), "submission {id} references unknown student");

        for answer in array(submission, "answers")? {
            if let Some(grade) = answer["grade"].as_f64() {
                assert!((0.0..=100.0).contains(&grade), "submission {id} has grade {grade}");
            }
        }
    }

    Ok(())
}
