use std::collections::HashMap;

use crate::db::models::Question;
use crate::db::Database;

pub(crate) async fn find_by_id(db: &Database, id: &str) -> Option<Question> {
    db.read().await.questions.iter().find(|question| question.id == id).cloned()
}

/// Resolves `ids` against the question bank; unknown ids are simply absent from the map.
pub(crate) async fn find_many(db: &Database, ids: &[String]) -> HashMap<String, Question> {
    if ids.is_empty() {
        return HashMap::new();
    }

    let snapshot = db.read().await;
    snapshot
        .questions
        .iter()
        .filter(|question| ids.contains(&question.id))
        .map(|question| (question.id.clone(), question.clone()))
        .collect()
}
